/// Perception pipeline: capture → detector → hierarchy + annotation, with the
/// labeled grid as fallback when the detector yields nothing usable.
use std::sync::{Arc, Mutex};

use crate::config::PerceptionConfig;
use crate::errors::{SeeClawError, SeeClawResult};
use crate::perception::annotator;
use crate::perception::screenshot::{ScreenCapturer, Screenshot};
use crate::perception::som_grid::{draw_som_grid, GridSpec};
use crate::perception::traits::ElementDetector;
use crate::perception::types::{PerceptionSnapshot, UIElement};

/// Tolerance for "fully contains" when detector boxes are slightly off.
const CONTAINMENT_TOLERANCE: f32 = 0.005;

pub type SharedDetector = Arc<Mutex<Box<dyn ElementDetector>>>;

pub struct PerceptionPipeline {
    capturer: Arc<dyn ScreenCapturer>,
    detector: Option<SharedDetector>,
    config: PerceptionConfig,
    grid: GridSpec,
}

impl PerceptionPipeline {
    pub fn new(
        capturer: Arc<dyn ScreenCapturer>,
        detector: Option<SharedDetector>,
        config: PerceptionConfig,
    ) -> SeeClawResult<Self> {
        let grid = GridSpec::new(config.grid_n)?;
        Ok(Self {
            capturer,
            detector,
            config,
            grid,
        })
    }

    pub fn capturer(&self) -> &Arc<dyn ScreenCapturer> {
        &self.capturer
    }

    /// Capture a fresh snapshot.
    ///
    /// Only a capture failure is returned as an error; detector or drawing
    /// failures degrade to the grid or to the raw screenshot.
    pub async fn capture(&self) -> SeeClawResult<PerceptionSnapshot> {
        self.capture_with(None).await
    }

    /// Like [`capture`](Self::capture); `annotate` overrides the configured
    /// overlay choice for this snapshot only.
    pub async fn capture_with(&self, annotate: Option<bool>) -> SeeClawResult<PerceptionSnapshot> {
        let annotate = annotate.unwrap_or(self.config.annotate);
        let Screenshot { image_bytes, meta } = self.capturer.capture().await?;
        let image_bytes = Arc::new(image_bytes);

        let detections = self.detect(image_bytes.clone()).await;
        let min_conf = self.config.min_confidence;
        let mut elements: Vec<UIElement> = detections
            .into_iter()
            .filter(|e| e.confidence >= min_conf && e.is_well_formed())
            .collect();

        if !elements.is_empty() {
            compute_hierarchy(&mut elements);
            tracing::debug!(count = elements.len(), "using detector elements");
            let image = if annotate {
                let src = image_bytes.clone();
                let marks = elements.clone();
                self.render(move || annotator::annotate_image(&src, &marks), &image_bytes)
                    .await
            } else {
                image_bytes.as_ref().clone()
            };
            return Ok(PerceptionSnapshot::from_detections(Some(image), elements, meta));
        }

        tracing::info!(grid_n = self.grid.n(), "no usable detections, falling back to SoM grid");
        let grid = self.grid;
        let image = if annotate {
            let src = image_bytes.clone();
            self.render(move || draw_som_grid(&src, grid), &image_bytes).await
        } else {
            image_bytes.as_ref().clone()
        };
        Ok(PerceptionSnapshot::grid(Some(image), grid.elements(), meta, grid.n()))
    }

    async fn detect(&self, image_bytes: Arc<Vec<u8>>) -> Vec<UIElement> {
        let Some(detector) = self.detector.clone() else {
            return Vec::new();
        };
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = detector
                .lock()
                .map_err(|_| SeeClawError::Perception("detector lock poisoned".into()))?;
            guard.detect(&image_bytes)
        })
        .await
        .map_err(|e| SeeClawError::Perception(format!("detector task: {e}")));

        match result {
            Ok(Ok(elements)) => elements,
            Ok(Err(e)) | Err(e) => {
                tracing::warn!(error = %e, "element detection failed, treating as empty");
                Vec::new()
            }
        }
    }

    /// Run an image-drawing job off the async runtime; on failure keep the raw capture.
    async fn render<F>(&self, job: F, raw: &Arc<Vec<u8>>) -> Vec<u8>
    where
        F: FnOnce() -> SeeClawResult<Vec<u8>> + Send + 'static,
    {
        match tokio::task::spawn_blocking(job).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "image overlay failed, sending raw screenshot");
                raw.as_ref().clone()
            }
            Err(e) => {
                tracing::warn!(error = %e, "image overlay task failed, sending raw screenshot");
                raw.as_ref().clone()
            }
        }
    }
}

/// Give every element a short numeric id ("1", "2", …) and point `parent_id`
/// at its smallest strictly larger enclosing element.
pub fn compute_hierarchy(elements: &mut [UIElement]) {
    let n = elements.len();
    let areas: Vec<f32> = elements.iter().map(UIElement::area).collect();

    let parents: Vec<Option<usize>> = (0..n)
        .map(|i| {
            let [ix1, iy1, ix2, iy2] = elements[i].bbox;
            (0..n)
                .filter(|&j| j != i && areas[j] > areas[i])
                .filter(|&j| {
                    let [jx1, jy1, jx2, jy2] = elements[j].bbox;
                    jx1 <= ix1 + CONTAINMENT_TOLERANCE
                        && jy1 <= iy1 + CONTAINMENT_TOLERANCE
                        && jx2 >= ix2 - CONTAINMENT_TOLERANCE
                        && jy2 >= iy2 - CONTAINMENT_TOLERANCE
                })
                .min_by(|&a, &b| areas[a].total_cmp(&areas[b]))
        })
        .collect();

    for (idx, elem) in elements.iter_mut().enumerate() {
        elem.id = (idx + 1).to_string();
    }
    for (idx, parent) in parents.into_iter().enumerate() {
        elements[idx].parent_id = parent.map(|p| (p + 1).to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::screenshot::encode_png;
    use crate::perception::types::{CaptureMeta, ElementType, PerceptionSource};
    use async_trait::async_trait;

    struct StaticScreen;

    #[async_trait]
    impl ScreenCapturer for StaticScreen {
        async fn capture(&self) -> SeeClawResult<Screenshot> {
            let img = image::RgbaImage::from_pixel(160, 90, image::Rgba([40, 40, 40, 255]));
            Ok(Screenshot {
                image_bytes: encode_png(&img)?,
                meta: CaptureMeta {
                    logical_width: 160,
                    logical_height: 90,
                    scale_factor: 1.0,
                    monitor_origin_x: 0,
                    monitor_origin_y: 0,
                    monitor_index: 0,
                },
            })
        }
    }

    struct FixedDetector(Vec<UIElement>);

    impl ElementDetector for FixedDetector {
        fn name(&self) -> &str {
            "fixed"
        }
        fn detect(&mut self, _: &[u8]) -> SeeClawResult<Vec<UIElement>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenDetector;

    impl ElementDetector for BrokenDetector {
        fn name(&self) -> &str {
            "broken"
        }
        fn detect(&mut self, _: &[u8]) -> SeeClawResult<Vec<UIElement>> {
            Err(SeeClawError::Perception("model exploded".into()))
        }
    }

    fn element(bbox: [f32; 4], confidence: f32) -> UIElement {
        UIElement {
            id: "x".into(),
            kind: ElementType::Button,
            bbox,
            label: None,
            confidence,
            parent_id: None,
        }
    }

    fn pipeline(detector: Option<Box<dyn ElementDetector>>, grid_n: u32) -> PerceptionPipeline {
        let config = PerceptionConfig {
            grid_n,
            ..PerceptionConfig::default()
        };
        PerceptionPipeline::new(
            Arc::new(StaticScreen),
            detector.map(|d| Arc::new(Mutex::new(d))),
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn no_detector_means_grid() {
        let snap = pipeline(None, 8).capture().await.unwrap();
        assert_eq!(snap.source(), PerceptionSource::SomGrid);
        assert_eq!(snap.grid_n(), Some(8));
        assert_eq!(snap.elements().len(), 64);
        assert!(snap.element("H8").is_some());
        assert!(snap.image().is_some());
    }

    #[tokio::test]
    async fn low_confidence_detections_fall_back_to_grid() {
        let det = FixedDetector(vec![element([0.1, 0.1, 0.2, 0.2], 0.1)]);
        let snap = pipeline(Some(Box::new(det)), 4).capture().await.unwrap();
        assert_eq!(snap.source(), PerceptionSource::SomGrid);
    }

    #[tokio::test]
    async fn detector_errors_fall_back_to_grid() {
        let snap = pipeline(Some(Box::new(BrokenDetector)), 4).capture().await.unwrap();
        assert_eq!(snap.source(), PerceptionSource::SomGrid);
    }

    #[tokio::test]
    async fn confident_detections_get_numeric_ids_and_parents() {
        let det = FixedDetector(vec![
            element([0.0, 0.0, 0.5, 0.5], 0.9),
            element([0.1, 0.1, 0.2, 0.2], 0.8),
            element([0.6, 0.6, 0.4, 0.9], 0.9), // inverted, dropped
        ]);
        let snap = pipeline(Some(Box::new(det)), 4).capture().await.unwrap();
        assert_eq!(snap.source(), PerceptionSource::Detector);
        let ids: Vec<_> = snap.elements().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
        assert_eq!(snap.elements()[1].parent_id.as_deref(), Some("1"));
        assert_eq!(snap.elements()[0].parent_id, None);
    }

    #[tokio::test]
    async fn annotate_override_applies_to_one_snapshot() {
        let p = pipeline(None, 4);
        let raw = StaticScreen.capture().await.unwrap().image_bytes;
        let plain = p.capture_with(Some(false)).await.unwrap();
        assert_eq!(plain.image(), Some(raw.as_slice()));
        assert_eq!(plain.source(), PerceptionSource::SomGrid);

        let drawn = p.capture().await.unwrap();
        assert_ne!(drawn.image(), Some(raw.as_slice()));
    }
}
