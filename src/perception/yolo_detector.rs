/// YOLOv8 UI element detection.
///
/// Pre/post-processing (letterbox geometry, decoding, NMS, id assignment) is
/// plain Rust; the ONNX Runtime session is only compiled with the `yolo` feature.
use std::collections::HashMap;

use crate::perception::types::{ElementType, UIElement};

pub const INPUT_SIZE: u32 = 640;
pub const IOU_THRESHOLD: f32 = 0.45;

/// Resize + pad geometry mapping an image into the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl Letterbox {
    pub fn fit(orig_w: u32, orig_h: u32, input: u32) -> Self {
        let scale = (input as f32 / orig_w as f32).min(input as f32 / orig_h as f32);
        let nw = (orig_w as f32 * scale).round();
        let nh = (orig_h as f32 * scale).round();
        Self {
            scale,
            pad_x: (input as f32 - nw) / 2.0,
            pad_y: (input as f32 - nh) / 2.0,
            orig_w,
            orig_h,
        }
    }

    /// Model-space centre box → normalized `[x1, y1, x2, y2]` on the original image.
    pub fn unmap(&self, cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
        let x = |v: f32| ((v - self.pad_x) / self.scale / self.orig_w as f32).clamp(0.0, 1.0);
        let y = |v: f32| ((v - self.pad_y) / self.scale / self.orig_h as f32).clamp(0.0, 1.0);
        [x(cx - w / 2.0), y(cy - h / 2.0), x(cx + w / 2.0), y(cy + h / 2.0)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: usize,
}

/// Decode a YOLOv8 output laid out as `[1, 4 + classes, proposals]` (row-major).
pub fn decode_predictions(
    data: &[f32],
    num_attrs: usize,
    num_preds: usize,
    letterbox: &Letterbox,
    conf_threshold: f32,
) -> Vec<RawDetection> {
    if num_attrs <= 4 || data.len() < num_attrs * num_preds {
        return Vec::new();
    }
    let at = |attr: usize, i: usize| data[attr * num_preds + i];

    let mut out = Vec::new();
    for i in 0..num_preds {
        let (class_id, confidence) = (0..num_attrs - 4)
            .map(|c| (c, at(4 + c, i)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if confidence < conf_threshold {
            continue;
        }
        let bbox = letterbox.unmap(at(0, i), at(1, i), at(2, i), at(3, i));
        if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
            continue;
        }
        out.push(RawDetection {
            bbox,
            confidence,
            class_id,
        });
    }
    out
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy per-class NMS. Output is ordered by descending confidence.
pub fn non_max_suppression(mut dets: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::new();
    for det in dets {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == det.class_id && iou(&k.bbox, &det.bbox) > iou_threshold);
        if !overlaps {
            kept.push(det);
        }
    }
    kept
}

/// Maps model class names to element kinds and id prefixes.
#[derive(Debug, Clone)]
pub struct ClassMap {
    names: Vec<String>,
}

impl ClassMap {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    fn name(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    pub fn kind(&self, class_id: usize) -> ElementType {
        match self.name(class_id) {
            Some("button") => ElementType::Button,
            Some("input") => ElementType::Input,
            Some("link") => ElementType::Link,
            Some("icon") => ElementType::Icon,
            Some("checkbox") => ElementType::Checkbox,
            Some("radio") => ElementType::Radio,
            Some("menu") => ElementType::Menu,
            Some("menuitem") => ElementType::MenuItem,
            Some("scrollbar") => ElementType::Select,
            Some("tab" | "toolbar" | "window" | "container") => ElementType::Container,
            Some("text") => ElementType::Text,
            Some("image") => ElementType::Image,
            _ => ElementType::Unknown,
        }
    }

    pub fn prefix(&self, class_id: usize) -> &str {
        match self.name(class_id) {
            Some("button") => "btn",
            Some("icon") => "ui",
            Some("checkbox") => "chk",
            Some("menuitem") => "mi",
            Some("scrollbar") => "scroll",
            Some("toolbar") => "tb",
            Some("window") => "win",
            Some("text") => "txt",
            Some("image") => "img",
            Some("container") => "cont",
            Some(other) => other,
            None => "obj",
        }
    }

    /// Per-class semantic ids: `btn_1`, `btn_2`, `ui_1`, ...
    pub fn to_elements(&self, dets: Vec<RawDetection>) -> Vec<UIElement> {
        let mut counters: HashMap<usize, u32> = HashMap::new();
        dets.into_iter()
            .map(|det| {
                let n = counters.entry(det.class_id).or_insert(0);
                *n += 1;
                UIElement {
                    id: format!("{}_{}", self.prefix(det.class_id), n),
                    kind: self.kind(det.class_id),
                    bbox: det.bbox,
                    label: None,
                    confidence: det.confidence,
                    parent_id: None,
                }
            })
            .collect()
    }
}

/// Single-class GUI detector default.
pub fn default_ui_class_names() -> Vec<String> {
    vec!["icon".to_string()]
}

#[cfg(feature = "yolo")]
pub use onnx::YoloDetector;

#[cfg(feature = "yolo")]
mod onnx {
    use std::path::Path;

    use ndarray::Array4;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;

    use super::{decode_predictions, non_max_suppression, ClassMap, Letterbox, INPUT_SIZE, IOU_THRESHOLD};
    use crate::errors::{SeeClawError, SeeClawResult};
    use crate::perception::traits::ElementDetector;
    use crate::perception::types::UIElement;

    pub struct YoloDetector {
        session: Session,
        classes: ClassMap,
        conf_threshold: f32,
    }

    impl YoloDetector {
        pub fn load(model_path: &Path, classes: Vec<String>, conf_threshold: f32) -> SeeClawResult<Self> {
            if !model_path.exists() {
                return Err(SeeClawError::Perception(format!(
                    "detector model not found: {}",
                    model_path.display()
                )));
            }
            let session = Session::builder()
                .map_err(|e| SeeClawError::Perception(format!("ort session builder: {e}")))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| SeeClawError::Perception(format!("ort opt-level: {e}")))?
                .commit_from_file(model_path)
                .map_err(|e| SeeClawError::Perception(format!("ort load model: {e}")))?;
            tracing::info!(path = %model_path.display(), "YOLO detector loaded");
            Ok(Self {
                session,
                classes: ClassMap::new(classes),
                conf_threshold,
            })
        }

        fn preprocess(img: &image::DynamicImage, lb: &Letterbox) -> Array4<f32> {
            let sz = INPUT_SIZE;
            let nw = (img.width() as f32 * lb.scale).round() as u32;
            let nh = (img.height() as f32 * lb.scale).round() as u32;
            let resized = img
                .resize_exact(nw, nh, image::imageops::FilterType::CatmullRom)
                .to_rgb8();
            let mut canvas = image::RgbImage::from_pixel(sz, sz, image::Rgb([114, 114, 114]));
            image::imageops::overlay(
                &mut canvas,
                &resized,
                lb.pad_x.round() as i64,
                lb.pad_y.round() as i64,
            );

            let mut tensor = Array4::<f32>::zeros((1, 3, sz as usize, sz as usize));
            for (x, y, p) in canvas.enumerate_pixels() {
                for c in 0..3 {
                    tensor[[0, c, y as usize, x as usize]] = p[c] as f32 / 255.0;
                }
            }
            tensor
        }
    }

    impl ElementDetector for YoloDetector {
        fn name(&self) -> &str {
            "yolov8"
        }

        fn detect(&mut self, image_bytes: &[u8]) -> SeeClawResult<Vec<UIElement>> {
            let img = image::load_from_memory(image_bytes)
                .map_err(|e| SeeClawError::Perception(format!("image load: {e}")))?;
            let lb = Letterbox::fit(img.width(), img.height(), INPUT_SIZE);
            let input = Tensor::from_array(Self::preprocess(&img, &lb))
                .map_err(|e| SeeClawError::Perception(format!("ort tensor: {e}")))?;

            let (shape, data) = {
                let outputs = self
                    .session
                    .run(ort::inputs![input])
                    .map_err(|e| SeeClawError::Perception(format!("ort run: {e}")))?;
                let view = outputs[0]
                    .try_extract_array::<f32>()
                    .map_err(|e| SeeClawError::Perception(format!("extract tensor: {e}")))?;
                (view.shape().to_vec(), view.iter().copied().collect::<Vec<f32>>())
            };
            if shape.len() < 3 {
                return Err(SeeClawError::Perception(format!(
                    "unexpected output shape: {shape:?}"
                )));
            }

            let raw = decode_predictions(&data, shape[1], shape[2], &lb, self.conf_threshold);
            let kept = non_max_suppression(raw, IOU_THRESHOLD);
            tracing::debug!(count = kept.len(), "YOLO detections after NMS");
            Ok(self.classes.to_elements(kept))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letterbox_unmaps_to_original_image() {
        // 1280x720 → scale 0.5, vertical padding 140.
        let lb = Letterbox::fit(1280, 720, INPUT_SIZE);
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert!((lb.pad_y - 140.0).abs() < 1e-3);
        let bbox = lb.unmap(320.0, 320.0, 64.0, 36.0);
        let expected = [0.45, 0.45, 0.55, 0.55];
        for (got, want) in bbox.iter().zip(expected) {
            assert!((got - want).abs() < 1e-3, "{bbox:?}");
        }
    }

    #[test]
    fn decodes_best_class_and_thresholds() {
        let lb = Letterbox::fit(640, 640, INPUT_SIZE);
        // Two proposals, two classes: attrs = [cx, cy, w, h, c0, c1].
        let data = vec![
            100.0, 300.0, // cx
            100.0, 300.0, // cy
            40.0, 40.0, // w
            20.0, 20.0, // h
            0.1, 0.05, // class 0
            0.9, 0.1, // class 1
        ];
        let dets = decode_predictions(&data, 6, 2, &lb, 0.25);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert!((dets[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn nms_is_per_class() {
        let a = RawDetection { bbox: [0.1, 0.1, 0.3, 0.3], confidence: 0.9, class_id: 0 };
        let b = RawDetection { bbox: [0.11, 0.11, 0.31, 0.31], confidence: 0.8, class_id: 0 };
        let c = RawDetection { bbox: [0.11, 0.11, 0.31, 0.31], confidence: 0.7, class_id: 1 };
        let kept = non_max_suppression(vec![b, c, a.clone()], IOU_THRESHOLD);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0], a);
        assert_eq!(kept[1].class_id, 1);
    }

    #[test]
    fn ids_are_numbered_per_class() {
        let map = ClassMap::new(vec!["button".into(), "icon".into()]);
        let det = |class_id| RawDetection { bbox: [0.0, 0.0, 0.1, 0.1], confidence: 0.5, class_id };
        let elements = map.to_elements(vec![det(0), det(1), det(0), det(7)]);
        let ids: Vec<&str> = elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["btn_1", "ui_1", "btn_2", "obj_1"]);
        assert_eq!(elements[0].kind, ElementType::Button);
        assert_eq!(elements[3].kind, ElementType::Unknown);
    }
}
