use async_trait::async_trait;

use crate::errors::{SeeClawError, SeeClawResult};
use crate::perception::types::CaptureMeta;

/// Longest edge of the greyscale frames used for stability sampling.
const FRAME_EDGE: u32 = 256;

/// One capture: PNG bytes and the metadata of the same capture.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub image_bytes: Vec<u8>,
    pub meta: CaptureMeta,
}

/// Screen capture device. Owned by the engine for the duration of a run.
#[async_trait]
pub trait ScreenCapturer: Send + Sync {
    /// Full-resolution capture. An error means the device is unavailable.
    async fn capture(&self) -> SeeClawResult<Screenshot>;

    /// Cheap greyscale frame for change detection.
    async fn capture_frame(&self) -> SeeClawResult<Vec<u8>> {
        let shot = self.capture().await?;
        tokio::task::spawn_blocking(move || thumbnail_luma(&shot.image_bytes))
            .await
            .map_err(|e| SeeClawError::Capture(format!("frame task: {e}")))?
    }
}

/// Downscale an encoded image into raw 8-bit luma samples.
pub fn thumbnail_luma(image_bytes: &[u8]) -> SeeClawResult<Vec<u8>> {
    let img = image::load_from_memory(image_bytes)
        .map_err(|e| SeeClawError::Capture(format!("decode frame: {e}")))?;
    Ok(img.thumbnail(FRAME_EDGE, FRAME_EDGE).to_luma8().into_raw())
}

pub fn encode_png(img: &image::RgbaImage) -> SeeClawResult<Vec<u8>> {
    let mut out = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| SeeClawError::Capture(format!("PNG encode: {e}")))?;
    Ok(out)
}

/// Captures one monitor with `xcap`.
#[cfg(feature = "native")]
pub struct XcapCapturer {
    /// `None` = primary monitor.
    monitor_index: Option<usize>,
}

#[cfg(feature = "native")]
impl XcapCapturer {
    pub fn primary() -> Self {
        Self { monitor_index: None }
    }

    pub fn monitor(index: usize) -> Self {
        Self {
            monitor_index: Some(index),
        }
    }

    fn grab(monitor_index: Option<usize>) -> SeeClawResult<(image::RgbaImage, CaptureMeta)> {
        let monitors =
            xcap::Monitor::all().map_err(|e| SeeClawError::Capture(format!("list monitors: {e}")))?;
        let (index, monitor) = match monitor_index {
            Some(i) => monitors
                .get(i)
                .map(|m| (i, m))
                .ok_or_else(|| SeeClawError::Capture(format!("monitor {i} not found")))?,
            None => monitors
                .iter()
                .enumerate()
                .find(|(_, m)| m.is_primary())
                .or_else(|| monitors.iter().enumerate().next())
                .ok_or_else(|| SeeClawError::Capture("no monitor found".into()))?,
        };

        let img = monitor
            .capture_image()
            .map_err(|e| SeeClawError::Capture(format!("capture: {e}")))?;

        let scale = monitor.scale_factor() as f64;
        let scale = if scale > 0.0 { scale } else { 1.0 };
        // Metadata is derived from the captured pixels so image and meta always agree.
        let meta = CaptureMeta {
            logical_width: (img.width() as f64 / scale).round() as u32,
            logical_height: (img.height() as f64 / scale).round() as u32,
            scale_factor: scale,
            monitor_origin_x: monitor.x(),
            monitor_origin_y: monitor.y(),
            monitor_index: index as u32,
        };
        Ok((img, meta))
    }
}

#[cfg(feature = "native")]
#[async_trait]
impl ScreenCapturer for XcapCapturer {
    async fn capture(&self) -> SeeClawResult<Screenshot> {
        let monitor_index = self.monitor_index;
        let (image_bytes, meta) = tokio::task::spawn_blocking(move || {
            let (img, meta) = Self::grab(monitor_index)?;
            Ok::<_, SeeClawError>((encode_png(&img)?, meta))
        })
        .await
        .map_err(|e| SeeClawError::Capture(format!("capture task: {e}")))??;
        tracing::debug!(
            monitor = meta.monitor_index,
            width = meta.logical_width,
            height = meta.logical_height,
            scale = meta.scale_factor,
            "screen captured"
        );
        Ok(Screenshot { image_bytes, meta })
    }

    async fn capture_frame(&self) -> SeeClawResult<Vec<u8>> {
        let monitor_index = self.monitor_index;
        tokio::task::spawn_blocking(move || {
            let (img, _) = Self::grab(monitor_index)?;
            Ok(image::DynamicImage::ImageRgba8(img)
                .thumbnail(FRAME_EDGE, FRAME_EDGE)
                .to_luma8()
                .into_raw())
        })
        .await
        .map_err(|e| SeeClawError::Capture(format!("frame task: {e}")))?
    }
}
