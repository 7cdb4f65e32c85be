use crate::errors::SeeClawResult;
use crate::perception::types::UIElement;

/// Trained UI element detector.
///
/// Inference is CPU-bound and synchronous; the pipeline calls it from a
/// blocking thread. Returned boxes are normalized to the input image and may
/// carry any confidence; thresholding is the pipeline's job.
pub trait ElementDetector: Send {
    fn name(&self) -> &str;

    fn detect(&mut self, image_bytes: &[u8]) -> SeeClawResult<Vec<UIElement>>;
}
