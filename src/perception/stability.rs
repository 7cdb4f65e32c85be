use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::SeeClawResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Upper bound on one wait. Timing out is not an error.
    pub max_wait_ms: u64,
    pub interval_ms: u64,
    /// Fraction of sampled pixels allowed to change between "still" frames.
    pub diff_threshold: f64,
    /// Consecutive still frame pairs required before declaring stability.
    pub min_stable_frames: usize,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: 5000,
            interval_ms: 200,
            diff_threshold: 0.02,
            min_stable_frames: 3,
        }
    }
}

/// Per-channel delta above which a sample counts as changed.
const PIXEL_DELTA: u8 = 10;
const MAX_SAMPLES: usize = 1000;

/// Fraction of sampled positions whose value changed noticeably.
/// Frames of different length (resolution change) count as fully changed.
pub fn frame_difference(a: &[u8], b: &[u8]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let step = (a.len() / MAX_SAMPLES).max(1);
    let mut changed = 0usize;
    let mut samples = 0usize;
    for i in (0..a.len()).step_by(step) {
        if a[i].abs_diff(b[i]) > PIXEL_DELTA {
            changed += 1;
        }
        samples += 1;
    }
    changed as f64 / samples as f64
}

/// Tracks how many consecutive frames have been below the change threshold.
pub struct StabilityDetector {
    threshold: f64,
    required: usize,
    previous: Option<Vec<u8>>,
    still_run: usize,
}

impl StabilityDetector {
    pub fn new(config: &StabilityConfig) -> Self {
        Self {
            threshold: config.diff_threshold,
            required: config.min_stable_frames.max(1),
            previous: None,
            still_run: 0,
        }
    }

    /// Feed the next frame; returns true once enough still frames were seen in a row.
    pub fn observe(&mut self, frame: Vec<u8>) -> bool {
        if let Some(prev) = &self.previous {
            let diff = frame_difference(prev, &frame);
            if diff < self.threshold {
                self.still_run += 1;
            } else {
                self.still_run = 0;
            }
            tracing::trace!(diff, still_run = self.still_run, "frame compared");
        }
        self.previous = Some(frame);
        self.is_stable()
    }

    pub fn is_stable(&self) -> bool {
        self.still_run >= self.required
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.still_run = 0;
    }
}

/// Sample frames every `interval_ms` until the screen settles.
///
/// Returns `Ok(true)` when stable, `Ok(false)` on timeout or cancellation.
/// Only a failing capture is an error; a capture still pending at the
/// deadline is abandoned.
pub async fn await_stable<F, Fut>(
    mut capture_frame: F,
    config: &StabilityConfig,
    cancel: &CancellationToken,
) -> SeeClawResult<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SeeClawResult<Vec<u8>>>,
{
    let started = tokio::time::Instant::now();
    let deadline = started + Duration::from_millis(config.max_wait_ms);
    let interval = Duration::from_millis(config.interval_ms.max(1));
    let mut detector = StabilityDetector::new(config);

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(false),
            _ = tokio::time::sleep_until(deadline) => break,
            frame = capture_frame() => frame?,
        };
        if detector.observe(frame) {
            tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "screen stable");
            return Ok(true);
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            break;
        }
        let wake = (now + interval).min(deadline);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(false),
            _ = tokio::time::sleep_until(wake) => {}
        }
    }

    tracing::warn!(waited_ms = config.max_wait_ms, "stability wait timed out");
    Ok(false)
}
