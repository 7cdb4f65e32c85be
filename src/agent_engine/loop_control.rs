use std::time::Duration;

use tokio::time::Instant;

use crate::agent_engine::state::LoopConfig;

/// Why the loop policy ended a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    FailureLimit { failures: u32 },
    DurationLimit { elapsed: Duration },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::FailureLimit { failures } => {
                write!(f, "stopped after {failures} consecutive failed steps")
            }
            StopReason::DurationLimit { elapsed } => {
                write!(f, "time limit reached after {}s", elapsed.as_secs())
            }
        }
    }
}

/// Consecutive-failure counter and wall clock for one run.
#[derive(Debug)]
pub struct LoopController {
    config: LoopConfig,
    started: Instant,
    consecutive_failures: u32,
    cycles: u32,
}

impl LoopController {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            consecutive_failures: 0,
            cycles: 0,
        }
    }

    pub fn begin_cycle(&mut self) -> u32 {
        self.cycles += 1;
        self.cycles
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Success resets the counter to zero, failure adds one.
    pub fn record_result(&mut self, success: bool) {
        if success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Limits with a zero value are unbounded.
    pub fn check(&self) -> Option<StopReason> {
        let max_failures = self.config.max_consecutive_failures;
        if max_failures > 0 && self.consecutive_failures >= max_failures {
            return Some(StopReason::FailureLimit {
                failures: self.consecutive_failures,
            });
        }
        let max_duration = self.config.max_duration;
        let elapsed = self.elapsed();
        if !max_duration.is_zero() && elapsed >= max_duration {
            return Some(StopReason::DurationLimit { elapsed });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_limit_trips_exactly_at_threshold() {
        let mut ctl = LoopController::new(LoopConfig::failure_limit(3));
        ctl.record_result(false);
        ctl.record_result(false);
        assert_eq!(ctl.check(), None);
        ctl.record_result(true);
        assert_eq!(ctl.consecutive_failures(), 0);
        for _ in 0..2 {
            ctl.record_result(false);
            assert_eq!(ctl.check(), None);
        }
        ctl.record_result(false);
        assert_eq!(ctl.check(), Some(StopReason::FailureLimit { failures: 3 }));
    }

    #[test]
    fn zero_limits_are_unbounded() {
        let mut ctl = LoopController::new(LoopConfig::until_done(0));
        for _ in 0..100 {
            ctl.record_result(false);
        }
        assert_eq!(ctl.check(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_limit_uses_wall_clock() {
        let ctl = LoopController::new(LoopConfig::timed(Duration::from_secs(60), 0));
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(ctl.check(), None);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(matches!(ctl.check(), Some(StopReason::DurationLimit { .. })));
    }
}
