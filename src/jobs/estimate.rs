// Progress and ETA estimation
//
// Progress is stage-weight based:
//   floor(99 * (done_weight + stage_weight * fraction) / total_weight)
//
// The ETA is the mode baseline minus elapsed time until the first progress
// is reported, then a linear extrapolation from elapsed time:
//   elapsed * (100 - p) / p

use super::job::MAX_RUNNING_PROGRESS;
use std::time::Duration;

/// Progress percentage for a position inside a weighted pipeline
pub fn progress_percent(done_weight: u32, stage_weight: u32, fraction: f64, total_weight: u32) -> u8 {
    if total_weight == 0 {
        return 0;
    }
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let position = (done_weight as f64 + stage_weight as f64 * fraction).min(total_weight as f64);
    let percent = (MAX_RUNNING_PROGRESS as f64 * position / total_weight as f64).floor();
    percent.clamp(0.0, MAX_RUNNING_PROGRESS as f64) as u8
}

/// Remaining time for a running job
pub fn estimate_time_left(baseline: Duration, elapsed: Duration, progress: u8) -> Duration {
    if progress == 0 {
        return baseline.saturating_sub(elapsed);
    }
    if progress >= 100 {
        return Duration::ZERO;
    }
    let elapsed_ms = elapsed.as_millis() as u64;
    let remaining_ms = elapsed_ms.saturating_mul(100 - progress as u64) / progress as u64;
    Duration::from_millis(remaining_ms)
}

/// Tracks progress through a weighted stage pipeline; never moves backwards
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_weight: u32,
    done_weight: u32,
    stage_weight: u32,
    current: u8,
}

impl ProgressTracker {
    pub fn new(total_weight: u32) -> Self {
        Self {
            total_weight,
            done_weight: 0,
            stage_weight: 0,
            current: 0,
        }
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    /// Enter a stage of the given weight
    pub fn begin_stage(&mut self, weight: u32) {
        self.stage_weight = weight;
    }

    /// Intra-stage checkpoint
    pub fn checkpoint(&mut self, fraction: f64) -> u8 {
        let p = progress_percent(self.done_weight, self.stage_weight, fraction, self.total_weight);
        self.current = self.current.max(p);
        self.current
    }

    /// Finish the current stage
    pub fn finish_stage(&mut self) -> u8 {
        self.done_weight = self.done_weight.saturating_add(self.stage_weight);
        self.stage_weight = 0;
        self.checkpoint(0.0)
    }
}
