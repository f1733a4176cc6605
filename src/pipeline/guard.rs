//! Snapshot size guard.
//!
//! A truncated catalog response is indistinguishable from a wave of
//! removals, so a snapshot that empties or shrinks past `max_drop_percent`
//! is held back: the pass aborts before any state is written and the held
//! size is remembered. When the next pass sees a size consistent with the
//! held one, the shrink is taken as real and that pass runs normally,
//! reporting the missing items as removed.

use crate::error::{AppError, Result};
use crate::models::GuardConfig;

/// Why a snapshot looks suspicious.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shrink {
    Emptied,
    Dropped { percent: f64 },
}

/// Decision for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Proceed,
    /// Same shrink as the one held on the previous pass
    Confirmed(Shrink),
    /// New shrink; the pass must abort and remember the size
    Hold(Shrink),
}

#[derive(Debug, Clone)]
pub struct SnapshotGuard {
    max_drop_percent: u8,
    min_baseline: usize,
    allow_cold_start: bool,
}

impl SnapshotGuard {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            max_drop_percent: config.max_drop_percent,
            min_baseline: config.min_baseline,
            allow_cold_start: config.allow_cold_start,
        }
    }

    /// Judge `current` against the last accepted size and the size held by
    /// the previous pass, if it was held.
    pub fn judge(&self, current: usize, accepted: Option<usize>, held: Option<usize>) -> Verdict {
        let Some(shrink) = self.shrink(accepted, current) else {
            return Verdict::Proceed;
        };
        match held {
            Some(held) if self.consistent(held, current) => Verdict::Confirmed(shrink),
            _ => Verdict::Hold(shrink),
        }
    }

    /// Error describing a held snapshot.
    pub fn error(&self, shrink: Shrink, current: usize, accepted: Option<usize>) -> AppError {
        match shrink {
            Shrink::Emptied => AppError::EmptyCatalog,
            Shrink::Dropped { percent } => AppError::SnapshotShrunk {
                current_count: current,
                previous_count: accepted.unwrap_or(0),
                drop_percent: percent,
                threshold_percent: self.max_drop_percent,
            },
        }
    }

    /// Judge and log, returning an error for a held snapshot.
    pub fn admit(&self, current: usize, accepted: Option<usize>, held: Option<usize>) -> Result<Verdict> {
        let verdict = self.judge(current, accepted, held);
        match verdict {
            Verdict::Proceed => {}
            Verdict::Confirmed(_) => log::warn!(
                "Snapshot of {} items (was {:?}) seen on consecutive passes, accepting",
                current,
                accepted
            ),
            Verdict::Hold(shrink) => {
                let err = self.error(shrink, current, accepted);
                log::error!("Holding back snapshot: {}", err);
                return Err(err);
            }
        }
        Ok(verdict)
    }

    fn shrink(&self, accepted: Option<usize>, current: usize) -> Option<Shrink> {
        let accepted = accepted.unwrap_or(0);
        if current == 0 {
            let cold = accepted == 0 && self.allow_cold_start;
            return (!cold).then_some(Shrink::Emptied);
        }
        if accepted < self.min_baseline {
            return None;
        }
        let percent = drop_percent(accepted, current);
        (percent > f64::from(self.max_drop_percent)).then_some(Shrink::Dropped { percent })
    }

    fn consistent(&self, held: usize, current: usize) -> bool {
        if current == 0 || held == 0 {
            return current == held;
        }
        drop_percent(held, current) <= f64::from(self.max_drop_percent)
    }
}

fn drop_percent(from: usize, to: usize) -> f64 {
    if to >= from {
        return 0.0;
    }
    (from - to) as f64 * 100.0 / from as f64
}
