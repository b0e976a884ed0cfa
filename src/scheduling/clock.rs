//! Tick source
//!
//! Emits one logical tick per wall-clock second to every interval runner.
//! With top-of-minute alignment the tick index is the absolute unix second,
//! so a 60 s interval fires on `:00` of every minute and longer multiples of
//! 60 land on matching wall-clock boundaries. Without alignment the index
//! counts seconds since the common start instant.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::IntervalSpec;

/// Gaps larger than this are not replayed tick by tick.
pub const MAX_CATCH_UP_SECS: u64 = 5;

/// Whether a due tick `behind_secs` old should be dropped instead of run.
///
/// Ticks more than half a period old are stale, except those within the
/// replay window, so a short stall never costs a fast interval its tick.
pub fn is_stale(behind_secs: u64, interval: IntervalSpec) -> bool {
    behind_secs > MAX_CATCH_UP_SECS && behind_secs.saturating_mul(2) > interval.period_secs()
}

/// One second of schedule time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Logical index used for due checks and registry keys.
    pub index: u64,
    /// Wall-clock second the tick belongs to; used for file names.
    pub unix_secs: u64,
}

/// Maps wall-clock seconds to logical ticks and decides due-ness.
#[derive(Debug, Clone, Copy)]
pub struct TickClock {
    top_of_the_minute: bool,
    origin_unix: u64,
}

impl TickClock {
    pub fn new(top_of_the_minute: bool, origin_unix: u64) -> Self {
        Self {
            top_of_the_minute,
            origin_unix,
        }
    }

    /// Clock whose origin is the current wall-clock second.
    pub fn starting_now(top_of_the_minute: bool) -> Self {
        Self::new(top_of_the_minute, unix_now())
    }

    pub fn top_of_the_minute(&self) -> bool {
        self.top_of_the_minute
    }

    pub fn tick_at(&self, unix_secs: u64) -> Tick {
        let index = if self.top_of_the_minute {
            unix_secs
        } else {
            unix_secs.saturating_sub(self.origin_unix)
        };
        Tick { index, unix_secs }
    }

    /// Whether `interval` is due on `tick`.
    ///
    /// `tick % period == 0`; with alignment enabled, intervals that are whole
    /// minutes are additionally gated to minute boundaries.
    pub fn is_due(&self, interval: IntervalSpec, tick: u64) -> bool {
        let period = interval.period_secs();
        if tick % period != 0 {
            return false;
        }
        if self.top_of_the_minute && period % 60 == 0 {
            return tick % 60 == 0;
        }
        true
    }

    /// First due tick strictly after `tick`.
    pub fn next_due(&self, interval: IntervalSpec, tick: u64) -> u64 {
        let period = interval.period_secs();
        (tick / period + 1) * period
    }

    /// Broadcast ticks until cancelled.
    ///
    /// Wakes on whole-second boundaries. Short stalls (a few seconds) are
    /// replayed so no due tick is lost; longer gaps skip ahead with a warning.
    pub async fn run(self, tx: broadcast::Sender<Tick>, cancel: CancellationToken) {
        info!(
            top_of_the_minute = self.top_of_the_minute,
            origin = self.origin_unix,
            "Tick clock started"
        );

        let mut last_emitted: Option<u64> = None;
        loop {
            let wait = until_next_second();
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Tick clock stopping");
                    return;
                }
                () = tokio::time::sleep(wait) => {}
            }

            let now = unix_now();
            let first = match last_emitted {
                Some(last) if now <= last => continue,
                Some(last) if now - last > MAX_CATCH_UP_SECS => {
                    warn!(gap_secs = now - last, "Clock jumped, skipping missed ticks");
                    now
                }
                Some(last) => last + 1,
                None => now,
            };

            for second in first..=now {
                let tick = self.tick_at(second);
                if tx.send(tick).is_err() {
                    debug!(tick = tick.index, "No tick subscribers");
                }
            }
            last_emitted = Some(now);
        }
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn until_next_second() -> Duration {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    // Small margin so the wake lands just after the boundary.
    Duration::from_nanos(u64::from(1_000_000_000 - now.subsec_nanos())) + Duration::from_millis(2)
}
