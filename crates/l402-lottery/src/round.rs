//! Deterministic round boundaries.
//!
//! Round boundaries are fixed to wall-clock time so that every stateless
//! instance agrees on when the current round started and ends, across cold
//! starts and without coordination: `index = floor((now − epoch) / duration)`.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Default round length: 24 hours.
pub const ROUND_DURATION_HOURS: i64 = 24;

/// Computes the deterministic bounds of the round covering any instant.
#[derive(Debug, Clone)]
pub struct RoundClock {
    epoch: DateTime<Utc>,
    duration_ms: i64,
}

/// Bounds of one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundBounds {
    pub index: i64,
    /// `round-{index}`, the durable round key.
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Default for RoundClock {
    fn default() -> Self {
        RoundClock::new(lottery_epoch(), Duration::hours(ROUND_DURATION_HOURS))
    }
}

/// Anchor for round numbering: midnight UTC, 2026-02-21.
pub fn lottery_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 21, 0, 0, 0)
        .single()
        .expect("fixed epoch is a valid timestamp")
}

impl RoundClock {
    pub fn new(epoch: DateTime<Utc>, duration: Duration) -> Self {
        let duration_ms = duration.num_milliseconds().max(1);
        RoundClock {
            epoch,
            duration_ms,
        }
    }

    pub fn bounds(&self, now: DateTime<Utc>) -> RoundBounds {
        let elapsed_ms = now.timestamp_millis() - self.epoch.timestamp_millis();
        // div_euclid keeps pre-epoch instants on a consistent grid.
        let index = elapsed_ms.div_euclid(self.duration_ms);
        let started_ms = self.epoch.timestamp_millis() + index * self.duration_ms;
        let started_at = Utc
            .timestamp_millis_opt(started_ms)
            .single()
            .unwrap_or(self.epoch);
        let ends_at = Utc
            .timestamp_millis_opt(started_ms + self.duration_ms)
            .single()
            .unwrap_or(self.epoch);
        RoundBounds {
            index,
            id: format!("round-{index}"),
            started_at,
            ends_at,
        }
    }
}
