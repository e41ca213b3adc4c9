//! Time source for destruction timestamps.

use chrono::{SubsecRound, Utc};
use domain::Timestamp;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

use common::TimestampPrecision;

/// Source of "now" for destroy calls that do not supply a timestamp.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Truncate to the precision the store keeps, so the timestamp carried in
/// memory equals the stored one.
pub fn truncate(at: Timestamp, precision: TimestampPrecision) -> Timestamp {
    at.trunc_subsecs(precision.digits())
}
