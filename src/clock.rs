//! Time source injected into the certificate authorities.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::error::{CaError, Result};

pub const DAYS_PER_YEAR: u64 = 365;

/// Longest validity any certificate may carry (100 years)
pub const MAX_VALIDITY_DAYS: u64 = 100 * DAYS_PER_YEAR;

/// End of a validity period of `days` starting at `start`
///
/// # Errors
/// [`CaError::InvalidValidityPeriod`] for zero days, more than
/// [`MAX_VALIDITY_DAYS`], or an end outside chrono's date range
pub fn validity_end(start: DateTime<Utc>, days: u64) -> Result<DateTime<Utc>> {
    if days == 0 || days > MAX_VALIDITY_DAYS {
        return Err(CaError::InvalidValidityPeriod(days));
    }
    i64::try_from(days)
        .ok()
        .and_then(Duration::try_days)
        .and_then(|period| start.checked_add_signed(period))
        .ok_or(CaError::InvalidValidityPeriod(days))
}

/// Supplies "now" for issuance, expiry and TTL decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at the current wall-clock time
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
