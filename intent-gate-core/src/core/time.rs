// intent-gate-core/src/core/time.rs
// ============================================================================
// Module: Intent Gate Time Model
// Description: Canonical timestamp representation and clock seam.
// Purpose: Provide deterministic, comparable time values across records.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Intent Gate stores all timestamps as unix epoch milliseconds. The core
//! never reads wall-clock time directly; services take a [`Clock`] so tests
//! can drive time deterministically (escalation timeouts, dedupe TTLs, and
//! retention sweeps all depend on it).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp as unix epoch milliseconds.
///
/// # Invariants
/// - Ordering follows epoch ordering; values may predate the epoch (negative).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns this timestamp advanced by the given number of milliseconds.
    #[must_use]
    pub const fn plus_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns the signed distance in milliseconds from `earlier` to `self`.
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Renders the timestamp as an RFC 3339 string for API surfaces.
    ///
    /// Falls back to the raw millisecond value when the timestamp is outside
    /// the representable datetime range.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        let nanos = i128::from(self.0).saturating_mul(1_000_000);
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .and_then(|datetime| datetime.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.0.to_string())
    }
}

// ============================================================================
// SECTION: Clock Seam
// ============================================================================

/// Clock abstraction supplying the current time to services.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock backed [`Clock`] for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
        Timestamp::from_unix_millis(millis)
    }
}

/// Manually advanced [`Clock`] for deterministic tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    /// Current time in unix epoch milliseconds.
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a manual clock starting at the given timestamp.
    #[must_use]
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.as_unix_millis())),
        }
    }

    /// Advances the clock by the given number of milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute timestamp.
    pub fn set(&self, now: Timestamp) {
        self.millis.store(now.as_unix_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.millis.load(Ordering::SeqCst))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use super::*;

    /// Tests millisecond arithmetic saturates instead of wrapping.
    #[test]
    fn test_timestamp_arithmetic_saturates() {
        let max = Timestamp::from_unix_millis(i64::MAX);
        assert_eq!(max.plus_millis(1), max);
    }

    /// Tests RFC 3339 rendering for an in-range timestamp.
    #[test]
    fn test_rfc3339_rendering() {
        let ts = Timestamp::from_unix_millis(1_700_000_000_000);
        assert!(ts.to_rfc3339().starts_with("2023-11-14T"));
    }

    /// Tests the manual clock advances deterministically.
    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::starting_at(Timestamp::from_unix_millis(1_000));
        clock.advance_millis(500);
        assert_eq!(clock.now(), Timestamp::from_unix_millis(1_500));
    }
}
