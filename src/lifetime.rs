use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, DurationRound, TimeDelta, Utc};

use crate::error::{Error, Result};

/// Source of the current instant.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock, truncated to the millisecond precision assertions carry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        truncate_to_millis(Utc::now())
    }
}

/// Manually driven clock.
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(instant.timestamp_millis()),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        self.millis.store(instant.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

pub(crate) fn truncate_to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .duration_trunc(TimeDelta::milliseconds(1))
        .unwrap_or(instant)
}

/// Validity window of a token. `created` is always strictly before `expires`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetime {
    created: DateTime<Utc>,
    expires: DateTime<Utc>,
}

impl Lifetime {
    pub fn new(created: DateTime<Utc>, expires: DateTime<Utc>) -> Result<Self> {
        if created >= expires {
            return Err(Error::InvalidLifetime(format!(
                "window starting at {created} must end after it, not at {expires}"
            )));
        }
        Ok(Self { created, expires })
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    pub fn duration(&self) -> Duration {
        self.expires - self.created
    }
}

/// Computes issuance windows and expiry decisions against a shared clock.
#[derive(Debug, Clone)]
pub struct LifetimeCalculator {
    clock: Arc<dyn Clock>,
    default_lifetime: Duration,
}

impl LifetimeCalculator {
    pub fn new(default_lifetime: Duration) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            default_lifetime,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn default_lifetime(&self) -> Duration {
        self.default_lifetime
    }

    /// Window for a token issued now.
    ///
    /// The start is moved back by `clock_skew` so relying parties whose
    /// clocks run slightly behind still accept the token. The end is
    /// `requested` (or the default lifetime) after now.
    pub fn compute_lifetime(
        &self,
        requested: Option<Duration>,
        clock_skew: Duration,
    ) -> Result<Lifetime> {
        let lifetime = requested.unwrap_or(self.default_lifetime);
        if lifetime <= Duration::zero() {
            return Err(Error::InvalidLifetime(format!(
                "requested lifetime must be positive, got {}ms",
                lifetime.num_milliseconds()
            )));
        }
        if clock_skew < Duration::zero() {
            return Err(Error::InvalidLifetime("clock skew must not be negative".into()));
        }

        let now = self.now();
        let created = now.checked_sub_signed(clock_skew).ok_or_else(|| {
            Error::InvalidLifetime(format!(
                "clock skew of {}ms reaches before the earliest representable instant",
                clock_skew.num_milliseconds()
            ))
        })?;
        let expires = now.checked_add_signed(lifetime).ok_or_else(|| {
            Error::InvalidLifetime(format!(
                "requested lifetime of {}s ends after the latest representable instant",
                lifetime.num_seconds()
            ))
        })?;
        Lifetime::new(created, expires)
    }

    /// Whether `now` lies outside the window widened by `clock_skew` on
    /// both ends. The boundaries themselves still count as valid.
    pub fn has_expired(lifetime: &Lifetime, clock_skew: Duration, now: DateTime<Utc>) -> bool {
        let earliest = lifetime
            .created
            .checked_sub_signed(clock_skew)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let latest = lifetime
            .expires
            .checked_add_signed(clock_skew)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        now < earliest || now > latest
    }

    /// `has_expired` evaluated at the calculator's current instant.
    pub fn is_expired(&self, lifetime: &Lifetime, clock_skew: Duration) -> bool {
        Self::has_expired(lifetime, clock_skew, self.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn calculator(clock: Arc<FixedClock>) -> LifetimeCalculator {
        LifetimeCalculator::new(Duration::hours(2)).with_clock(clock)
    }

    #[test]
    fn test_lifetime_rejects_empty_window() {
        assert!(matches!(
            Lifetime::new(epoch(), epoch()),
            Err(Error::InvalidLifetime(_))
        ));
        assert!(Lifetime::new(epoch(), epoch() + Duration::milliseconds(1)).is_ok());
    }

    #[test]
    fn test_compute_default_lifetime() {
        let clock = Arc::new(FixedClock::new(epoch()));
        let lifetime = calculator(clock)
            .compute_lifetime(None, Duration::seconds(2))
            .unwrap();

        assert_eq!(lifetime.created(), epoch() - Duration::seconds(2));
        assert_eq!(lifetime.expires(), epoch() + Duration::hours(2));
    }

    #[test]
    fn test_compute_requested_lifetime() {
        let clock = Arc::new(FixedClock::new(epoch()));
        let lifetime = calculator(clock)
            .compute_lifetime(Some(Duration::minutes(5)), Duration::zero())
            .unwrap();

        assert_eq!(lifetime.duration(), Duration::minutes(5));
    }

    #[test]
    fn test_non_positive_lifetime_rejected() {
        let clock = Arc::new(FixedClock::new(epoch()));
        let calc = calculator(clock);
        for requested in [Duration::zero(), Duration::seconds(-5)] {
            assert!(matches!(
                calc.compute_lifetime(Some(requested), Duration::zero()),
                Err(Error::InvalidLifetime(_))
            ));
        }
    }

    #[test]
    fn test_skew_boundaries_are_symmetric() {
        let lifetime = Lifetime::new(epoch(), epoch() + Duration::minutes(5)).unwrap();
        let skew = Duration::seconds(2);
        let ms = Duration::milliseconds(1);

        let expires = lifetime.expires();
        assert!(!LifetimeCalculator::has_expired(&lifetime, skew, expires + skew));
        assert!(LifetimeCalculator::has_expired(&lifetime, skew, expires + skew + ms));

        let created = lifetime.created();
        assert!(!LifetimeCalculator::has_expired(&lifetime, skew, created - skew));
        assert!(LifetimeCalculator::has_expired(&lifetime, skew, created - skew - ms));
    }

    #[test]
    fn test_unrepresentable_lifetime_rejected() {
        let clock = Arc::new(FixedClock::new(epoch()));
        let calc = calculator(clock);

        assert!(matches!(
            calc.compute_lifetime(Some(Duration::MAX), Duration::zero()),
            Err(Error::InvalidLifetime(_))
        ));
        assert!(matches!(
            calc.compute_lifetime(Some(Duration::minutes(5)), Duration::MAX),
            Err(Error::InvalidLifetime(_))
        ));
    }

    #[test]
    fn test_huge_skew_saturates() {
        let lifetime = Lifetime::new(epoch(), epoch() + Duration::minutes(5)).unwrap();

        let year = Duration::days(365);

        assert!(!LifetimeCalculator::has_expired(&lifetime, Duration::MAX, epoch() + year));
        assert!(!LifetimeCalculator::has_expired(&lifetime, Duration::MAX, epoch() - year));
    }

    #[test]
    fn test_fixed_clock_advances() {
        let clock = Arc::new(FixedClock::new(epoch()));
        let calc = calculator(clock.clone());
        let lifetime = calc
            .compute_lifetime(Some(Duration::minutes(5)), Duration::seconds(2))
            .unwrap();

        clock.advance(Duration::minutes(5));
        assert!(!calc.is_expired(&lifetime, Duration::seconds(2)));
        clock.advance(Duration::minutes(5));
        assert!(calc.is_expired(&lifetime, Duration::seconds(2)));
    }

    #[test]
    fn test_system_clock_millisecond_precision() {
        let now = SystemClock.now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
