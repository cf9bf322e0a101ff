//! Time keeping for hold timestamps, release timeouts and the repeat guard.

/// Microsecond timestamp.
pub type Instant = fugit::TimerInstantU64<1_000_000>;

/// Microsecond span between two [`Instant`]s.
pub type Duration = fugit::MicrosDurationU64;

/// Monotonic time source.
///
/// Blocking waits go through `embedded_hal::delay::DelayNs`; the clock only
/// has to tell how much time those waits (and everything else) took.
pub trait Clock {
    fn now(&mut self) -> Instant;
}

impl<T: Clock + ?Sized> Clock for &mut T {
    fn now(&mut self) -> Instant {
        T::now(self)
    }
}

/// Time elapsed from `earlier` to `later`, saturating at zero.
pub(crate) fn elapsed(earlier: Instant, later: Instant) -> Duration {
    later
        .checked_duration_since(earlier)
        .unwrap_or(Duration::from_ticks(0))
}
