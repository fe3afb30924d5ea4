use rand::Rng;
use std::time::Duration;

/// Decides whether and when the client reconnects after a disconnection
///
/// Strategies are stateless: the client owns the attempt counter and
/// resets it once a connection has proven stable.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before reconnect attempt `attempt` (0-indexed); `None` gives up
    fn next_delay(&self, attempt: usize) -> Option<Duration>;

    fn should_reconnect(&self, attempt: usize) -> bool {
        self.next_delay(attempt).is_some()
    }
}

/// Optional cap on the number of reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttemptLimit(Option<usize>);

impl AttemptLimit {
    pub const UNLIMITED: AttemptLimit = AttemptLimit(None);

    pub fn at_most(attempts: usize) -> Self {
        AttemptLimit(Some(attempts))
    }

    #[inline]
    pub fn allows(&self, attempt: usize) -> bool {
        self.0.map_or(true, |cap| attempt < cap)
    }
}

impl From<Option<usize>> for AttemptLimit {
    fn from(cap: Option<usize>) -> Self {
        AttemptLimit(cap)
    }
}

/// Doubling delay from `initial`, capped at `cap`
///
/// With a non-zero jitter ratio the delay is drawn uniformly from
/// `[delay * (1 - jitter), delay]` so relays that lose the same upstream
/// do not all come back in the same instant.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    cap: Duration,
    limit: AttemptLimit,
    jitter: f64,
}

impl ExponentialBackoff {
    /// `max_attempts` of `None` retries forever
    pub fn new(initial: Duration, cap: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            initial,
            cap,
            limit: max_attempts.into(),
            jitter: 0.0,
        }
    }

    /// Jitter ratio, clamped to `[0, 1]`; non-finite input disables it
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    /// Delay before jitter
    fn ceiling(&self, attempt: usize) -> Duration {
        let shift = u32::try_from(attempt).unwrap_or(u32::MAX);
        let factor = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .map_or(self.cap, |delay| delay.min(self.cap))
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.limit.allows(attempt) {
            return None;
        }
        let ceiling = self.ceiling(attempt);
        if self.jitter == 0.0 || ceiling.is_zero() {
            return Some(ceiling);
        }
        let floor = ceiling.mul_f64(1.0 - self.jitter);
        Some(rand::thread_rng().gen_range(floor..=ceiling))
    }
}

/// Same delay before every attempt
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    limit: AttemptLimit,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            delay,
            limit: max_attempts.into(),
        }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        self.limit.allows(attempt).then_some(self.delay)
    }
}

/// The client exits after the first disconnection
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _attempt: usize) -> Option<Duration> {
        None
    }
}
