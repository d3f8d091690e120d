//! # Jitter policy for reconnect delays.
//!
//! [`JitterPolicy`] optionally randomizes backoff delays so that many clients
//! reconnecting to the same panel do not retry in lockstep.
//!
//! - [`JitterPolicy::None`]: no randomization, deterministic delays (default)
//! - [`JitterPolicy::Randomized`]: delay grows by a random share in `[0, factor]`
//!
//! There is exactly one supervised connection per process, so the default is
//! [`JitterPolicy::None`].

use rand::Rng;
use std::time::Duration;

/// Policy controlling randomization of retry delays.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum JitterPolicy {
    /// No jitter: use exact backoff delay.
    #[default]
    None,

    /// Randomized jitter: `delay + delay × random[0, factor]`, capped by the caller.
    ///
    /// A `factor` of `0.0` behaves like [`JitterPolicy::None`].
    Randomized {
        /// Upper bound of the random share added to the delay.
        factor: f64,
    },
}

impl JitterPolicy {
    /// Applies jitter to `delay` and clamps the result to `max`.
    pub fn apply(&self, delay: Duration, max: Duration) -> Duration {
        match *self {
            JitterPolicy::None => delay.min(max),
            JitterPolicy::Randomized { factor } => Self::randomized(delay, factor).min(max),
        }
    }

    /// True when the policy never alters a delay.
    pub fn is_deterministic(&self) -> bool {
        match *self {
            JitterPolicy::None => true,
            JitterPolicy::Randomized { factor } => !(factor.is_finite() && factor > 0.0),
        }
    }

    fn randomized(delay: Duration, factor: f64) -> Duration {
        if !(factor.is_finite() && factor > 0.0) || delay.is_zero() {
            return delay;
        }
        let mut rng = rand::rng();
        let share: f64 = rng.random_range(0.0..=factor);
        let extra = delay.as_secs_f64() * share;
        if !extra.is_finite() {
            return delay;
        }
        delay.saturating_add(Duration::from_secs_f64(extra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_identity_below_max() {
        let d = Duration::from_millis(1500);
        assert_eq!(JitterPolicy::None.apply(d, Duration::from_secs(30)), d);
    }

    #[test]
    fn test_zero_factor_is_deterministic() {
        let jitter = JitterPolicy::Randomized { factor: 0.0 };
        assert!(jitter.is_deterministic());
        let d = Duration::from_secs(2);
        assert_eq!(jitter.apply(d, Duration::from_secs(30)), d);
    }

    #[test]
    fn test_randomized_bounds() {
        let jitter = JitterPolicy::Randomized { factor: 0.5 };
        let d = Duration::from_secs(2);
        for _ in 0..200 {
            let out = jitter.apply(d, Duration::from_secs(30));
            assert!(out >= d, "{out:?} below base");
            assert!(out <= Duration::from_secs(3), "{out:?} above base × 1.5");
        }
    }

    #[test]
    fn test_randomized_never_exceeds_max() {
        let jitter = JitterPolicy::Randomized { factor: 10.0 };
        for _ in 0..200 {
            let out = jitter.apply(Duration::from_secs(4), Duration::from_secs(5));
            assert!(out <= Duration::from_secs(5));
        }
    }
}
