//! Sleep and jitter seams for pagination delays, retry backoff and inter-set pauses.

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Blocks the current thread for a given duration.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Sleeper backed by `std::thread::sleep`.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Closed range of extra seconds added on top of a base wait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl JitterRange {
    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }
}

/// Source of random jitter.
pub trait Jitter {
    fn sample(&mut self, range: JitterRange) -> Duration;
}

/// Uniform jitter from a seeded `StdRng`.
pub struct RandomJitter {
    rng: StdRng,
}

impl RandomJitter {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for RandomJitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Jitter for RandomJitter {
    fn sample(&mut self, range: JitterRange) -> Duration {
        let low = range.min_secs.max(0.0);
        let high = range.max_secs.max(low);
        if high <= low {
            return Duration::from_secs_f64(low);
        }
        Duration::from_secs_f64(self.rng.gen_range(low..=high))
    }
}

#[cfg(test)]
pub mod testing {
    use std::time::Duration;

    use super::{Jitter, JitterRange, Sleeper};

    /// Records every requested sleep instead of blocking.
    #[derive(Default)]
    pub struct RecordingSleeper {
        pub slept: Vec<Duration>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&mut self, duration: Duration) {
            self.slept.push(duration);
        }
    }

    /// Always returns the low end of the range.
    pub struct LowJitter;

    impl Jitter for LowJitter {
        fn sample(&mut self, range: JitterRange) -> Duration {
            Duration::from_secs_f64(range.min_secs.max(0.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Jitter, JitterRange, RandomJitter};

    #[test]
    fn test_random_jitter_stays_inside_range() {
        let mut jitter = RandomJitter::new();
        let range = JitterRange::new(0.3, 1.2);
        for _ in 0..200 {
            let secs = jitter.sample(range).as_secs_f64();
            assert!(
                secs >= 0.3 - 1e-6 && secs <= 1.2 + 1e-6,
                "jitter {secs} out of range"
            );
        }
    }

    #[test]
    fn test_random_jitter_collapsed_range_returns_low_end() {
        let mut jitter = RandomJitter::new();
        let secs = jitter.sample(JitterRange::new(0.5, 0.5)).as_secs_f64();
        assert_eq!(secs, 0.5);
    }
}
