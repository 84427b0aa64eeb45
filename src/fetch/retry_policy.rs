//! Attempt ceiling and per-failure backoff for detail page fetches.

use std::time::Duration;

use crate::config::FetchConfig;
use crate::pacing::{Jitter, JitterRange};

const RATE_LIMIT_JITTER: JitterRange = JitterRange::new(0.5, 2.0);
const TRANSPORT_JITTER: JitterRange = JitterRange::new(0.3, 1.2);
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// How a failed attempt is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// HTTP 429, with the server's `Retry-After` when it sent one.
    RateLimited { retry_after: Option<Duration> },
    /// Connection/read failures and unexpected statuses.
    Transport,
}

/// Wait before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Server-specified; honored as is.
    Exact(Duration),
    Jittered { base: Duration, jitter: JitterRange },
}

impl Backoff {
    pub fn resolve(self, jitter: &mut impl Jitter) -> Duration {
        match self {
            Self::Exact(wait) => wait,
            Self::Jittered { base, jitter: range } => base + jitter.sample(range),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    rate_limit_base: Duration,
    rate_limit_cap: Duration,
    transport_step: Duration,
    transport_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            rate_limit_base: Duration::from_secs(config.rate_limit_base_secs),
            rate_limit_cap: Duration::from_secs(config.rate_limit_cap_secs),
            transport_step: Duration::from_secs(config.transport_step_secs),
            transport_cap: Duration::from_secs(config.transport_cap_secs),
        }
    }

    #[cfg(test)]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff after the failed `attempt` (1-based).
    pub fn backoff(&self, class: FailureClass, attempt: u32) -> Backoff {
        match class {
            FailureClass::RateLimited {
                retry_after: Some(wait),
            } => Backoff::Exact(wait),
            FailureClass::RateLimited { retry_after: None } => Backoff::Jittered {
                base: Self::rate_limit_delay(self.rate_limit_base, self.rate_limit_cap, attempt),
                jitter: RATE_LIMIT_JITTER,
            },
            FailureClass::Transport => Backoff::Jittered {
                base: self
                    .transport_step
                    .checked_mul(attempt.max(1))
                    .unwrap_or(self.transport_cap)
                    .min(self.transport_cap),
                jitter: TRANSPORT_JITTER,
            },
        }
    }

    fn rate_limit_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
        let exponent = attempt.saturating_add(2).min(MAX_BACKOFF_EXPONENT);
        let multiplier = 1u32 << exponent;
        base.checked_mul(multiplier).unwrap_or(cap).min(cap)
    }
}

/// Parses a `Retry-After` value given in whole seconds. HTTP dates are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    value.parse::<u64>().ok().map(Duration::from_secs)
}
