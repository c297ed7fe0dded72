//! Per-task retry policy with backoff

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay every time
    Constant,
    /// base * attempt
    Linear,
    /// base * 2^(attempt - 1)
    #[default]
    Exponential,
}

/// Backoff configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    #[serde(default)]
    pub strategy: BackoffStrategy,

    /// Delay after the first failed attempt
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,

    /// Upper bound on a single delay
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

fn default_base_ms() -> u64 {
    1000
}

fn default_max_ms() -> u64 {
    60_000
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::default(),
            base_ms: default_base_ms(),
            max_ms: default_max_ms(),
        }
    }
}

impl Backoff {
    /// No delay between attempts
    pub fn none() -> Self {
        Self {
            strategy: BackoffStrategy::Constant,
            base_ms: 0,
            max_ms: 0,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: usize) -> Duration {
        let attempt = attempt.max(1) as u64;
        let millis = match self.strategy {
            BackoffStrategy::Constant => self.base_ms,
            BackoffStrategy::Linear => self.base_ms.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 1u64.checked_shl((attempt - 1) as u32).unwrap_or(u64::MAX);
                self.base_ms.saturating_mul(factor)
            }
        };
        Duration::from_millis(millis.min(self.max_ms))
    }
}

/// Maximum attempts plus backoff for transient task failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total adapter invocations allowed, including the first (>= 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    #[serde(default)]
    pub backoff: Backoff,
}

fn default_max_attempts() -> usize {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Policy allowing `retries` retries after the first attempt
    pub fn with_retries(retries: usize) -> Self {
        Self {
            max_attempts: retries + 1,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Attempts actually made; a zero configuration still runs once
    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Whether another attempt is allowed after `attempt` failed
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.attempts()
    }
}
