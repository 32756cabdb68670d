//! Queue and task configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::queue::RetryPolicy;

/// Queue-level configuration.
///
/// ```ignore
/// let config = QueueConfig::from_json(r#"{ "concurrency": 4 }"#)?;
/// let queue = TaskQueue::with_config(config)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of tasks running at once. `None` means unbounded.
    pub concurrency: Option<usize>,
}

impl QueueConfig {
    pub fn unbounded() -> Self {
        Self { concurrency: None }
    }

    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: Some(concurrency),
        }
    }

    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.concurrency {
            Some(0) => Err(ConfigError::ZeroConcurrency),
            _ => Ok(()),
        }
    }

    /// Effective concurrency limit.
    pub fn limit(&self) -> usize {
        self.concurrency.unwrap_or(usize::MAX)
    }
}

/// Per-task options for `TaskQueue::add_with`.
///
/// Defaults: priority 0, no retries, no timeout, retries run back-to-back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOptions {
    /// Higher runs sooner. Only affects tasks still waiting for a slot.
    pub priority: i64,

    /// Extra attempts allowed after the first failure.
    pub retries: u32,

    /// Per-attempt deadline.
    pub timeout: Option<Duration>,

    /// Delay between attempts. `None` retries immediately.
    pub backoff: Option<RetryPolicy>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_ms(self, millis: u64) -> Self {
        self.timeout(Duration::from_millis(millis))
    }

    pub fn backoff(mut self, policy: RetryPolicy) -> Self {
        self.backoff = Some(policy);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout);
        }
        if let Some(policy) = &self.backoff {
            policy.validate()?;
        }
        Ok(())
    }
}
