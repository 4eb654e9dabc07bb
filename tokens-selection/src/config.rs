use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokens_core::error::TokenError;

/// Tuning for the selection retry loop and the reservations it takes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Attempts before giving up with `SelectionContention`
    pub max_retries: u32,

    /// Base back-off between attempts
    pub retry_sleep_ms: u64,

    /// Upper bound on the back-off; half of it caps the un-jittered sleep
    pub retry_cap_ms: u64,

    /// Candidates fetched per vault query
    pub page_size: usize,

    /// Soft expiry stamped on every reservation; `None` never expires
    pub soft_lock_timeout_ms: Option<u64>,

    /// Wall-clock budget for one selection call
    pub deadline_ms: Option<u64>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_retries: 8,
            retry_sleep_ms: 100,
            retry_cap_ms: 2000,
            page_size: 200,
            soft_lock_timeout_ms: Some(5 * 60 * 1000),
            deadline_ms: None,
        }
    }
}

impl SelectionConfig {
    /// Parse and validate a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, TokenError> {
        let config: SelectionConfig = serde_json::from_str(json)?;
        config.validate()?;
        log::info!(
            "Loaded selection config: max_retries={}, page_size={}, soft_lock_timeout_ms={:?}",
            config.max_retries,
            config.page_size,
            config.soft_lock_timeout_ms
        );
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, TokenError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read selection config {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), TokenError> {
        if self.max_retries == 0 {
            return Err(TokenError::InvalidConfig("max_retries must be at least 1".to_string()));
        }
        if self.page_size == 0 {
            return Err(TokenError::InvalidConfig("page_size must be at least 1".to_string()));
        }
        if self.retry_cap_ms < self.retry_sleep_ms {
            return Err(TokenError::InvalidConfig(format!(
                "retry_cap_ms ({}) is below retry_sleep_ms ({})",
                self.retry_cap_ms, self.retry_sleep_ms
            )));
        }
        if self.soft_lock_timeout_ms == Some(0) {
            return Err(TokenError::InvalidConfig(
                "soft_lock_timeout_ms must be positive when set".to_string(),
            ));
        }
        // Stored as a signed 64-bit column by the SQLite vault
        if let Some(timeout) = self.soft_lock_timeout_ms.filter(|t| *t > i64::MAX as u64) {
            return Err(TokenError::InvalidConfig(format!(
                "soft_lock_timeout_ms ({}) exceeds {}",
                timeout,
                i64::MAX
            )));
        }
        Ok(())
    }

    /// Sleep before retry number `retry_count` (zero based), before jitter
    pub fn base_backoff(&self, retry_count: u32) -> Duration {
        let shifted = self
            .retry_sleep_ms
            .checked_shl(retry_count)
            .filter(|v| v >> retry_count == self.retry_sleep_ms)
            .unwrap_or(u64::MAX);
        Duration::from_millis(shifted.min(self.retry_cap_ms / 2))
    }

    /// `base_backoff` scaled by `1 + jitter`, with `jitter` in `[0, 1)`
    pub fn backoff(&self, retry_count: u32, jitter: f64) -> Duration {
        self.base_backoff(retry_count).mul_f64(1.0 + jitter.clamp(0.0, 1.0))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}
