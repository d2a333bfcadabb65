use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_ttl_secs")]
    pub ttl_secs: u64,
}

impl CacheConfig {
    fn default_ttl_secs() -> u64 {
        3600
    }
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: Self::default_ttl_secs(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct QueueConfig {
    #[serde(default = "QueueConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "QueueConfig::default_backoff_ms")]
    pub backoff_ms: u64,
}

impl QueueConfig {
    fn default_max_attempts() -> u32 {
        5
    }
    fn default_backoff_ms() -> u64 {
        500
    }
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            backoff_ms: Self::default_backoff_ms(),
        }
    }
}

/// Without an endpoint messages are only logged.
#[derive(Deserialize, Debug, Clone)]
pub struct PushConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "PushConfig::default_retries")]
    pub retries: u32,
    #[serde(default = "PushConfig::default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "PushConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl PushConfig {
    fn default_retries() -> u32 {
        3
    }
    fn default_backoff_ms() -> u64 {
        200
    }
    fn default_timeout_secs() -> u64 {
        10
    }
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            retries: Self::default_retries(),
            backoff_ms: Self::default_backoff_ms(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct MaintenanceConfig {
    #[serde(default = "MaintenanceConfig::default_cache_interval_secs")]
    pub cache_interval_secs: u64,
    /// Events older than this are retired; unset keeps them forever.
    pub event_max_age_secs: Option<u64>,
}

impl MaintenanceConfig {
    fn default_cache_interval_secs() -> u64 {
        60 * 60
    }
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.cache_interval_secs.max(1))
    }
    pub fn event_max_age(&self) -> Option<Duration> {
        self.event_max_age_secs.map(Duration::from_secs)
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cache_interval_secs: Self::default_cache_interval_secs(),
            event_max_age_secs: None,
        }
    }
}
