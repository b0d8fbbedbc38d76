use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ConfigError;
use crate::launcher::{LaunchRequest, StopRequest};

/// Seconds to wait for the pool before giving up
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default verbosity passed to the launcher (WARN)
pub const DEFAULT_LOG_LEVEL: u32 = 30;

/// The `cluster` section of a pipeline config
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Profile naming the controller/engine set to launch and connect to
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Number of engines the pool must reach before it counts as ready
    #[serde(default = "default_cores")]
    pub cores: u32,

    /// Seconds between engine starts
    #[serde(default = "default_delay")]
    pub delay: f64,

    #[serde(default = "default_log_level")]
    pub log_level: u32,

    /// Startup timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_cores() -> u32 {
    1
}

fn default_delay() -> f64 {
    1.0
}

fn default_log_level() -> u32 {
    DEFAULT_LOG_LEVEL
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            cores: default_cores(),
            delay: default_delay(),
            log_level: default_log_level(),
            timeout: default_timeout(),
        }
    }
}

impl ClusterConfig {
    pub fn new(profile: impl Into<String>, cores: u32) -> Self {
        Self {
            profile: profile.into(),
            cores,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn with_delay(mut self, secs: f64) -> Self {
        self.delay = secs;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cores == 0 {
            return Err(ConfigError::Invalid(
                "cluster.cores must be at least 1".to_string(),
            ));
        }
        if !self.delay.is_finite() || self.delay < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "cluster.delay must be a non-negative number, got {}",
                self.delay
            )));
        }
        if self.profile.is_empty() {
            return Err(ConfigError::Invalid(
                "cluster.profile must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn launch_request(&self, cluster_id: Uuid) -> LaunchRequest {
        LaunchRequest {
            profile: self.profile.clone(),
            engines: self.cores,
            delay_secs: self.delay,
            cluster_id,
            log_level: self.log_level,
        }
    }

    pub fn stop_request(&self, cluster_id: Uuid) -> StopRequest {
        StopRequest {
            profile: self.profile.clone(),
            cluster_id,
        }
    }
}
