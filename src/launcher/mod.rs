//! Process-spawning facility for engine pools
//!
//! The pool itself runs as a detached background process. Starting and stopping
//! it are fire-and-forget requests that only report coarse success or failure;
//! readiness is observed separately through the pool client.

pub mod ipcluster;

pub use ipcluster::{generate_command, generate_start_args, generate_stop_args, IpclusterLauncher};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors reported by the process-spawning facility
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with status {code:?}: {stderr}")]
    ExitStatus {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Arguments for starting one pool instance in daemonized mode
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub profile: String,
    pub engines: u32,
    pub delay_secs: f64,
    pub cluster_id: Uuid,
    pub log_level: u32,
}

/// Identifies the pool instance to shut down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopRequest {
    pub profile: String,
    pub cluster_id: Uuid,
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Launch the pool detached; returns once the launcher itself has exited.
    async fn start(&self, request: &LaunchRequest) -> Result<(), LaunchError>;

    /// Ask the pool identified by `(profile, cluster_id)` to shut down.
    async fn stop(&self, request: &StopRequest) -> Result<(), LaunchError>;
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================
