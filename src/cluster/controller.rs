//! Pool Controller - owns the lifecycle of one pool instance
//!
//! The controller is responsible for:
//! - Launching the pool as a detached process
//! - Polling the pool client until enough engines have registered
//! - Caching at most one client and one distribution view
//! - Requesting shutdown of the pool it launched

use std::sync::Arc;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::session::SessionState;
use super::{POLL_INTERVAL, POLL_INTERVAL_SECS};
use crate::client::{ClientError, DistributionView, PoolClient, PoolConnector};
use crate::config::{ClusterConfig, ConfigError};
use crate::launcher::{LaunchError, ProcessLauncher};

/// Errors that end a cluster session
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Failed to launch cluster: {0}")]
    Launch(#[from] LaunchError),

    #[error("Cluster startup timed out after {waited_secs}s (timeout {timeout_secs}s)")]
    Timeout { waited_secs: u64, timeout_secs: u64 },

    #[error("Cluster session is not ready")]
    SessionNotReady,

    #[error("Cannot start a cluster session in state {0:?}")]
    InvalidState(SessionState),

    #[error("Pool client error: {0}")]
    Client(#[from] ClientError),

    #[error("Invalid cluster config: {0}")]
    Config(#[from] ConfigError),
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Engines still to register before `target` is reached; 0 once it is
pub fn missing_engines(target: u32, up: usize) -> usize {
    (target as usize).saturating_sub(up)
}

/// Manages one pool instance: launch, readiness, and shutdown
pub struct PoolController {
    config: ClusterConfig,

    /// Distinguishes this pool from others launched with the same profile
    cluster_id: Uuid,

    launcher: Arc<dyn ProcessLauncher>,
    connector: Arc<dyn PoolConnector>,

    client: Option<Arc<dyn PoolClient>>,
    view: Option<Arc<dyn DistributionView>>,
}

impl PoolController {
    pub fn new(
        config: ClusterConfig,
        launcher: Arc<dyn ProcessLauncher>,
        connector: Arc<dyn PoolConnector>,
    ) -> Self {
        Self {
            config,
            cluster_id: Uuid::new_v4(),
            launcher,
            connector,
            client: None,
            view: None,
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn cluster_id(&self) -> Uuid {
        self.cluster_id
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    pub fn has_view(&self) -> bool {
        self.view.is_some()
    }

    // =========================================================================
    // Process lifecycle
    // =========================================================================

    /// Launch the pool in the background. Does not wait for engines.
    pub async fn start(&self) -> Result<(), LaunchError> {
        info!(
            "Starting the cluster with {} nodes (profile={}, cluster_id={})",
            self.config.cores, self.config.profile, self.cluster_id
        );
        self.launcher
            .start(&self.config.launch_request(self.cluster_id))
            .await
    }

    /// Request shutdown of this pool.
    ///
    /// Safe whether or not `start` ran or succeeded; a failed stop request is
    /// only logged.
    pub async fn stop(&self) {
        info!(
            "Stopping cluster (profile={}, cluster_id={})",
            self.config.profile, self.cluster_id
        );
        if let Err(e) = self
            .launcher
            .stop(&self.config.stop_request(self.cluster_id))
            .await
        {
            warn!("Stop request for cluster {} failed: {}", self.cluster_id, e);
        }
    }

    /// Poll until the pool is ready or the configured timeout has passed.
    ///
    /// Each cycle sleeps for the poll interval, then probes readiness. On
    /// timeout, or on a probe error that is not a connection failure, the pool
    /// is stopped before the error is returned.
    pub async fn await_ready(&mut self) -> Result<(), ClusterError> {
        let timeout_secs = self.config.timeout;
        let mut waited_secs = 0u64;

        loop {
            sleep(POLL_INTERVAL).await;
            waited_secs += POLL_INTERVAL_SECS;

            match self.is_ready().await {
                Ok(true) => {
                    info!("Cluster up after {}s.", waited_secs);
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    error!("Readiness probe failed: {}", e);
                    self.stop().await;
                    return Err(e);
                }
            }

            if waited_secs > timeout_secs {
                error!("Cluster startup timed out.");
                self.stop().await;
                return Err(ClusterError::Timeout {
                    waited_secs,
                    timeout_secs,
                });
            }
        }
    }

    /// Check whether the target number of engines is visible.
    ///
    /// A controller that cannot be reached yet, or a short roster, is reported
    /// as not ready. In both cases the current client is discarded so the next
    /// probe starts from a fresh connection.
    pub async fn is_ready(&mut self) -> Result<bool, ClusterError> {
        let roster = match self.client().await {
            Ok(client) => client.engine_ids().await,
            Err(e) => Err(e),
        };

        let up = match roster {
            Ok(ids) => ids.len(),
            Err(e) if e.is_unreachable() => {
                info!("Waiting for the controller to come up.");
                debug!("Controller probe: {}", e);
                self.discard_client().await;
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let missing = missing_engines(self.config.cores, up);
        if missing > 0 {
            info!("Waiting for {} engines to come up.", missing);
            match self.recreate_client().await {
                Ok(_) => {}
                Err(e) if e.is_unreachable() => {
                    debug!("Reconnect deferred: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
            return Ok(false);
        }

        Ok(true)
    }

    // =========================================================================
    // Client and view
    // =========================================================================

    /// Return the cached client, connecting one if there is none
    pub async fn client(&mut self) -> Result<Arc<dyn PoolClient>, ClientError> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        let client = self.connector.connect(&self.config.profile).await?;
        self.client = Some(client.clone());
        Ok(client)
    }

    /// Close the current client and connect a replacement for the same profile
    pub async fn recreate_client(&mut self) -> Result<Arc<dyn PoolClient>, ClientError> {
        self.discard_client().await;
        self.client().await
    }

    /// Close and forget the cached client along with any view derived from it
    pub async fn discard_client(&mut self) {
        self.view = None;
        if let Some(client) = self.client.take() {
            client.close().await;
        }
    }

    /// Return the cached blocking, load-balanced view, creating it on first use
    pub async fn view(&mut self) -> Result<Arc<dyn DistributionView>, ClientError> {
        if let Some(view) = &self.view {
            return Ok(view.clone());
        }

        let client = self.client().await?;
        let mut view = client.load_balanced_view();
        view.set_blocking(true);

        let view: Arc<dyn DistributionView> = Arc::from(view);
        self.view = Some(view.clone());
        Ok(view)
    }
}
