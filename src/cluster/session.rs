//! Cluster session - the handle a pipeline driver acquires once per run
//!
//! A session owns exactly one [`PoolController`] and walks it through
//! `Idle -> Starting -> Ready -> Stopped`, or ends in `Failed` when the pool
//! cannot be launched or does not come up in time. Sessions are single-use.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::controller::{ClusterError, PoolController};
use crate::client::{ClientError, DistributionView, PoolClient, PoolConnector};
use crate::config::PipelineConfig;
use crate::launcher::ProcessLauncher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Ready,
    Failed,
    Stopped,
}

pub struct ClusterSession {
    launcher: Arc<dyn ProcessLauncher>,
    connector: Arc<dyn PoolConnector>,
    state: SessionState,
    controller: Option<PoolController>,
    client: Option<Arc<dyn PoolClient>>,
    view: Option<Arc<dyn DistributionView>>,
}

impl ClusterSession {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, connector: Arc<dyn PoolConnector>) -> Self {
        Self {
            launcher,
            connector,
            state: SessionState::Idle,
            controller: None,
            client: None,
            view: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id of the pool this session launched, if it is running
    pub fn cluster_id(&self) -> Option<Uuid> {
        self.controller.as_ref().map(PoolController::cluster_id)
    }

    /// Launch the pool and wait for it to come up.
    ///
    /// The cluster config is validated first; an invalid config launches
    /// nothing and leaves the session `Idle`. Any later failure leaves the
    /// session `Failed` with the pool stopped.
    pub async fn start(&mut self, config: &PipelineConfig) -> Result<(), ClusterError> {
        if self.state != SessionState::Idle {
            return Err(ClusterError::InvalidState(self.state));
        }
        config.cluster.validate()?;

        self.state = SessionState::Starting;
        // owned by the session while Starting, see `abort`
        let controller = self.controller.insert(PoolController::new(
            config.cluster.clone(),
            self.launcher.clone(),
            self.connector.clone(),
        ));

        match bring_up(controller).await {
            Ok((client, view)) => {
                self.client = Some(client);
                self.view = Some(view);
                self.state = SessionState::Ready;
                info!("Cluster session ready.");
                Ok(())
            }
            Err(e) => {
                self.controller = None;
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Like [`start`](Self::start), but gives up when `shutdown` resolves first.
    ///
    /// An interrupted start stops the pool and leaves the session `Failed`.
    /// Returns `Ok(false)` when interrupted.
    pub async fn start_until<S>(
        &mut self,
        config: &PipelineConfig,
        shutdown: S,
    ) -> Result<bool, ClusterError>
    where
        S: Future,
    {
        let started = tokio::select! {
            result = self.start(config) => Some(result),
            _ = shutdown => None,
        };

        match started {
            Some(result) => result.map(|_| true),
            None => {
                warn!("Cluster startup interrupted.");
                self.abort().await;
                Ok(false)
            }
        }
    }

    /// Stop a pool whose start was cut short. A no-op unless `Starting`.
    pub async fn abort(&mut self) {
        if self.state != SessionState::Starting {
            debug!("Ignoring abort in state {:?}", self.state);
            return;
        }

        if let Some(mut controller) = self.controller.take() {
            controller.discard_client().await;
            controller.stop().await;
        }
        self.state = SessionState::Failed;
    }

    pub fn distribution_view(&self) -> Result<Arc<dyn DistributionView>, ClusterError> {
        match (&self.state, &self.view) {
            (SessionState::Ready, Some(view)) => Ok(view.clone()),
            _ => Err(ClusterError::SessionNotReady),
        }
    }

    pub fn client(&self) -> Result<Arc<dyn PoolClient>, ClusterError> {
        match (&self.state, &self.client) {
            (SessionState::Ready, Some(client)) => Ok(client.clone()),
            _ => Err(ClusterError::SessionNotReady),
        }
    }

    /// Tear the pool down. A no-op unless the session is `Ready`.
    pub async fn stop(&mut self) {
        if self.state != SessionState::Ready {
            debug!("Ignoring stop in state {:?}", self.state);
            return;
        }

        self.view = None;
        self.client = None;
        if let Some(mut controller) = self.controller.take() {
            controller.discard_client().await;
            controller.stop().await;
        }
        self.state = SessionState::Stopped;
        info!("Cluster session stopped.");
    }

    /// Run `f` against a ready pool, tearing it down on every exit path.
    ///
    /// The pool is stopped after `f` completes, including when it panics; the
    /// panic is resumed once teardown is done.
    pub async fn scoped<F, Fut, T>(
        config: &PipelineConfig,
        launcher: Arc<dyn ProcessLauncher>,
        connector: Arc<dyn PoolConnector>,
        f: F,
    ) -> Result<T, ClusterError>
    where
        F: FnOnce(Arc<dyn DistributionView>) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut session = Self::new(launcher, connector);
        session.start(config).await?;

        let view = match session.distribution_view() {
            Ok(view) => view,
            Err(e) => {
                session.stop().await;
                return Err(e);
            }
        };

        let outcome = AssertUnwindSafe(f(view)).catch_unwind().await;
        session.stop().await;

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Launch, wait for readiness, and fetch the session handles.
/// The pool is stopped on every failure path.
async fn bring_up(
    controller: &mut PoolController,
) -> Result<(Arc<dyn PoolClient>, Arc<dyn DistributionView>), ClusterError> {
    if let Err(e) = controller.start().await {
        error!("Failed to launch cluster {}: {}", controller.cluster_id(), e);
        // the launcher may have got partway before failing
        controller.stop().await;
        return Err(e.into());
    }

    // await_ready stops the pool itself on every failure path
    controller.await_ready().await?;

    match connect_handles(controller).await {
        Ok(handles) => Ok(handles),
        Err(e) => {
            error!("Failed to connect to the cluster: {}", e);
            controller.stop().await;
            Err(e.into())
        }
    }
}

async fn connect_handles(
    controller: &mut PoolController,
) -> Result<(Arc<dyn PoolClient>, Arc<dyn DistributionView>), ClientError> {
    let client = controller.client().await?;
    let view = controller.view().await?;
    Ok((client, view))
}

impl Drop for ClusterSession {
    fn drop(&mut self) {
        if !matches!(self.state, SessionState::Starting | SessionState::Ready) {
            return;
        }
        let Some(controller) = self.controller.take() else {
            return;
        };

        warn!(
            "Cluster session dropped while {:?}; stopping cluster {}",
            self.state,
            controller.cluster_id()
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    controller.stop().await;
                });
            }
            Err(_) => error!(
                "No runtime available to stop cluster {}",
                controller.cluster_id()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockConnector, Probe};
    use crate::config::ClusterConfig;
    use crate::launcher::mock::MockLauncher;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    fn config(cores: u32, timeout: u64) -> PipelineConfig {
        PipelineConfig::from_cluster(ClusterConfig::new("default", cores).with_timeout(timeout))
    }

    #[tokio::test(start_paused = true)]
    async fn test_engines_join_within_timeout() {
        let launcher = MockLauncher::new();
        let connector = MockConnector::new(vec![Probe::Engines(2), Probe::Engines(4)]);
        let mut session = ClusterSession::new(launcher.clone(), connector.clone());

        let started = Instant::now();
        session.start(&config(4, 10)).await.unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert!(started.elapsed() <= Duration::from_secs(10));
        assert!(session.distribution_view().is_ok());
        assert!(session.client().is_ok());
        assert_eq!(launcher.start_count(), 1);
        assert_eq!(launcher.stop_count(), 0);

        let view = session.distribution_view().unwrap();
        assert!(view.is_blocking());
        assert_eq!(view.submit(json!({"x": 1})).await.unwrap(), json!({"x": 1}));

        session.stop().await;
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(launcher.stop_count(), 1);
        assert_eq!(connector.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engines_never_join() {
        let launcher = MockLauncher::new();
        let connector = MockConnector::new(vec![Probe::Engines(1), Probe::Engines(2)]);
        let mut session = ClusterSession::new(launcher.clone(), connector);

        let started = Instant::now();
        let result = session.start(&config(4, 10)).await;

        assert!(matches!(result, Err(ClusterError::Timeout { .. })));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(started.elapsed() <= Duration::from_secs(15));
        assert_eq!(launcher.stop_count(), 1);

        // stopping a failed session does not issue a second request
        session.stop().await;
        assert_eq!(launcher.stop_count(), 1);
        assert!(matches!(
            session.distribution_view(),
            Err(ClusterError::SessionNotReady)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_skips_polling() {
        let launcher = MockLauncher::failing();
        let connector = MockConnector::with_engines(4);
        let mut session = ClusterSession::new(launcher.clone(), connector.clone());

        let started = Instant::now();
        let result = session.start(&config(4, 10)).await;

        assert!(matches!(result, Err(ClusterError::Launch(_))));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(connector.connect_count(), 0);
        assert_eq!(connector.script.requests.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_view_before_start() {
        let session = ClusterSession::new(MockLauncher::new(), MockConnector::with_engines(1));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(matches!(
            session.distribution_view(),
            Err(ClusterError::SessionNotReady)
        ));
        assert!(session.cluster_id().is_none());
    }

    #[tokio::test]
    async fn test_stop_from_idle_is_noop() {
        let launcher = MockLauncher::new();
        let mut session = ClusterSession::new(launcher.clone(), MockConnector::with_engines(1));
        session.stop().await;
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(launcher.stop_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_is_single_use() {
        let launcher = MockLauncher::new();
        let mut session = ClusterSession::new(launcher.clone(), MockConnector::with_engines(2));
        let cfg = config(2, 30);

        session.start(&cfg).await.unwrap();
        assert!(matches!(
            session.start(&cfg).await,
            Err(ClusterError::InvalidState(SessionState::Ready))
        ));

        session.stop().await;
        session.stop().await;
        assert_eq!(launcher.stop_count(), 1);
        assert!(matches!(
            session.start(&cfg).await,
            Err(ClusterError::InvalidState(SessionState::Stopped))
        ));
        assert_eq!(launcher.start_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scoped_stops_after_success() {
        let launcher = MockLauncher::new();
        let result = ClusterSession::scoped(
            &config(2, 30),
            launcher.clone(),
            MockConnector::with_engines(2),
            |view| async move { view.submit(json!("work")).await },
        )
        .await
        .unwrap();

        assert_eq!(result.unwrap(), json!("work"));
        assert_eq!(launcher.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scoped_stops_after_panic() {
        let launcher = MockLauncher::new();
        let scoped_launcher = launcher.clone();

        let handle = tokio::spawn(async move {
            ClusterSession::scoped(
                &config(1, 30),
                scoped_launcher,
                MockConnector::with_engines(1),
                |_view| async move { panic!("pipeline step failed") },
            )
            .await
        });

        let join = handle.await;
        assert!(join.unwrap_err().is_panic());
        assert_eq!(launcher.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scoped_propagates_start_failure() {
        let launcher = MockLauncher::failing();
        let result = ClusterSession::scoped(
            &config(1, 30),
            launcher.clone(),
            MockConnector::with_engines(1),
            |_view| async move { unreachable!("body must not run") },
        )
        .await;

        assert!(matches!(result, Err(ClusterError::Launch(_))));
    }

    #[tokio::test]
    async fn test_invalid_config_launches_nothing() {
        let launcher = MockLauncher::new();
        let mut session = ClusterSession::new(launcher.clone(), MockConnector::with_engines(4));

        let result = session.start(&config(0, 10)).await;

        assert!(matches!(result, Err(ClusterError::Config(_))));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(launcher.start_count(), 0);
        assert_eq!(launcher.stop_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_until_interrupted_stops_pool() {
        let launcher = MockLauncher::new();
        let connector = MockConnector::with_engines(0);
        let mut session = ClusterSession::new(launcher.clone(), connector.clone());

        let started = session
            .start_until(&config(4, 300), tokio::time::sleep(Duration::from_secs(12)))
            .await
            .unwrap();

        assert!(!started);
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(launcher.start_count(), 1);
        assert_eq!(launcher.stop_count(), 1);
        assert_eq!(connector.live_count(), 0);
        assert!(matches!(
            session.distribution_view(),
            Err(ClusterError::SessionNotReady)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_until_completes_before_shutdown() {
        let launcher = MockLauncher::new();
        let mut session = ClusterSession::new(launcher.clone(), MockConnector::with_engines(2));

        let started = session
            .start_until(&config(2, 30), std::future::pending::<()>())
            .await
            .unwrap();

        assert!(started);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(launcher.stop_count(), 0);

        // abort only applies to an unfinished start
        session.abort().await;
        assert_eq!(session.state(), SessionState::Ready);
        session.stop().await;
        assert_eq!(launcher.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_while_starting_stops_cluster() {
        let launcher = MockLauncher::new();
        let mut session = ClusterSession::new(launcher.clone(), MockConnector::with_engines(0));

        let cut_short =
            tokio::time::timeout(Duration::from_secs(7), session.start(&config(4, 300))).await;
        assert!(cut_short.is_err());
        assert_eq!(session.state(), SessionState::Starting);
        assert!(session.cluster_id().is_some());

        drop(session);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(launcher.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_while_ready_stops_cluster() {
        let launcher = MockLauncher::new();
        {
            let mut session =
                ClusterSession::new(launcher.clone(), MockConnector::with_engines(1));
            session.start(&config(1, 30)).await.unwrap();
        }
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(launcher.stop_count(), 1);
    }
}
