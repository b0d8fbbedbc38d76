//! # Cluster lifecycle
//!
//! Launches an engine pool, waits for it to become ready, and hands out a
//! load-balanced view for distributing work.
//!
//! ```text
//!   ClusterSession ──owns──▶ PoolController ──start/stop──▶ ProcessLauncher
//!         │                        │
//!         │                        └──roster/view──▶ PoolConnector / PoolClient
//!         ▼
//!   DistributionView (blocking, load-balanced)
//! ```
//!
//! Readiness is inferred purely by polling the pool client; the launched
//! process never signals back.

pub mod controller;
pub mod session;

pub use controller::{missing_engines, ClusterError, PoolController};
pub use session::{ClusterSession, SessionState};

use std::time::Duration;

/// Seconds between readiness probes
pub const POLL_INTERVAL_SECS: u64 = 5;

pub const POLL_INTERVAL: Duration = Duration::from_secs(POLL_INTERVAL_SECS);
