//! Pool-client facility
//!
//! A pool client is bound to one profile and exposes the roster of connected
//! engines plus a factory for load-balanced distribution views. How work units
//! are serialized and dispatched is up to the pool; the view only forwards
//! payloads.

pub mod http;

pub use http::{HttpDistributionView, HttpPoolClient, HttpPoolConnector};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Identifier of one engine registered with the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineId(pub u64);

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    /// The controller endpoint cannot be reached (yet)
    #[error("Controller unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Parse(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Client for profile '{0}' is closed")]
    Closed(String),
}

impl ClientError {
    /// Connection-level failures are expected while a pool is starting up
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Unreachable(_))
    }
}

// ============================================================================
// SBIO: Traits for abstraction (allows mocking in tests)
// ============================================================================

/// Creates clients bound to a profile
#[async_trait]
pub trait PoolConnector: Send + Sync {
    async fn connect(&self, profile: &str) -> Result<Arc<dyn PoolClient>, ClientError>;
}

#[async_trait]
pub trait PoolClient: Send + Sync {
    /// Engines currently visible to this client
    async fn engine_ids(&self) -> Result<Vec<EngineId>, ClientError>;

    /// Derive a load-balanced view; views start out non-blocking
    fn load_balanced_view(&self) -> Box<dyn DistributionView>;

    async fn close(&self);
}

/// Handle used to submit work spread across the available engines
#[async_trait]
pub trait DistributionView: Send + Sync {
    fn set_blocking(&mut self, block: bool);

    fn is_blocking(&self) -> bool;

    /// Submit one work unit. A blocking view resolves with the result.
    async fn submit(&self, payload: Value) -> Result<Value, ClientError>;
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================
