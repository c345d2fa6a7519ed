use std::sync::Arc;

use gatewatch_core::Detector;
use gatewatch_pipeline::JobManager;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already
/// `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (read side: event/history queries).
    pub pool: gatewatch_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// The job registry and lifecycle owner.
    pub manager: Arc<JobManager>,
    /// Shared detector capability (still-image endpoint).
    pub detector: Arc<dyn Detector>,
}
