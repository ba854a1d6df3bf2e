pub mod api;
pub mod config;
pub mod deps;
pub mod error;
pub mod gitlab;
pub mod logging;
pub mod queue;
pub mod setup;
pub mod utils;
pub mod webhook;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::queue::ReleaseQueue;

pub struct AppState {
    pub config: ServerConfig,
    pub queue: ReleaseQueue,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;
