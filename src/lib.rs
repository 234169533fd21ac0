pub mod access;
pub mod api;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod logging;
pub mod webhook;

use std::sync::Arc;

use access::AccessGuard;
use config::ConfigCache;
use dispatch::ProcessLauncher;

pub struct AppState {
    pub config: ConfigCache,
    pub access: AccessGuard,
    pub launcher: Arc<dyn ProcessLauncher>,
}

pub type SharedState = Arc<AppState>;
