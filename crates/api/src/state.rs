use std::sync::Arc;

use speechpace_core::dispatch::Dispatcher;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; nothing in here is mutated after start-up.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub dispatcher: Arc<Dispatcher>,
}
