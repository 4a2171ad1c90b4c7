//! HTTP API for the chat assistant
//!
//! Sessions, messages and version info, as JSON.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::dispatcher::Dispatcher;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }
}
