//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use attendance_core::ports::AttendanceStore;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers. Never mutated after initialization; the store handle is the
/// only long-lived connection to the persistence layer.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AttendanceStore>,
    pub config: Arc<Config>,
}
