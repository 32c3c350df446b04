//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use attendance_core::AttendanceStore;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn AttendanceStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Arc<dyn AttendanceStore>, config: Arc<Config>) -> Self {
        Self { db, config }
    }
}
