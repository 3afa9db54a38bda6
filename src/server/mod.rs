//! HTTP server for mailwatch.
//!
//! - Accepts change notifications from the provider's push mechanism and
//!   acknowledges them unconditionally before processing
//! - Provides a read-only cursor inspection endpoint for observability
//! - Provides a health check for liveness probes
//!
//! # Endpoints
//!
//! - `POST /notify` - Accepts a change notification (returns 202 Accepted)
//! - `GET /accounts/{account}/cursor` - Returns the account's cursor record
//! - `GET /health` - Returns 200 if the server is running

use std::sync::Arc;

use crate::processor::ChangeProcessor;
use crate::store::CursorStore;

pub mod health;
pub mod notify;
pub mod state;

pub use health::health_handler;
pub use notify::notify_handler;
pub use state::cursor_handler;

/// Shared application state, passed to handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// The reconciliation engine, shared by all notification tasks.
    processor: ChangeProcessor,

    /// Read-only cursor access for the inspection endpoint.
    cursors: CursorStore,
}

impl AppState {
    /// Creates a new `AppState` around a processor and a cursor store
    /// handle (pointing at the same directory the processor writes to).
    pub fn new(processor: ChangeProcessor, cursors: CursorStore) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { processor, cursors }),
        }
    }

    /// Returns the shared processor.
    pub fn processor(&self) -> &ChangeProcessor {
        &self.inner.processor
    }

    /// Returns the cursor store.
    pub fn cursors(&self) -> &CursorStore {
        &self.inner.cursors
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/notify", post(notify_handler))
        .route("/accounts/{account}/cursor", get(cursor_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
