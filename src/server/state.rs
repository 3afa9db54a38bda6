//! Cursor inspection endpoint for observability.
//!
//! A read-only view of an account's reconciliation position, for debugging
//! and monitoring.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::AppState;
use crate::store::cursor::{CursorError, CursorRecord};
use crate::types::AccountKey;

/// Errors that can occur when fetching a cursor record.
#[derive(Debug, Error)]
pub enum StateError {
    /// The account has never been observed.
    #[error("no cursor recorded for account: {0}")]
    NotFound(AccountKey),

    /// Cursor store failure.
    #[error("cursor store error: {0}")]
    Store(#[from] CursorError),
}

impl IntoResponse for StateError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            StateError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            StateError::Store(CursorError::InvalidAccountKey(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            StateError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        (status, message).into_response()
    }
}

/// Cursor inspection handler.
///
/// # Response
///
/// - 200 OK with the JSON `CursorRecord`
/// - 404 Not Found if the account has never been observed
/// - 400 Bad Request for an account key unsafe as a filename
pub async fn cursor_handler(
    State(app_state): State<AppState>,
    Path(account): Path<String>,
) -> Result<Json<CursorRecord>, StateError> {
    let account = AccountKey::new(account);
    let record = app_state
        .cursors()
        .record(&account)?
        .ok_or_else(|| StateError::NotFound(account.clone()))?;
    Ok(Json(record))
}
