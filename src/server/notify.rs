//! Notification endpoint handler.
//!
//! The provider's push mechanism delivers `{account, cursor}` here,
//! at-least-once, with its own redelivery policy. The handler acknowledges
//! unconditionally: reconciliation runs as a spawned task after the 202 is
//! on the wire, and its failures are logged rather than surfaced; an error
//! response would only provoke a redelivery of a notification we have
//! already durably reacted to or safely ignored.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::{debug, error, info};

use super::AppState;
use crate::types::{AccountKey, Cursor};

/// An inbound change notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    /// The account whose change stream advanced.
    pub account: AccountKey,

    /// The stream position the account advanced to.
    pub cursor: Cursor,
}

/// Notification handler.
///
/// # Request
///
/// - Method: POST
/// - Body: `{"account": "a@x.com", "cursor": "150"}`
///
/// # Response
///
/// - 202 Accepted: always, once the body parses; processing is asynchronous
/// - 400 Bad Request: body is not a valid notification
pub async fn notify_handler(
    State(app_state): State<AppState>,
    Json(notification): Json<Notification>,
) -> (StatusCode, &'static str) {
    debug!(
        account = %notification.account,
        cursor = %notification.cursor,
        "received change notification"
    );

    tokio::spawn(async move {
        let result = app_state
            .processor()
            .handle_notification(&notification.account, &notification.cursor)
            .await;
        match result {
            Ok(outcome) => {
                info!(
                    account = %notification.account,
                    cursor = %notification.cursor,
                    ?outcome,
                    "notification handled"
                );
            }
            Err(e) => {
                // The cursor has not advanced; the range is retried on the
                // next notification.
                error!(
                    account = %notification.account,
                    cursor = %notification.cursor,
                    error = %e,
                    "notification processing failed"
                );
            }
        }
    });

    (StatusCode::ACCEPTED, "Accepted")
}
