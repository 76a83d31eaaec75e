//! Web server module for operating campaigns over HTTP.
//!
//! This module provides a thin web server that:
//! - Lists templates from the cached catalog
//! - Previews contact files without sending anything
//! - Starts one campaign at a time in the background
//! - Exposes the latest campaign snapshot, cancellation and single-contact retry

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    cancel_campaign, current_campaign, health, list_templates, preview_contacts, retry_contact,
    start_campaign, AppState, CampaignResponse, ErrorResponse, HealthResponse,
    StartCampaignRequest, TemplatesQuery,
};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/templates", get(list_templates))
        .route("/contacts/preview", post(preview_contacts))
        .route("/campaigns", post(start_campaign))
        .route("/campaigns/current", get(current_campaign))
        .route("/campaigns/current/cancel", post(cancel_campaign))
        .route("/campaigns/current/contacts/:index/retry", post(retry_contact))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
