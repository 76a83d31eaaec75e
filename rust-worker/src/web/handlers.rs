//! Campaign endpoint handlers.
//!
//! At most one campaign runs at a time. The running dispatcher lives in a
//! background task; handlers only read the snapshots it publishes.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::contacts::{normalize, ContactFormat};
use crate::dispatch::{
    progress_percent, sender_for, CampaignRun, CampaignSnapshot, CampaignSummary, DispatchMode,
    DispatchOptions, DispatchState, Dispatcher,
};
use crate::templates::{CatalogSnapshot, PayloadBuilder, Template, TemplateCatalog};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub client: Client,
    pub catalog: Arc<TemplateCatalog>,
    campaign: Arc<RwLock<Option<ActiveCampaign>>>,
}

/// The most recent campaign and what is needed to re-run one of its contacts.
struct ActiveCampaign {
    snapshots: watch::Receiver<CampaignSnapshot>,
    cancel: CancellationToken,
    template: Template,
    options: DispatchOptions,
    builder: Arc<PayloadBuilder>,
    warning: Option<String>,
}

impl AppState {
    pub fn new(config: Config, client: Client) -> Self {
        let catalog = TemplateCatalog::new(client.clone(), config.templates_url.clone());
        Self {
            config: Arc::new(config),
            client,
            catalog: Arc::new(catalog),
            campaign: Arc::new(RwLock::new(None)),
        }
    }

    /// Cancel the running campaign. Returns false if none is running.
    pub async fn cancel_active(&self) -> bool {
        let campaign = self.campaign.read().await;
        match campaign.as_ref() {
            Some(active) if active.snapshots.borrow().is_running() => {
                active.cancel.cancel();
                true
            }
            _ => false,
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Error body for rejected requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Campaign state as returned to the dashboard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignResponse {
    pub campaign: CampaignSnapshot,
    pub summary: CampaignSummary,
    pub running: bool,
    /// Catalog warning shown once as a banner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl CampaignResponse {
    fn new(campaign: CampaignSnapshot, warning: Option<String>) -> Self {
        Self {
            summary: campaign.summary(),
            running: campaign.is_running(),
            campaign,
            warning,
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// =============================================================================
// Health Check & Catalog
// =============================================================================

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Query for the template listing.
#[derive(Debug, Default, Deserialize)]
pub struct TemplatesQuery {
    /// Re-fetch the catalog instead of serving the cached copy
    #[serde(default)]
    pub refresh: bool,
}

/// Cached template catalog, including any fallback warning.
pub async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<TemplatesQuery>,
) -> Json<CatalogSnapshot> {
    let snapshot = if query.refresh {
        state.catalog.refresh().await
    } else {
        state.catalog.snapshot().await
    };
    Json(snapshot.as_ref().clone())
}

// =============================================================================
// Contacts
// =============================================================================

/// Normalize a CSV body without starting anything.
pub async fn preview_contacts(body: String) -> Response {
    info!(body_length = body.len(), "contacts_preview_received");

    match normalize(&body, ContactFormat::Csv) {
        Ok(normalized) => (StatusCode::OK, Json(normalized)).into_response(),
        Err(e) => {
            warn!(error = %e, "contacts_preview_rejected");
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}

// =============================================================================
// Campaigns
// =============================================================================

/// Request to start a campaign.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCampaignRequest {
    /// Contact list as CSV text
    pub csv: String,
    pub template_id: String,
    /// Overrides the configured default mode
    #[serde(default)]
    pub mode: Option<DispatchMode>,
    #[serde(default)]
    pub verbose: Option<bool>,
    /// Original file name, used to reject spreadsheets
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Start a campaign in the background.
///
/// Rejects with 409 while another campaign is running and with 422 when the
/// contact list cannot be ingested. Template ids missing from the catalog are
/// accepted and sent with a fallback payload.
pub async fn start_campaign(
    State(state): State<AppState>,
    Json(request): Json<StartCampaignRequest>,
) -> Response {
    info!(
        template_id = %request.template_id,
        mode = ?request.mode,
        csv_length = request.csv.len(),
        "campaign_start_requested"
    );

    let format = request
        .file_name
        .as_deref()
        .map(ContactFormat::from_file_name)
        .unwrap_or(ContactFormat::Csv);

    let normalized = match normalize(&request.csv, format) {
        Ok(normalized) => normalized,
        Err(e) => {
            warn!(error = %e, "campaign_ingest_failed");
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string());
        }
    };

    let catalog = state.catalog.snapshot().await;
    let template = catalog.find(&request.template_id).cloned().unwrap_or_else(|| {
        warn!(template_id = %request.template_id, "template_not_in_catalog");
        Template::unlisted(&request.template_id, &state.config.template_language)
    });

    let mut options = state.config.dispatch_options();
    if let Some(mode) = request.mode {
        options.mode = mode;
    }
    if let Some(verbose) = request.verbose {
        options.verbose = verbose;
    }

    let builder = Arc::new(PayloadBuilder::from_templates(&catalog.templates));
    let sender = sender_for(&options, &state.client, &state.config.send_url);

    // Only the busy check and the swap happen under the lock
    let mut campaign = state.campaign.write().await;

    if let Some(active) = campaign.as_ref() {
        if active.snapshots.borrow().is_running() {
            warn!("campaign_already_running");
            return error_response(StatusCode::CONFLICT, "A campaign is already running");
        }
    }

    let dispatcher = Dispatcher::new(
        CampaignRun::new(template.clone(), normalized.contacts, options.clone()),
        sender,
        Arc::clone(&builder),
    );
    let snapshots = dispatcher.subscribe();
    let initial = snapshots.borrow().clone();

    *campaign = Some(ActiveCampaign {
        snapshots,
        cancel: dispatcher.cancellation_token(),
        template,
        options,
        builder,
        warning: catalog.warning.clone(),
    });
    drop(campaign);

    tokio::spawn(async move {
        let last = dispatcher.run_to_completion().await;
        let summary = last.summary();
        info!(
            template_id = %last.template_id,
            state = ?last.state,
            sent = summary.sent_count,
            failed = summary.failed_count,
            "campaign_finished"
        );
    });

    info!(
        total = initial.total(),
        skipped_rows = normalized.skipped_rows,
        "campaign_started"
    );

    (
        StatusCode::ACCEPTED,
        Json(CampaignResponse::new(initial, catalog.warning.clone())),
    )
        .into_response()
}

/// Latest snapshot of the current campaign.
pub async fn current_campaign(State(state): State<AppState>) -> Response {
    let campaign = state.campaign.read().await;

    match campaign.as_ref() {
        Some(active) => {
            let snapshot = active.snapshots.borrow().clone();
            (
                StatusCode::OK,
                Json(CampaignResponse::new(snapshot, active.warning.clone())),
            )
                .into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "No campaign has been started"),
    }
}

/// Stop the running campaign before its next send.
pub async fn cancel_campaign(State(state): State<AppState>) -> Response {
    let campaign = state.campaign.read().await;

    let active = match campaign.as_ref() {
        Some(active) => active,
        None => return error_response(StatusCode::NOT_FOUND, "No campaign has been started"),
    };

    let snapshot = active.snapshots.borrow().clone();
    if !snapshot.is_running() {
        return error_response(StatusCode::CONFLICT, "Campaign has already finished");
    }

    active.cancel.cancel();
    info!(processed = snapshot.processed, total = snapshot.total(), "campaign_cancel_requested");

    (
        StatusCode::ACCEPTED,
        Json(CampaignResponse::new(snapshot, active.warning.clone())),
    )
        .into_response()
}

/// Re-send to one contact of a finished campaign and merge the result.
///
/// The campaign reads as running while the retry is in flight, so starts,
/// retries and cancels behave as they do for a full run. The send runs in its
/// own task and is merged even if the caller goes away.
pub async fn retry_contact(State(state): State<AppState>, Path(index): Path<usize>) -> Response {
    let (dispatcher, current, busy) = {
        let mut campaign = state.campaign.write().await;

        let active = match campaign.as_mut() {
            Some(active) => active,
            None => return error_response(StatusCode::NOT_FOUND, "No campaign has been started"),
        };

        let current = active.snapshots.borrow().clone();
        if current.is_running() {
            return error_response(StatusCode::CONFLICT, "Campaign is still running");
        }

        let contact = match current.contacts.get(index) {
            Some(contact) => contact.clone(),
            None => {
                return error_response(
                    StatusCode::NOT_FOUND,
                    format!("No contact at index {}", index),
                )
            }
        };

        info!(index = index, phone = %contact.phone, "campaign_contact_retry_starting");

        let sender = sender_for(&active.options, &state.client, &state.config.send_url);
        let run = CampaignRun::single(active.template.clone(), &contact, active.options.clone());
        let dispatcher = Dispatcher::new(run, sender, Arc::clone(&active.builder));

        let (busy, snapshots) = watch::channel(CampaignSnapshot {
            state: DispatchState::Sending { index },
            ..current.clone()
        });
        active.snapshots = snapshots;
        active.cancel = dispatcher.cancellation_token();

        (dispatcher, current, busy)
    };

    let task = tokio::spawn(async move {
        let result = dispatcher.run_to_completion().await;
        let merged = merge_retry(current, index, &result);

        info!(
            index = index,
            status = ?merged.contacts[index].status(),
            error = ?merged.contacts[index].error_message(),
            "campaign_contact_retried"
        );

        // Readers keep the merged snapshot after the sender is dropped
        busy.send_replace(merged.clone());
        merged
    });

    let merged = match task.await {
        Ok(merged) => merged,
        Err(e) => {
            error!(index = index, error = %e, "campaign_contact_retry_panicked");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Retry failed");
        }
    };

    let warning = state
        .campaign
        .read()
        .await
        .as_ref()
        .and_then(|active| active.warning.clone());

    (StatusCode::OK, Json(CampaignResponse::new(merged, warning))).into_response()
}

/// Put a single-contact result back into the finished campaign.
///
/// A retry cancelled before its send leaves the original record in place.
fn merge_retry(current: CampaignSnapshot, index: usize, result: &CampaignSnapshot) -> CampaignSnapshot {
    let mut contacts = current.contacts.as_ref().clone();

    if let (Some(slot), Some(retried)) = (contacts.get_mut(index), result.contacts.first()) {
        if retried.status().is_terminal() {
            *slot = retried.clone();
        }
    }

    let processed = contacts.iter().filter(|c| c.status().is_terminal()).count();
    CampaignSnapshot {
        progress_percent: progress_percent(processed, contacts.len()),
        processed,
        contacts: Arc::new(contacts),
        ..current
    }
}
