//! WaCast Dispatch - runs one WhatsApp template campaign from a contact file.
//!
//! Reads the contact list at `CONTACTS_PATH`, resolves the template from the
//! catalog, then sends to every contact in order with a fixed pause between
//! sends. SIGINT/SIGTERM stop the run before the next send.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wacast::util::http::build_client;
use wacast::{
    normalize, sender_for, CampaignRun, Config, ContactFormat, ContactStatus, Dispatcher,
    PayloadBuilder, Template, TemplateCatalog,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("dispatch_starting");

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        mode = %config.dispatch_mode,
        template_id = ?config.template_id,
        contacts_path = ?config.contacts_path,
        throttle_delay_ms = config.throttle_delay_ms,
        verbose = config.verbose,
        "config_loaded"
    );

    // Load and validate contacts before touching the network
    let path = config
        .contacts_path
        .clone()
        .context("CONTACTS_PATH is not set")?;

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read contact file {}", path))?;

    let normalized = normalize(&raw, ContactFormat::from_file_name(&path))
        .context("Failed to load contacts")?;

    info!(
        contacts = normalized.contacts.len(),
        skipped_rows = normalized.skipped_rows,
        "contacts_loaded"
    );

    let client = build_client(config.request_timeout()).context("Failed to create HTTP client")?;

    // Resolve the template
    let catalog = TemplateCatalog::new(client.clone(), config.templates_url.clone());
    let snapshot = catalog.snapshot().await;

    if let Some(warning) = &snapshot.warning {
        warn!(warning = %warning, source = %snapshot.source, "catalog_warning");
    }

    let template = match &config.template_id {
        Some(id) => snapshot.find(id).cloned().unwrap_or_else(|| {
            warn!(template_id = %id, "template_not_in_catalog");
            Template::unlisted(id, &config.template_language)
        }),
        None => snapshot
            .default_template()
            .cloned()
            .context("Template catalog has no templates")?,
    };

    info!(
        template_id = %template.id,
        template_name = %template.name,
        approved = template.is_approved(),
        "template_selected"
    );

    let options = config.dispatch_options();
    let sender = sender_for(&options, &client, &config.send_url);
    let builder = Arc::new(PayloadBuilder::from_templates(&snapshot.templates));

    let dispatcher = Dispatcher::new(
        CampaignRun::new(template, normalized.contacts, options),
        sender,
        builder,
    );
    let cancel = dispatcher.cancellation_token();
    let snapshots = dispatcher.subscribe();

    let outcomes = dispatcher.into_stream();
    tokio::pin!(outcomes);

    // Create shutdown signal future
    let shutdown = async {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = terminate => info!("Received SIGTERM"),
        }
    };

    // Pin the shutdown future
    tokio::pin!(shutdown);
    let mut stopping = false;

    // Drive the campaign until it finishes or is cancelled
    loop {
        tokio::select! {
            _ = &mut shutdown, if !stopping => {
                info!("dispatch_stopping");
                stopping = true;
                cancel.cancel();
            }
            outcome = outcomes.next() => {
                match outcome {
                    Some(outcome) => {
                        info!(
                            index = outcome.index,
                            phone = %outcome.phone,
                            sent = outcome.status == ContactStatus::Sent,
                            error = ?outcome.error_message,
                            progress_percent = outcome.progress_percent,
                            "dispatch_progress"
                        );
                    }
                    None => break,
                }
            }
        }
    }

    let last = snapshots.borrow().clone();
    let summary = last.summary();

    info!(
        state = ?last.state,
        sent = summary.sent_count,
        failed = summary.failed_count,
        pending = summary.pending_count,
        total = summary.total_count,
        "dispatch_summary"
    );

    for (index, contact) in last
        .contacts
        .iter()
        .enumerate()
        .filter(|(_, c)| c.status() == ContactStatus::Failed)
    {
        warn!(
            index = index,
            phone = %contact.phone,
            name = ?contact.name,
            error = ?contact.error_message(),
            "dispatch_failed_contact"
        );
    }

    info!("dispatch_shutdown_complete");
    Ok(())
}
