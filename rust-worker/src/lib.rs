//! WaCast - rate-limited bulk WhatsApp campaign dispatcher.
//!
//! This library provides shared modules for the two WaCast binaries:
//! - `wacast-dispatch`: Runs one campaign from a contact file
//! - `wacast-web`: HTTP service to preview, start, observe and cancel campaigns
//!
//! ## Architecture
//!
//! ```text
//! CSV → contacts::normalize → Contact[] ─┐
//! catalog → templates::TemplateCatalog ──┴→ dispatch::Dispatcher → send endpoint
//!                                              └→ CampaignSnapshot / ContactOutcome
//! ```

pub mod config;
pub mod contacts;
pub mod dispatch;
pub mod templates;
pub mod util;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use contacts::{normalize, Contact, ContactFormat, ContactStatus, IngestError};
pub use dispatch::{
    sender_for, CampaignRun, CampaignSnapshot, CampaignSummary, ContactOutcome, DispatchMode,
    DispatchOptions, DispatchState, Dispatcher,
};
pub use templates::{CatalogSnapshot, PayloadBuilder, Template, TemplateCatalog};
pub use web::AppState;
