//! Message templates: catalog lookup and provider payload construction.
//!
//! ```text
//! catalog endpoint → TemplateCatalog (cached) → Template
//! Template id + Contact → PayloadBuilder → ProviderPayload
//! ```

pub mod catalog;
pub mod payload;
pub mod types;

pub use catalog::{CatalogResponse, CatalogSnapshot, TemplateCatalog, FALLBACK_SOURCE};
pub use payload::{
    BuiltPayload, PayloadBuilder, ProviderPayload, TemplateShape, DEFAULT_RECIPIENT_NAME,
    STATIC_TEMPLATE,
};
pub use types::{Template, TemplateButton};
