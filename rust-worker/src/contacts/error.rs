//! Ingestion errors. Any of these blocks a campaign before the first send.

use thiserror::Error;

/// Reasons a contact list cannot be turned into a campaign.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The input contained no non-blank lines.
    #[error("contact file is empty")]
    Empty,

    /// No header matched phone/mobile/number.
    #[error("no phone column found (expected a header containing \"phone\", \"mobile\" or \"number\")")]
    MissingColumn,

    /// Every row was filtered out.
    #[error("no valid contacts found (phone numbers need at least 10 digits)")]
    NoValidContacts,

    /// More surviving rows than a single campaign may address.
    #[error("too many contacts: {count} (maximum is {limit})")]
    TooManyContacts { count: usize, limit: usize },

    /// Binary spreadsheets must be exported to CSV first.
    #[error("unsupported contact file format: {0} (export the sheet as CSV)")]
    UnsupportedFormat(String),

    /// The CSV reader rejected the input.
    #[error("malformed contact file: {0}")]
    Malformed(#[from] csv::Error),
}
