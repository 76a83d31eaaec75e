//! Contact record and per-run delivery status.

use serde::Serialize;

/// Delivery status of a contact within one campaign run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    /// Not attempted yet
    Pending,
    /// Accepted by the provider (or simulated as such)
    Sent,
    /// Rejected, unreachable, or simulated as failed
    Failed,
}

impl ContactStatus {
    /// Whether the status is final for the current run.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ContactStatus::Pending)
    }
}

/// One message recipient.
///
/// The identity fields are fixed at ingestion. Only the dispatch loop changes
/// the status, through [`Contact::mark_sent`] and [`Contact::mark_failed`],
/// which keeps `error_message` present exactly when the status is `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Digits only, including the country code
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    status: ContactStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl Contact {
    /// Create a pending contact. `phone` is expected to be normalized already.
    pub fn new(
        phone: String,
        name: Option<String>,
        email: Option<String>,
        company: Option<String>,
    ) -> Self {
        Self {
            phone,
            name,
            email,
            company,
            status: ContactStatus::Pending,
            error_message: None,
        }
    }

    pub fn status(&self) -> ContactStatus {
        self.status
    }

    /// Error recorded for a failed delivery.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn mark_sent(&mut self) {
        self.status = ContactStatus::Sent;
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = ContactStatus::Failed;
        self.error_message = Some(message.into());
    }

    /// Copy of this contact back in the pending state, for a new run.
    pub fn reset(&self) -> Self {
        Self::new(
            self.phone.clone(),
            self.name.clone(),
            self.email.clone(),
            self.company.clone(),
        )
    }
}
