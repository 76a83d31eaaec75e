//! Campaign aggregates.
//!
//! Nothing here holds state of its own: every figure is recomputed from the
//! contact list, so a snapshot can be summarized at any time.

use serde::Serialize;

use crate::contacts::{Contact, ContactStatus};

/// Share of contacts processed so far, 0.0 - 100.0.
///
/// An empty campaign counts as complete.
pub fn progress_percent(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (processed as f64 / total as f64) * 100.0
}

/// Per-status counts over a contact list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSummary {
    pub sent_count: usize,
    pub failed_count: usize,
    pub pending_count: usize,
    pub total_count: usize,
}

impl CampaignSummary {
    pub fn from_contacts(contacts: &[Contact]) -> Self {
        let mut summary = CampaignSummary {
            total_count: contacts.len(),
            ..Default::default()
        };

        for contact in contacts {
            match contact.status() {
                ContactStatus::Sent => summary.sent_count += 1,
                ContactStatus::Failed => summary.failed_count += 1,
                ContactStatus::Pending => summary.pending_count += 1,
            }
        }

        summary
    }

    /// True once no contact is pending.
    pub fn is_complete(&self) -> bool {
        self.pending_count == 0
    }
}
