//! Campaign dispatch: the throttled, sequential send loop and its aggregates.
//!
//! ## Architecture
//!
//! ```text
//! CampaignRun → Dispatcher ─┬→ Stream<ContactOutcome>
//!                           └→ watch::Receiver<CampaignSnapshot>
//!
//! Idle → Sending(0) → Throttling(0) → Sending(1) → ... → Done
//!                   ↘ Cancelled (cooperative, checked before each send)
//! ```

pub mod options;
pub mod progress;
pub mod scheduler;
pub mod sender;
pub mod simulator;

use std::sync::Arc;

use reqwest::Client;

pub use options::{DispatchMode, DispatchOptions};
pub use progress::{progress_percent, CampaignSummary};
pub use scheduler::{CampaignRun, CampaignSnapshot, ContactOutcome, DispatchState, Dispatcher};
pub use sender::{rejection_message, DeliveryError, HttpSender, MessageSender};
pub use simulator::SimulatedSender;

/// Pick the sender for the configured mode.
///
/// `simulate` never touches the network; `live` posts to `send_url`.
pub fn sender_for(
    options: &DispatchOptions,
    client: &Client,
    send_url: &str,
) -> Arc<dyn MessageSender> {
    match options.mode {
        DispatchMode::Simulate => Arc::new(SimulatedSender::new(
            options.simulate_delay,
            options.simulate_success_probability,
        )),
        DispatchMode::Live => Arc::new(HttpSender::new(client.clone(), send_url.to_string())),
    }
}
