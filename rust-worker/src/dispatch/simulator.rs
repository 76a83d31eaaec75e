//! Simulated delivery - rehearses a campaign without contacting the provider.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::sleep;
use tracing;

use crate::dispatch::sender::{DeliveryError, MessageSender};
use crate::templates::ProviderPayload;

/// Waits a fixed delay, then succeeds with the configured probability.
pub struct SimulatedSender {
    delay: Duration,
    success_probability: f64,
}

impl SimulatedSender {
    pub fn new(delay: Duration, success_probability: f64) -> Self {
        Self {
            delay,
            success_probability: success_probability.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl MessageSender for SimulatedSender {
    async fn send(&self, payload: &ProviderPayload, phone: &str) -> Result<(), DeliveryError> {
        // Roll before awaiting (ThreadRng is not Send)
        let roll: f64 = rand::thread_rng().gen();

        sleep(self.delay).await;

        let delivered = roll < self.success_probability;

        tracing::debug!(
            phone = phone,
            template = %payload.template.name,
            roll = roll,
            threshold = self.success_probability,
            delivered = delivered,
            "simulated_send"
        );

        if delivered {
            Ok(())
        } else {
            Err(DeliveryError::Simulated)
        }
    }
}
