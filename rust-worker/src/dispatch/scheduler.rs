//! Sequential, throttled dispatch loop.
//!
//! The loop is an explicit state machine. Each transition publishes an
//! immutable [`CampaignSnapshot`] on a watch channel, and each completed send
//! is yielded as a [`ContactOutcome`] from a lazy stream. Contacts are
//! processed strictly in order; the next send never starts before the
//! previous outcome is recorded, and the throttle delay only runs between
//! sends.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::contacts::{Contact, ContactStatus};
use crate::dispatch::options::{DispatchMode, DispatchOptions};
use crate::dispatch::progress::{progress_percent, CampaignSummary};
use crate::dispatch::sender::MessageSender;
use crate::templates::{PayloadBuilder, Template};

/// Where the dispatch loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum DispatchState {
    /// Created, not polled yet
    Idle,
    /// Waiting on the send for contact `index`
    Sending { index: usize },
    /// Pausing after contact `index` before the next send
    Throttling { index: usize },
    /// Every contact attempted
    Done,
    /// Stopped early; `processed` contacts were attempted
    Cancelled { processed: usize },
}

impl DispatchState {
    pub fn is_finished(&self) -> bool {
        matches!(self, DispatchState::Done | DispatchState::Cancelled { .. })
    }
}

/// Immutable view of a run, published after every transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSnapshot {
    pub template_id: String,
    pub mode: DispatchMode,
    pub state: DispatchState,
    pub contacts: Arc<Vec<Contact>>,
    pub processed: usize,
    pub progress_percent: f64,
}

impl CampaignSnapshot {
    pub fn total(&self) -> usize {
        self.contacts.len()
    }

    pub fn summary(&self) -> CampaignSummary {
        CampaignSummary::from_contacts(&self.contacts)
    }

    pub fn is_running(&self) -> bool {
        !self.state.is_finished()
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactOutcome {
    /// Position in the campaign's contact list
    pub index: usize,
    pub phone: String,
    pub status: ContactStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub progress_percent: f64,
    /// The template id was unknown and a fallback payload was sent
    pub fallback_template: bool,
}

/// One template bound to an ordered contact list.
///
/// The template is fixed at construction; there is no way to swap it for an
/// existing run.
#[derive(Debug, Clone)]
pub struct CampaignRun {
    template: Template,
    contacts: Vec<Contact>,
    options: DispatchOptions,
}

impl CampaignRun {
    pub fn new(template: Template, contacts: Vec<Contact>, options: DispatchOptions) -> Self {
        Self {
            template,
            contacts,
            options,
        }
    }

    /// A run scoped to a single contact, reset to pending.
    pub fn single(template: Template, contact: &Contact, options: DispatchOptions) -> Self {
        Self::new(template, vec![contact.reset()], options)
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }
}

/// Drives one [`CampaignRun`] to completion.
pub struct Dispatcher {
    template_id: String,
    language_code: String,
    mode: DispatchMode,
    verbose: bool,
    throttle: Duration,
    contacts: Arc<Vec<Contact>>,
    processed: usize,
    state: DispatchState,
    fallback_warned: bool,
    sender: Arc<dyn MessageSender>,
    builder: Arc<PayloadBuilder>,
    cancel: CancellationToken,
    snapshots: watch::Sender<CampaignSnapshot>,
}

impl Dispatcher {
    /// Prepare a run. Nothing is sent until the stream is polled.
    ///
    /// The template's own language wins over `options.language_code`.
    pub fn new(run: CampaignRun, sender: Arc<dyn MessageSender>, builder: Arc<PayloadBuilder>) -> Self {
        let CampaignRun {
            template,
            contacts,
            options,
        } = run;

        let language_code = if template.language.is_empty() {
            options.language_code.clone()
        } else {
            template.language.clone()
        };

        let contacts = Arc::new(contacts);

        let initial = CampaignSnapshot {
            template_id: template.id.clone(),
            mode: options.mode,
            state: DispatchState::Idle,
            contacts: Arc::clone(&contacts),
            processed: 0,
            progress_percent: 0.0,
        };
        let (snapshots, _) = watch::channel(initial);

        Self {
            template_id: template.id,
            language_code,
            mode: options.mode,
            verbose: options.verbose,
            throttle: options.throttle,
            contacts,
            processed: 0,
            state: DispatchState::Idle,
            fallback_warned: false,
            sender,
            builder,
            cancel: CancellationToken::new(),
            snapshots,
        }
    }

    /// Receiver for the snapshot published after every transition.
    pub fn subscribe(&self) -> watch::Receiver<CampaignSnapshot> {
        self.snapshots.subscribe()
    }

    /// Token that stops the run before its next send.
    ///
    /// A send already in flight still completes and is recorded.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Lazy sequence of outcomes, one per attempted contact, in order.
    pub fn into_stream(self) -> impl Stream<Item = ContactOutcome> + Send + 'static {
        stream::unfold(self, |mut dispatcher| async move {
            let outcome = dispatcher.next_outcome().await?;
            Some((outcome, dispatcher))
        })
    }

    /// Run every remaining step and return the final snapshot.
    pub async fn run_to_completion(self) -> CampaignSnapshot {
        use futures::StreamExt;

        let snapshots = self.subscribe();
        let stream = self.into_stream();
        futures::pin_mut!(stream);

        while stream.next().await.is_some() {}

        let last = snapshots.borrow().clone();
        last
    }

    fn snapshot(&self) -> CampaignSnapshot {
        CampaignSnapshot {
            template_id: self.template_id.clone(),
            mode: self.mode,
            state: self.state,
            contacts: Arc::clone(&self.contacts),
            processed: self.processed,
            progress_percent: progress_percent(self.processed, self.contacts.len()),
        }
    }

    fn transition(&mut self, next: DispatchState) {
        debug!(from = ?self.state, to = ?next, "dispatch_state_changed");
        self.state = next;
        self.snapshots.send_replace(self.snapshot());
    }

    fn cancel_run(&mut self) {
        info!(
            template_id = %self.template_id,
            processed = self.processed,
            total = self.contacts.len(),
            "dispatch_cancelled"
        );
        self.transition(DispatchState::Cancelled {
            processed: self.processed,
        });
    }

    async fn next_outcome(&mut self) -> Option<ContactOutcome> {
        loop {
            match self.state {
                DispatchState::Idle => {
                    info!(
                        template_id = %self.template_id,
                        mode = %self.mode,
                        total = self.contacts.len(),
                        throttle_ms = self.throttle.as_millis() as u64,
                        "dispatch_started"
                    );

                    let next = if self.contacts.is_empty() {
                        DispatchState::Done
                    } else {
                        DispatchState::Sending { index: 0 }
                    };
                    self.transition(next);
                }
                DispatchState::Sending { index } => {
                    if self.cancel.is_cancelled() {
                        self.cancel_run();
                        return None;
                    }

                    let outcome = self.deliver(index).await;

                    let next = if index + 1 < self.contacts.len() {
                        DispatchState::Throttling { index }
                    } else {
                        DispatchState::Done
                    };
                    self.transition(next);

                    if next == DispatchState::Done {
                        let summary = CampaignSummary::from_contacts(&self.contacts);
                        info!(
                            template_id = %self.template_id,
                            sent = summary.sent_count,
                            failed = summary.failed_count,
                            total = summary.total_count,
                            "dispatch_complete"
                        );
                    }

                    return Some(outcome);
                }
                DispatchState::Throttling { index } => {
                    let cancel = self.cancel.clone();
                    let cancelled = tokio::select! {
                        _ = sleep(self.throttle) => false,
                        _ = cancel.cancelled() => true,
                    };

                    if cancelled {
                        self.cancel_run();
                        return None;
                    }
                    self.transition(DispatchState::Sending { index: index + 1 });
                }
                DispatchState::Done | DispatchState::Cancelled { .. } => return None,
            }
        }
    }

    async fn deliver(&mut self, index: usize) -> ContactOutcome {
        let contact = &self.contacts[index];
        let phone = contact.phone.clone();
        let built = self
            .builder
            .build(&self.template_id, &self.language_code, contact);
        let fallback_template = built.is_fallback();

        if fallback_template && !self.fallback_warned {
            warn!(
                template_id = %self.template_id,
                "dispatch_unrecognized_template_fallback"
            );
            self.fallback_warned = true;
        }

        let payload_json = serde_json::to_string(built.payload()).unwrap_or_default();
        if self.verbose {
            info!(index = index, phone = %phone, payload = %payload_json, "dispatch_payload_built");
        } else {
            debug!(index = index, phone = %phone, payload = %payload_json, "dispatch_payload_built");
        }

        let result = self.sender.send(built.payload(), &phone).await;

        // Copy-on-write: readers keep the snapshot they already hold
        let contacts = Arc::make_mut(&mut self.contacts);
        let record = &mut contacts[index];
        match &result {
            Ok(()) => record.mark_sent(),
            Err(e) => record.mark_failed(e.to_string()),
        }
        let status = record.status();
        let error_message = record.error_message().map(String::from);

        self.processed += 1;
        let progress = progress_percent(self.processed, self.contacts.len());

        match &error_message {
            None => info!(
                index = index,
                phone = %phone,
                progress_percent = progress,
                "dispatch_contact_sent"
            ),
            Some(error) => warn!(
                index = index,
                phone = %phone,
                error = %error,
                progress_percent = progress,
                "dispatch_contact_failed"
            ),
        }

        ContactOutcome {
            index,
            phone,
            status,
            error_message,
            progress_percent: progress,
            fallback_template,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{HttpSender, SimulatedSender};
    use futures::StreamExt;
    use reqwest::Client;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn contacts(count: usize) -> Vec<Contact> {
        (0..count)
            .map(|i| {
                Contact::new(
                    format!("9198765432{:02}", i),
                    Some(format!("Contact {}", i)),
                    None,
                    None,
                )
            })
            .collect()
    }

    fn welcome_template() -> Template {
        Template {
            id: "42".to_string(),
            name: "welcome".to_string(),
            category: "MARKETING".to_string(),
            language: "en_US".to_string(),
            status: "APPROVED".to_string(),
            content: "Hi {{1}}!".to_string(),
            header: None,
            buttons: None,
        }
    }

    fn simulate_options(probability: f64) -> DispatchOptions {
        DispatchOptions {
            simulate_success_probability: probability,
            ..DispatchOptions::default()
        }
    }

    fn simulated(run: CampaignRun) -> Dispatcher {
        let options = run.options().clone();
        let sender = Arc::new(SimulatedSender::new(
            options.simulate_delay,
            options.simulate_success_probability,
        ));
        let builder = Arc::new(PayloadBuilder::from_templates(&[run.template().clone()]));
        Dispatcher::new(run, sender, builder)
    }

    fn live(run: CampaignRun, url: String) -> Dispatcher {
        let builder = Arc::new(PayloadBuilder::from_templates(&[run.template().clone()]));
        Dispatcher::new(run, Arc::new(HttpSender::new(Client::new(), url)), builder)
    }

    fn live_options() -> DispatchOptions {
        DispatchOptions {
            mode: DispatchMode::Live,
            throttle: Duration::ZERO,
            ..DispatchOptions::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_five_contacts() {
        let run = CampaignRun::new(welcome_template(), contacts(5), simulate_options(1.0));
        let dispatcher = simulated(run);
        let snapshots = dispatcher.subscribe();

        let outcomes: Vec<ContactOutcome> = dispatcher.into_stream().collect().await;

        assert_eq!(outcomes.len(), 5);
        let indices: Vec<usize> = outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);

        for (i, outcome) in outcomes.iter().enumerate() {
            let expected = (i + 1) as f64 * 100.0 / 5.0;
            assert!((outcome.progress_percent - expected).abs() < 1e-9);
            assert_eq!(outcome.status, ContactStatus::Sent);
            assert!(!outcome.fallback_template);
        }
        assert_eq!(outcomes.last().unwrap().progress_percent, 100.0);

        let last = snapshots.borrow().clone();
        assert_eq!(last.state, DispatchState::Done);
        assert_eq!(last.progress_percent, 100.0);
        assert_eq!(last.summary().sent_count, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic_and_partitioned() {
        let run = CampaignRun::new(welcome_template(), contacts(25), simulate_options(0.8));
        let dispatcher = simulated(run);
        let snapshots = dispatcher.subscribe();

        let outcomes: Vec<ContactOutcome> = dispatcher.into_stream().collect().await;

        assert_eq!(outcomes.len(), 25);
        assert!(outcomes
            .windows(2)
            .all(|w| w[0].progress_percent < w[1].progress_percent));

        let last = snapshots.borrow().clone();
        let summary = last.summary();
        assert_eq!(summary.pending_count, 0);
        assert_eq!(summary.sent_count + summary.failed_count, summary.total_count);
        assert!(last.contacts.iter().all(|c| c.status().is_terminal()));
        assert!(last
            .contacts
            .iter()
            .filter(|c| c.status() == ContactStatus::Failed)
            .all(|c| c.error_message() == Some("Simulated delivery failure")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_only_between_sends() {
        let options = DispatchOptions {
            simulate_delay: Duration::from_millis(500),
            throttle: Duration::from_secs(1),
            ..simulate_options(1.0)
        };
        let run = CampaignRun::new(welcome_template(), contacts(3), options);
        let start = tokio::time::Instant::now();

        let last = simulated(run).run_to_completion().await;

        // 3 sends + 2 pauses, no trailing pause
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3500));
        assert!(elapsed < Duration::from_millis(4500));
        assert_eq!(last.processed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_walk_the_state_machine() {
        let run = CampaignRun::new(welcome_template(), contacts(2), simulate_options(1.0));
        let dispatcher = simulated(run);
        let mut snapshots = dispatcher.subscribe();
        assert_eq!(snapshots.borrow().state, DispatchState::Idle);

        let stream = dispatcher.into_stream();
        futures::pin_mut!(stream);

        let first = stream.next().await.unwrap();
        assert_eq!(first.index, 0);
        {
            let current = snapshots.borrow_and_update();
            assert_eq!(current.state, DispatchState::Throttling { index: 0 });
            assert_eq!(current.processed, 1);
            assert_eq!(current.contacts[0].status(), ContactStatus::Sent);
            assert_eq!(current.contacts[1].status(), ContactStatus::Pending);
        }

        let held = snapshots.borrow().clone();

        let second = stream.next().await.unwrap();
        assert_eq!(second.index, 1);
        assert!(stream.next().await.is_none());

        assert_eq!(snapshots.borrow().state, DispatchState::Done);
        // Earlier snapshots are never mutated
        assert_eq!(held.contacts[1].status(), ContactStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_before_next_send() {
        let run = CampaignRun::new(welcome_template(), contacts(4), simulate_options(1.0));
        let dispatcher = simulated(run);
        let cancel = dispatcher.cancellation_token();
        let snapshots = dispatcher.subscribe();

        let stream = dispatcher.into_stream();
        futures::pin_mut!(stream);

        assert!(stream.next().await.is_some());
        cancel.cancel();
        assert!(stream.next().await.is_none());

        let last = snapshots.borrow().clone();
        assert_eq!(last.state, DispatchState::Cancelled { processed: 1 });
        let summary = last.summary();
        assert_eq!(summary.sent_count, 1);
        assert_eq!(summary.pending_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_send() {
        let run = CampaignRun::new(welcome_template(), contacts(3), simulate_options(1.0));
        let dispatcher = simulated(run);
        let snapshots = dispatcher.subscribe();
        dispatcher.cancellation_token().cancel();

        let outcomes: Vec<ContactOutcome> = dispatcher.into_stream().collect().await;
        assert!(outcomes.is_empty());

        let last = snapshots.borrow().clone();
        assert_eq!(last.state, DispatchState::Cancelled { processed: 0 });
        assert_eq!(last.progress_percent, 0.0);
        assert_eq!(last.summary().pending_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_serializes_contacts() {
        let run = CampaignRun::new(welcome_template(), contacts(2), simulate_options(1.0));
        let last = simulated(run).run_to_completion().await;

        let json = serde_json::to_value(&last).unwrap();
        assert_eq!(json["state"]["phase"], "done");
        assert_eq!(json["processed"], 2);
        assert_eq!(json["contacts"].as_array().unwrap().len(), 2);
        assert_eq!(json["contacts"][0]["status"], "sent");
    }

    #[tokio::test]
    async fn test_empty_run_finishes_immediately() {
        let run = CampaignRun::new(welcome_template(), Vec::new(), simulate_options(1.0));
        let last = simulated(run).run_to_completion().await;

        assert_eq!(last.state, DispatchState::Done);
        assert_eq!(last.progress_percent, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_template_still_sends() {
        let template = Template::unlisted("spring_promo", "en_US");
        let run = CampaignRun::new(template, contacts(2), simulate_options(1.0));
        let sender = Arc::new(SimulatedSender::new(Duration::ZERO, 1.0));
        let dispatcher = Dispatcher::new(run, sender, Arc::new(PayloadBuilder::builtin()));

        let outcomes: Vec<ContactOutcome> = dispatcher.into_stream().collect().await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.fallback_template));
        assert!(outcomes.iter().all(|o| o.status == ContactStatus::Sent));
    }

    #[tokio::test]
    async fn test_live_http_500_records_body_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "rate limited"})),
            )
            .mount(&server)
            .await;

        let run = CampaignRun::new(welcome_template(), contacts(1), live_options());
        let last = live(run, server.uri()).run_to_completion().await;

        let contact = &last.contacts[0];
        assert_eq!(contact.status(), ContactStatus::Failed);
        assert_eq!(contact.error_message(), Some("rate limited"));
    }

    #[tokio::test]
    async fn test_live_failure_does_not_abort_run() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"phone": "919876543201"})))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let run = CampaignRun::new(welcome_template(), contacts(3), live_options());
        let last = live(run, server.uri()).run_to_completion().await;

        let statuses: Vec<ContactStatus> = last.contacts.iter().map(|c| c.status()).collect();
        assert_eq!(
            statuses,
            vec![ContactStatus::Sent, ContactStatus::Failed, ContactStatus::Sent]
        );
        assert_eq!(last.contacts[1].error_message(), Some("HTTP 400"));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
    }

    #[tokio::test]
    async fn test_live_network_error() {
        let run = CampaignRun::new(welcome_template(), contacts(2), live_options());
        let last = live(run, "http://127.0.0.1:1/send".to_string())
            .run_to_completion()
            .await;

        assert!(last.contacts.iter().all(|c| {
            c.status() == ContactStatus::Failed
                && c.error_message() == Some("Network error connecting to backend API")
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_contact_rerun() {
        let mut failed = contacts(1).remove(0);
        failed.mark_failed("HTTP 500");

        let run = CampaignRun::single(welcome_template(), &failed, simulate_options(1.0));
        assert_eq!(run.contacts()[0].status(), ContactStatus::Pending);

        let last = simulated(run).run_to_completion().await;
        assert_eq!(last.contacts[0].status(), ContactStatus::Sent);
        assert_eq!(last.contacts[0].phone, failed.phone);
    }
}
