//! HTTP client construction.

use std::time::Duration;

use reqwest::Client;

/// User agent sent to the backend.
pub const USER_AGENT: &str = concat!("wacast-dispatcher/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client.
///
/// `timeout` bounds every request, including live sends; the dispatcher adds
/// no deadline of its own.
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(10)
        .build()
}
