//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables, falling back to
//! defaults (and logging a warning) when a value is missing or unparsable.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::dispatch::options::{
    DispatchMode, DispatchOptions, DEFAULT_SIMULATE_DELAY, DEFAULT_SUCCESS_PROBABILITY,
    DEFAULT_THROTTLE,
};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend endpoint that forwards template messages to the provider
    pub send_url: String,

    /// Backend endpoint listing approved templates
    pub templates_url: String,

    /// Default dispatch mode for new campaigns
    pub dispatch_mode: DispatchMode,

    /// Log every built payload at info level
    pub verbose: bool,

    /// Template to use for CLI campaigns (first approved template if unset)
    pub template_id: Option<String>,

    /// Language code used when a template does not carry one
    pub template_language: String,

    /// Contact file for CLI campaigns
    pub contacts_path: Option<String>,

    /// Pause between consecutive sends in milliseconds
    pub throttle_delay_ms: u64,

    /// Simulated network latency in milliseconds
    pub simulate_delay_ms: u64,

    /// Probability of a simulated send succeeding (0.0 - 1.0)
    pub simulate_success_probability: f64,

    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Port for the web server to listen on
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            send_url: env::var("SEND_URL")
                .unwrap_or_else(|_| "http://localhost:3001/api/whatsapp/send-template".to_string()),

            templates_url: env::var("TEMPLATES_URL")
                .unwrap_or_else(|_| "http://localhost:3001/api/whatsapp/templates".to_string()),

            dispatch_mode: parse_var("DISPATCH_MODE", DispatchMode::Simulate),

            verbose: parse_bool("DISPATCH_VERBOSE", false),

            template_id: non_empty_var("TEMPLATE_ID"),

            template_language: non_empty_var("TEMPLATE_LANGUAGE")
                .unwrap_or_else(|| "en_US".to_string()),

            contacts_path: non_empty_var("CONTACTS_PATH"),

            throttle_delay_ms: parse_var("THROTTLE_DELAY_MS", DEFAULT_THROTTLE.as_millis() as u64),

            simulate_delay_ms: parse_var(
                "SIMULATE_DELAY_MS",
                DEFAULT_SIMULATE_DELAY.as_millis() as u64,
            ),

            simulate_success_probability: parse_var::<f64>(
                "SIMULATE_SUCCESS_PROBABILITY",
                DEFAULT_SUCCESS_PROBABILITY,
            )
            .clamp(0.0, 1.0),

            request_timeout_ms: parse_var("REQUEST_TIMEOUT_MS", 15_000),

            port: parse_var("PORT", 8080),
        }
    }

    /// Dispatch options for a run, using the configured default mode.
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            mode: self.dispatch_mode,
            verbose: self.verbose,
            language_code: self.template_language.clone(),
            throttle: Duration::from_millis(self.throttle_delay_ms),
            simulate_delay: Duration::from_millis(self.simulate_delay_ms),
            simulate_success_probability: self.simulate_success_probability,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Read a variable, treating blank values as unset.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a variable, warning and using `default` when it does not parse.
fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    let raw = match non_empty_var(name) {
        Some(v) => v,
        None => return default,
    };

    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Parse a boolean flag ("1", "true", "yes", "on").
fn parse_bool(name: &str, default: bool) -> bool {
    match non_empty_var(name) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_valid() {
        env::set_var("TEST_PARSE_VAR_VALID", "250");
        let result: u64 = parse_var("TEST_PARSE_VAR_VALID", 0);
        assert_eq!(result, 250);
        env::remove_var("TEST_PARSE_VAR_VALID");
    }

    #[test]
    fn test_parse_var_invalid_uses_default() {
        env::set_var("TEST_PARSE_VAR_INVALID", "soon");
        let result: u64 = parse_var("TEST_PARSE_VAR_INVALID", 1000);
        assert_eq!(result, 1000);
        env::remove_var("TEST_PARSE_VAR_INVALID");
    }

    #[test]
    fn test_parse_var_mode() {
        env::set_var("TEST_PARSE_VAR_MODE", "live");
        let mode = parse_var("TEST_PARSE_VAR_MODE", DispatchMode::Simulate);
        assert_eq!(mode, DispatchMode::Live);
        env::remove_var("TEST_PARSE_VAR_MODE");
    }

    #[test]
    fn test_parse_bool() {
        env::set_var("TEST_PARSE_BOOL", "Yes");
        assert!(parse_bool("TEST_PARSE_BOOL", false));
        env::set_var("TEST_PARSE_BOOL", "off");
        assert!(!parse_bool("TEST_PARSE_BOOL", true));
        env::remove_var("TEST_PARSE_BOOL");
        assert!(parse_bool("TEST_PARSE_BOOL", true));
    }

    #[test]
    fn test_non_empty_var() {
        env::set_var("TEST_NON_EMPTY_VAR", "   ");
        assert_eq!(non_empty_var("TEST_NON_EMPTY_VAR"), None);
        env::remove_var("TEST_NON_EMPTY_VAR");
    }

    #[test]
    fn test_dispatch_options_from_config() {
        let config = Config {
            send_url: "http://backend/send".to_string(),
            templates_url: "http://backend/templates".to_string(),
            dispatch_mode: DispatchMode::Live,
            verbose: true,
            template_id: None,
            template_language: "hi".to_string(),
            contacts_path: None,
            throttle_delay_ms: 250,
            simulate_delay_ms: 10,
            simulate_success_probability: 0.5,
            request_timeout_ms: 15_000,
            port: 8080,
        };

        let options = config.dispatch_options();
        assert_eq!(options.mode, DispatchMode::Live);
        assert!(options.verbose);
        assert_eq!(options.language_code, "hi");
        assert_eq!(options.throttle, Duration::from_millis(250));
        assert_eq!(options.simulate_delay, Duration::from_millis(10));
    }
}
