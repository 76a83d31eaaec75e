//! Per-run dispatch options.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pause between two consecutive sends.
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(1);

/// Stand-in for network latency in simulate mode.
pub const DEFAULT_SIMULATE_DELAY: Duration = Duration::from_millis(500);

/// Share of simulated sends that succeed.
pub const DEFAULT_SUCCESS_PROBABILITY: f64 = 0.8;

/// Whether a run talks to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Fabricated outcomes, no network calls
    #[default]
    Simulate,
    /// Real sends through the send endpoint
    Live,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulate" | "test" => Ok(DispatchMode::Simulate),
            "live" => Ok(DispatchMode::Live),
            other => Err(format!("unknown dispatch mode: {}", other)),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Simulate => write!(f, "simulate"),
            DispatchMode::Live => write!(f, "live"),
        }
    }
}

/// Everything the dispatch loop needs to know besides the template and contacts.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub mode: DispatchMode,
    /// Log every payload at info level
    pub verbose: bool,
    /// Language used when the template does not carry one
    pub language_code: String,
    pub throttle: Duration,
    pub simulate_delay: Duration,
    /// Clamped to 0.0..=1.0 by the simulator
    pub simulate_success_probability: f64,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Simulate,
            verbose: false,
            language_code: "en_US".to_string(),
            throttle: DEFAULT_THROTTLE,
            simulate_delay: DEFAULT_SIMULATE_DELAY,
            simulate_success_probability: DEFAULT_SUCCESS_PROBABILITY,
        }
    }
}
