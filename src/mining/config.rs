//! Miner configuration

use std::time::Duration;

use crate::classify::ErrorMatchSet;
use crate::sink::LOG_CAPACITY;

pub const DEFAULT_API_BASE_URL: &str = "https://points.exnus.org/api";
pub const DEFAULT_IP_LOOKUP_URL: &str = "https://api.ipify.org?format=json";
pub const DEFAULT_ACTIVATION_MESSAGE: &str = "Activate mining session for Exnus Point";

/// Settings shared by every account session
#[derive(Clone, Debug)]
pub struct MinerConfig {
    /// Reward service root; account routes live under `/user/{address}`
    pub api_base_url: String,
    /// Endpoint answering `{"ip": "..."}`
    pub ip_lookup_url: String,
    /// Plaintext signed to prove address ownership
    pub activation_message: String,
    /// Upper bound for any single network call
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Countdown tick
    pub countdown_interval: Duration,
    /// Status refresh period, independent of the countdown
    pub refresh_interval: Duration,
    /// Log lines kept per account
    pub log_capacity: usize,
    /// How long `stop` waits for account tasks before aborting them
    pub shutdown_grace: Duration,
    pub error_matches: ErrorMatchSet,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ip_lookup_url: DEFAULT_IP_LOOKUP_URL.to_string(),
            activation_message: DEFAULT_ACTIVATION_MESSAGE.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            countdown_interval: Duration::from_secs(1),
            refresh_interval: Duration::from_secs(60 * 60),
            log_capacity: LOG_CAPACITY,
            shutdown_grace: Duration::from_secs(5),
            error_matches: ErrorMatchSet::default(),
        }
    }
}

impl MinerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_ip_lookup_url(mut self, url: impl Into<String>) -> Self {
        self.ip_lookup_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self.connect_timeout = self.connect_timeout.min(timeout);
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_countdown_interval(mut self, interval: Duration) -> Self {
        self.countdown_interval = interval;
        self
    }

    pub fn with_error_matches(mut self, matches: ErrorMatchSet) -> Self {
        self.error_matches = matches;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// `{api_base_url}/user/{address}`
    pub fn user_url(&self, address: &str) -> String {
        format!("{}/user/{}", self.api_base_url, address)
    }
}
