use reqwest::blocking::Client;
use std::time::Duration;

use crate::error::AnalyzerError;

pub const DEFAULT_REGISTRY_URL: &str = "https://pypi.org";
pub const DEFAULT_OSV_URL: &str = "https://api.osv.dev";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Endpoints and timeout shared by every HTTP adapter.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub registry_url: String,
    pub osv_url: String,
    pub github_api_url: String,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            osv_url: DEFAULT_OSV_URL.to_string(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl HttpConfig {
    pub fn new(registry_url: &str, osv_url: &str, timeout_secs: u64) -> Self {
        HttpConfig {
            registry_url: registry_url.trim_end_matches('/').to_string(),
            osv_url: osv_url.trim_end_matches('/').to_string(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_github_api_url(mut self, url: &str) -> Self {
        self.github_api_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Build the blocking client used for every request of this invocation.
    pub fn build_client(&self) -> Result<Client, AnalyzerError> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("package-analyzer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AnalyzerError::Network(format!("failed to build HTTP client: {}", e)))
    }
}
