//! Engine configuration.

use std::time::Duration;

/// Tunables for one orchestrator instance.
///
/// Constructed by the caller and injected; the engine reads nothing from
/// the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum simultaneous transfers between probe and final disk write.
    pub max_concurrent: usize,
    /// Request budget per rolling minute, shared by probes and transfers.
    pub calls_per_minute: u32,
    /// Attempts per request before it is marked failed (first try included).
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Ceiling on a single backoff sleep.
    pub retry_max_delay: Duration,
    /// Per-request timeout applied by the HTTP client.
    pub request_timeout: Duration,
    /// Read-buffer size for post-transfer checksumming.
    pub chunk_size: usize,
    /// User-Agent sent with every request.
    pub user_agent: String,
    /// Additional static headers sent with every request.
    pub extra_headers: Vec<(String, String)>,
    /// Bound on the batch summary's error ring.
    pub max_recorded_errors: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            calls_per_minute: 60,
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            chunk_size: 64 * 1024,
            user_agent: concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            )
            .to_string(),
            extra_headers: Vec::new(),
            max_recorded_errors: 10,
        }
    }
}
