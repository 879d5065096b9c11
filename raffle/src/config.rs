//! Configuration management for the raffle.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::draw::DrawPacing;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Record service configuration
    pub backend: BackendConfig,
    /// Draw animation configuration
    pub draw: DrawConfig,
    /// How long a facade call waits for its outcome, in seconds
    pub request_timeout_secs: u64,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

/// Record service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the REST record service; `None` keeps records in memory
    pub url: Option<String>,
    /// HTTP request timeout in seconds
    pub http_timeout_secs: u64,
    /// Retries for idempotent calls (list, delete, rank updates)
    pub max_retries: usize,
}

/// Draw animation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawConfig {
    /// Highlight ticks per draw
    pub ticks: u32,
    /// Delay before the first tick, in milliseconds
    pub base_delay_ms: u64,
    /// Extra delay per tick, in milliseconds
    pub step_delay_ms: u64,
    /// Pause before the final pick, in milliseconds
    pub settle_delay_ms: u64,
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            backend: BackendConfig {
                url: env::var("RAFFLE_BACKEND_URL")
                    .ok()
                    .map(|url| url.trim().trim_end_matches('/').to_string())
                    .filter(|url| !url.is_empty()),
                http_timeout_secs: parsed("RAFFLE_HTTP_TIMEOUT_SECS", 10),
                max_retries: parsed("RAFFLE_HTTP_MAX_RETRIES", 2),
            },
            draw: DrawConfig {
                ticks: parsed("RAFFLE_ROLL_TICKS", 20),
                base_delay_ms: parsed("RAFFLE_ROLL_BASE_DELAY_MS", 10),
                step_delay_ms: parsed("RAFFLE_ROLL_STEP_DELAY_MS", 3),
                settle_delay_ms: parsed("RAFFLE_SETTLE_DELAY_MS", 500),
            },
            request_timeout_secs: parsed("RAFFLE_REQUEST_TIMEOUT_SECS", 30),
            log_filter: env::var("RAFFLE_LOG").unwrap_or_else(|_| "info,raffle=debug".to_string()),
        }
    }

    /// Draw pacing described by this configuration
    #[must_use]
    pub const fn pacing(&self) -> DrawPacing {
        DrawPacing {
            ticks: self.draw.ticks,
            base_delay: Duration::from_millis(self.draw.base_delay_ms),
            step_delay: Duration::from_millis(self.draw.step_delay_ms),
            settle_delay: Duration::from_millis(self.draw.settle_delay_ms),
        }
    }

    /// Facade request timeout
    ///
    /// Never shorter than a full draw animation plus ten seconds for the commit.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
            .max(self.pacing().total() + Duration::from_secs(10))
    }

    /// HTTP request timeout
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.http_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                url: None,
                http_timeout_secs: 10,
                max_retries: 2,
            },
            draw: DrawConfig {
                ticks: 20,
                base_delay_ms: 10,
                step_delay_ms: 3,
                settle_delay_ms: 500,
            },
            request_timeout_secs: 30,
            log_filter: "info,raffle=debug".to_string(),
        }
    }
}
