//! Resource fetching with timeout, retry, and fragment extraction

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::io::HttpClient;
use crate::selector::{self, Extraction, SelectorSpec};

const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Retry and size limits applied to every fetch
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub timeout_ms: u64,
    pub retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub large_content_threshold: usize,
}

impl FetchPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout_ms: config.timeout_ms,
            retries: config.retries,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            large_content_threshold: config.large_content_threshold,
        }
    }

    /// Delay before the retry that follows a failed attempt (1-indexed):
    /// `min(initial * 2^(attempt-1), max)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay_ms = self.initial_backoff_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }
}

/// Non-fatal observations made during a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchWarning {
    /// Content exceeded the configured size threshold
    LargeContent { size: usize, threshold: usize },
    /// The selector could not narrow the content; the unmodified document
    /// was used instead
    SelectorFallback { selector: String, reason: String },
}

/// A completed fetch: content after selector extraction, plus warnings
#[derive(Debug, Clone)]
pub struct FetchSuccess {
    pub content: String,
    pub status: u16,
    pub warnings: Vec<FetchWarning>,
}

/// Fetches resource content over HTTP with retry and backoff
pub struct Fetcher {
    policy: FetchPolicy,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").field("policy", &self.policy).finish()
    }
}

impl Fetcher {
    pub fn new(policy: FetchPolicy, http: Arc<dyn HttpClient>) -> Self {
        Self { policy, http }
    }

    /// Fetch a resource, retrying failed attempts up to the retry budget.
    ///
    /// Returns a terminal `WatchError::Fetch` once the budget is exhausted.
    pub async fn fetch(
        &self,
        name: &str,
        url: &str,
        selector_expr: Option<&str>,
    ) -> crate::Result<FetchSuccess> {
        let attempts = self.policy.retries.max(1);
        let timeout = Duration::from_millis(self.policy.timeout_ms);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            tracing::debug!("Fetching '{}' ({}) attempt {}/{}", name, url, attempt, attempts);

            let outcome = match tokio::time::timeout(timeout, self.http.get(url)).await {
                Err(_) => Err(format!("timed out after {}ms", self.policy.timeout_ms)),
                Ok(Err(e)) => Err(e.to_string()),
                Ok(Ok(response)) => {
                    if (200..300).contains(&response.status) {
                        Ok(response)
                    } else {
                        Err(format!("HTTP status {}", response.status))
                    }
                }
            };

            match outcome {
                Ok(response) => {
                    return Ok(self.process(name, selector_expr, response.body, response.status));
                }
                Err(reason) => {
                    tracing::warn!(
                        "Fetch attempt {}/{} for '{}' failed: {}",
                        attempt,
                        attempts,
                        name,
                        reason
                    );
                    last_error = reason;
                    if attempt < attempts {
                        let delay = self.policy.backoff_delay(attempt);
                        tracing::debug!("Backing off {:?} before retrying '{}'", delay, name);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(crate::WatchError::Fetch(format!(
            "{} failed after {} attempts: {}",
            url, attempts, last_error
        )))
    }

    /// Apply size checks and selector extraction to a fetched body
    fn process(
        &self,
        name: &str,
        selector_expr: Option<&str>,
        body: String,
        status: u16,
    ) -> FetchSuccess {
        let mut warnings = Vec::new();

        if body.len() > self.policy.large_content_threshold {
            tracing::warn!(
                "Content for '{}' is {} bytes (threshold {})",
                name,
                body.len(),
                self.policy.large_content_threshold
            );
            warnings.push(FetchWarning::LargeContent {
                size: body.len(),
                threshold: self.policy.large_content_threshold,
            });
        }

        let content = match selector_expr {
            None => body,
            Some(expr) => {
                let spec = SelectorSpec::parse(expr);
                match selector::extract(&spec, &body) {
                    Extraction::Fragment(fragment) => fragment,
                    Extraction::NoMatch => {
                        tracing::warn!(
                            "Selector {:?} matched nothing for '{}'; using full document",
                            expr,
                            name
                        );
                        warnings.push(FetchWarning::SelectorFallback {
                            selector: expr.to_string(),
                            reason: "no match".to_string(),
                        });
                        body
                    }
                    Extraction::Failed(reason) => {
                        tracing::warn!(
                            "Selector {:?} failed for '{}': {}; using full document",
                            expr,
                            name,
                            reason
                        );
                        warnings.push(FetchWarning::SelectorFallback {
                            selector: expr.to_string(),
                            reason,
                        });
                        body
                    }
                }
            }
        };

        FetchSuccess {
            content,
            status,
            warnings,
        }
    }
}
