//! Bundle URL resolution with per-URL failure backoff.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct FailureState {
    failures: u32,
    retry_after: Instant,
}

pub struct CdnResolver {
    base_urls: Vec<String>,
    version: String,
    base_backoff: Duration,
    max_backoff: Duration,
    failures: Mutex<HashMap<String, FailureState>>,
}

impl CdnResolver {
    /// `base_urls` are tried in order; the first is the primary CDN.
    pub fn new(base_urls: Vec<String>, version: &str) -> Self {
        Self {
            base_urls: base_urls
                .into_iter()
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            version: version.to_string(),
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// `{base}/{version}/{language}/{namespace}.json`
    pub fn bundle_url(&self, base: &str, language: &str, namespace: &str) -> String {
        format!("{}/{}/{}/{}.json", base, self.version, language, namespace)
    }

    /// URLs to try for a bundle, in priority order, skipping those still
    /// backing off after recent failures.
    pub fn candidate_urls(&self, language: &str, namespace: &str) -> Vec<String> {
        self.base_urls
            .iter()
            .map(|base| self.bundle_url(base, language, namespace))
            .filter(|url| !self.is_backed_off(url))
            .collect()
    }

    pub fn is_backed_off(&self, url: &str) -> bool {
        self.failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(url)
            .map(|state| Instant::now() < state.retry_after)
            .unwrap_or(false)
    }

    /// Backoff doubles with each consecutive failure, up to the maximum.
    pub fn record_failure(&self, url: &str) {
        let mut failures = self.failures.lock().unwrap_or_else(|p| p.into_inner());
        let count = failures.get(url).map(|s| s.failures).unwrap_or(0) + 1;
        let delay = self
            .base_backoff
            .saturating_mul(2u32.saturating_pow(count - 1))
            .min(self.max_backoff);
        debug!("Backing off {} for {:?} after {} failures", url, delay, count);
        failures.insert(
            url.to_string(),
            FailureState {
                failures: count,
                retry_after: Instant::now() + delay,
            },
        );
    }

    pub fn record_success(&self, url: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(url);
    }

    pub fn failure_count(&self, url: &str) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(url)
            .map(|s| s.failures)
            .unwrap_or(0)
    }
}
