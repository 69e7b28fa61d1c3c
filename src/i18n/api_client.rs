//! HTTP client for dynamically generated translations.
//!
//! Calls for the same language that arrive within the batching window are
//! merged into one request (split into chunks of at most `batch_size` keys).
//! Every outbound attempt, retries included, waits for a process-wide
//! throttle gate so consecutive requests are at least `throttle` apart.

use crate::error::{I18nError, I18nResult};
use crate::retry::{with_retry_if, RetryConfig};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL; requests go to `{endpoint}/dynamic-translations`
    pub endpoint: String,
    pub batch_size: usize,
    pub batch_window: Duration,
    pub throttle: Duration,
    /// Per-attempt HTTP timeout
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api".to_string(),
            batch_size: 50,
            batch_window: Duration::from_millis(10),
            throttle: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Serialize)]
struct TranslationRequest<'a> {
    keys: &'a [String],
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslationResponse {
    translations: HashMap<String, String>,
    #[serde(default)]
    missing: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

type Reply = oneshot::Sender<I18nResult<HashMap<String, String>>>;

struct Waiter {
    keys: Vec<String>,
    reply: Reply,
}

struct Inner {
    config: ApiClientConfig,
    http: reqwest::Client,
    /// Open batches per language, waiting for their window to close
    pending: Mutex<HashMap<String, Vec<Waiter>>>,
    /// When the last outbound attempt was released
    last_request: tokio::sync::Mutex<Option<Instant>>,
    requests_sent: AtomicUsize,
}

#[derive(Clone)]
pub struct DynamicTranslationClient {
    inner: Arc<Inner>,
}

impl DynamicTranslationClient {
    pub fn new(config: ApiClientConfig) -> Self {
        Self::with_http_client(reqwest::Client::new(), config)
    }

    pub fn with_http_client(http: reqwest::Client, config: ApiClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                http,
                pending: Mutex::new(HashMap::new()),
                last_request: tokio::sync::Mutex::new(None),
                requests_sent: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.inner.config
    }

    /// Outbound HTTP attempts made so far, retries included.
    pub fn requests_sent(&self) -> usize {
        self.inner.requests_sent.load(Ordering::SeqCst)
    }

    /// Translations for `keys` in `language`. Keys the API has no text for
    /// are absent from the result.
    pub async fn fetch_translations(
        &self,
        keys: &[String],
        language: &str,
    ) -> I18nResult<HashMap<String, String>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let (reply, response) = oneshot::channel();
        let waiter = Waiter {
            keys: keys.to_vec(),
            reply,
        };

        let opens_batch = {
            let mut pending = self.inner.pending.lock().unwrap_or_else(|p| p.into_inner());
            let batch = pending.entry(language.to_string()).or_default();
            batch.push(waiter);
            batch.len() == 1
        };

        if opens_batch {
            let inner = self.inner.clone();
            let language = language.to_string();
            tokio::spawn(async move {
                sleep(inner.config.batch_window).await;
                inner.flush(&language).await;
            });
        }

        response
            .await
            .map_err(|_| I18nError::Network("translation batch was dropped".to_string()))?
    }
}

impl Inner {
    async fn flush(&self, language: &str) {
        let waiters = self
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(language)
            .unwrap_or_default();
        if waiters.is_empty() {
            return;
        }

        let keys: Vec<String> = {
            let mut seen = HashSet::new();
            waiters
                .iter()
                .flat_map(|waiter| waiter.keys.iter())
                .filter(|key| seen.insert(key.as_str()))
                .cloned()
                .collect()
        };
        debug!(
            "Dispatching {} keys for {} from {} callers",
            keys.len(),
            language,
            waiters.len()
        );

        let mut translations = HashMap::new();
        let mut failures: HashMap<String, I18nError> = HashMap::new();
        for chunk in keys.chunks(self.config.batch_size.max(1)) {
            match self.send_with_retry(chunk, language).await {
                Ok(found) => translations.extend(found),
                Err(e) => {
                    for key in chunk {
                        failures.insert(key.clone(), e.clone());
                    }
                }
            }
        }

        for waiter in waiters {
            let failed = waiter.keys.iter().find_map(|key| failures.get(key));
            let result = match failed {
                Some(e) => Err(e.clone()),
                None => Ok(waiter
                    .keys
                    .iter()
                    .filter_map(|key| translations.get(key).map(|text| (key.clone(), text.clone())))
                    .collect()),
            };
            // The caller may have stopped waiting
            let _ = waiter.reply.send(result);
        }
    }

    async fn send_with_retry(&self, keys: &[String], language: &str) -> I18nResult<HashMap<String, String>> {
        let retry = RetryConfig::dynamic_translation(self.config.max_retries, self.config.retry_delay);
        with_retry_if(
            &retry,
            "Dynamic translation request",
            || self.send_once(keys, language),
            I18nError::is_retryable,
        )
        .await
    }

    async fn wait_for_throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.config.throttle;
            if ready_at > Instant::now() {
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn send_once(&self, keys: &[String], language: &str) -> I18nResult<HashMap<String, String>> {
        self.wait_for_throttle().await;
        self.requests_sent.fetch_add(1, Ordering::SeqCst);

        let url = format!(
            "{}/dynamic-translations",
            self.config.endpoint.trim_end_matches('/')
        );
        let timeout_ms = self.config.timeout.as_millis() as u64;
        let transport_error = |e: reqwest::Error| {
            if e.is_timeout() {
                I18nError::RequestTimeout(timeout_ms)
            } else {
                I18nError::from(e)
            }
        };

        let response = self
            .http
            .post(&url)
            .timeout(self.config.timeout)
            .json(&TranslationRequest { keys, language })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(I18nError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TranslationResponse = response.json().await.map_err(transport_error)?;
        if !parsed.missing.is_empty() {
            debug!("API has no {} text for {:?}", language, parsed.missing);
        }

        let requested: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let (kept, ignored): (HashMap<_, _>, HashMap<_, _>) = parsed
            .translations
            .into_iter()
            .partition(|(key, _)| requested.contains(key.as_str()));
        if !ignored.is_empty() {
            warn!("Ignoring {} unrequested keys in API response", ignored.len());
        }
        Ok(kept)
    }
}
