//! Load-time, cache-hit and error-rate telemetry per (language, namespace),
//! plus a history of language switches.
//!
//! Samples live in a bounded ring buffer per key. Aggregates are updated
//! incrementally on every sample, and a snapshot is persisted so the numbers
//! survive restarts. Persistence failures are logged and otherwise ignored.

use crate::error::I18nError;
use crate::storage::KvStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const METRICS_SNAPSHOT_KEY: &str = "i18n:performance-metrics";

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Samples kept per (language, namespace)
    pub max_samples: usize,
    /// Samples and switches older than this are swept
    pub max_age: Duration,
    /// Minimum time between automatic sweeps
    pub sweep_interval: Duration,
    /// Language switches kept for the report
    pub max_switches: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_samples: 100,
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            sweep_interval: Duration::from_secs(24 * 60 * 60),
            max_switches: 100,
        }
    }
}

/// Outcome of a single namespace load, as reported by the loader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSample {
    pub load_time_ms: f64,
    pub from_cache: bool,
    pub size_bytes: usize,
    pub has_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingMetrics {
    pub load_time_ms: f64,
    pub from_cache: bool,
    pub size_bytes: usize,
    pub has_error: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub access_count: u64,
    pub avg_load_time_ms: f64,
    /// Fraction (0-1) of loads that failed
    pub error_rate: f64,
    /// Fraction (0-1) of loads served from the cache
    pub cache_hit_rate: f64,
    pub last_accessed: i64,
}

impl UsageMetrics {
    fn record(&mut self, sample: &LoadingMetrics) {
        self.access_count += 1;
        let n = self.access_count as f64;
        let indicator = |flag: bool| if flag { 1.0 } else { 0.0 };

        self.avg_load_time_ms += (sample.load_time_ms - self.avg_load_time_ms) / n;
        self.error_rate += (indicator(sample.has_error) - self.error_rate) / n;
        self.cache_hit_rate += (indicator(sample.from_cache) - self.cache_hit_rate) / n;
        self.last_accessed = sample.timestamp;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageSwitch {
    pub from: String,
    pub to: String,
    pub duration_ms: f64,
    pub success: bool,
    pub timestamp: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MonitorState {
    samples: HashMap<String, VecDeque<LoadingMetrics>>,
    usage: HashMap<String, UsageMetrics>,
    switches: VecDeque<LanguageSwitch>,
    #[serde(default)]
    last_sweep: i64,
}

pub struct PerformanceMonitor {
    store: Arc<dyn KvStore>,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
}

fn metrics_key(language: &str, namespace: &str) -> String {
    format!("{}:{}", language, namespace)
}

fn split_key(key: &str) -> (&str, &str) {
    key.split_once(':').unwrap_or((key, ""))
}

impl PerformanceMonitor {
    /// Restores the last persisted snapshot, if any.
    pub fn new(store: Arc<dyn KvStore>, config: MonitorConfig) -> Self {
        let state = match store.get(METRICS_SNAPSHOT_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<MonitorState>(&raw) {
                Ok(state) => {
                    debug!("Restored metrics for {} keys", state.usage.len());
                    state
                }
                Err(e) => {
                    warn!("Discarding unreadable metrics snapshot: {}", e);
                    MonitorState::default()
                }
            },
            Ok(None) => MonitorState::default(),
            Err(e) => {
                warn!("Could not read metrics snapshot: {}", e);
                MonitorState::default()
            }
        };

        let mut state = state;
        if state.last_sweep == 0 {
            state.last_sweep = Utc::now().timestamp_millis();
        }

        Self {
            store,
            config,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn record_loading_metrics(&self, language: &str, namespace: &str, sample: LoadSample) {
        let now = Utc::now().timestamp_millis();
        let entry = LoadingMetrics {
            load_time_ms: sample.load_time_ms,
            from_cache: sample.from_cache,
            size_bytes: sample.size_bytes,
            has_error: sample.has_error,
            timestamp: now,
        };
        let key = metrics_key(language, namespace);

        let mut state = self.state();
        let buffer = state.samples.entry(key.clone()).or_default();
        buffer.push_back(entry.clone());
        while buffer.len() > self.config.max_samples {
            buffer.pop_front();
        }
        state.usage.entry(key).or_default().record(&entry);

        if now - state.last_sweep >= self.config.sweep_interval.as_millis() as i64 {
            let removed = self.sweep_locked(&mut state, now);
            debug!("Periodic metrics sweep removed {} samples", removed);
        }

        self.persist(&state);
    }

    pub fn record_language_switch(&self, from: &str, to: &str, duration: Duration, success: bool) {
        let mut state = self.state();
        state.switches.push_back(LanguageSwitch {
            from: from.to_string(),
            to: to.to_string(),
            duration_ms: duration.as_secs_f64() * 1000.0,
            success,
            timestamp: Utc::now().timestamp_millis(),
        });
        while state.switches.len() > self.config.max_switches {
            state.switches.pop_front();
        }
        self.persist(&state);
    }

    /// Drop samples and switches older than the configured max age.
    /// Returns the number of load samples removed.
    pub fn sweep_stale(&self) -> usize {
        let now = Utc::now().timestamp_millis();
        let mut state = self.state();
        let removed = self.sweep_locked(&mut state, now);
        if removed > 0 {
            info!("Swept {} stale loading samples", removed);
        }
        self.persist(&state);
        removed
    }

    fn sweep_locked(&self, state: &mut MonitorState, now: i64) -> usize {
        let cutoff = now - self.config.max_age.as_millis() as i64;
        let mut removed = 0;

        for buffer in state.samples.values_mut() {
            let before = buffer.len();
            buffer.retain(|sample| sample.timestamp >= cutoff);
            removed += before - buffer.len();
        }
        state.samples.retain(|_, buffer| !buffer.is_empty());
        state.usage.retain(|_, usage| usage.last_accessed >= cutoff);
        state.switches.retain(|switch| switch.timestamp >= cutoff);
        state.last_sweep = now;
        removed
    }

    fn persist(&self, state: &MonitorState) {
        let result = serde_json::to_string(state)
            .map_err(I18nError::from)
            .and_then(|json| self.store.set(METRICS_SNAPSHOT_KEY, &json));
        if let Err(e) = result {
            warn!("Failed to persist performance metrics: {}", e);
        }
    }

    pub fn usage(&self, language: &str, namespace: &str) -> Option<UsageMetrics> {
        self.state()
            .usage
            .get(&metrics_key(language, namespace))
            .cloned()
    }

    pub fn samples(&self, language: &str, namespace: &str) -> Vec<LoadingMetrics> {
        self.state()
            .samples
            .get(&metrics_key(language, namespace))
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn language_switches(&self) -> Vec<LanguageSwitch> {
        self.state().switches.iter().cloned().collect()
    }

    /// Namespaces ordered by access count summed over all languages.
    pub fn get_most_used_namespaces(&self, limit: usize) -> Vec<(String, u64)> {
        let state = self.state();
        let mut totals: HashMap<&str, u64> = HashMap::new();
        for (key, usage) in &state.usage {
            *totals.entry(split_key(key).1).or_default() += usage.access_count;
        }

        let mut ranked: Vec<(String, u64)> = totals
            .into_iter()
            .map(|(namespace, count)| (namespace.to_string(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    pub fn generate_report(&self) -> String {
        let most_used = self.get_most_used_namespaces(5);
        let state = self.state();
        let mut report = String::from("i18n performance report\n");

        let total_loads: u64 = state.usage.values().map(|u| u.access_count).sum();
        let weighted = |field: fn(&UsageMetrics) -> f64| -> f64 {
            if total_loads == 0 {
                return 0.0;
            }
            state
                .usage
                .values()
                .map(|u| field(u) * u.access_count as f64)
                .sum::<f64>()
                / total_loads as f64
        };

        let _ = writeln!(report, "  Loads recorded: {}", total_loads);
        let _ = writeln!(
            report,
            "  Average load time: {:.1}ms",
            weighted(|u: &UsageMetrics| u.avg_load_time_ms)
        );
        let _ = writeln!(
            report,
            "  Cache hit rate: {:.1}%",
            weighted(|u: &UsageMetrics| u.cache_hit_rate) * 100.0
        );
        let _ = writeln!(
            report,
            "  Error rate: {:.1}%",
            weighted(|u: &UsageMetrics| u.error_rate) * 100.0
        );

        if !most_used.is_empty() {
            let _ = writeln!(report, "  Most used namespaces:");
            for (namespace, count) in &most_used {
                let _ = writeln!(report, "    {}: {} loads", namespace, count);
            }
        }

        let mut failing: Vec<(&String, &UsageMetrics)> = state
            .usage
            .iter()
            .filter(|(_, u)| u.error_rate > 0.0)
            .collect();
        failing.sort_by(|a, b| a.0.cmp(b.0));
        for (key, usage) in failing {
            let _ = writeln!(
                report,
                "  Errors in {}: {:.1}% of {} loads",
                key,
                usage.error_rate * 100.0,
                usage.access_count
            );
        }

        if !state.switches.is_empty() {
            let count = state.switches.len();
            let avg = state.switches.iter().map(|s| s.duration_ms).sum::<f64>() / count as f64;
            let failed = state.switches.iter().filter(|s| !s.success).count();
            let _ = writeln!(
                report,
                "  Language switches: {} (avg {:.1}ms, {} failed)",
                count, avg, failed
            );
        }

        report
    }
}
