//! Loads namespace bundles into the translation engine.
//!
//! Concurrent requests for the same (language, namespace) share one
//! in-flight load. Loads run under a process-wide concurrency cap (FIFO
//! queueing) and a hard timeout once a slot is acquired. Every outcome is
//! reported to the performance monitor; only successful loads mark the
//! namespace as loaded.

use crate::error::{I18nError, I18nResult};
use crate::i18n::bundles::BundleSource;
use crate::i18n::cache::{Bundle, TranslationCache};
use crate::i18n::engine::TranslationEngine;
use crate::i18n::monitor::{LoadSample, PerformanceMonitor};
use crate::i18n::namespaces::NamespaceRegistry;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type InFlight = Shared<BoxFuture<'static, I18nResult<()>>>;

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub max_concurrent_loads: usize,
    pub load_timeout: Duration,
    /// Consult the translation cache before fetching
    pub aggressive_caching: bool,
    /// Bundle version used for cache validity
    pub version: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent_loads: 3,
            load_timeout: Duration::from_secs(10),
            aggressive_caching: true,
            version: "1.0.0".to_string(),
        }
    }
}

struct Loaded {
    from_cache: bool,
    size_bytes: usize,
}

pub struct TranslationLoader {
    config: LoaderConfig,
    cache: Arc<TranslationCache>,
    namespaces: Arc<NamespaceRegistry>,
    monitor: Arc<PerformanceMonitor>,
    source: Arc<dyn BundleSource>,
    engine: Arc<dyn TranslationEngine>,
    slots: Semaphore,
    in_flight: Mutex<HashMap<(String, String), InFlight>>,
}

fn bundle_size(bundle: &Bundle) -> usize {
    serde_json::to_string(bundle).map(|s| s.len()).unwrap_or(0)
}

impl TranslationLoader {
    pub fn new(
        config: LoaderConfig,
        cache: Arc<TranslationCache>,
        namespaces: Arc<NamespaceRegistry>,
        monitor: Arc<PerformanceMonitor>,
        source: Arc<dyn BundleSource>,
        engine: Arc<dyn TranslationEngine>,
    ) -> Self {
        let slots = Semaphore::new(config.max_concurrent_loads.max(1));
        Self {
            config,
            cache,
            namespaces,
            monitor,
            source,
            engine,
            slots,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn namespaces(&self) -> &Arc<NamespaceRegistry> {
        &self.namespaces
    }

    /// Load one namespace for one language.
    ///
    /// Without `force`, a call joins any load already in flight for the same
    /// pair and the cache is consulted first (when aggressive caching is on).
    pub async fn load_namespace(
        self: &Arc<Self>,
        namespace: &str,
        language: &str,
        force: bool,
    ) -> I18nResult<()> {
        self.namespaces.track_usage(namespace);

        if force {
            return self.clone().run(namespace.to_string(), language.to_string(), true).await;
        }

        let key = (language.to_string(), namespace.to_string());
        let shared = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
            match in_flight.get(&key) {
                Some(existing) => {
                    debug!("Joining in-flight load of {}/{}", language, namespace);
                    existing.clone()
                }
                None => {
                    // The load runs on its own task so that it finishes and
                    // releases its slot even when every caller stops waiting
                    let this = self.clone();
                    let (language, namespace) = key.clone();
                    let task = tokio::spawn(async move {
                        let result = this.clone().run(namespace.clone(), language.clone(), false).await;
                        this.in_flight
                            .lock()
                            .unwrap_or_else(|p| p.into_inner())
                            .remove(&(language, namespace));
                        result
                    });

                    let (language, namespace) = key.clone();
                    let load = task
                        .map(move |joined| {
                            joined.unwrap_or_else(|e| {
                                Err(I18nError::Bundle {
                                    language,
                                    namespace,
                                    reason: e.to_string(),
                                })
                            })
                        })
                        .boxed()
                        .shared();
                    in_flight.insert(key, load.clone());
                    load
                }
            }
        };

        shared.await
    }

    async fn run(self: Arc<Self>, namespace: String, language: String, force: bool) -> I18nResult<()> {
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|e| I18nError::Bundle {
                language: language.clone(),
                namespace: namespace.clone(),
                reason: e.to_string(),
            })?;

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.config.load_timeout,
            self.fetch_and_apply(&namespace, &language, force),
        )
        .await
        .unwrap_or_else(|_| {
            Err(I18nError::LoadTimeout {
                language: language.clone(),
                namespace: namespace.clone(),
                timeout_ms: self.config.load_timeout.as_millis() as u64,
            })
        });
        let load_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(loaded) => {
                self.monitor.record_loading_metrics(
                    &language,
                    &namespace,
                    LoadSample {
                        load_time_ms,
                        from_cache: loaded.from_cache,
                        size_bytes: loaded.size_bytes,
                        has_error: false,
                    },
                );
                self.namespaces.mark_loaded(&namespace, &language);
                debug!(
                    "Loaded {}/{} in {:.1}ms (cache: {})",
                    language, namespace, load_time_ms, loaded.from_cache
                );
                Ok(())
            }
            Err(e) => {
                self.monitor.record_loading_metrics(
                    &language,
                    &namespace,
                    LoadSample {
                        load_time_ms,
                        from_cache: false,
                        size_bytes: 0,
                        has_error: true,
                    },
                );
                warn!("Failed to load {}/{}: {}", language, namespace, e);
                Err(e)
            }
        }
    }

    async fn fetch_and_apply(&self, namespace: &str, language: &str, force: bool) -> I18nResult<Loaded> {
        let version = &self.config.version;

        if !force && self.config.aggressive_caching {
            if let Some(bundle) = self.cache.get(language, namespace, version) {
                let size_bytes = bundle_size(&bundle);
                self.engine.add_resource_bundle(language, namespace, bundle);
                return Ok(Loaded {
                    from_cache: true,
                    size_bytes,
                });
            }
        }

        match self.source.fetch(language, namespace).await {
            Ok(bundle) => {
                let size_bytes = bundle_size(&bundle);
                self.cache.set(language, namespace, version, &bundle);
                self.engine.add_resource_bundle(language, namespace, bundle);
                Ok(Loaded {
                    from_cache: false,
                    size_bytes,
                })
            }
            Err(e) => match self.cache.get_stale(language, namespace, version) {
                Some(bundle) => {
                    warn!(
                        "Serving cached {}/{} while offline: {}",
                        language, namespace, e
                    );
                    let size_bytes = bundle_size(&bundle);
                    self.engine.add_resource_bundle(language, namespace, bundle);
                    Ok(Loaded {
                        from_cache: true,
                        size_bytes,
                    })
                }
                None => Err(e),
            },
        }
    }

    /// Load a namespace after its registered dependencies, in dependency order.
    pub async fn load_with_dependencies(self: &Arc<Self>, namespace: &str, language: &str) -> I18nResult<()> {
        for name in self.namespaces.load_order(namespace) {
            self.load_namespace(&name, language, false).await?;
        }
        Ok(())
    }

    /// Fire-and-forget parallel loads; failures are only logged.
    pub fn preload_namespaces(self: &Arc<Self>, namespaces: Vec<String>, language: &str) -> JoinHandle<()> {
        let this = self.clone();
        let language = language.to_string();
        tokio::spawn(async move {
            let loads = namespaces
                .iter()
                .map(|namespace| this.load_namespace(namespace, &language, false));
            let results = join_all(loads).await;

            let failed = results.iter().filter(|r| r.is_err()).count();
            if failed > 0 {
                warn!(
                    "Preloading {} namespaces for {}: {} failed",
                    namespaces.len(),
                    language,
                    failed
                );
            } else {
                info!("Preloaded {} namespaces for {}", namespaces.len(), language);
            }
        })
    }
}
