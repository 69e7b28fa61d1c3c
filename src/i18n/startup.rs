//! Startup sequencing: critical namespaces before the app is ready, the rest
//! in the background.

use crate::error::I18nResult;
use crate::i18n::loader::TranslationLoader;
use crate::i18n::namespaces::{NamespaceRegistry, Priority};
use crate::i18n::Language;
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StartupMetrics {
    pub critical_namespaces: usize,
    pub critical_load_ms: f64,
    pub background_scheduled: usize,
    pub background_loaded: usize,
    pub background_failed: usize,
    pub background_complete: bool,
}

pub struct StartupOptimizer {
    loader: Arc<TranslationLoader>,
    namespaces: Arc<NamespaceRegistry>,
    default_language: Language,
    preload_languages: Vec<Language>,
    initialized: AtomicBool,
    init_lock: tokio::sync::Mutex<()>,
    metrics: Arc<Mutex<StartupMetrics>>,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl StartupOptimizer {
    /// `preload_languages` that are not supported are ignored; an empty list
    /// means every supported language.
    pub fn new(
        loader: Arc<TranslationLoader>,
        namespaces: Arc<NamespaceRegistry>,
        default_language: Language,
        preload_languages: &[String],
    ) -> Self {
        let mut languages: Vec<Language> = preload_languages
            .iter()
            .filter_map(|code| {
                let language = Language::resolve(code);
                if language.is_none() {
                    warn!("Ignoring unsupported preload language '{}'", code);
                }
                language
            })
            .collect();
        if preload_languages.is_empty() {
            languages = Language::all();
        }
        languages.dedup();

        Self {
            loader,
            namespaces,
            default_language,
            preload_languages: languages,
            initialized: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
            metrics: Arc::new(Mutex::new(StartupMetrics::default())),
            background: Mutex::new(None),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Load every critical namespace for the default language; any failure
    /// is returned and leaves the optimizer uninitialized. Then schedule
    /// background preloading. Calling again after success does nothing.
    pub async fn initialize(&self) -> I18nResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        let language = self.default_language.code();
        let critical = self.namespaces.namespaces_by_priority(Priority::Critical);
        let started = Instant::now();

        info!(
            "Loading {} critical namespaces for {}",
            critical.len(),
            language
        );
        let loads = critical
            .iter()
            .map(|namespace| self.loader.load_namespace(namespace, language, false));
        if let Err(e) = try_join_all(loads).await {
            error!("Critical namespace load failed: {}", e);
            return Err(e);
        }

        let critical_load_ms = started.elapsed().as_secs_f64() * 1000.0;
        {
            let mut metrics = self.metrics.lock().unwrap_or_else(|p| p.into_inner());
            metrics.critical_namespaces = critical.len();
            metrics.critical_load_ms = critical_load_ms;
        }
        info!("Critical namespaces ready in {:.1}ms", critical_load_ms);

        self.initialized.store(true, Ordering::SeqCst);
        let handle = self.spawn_background_preload();
        *self.background.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        Ok(())
    }

    /// (language, namespace) pairs preloaded after startup: High and Normal
    /// namespaces for every preload language, plus critical namespaces
    /// flagged for all languages.
    pub fn background_targets(&self) -> Vec<(String, String)> {
        let mut targets = Vec::new();
        let mut background = self.namespaces.namespaces_by_priority(Priority::High);
        background.extend(self.namespaces.namespaces_by_priority(Priority::Normal));

        for language in &self.preload_languages {
            if *language != self.default_language {
                for namespace in self.namespaces.namespaces_by_priority(Priority::Critical) {
                    let all_languages = self
                        .namespaces
                        .get(&namespace)
                        .map(|config| config.preload_all_languages)
                        .unwrap_or(false);
                    if all_languages {
                        targets.push((language.code().to_string(), namespace));
                    }
                }
            }
            for namespace in &background {
                targets.push((language.code().to_string(), namespace.clone()));
            }
        }
        targets
    }

    fn spawn_background_preload(&self) -> JoinHandle<()> {
        let targets = self.background_targets();
        let loader = self.loader.clone();
        let metrics = self.metrics.clone();
        metrics
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .background_scheduled = targets.len();

        tokio::spawn(async move {
            let loads = targets.iter().map(|(language, namespace)| {
                let loader = loader.clone();
                async move {
                    let result = loader.load_namespace(namespace, language, false).await;
                    if let Err(e) = &result {
                        warn!("Background preload of {}/{} failed: {}", language, namespace, e);
                    }
                    result.is_ok()
                }
            });
            let results = join_all(loads).await;

            let loaded = results.iter().filter(|ok| **ok).count();
            let mut metrics = metrics.lock().unwrap_or_else(|p| p.into_inner());
            metrics.background_loaded = loaded;
            metrics.background_failed = results.len() - loaded;
            metrics.background_complete = true;
            info!(
                "Background preload finished: {} loaded, {} failed",
                metrics.background_loaded, metrics.background_failed
            );
        })
    }

    /// Wait for the background preload started by `initialize`, if any.
    pub async fn wait_for_background(&self) {
        let handle = self.background.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Background preload task ended abnormally: {}", e);
            }
        }
    }

    pub fn metrics(&self) -> StartupMetrics {
        self.metrics.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::I18nError;
    use crate::i18n::bundles::EmbeddedBundles;
    use crate::i18n::cache::{CacheConfig, TranslationCache};
    use crate::i18n::engine::ResourceStore;
    use crate::i18n::loader::LoaderConfig;
    use crate::i18n::monitor::{MonitorConfig, PerformanceMonitor};
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn optimizer(source: EmbeddedBundles, preload: &[String]) -> (StartupOptimizer, Arc<NamespaceRegistry>) {
        let namespaces = Arc::new(NamespaceRegistry::with_defaults());
        let loader = Arc::new(TranslationLoader::new(
            LoaderConfig::default(),
            Arc::new(TranslationCache::new(MemoryStore::shared(), CacheConfig::default())),
            namespaces.clone(),
            Arc::new(PerformanceMonitor::new(MemoryStore::shared(), MonitorConfig::default())),
            Arc::new(source),
            Arc::new(ResourceStore::new(Language::EN_US)),
        ));
        (
            StartupOptimizer::new(loader, namespaces.clone(), Language::EN_US, preload),
            namespaces,
        )
    }

    fn full_source() -> EmbeddedBundles {
        let source = EmbeddedBundles::new();
        for language in ["en-US", "pt-BR"] {
            for namespace in NamespaceRegistry::with_defaults().all() {
                source.insert(language, &namespace, json!({"title": namespace}));
            }
        }
        source
    }

    #[tokio::test]
    async fn test_initialize_loads_critical_then_background() {
        let (optimizer, namespaces) = optimizer(full_source(), &[]);

        optimizer.initialize().await.unwrap();
        assert!(optimizer.is_initialized());
        for namespace in ["common", "navigation", "errors"] {
            assert!(namespaces.is_loaded(namespace, "en-US"));
        }

        optimizer.wait_for_background().await;
        let metrics = optimizer.metrics();
        assert_eq!(metrics.critical_namespaces, 3);
        assert!(metrics.background_complete);
        assert_eq!(metrics.background_failed, 0);
        assert!(namespaces.is_loaded("forms", "pt-BR"));
        assert!(namespaces.is_loaded("common", "pt-BR"));
        // Critical without the all-languages flag stays default-only
        assert!(!namespaces.is_loaded("errors", "pt-BR"));
        // Low priority is never preloaded
        assert!(!namespaces.is_loaded("points", "en-US"));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (optimizer, _) = optimizer(full_source(), &["en-US".to_string()]);
        optimizer.initialize().await.unwrap();
        optimizer.wait_for_background().await;
        let first = optimizer.metrics();

        optimizer.initialize().await.unwrap();
        assert_eq!(optimizer.metrics(), first);
    }

    #[tokio::test]
    async fn test_critical_failure_is_fatal() {
        let source = EmbeddedBundles::new()
            .with("en-US", "common", json!({}))
            .with("en-US", "navigation", json!({}));
        let (optimizer, _) = optimizer(source, &[]);

        let err = optimizer.initialize().await.unwrap_err();
        assert!(matches!(err, I18nError::Bundle { ref namespace, .. } if namespace == "errors"));
        assert!(!optimizer.is_initialized());
    }

    #[tokio::test]
    async fn test_background_failures_are_not_fatal() {
        let source = EmbeddedBundles::new();
        for namespace in ["common", "navigation", "errors"] {
            source.insert("en-US", namespace, json!({}));
        }
        let (optimizer, _) = optimizer(source, &["en-US".to_string()]);

        optimizer.initialize().await.unwrap();
        optimizer.wait_for_background().await;
        let metrics = optimizer.metrics();
        assert!(metrics.background_failed > 0);
        assert_eq!(metrics.background_loaded, 0);
    }

    #[test]
    fn test_unsupported_preload_languages_ignored() {
        let (optimizer, _) = optimizer(EmbeddedBundles::new(), &["fr-FR".to_string(), "pt".to_string()]);
        let targets = optimizer.background_targets();
        let languages: Vec<&str> = targets
            .iter()
            .map(|(language, _)| language.as_str())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        assert_eq!(languages, vec!["pt-BR"]);
    }
}
