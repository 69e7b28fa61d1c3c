//! Application-root context: builds every i18n component once and hands out
//! the operations UI and server code use.

use crate::config::Config;
use crate::error::I18nResult;
use crate::i18n::{
    ApiClientConfig, BundleSource, CacheConfig, CacheMetrics, CdnBundles, CdnResolver,
    DirectoryBundles, Direction, DocumentAttributes, DynamicTranslation,
    DynamicTranslationClient, DynamicTranslationService, EventBus, Language, LanguageDetector,
    LanguageEvent, LanguageEventKind, LanguagePreferenceStore, LanguageService, ListenerId,
    LoaderConfig, LocaleSource, MetricsReport, MonitorConfig, NamespaceRegistry,
    PerformanceMonitor, Priority, ResourceStore, ServerPreferenceProvider, StartupMetrics,
    StartupOptimizer, SyncResult, TranslationCache, TranslationEngine, TranslationLoader,
    TranslationMetrics,
};
use crate::i18n::events::EventHandler;
use crate::storage::{open_store, KvStore};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub cache_entries_removed: usize,
    pub samples_removed: usize,
}

/// Stores backing the preference slot, the bundle cache and the metrics
/// snapshot.
#[derive(Clone)]
pub struct Stores {
    pub preferences: Arc<dyn KvStore>,
    pub cache: Arc<dyn KvStore>,
    pub metrics: Arc<dyn KvStore>,
}

impl Stores {
    /// File-backed stores under `config.storage_dir`, or in-memory ones.
    pub fn open(config: &Config) -> I18nResult<Self> {
        let dir = config.storage_dir.as_deref();
        Ok(Self {
            preferences: open_store(dir, "preferences.json")?,
            cache: open_store(dir, "cache.json")?,
            metrics: open_store(dir, "metrics.json")?,
        })
    }
}

pub struct I18nContextBuilder {
    config: Config,
    stores: Option<Stores>,
    bundle_source: Option<Arc<dyn BundleSource>>,
    locale_source: Option<Arc<dyn LocaleSource>>,
    server: Option<Arc<dyn ServerPreferenceProvider>>,
    namespaces: Option<NamespaceRegistry>,
    http: Option<reqwest::Client>,
}

impl I18nContextBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stores: None,
            bundle_source: None,
            locale_source: None,
            server: None,
            namespaces: None,
            http: None,
        }
    }

    pub fn stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn bundle_source(mut self, source: Arc<dyn BundleSource>) -> Self {
        self.bundle_source = Some(source);
        self
    }

    pub fn locale_source(mut self, source: Arc<dyn LocaleSource>) -> Self {
        self.locale_source = Some(source);
        self
    }

    pub fn server_preferences(mut self, provider: Arc<dyn ServerPreferenceProvider>) -> Self {
        self.server = Some(provider);
        self
    }

    pub fn namespaces(mut self, registry: NamespaceRegistry) -> Self {
        self.namespaces = Some(registry);
        self
    }

    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    pub fn build(self) -> I18nResult<I18nContext> {
        let config = self.config;
        let stores = match self.stores {
            Some(stores) => stores,
            None => Stores::open(&config)?,
        };
        let http = self.http.unwrap_or_default();

        let bundle_source: Arc<dyn BundleSource> = match (self.bundle_source, &config.cdn_base_url) {
            (Some(source), _) => source,
            (None, Some(base)) => {
                let mut urls = vec![base.clone()];
                urls.extend(config.cdn_fallback_urls.iter().cloned());
                info!("Loading bundles from CDN {}", base);
                Arc::new(CdnBundles::new(
                    http.clone(),
                    CdnResolver::new(urls, &config.bundle_version),
                ))
            }
            (None, None) => {
                info!("Loading bundles from {}", config.bundle_dir.display());
                Arc::new(DirectoryBundles::new(config.bundle_dir.clone()))
            }
        };

        let default_language = Language::default_language();
        let engine = Arc::new(ResourceStore::new(default_language));
        let document = Arc::new(DocumentAttributes::new());
        let events = Arc::new(EventBus::new());
        let preferences = Arc::new(LanguagePreferenceStore::new(stores.preferences));
        let detector = Arc::new(match self.locale_source {
            Some(source) => LanguageDetector::new(source),
            None => LanguageDetector::default(),
        });
        let namespaces = Arc::new(self.namespaces.unwrap_or_else(NamespaceRegistry::with_defaults));
        let metrics = Arc::new(TranslationMetrics::new());

        let cache = Arc::new(TranslationCache::new(
            stores.cache,
            CacheConfig {
                ttl: config.cache_ttl,
                max_size: config.cache_max_size,
                max_entry_size: config.cache_max_entry_size,
                offline_support: config.offline_support,
                version: config.bundle_version.clone(),
            },
        ));
        let monitor = Arc::new(PerformanceMonitor::new(
            stores.metrics,
            MonitorConfig::default(),
        ));

        let loader = Arc::new(TranslationLoader::new(
            LoaderConfig {
                max_concurrent_loads: config.max_concurrent_loads,
                load_timeout: config.load_timeout,
                aggressive_caching: config.aggressive_caching,
                version: config.bundle_version.clone(),
            },
            cache.clone(),
            namespaces.clone(),
            monitor.clone(),
            bundle_source,
            engine.clone(),
        ));

        let startup = StartupOptimizer::new(
            loader.clone(),
            namespaces.clone(),
            default_language,
            &config.preload_languages,
        );

        let client = DynamicTranslationClient::with_http_client(
            http,
            ApiClientConfig {
                endpoint: config.api_endpoint.clone(),
                batch_size: config.api_batch_size,
                batch_window: config.api_batch_window,
                throttle: config.api_throttle,
                timeout: config.api_timeout,
                max_retries: config.api_max_retries,
                retry_delay: config.api_retry_delay,
            },
        );
        let dynamic = Arc::new(DynamicTranslationService::new(
            client,
            cache.clone(),
            engine.clone(),
            metrics.clone(),
            config.show_missing_indicators,
        ));

        let service = Arc::new(LanguageService::new(
            engine.clone(),
            preferences,
            detector,
            document.clone(),
            events.clone(),
            monitor.clone(),
            self.server,
        ));

        let weak_service = Arc::downgrade(&service);
        engine.on_language_changed(Arc::new(move |code: &str| {
            if let Some(service) = weak_service.upgrade() {
                service.handle_engine_language_change(code);
            }
        }));

        {
            let dynamic = dynamic.clone();
            let loader = loader.clone();
            let namespaces = namespaces.clone();
            events.on(
                LanguageEventKind::LanguageChanged,
                Arc::new(move |event: &LanguageEvent| {
                    let LanguageEvent::LanguageChanged(change) = event else {
                        return;
                    };
                    dynamic.handle_language_change(&change.new_language);

                    let pending: Vec<String> = namespaces
                        .namespaces_by_priority(Priority::Critical)
                        .into_iter()
                        .filter(|ns| !namespaces.is_loaded(ns, &change.new_language))
                        .collect();
                    if pending.is_empty() {
                        return;
                    }
                    // Engine changes can arrive from outside any runtime
                    if tokio::runtime::Handle::try_current().is_ok() {
                        debug!(
                            "Preloading {} critical namespaces for {}",
                            pending.len(),
                            change.new_language
                        );
                        loader.preload_namespaces(pending, &change.new_language);
                    }
                }),
            );
        }

        Ok(I18nContext {
            config,
            engine,
            document,
            events,
            cache,
            namespaces,
            monitor,
            loader,
            startup,
            dynamic,
            service,
            metrics,
        })
    }
}

pub struct I18nContext {
    config: Config,
    engine: Arc<ResourceStore>,
    document: Arc<DocumentAttributes>,
    events: Arc<EventBus>,
    cache: Arc<TranslationCache>,
    namespaces: Arc<NamespaceRegistry>,
    monitor: Arc<PerformanceMonitor>,
    loader: Arc<TranslationLoader>,
    startup: StartupOptimizer,
    dynamic: Arc<DynamicTranslationService>,
    service: Arc<LanguageService>,
    metrics: Arc<TranslationMetrics>,
}

impl I18nContext {
    pub fn builder(config: Config) -> I18nContextBuilder {
        I18nContextBuilder::new(config)
    }

    pub fn from_config(config: Config) -> I18nResult<Self> {
        I18nContextBuilder::new(config).build()
    }

    /// Pick the initial language, then load critical namespaces (fatal on
    /// failure) and start background preloading.
    pub async fn initialize(&self) -> I18nResult<Language> {
        let language = self.service.initialize();
        self.startup.initialize().await?;

        if language != Language::default_language() {
            for namespace in self.namespaces.namespaces_by_priority(Priority::Critical) {
                self.loader
                    .load_namespace(&namespace, language.code(), false)
                    .await?;
            }
        }
        Ok(language)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Arc<ResourceStore> {
        &self.engine
    }

    pub fn document(&self) -> &Arc<DocumentAttributes> {
        &self.document
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    pub fn namespaces(&self) -> &Arc<NamespaceRegistry> {
        &self.namespaces
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn loader(&self) -> &Arc<TranslationLoader> {
        &self.loader
    }

    pub fn startup(&self) -> &StartupOptimizer {
        &self.startup
    }

    pub fn service(&self) -> &Arc<LanguageService> {
        &self.service
    }

    pub fn dynamic(&self) -> &Arc<DynamicTranslationService> {
        &self.dynamic
    }

    /// Static translation from loaded bundles.
    pub fn translate(&self, namespace: &str, key: &str) -> String {
        self.engine.translate(namespace, key)
    }

    pub async fn translate_dynamic(
        &self,
        key: &str,
        fallback: Option<&str>,
        params: &HashMap<String, String>,
    ) -> String {
        self.dynamic.translate_dynamic(key, fallback, params).await
    }

    pub async fn get_dynamic_translation(&self, key: &str, fallback: Option<&str>) -> DynamicTranslation {
        self.dynamic.get_dynamic_translation(key, fallback).await
    }

    pub async fn preload_dynamic_translations(&self, keys: &[String]) -> I18nResult<()> {
        self.dynamic.preload_dynamic_translations(keys).await
    }

    pub async fn change_language(&self, code: &str) -> I18nResult<()> {
        self.service.change_language(code).await
    }

    pub async fn reset_to_default(&self) -> I18nResult<()> {
        self.service.reset_to_default().await
    }

    pub async fn sync_with_server(&self, user_id: &str) -> Option<SyncResult> {
        self.service.sync_with_server(user_id).await
    }

    pub fn get_current_language(&self) -> Language {
        self.service.current_language()
    }

    pub fn get_current_direction(&self) -> Direction {
        self.service.current_direction()
    }

    pub fn on(&self, kind: LanguageEventKind, handler: EventHandler) -> ListenerId {
        self.events.on(kind, handler)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LanguageEvent> {
        self.events.subscribe()
    }

    /// Empty the bundle cache. Bundles already in the engine stay usable.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn get_cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }

    pub fn get_translation_metrics(&self) -> MetricsReport {
        self.metrics.report()
    }

    pub fn get_startup_metrics(&self) -> StartupMetrics {
        self.startup.metrics()
    }

    /// Purge stale cache entries and old telemetry samples.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        let report = MaintenanceReport {
            cache_entries_removed: self.cache.cleanup(),
            samples_removed: self.monitor.sweep_stale(),
        };
        info!(
            "Maintenance removed {} cache entries and {} samples",
            report.cache_entries_removed, report.samples_removed
        );
        report
    }

    pub fn generate_report(&self) -> String {
        let mut report = self.monitor.generate_report();

        let cache = self.cache.metrics();
        let _ = writeln!(
            report,
            "  Bundle cache: {} entries, {} bytes, {:.1}% hit rate, {} evictions",
            cache.entries, cache.total_size, cache.hit_rate, cache.evictions
        );

        let dynamic = self.metrics.report();
        let _ = writeln!(
            report,
            "  Dynamic translations: {} API calls ({:.1}% ok), {} fallbacks",
            dynamic.api_calls, dynamic.api_success_rate, dynamic.fallbacks
        );

        let startup = self.startup.metrics();
        if self.startup.is_initialized() {
            let _ = writeln!(
                report,
                "  Startup: {} critical namespaces in {:.1}ms, {} background loaded, {} failed",
                startup.critical_namespaces,
                startup.critical_load_ms,
                startup.background_loaded,
                startup.background_failed
            );
        }
        report
    }
}
