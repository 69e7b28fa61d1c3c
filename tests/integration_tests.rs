//! Integration tests for the locale runtime
//!
//! These tests drive the public API end to end: bundle loading through the
//! cache, the dynamic translation client against a mocked API, language
//! changes and the events they emit.

use async_trait::async_trait;
use locale_runtime::i18n::preferences::PREFERENCE_KEY;
use locale_runtime::i18n::{
    ApiClientConfig, Bundle, BundleSource, CacheConfig, DynamicTranslationClient,
    DynamicTranslationService, EmbeddedBundles, FixedLocaleSource, Language, LanguageEvent,
    LanguageEventKind, LanguagePreferenceStore, LoaderConfig, MonitorConfig, NamespaceRegistry,
    PerformanceMonitor, ResourceStore, TranslationCache, TranslationLoader, TranslationMetrics,
    TranslationSource,
};
use locale_runtime::storage::{open_store, KvStore, MemoryStore};
use locale_runtime::{config::Config, I18nContext, I18nError, I18nResult, Stores};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

// ==================== Test Helpers ====================

/// Bundle source that counts fetches and tracks how many run at once.
#[derive(Default)]
struct RecordingSource {
    fetches: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    started: Mutex<Vec<String>>,
    delay: Duration,
}

impl RecordingSource {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl BundleSource for RecordingSource {
    async fn fetch(&self, language: &str, namespace: &str) -> I18nResult<Bundle> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.started.lock().unwrap().push(namespace.to_string());
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({ "title": format!("{} {}", namespace, language) }))
    }
}

struct LoaderFixture {
    loader: Arc<TranslationLoader>,
    monitor: Arc<PerformanceMonitor>,
    engine: Arc<ResourceStore>,
}

fn loader(source: Arc<RecordingSource>, max_concurrent_loads: usize) -> LoaderFixture {
    let monitor = Arc::new(PerformanceMonitor::new(
        MemoryStore::shared(),
        MonitorConfig::default(),
    ));
    let engine = Arc::new(ResourceStore::new(Language::EN_US));
    let loader = Arc::new(TranslationLoader::new(
        LoaderConfig {
            max_concurrent_loads,
            ..LoaderConfig::default()
        },
        Arc::new(TranslationCache::new(MemoryStore::shared(), CacheConfig::default())),
        Arc::new(NamespaceRegistry::with_defaults()),
        monitor.clone(),
        source,
        engine.clone(),
    ));
    LoaderFixture {
        loader,
        monitor,
        engine,
    }
}

fn client_config(server: &MockServer) -> ApiClientConfig {
    ApiClientConfig {
        endpoint: server.uri(),
        batch_window: Duration::from_millis(20),
        throttle: Duration::ZERO,
        retry_delay: Duration::from_millis(5),
        ..ApiClientConfig::default()
    }
}

fn context(server: &MockServer, temp_dir: &TempDir) -> I18nContext {
    let bundles = EmbeddedBundles::new();
    for namespace in NamespaceRegistry::with_defaults().all() {
        bundles.insert("en-US", &namespace, json!({"title": "Title"}));
        bundles.insert("pt-BR", &namespace, json!({"title": "Título"}));
    }

    let config = Config {
        storage_dir: Some(temp_dir.path().to_path_buf()),
        api_endpoint: server.uri(),
        api_throttle: Duration::ZERO,
        api_max_retries: 0,
        ..Config::default()
    };
    I18nContext::builder(config)
        .bundle_source(Arc::new(bundles))
        .locale_source(Arc::new(FixedLocaleSource(Vec::new())))
        .build()
        .unwrap()
}

// ==================== Bundle Loading Tests ====================

#[tokio::test]
async fn test_second_load_is_served_from_cache() {
    let source = Arc::new(RecordingSource::default());
    let fixture = loader(source.clone(), 3);

    fixture.loader.load_namespace("common", "en-US", false).await.unwrap();
    fixture.loader.load_namespace("common", "en-US", false).await.unwrap();

    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    let samples = fixture.monitor.samples("en-US", "common");
    assert_eq!(samples.len(), 2);
    assert!(!samples[0].from_cache);
    assert!(samples[1].from_cache);
    assert_eq!(fixture.engine.translate("common", "title"), "common en-US");
}

#[tokio::test]
async fn test_concurrency_cap_and_fifo_order() {
    let source = Arc::new(RecordingSource::with_delay(Duration::from_millis(30)));
    let fixture = loader(source.clone(), 2);
    let namespaces = ["ns0", "ns1", "ns2", "ns3", "ns4"];

    let loads = namespaces
        .iter()
        .map(|ns| fixture.loader.load_namespace(ns, "en-US", false));
    let results = futures::future::join_all(loads).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(source.max_active.load(Ordering::SeqCst), 2);
    assert_eq!(*source.started.lock().unwrap(), namespaces.to_vec());
}

// ==================== Preference Tests ====================

#[test]
fn test_unsupported_preference_leaves_storage_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(Some(temp_dir.path()), "preferences.json").unwrap();
    let preferences = LanguagePreferenceStore::new(store.clone());

    preferences.save("pt-BR").unwrap();
    let before = store.get(PREFERENCE_KEY).unwrap();

    let err = preferences.save("fr-FR").unwrap_err();
    assert!(matches!(err, I18nError::Validation(_)));
    assert_eq!(store.get(PREFERENCE_KEY).unwrap(), before);
    assert_eq!(preferences.get(), Some(Language::PT_BR));
}

// ==================== Dynamic Translation Tests ====================

#[tokio::test]
async fn test_concurrent_fetches_share_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dynamic-translations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "translations": {"a": "A", "b": "B", "c": "C", "d": "D"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = DynamicTranslationClient::new(client_config(&server));
    let keys = |ks: &[&str]| ks.iter().map(|k| k.to_string()).collect::<Vec<_>>();
    let (first_keys, second_keys) = (keys(&["a", "b"]), keys(&["c", "d"]));
    let (first, second) = tokio::join!(
        client.fetch_translations(&first_keys, "pt-BR"),
        client.fetch_translations(&second_keys, "pt-BR"),
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first["a"], "A");
    assert_eq!(second.len(), 2);
    assert_eq!(second["d"], "D");
    assert_eq!(client.requests_sent(), 1);
}

#[tokio::test]
async fn test_retry_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = DynamicTranslationClient::new(ApiClientConfig {
        max_retries: 2,
        ..client_config(&server)
    });
    let err = client
        .fetch_translations(&["k".to_string()], "en-US")
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert_eq!(client.requests_sent(), 3);
}

#[tokio::test]
async fn test_fallback_chain_when_api_has_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"translations": {}})))
        .mount(&server)
        .await;

    let service = DynamicTranslationService::new(
        DynamicTranslationClient::new(client_config(&server)),
        Arc::new(TranslationCache::new(MemoryStore::shared(), CacheConfig::default())),
        Arc::new(ResourceStore::new(Language::PT_BR)),
        Arc::new(TranslationMetrics::new()),
        false,
    );

    let params = HashMap::new();
    assert_eq!(service.translate_dynamic("k", None, &params).await, "k");
    assert_eq!(service.translate_dynamic("k", Some("Olá"), &params).await, "Olá");
}

#[tokio::test]
async fn test_default_language_translation_is_used() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"language": "pt-BR"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"translations": {}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"language": "en-US"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"translations": {"k": "Hello"}})),
        )
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let ctx = context(&server, &temp_dir);
    ctx.initialize().await.unwrap();
    ctx.change_language("pt-BR").await.unwrap();

    let result = ctx.get_dynamic_translation("k", None).await;
    assert_eq!(result.text, "Hello");
    assert_eq!(result.source, TranslationSource::DefaultLanguage);
    assert!(result.is_fallback);
}

// ==================== Language Change Tests ====================

#[tokio::test]
async fn test_language_change_events() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let ctx = context(&server, &temp_dir);
    ctx.initialize().await.unwrap();

    let events: Arc<Mutex<Vec<LanguageEvent>>> = Arc::new(Mutex::new(Vec::new()));
    for kind in [LanguageEventKind::LanguageChanged, LanguageEventKind::FallbackUsed] {
        let events = events.clone();
        ctx.on(
            kind,
            Arc::new(move |event: &LanguageEvent| events.lock().unwrap().push(event.clone())),
        );
    }

    ctx.change_language("pt-PT").await.unwrap();
    {
        let seen = events.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let (LanguageEvent::LanguageChanged(changed), LanguageEvent::FallbackUsed(fallback)) =
            (&seen[0], &seen[1])
        else {
            panic!("unexpected events: {:?}", seen);
        };
        assert_eq!(changed, fallback);
        assert!(changed.fallback_used);
        assert_eq!(changed.requested_language.as_deref(), Some("pt-PT"));
        assert_eq!(changed.new_language, "pt-BR");
    }

    events.lock().unwrap().clear();
    ctx.change_language("pt-BR").await.unwrap();
    let seen = events.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let LanguageEvent::LanguageChanged(changed) = &seen[0] else {
        panic!("unexpected event: {:?}", seen[0]);
    };
    assert!(!changed.fallback_used);
}

#[tokio::test]
async fn test_preference_survives_restart() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();

    {
        let ctx = context(&server, &temp_dir);
        ctx.initialize().await.unwrap();
        ctx.change_language("pt-BR").await.unwrap();
    }

    let ctx = context(&server, &temp_dir);
    assert_eq!(ctx.initialize().await.unwrap(), Language::PT_BR);
    assert_eq!(ctx.translate("common", "title"), "Título");
}

#[tokio::test]
async fn test_unsupported_language_change_is_rejected() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let ctx = context(&server, &temp_dir);
    ctx.initialize().await.unwrap();

    let err = ctx.change_language("xx").await.unwrap_err();
    assert!(matches!(err, I18nError::UnsupportedLanguage(_)));
    assert_eq!(ctx.get_current_language(), Language::EN_US);

    let switches = ctx.monitor().language_switches();
    assert_eq!(switches.len(), 1);
    assert!(!switches[0].success);
}

#[tokio::test]
async fn test_stores_can_be_injected() {
    let server = MockServer::start().await;
    let preferences: Arc<dyn KvStore> = MemoryStore::shared();
    let ctx = I18nContext::builder(Config {
        api_endpoint: server.uri(),
        ..Config::default()
    })
    .stores(Stores {
        preferences: preferences.clone(),
        cache: MemoryStore::shared(),
        metrics: MemoryStore::shared(),
    })
    .bundle_source(Arc::new(EmbeddedBundles::new()))
    .build()
    .unwrap();

    ctx.change_language("pt-BR").await.unwrap();
    assert!(preferences.get(PREFERENCE_KEY).unwrap().is_some());
}
