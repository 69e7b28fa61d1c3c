//! Runtime translations that are not part of any static bundle.
//!
//! Resolution walks the fallback chain: current language (cache, then API),
//! default language, the caller's fallback text, and finally the key itself.
//! `translate_dynamic` never fails; API and cache problems degrade to the
//! next step of the chain.

use crate::error::{I18nError, I18nResult};
use crate::i18n::api_client::DynamicTranslationClient;
use crate::i18n::cache::{Bundle, TranslationCache, SELF_VERSIONED_PREFIX};
use crate::i18n::engine::{interpolate, TranslationEngine};
use crate::i18n::metrics::TranslationMetrics;
use crate::i18n::Language;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache version tag for dynamic entries, independent of bundle versions.
pub const DYNAMIC_CACHE_VERSION: &str = "dynamic-v1";

pub fn dynamic_namespace(key: &str) -> String {
    format!("{}{}", SELF_VERSIONED_PREFIX, key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranslationSource {
    Cache,
    Api,
    DefaultLanguage,
    Fallback,
    Key,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DynamicTranslation {
    pub text: String,
    pub source: TranslationSource,
    pub is_fallback: bool,
    /// Language the text is in (the current language for fallback and key)
    pub language: String,
}

pub struct DynamicTranslationService {
    client: DynamicTranslationClient,
    cache: Arc<TranslationCache>,
    engine: Arc<dyn TranslationEngine>,
    metrics: Arc<TranslationMetrics>,
    show_missing_indicators: bool,
}

impl DynamicTranslationService {
    pub fn new(
        client: DynamicTranslationClient,
        cache: Arc<TranslationCache>,
        engine: Arc<dyn TranslationEngine>,
        metrics: Arc<TranslationMetrics>,
        show_missing_indicators: bool,
    ) -> Self {
        Self {
            client,
            cache,
            engine,
            metrics,
            show_missing_indicators,
        }
    }

    pub fn metrics(&self) -> &Arc<TranslationMetrics> {
        &self.metrics
    }

    fn cached(&self, key: &str, language: &str) -> Option<String> {
        match self
            .cache
            .get(language, &dynamic_namespace(key), DYNAMIC_CACHE_VERSION)
        {
            Some(Bundle::String(text)) => Some(text),
            Some(other) => {
                warn!("Ignoring malformed cached translation for '{}': {}", key, other);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: &str, language: &str, text: &str) {
        self.cache.set(
            language,
            &dynamic_namespace(key),
            DYNAMIC_CACHE_VERSION,
            &Bundle::String(text.to_string()),
        );
    }

    /// Cache first, then the API. `Ok(None)` means no translation exists.
    async fn lookup(&self, key: &str, language: &str) -> I18nResult<Option<(String, TranslationSource)>> {
        if let Some(text) = self.cached(key, language) {
            self.metrics.record_cache_hit();
            return Ok(Some((text, TranslationSource::Cache)));
        }
        self.metrics.record_cache_miss();

        self.metrics.record_api_call();
        let mut found = match self
            .client
            .fetch_translations(&[key.to_string()], language)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                self.metrics.record_api_failure();
                return Err(e);
            }
        };

        Ok(found.remove(key).map(|text| {
            self.store(key, language, &text);
            (text, TranslationSource::Api)
        }))
    }

    pub async fn get_dynamic_translation(&self, key: &str, fallback: Option<&str>) -> DynamicTranslation {
        let current = self.engine.language();
        let default = Language::default_language().code();

        let mut languages = vec![current.as_str()];
        if current != default {
            languages.push(default);
        }

        for language in languages {
            match self.lookup(key, language).await {
                Ok(Some((text, source))) => {
                    let is_fallback = language != current;
                    if is_fallback {
                        self.metrics.record_fallback();
                    }
                    return DynamicTranslation {
                        text,
                        source: if is_fallback {
                            TranslationSource::DefaultLanguage
                        } else {
                            source
                        },
                        is_fallback,
                        language: language.to_string(),
                    };
                }
                Ok(None) => debug!("No {} translation for '{}'", language, key),
                Err(e) => warn!("Dynamic translation of '{}' in {} failed: {}", key, language, e),
            }
        }

        self.metrics.record_fallback();
        match fallback {
            Some(text) => DynamicTranslation {
                text: text.to_string(),
                source: TranslationSource::Fallback,
                is_fallback: true,
                language: current,
            },
            None => DynamicTranslation {
                text: if self.show_missing_indicators {
                    format!("[{}]", key)
                } else {
                    key.to_string()
                },
                source: TranslationSource::Key,
                is_fallback: true,
                language: current,
            },
        }
    }

    pub async fn translate_dynamic(
        &self,
        key: &str,
        fallback: Option<&str>,
        params: &HashMap<String, String>,
    ) -> String {
        let resolved = self.get_dynamic_translation(key, fallback).await;
        interpolate(&resolved.text, params)
    }

    /// Fetch and cache every key not already cached for the current language.
    pub async fn preload_dynamic_translations(&self, keys: &[String]) -> I18nResult<()> {
        let language = self.engine.language();
        let missing: Vec<String> = keys
            .iter()
            .filter(|key| self.cached(key, &language).is_none())
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        self.metrics.record_api_call();
        let found = self
            .client
            .fetch_translations(&missing, &language)
            .await
            .map_err(|e| {
                self.metrics.record_api_failure();
                I18nError::DynamicTranslation(Box::new(e))
            })?;

        for (key, text) in &found {
            self.store(key, &language, text);
        }
        debug!(
            "Preloaded {}/{} dynamic translations for {}",
            found.len(),
            missing.len(),
            language
        );
        Ok(())
    }

    /// Drop stale cache entries after a language switch.
    pub fn handle_language_change(&self, language: &str) {
        let removed = self.cache.cleanup();
        debug!(
            "Language changed to {}; removed {} stale cache entries",
            language, removed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::api_client::ApiClientConfig;
    use crate::i18n::cache::CacheConfig;
    use crate::i18n::engine::ResourceStore;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::{
        matchers::{body_partial_json, method},
        Mock, MockServer, ResponseTemplate,
    };

    fn service(server: &MockServer, language: Language, show_missing: bool) -> DynamicTranslationService {
        let client = DynamicTranslationClient::new(ApiClientConfig {
            endpoint: server.uri(),
            batch_window: Duration::from_millis(5),
            throttle: Duration::ZERO,
            max_retries: 0,
            ..ApiClientConfig::default()
        });
        DynamicTranslationService::new(
            client,
            Arc::new(TranslationCache::new(MemoryStore::shared(), CacheConfig::default())),
            Arc::new(ResourceStore::new(language)),
            Arc::new(TranslationMetrics::new()),
            show_missing,
        )
    }

    async fn respond(server: &MockServer, language: &str, translations: serde_json::Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "language": language })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "translations": translations })),
            )
            .mount(server)
            .await;
    }

    fn no_params() -> HashMap<String, String> {
        HashMap::new()
    }

    // ==================== Fallback Chain Tests ====================

    #[tokio::test]
    async fn test_default_language_tier() {
        let server = MockServer::start().await;
        respond(&server, "pt-BR", json!({})).await;
        respond(&server, "en-US", json!({"k": "Hello"})).await;

        let service = service(&server, Language::PT_BR, false);
        let result = service.get_dynamic_translation("k", None).await;

        assert_eq!(result.text, "Hello");
        assert_eq!(result.source, TranslationSource::DefaultLanguage);
        assert!(result.is_fallback);
        assert_eq!(result.language, "en-US");
    }

    #[tokio::test]
    async fn test_missing_everywhere_returns_key_or_fallback() {
        let server = MockServer::start().await;
        respond(&server, "pt-BR", json!({})).await;
        respond(&server, "en-US", json!({})).await;

        let service = service(&server, Language::PT_BR, false);
        assert_eq!(service.translate_dynamic("k", None, &no_params()).await, "k");
        assert_eq!(
            service.translate_dynamic("k", Some("Olá"), &no_params()).await,
            "Olá"
        );
    }

    #[tokio::test]
    async fn test_missing_indicator_mode() {
        let server = MockServer::start().await;
        respond(&server, "en-US", json!({})).await;

        let service = service(&server, Language::EN_US, true);
        let result = service.get_dynamic_translation("banner.title", None).await;
        assert_eq!(result.text, "[banner.title]");
        assert_eq!(result.source, TranslationSource::Key);
    }

    #[tokio::test]
    async fn test_api_errors_degrade_to_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let service = service(&server, Language::EN_US, false);
        let text = service
            .translate_dynamic("k", Some("Default {{name}}"), &HashMap::from([(
                "name".to_string(),
                "text".to_string(),
            )]))
            .await;
        assert_eq!(text, "Default text");
        assert_eq!(service.metrics().api_failures(), 1);
    }

    // ==================== Cache Tests ====================

    #[tokio::test]
    async fn test_api_result_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"translations": {"greeting": "Hi {{name}}"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let service = service(&server, Language::EN_US, false);
        let params = HashMap::from([("name".to_string(), "Ana".to_string())]);

        assert_eq!(service.translate_dynamic("greeting", None, &params).await, "Hi Ana");
        let second = service.get_dynamic_translation("greeting", None).await;
        assert_eq!(second.source, TranslationSource::Cache);
        assert_eq!(second.text, "Hi {{name}}");
        assert_eq!(service.metrics().cache_hits(), 1);
    }

    #[tokio::test]
    async fn test_cached_translation_survives_language_change() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"translations": {"k": "Hello"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let service = service(&server, Language::EN_US, false);
        assert_eq!(service.translate_dynamic("k", None, &no_params()).await, "Hello");
        assert!(service.cached("k", "en-US").is_some());

        service.handle_language_change("pt-BR");

        assert_eq!(service.cached("k", "en-US").as_deref(), Some("Hello"));
        let again = service.get_dynamic_translation("k", None).await;
        assert_eq!(again.source, TranslationSource::Cache);
    }

    // ==================== Preload Tests ====================

    #[tokio::test]
    async fn test_preload_caches_missing_keys() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"translations": {"a": "A", "b": "B"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let service = service(&server, Language::EN_US, false);
        service
            .preload_dynamic_translations(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        // Already cached: no second request
        service
            .preload_dynamic_translations(&["a".to_string()])
            .await
            .unwrap();
        assert_eq!(
            service.get_dynamic_translation("b", None).await.source,
            TranslationSource::Cache
        );
    }

    #[tokio::test]
    async fn test_preload_failure_is_wrapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let service = service(&server, Language::EN_US, false);
        let err = service
            .preload_dynamic_translations(&["a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, I18nError::DynamicTranslation(_)));
        assert_eq!(err.status(), Some(404));
    }
}
