//! Where static translation bundles come from.
//!
//! Each `(language, namespace)` pair maps to a loadable resource: an embedded
//! table, a JSON file on disk, or a versioned CDN URL.

use crate::error::{I18nError, I18nResult};
use crate::i18n::cache::Bundle;
use crate::i18n::cdn::CdnResolver;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, warn};

#[async_trait]
pub trait BundleSource: Send + Sync {
    async fn fetch(&self, language: &str, namespace: &str) -> I18nResult<Bundle>;
}

fn unavailable(language: &str, namespace: &str, reason: impl Into<String>) -> I18nError {
    I18nError::Bundle {
        language: language.to_string(),
        namespace: namespace.to_string(),
        reason: reason.into(),
    }
}

/// Bundles compiled into or registered with the process.
#[derive(Default)]
pub struct EmbeddedBundles {
    bundles: RwLock<HashMap<(String, String), Bundle>>,
}

impl EmbeddedBundles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, language: &str, namespace: &str, bundle: Bundle) {
        self.bundles
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert((language.to_string(), namespace.to_string()), bundle);
    }

    pub fn with(self, language: &str, namespace: &str, bundle: Bundle) -> Self {
        self.insert(language, namespace, bundle);
        self
    }
}

#[async_trait]
impl BundleSource for EmbeddedBundles {
    async fn fetch(&self, language: &str, namespace: &str) -> I18nResult<Bundle> {
        self.bundles
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&(language.to_string(), namespace.to_string()))
            .cloned()
            .ok_or_else(|| unavailable(language, namespace, "no embedded bundle"))
    }
}

/// `{root}/{language}/{namespace}.json` on the local filesystem.
pub struct DirectoryBundles {
    root: PathBuf,
}

impl DirectoryBundles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, language: &str, namespace: &str) -> PathBuf {
        self.root.join(language).join(format!("{}.json", namespace))
    }
}

#[async_trait]
impl BundleSource for DirectoryBundles {
    async fn fetch(&self, language: &str, namespace: &str) -> I18nResult<Bundle> {
        let path = self.path_for(language, namespace);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| unavailable(language, namespace, format!("{}: {}", path.display(), e)))?;
        let bundle: Bundle = serde_json::from_str(&content)
            .map_err(|e| unavailable(language, namespace, format!("{}: {}", path.display(), e)))?;
        debug!("Read bundle {}", path.display());
        Ok(bundle)
    }
}

/// Versioned bundles fetched over HTTP, trying each CDN in turn.
pub struct CdnBundles {
    client: reqwest::Client,
    resolver: CdnResolver,
}

impl CdnBundles {
    pub fn new(client: reqwest::Client, resolver: CdnResolver) -> Self {
        Self { client, resolver }
    }

    pub fn resolver(&self) -> &CdnResolver {
        &self.resolver
    }

    async fn fetch_url(&self, url: &str) -> Result<Bundle, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        response
            .json::<Bundle>()
            .await
            .map_err(|e| format!("invalid JSON: {}", e))
    }
}

#[async_trait]
impl BundleSource for CdnBundles {
    async fn fetch(&self, language: &str, namespace: &str) -> I18nResult<Bundle> {
        let candidates = self.resolver.candidate_urls(language, namespace);
        if candidates.is_empty() {
            return Err(unavailable(language, namespace, "every CDN is backing off"));
        }

        let mut last_error = String::new();
        for url in candidates {
            match self.fetch_url(&url).await {
                Ok(bundle) => {
                    self.resolver.record_success(&url);
                    return Ok(bundle);
                }
                Err(e) => {
                    warn!("Bundle fetch from {} failed: {}", url, e);
                    self.resolver.record_failure(&url);
                    last_error = e;
                }
            }
        }

        Err(unavailable(language, namespace, last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    // ==================== EmbeddedBundles Tests ====================

    #[tokio::test]
    async fn test_embedded_fetch() {
        let source = EmbeddedBundles::new().with("en-US", "common", json!({"hi": "Hi"}));
        assert_eq!(source.fetch("en-US", "common").await.unwrap(), json!({"hi": "Hi"}));

        let err = source.fetch("pt-BR", "common").await.unwrap_err();
        assert!(matches!(err, I18nError::Bundle { .. }));
    }

    // ==================== DirectoryBundles Tests ====================

    #[tokio::test]
    async fn test_directory_fetch() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::create_dir_all(dir.path().join("pt-BR")).unwrap();
        std::fs::write(dir.path().join("pt-BR/common.json"), r#"{"hello":"Olá"}"#).unwrap();
        std::fs::write(dir.path().join("pt-BR/broken.json"), "{").unwrap();

        let source = DirectoryBundles::new(dir.path());
        assert_eq!(
            source.fetch("pt-BR", "common").await.unwrap(),
            json!({"hello": "Olá"})
        );
        assert!(source.fetch("pt-BR", "broken").await.is_err());
        assert!(source.fetch("pt-BR", "missing").await.is_err());
    }

    // ==================== CdnBundles Tests ====================

    #[tokio::test]
    async fn test_cdn_fetch_uses_versioned_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3.0.0/en-US/common.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hi": "Hi"})))
            .expect(1)
            .mount(&server)
            .await;

        let source = CdnBundles::new(
            reqwest::Client::new(),
            CdnResolver::new(vec![server.uri()], "3.0.0"),
        );
        assert_eq!(source.fetch("en-US", "common").await.unwrap(), json!({"hi": "Hi"}));
    }

    #[tokio::test]
    async fn test_cdn_falls_over_to_backup_and_backs_off_primary() {
        let primary = MockServer::start().await;
        let backup = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .and(path("/1.0.0/pt-BR/forms.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"save": "Salvar"})))
            .expect(2)
            .mount(&backup)
            .await;

        let resolver = CdnResolver::new(vec![primary.uri(), backup.uri()], "1.0.0")
            .with_backoff(Duration::from_secs(60), Duration::from_secs(60));
        let source = CdnBundles::new(reqwest::Client::new(), resolver);

        assert_eq!(
            source.fetch("pt-BR", "forms").await.unwrap(),
            json!({"save": "Salvar"})
        );
        // Primary is backing off, so the second fetch goes straight to backup
        assert!(source.fetch("pt-BR", "forms").await.is_ok());
        let primary_url = format!("{}/1.0.0/pt-BR/forms.json", primary.uri());
        assert_eq!(source.resolver().failure_count(&primary_url), 1);
    }

    #[tokio::test]
    async fn test_cdn_all_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = CdnBundles::new(
            reqwest::Client::new(),
            CdnResolver::new(vec![server.uri()], "1.0.0"),
        );
        let err = source.fetch("en-US", "common").await.unwrap_err();
        assert!(err.to_string().contains("404"), "{}", err);
    }
}
