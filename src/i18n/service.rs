//! The language service owns the current language.
//!
//! Every change goes through `change_language` (or `reset_to_default`), which
//! updates the engine, the stored preference and the document attributes
//! before emitting events. Requests are applied one at a time in call order.

use crate::error::{I18nError, I18nResult};
use crate::i18n::detector::LanguageDetector;
use crate::i18n::document::DocumentContext;
use crate::i18n::engine::TranslationEngine;
use crate::i18n::events::{
    EventBus, LanguageChangeEvent, LanguageEvent, PreferenceSyncEvent, SyncSource,
};
use crate::i18n::monitor::PerformanceMonitor;
use crate::i18n::preferences::LanguagePreferenceStore;
use crate::i18n::{Direction, Language, LanguageRegistry};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPreferences {
    pub language: String,
    /// Epoch milliseconds
    pub updated_at: i64,
}

/// Per-user preference storage supplied by the hosting application.
#[async_trait]
pub trait ServerPreferenceProvider: Send + Sync {
    async fn get_user_preferences(&self, user_id: &str) -> I18nResult<Option<ServerPreferences>>;

    async fn save_user_preferences(
        &self,
        user_id: &str,
        preferences: &ServerPreferences,
    ) -> I18nResult<()>;

    async fn clear_user_preferences(&self, user_id: &str) -> I18nResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub language: Language,
    pub source: SyncSource,
    pub conflict_resolved: bool,
}

/// Sets the flag for as long as it is alive.
struct ChangeGuard<'a>(&'a AtomicBool);

impl<'a> ChangeGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ChangeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct LanguageService {
    engine: Arc<dyn TranslationEngine>,
    preferences: Arc<LanguagePreferenceStore>,
    detector: Arc<LanguageDetector>,
    document: Arc<dyn DocumentContext>,
    events: Arc<EventBus>,
    monitor: Arc<PerformanceMonitor>,
    server: Option<Arc<dyn ServerPreferenceProvider>>,
    current: RwLock<Language>,
    /// Set while this service drives the engine, so the engine's own
    /// change notification is not handled a second time
    is_changing: AtomicBool,
    change_lock: tokio::sync::Mutex<()>,
}

impl LanguageService {
    pub fn new(
        engine: Arc<dyn TranslationEngine>,
        preferences: Arc<LanguagePreferenceStore>,
        detector: Arc<LanguageDetector>,
        document: Arc<dyn DocumentContext>,
        events: Arc<EventBus>,
        monitor: Arc<PerformanceMonitor>,
        server: Option<Arc<dyn ServerPreferenceProvider>>,
    ) -> Self {
        let current = Language::resolve(&engine.language()).unwrap_or_default();
        Self {
            engine,
            preferences,
            detector,
            document,
            events,
            monitor,
            server,
            current: RwLock::new(current),
            is_changing: AtomicBool::new(false),
            change_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Apply the initial language (stored preference, environment, default)
    /// without persisting it or emitting events.
    pub fn initialize(&self) -> Language {
        let language = self.detector.determine_initial_language(&self.preferences);
        {
            let _guard = ChangeGuard::new(&self.is_changing);
            self.engine.change_language(language.code());
        }
        self.set_current(language);
        if self.preferences.get().is_some() {
            self.preferences.refresh_timestamp();
        }
        info!("Initial language: {}", language);
        language
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn current_language(&self) -> Language {
        *self.current.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn current_direction(&self) -> Direction {
        self.current_language().direction()
    }

    pub fn is_changing(&self) -> bool {
        self.is_changing.load(Ordering::SeqCst)
    }

    fn set_current(&self, language: Language) {
        *self.current.write().unwrap_or_else(|p| p.into_inner()) = language;
        self.document.set_direction(language.direction());
        self.document.set_lang(language.code());
    }

    /// Switch to `requested`, mapped to a supported language. Fails with
    /// `UnsupportedLanguage` (current language unchanged) when it cannot be
    /// mapped.
    pub async fn change_language(&self, requested: &str) -> I18nResult<()> {
        self.apply(requested, true).await
    }

    async fn apply(&self, requested: &str, persist: bool) -> I18nResult<()> {
        let _serial = self.change_lock.lock().await;
        let started = Instant::now();
        let previous = self.current_language();

        let Some(target) = Language::resolve(requested) else {
            self.monitor
                .record_language_switch(previous.code(), requested, started.elapsed(), false);
            return Err(I18nError::UnsupportedLanguage(requested.to_string()));
        };

        {
            let _guard = ChangeGuard::new(&self.is_changing);
            self.engine.change_language(target.code());
        }

        if persist && target != previous {
            if let Err(e) = self.preferences.save(target.code()) {
                warn!("Could not persist language preference: {}", e);
            }
        }
        self.set_current(target);

        let event = LanguageChangeEvent {
            previous_language: previous.code().to_string(),
            new_language: target.code().to_string(),
            requested_language: Some(requested.to_string()),
            fallback_used: !target.code().eq_ignore_ascii_case(requested.trim()),
        };
        self.monitor
            .record_language_switch(previous.code(), target.code(), started.elapsed(), true);
        debug!("Language changed {} -> {}", previous, target);

        self.events.emit(LanguageEvent::LanguageChanged(event.clone()));
        if event.fallback_used {
            info!("'{}' is served as {}", requested, target);
            self.events.emit(LanguageEvent::FallbackUsed(event));
        }
        Ok(())
    }

    /// Forget the stored preference and switch to the detected environment
    /// language (or the default).
    pub async fn reset_to_default(&self) -> I18nResult<()> {
        self.preferences.clear();
        let language = self
            .detector
            .detect_supported_language()
            .unwrap_or_else(Language::default_language);
        self.apply(language.code(), false).await
    }

    /// Engine listener for language changes that did not go through this
    /// service. Ignored while the service itself is changing the language.
    pub fn handle_engine_language_change(&self, code: &str) {
        if self.is_changing() {
            return;
        }

        let Some(language) = Language::resolve(code) else {
            warn!("Engine switched to unsupported language '{}'", code);
            return;
        };
        let previous = self.current_language();
        if language == previous {
            return;
        }

        if let Err(e) = self.preferences.save(language.code()) {
            warn!("Could not persist language preference: {}", e);
        }
        self.set_current(language);
        self.events
            .emit(LanguageEvent::LanguageChanged(LanguageChangeEvent {
                previous_language: previous.code().to_string(),
                new_language: language.code().to_string(),
                requested_language: None,
                fallback_used: false,
            }));
    }

    pub fn would_use_fallback(&self, code: &str) -> bool {
        LanguageRegistry::get()
            .map_to_supported(code)
            .map(|mapped| !mapped.eq_ignore_ascii_case(code.trim()))
            .unwrap_or(true)
    }

    /// `code`, then its mapped supported language, then the default.
    pub fn get_fallback_chain(&self, code: &str) -> Vec<String> {
        let mut chain = vec![code.to_string()];
        let mut push = |candidate: &str| {
            if !chain.iter().any(|c| c == candidate) {
                chain.push(candidate.to_string());
            }
        };
        if let Some(mapped) = LanguageRegistry::get().map_to_supported(code) {
            push(mapped);
        }
        push(Language::default_language().code());
        chain
    }

    /// Reconcile the local preference with the server. The server wins when
    /// both exist. `None` when no provider is configured, nothing needed
    /// syncing, or the sync failed.
    pub async fn sync_with_server(&self, user_id: &str) -> Option<SyncResult> {
        let provider = self.server.clone()?;
        match self.sync(provider.as_ref(), user_id).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Preference sync for user {} failed: {}", user_id, e);
                None
            }
        }
    }

    async fn sync(
        &self,
        provider: &dyn ServerPreferenceProvider,
        user_id: &str,
    ) -> I18nResult<Option<SyncResult>> {
        let local = self.preferences.get();

        let Some(remote) = provider.get_user_preferences(user_id).await? else {
            let Some(language) = local else {
                return Ok(None);
            };
            provider
                .save_user_preferences(
                    user_id,
                    &ServerPreferences {
                        language: language.code().to_string(),
                        updated_at: Utc::now().timestamp_millis(),
                    },
                )
                .await?;
            debug!("Pushed local preference {} to server", language);
            return Ok(Some(SyncResult {
                language,
                source: SyncSource::Local,
                conflict_resolved: false,
            }));
        };

        let language = Language::resolve(&remote.language)
            .ok_or_else(|| I18nError::UnsupportedLanguage(remote.language.clone()))?;
        let conflict_resolved = local.is_some_and(|local| local != language);

        self.change_language(language.code()).await?;
        self.events
            .emit(LanguageEvent::PreferenceSynced(PreferenceSyncEvent {
                language: language.code().to_string(),
                source: SyncSource::Server,
                conflict_resolved,
            }));

        Ok(Some(SyncResult {
            language,
            source: SyncSource::Server,
            conflict_resolved,
        }))
    }

    /// Remove the user's server-side preference, if a provider is configured.
    pub async fn clear_server_preference(&self, user_id: &str) -> I18nResult<()> {
        match &self.server {
            Some(provider) => provider.clear_user_preferences(user_id).await,
            None => Ok(()),
        }
    }
}
