//! Persisted language preference with an expiry window.

use crate::error::{I18nError, I18nResult};
use crate::i18n::Language;
use crate::storage::KvStore;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key holding the serialized preference.
pub const PREFERENCE_KEY: &str = "i18n:language-preference";

/// Preferences older than this are treated as absent.
pub const PREFERENCE_EXPIRY_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePreference {
    pub language: Language,
    /// Epoch milliseconds of the last write or refresh
    pub timestamp: i64,
}

impl LanguagePreference {
    pub fn now(language: Language) -> Self {
        Self {
            language,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

pub struct LanguagePreferenceStore {
    store: Arc<dyn KvStore>,
    expiry: Duration,
}

impl LanguagePreferenceStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            expiry: Duration::days(PREFERENCE_EXPIRY_DAYS),
        }
    }

    /// Persist `code` as the preferred language.
    ///
    /// Unsupported codes are rejected with `Validation` before storage is
    /// touched; storage failures propagate as `Storage`.
    pub fn save(&self, code: &str) -> I18nResult<()> {
        let language = Language::from_code(code).map_err(|_| {
            I18nError::Validation(format!("Cannot save unsupported language '{}'", code))
        })?;
        self.write(&LanguagePreference::now(language))
    }

    fn write(&self, preference: &LanguagePreference) -> I18nResult<()> {
        let json = serde_json::to_string(preference)?;
        self.store.set(PREFERENCE_KEY, &json)?;
        debug!("Saved language preference: {}", preference.language);
        Ok(())
    }

    /// The stored preference if present, parseable, supported and unexpired.
    /// Invalid or expired entries are purged. Never fails.
    pub fn get(&self) -> Option<Language> {
        self.get_preference().map(|p| p.language)
    }

    /// Same as [`get`](Self::get) but keeps the timestamp.
    pub fn get_preference(&self) -> Option<LanguagePreference> {
        let raw = match self.store.get(PREFERENCE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read language preference: {}", e);
                return None;
            }
        };

        let preference: LanguagePreference = match serde_json::from_str(&raw) {
            Ok(preference) => preference,
            Err(e) => {
                warn!("Discarding corrupted language preference: {}", e);
                self.clear();
                return None;
            }
        };

        if self.is_expired(&preference) {
            debug!("Language preference expired, purging");
            self.clear();
            return None;
        }

        Some(preference)
    }

    fn is_expired(&self, preference: &LanguagePreference) -> bool {
        let age_ms = Utc::now().timestamp_millis() - preference.timestamp;
        age_ms > self.expiry.num_milliseconds()
    }

    /// Remove the stored preference. Storage errors are logged and swallowed.
    pub fn clear(&self) {
        if let Err(e) = self.store.delete(PREFERENCE_KEY) {
            warn!("Failed to clear language preference: {}", e);
        }
    }

    /// Bump the timestamp of a valid preference to now.
    pub fn refresh_timestamp(&self) -> bool {
        let Some(preference) = self.get_preference() else {
            return false;
        };

        match self.write(&LanguagePreference::now(preference.language)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to refresh language preference: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::FlakyStore;
    use crate::storage::MemoryStore;

    fn store_with_raw(raw: &str) -> (Arc<dyn KvStore>, LanguagePreferenceStore) {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        kv.set(PREFERENCE_KEY, raw).unwrap();
        (kv.clone(), LanguagePreferenceStore::new(kv))
    }

    fn raw_preference(code: &str, age: Duration) -> String {
        let timestamp = (Utc::now() - age).timestamp_millis();
        format!(r#"{{"language":"{}","timestamp":{}}}"#, code, timestamp)
    }

    // ==================== save Tests ====================

    #[test]
    fn test_save_and_get() {
        let prefs = LanguagePreferenceStore::new(Arc::new(MemoryStore::new()));
        prefs.save("pt-BR").unwrap();
        assert_eq!(prefs.get(), Some(Language::PT_BR));
    }

    #[test]
    fn test_save_unsupported_does_not_touch_storage() {
        let (kv, prefs) = store_with_raw(&raw_preference("en-US", Duration::zero()));
        let before = kv.get(PREFERENCE_KEY).unwrap();

        let err = prefs.save("fr-FR").unwrap_err();
        assert!(matches!(err, I18nError::Validation(_)));
        assert_eq!(kv.get(PREFERENCE_KEY).unwrap(), before);
    }

    #[test]
    fn test_save_propagates_storage_error() {
        let flaky = Arc::new(FlakyStore::new());
        flaky.set_fail_writes(true);
        let prefs = LanguagePreferenceStore::new(flaky);

        let err = prefs.save("en-US").unwrap_err();
        assert!(matches!(err, I18nError::Storage(_)));
    }

    // ==================== Expiry Tests ====================

    #[test]
    fn test_preference_just_past_expiry_is_purged() {
        let age = Duration::days(30) + Duration::seconds(1);
        let (kv, prefs) = store_with_raw(&raw_preference("pt-BR", age));

        assert_eq!(prefs.get(), None);
        assert_eq!(kv.get(PREFERENCE_KEY).unwrap(), None);
    }

    #[test]
    fn test_preference_just_before_expiry_is_returned() {
        let age = Duration::days(30) - Duration::seconds(1);
        let (_, prefs) = store_with_raw(&raw_preference("pt-BR", age));

        assert_eq!(prefs.get(), Some(Language::PT_BR));
    }

    // ==================== Corruption Tests ====================

    #[test]
    fn test_corrupted_preference_is_purged() {
        let (kv, prefs) = store_with_raw("{not json");
        assert_eq!(prefs.get(), None);
        assert_eq!(kv.get(PREFERENCE_KEY).unwrap(), None);
    }

    #[test]
    fn test_unsupported_stored_language_is_purged() {
        let (kv, prefs) = store_with_raw(&raw_preference("fr-FR", Duration::zero()));
        assert_eq!(prefs.get(), None);
        assert_eq!(kv.get(PREFERENCE_KEY).unwrap(), None);
    }

    #[test]
    fn test_get_swallows_read_errors() {
        let flaky = Arc::new(FlakyStore::new());
        flaky.set_fail_reads(true);
        let prefs = LanguagePreferenceStore::new(flaky);
        assert_eq!(prefs.get(), None);
    }

    // ==================== clear / refresh Tests ====================

    #[test]
    fn test_clear_swallows_errors() {
        let flaky = Arc::new(FlakyStore::new());
        flaky.set_fail_writes(true);
        LanguagePreferenceStore::new(flaky).clear();
    }

    #[test]
    fn test_refresh_timestamp_bumps_valid_preference() {
        let age = Duration::days(10);
        let (kv, prefs) = store_with_raw(&raw_preference("pt-BR", age));

        assert!(prefs.refresh_timestamp());

        let raw = kv.get(PREFERENCE_KEY).unwrap().unwrap();
        let stored: LanguagePreference = serde_json::from_str(&raw).unwrap();
        let age_ms = Utc::now().timestamp_millis() - stored.timestamp;
        assert!(age_ms < 5_000, "timestamp should be fresh, age {}ms", age_ms);
    }

    #[test]
    fn test_refresh_timestamp_absent_or_invalid() {
        let prefs = LanguagePreferenceStore::new(Arc::new(MemoryStore::new()));
        assert!(!prefs.refresh_timestamp());

        let (kv, prefs) = store_with_raw("garbage");
        assert!(!prefs.refresh_timestamp());
        assert_eq!(kv.get(PREFERENCE_KEY).unwrap(), None);
    }
}
