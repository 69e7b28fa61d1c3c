//! Initial language detection: stored preference, then the environment's
//! locale signal, then the default language.

use crate::i18n::{Direction, Language, LanguagePreferenceStore, LanguageRegistry};
use std::sync::Arc;
use tracing::debug;

/// Provider of the host environment's preferred locales, highest priority first.
pub trait LocaleSource: Send + Sync {
    /// `None` when the signal cannot be read.
    fn preferred_locales(&self) -> Option<Vec<String>>;
}

/// Reads POSIX locale variables (`LC_ALL`, `LC_MESSAGES`, `LANGUAGE`, `LANG`).
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvLocaleSource;

impl LocaleSource for EnvLocaleSource {
    fn preferred_locales(&self) -> Option<Vec<String>> {
        let mut locales = Vec::new();
        for var in ["LC_ALL", "LC_MESSAGES", "LANGUAGE", "LANG"] {
            let Ok(value) = std::env::var(var) else {
                continue;
            };
            // LANGUAGE is a colon-separated priority list
            for part in value.split(':') {
                if let Some(tag) = normalize_posix_locale(part) {
                    if !locales.contains(&tag) {
                        locales.push(tag);
                    }
                }
            }
        }
        Some(locales)
    }
}

/// Fixed list of locales, e.g. parsed from an `Accept-Language` header.
#[derive(Debug, Default, Clone)]
pub struct FixedLocaleSource(pub Vec<String>);

impl LocaleSource for FixedLocaleSource {
    fn preferred_locales(&self) -> Option<Vec<String>> {
        Some(self.0.clone())
    }
}

/// "pt_PT.UTF-8@euro" -> "pt-PT"; "C" and "POSIX" carry no language.
fn normalize_posix_locale(raw: &str) -> Option<String> {
    let tag = raw.split(['.', '@']).next()?.trim();
    if tag.is_empty() || tag.eq_ignore_ascii_case("C") || tag.eq_ignore_ascii_case("POSIX") {
        return None;
    }
    Some(tag.replace('_', "-"))
}

/// Parse an `Accept-Language` header into tags ordered by quality.
pub fn parse_accept_language(header: &str) -> Vec<String> {
    let mut weighted: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.trim().split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }
            let quality = pieces
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((tag.to_string(), quality))
        })
        .collect();
    // Stable sort keeps header order among equal weights
    weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    weighted.into_iter().map(|(tag, _)| tag).collect()
}

pub struct LanguageDetector {
    source: Arc<dyn LocaleSource>,
}

impl LanguageDetector {
    pub fn new(source: Arc<dyn LocaleSource>) -> Self {
        Self { source }
    }

    /// Highest-priority locale reported by the environment.
    pub fn detect_browser_language(&self) -> Option<String> {
        self.source
            .preferred_locales()
            .and_then(|locales| locales.into_iter().find(|l| !l.trim().is_empty()))
    }

    /// First environment locale that maps to a supported language.
    pub fn detect_supported_language(&self) -> Option<Language> {
        self.source
            .preferred_locales()?
            .iter()
            .find_map(|locale| Language::resolve(locale))
    }

    /// Preference (if valid) -> mapped environment locale -> default.
    pub fn determine_initial_language(&self, preferences: &LanguagePreferenceStore) -> Language {
        if let Some(language) = preferences.get() {
            debug!("Initial language from stored preference: {}", language);
            return language;
        }

        if let Some(language) = self.detect_supported_language() {
            debug!("Initial language from environment: {}", language);
            return language;
        }

        debug!("Initial language falls back to default");
        Language::default_language()
    }

    pub fn is_rtl(&self, code: &str) -> bool {
        LanguageRegistry::get().is_rtl(code)
    }

    pub fn direction(&self, code: &str) -> Direction {
        LanguageRegistry::get().direction(code)
    }
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new(Arc::new(EnvLocaleSource))
    }
}
