//! Language type: validated representation of a supported language.
//!
//! A `Language` can only be constructed from a code the registry knows, so
//! every component downstream works with resolved languages and never with
//! raw, unrecognised tags.

use crate::error::{I18nError, I18nResult};
use crate::i18n::{Direction, LanguageConfig, LanguageRegistry};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Language {
    /// BCP 47 tag (e.g., "en-US", "pt-BR")
    code: &'static str,
}

impl Language {
    pub const EN_US: Language = Language { code: "en-US" };

    pub const PT_BR: Language = Language { code: "pt-BR" };

    /// Create a Language from an exact supported code.
    ///
    /// Variants such as "pt-PT" are rejected here; use [`Language::resolve`]
    /// to go through the mapping table.
    pub fn from_code(code: &str) -> I18nResult<Language> {
        match LanguageRegistry::get().get_by_code(code) {
            Some(config) if config.enabled => Ok(Language { code: config.code }),
            _ => Err(I18nError::UnsupportedLanguage(code.to_string())),
        }
    }

    /// Resolve any locale tag to a supported language (exact, mapped or root).
    pub fn resolve(code: &str) -> Option<Language> {
        LanguageRegistry::get()
            .map_to_supported(code)
            .map(|code| Language { code })
    }

    /// The default language.
    pub fn default_language() -> Language {
        Language {
            code: LanguageRegistry::get().default_language().code,
        }
    }

    /// Every enabled language, default first.
    pub fn all() -> Vec<Language> {
        let mut languages: Vec<Language> = LanguageRegistry::get()
            .list_enabled()
            .into_iter()
            .map(|config| Language { code: config.code })
            .collect();
        languages.sort_by_key(|l| !l.is_default());
        languages
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    /// # Panics
    /// Panics if the code is missing from the registry, which cannot happen
    /// for a Language built through `from_code`, `resolve` or the constants.
    pub fn config(&self) -> &'static LanguageConfig {
        LanguageRegistry::get()
            .get_by_code(self.code)
            .expect("Language code should always be valid")
    }

    pub fn name(&self) -> &'static str {
        self.config().name
    }

    pub fn native_name(&self) -> &'static str {
        self.config().native_name
    }

    pub fn region(&self) -> &'static str {
        self.config().region
    }

    pub fn is_default(&self) -> bool {
        self.config().is_default
    }

    pub fn direction(&self) -> Direction {
        LanguageRegistry::get().direction(self.code)
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::default_language()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code)
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code)
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Language::from_code(&code).map_err(serde::de::Error::custom)
    }
}
