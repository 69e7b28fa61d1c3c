//! Language registry: single source of truth for supported languages.
//!
//! Holds the static table of supported languages, the variant mapping table
//! and the right-to-left root tags. Pure lookups, no mutable state, so the
//! registry is a lazily initialised process-wide singleton.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Configuration for a supported language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// BCP 47 tag (e.g., "en-US", "pt-BR")
    pub code: &'static str,

    /// English name of the language (e.g., "English", "Portuguese")
    pub name: &'static str,

    /// Native name of the language (e.g., "English", "Português")
    pub native_name: &'static str,

    /// Region the variant belongs to (e.g., "United States", "Brasil")
    pub region: &'static str,

    /// Whether this is the default language (exactly one should be true)
    pub is_default: bool,

    /// Whether this language is enabled for use
    pub enabled: bool,
}

/// Text direction of a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ltr,
    Rtl,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ltr => "ltr",
            Direction::Rtl => "rtl",
        }
    }
}

pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
    /// Lowercased variant tag -> supported code
    mappings: HashMap<String, &'static str>,
}

static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

/// Root tags written right-to-left.
const RTL_ROOTS: &[&str] = &["ar", "he", "fa", "ur", "yi", "ps", "sd", "ug"];

impl LanguageRegistry {
    /// Get the global language registry instance.
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: default_languages(),
            mappings: default_mappings()
                .iter()
                .map(|(variant, target)| (variant.to_ascii_lowercase(), *target))
                .collect(),
        })
    }

    /// Exact, case-insensitive lookup among enabled and disabled languages.
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        self.languages
            .iter()
            .find(|lang| lang.code.eq_ignore_ascii_case(code))
    }

    pub fn list_enabled(&self) -> Vec<&LanguageConfig> {
        self.languages.iter().filter(|lang| lang.enabled).collect()
    }

    pub fn list_all(&self) -> Vec<&LanguageConfig> {
        self.languages.iter().collect()
    }

    /// The default language configuration.
    ///
    /// # Panics
    /// Panics if the static table does not mark exactly one language as
    /// default, which is a programming error caught by the tests below.
    pub fn default_language(&self) -> &LanguageConfig {
        let defaults: Vec<_> = self.languages.iter().filter(|l| l.is_default).collect();

        match defaults.len() {
            0 => panic!("No default language found in registry"),
            1 => defaults[0],
            _ => panic!("Multiple default languages found in registry"),
        }
    }

    /// `true` if the code names an enabled supported language exactly.
    pub fn is_supported(&self, code: &str) -> bool {
        self.get_by_code(code).map(|l| l.enabled).unwrap_or(false)
    }

    /// Resolve any locale tag to a supported language code.
    ///
    /// Exact match first, then the variant mapping table, then the root tag
    /// (everything before the first `-` or `_`). `None` when nothing matches.
    pub fn map_to_supported(&self, code: &str) -> Option<&'static str> {
        let code = code.trim();
        if code.is_empty() {
            return None;
        }

        if let Some(config) = self.get_by_code(code).filter(|l| l.enabled) {
            return Some(config.code);
        }

        let normalized = code.replace('_', "-").to_ascii_lowercase();
        if let Some(target) = self.mappings.get(&normalized) {
            return Some(*target);
        }

        let root = root_tag(&normalized);
        self.mappings.get(root).copied()
    }

    pub fn is_rtl(&self, code: &str) -> bool {
        let normalized = code.trim().to_ascii_lowercase();
        RTL_ROOTS.contains(&root_tag(&normalized))
    }

    pub fn direction(&self, code: &str) -> Direction {
        if self.is_rtl(code) {
            Direction::Rtl
        } else {
            Direction::Ltr
        }
    }
}

/// Root language subtag of a tag ("pt-PT" -> "pt").
pub fn root_tag(code: &str) -> &str {
    code.split(['-', '_']).next().unwrap_or(code)
}

fn default_languages() -> Vec<LanguageConfig> {
    vec![
        LanguageConfig {
            code: "en-US",
            name: "English",
            native_name: "English",
            region: "United States",
            is_default: true,
            enabled: true,
        },
        LanguageConfig {
            code: "pt-BR",
            name: "Portuguese",
            native_name: "Português",
            region: "Brasil",
            is_default: false,
            enabled: true,
        },
    ]
}

/// Variants and root tags that resolve to a supported language.
fn default_mappings() -> &'static [(&'static str, &'static str)] {
    &[
        ("en", "en-US"),
        ("en-GB", "en-US"),
        ("en-CA", "en-US"),
        ("en-AU", "en-US"),
        ("pt", "pt-BR"),
        ("pt-PT", "pt-BR"),
        ("pt-AO", "pt-BR"),
        ("pt-MZ", "pt-BR"),
    ]
}
