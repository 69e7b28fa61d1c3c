//! The active translation engine: holds loaded bundles, knows the current
//! language and notifies listeners when it changes.

use crate::i18n::cache::Bundle;
use crate::i18n::Language;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

pub type LanguageListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Current-language source and bundle sink consumed by the runtime.
pub trait TranslationEngine: Send + Sync {
    fn language(&self) -> String;

    /// Switch language and notify `on_language_changed` listeners.
    fn change_language(&self, code: &str);

    fn add_resource_bundle(&self, language: &str, namespace: &str, bundle: Bundle);

    fn has_resource_bundle(&self, language: &str, namespace: &str) -> bool;

    fn on_language_changed(&self, listener: LanguageListener);
}

/// Replace `{{name}}` placeholders from `params`. Unknown placeholders are
/// left verbatim.
pub fn interpolate(template: &str, params: &HashMap<String, String>) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let placeholder = PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid regex"));

    if params.is_empty() {
        return template.to_string();
    }

    placeholder
        .replace_all(template, |caps: &Captures| match params.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Look up a dotted key ("buttons.save") inside a bundle.
pub fn lookup<'a>(bundle: &'a Bundle, key: &str) -> Option<&'a str> {
    if let Some(value) = bundle.get(key).and_then(|v| v.as_str()) {
        return Some(value);
    }
    key.split('.')
        .try_fold(bundle, |node, part| node.get(part))
        .and_then(|v| v.as_str())
}

#[derive(Default)]
struct EngineState {
    language: String,
    bundles: HashMap<(String, String), Bundle>,
}

/// In-process engine backed by a map of bundles.
pub struct ResourceStore {
    state: RwLock<EngineState>,
    listeners: RwLock<Vec<LanguageListener>>,
}

impl ResourceStore {
    pub fn new(language: Language) -> Self {
        Self {
            state: RwLock::new(EngineState {
                language: language.code().to_string(),
                bundles: HashMap::new(),
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Static translation with fallback: current language, default language,
    /// then the key itself.
    pub fn translate(&self, namespace: &str, key: &str) -> String {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        let default = Language::default_language().code().to_string();

        for language in [state.language.clone(), default] {
            if let Some(text) = state
                .bundles
                .get(&(language, namespace.to_string()))
                .and_then(|bundle| lookup(bundle, key))
            {
                return text.to_string();
            }
        }
        key.to_string()
    }

    pub fn translate_with(
        &self,
        namespace: &str,
        key: &str,
        params: &HashMap<String, String>,
    ) -> String {
        interpolate(&self.translate(namespace, key), params)
    }

    pub fn bundle(&self, language: &str, namespace: &str) -> Option<Bundle> {
        self.state
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .bundles
            .get(&(language.to_string(), namespace.to_string()))
            .cloned()
    }
}

impl TranslationEngine for ResourceStore {
    fn language(&self) -> String {
        self.state
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .language
            .clone()
    }

    fn change_language(&self, code: &str) {
        {
            let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
            if state.language == code {
                return;
            }
            state.language = code.to_string();
        }
        // Listeners run without the state lock so they may call back in
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        for listener in listeners {
            listener(code);
        }
    }

    fn add_resource_bundle(&self, language: &str, namespace: &str, bundle: Bundle) {
        self.state
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .bundles
            .insert((language.to_string(), namespace.to_string()), bundle);
    }

    fn has_resource_bundle(&self, language: &str, namespace: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .bundles
            .contains_key(&(language.to_string(), namespace.to_string()))
    }

    fn on_language_changed(&self, listener: LanguageListener) {
        self.listeners
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(listener);
    }
}
