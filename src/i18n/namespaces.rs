//! Namespace registry: priority classes, dependencies and loaded state.
//!
//! A passive registry. It records what exists and what has been loaded for
//! which language; scheduling decisions belong to the loader and the startup
//! optimizer.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Required before the application is ready to render
    Critical,
    High,
    Normal,
    Low,
    /// Loaded only on first use
    Lazy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    pub name: String,
    pub priority: Priority,
    pub dependencies: Vec<String>,
    pub preload_all_languages: bool,
}

impl NamespaceConfig {
    pub fn new(name: &str, priority: Priority) -> Self {
        Self {
            name: name.to_string(),
            priority,
            dependencies: Vec::new(),
            preload_all_languages: false,
        }
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn preload_all_languages(mut self) -> Self {
        self.preload_all_languages = true;
        self
    }
}

#[derive(Default)]
struct RegistryState {
    /// Registration order is kept so listings are deterministic
    order: Vec<String>,
    configs: HashMap<String, NamespaceConfig>,
    /// (namespace, language)
    loaded: HashSet<(String, String)>,
    usage: HashMap<String, u64>,
}

#[derive(Default)]
pub struct NamespaceRegistry {
    state: Mutex<RegistryState>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the application's namespaces.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for config in default_namespaces() {
            registry.register(config);
        }
        registry
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register or replace a namespace.
    pub fn register(&self, config: NamespaceConfig) {
        let mut state = self.state();
        if !state.configs.contains_key(&config.name) {
            state.order.push(config.name.clone());
        }
        state.configs.insert(config.name.clone(), config);
    }

    pub fn get(&self, namespace: &str) -> Option<NamespaceConfig> {
        self.state().configs.get(namespace).cloned()
    }

    pub fn is_registered(&self, namespace: &str) -> bool {
        self.state().configs.contains_key(namespace)
    }

    pub fn all(&self) -> Vec<String> {
        self.state().order.clone()
    }

    pub fn mark_loaded(&self, namespace: &str, language: &str) {
        self.state()
            .loaded
            .insert((namespace.to_string(), language.to_string()));
    }

    pub fn is_loaded(&self, namespace: &str, language: &str) -> bool {
        self.state()
            .loaded
            .contains(&(namespace.to_string(), language.to_string()))
    }

    /// Forget loaded state. `None` acts as a wildcard for that component.
    pub fn clear_loaded(&self, namespace: Option<&str>, language: Option<&str>) {
        self.state().loaded.retain(|(ns, lang)| {
            let ns_match = namespace.map_or(true, |n| n == ns);
            let lang_match = language.map_or(true, |l| l == lang);
            !(ns_match && lang_match)
        });
    }

    pub fn loaded_namespaces(&self, language: &str) -> Vec<String> {
        let state = self.state();
        state
            .order
            .iter()
            .filter(|ns| state.loaded.contains(&((*ns).clone(), language.to_string())))
            .cloned()
            .collect()
    }

    pub fn namespaces_by_priority(&self, priority: Priority) -> Vec<String> {
        let state = self.state();
        state
            .order
            .iter()
            .filter(|ns| state.configs.get(*ns).map(|c| c.priority) == Some(priority))
            .cloned()
            .collect()
    }

    pub fn track_usage(&self, namespace: &str) {
        *self.state().usage.entry(namespace.to_string()).or_insert(0) += 1;
    }

    pub fn usage_count(&self, namespace: &str) -> u64 {
        self.state().usage.get(namespace).copied().unwrap_or(0)
    }

    /// Dependencies first, then the namespace itself (depth-first).
    ///
    /// Unregistered dependencies are skipped with a warning; cycles are cut
    /// at the first revisit.
    pub fn load_order(&self, namespace: &str) -> Vec<String> {
        let state = self.state();
        let mut order = Vec::new();
        let mut visiting = HashSet::new();
        visit(&state.configs, namespace, &mut visiting, &mut order);
        order
    }
}

fn visit(
    configs: &HashMap<String, NamespaceConfig>,
    namespace: &str,
    visiting: &mut HashSet<String>,
    order: &mut Vec<String>,
) {
    if !visiting.insert(namespace.to_string()) {
        return;
    }
    if let Some(config) = configs.get(namespace) {
        for dependency in &config.dependencies {
            if configs.contains_key(dependency) {
                visit(configs, dependency, visiting, order);
            } else {
                warn!(
                    "Namespace '{}' depends on unregistered namespace '{}'",
                    namespace, dependency
                );
            }
        }
    }
    order.push(namespace.to_string());
}

fn default_namespaces() -> Vec<NamespaceConfig> {
    vec![
        NamespaceConfig::new("common", Priority::Critical).preload_all_languages(),
        NamespaceConfig::new("navigation", Priority::Critical).preload_all_languages(),
        NamespaceConfig::new("errors", Priority::Critical),
        NamespaceConfig::new("auth", Priority::High),
        NamespaceConfig::new("forms", Priority::High).with_dependencies(&["common"]),
        NamespaceConfig::new("content", Priority::Normal),
        NamespaceConfig::new("events", Priority::Normal),
        NamespaceConfig::new("discussions", Priority::Normal),
        NamespaceConfig::new("points", Priority::Low),
        NamespaceConfig::new("paywall", Priority::Low),
        NamespaceConfig::new("admin", Priority::Lazy).with_dependencies(&["common", "forms"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_by_priority() {
        let registry = NamespaceRegistry::with_defaults();
        assert_eq!(
            registry.namespaces_by_priority(Priority::Critical),
            vec!["common", "navigation", "errors"]
        );
        assert_eq!(registry.namespaces_by_priority(Priority::Lazy), vec!["admin"]);
        assert!(registry.get("common").unwrap().preload_all_languages);
    }

    #[test]
    fn test_register_replaces_without_duplicating() {
        let registry = NamespaceRegistry::new();
        registry.register(NamespaceConfig::new("x", Priority::Low));
        registry.register(NamespaceConfig::new("x", Priority::High));

        assert_eq!(registry.all(), vec!["x"]);
        assert_eq!(registry.get("x").unwrap().priority, Priority::High);
    }

    // ==================== Loaded State Tests ====================

    #[test]
    fn test_mark_and_check_loaded() {
        let registry = NamespaceRegistry::with_defaults();
        assert!(!registry.is_loaded("common", "en-US"));

        registry.mark_loaded("common", "en-US");
        assert!(registry.is_loaded("common", "en-US"));
        assert!(!registry.is_loaded("common", "pt-BR"));
        assert_eq!(registry.loaded_namespaces("en-US"), vec!["common"]);
    }

    #[test]
    fn test_clear_loaded_with_wildcards() {
        let registry = NamespaceRegistry::with_defaults();
        registry.mark_loaded("common", "en-US");
        registry.mark_loaded("common", "pt-BR");
        registry.mark_loaded("forms", "pt-BR");

        registry.clear_loaded(None, Some("pt-BR"));
        assert!(registry.is_loaded("common", "en-US"));
        assert!(!registry.is_loaded("common", "pt-BR"));
        assert!(!registry.is_loaded("forms", "pt-BR"));

        registry.clear_loaded(Some("common"), None);
        assert!(!registry.is_loaded("common", "en-US"));
    }

    // ==================== Usage Tests ====================

    #[test]
    fn test_track_usage_is_monotonic() {
        let registry = NamespaceRegistry::new();
        assert_eq!(registry.usage_count("common"), 0);
        registry.track_usage("common");
        registry.track_usage("common");
        assert_eq!(registry.usage_count("common"), 2);
    }

    // ==================== Dependency Tests ====================

    #[test]
    fn test_load_order_puts_dependencies_first() {
        let registry = NamespaceRegistry::with_defaults();
        assert_eq!(registry.load_order("admin"), vec!["common", "forms", "admin"]);
        assert_eq!(registry.load_order("auth"), vec!["auth"]);
    }

    #[test]
    fn test_load_order_tolerates_cycles_and_unknown_dependencies() {
        let registry = NamespaceRegistry::new();
        registry.register(NamespaceConfig::new("a", Priority::Normal).with_dependencies(&["b"]));
        registry.register(
            NamespaceConfig::new("b", Priority::Normal).with_dependencies(&["a", "missing"]),
        );

        assert_eq!(registry.load_order("a"), vec!["b", "a"]);
    }
}
