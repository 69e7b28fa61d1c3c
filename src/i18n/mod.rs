//! Internationalization runtime.
//!
//! # Architecture
//!
//! - `registry` / `language`: supported languages, variant mapping, direction
//! - `preferences` / `detector`: stored preference and initial language
//! - `cache` / `cdn` / `bundles`: where namespace bundles come from and how
//!   they are kept between runs
//! - `namespaces` / `loader` / `startup`: what to load, when, and how many at once
//! - `api_client` / `dynamic`: runtime translations from the remote API
//! - `service` / `events` / `engine` / `document`: the current language and
//!   everything that reacts to it
//! - `monitor` / `metrics`: telemetry
//!
//! # Example
//!
//! ```rust,ignore
//! use locale_runtime::i18n::{Language, LanguageRegistry};
//!
//! let language = Language::resolve("pt-PT");
//! assert_eq!(language, Some(Language::PT_BR));
//!
//! let languages = LanguageRegistry::get().list_enabled();
//! ```

pub mod api_client;
pub mod bundles;
pub mod cache;
pub mod cdn;
pub mod detector;
pub mod document;
pub mod dynamic;
pub mod engine;
pub mod events;
mod language;
pub mod loader;
mod metrics;
pub mod monitor;
pub mod namespaces;
pub mod preferences;
mod registry;
pub mod service;
pub mod startup;

pub use api_client::{ApiClientConfig, DynamicTranslationClient};
pub use bundles::{BundleSource, CdnBundles, DirectoryBundles, EmbeddedBundles};
pub use cache::{Bundle, CacheConfig, CacheConfigUpdate, CacheMetrics, TranslationCache};
pub use cdn::CdnResolver;
pub use detector::{EnvLocaleSource, FixedLocaleSource, LanguageDetector, LocaleSource};
pub use document::{DocumentAttributes, DocumentContext};
pub use dynamic::{DynamicTranslation, DynamicTranslationService, TranslationSource};
pub use engine::{ResourceStore, TranslationEngine};
pub use events::{
    EventBus, LanguageChangeEvent, LanguageEvent, LanguageEventKind, ListenerId, SyncSource,
};
pub use language::Language;
pub use loader::{LoaderConfig, TranslationLoader};
pub use metrics::{MetricsReport, TranslationMetrics};
pub use monitor::{MonitorConfig, PerformanceMonitor};
pub use namespaces::{NamespaceConfig, NamespaceRegistry, Priority};
pub use preferences::{LanguagePreference, LanguagePreferenceStore};
pub use registry::{Direction, LanguageConfig, LanguageRegistry};
pub use service::{LanguageService, ServerPreferenceProvider, ServerPreferences, SyncResult};
pub use startup::{StartupMetrics, StartupOptimizer};
