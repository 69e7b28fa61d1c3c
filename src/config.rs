use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub storage_dir: Option<PathBuf>,

    // Static bundles
    pub bundle_dir: PathBuf,
    pub cdn_base_url: Option<String>,
    pub cdn_fallback_urls: Vec<String>,
    pub bundle_version: String,

    // Translation cache
    pub cache_ttl: Duration,
    pub cache_max_size: usize,
    pub cache_max_entry_size: usize,
    pub offline_support: bool,

    // Loader
    pub max_concurrent_loads: usize,
    pub load_timeout: Duration,
    pub aggressive_caching: bool,

    // Dynamic translation API
    pub api_endpoint: String,
    pub api_batch_size: usize,
    pub api_batch_window: Duration,
    pub api_throttle: Duration,
    pub api_timeout: Duration,
    pub api_max_retries: u32,
    pub api_retry_delay: Duration,
    pub show_missing_indicators: bool,

    // Startup
    /// Languages preloaded in the background (empty = every supported language)
    pub preload_languages: Vec<String>,

    // Diagnostics server
    pub port: u16,
    pub api_key: Option<String>,
    pub maintenance_schedule: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: None,
            bundle_dir: PathBuf::from("locales"),
            cdn_base_url: None,
            cdn_fallback_urls: Vec::new(),
            bundle_version: "1.0.0".to_string(),
            cache_ttl: Duration::from_secs(86_400),
            cache_max_size: 5 * 1024 * 1024,
            cache_max_entry_size: 1024 * 1024,
            offline_support: true,
            max_concurrent_loads: 3,
            load_timeout: Duration::from_millis(10_000),
            aggressive_caching: true,
            api_endpoint: "http://localhost:3000/api".to_string(),
            api_batch_size: 50,
            api_batch_window: Duration::from_millis(10),
            api_throttle: Duration::from_millis(100),
            api_timeout: Duration::from_millis(5_000),
            api_max_retries: 3,
            api_retry_delay: Duration::from_millis(1_000),
            show_missing_indicators: false,
            preload_languages: Vec::new(),
            port: 8080,
            api_key: None,
            maintenance_schedule: "0 0 3 * * *".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            // Storage
            storage_dir: optional_var("I18N_STORAGE_DIR").map(PathBuf::from),

            // Static bundles
            bundle_dir: optional_var("I18N_BUNDLE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.bundle_dir),
            cdn_base_url: optional_var("I18N_CDN_BASE_URL"),
            cdn_fallback_urls: list_var("I18N_CDN_FALLBACK_URLS"),
            bundle_version: optional_var("I18N_BUNDLE_VERSION")
                .unwrap_or(defaults.bundle_version),

            // Translation cache
            cache_ttl: Duration::from_secs(
                parsed_var("I18N_CACHE_TTL_SECS")?.unwrap_or(defaults.cache_ttl.as_secs()),
            ),
            cache_max_size: parsed_var("I18N_CACHE_MAX_SIZE")?
                .unwrap_or(defaults.cache_max_size),
            cache_max_entry_size: parsed_var("I18N_CACHE_MAX_ENTRY_SIZE")?
                .unwrap_or(defaults.cache_max_entry_size),
            offline_support: parsed_var("I18N_OFFLINE_SUPPORT")?
                .unwrap_or(defaults.offline_support),

            // Loader
            max_concurrent_loads: parsed_var("I18N_MAX_CONCURRENT_LOADS")?
                .unwrap_or(defaults.max_concurrent_loads),
            load_timeout: millis_var("I18N_LOAD_TIMEOUT_MS", defaults.load_timeout)?,
            aggressive_caching: parsed_var("I18N_AGGRESSIVE_CACHING")?
                .unwrap_or(defaults.aggressive_caching),

            // Dynamic translation API
            api_endpoint: optional_var("I18N_API_ENDPOINT").unwrap_or(defaults.api_endpoint),
            api_batch_size: parsed_var("I18N_API_BATCH_SIZE")?
                .unwrap_or(defaults.api_batch_size),
            api_batch_window: millis_var("I18N_API_BATCH_WINDOW_MS", defaults.api_batch_window)?,
            api_throttle: millis_var("I18N_API_THROTTLE_MS", defaults.api_throttle)?,
            api_timeout: millis_var("I18N_API_TIMEOUT_MS", defaults.api_timeout)?,
            api_max_retries: parsed_var("I18N_API_MAX_RETRIES")?
                .unwrap_or(defaults.api_max_retries),
            api_retry_delay: millis_var("I18N_API_RETRY_DELAY_MS", defaults.api_retry_delay)?,
            show_missing_indicators: parsed_var("I18N_SHOW_MISSING")?
                .unwrap_or(defaults.show_missing_indicators),

            // Startup
            preload_languages: list_var("I18N_PRELOAD_LANGUAGES"),

            // Diagnostics server
            port: parsed_var("PORT")?.unwrap_or(defaults.port),
            api_key: optional_var("API_KEY"),
            maintenance_schedule: optional_var("MAINTENANCE_SCHEDULE")
                .unwrap_or(defaults.maintenance_schedule),
        })
    }
}

/// Read a variable, treating empty values as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    optional_var(name)
        .map(|v| v.parse::<T>().with_context(|| format!("{} has an invalid value: {}", name, v)))
        .transpose()
}

fn millis_var(name: &str, default: Duration) -> Result<Duration> {
    Ok(parsed_var::<u64>(name)?
        .map(Duration::from_millis)
        .unwrap_or(default))
}

fn list_var(name: &str) -> Vec<String> {
    optional_var(name)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "I18N_STORAGE_DIR",
        "I18N_CDN_BASE_URL",
        "I18N_CDN_FALLBACK_URLS",
        "I18N_CACHE_TTL_SECS",
        "I18N_MAX_CONCURRENT_LOADS",
        "I18N_API_THROTTLE_MS",
        "I18N_SHOW_MISSING",
        "I18N_PRELOAD_LANGUAGES",
        "PORT",
        "API_KEY",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_uses_defaults() {
        clear_env();
        let config = Config::from_env().expect("Should load defaults");

        assert!(config.storage_dir.is_none());
        assert!(config.cdn_base_url.is_none());
        assert_eq!(config.cache_ttl, Duration::from_secs(86_400));
        assert_eq!(config.max_concurrent_loads, 3);
        assert_eq!(config.api_throttle, Duration::from_millis(100));
        assert!(!config.show_missing_indicators);
        assert_eq!(config.port, 8080);
        assert!(config.api_key.is_none());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        clear_env();
        std::env::set_var("I18N_STORAGE_DIR", "/tmp/i18n");
        std::env::set_var("I18N_CACHE_TTL_SECS", "60");
        std::env::set_var("I18N_MAX_CONCURRENT_LOADS", "2");
        std::env::set_var("I18N_API_THROTTLE_MS", "25");
        std::env::set_var("I18N_SHOW_MISSING", "true");
        std::env::set_var("I18N_CDN_FALLBACK_URLS", "https://a.example, https://b.example,");
        std::env::set_var("PORT", "9090");

        let config = Config::from_env().expect("Should load overrides");
        clear_env();

        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/i18n")));
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.max_concurrent_loads, 2);
        assert_eq!(config.api_throttle, Duration::from_millis(25));
        assert!(config.show_missing_indicators);
        assert_eq!(
            config.cdn_fallback_urls,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.port, 9090);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid_number() {
        clear_env();
        std::env::set_var("I18N_MAX_CONCURRENT_LOADS", "many");

        let result = Config::from_env();
        clear_env();

        let err = result.unwrap_err().to_string();
        assert!(err.contains("I18N_MAX_CONCURRENT_LOADS"), "{}", err);
    }

    #[test]
    #[serial]
    fn test_empty_values_are_unset() {
        clear_env();
        std::env::set_var("API_KEY", "   ");

        let config = Config::from_env().expect("Should load");
        clear_env();

        assert!(config.api_key.is_none());
    }
}
