//! Warm-cache binary - fetches every registered namespace for every supported
//! language into the persistent bundle cache, then prints the telemetry report.
//!
//! Usage:
//!   cargo run --bin warm-cache
//!
//! Reads the same environment variables as the server. Set I18N_STORAGE_DIR,
//! otherwise the warmed cache is discarded on exit.

use anyhow::Result;
use locale_runtime::i18n::Language;
use locale_runtime::retry::{with_retry, RetryConfig};
use locale_runtime::{config::Config, I18nContext};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("warm_cache=info".parse()?)
                .add_directive("locale_runtime=info".parse()?)
        )
        .init();

    let config = Config::from_env()?;
    if config.storage_dir.is_none() {
        warn!("I18N_STORAGE_DIR not set; the cache only lives for this run");
    }

    let context = I18nContext::from_config(config)?;
    let retry_config = RetryConfig::bundle_fetch();
    let namespaces = context.namespaces().all();

    let mut loaded = 0;
    let mut failed = 0;
    for language in Language::all() {
        for namespace in &namespaces {
            let name = format!("{}/{}", language, namespace);
            let result = with_retry(&retry_config, &name, || {
                context.loader().load_namespace(namespace, language.code(), true)
            })
            .await;

            match result {
                Ok(()) => loaded += 1,
                Err(e) => {
                    warn!("Skipping {}: {}", name, e);
                    failed += 1;
                }
            }
        }
    }

    info!("✓ Warmed {} bundles ({} failed)", loaded, failed);
    println!("{}", context.generate_report());

    Ok(())
}
