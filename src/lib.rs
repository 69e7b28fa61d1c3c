pub mod config;
pub mod context;
pub mod error;
pub mod i18n;
pub mod retry;
pub mod scheduler;
pub mod server;
pub mod storage;

pub use context::{I18nContext, I18nContextBuilder, MaintenanceReport, Stores};
pub use error::{I18nError, I18nResult};
