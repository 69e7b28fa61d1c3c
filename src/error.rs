//! Error taxonomy for the translation runtime.
//!
//! Variants carry owned strings instead of source errors so the type is
//! `Clone`: a single in-flight namespace load is shared by every caller that
//! asked for it, and each of them receives its own copy of the outcome.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum I18nError {
    /// Input rejected before any side effect happened.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A language code that cannot be mapped to a supported language.
    #[error("Unsupported language: '{0}'")]
    UnsupportedLanguage(String),

    /// The durable storage medium is unavailable or a read/write failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A namespace load did not finish within the loader timeout.
    #[error("Loading namespace '{namespace}' for {language} timed out after {timeout_ms}ms")]
    LoadTimeout {
        language: String,
        namespace: String,
        timeout_ms: u64,
    },

    /// A single HTTP attempt exceeded its timeout.
    #[error("Request timed out after {0}ms")]
    RequestTimeout(u64),

    /// Transport-level failure (connection refused, DNS, broken body).
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from the dynamic translation API.
    #[error("Translation API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Preloading dynamic translations failed.
    #[error("Dynamic translation error: {0}")]
    DynamicTranslation(Box<I18nError>),

    /// No bundle could be produced for a (language, namespace) pair.
    #[error("Bundle unavailable for {language}/{namespace}: {reason}")]
    Bundle {
        language: String,
        namespace: String,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl I18nError {
    /// Transient failures worth retrying: transport errors, timeouts and 5xx.
    /// 4xx responses are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            I18nError::Api { status, .. } => *status >= 500,
            I18nError::Network(_) | I18nError::RequestTimeout(_) => true,
            _ => false,
        }
    }

    /// HTTP status code, when the error came from an API response.
    pub fn status(&self) -> Option<u16> {
        match self {
            I18nError::Api { status, .. } => Some(*status),
            I18nError::DynamicTranslation(inner) => inner.status(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for I18nError {
    fn from(e: serde_json::Error) -> Self {
        I18nError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for I18nError {
    fn from(e: std::io::Error) -> Self {
        I18nError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for I18nError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            I18nError::Serialization(e.to_string())
        } else {
            I18nError::Network(e.to_string())
        }
    }
}

pub type I18nResult<T> = Result<T, I18nError>;
