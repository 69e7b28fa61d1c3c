//! Document/UI context receiving direction and language attributes.

use crate::i18n::Direction;
use serde::Serialize;
use std::sync::RwLock;

pub trait DocumentContext: Send + Sync {
    fn set_direction(&self, direction: Direction);
    fn set_lang(&self, code: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSnapshot {
    pub dir: Direction,
    pub lang: String,
}

/// Records the most recent attributes, for hosts that render elsewhere and
/// for diagnostics.
pub struct DocumentAttributes {
    inner: RwLock<DocumentSnapshot>,
}

impl DocumentAttributes {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(DocumentSnapshot {
                dir: Direction::Ltr,
                lang: String::new(),
            }),
        }
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl Default for DocumentAttributes {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentContext for DocumentAttributes {
    fn set_direction(&self, direction: Direction) {
        self.inner.write().unwrap_or_else(|p| p.into_inner()).dir = direction;
    }

    fn set_lang(&self, code: &str) {
        self.inner.write().unwrap_or_else(|p| p.into_inner()).lang = code.to_string();
    }
}
