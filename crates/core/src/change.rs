//! Before/after pairs produced by upserts and updates, fed to the activity log.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change<T> {
    pub before: T,
    pub after: T,
}

/// Result of a keyed bulk upsert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertReport<T> {
    pub created: Vec<T>,
    pub updated: Vec<Change<T>>,
}

impl<T> Default for UpsertReport<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
        }
    }
}

impl<T> UpsertReport<T> {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty()
    }

    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len()
    }
}
