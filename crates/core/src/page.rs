//! Offset pagination shared by list endpoints.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Upper bound on a single page, regardless of what the caller asks for.
pub const MAX_PAGE_SIZE: i64 = 1000;

/// A validated `skip`/`limit` window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

impl Page {
    /// Build a page from optional query values, falling back to `default_limit`.
    pub fn from_query(skip: Option<i64>, limit: Option<i64>, default_limit: i64) -> DomainResult<Self> {
        let skip = skip.unwrap_or(0);
        let limit = limit.unwrap_or(default_limit);
        if skip < 0 {
            return Err(DomainError::validation("skip must be >= 0"));
        }
        if limit < 0 {
            return Err(DomainError::validation("limit must be >= 0"));
        }
        Ok(Self {
            skip,
            limit: limit.min(MAX_PAGE_SIZE),
        })
    }

    pub fn all() -> Self {
        Self {
            skip: 0,
            limit: MAX_PAGE_SIZE,
        }
    }

    /// Apply the window to an already ordered sequence.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.skip as usize)
            .take(self.limit as usize)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_caps() {
        let p = Page::from_query(None, None, 10).unwrap();
        assert_eq!(p, Page { skip: 0, limit: 10 });

        let p = Page::from_query(Some(5), Some(50_000), 10).unwrap();
        assert_eq!(p.limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn rejects_negative_values() {
        assert!(Page::from_query(Some(-1), None, 10).is_err());
        assert!(Page::from_query(None, Some(-1), 10).is_err());
    }

    #[test]
    fn applies_window() {
        let p = Page { skip: 2, limit: 2 };
        assert_eq!(p.apply(1..=10), vec![3, 4]);
    }
}
