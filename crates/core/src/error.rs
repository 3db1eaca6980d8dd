//! Errors raised while checking input against DataLink's data rules.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Rejection of a value or state change by a domain crate.
///
/// Lookups, uniqueness and authorization are decided by storage and the
/// auth crate, which carry their own error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A single field is out of range or malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Fields are individually fine but disagree with each other or with the
    /// stored state (a closed ticket without a resolution, a route loop).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        assert_eq!(
            DomainError::validation("month must be 1..=12, got 13").to_string(),
            "validation failed: month must be 1..=12, got 13"
        );
        assert_eq!(
            DomainError::invariant("route cannot be its own parent").to_string(),
            "invariant violated: route cannot be its own parent"
        );
        assert_eq!(DomainError::invalid_id("abc").to_string(), "invalid identifier: abc");
    }
}
