//! `datalink-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod change;
pub mod error;
pub mod id;
pub mod page;
pub mod period;

pub use change::{Change, UpsertReport};
pub use error::{DomainError, DomainResult};
pub use id::{ActivityId, DepartmentId, PermissionId, RecordId, RoleId, RouteId, UserId};
pub use page::Page;
pub use period::{DateBounds, DateRange, Shift, YearMonth};
