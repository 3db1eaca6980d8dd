//! `datalink-auth`: pure authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: callers resolve a [`Principal`] and ask
//! the policy functions here.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod navigation;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod seed;

pub use authorize::{
    AuthorizationExplanation, AuthzError, authorize, effective_permissions, explain_authorization, has_permission,
};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256Jwt, JwtValidator, TokenError, TokenIssuer};
pub use navigation::{PathConfig, RouteAccess, RouteEntry, RouteNode};
pub use password::{PasswordError, hash_password, verify_password};
pub use permissions::{Grant, Module, Permission, PermissionLevel};
pub use principal::Principal;
pub use roles::{Role, is_reserved_role};
