use axum::Router;

pub mod activities;
pub mod assembly;
pub mod common;
pub mod departments;
pub mod ehs;
pub mod events;
pub mod maintenance;
pub mod navigation;
pub mod pcl;
pub mod quality;
pub mod rbac;
pub mod system;
pub mod users;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/users", users::router())
        .nest("/departments", departments::router())
        .merge(rbac::router())
        .merge(navigation::router())
        .nest("/qa", quality::router())
        .nest("/ehs", ehs::router())
        .nest("/events", events::router())
        .nest("/pcl", pcl::router())
        .nest("/assy", assembly::router())
        .nest("/maint", maintenance::router())
        .nest("/activities", activities::router())
}
