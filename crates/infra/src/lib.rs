//! Storage layer: async store traits, an in-memory backend for tests and
//! local runs, the Postgres backend and first-start seeding.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod seed;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{
    ActivityStore, DataStore, IdentityStore, MaintenanceStore, NavigationStore, PlantStore, QualityStore,
    load_principal,
};
