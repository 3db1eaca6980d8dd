//! Storage and token wiring shared by every handler.

use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;

use datalink_activity::DataChange;
use datalink_auth::Hs256Jwt;
use datalink_infra::seed::{SeedError, ensure_defaults};
use datalink_infra::{DataStore, InMemoryStore, PostgresStore, StoreError};

use crate::config::AppConfig;
use crate::context::CurrentUser;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database: {0}")]
    Store(#[from] StoreError),

    #[error("seeding defaults: {0}")]
    Seed(#[from] SeedError),

    #[error("token lifetime of {0} minutes is out of range")]
    TokenTtl(i64),
}

pub struct AppServices {
    pub store: Arc<dyn DataStore>,
    pub jwt: Arc<Hs256Jwt>,
    pub token_ttl: Duration,
}

impl AppServices {
    pub fn new(store: Arc<dyn DataStore>, jwt_secret: &str, token_ttl: Duration) -> Self {
        Self {
            store,
            jwt: Arc::new(Hs256Jwt::new(jwt_secret)),
            token_ttl,
        }
    }

    /// Unseeded in-memory wiring (dev/test).
    pub fn in_memory(jwt_secret: &str) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), jwt_secret, Duration::minutes(120))
    }

    /// Postgres when `DATABASE_URL` is configured, in-memory otherwise; the
    /// schema is applied and defaults are seeded either way.
    pub async fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let token_ttl = Duration::try_minutes(config.token_ttl_minutes)
            .filter(|ttl| *ttl > Duration::zero())
            .ok_or(ServiceError::TokenTtl(config.token_ttl_minutes))?;
        let store: Arc<dyn DataStore> = match &config.database_url {
            Some(url) => {
                let pg = PostgresStore::connect(url, config.database_max_connections).await?;
                pg.migrate().await?;
                tracing::info!("using postgres store");
                Arc::new(pg)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; data lives in memory and is lost on exit");
                Arc::new(InMemoryStore::new())
            }
        };
        ensure_defaults(&*store, config.bootstrap_admin_password.as_deref()).await?;
        Ok(Self::new(store, &config.jwt_secret, token_ttl))
    }

    /// Append an activity entry for a completed change. Failures are logged
    /// and swallowed: the change itself already succeeded.
    pub async fn record(&self, user: &CurrentUser, change: DataChange) {
        let entry = match change.into_new(&user.actor()) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "activity entry rejected");
                return;
            }
        };
        let kind = entry.kind.clone();
        match self.store.record_activity(entry).await {
            Ok(_) => tracing::debug!(kind = %kind, "activity recorded"),
            Err(e) => tracing::warn!(kind = %kind, error = %e, "failed to record activity"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> AppConfig {
        AppConfig::from_lookup(|_| None).unwrap()
    }

    #[tokio::test]
    async fn memory_wiring_uses_configured_ttl() {
        let services = AppServices::from_config(&memory_config()).await.unwrap();
        assert_eq!(services.token_ttl, Duration::minutes(120));
    }

    #[tokio::test]
    async fn unrepresentable_ttl_fails_startup() {
        let config = AppConfig {
            token_ttl_minutes: i64::MAX,
            ..memory_config()
        };
        assert!(matches!(
            AppServices::from_config(&config).await,
            Err(ServiceError::TokenTtl(i64::MAX))
        ));
    }
}
