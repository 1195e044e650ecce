use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::database::memory::MemoryStore;
use crate::database::models::EntityRegistry;
use crate::database::postgres::PgDocumentStore;
use crate::database::store::{DocumentStore, StoreError};

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns store connect/disconnect and collection setup
pub struct DatabaseManager;

impl DatabaseManager {
    /// Build the configured store and create the collections of every
    /// registered entity
    pub async fn connect(
        config: &DatabaseConfig,
        registry: &EntityRegistry,
    ) -> Result<Arc<dyn DocumentStore>, DatabaseError> {
        let store: Arc<dyn DocumentStore> = match config.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Postgres => {
                let url = Self::connection_string(config)?;
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(Duration::from_secs(config.connection_timeout))
                    .connect(&url)
                    .await?;
                Arc::new(PgDocumentStore::new(pool))
            }
        };

        for registration in registry.entities() {
            store.ensure_collection(&registration.collection, &registration.schema.unique_fields()).await?;
        }

        info!("Connected {} store with {} collections", store.backend(), registry.entities().count());
        Ok(store)
    }

    fn connection_string(config: &DatabaseConfig) -> Result<String, DatabaseError> {
        let raw = config.url.as_deref().ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        let url = url::Url::parse(raw).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        match url.scheme() {
            "postgres" | "postgresql" => Ok(url.into()),
            _ => Err(DatabaseError::InvalidDatabaseUrl),
        }
    }

    /// Pings the store
    pub async fn health_check(store: &dyn DocumentStore) -> Result<(), DatabaseError> {
        store.health_check().await?;
        Ok(())
    }
}
