use std::sync::Arc;

use crate::auth::TokenIssuer;
use crate::config::{AppConfig, PaginationConfig};
use crate::database::models::{ContactUs, EntityRegistry, User};
use crate::database::{DocumentStore, Repository};

/// Shared handler state; cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub registry: Arc<EntityRegistry>,
    pub tokens: Arc<TokenIssuer>,
    pub pagination: PaginationConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, registry: Arc<EntityRegistry>, config: &AppConfig) -> Self {
        Self {
            store,
            registry,
            tokens: Arc::new(TokenIssuer::from_config(&config.security)),
            pagination: config.pagination.clone(),
        }
    }

    pub fn users(&self) -> Repository<User> {
        Repository::new(self.store.clone(), self.registry.clone())
    }

    pub fn contacts(&self) -> Repository<ContactUs> {
        Repository::new(self.store.clone(), self.registry.clone())
    }
}
