//! The store-client boundary: every persistence call goes through
//! `DocumentStore`, implemented over PostgreSQL JSONB tables and over an
//! in-process map for tests and local runs.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::database::memory::MemorySession;
use crate::filter::{Filter, FilterError};
use crate::schema::FieldViolation;

/// A stored document: system fields plus entity fields, keyed by name
pub type Document = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("Validation failed: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Validation(Vec<FieldViolation>),

    #[error("Session does not belong to this store backend")]
    SessionMismatch,

    #[error("Document '{id}' already exists in '{collection}'")]
    DuplicateId { collection: String, id: String },

    #[error("A document in '{collection}' already has this '{field}'")]
    UniqueViolation { collection: String, field: String },

    #[error("Document has no string 'id' field")]
    MissingId,

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Options for `DocumentStore::update_by_id`
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Insert `{id} + set + set_on_insert` when no document matches
    pub upsert: bool,
    /// Fields written only when the update inserts
    pub set_on_insert: Document,
    /// Match soft-deleted documents too
    pub include_deleted: bool,
}

impl UpdateOptions {
    pub fn upsert(set_on_insert: Document) -> Self {
        Self { upsert: true, set_on_insert, include_deleted: true }
    }
}

/// Caller-owned transaction handle. Writes become visible on `commit`;
/// dropping or aborting discards them.
pub enum Session {
    Postgres(sqlx::Transaction<'static, sqlx::Postgres>),
    Memory(MemorySession),
}

impl Session {
    pub async fn commit(self) -> Result<(), StoreError> {
        match self {
            Session::Postgres(tx) => Ok(tx.commit().await?),
            Session::Memory(session) => {
                session.commit().await;
                Ok(())
            }
        }
    }

    pub async fn abort(self) -> Result<(), StoreError> {
        match self {
            Session::Postgres(tx) => Ok(tx.rollback().await?),
            Session::Memory(_) => Ok(()),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Session::Postgres(_) => f.write_str("Session::Postgres"),
            Session::Memory(_) => f.write_str("Session::Memory"),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Create the backing collection if it does not exist yet, with a
    /// uniqueness constraint over the visible documents for each of
    /// `unique_fields`
    async fn ensure_collection(&self, collection: &str, unique_fields: &[String]) -> Result<(), StoreError>;

    /// Insert a document carrying a string `id`
    async fn insert_one(
        &self,
        collection: &str,
        doc: Document,
        session: Option<&mut Session>,
    ) -> Result<(), StoreError>;

    async fn find_by_id(
        &self,
        collection: &str,
        id: &str,
        include_deleted: bool,
        session: Option<&mut Session>,
    ) -> Result<Option<Document>, StoreError>;

    async fn find_many(&self, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Count matches, ignoring the filter's sort and window
    async fn count(&self, filter: &Filter) -> Result<u64, StoreError>;

    /// Merge `set` into the top level of the document and return the result.
    /// `None` when nothing matched and `options.upsert` is off.
    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        set: Document,
        options: UpdateOptions,
        session: Option<&mut Session>,
    ) -> Result<Option<Document>, StoreError>;

    async fn begin(&self) -> Result<Session, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

pub(crate) fn document_id(doc: &Document) -> Result<&str, StoreError> {
    doc.get("id").and_then(Value::as_str).ok_or(StoreError::MissingId)
}
