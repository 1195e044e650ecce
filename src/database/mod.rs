pub mod expand;
pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod query_builder;
pub mod record;
pub mod repository;
pub mod store;

pub use expand::Expansion;
pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use query_builder::{paginate, Page};
pub use record::Stored;
pub use repository::Repository;
pub use store::{Document, DocumentStore, Session, StoreError, UpdateOptions};
