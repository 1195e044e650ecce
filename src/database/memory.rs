//! In-process document store. Collections are insertion-ordered maps behind
//! a single `RwLock`; sessions buffer their writes until commit. Unique
//! fields are checked under the write lock, so concurrent writers cannot
//! both claim a value.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::database::models::EntityRegistry;
use crate::database::store::{document_id, Document, DocumentStore, Session, StoreError, UpdateOptions};
use crate::filter::filter::is_deleted;
use crate::filter::Filter;

type Collection = IndexMap<String, Document>;
type Collections = IndexMap<String, Collection>;
type UniqueFields = IndexMap<String, Vec<String>>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
    unique: Arc<RwLock<UniqueFields>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with every registered collection and its unique fields
    /// already set up
    pub fn for_registry(registry: &EntityRegistry) -> Self {
        let mut collections = Collections::new();
        let mut unique = UniqueFields::new();
        for registration in registry.entities() {
            collections.entry(registration.collection.clone()).or_default();
            unique.insert(registration.collection.clone(), registration.schema.unique_fields());
        }
        Self { collections: Arc::new(RwLock::new(collections)), unique: Arc::new(RwLock::new(unique)) }
    }

    async fn unique_fields(&self, collection: &str) -> Vec<String> {
        self.unique.read().await.get(collection).cloned().unwrap_or_default()
    }

    /// Number of documents stored in `collection`, soft-deleted included
    pub async fn raw_len(&self, collection: &str) -> usize {
        self.collections.read().await.get(collection).map_or(0, IndexMap::len)
    }

    fn session<'s>(&self, session: Option<&'s mut Session>) -> Result<Option<&'s mut MemorySession>, StoreError> {
        match session {
            None => Ok(None),
            Some(Session::Memory(memory)) if Arc::ptr_eq(&memory.store, &self.collections) => Ok(Some(memory)),
            Some(_) => Err(StoreError::SessionMismatch),
        }
    }
}

/// Buffered writes of one memory-store session, keyed by collection and id
pub struct MemorySession {
    store: Arc<RwLock<Collections>>,
    writes: IndexMap<(String, String), Document>,
}

impl MemorySession {
    fn pending(&self, collection: &str, id: &str) -> Option<&Document> {
        self.writes.get(&(collection.to_string(), id.to_string()))
    }

    pub(crate) async fn commit(self) {
        let mut collections = self.store.write().await;
        let count = self.writes.len();
        for ((collection, id), doc) in self.writes {
            collections.entry(collection).or_default().insert(id, doc);
        }
        debug!("Committed {} buffered write(s)", count);
    }
}

fn visible(doc: Option<&Document>, include_deleted: bool) -> Option<&Document> {
    doc.filter(|doc| include_deleted || !is_deleted(doc))
}

/// The first unique field `doc` shares with another visible document
fn unique_conflict<'a>(
    collection: &str,
    fields: &[String],
    doc: &Document,
    others: impl Iterator<Item = &'a Document> + Clone,
) -> Result<(), StoreError> {
    if is_deleted(doc) {
        return Ok(());
    }
    let id = doc.get("id");
    for field in fields {
        let Some(value) = doc.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        let taken = others
            .clone()
            .any(|other| other.get("id") != id && !is_deleted(other) && other.get(field) == Some(value));
        if taken {
            return Err(StoreError::UniqueViolation { collection: collection.to_string(), field: field.clone() });
        }
    }
    Ok(())
}

/// Committed documents of `collection` as the session sees them
fn overlay<'a>(
    committed: Option<&'a Collection>,
    session: &'a MemorySession,
    collection: &'a str,
) -> impl Iterator<Item = &'a Document> + Clone + 'a {
    let pending = session.writes.iter().filter(move |((c, _), _)| c == collection);
    committed
        .into_iter()
        .flat_map(|docs| docs.iter())
        .filter(move |(id, _)| session.pending(collection, id).is_none())
        .map(|(_, doc)| doc)
        .chain(pending.map(|(_, doc)| doc))
}

fn apply_update(current: Option<Document>, id: &str, set: Document, options: UpdateOptions) -> Option<Document> {
    match current {
        Some(mut doc) => {
            doc.extend(set);
            Some(doc)
        }
        None if options.upsert => {
            let mut doc = Document::new();
            doc.insert("id".to_string(), id.into());
            doc.extend(options.set_on_insert);
            doc.extend(set);
            Some(doc)
        }
        None => None,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ensure_collection(&self, collection: &str, unique_fields: &[String]) -> Result<(), StoreError> {
        Filter::validate_collection_name(collection)?;
        self.unique.write().await.insert(collection.to_string(), unique_fields.to_vec());
        self.collections.write().await.entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn insert_one(
        &self,
        collection: &str,
        doc: Document,
        session: Option<&mut Session>,
    ) -> Result<(), StoreError> {
        Filter::validate_collection_name(collection)?;
        let id = document_id(&doc)?.to_string();
        let duplicate = || StoreError::DuplicateId { collection: collection.to_string(), id: id.clone() };
        let unique = self.unique_fields(collection).await;

        match self.session(session)? {
            Some(session) => {
                let collections = self.collections.read().await;
                let committed = collections.get(collection);
                if committed.is_some_and(|docs| docs.contains_key(&id)) || session.pending(collection, &id).is_some() {
                    return Err(duplicate());
                }
                unique_conflict(collection, &unique, &doc, overlay(committed, session, collection))?;
                drop(collections);
                session.writes.insert((collection.to_string(), id.clone()), doc);
            }
            None => {
                let mut collections = self.collections.write().await;
                let docs = collections.entry(collection.to_string()).or_default();
                if docs.contains_key(&id) {
                    return Err(duplicate());
                }
                unique_conflict(collection, &unique, &doc, docs.values())?;
                docs.insert(id.clone(), doc);
            }
        }
        Ok(())
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: &str,
        include_deleted: bool,
        session: Option<&mut Session>,
    ) -> Result<Option<Document>, StoreError> {
        Filter::validate_collection_name(collection)?;
        if let Some(session) = self.session(session)? {
            if let Some(doc) = session.pending(collection, id) {
                return Ok(visible(Some(doc), include_deleted).cloned());
            }
        }
        let collections = self.collections.read().await;
        let doc = collections.get(collection).and_then(|docs| docs.get(id));
        Ok(visible(doc, include_deleted).cloned())
    }

    async fn find_many(&self, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let docs = collections.get(filter.collection()).map(|docs| docs.values().cloned().collect::<Vec<_>>());
        Ok(filter.apply(docs.unwrap_or_default()))
    }

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        let count = collections
            .get(filter.collection())
            .map_or(0, |docs| docs.values().filter(|doc| filter.matches(doc)).count());
        Ok(count as u64)
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        set: Document,
        options: UpdateOptions,
        session: Option<&mut Session>,
    ) -> Result<Option<Document>, StoreError> {
        Filter::validate_collection_name(collection)?;
        let include_deleted = options.include_deleted || options.upsert;
        let unique = self.unique_fields(collection).await;

        match self.session(session)? {
            Some(session) => {
                let collections = self.collections.read().await;
                let committed = collections.get(collection);
                let current = match session.pending(collection, id) {
                    Some(doc) => visible(Some(doc), include_deleted).cloned(),
                    None => visible(committed.and_then(|docs| docs.get(id)), include_deleted).cloned(),
                };
                let updated = apply_update(current, id, set, options);
                if let Some(doc) = &updated {
                    unique_conflict(collection, &unique, doc, overlay(committed, session, collection))?;
                }
                drop(collections);
                if let Some(doc) = &updated {
                    session.writes.insert((collection.to_string(), id.to_string()), doc.clone());
                }
                Ok(updated)
            }
            None => {
                let mut collections = self.collections.write().await;
                let docs = collections.entry(collection.to_string()).or_default();
                let current = visible(docs.get(id), include_deleted).cloned();
                let updated = apply_update(current, id, set, options);
                if let Some(doc) = &updated {
                    unique_conflict(collection, &unique, doc, docs.values())?;
                    docs.insert(id.to_string(), doc.clone());
                }
                Ok(updated)
            }
        }
    }

    async fn begin(&self) -> Result<Session, StoreError> {
        Ok(Session::Memory(MemorySession { store: self.collections.clone(), writes: IndexMap::new() }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
