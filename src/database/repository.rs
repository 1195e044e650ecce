use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::database::expand::{expand_document, Expansion};
use crate::database::models::{EntityRegistry, Model};
use crate::database::record::{deletion_marker, new_document, new_id, strip_system_fields, timestamp, Stored};
use crate::database::store::{Document, DocumentStore, Session, StoreError, UpdateOptions};
use crate::filter::{Filter, FilterData};
use crate::schema::SchemaDeclaration;

/// Entity-agnostic persistence operations for one `Model` type.
///
/// Not-found is `Ok(None)`; store failures propagate unchanged. Soft-deleted
/// documents are invisible to every read.
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    registry: Arc<EntityRegistry>,
    schema: SchemaDeclaration,
    _phantom: PhantomData<T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            registry: self.registry.clone(),
            schema: self.schema.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T: Model> Repository<T> {
    pub fn new(store: Arc<dyn DocumentStore>, registry: Arc<EntityRegistry>) -> Self {
        let schema = registry
            .get(T::ENTITY)
            .map(|registration| registration.schema.clone())
            .unwrap_or_else(|| T::registration().schema);
        Self { store, registry, schema, _phantom: PhantomData }
    }

    /// A filter over this entity's collection
    pub fn query(&self) -> Result<Filter, StoreError> {
        Ok(Filter::new(T::COLLECTION)?)
    }

    pub async fn create(&self, data: T) -> Result<Stored<T>, StoreError> {
        let doc = self.prepare_new(&data)?;
        self.store.insert_one(T::COLLECTION, doc.clone(), None).await?;
        debug!("Created {} {}", T::ENTITY, doc.get("id").and_then(|v| v.as_str()).unwrap_or_default());
        decode(doc)
    }

    pub async fn create_in_transaction(&self, data: T, session: &mut Session) -> Result<Stored<T>, StoreError> {
        let doc = self.prepare_new(&data)?;
        self.store.insert_one(T::COLLECTION, doc.clone(), Some(session)).await?;
        decode(doc)
    }

    pub async fn fetch_all(&self) -> Result<Vec<Stored<T>>, StoreError> {
        self.select_any(&self.query()?).await
    }

    pub async fn fetch_by_id(&self, id: &str) -> Result<Option<Stored<T>>, StoreError> {
        self.store.find_by_id(T::COLLECTION, id, false, None).await?.map(decode).transpose()
    }

    /// Fetch with the named relations replaced by their documents
    pub async fn fetch_by_id_expanded(
        &self,
        id: &str,
        relations: &[&str],
    ) -> Result<Option<Stored<Document>>, StoreError> {
        let expansions: Vec<Expansion> = relations.iter().copied().map(Expansion::from).collect();
        self.fetch_by_id_nested_expanded(id, &expansions).await
    }

    pub async fn fetch_by_id_nested_expanded(
        &self,
        id: &str,
        expansions: &[Expansion],
    ) -> Result<Option<Stored<Document>>, StoreError> {
        match self.store.find_by_id(T::COLLECTION, id, false, None).await? {
            Some(doc) => Ok(Some(decode(self.expand(doc, expansions).await?)?)),
            None => Ok(None),
        }
    }

    /// `$set` the supplied top-level fields and refresh `updatedAt`.
    /// Returns the updated document with `relations` expanded.
    pub async fn update_by_id(
        &self,
        id: &str,
        patch: Document,
        relations: &[&str],
    ) -> Result<Option<Stored<Document>>, StoreError> {
        let set = self.prepare_patch(patch)?;
        let updated = self.store.update_by_id(T::COLLECTION, id, set, UpdateOptions::default(), None).await?;
        match updated {
            Some(doc) => {
                let expansions: Vec<Expansion> = relations.iter().copied().map(Expansion::from).collect();
                Ok(Some(decode(self.expand(doc, &expansions).await?)?))
            }
            None => Ok(None),
        }
    }

    /// `update_by_id` without expansion, decoded as the entity type
    pub async fn update(&self, id: &str, patch: Document) -> Result<Option<Stored<T>>, StoreError> {
        let set = self.prepare_patch(patch)?;
        self.store
            .update_by_id(T::COLLECTION, id, set, UpdateOptions::default(), None)
            .await?
            .map(decode)
            .transpose()
    }

    /// Update the document with this id, or create it under this id with the
    /// supplied fields plus fresh timestamps. Creating requires the supplied
    /// fields to form a complete document.
    pub async fn upsert(&self, id: &str, patch: Document) -> Result<Stored<Document>, StoreError> {
        let now = Utc::now();
        let set = self.prepare_patch(patch)?;
        if self.store.find_by_id(T::COLLECTION, id, true, None).await?.is_none() {
            self.schema.validate(&set).map_err(StoreError::Validation)?;
        }
        let mut set_on_insert = Document::new();
        set_on_insert.insert("createdAt".to_string(), timestamp(now));
        set_on_insert.insert("deleted".to_string(), Value::Bool(false));

        let doc = self
            .store
            .update_by_id(T::COLLECTION, id, set, UpdateOptions::upsert(set_on_insert), None)
            .await?
            .ok_or(StoreError::MissingId)?;
        decode(doc)
    }

    /// Flag the document as deleted; it stays stored but disappears from reads
    pub async fn soft_delete(&self, id: &str, deleted_by: Option<&str>) -> Result<Option<Stored<T>>, StoreError> {
        self.soft_delete_with(id, deleted_by, None).await
    }

    pub async fn soft_delete_in_transaction(
        &self,
        id: &str,
        deleted_by: Option<&str>,
        session: &mut Session,
    ) -> Result<Option<Stored<T>>, StoreError> {
        self.soft_delete_with(id, deleted_by, Some(session)).await
    }

    async fn soft_delete_with(
        &self,
        id: &str,
        deleted_by: Option<&str>,
        session: Option<&mut Session>,
    ) -> Result<Option<Stored<T>>, StoreError> {
        let set = deletion_marker(Utc::now(), deleted_by);
        let deleted = self.store.update_by_id(T::COLLECTION, id, set, UpdateOptions::default(), session).await?;
        if deleted.is_some() {
            debug!("Soft-deleted {} {}", T::ENTITY, id);
        }
        deleted.map(decode).transpose()
    }

    /// First visible document matching `criteria`
    pub async fn find_one(&self, criteria: &Value) -> Result<Option<Stored<T>>, StoreError> {
        let mut filter = self.query()?;
        filter.where_clause(criteria)?.window(None, Some(1));
        Ok(self.select_any(&filter).await?.into_iter().next())
    }

    pub async fn count(&self, criteria: &Value) -> Result<u64, StoreError> {
        let mut filter = self.query()?;
        filter.where_clause(criteria)?;
        self.store.count(&filter).await
    }

    pub async fn count_filter(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.store.count(filter).await
    }

    pub async fn select_any(&self, filter: &Filter) -> Result<Vec<Stored<T>>, StoreError> {
        self.store.find_many(filter).await?.into_iter().map(decode).collect()
    }

    pub async fn select(&self, filter_data: FilterData) -> Result<Vec<Stored<T>>, StoreError> {
        let mut filter = self.query()?;
        filter.assign(filter_data)?;
        self.select_any(&filter).await
    }

    fn prepare_new(&self, data: &T) -> Result<Document, StoreError> {
        let fields: Document = match serde_json::to_value(data)? {
            Value::Object(map) => map,
            _ => Document::new(),
        };
        self.schema.validate(&fields).map_err(StoreError::Validation)?;
        Ok(new_document(&new_id(), fields, Utc::now()))
    }

    fn prepare_patch(&self, mut patch: Document) -> Result<Document, StoreError> {
        let stripped = strip_system_fields(&mut patch);
        if !stripped.is_empty() {
            warn!("Ignoring system fields in {} update: {}", T::ENTITY, stripped.join(", "));
        }
        self.schema.validate_patch(&patch).map_err(StoreError::Validation)?;
        patch.insert("updatedAt".to_string(), timestamp(Utc::now()));
        Ok(patch)
    }

    async fn expand(&self, doc: Document, expansions: &[Expansion]) -> Result<Document, StoreError> {
        if expansions.is_empty() {
            return Ok(doc);
        }
        expand_document(self.store.as_ref(), &self.registry, &self.schema, doc, expansions).await
    }
}

fn decode<U: serde::de::DeserializeOwned>(doc: Document) -> Result<Stored<U>, StoreError> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::models::{ContactStatus, ContactUs, Role, User};
    use serde_json::json;

    fn contact(name: &str) -> ContactUs {
        ContactUs {
            name: name.to_string(),
            phone: "01234567890".to_string(),
            address: "1 Main St".to_string(),
            message: Some("Hello".to_string()),
            follow_up_note: None,
            status: ContactStatus::Pending,
            seo: None,
        }
    }

    fn setup() -> (MemoryStore, Repository<ContactUs>) {
        let store = MemoryStore::new();
        let repo = Repository::new(Arc::new(store.clone()), Arc::new(EntityRegistry::standard()));
        (store, repo)
    }

    fn patch(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_assigns_id_and_timestamps() {
        let (_, repo) = setup();
        let stored = repo.create(contact("Ada")).await.unwrap();

        assert!(uuid::Uuid::parse_str(&stored.id).is_ok());
        assert_eq!(stored.created_at, stored.updated_at);
        assert!(!stored.deleted);
        assert_eq!(stored.data, contact("Ada"));
    }

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct Note {
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        kind: String,
    }

    impl Model for Note {
        const ENTITY: &'static str = "Note";
        const COLLECTION: &'static str = "notes";

        fn registration() -> crate::database::models::EntityRegistration {
            crate::database::models::EntityRegistration::new(
                Self::ENTITY,
                Self::COLLECTION,
                SchemaDeclaration::new()
                    .field("title", crate::schema::FieldDescriptor::text().required())
                    .field("kind", crate::schema::FieldDescriptor::text().enumerated(["memo", "todo"])),
            )
        }
    }

    #[tokio::test]
    async fn create_rejects_schema_violations() {
        let store = MemoryStore::new();
        let notes: Repository<Note> = Repository::new(Arc::new(store.clone()), Arc::new(EntityRegistry::new()));

        let err = notes.create(Note { title: None, kind: "draft".to_string() }).await.unwrap_err();
        match err {
            StoreError::Validation(violations) => {
                let paths: Vec<_> = violations.iter().map(|v| v.path.as_str()).collect();
                assert_eq!(paths, vec!["title", "kind"]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(store.raw_len("notes").await, 0);

        let users: Repository<User> = Repository::new(Arc::new(store.clone()), Arc::new(EntityRegistry::standard()));
        let user = User { name: "A".into(), email: "a@x.io".into(), password: "hash".into(), role: Role::Superadmin };
        assert_eq!(users.create(user.clone()).await.unwrap().data, user);
    }

    #[tokio::test]
    async fn soft_delete_hides_but_preserves() {
        let (store, repo) = setup();
        let stored = repo.create(contact("Ada")).await.unwrap();

        let deleted = repo.soft_delete(&stored.id, Some("admin-1")).await.unwrap().unwrap();
        assert!(deleted.deleted);
        assert!(deleted.deleted_at.is_some());
        assert_eq!(deleted.deleted_by.as_deref(), Some("admin-1"));

        assert!(repo.fetch_by_id(&stored.id).await.unwrap().is_none());
        assert!(repo.fetch_all().await.unwrap().is_empty());
        assert_eq!(repo.count(&json!({})).await.unwrap(), 0);

        let raw = store.find_by_id("contacts", &stored.id, true, None).await.unwrap().unwrap();
        assert_eq!(raw["name"], "Ada");
        assert_eq!(raw["deleted"], true);

        assert!(repo.soft_delete(&stored.id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_sets_only_supplied_fields() {
        let (_, repo) = setup();
        let stored = repo.create(contact("Ada")).await.unwrap();

        let updated = repo
            .update_by_id(&stored.id, patch(json!({ "status": "followed-up", "id": "forged" })), &[])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.id, stored.id);
        assert_eq!(updated.data["status"], "followed-up");
        assert_eq!(updated.data["name"], "Ada");
        assert!(updated.updated_at >= stored.updated_at);
        assert_eq!(updated.created_at, stored.created_at);

        assert!(repo.update_by_id("missing", patch(json!({ "name": "x" })), &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_creates_then_updates() {
        let (_, repo) = setup();

        let created = repo
            .upsert("fixed-id", patch(json!({ "name": "Ada", "phone": "1", "address": "Here" })))
            .await
            .unwrap();
        assert_eq!(created.id, "fixed-id");
        assert_eq!(created.data["name"], "Ada");

        let updated = repo.upsert("fixed-id", patch(json!({ "phone": "2" }))).await.unwrap();
        assert_eq!(updated.data["name"], "Ada");
        assert_eq!(updated.data["phone"], "2");
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(repo.count(&json!({})).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_one_and_count_by_criteria() {
        let (_, repo) = setup();
        repo.create(contact("Ada")).await.unwrap();
        repo.create(contact("Grace")).await.unwrap();

        let found = repo.find_one(&json!({ "name": "Grace" })).await.unwrap().unwrap();
        assert_eq!(found.data.name, "Grace");
        assert!(repo.find_one(&json!({ "name": "Linus" })).await.unwrap().is_none());
        assert_eq!(repo.count(&json!({ "status": "pending" })).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn transactional_create_and_delete() {
        let (store, repo) = setup();
        let mut session = store.begin().await.unwrap();
        let stored = repo.create_in_transaction(contact("Ada"), &mut session).await.unwrap();
        assert!(repo.fetch_by_id(&stored.id).await.unwrap().is_none());
        session.commit().await.unwrap();
        assert!(repo.fetch_by_id(&stored.id).await.unwrap().is_some());

        let mut session = store.begin().await.unwrap();
        let deleted = repo.soft_delete_in_transaction(&stored.id, None, &mut session).await.unwrap();
        assert!(deleted.is_some());
        session.abort().await.unwrap();
        assert!(repo.fetch_by_id(&stored.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expanded_fetch_without_references_is_plain() {
        let (_, repo) = setup();
        let stored = repo.create(contact("Ada")).await.unwrap();
        let expanded = repo.fetch_by_id_expanded(&stored.id, &["name", "unknown"]).await.unwrap().unwrap();
        assert_eq!(expanded.data["name"], "Ada");
        assert!(repo.fetch_by_id_expanded("missing", &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_upsert_cannot_create_an_incomplete_document() {
        let (store, repo) = setup();
        repo.create(contact("Ada")).await.unwrap();

        let err = repo.upsert("fresh-id", patch(json!({ "name": "Partial" }))).await.unwrap_err();
        match err {
            StoreError::Validation(violations) => {
                let paths: Vec<_> = violations.iter().map(|v| v.path.as_str()).collect();
                assert_eq!(paths, vec!["phone", "address"]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(store.raw_len("contacts").await, 1);

        assert_eq!(repo.fetch_all().await.unwrap().len(), 1);
        let page = crate::database::paginate(&repo, &json!({}), &json!({}), 1, 10).await.unwrap();
        assert_eq!(page.total_count, 1);
    }

    #[tokio::test]
    async fn invalid_patches_leave_the_document_readable() {
        let (_, repo) = setup();
        let stored = repo.create(contact("Ada")).await.unwrap();

        for bad in [json!({ "status": "archived" }), json!({ "phone": null }), json!({ "name": 7 })] {
            let err = repo.update_by_id(&stored.id, patch(bad.clone()), &[]).await.unwrap_err();
            assert!(matches!(err, StoreError::Validation(_)), "{} was accepted", bad);
            let err = repo.upsert(&stored.id, patch(bad)).await.unwrap_err();
            assert!(matches!(err, StoreError::Validation(_)));
        }

        let fetched = repo.fetch_by_id(&stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.data, contact("Ada"));
        assert_eq!(repo.fetch_all().await.unwrap().len(), 1);
    }
}
