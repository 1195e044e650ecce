//! Relation expansion: replaces reference ids with the referenced documents.

use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::debug;

use crate::database::models::EntityRegistry;
use crate::database::store::{Document, DocumentStore, StoreError};
use crate::filter::Filter;
use crate::schema::SchemaDeclaration;

/// One relation to expand, with optional expansions inside the referenced
/// documents, e.g. `Expansion::new("expert").populate(Expansion::new("center"))`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub path: String,
    pub populate: Vec<Expansion>,
}

impl Expansion {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), populate: vec![] }
    }

    pub fn populate(mut self, nested: Expansion) -> Self {
        self.populate.push(nested);
        self
    }
}

impl From<&str> for Expansion {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Expand `expansions` in `doc`, whose shape is described by `schema`.
///
/// Unknown paths and non-reference fields are left untouched. A missing or
/// soft-deleted target becomes `null` for a single reference and is dropped
/// from an array of references.
pub fn expand_document<'a>(
    store: &'a dyn DocumentStore,
    registry: &'a EntityRegistry,
    schema: &'a SchemaDeclaration,
    mut doc: Document,
    expansions: &'a [Expansion],
) -> BoxFuture<'a, Result<Document, StoreError>> {
    async move {
        for expansion in expansions {
            let Some(target) = schema
                .resolve_path(&expansion.path)
                .and_then(|field| field.reference.as_deref())
                .and_then(|entity| registry.get(entity))
            else {
                debug!("Skipping expansion of '{}': not a registered reference", expansion.path);
                continue;
            };

            let Some(slot) = lookup_mut(&mut doc, &expansion.path) else {
                continue;
            };

            let replacement = match &*slot {
                Value::String(id) => {
                    match store.find_by_id(&target.collection, id, false, None).await? {
                        Some(found) => {
                            let expanded =
                                expand_document(store, registry, &target.schema, found, &expansion.populate).await?;
                            Value::Object(expanded)
                        }
                        None => Value::Null,
                    }
                }
                Value::Array(items) => {
                    let ids: Vec<String> = items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
                    if ids.len() != items.len() {
                        // Already expanded or mixed content
                        continue;
                    }
                    let mut filter = Filter::new(target.collection.as_str())?;
                    filter.where_clause(&json!({ "id": { "$in": ids } }))?;
                    let mut by_id: IndexMap<String, Document> = IndexMap::new();
                    for found in store.find_many(&filter).await? {
                        if let Some(id) = found.get("id").and_then(Value::as_str) {
                            by_id.insert(id.to_string(), found.clone());
                        }
                    }

                    let mut expanded = Vec::with_capacity(ids.len());
                    for id in &ids {
                        if let Some(found) = by_id.get(id) {
                            let nested = expand_document(
                                store,
                                registry,
                                &target.schema,
                                found.clone(),
                                &expansion.populate,
                            )
                            .await?;
                            expanded.push(Value::Object(nested));
                        }
                    }
                    Value::Array(expanded)
                }
                _ => continue,
            };

            if let Some(slot) = lookup_mut(&mut doc, &expansion.path) {
                *slot = replacement;
            }
        }
        Ok(doc)
    }
    .boxed()
}

fn lookup_mut<'d>(doc: &'d mut Document, path: &str) -> Option<&'d mut Value> {
    let mut segments = path.split('.');
    let mut current = doc.get_mut(segments.next()?)?;
    for segment in segments {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::models::EntityRegistration;
    use crate::schema::FieldDescriptor;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn registry() -> EntityRegistry {
        let mut registry = EntityRegistry::new();
        registry.insert(EntityRegistration::new(
            "Center",
            "centers",
            SchemaDeclaration::new().field("name", FieldDescriptor::text()),
        ));
        registry.insert(EntityRegistration::new(
            "Expert",
            "experts",
            SchemaDeclaration::new()
                .field("name", FieldDescriptor::text())
                .field("center", FieldDescriptor::reference("Center")),
        ));
        registry
    }

    fn booking_schema() -> SchemaDeclaration {
        SchemaDeclaration::new()
            .field("title", FieldDescriptor::text())
            .field("expert", FieldDescriptor::reference("Expert"))
            .field("backups", FieldDescriptor::reference_array("Expert"))
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_one("centers", doc(json!({ "id": "c1", "name": "North" })), None).await.unwrap();
        store
            .insert_one("experts", doc(json!({ "id": "e1", "name": "Ada", "center": "c1" })), None)
            .await
            .unwrap();
        store
            .insert_one("experts", doc(json!({ "id": "e2", "name": "Gone", "deleted": true })), None)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn expands_single_and_nested_references() {
        let store = seeded().await;
        let registry = registry();
        let schema = booking_schema();
        let booking = doc(json!({ "title": "Intro", "expert": "e1" }));
        let expansions = [Expansion::new("expert").populate(Expansion::new("center"))];

        let expanded = expand_document(&store, &registry, &schema, booking, &expansions).await.unwrap();

        assert_eq!(expanded["title"], "Intro");
        assert_eq!(expanded["expert"]["name"], "Ada");
        assert_eq!(expanded["expert"]["center"]["name"], "North");
    }

    #[tokio::test]
    async fn missing_targets_become_null_or_are_dropped() {
        let store = seeded().await;
        let registry = registry();
        let schema = booking_schema();
        let booking = doc(json!({ "expert": "e2", "backups": ["e2", "e1", "nope"] }));
        let expansions = [Expansion::new("expert"), Expansion::new("backups")];

        let expanded = expand_document(&store, &registry, &schema, booking, &expansions).await.unwrap();

        assert_eq!(expanded["expert"], Value::Null);
        let backups = expanded["backups"].as_array().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0]["id"], "e1");
    }

    #[tokio::test]
    async fn unknown_and_plain_fields_are_untouched() {
        let store = seeded().await;
        let registry = registry();
        let schema = booking_schema();
        let booking = doc(json!({ "title": "e1", "expert": "e1" }));
        let expansions = [Expansion::new("title"), Expansion::new("nothing")];

        let expanded = expand_document(&store, &registry, &schema, booking.clone(), &expansions).await.unwrap();

        assert_eq!(expanded, booking);
    }
}
