use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::database::store::Document;

/// Fields owned by the data layer; callers cannot write them directly
pub const SYSTEM_FIELDS: &[&str] = &["id", "createdAt", "updatedAt", "deleted", "deletedAt", "deletedBy"];

/// A persisted entity: system envelope plus the entity's own fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stored<T> {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Stored<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Stored<U> {
        Stored {
            id: self.id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted: self.deleted,
            deleted_at: self.deleted_at,
            deleted_by: self.deleted_by,
            data: f(self.data),
        }
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Fixed-width RFC 3339 so stored timestamps order correctly as strings
pub fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Remove system fields from caller-supplied data, returning their names
pub fn strip_system_fields(data: &mut Document) -> Vec<String> {
    let stripped: Vec<String> = data.keys().filter(|k| SYSTEM_FIELDS.contains(&k.as_str())).cloned().collect();
    for key in &stripped {
        data.remove(key);
    }
    stripped
}

/// Build a fresh document: id first, entity fields, then timestamps
pub fn new_document(id: &str, mut data: Document, now: DateTime<Utc>) -> Document {
    strip_system_fields(&mut data);
    let mut doc = Document::new();
    doc.insert("id".to_string(), id.into());
    doc.extend(data);
    doc.insert("createdAt".to_string(), timestamp(now));
    doc.insert("updatedAt".to_string(), timestamp(now));
    doc.insert("deleted".to_string(), Value::Bool(false));
    doc
}

/// Fields written by a soft delete
pub fn deletion_marker(now: DateTime<Utc>, deleted_by: Option<&str>) -> Document {
    let mut set = Document::new();
    set.insert("deleted".to_string(), Value::Bool(true));
    set.insert("deletedAt".to_string(), timestamp(now));
    if let Some(by) = deleted_by {
        set.insert("deletedBy".to_string(), by.into());
    }
    set
}
