//! UI-facing field metadata derived from schema declarations.

pub mod inferencer;
pub mod overrides;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::schema::InstanceKind;

pub use inferencer::{derive_metadata, Inferencer, EXCLUDED_FIELDS};
pub use overrides::{ComponentOverrides, OverrideNode, RuntimeOverrides};

/// Display information for a referenced entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefTarget {
    pub model: String,
    pub str_field: String,
}

impl RefTarget {
    pub fn new(model: impl Into<String>, str_field: impl Into<String>) -> Self {
        Self { model: model.into(), str_field: str_field.into() }
    }
}

/// `ref` entry of a metadata record; serialises to `""` when the field is
/// not a reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldRef {
    #[default]
    None,
    Target(RefTarget),
}

impl Serialize for FieldRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldRef::None => serializer.serialize_str(""),
            FieldRef::Target(target) => target.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    pub component_type: String,
    pub required: bool,
    #[serde(rename = "ref")]
    pub reference: FieldRef,
    #[serde(rename = "type")]
    pub instance: InstanceKind,
    pub is_array: bool,
    pub enum_values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_field: Option<String>,
}

/// One entry of the metadata tree: a leaf record, or the sub-tree of an
/// embedded object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataNode {
    Field(FieldMetadata),
    Nested(MetadataTree),
}

impl MetadataNode {
    pub fn as_field(&self) -> Option<&FieldMetadata> {
        match self {
            MetadataNode::Field(field) => Some(field),
            MetadataNode::Nested(_) => None,
        }
    }

    pub fn as_nested(&self) -> Option<&MetadataTree> {
        match self {
            MetadataNode::Nested(tree) => Some(tree),
            MetadataNode::Field(_) => None,
        }
    }
}

pub type MetadataTree = IndexMap<String, MetadataNode>;

/// Configuration bound to a schema at registration time
#[derive(Debug, Clone, Default)]
pub struct MetadataOptions {
    pub default_overrides: ComponentOverrides,
    pub ref_field_mapping: IndexMap<String, RefTarget>,
    pub runtime_overrides: RuntimeOverrides,
}

impl MetadataOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_overrides(mut self, overrides: ComponentOverrides) -> Self {
        self.default_overrides = overrides;
        self
    }

    pub fn ref_field(mut self, entity: impl Into<String>, target: RefTarget) -> Self {
        self.ref_field_mapping.insert(entity.into(), target);
        self
    }

    pub fn runtime_overrides(mut self, overrides: RuntimeOverrides) -> Self {
        self.runtime_overrides = overrides;
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Array field '{0}' has no resolvable member schema")]
    MissingMemberSchema(String),
}
