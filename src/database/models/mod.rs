//! Entity registration: each persisted type declares its schema, metadata
//! configuration and table display fields once, through `Model`.

pub mod contact;
pub mod user;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::metadata::{Inferencer, MetadataError, MetadataOptions, MetadataTree, RuntimeOverrides};
use crate::schema::SchemaDeclaration;

pub use contact::{ContactStatus, ContactUs, Seo};
pub use user::{Role, User};

/// Everything the data layer and the metadata endpoint need to know about
/// one entity type. The optional parts are the three metadata accessors;
/// leaving one out is a configuration error reported when described.
#[derive(Debug, Clone)]
pub struct EntityRegistration {
    pub name: String,
    pub collection: String,
    pub schema: SchemaDeclaration,
    pub metadata_options: Option<MetadataOptions>,
    pub table_fields: Option<Vec<String>>,
    pub single_instance: Option<bool>,
    /// Records are read-only in the admin UI
    pub view_only: bool,
}

impl EntityRegistration {
    pub fn new(name: impl Into<String>, collection: impl Into<String>, schema: SchemaDeclaration) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            schema,
            metadata_options: Some(MetadataOptions::default()),
            table_fields: None,
            single_instance: None,
            view_only: false,
        }
    }

    pub fn metadata_options(mut self, options: MetadataOptions) -> Self {
        self.metadata_options = Some(options);
        self
    }

    pub fn table_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn single_instance(mut self, single: bool) -> Self {
        self.single_instance = Some(single);
        self
    }

    pub fn view_only(mut self, view_only: bool) -> Self {
        self.view_only = view_only;
        self
    }
}

/// A persisted entity type
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    const ENTITY: &'static str;
    const COLLECTION: &'static str;

    fn registration() -> EntityRegistration;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Model '{0}' not found")]
    UnknownEntity(String),

    #[error("Model '{entity}' does not provide {accessor}")]
    MissingAccessor { entity: String, accessor: &'static str },

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Metadata exposure of one entity, as served by the model endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescription {
    pub metadata: MetadataTree,
    pub table_fields: Vec<String>,
    pub single_instance_state: bool,
    pub view_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entries: IndexMap<String, EntityRegistration>,
    strict_member_schema: bool,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entities this service ships with
    pub fn standard() -> Self {
        Self::new().register::<User>().register::<ContactUs>()
    }

    pub fn strict_member_schema(mut self, strict: bool) -> Self {
        self.strict_member_schema = strict;
        self
    }

    pub fn register<T: Model>(mut self) -> Self {
        self.insert(T::registration());
        self
    }

    pub fn insert(&mut self, registration: EntityRegistration) {
        self.entries.insert(registration.name.clone(), registration);
    }

    pub fn get(&self, entity: &str) -> Option<&EntityRegistration> {
        self.entries.get(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityRegistration> {
        self.entries.values()
    }

    /// Swap in a new runtime-override version for one entity
    pub fn set_runtime_overrides(&mut self, entity: &str, overrides: RuntimeOverrides) -> Result<(), RegistryError> {
        let registration = self
            .entries
            .get_mut(entity)
            .ok_or_else(|| RegistryError::UnknownEntity(entity.to_string()))?;
        let options = registration.metadata_options.get_or_insert_with(MetadataOptions::default);
        options.runtime_overrides = overrides;
        Ok(())
    }

    pub fn describe(&self, entity: &str) -> Result<ModelDescription, RegistryError> {
        let registration = self.get(entity).ok_or_else(|| RegistryError::UnknownEntity(entity.to_string()))?;
        let missing = |accessor| RegistryError::MissingAccessor { entity: entity.to_string(), accessor };

        let options = registration.metadata_options.as_ref().ok_or_else(|| missing("field metadata"))?;
        let table_fields = registration.table_fields.clone().ok_or_else(|| missing("table fields"))?;
        let single_instance_state = registration.single_instance.ok_or_else(|| missing("single-instance state"))?;

        let metadata = Inferencer::new(options)
            .strict_member_schema(self.strict_member_schema)
            .derive(&registration.schema)?;

        Ok(ModelDescription { metadata, table_fields, single_instance_state, view_only: registration.view_only })
    }
}
