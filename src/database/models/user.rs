use serde::{Deserialize, Serialize};

use super::{EntityRegistration, Model};
use crate::metadata::{ComponentOverrides, MetadataOptions};
use crate::schema::{FieldDescriptor, SchemaDeclaration};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Superadmin,
}

impl Role {
    pub const ALL: [&'static str; 2] = ["user", "superadmin"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Superadmin => "superadmin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "superadmin" => Ok(Role::Superadmin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// An account. `password` holds the Argon2 hash, never the plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

impl Model for User {
    const ENTITY: &'static str = "User";
    const COLLECTION: &'static str = "users";

    fn registration() -> EntityRegistration {
        let schema = SchemaDeclaration::new()
            .field("name", FieldDescriptor::text().required())
            .field("email", FieldDescriptor::text().required().unique())
            .field("password", FieldDescriptor::text().required())
            .field("role", FieldDescriptor::text().enumerated(Role::ALL));

        let overrides = ComponentOverrides::new().with("email", "Email").with("password", "Password");

        EntityRegistration::new(Self::ENTITY, Self::COLLECTION, schema)
            .metadata_options(MetadataOptions::new().default_overrides(overrides))
            .table_fields(["name", "email", "role"])
            .single_instance(false)
    }
}
