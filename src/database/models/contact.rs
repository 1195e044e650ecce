use serde::{Deserialize, Serialize};

use super::{EntityRegistration, Model};
use crate::metadata::{ComponentOverrides, MetadataOptions};
use crate::schema::{FieldDescriptor, SchemaDeclaration};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactStatus {
    #[default]
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "followed-up")]
    FollowedUp,
}

impl ContactStatus {
    pub const ALL: [&'static str; 2] = ["pending", "followed-up"];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
}

/// A contact-form submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUs {
    pub name: String,
    pub phone: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_note: Option<String>,
    #[serde(default)]
    pub status: ContactStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo: Option<Seo>,
}

fn seo_schema() -> SchemaDeclaration {
    SchemaDeclaration::new()
        .field("metaTitle", FieldDescriptor::text())
        .field("metaDescription", FieldDescriptor::text())
        .field("ogTitle", FieldDescriptor::text())
        .field("ogDescription", FieldDescriptor::text())
        .field("canonicalUrl", FieldDescriptor::text())
}

impl Model for ContactUs {
    const ENTITY: &'static str = "ContactUs";
    const COLLECTION: &'static str = "contacts";

    fn registration() -> EntityRegistration {
        let schema = SchemaDeclaration::new()
            .field("name", FieldDescriptor::text().required())
            .field("phone", FieldDescriptor::text().required())
            .field("address", FieldDescriptor::text().required())
            .field("message", FieldDescriptor::text())
            .field("followUpNote", FieldDescriptor::text())
            .field("status", FieldDescriptor::text().enumerated(ContactStatus::ALL))
            .field("seo", FieldDescriptor::embedded(seo_schema()));

        let overrides = ComponentOverrides::new()
            .with("status", "SelectEnumInputField")
            .with("followUpNote", "RichTextEditor");

        EntityRegistration::new(Self::ENTITY, Self::COLLECTION, schema)
            .metadata_options(MetadataOptions::new().default_overrides(overrides))
            .table_fields(["name", "phone", "address", "status"])
            .single_instance(false)
            .view_only(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::EntityRegistry;
    use serde_json::json;

    #[test]
    fn contact_metadata_nests_seo() {
        let description = EntityRegistry::standard().describe("ContactUs").unwrap();
        let value = serde_json::to_value(&description).unwrap();

        assert_eq!(value["tableFields"], json!(["name", "phone", "address", "status"]));
        assert_eq!(value["viewOnly"], json!(true));
        assert_eq!(value["metadata"]["status"]["componentType"], "SelectEnumInputField");
        assert_eq!(value["metadata"]["status"]["enumValues"], json!(["pending", "followed-up"]));
        assert_eq!(value["metadata"]["followUpNote"]["componentType"], "RichTextEditor");
        assert_eq!(value["metadata"]["seo"]["canonicalUrl"]["componentType"], "TextField");
        assert!(value["metadata"]["seo"].get("componentType").is_none());
    }

    #[test]
    fn status_defaults_to_pending() {
        let contact: ContactUs =
            serde_json::from_value(json!({ "name": "Ada", "phone": "0123456789", "address": "London" })).unwrap();
        assert_eq!(contact.status, ContactStatus::Pending);
        assert_eq!(serde_json::to_value(contact.status).unwrap(), json!("pending"));
    }
}
