use tracing::warn;

use super::{FieldMetadata, FieldRef, MetadataError, MetadataNode, MetadataOptions, MetadataTree, RefTarget};
use crate::schema::{ArrayMember, FieldDescriptor, FieldShape, InstanceKind, ScalarKind, SchemaDeclaration};

/// Framework and audit fields that never appear in derived metadata
pub const EXCLUDED_FIELDS: &[&str] = &[
    "createdAt",
    "updatedAt",
    "deletedAt",
    "deleted",
    "author",
    "__v",
    "_id",
    "id",
    "isDeleted",
    "--v",
    "favorites",
    "comments",
    "displayPosition",
    "readTime",
];

const TEXT_FIELD: &str = "TextField";
const MULTI_SELECT: &str = "MultiSelect";

/// Derive the metadata tree with the default (lenient) member-schema policy.
pub fn derive_metadata(schema: &SchemaDeclaration, options: &MetadataOptions) -> MetadataTree {
    let mut tree = MetadataTree::new();
    // Lenient mode never returns an error
    let _ = Inferencer::new(options).walk(schema, "", &mut tree);
    tree
}

/// Walks a schema declaration and produces its UI metadata tree.
pub struct Inferencer<'a> {
    options: &'a MetadataOptions,
    strict_member_schema: bool,
}

impl<'a> Inferencer<'a> {
    pub fn new(options: &'a MetadataOptions) -> Self {
        Self { options, strict_member_schema: false }
    }

    /// Fail instead of dropping array-of-object fields whose member schema is missing
    pub fn strict_member_schema(mut self, strict: bool) -> Self {
        self.strict_member_schema = strict;
        self
    }

    pub fn derive(&self, schema: &SchemaDeclaration) -> Result<MetadataTree, MetadataError> {
        let mut tree = MetadataTree::new();
        self.walk(schema, "", &mut tree)?;
        Ok(tree)
    }

    fn walk(&self, schema: &SchemaDeclaration, prefix: &str, out: &mut MetadataTree) -> Result<(), MetadataError> {
        for (name, field) in schema.iter() {
            if EXCLUDED_FIELDS.contains(&name.as_str()) {
                continue;
            }

            let path = if prefix.is_empty() { name.clone() } else { format!("{}.{}", prefix, name) };

            match &field.shape {
                FieldShape::Array(ArrayMember::Object(Some(member))) => {
                    let mut sub_fields = member.field_names();
                    let record = FieldMetadata {
                        component_type: self.component_type(&path, field),
                        required: field.required,
                        reference: self.reference(field),
                        instance: InstanceKind::Array,
                        is_array: true,
                        enum_values: vec![],
                        depends_on: None,
                        filter_field: None,
                        question_field: sub_fields.next().map(str::to_string),
                        description_field: sub_fields.next().map(str::to_string),
                    };
                    out.insert(name.clone(), MetadataNode::Field(record));
                }
                FieldShape::Array(ArrayMember::Object(None)) => {
                    if self.strict_member_schema {
                        return Err(MetadataError::MissingMemberSchema(path));
                    }
                    warn!("Member schema for array field '{}' is missing, omitting it from metadata", path);
                }
                FieldShape::Embedded(nested) => {
                    let mut sub_tree = MetadataTree::new();
                    self.walk(nested, &path, &mut sub_tree)?;
                    out.insert(name.clone(), MetadataNode::Nested(sub_tree));
                }
                FieldShape::Scalar(_) | FieldShape::Array(ArrayMember::Scalar(_)) => {
                    let dependency = dependency_hint(name);
                    let record = FieldMetadata {
                        component_type: self.component_type(&path, field),
                        required: field.required,
                        reference: self.reference(field),
                        instance: field.shape.instance(),
                        is_array: field.shape.is_array(),
                        enum_values: field.enum_values.clone(),
                        depends_on: dependency.map(str::to_string),
                        filter_field: dependency.map(str::to_string),
                        question_field: None,
                        description_field: None,
                    };
                    out.insert(name.clone(), MetadataNode::Field(record));
                }
            }
        }
        Ok(())
    }

    fn component_type(&self, path: &str, field: &FieldDescriptor) -> String {
        self.options
            .runtime_overrides
            .get(path)
            .or_else(|| self.options.default_overrides.resolve(path))
            .map(str::to_string)
            .unwrap_or_else(|| infer_component_type(field).to_string())
    }

    fn reference(&self, field: &FieldDescriptor) -> FieldRef {
        match &field.reference {
            Some(target) => FieldRef::Target(
                self.options
                    .ref_field_mapping
                    .get(target)
                    .cloned()
                    .unwrap_or_else(|| RefTarget::new(target.clone(), "")),
            ),
            None => FieldRef::None,
        }
    }
}

fn infer_component_type(field: &FieldDescriptor) -> &'static str {
    match field.shape {
        FieldShape::Array(ArrayMember::Scalar(ScalarKind::Text)) => MULTI_SELECT,
        _ => TEXT_FIELD,
    }
}

/// Cross-field filtering hints, keyed on the literal field name.
/// Only "expert" and "weekDay" carry one.
fn dependency_hint(field_name: &str) -> Option<&'static str> {
    match field_name {
        "expert" => Some("center"),
        "weekDay" => Some("center,expert"),
        _ => None,
    }
}
