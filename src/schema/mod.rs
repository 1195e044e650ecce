//! Structural description of an entity type.
//!
//! A `SchemaDeclaration` is built once when an entity registers and is never
//! mutated afterwards. Field order is declaration order.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

/// Primitive kind of a scalar field (or of a scalar array's members)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScalarKind {
    Text,
    Number,
    Boolean,
    Date,
    Reference,
    Mixed,
}

/// Member type of an array field
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayMember {
    Scalar(ScalarKind),
    /// Array of sub-documents. `None` when the member schema could not be
    /// resolved.
    Object(Option<SchemaDeclaration>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldShape {
    Scalar(ScalarKind),
    Array(ArrayMember),
    Embedded(SchemaDeclaration),
}

/// Instance tag reported in field metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstanceKind {
    Text,
    Number,
    Boolean,
    Date,
    Reference,
    Mixed,
    Array,
    Embedded,
}

impl From<ScalarKind> for InstanceKind {
    fn from(kind: ScalarKind) -> Self {
        match kind {
            ScalarKind::Text => InstanceKind::Text,
            ScalarKind::Number => InstanceKind::Number,
            ScalarKind::Boolean => InstanceKind::Boolean,
            ScalarKind::Date => InstanceKind::Date,
            ScalarKind::Reference => InstanceKind::Reference,
            ScalarKind::Mixed => InstanceKind::Mixed,
        }
    }
}

impl FieldShape {
    pub fn instance(&self) -> InstanceKind {
        match self {
            FieldShape::Scalar(kind) => (*kind).into(),
            FieldShape::Array(_) => InstanceKind::Array,
            FieldShape::Embedded(_) => InstanceKind::Embedded,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, FieldShape::Array(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub shape: FieldShape,
    pub required: bool,
    pub enum_values: Vec<String>,
    /// Name of the referenced entity type, e.g. "User"
    pub reference: Option<String>,
    /// No two visible documents may share a value for this field
    pub unique: bool,
}

impl FieldDescriptor {
    pub fn new(shape: FieldShape) -> Self {
        Self {
            shape,
            required: false,
            enum_values: vec![],
            reference: None,
            unique: false,
        }
    }

    pub fn scalar(kind: ScalarKind) -> Self {
        Self::new(FieldShape::Scalar(kind))
    }

    pub fn text() -> Self {
        Self::scalar(ScalarKind::Text)
    }

    pub fn number() -> Self {
        Self::scalar(ScalarKind::Number)
    }

    pub fn boolean() -> Self {
        Self::scalar(ScalarKind::Boolean)
    }

    pub fn date() -> Self {
        Self::scalar(ScalarKind::Date)
    }

    /// Reference to a single document of another entity type
    pub fn reference(target: impl Into<String>) -> Self {
        let mut field = Self::scalar(ScalarKind::Reference);
        field.reference = Some(target.into());
        field
    }

    pub fn array_of(kind: ScalarKind) -> Self {
        Self::new(FieldShape::Array(ArrayMember::Scalar(kind)))
    }

    /// Array of references to another entity type
    pub fn reference_array(target: impl Into<String>) -> Self {
        let mut field = Self::array_of(ScalarKind::Reference);
        field.reference = Some(target.into());
        field
    }

    pub fn object_array(member: SchemaDeclaration) -> Self {
        Self::new(FieldShape::Array(ArrayMember::Object(Some(member))))
    }

    pub fn embedded(schema: SchemaDeclaration) -> Self {
        Self::new(FieldShape::Embedded(schema))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn enumerated<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn references(mut self, target: impl Into<String>) -> Self {
        self.reference = Some(target.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Whether `value` has the JSON type this field stores
    fn accepts(&self, value: &Value) -> bool {
        match &self.shape {
            FieldShape::Scalar(kind) => scalar_accepts(*kind, value),
            FieldShape::Array(ArrayMember::Scalar(kind)) => {
                value.as_array().is_some_and(|items| items.iter().all(|item| scalar_accepts(*kind, item)))
            }
            FieldShape::Array(ArrayMember::Object(_)) => {
                value.as_array().is_some_and(|items| items.iter().all(Value::is_object))
            }
            FieldShape::Embedded(_) => value.is_object(),
        }
    }
}

fn scalar_accepts(kind: ScalarKind, value: &Value) -> bool {
    match kind {
        ScalarKind::Text | ScalarKind::Date | ScalarKind::Reference => value.is_string(),
        ScalarKind::Number => value.is_number(),
        ScalarKind::Boolean => value.is_boolean(),
        ScalarKind::Mixed => true,
    }
}

/// A single schema violation, addressed by dotted path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDeclaration {
    fields: IndexMap<String, FieldDescriptor>,
}

impl SchemaDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field (builder style). Re-declaring a name replaces it in place.
    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(name.into(), descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldDescriptor)> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolve a dotted path through embedded objects, e.g. "seo.metaTitle"
    pub fn resolve_path(&self, path: &str) -> Option<&FieldDescriptor> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = match &current.shape {
                FieldShape::Embedded(nested) => nested.fields.get(segment)?,
                FieldShape::Array(ArrayMember::Object(Some(member))) => member.fields.get(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Names of the top-level fields declared unique
    pub fn unique_fields(&self) -> Vec<String> {
        self.fields.iter().filter(|(_, d)| d.unique).map(|(name, _)| name.clone()).collect()
    }

    /// Check a full document against required flags, value types and enum
    /// constraints.
    pub fn validate(&self, document: &Map<String, Value>) -> Result<(), Vec<FieldViolation>> {
        let mut violations = Vec::new();
        self.collect_violations(document, "", &mut violations);
        into_result(violations)
    }

    /// Check the fields a `$set` patch supplies. Absent fields are left as
    /// stored; supplied ones must keep the document valid, so a required
    /// field cannot be cleared and embedded objects are checked whole.
    pub fn validate_patch(&self, patch: &Map<String, Value>) -> Result<(), Vec<FieldViolation>> {
        let mut violations = Vec::new();
        for (name, value) in patch {
            if let Some(descriptor) = self.fields.get(name) {
                Self::check_field(name.clone(), descriptor, Some(value).filter(|v| !v.is_null()), &mut violations);
            }
        }
        into_result(violations)
    }

    fn collect_violations(&self, document: &Map<String, Value>, prefix: &str, out: &mut Vec<FieldViolation>) {
        for (name, descriptor) in &self.fields {
            let path = if prefix.is_empty() { name.clone() } else { format!("{}.{}", prefix, name) };
            Self::check_field(path, descriptor, document.get(name).filter(|v| !v.is_null()), out);
        }
    }

    fn check_field(path: String, descriptor: &FieldDescriptor, value: Option<&Value>, out: &mut Vec<FieldViolation>) {
        let Some(value) = value else {
            if descriptor.required {
                out.push(FieldViolation { path, message: "Path is required".to_string() });
            }
            return;
        };

        if !descriptor.accepts(value) {
            out.push(FieldViolation { path, message: format!("Expected {:?}", descriptor.shape.instance()) });
            return;
        }

        if let Value::String(s) = value {
            if !descriptor.enum_values.is_empty() && !descriptor.enum_values.iter().any(|allowed| allowed == s) {
                out.push(FieldViolation { path: path.clone(), message: format!("`{}` is not a valid enum value", s) });
            }
        }

        match (&descriptor.shape, value) {
            (FieldShape::Embedded(nested), Value::Object(obj)) => {
                nested.collect_violations(obj, &path, out);
            }
            (FieldShape::Array(ArrayMember::Object(Some(member))), Value::Array(items)) => {
                for (index, item) in items.iter().enumerate() {
                    if let Value::Object(obj) = item {
                        member.collect_violations(obj, &format!("{}.{}", path, index), out);
                    }
                }
            }
            _ => {}
        }
    }
}

fn into_result(violations: Vec<FieldViolation>) -> Result<(), Vec<FieldViolation>> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contact_like() -> SchemaDeclaration {
        SchemaDeclaration::new()
            .field("name", FieldDescriptor::text().required())
            .field("status", FieldDescriptor::text().enumerated(["pending", "followed-up"]))
            .field(
                "seo",
                FieldDescriptor::embedded(
                    SchemaDeclaration::new().field("metaTitle", FieldDescriptor::text().required()),
                ),
            )
    }

    #[test]
    fn preserves_declaration_order() {
        let schema = SchemaDeclaration::new()
            .field("zeta", FieldDescriptor::text())
            .field("alpha", FieldDescriptor::number())
            .field("mid", FieldDescriptor::boolean());
        let names: Vec<_> = schema.field_names().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn resolves_nested_paths() {
        let schema = contact_like();
        assert!(schema.resolve_path("seo.metaTitle").is_some());
        assert!(schema.resolve_path("seo.missing").is_none());
        assert!(schema.resolve_path("name.inner").is_none());
    }

    #[test]
    fn validation_reports_missing_and_enum_violations() {
        let schema = contact_like();
        let doc = json!({ "status": "archived", "seo": {} });
        let violations = schema.validate(doc.as_object().unwrap()).unwrap_err();
        let paths: Vec<_> = violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["name", "status", "seo.metaTitle"]);
    }

    #[test]
    fn absent_optional_embedded_object_is_not_validated() {
        let schema = contact_like();
        let doc = json!({ "name": "Ada", "status": "pending" });
        assert!(schema.validate(doc.as_object().unwrap()).is_ok());
    }

    #[test]
    fn validation_checks_value_types() {
        let schema = contact_like().field("tags", FieldDescriptor::array_of(ScalarKind::Text));
        let doc = json!({ "name": 42, "tags": ["a", 1], "seo": "nope" });
        let violations = schema.validate(doc.as_object().unwrap()).unwrap_err();
        let paths: Vec<_> = violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["name", "seo", "tags"]);
        assert_eq!(violations[0].message, "Expected Text");
    }

    #[test]
    fn patch_validation_checks_only_supplied_fields() {
        let schema = contact_like();
        assert!(schema.validate_patch(json!({ "status": "pending" }).as_object().unwrap()).is_ok());
        assert!(schema.validate_patch(json!({ "unknown": 1 }).as_object().unwrap()).is_ok());

        let violations = schema
            .validate_patch(json!({ "status": "archived", "name": null, "seo": {} }).as_object().unwrap())
            .unwrap_err();
        let paths: Vec<_> = violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["status", "name", "seo.metaTitle"]);
    }

    #[test]
    fn lists_unique_fields() {
        let schema = SchemaDeclaration::new()
            .field("name", FieldDescriptor::text())
            .field("email", FieldDescriptor::text().required().unique());
        assert_eq!(schema.unique_fields(), vec!["email"]);
    }
}
