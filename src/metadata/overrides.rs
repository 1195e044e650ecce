use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A node of the nested default-override mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverrideNode {
    Component(String),
    Nested(IndexMap<String, OverrideNode>),
}

/// Dot-path-addressable component overrides, e.g.
/// `{ "email": "Email", "seo": { "metaTitle": "SeoTitle" } }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentOverrides(IndexMap<String, OverrideNode>);

impl ComponentOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a component for a dotted path, creating intermediate maps.
    /// A component already stored on an intermediate segment is replaced.
    pub fn with(mut self, path: &str, component: impl Into<String>) -> Self {
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(last) = segments.pop() else {
            return self;
        };

        let mut current = &mut self.0;
        for segment in segments {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| OverrideNode::Nested(IndexMap::new()));
            if let OverrideNode::Component(_) = entry {
                *entry = OverrideNode::Nested(IndexMap::new());
            }
            current = match entry {
                OverrideNode::Nested(map) => map,
                OverrideNode::Component(_) => unreachable!("replaced above"),
            };
        }
        current.insert(last.to_string(), OverrideNode::Component(component.into()));
        self
    }

    pub fn resolve(&self, path: &str) -> Option<&str> {
        resolve_override(&self.0, path)
    }
}

/// Walk `overrides` one path segment at a time. Fails on a missing segment,
/// and when the walk ends on a nested mapping instead of a component string.
pub fn resolve_override<'a>(overrides: &'a IndexMap<String, OverrideNode>, path: &str) -> Option<&'a str> {
    let mut segments = path.split('.');
    let mut node = overrides.get(segments.next()?)?;
    for segment in segments {
        node = match node {
            OverrideNode::Nested(map) => map.get(segment)?,
            OverrideNode::Component(_) => return None,
        };
    }
    match node {
        OverrideNode::Component(component) => Some(component.as_str()),
        OverrideNode::Nested(_) => None,
    }
}

/// Per-schema runtime overrides keyed by full dotted path.
///
/// Immutable: `with_override` returns the next version and leaves `self`
/// untouched, so a registered schema can swap in a new value explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOverrides {
    version: u64,
    entries: HashMap<String, String>,
}

impl RuntimeOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn with_override(&self, path: impl Into<String>, component: impl Into<String>) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(path.into(), component.into());
        Self { version: self.version + 1, entries }
    }

    pub fn without_override(&self, path: &str) -> Self {
        let mut entries = self.entries.clone();
        entries.remove(path);
        Self { version: self.version + 1, entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_flat_and_nested_paths() {
        let overrides = ComponentOverrides::new()
            .with("email", "Email")
            .with("seo.metaTitle", "SeoTitle");

        assert_eq!(overrides.resolve("email"), Some("Email"));
        assert_eq!(overrides.resolve("seo.metaTitle"), Some("SeoTitle"));
    }

    #[test]
    fn missing_segment_fails() {
        let overrides = ComponentOverrides::new().with("seo.metaTitle", "SeoTitle");
        assert_eq!(overrides.resolve("seo.ogTitle"), None);
        assert_eq!(overrides.resolve("name"), None);
        assert_eq!(overrides.resolve("seo.metaTitle.deeper"), None);
    }

    #[test]
    fn stopping_at_intermediate_mapping_fails() {
        let overrides = ComponentOverrides::new().with("seo.metaTitle", "SeoTitle");
        assert_eq!(overrides.resolve("seo"), None);
    }

    #[test]
    fn deserializes_nested_configuration() {
        let overrides: ComponentOverrides = serde_json::from_value(json!({
            "status": "SelectEnumInputField",
            "seo": { "canonicalUrl": "UrlInput" }
        }))
        .unwrap();
        assert_eq!(overrides.resolve("status"), Some("SelectEnumInputField"));
        assert_eq!(overrides.resolve("seo.canonicalUrl"), Some("UrlInput"));
    }

    #[test]
    fn runtime_overrides_are_versioned_values() {
        let base = RuntimeOverrides::new();
        let next = base.with_override("name", "RichTextEditor");

        assert!(base.is_empty());
        assert_eq!(base.version(), 0);
        assert_eq!(next.version(), 1);
        assert_eq!(next.get("name"), Some("RichTextEditor"));

        let cleared = next.without_override("name");
        assert_eq!(cleared.get("name"), None);
        assert_eq!(cleared.version(), 2);
    }
}
