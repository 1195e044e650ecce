use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::FilterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,

    #[serde(rename = "$in")] In,
    #[serde(rename = "$nin")] NIn,
    #[serde(rename = "$exists")] Exists,

    #[serde(rename = "$like")] Like,
    #[serde(rename = "$ilike")] ILike,
    #[serde(rename = "$regex")] Regex,

    #[serde(rename = "$between")] Between,
}

impl FilterOp {
    pub fn from_key(key: &str) -> Result<Self, FilterError> {
        Ok(match key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$exists" => FilterOp::Exists,
            "$like" => FilterOp::Like,
            "$ilike" => FilterOp::ILike,
            "$regex" => FilterOp::Regex,
            "$between" => FilterOp::Between,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }
}

/// Raw query parts as they arrive from callers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterData {
    pub where_clause: Option<Value>,
    pub order: Option<Value>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    #[serde(default)]
    pub include_deleted: bool,
}

/// Dotted document path, validated segment by segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, FilterError> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        for segment in &segments {
            if segment.is_empty() || !segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(FilterError::InvalidField(path.to_string()));
            }
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Postgres text-array literal addressing this path, e.g. `'{seo,metaTitle}'`
    pub fn to_pg_path(&self) -> String {
        format!("'{{{}}}'", self.0.join(","))
    }
}

/// Parsed match criteria
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Field {
        path: FieldPath,
        operator: FilterOp,
        data: Value,
        /// Regex flags from a sibling `$options`
        options: Option<String>,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Nor(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn always() -> Self {
        Condition::And(vec![])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC NULLS FIRST",
            SortDirection::Desc => "DESC NULLS LAST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub path: FieldPath,
    pub sort: SortDirection,
}

/// A bound query parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<SqlParam>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_path_rejects_injection() {
        assert!(FieldPath::parse("seo.metaTitle").is_ok());
        assert!(FieldPath::parse("name'; DROP TABLE x; --").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("a,b").is_err());
    }

    #[test]
    fn pg_path_literal() {
        let path = FieldPath::parse("seo.metaTitle").unwrap();
        assert_eq!(path.to_pg_path(), "'{seo,metaTitle}'");
    }

    #[test]
    fn operator_aliases() {
        assert_eq!(FilterOp::from_key("$neq").unwrap(), FilterOp::Ne);
        assert!(matches!(FilterOp::from_key("$where"), Err(FilterError::UnsupportedOperator(_))));
    }
}
