use serde_json::Value;

use super::error::FilterError;
use super::types::{FieldPath, FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    /// Accepts `{ "createdAt": -1 }`, `{ "name": "asc" }`, `"createdAt desc, name"`
    /// or an array of such strings.
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        match order {
            Value::Null => Ok(vec![]),
            Value::String(s) => Self::parse_order_string(s),
            Value::Array(arr) => {
                let mut out = Vec::new();
                for v in arr {
                    match v {
                        Value::String(s) => out.extend(Self::parse_order_string(s)?),
                        other => {
                            return Err(FilterError::InvalidOperatorData(format!("Invalid sort entry: {}", other)));
                        }
                    }
                }
                Ok(out)
            }
            Value::Object(obj) => {
                let mut out = Vec::new();
                for (k, v) in obj {
                    out.push(FilterOrderInfo { path: FieldPath::parse(k)?, sort: Self::parse_direction(v)? });
                }
                Ok(out)
            }
            other => Err(FilterError::InvalidOperatorData(format!("Invalid sort criteria: {}", other))),
        }
    }

    fn parse_direction(value: &Value) -> Result<SortDirection, FilterError> {
        match value {
            Value::Number(n) if n.as_i64() == Some(1) => Ok(SortDirection::Asc),
            Value::Number(n) if n.as_i64() == Some(-1) => Ok(SortDirection::Desc),
            Value::String(s) => Self::parse_direction_str(s),
            other => Err(FilterError::InvalidOperatorData(format!("Invalid sort direction: {}", other))),
        }
    }

    fn parse_direction_str(s: &str) -> Result<SortDirection, FilterError> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Ok(SortDirection::Asc),
            "desc" | "descending" | "-1" => Ok(SortDirection::Desc),
            other => Err(FilterError::InvalidOperatorData(format!("Invalid sort direction: {}", other))),
        }
    }

    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut it = trimmed.split_whitespace();
            if let Some(field) = it.next() {
                // "-createdAt" is shorthand for descending
                let (field, sort) = match field.strip_prefix('-') {
                    Some(stripped) => (stripped, SortDirection::Desc),
                    None => (field, it.next().map(Self::parse_direction_str).transpose()?.unwrap_or(SortDirection::Asc)),
                };
                out.push(FilterOrderInfo { path: FieldPath::parse(field)?, sort });
            }
        }
        Ok(out)
    }

    /// Always ends with the primary key so equal sort keys keep a fixed
    /// order across OFFSET windows.
    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("(\"doc\" #> {}) {}", i.path.to_pg_path(), i.sort.to_sql()))
            .chain(std::iter::once("\"id\" ASC".to_string()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}
