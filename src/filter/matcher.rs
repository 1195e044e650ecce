//! In-process evaluation of parsed match and sort criteria.
//!
//! Mirrors the SQL produced by `FilterWhere` / `FilterOrder`: comparisons only
//! hold between values of the same JSON type, equality also matches array
//! membership, and missing fields sort first.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::{Map, Value};

use super::types::{Condition, FieldPath, FilterOp, FilterOrderInfo, SortDirection};

pub fn matches(condition: &Condition, doc: &Map<String, Value>) -> bool {
    match condition {
        Condition::And(clauses) => clauses.iter().all(|c| matches(c, doc)),
        Condition::Or(clauses) => clauses.iter().any(|c| matches(c, doc)),
        Condition::Nor(clauses) => !clauses.iter().any(|c| matches(c, doc)),
        Condition::Not(inner) => !matches(inner, doc),
        Condition::Field { path, operator, data, options } => {
            field_matches(lookup(doc, path), *operator, data, options.as_deref())
        }
    }
}

/// Resolve a dotted path; numeric segments index into arrays.
pub fn lookup<'a>(doc: &'a Map<String, Value>, path: &FieldPath) -> Option<&'a Value> {
    let (first, rest) = path.segments().split_first()?;
    let mut current = doc.get(first)?;
    for segment in rest {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn field_matches(found: Option<&Value>, operator: FilterOp, data: &Value, options: Option<&str>) -> bool {
    match operator {
        FilterOp::Eq => equals(found, data),
        FilterOp::Ne => !equals(found, data),
        FilterOp::Gt => same_type_cmp(found, data).is_some_and(Ordering::is_gt),
        FilterOp::Gte => same_type_cmp(found, data).is_some_and(Ordering::is_ge),
        FilterOp::Lt => same_type_cmp(found, data).is_some_and(Ordering::is_lt),
        FilterOp::Lte => same_type_cmp(found, data).is_some_and(Ordering::is_le),
        FilterOp::In => data.as_array().is_some_and(|values| values.iter().any(|v| equals(found, v))),
        FilterOp::NIn => !data.as_array().is_some_and(|values| values.iter().any(|v| equals(found, v))),
        FilterOp::Exists => found.is_some() == data.as_bool().unwrap_or(true),
        FilterOp::Regex => {
            let case_insensitive = options.is_some_and(|flags| flags.contains('i'));
            string_matches(found, data.as_str(), |pattern| {
                RegexBuilder::new(pattern).case_insensitive(case_insensitive).build().ok()
            })
        }
        FilterOp::Like => string_matches(found, data.as_str(), |pattern| like_to_regex(pattern, false)),
        FilterOp::ILike => string_matches(found, data.as_str(), |pattern| like_to_regex(pattern, true)),
        FilterOp::Between => match data.as_array().map(Vec::as_slice) {
            Some([low, high]) => {
                same_type_cmp(found, low).is_some_and(Ordering::is_ge)
                    && same_type_cmp(found, high).is_some_and(Ordering::is_le)
            }
            _ => false,
        },
    }
}

fn equals(found: Option<&Value>, data: &Value) -> bool {
    match found {
        None => data.is_null(),
        Some(value) => {
            if compare_values(value, data) == Ordering::Equal {
                return true;
            }
            match value {
                Value::Array(items) => items.iter().any(|item| compare_values(item, data) == Ordering::Equal),
                _ => false,
            }
        }
    }
}

fn same_type_cmp(found: Option<&Value>, data: &Value) -> Option<Ordering> {
    let value = found?;
    if type_rank(value) != type_rank(data) {
        return None;
    }
    Some(compare_values(value, data))
}

fn string_matches<F>(found: Option<&Value>, pattern: Option<&str>, compile: F) -> bool
where
    F: FnOnce(&str) -> Option<regex::Regex>,
{
    match (found, pattern) {
        (Some(Value::String(s)), Some(pattern)) => compile(pattern).is_some_and(|re| re.is_match(s)),
        _ => false,
    }
}

/// SQL LIKE pattern as an anchored regex. `\` escapes the next character.
fn like_to_regex(pattern: &str, case_insensitive: bool) -> Option<regex::Regex> {
    let mut out = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    RegexBuilder::new(&out).case_insensitive(case_insensitive).dot_matches_new_line(true).build().ok()
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values following jsonb ordering:
/// null < string < number < boolean < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or_default(), y.as_f64().unwrap_or_default());
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()).then_with(|| {
            x.iter()
                .zip(y)
                .map(|(l, r)| compare_values(l, r))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()).then_with(|| {
            let mut left: Vec<_> = x.iter().collect();
            let mut right: Vec<_> = y.iter().collect();
            left.sort_by(|l, r| l.0.cmp(r.0));
            right.sort_by(|l, r| l.0.cmp(r.0));
            left.into_iter()
                .zip(right)
                .map(|((lk, lv), (rk, rv))| lk.cmp(rk).then_with(|| compare_values(lv, rv)))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Stable sort by the given keys; a missing field sorts before any value.
pub fn sort_documents(docs: &mut [Map<String, Value>], order: &[FilterOrderInfo]) {
    if order.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        order
            .iter()
            .map(|info| {
                let ordering = match (lookup(a, &info.path), lookup(b, &info.path)) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (Some(x), Some(y)) => compare_values(x, y),
                };
                match info.sort {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::filter_order::FilterOrder;
    use crate::filter::filter_where::FilterWhere;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn check(criteria: Value, document: Value) -> bool {
        matches(&FilterWhere::parse(&criteria).unwrap(), &doc(document))
    }

    #[test]
    fn equality_and_membership() {
        let d = json!({ "role": "user", "tags": ["a", "b"], "count": 3 });
        assert!(check(json!({ "role": "user" }), d.clone()));
        assert!(check(json!({ "tags": "b" }), d.clone()));
        assert!(check(json!({ "count": 3.0 }), d.clone()));
        assert!(!check(json!({ "role": "superadmin" }), d.clone()));
        assert!(check(json!({ "missing": null }), d.clone()));
        assert!(check(json!({ "missing": { "$ne": "x" } }), d));
    }

    #[test]
    fn comparisons_require_same_type() {
        let d = json!({ "age": 30, "name": "Ada" });
        assert!(check(json!({ "age": { "$gt": 20, "$lte": 30 } }), d.clone()));
        assert!(!check(json!({ "age": { "$gt": "20" } }), d.clone()));
        assert!(!check(json!({ "missing": { "$lt": 5 } }), d.clone()));
        assert!(check(json!({ "age": { "$between": [30, 40] } }), d));
    }

    #[test]
    fn set_and_existence_operators() {
        let d = json!({ "status": "pending", "seo": { "metaTitle": "Hi" } });
        assert!(check(json!({ "status": { "$in": ["pending", "followed-up"] } }), d.clone()));
        assert!(check(json!({ "status": { "$nin": ["followed-up"] } }), d.clone()));
        assert!(check(json!({ "seo.metaTitle": { "$exists": true } }), d.clone()));
        assert!(check(json!({ "seo.ogTitle": { "$exists": false } }), d));
    }

    #[test]
    fn pattern_operators() {
        let d = json!({ "name": "Ada Lovelace" });
        assert!(check(json!({ "name": { "$regex": "^ada", "$options": "i" } }), d.clone()));
        assert!(!check(json!({ "name": { "$regex": "^ada" } }), d.clone()));
        assert!(check(json!({ "name": { "$like": "Ada%" } }), d.clone()));
        assert!(check(json!({ "name": { "$ilike": "%love_ace" } }), d.clone()));
        assert!(!check(json!({ "name": { "$like": "ada%" } }), d));
    }

    #[test]
    fn logical_operators() {
        let d = json!({ "a": 1, "b": 2 });
        assert!(check(json!({ "$or": [{ "a": 5 }, { "b": 2 }] }), d.clone()));
        assert!(check(json!({ "$and": [{ "a": 1 }, { "b": 2 }] }), d.clone()));
        assert!(!check(json!({ "$nor": [{ "a": 1 }] }), d.clone()));
        assert!(check(json!({ "$not": { "a": 2 } }), d));
    }

    #[test]
    fn sorts_with_missing_values_first() {
        let mut docs = vec![doc(json!({ "n": 2 })), doc(json!({})), doc(json!({ "n": 1 }))];
        let order = FilterOrder::validate_and_parse(&json!({ "n": 1 })).unwrap();
        sort_documents(&mut docs, &order);
        let values: Vec<_> = docs.iter().map(|d| d.get("n").cloned()).collect();
        assert_eq!(values, vec![None, Some(json!(1)), Some(json!(2))]);

        let order = FilterOrder::validate_and_parse(&json!("n desc")).unwrap();
        sort_documents(&mut docs, &order);
        let values: Vec<_> = docs.iter().map(|d| d.get("n").cloned()).collect();
        assert_eq!(values, vec![Some(json!(2)), Some(json!(1)), None]);
    }
}
