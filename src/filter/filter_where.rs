use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{Condition, FieldPath, FilterOp, SqlParam};

/// Translates Mongo-style match criteria into a SQL predicate over the
/// `"doc"` JSONB column.
pub struct FilterWhere {
    param_values: Vec<SqlParam>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self { param_values: vec![], param_index: starting_param_index }
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        Self::parse(where_data).map(|_| ())
    }

    /// Parse match criteria. `null` matches everything.
    pub fn parse(where_data: &Value) -> Result<Condition, FilterError> {
        match where_data {
            Value::Null => Ok(Condition::always()),
            Value::Object(obj) => Self::parse_object(obj),
            _ => Err(FilterError::InvalidWhereClause("Match criteria must be an object".to_string())),
        }
    }

    pub fn generate(condition: &Condition, starting_param_index: usize) -> (String, Vec<SqlParam>) {
        let mut filter_where = Self::new(starting_param_index);
        let sql = filter_where.build(condition);
        (sql, filter_where.param_values)
    }

    fn parse_object(obj: &Map<String, Value>) -> Result<Condition, FilterError> {
        let mut conditions = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            if key.starts_with('$') {
                conditions.push(Self::parse_logical_operator(key, value)?);
            } else {
                conditions.extend(Self::parse_field_condition(key, value)?);
            }
        }
        if conditions.len() == 1 {
            return Ok(conditions.remove(0));
        }
        Ok(Condition::And(conditions))
    }

    fn parse_logical_operator(op: &str, value: &Value) -> Result<Condition, FilterError> {
        match op {
            "$and" | "$or" | "$nor" => {
                let arr = value
                    .as_array()
                    .filter(|arr| !arr.is_empty())
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires a non-empty array", op)))?;
                let clauses = arr.iter().map(Self::parse).collect::<Result<Vec<_>, _>>()?;
                Ok(match op {
                    "$and" => Condition::And(clauses),
                    "$or" => Condition::Or(clauses),
                    _ => Condition::Nor(clauses),
                })
            }
            "$not" => {
                if !value.is_object() {
                    return Err(FilterError::InvalidOperatorData("$not requires an object".to_string()));
                }
                Ok(Condition::Not(Box::new(Self::parse(value)?)))
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(field: &str, value: &Value) -> Result<Vec<Condition>, FilterError> {
        let path = FieldPath::parse(field)?;

        let operators = match value {
            Value::Object(obj) if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) => obj,
            // Implicit equality: { field: value }
            _ => {
                return Ok(vec![Condition::Field { path, operator: FilterOp::Eq, data: value.clone(), options: None }]);
            }
        };

        let options = match operators.get("$options") {
            None => None,
            Some(Value::String(flags)) => {
                if !operators.contains_key("$regex") {
                    return Err(FilterError::InvalidOperatorData("$options requires $regex".to_string()));
                }
                if flags.chars().any(|c| c != 'i') {
                    return Err(FilterError::InvalidOperatorData(format!("Unsupported regex options: {}", flags)));
                }
                Some(flags.clone())
            }
            Some(_) => return Err(FilterError::InvalidOperatorData("$options must be a string".to_string())),
        };

        let mut conditions = Vec::new();
        for (op_key, op_val) in operators {
            if op_key == "$options" {
                continue;
            }
            let operator = FilterOp::from_key(op_key)?;
            Self::validate_operator_data(operator, op_val, options.as_deref())?;
            conditions.push(Condition::Field {
                path: path.clone(),
                operator,
                data: op_val.clone(),
                options: if operator == FilterOp::Regex { options.clone() } else { None },
            });
        }
        Ok(conditions)
    }

    fn validate_operator_data(operator: FilterOp, data: &Value, options: Option<&str>) -> Result<(), FilterError> {
        match operator {
            FilterOp::In | FilterOp::NIn if !data.is_array() => Err(FilterError::InvalidOperatorData(
                "$in and $nin require an array".to_string(),
            )),
            FilterOp::Between if data.as_array().map(Vec::len) != Some(2) => Err(FilterError::InvalidOperatorData(
                "$between requires exactly 2 values".to_string(),
            )),
            FilterOp::Exists if !data.is_boolean() => {
                Err(FilterError::InvalidOperatorData("$exists requires a boolean".to_string()))
            }
            FilterOp::Like | FilterOp::ILike if !data.is_string() => {
                Err(FilterError::InvalidOperatorData("$like and $ilike require a string".to_string()))
            }
            FilterOp::Regex => {
                let pattern = data
                    .as_str()
                    .ok_or_else(|| FilterError::InvalidOperatorData("$regex requires a string".to_string()))?;
                regex::RegexBuilder::new(pattern)
                    .case_insensitive(options.is_some_and(|flags| flags.contains('i')))
                    .build()?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn build(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::And(clauses) if clauses.is_empty() => "TRUE".to_string(),
            Condition::And(clauses) => self.join(clauses, " AND "),
            Condition::Or(clauses) if clauses.is_empty() => "FALSE".to_string(),
            Condition::Or(clauses) => self.join(clauses, " OR "),
            Condition::Nor(clauses) if clauses.is_empty() => "TRUE".to_string(),
            Condition::Nor(clauses) => {
                let any = self.join(clauses, " OR ");
                format!("NOT COALESCE({}, FALSE)", any)
            }
            Condition::Not(inner) => {
                let sql = self.build(inner);
                format!("NOT COALESCE(({}), FALSE)", sql)
            }
            Condition::Field { path, operator, data, options } => self.build_field(path, *operator, data, options.as_deref()),
        }
    }

    fn join(&mut self, clauses: &[Condition], joiner: &str) -> String {
        let parts: Vec<String> = clauses.iter().map(|c| format!("({})", self.build(c))).collect();
        format!("({})", parts.join(joiner))
    }

    fn build_field(&mut self, path: &FieldPath, operator: FilterOp, data: &Value, options: Option<&str>) -> String {
        let json_expr = format!("(\"doc\" #> {})", path.to_pg_path());
        let text_expr = format!("(\"doc\" #>> {})", path.to_pg_path());

        match operator {
            FilterOp::Eq => self.equals(&json_expr, data),
            FilterOp::Ne => format!("NOT COALESCE({}, FALSE)", self.equals(&json_expr, data)),
            FilterOp::Gt => self.compare(&json_expr, ">", data),
            FilterOp::Gte => self.compare(&json_expr, ">=", data),
            FilterOp::Lt => self.compare(&json_expr, "<", data),
            FilterOp::Lte => self.compare(&json_expr, "<=", data),
            FilterOp::In => self.any_of(&json_expr, data),
            FilterOp::NIn => format!("NOT COALESCE({}, FALSE)", self.any_of(&json_expr, data)),
            FilterOp::Exists => {
                if data.as_bool().unwrap_or(true) {
                    format!("{} IS NOT NULL", json_expr)
                } else {
                    format!("{} IS NULL", json_expr)
                }
            }
            FilterOp::Regex => {
                let op = if options.is_some_and(|flags| flags.contains('i')) { "~*" } else { "~" };
                let param = self.text_param(data.as_str().unwrap_or_default());
                format!("(jsonb_typeof({}) = 'string' AND {} {} {})", json_expr, text_expr, op, param)
            }
            FilterOp::Like | FilterOp::ILike => {
                let op = if operator == FilterOp::Like { "LIKE" } else { "ILIKE" };
                let param = self.text_param(data.as_str().unwrap_or_default());
                format!("(jsonb_typeof({}) = 'string' AND {} {} {})", json_expr, text_expr, op, param)
            }
            FilterOp::Between => match data.as_array().map(Vec::as_slice) {
                Some([low, high]) => {
                    let low = self.json_param(low.clone());
                    let high = self.json_param(high.clone());
                    format!(
                        "(jsonb_typeof({json}) = jsonb_typeof({low}) AND {json} >= {low} AND {json} <= {high})",
                        json = json_expr,
                        low = low,
                        high = high
                    )
                }
                _ => "FALSE".to_string(),
            },
        }
    }

    /// Equality with array-membership semantics; `null` also matches a missing field.
    fn equals(&mut self, json_expr: &str, data: &Value) -> String {
        if data.is_null() {
            return format!("({} IS NULL OR {} = 'null'::jsonb)", json_expr, json_expr);
        }
        let param = self.json_param(data.clone());
        format!(
            "({json} = {p} OR (jsonb_typeof({json}) = 'array' AND {json} @> jsonb_build_array({p})))",
            json = json_expr,
            p = param
        )
    }

    fn compare(&mut self, json_expr: &str, op: &str, data: &Value) -> String {
        let param = self.json_param(data.clone());
        format!(
            "(jsonb_typeof({json}) = jsonb_typeof({p}) AND {json} {op} {p})",
            json = json_expr,
            p = param,
            op = op
        )
    }

    fn any_of(&mut self, json_expr: &str, data: &Value) -> String {
        let values = data.as_array().map(Vec::as_slice).unwrap_or_default();
        if values.is_empty() {
            return "FALSE".to_string();
        }
        let parts: Vec<String> = values.iter().map(|v| self.equals(json_expr, v)).collect();
        format!("({})", parts.join(" OR "))
    }

    fn json_param(&mut self, value: Value) -> String {
        self.param_values.push(SqlParam::Json(value));
        self.param_index += 1;
        format!("${}::jsonb", self.param_index)
    }

    fn text_param(&mut self, value: &str) -> String {
        self.param_values.push(SqlParam::Text(value.to_string()));
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sql_for(criteria: Value) -> (String, Vec<SqlParam>) {
        let condition = FilterWhere::parse(&criteria).unwrap();
        FilterWhere::generate(&condition, 0)
    }

    #[test]
    fn implicit_equality_matches_membership() {
        let (sql, params) = sql_for(json!({ "role": "superadmin" }));
        assert_eq!(
            sql,
            "((\"doc\" #> '{role}') = $1::jsonb OR (jsonb_typeof((\"doc\" #> '{role}')) = 'array' \
             AND (\"doc\" #> '{role}') @> jsonb_build_array($1::jsonb)))"
        );
        assert_eq!(params, vec![SqlParam::Json(json!("superadmin"))]);
    }

    #[test]
    fn null_equality_matches_missing() {
        let (sql, params) = sql_for(json!({ "deletedBy": null }));
        assert!(sql.contains("IS NULL OR"));
        assert!(params.is_empty());
    }

    #[test]
    fn nested_paths_and_numbering() {
        let (sql, params) = sql_for(json!({ "seo.metaTitle": { "$ne": "x" }, "age": { "$gte": 18, "$lt": 65 } }));
        assert!(sql.contains("'{seo,metaTitle}'"));
        assert!(sql.contains("$2::jsonb"));
        assert!(sql.contains("$3::jsonb"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn starting_index_offsets_placeholders() {
        let condition = FilterWhere::parse(&json!({ "a": 1 })).unwrap();
        let (sql, _) = FilterWhere::generate(&condition, 4);
        assert!(sql.contains("$5::jsonb"));
    }

    #[test]
    fn regex_with_case_insensitive_option() {
        let (sql, params) = sql_for(json!({ "name": { "$regex": "^ada", "$options": "i" } }));
        assert!(sql.contains("~* $1"));
        assert_eq!(params, vec![SqlParam::Text("^ada".to_string())]);
    }

    #[test]
    fn logical_operators() {
        let (sql, params) = sql_for(json!({
            "$or": [{ "status": "pending" }, { "status": { "$exists": false } }],
            "$nor": [{ "name": "spam" }]
        }));
        assert!(sql.contains(" OR "));
        assert!(sql.contains("IS NULL"));
        assert!(sql.starts_with("(("));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn empty_in_matches_nothing() {
        let (sql, _) = sql_for(json!({ "status": { "$in": [] } }));
        assert_eq!(sql, "FALSE");
    }

    #[test]
    fn empty_criteria_match_everything() {
        let (sql, _) = sql_for(json!({}));
        assert_eq!(sql, "TRUE");
        let (sql, _) = sql_for(Value::Null);
        assert_eq!(sql, "TRUE");
    }

    #[test]
    fn rejects_malformed_criteria() {
        assert!(FilterWhere::parse(&json!("1=1")).is_err());
        assert!(FilterWhere::parse(&json!({ "$or": [] })).is_err());
        assert!(FilterWhere::parse(&json!({ "a": { "$in": 3 } })).is_err());
        assert!(FilterWhere::parse(&json!({ "a": { "$between": [1] } })).is_err());
        assert!(FilterWhere::parse(&json!({ "a": { "$regex": "(" } })).is_err());
        assert!(FilterWhere::parse(&json!({ "a": { "$options": "i" } })).is_err());
        assert!(FilterWhere::parse(&json!({ "a": { "$where": "x" } })).is_err());
        assert!(FilterWhere::parse(&json!({ "a\"b": 1 })).is_err());
    }

    #[test]
    fn object_without_operators_is_exact_equality() {
        let condition = FilterWhere::parse(&json!({ "seo": { "metaTitle": "x" } })).unwrap();
        match condition {
            Condition::Field { operator, data, .. } => {
                assert_eq!(operator, FilterOp::Eq);
                assert_eq!(data, json!({ "metaTitle": "x" }));
            }
            other => panic!("unexpected condition {:?}", other),
        }
    }
}
