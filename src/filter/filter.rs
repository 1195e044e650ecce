use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::matcher;
use super::types::{Condition, FilterData, FilterOrderInfo, SqlResult};

/// Predicate excluding soft-deleted documents
pub const VISIBLE_SQL: &str = "NOT (\"doc\" @> '{\"deleted\": true}')";

/// A query against one collection: match criteria, sort, window and
/// soft-delete visibility. Renders to SQL for the Postgres store and
/// evaluates directly for the in-process store.
#[derive(Debug, Clone)]
pub struct Filter {
    collection: String,
    condition: Condition,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<u64>,
    offset: Option<u64>,
    include_deleted: bool,
}

impl Filter {
    pub fn new(collection: impl Into<String>) -> Result<Self, FilterError> {
        let collection = collection.into();
        Self::validate_collection_name(&collection)?;
        Ok(Self {
            collection,
            condition: Condition::always(),
            order_data: vec![],
            limit: None,
            offset: None,
            include_deleted: false,
        })
    }

    pub fn assign(&mut self, data: FilterData) -> Result<&mut Self, FilterError> {
        if let Some(where_clause) = data.where_clause {
            self.where_clause(&where_clause)?;
        }
        if let Some(order) = data.order {
            self.order(&order)?;
        }
        if data.limit.is_some() || data.offset.is_some() {
            self.window(data.offset, data.limit);
        }
        self.include_deleted(data.include_deleted);
        Ok(self)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn where_clause(&mut self, conditions: &Value) -> Result<&mut Self, FilterError> {
        self.condition = FilterWhere::parse(conditions)?;
        Ok(self)
    }

    pub fn order(&mut self, order_spec: &Value) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::validate_and_parse(order_spec)?;
        Ok(self)
    }

    pub fn window(&mut self, offset: Option<u64>, limit: Option<u64>) -> &mut Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn include_deleted(&mut self, include: bool) -> &mut Self {
        self.include_deleted = include;
        self
    }

    pub fn to_sql(&self) -> SqlResult {
        let where_result = self.to_where_sql();
        let query = [
            "SELECT \"doc\"".to_string(),
            format!("FROM \"{}\"", self.collection),
            format!("WHERE {}", where_result.query),
            FilterOrder::generate(&self.order_data),
            self.build_limit_clause(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        SqlResult { query, params: where_result.params }
    }

    pub fn to_where_sql(&self) -> SqlResult {
        let (criteria, params) = FilterWhere::generate(&self.condition, 0);
        let query = if self.include_deleted {
            criteria
        } else {
            format!("{} AND ({})", VISIBLE_SQL, criteria)
        };
        SqlResult { query, params }
    }

    pub fn to_count_sql(&self) -> SqlResult {
        let where_result = self.to_where_sql();
        SqlResult {
            query: format!("SELECT COUNT(*) AS count FROM \"{}\" WHERE {}", self.collection, where_result.query),
            params: where_result.params,
        }
    }

    /// Visibility plus match criteria, ignoring sort and window
    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        (self.include_deleted || !is_deleted(doc)) && matcher::matches(&self.condition, doc)
    }

    /// Filter, sort and window a full collection scan
    pub fn apply<I>(&self, docs: I) -> Vec<Map<String, Value>>
    where
        I: IntoIterator<Item = Map<String, Value>>,
    {
        let mut selected: Vec<_> = docs.into_iter().filter(|doc| self.matches(doc)).collect();
        matcher::sort_documents(&mut selected, &self.order_data);
        let offset = usize::try_from(self.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = self.limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        selected.into_iter().skip(offset).take(limit).collect()
    }

    /// Collection names double as table names: `[A-Za-z_][A-Za-z0-9_]*`
    pub fn validate_collection_name(name: &str) -> Result<(), FilterError> {
        let mut chars = name.chars();
        let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(FilterError::InvalidCollection(name.to_string()));
        }
        Ok(())
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            (None, Some(o)) => format!("OFFSET {}", o),
            (None, None) => String::new(),
        }
    }
}

pub fn is_deleted(doc: &Map<String, Value>) -> bool {
    doc.get("deleted").and_then(Value::as_bool).unwrap_or(false)
}
