use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::config::PaginationConfig;
use crate::error::ApiError;
use crate::services::ListParams;

/// JSON body that has passed `validator` rules; failures become 422
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::invalid_json(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Ids are UUID strings
pub fn valid_id(id: &str) -> Result<&str, ApiError> {
    uuid::Uuid::parse_str(id).map(|_| id).map_err(|_| ApiError::field("id", "Invalid ID format"))
}

/// Query string of list endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Case-insensitive match on `name`
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    /// JSON match criteria
    pub filter: Option<String>,
}

impl ListQuery {
    pub fn resolve(self, pagination: &PaginationConfig) -> Result<ListParams, ApiError> {
        let filter = match self.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(value @ Value::Object(_)) => Some(value),
                _ => return Err(ApiError::bad_request("filter must be a JSON object")),
            },
            None => None,
        };

        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| json!({ "name": { "$regex": regex::escape(s), "$options": "i" } }));

        let criteria = match (filter, search) {
            (Some(filter), Some(search)) => json!({ "$and": [filter, search] }),
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => json!({}),
        };

        let sort_by = self.sort_by.unwrap_or_else(|| "createdAt".to_string());
        let direction = match self.sort_order.as_deref() {
            Some(order) if order.eq_ignore_ascii_case("asc") => 1,
            _ => -1,
        };

        let mut per_page = self.per_page.unwrap_or(pagination.default_per_page);
        if let Some(max) = pagination.max_per_page {
            per_page = per_page.min(max);
        }

        Ok(ListParams {
            criteria,
            sort: json!({ sort_by: direction }),
            page: self.page.unwrap_or(1),
            per_page,
        })
    }
}
