use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;

use crate::database::models::ModelDescription;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelQuery {
    pub model_name: Option<String>,
}

/// GET /api/v1/model?modelName=User
///
/// Field metadata, table fields and single-instance state of a registered
/// model, for building admin forms and tables. Served without the success
/// envelope.
pub async fn get(State(state): State<AppState>, Query(query): Query<ModelQuery>) -> Result<Json<ModelDescription>, ApiError> {
    let name = query
        .model_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Please provide a valid modelName parameter"))?;

    Ok(Json(state.registry.describe(&name)?))
}
