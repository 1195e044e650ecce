use axum::extract::{Extension, Path, Query, State};
use serde_json::{json, Value};

use super::utils::{valid_id, ListQuery, ValidatedJson};
use crate::api::format::ContactView;
use crate::database::Page;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::contact_service::{SubmitContact, UpdateContact};
use crate::services::ContactService;
use crate::state::AppState;

/// GET /api/v1/contact
pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Page<ContactView>> {
    let params = query.resolve(&state.pagination)?;
    let page = ContactService::new(&state).list(&params).await?;
    Ok(ApiResponse::success("Contacts fetched successfully", page))
}

/// GET /api/v1/contact/:id
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<ContactView> {
    let contact = ContactService::new(&state).get(valid_id(&id)?).await?;
    Ok(ApiResponse::success("Contact fetched successfully", contact))
}

/// POST /api/v1/contact - Public contact form
pub async fn create(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<SubmitContact>,
) -> ApiResult<ContactView> {
    let contact = ContactService::new(&state).submit(input).await?;
    Ok(ApiResponse::created("Contact form submitted successfully", contact))
}

/// PUT /api/v1/contact/:id - Follow-up status and note
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(input): ValidatedJson<UpdateContact>,
) -> ApiResult<ContactView> {
    let contact = ContactService::new(&state).update(valid_id(&id)?, input).await?;
    Ok(ApiResponse::success("Contact status updated successfully", contact))
}

/// DELETE /api/v1/contact/:id
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Value> {
    ContactService::new(&state).delete(valid_id(&id)?, Some(&auth_user.id)).await?;
    Ok(ApiResponse::success("Contact deleted successfully", json!({})))
}
