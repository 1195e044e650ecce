use axum::extract::{Extension, Path, Query, State};
use serde_json::{json, Value};

use super::utils::{valid_id, ListQuery, ValidatedJson};
use crate::api::format::UserView;
use crate::database::Page;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::user_service::{
    ChangePasswordRequest, LoginRequest, LoginResult, RefreshRequest, RefreshResult, RegisterUser, UpdateUser,
};
use crate::services::UserService;
use crate::state::AppState;

/// POST /api/v1/user - Register an account
pub async fn create(State(state): State<AppState>, ValidatedJson(input): ValidatedJson<RegisterUser>) -> ApiResult<UserView> {
    let user = UserService::new(&state).register(input).await?;
    Ok(ApiResponse::created("User created successfully", user))
}

/// POST /api/v1/user/login
pub async fn login(State(state): State<AppState>, ValidatedJson(input): ValidatedJson<LoginRequest>) -> ApiResult<LoginResult> {
    let result = UserService::new(&state).login(input).await?;
    Ok(ApiResponse::success("User logged in successfully", result))
}

/// POST /api/v1/user/refresh-token
pub async fn refresh_token(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<RefreshRequest>,
) -> ApiResult<RefreshResult> {
    let result = UserService::new(&state).refresh(input).await?;
    Ok(ApiResponse::success("Access token refreshed successfully", result))
}

/// POST /api/v1/user/change-password - Change the caller's own password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ValidatedJson(input): ValidatedJson<ChangePasswordRequest>,
) -> ApiResult<Value> {
    UserService::new(&state).change_password(&auth_user.id, input).await?;
    Ok(ApiResponse::success("Password changed successfully", json!({})))
}

/// GET /api/v1/user - Paginated user list
pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Page<UserView>> {
    let params = query.resolve(&state.pagination)?;
    let page = UserService::new(&state).list(&params).await?;
    Ok(ApiResponse::success("Users retrieved successfully", page))
}

/// GET /api/v1/user/:id
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<UserView> {
    let user = UserService::new(&state).get(valid_id(&id)?).await?;
    Ok(ApiResponse::success("User retrieved successfully", user))
}

/// PUT /api/v1/user/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(input): ValidatedJson<UpdateUser>,
) -> ApiResult<UserView> {
    let user = UserService::new(&state).update(valid_id(&id)?, input).await?;
    Ok(ApiResponse::success("User updated successfully", user))
}

/// DELETE /api/v1/user/:id - Soft delete, attributed to the caller
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Value> {
    UserService::new(&state).delete(valid_id(&id)?, Some(&auth_user.id)).await?;
    Ok(ApiResponse::success("User deleted successfully", json!({})))
}
