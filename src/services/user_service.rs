use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationError};

use super::ListParams;
use crate::api::format::UserView;
use crate::auth::{hash_password, password_rule_violation, verify_password, AuthError, TokenIssuer, TokenKind};
use crate::database::models::{Role, User};
use crate::database::{paginate, Document, Page, Repository, StoreError};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Email already exists")]
    EmailTaken,
    #[error("{0}")]
    InvalidRole(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,
    #[error("Current password is incorrect")]
    IncorrectPassword,
    #[error("User not found")]
    NotFound,
}

/// A write that collided with another account's email
fn email_conflict(err: StoreError) -> UserError {
    match err {
        StoreError::UniqueViolation { ref field, .. } if field == "email" => UserError::EmailTaken,
        other => UserError::Store(other),
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::Store(e) => e.into(),
            UserError::Auth(e) => e.into(),
            UserError::EmailTaken => ApiError::field("email", err.to_string()),
            UserError::InvalidRole(msg) => ApiError::field("role", msg),
            UserError::InvalidCredentials | UserError::InvalidRefreshToken => ApiError::unauthorized(err.to_string()),
            UserError::IncorrectPassword => ApiError::bad_request(err.to_string()),
            UserError::NotFound => ApiError::not_found(err.to_string()),
        }
    }
}

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(rule("password", "Password is required"));
    }
    match password_rule_violation(password) {
        Some(message) => Err(rule("password", message)),
        None => Ok(()),
    }
}

fn validate_role(role: &str) -> Result<(), ValidationError> {
    if Role::ALL.contains(&role) {
        Ok(())
    } else {
        Err(rule("role", "Role must be one of: user, superadmin"))
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterUser {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[serde(default)]
    #[validate(custom(function = "validate_password"))]
    pub password: String,
    #[validate(custom(function = "validate_role"))]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    #[validate(custom(function = "validate_password"))]
    pub password: Option<String>,
    #[validate(custom(function = "validate_role"))]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[serde(default)]
    #[validate(custom(function = "validate_password"))]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub user: UserView,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResult {
    pub access_token: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn parse_role(role: Option<&str>) -> Result<Option<Role>, UserError> {
    role.map(str::parse::<Role>).transpose().map_err(UserError::InvalidRole)
}

/// Accounts, credentials and tokens
#[derive(Clone)]
pub struct UserService {
    users: Repository<User>,
    tokens: Arc<TokenIssuer>,
}

impl UserService {
    pub fn new(state: &AppState) -> Self {
        Self { users: state.users(), tokens: state.tokens.clone() }
    }

    async fn email_owner(&self, email: &str) -> Result<Option<String>, UserError> {
        Ok(self.users.find_one(&json!({ "email": email })).await?.map(|user| user.id))
    }

    pub async fn register(&self, input: RegisterUser) -> Result<UserView, UserError> {
        let email = normalize_email(&input.email);
        if self.email_owner(&email).await?.is_some() {
            return Err(UserError::EmailTaken);
        }

        let user = User {
            name: input.name,
            email,
            password: hash_password(&input.password)?,
            role: parse_role(input.role.as_deref())?.unwrap_or_default(),
        };
        let stored = self.users.create(user).await.map_err(email_conflict)?;
        info!("Registered user {}", stored.id);
        Ok(UserView::from(stored))
    }

    pub async fn login(&self, input: LoginRequest) -> Result<LoginResult, UserError> {
        let email = normalize_email(&input.email);
        let user = self.users.find_one(&json!({ "email": email })).await?.ok_or(UserError::InvalidCredentials)?;
        if !verify_password(&input.password, &user.data.password)? {
            return Err(UserError::InvalidCredentials);
        }

        let (access_token, refresh_token) = self.tokens.issue_pair(&user.id, &user.data.email, user.data.role)?;
        Ok(LoginResult { user: UserView::from(user), access_token, refresh_token })
    }

    /// Exchange a refresh token for a short-lived access token. The account
    /// must still exist.
    pub async fn refresh(&self, input: RefreshRequest) -> Result<RefreshResult, UserError> {
        let claims = self
            .tokens
            .verify(TokenKind::Refresh, &input.refresh_token)
            .map_err(|_| UserError::InvalidRefreshToken)?;
        if self.users.fetch_by_id(&claims.sub).await?.is_none() {
            return Err(UserError::InvalidRefreshToken);
        }
        let access_token = self.tokens.issue_refreshed_access(&claims)?;
        Ok(RefreshResult { access_token })
    }

    pub async fn change_password(&self, user_id: &str, input: ChangePasswordRequest) -> Result<(), UserError> {
        let user = self.users.fetch_by_id(user_id).await?.ok_or(UserError::NotFound)?;
        if !verify_password(&input.current_password, &user.data.password)? {
            return Err(UserError::IncorrectPassword);
        }

        let mut patch = Document::new();
        patch.insert("password".to_string(), Value::String(hash_password(&input.new_password)?));
        self.users.update(user_id, patch).await?.ok_or(UserError::NotFound)?;
        info!("Changed password of user {}", user_id);
        Ok(())
    }

    pub async fn list(&self, params: &ListParams) -> Result<Page<UserView>, UserError> {
        let page = paginate(&self.users, &params.criteria, &params.sort, params.page, params.per_page).await?;
        Ok(page.map(UserView::from))
    }

    pub async fn get(&self, id: &str) -> Result<UserView, UserError> {
        self.users.fetch_by_id(id).await?.map(UserView::from).ok_or(UserError::NotFound)
    }

    pub async fn update(&self, id: &str, input: UpdateUser) -> Result<UserView, UserError> {
        let mut patch = Document::new();
        if let Some(name) = input.name {
            patch.insert("name".to_string(), Value::String(name));
        }
        if let Some(email) = input.email.as_deref().map(normalize_email) {
            if self.email_owner(&email).await?.is_some_and(|owner| owner != id) {
                return Err(UserError::EmailTaken);
            }
            patch.insert("email".to_string(), Value::String(email));
        }
        if let Some(password) = input.password {
            patch.insert("password".to_string(), Value::String(hash_password(&password)?));
        }
        if let Some(role) = parse_role(input.role.as_deref())? {
            patch.insert("role".to_string(), Value::String(role.as_str().to_string()));
        }

        self.users.update(id, patch).await.map_err(email_conflict)?.map(UserView::from).ok_or(UserError::NotFound)
    }

    pub async fn delete(&self, id: &str, deleted_by: Option<&str>) -> Result<(), UserError> {
        self.users.soft_delete(id, deleted_by).await?.ok_or(UserError::NotFound)?;
        Ok(())
    }
}
