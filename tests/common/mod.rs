#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use cms_api_rust::config::AppConfig;
use cms_api_rust::database::models::EntityRegistry;
use cms_api_rust::database::MemoryStore;
use cms_api_rust::{app, AppState};

pub const PASSWORD: &str = "Secret!1";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

/// Router over a fresh in-process store with development settings
pub fn spawn_app() -> TestApp {
    let config = AppConfig::development();
    let registry = EntityRegistry::standard();
    let state = AppState::new(Arc::new(MemoryStore::for_registry(&registry)), Arc::new(registry), &config);
    let router = app(state.clone(), &config.security);
    TestApp { router, state }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder.header(header::CONTENT_TYPE, "application/json").body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        Ok((status, value))
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Register an account and return its id
    pub async fn register(&self, name: &str, email: &str, role: &str) -> Result<String> {
        let (status, body) = self
            .post("/api/v1/user", None, json!({ "name": name, "email": email, "password": PASSWORD, "role": role }))
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "register failed: {} {}", status, body);
        Ok(body["data"]["id"].as_str().unwrap_or_default().to_string())
    }

    /// Log in and return the full login payload (`data`)
    pub async fn login(&self, email: &str) -> Result<Value> {
        let (status, body) =
            self.post("/api/v1/user/login", None, json!({ "email": email, "password": PASSWORD })).await?;
        anyhow::ensure!(status == StatusCode::OK, "login failed: {} {}", status, body);
        Ok(body["data"].clone())
    }

    /// Register a superadmin and return an access token for it
    pub async fn superadmin_token(&self) -> Result<String> {
        self.register("Root", "root@example.com", "superadmin").await?;
        let login = self.login("root@example.com").await?;
        Ok(login["accessToken"].as_str().unwrap_or_default().to_string())
    }

    pub async fn user_token(&self, email: &str) -> Result<String> {
        self.register("Plain", email, "user").await?;
        let login = self.login(email).await?;
        Ok(login["accessToken"].as_str().unwrap_or_default().to_string())
    }
}
