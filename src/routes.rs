use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::SecurityConfig;
use crate::handlers::{self, contacts, model, users};
use crate::middleware::{jwt_auth_middleware, superadmin_only};
use crate::state::AppState;

pub fn app(state: AppState, security: &SecurityConfig) -> Router {
    Router::new()
        // Public
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_routes(state.clone()))
        // Global middleware
        .layer(cors(security))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes(state: AppState) -> Router<AppState> {
    let authenticated = || middleware::from_fn_with_state(state.clone(), jwt_auth_middleware);

    let public = Router::new()
        .route("/model", get(model::get))
        .route("/user", post(users::create))
        .route("/user/login", post(users::login))
        .route("/user/refresh-token", post(users::refresh_token))
        .route("/contact", get(contacts::list).post(contacts::create))
        .route("/contact/:id", get(contacts::get));

    let signed_in = Router::new()
        .route("/user/change-password", post(users::change_password))
        .route_layer(authenticated());

    // Layers run bottom-up: authenticate, then check the role
    let superadmin = Router::new()
        .route("/user", get(users::list))
        .route("/user/:id", get(users::get).put(users::update).delete(users::delete))
        .route("/contact/:id", axum::routing::put(contacts::update).delete(contacts::delete))
        .route_layer(middleware::from_fn(superadmin_only))
        .route_layer(authenticated());

    public.merge(signed_in).merge(superadmin)
}

fn cors(security: &SecurityConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> =
        security.cors_origins.iter().filter_map(|origin| HeaderValue::from_str(origin).ok()).collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
