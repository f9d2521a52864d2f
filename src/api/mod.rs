mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::generate::TaskGenerator;
use crate::geometry::PathCache;
use crate::sessions::Sessions;

pub use handlers::{ClimbPath, ClimbProfile, GenerateInput, GenerateResponse};
pub use middleware::{RateLimiter, SecurityConfig};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Sessions,
    pub generator: TaskGenerator,
    pub paths: PathCache,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(sessions: Sessions, generator: TaskGenerator, config: Config) -> Self {
        Self {
            sessions,
            generator,
            paths: PathCache::default(),
            config: Arc::new(config),
        }
    }
}

/// Router without authentication or rate limiting (local use and tests).
pub fn create_router(state: AppState) -> Router {
    create_router_with_security(state, SecurityConfig::disabled())
}

pub fn create_router_with_security(state: AppState, security: SecurityConfig) -> Router {
    let user = Router::new()
        // Whole document
        .route("/state", get(handlers::get_state))
        .route("/state", put(handlers::put_state))
        .route("/state", delete(handlers::sign_out))
        .route("/preferences", put(handlers::update_preferences))
        // Mountains
        .route("/mountains", get(handlers::list_mountains))
        .route("/mountains", post(handlers::create_mountain))
        .route("/mountains/{id}", get(handlers::get_mountain))
        .route("/mountains/{id}", put(handlers::update_mountain))
        .route("/mountains/{id}", delete(handlers::delete_mountain))
        .route("/mountains/{id}/select", post(handlers::select_mountain))
        .route("/selection/next", post(handlers::select_next))
        .route("/selection/previous", post(handlers::select_previous))
        // Derived views
        .route("/mountains/{id}/progress", get(handlers::get_progress))
        .route("/mountains/{id}/path", get(handlers::get_path))
        .route("/mountains/{id}/profile", get(handlers::get_profile))
        // Tasks
        .route("/mountains/{id}/tasks", post(handlers::create_task))
        .route("/mountains/{id}/tasks/{task_id}", delete(handlers::delete_task))
        .route("/mountains/{id}/tasks/{task_id}/toggle", post(handlers::toggle_task))
        .route("/mountains/{id}/tasks/{task_id}/photo", put(handlers::update_task_photo))
        .route("/mountains/{id}/generate", post(handlers::generate_tasks));

    let mut api = Router::new()
        .nest("/users/{user}", user)
        .route("/photos/{id}", get(handlers::get_photo));

    if security.api_key.is_some() {
        api = api.layer(from_fn_with_state(security.clone(), middleware::auth_middleware));
    }
    if let Some(limiter) = security.rate_limiter.clone() {
        api = api.layer(from_fn_with_state(limiter, middleware::rate_limit_middleware));
    }

    // Health stays reachable without credentials.
    let api = api.route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&security)),
        )
        .with_state(state)
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    match &security.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
        }
        None => CorsLayer::permissive(),
    }
}
