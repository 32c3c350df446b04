pub mod attendance;
pub mod auth;
pub mod error;
pub mod notices;
pub mod rest;
pub mod state;
pub mod users;

use axum::{
    extract::DefaultBodyLimit,
    http::{header::ACCEPT, header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use rest::ApiDoc;
pub use state::AppState;

/// Notices carry base64 PDF attachments inline.
pub const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Builds a CORS layer from the configured origins, skipping any that are
/// not valid header values.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT])
}

/// The complete application: every route under `/api` plus the Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config.cors_origins);

    let api_routes = Router::new()
        .route("/login", post(auth::login_handler))
        .route("/forgot-password", post(auth::forgot_password_handler))
        .route(
            "/users",
            get(users::list_users_handler).post(users::create_user_handler),
        )
        .route(
            "/users/{id}",
            put(users::update_user_handler).delete(users::delete_user_handler),
        )
        .route(
            "/attendance",
            get(attendance::list_attendance_handler).post(attendance::mark_attendance_handler),
        )
        .route(
            "/notices",
            get(notices::list_notices_handler).post(notices::create_notice_handler),
        )
        .route(
            "/notices/{id}",
            put(notices::update_notice_handler).delete(notices::delete_notice_handler),
        )
        .route(
            "/settings",
            get(rest::get_settings_handler).post(rest::save_settings_handler),
        )
        .route("/health", get(rest::health_handler));

    let api_router = Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
