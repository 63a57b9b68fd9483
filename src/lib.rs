use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to specific origins in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route(
            "/api/auth/student-login",
            post(handlers::auth::student_login),
        )
        // Protected endpoints (require student JWT)
        .nest("/api", student_routes(app_state.clone()))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn student_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/auth/student-me", get(handlers::auth::student_me))
        .route(
            "/student/active-session",
            get(handlers::student::active_session),
        )
        .route("/student/tasks/{task_id}", get(handlers::student::task_detail))
        .route(
            "/student/tasks/{task_id}/submit",
            post(handlers::student::submit_task),
        )
        .route(
            "/student/tasks/{task_id}/hints/{level}",
            post(handlers::student::request_hint),
        )
        .route(
            "/student/finish-session",
            post(handlers::student::finish_session),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}
