pub mod config;
pub mod error;
pub mod handlers;
pub mod kb;
pub mod middleware;
pub mod model_client;
pub mod orchestrator;
pub mod persistence;
pub mod reliability;
pub mod secrets;
pub mod session;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "FIR Pipeline API",
        version = "1.0.0",
        description = "Stepwise complaint-to-FIR document generation pipeline",
        license(name = "MIT")
    ),
    paths(
        handlers::health::health,
        handlers::health::reliability,
        handlers::health::reset_circuit_breaker,
        handlers::health::trigger_auto_recovery,
        handlers::process::process,
        handlers::process::validate,
        handlers::process::regenerate,
        handlers::process::session_status,
        handlers::process::authenticate,
        handlers::fir::get_fir,
        handlers::fir::get_fir_content,
        handlers::fir::list_firs,
    ),
    components(schemas(
        handlers::process::ValidateRequest,
        handlers::process::RegenerateRequest,
        handlers::process::AuthenticateRequest,
    )),
    tags(
        (name = "health", description = "Health & reliability endpoints"),
        (name = "pipeline", description = "Stepwise FIR generation pipeline"),
        (name = "fir", description = "FIR record retrieval"),
    )
)]
pub struct ApiDoc;

/// Builds the application router. Extracted from `main()` so integration
/// tests can construct the app without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/health/ready", get(handlers::health::readiness));

    let protected = Router::new()
        .route("/process", post(handlers::process::process))
        .route("/validate", post(handlers::process::validate))
        .route("/regenerate/{session_id}", post(handlers::process::regenerate))
        .route("/session/{session_id}/status", get(handlers::process::session_status))
        .route("/authenticate", post(handlers::process::authenticate))
        .route("/fir/{fir_number}", get(handlers::fir::get_fir))
        .route("/fir/{fir_number}/content", get(handlers::fir::get_fir_content))
        .route("/list_firs", get(handlers::fir::list_firs))
        .route("/metrics", get(handlers::health::metrics))
        .route("/reliability", get(handlers::health::reliability))
        .route(
            "/reliability/circuit-breaker/{name}/reset",
            post(handlers::health::reset_circuit_breaker),
        )
        .route(
            "/reliability/auto-recovery/{name}/trigger",
            post(handlers::health::trigger_auto_recovery),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::shutdown_gate::shutdown_gate,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_api_key,
        ));

    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .cors_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect::<Vec<_>>(),
        )
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::HeaderName::from_static("x-api-key")])
        .max_age(std::time::Duration::from_secs(86_400));

    let mut router = public
        .merge(protected)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024))
        .layer(axum::middleware::from_fn(middleware::request_tracking::request_id))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    for header_layer in middleware::security_headers::layers() {
        router = router.layer(header_layer);
    }

    router.with_state(state)
}
