use axum::http::{header, HeaderValue, Method};
use axum::{middleware, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::auth::middleware::JwtSecret;
use crate::state::AppState;
use crate::tracking::roster;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Public routes (passenger clients, no auth)
    let public_routes = Router::new()
        .route(
            "/api/routes/active",
            axum::routing::get(roster::list_active_routes),
        );

    // Authenticated routes (JWT required, the Claims extractor validates the token)
    let authenticated_routes = Router::new()
        .route(
            "/api/routes/history",
            axum::routing::get(roster::list_route_history),
        )
        .route(
            "/api/routes/{session_id}/positions",
            axum::routing::get(roster::get_route_positions),
        )
        .route(
            "/api/fleet/stats",
            axum::routing::get(roster::get_fleet_stats),
        );

    // WebSocket endpoint (optional auth via query param, not JWT header)
    let ws_routes = Router::new().route(
        "/ws",
        axum::routing::get(ws_handler::ws_upgrade),
    );

    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// CORS policy for browser dashboards. An empty list allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
