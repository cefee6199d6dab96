use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::auth::{self, AdminAuth};
use crate::handlers;
use crate::metrics::broadcast;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    let admin_auth = Arc::new(AdminAuth::new(state.config.admin_token.clone()));

    // Monitoring surface. Authorization runs before the handlers, so no
    // snapshot is ever computed for a rejected caller.
    let admin = Router::new()
        .route("/api/admin/metrics", get(broadcast::get_metrics))
        .route("/api/admin/metrics/stream", get(broadcast::metrics_stream))
        .layer(axum_mw::from_fn_with_state(admin_auth, auth::require_admin));

    Router::new()
        // ── Transaction endpoints ───────────────────────────────
        .route(
            "/api/transactions",
            get(handlers::transactions::list_transactions)
                .post(handlers::transactions::create_transaction),
        )
        .route(
            "/api/transactions/:id",
            get(handlers::transactions::get_transaction),
        )
        // ── Budget endpoints ────────────────────────────────────
        .route("/api/budgets", post(handlers::budgets::create_budget))
        .route("/api/budgets/:id", get(handlers::budgets::get_budget))
        // ── Session endpoints ───────────────────────────────────
        .route("/api/sessions", post(handlers::sessions::create_session))
        .route("/api/sessions/:id", get(handlers::sessions::get_session))
        // ── Liveness ────────────────────────────────────────────
        .route("/api/health", get(handlers::health))
        // ── Monitoring surface ──────────────────────────────────
        .merge(admin)
        // ── Provide shared state to all routes above ────────────
        .with_state(Arc::clone(&state))
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn_with_state(
            Arc::clone(&state.metrics),
            timing::track_request,
        ))
        .layer(CorsLayer::permissive())
}
