//! Credential check for the administrative monitoring surface.
//!
//! The surface fails closed: no configured token means every request is
//! rejected, and nothing downstream of this middleware ever runs for an
//! unauthorized caller.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use crate::handlers::AppError;

/// Roles a verified credential can carry. Only administrators may see
/// monitoring data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
}

/// Verified identity attached to the request after the admin check.
#[derive(Debug, Clone)]
pub struct Principal {
    pub role: Role,
}

/// Token store for the admin surface.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    token: Option<String>,
}

impl AdminAuth {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    fn role_for(&self, credential: &str) -> Option<Role> {
        match &self.token {
            Some(expected) if expected == credential => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Middleware guarding `/api/admin/...`. Accepts the credential as a
/// bearer header or a `token` query parameter (EventSource clients
/// cannot set headers). Missing credential → 401, anything short of the
/// administrative role → 403, in both cases before any snapshot work.
pub async fn require_admin(
    State(auth): State<Arc<AdminAuth>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let credential = bearer_token(&req)
        .or_else(|| query_token(&req))
        .map(str::to_owned);

    let Some(credential) = credential else {
        return Err(AppError::Unauthorized);
    };

    match auth.role_for(&credential) {
        Some(role) => {
            req.extensions_mut().insert(Principal { role });
            Ok(next.run(req).await)
        }
        None => {
            debug!(path = req.uri().path(), "rejected non-administrative credential");
            Err(AppError::Forbidden)
        }
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn query_token(req: &Request) -> Option<&str> {
    req.uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{self, StatusCode};
    use axum::routing::get;
    use axum::{middleware, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    /// Counts handler invocations: any rejected request that still
    /// reached the handler would show up here.
    fn guarded_app(token: Option<&str>) -> (Router, Arc<AtomicUsize>) {
        let snapshots_built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&snapshots_built);
        let auth = Arc::new(AdminAuth::new(token.map(str::to_owned)));

        let app = Router::new()
            .route(
                "/api/admin/metrics",
                get(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        "snapshot"
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(auth, require_admin));
        (app, snapshots_built)
    }

    async fn status_of(app: &Router, uri: &str, bearer: Option<&str>) -> StatusCode {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        app.clone()
            .oneshot(builder.body(Body::empty()).expect("request"))
            .await
            .expect("response")
            .status()
    }

    #[tokio::test]
    async fn rejects_before_any_snapshot_work() {
        let (app, snapshots_built) = guarded_app(Some("sesame"));

        let status = status_of(&app, "/api/admin/metrics", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let status = status_of(&app, "/api/admin/metrics", Some("wrong")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        assert_eq!(snapshots_built.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn admits_bearer_and_query_credentials() {
        let (app, snapshots_built) = guarded_app(Some("sesame"));

        let status = status_of(&app, "/api/admin/metrics", Some("sesame")).await;
        assert_eq!(status, StatusCode::OK);

        let status = status_of(&app, "/api/admin/metrics?token=sesame", None).await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(snapshots_built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fails_closed_when_no_token_is_configured() {
        let (app, snapshots_built) = guarded_app(None);

        let status = status_of(&app, "/api/admin/metrics", Some("anything")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(snapshots_built.load(Ordering::SeqCst), 0);
    }
}
