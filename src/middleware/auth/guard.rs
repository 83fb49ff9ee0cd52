//! Access guard: rejects before the handler runs when the predicate is false.
//!
//! Must sit inside `session::apply`; the `RequestCtx` it reads is put there by
//! the session stage.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::services::{access::Access, identity::RequestCtx};
use crate::state::AppState;

/// Gate every route of `router` behind `access`.
///
/// `route_layer` so that unmatched paths still 404 instead of 401/403.
pub fn require(router: Router<AppState>, access: Access) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(access, guard_middleware))
}

async fn guard_middleware(
    State(access): State<Access>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(ctx) = req.extensions().get::<RequestCtx>() else {
        tracing::error!(?access, "guard reached without a resolved request context");
        return Err(AppError::Internal);
    };

    if !access.check(ctx) {
        tracing::debug!(?access, user_id = ?ctx.identity_ref, "access denied");
        return Err(match access {
            Access::Authenticated => AppError::Unauthorized,
            Access::Privileged => AppError::Forbidden,
        });
    }

    Ok(next.run(req).await)
}
