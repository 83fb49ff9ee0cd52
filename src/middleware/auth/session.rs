//! session cookie decode → identity 解決 → RequestCtx を extensions に入れる
//!
//! 戻りで handler が返した `SessionWrite` を見て Set-Cookie を書く。
//!
//! resolve は next.run() の前に await し終えるので、guard / handler は必ず
//! 解決済みの RequestCtx を見る (identity 無しは `None` であって未初期化ではない)。

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::services::identity;
use crate::services::session::{SessionData, SessionWrite};
use crate::state::AppState;

/// Wrap `router` with the session stage. Apply it outside of every guard.
///
/// ```ignore
/// let v1 = api::v1::routes();
/// let v1 = middleware::auth::session::apply(v1, state.clone());
/// app = app.nest("/api/v1", v1);
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    router.layer(middleware::from_fn_with_state(state, session_middleware))
}

async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let session = state
        .sessions
        .read_cookie(req.headers())
        .map(|value| state.sessions.decode(value))
        .unwrap_or_default();

    // Store failure here is a 500, not an anonymous request.
    let ctx = identity::resolve(state.users.as_ref(), &session).await?;

    // middleware → guard / extractor への受け渡し
    req.extensions_mut().insert(ctx);

    let mut res = next.run(req).await;

    if let Some(write) = res.extensions_mut().remove::<SessionWrite>() {
        let cookie = match write {
            SessionWrite::SignIn(user_id) => {
                let now = chrono::Utc::now().timestamp();
                state
                    .sessions
                    .set_cookie(&SessionData::signed_in(user_id, now))
            }
            SessionWrite::SignOut => state.sessions.clear_cookie(),
        };

        let cookie = cookie.map_err(|err| {
            tracing::error!(error = %err, "failed to build session cookie");
            AppError::Internal
        })?;
        res.headers_mut().append(header::SET_COOKIE, cookie);
    }

    Ok(res)
}
