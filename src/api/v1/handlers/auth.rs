/*
 * Responsibility
 * - signup / signin / signout / whoami
 * - session の書き込みは SessionWrite を返すだけ (cookie は session middleware が書く)
 * - 出力は必ず USER_SHAPE を通す
 */
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::{
    api::v1::{
        dto::users::{CredentialsRequest, USER_SHAPE},
        extractors::ReqCtx,
    },
    error::AppError,
    services::{session::SessionWrite, shape::Shaped},
    state::AppState,
};

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("VALIDATION_FAILED", msg))?;

    let user = state.credentials.signup(&req.email, req.password).await?;

    Ok((
        StatusCode::CREATED,
        SessionWrite::SignIn(user.id),
        Shaped::new(&USER_SHAPE, user),
    ))
}

pub async fn signin(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("VALIDATION_FAILED", msg))?;

    let user = state.credentials.signin(&req.email, req.password).await?;

    Ok((SessionWrite::SignIn(user.id), Shaped::new(&USER_SHAPE, user)))
}

pub async fn signout() -> impl IntoResponse {
    (SessionWrite::SignOut, StatusCode::NO_CONTENT)
}

/// Gated by `Access::Authenticated`, which only looks at the session
/// reference. A reference to a deleted user gets this far and ends in 404.
pub async fn whoami(ReqCtx(ctx): ReqCtx) -> Result<impl IntoResponse, AppError> {
    let user = ctx.identity.ok_or(AppError::not_found("user"))?;
    Ok(Shaped::new(&USER_SHAPE, user))
}
