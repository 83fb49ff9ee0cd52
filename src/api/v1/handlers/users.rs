/*
 * Responsibility
 * - /auth/{id}, /auth?email= の user 参照・更新・削除
 * - 更新で password が来たら CredentialManager 経由で salt.hash に再エンコード
 * - 出力は USER_SHAPE を通す (password / admin は出さない)
 */
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    api::v1::dto::users::{ListUsersQuery, USER_SHAPE, UpdateUserRequest},
    error::AppError,
    services::shape::Shaped,
    state::AppState,
};

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::not_found("user"))?;

    Ok(Shaped::new(&USER_SHAPE, user))
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let users = match query.email.as_deref() {
        Some(email) => state.users.find_by_email(email).await?,
        None => state.users.list().await?,
    };

    Ok(Shaped::new(&USER_SHAPE, users))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("VALIDATION_FAILED", msg))?;

    let user = state
        .credentials
        .update(user_id, req.email.as_deref(), req.password, req.admin)
        .await?
        .ok_or(AppError::not_found("user"))?;

    tracing::info!(user_id, "user updated");
    Ok(Shaped::new(&USER_SHAPE, user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if state.users.delete(user_id).await? {
        tracing::info!(user_id, "user deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("user"))
    }
}
