/*
 * Responsibility
 * - report 作成 (作成者 = 解決済み identity), 承認/却下, 見積もり
 * - 出力は REPORT_SHAPE を通す (userId は user.id から導出)
 */
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    api::v1::{
        dto::reports::{
            ApproveReportRequest, CreateReportRequest, EstimateParams, EstimateResponse,
            REPORT_SHAPE, ReportView,
        },
        extractors::ReqCtx,
    },
    error::AppError,
    repos::report_repo::{EstimateQuery, NewReport},
    services::shape::Shaped,
    state::AppState,
};

pub async fn create_report(
    State(state): State<AppState>,
    ReqCtx(ctx): ReqCtx,
    Json(req): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("VALIDATION_FAILED", msg))?;

    // Authenticated only guarantees a session reference; the owner must exist.
    let user = ctx.identity.ok_or(AppError::not_found("user"))?;

    let report = state
        .reports
        .insert(
            NewReport {
                price: req.price,
                make: &req.make,
                model: &req.model,
                year: req.year,
                lng: req.lng,
                lat: req.lat,
                mileage: req.mileage,
            },
            user.id,
        )
        .await?;

    tracing::info!(report_id = report.id, user_id = user.id, "report created");
    Ok((
        StatusCode::CREATED,
        Shaped::new(
            &REPORT_SHAPE,
            ReportView {
                report,
                user: Some(user),
            },
        ),
    ))
}

pub async fn approve_report(
    State(state): State<AppState>,
    Path(report_id): Path<i64>,
    Json(req): Json<ApproveReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    let report = state
        .reports
        .set_approval(report_id, req.approved)
        .await?
        .ok_or(AppError::not_found("report"))?;

    let user = match report.user_id {
        Some(owner) => state.users.find_by_id(owner).await?,
        None => None,
    };

    tracing::info!(report_id, approved = req.approved, "report approval changed");
    Ok(Shaped::new(&REPORT_SHAPE, ReportView { report, user }))
}

pub async fn estimate(
    State(state): State<AppState>,
    Query(params): Query<EstimateParams>,
) -> Result<Json<EstimateResponse>, AppError> {
    params
        .validate()
        .map_err(|msg| AppError::bad_request("VALIDATION_FAILED", msg))?;

    let price = state
        .reports
        .estimate(EstimateQuery {
            make: &params.make,
            model: &params.model,
            year: params.year,
            lng: params.lng,
            lat: params.lat,
            mileage: params.mileage,
        })
        .await?;

    Ok(Json(EstimateResponse { price }))
}
