use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::services::identity::RequestCtx;
use crate::state::AppState;

/// Handler で RequestCtx を受け取るための extractor
///
/// session middleware が RequestCtx を request.extensions() に insert 済みである前提。
/// 見つからない場合は middleware の配線ミスなので 500 を返す
/// (未認証は RequestCtx の中身で表現され、ここでは拒否しない)。
pub struct ReqCtx(pub RequestCtx);

impl FromRequestParts<AppState> for ReqCtx {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestCtx>()
            .cloned()
            .map(ReqCtx)
            .ok_or_else(|| {
                tracing::error!("request context missing; session middleware not applied");
                AppError::Internal
            })
    }
}
