/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - gate ごとに Router を分けて guard::require を route_layer で掛け、最後に merge
 *   - 同じ path (/auth/{id}) でも method 単位で gate が分かれる
 * - session stage は app 側で v1 全体の外側に掛ける
 */
use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::api::v1::handlers::{
    auth::{signin, signout, signup, whoami},
    reports::{approve_report, create_report, estimate},
    users::{delete_user, get_user, list_users, update_user},
};
use crate::middleware::auth::guard;
use crate::services::access::Access;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let public = Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/signin", post(signin))
        .route("/auth/signout", post(signout))
        .route("/auth", get(list_users))
        .route("/auth/{id}", get(get_user))
        .route("/reports/estimate", get(estimate));

    let authenticated = guard::require(
        Router::new()
            .route("/auth/whoami", get(whoami))
            .route("/reports", post(create_report)),
        Access::Authenticated,
    );

    let privileged = guard::require(
        Router::new()
            .route("/auth/{id}", patch(update_user).delete(delete_user))
            .route("/reports/{id}", patch(approve_report)),
        Access::Privileged,
    );

    public.merge(authenticated).merge(privileged)
}
