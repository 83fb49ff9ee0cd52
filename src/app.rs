/*
 * Responsibility
 * - tracing / panic hook の初期化
 * - Config読み込み → store / service 生成 → Router 組み立て
 * - stage 順序: http layers → session (cookie decode + identity 解決) → guard → handler → shape
 * - axum::serve() で起動
 */
use std::{panic, process, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{Router, routing::get};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::{self, v1::handlers::health::health};
use crate::config::Config;
use crate::middleware::{self, http::HttpLimits};
use crate::repos::{
    MemoryReportStore, MemoryUserStore, PgReportStore, PgUserStore, ReportStore, UserStore,
};
use crate::services::{credentials::CredentialManager, session::SessionCodec};
use crate::state::AppState;

fn init_tracing() {
    // RUST_LOG wins when set, e.g.
    // RUST_LOG=info,carval_api=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // stderr can be hidden depending on how the process is launched
        tracing::error!(?info, "panic");

        // development: crash the whole process so it gets noticed
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(?config, "starting API on {}", config.addr);

    let state = build_state(&config).await?;
    let limits = HttpLimits {
        body_limit_bytes: config.request_body_limit_bytes,
        timeout: Duration::from_secs(config.request_timeout_seconds),
    };
    let app = build_router(state, limits);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_stores(config: &Config) -> Result<(Arc<dyn UserStore>, Arc<dyn ReportStore>)> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set; using in-memory stores (data is lost on restart)");
        let reports = Arc::new(MemoryReportStore::new());
        let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::with_reports(reports.clone()));
        let reports: Arc<dyn ReportStore> = reports;
        return Ok((users, reports));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok((
        Arc::new(PgUserStore::new(pool.clone())),
        Arc::new(PgReportStore::new(pool)),
    ))
}

async fn build_state(config: &Config) -> Result<AppState> {
    let (users, reports) = build_stores(config).await?;

    let credentials = CredentialManager::new(users.clone(), config.kdf, config.admin_emails.clone())
        .with_max_concurrent_derivations(config.kdf_max_concurrency);
    let sessions = SessionCodec::new(
        config.session_secret.as_bytes(),
        config.session_cookie_name.clone(),
        config.session_ttl_seconds,
        config.app_env.is_production(),
    )?;

    Ok(AppState::new(users, reports, credentials, sessions))
}

fn build_router(state: AppState, limits: HttpLimits) -> Router {
    let v1 = middleware::auth::session::apply(api::v1::routes(), state.clone());

    let router = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", v1)
        .with_state(state);

    middleware::http::apply(router, limits)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{HeaderMap, Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::services::credentials::KdfParams;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    struct TestApp {
        router: Router,
        users: Arc<MemoryUserStore>,
    }

    fn test_app() -> TestApp {
        let reports = Arc::new(MemoryReportStore::new());
        let users = Arc::new(MemoryUserStore::with_reports(reports.clone()));
        let credentials = CredentialManager::new(
            users.clone(),
            KdfParams::for_tests(),
            vec!["admin@x.com".to_string()],
        );
        let sessions = SessionCodec::new(KEY, "session", 3600, false).unwrap();
        let state = AppState::new(users.clone(), reports, credentials, sessions);

        let router = build_router(
            state,
            HttpLimits {
                body_limit_bytes: 64 * 1024,
                timeout: Duration::from_secs(10),
            },
        );
        TestApp { router, users }
    }

    fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let res = app.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, body)
    }

    // `session=<value>` from the Set-Cookie header, ready for a Cookie header.
    fn session_cookie(headers: &HeaderMap) -> String {
        let set_cookie = headers
            .get(header::SET_COOKIE)
            .expect("Set-Cookie")
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn signup(app: &TestApp, email: &str, password: &str) -> (Value, String) {
        let (status, headers, body) = send(
            app,
            request(
                "POST",
                "/api/v1/auth/signup",
                None,
                Some(json!({"email": email, "password": password})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (body, session_cookie(&headers))
    }

    fn report_body(price: i64, mileage: i64) -> Value {
        json!({
            "price": price,
            "make": "toyota",
            "model": "corolla",
            "year": 2015,
            "lng": 0.0,
            "lat": 0.0,
            "mileage": mileage,
        })
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = test_app();
        let (status, _, body) = send(&app, request("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn signup_signin_scenario() {
        let app = test_app();

        let (user, _) = signup(&app, "a@x.com", "pw1").await;
        let id = user["id"].as_i64().unwrap();
        assert_eq!(user, json!({"id": id, "email": "a@x.com"}));

        let stored = app.users.find_by_id(id).await.unwrap().unwrap();
        assert_ne!(stored.password, "pw1");

        let creds = |password: &str| Some(json!({"email": "a@x.com", "password": password}));

        let (status, _, body) =
            send(&app, request("POST", "/api/v1/auth/signup", None, creds("pw2"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "EMAIL_IN_USE");

        let (status, headers, body) =
            send(&app, request("POST", "/api/v1/auth/signin", None, creds("pw1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!(id));
        let cookie = session_cookie(&headers);

        let (status, _, body) =
            send(&app, request("GET", "/api/v1/auth/whoami", Some(&cookie), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"id": id, "email": "a@x.com"}));

        let (status, _, body) =
            send(&app, request("POST", "/api/v1/auth/signin", None, creds("wrong"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_CREDENTIAL");

        let (status, _, _) = send(
            &app,
            request(
                "POST",
                "/api/v1/auth/signin",
                None,
                Some(json!({"email": "b@x.com", "password": "anything"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_the_store() {
        let app = test_app();
        let (status, _, body) = send(
            &app,
            request(
                "POST",
                "/api/v1/auth/signup",
                None,
                Some(json!({"email": "not-an-email", "password": "pw"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
        assert!(app.users.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn whoami_requires_a_session() {
        let app = test_app();

        let (status, _, body) = send(&app, request("GET", "/api/v1/auth/whoami", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _, _) = send(
            &app,
            request("GET", "/api/v1/auth/whoami", Some("session=forged.value"), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (user, cookie) = signup(&app, "a@x.com", "pw1").await;
        let (status, _, body) =
            send(&app, request("GET", "/api/v1/auth/whoami", Some(&cookie), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, user);
    }

    #[tokio::test]
    async fn signout_clears_the_session() {
        let app = test_app();
        let (_, cookie) = signup(&app, "a@x.com", "pw1").await;

        let (status, headers, _) =
            send(&app, request("POST", "/api/v1/auth/signout", Some(&cookie), None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let cleared = session_cookie(&headers);
        assert_eq!(cleared, "session=");

        let (status, _, _) =
            send(&app, request("GET", "/api/v1/auth/whoami", Some(&cleared), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stale_session_passes_authenticated_but_resolves_to_nothing() {
        let app = test_app();
        let (user, cookie) = signup(&app, "a@x.com", "pw1").await;
        let id = user["id"].as_i64().unwrap();
        assert!(app.users.delete(id).await.unwrap());

        // not 401: the gate only sees the session reference
        let (status, _, body) =
            send(&app, request("GET", "/api/v1/auth/whoami", Some(&cookie), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, _, _) = send(
            &app,
            request("POST", "/api/v1/reports", Some(&cookie), Some(report_body(1000, 10))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_routes_require_privilege() {
        let app = test_app();
        let (_, admin) = signup(&app, "admin@x.com", "pw").await;
        let (user, plain) = signup(&app, "a@x.com", "pw").await;
        let user_id = user["id"].as_i64().unwrap();

        let (status, _, report) = send(
            &app,
            request("POST", "/api/v1/reports", Some(&plain), Some(report_body(12_000, 50_000))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(report["userId"], json!(user_id));
        assert_eq!(report["approved"], json!(false));
        assert!(report.get("user").is_none());
        let uri = format!("/api/v1/reports/{}", report["id"]);

        let approve = Some(json!({"approved": true}));
        let (status, _, _) = send(&app, request("PATCH", &uri, None, approve.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _, _) = send(&app, request("PATCH", &uri, Some(&plain), approve.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, body) = send(&app, request("PATCH", &uri, Some(&admin), approve.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["approved"], json!(true));
        assert_eq!(body["userId"], json!(user_id));

        let (status, _, _) = send(
            &app,
            request("PATCH", "/api/v1/reports/999", Some(&admin), approve),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let user_uri = format!("/api/v1/auth/{user_id}");
        let (status, _, _) = send(&app, request("DELETE", &user_uri, Some(&plain), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _, _) = send(&app, request("DELETE", &user_uri, Some(&admin), None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = send(&app, request("GET", &user_uri, None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reports_require_a_session() {
        let app = test_app();
        let (status, _, _) = send(
            &app,
            request("POST", "/api/v1/reports", None, Some(report_body(1000, 10))),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn estimate_uses_approved_reports_only() {
        let app = test_app();
        let (_, admin) = signup(&app, "admin@x.com", "pw").await;

        let uri = "/api/v1/reports/estimate?make=toyota&model=corolla&year=2016&lng=1&lat=1&mileage=50000";
        let (status, _, body) = send(&app, request("GET", uri, None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"price": null}));

        let (_, _, report) = send(
            &app,
            request("POST", "/api/v1/reports", Some(&admin), Some(report_body(12_000, 50_000))),
        )
        .await;
        let (_, _, _) = send(
            &app,
            request("POST", "/api/v1/reports", Some(&admin), Some(report_body(90_000, 50_000))),
        )
        .await;
        let (status, _, _) = send(
            &app,
            request(
                "PATCH",
                &format!("/api/v1/reports/{}", report["id"]),
                Some(&admin),
                Some(json!({"approved": true})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, _, body) = send(&app, request("GET", uri, None, None)).await;
        assert_eq!(body, json!({"price": 12000.0}));
    }

    #[tokio::test]
    async fn user_listing_and_update_never_expose_secrets() {
        let app = test_app();
        let (_, admin) = signup(&app, "admin@x.com", "pw").await;
        let (user, _) = signup(&app, "a@x.com", "pw1").await;
        let user_id = user["id"].as_i64().unwrap();

        let (status, _, body) = send(&app, request("GET", "/api/v1/auth", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        let listed = body.as_array().unwrap();
        assert_eq!(listed.len(), 2);
        for u in listed {
            let mut keys: Vec<_> = u.as_object().unwrap().keys().cloned().collect();
            keys.sort();
            assert_eq!(keys, ["email", "id"]);
        }

        let (_, _, body) = send(&app, request("GET", "/api/v1/auth?email=a@x.com", None, None)).await;
        assert_eq!(body, json!([user]));

        let (status, _, body) = send(
            &app,
            request(
                "PATCH",
                &format!("/api/v1/auth/{user_id}"),
                Some(&admin),
                Some(json!({"password": "pw2", "admin": true})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, user);

        let stored = app.users.find_by_id(user_id).await.unwrap().unwrap();
        assert!(stored.admin);
        assert_ne!(stored.password, "pw2");

        let (status, _, _) = send(
            &app,
            request(
                "POST",
                "/api/v1/auth/signin",
                None,
                Some(json!({"email": "a@x.com", "password": "pw2"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
