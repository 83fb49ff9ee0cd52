/*
 * Responsibility
 * - 環境変数や設定の読み込み (DATABASE_URL, SESSION_SECRET, KDF コストなど)
 * - 設定値のバリデーション (不足なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::services::credentials::{DEFAULT_MAX_CONCURRENT_DERIVATIONS, KdfParams};
use crate::services::session::MIN_KEY_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    // None in development -> in-memory stores
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    pub session_secret: String,
    pub session_cookie_name: String,
    pub session_ttl_seconds: i64,

    pub admin_emails: Vec<String>,
    pub kdf: KdfParams,
    pub kdf_max_concurrency: usize,

    pub request_timeout_seconds: u64,
    pub request_body_limit_bytes: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print the session secret or database credentials
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("app_env", &self.app_env)
            .field("database", &self.database_url.is_some())
            .field("session_cookie_name", &self.session_cookie_name)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("kdf", &self.kdf)
            .field("kdf_max_concurrency", &self.kdf_max_concurrency)
            .finish_non_exhaustive()
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

// Cookie names are RFC 6265 tokens.
fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = parse_or("PORT", 3000)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());
        if database_url.is_none() && app_env.is_production() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 5)?;

        let session_secret =
            std::env::var("SESSION_SECRET").map_err(|_| ConfigError::Missing("SESSION_SECRET"))?;
        if session_secret.len() < MIN_KEY_LEN {
            return Err(ConfigError::Invalid("SESSION_SECRET"));
        }

        let session_cookie_name =
            std::env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| "session".to_string());
        if !is_cookie_token(&session_cookie_name) {
            return Err(ConfigError::Invalid("SESSION_COOKIE_NAME"));
        }

        // 14 days
        let session_ttl_seconds: i64 = parse_or("SESSION_TTL_SECONDS", 1_209_600)?;
        if session_ttl_seconds <= 0 {
            return Err(ConfigError::Invalid("SESSION_TTL_SECONDS"));
        }

        let admin_emails = std::env::var("ADMIN_EMAILS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let defaults = KdfParams::default();
        let kdf = KdfParams::new(
            parse_or("KDF_MEMORY_KIB", defaults.memory_kib)?,
            parse_or("KDF_ITERATIONS", defaults.iterations)?,
            parse_or("KDF_PARALLELISM", defaults.parallelism)?,
        )
        .map_err(|_| ConfigError::Invalid("KDF_*"))?;
        let kdf_max_concurrency: usize =
            parse_or("KDF_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENT_DERIVATIONS)?;
        if kdf_max_concurrency == 0 {
            return Err(ConfigError::Invalid("KDF_MAX_CONCURRENCY"));
        }

        let request_timeout_seconds = parse_or("REQUEST_TIMEOUT_SECONDS", 30)?;
        let request_body_limit_bytes = parse_or("REQUEST_BODY_LIMIT_BYTES", 1024 * 1024)?;

        Ok(Self {
            addr,
            app_env,
            database_url,
            database_max_connections,
            session_secret,
            session_cookie_name,
            session_ttl_seconds,
            admin_emails,
            kdf,
            kdf_max_concurrency,
            request_timeout_seconds,
            request_body_limit_bytes,
        })
    }
}
