//! Cookie-backed session transport.
//!
//! The session is a small JSON bag signed with HMAC-SHA256 and carried by the
//! client:
//!
//! ```text
//! <name>=base64url(json).base64url(hmac(key, base64url(json)))
//! ```
//!
//! Anything that fails to verify or parse, or that is older than the TTL,
//! decodes to an empty session. A bad cookie is "not signed in", never an error.
use std::convert::Infallible;

use axum::{
    http::{
        HeaderMap, HeaderValue,
        header::{self, InvalidHeaderValue},
    },
    response::{IntoResponseParts, ResponseParts},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Identity reference (`users.id`).
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Unix seconds when the cookie was written.
    #[serde(default)]
    pub iat: i64,
}

impl SessionData {
    pub fn signed_in(user_id: i64, now: i64) -> Self {
        Self {
            user_id: Some(user_id),
            iat: now,
        }
    }
}

/// What a handler wants done to the session once it has run.
///
/// Returned as a response part; the session middleware picks it up from the
/// response extensions and writes the cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionWrite {
    SignIn(i64),
    SignOut,
}

impl IntoResponseParts for SessionWrite {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionKeyError {
    #[error("session key must be at least {MIN_KEY_LEN} bytes")]
    TooShort,
}

#[derive(Clone)]
pub struct SessionCodec {
    mac: HmacSha256,
    cookie_name: String,
    ttl_seconds: i64,
    secure: bool,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("SessionCodec")
            .field("cookie_name", &self.cookie_name)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("secure", &self.secure)
            .finish()
    }
}

impl SessionCodec {
    pub fn new(
        key: &[u8],
        cookie_name: impl Into<String>,
        ttl_seconds: i64,
        secure: bool,
    ) -> Result<Self, SessionKeyError> {
        if key.len() < MIN_KEY_LEN {
            return Err(SessionKeyError::TooShort);
        }
        let mac = HmacSha256::new_from_slice(key).map_err(|_| SessionKeyError::TooShort)?;

        Ok(Self {
            mac,
            cookie_name: cookie_name.into(),
            ttl_seconds,
            secure,
        })
    }

    pub fn encode(&self, data: &SessionData) -> String {
        // SessionData is two plain fields; serializing it cannot fail.
        let json = serde_json::to_vec(data).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{payload}.{sig}")
    }

    pub fn decode(&self, value: &str) -> SessionData {
        self.decode_at(value, chrono::Utc::now().timestamp())
    }

    pub fn decode_at(&self, value: &str, now: i64) -> SessionData {
        self.verify(value)
            .filter(|data| now.saturating_sub(data.iat) <= self.ttl_seconds)
            .unwrap_or_default()
    }

    fn verify(&self, value: &str) -> Option<SessionData> {
        let (payload, sig) = value.split_once('.')?;
        let sig = URL_SAFE_NO_PAD.decode(sig).ok()?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        // constant-time comparison
        mac.verify_slice(&sig).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }

    /// The session cookie value from the request, if any.
    pub fn read_cookie<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|s| s.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == self.cookie_name)
            .map(|(_, v)| v)
    }

    pub fn set_cookie(&self, data: &SessionData) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
            self.cookie_name,
            self.encode(data),
            self.ttl_seconds,
            if self.secure { "; Secure" } else { "" },
        ))
    }

    pub fn clear_cookie(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
            self.cookie_name,
            if self.secure { "; Secure" } else { "" },
        ))
    }
}
