/*
 * Responsibility
 * - middleware の公開インターフェース
 * - auth: session decode / identity 解決 / access guard
 * - http: request-id, access log, body limit, timeout
 */
pub mod auth;
pub mod http;
