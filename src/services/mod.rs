/*
 * Responsibility
 * - identity / access-control pipeline のドメインロジック
 * - HTTP (axum) への依存は shape の IntoResponse と session の response part のみ
 */
pub mod access;
pub mod credentials;
pub mod identity;
pub mod session;
pub mod shape;

