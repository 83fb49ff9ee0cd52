/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - users / reports store, credential manager, session codec
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 * - request ごとの状態 (session, identity) はここに置かない
 */
use std::sync::Arc;

use crate::repos::{ReportStore, UserStore};
use crate::services::{credentials::CredentialManager, session::SessionCodec};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub reports: Arc<dyn ReportStore>,
    pub credentials: CredentialManager,
    pub sessions: SessionCodec,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("credentials", &self.credentials)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        users: Arc<dyn UserStore>,
        reports: Arc<dyn ReportStore>,
        credentials: CredentialManager,
        sessions: SessionCodec,
    ) -> Self {
        Self {
            users,
            reports,
            credentials,
            sessions,
        }
    }
}
