/*
 * Responsibility
 * - DATABASE_URL 無しの development 起動 / テスト用の in-memory store
 * - Postgres 実装と同じ契約 (email UNIQUE -> Conflict, not found -> None/false,
 *   user 削除で reports.user_id を NULL にする)
 */
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::repos::error::{RepoError, RepoResult};
use crate::repos::report_repo::{
    ESTIMATE_LAT_WINDOW, ESTIMATE_LNG_WINDOW, ESTIMATE_SAMPLE_SIZE, ESTIMATE_YEAR_WINDOW,
    EstimateQuery, NewReport, ReportRow, ReportStore,
};
use crate::repos::user_repo::{NewUser, UserChanges, UserRow, UserStore};

#[derive(Debug)]
struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    table: RwLock<Table<UserRow>>,
    // owner reference cleared on delete (ON DELETE SET NULL)
    reports: Option<Arc<MemoryReportStore>>,
}

impl MemoryUserStore {
    pub fn with_reports(reports: Arc<MemoryReportStore>) -> Self {
        Self {
            table: RwLock::default(),
            reports: Some(reports),
        }
    }
}

fn email_taken(table: &Table<UserRow>, email: &str, except: Option<i64>) -> bool {
    table
        .rows
        .values()
        .any(|u| u.email == email && Some(u.id) != except)
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn list(&self) -> RepoResult<Vec<UserRow>> {
        Ok(self.table.read().await.rows.values().cloned().collect())
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Vec<UserRow>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|u| u.email == email)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<UserRow>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn insert(&self, new: NewUser<'_>) -> RepoResult<UserRow> {
        let mut table = self.table.write().await;
        if email_taken(&table, new.email, None) {
            return Err(RepoError::Conflict);
        }

        let row = UserRow {
            id: table.allocate_id(),
            email: new.email.to_string(),
            password: new.password.to_string(),
            admin: new.admin,
        };
        table.rows.insert(row.id, row.clone());

        tracing::debug!(user_id = row.id, "inserted user");
        Ok(row)
    }

    async fn update(&self, id: i64, changes: UserChanges<'_>) -> RepoResult<Option<UserRow>> {
        let mut table = self.table.write().await;
        if let Some(email) = changes.email
            && email_taken(&table, email, Some(id))
        {
            return Err(RepoError::Conflict);
        }

        let Some(row) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            row.email = email.to_string();
        }
        if let Some(password) = changes.password {
            row.password = password.to_string();
        }
        if let Some(admin) = changes.admin {
            row.admin = admin;
        }

        tracing::debug!(user_id = id, "updated user");
        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: i64) -> RepoResult<bool> {
        let removed = self.table.write().await.rows.remove(&id).is_some();
        if removed {
            if let Some(reports) = &self.reports {
                reports.detach_owner(id).await;
            }
            tracing::debug!(user_id = id, "removed user");
        }
        Ok(removed)
    }
}

#[derive(Debug, Default)]
pub struct MemoryReportStore {
    table: RwLock<Table<ReportRow>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn detach_owner(&self, user_id: i64) {
        let mut table = self.table.write().await;
        for row in table.rows.values_mut().filter(|r| r.user_id == Some(user_id)) {
            row.user_id = None;
        }
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn insert(&self, new: NewReport<'_>, user_id: i64) -> RepoResult<ReportRow> {
        let mut table = self.table.write().await;
        let row = ReportRow {
            id: table.allocate_id(),
            approved: false,
            price: new.price,
            make: new.make.to_string(),
            model: new.model.to_string(),
            year: new.year,
            lng: new.lng,
            lat: new.lat,
            mileage: new.mileage,
            user_id: Some(user_id),
        };
        table.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn set_approval(&self, id: i64, approved: bool) -> RepoResult<Option<ReportRow>> {
        let mut table = self.table.write().await;
        Ok(table.rows.get_mut(&id).map(|row| {
            row.approved = approved;
            row.clone()
        }))
    }

    async fn estimate(&self, query: EstimateQuery<'_>) -> RepoResult<Option<f64>> {
        let table = self.table.read().await;
        let mut matches: Vec<&ReportRow> = table
            .rows
            .values()
            .filter(|r| {
                r.approved
                    && r.make == query.make
                    && r.model == query.model
                    && (r.lng - query.lng).abs() <= ESTIMATE_LNG_WINDOW
                    && (r.lat - query.lat).abs() <= ESTIMATE_LAT_WINDOW
                    && (r.year - query.year).abs() <= ESTIMATE_YEAR_WINDOW
            })
            .collect();

        // BTreeMap iteration is id order, and sort_by_key is stable, so ties keep id ASC.
        matches.sort_by_key(|r| (r.mileage - query.mileage).abs());
        matches.truncate(ESTIMATE_SAMPLE_SIZE);

        if matches.is_empty() {
            return Ok(None);
        }
        let total: i64 = matches.iter().map(|r| r.price).sum();
        Ok(Some(total as f64 / matches.len() as f64))
    }
}
