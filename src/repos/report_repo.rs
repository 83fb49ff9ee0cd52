/*
 * Responsibility
 * - reports CRUD + estimate 集計
 * - user_id は users(id) への FK (ON DELETE SET NULL)
 */
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::repos::error::RepoResult;

// Matching window for the estimate query.
pub const ESTIMATE_LNG_WINDOW: f64 = 5.0;
pub const ESTIMATE_LAT_WINDOW: f64 = 5.0;
pub const ESTIMATE_YEAR_WINDOW: i32 = 3;
pub const ESTIMATE_SAMPLE_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ReportRow {
    pub id: i64,
    pub approved: bool,
    pub price: i64,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub lng: f64,
    pub lat: f64,
    pub mileage: i64,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewReport<'a> {
    pub price: i64,
    pub make: &'a str,
    pub model: &'a str,
    pub year: i32,
    pub lng: f64,
    pub lat: f64,
    pub mileage: i64,
}

#[derive(Debug, Clone)]
pub struct EstimateQuery<'a> {
    pub make: &'a str,
    pub model: &'a str,
    pub year: i32,
    pub lng: f64,
    pub lat: f64,
    pub mileage: i64,
}

#[async_trait]
pub trait ReportStore: Send + Sync + 'static {
    async fn insert(&self, new: NewReport<'_>, user_id: i64) -> RepoResult<ReportRow>;

    // `Ok(None)` when no report has this id.
    async fn set_approval(&self, id: i64, approved: bool) -> RepoResult<Option<ReportRow>>;

    // Average price of the approved reports closest in mileage within the
    // make/model/location/year window. `Ok(None)` when nothing matches.
    async fn estimate(&self, query: EstimateQuery<'_>) -> RepoResult<Option<f64>>;
}

#[derive(Clone, Debug)]
pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn insert(&self, new: NewReport<'_>, user_id: i64) -> RepoResult<ReportRow> {
        let row = sqlx::query_as::<_, ReportRow>(
            r#"
            INSERT INTO reports (price, make, model, year, lng, lat, mileage, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING
                id, approved, price, make, model, year, lng, lat, mileage, user_id
            "#,
        )
        .bind(new.price)
        .bind(new.make)
        .bind(new.model)
        .bind(new.year)
        .bind(new.lng)
        .bind(new.lat)
        .bind(new.mileage)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn set_approval(&self, id: i64, approved: bool) -> RepoResult<Option<ReportRow>> {
        let row = sqlx::query_as::<_, ReportRow>(
            r#"
            UPDATE reports
            SET approved = $2
            WHERE id = $1
            RETURNING
                id, approved, price, make, model, year, lng, lat, mileage, user_id
            "#,
        )
        .bind(id)
        .bind(approved)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn estimate(&self, query: EstimateQuery<'_>) -> RepoResult<Option<f64>> {
        let price = sqlx::query_scalar::<_, Option<f64>>(
            r#"
            SELECT AVG(price)::float8
            FROM (
                SELECT price
                FROM reports
                WHERE make = $1
                    AND model = $2
                    AND ABS(lng - $3) <= $7
                    AND ABS(lat - $4) <= $8
                    AND ABS(year - $5) <= $9
                    AND approved IS TRUE
                ORDER BY ABS(mileage - $6) ASC, id ASC
                LIMIT $10
            ) AS nearest
            "#,
        )
        .bind(query.make)
        .bind(query.model)
        .bind(query.lng)
        .bind(query.lat)
        .bind(query.year)
        .bind(query.mileage)
        .bind(ESTIMATE_LNG_WINDOW)
        .bind(ESTIMATE_LAT_WINDOW)
        .bind(ESTIMATE_YEAR_WINDOW)
        .bind(ESTIMATE_SAMPLE_SIZE as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(price)
    }
}
