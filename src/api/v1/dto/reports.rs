/*
 * Responsibility
 * - Reports の request/response DTO
 * - REPORT_SHAPE: userId は report.user.id から導出し、user 自体は出さない
 */
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::repos::{ReportRow, UserRow};
use crate::services::shape::{FieldRule, Shape};

fn report_owner_id(record: &Value) -> Option<Value> {
    record.pointer("/user/id").cloned()
}

pub static REPORT_SHAPE: Shape = Shape::new(&[
    ("id", FieldRule::Copy),
    ("price", FieldRule::Copy),
    ("year", FieldRule::Copy),
    ("lng", FieldRule::Copy),
    ("lat", FieldRule::Copy),
    ("make", FieldRule::Copy),
    ("model", FieldRule::Copy),
    ("mileage", FieldRule::Copy),
    ("approved", FieldRule::Copy),
    ("userId", FieldRule::Derive(report_owner_id)),
]);

/// A report together with the identity that filed it. Only ever sent through
/// `REPORT_SHAPE`.
#[derive(Debug, Serialize)]
pub struct ReportView {
    #[serde(flatten)]
    pub report: ReportRow,
    pub user: Option<UserRow>,
}

fn validate_vehicle(
    make: &str,
    model: &str,
    year: i32,
    lng: f64,
    lat: f64,
    mileage: i64,
) -> Result<(), &'static str> {
    if make.trim().is_empty() {
        return Err("make is required");
    }
    if model.trim().is_empty() {
        return Err("model is required");
    }
    if !(1930..=2050).contains(&year) {
        return Err("year must be between 1930 and 2050");
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err("lng must be a longitude");
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err("lat must be a latitude");
    }
    if !(0..=1_000_000).contains(&mileage) {
        return Err("mileage must be between 0 and 1000000");
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub price: i64,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub lng: f64,
    pub lat: f64,
    pub mileage: i64,
}

impl CreateReportRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(0..=1_000_000).contains(&self.price) {
            return Err("price must be between 0 and 1000000");
        }
        validate_vehicle(
            &self.make,
            &self.model,
            self.year,
            self.lng,
            self.lat,
            self.mileage,
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ApproveReportRequest {
    pub approved: bool,
}

#[derive(Debug, Deserialize)]
pub struct EstimateParams {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub lng: f64,
    pub lat: f64,
    pub mileage: i64,
}

impl EstimateParams {
    pub fn validate(&self) -> Result<(), &'static str> {
        validate_vehicle(
            &self.make,
            &self.model,
            self.year,
            self.lng,
            self.lat,
            self.mileage,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub price: Option<f64>,
}
