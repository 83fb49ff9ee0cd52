/*
 * Responsibility
 * - レスポンスに出してよいフィールドの allow-list (Shape) と、それを適用する filter
 * - allow-list に無いフィールドは必ず落とす (password / admin などの漏洩防止)
 * - 単体レコードと配列の両方に同じ Shape を適用する
 */
use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AppError;

#[derive(Clone, Copy)]
pub enum FieldRule {
    /// Copy the same-named field from the record.
    Copy,
    /// Compute the field from the whole record. `None` omits it.
    Derive(fn(&Value) -> Option<Value>),
}

impl std::fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldRule::Copy => f.write_str("Copy"),
            FieldRule::Derive(_) => f.write_str("Derive"),
        }
    }
}

/// Ordered allow-list of output fields.
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    fields: &'static [(&'static str, FieldRule)],
}

impl Shape {
    pub const fn new(fields: &'static [(&'static str, FieldRule)]) -> Self {
        Self { fields }
    }

    /// Objects keep only the allow-listed fields, arrays are filtered element
    /// by element, anything else passes through.
    pub fn filter(&self, record: &Value) -> Value {
        match record {
            Value::Object(obj) => Value::Object(self.filter_object(record, obj)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.filter(v)).collect()),
            other => other.clone(),
        }
    }

    fn filter_object(&self, record: &Value, obj: &Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::with_capacity(self.fields.len());
        for (name, rule) in self.fields {
            let value = match rule {
                FieldRule::Copy => obj.get(*name).cloned(),
                FieldRule::Derive(derive) => derive(record),
            };
            if let Some(value) = value {
                out.insert((*name).to_string(), value);
            }
        }
        out
    }
}

/// Response body that goes through a [`Shape`] before being written.
pub struct Shaped<T> {
    shape: &'static Shape,
    body: T,
}

impl<T: Serialize> Shaped<T> {
    pub fn new(shape: &'static Shape, body: T) -> Self {
        Self { shape, body }
    }
}

impl<T: Serialize> IntoResponse for Shaped<T> {
    fn into_response(self) -> Response {
        match serde_json::to_value(&self.body) {
            Ok(value) => Json(self.shape.filter(&value)).into_response(),
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize response body");
                AppError::Internal.into_response()
            }
        }
    }
}
