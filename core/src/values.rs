// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! `TypedValue` is the Rust-side half of the value codec: one variant per
//! logical type, carrying the canonical in-memory representation. The
//! SQL-side half (stored representation, typed column kind, in-trigger
//! coercion) lives with the store, keyed off the same `ValueType`.

use chrono::{
    DateTime,
    NaiveDate,
    SecondsFormat,
    Utc,
};
use ordered_float::OrderedFloat;
use serde_json;
use uuid::Uuid;

use types::{
    Entid,
    ValueType,
};

/// A value tagged with its logical type.
///
/// `Float4` and `Float8` wrap `OrderedFloat` so values can live in maps and
/// sets. `Numeric` and `Json` carry their canonical text forms; the host
/// engine owns their arithmetic.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub enum TypedValue {
    Text(String),
    Int4(i32),
    Int8(i64),
    Float4(OrderedFloat<f32>),
    Float8(OrderedFloat<f64>),
    Numeric(String),
    Boolean(bool),
    Instant(DateTime<Utc>),
    Date(NaiveDate),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    Json(String),
    Ref(Entid),
}

/// Raised when a canonical string cannot be converted to the requested
/// logical type.
#[derive(Debug, Fail)]
#[fail(display = "cannot coerce {:?} to {}", input, value_type)]
pub struct ValueError {
    pub input: String,
    pub value_type: ValueType,
}

fn coercion_error(input: &str, value_type: ValueType) -> ValueError {
    ValueError {
        input: input.to_string(),
        value_type: value_type,
    }
}

impl TypedValue {
    pub fn value_type(&self) -> ValueType {
        match *self {
            TypedValue::Text(_) => ValueType::Text,
            TypedValue::Int4(_) => ValueType::Int4,
            TypedValue::Int8(_) => ValueType::Int8,
            TypedValue::Float4(_) => ValueType::Float4,
            TypedValue::Float8(_) => ValueType::Float8,
            TypedValue::Numeric(_) => ValueType::Numeric,
            TypedValue::Boolean(_) => ValueType::Boolean,
            TypedValue::Instant(_) => ValueType::Instant,
            TypedValue::Date(_) => ValueType::Date,
            TypedValue::Uuid(_) => ValueType::Uuid,
            TypedValue::Bytes(_) => ValueType::Bytes,
            TypedValue::Json(_) => ValueType::Json,
            TypedValue::Ref(_) => ValueType::Ref,
        }
    }

    /// Convert the canonical string form into a typed value.
    ///
    /// This is the same conversion the generated trigger programs apply to
    /// incoming row text, expressed Rust-side for clients that construct
    /// values before binding them.
    pub fn from_canonical_string(value_type: ValueType, s: &str) -> Result<TypedValue, ValueError> {
        let err = || coercion_error(s, value_type);
        match value_type {
            ValueType::Text => Ok(TypedValue::Text(s.to_string())),
            ValueType::Int4 => s.parse::<i32>().map(TypedValue::Int4).map_err(|_| err()),
            ValueType::Int8 => s.parse::<i64>().map(TypedValue::Int8).map_err(|_| err()),
            ValueType::Float4 => s.parse::<f32>()
                .map(|f| TypedValue::Float4(OrderedFloat(f)))
                .map_err(|_| err()),
            ValueType::Float8 => s.parse::<f64>()
                .map(|f| TypedValue::Float8(OrderedFloat(f)))
                .map_err(|_| err()),
            ValueType::Numeric => {
                // Validate as a decimal number but keep the caller's digits.
                s.parse::<f64>().map_err(|_| err())?;
                Ok(TypedValue::Numeric(s.to_string()))
            },
            ValueType::Boolean => match s {
                "true" | "t" | "1" => Ok(TypedValue::Boolean(true)),
                "false" | "f" | "0" => Ok(TypedValue::Boolean(false)),
                _ => Err(err()),
            },
            ValueType::Instant => DateTime::parse_from_rfc3339(s)
                .map(|dt| TypedValue::Instant(dt.with_timezone(&Utc)))
                .map_err(|_| err()),
            ValueType::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(TypedValue::Date)
                .map_err(|_| err()),
            ValueType::Uuid => Uuid::parse_str(s).map(TypedValue::Uuid).map_err(|_| err()),
            ValueType::Bytes => decode_hex(s).map(TypedValue::Bytes).ok_or_else(err),
            ValueType::Json => {
                let parsed: serde_json::Value = serde_json::from_str(s).map_err(|_| err())?;
                Ok(TypedValue::Json(parsed.to_string()))
            },
            ValueType::Ref => s.parse::<i64>().map(TypedValue::Ref).map_err(|_| err()),
        }
    }

    /// The canonical string form, the inverse of `from_canonical_string`.
    pub fn to_canonical_string(&self) -> String {
        match *self {
            TypedValue::Text(ref s) => s.clone(),
            TypedValue::Int4(i) => i.to_string(),
            TypedValue::Int8(i) => i.to_string(),
            TypedValue::Float4(ref f) => f.0.to_string(),
            TypedValue::Float8(ref f) => f.0.to_string(),
            TypedValue::Numeric(ref s) => s.clone(),
            TypedValue::Boolean(b) => if b { "true".to_string() } else { "false".to_string() },
            TypedValue::Instant(ref dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
            TypedValue::Date(ref d) => d.format("%Y-%m-%d").to_string(),
            TypedValue::Uuid(ref u) => u.hyphenated().to_string(),
            TypedValue::Bytes(ref b) => encode_hex(b),
            TypedValue::Json(ref s) => s.clone(),
            TypedValue::Ref(e) => e.to_string(),
        }
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for pair in bytes.chunks(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out.push((hi * 16 + lo) as u8);
    }
    Some(out)
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
