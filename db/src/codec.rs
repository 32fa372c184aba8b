// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The SQL-side half of the value codec.
//!
//! For each logical type this module knows the declared type of the typed
//! projection column and the coercion expression that generated trigger
//! programs apply to incoming row values. Coercions normalise to the
//! canonical stored form and guard with `RAISE(ABORT, 'value coercion: …')`,
//! which aborts the enclosing host transaction; the error mapper recognises
//! the message prefix.
//!
//! `v_raw` itself is declared without a type, so it takes BLOB affinity and
//! stores whatever runtime-typed value the coercion produced. The typed
//! projection is a stored generated column over `v_raw` whose declared type
//! supplies the affinity and therefore the natural sort order.

use palimpsest_core::ValueType;

/// The declared type of the `v_typed` projection column.
pub fn typed_column_type(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Text => "TEXT",
        ValueType::Int4 => "INTEGER",
        ValueType::Int8 => "INTEGER",
        ValueType::Float4 => "REAL",
        ValueType::Float8 => "REAL",
        ValueType::Numeric => "NUMERIC",
        ValueType::Boolean => "INTEGER",
        ValueType::Instant => "TEXT",
        ValueType::Date => "TEXT",
        ValueType::Uuid => "TEXT",
        ValueType::Bytes => "BLOB",
        ValueType::Json => "TEXT",
        ValueType::Ref => "INTEGER",
    }
}

/// A GLOB pattern matching one lowercase hyphenated UUID.
fn uuid_glob() -> String {
    let hex = "[0-9a-f]";
    [8usize, 4, 4, 4, 12]
        .iter()
        .map(|n| hex.repeat(*n))
        .collect::<Vec<_>>()
        .join("-")
}

fn raise(context: &str, expected: &str) -> String {
    format!("RAISE(ABORT, 'value coercion: {}: expected {}')", context, expected)
}

// A text value that looks numeric. Accepts only characters that can occur
// in a decimal or scientific literal and requires at least one digit.
fn numeric_text_guard(e: &str) -> String {
    format!("typeof({e}) = 'text' AND {e} NOT GLOB '*[^-+.0-9eE]*' AND {e} GLOB '*[0-9]*'",
            e = e)
}

fn integer_text_guard(e: &str) -> String {
    // Round-tripping through CAST admits exactly the canonical integer
    // spellings.
    format!("typeof({e}) = 'text' AND CAST(CAST({e} AS INTEGER) AS TEXT) IS {e}", e = e)
}

/// The coercion expression applied to `expr` when a row value arrives for
/// an attribute of type `value_type`. `context` names the view and column
/// for the abort message. NULL passes through untouched; the caller decides
/// whether NULL means "no datom" or "retract".
pub fn coercion_expr(value_type: ValueType, expr: &str, context: &str) -> String {
    let body = match value_type {
        ValueType::Text => {
            format!("CAST({e} AS TEXT)", e = expr)
        },
        ValueType::Int4 => {
            format!("CASE \
                     WHEN typeof({e}) = 'integer' AND {e} BETWEEN -2147483648 AND 2147483647 THEN {e} \
                     WHEN {guard} AND CAST({e} AS INTEGER) BETWEEN -2147483648 AND 2147483647 THEN CAST({e} AS INTEGER) \
                     ELSE {raise} END",
                    e = expr,
                    guard = integer_text_guard(expr),
                    raise = raise(context, "int4"))
        },
        ValueType::Int8 | ValueType::Ref => {
            format!("CASE \
                     WHEN typeof({e}) = 'integer' THEN {e} \
                     WHEN {guard} THEN CAST({e} AS INTEGER) \
                     ELSE {raise} END",
                    e = expr,
                    guard = integer_text_guard(expr),
                    raise = raise(context, value_type.name()))
        },
        ValueType::Float4 | ValueType::Float8 => {
            format!("CASE \
                     WHEN typeof({e}) IN ('integer', 'real') THEN CAST({e} AS REAL) \
                     WHEN {guard} THEN CAST({e} AS REAL) \
                     ELSE {raise} END",
                    e = expr,
                    guard = numeric_text_guard(expr),
                    raise = raise(context, value_type.name()))
        },
        ValueType::Numeric => {
            format!("CASE \
                     WHEN typeof({e}) IN ('integer', 'real') THEN {e} \
                     WHEN {guard} THEN CAST({e} AS NUMERIC) \
                     ELSE {raise} END",
                    e = expr,
                    guard = numeric_text_guard(expr),
                    raise = raise(context, "numeric"))
        },
        ValueType::Boolean => {
            format!("CASE \
                     WHEN typeof({e}) = 'integer' AND {e} IN (0, 1) THEN {e} \
                     WHEN {e} IN ('false', 'f', '0') THEN 0 \
                     WHEN {e} IN ('true', 't', '1') THEN 1 \
                     ELSE {raise} END",
                    e = expr,
                    raise = raise(context, "bool"))
        },
        ValueType::Instant => {
            format!("CASE \
                     WHEN typeof({e}) = 'text' AND strftime('%Y-%m-%dT%H:%M:%fZ', {e}) IS NOT NULL \
                     THEN strftime('%Y-%m-%dT%H:%M:%fZ', {e}) \
                     ELSE {raise} END",
                    e = expr,
                    raise = raise(context, "timestamptz"))
        },
        ValueType::Date => {
            format!("CASE \
                     WHEN typeof({e}) = 'text' AND date({e}) IS NOT NULL THEN date({e}) \
                     ELSE {raise} END",
                    e = expr,
                    raise = raise(context, "date"))
        },
        ValueType::Uuid => {
            format!("CASE \
                     WHEN typeof({e}) = 'text' AND lower({e}) GLOB '{glob}' THEN lower({e}) \
                     ELSE {raise} END",
                    e = expr,
                    glob = uuid_glob(),
                    raise = raise(context, "uuid"))
        },
        ValueType::Bytes => {
            format!("CASE \
                     WHEN typeof({e}) = 'blob' THEN {e} \
                     WHEN typeof({e}) = 'text' AND unhex({e}) IS NOT NULL THEN unhex({e}) \
                     ELSE {raise} END",
                    e = expr,
                    raise = raise(context, "bytea"))
        },
        ValueType::Json => {
            format!("CASE \
                     WHEN json_valid({e}) THEN json({e}) \
                     ELSE {raise} END",
                    e = expr,
                    raise = raise(context, "jsonb"))
        },
    };
    format!("(CASE WHEN {e} IS NULL THEN NULL ELSE {body} END)", e = expr, body = body)
}
