//! Typed parameter values and their coercion from request JSON.
//!
//! Values are tagged with explicit type information so big integers,
//! temporals and points survive the trip to the execution collaborator
//! without being confused with plain numbers, strings or maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::error::{Result, TranslateError};
use crate::schema::{AttributeType, ScalarKind, SpatialKind, TemporalKind, TypeKind};

/// Typed value bound to a query parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// Null literal.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// Big integer, carried as a decimal string on the wire.
    #[serde(with = "bigint_string")]
    BigInt(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    String(String),
    /// ISO-8601 temporal value.
    Temporal {
        /// Temporal kind.
        kind: TemporalKind,
        /// ISO-8601 text.
        iso: String,
    },
    /// Geographic point.
    Point {
        /// Longitude.
        longitude: f64,
        /// Latitude.
        latitude: f64,
        /// Height, if three-dimensional.
        height: Option<f64>,
    },
    /// Cartesian point.
    CartesianPoint {
        /// X coordinate.
        x: f64,
        /// Y coordinate.
        y: f64,
        /// Z coordinate, if three-dimensional.
        z: Option<f64>,
    },
    /// List of values.
    List(Vec<Value>),
    /// Map of values.
    Map(BTreeMap<String, Value>),
}

mod bigint_string {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;

    pub fn serialize<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BigIntVisitor;

        impl<'de> Visitor<'de> for BigIntVisitor {
            type Value = i64;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a decimal string or integer")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(value)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                i64::try_from(value).map_err(|_| E::custom(format!("big integer {value} overflows")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse::<i64>()
                    .map_err(|err| E::custom(format!("invalid big integer '{value}': {err}")))
            }
        }

        deserializer.deserialize_any(BigIntVisitor)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl Value {
    /// Untyped conversion used where no declared type is available, such as
    /// token claims or user-scalar input.
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Coerces request JSON to the declared type of `field`.
    pub fn coerce(json: &Json, ty: &AttributeType, field: &str) -> Result<Self> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        match ty {
            AttributeType::List { of, .. } => match json {
                Json::Array(items) => items
                    .iter()
                    .map(|item| Value::coerce(item, of, field))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List),
                _ => Err(TranslateError::invalid_value(
                    field,
                    format!("expected a list of {of}"),
                )),
            },
            AttributeType::Named { kind, .. } => coerce_named(json, kind, field),
        }
    }

    /// Coerces every element of a JSON array to `element`.
    pub fn coerce_list(json: &Json, element: &AttributeType, field: &str) -> Result<Self> {
        match json {
            Json::Array(items) => items
                .iter()
                .map(|item| Value::coerce(item, element, field))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            _ => Err(TranslateError::invalid_value(field, "expected a list")),
        }
    }

    /// Whether the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

fn coerce_named(json: &Json, kind: &TypeKind, field: &str) -> Result<Value> {
    let mismatch = |expected: &str| {
        TranslateError::invalid_value(field, format!("expected {expected}, found {json}"))
    };
    match kind {
        TypeKind::Scalar(ScalarKind::Boolean) => json.as_bool().map(Value::Bool).ok_or_else(|| mismatch("Boolean")),
        TypeKind::Scalar(ScalarKind::String) => json
            .as_str()
            .map(Value::from)
            .ok_or_else(|| mismatch("String")),
        TypeKind::Scalar(ScalarKind::Id) => match json {
            Json::String(s) => Ok(Value::String(s.clone())),
            Json::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(mismatch("ID")),
        },
        TypeKind::Scalar(ScalarKind::Int) => {
            let int = json.as_i64().ok_or_else(|| mismatch("Int"))?;
            i32::try_from(int).map_err(|_| {
                TranslateError::invalid_value(
                    field,
                    format!("Int cannot represent non 32-bit signed integer value {int}"),
                )
            })?;
            Ok(Value::Int(int))
        }
        TypeKind::Scalar(ScalarKind::Float) => {
            json.as_f64().map(Value::Float).ok_or_else(|| mismatch("Float"))
        }
        TypeKind::BigInt => match json {
            Json::Number(n) => n.as_i64().map(Value::BigInt).ok_or_else(|| mismatch("BigInt")),
            Json::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::BigInt)
                .map_err(|_| mismatch("BigInt")),
            _ => Err(mismatch("BigInt")),
        },
        TypeKind::Enum(name) => json
            .as_str()
            .map(Value::from)
            .ok_or_else(|| mismatch(name)),
        TypeKind::UserScalar(_) => Ok(Value::from_json(json)),
        TypeKind::Temporal(temporal) => {
            let raw = json.as_str().ok_or_else(|| mismatch(temporal.type_name()))?;
            if !is_valid_temporal(*temporal, raw) {
                return Err(TranslateError::invalid_value(
                    field,
                    format!("'{raw}' is not a valid {}", temporal.type_name()),
                ));
            }
            Ok(Value::Temporal {
                kind: *temporal,
                iso: raw.to_owned(),
            })
        }
        TypeKind::Spatial(spatial) => coerce_point(json, *spatial, field),
        TypeKind::Object(name) | TypeKind::Interface(name) | TypeKind::Union(name) => Err(
            TranslateError::invalid_value(field, format!("'{name}' is not a scalar type")),
        ),
    }
}

fn coerce_point(json: &Json, kind: SpatialKind, field: &str) -> Result<Value> {
    let obj = json
        .as_object()
        .ok_or_else(|| TranslateError::invalid_value(field, "expected a point object"))?;
    let coord = |name: &str| -> Result<Option<f64>> {
        match obj.get(name) {
            None | Some(Json::Null) => Ok(None),
            Some(v) => v.as_f64().map(Some).ok_or_else(|| {
                TranslateError::invalid_value(field, format!("point '{name}' must be numeric"))
            }),
        }
    };
    let required = |name: &str| -> Result<f64> {
        coord(name)?.ok_or_else(|| {
            TranslateError::invalid_value(field, format!("point is missing '{name}'"))
        })
    };
    match kind {
        SpatialKind::Point => Ok(Value::Point {
            longitude: required("longitude")?,
            latitude: required("latitude")?,
            height: coord("height")?,
        }),
        SpatialKind::CartesianPoint => Ok(Value::CartesianPoint {
            x: required("x")?,
            y: required("y")?,
            z: coord("z")?,
        }),
    }
}

fn is_valid_time_of_day(raw: &str) -> bool {
    time::Time::parse(raw, format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]")).is_ok()
}

/// Time of day with an optional `Z` or `+hh:mm` / `-hh:mm` offset.
fn is_valid_offset_time(raw: &str) -> bool {
    let raw = raw.strip_suffix('Z').unwrap_or(raw);
    time::Time::parse(
        raw,
        format_description!(
            "[hour]:[minute]:[second][optional [.[subsecond]]][optional [[offset_hour sign:mandatory]:[offset_minute]]]"
        ),
    )
    .is_ok()
}

fn is_valid_duration(raw: &str) -> bool {
    let Some(body) = raw.strip_prefix('P') else {
        return false;
    };
    if body.is_empty() {
        return false;
    }
    let mut seen_digit = false;
    let mut in_time = false;
    for ch in body.chars() {
        match ch {
            '0'..='9' | '.' => seen_digit = true,
            'T' if !in_time => in_time = true,
            'Y' | 'W' | 'D' if !in_time && seen_digit => seen_digit = false,
            'M' if seen_digit => seen_digit = false,
            'H' | 'S' if in_time && seen_digit => seen_digit = false,
            _ => return false,
        }
    }
    !seen_digit
}

/// Validates ISO-8601 text for a temporal kind.
pub fn is_valid_temporal(kind: TemporalKind, raw: &str) -> bool {
    match kind {
        TemporalKind::Date => {
            time::Date::parse(raw, format_description!("[year]-[month]-[day]")).is_ok()
        }
        TemporalKind::DateTime => time::OffsetDateTime::parse(raw, &Rfc3339).is_ok(),
        TemporalKind::LocalDateTime => match raw.split_once('T') {
            Some((date, clock)) => {
                is_valid_temporal(TemporalKind::Date, date) && is_valid_time_of_day(clock)
            }
            None => false,
        },
        TemporalKind::Time => is_valid_offset_time(raw),
        TemporalKind::LocalTime => is_valid_time_of_day(raw),
        TemporalKind::Duration => is_valid_duration(raw),
    }
}
