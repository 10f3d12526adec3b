//! Coercion of raw property values into typed values.
//!
//! Property values travel as JSON. Typed readers pick a target type and
//! [`resolve`] converts the raw value when a sensible coercion exists:
//! - numbers widen or narrow across `i32`, `i64`, `f32` and `f64`
//! - numbers and booleans render to `String` through their textual form
//! - strings parse into booleans (`"true"`/`"false"`, any case) and numbers
//! - a value already of the target type is returned as is
//!
//! Anything else resolves to `None`, which callers treat as "value
//! unavailable" rather than as a failure.

use serde_json::Value;

/// A type that can be produced from a raw property value.
pub trait Resolve: Sized {
    fn resolve(value: &Value) -> Option<Self>;
}

/// Resolve a raw value into `T`.
pub fn resolve<T: Resolve>(value: &Value) -> Option<T> {
    T::resolve(value)
}

impl Resolve for Value {
    fn resolve(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl Resolve for String {
    fn resolve(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl Resolve for bool {
    fn resolve(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

impl Resolve for i64 {
    fn resolve(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(i)
                } else if let Some(u) = n.as_u64() {
                    i64::try_from(u).ok()
                } else {
                    n.as_f64().and_then(truncate_f64)
                }
            }
            Value::String(s) => parse_integer(s),
            _ => None,
        }
    }
}

impl Resolve for i32 {
    fn resolve(value: &Value) -> Option<Self> {
        i64::resolve(value).and_then(|i| i32::try_from(i).ok())
    }
}

impl Resolve for f64 {
    fn resolve(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }
}

impl Resolve for f32 {
    fn resolve(value: &Value) -> Option<Self> {
        f64::resolve(value)
            .map(|f| f as f32)
            .filter(|f| f.is_finite())
    }
}

/// Truncate toward zero, rejecting values outside the `i64` range.
fn truncate_f64(f: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    let truncated = f.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return None;
    }
    Some(truncated as i64)
}

fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().and_then(truncate_f64))
}
