// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;
use std::rc::Rc;

use anyhow::{bail, Result};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Scalar literal known at analysis time.
///
/// Composite values are never materialized: arrays are described by
/// [`crate::type_analysis::Type`] shapes instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s.as_ref()),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a scalar value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Value::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        match i64::try_from(v) {
            Ok(v) => Ok(Value::Int(v)),
            Err(_) => Ok(Value::Float(v as f64)),
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Value::String(v.into()))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl Value {
    /// Parses a numeric literal token (decimal, hex, binary, float, with `_` separators).
    pub fn from_numeric_literal(text: &str) -> Result<Value> {
        let cleaned: String = text.chars().filter(|c| *c != '_').collect();
        let lower = cleaned.to_ascii_lowercase();
        let parsed = if let Some(hex) = lower.strip_prefix("0x") {
            i64::from_str_radix(hex, 16).ok().map(Value::Int)
        } else if let Some(bin) = lower.strip_prefix("0b") {
            i64::from_str_radix(bin, 2).ok().map(Value::Int)
        } else if lower.contains(['.', 'e']) {
            lower.parse::<f64>().ok().map(Value::Float)
        } else {
            match lower.parse::<i64>() {
                Ok(i) => Some(Value::Int(i)),
                // Integer overflow turns into float.
                Err(_) => lower.parse::<f64>().ok().map(Value::Float),
            }
        };
        match parsed {
            Some(v) => Ok(v),
            None => bail!("invalid number `{text}`"),
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    /// Array key this scalar is coerced to when used as an index.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) if f.is_finite() => Some((f.trunc() as i64).to_string()),
            Value::Bool(true) => Some("1".to_string()),
            Value::Bool(false) => Some("0".to_string()),
            Value::Null => Some(String::new()),
            Value::Float(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_literals() -> Result<()> {
        assert_eq!(Value::from_numeric_literal("0x1F")?, Value::Int(31));
        assert_eq!(Value::from_numeric_literal("1_000")?, Value::Int(1000));
        assert_eq!(Value::from_numeric_literal("1.5")?, Value::Float(1.5));
        assert_eq!(Value::from_numeric_literal("0b101")?, Value::Int(5));
        Ok(())
    }

    #[test]
    fn key_coercion() {
        assert_eq!(Value::Float(1.7).as_key().as_deref(), Some("1"));
        assert_eq!(Value::Bool(true).as_key().as_deref(), Some("1"));
        assert_eq!(Value::from("id").as_key().as_deref(), Some("id"));
    }

    #[test]
    fn deserializes_scalars() -> Result<()> {
        let v: Vec<Value> = serde_json::from_str(r#"[null, true, 3, 2.5, "x"]"#)?;
        assert_eq!(
            v,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(3),
                Value::Float(2.5),
                Value::from("x")
            ]
        );
        Ok(())
    }
}
