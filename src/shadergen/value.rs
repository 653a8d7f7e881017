//! Typed literal values attached to node inputs and uniforms.

use std::fmt;

use anyhow::Result;

use super::error::GenError;
use super::types::{BaseType, TypeDesc};
use super::utils::fmt_f32;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i32),
    Float(f32),
    /// Vectors, colors and matrices, row-major.
    Floats(Vec<f32>),
    String(String),
    IntegerArray(Vec<i32>),
    FloatArray(Vec<f32>),
}

fn invalid(ty: &TypeDesc, reason: impl Into<String>) -> anyhow::Error {
    GenError::InvalidValue {
        ty: ty.name.clone(),
        reason: reason.into(),
    }
    .into()
}

impl Value {
    /// Parse a JSON literal as a value of `ty`.
    ///
    /// A bare number given for a float aggregate is splatted to every component,
    /// so `0.5` is a valid `color3`.
    pub fn from_json(json: &serde_json::Value, ty: &TypeDesc) -> Result<Value> {
        if ty.is_closure() || ty.base == BaseType::None {
            return Err(invalid(ty, "closure and shader types carry no literal values"));
        }

        if ty.is_array() {
            let items = json
                .as_array()
                .ok_or_else(|| invalid(ty, format!("expected an array, got {json}")))?;
            return match ty.base {
                BaseType::Integer => items
                    .iter()
                    .map(|v| json_i32(v).ok_or_else(|| invalid(ty, format!("non-integer item {v}"))))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::IntegerArray),
                _ => items
                    .iter()
                    .map(|v| json_f32(v).ok_or_else(|| invalid(ty, format!("non-numeric item {v}"))))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::FloatArray),
            };
        }

        match ty.base {
            BaseType::Boolean => json
                .as_bool()
                .or_else(|| json.as_f64().map(|v| v != 0.0))
                .map(Value::Boolean)
                .ok_or_else(|| invalid(ty, format!("expected a boolean, got {json}"))),
            BaseType::Integer => json_i32(json)
                .map(Value::Integer)
                .ok_or_else(|| invalid(ty, format!("expected an integer, got {json}"))),
            BaseType::String => json
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(|| invalid(ty, format!("expected a string, got {json}"))),
            BaseType::Float if ty.size == 1 => json_f32(json)
                .map(Value::Float)
                .ok_or_else(|| invalid(ty, format!("expected a number, got {json}"))),
            BaseType::Float => {
                if let Some(x) = json_f32(json) {
                    return Ok(Value::Floats(vec![x; ty.size]));
                }
                let items = json
                    .as_array()
                    .ok_or_else(|| invalid(ty, format!("expected {} numbers, got {json}", ty.size)))?;
                if items.len() != ty.size {
                    return Err(invalid(
                        ty,
                        format!("expected {} components, got {}", ty.size, items.len()),
                    ));
                }
                items
                    .iter()
                    .map(|v| json_f32(v).ok_or_else(|| invalid(ty, format!("non-numeric component {v}"))))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Floats)
            }
            BaseType::None => Err(invalid(ty, "type carries no value")),
        }
    }

    /// Components as floats, for float-based values.
    pub fn as_floats(&self) -> Option<Vec<f32>> {
        match self {
            Value::Float(v) => Some(vec![*v]),
            Value::Floats(v) => Some(v.clone()),
            Value::Integer(v) => Some(vec![*v as f32]),
            Value::Boolean(v) => Some(vec![if *v { 1.0 } else { 0.0 }]),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f32),
            Value::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i32),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Build a value of `ty` from float components, the inverse of `as_floats`.
    pub fn from_floats(ty: &TypeDesc, comps: Vec<f32>) -> Result<Value> {
        if !ty.is_float_based() || comps.len() != ty.size {
            return Err(invalid(
                ty,
                format!("cannot build from {} float components", comps.len()),
            ));
        }
        if ty.size == 1 {
            Ok(Value::Float(comps[0]))
        } else {
            Ok(Value::Floats(comps))
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join_f = |v: &[f32]| v.iter().map(|x| fmt_f32(*x)).collect::<Vec<_>>().join(", ");
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => f.write_str(&fmt_f32(*x)),
            Value::Floats(v) | Value::FloatArray(v) => f.write_str(&join_f(v)),
            Value::String(s) => f.write_str(s),
            Value::IntegerArray(v) => f.write_str(
                &v.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(", "),
            ),
        }
    }
}

fn json_f32(v: &serde_json::Value) -> Option<f32> {
    v.as_f64().map(|x| x as f32)
}

fn json_i32(v: &serde_json::Value) -> Option<i32> {
    if let Some(i) = v.as_i64() {
        return i32::try_from(i).ok();
    }
    v.as_f64()
        .filter(|x| x.fract() == 0.0)
        .map(|x| x as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadergen::types::TypeRegistry;
    use serde_json::json;

    #[test]
    fn test_scalar_splats_into_aggregate() {
        let reg = TypeRegistry::standard().unwrap();
        let c3 = reg.get("color3").unwrap();
        assert_eq!(
            Value::from_json(&json!(0.5), &c3).unwrap(),
            Value::Floats(vec![0.5, 0.5, 0.5])
        );
        assert_eq!(
            Value::from_json(&json!([1, 0.25, 0]), &c3).unwrap(),
            Value::Floats(vec![1.0, 0.25, 0.0])
        );
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let reg = TypeRegistry::standard().unwrap();
        let v2 = reg.get("vector2").unwrap();
        let err = Value::from_json(&json!([1.0, 2.0, 3.0]), &v2).unwrap_err();
        assert!(err.to_string().contains("expected 2 components"));
    }

    #[test]
    fn test_closure_has_no_literal() {
        let reg = TypeRegistry::standard().unwrap();
        let bsdf = reg.get("BSDF").unwrap();
        assert!(Value::from_json(&json!(1.0), &bsdf).is_err());
    }

    #[test]
    fn test_integer_and_string_parsing() {
        let reg = TypeRegistry::standard().unwrap();
        let int = reg.get("integer").unwrap();
        let s = reg.get("string").unwrap();
        assert_eq!(Value::from_json(&json!(2), &int).unwrap(), Value::Integer(2));
        assert_eq!(Value::from_json(&json!(2.0), &int).unwrap(), Value::Integer(2));
        assert!(Value::from_json(&json!(2.5), &int).is_err());
        assert_eq!(
            Value::from_json(&json!("UV0"), &s).unwrap(),
            Value::String("UV0".to_string())
        );
    }

    #[test]
    fn test_display_value_string() {
        assert_eq!(Value::Floats(vec![1.0, 0.5, 0.0]).to_string(), "1.0, 0.5, 0.0");
        assert_eq!(Value::Integer(3).to_string(), "3");
    }
}
