//! String forms of values for URL path segments and query parameters.

use super::{format_date, parse_date, JsonCodec};
use crate::error::{Result, RpcError};
use crate::types::TypeDescriptor;
use crate::value::Value;
use serde_json::Value as Json;
use std::borrow::Cow;

impl JsonCodec<'_> {
    /// Render a value as text.
    ///
    /// Scalars use their plain form (`true`, `42`, `ACTIVE`, RFC 3339 dates);
    /// other kinds use their JSON text. Null renders as an empty string.
    pub fn to_text(&self, value: &Value, ty: &TypeDescriptor) -> Result<String> {
        if value.is_null() {
            return Ok(String::new());
        }
        match ty {
            TypeDescriptor::Date => value
                .as_date()
                .map(format_date)
                .ok_or_else(|| text_error(ty, value.kind_name())),
            _ if ty.is_scalar() => match self.encode(value, ty)? {
                Json::String(s) => Ok(s),
                other => Ok(other.to_string()),
            },
            _ => self.encode_to_string(value, ty),
        }
    }

    /// Parse a value from its text form.
    ///
    /// An empty string is the empty string for string parameters and null for
    /// everything else. Booleans also accept `1` and `0`. `name` labels errors.
    pub fn from_text(&self, text: &str, ty: &TypeDescriptor, name: &str) -> Result<Value> {
        if text.is_empty() {
            return Ok(match ty {
                TypeDescriptor::String => Value::String(String::new()),
                _ => Value::Null,
            });
        }

        let bad = |expected: &TypeDescriptor| RpcError::JsonType {
            path: name.to_string(),
            expected: expected.to_string(),
            found: format!("{:?}", text),
        };

        match ty {
            TypeDescriptor::Bool => {
                if text.eq_ignore_ascii_case("true") || text == "1" {
                    Ok(Value::Bool(true))
                } else if text.eq_ignore_ascii_case("false") || text == "0" {
                    Ok(Value::Bool(false))
                } else {
                    Err(bad(ty))
                }
            }
            TypeDescriptor::Int16 => text.parse().map(Value::Int16).map_err(|_| bad(ty)),
            TypeDescriptor::Int32 => text.parse().map(Value::Int32).map_err(|_| bad(ty)),
            TypeDescriptor::Int64 => text.parse().map(Value::Int64).map_err(|_| bad(ty)),
            TypeDescriptor::Float => match text.parse::<f32>() {
                Ok(v) if v.is_finite() => Ok(Value::Float(v)),
                _ => Err(bad(ty)),
            },
            TypeDescriptor::Double => match text.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Value::Double(v)),
                _ => Err(bad(ty)),
            },
            TypeDescriptor::String => Ok(Value::String(text.to_string())),
            TypeDescriptor::Date => parse_date(text).map(Value::Date).ok_or_else(|| bad(ty)),
            TypeDescriptor::Enum(enum_name) => self.resolve_enum(enum_name, text),
            _ => {
                let json: Json = serde_json::from_str(text)?;
                self.decode_at(&json, ty, name)
            }
        }
    }
}

/// Percent-encode a path segment.
pub fn encode_path_segment(segment: &str) -> Cow<'_, str> {
    urlencoding::encode(segment)
}

/// Decode a percent-encoded path segment.
pub fn decode_path_segment(segment: &str) -> Result<Cow<'_, str>> {
    urlencoding::decode(segment).map_err(|e| RpcError::BadRequest {
        message: format!("malformed path segment {:?}: {}", segment, e),
    })
}

fn text_error(ty: &TypeDescriptor, found: &str) -> RpcError {
    RpcError::JsonType {
        path: super::ROOT.to_string(),
        expected: ty.to_string(),
        found: found.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::Registry;
    use crate::types::{EnumDescriptor, StructDescriptor, TypeDescriptor};
    use crate::value::{StructValue, Value};
    use crate::RpcError;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn registry() -> Arc<Registry> {
        Registry::builder()
            .enumeration(EnumDescriptor::new("Status", ["ACTIVE", "INACTIVE"]))
            .structure(StructDescriptor::new("Point").field("x", TypeDescriptor::Int32))
            .build()
            .unwrap()
    }

    #[test]
    fn test_scalar_text_forms() {
        let registry = registry();
        let codec = registry.codec();
        let date = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        let cases = [
            (Value::Bool(true), TypeDescriptor::Bool, "true"),
            (Value::Int64(-12), TypeDescriptor::Int64, "-12"),
            (Value::Double(1.5), TypeDescriptor::Double, "1.5"),
            (Value::from("a b"), TypeDescriptor::String, "a b"),
            (Value::Date(date), TypeDescriptor::Date, "2020-01-02T03:04:05Z"),
            (
                Value::enumeration("active"),
                TypeDescriptor::enumeration("Status"),
                "ACTIVE",
            ),
            (Value::Null, TypeDescriptor::Int32, ""),
        ];
        for (value, ty, expected) in cases {
            assert_eq!(codec.to_text(&value, &ty).unwrap(), expected);
        }
    }

    #[test]
    fn test_non_scalar_text_is_json() {
        let registry = registry();
        let codec = registry.codec();
        let point = Value::from(StructValue::new("Point").with("x", 3));
        assert_eq!(
            codec.to_text(&point, &TypeDescriptor::structure("Point")).unwrap(),
            r#"{"x":3}"#
        );
        assert_eq!(
            codec
                .from_text(r#"{"x":3}"#, &TypeDescriptor::structure("Point"), "p")
                .unwrap(),
            point
        );
    }

    #[test]
    fn test_bool_accepts_numeric_forms() {
        let registry = registry();
        let codec = registry.codec();
        assert_eq!(codec.from_text("1", &TypeDescriptor::Bool, "b").unwrap(), Value::Bool(true));
        assert_eq!(codec.from_text("0", &TypeDescriptor::Bool, "b").unwrap(), Value::Bool(false));
        assert_eq!(codec.from_text("TRUE", &TypeDescriptor::Bool, "b").unwrap(), Value::Bool(true));
        assert!(codec.from_text("yes", &TypeDescriptor::Bool, "b").is_err());
    }

    #[test]
    fn test_empty_text() {
        let registry = registry();
        let codec = registry.codec();
        assert_eq!(
            codec.from_text("", &TypeDescriptor::String, "s").unwrap(),
            Value::String(String::new())
        );
        assert_eq!(codec.from_text("", &TypeDescriptor::Int32, "n").unwrap(), Value::Null);
    }

    #[test]
    fn test_bad_number_names_parameter() {
        let registry = registry();
        let err = registry
            .codec()
            .from_text("abc", &TypeDescriptor::Int32, "limit")
            .unwrap_err();
        match err {
            RpcError::JsonType { path, .. } => assert_eq!(path, "limit"),
            other => panic!("Expected JsonType, got: {:?}", other),
        }
        assert!(err_is_400(registry.codec().from_text("inf", &TypeDescriptor::Double, "d")));
    }

    fn err_is_400(result: crate::Result<Value>) -> bool {
        result.map_err(|e| e.status_code() == 400).err().unwrap_or(false)
    }

    #[test]
    fn test_path_segments() {
        assert_eq!(super::encode_path_segment("a b/c"), "a%20b%2Fc");
        assert_eq!(super::decode_path_segment("a%20b%2Fc").unwrap(), "a b/c");
    }
}
