//! Type-driven JSON codec.
//!
//! Values are encoded and decoded against a [`TypeDescriptor`]; named types
//! are resolved through the registry the codec borrows. Decoding errors carry
//! the path of the offending member (`$.user.tags[2]`).
//!
//! Decode policy:
//! - JSON `null` decodes to [`Value::Null`] for every kind.
//! - Enum names match case-insensitively against exactly one variant.
//! - Integers reject non-integral and out-of-range numbers; floats accept integers.
//! - Unknown struct members are ignored, absent ones take the zero value, or keep
//!   their current value when merging with [`JsonCodec::decode_into`].
//! - A polymorphic struct decodes as the subtype its discriminator member maps
//!   to, and an unmapped or absent discriminator keeps the declared type.

mod form;
mod text;

pub use text::{decode_path_segment, encode_path_segment};

use crate::error::{Result, RpcError};
use crate::registry::Registry;
use crate::types::{FieldDescriptor, StructDescriptor, TypeDescriptor, TypeKind};
use crate::value::{StructValue, Value};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value as Json};

pub(crate) const ROOT: &str = "$";

/// JSON codec bound to a descriptor registry.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec<'r> {
    registry: &'r Registry,
}

impl<'r> JsonCodec<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Encode a value as JSON.
    pub fn encode(&self, value: &Value, ty: &TypeDescriptor) -> Result<Json> {
        self.encode_at(value, ty, ROOT)
    }

    /// Encode a value as JSON text.
    pub fn encode_to_string(&self, value: &Value, ty: &TypeDescriptor) -> Result<String> {
        Ok(serde_json::to_string(&self.encode(value, ty)?)?)
    }

    /// Decode a value from JSON into a fresh instance.
    pub fn decode(&self, json: &Json, ty: &TypeDescriptor) -> Result<Value> {
        self.decode_at(json, ty, ROOT)
    }

    /// Decode a value from JSON text.
    pub fn decode_str(&self, text: &str, ty: &TypeDescriptor) -> Result<Value> {
        let json: Json = serde_json::from_str(text)?;
        self.decode(&json, ty)
    }

    /// Decode into an existing value.
    ///
    /// When both the target and the JSON are instances of the same struct,
    /// members present in the JSON overwrite fields and absent members leave
    /// the current field values untouched. Otherwise the target is replaced.
    /// On error the target is left unchanged.
    pub fn decode_into(&self, json: &Json, ty: &TypeDescriptor, target: &mut Value) -> Result<()> {
        if let (TypeDescriptor::Struct(name), Json::Object(object)) = (ty, json) {
            let descriptor = self.select_struct(name, ROOT, |field| {
                self.discriminator_member(object, field, ROOT)
            })?;
            if let Some(existing) = target
                .as_struct_mut()
                .filter(|s| s.type_name() == descriptor.name())
            {
                let mut merged = existing.clone();
                self.merge_fields(descriptor, object, &mut merged, ROOT)?;
                *existing = merged;
                return Ok(());
            }
        }

        *target = self.decode(json, ty)?;
        Ok(())
    }

    pub(crate) fn encode_at(&self, value: &Value, ty: &TypeDescriptor, path: &str) -> Result<Json> {
        match ty {
            TypeDescriptor::Interface(name) => {
                return Err(RpcError::json(format!(
                    "values of interface {} cannot be encoded",
                    name
                )))
            }
            TypeDescriptor::Undefined => {
                return Err(RpcError::json("values of an undefined type cannot be encoded"))
            }
            _ => {}
        }
        if value.is_null() || ty.is_void() {
            return Ok(Json::Null);
        }

        match ty {
            TypeDescriptor::Bool => value
                .as_bool()
                .map(Json::Bool)
                .ok_or_else(|| mismatch(path, ty, value.kind_name())),
            TypeDescriptor::Int16 => encode_int(value, ty, path, i16::MIN.into(), i16::MAX.into()),
            TypeDescriptor::Int32 => encode_int(value, ty, path, i32::MIN.into(), i32::MAX.into()),
            TypeDescriptor::Int64 => encode_int(value, ty, path, i64::MIN, i64::MAX),
            TypeDescriptor::Float => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| mismatch(path, ty, value.kind_name()))?;
                // Go through the shortest f32 form so 0.1f32 is written as 0.1.
                let shortest = (v as f32).to_string().parse::<f64>().unwrap_or(v);
                encode_float(shortest, path)
            }
            TypeDescriptor::Double => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| mismatch(path, ty, value.kind_name()))?;
                encode_float(v, path)
            }
            TypeDescriptor::String => match value {
                Value::String(s) => Ok(Json::String(s.clone())),
                other => Err(mismatch(path, ty, other.kind_name())),
            },
            TypeDescriptor::Date => value
                .as_date()
                .map(|d| Json::String(format_date(d)))
                .ok_or_else(|| mismatch(path, ty, value.kind_name())),
            TypeDescriptor::Enum(name) => {
                let name_text = value
                    .as_str()
                    .ok_or_else(|| mismatch(path, ty, value.kind_name()))?;
                let descriptor = self.registry.require_enum(name)?;
                descriptor
                    .resolve(name_text)
                    .map(|canonical| Json::String(canonical.to_string()))
                    .ok_or_else(|| RpcError::UnknownEnumValue {
                        enum_name: name.clone(),
                        value: name_text.to_string(),
                    })
            }
            TypeDescriptor::List(element) | TypeDescriptor::Set(element) => {
                let items = value
                    .as_slice()
                    .ok_or_else(|| mismatch(path, ty, value.kind_name()))?;
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.encode_at(item, element, &index_path(path, i)))
                    .collect::<Result<Vec<_>>>()
                    .map(Json::Array)
            }
            TypeDescriptor::Map(key, element) => {
                if key.kind() != TypeKind::String {
                    return Err(RpcError::UnsupportedKeyType {
                        key: key.to_string(),
                    });
                }
                let Value::Map(entries) = value else {
                    return Err(mismatch(path, ty, value.kind_name()));
                };
                let mut object = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    let Value::String(k) = k else {
                        return Err(mismatch(path, key, k.kind_name()));
                    };
                    let encoded = self.encode_at(v, element, &field_path(path, k))?;
                    object.insert(k.clone(), encoded);
                }
                Ok(Json::Object(object))
            }
            TypeDescriptor::Struct(name) => {
                let Value::Struct(instance) = value else {
                    return Err(mismatch(path, ty, value.kind_name()));
                };
                if !self.registry.is_subtype(instance.type_name(), name) {
                    return Err(mismatch(path, ty, instance.type_name()));
                }
                let descriptor = self.registry.require_struct(instance.type_name())?;
                let mut object = Map::with_capacity(descriptor.fields().len());
                for field in descriptor.fields() {
                    if field.ty.is_void() {
                        continue;
                    }
                    let field_value = instance.get(&field.name).unwrap_or(&Value::Null);
                    let encoded =
                        self.encode_at(field_value, &field.ty, &field_path(path, &field.name))?;
                    object.insert(field.name.clone(), encoded);
                }
                if let Some(root) = self.registry.polymorphic_root(descriptor.name()) {
                    if let (Some(field), Some(variant)) =
                        (root.discriminator_name(), root.variant_for(descriptor.name()))
                    {
                        if object.get(field).map_or(true, Json::is_null) {
                            object.insert(field.to_string(), Json::String(variant.to_string()));
                        }
                    }
                }
                Ok(Json::Object(object))
            }
            TypeDescriptor::Void | TypeDescriptor::Interface(_) | TypeDescriptor::Undefined => {
                Ok(Json::Null)
            }
        }
    }

    pub(crate) fn decode_at(&self, json: &Json, ty: &TypeDescriptor, path: &str) -> Result<Value> {
        match ty {
            TypeDescriptor::Interface(name) => {
                return Err(RpcError::json(format!(
                    "values of interface {} cannot be decoded",
                    name
                )))
            }
            TypeDescriptor::Undefined => {
                return Err(RpcError::json("values of an undefined type cannot be decoded"))
            }
            _ => {}
        }
        if json.is_null() || ty.is_void() {
            return Ok(Value::Null);
        }

        match ty {
            TypeDescriptor::Bool => json
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| mismatch(path, ty, json_kind(json))),
            TypeDescriptor::Int16 => {
                decode_int(json, ty, path, i16::MIN.into(), i16::MAX.into()).map(|v| Value::Int16(v as i16))
            }
            TypeDescriptor::Int32 => {
                decode_int(json, ty, path, i32::MIN.into(), i32::MAX.into()).map(|v| Value::Int32(v as i32))
            }
            TypeDescriptor::Int64 => decode_int(json, ty, path, i64::MIN, i64::MAX).map(Value::Int64),
            TypeDescriptor::Float => {
                let Json::Number(n) = json else {
                    return Err(mismatch(path, ty, json_kind(json)));
                };
                match n.to_string().parse::<f32>() {
                    Ok(v) if v.is_finite() => Ok(Value::Float(v)),
                    _ => Err(type_error(path, ty, format!("number {} out of range", n))),
                }
            }
            TypeDescriptor::Double => json
                .as_f64()
                .map(Value::Double)
                .ok_or_else(|| mismatch(path, ty, json_kind(json))),
            TypeDescriptor::String => json
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(|| mismatch(path, ty, json_kind(json))),
            TypeDescriptor::Date => {
                let text = json
                    .as_str()
                    .ok_or_else(|| mismatch(path, ty, json_kind(json)))?;
                parse_date(text)
                    .map(Value::Date)
                    .ok_or_else(|| type_error(path, ty, format!("malformed date {:?}", text)))
            }
            TypeDescriptor::Enum(name) => {
                let text = json
                    .as_str()
                    .ok_or_else(|| mismatch(path, ty, json_kind(json)))?;
                self.resolve_enum(name, text)
            }
            TypeDescriptor::List(element) => {
                let items = json
                    .as_array()
                    .ok_or_else(|| mismatch(path, ty, json_kind(json)))?;
                self.decode_items(items, element, path).map(Value::List)
            }
            TypeDescriptor::Set(element) => {
                let items = json
                    .as_array()
                    .ok_or_else(|| mismatch(path, ty, json_kind(json)))?;
                self.decode_items(items, element, path).map(Value::set)
            }
            TypeDescriptor::Map(key, element) => {
                if key.kind() != TypeKind::String {
                    return Err(RpcError::UnsupportedKeyType {
                        key: key.to_string(),
                    });
                }
                let object = json
                    .as_object()
                    .ok_or_else(|| mismatch(path, ty, json_kind(json)))?;
                let mut entries = Vec::with_capacity(object.len());
                for (k, v) in object {
                    let decoded = self.decode_at(v, element, &field_path(path, k))?;
                    entries.push((Value::String(k.clone()), decoded));
                }
                Ok(Value::Map(entries))
            }
            TypeDescriptor::Struct(name) => {
                let object = json
                    .as_object()
                    .ok_or_else(|| mismatch(path, ty, json_kind(json)))?;
                let descriptor = self.select_struct(name, path, |field| {
                    self.discriminator_member(object, field, path)
                })?;
                let mut instance = StructValue::new(descriptor.name());
                for field in descriptor.fields() {
                    if !field.ty.is_void() {
                        instance.set(field.name.clone(), Value::zero(&field.ty));
                    }
                }
                self.merge_fields(descriptor, object, &mut instance, path)?;
                Ok(Value::Struct(instance))
            }
            TypeDescriptor::Void | TypeDescriptor::Interface(_) | TypeDescriptor::Undefined => {
                Ok(Value::Null)
            }
        }
    }

    pub(crate) fn resolve_enum(&self, name: &str, text: &str) -> Result<Value> {
        let descriptor = self.registry.require_enum(name)?;
        descriptor
            .resolve(text)
            .map(Value::enumeration)
            .ok_or_else(|| RpcError::UnknownEnumValue {
                enum_name: name.to_string(),
                value: text.to_string(),
            })
    }

    /// Pick the struct a declared struct type decodes as.
    ///
    /// `discriminator` yields the decoded discriminator value, if any.
    pub(crate) fn select_struct(
        &self,
        name: &str,
        path: &str,
        discriminator: impl FnOnce(&FieldDescriptor) -> Result<Option<Value>>,
    ) -> Result<&'r StructDescriptor> {
        let declared = self.registry.require_struct(name)?;
        let Some(root) = self.registry.polymorphic_root(name) else {
            return Ok(declared);
        };
        let Some(field) = root.discriminator_name().and_then(|d| root.find_field(d)) else {
            return Ok(declared);
        };
        let Some(Value::Enum(variant)) = discriminator(field)? else {
            return Ok(declared);
        };
        match root.subtype_for(&variant) {
            Some(subtype) if self.registry.is_subtype(subtype, name) => {
                self.registry.require_struct(subtype)
            }
            Some(subtype) => Err(type_error(
                &field_path(path, &field.name),
                &TypeDescriptor::structure(name),
                format!("{} of {}", variant, subtype),
            )),
            None => Ok(declared),
        }
    }

    fn discriminator_member(
        &self,
        object: &Map<String, Json>,
        field: &FieldDescriptor,
        path: &str,
    ) -> Result<Option<Value>> {
        object
            .get(&field.name)
            .map(|member| self.decode_at(member, &field.ty, &field_path(path, &field.name)))
            .transpose()
    }

    fn decode_items(&self, items: &[Json], element: &TypeDescriptor, path: &str) -> Result<Vec<Value>> {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.decode_at(item, element, &index_path(path, i)))
            .collect()
    }

    fn merge_fields(
        &self,
        descriptor: &StructDescriptor,
        object: &Map<String, Json>,
        target: &mut StructValue,
        path: &str,
    ) -> Result<()> {
        // Members without a declared field are skipped for forward compatibility.
        for field in descriptor.fields() {
            if field.ty.is_void() {
                continue;
            }
            if let Some(member) = object.get(&field.name) {
                let decoded = self.decode_at(member, &field.ty, &field_path(path, &field.name))?;
                target.set(field.name.clone(), decoded);
            }
        }
        Ok(())
    }
}

pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub(crate) fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn encode_int(value: &Value, ty: &TypeDescriptor, path: &str, min: i64, max: i64) -> Result<Json> {
    match value.as_i64() {
        Some(v) if (min..=max).contains(&v) => Ok(Json::from(v)),
        Some(v) => Err(type_error(path, ty, format!("{} out of range", v))),
        None => Err(mismatch(path, ty, value.kind_name())),
    }
}

fn encode_float(v: f64, path: &str) -> Result<Json> {
    Number::from_f64(v)
        .map(Json::Number)
        .ok_or_else(|| RpcError::json(format!("non-finite number {} at {}", v, path)))
}

fn decode_int(json: &Json, ty: &TypeDescriptor, path: &str, min: i64, max: i64) -> Result<i64> {
    let Json::Number(n) = json else {
        return Err(mismatch(path, ty, json_kind(json)));
    };
    let v = match (n.as_i64(), n.as_f64()) {
        (Some(v), _) => v,
        (None, Some(f)) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            f as i64
        }
        _ => return Err(type_error(path, ty, format!("non-integral number {}", n))),
    };
    if (min..=max).contains(&v) {
        Ok(v)
    } else {
        Err(type_error(path, ty, format!("number {} out of range", v)))
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn mismatch(path: &str, ty: &TypeDescriptor, found: &str) -> RpcError {
    type_error(path, ty, found.to_string())
}

fn type_error(path: &str, ty: &TypeDescriptor, found: String) -> RpcError {
    RpcError::JsonType {
        path: path.to_string(),
        expected: ty.to_string(),
        found,
    }
}

fn field_path(path: &str, name: &str) -> String {
    format!("{}.{}", path, name)
}

fn index_path(path: &str, index: usize) -> String {
    format!("{}[{}]", path, index)
}
