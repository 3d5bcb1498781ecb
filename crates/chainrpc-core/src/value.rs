//! Dynamic values exchanged through the runtime.
//!
//! Values carry no type information of their own beyond their variant; the
//! codec and the encoder always interpret them against a
//! [`TypeDescriptor`](crate::types::TypeDescriptor).

use crate::types::TypeDescriptor;
use chrono::{DateTime, Utc};
use std::hash::{Hash, Hasher};

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Date(DateTime<Utc>),
    /// Canonical variant name.
    Enum(String),
    List(Vec<Value>),
    /// Elements in first-insertion order, without duplicates.
    Set(Vec<Value>),
    /// Entries in insertion order, keys unique.
    Map(Vec<(Value, Value)>),
    Struct(StructValue),
}

impl Value {
    /// Build a set, dropping duplicates while keeping first-insertion order.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut elements: Vec<Value> = Vec::new();
        for item in items {
            if !elements.contains(&item) {
                elements.push(item);
            }
        }
        Value::Set(elements)
    }

    /// Build a map; a repeated key replaces the earlier entry in place.
    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut map: Vec<(Value, Value)> = Vec::new();
        for (key, value) in entries {
            match map.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => map.push((key, value)),
            }
        }
        Value::Map(map)
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        Value::Enum(name.into())
    }

    /// Zero value of a type: what an absent struct field decodes to.
    pub fn zero(ty: &TypeDescriptor) -> Self {
        match ty {
            TypeDescriptor::Bool => Value::Bool(false),
            TypeDescriptor::Int16 => Value::Int16(0),
            TypeDescriptor::Int32 => Value::Int32(0),
            TypeDescriptor::Int64 => Value::Int64(0),
            TypeDescriptor::Float => Value::Float(0.0),
            TypeDescriptor::Double => Value::Double(0.0),
            TypeDescriptor::String => Value::String(String::new()),
            TypeDescriptor::List(_) => Value::List(Vec::new()),
            TypeDescriptor::Set(_) => Value::Set(Vec::new()),
            TypeDescriptor::Map(_, _) => Value::Map(Vec::new()),
            _ => Value::Null,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Enum(_) => "enum",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Struct(_) => "struct",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer variant widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Any numeric variant widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// String or enum name.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Elements of a list or set.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct_mut(&mut self) -> Option<&mut StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::Int16(v) => v.hash(state),
            Value::Int32(v) => v.hash(state),
            Value::Int64(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::String(v) | Value::Enum(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::List(v) | Value::Set(v) => v.hash(state),
            Value::Map(v) => v.hash(state),
            Value::Struct(v) => v.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl From<StructValue> for Value {
    fn from(v: StructValue) -> Self {
        Value::Struct(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// A struct instance: its type name and an explicit, ordered field list.
///
/// Field order is kept for display and iteration only; two instances with the
/// same fields set in a different order are equal and hash alike.
#[derive(Debug, Clone, Default)]
pub struct StructValue {
    type_name: String,
    fields: Vec<(String, Value)>,
}

impl StructValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Replace a field in place, or append it if absent.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(field) => field.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl PartialEq for StructValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl Hash for StructValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_name.hash(state);
        let mut sorted: Vec<&(String, Value)> = self.fields.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        sorted.hash(state);
    }
}
