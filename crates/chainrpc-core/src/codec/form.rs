//! Form structs: one query parameter or body member per set field.

use super::{json_kind, mismatch, JsonCodec, ROOT};
use crate::error::Result;
use crate::types::TypeDescriptor;
use crate::value::{StructValue, Value};
use serde_json::{Map, Value as Json};

impl JsonCodec<'_> {
    /// Encode a form value as JSON members, dropping null fields.
    ///
    /// A subtype instance contributes its own fields and discriminator.
    pub fn form_members(&self, value: &Value, ty: &TypeDescriptor) -> Result<Map<String, Json>> {
        match self.encode(value, ty)? {
            Json::Object(object) => Ok(object.into_iter().filter(|(_, v)| !v.is_null()).collect()),
            Json::Null => Ok(Map::new()),
            other => Err(mismatch(ROOT, ty, json_kind(&other))),
        }
    }

    /// Render a form value as `(field, text)` pairs in field order.
    ///
    /// Field texts follow [`to_text`](Self::to_text): plain scalars, JSON otherwise.
    pub fn to_form(&self, value: &Value, ty: &TypeDescriptor) -> Result<Vec<(String, String)>> {
        Ok(self
            .form_members(value, ty)?
            .into_iter()
            .map(|(name, member)| {
                let text = match member {
                    Json::String(s) => s,
                    other => other.to_string(),
                };
                (name, text)
            })
            .collect())
    }

    /// Rebuild a form value from per-field texts.
    ///
    /// `lookup` returns the raw text sent for a field name. Absent fields take
    /// their zero value, so an empty form is an instance, never null.
    pub fn from_form<'a>(
        &self,
        ty: &TypeDescriptor,
        lookup: impl Fn(&str) -> Option<&'a str>,
    ) -> Result<Value> {
        let TypeDescriptor::Struct(name) = ty else {
            return Err(mismatch(ROOT, ty, "form"));
        };
        let descriptor = self.select_struct(name, ROOT, |field| {
            lookup(&field.name)
                .map(|text| self.from_text(text, &field.ty, &field.name))
                .transpose()
        })?;

        let mut instance = StructValue::new(descriptor.name());
        for field in descriptor.fields() {
            if field.ty.is_void() {
                continue;
            }
            let value = match lookup(&field.name) {
                Some(text) => self.from_text(text, &field.ty, &field.name)?,
                None => Value::zero(&field.ty),
            };
            instance.set(field.name.clone(), value);
        }
        Ok(Value::Struct(instance))
    }
}
