//! Descriptor registry.
//!
//! Descriptors are registered once at startup through [`RegistryBuilder`] and
//! frozen into an immutable [`Registry`]. All cross references between
//! descriptors are checked when the registry is built, so a chain or a
//! dispatcher never meets an unresolved type at call time.

use crate::codec::JsonCodec;
use crate::error::{Result, RpcError};
use crate::interface::{HttpVerb, InterfaceDescriptor};
use crate::types::{EnumDescriptor, FieldDescriptor, StructDescriptor, TypeDescriptor};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Immutable, process-wide descriptor registry.
#[derive(Debug, Default)]
pub struct Registry {
    enums: HashMap<String, EnumDescriptor>,
    structs: HashMap<String, StructDescriptor>,
    interfaces: HashMap<String, Arc<InterfaceDescriptor>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enums.get(name)
    }

    pub fn structure(&self, name: &str) -> Option<&StructDescriptor> {
        self.structs.get(name)
    }

    pub fn interface(&self, name: &str) -> Option<&Arc<InterfaceDescriptor>> {
        self.interfaces.get(name)
    }

    pub(crate) fn require_enum(&self, name: &str) -> Result<&EnumDescriptor> {
        self.enumeration(name).ok_or_else(|| RpcError::UnknownType {
            name: name.to_string(),
        })
    }

    pub(crate) fn require_struct(&self, name: &str) -> Result<&StructDescriptor> {
        self.structure(name).ok_or_else(|| RpcError::UnknownType {
            name: name.to_string(),
        })
    }

    pub(crate) fn require_interface(&self, name: &str) -> Result<&Arc<InterfaceDescriptor>> {
        self.interface(name).ok_or_else(|| RpcError::UnknownType {
            name: name.to_string(),
        })
    }

    /// Whether `name` is `ancestor` or extends it, directly or not.
    pub fn is_subtype(&self, name: &str, ancestor: &str) -> bool {
        let mut current = Some(name);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.structs.get(n).and_then(StructDescriptor::base_name);
        }
        false
    }

    /// Root of the inheritance tree of `name`, when that root is polymorphic.
    pub(crate) fn polymorphic_root(&self, name: &str) -> Option<&StructDescriptor> {
        let mut descriptor = self.structs.get(name)?;
        while let Some(base) = descriptor.base_name() {
            descriptor = self.structs.get(base)?;
        }
        descriptor.is_polymorphic().then_some(descriptor)
    }

    /// JSON codec resolving named types through this registry.
    pub fn codec(&self) -> JsonCodec<'_> {
        JsonCodec::new(self)
    }
}

/// Where a type reference appears; decides which kinds are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Usage {
    Field,
    Param,
    Result,
    Element,
}

/// Builder collecting descriptors before validation.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    enums: Vec<EnumDescriptor>,
    structs: Vec<StructDescriptor>,
    interfaces: Vec<InterfaceDescriptor>,
}

impl RegistryBuilder {
    pub fn enumeration(mut self, descriptor: EnumDescriptor) -> Self {
        self.enums.push(descriptor);
        self
    }

    pub fn structure(mut self, descriptor: StructDescriptor) -> Self {
        self.structs.push(descriptor);
        self
    }

    pub fn interface(mut self, descriptor: InterfaceDescriptor) -> Self {
        self.interfaces.push(descriptor);
        self
    }

    /// Validate every descriptor and freeze the registry.
    pub fn build(self) -> Result<Arc<Registry>> {
        let mut names = HashSet::new();
        let mut registry = Registry::default();

        for descriptor in self.enums {
            claim_name(&mut names, descriptor.name())?;
            if descriptor.variants().is_empty() {
                return Err(RpcError::registration(format!(
                    "enum {} has no variants",
                    descriptor.name()
                )));
            }
            ensure_unique(
                descriptor.variants().iter().map(String::as_str),
                &format!("variant of enum {}", descriptor.name()),
            )?;
            registry
                .enums
                .insert(descriptor.name().to_string(), descriptor);
        }

        for descriptor in self.structs {
            claim_name(&mut names, descriptor.name())?;
            registry
                .structs
                .insert(descriptor.name().to_string(), descriptor);
        }
        inherit_fields(&mut registry.structs)?;
        for descriptor in registry.structs.values() {
            ensure_unique(
                descriptor.fields().iter().map(|f| f.name.as_str()),
                &format!("field of struct {}", descriptor.name()),
            )?;
        }

        for descriptor in self.interfaces {
            claim_name(&mut names, descriptor.name())?;
            ensure_unique(
                descriptor.methods().iter().map(|m| m.name()),
                &format!("method of interface {}", descriptor.name()),
            )?;
            registry
                .interfaces
                .insert(descriptor.name().to_string(), Arc::new(descriptor));
        }

        // References are checked once every name is known, so declaration order does not matter.
        for descriptor in registry.structs.values() {
            for field in descriptor.fields() {
                let context = format!("field {}.{}", descriptor.name(), field.name);
                registry.check_type(&field.ty, Usage::Field, &context)?;
            }
            registry.check_polymorphism(descriptor)?;
        }

        for iface in registry.interfaces.values() {
            registry.check_interface(iface)?;
        }

        debug!(
            "Registry built: {} enums, {} structs, {} interfaces",
            registry.enums.len(),
            registry.structs.len(),
            registry.interfaces.len()
        );

        Ok(Arc::new(registry))
    }
}

impl Registry {
    fn check_interface(&self, iface: &InterfaceDescriptor) -> Result<()> {
        if let Some(exception) = iface.exception_type() {
            match exception {
                TypeDescriptor::Struct(name) if self.structs.contains_key(name) => {}
                other => {
                    return Err(RpcError::registration(format!(
                        "exception type {} of interface {} must be a registered struct",
                        other,
                        iface.name()
                    )))
                }
            }
        }

        for method in iface.methods() {
            let context = format!("{}.{}", iface.name(), method.name());

            if method.is_chain() && method.verb() == HttpVerb::Post {
                return Err(RpcError::registration(format!(
                    "chain method {} cannot be POST",
                    context
                )));
            }

            ensure_unique(
                method.params().iter().map(|p| p.name.as_str()),
                &format!("parameter of method {}", context),
            )?;

            for param in method.params() {
                let context = format!("parameter {} of {}", param.name, context);
                self.check_type(&param.ty, Usage::Param, &context)?;
                if self.form_struct(&param.ty).is_some() && method.is_chain() {
                    return Err(RpcError::registration(format!(
                        "form {} cannot travel in the path",
                        context
                    )));
                }
            }

            // Form fields share the query string or body object with the other arguments.
            let mut wire_names = Vec::new();
            for param in method.params() {
                match self.form_struct(&param.ty) {
                    Some(form) => wire_names.extend(form.fields().iter().map(|f| f.name.as_str())),
                    None => wire_names.push(param.name.as_str()),
                }
            }
            ensure_unique(
                wire_names.into_iter(),
                &format!("query or body entry of method {}", context),
            )?;

            self.check_type(method.result(), Usage::Result, &format!("result of {}", context))?;
        }

        Ok(())
    }

    /// The struct behind a form-typed parameter.
    pub(crate) fn form_struct(&self, ty: &TypeDescriptor) -> Option<&StructDescriptor> {
        match ty {
            TypeDescriptor::Struct(name) => self.structs.get(name).filter(|d| d.is_form()),
            _ => None,
        }
    }

    fn check_polymorphism(&self, descriptor: &StructDescriptor) -> Result<()> {
        let Some(discriminator) = descriptor.discriminator_name() else {
            if !descriptor.subtypes().is_empty() {
                return Err(RpcError::registration(format!(
                    "struct {} maps subtypes without a discriminator",
                    descriptor.name()
                )));
            }
            return Ok(());
        };
        if descriptor.base_name().is_some() {
            return Err(RpcError::registration(format!(
                "discriminator of {} must be declared on its root struct",
                descriptor.name()
            )));
        }

        let enum_name = match descriptor.find_field(discriminator).map(|f| &f.ty) {
            Some(TypeDescriptor::Enum(name)) => name,
            _ => {
                return Err(RpcError::registration(format!(
                    "discriminator {}.{} must be an enum field",
                    descriptor.name(),
                    discriminator
                )))
            }
        };
        let enumeration = self.require_enum(enum_name)?;

        let context = format!("subtype of struct {}", descriptor.name());
        ensure_unique(descriptor.subtypes().iter().map(|(v, _)| v.as_str()), &context)?;
        ensure_unique(descriptor.subtypes().iter().map(|(_, n)| n.as_str()), &context)?;
        for (variant, subtype) in descriptor.subtypes() {
            if enumeration.ordinal(variant).is_none() {
                return Err(RpcError::registration(format!(
                    "struct {} maps unknown {} variant {}",
                    descriptor.name(),
                    enum_name,
                    variant
                )));
            }
            if !self.structs.contains_key(subtype) || !self.is_subtype(subtype, descriptor.name()) {
                return Err(RpcError::registration(format!(
                    "{} is not a subtype of {}",
                    subtype,
                    descriptor.name()
                )));
            }
        }
        Ok(())
    }

    fn check_type(&self, ty: &TypeDescriptor, usage: Usage, context: &str) -> Result<()> {
        match ty {
            TypeDescriptor::Undefined => Err(RpcError::registration(format!(
                "{} has an undefined type",
                context
            ))),
            TypeDescriptor::Void => match usage {
                Usage::Field | Usage::Result => Ok(()),
                _ => Err(RpcError::registration(format!(
                    "{} cannot be void",
                    context
                ))),
            },
            TypeDescriptor::Interface(name) => {
                if usage != Usage::Result {
                    return Err(RpcError::registration(format!(
                        "{} cannot be an interface",
                        context
                    )));
                }
                if !self.interfaces.contains_key(name) {
                    return Err(RpcError::registration(format!(
                        "{} refers to unregistered interface {}",
                        context, name
                    )));
                }
                Ok(())
            }
            TypeDescriptor::Enum(name) if !self.enums.contains_key(name) => {
                Err(RpcError::registration(format!(
                    "{} refers to unregistered enum {}",
                    context, name
                )))
            }
            TypeDescriptor::Struct(name) if !self.structs.contains_key(name) => {
                Err(RpcError::registration(format!(
                    "{} refers to unregistered struct {}",
                    context, name
                )))
            }
            TypeDescriptor::List(element) | TypeDescriptor::Set(element) => {
                self.check_type(element, Usage::Element, context)
            }
            TypeDescriptor::Map(key, value) => {
                self.check_type(key, Usage::Element, context)?;
                self.check_type(value, Usage::Element, context)
            }
            _ => Ok(()),
        }
    }
}

/// Prepend inherited fields to every struct that extends another.
fn inherit_fields(structs: &mut HashMap<String, StructDescriptor>) -> Result<()> {
    let mut resolved: HashMap<String, Vec<FieldDescriptor>> = HashMap::new();
    let names: Vec<String> = structs.keys().cloned().collect();
    for name in &names {
        resolve_fields(structs, name, &mut resolved, &mut Vec::new())?;
    }
    for (name, fields) in resolved {
        if let Some(descriptor) = structs.get_mut(&name) {
            descriptor.set_fields(fields);
        }
    }
    Ok(())
}

fn resolve_fields(
    structs: &HashMap<String, StructDescriptor>,
    name: &str,
    resolved: &mut HashMap<String, Vec<FieldDescriptor>>,
    visiting: &mut Vec<String>,
) -> Result<Vec<FieldDescriptor>> {
    if let Some(fields) = resolved.get(name) {
        return Ok(fields.clone());
    }
    if visiting.iter().any(|v| v == name) {
        return Err(RpcError::registration(format!(
            "struct {} extends itself",
            name
        )));
    }
    let descriptor = structs.get(name).ok_or_else(|| RpcError::UnknownType {
        name: name.to_string(),
    })?;

    visiting.push(name.to_string());
    let mut fields = match descriptor.base_name() {
        Some(base) if !structs.contains_key(base) => {
            return Err(RpcError::registration(format!(
                "struct {} extends unregistered struct {}",
                name, base
            )))
        }
        Some(base) => resolve_fields(structs, base, resolved, visiting)?,
        None => Vec::new(),
    };
    visiting.pop();

    fields.extend(descriptor.fields().iter().cloned());
    resolved.insert(name.to_string(), fields.clone());
    Ok(fields)
}

fn claim_name(names: &mut HashSet<String>, name: &str) -> Result<()> {
    if !names.insert(name.to_string()) {
        return Err(RpcError::registration(format!(
            "type {} is registered twice",
            name
        )));
    }
    Ok(())
}

fn ensure_unique<'a>(items: impl Iterator<Item = &'a str>, what: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item) {
            return Err(RpcError::registration(format!(
                "duplicate {}: {}",
                what, item
            )));
        }
    }
    Ok(())
}
