//! Operation registry: the static mapping from operation identity to its
//! handler, transformer, schema and accepted authorization modes.
//!
//! Built once at startup via [`RegistryBuilder`]; the built registry is
//! read-only, so lookups never take a lock.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use closing_doors_core::{AuthMode, ObjectType, OperationId, OperationSchema, TypeRef};

use super::handler::Handler;
use super::transform::Transformer;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("operation {operation} is already registered")]
    DuplicateOperation { operation: OperationId },
    #[error("unknown operation: {operation}")]
    UnknownOperation { operation: OperationId },
    #[error("operation {operation}: transformer `{transformer}` cannot drive handler `{handler}`")]
    IncompatibleBinding {
        operation: OperationId,
        transformer: &'static str,
        handler: &'static str,
    },
    #[error("operation {operation} accepts no authorization mode")]
    NoAuthModes { operation: OperationId },
}

// ---------------------------------------------------------------------------
// OperationBinding
// ---------------------------------------------------------------------------

/// Everything the dispatcher needs to execute one operation.
#[derive(Debug, Clone)]
pub struct OperationBinding {
    pub id: OperationId,
    pub schema: OperationSchema,
    pub handler: Handler,
    pub transformer: Transformer,
    pub auth_modes: Vec<AuthMode>,
    /// Overrides the gateway's default handler timeout.
    pub timeout: Option<Duration>,
}

impl OperationBinding {
    /// A binding accepting both authorization modes and using the default
    /// timeout.
    #[must_use]
    pub fn new(
        id: OperationId,
        schema: OperationSchema,
        handler: Handler,
        transformer: Transformer,
    ) -> Self {
        Self {
            id,
            schema,
            handler,
            transformer,
            auth_modes: vec![AuthMode::TrustedInternal, AuthMode::ExternalKeyed],
            timeout: None,
        }
    }

    #[must_use]
    pub fn accepting(mut self, modes: &[AuthMode]) -> Self {
        self.auth_modes = modes.to_vec();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    bindings: HashMap<OperationId, Arc<OperationBinding>>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateOperation`] if the identity is taken.
    /// - [`RegistryError::IncompatibleBinding`] if the transformer produces
    ///   requests the handler cannot serve.
    /// - [`RegistryError::NoAuthModes`] if no mode is accepted.
    pub fn register(&mut self, binding: OperationBinding) -> Result<&mut Self, RegistryError> {
        if self.bindings.contains_key(&binding.id) {
            return Err(RegistryError::DuplicateOperation {
                operation: binding.id,
            });
        }
        if binding.transformer.backend_kind() != binding.handler.backend_kind() {
            return Err(RegistryError::IncompatibleBinding {
                operation: binding.id,
                transformer: binding.transformer.name(),
                handler: binding.handler.name(),
            });
        }
        if binding.auth_modes.is_empty() {
            return Err(RegistryError::NoAuthModes {
                operation: binding.id,
            });
        }
        tracing::debug!(
            operation = %binding.id,
            handler = binding.handler.name(),
            transformer = binding.transformer.name(),
            "operation registered"
        );
        self.bindings.insert(binding.id.clone(), Arc::new(binding));
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> OperationRegistry {
        OperationRegistry {
            bindings: self.bindings,
        }
    }
}

// ---------------------------------------------------------------------------
// OperationRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct OperationRegistry {
    bindings: HashMap<OperationId, Arc<OperationBinding>>,
}

impl OperationRegistry {
    /// Looks up the binding for `(type_name, field_name)`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownOperation`] if nothing is registered
    /// under that identity.
    pub fn resolve(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Result<Arc<OperationBinding>, RegistryError> {
        let id = OperationId::new(type_name, field_name);
        match self.bindings.get(&id) {
            Some(binding) => Ok(Arc::clone(binding)),
            None => Err(RegistryError::UnknownOperation { operation: id }),
        }
    }

    /// Registered identities, sorted.
    #[must_use]
    pub fn operations(&self) -> Vec<OperationId> {
        let mut ids: Vec<_> = self.bindings.keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Renders the registered operations as schema definition language.
    ///
    /// Enums referenced anywhere in arguments or results are emitted first,
    /// then every reachable object type, then one block per parent type.
    #[must_use]
    pub fn render_sdl(&self) -> String {
        let mut named = NamedTypes::default();
        let mut by_type: BTreeMap<&str, Vec<&OperationBinding>> = BTreeMap::new();
        for binding in self.bindings.values() {
            for def in &binding.schema.arguments {
                named.collect(&def.ty);
            }
            named.collect(&binding.schema.result);
            by_type
                .entry(binding.id.type_name.as_str())
                .or_default()
                .push(binding.as_ref());
        }

        let mut out = String::new();
        for (name, values) in &named.enums {
            let _ = writeln!(out, "enum {name} {{");
            for value in *values {
                let _ = writeln!(out, "  {value}");
            }
            out.push_str("}\n\n");
        }
        for object in named.objects.values() {
            out.push_str(&object.render_sdl());
            out.push('\n');
        }
        for (type_name, mut fields) in by_type {
            fields.sort_by(|a, b| a.id.field_name.cmp(&b.id.field_name));
            let _ = writeln!(out, "type {type_name} {{");
            for binding in fields {
                let _ = writeln!(out, "  {}", binding.schema.render_field(&binding.id.field_name));
            }
            out.push_str("}\n");
        }
        out
    }
}

/// Enum and object types reachable from a set of type references, keyed by
/// name.
#[derive(Default)]
struct NamedTypes<'a> {
    enums: BTreeMap<&'a str, &'a [String]>,
    objects: BTreeMap<&'a str, &'a ObjectType>,
}

impl<'a> NamedTypes<'a> {
    fn collect(&mut self, ty: &'a TypeRef) {
        match ty {
            TypeRef::Enum { name, values, .. } => {
                self.enums.insert(name, values);
            }
            TypeRef::Object { object, .. } => {
                if self.objects.insert(&object.name, object).is_none() {
                    for def in &object.fields {
                        self.collect(&def.ty);
                    }
                }
            }
            TypeRef::List { item, .. } => self.collect(item),
            TypeRef::Scalar { .. } => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
