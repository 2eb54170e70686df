//! Operation argument/result shapes as declared by the external schema document.
//!
//! Only what the gateway needs to enforce at its boundary is modelled:
//! scalar, enum, object and list types with GraphQL nullability. Object
//! types carry their field definitions, so a result is checked all the way
//! down and the schema document is rendered from the same model.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Built-in GraphQL scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarKind {
    String,
    Int,
    Float,
    Boolean,
    Id,
}

impl ScalarKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::Id => "ID",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value
                .as_i64()
                .is_some_and(|n| i32::try_from(n).is_ok()),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Id => value.is_string() || value.is_i64() || value.is_u64(),
        }
    }
}

/// A type reference with nullability, e.g. `[Station!]!`.
///
/// Constructors produce nullable types, matching the schema language
/// default; call [`TypeRef::non_null`] to add the `!`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeRef {
    Scalar {
        kind: ScalarKind,
        nullable: bool,
    },
    Enum {
        name: String,
        values: Vec<String>,
        nullable: bool,
    },
    Object {
        object: ObjectType,
        nullable: bool,
    },
    List {
        item: Box<TypeRef>,
        nullable: bool,
    },
}

impl TypeRef {
    #[must_use]
    pub fn scalar(kind: ScalarKind) -> Self {
        Self::Scalar {
            kind,
            nullable: true,
        }
    }

    #[must_use]
    pub fn enumeration(name: impl Into<String>, values: &[&str]) -> Self {
        Self::Enum {
            name: name.into(),
            values: values.iter().map(ToString::to_string).collect(),
            nullable: true,
        }
    }

    #[must_use]
    pub fn object(object: ObjectType) -> Self {
        Self::Object {
            object,
            nullable: true,
        }
    }

    #[must_use]
    pub fn list(item: TypeRef) -> Self {
        Self::List {
            item: Box::new(item),
            nullable: true,
        }
    }

    /// Returns the same type with the nullable flag cleared.
    #[must_use]
    pub fn non_null(mut self) -> Self {
        match &mut self {
            Self::Scalar { nullable, .. }
            | Self::Enum { nullable, .. }
            | Self::Object { nullable, .. }
            | Self::List { nullable, .. } => *nullable = false,
        }
        self
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Scalar { nullable, .. }
            | Self::Enum { nullable, .. }
            | Self::Object { nullable, .. }
            | Self::List { nullable, .. } => *nullable,
        }
    }

    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List { .. })
    }

    /// The value an operation returns when its handler reports "not found":
    /// an empty list for list types, `null` otherwise.
    #[must_use]
    pub fn empty_value(&self) -> Value {
        if self.is_list() {
            Value::Array(Vec::new())
        } else {
            Value::Null
        }
    }

    /// Checks `value` against this type.
    ///
    /// Lists and objects are checked recursively. An object value may not
    /// carry keys its type does not declare, and an absent field counts as
    /// `null`.
    ///
    /// # Errors
    ///
    /// Returns a description of the first mismatch, prefixed with `path`.
    pub fn check(&self, value: &Value, path: &str) -> Result<(), String> {
        if value.is_null() {
            return if self.is_nullable() {
                Ok(())
            } else {
                Err(format!("{path}: expected non-null {self}"))
            };
        }
        match self {
            Self::Scalar { kind, .. } => {
                if kind.accepts(value) {
                    Ok(())
                } else {
                    Err(format!("{path}: expected {}, got {}", kind.as_str(), json_kind(value)))
                }
            }
            Self::Enum { name, values, .. } => match value.as_str() {
                Some(s) if values.iter().any(|v| v == s) => Ok(()),
                Some(s) => Err(format!("{path}: `{s}` is not a value of enum {name}")),
                None => Err(format!("{path}: expected {name}, got {}", json_kind(value))),
            },
            Self::Object { object, .. } => match value.as_object() {
                Some(map) => object.check_fields(map, path),
                None => Err(format!(
                    "{path}: expected {}, got {}",
                    object.name,
                    json_kind(value)
                )),
            },
            Self::List { item, .. } => {
                let Some(items) = value.as_array() else {
                    return Err(format!("{path}: expected list, got {}", json_kind(value)));
                };
                for (i, v) in items.iter().enumerate() {
                    item.check(v, &format!("{path}[{i}]"))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar { kind, .. } => f.write_str(kind.as_str())?,
            Self::Enum { name, .. } => f.write_str(name)?,
            Self::Object { object, .. } => f.write_str(&object.name)?,
            Self::List { item, .. } => write!(f, "[{item}]")?,
        }
        if self.is_nullable() {
            Ok(())
        } else {
            f.write_str("!")
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Named field definition: an operation argument or an object field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
}

/// An object type with its declared fields, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl ObjectType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a field definition.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
        });
        self
    }

    /// Renders the `type Name { ... }` definition block.
    #[must_use]
    pub fn render_sdl(&self) -> String {
        let mut out = format!("type {} {{\n", self.name);
        for def in &self.fields {
            out.push_str("  ");
            out.push_str(&def.name);
            out.push_str(": ");
            out.push_str(&def.ty.to_string());
            out.push('\n');
        }
        out.push_str("}\n");
        out
    }

    fn check_fields(&self, map: &Map<String, Value>, path: &str) -> Result<(), String> {
        if let Some(key) = map
            .keys()
            .find(|key| !self.fields.iter().any(|def| &def.name == *key))
        {
            return Err(format!("{path}.{key}: not a field of {}", self.name));
        }
        for def in &self.fields {
            def.ty.check(
                map.get(&def.name).unwrap_or(&Value::Null),
                &format!("{path}.{}", def.name),
            )?;
        }
        Ok(())
    }
}

/// Result of validating arguments against an operation schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The arguments conform to the schema.
    Valid,
    /// The arguments violate one or more schema constraints.
    Invalid {
        /// Human-readable descriptions of each validation failure.
        errors: Vec<String>,
    },
}

impl ValidationResult {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Declared argument and result shapes of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSchema {
    pub arguments: Vec<FieldDef>,
    pub result: TypeRef,
}

impl OperationSchema {
    #[must_use]
    pub fn returning(result: TypeRef) -> Self {
        Self {
            arguments: Vec::new(),
            result,
        }
    }

    /// Appends an argument definition.
    #[must_use]
    pub fn argument(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.arguments.push(FieldDef {
            name: name.into(),
            ty,
        });
        self
    }

    /// Validates concrete invocation arguments.
    ///
    /// Reports unknown arguments, missing non-null arguments, and type
    /// mismatches. All failures are collected, not just the first.
    #[must_use]
    pub fn validate_arguments(&self, args: &Map<String, Value>) -> ValidationResult {
        let mut errors = Vec::new();

        for name in args.keys() {
            if !self.arguments.iter().any(|def| &def.name == name) {
                errors.push(format!("unknown argument `{name}`"));
            }
        }

        for def in &self.arguments {
            match args.get(&def.name) {
                None | Some(Value::Null) if !def.ty.is_nullable() => {
                    errors.push(format!("missing required argument `{}: {}`", def.name, def.ty));
                }
                None => {}
                Some(value) => {
                    if let Err(e) = def.ty.check(value, &def.name) {
                        errors.push(e);
                    }
                }
            }
        }

        if errors.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid { errors }
        }
    }

    /// Renders the field definition line for this operation, e.g.
    /// `nearestStations(lat: Float!, lon: Float!): [Station!]!`.
    #[must_use]
    pub fn render_field(&self, field_name: &str) -> String {
        if self.arguments.is_empty() {
            return format!("{field_name}: {}", self.result);
        }
        let args = self
            .arguments
            .iter()
            .map(|def| format!("{}: {}", def.name, def.ty))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{field_name}({args}): {}", self.result)
    }
}
