//! Runtime type descriptors.
//!
//! Field types and instantiation types are plain data. Record references are
//! by name so a schema can mention itself (or a record registered later)
//! without any lifetime knots; the registry resolves names at generation
//! time.

use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;

/// Substitution mapping from type-parameter names to concrete types.
pub type TypeBindings = HashMap<String, TypeExpr>;

/// The building block of field and instantiation types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub enum TypeExpr {
    /// Accepts any value unchanged.
    Any,
    Bool,
    Int,
    Float,
    String,
    /// The rich scalar: converted through a registered hook, identity otherwise.
    Timestamp,
    /// An unbound type variable, e.g. `T` in `Wrapper[T]`.
    Var(String),
    Optional(Box<TypeExpr>),
    List(Box<TypeExpr>),
    Map(Box<TypeExpr>, Box<TypeExpr>),
    /// Reference to a registered record type, possibly parameterized.
    Record { name: String, args: Vec<TypeExpr> },
}

impl TypeExpr {
    pub fn var(name: impl Into<String>) -> Self {
        TypeExpr::Var(name.into())
    }

    pub fn optional(inner: TypeExpr) -> Self {
        TypeExpr::Optional(Box::new(inner))
    }

    pub fn list(element: TypeExpr) -> Self {
        TypeExpr::List(Box::new(element))
    }

    pub fn map(key: TypeExpr, value: TypeExpr) -> Self {
        TypeExpr::Map(Box::new(key), Box::new(value))
    }

    /// A bare (unparameterized) record reference.
    pub fn record(name: impl Into<String>) -> Self {
        TypeExpr::Record {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// A parameterized record reference, e.g. `Wrapper[int]`.
    pub fn record_of(name: impl Into<String>, args: impl IntoIterator<Item = TypeExpr>) -> Self {
        TypeExpr::Record {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn basename(&self) -> &'static str {
        match self {
            TypeExpr::Any => "any",
            TypeExpr::Bool => "bool",
            TypeExpr::Int => "int",
            TypeExpr::Float => "float",
            TypeExpr::String => "string",
            TypeExpr::Timestamp => "timestamp",
            TypeExpr::Var(_) => "var",
            TypeExpr::Optional(_) => "option",
            TypeExpr::List(_) => "list",
            TypeExpr::Map(_, _) => "map",
            TypeExpr::Record { .. } => "record",
        }
    }

    /// True if any part of the type is still an unresolved variable.
    pub fn contains_var(&self) -> bool {
        match self {
            TypeExpr::Var(_) => true,
            TypeExpr::Optional(inner) | TypeExpr::List(inner) => inner.contains_var(),
            TypeExpr::Map(key, value) => key.contains_var() || value.contains_var(),
            TypeExpr::Record { args, .. } => args.iter().any(TypeExpr::contains_var),
            _ => false,
        }
    }

    /// Replaces every bound variable with its mapped type. Unbound variables
    /// are left in place for the caller to deal with.
    pub fn substitute(&self, bindings: &TypeBindings) -> TypeExpr {
        match self {
            TypeExpr::Var(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            TypeExpr::Optional(inner) => TypeExpr::optional(inner.substitute(bindings)),
            TypeExpr::List(element) => TypeExpr::list(element.substitute(bindings)),
            TypeExpr::Map(key, value) => {
                TypeExpr::map(key.substitute(bindings), value.substitute(bindings))
            }
            TypeExpr::Record { name, args } => TypeExpr::Record {
                name: name.clone(),
                args: args.iter().map(|arg| arg.substitute(bindings)).collect(),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Var(name) => f.write_str(name),
            TypeExpr::Optional(inner) => write!(f, "option[{inner}]"),
            TypeExpr::List(element) => write!(f, "list[{element}]"),
            TypeExpr::Map(key, value) => write!(f, "map[{key}, {value}]"),
            TypeExpr::Record { name, args } => {
                if args.is_empty() {
                    f.write_str(name)
                } else {
                    write!(f, "{name}[{}]", args.iter().map(|a| a.to_string()).join(", "))
                }
            }
            other => f.write_str(other.basename()),
        }
    }
}
