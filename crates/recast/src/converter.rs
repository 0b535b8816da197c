//! The conversion engine: handler registries, dispatch, and fallbacks.
//!
//! Handlers are `Arc`ed closures so the registry, the caches, and generated
//! plans can share them freely; the designated identity and structure-call
//! handlers are recognized by pointer identity. Generated functions are
//! invoked lock-free; generation itself serializes on the working set, and
//! concurrent generation of overlapping type graphs from multiple threads
//! should be serialized by the caller.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tracing::trace;

use crate::errors::{ConvertError, GenerateError};
use crate::generate::{self, Direction, StructureOptions, UnstructureOptions};
use crate::overrides::Overrides;
use crate::record::RecordDef;
use crate::registry::RecordRegistry;
use crate::types::{TypeBindings, TypeExpr};
use crate::value::{Value, ValueMap};

/// Handler converting a record-side value into its plain-mapping form.
pub type UnstructureFn =
    Arc<dyn Fn(&Converter, &Value) -> Result<Value, ConvertError> + Send + Sync>;

/// Handler converting a plain-mapping value into its record form. The type
/// argument is the requested target; specialized handlers ignore it.
pub type StructureFn =
    Arc<dyn Fn(&Converter, &Value, &TypeExpr) -> Result<Value, ConvertError> + Send + Sync>;

/// Conversion engine holding record schemas, user hooks, and the cache of
/// generated conversion functions.
///
/// User hooks and derived handlers live in separate maps: registering a hook
/// clears the derived cache so later dispatches see it, but functions that
/// already captured the old handler keep it until regenerated.
pub struct Converter {
    records: RwLock<RecordRegistry>,
    unstructure_hooks: RwLock<HashMap<TypeExpr, UnstructureFn>>,
    structure_hooks: RwLock<HashMap<TypeExpr, StructureFn>>,
    unstructure_cache: RwLock<HashMap<TypeExpr, UnstructureFn>>,
    structure_cache: RwLock<HashMap<TypeExpr, StructureFn>>,
    identity: UnstructureFn,
    structure_call: StructureFn,
    detailed_validation: bool,
    in_progress: Mutex<WorkingSet>,
}

#[derive(Debug, Default)]
struct WorkingSet {
    unstructure: HashSet<TypeExpr>,
    structure: HashSet<TypeExpr>,
}

impl WorkingSet {
    fn entries(&mut self, direction: Direction) -> &mut HashSet<TypeExpr> {
        match direction {
            Direction::Unstructure => &mut self.unstructure,
            Direction::Structure => &mut self.structure,
        }
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter {
    pub fn new() -> Self {
        let identity: UnstructureFn = Arc::new(|_conv: &Converter, value: &Value| Ok(value.clone()));
        let structure_call: StructureFn = Arc::new(structure_call);
        Self {
            records: RwLock::new(RecordRegistry::new()),
            unstructure_hooks: RwLock::new(HashMap::new()),
            structure_hooks: RwLock::new(HashMap::new()),
            unstructure_cache: RwLock::new(HashMap::new()),
            structure_cache: RwLock::new(HashMap::new()),
            identity,
            structure_call,
            detailed_validation: true,
            in_progress: Mutex::new(WorkingSet::default()),
        }
    }

    /// Sets the default validation mode for structure functions generated
    /// through dispatch. Explicit generation takes its own options.
    pub fn with_detailed_validation(mut self, enabled: bool) -> Self {
        self.detailed_validation = enabled;
        self
    }

    pub fn detailed_validation(&self) -> bool {
        self.detailed_validation
    }

    /// Registers a record schema. Bases must already be registered;
    /// redefining a name is an error.
    pub fn register_record(&self, def: RecordDef) -> Result<(), GenerateError> {
        let mut records = self.records.write().expect("record registry lock poisoned");
        records.register(def)
    }

    /// A clone of the stored definition for `name`.
    pub fn record_def(&self, name: &str) -> Result<RecordDef, GenerateError> {
        let records = self.records.read().expect("record registry lock poisoned");
        records.get(name).cloned()
    }

    pub(crate) fn bind_type_params(&self, ty: &TypeExpr) -> Result<TypeBindings, GenerateError> {
        let records = self.records.read().expect("record registry lock poisoned");
        records.bind_type_params(ty)
    }

    /// Registers `hook` as the canonical unstructure handler for `ty`,
    /// replacing any previous hook and invalidating derived handlers.
    pub fn register_unstructure_hook(&self, ty: TypeExpr, hook: UnstructureFn) {
        trace!(ty = %ty, "registering unstructure hook");
        self.unstructure_hooks
            .write()
            .expect("unstructure hook lock poisoned")
            .insert(ty, hook);
        self.unstructure_cache
            .write()
            .expect("unstructure cache lock poisoned")
            .clear();
    }

    /// Registers `hook` as the canonical structure handler for `ty`,
    /// replacing any previous hook and invalidating derived handlers.
    pub fn register_structure_hook(&self, ty: TypeExpr, hook: StructureFn) {
        trace!(ty = %ty, "registering structure hook");
        self.structure_hooks
            .write()
            .expect("structure hook lock poisoned")
            .insert(ty, hook);
        self.structure_cache
            .write()
            .expect("structure cache lock poisoned")
            .clear();
    }

    /// The designated identity handler. Pointer-compare with
    /// [`Converter::is_identity`] to recognize it.
    pub fn unstructure_identity(&self) -> UnstructureFn {
        self.identity.clone()
    }

    pub fn is_identity(&self, handler: &UnstructureFn) -> bool {
        Arc::ptr_eq(handler, &self.identity)
    }

    /// The designated coerce-to-target structure handler.
    pub fn structure_call_handler(&self) -> StructureFn {
        self.structure_call.clone()
    }

    pub fn is_structure_call(&self, handler: &StructureFn) -> bool {
        Arc::ptr_eq(handler, &self.structure_call)
    }

    /// Resolves the unstructure handler for `ty`, generating and caching a
    /// specialized function for record types on first use.
    pub fn dispatch_unstructure(&self, ty: &TypeExpr) -> Result<UnstructureFn, GenerateError> {
        if let Some(hook) = self.cached_unstructure(ty) {
            return Ok(hook);
        }
        let handler = match ty {
            TypeExpr::Any
            | TypeExpr::Bool
            | TypeExpr::Int
            | TypeExpr::Float
            | TypeExpr::String
            | TypeExpr::Timestamp => return Ok(self.identity.clone()),
            TypeExpr::Var(_) => return Err(GenerateError::NoHandler(ty.to_string())),
            TypeExpr::Optional(inner) => {
                let element = self.dispatch_unstructure(inner)?;
                if self.is_identity(&element) {
                    return Ok(self.identity.clone());
                }
                Arc::new(move |conv: &Converter, value: &Value| {
                    if value.is_null() {
                        Ok(Value::Null)
                    } else {
                        element(conv, value)
                    }
                }) as UnstructureFn
            }
            TypeExpr::List(inner) => {
                let element = self.dispatch_unstructure(inner)?;
                if self.is_identity(&element) {
                    return Ok(self.identity.clone());
                }
                Arc::new(move |conv: &Converter, value: &Value| {
                    let Some(items) = value.as_list() else {
                        return Err(ConvertError::mismatch("list", value));
                    };
                    let mut out = Vec::with_capacity(items.len());
                    for (idx, item) in items.iter().enumerate() {
                        let converted = element(conv, item)
                            .map_err(|err| err.with_note(format!("@ index {idx}")))?;
                        out.push(converted);
                    }
                    Ok(Value::List(out))
                }) as UnstructureFn
            }
            TypeExpr::Map(_, value_ty) => {
                let element = self.dispatch_unstructure(value_ty)?;
                if self.is_identity(&element) {
                    return Ok(self.identity.clone());
                }
                Arc::new(move |conv: &Converter, value: &Value| {
                    let Some(map) = value.as_map() else {
                        return Err(ConvertError::mismatch("map", value));
                    };
                    let mut out = ValueMap::with_capacity(map.len());
                    for (key, item) in map {
                        let converted = element(conv, item)
                            .map_err(|err| err.with_note(format!("@ key {key}")))?;
                        out.insert(key.clone(), converted);
                    }
                    Ok(Value::Map(out))
                }) as UnstructureFn
            }
            TypeExpr::Record { .. } => {
                generate::make_record_unstructure_fn(
                    ty,
                    self,
                    &Overrides::new(),
                    UnstructureOptions::default(),
                )?
            }
        };
        self.unstructure_cache
            .write()
            .expect("unstructure cache lock poisoned")
            .insert(ty.clone(), handler.clone());
        Ok(handler)
    }

    /// Resolves the structure handler for `ty`, generating and caching a
    /// specialized function for record types on first use.
    pub fn dispatch_structure(&self, ty: &TypeExpr) -> Result<StructureFn, GenerateError> {
        if let Some(hook) = self.cached_structure(ty) {
            return Ok(hook);
        }
        let handler = match ty {
            TypeExpr::Any
            | TypeExpr::Bool
            | TypeExpr::Int
            | TypeExpr::Float
            | TypeExpr::String
            | TypeExpr::Timestamp => return Ok(self.structure_call.clone()),
            TypeExpr::Var(_) => return Err(GenerateError::NoHandler(ty.to_string())),
            TypeExpr::Optional(inner) => {
                let element = self.dispatch_structure(inner)?;
                let element_ty = (**inner).clone();
                Arc::new(move |conv: &Converter, value: &Value, _ty: &TypeExpr| {
                    if value.is_null() {
                        Ok(Value::Null)
                    } else {
                        element(conv, value, &element_ty)
                    }
                }) as StructureFn
            }
            TypeExpr::List(inner) => {
                let element = self.dispatch_structure(inner)?;
                let element_ty = (**inner).clone();
                Arc::new(move |conv: &Converter, value: &Value, _ty: &TypeExpr| {
                    let Some(items) = value.as_list() else {
                        return Err(ConvertError::mismatch("list", value));
                    };
                    let mut out = Vec::with_capacity(items.len());
                    for (idx, item) in items.iter().enumerate() {
                        let converted = element(conv, item, &element_ty)
                            .map_err(|err| err.with_note(format!("@ index {idx}")))?;
                        out.push(converted);
                    }
                    Ok(Value::List(out))
                }) as StructureFn
            }
            TypeExpr::Map(_, value_ty) => {
                let element = self.dispatch_structure(value_ty)?;
                let element_ty = (**value_ty).clone();
                Arc::new(move |conv: &Converter, value: &Value, _ty: &TypeExpr| {
                    let Some(map) = value.as_map() else {
                        return Err(ConvertError::mismatch("map", value));
                    };
                    let mut out = ValueMap::with_capacity(map.len());
                    for (key, item) in map {
                        let converted = element(conv, item, &element_ty)
                            .map_err(|err| err.with_note(format!("@ key {key}")))?;
                        out.insert(key.clone(), converted);
                    }
                    Ok(Value::Map(out))
                }) as StructureFn
            }
            TypeExpr::Record { .. } => {
                let options = StructureOptions {
                    detailed_validation: self.detailed_validation,
                    ..StructureOptions::default()
                };
                generate::make_record_structure_fn(ty, self, &Overrides::new(), options)?
            }
        };
        self.structure_cache
            .write()
            .expect("structure cache lock poisoned")
            .insert(ty.clone(), handler.clone());
        Ok(handler)
    }

    /// General-purpose unstructure: walks the value by its runtime kind.
    /// Slower than a specialized function; used to break self-referential
    /// generation and to handle fields with unbound type variables.
    pub fn unstructure(&self, value: &Value) -> Result<Value, ConvertError> {
        match value {
            Value::Timestamp(_) => {
                let hook = self
                    .unstructure_hooks
                    .read()
                    .expect("unstructure hook lock poisoned")
                    .get(&TypeExpr::Timestamp)
                    .cloned();
                match hook {
                    Some(hook) => hook(self, value),
                    None => Ok(value.clone()),
                }
            }
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    let converted = self
                        .unstructure(item)
                        .map_err(|err| err.with_note(format!("@ index {idx}")))?;
                    out.push(converted);
                }
                Ok(Value::List(out))
            }
            Value::Map(map) => {
                let mut out = ValueMap::with_capacity(map.len());
                for (key, item) in map {
                    let converted = self
                        .unstructure(item)
                        .map_err(|err| err.with_note(format!("@ key {key}")))?;
                    out.insert(key.clone(), converted);
                }
                Ok(Value::Map(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Unstructures `value` as `ty` through handler dispatch.
    pub fn unstructure_as(&self, value: &Value, ty: &TypeExpr) -> Result<Value, ConvertError> {
        let handler = self.dispatch_unstructure(ty)?;
        handler(self, value)
    }

    /// Structures `value` as `ty` through handler dispatch.
    pub fn structure(&self, value: &Value, ty: &TypeExpr) -> Result<Value, ConvertError> {
        let handler = self.dispatch_structure(ty)?;
        handler(self, value, ty)
    }

    pub(crate) fn begin_generation(
        &self,
        direction: Direction,
        ty: &TypeExpr,
    ) -> Result<(), GenerateError> {
        let mut set = self.in_progress.lock().expect("working set lock poisoned");
        if !set.entries(direction).insert(ty.clone()) {
            return Err(GenerateError::Recursive(ty.to_string()));
        }
        Ok(())
    }

    pub(crate) fn end_generation(&self, direction: Direction, ty: &TypeExpr) {
        let mut set = self.in_progress.lock().expect("working set lock poisoned");
        set.entries(direction).remove(ty);
    }

    fn cached_unstructure(&self, ty: &TypeExpr) -> Option<UnstructureFn> {
        let hook = self
            .unstructure_hooks
            .read()
            .expect("unstructure hook lock poisoned")
            .get(ty)
            .cloned();
        hook.or_else(|| {
            self.unstructure_cache
                .read()
                .expect("unstructure cache lock poisoned")
                .get(ty)
                .cloned()
        })
    }

    fn cached_structure(&self, ty: &TypeExpr) -> Option<StructureFn> {
        let hook = self
            .structure_hooks
            .read()
            .expect("structure hook lock poisoned")
            .get(ty)
            .cloned();
        hook.or_else(|| {
            self.structure_cache
                .read()
                .expect("structure cache lock poisoned")
                .get(ty)
                .cloned()
        })
    }
}

/// The designated structure handler for non-record targets: checks (and for
/// numeric widening, coerces) the value against the requested type.
fn structure_call(_conv: &Converter, value: &Value, ty: &TypeExpr) -> Result<Value, ConvertError> {
    match ty {
        TypeExpr::Any => Ok(value.clone()),
        TypeExpr::Bool => match value.as_bool() {
            Some(b) => Ok(Value::Bool(b)),
            None => Err(ConvertError::mismatch("bool", value)),
        },
        TypeExpr::Int => match value.as_int() {
            Some(i) => Ok(Value::Int(i)),
            None => Err(ConvertError::mismatch("int", value)),
        },
        TypeExpr::Float => match value {
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            other => Err(ConvertError::mismatch("float", other)),
        },
        TypeExpr::String => match value.as_str() {
            Some(s) => Ok(Value::String(s.to_string())),
            None => Err(ConvertError::mismatch("string", value)),
        },
        TypeExpr::Timestamp => match value.as_timestamp() {
            Some(t) => Ok(Value::Timestamp(t)),
            None => Err(ConvertError::mismatch("timestamp", value)),
        },
        other => Err(ConvertError::Unsupported(format!(
            "structure-call target {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_dispatch_is_the_designated_identity() {
        let conv = Converter::new();
        let handler = conv.dispatch_unstructure(&TypeExpr::Int).unwrap();
        assert!(conv.is_identity(&handler));
        let handler = conv.dispatch_unstructure(&TypeExpr::Timestamp).unwrap();
        assert!(conv.is_identity(&handler));
    }

    #[test]
    fn identity_propagates_through_containers() {
        let conv = Converter::new();
        let ty = TypeExpr::list(TypeExpr::optional(TypeExpr::map(
            TypeExpr::String,
            TypeExpr::Int,
        )));
        let handler = conv.dispatch_unstructure(&ty).unwrap();
        assert!(conv.is_identity(&handler));
    }

    #[test]
    fn registered_hook_breaks_identity_propagation() {
        let conv = Converter::new();
        conv.register_unstructure_hook(
            TypeExpr::Timestamp,
            Arc::new(|_conv, value| match value.as_timestamp() {
                Some(micros) => Ok(Value::Int(micros)),
                None => Err(ConvertError::mismatch("timestamp", value)),
            }),
        );
        let ty = TypeExpr::list(TypeExpr::Timestamp);
        let handler = conv.dispatch_unstructure(&ty).unwrap();
        assert!(!conv.is_identity(&handler));
        let out = handler(&conv, &Value::List(vec![Value::Timestamp(5)])).unwrap();
        assert_eq!(out, Value::List(vec![Value::Int(5)]));
    }

    #[test]
    fn scalar_structure_dispatch_is_the_designated_call_handler() {
        let conv = Converter::new();
        let handler = conv.dispatch_structure(&TypeExpr::Int).unwrap();
        assert!(conv.is_structure_call(&handler));
    }

    #[test]
    fn structure_call_widens_int_to_float_only() {
        let conv = Converter::new();
        assert_eq!(
            conv.structure(&Value::Int(3), &TypeExpr::Float).unwrap(),
            Value::Float(3.0)
        );
        let err = conv.structure(&Value::Float(3.0), &TypeExpr::Int).unwrap_err();
        assert_eq!(err.to_string(), "Type mismatch: expected int, got float");
    }

    #[test]
    fn optional_structure_accepts_null() {
        let conv = Converter::new();
        let ty = TypeExpr::optional(TypeExpr::Int);
        assert_eq!(conv.structure(&Value::Null, &ty).unwrap(), Value::Null);
        assert_eq!(conv.structure(&Value::Int(2), &ty).unwrap(), Value::Int(2));
    }

    #[test]
    fn list_structure_notes_the_failing_index() {
        let conv = Converter::new();
        let ty = TypeExpr::list(TypeExpr::Int);
        let input = Value::List(vec![Value::Int(1), Value::from("two")]);
        let err = conv.structure(&input, &ty).unwrap_err();
        assert_eq!(err.to_string(), "@ index 1");
    }

    #[test]
    fn general_unstructure_walks_containers() {
        let conv = Converter::new();
        conv.register_unstructure_hook(
            TypeExpr::Timestamp,
            Arc::new(|_conv, value| match value.as_timestamp() {
                Some(micros) => Ok(Value::Int(micros)),
                None => Err(ConvertError::mismatch("timestamp", value)),
            }),
        );
        let input = Value::map_of([
            ("at", Value::Timestamp(99)),
            ("tags", Value::List(vec![Value::Timestamp(1)])),
        ]);
        let out = conv.unstructure(&input).unwrap();
        assert_eq!(
            out,
            Value::map_of([("at", Value::Int(99)), ("tags", Value::List(vec![Value::Int(1)]))])
        );
    }
}
