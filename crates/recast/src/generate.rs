//! Generation of specialized per-record conversion functions.
//!
//! Instead of re-resolving field types and re-dispatching handlers on every
//! call, each record instantiation gets a plan built once: per field, a fixed
//! op (skip, remove, move, convert) with its handler already resolved. The
//! returned closure captures the plan immutably, never mutates its input,
//! and is safe for unbounded concurrent invocation.

use std::sync::Arc;

use tracing::debug;

use crate::converter::{Converter, StructureFn, UnstructureFn};
use crate::errors::{ConvertError, GenerateError};
use crate::overrides::{FieldOverride, Overrides};
use crate::trace;
use crate::types::{TypeBindings, TypeExpr};
use crate::value::{Value, ValueMap};

/// Options for unstructure generation.
#[derive(Debug, Clone, Copy)]
pub struct UnstructureOptions {
    /// Record the generated plan in the process-wide trace.
    pub trace: bool,
}

impl Default for UnstructureOptions {
    fn default() -> Self {
        Self { trace: true }
    }
}

/// Options for structure generation.
#[derive(Debug, Clone, Copy)]
pub struct StructureOptions {
    /// Collect every field failure into one aggregate error instead of
    /// stopping at the first.
    pub detailed_validation: bool,
    /// Record the generated plan in the process-wide trace.
    pub trace: bool,
}

impl Default for StructureOptions {
    fn default() -> Self {
        Self {
            detailed_validation: true,
            trace: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Direction {
    Unstructure,
    Structure,
}

enum UnstructureOp {
    /// Drop the field's key from the output copy.
    Remove,
    /// Move the value from the field name to the mapped key unchanged.
    Move,
    /// Convert the value and store it under the mapped key.
    Convert(UnstructureFn),
}

struct UnstructureField {
    name: String,
    key: String,
    required: bool,
    op: UnstructureOp,
}

enum StructureShape {
    /// Coerce through the designated structure-call handler; only the
    /// resolved type is baked.
    Call(TypeExpr),
    /// Apply a resolved handler with the resolved type.
    Hook(StructureFn, TypeExpr),
}

struct StructureField {
    name: String,
    key: String,
    required: bool,
    shape: StructureShape,
}

struct StructurePlan {
    /// Bare record name, used in failure notes.
    record: String,
    fields: Vec<StructureField>,
    call: StructureFn,
}

/// Builds a specialized `(record) -> plain mapping` function for a record
/// instantiation.
///
/// If every field resolves to the identity handler and carries no override,
/// the converter's designated identity handler itself is returned; the
/// record is already representable unchanged as a plain mapping.
pub fn make_record_unstructure_fn(
    ty: &TypeExpr,
    converter: &Converter,
    overrides: &Overrides,
    options: UnstructureOptions,
) -> Result<UnstructureFn, GenerateError> {
    let TypeExpr::Record { name, .. } = ty else {
        return Err(GenerateError::NotARecord(ty.to_string()));
    };
    let def = converter.record_def(name)?;
    converter.begin_generation(Direction::Unstructure, ty)?;
    let _working = scopeguard::guard((), |_| converter.end_generation(Direction::Unstructure, ty));

    debug!(record = %ty, "generating unstructure fn");
    let bindings = converter.bind_type_params(ty)?;

    let mut fields: Vec<UnstructureField> = Vec::new();
    for field in def.fields() {
        let field_override = overrides.get(field.name()).cloned().unwrap_or_default();
        if field_override.omit {
            fields.push(UnstructureField {
                name: field.name().to_string(),
                key: field.name().to_string(),
                required: def.is_required(field.name()),
                op: UnstructureOp::Remove,
            });
            continue;
        }
        let forced = field_override.unstruct_hook.is_some();
        let handler = match field_override.unstruct_hook {
            Some(hook) => hook,
            None => resolve_unstructure_handler(converter, field.ty(), &bindings)?,
        };
        let key = field_override
            .rename
            .unwrap_or_else(|| field.name().to_string());
        let identity = !forced && converter.is_identity(&handler);
        let op = match (identity, key == field.name()) {
            // Identity value already sits under the right key in the copy.
            (true, true) => continue,
            (true, false) => UnstructureOp::Move,
            (false, _) => UnstructureOp::Convert(handler),
        };
        fields.push(UnstructureField {
            name: field.name().to_string(),
            key,
            required: def.is_required(field.name()),
            op,
        });
    }

    if fields.is_empty() {
        debug!(record = %ty, "all fields identity, reusing the identity handler");
        return Ok(converter.unstructure_identity());
    }

    if options.trace {
        let lines = fields.iter().map(unstructure_line).collect();
        let fn_name = format!("unstructure_{name}");
        let plan_name = trace::record_plan("unstructure", &fn_name, lines);
        debug!(plan = %plan_name, "recorded unstructure plan");
    }

    Ok(Arc::new(move |conv: &Converter, value: &Value| {
        let Some(input) = value.as_map() else {
            return Err(ConvertError::mismatch("map", value));
        };
        let mut out = input.clone();
        for field in &fields {
            match &field.op {
                UnstructureOp::Remove => {
                    out.shift_remove(&field.name);
                }
                UnstructureOp::Move => match out.shift_remove(&field.name) {
                    Some(v) => {
                        out.insert(field.key.clone(), v);
                    }
                    None if field.required => {
                        return Err(ConvertError::MissingKey(field.name.clone()));
                    }
                    None => {}
                },
                UnstructureOp::Convert(handler) => {
                    let source = if field.key != field.name {
                        out.shift_remove(&field.name)
                    } else {
                        out.get(&field.name).cloned()
                    };
                    match source {
                        Some(v) => {
                            let converted = handler(conv, &v)?;
                            out.insert(field.key.clone(), converted);
                        }
                        None if field.required => {
                            return Err(ConvertError::MissingKey(field.name.clone()));
                        }
                        None => {}
                    }
                }
            }
        }
        Ok(Value::Map(out))
    }))
}

/// Builds a specialized `(plain mapping, target type) -> record` function
/// for a record instantiation. The returned closure ignores its type
/// argument; the plan is already specialized.
///
/// Fails with [`GenerateError::MissingTypeArgument`] if any of the record's
/// declared type parameters is unbound, or if a field's type still contains
/// an unbound variable and no `struct_hook` override covers the field.
pub fn make_record_structure_fn(
    ty: &TypeExpr,
    converter: &Converter,
    overrides: &Overrides,
    options: StructureOptions,
) -> Result<StructureFn, GenerateError> {
    let TypeExpr::Record { name, args } = ty else {
        return Err(GenerateError::NotARecord(ty.to_string()));
    };
    let def = converter.record_def(name)?;
    converter.begin_generation(Direction::Structure, ty)?;
    let _working = scopeguard::guard((), |_| converter.end_generation(Direction::Structure, ty));

    debug!(record = %ty, detailed = options.detailed_validation, "generating structure fn");
    let bindings = converter.bind_type_params(ty)?;

    // Distinct instantiations get distinct function names: one sanitized
    // suffix per declared parameter, each of which must be bound.
    let mut fn_name = format!("structure_{name}");
    for (idx, param) in def.params().iter().enumerate() {
        let Some(bound) = bindings.get(param) else {
            let reported = match args.get(idx) {
                Some(TypeExpr::Var(v)) => v.clone(),
                _ => param.clone(),
            };
            return Err(GenerateError::MissingTypeArgument(reported));
        };
        fn_name.push('_');
        fn_name.push_str(&sanitize_type_name(bound));
    }

    let mut fields: Vec<StructureField> = Vec::new();
    let mut allowed_keys: Vec<String> = Vec::new();
    for field in def.fields() {
        let field_override = overrides.get(field.name()).cloned().unwrap_or_default();
        if field_override.omit {
            continue;
        }
        let key = field_override
            .rename
            .clone()
            .unwrap_or_else(|| field.name().to_string());
        allowed_keys.push(key.clone());
        let shape = resolve_structure_shape(converter, field.ty(), &bindings, &field_override)?;
        fields.push(StructureField {
            name: field.name().to_string(),
            key,
            required: def.is_required(field.name()),
            shape,
        });
    }

    let plan = StructurePlan {
        record: name.clone(),
        fields,
        call: converter.structure_call_handler(),
    };

    if options.trace {
        let mut lines = vec![format!(
            "mode: {}",
            if options.detailed_validation {
                "detailed"
            } else {
                "fast"
            }
        )];
        lines.extend(plan.fields.iter().map(structure_line));
        lines.push(format!("allowed keys: [{}]", allowed_keys.join(", ")));
        let plan_name = trace::record_plan("structure", &fn_name, lines);
        debug!(plan = %plan_name, "recorded structure plan");
    }

    if options.detailed_validation {
        Ok(Arc::new(
            move |conv: &Converter, value: &Value, _ty: &TypeExpr| {
                let Some(input) = value.as_map() else {
                    return Err(ConvertError::mismatch("map", value));
                };
                let mut out = input.clone();
                let mut errors: Vec<ConvertError> = Vec::new();
                for field in &plan.fields {
                    if let Err(err) = structure_field(&plan, field, conv, &mut out) {
                        errors.push(err.with_note(format!(
                            "Structuring record {} @ field {}",
                            plan.record, field.name
                        )));
                    }
                }
                if !errors.is_empty() {
                    return Err(ConvertError::Validation {
                        message: format!("While structuring {}", plan.record),
                        errors,
                    });
                }
                Ok(Value::Map(out))
            },
        ))
    } else {
        Ok(Arc::new(
            move |conv: &Converter, value: &Value, _ty: &TypeExpr| {
                let Some(input) = value.as_map() else {
                    return Err(ConvertError::mismatch("map", value));
                };
                let mut out = input.clone();
                for field in plan.fields.iter().filter(|f| f.required) {
                    structure_field(&plan, field, conv, &mut out)?;
                }
                for field in plan.fields.iter().filter(|f| !f.required) {
                    structure_field(&plan, field, conv, &mut out)?;
                }
                Ok(Value::Map(out))
            },
        ))
    }
}

/// Converts one field of the input copy in place.
fn structure_field(
    plan: &StructurePlan,
    field: &StructureField,
    conv: &Converter,
    out: &mut ValueMap,
) -> Result<(), ConvertError> {
    let source = if field.key != field.name {
        out.shift_remove(&field.key)
    } else {
        out.get(&field.key).cloned()
    };
    match source {
        Some(v) => {
            let converted = match &field.shape {
                StructureShape::Call(ty) => (plan.call)(conv, &v, ty)?,
                StructureShape::Hook(handler, ty) => handler(conv, &v, ty)?,
            };
            out.insert(field.name.clone(), converted);
            Ok(())
        }
        None if field.required => Err(ConvertError::MissingKey(field.key.clone())),
        None => Ok(()),
    }
}

/// Resolves the unstructure handler for one field.
///
/// A type that still contains unbound variables after substitution and a
/// self-referential dispatch both land on the converter's general entry
/// point; unstructuring is directionally safe without full type knowledge.
fn resolve_unstructure_handler(
    converter: &Converter,
    field_ty: &TypeExpr,
    bindings: &TypeBindings,
) -> Result<UnstructureFn, GenerateError> {
    let resolved = field_ty.substitute(bindings);
    if resolved.contains_var() {
        return Ok(general_unstructure());
    }
    match converter.dispatch_unstructure(&resolved) {
        Ok(handler) => Ok(handler),
        Err(GenerateError::Recursive(_)) => {
            debug!(ty = %resolved, "falling back to the general converter");
            Ok(general_unstructure())
        }
        Err(other) => Err(other),
    }
}

/// Resolves the structure shape for one field.
///
/// A `struct_hook` override bypasses resolution entirely. An unbound
/// variable without one fails generation; a self-referential dispatch falls
/// back to the converter's general entry point to break the cycle.
fn resolve_structure_shape(
    converter: &Converter,
    field_ty: &TypeExpr,
    bindings: &TypeBindings,
    field_override: &FieldOverride,
) -> Result<StructureShape, GenerateError> {
    let resolved = field_ty.substitute(bindings);
    if let Some(hook) = &field_override.struct_hook {
        return Ok(StructureShape::Hook(hook.clone(), resolved));
    }
    if let Some(unbound) = first_var(&resolved) {
        return Err(GenerateError::MissingTypeArgument(unbound.to_string()));
    }
    match converter.dispatch_structure(&resolved) {
        Ok(handler) => {
            if converter.is_structure_call(&handler) {
                Ok(StructureShape::Call(resolved))
            } else {
                Ok(StructureShape::Hook(handler, resolved))
            }
        }
        Err(GenerateError::Recursive(_)) => {
            debug!(ty = %resolved, "falling back to the general converter");
            let target = resolved.clone();
            let fallback: StructureFn =
                Arc::new(move |conv: &Converter, value: &Value, _ty: &TypeExpr| {
                    conv.structure(value, &target)
                });
            Ok(StructureShape::Hook(fallback, resolved))
        }
        Err(other) => Err(other),
    }
}

fn general_unstructure() -> UnstructureFn {
    Arc::new(|conv: &Converter, value: &Value| conv.unstructure(value))
}

fn first_var(ty: &TypeExpr) -> Option<&str> {
    match ty {
        TypeExpr::Var(name) => Some(name),
        TypeExpr::Optional(inner) | TypeExpr::List(inner) => first_var(inner),
        TypeExpr::Map(key, value) => first_var(key).or_else(|| first_var(value)),
        TypeExpr::Record { args, .. } => args.iter().find_map(first_var),
        _ => None,
    }
}

fn sanitize_type_name(ty: &TypeExpr) -> String {
    ty.to_string()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn unstructure_line(field: &UnstructureField) -> String {
    let req = if field.required { "required" } else { "optional" };
    match &field.op {
        UnstructureOp::Remove => format!("omit {}", field.name),
        UnstructureOp::Move => format!("move {} -> {} ({req})", field.name, field.key),
        UnstructureOp::Convert(_) if field.key != field.name => {
            format!("convert {} -> {} ({req})", field.name, field.key)
        }
        UnstructureOp::Convert(_) => format!("convert {} ({req})", field.name),
    }
}

fn structure_line(field: &StructureField) -> String {
    let req = if field.required { "required" } else { "optional" };
    let (verb, ty) = match &field.shape {
        StructureShape::Call(ty) => ("call", ty),
        StructureShape::Hook(_, ty) => ("hook", ty),
    };
    if field.key != field.name {
        format!("{verb} {} <- {} as {ty} ({req})", field.name, field.key)
    } else {
        format!("{verb} {} as {ty} ({req})", field.name)
    }
}
