//! Registered record schemas and generic-parameter binding.

use std::collections::{HashMap, HashSet};

use crate::errors::GenerateError;
use crate::record::{FieldDef, RecordDef};
use crate::types::{TypeBindings, TypeExpr};

/// Name-keyed store of record definitions.
#[derive(Debug, Default)]
pub struct RecordRegistry {
    records: HashMap<String, RecordDef>,
}

impl RecordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition, folding base fields into it (base fields
    /// first, own declarations shadow by name in place). Bases must already
    /// be registered. Redefining a name is an error; definitions are
    /// immutable once stored.
    pub fn register(&mut self, def: RecordDef) -> Result<(), GenerateError> {
        if self.records.contains_key(def.name()) {
            return Err(GenerateError::AlreadyDefined(def.name().to_string()));
        }
        let merged = self.fold_bases(def)?;
        self.records.insert(merged.name().to_string(), merged);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&RecordDef, GenerateError> {
        self.records
            .get(name)
            .ok_or_else(|| GenerateError::UnknownRecord(name.to_string()))
    }

    fn fold_bases(&self, def: RecordDef) -> Result<RecordDef, GenerateError> {
        if def.bases().is_empty() {
            return Ok(def);
        }
        let mut fields: Vec<FieldDef> = Vec::new();
        let mut required: HashSet<String> = HashSet::new();
        for base in def.bases() {
            let TypeExpr::Record { name, args } = base else {
                return Err(GenerateError::NotARecord(base.to_string()));
            };
            let base_def = self.get(name)?;
            if !args.is_empty() && args.len() != base_def.params().len() {
                return Err(GenerateError::TypeArgumentCount {
                    record: name.clone(),
                    expected: base_def.params().len(),
                    got: args.len(),
                });
            }
            for field in base_def.fields() {
                let is_required = base_def.is_required(field.name());
                upsert(&mut fields, &mut required, field.clone(), is_required);
            }
        }
        for field in def.fields() {
            let is_required = def.is_required(field.name());
            upsert(&mut fields, &mut required, field.clone(), is_required);
        }
        Ok(RecordDef::from_parts(
            def.name().to_string(),
            def.params().to_vec(),
            fields,
            required,
            def.bases().to_vec(),
        ))
    }

    /// Builds the flat parameter-name to concrete-type mapping for an
    /// instantiation, before any per-field resolution starts.
    ///
    /// Direct arguments bind the record's own parameters; arguments that are
    /// themselves still variables stay unbound. The first parameterized base
    /// then contributes inherited bindings, with its arguments resolved
    /// through the direct mapping. A bare instantiation of a subclass gets
    /// its bindings entirely from that base walk. Non-record types produce
    /// an empty mapping.
    pub fn bind_type_params(&self, ty: &TypeExpr) -> Result<TypeBindings, GenerateError> {
        let TypeExpr::Record { name, args } = ty else {
            return Ok(TypeBindings::new());
        };
        let def = self.get(name)?;
        let mut bindings = TypeBindings::new();
        if !args.is_empty() {
            if args.len() != def.params().len() {
                return Err(GenerateError::TypeArgumentCount {
                    record: name.clone(),
                    expected: def.params().len(),
                    got: args.len(),
                });
            }
            for (param, arg) in def.params().iter().zip(args) {
                if matches!(arg, TypeExpr::Var(_)) {
                    continue;
                }
                bindings.insert(param.clone(), arg.clone());
            }
        }
        for base in def.bases() {
            let TypeExpr::Record {
                name: base_name,
                args: base_args,
            } = base
            else {
                continue;
            };
            if base_args.is_empty() {
                continue;
            }
            let base_def = self.get(base_name)?;
            for (param, arg) in base_def.params().iter().zip(base_args) {
                let resolved = arg.substitute(&bindings);
                if matches!(resolved, TypeExpr::Var(_)) {
                    continue;
                }
                bindings.entry(param.clone()).or_insert(resolved);
            }
            // One level of inherited parameterization.
            break;
        }
        Ok(bindings)
    }
}

fn upsert(
    fields: &mut Vec<FieldDef>,
    required: &mut HashSet<String>,
    field: FieldDef,
    is_required: bool,
) {
    if is_required {
        required.insert(field.name().to_string());
    } else {
        required.remove(field.name());
    }
    match fields.iter_mut().find(|f| f.name() == field.name()) {
        Some(existing) => *existing = field,
        None => fields.push(field),
    }
}
