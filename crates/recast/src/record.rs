//! Record schemas: the fixed field layout conversions are generated against.

use std::collections::HashSet;

use crate::types::TypeExpr;

/// One named field of a record schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    name: String,
    ty: TypeExpr,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeExpr {
        &self.ty
    }
}

/// A record schema: ordered fields, the required-key set, declared type
/// parameters, and (possibly parameterized) base records.
///
/// Definitions are immutable once registered; the registry folds base fields
/// into `fields` at registration so generation sees the complete layout.
#[derive(Debug, Clone)]
pub struct RecordDef {
    name: String,
    params: Vec<String>,
    fields: Vec<FieldDef>,
    required: HashSet<String>,
    bases: Vec<TypeExpr>,
}

impl RecordDef {
    pub fn builder(name: impl Into<String>) -> RecordDefBuilder {
        RecordDefBuilder {
            name: name.into(),
            params: Vec::new(),
            fields: Vec::new(),
            required: HashSet::new(),
            bases: Vec::new(),
        }
    }

    pub(crate) fn from_parts(
        name: String,
        params: Vec<String>,
        fields: Vec<FieldDef>,
        required: HashSet<String>,
        bases: Vec<TypeExpr>,
    ) -> Self {
        Self {
            name,
            params,
            fields,
            required,
            bases,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Fields in declaration order, base fields first.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn bases(&self) -> &[TypeExpr] {
        &self.bases
    }

    pub fn is_required(&self, field: &str) -> bool {
        self.required.contains(field)
    }
}

/// Chained builder for [`RecordDef`]. `field` declares a required field,
/// `optional_field` one that may be absent from instances.
#[derive(Debug)]
pub struct RecordDefBuilder {
    name: String,
    params: Vec<String>,
    fields: Vec<FieldDef>,
    required: HashSet<String>,
    bases: Vec<TypeExpr>,
}

impl RecordDefBuilder {
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(name.into());
        self
    }

    /// Declares a base record this schema inherits fields from. Pass a
    /// parameterized reference (`TypeExpr::record_of`) to bind the base's
    /// type parameters.
    pub fn base(mut self, base: TypeExpr) -> Self {
        self.bases.push(base);
        self
    }

    pub fn field(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.insert(name.into(), ty, true);
        self
    }

    pub fn optional_field(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.insert(name.into(), ty, false);
        self
    }

    // Redeclaring a name replaces its type and requiredness in place,
    // keeping the original position.
    fn insert(&mut self, name: String, ty: TypeExpr, required: bool) {
        if required {
            self.required.insert(name.clone());
        } else {
            self.required.remove(&name);
        }
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.ty = ty,
            None => self.fields.push(FieldDef { name, ty }),
        }
    }

    pub fn build(self) -> RecordDef {
        RecordDef {
            name: self.name,
            params: self.params,
            fields: self.fields,
            required: self.required,
            bases: self.bases,
        }
    }
}
