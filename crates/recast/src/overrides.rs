//! Per-field adjustments applied when a conversion function is generated.

use std::collections::HashMap;
use std::fmt;

use crate::converter::{StructureFn, UnstructureFn};

/// Override-set for one generation call, keyed by field name. Fields without
/// an entry get the default resolution.
pub type Overrides = HashMap<String, FieldOverride>;

/// Adjustments for a single field. The default value is neutral and changes
/// nothing about how the field is handled.
#[derive(Clone, Default)]
pub struct FieldOverride {
    /// Exclude the field from the conversion entirely.
    pub omit: bool,
    /// Key used on the plain-mapping side instead of the field name.
    pub rename: Option<String>,
    /// Replaces handler resolution for this field when unstructuring.
    pub unstruct_hook: Option<UnstructureFn>,
    /// Replaces handler resolution for this field when structuring.
    pub struct_hook: Option<StructureFn>,
}

impl FieldOverride {
    pub fn omitted() -> Self {
        Self {
            omit: true,
            ..Self::default()
        }
    }

    pub fn renamed(key: impl Into<String>) -> Self {
        Self {
            rename: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn unstruct_with(hook: UnstructureFn) -> Self {
        Self {
            unstruct_hook: Some(hook),
            ..Self::default()
        }
    }

    pub fn struct_with(hook: StructureFn) -> Self {
        Self {
            struct_hook: Some(hook),
            ..Self::default()
        }
    }

    pub fn is_neutral(&self) -> bool {
        !self.omit
            && self.rename.is_none()
            && self.unstruct_hook.is_none()
            && self.struct_hook.is_none()
    }
}

impl fmt::Debug for FieldOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldOverride")
            .field("omit", &self.omit)
            .field("rename", &self.rename)
            .field("unstruct_hook", &self.unstruct_hook.is_some())
            .field("struct_hook", &self.struct_hook.is_some())
            .finish()
    }
}
