//! Runtime-specialized conversion between record schemas and plain mappings.
//!
//! A record type (fixed named fields, required or optional, possibly
//! generic) registered with a [`Converter`] gets a dedicated conversion
//! closure generated on first use, one per distinct generic instantiation,
//! instead of paying type resolution and handler dispatch on every call.
//! Generated functions honor per-field [`FieldOverride`]s (omit, rename,
//! forced hooks), preserve unknown keys, and in detailed-validation mode
//! aggregate every field failure into one error.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use recast::{Converter, RecordDef, TypeExpr, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let conv = Converter::new();
//! conv.register_record(
//!     RecordDef::builder("Event")
//!         .field("name", TypeExpr::String)
//!         .field("at", TypeExpr::Timestamp)
//!         .optional_field("note", TypeExpr::String)
//!         .build(),
//! )?;
//!
//! // Timestamps travel as plain integers on the wire.
//! conv.register_unstructure_hook(
//!     TypeExpr::Timestamp,
//!     Arc::new(|_conv, value| match value.as_timestamp() {
//!         Some(micros) => Ok(Value::Int(micros)),
//!         None => Err(recast::ConvertError::mismatch("timestamp", value)),
//!     }),
//! );
//!
//! let event = Value::map_of([
//!     ("name", Value::from("deploy")),
//!     ("at", Value::Timestamp(1_700_000_000_000_000)),
//! ]);
//! let ty = TypeExpr::record("Event");
//! let plain = conv.unstructure_as(&event, &ty)?;
//! assert_eq!(
//!     plain.as_map().unwrap()["at"],
//!     Value::Int(1_700_000_000_000_000),
//! );
//! # Ok(())
//! # }
//! ```

mod converter;
pub use converter::{Converter, StructureFn, UnstructureFn};

mod errors;
pub use errors::{ConvertError, GenerateError};

mod generate;
pub use generate::{
    StructureOptions, UnstructureOptions, make_record_structure_fn, make_record_unstructure_fn,
};

mod overrides;
pub use overrides::{FieldOverride, Overrides};

mod record;
pub use record::{FieldDef, RecordDef, RecordDefBuilder};

mod registry;
pub use registry::RecordRegistry;

pub mod trace;

mod types;
pub use types::{TypeBindings, TypeExpr};

mod value;
pub use value::{Value, ValueMap};
