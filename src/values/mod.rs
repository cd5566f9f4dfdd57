//! Value Layer
//!
//! StructuredValue (the uniform carrier) and SecurityDescriptor (labels,
//! taint, sources) shared by every evaluator and pipeline stage.

pub mod descriptor;
pub mod structured;

pub use descriptor::SecurityDescriptor;
pub use structured::{canonical_text, StructuredValue, ValueType};
