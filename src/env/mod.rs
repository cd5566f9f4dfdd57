//! Environment Layer
//!
//! Variable model, typed constructors, and the scoped environment arena.

pub mod environment;
pub mod factory;
pub mod variable;

pub use environment::{EnvArena, EnvFrame, EnvId};
pub use factory::VariableFactory;
pub use variable::{
    CodeSource, ExecutableBody, ExecutableDef, KeychainFunction, ShadowEnvs, TransformerImpl,
    Variable, VariableInternal, VariableKind, VariableSource, VariableValue,
};
