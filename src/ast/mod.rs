//! AST module
//!
//! Node type definitions for the directive language.

pub mod types;

pub use types::*;
