//! Content Resolution
//!
//! Path, section, glob, and field-access RHS expressions.

pub mod loader;
pub mod section;

pub use loader::{resolve_file_reference, resolve_load_content};
pub use section::{extract_section, rename_section};
