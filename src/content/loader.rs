//! Content Loading
//!
//! Resolves path, section, glob load-content, and file-reference RHS
//! expressions. All reads go through the filesystem boundary; loaded values
//! are tainted with their file origin.

use serde_json::{json, Value};

use crate::ast::types::{FieldAccess, LoadContentExpr};
use crate::content::section::{extract_section, rename_section};
use crate::env::environment::EnvId;
use crate::interpreter::errors::{ExecutionDetails, MlldError};
use crate::interpreter::fields::traverse_fields;
use crate::interpreter::fs_bridge::SyncFileSystem;
use crate::interpreter::interpolation::{interpolate, InterpolationContext};
use crate::interpreter::types::InterpreterState;
use crate::values::{SecurityDescriptor, StructuredValue};

fn file_descriptor(path: &str) -> SecurityDescriptor {
    let mut d = SecurityDescriptor::with_taint("src:file");
    d.add_source(format!("file:{}", path));
    d
}

fn read_error(path: &str, err: crate::fs::FsError) -> MlldError {
    MlldError::execution(
        format!("Failed to load content from {}: {}", path, err),
        ExecutionDetails {
            working_directory: None,
            directive_type: Some("load-content".to_string()),
            ..Default::default()
        },
    )
}

fn apply_section(
    content: String,
    path: &str,
    section: Option<&str>,
    as_section: Option<&str>,
) -> Result<String, MlldError> {
    let Some(title) = section else {
        return Ok(content);
    };
    let extracted = extract_section(&content, title).ok_or_else(|| {
        MlldError::execution(
            format!("Section '{}' not found in {}", title, path),
            ExecutionDetails {
                directive_type: Some("load-content".to_string()),
                ..Default::default()
            },
        )
    })?;
    Ok(match as_section {
        Some(new_title) => rename_section(&extracted, new_title),
        None => extracted,
    })
}

/// Resolve a load-content expression against the filesystem boundary.
pub fn resolve_load_content(
    state: &InterpreterState,
    env: EnvId,
    fs: &dyn SyncFileSystem,
    expr: &LoadContentExpr,
) -> Result<StructuredValue, MlldError> {
    let (raw_path, path_descriptor) =
        interpolate(state, env, &expr.path, InterpolationContext::Default)?;

    if expr.glob {
        return resolve_glob(state, fs, &raw_path, expr, path_descriptor);
    }

    let path = fs.resolve_path(&state.cwd, &raw_path);
    let content = fs.read_file(&path).map_err(|e| read_error(&path, e))?;
    let content = apply_section(
        content,
        &path,
        expr.section.as_deref(),
        expr.as_section.as_deref(),
    )?;

    let mut descriptor = file_descriptor(&path);
    descriptor.merge(&path_descriptor);
    Ok(StructuredValue::from_text(content).with_descriptor(descriptor))
}

/// Glob load-content: every match is loaded, with the section transform
/// applied per result.
fn resolve_glob(
    state: &InterpreterState,
    fs: &dyn SyncFileSystem,
    raw_pattern: &str,
    expr: &LoadContentExpr,
    path_descriptor: SecurityDescriptor,
) -> Result<StructuredValue, MlldError> {
    let pattern_text = fs.resolve_path(&state.cwd, raw_pattern);
    let pattern = glob::Pattern::new(&pattern_text).map_err(|e| {
        MlldError::execution(
            format!("Invalid glob pattern '{}': {}", pattern_text, e),
            ExecutionDetails::default(),
        )
    })?;

    let mut matches: Vec<String> = fs
        .all_paths()
        .into_iter()
        .filter(|p| pattern.matches(p))
        .collect();
    matches.sort();

    let mut descriptor = path_descriptor;
    let mut entries: Vec<Value> = Vec::new();
    for path in matches {
        let content = fs.read_file(&path).map_err(|e| read_error(&path, e))?;
        let content = apply_section(
            content,
            &path,
            expr.section.as_deref(),
            expr.as_section.as_deref(),
        )?;
        descriptor.merge(&file_descriptor(&path));
        entries.push(json!({ "path": path, "content": content }));
    }

    Ok(StructuredValue::from_json(Value::Array(entries)).with_descriptor(descriptor))
}

/// File reference with a field path: load, parse, then traverse accessors.
pub fn resolve_file_reference(
    state: &InterpreterState,
    env: EnvId,
    fs: &dyn SyncFileSystem,
    load: &LoadContentExpr,
    fields: &[FieldAccess],
) -> Result<StructuredValue, MlldError> {
    let loaded = resolve_load_content(state, env, fs, load)?;
    if fields.is_empty() {
        return Ok(loaded);
    }

    // Field access needs the structured form; JSON files parse, everything
    // else stays text.
    let typed = match serde_json::from_str::<Value>(&loaded.text) {
        Ok(parsed) => parsed,
        Err(_) => loaded.typed.clone(),
    };
    let value = traverse_fields(&typed, fields)?;
    Ok(StructuredValue::from_json(value).with_descriptor(loaded.descriptor))
}
