//! Interpolation
//!
//! Turns template/command segment lists into strings against an environment.
//! Two contexts exist: the default context (templates, paths) and the
//! shell-safe context (command lines), which quotes values that could change
//! the shape of a command.

use crate::ast::types::TemplateSegment;
use crate::env::environment::EnvId;
use crate::interpreter::errors::MlldError;
use crate::interpreter::fields::traverse_fields;
use crate::interpreter::types::InterpreterState;
use crate::values::{canonical_text, SecurityDescriptor, StructuredValue};

/// Escaping applied to interpolated variable values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationContext {
    /// No escaping (templates, paths, prose)
    Default,
    /// Single-quote values that contain shell-significant characters
    ShellSafe,
}

/// Quote a value for safe inclusion in a command line.
pub fn shell_escape(text: &str) -> String {
    let safe = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=,@%+".contains(c));
    if safe {
        return text.to_string();
    }
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// Resolve one variable segment to a StructuredValue, honoring the ambient
/// `@ctx` binding and field paths.
pub fn resolve_segment_value(
    state: &InterpreterState,
    env: EnvId,
    name: &str,
    fields: &[crate::ast::types::FieldAccess],
) -> Result<StructuredValue, MlldError> {
    let base = if name == "ctx" {
        StructuredValue::from_json(state.ctx.build_ctx())
    } else if name == "output" {
        match state.ctx.guard_frame().and_then(|g| g.output.clone()) {
            Some(value) => value,
            None => {
                return Err(MlldError::UnknownVariable(name.to_string()));
            }
        }
    } else {
        state
            .arena
            .lookup(env, name)
            .map(|v| v.to_structured())
            .ok_or_else(|| MlldError::UnknownVariable(name.to_string()))?
    };

    if fields.is_empty() {
        return Ok(base);
    }
    let typed = traverse_fields(&base.typed, fields)?;
    Ok(StructuredValue::from_json(typed).with_descriptor(base.descriptor))
}

/// Interpolate a segment list, returning the text and the union of the
/// descriptors of every value that flowed in.
pub fn interpolate(
    state: &InterpreterState,
    env: EnvId,
    segments: &[TemplateSegment],
    context: InterpolationContext,
) -> Result<(String, SecurityDescriptor), MlldError> {
    let mut out = String::new();
    let mut descriptor = SecurityDescriptor::new();

    for segment in segments {
        match segment {
            TemplateSegment::Text(text) => out.push_str(text),
            TemplateSegment::Variable { name, fields } => {
                let value = resolve_segment_value(state, env, name, fields)?;
                descriptor.merge(&value.descriptor);
                let text = canonical_text(&value.typed);
                match context {
                    InterpolationContext::Default => out.push_str(&text),
                    InterpolationContext::ShellSafe => out.push_str(&shell_escape(&text)),
                }
            }
        }
    }

    Ok((out, descriptor))
}
