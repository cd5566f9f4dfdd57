//! Variable Model
//!
//! Variables are tagged records binding a name to a kind-dependent payload,
//! source metadata, a security descriptor, and internal bookkeeping flags.
//! Executables are variables whose payload describes one of the five
//! execution strategies (command, code, template, commandRef, prose) or a
//! host-provided builtin transformer.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::ast::types::{ExeBlockNode, Expr, Node, TemplateSegment, WhenNode};
use crate::interpreter::errors::MlldError;
use crate::values::{SecurityDescriptor, StructuredValue};

/// Variable kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    SimpleText,
    Template,
    Object,
    Array,
    Path,
    Executable,
    Parameter,
    Structured,
}

impl VariableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableKind::SimpleText => "simple-text",
            VariableKind::Template => "template",
            VariableKind::Object => "object",
            VariableKind::Array => "array",
            VariableKind::Path => "path",
            VariableKind::Executable => "executable",
            VariableKind::Parameter => "parameter",
            VariableKind::Structured => "structured",
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind-dependent payload.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Text(String),
    Json(Value),
    /// Template-kind RHS is stored as AST, not pre-interpolated
    Template(Vec<TemplateSegment>),
    Path(String),
    Executable(ExecutableDef),
    Structured(StructuredValue),
}

/// Source metadata recorded at definition time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableSource {
    pub directive: String,
    pub syntax: String,
    pub has_interpolation: bool,
    pub is_multi_line: bool,
    pub wrapper_type: Option<String>,
}

impl VariableSource {
    pub fn directive(directive: impl Into<String>, syntax: impl Into<String>) -> Self {
        Self {
            directive: directive.into(),
            syntax: syntax.into(),
            ..Default::default()
        }
    }
}

/// Shadow environments keyed by language, each a map of captured bindings.
pub type ShadowEnvs = HashMap<String, HashMap<String, Value>>;

/// Keychain roles gated by the keychain policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeychainFunction {
    Get,
    Set,
    Delete,
}

/// Host function backing a builtin transformer.
#[derive(Clone)]
pub struct TransformerImpl(
    pub Arc<dyn Fn(&[StructuredValue]) -> Result<StructuredValue, MlldError> + Send + Sync>,
);

impl TransformerImpl {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[StructuredValue]) -> Result<StructuredValue, MlldError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for TransformerImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<builtin transformer>")
    }
}

impl PartialEq for TransformerImpl {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Internal bookkeeping flags; most stay at their defaults.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableInternal {
    pub is_system: bool,
    pub is_parameter: bool,
    /// Set when the variable was assigned from a command/code/exec RHS
    pub is_retryable: bool,
    /// Originating AST node for retryable assignments
    pub source_function: Option<Box<Node>>,
    /// Shadow environments captured when the executable was defined
    pub captured_shadow_envs: Option<ShadowEnvs>,
    pub is_builtin_transformer: bool,
    pub transformer_implementation: Option<TransformerImpl>,
    pub keychain_function: Option<KeychainFunction>,
    pub import_path: Option<String>,
    pub is_imported: bool,
}

/// A named binding in an environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: VariableKind,
    pub value: VariableValue,
    pub source: VariableSource,
    /// "metadata extension": labels/taint/sources
    pub mx: SecurityDescriptor,
    pub internal: VariableInternal,
}

impl Variable {
    /// Resolve the variable to a StructuredValue, merging its descriptor.
    pub fn to_structured(&self) -> StructuredValue {
        let mut out = match &self.value {
            VariableValue::Text(s) => StructuredValue::from_text(s.clone()),
            VariableValue::Json(v) => StructuredValue::from_json(v.clone()),
            VariableValue::Path(p) => StructuredValue::from_text(p.clone()),
            VariableValue::Structured(sv) => sv.clone(),
            // Templates and executables have no direct value form; their
            // textual identity is used for display contexts.
            VariableValue::Template(_) => StructuredValue::from_text(format!("<template @{}>", self.name)),
            VariableValue::Executable(_) => StructuredValue::from_text(format!("<executable @{}>", self.name)),
        };
        out.merge_descriptor(&self.mx);
        out
    }

    pub fn is_executable(&self) -> bool {
        self.kind == VariableKind::Executable
    }

    pub fn as_executable(&self) -> Option<&ExecutableDef> {
        match &self.value {
            VariableValue::Executable(def) => Some(def),
            _ => None,
        }
    }
}

// =============================================================================
// EXECUTABLES
// =============================================================================

/// Source payload of a code executable. The two pseudo-languages hand control
/// back to the evaluator instead of a host code runner.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeSource {
    Segments(Vec<TemplateSegment>),
    /// pseudo-language `mlld-when`
    When(WhenNode),
    /// pseudo-language `mlld-exe-block`
    Block(ExeBlockNode),
}

/// Strategy-specific payload of an executable.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutableBody {
    /// Command template of text/variable segments
    Command { segments: Vec<TemplateSegment> },
    /// Language + source template
    Code { language: String, source: CodeSource },
    /// Template parts array
    Template { parts: Vec<TemplateSegment> },
    /// Reference identifier + argument AST
    CommandRef { target: String, args: Vec<Expr> },
    /// Prompt recipe
    Prose { recipe: Vec<TemplateSegment> },
    /// Host-provided function, dispatched without interpolation
    Builtin { name: String },
}

impl ExecutableBody {
    /// Executable type tag recorded in exec contexts.
    pub fn type_name(&self) -> &'static str {
        match self {
            ExecutableBody::Command { .. } => "command",
            ExecutableBody::Code { .. } => "code",
            ExecutableBody::Template { .. } => "template",
            ExecutableBody::CommandRef { .. } => "commandRef",
            ExecutableBody::Prose { .. } => "prose",
            ExecutableBody::Builtin { .. } => "builtin",
        }
    }
}

/// An invocable definition: parameter names, body, and operation labels.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableDef {
    pub params: Vec<String>,
    pub body: ExecutableBody,
    /// Labels the executable applies to its own operation (e.g. "op:net")
    pub labels: BTreeSet<String>,
}

impl ExecutableDef {
    pub fn new(params: Vec<String>, body: ExecutableBody) -> Self {
        Self {
            params,
            body,
            labels: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_strings() {
        assert_eq!(VariableKind::SimpleText.as_str(), "simple-text");
        assert_eq!(VariableKind::Executable.as_str(), "executable");
    }

    #[test]
    fn test_to_structured_text() {
        let v = Variable {
            name: "greeting".to_string(),
            kind: VariableKind::SimpleText,
            value: VariableValue::Text("hello".to_string()),
            source: VariableSource::directive("var", "quoted"),
            mx: SecurityDescriptor::with_label("public"),
            internal: VariableInternal::default(),
        };
        let sv = v.to_structured();
        assert_eq!(sv.text, "hello");
        assert!(sv.descriptor.has_label("public"));
    }

    #[test]
    fn test_to_structured_json() {
        let v = Variable {
            name: "data".to_string(),
            kind: VariableKind::Object,
            value: VariableValue::Json(json!({"a": 1})),
            source: VariableSource::directive("var", "object"),
            mx: SecurityDescriptor::new(),
            internal: VariableInternal::default(),
        };
        assert_eq!(v.to_structured().typed, json!({"a": 1}));
    }

    #[test]
    fn test_executable_type_names() {
        let body = ExecutableBody::Code {
            language: "js".to_string(),
            source: CodeSource::Segments(vec![TemplateSegment::text("1 + 1")]),
        };
        assert_eq!(body.type_name(), "code");
        assert_eq!(
            ExecutableBody::CommandRef {
                target: "x".to_string(),
                args: vec![]
            }
            .type_name(),
            "commandRef"
        );
    }
}
