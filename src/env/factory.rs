//! Variable Factory
//!
//! Constructors for typed Variables with the right kind, source metadata,
//! and internal flags. Evaluators never assemble a Variable field by field;
//! they go through here so metadata stays consistent.

use serde_json::Value;

use crate::ast::types::{Node, TemplateSegment};
use crate::env::variable::{
    ExecutableDef, KeychainFunction, ShadowEnvs, TransformerImpl, Variable, VariableInternal,
    VariableKind, VariableSource, VariableValue,
};
use crate::values::{SecurityDescriptor, StructuredValue, ValueType};

pub struct VariableFactory;

impl VariableFactory {
    pub fn simple_text(
        name: impl Into<String>,
        text: impl Into<String>,
        source: VariableSource,
    ) -> Variable {
        Variable {
            name: name.into(),
            kind: VariableKind::SimpleText,
            value: VariableValue::Text(text.into()),
            source,
            mx: SecurityDescriptor::new(),
            internal: VariableInternal::default(),
        }
    }

    /// Wrap an evaluated StructuredValue, deriving the kind from its type tag.
    pub fn structured(
        name: impl Into<String>,
        value: StructuredValue,
        source: VariableSource,
    ) -> Variable {
        let kind = match value.value_type {
            ValueType::Object => VariableKind::Object,
            ValueType::Array => VariableKind::Array,
            ValueType::Text => VariableKind::SimpleText,
            _ => VariableKind::Structured,
        };
        let mx = value.descriptor.clone();
        Variable {
            name: name.into(),
            kind,
            value: VariableValue::Structured(value),
            source,
            mx,
            internal: VariableInternal::default(),
        }
    }

    pub fn object(name: impl Into<String>, value: Value, source: VariableSource) -> Variable {
        Variable {
            name: name.into(),
            kind: VariableKind::Object,
            value: VariableValue::Json(value),
            source,
            mx: SecurityDescriptor::new(),
            internal: VariableInternal::default(),
        }
    }

    pub fn array(name: impl Into<String>, value: Value, source: VariableSource) -> Variable {
        Variable {
            name: name.into(),
            kind: VariableKind::Array,
            value: VariableValue::Json(value),
            source,
            mx: SecurityDescriptor::new(),
            internal: VariableInternal::default(),
        }
    }

    pub fn path(name: impl Into<String>, path: impl Into<String>, source: VariableSource) -> Variable {
        Variable {
            name: name.into(),
            kind: VariableKind::Path,
            value: VariableValue::Path(path.into()),
            source,
            mx: SecurityDescriptor::new(),
            internal: VariableInternal::default(),
        }
    }

    /// Template-kind RHS is stored as AST, not pre-interpolated.
    pub fn template(
        name: impl Into<String>,
        parts: Vec<TemplateSegment>,
        source: VariableSource,
    ) -> Variable {
        Variable {
            name: name.into(),
            kind: VariableKind::Template,
            value: VariableValue::Template(parts),
            source,
            mx: SecurityDescriptor::new(),
            internal: VariableInternal::default(),
        }
    }

    pub fn executable(
        name: impl Into<String>,
        def: ExecutableDef,
        source: VariableSource,
        captured_shadow_envs: Option<ShadowEnvs>,
    ) -> Variable {
        Variable {
            name: name.into(),
            kind: VariableKind::Executable,
            value: VariableValue::Executable(def),
            source,
            mx: SecurityDescriptor::new(),
            internal: VariableInternal {
                captured_shadow_envs,
                ..Default::default()
            },
        }
    }

    /// Parameter variables live in the parameter scope and shadow regular
    /// variables.
    pub fn parameter(name: impl Into<String>, value: StructuredValue) -> Variable {
        let mx = value.descriptor.clone();
        Variable {
            name: name.into(),
            kind: VariableKind::Parameter,
            value: VariableValue::Structured(value),
            source: VariableSource::directive("exe", "parameter"),
            mx,
            internal: VariableInternal {
                is_parameter: true,
                ..Default::default()
            },
        }
    }

    /// System-provided ambient binding (e.g. a pipeline stage input).
    pub fn system(name: impl Into<String>, value: StructuredValue) -> Variable {
        let mx = value.descriptor.clone();
        Variable {
            name: name.into(),
            kind: VariableKind::Structured,
            value: VariableValue::Structured(value),
            source: VariableSource::directive("system", "ambient"),
            mx,
            internal: VariableInternal {
                is_system: true,
                ..Default::default()
            },
        }
    }

    /// A variable assigned from a command/code/exec RHS: retryable, with the
    /// originating AST node recorded.
    pub fn retryable(
        name: impl Into<String>,
        value: StructuredValue,
        source: VariableSource,
        source_function: Node,
    ) -> Variable {
        let mut var = Self::structured(name, value, source);
        var.internal.is_retryable = true;
        var.internal.source_function = Some(Box::new(source_function));
        var
    }

    /// Re-mark a variable as imported from another module.
    pub fn imported(mut var: Variable, import_path: impl Into<String>) -> Variable {
        var.internal.is_imported = true;
        var.internal.import_path = Some(import_path.into());
        var
    }

    /// Builtin transformer backed by a host function.
    pub fn builtin_transformer(
        name: impl Into<String>,
        params: Vec<String>,
        implementation: TransformerImpl,
        keychain_function: Option<KeychainFunction>,
    ) -> Variable {
        let name = name.into();
        let def = ExecutableDef::new(
            params,
            crate::env::variable::ExecutableBody::Builtin { name: name.clone() },
        );
        Variable {
            name: name.clone(),
            kind: VariableKind::Executable,
            value: VariableValue::Executable(def),
            source: VariableSource::directive("builtin", "transformer"),
            mx: SecurityDescriptor::new(),
            internal: VariableInternal {
                is_system: true,
                is_builtin_transformer: true,
                transformer_implementation: Some(implementation),
                keychain_function,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{DirectiveKind, DirectiveNode, RunDirective, CommandExpr};

    #[test]
    fn test_parameter_shadowing_flags() {
        let p = VariableFactory::parameter("x", StructuredValue::from_text("v"));
        assert!(p.internal.is_parameter);
        assert_eq!(p.kind, VariableKind::Parameter);
    }

    #[test]
    fn test_retryable_records_source_function() {
        let node = Node::Directive(DirectiveNode::new(DirectiveKind::Run(RunDirective {
            command: CommandExpr {
                segments: vec![TemplateSegment::text("echo hi")],
            },
            pipeline: None,
        })));
        let v = VariableFactory::retryable(
            "out",
            StructuredValue::from_text("hi"),
            VariableSource::directive("var", "run"),
            node.clone(),
        );
        assert!(v.internal.is_retryable);
        assert_eq!(v.internal.source_function.as_deref(), Some(&node));
    }

    #[test]
    fn test_structured_kind_derivation() {
        let obj = VariableFactory::structured(
            "o",
            StructuredValue::from_json(serde_json::json!({"k": 1})),
            VariableSource::default(),
        );
        assert_eq!(obj.kind, VariableKind::Object);

        let arr = VariableFactory::structured(
            "a",
            StructuredValue::from_json(serde_json::json!([1])),
            VariableSource::default(),
        );
        assert_eq!(arr.kind, VariableKind::Array);
    }

    #[test]
    fn test_imported_flags() {
        let v = VariableFactory::simple_text("x", "1", VariableSource::default());
        let v = VariableFactory::imported(v, "@scope/module");
        assert!(v.internal.is_imported);
        assert_eq!(v.internal.import_path.as_deref(), Some("@scope/module"));
    }
}
