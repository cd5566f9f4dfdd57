//! Session
//!
//! Main entry point: owns the interpreter state across evaluations and
//! bridges the async host boundary (filesystem, runtime) to the sync
//! evaluation engine.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::types::Node;
use crate::env::environment::EnvId;
use crate::env::factory::VariableFactory;
use crate::env::variable::{KeychainFunction, TransformerImpl, Variable};
use crate::exec::{CommandExecutor, CommandProvider, CommandSafety, CodeRunner, GuardApprover};
use crate::fs::{FileSystem, InMemoryFs};
use crate::interpreter::errors::MlldError;
use crate::interpreter::evaluator::Evaluator;
use crate::interpreter::fs_bridge::SyncFsAdapter;
use crate::interpreter::types::{
    EvaluationResult, ExecutionLimits, HostInterfaces, InterpreterState, ModuleResolver,
};
use crate::pipeline::events::EventSink;
use crate::policy::{Keychain, PolicyEnforcer};

/// Options for creating a session.
#[derive(Default)]
pub struct SessionOptions {
    /// Working directory (defaults to `/`)
    pub cwd: Option<String>,
    /// Filesystem backend (defaults to an in-memory fs)
    pub fs: Option<Arc<dyn FileSystem>>,
    /// Execution limits
    pub limits: Option<ExecutionLimits>,
    /// Command validation configuration
    pub safety: Option<CommandSafety>,
    /// Label-flow policy (defaults to the standard rules)
    pub policy: Option<PolicyEnforcer>,
    /// Environment variables seeded into the root scope
    pub env: Option<HashMap<String, String>>,
}

/// The interpreter session: state persists across `evaluate` calls.
pub struct Session {
    pub fs: Arc<dyn FileSystem>,
    limits: ExecutionLimits,
    hosts: HostInterfaces,
    state: InterpreterState,
}

impl Session {
    pub async fn new(options: SessionOptions) -> Self {
        let cwd = options.cwd.unwrap_or_else(|| "/".to_string());
        let fs: Arc<dyn FileSystem> = options.fs.unwrap_or_else(|| Arc::new(InMemoryFs::new()));
        let limits = options.limits.unwrap_or_default();

        let mut state = InterpreterState::new();
        state.cwd = cwd.clone();
        state.path_context.invocation_directory = cwd.clone();
        state.path_context.file_directory = cwd;
        state.policy = options
            .policy
            .unwrap_or_else(PolicyEnforcer::with_default_rules);

        let mut hosts = HostInterfaces::default();
        if let Some(safety) = options.safety {
            hosts.safety = safety;
        }

        let mut session = Self {
            fs,
            limits,
            hosts,
            state,
        };

        if let Some(env) = options.env {
            let root = session.root_env();
            for (name, value) in env {
                let mut var = VariableFactory::simple_text(
                    &name,
                    value,
                    crate::env::variable::VariableSource::directive("env", "seed"),
                );
                var.internal.is_system = true;
                // Seeded names may collide across sessions; last one wins.
                session
                    .state
                    .arena
                    .frame_mut(root)
                    .variables
                    .insert(name, var);
            }
        }

        session
    }

    /// Evaluate a document. The engine runs synchronously under
    /// `block_in_place`; async hosts are bridged per call.
    pub async fn evaluate(&mut self, document: &Node) -> Result<EvaluationResult, MlldError> {
        let fs = self.fs.clone();
        let limits = self.limits.clone();
        let mut hosts = self.hosts.clone();
        let state = &mut self.state;

        tokio::task::block_in_place(move || {
            let handle = tokio::runtime::Handle::current();
            hosts.fs = Some(Arc::new(SyncFsAdapter::new(fs, handle)));
            let evaluator = Evaluator::new(&limits, &hosts);
            evaluator.evaluate_document(state, document)
        })
    }

    fn root_env(&mut self) -> EnvId {
        if self.state.arena.is_empty() {
            self.state.arena.new_root()
        } else {
            EnvId(0)
        }
    }

    /// Define a variable in the root scope (host-seeded bindings).
    pub fn define_variable(&mut self, variable: Variable) -> Result<(), MlldError> {
        let root = self.root_env();
        self.state.arena.define(root, variable)
    }

    /// Register a builtin transformer executable.
    pub fn define_builtin(
        &mut self,
        name: &str,
        params: Vec<String>,
        implementation: TransformerImpl,
        keychain_function: Option<KeychainFunction>,
    ) -> Result<(), MlldError> {
        let variable = VariableFactory::builtin_transformer(
            name,
            params,
            implementation,
            keychain_function,
        );
        self.define_variable(variable)
    }

    pub fn set_command_executor(&mut self, executor: Arc<dyn CommandExecutor>) {
        self.hosts.command = Some(executor);
    }

    pub fn set_code_runner(&mut self, runner: Arc<dyn CodeRunner>) {
        self.hosts.code = Some(runner);
    }

    pub fn set_provider(&mut self, name: &str, provider: Arc<dyn CommandProvider>) {
        self.hosts.providers.insert(name.to_string(), provider);
    }

    pub fn set_keychain(&mut self, keychain: Arc<dyn Keychain>) {
        self.hosts.keychain = Some(keychain);
    }

    pub fn set_guard_approver(&mut self, approver: Arc<dyn GuardApprover>) {
        self.hosts.approver = Some(approver);
    }

    pub fn set_module_resolver(&mut self, resolver: Arc<dyn ModuleResolver>) {
        self.hosts.modules = Some(resolver);
    }

    /// Subscribe a sink to pipeline lifecycle events.
    pub fn subscribe_events(&mut self, sink: Arc<dyn EventSink>) {
        self.hosts.bus.subscribe(sink);
    }

    /// Interpreter state, for inspection.
    pub fn state(&self) -> &InterpreterState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::*;
    use crate::interpreter::test_support::{
        const_transformer, scripted_transformer, upper_transformer,
    };
    use crate::pipeline::events::{CollectingSink, PipelineEventType};
    use crate::values::SecurityDescriptor;
    use serde_json::json;

    fn var_directive(name: &str, value: Expr) -> Node {
        Node::Directive(DirectiveNode::new(DirectiveKind::Var(VarDirective {
            name: name.to_string(),
            value,
            pipeline: None,
        })))
    }

    fn lookup_text(session: &Session, name: &str) -> String {
        session
            .state()
            .arena
            .lookup(EnvId(0), name)
            .unwrap()
            .to_structured()
            .text
    }

    async fn new_session() -> Session {
        Session::new(SessionOptions::default()).await
    }

    // When block first-match: {false}, {true}, {none} over a marker.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_when_block_first_match() {
        let mut session = new_session().await;

        let augment = |suffix: &str| {
            Node::Augment(AugmentedAssignment {
                name: "marker".to_string(),
                op: AugmentOp::Append,
                value: Expr::string(suffix),
            })
        };
        let doc = Node::Document(vec![
            var_directive("marker", Expr::string("seed")),
            Node::Directive(DirectiveNode::new(DirectiveKind::When(WhenNode {
                form: WhenForm::Block,
                modifier: None,
                branches: vec![
                    WhenBranch {
                        condition: WhenCondition::Expr(Expr::bool(false)),
                        actions: vec![augment("-false")],
                    },
                    WhenBranch {
                        condition: WhenCondition::Expr(Expr::bool(true)),
                        actions: vec![augment("-true")],
                    },
                    WhenBranch {
                        condition: WhenCondition::None,
                        actions: vec![augment("-none")],
                    },
                ],
            }))),
        ]);

        let result = session.evaluate(&doc).await.unwrap();
        assert_eq!(lookup_text(&session, "marker"), "seed-true");
        // The when block itself produced no document output.
        assert_eq!(result.document, "");
    }

    // Exe return-control propagation through when -> if -> return.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_exe_return_control() {
        let mut session = new_session().await;

        let block = ExeBlockNode {
            statements: vec![
                Node::Directive(DirectiveNode::new(DirectiveKind::When(WhenNode {
                    form: WhenForm::Block,
                    modifier: None,
                    branches: vec![WhenBranch {
                        condition: WhenCondition::Expr(Expr::bool(true)),
                        actions: vec![Node::Directive(DirectiveNode::new(DirectiveKind::If(
                            IfNode {
                                condition: Expr::bool(true),
                                then_branch: vec![Node::Return(ExeReturnNode {
                                    value: Some(Expr::string("done")),
                                })],
                                else_branch: None,
                                has_return: true,
                            },
                        )))],
                    }],
                }))),
                Node::Augment(AugmentedAssignment {
                    name: "marker".to_string(),
                    op: AugmentOp::Append,
                    value: Expr::string("-after"),
                }),
            ],
        };

        let doc = Node::Document(vec![
            var_directive("marker", Expr::string("seed")),
            Node::Directive(DirectiveNode::new(DirectiveKind::Exe(ExeDirective {
                name: "job".to_string(),
                params: vec![],
                body: ExeBody::Block(block),
            }))),
            var_directive(
                "result",
                Expr::ExecInvocation(ExecInvocationNode::new("job", vec![])),
            ),
        ]);

        session.evaluate(&doc).await.unwrap();
        assert_eq!(lookup_text(&session, "result"), "done");
        assert_eq!(lookup_text(&session, "marker"), "seed");
    }

    // Pipeline retry to source: flaky() answers "bad" then "ok"; a guard on
    // the checking stage retries until the source produces "ok".
    #[tokio::test(flavor = "multi_thread")]
    async fn test_pipeline_retry_to_source() {
        let mut session = new_session().await;
        session
            .define_builtin("flaky", vec![], scripted_transformer(vec!["bad", "ok"]), None)
            .unwrap();

        let events = CollectingSink::new();
        session.subscribe_events(events.clone());

        let retry_condition = Expr::Binary {
            op: BinaryOp::And,
            lhs: Box::new(Expr::Binary {
                op: BinaryOp::Ne,
                lhs: Box::new(Expr::var("output")),
                rhs: Box::new(Expr::string("ok")),
            }),
            rhs: Box::new(Expr::Binary {
                op: BinaryOp::Lt,
                lhs: Box::new(Expr::VariableReference {
                    name: "ctx".to_string(),
                    fields: vec![
                        FieldAccess::Field("guard".to_string()),
                        FieldAccess::Field("try".to_string()),
                    ],
                    syntax: RefSyntax::VarIdentifier,
                }),
                rhs: Box::new(Expr::number(3)),
            }),
        };

        let doc = Node::Document(vec![
            // exe check(x) = ::@x::  (identity)
            Node::Directive(DirectiveNode::new(DirectiveKind::Exe(ExeDirective {
                name: "check".to_string(),
                params: vec!["x".to_string()],
                body: ExeBody::Template(vec![TemplateSegment::var("x")]),
            }))),
            // guard @needOk for exe = when [ cond -> retry "need ok", * -> allow ]
            Node::Directive(DirectiveNode::new(DirectiveKind::Guard(GuardDirective {
                name: "needOk".to_string(),
                scope: GuardScopeNode::PerOperation,
                op_kinds: vec!["exe".to_string()],
                labels: vec![],
                rules: vec![
                    GuardRuleNode {
                        condition: Some(retry_condition),
                        action: GuardActionNode::Retry {
                            hint: Some(Expr::string("need ok")),
                        },
                    },
                    GuardRuleNode {
                        condition: None,
                        action: GuardActionNode::Allow,
                    },
                ],
            }))),
            // var result = @flaky() | @check
            var_directive(
                "result",
                Expr::ExecInvocation(ExecInvocationNode {
                    name: "flaky".to_string(),
                    args: vec![],
                    with_clause: Some(WithClause {
                        pipeline: Some(vec![PipelineStage::Single(PipelineStageEntry::new(
                            "check",
                        ))]),
                        ..Default::default()
                    }),
                }),
            ),
        ]);

        session.evaluate(&doc).await.unwrap();
        assert_eq!(lookup_text(&session, "result"), "ok");

        // The stream begins with PIPELINE_START and ends with
        // PIPELINE_COMPLETE; a STAGE_FAILURE marks the retry.
        let types = events.types();
        assert_eq!(types.first(), Some(&PipelineEventType::PipelineStart));
        assert_eq!(types.last(), Some(&PipelineEventType::PipelineComplete));
        assert!(types.contains(&PipelineEventType::StageFailure));
    }

    // Parallel stage ordering: branch outputs keep declaration order.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_parallel_stage_ordering() {
        let mut session = new_session().await;
        session
            .define_builtin("seed", vec![], const_transformer("x"), None)
            .unwrap();
        session
            .define_builtin("a", vec![], const_transformer("A"), None)
            .unwrap();
        session
            .define_builtin("b", vec![], const_transformer("B"), None)
            .unwrap();
        session
            .define_builtin("c", vec![], const_transformer("C"), None)
            .unwrap();

        let doc = Node::Document(vec![var_directive(
            "result",
            Expr::ExecInvocation(ExecInvocationNode {
                name: "seed".to_string(),
                args: vec![],
                with_clause: Some(WithClause {
                    pipeline: Some(vec![PipelineStage::Parallel(vec![
                        PipelineStageEntry::new("a"),
                        PipelineStageEntry::new("b"),
                        PipelineStageEntry::new("c"),
                    ])]),
                    ..Default::default()
                }),
            }),
        )]);

        session.evaluate(&doc).await.unwrap();
        let typed = session
            .state()
            .arena
            .lookup(EnvId(0), "result")
            .unwrap()
            .to_structured()
            .typed;
        assert_eq!(typed, json!(["A", "B", "C"]));
    }

    // Guarded secret display: the denial reason renders, the secret does
    // not.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_guarded_secret_display() {
        let mut session = new_session().await;

        let mut api_key = VariableFactory::simple_text(
            "apiKey",
            "sk-live-123",
            crate::env::variable::VariableSource::directive("var", "quoted"),
        );
        api_key.mx = SecurityDescriptor::with_label("secret");
        session.define_variable(api_key).unwrap();

        let doc = Node::Document(vec![
            Node::Directive(DirectiveNode::new(DirectiveKind::Guard(GuardDirective {
                name: "noSecrets".to_string(),
                scope: GuardScopeNode::PerOperation,
                op_kinds: vec!["exe".to_string()],
                labels: vec![],
                rules: vec![GuardRuleNode {
                    condition: None,
                    action: GuardActionNode::Deny {
                        message: Some(Expr::string("Secrets cannot be displayed")),
                    },
                }],
            }))),
            // exe renderSecret(key) = when [ denied -> show "Blocked: @ctx.guard.reason" ]
            Node::Directive(DirectiveNode::new(DirectiveKind::Exe(ExeDirective {
                name: "renderSecret".to_string(),
                params: vec!["key".to_string()],
                body: ExeBody::When(WhenNode {
                    form: WhenForm::Block,
                    modifier: None,
                    branches: vec![WhenBranch {
                        condition: WhenCondition::Denied,
                        actions: vec![Node::Directive(DirectiveNode::new(DirectiveKind::Show(
                            ShowDirective {
                                value: Expr::Template(vec![
                                    TemplateSegment::text("Blocked: "),
                                    TemplateSegment::Variable {
                                        name: "ctx".to_string(),
                                        fields: vec![
                                            FieldAccess::Field("guard".to_string()),
                                            FieldAccess::Field("reason".to_string()),
                                        ],
                                    },
                                ]),
                                pipeline: None,
                            },
                        )))],
                    }],
                }),
            }))),
            Node::Expression(Expr::ExecInvocation(ExecInvocationNode::new(
                "renderSecret",
                vec![Expr::var("apiKey")],
            ))),
        ]);

        let result = session.evaluate(&doc).await.unwrap();
        assert!(result
            .document
            .contains("Blocked: Secrets cannot be displayed"));
        assert!(!result.document.contains("sk-live-123"));
    }

    // Parallel-for isolation: outer mutation fails with the stable error;
    // an inner binding mutates fine.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_parallel_for_isolation() {
        let mut session = new_session().await;
        let doc = Node::Document(vec![
            var_directive("shared", Expr::string("seed")),
            Node::Directive(DirectiveNode::new(DirectiveKind::For(ForNode {
                variable: "x".to_string(),
                iterable: Expr::Literal(json!([1])),
                body: ForBody::Block(vec![Node::Augment(AugmentedAssignment {
                    name: "shared".to_string(),
                    op: AugmentOp::Append,
                    value: Expr::string("-inner"),
                })]),
                parallel: true,
            }))),
        ]);

        let err = session.evaluate(&doc).await.unwrap_err();
        assert_eq!(
            err.root().to_string(),
            "Parallel for block cannot mutate outer variable @shared."
        );
    }

    // exe @id(x) = ::@x:: ; @id("hello") == "hello"
    #[tokio::test(flavor = "multi_thread")]
    async fn test_identity_executable_law() {
        let mut session = new_session().await;
        let doc = Node::Document(vec![
            Node::Directive(DirectiveNode::new(DirectiveKind::Exe(ExeDirective {
                name: "id".to_string(),
                params: vec!["x".to_string()],
                body: ExeBody::Template(vec![TemplateSegment::var("x")]),
            }))),
            var_directive(
                "result",
                Expr::ExecInvocation(ExecInvocationNode::new("id", vec![Expr::string("hello")])),
            ),
        ]);

        session.evaluate(&doc).await.unwrap();
        assert_eq!(lookup_text(&session, "result"), "hello");
    }

    // Circular command references fail with the chain spelled out.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_circular_command_reference() {
        let mut session = new_session().await;
        let doc = Node::Document(vec![
            Node::Directive(DirectiveNode::new(DirectiveKind::Exe(ExeDirective {
                name: "a".to_string(),
                params: vec![],
                body: ExeBody::CommandRef {
                    target: "b".to_string(),
                    args: vec![],
                },
            }))),
            Node::Directive(DirectiveNode::new(DirectiveKind::Exe(ExeDirective {
                name: "b".to_string(),
                params: vec![],
                body: ExeBody::CommandRef {
                    target: "a".to_string(),
                    args: vec![],
                },
            }))),
            var_directive(
                "result",
                Expr::ExecInvocation(ExecInvocationNode::new("a", vec![])),
            ),
        ]);

        let err = session.evaluate(&doc).await.unwrap_err();
        assert_eq!(
            err.root().to_string(),
            "Circular command reference detected: a -> b -> a"
        );
    }

    // output to file writes through the fs boundary with nested dirs.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_output_to_file_and_env() {
        let mut session = new_session().await;
        let doc = Node::Document(vec![
            var_directive("greeting", Expr::string("hello")),
            Node::Directive(DirectiveNode::new(DirectiveKind::Output(OutputDirective {
                value: Expr::var("greeting"),
                sink: OutputSink::File(vec![TemplateSegment::text("/out/deep/greeting.txt")]),
                format: None,
            }))),
            Node::Directive(DirectiveNode::new(DirectiveKind::Output(OutputDirective {
                value: Expr::var("greeting"),
                sink: OutputSink::Env(None),
                format: None,
            }))),
        ]);

        let result = session.evaluate(&doc).await.unwrap();
        assert_eq!(
            session.fs.read_file("/out/deep/greeting.txt").await.unwrap(),
            "hello"
        );
        assert_eq!(result.env_vars.get("MLLD_GREETING").unwrap(), "hello");
    }

    // Reading a file and writing it back yields byte-identical content.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_file_roundtrip_is_byte_identical() {
        let fs = Arc::new(InMemoryFs::with_files([(
            "/docs/source.md",
            "# Title\n\nbody text\n",
        )]));
        let mut session = Session::new(SessionOptions {
            fs: Some(fs.clone()),
            ..Default::default()
        })
        .await;

        let doc = Node::Document(vec![
            var_directive(
                "content",
                Expr::LoadContent(LoadContentExpr {
                    path: vec![TemplateSegment::text("/docs/source.md")],
                    section: None,
                    as_section: None,
                    glob: false,
                }),
            ),
            Node::Directive(DirectiveNode::new(DirectiveKind::Output(OutputDirective {
                value: Expr::var("content"),
                sink: OutputSink::File(vec![TemplateSegment::text("/docs/copy.md")]),
                format: None,
            }))),
        ]);

        session.evaluate(&doc).await.unwrap();
        assert_eq!(
            fs.read_sync("/docs/copy.md").unwrap(),
            "# Title\n\nbody text\n"
        );
    }

    // A with-clause `using:` provider receives the command and vars.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_provider_selected_by_using_clause() {
        use crate::exec::{CommandOutcome, CommandProvider, ProviderRequest};
        use std::sync::Mutex;

        #[derive(Default)]
        struct RecordingProvider {
            requests: Mutex<Vec<ProviderRequest>>,
        }
        impl CommandProvider for RecordingProvider {
            fn run(&self, request: &ProviderRequest) -> Result<CommandOutcome, MlldError> {
                self.requests.lock().unwrap().push(request.clone());
                Ok(CommandOutcome {
                    output: "from-provider\n".to_string(),
                    ..Default::default()
                })
            }
        }

        let mut session = new_session().await;
        let provider = Arc::new(RecordingProvider::default());
        session.set_provider("sandbox", provider.clone());

        let doc = Node::Document(vec![
            Node::Directive(DirectiveNode::new(DirectiveKind::Exe(ExeDirective {
                name: "fetch".to_string(),
                params: vec!["target".to_string()],
                body: ExeBody::Command(CommandExpr {
                    segments: vec![
                        TemplateSegment::text("fetch "),
                        TemplateSegment::var("target"),
                    ],
                }),
            }))),
            var_directive(
                "result",
                Expr::ExecInvocation(ExecInvocationNode {
                    name: "fetch".to_string(),
                    args: vec![Expr::string("thing")],
                    with_clause: Some(WithClause {
                        using: Some("sandbox".to_string()),
                        ..Default::default()
                    }),
                }),
            ),
        ]);

        session.evaluate(&doc).await.unwrap();
        assert_eq!(lookup_text(&session, "result"), "from-provider");

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].command, "fetch thing");
        assert_eq!(requests[0].vars.get("target").unwrap(), "thing");
    }

    // Keychain get taints the value as secret material.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_keychain_get_taints_secret() {
        use crate::env::variable::KeychainFunction;
        use crate::env::variable::TransformerImpl;
        use crate::policy::Keychain;

        struct OneEntryKeychain;
        impl Keychain for OneEntryKeychain {
            fn get(&self, service: &str, account: &str) -> Result<Option<String>, MlldError> {
                if service == "api" && account == "deploy" {
                    Ok(Some("tok-9".to_string()))
                } else {
                    Ok(None)
                }
            }
            fn set(&self, _: &str, _: &str, _: &str) -> Result<(), MlldError> {
                Ok(())
            }
            fn delete(&self, _: &str, _: &str) -> Result<(), MlldError> {
                Ok(())
            }
        }

        let mut session = new_session().await;
        session.set_keychain(Arc::new(OneEntryKeychain));
        session
            .define_builtin(
                "keyGet",
                vec!["service".to_string(), "account".to_string()],
                TransformerImpl::new(|_| unreachable!("gated by the keychain path")),
                Some(KeychainFunction::Get),
            )
            .unwrap();

        let doc = Node::Document(vec![var_directive(
            "token",
            Expr::ExecInvocation(ExecInvocationNode::new(
                "keyGet",
                vec![Expr::string("api"), Expr::string("deploy")],
            )),
        )]);
        session.evaluate(&doc).await.unwrap();

        let token = session
            .state()
            .arena
            .lookup(EnvId(0), "token")
            .unwrap()
            .to_structured();
        assert_eq!(token.text, "tok-9");
        assert!(token.descriptor.has_label("secret"));
        assert!(token.descriptor.has_taint("src:keychain"));
    }

    // Upper transformer through a single-stage pipeline.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_single_stage_pipeline_transform() {
        let mut session = new_session().await;
        session
            .define_builtin("seed", vec![], const_transformer("hello"), None)
            .unwrap();
        session
            .define_builtin("upper", vec!["x".to_string()], upper_transformer(), None)
            .unwrap();

        let doc = Node::Document(vec![var_directive(
            "result",
            Expr::ExecInvocation(ExecInvocationNode {
                name: "seed".to_string(),
                args: vec![],
                with_clause: Some(WithClause {
                    pipeline: Some(vec![PipelineStage::Single(PipelineStageEntry::new(
                        "upper",
                    ))]),
                    ..Default::default()
                }),
            }),
        )]);

        session.evaluate(&doc).await.unwrap();
        assert_eq!(lookup_text(&session, "result"), "HELLO");
    }
}
