//! Abstract Syntax Tree (AST) Types
//!
//! The node shapes delivered by the grammar/parser (an external collaborator)
//! and consumed by the evaluator. The parser is not implemented here; tests
//! construct these nodes directly.

use serde_json::Value;

// =============================================================================
// BASE TYPES
// =============================================================================

/// Position information for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

// =============================================================================
// DOCUMENT & STATEMENTS
// =============================================================================

/// Union of all top-level and block-level nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Root node: a complete source document
    Document(Vec<Node>),
    /// A directive statement (`var`, `exe`, `show`, ...)
    Directive(DirectiveNode),
    /// Prose text, rendered into the output document verbatim
    Text(String),
    /// Blank line between prose blocks
    Newline,
    /// Comment, skipped by evaluation
    Comment(String),
    /// Document frontmatter, skipped by evaluation
    Frontmatter(String),
    /// Fenced code block, rendered verbatim
    CodeFence { language: Option<String>, body: String },
    /// Fenced block whose body is evaluated as directives
    MlldRunBlock(Vec<Node>),
    /// Block-scoped binding, shadowing allowed
    Let(LetAssignment),
    /// Augmented assignment (`@x += expr`)
    Augment(AugmentedAssignment),
    /// Return from the enclosing exe block
    Return(ExeReturnNode),
    /// Bare expression statement (e.g. an invocation for its effects)
    Expression(Expr),
    /// Forward-compat node kinds the parser may deliver; the dispatcher
    /// verifies and rejects them with a stable error
    Unknown { kind: String },
}

impl Node {
    /// Human-readable node kind for dispatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Document(_) => "Document",
            Node::Directive(d) => d.kind.kind_name(),
            Node::Text(_) => "Text",
            Node::Newline => "Newline",
            Node::Comment(_) => "Comment",
            Node::Frontmatter(_) => "Frontmatter",
            Node::CodeFence { .. } => "CodeFence",
            Node::MlldRunBlock(_) => "MlldRunBlock",
            Node::Let(_) => "LetAssignment",
            Node::Augment(_) => "AugmentedAssignment",
            Node::Return(_) => "ExeReturn",
            Node::Expression(_) => "Expression",
            Node::Unknown { .. } => "Unknown",
        }
    }
}

/// A directive with optional source position.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveNode {
    pub kind: DirectiveKind,
    pub pos: Option<Position>,
}

impl DirectiveNode {
    pub fn new(kind: DirectiveKind) -> Self {
        Self { kind, pos: None }
    }

    pub fn at(kind: DirectiveKind, pos: Position) -> Self {
        Self { kind, pos: Some(pos) }
    }
}

/// Union of all directive kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveKind {
    Var(VarDirective),
    Exe(ExeDirective),
    Show(ShowDirective),
    Run(RunDirective),
    Output(OutputDirective),
    When(WhenNode),
    If(IfNode),
    For(ForNode),
    Foreach(ForeachExpr),
    Loop(LoopNode),
    Import(ImportDirective),
    Export(ExportDirective),
    Guard(GuardDirective),
    Env(EnvDirective),
}

impl DirectiveKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            DirectiveKind::Var(_) => "var",
            DirectiveKind::Exe(_) => "exe",
            DirectiveKind::Show(_) => "show",
            DirectiveKind::Run(_) => "run",
            DirectiveKind::Output(_) => "output",
            DirectiveKind::When(_) => "when",
            DirectiveKind::If(_) => "if",
            DirectiveKind::For(_) => "for",
            DirectiveKind::Foreach(_) => "foreach",
            DirectiveKind::Loop(_) => "loop",
            DirectiveKind::Import(_) => "import",
            DirectiveKind::Export(_) => "export",
            DirectiveKind::Guard(_) => "guard",
            DirectiveKind::Env(_) => "env",
        }
    }
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

/// How a variable reference was written in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefSyntax {
    /// `@name`: direct reference
    VarIdentifier,
    /// `{{name}}`: interpolation inside template contexts
    VarInterpolation,
}

/// Tail access step: `.field`, `.0`, `[index]`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAccess {
    Field(String),
    Index(i64),
}

/// Union of all expression nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal string/number/boolean/null
    Literal(Value),
    /// `@name` or `{{name}}`, with optional field path
    VariableReference {
        name: String,
        fields: Vec<FieldAccess>,
        syntax: RefSyntax,
    },
    /// `@name(args...)` with optional with-clause
    ExecInvocation(ExecInvocationNode),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    /// `::...::` template parts; stored as AST, interpolated on use
    Template(Vec<TemplateSegment>),
    /// `run {...}` command RHS
    Command(CommandExpr),
    /// `js {...}` / `python {...}` / `sh {...}` code RHS
    Code(CodeExpr),
    /// `<path # Section>` load-content RHS
    LoadContent(LoadContentExpr),
    /// Load-content followed by field traversal
    FileReference {
        load: LoadContentExpr,
        fields: Vec<FieldAccess>,
    },
    /// `foreach @f(@xs, @ys)` pointwise application
    Foreach(ForeachExpr),
    /// `when [...]` expression form
    WhenExpression(Box<WhenNode>),
    /// `for @x in xs => expr` expression form
    ForExpression(Box<ForNode>),
    /// Bounded loop expression
    LoopExpression(Box<LoopNode>),
}

impl Expr {
    /// Direct `@name` reference without a field path.
    pub fn var(name: impl Into<String>) -> Self {
        Expr::VariableReference {
            name: name.into(),
            fields: Vec::new(),
            syntax: RefSyntax::VarIdentifier,
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Value::String(s.into()))
    }

    pub fn number(n: i64) -> Self {
        Expr::Literal(Value::from(n))
    }

    pub fn bool(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// One segment of an interpolated template or command line.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSegment {
    Text(String),
    Variable {
        name: String,
        fields: Vec<FieldAccess>,
    },
}

impl TemplateSegment {
    pub fn text(s: impl Into<String>) -> Self {
        TemplateSegment::Text(s.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        TemplateSegment::Variable {
            name: name.into(),
            fields: Vec::new(),
        }
    }
}

/// `run {...}` command template.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandExpr {
    pub segments: Vec<TemplateSegment>,
}

/// `js {...}` code template with its language tag.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeExpr {
    pub language: String,
    pub segments: Vec<TemplateSegment>,
}

/// `<path>`, `<path # Section>`, `<*.md>` load-content expression.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadContentExpr {
    /// Path, interpolated with the shell-safe context
    pub path: Vec<TemplateSegment>,
    /// Extract a named section after loading
    pub section: Option<String>,
    /// Rename the extracted section heading
    pub as_section: Option<String>,
    /// Treat the path as a glob pattern and load every match
    pub glob: bool,
}

// =============================================================================
// EXECUTABLE INVOCATION & PIPELINES
// =============================================================================

/// `@name(args...)` invocation, optionally with a with-clause.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecInvocationNode {
    pub name: String,
    pub args: Vec<Expr>,
    pub with_clause: Option<WithClause>,
}

impl ExecInvocationNode {
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            name: name.into(),
            args,
            with_clause: None,
        }
    }
}

/// Options attached to an invocation or pipeline tail.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WithClause {
    /// `| stage1 | stage2 || parallelA | parallelB` stages
    pub pipeline: Option<Vec<PipelineStage>>,
    /// `asFormat` serialization override
    pub as_format: Option<String>,
    /// Retry hint seed
    pub hint: Option<String>,
    /// External provider name from the `using:` map
    pub using: Option<String>,
}

/// One pipeline stage: a single entry or an ordered parallel group.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStage {
    Single(PipelineStageEntry),
    Parallel(Vec<PipelineStageEntry>),
}

/// Executable reference plus static args for one stage slot.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStageEntry {
    pub name: String,
    pub args: Vec<Expr>,
}

impl PipelineStageEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }
}

// =============================================================================
// DIRECTIVES
// =============================================================================

/// `var @name = RHS`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDirective {
    pub name: String,
    pub value: Expr,
    /// Tail pipeline applied to the RHS value
    pub pipeline: Option<Vec<PipelineStage>>,
}

/// `show <expr>`
#[derive(Debug, Clone, PartialEq)]
pub struct ShowDirective {
    pub value: Expr,
    pub pipeline: Option<Vec<PipelineStage>>,
}

/// `run {command}`
#[derive(Debug, Clone, PartialEq)]
pub struct RunDirective {
    pub command: CommandExpr,
    pub pipeline: Option<Vec<PipelineStage>>,
}

/// `output @v to <sink> [as <format>]`
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDirective {
    pub value: Expr,
    pub sink: OutputSink,
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputSink {
    /// Interpolated file path; nested directories are created
    File(Vec<TemplateSegment>),
    Stdout,
    Stderr,
    /// Environment variable; None defaults to `MLLD_<UPPERCASE>`
    Env(Option<String>),
    /// `@resolver/path` routing
    Resolver(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Text,
}

/// `exe @name(params) = RHS`
#[derive(Debug, Clone, PartialEq)]
pub struct ExeDirective {
    pub name: String,
    pub params: Vec<String>,
    pub body: ExeBody,
}

/// RHS forms of an `exe` definition; each maps to an executable type.
#[derive(Debug, Clone, PartialEq)]
pub enum ExeBody {
    /// `run {...}`: command executable
    Command(CommandExpr),
    /// `js {...}` etc: code executable
    Code(CodeExpr),
    /// `::...::`: template executable
    Template(Vec<TemplateSegment>),
    /// `@other(args)`: command reference
    CommandRef { target: String, args: Vec<Expr> },
    /// `when [...]`: code executable with pseudo-language `mlld-when`
    When(WhenNode),
    /// block: code executable with pseudo-language `mlld-exe-block`
    Block(ExeBlockNode),
    /// prose recipe
    Prose(Vec<TemplateSegment>),
}

/// Statement block evaluated with return-control propagation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExeBlockNode {
    pub statements: Vec<Node>,
}

/// `return <expr>` inside an exe block.
#[derive(Debug, Clone, PartialEq)]
pub struct ExeReturnNode {
    pub value: Option<Expr>,
}

/// `let @name = expr` (block scope, shadowing allowed)
#[derive(Debug, Clone, PartialEq)]
pub struct LetAssignment {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentOp {
    /// `+=`
    Append,
}

/// `@name += expr`
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedAssignment {
    pub name: String,
    pub op: AugmentOp,
    pub value: Expr,
}

// =============================================================================
// CONTROL FLOW
// =============================================================================

/// `when`: simple, match, or block form.
#[derive(Debug, Clone, PartialEq)]
pub struct WhenNode {
    pub form: WhenForm,
    pub modifier: Option<WhenModifier>,
    pub branches: Vec<WhenBranch>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WhenForm {
    /// One condition, one action sequence
    Simple,
    /// Subject expression compared against each branch condition
    Match { subject: Expr },
    /// First-match over a list of branches
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhenModifier {
    /// First match wins (identical to block default)
    First,
    /// Evaluates to the first match
    Any,
    /// All conditions must be truthy before the grouped action runs
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenBranch {
    pub condition: WhenCondition,
    pub actions: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WhenCondition {
    Expr(Expr),
    /// Trailing default; also the default under a denied context
    None,
    /// Fires only under a denied context
    Denied,
}

/// `if <cond> [block] [else block]`
#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub condition: Expr,
    pub then_branch: Vec<Node>,
    pub else_branch: Option<Vec<Node>>,
    /// Marks that the branches may carry an ExeReturn to propagate
    pub has_return: bool,
}

/// `for @x in xs => expr` / `for @x in xs [block]`
#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
    pub variable: String,
    pub iterable: Expr,
    pub body: ForBody,
    pub parallel: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForBody {
    Expr(Box<Expr>),
    Block(Vec<Node>),
}

/// `foreach @f(@xs, @ys)`: pointwise application over aligned collections.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeachExpr {
    pub name: String,
    pub collections: Vec<Expr>,
}

/// Bounded repeat with the iteration visible through `@ctx`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopNode {
    pub count: Expr,
    pub body: Vec<Node>,
}

// =============================================================================
// MODULES & GUARDS
// =============================================================================

/// `import { a, b } from "module"`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDirective {
    pub names: Vec<String>,
    pub source: String,
}

/// `export { a, b }` / `export *`
#[derive(Debug, Clone, PartialEq)]
pub struct ExportDirective {
    pub names: Vec<String>,
    pub wildcard: bool,
}

/// `guard @name for <kind> = when [ rule... ]`
#[derive(Debug, Clone, PartialEq)]
pub struct GuardDirective {
    pub name: String,
    pub scope: GuardScopeNode,
    /// Operation kinds this guard intercepts (`exe`, `output`, `show`, `run`)
    pub op_kinds: Vec<String>,
    /// Labels this guard intercepts (per-input scope)
    pub labels: Vec<String>,
    pub rules: Vec<GuardRuleNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardScopeNode {
    PerInput,
    PerOperation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuardRuleNode {
    /// None for a wildcard rule
    pub condition: Option<Expr>,
    pub action: GuardActionNode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuardActionNode {
    Allow,
    Deny { message: Option<Expr> },
    Retry { hint: Option<Expr> },
    Prompt,
}

/// `env js { a, b }`: capture variables as a shadow environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvDirective {
    pub language: String,
    pub names: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let d = DirectiveNode::new(DirectiveKind::Export(ExportDirective {
            names: vec![],
            wildcard: true,
        }));
        assert_eq!(Node::Directive(d).kind_name(), "export");
        assert_eq!(Node::Newline.kind_name(), "Newline");
        assert_eq!(
            Node::Return(ExeReturnNode { value: None }).kind_name(),
            "ExeReturn"
        );
    }

    #[test]
    fn test_expr_helpers() {
        assert_eq!(
            Expr::var("x"),
            Expr::VariableReference {
                name: "x".to_string(),
                fields: vec![],
                syntax: RefSyntax::VarIdentifier,
            }
        );
        assert_eq!(Expr::string("s"), Expr::Literal(Value::String("s".into())));
        assert_eq!(Expr::number(3), Expr::Literal(Value::from(3)));
    }

    #[test]
    fn test_directive_position() {
        let pos = Position::new(3, 1);
        let d = DirectiveNode::at(
            DirectiveKind::Show(ShowDirective {
                value: Expr::string("hi"),
                pipeline: None,
            }),
            pos,
        );
        assert_eq!(d.pos, Some(pos));
    }
}
