//! Abstract Syntax Tree definitions for the js2esi source language

use crate::utils::Span;

/// A complete program (compilation unit)
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

/// Identifier
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self { name: name.into(), span }
    }
}

// ==================== Statements ====================

/// Function declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    /// Declared with a leading `"inline";` pragma (or `function inline f()`)
    pub inline: bool,
    pub span: Span,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub default: Option<Literal>,
    pub span: Span,
}

/// One `cond { body }` arm of an if/else-if chain
#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub cond: Expr,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// `if .. else if .. else ..`; the first true branch wins
#[derive(Debug, Clone, PartialEq)]
pub struct IfChain {
    pub branches: Vec<IfBranch>,
    pub else_body: Option<Vec<Stmt>>,
    pub span: Span,
}

/// `for ([let] x of collection) body`
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    /// Iteration variable; `item` when omitted
    pub var: Option<Ident>,
    pub collection: Expr,
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl ForLoop {
    pub const DEFAULT_VAR: &'static str = "item";

    pub fn var_name(&self) -> &str {
        self.var.as_ref().map_or(Self::DEFAULT_VAR, |v| v.name.as_str())
    }
}

/// `try { attempt } catch (e) { except }`
#[derive(Debug, Clone, PartialEq)]
pub struct TryStmt {
    pub attempt: Vec<Stmt>,
    /// `None` when the source had no handler
    pub except: Option<Vec<Stmt>>,
    pub span: Span,
}

/// `require('path'[, force=true])`
#[derive(Debug, Clone, PartialEq)]
pub struct RequireStmt {
    pub path: String,
    pub force: bool,
    pub span: Span,
}

/// Recognized `include`/`eval` option names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncludeKey {
    Src,
    Alt,
    Dca,
    OnError,
    MaxWait,
    Ttl,
    NoStore,
    Method,
    Entity,
    AppendHeader,
    RemoveHeader,
    SetHeader,
}

impl IncludeKey {
    pub const ALL: [IncludeKey; 12] = [
        IncludeKey::Src,
        IncludeKey::Alt,
        IncludeKey::Dca,
        IncludeKey::OnError,
        IncludeKey::MaxWait,
        IncludeKey::Ttl,
        IncludeKey::NoStore,
        IncludeKey::Method,
        IncludeKey::Entity,
        IncludeKey::AppendHeader,
        IncludeKey::RemoveHeader,
        IncludeKey::SetHeader,
    ];

    /// Option name as written in source
    pub fn source_name(&self) -> &'static str {
        match self {
            IncludeKey::Src => "src",
            IncludeKey::Alt => "alt",
            IncludeKey::Dca => "dca",
            IncludeKey::OnError => "onError",
            IncludeKey::MaxWait => "maxWait",
            IncludeKey::Ttl => "ttl",
            IncludeKey::NoStore => "noStore",
            IncludeKey::Method => "method",
            IncludeKey::Entity => "entity",
            IncludeKey::AppendHeader => "appendHeader",
            IncludeKey::RemoveHeader => "removeHeader",
            IncludeKey::SetHeader => "setHeader",
        }
    }

    /// Attribute name in the generated tag
    pub fn attribute(&self) -> &'static str {
        match self {
            IncludeKey::Src => "src",
            IncludeKey::Alt => "alt",
            IncludeKey::Dca => "dca",
            IncludeKey::OnError => "onerror",
            IncludeKey::MaxWait => "maxwait",
            IncludeKey::Ttl => "ttl",
            IncludeKey::NoStore => "no-store",
            IncludeKey::Method => "method",
            IncludeKey::Entity => "entity",
            IncludeKey::AppendHeader => "appendheader",
            IncludeKey::RemoveHeader => "removeheader",
            IncludeKey::SetHeader => "setheader",
        }
    }

    /// Header options may repeat, one attribute per value
    pub fn is_header(&self) -> bool {
        matches!(
            self,
            IncludeKey::AppendHeader | IncludeKey::RemoveHeader | IncludeKey::SetHeader
        )
    }

    pub fn from_name(name: &str) -> Option<IncludeKey> {
        Self::ALL.iter().copied().find(|k| k.source_name() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncludeOption {
    pub key: IncludeKey,
    pub value: Expr,
    pub span: Span,
}

/// `include(...)` / `eval(...)` call; options keep source order
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeStmt {
    pub options: Vec<IncludeOption>,
    pub span: Span,
}

impl IncludeStmt {
    pub fn get(&self, key: IncludeKey) -> Option<&IncludeOption> {
        self.options.iter().find(|o| o.key == key)
    }
}

/// Which output built-in produced an `Output` statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// print(...)
    Print,
    /// printv(...): wrapped in `<esi:vars>`
    PrintVars,
    /// printraw(...): literal text, verbatim
    PrintRaw,
}

impl OutputKind {
    pub fn from_name(name: &str) -> Option<OutputKind> {
        match name {
            "print" => Some(OutputKind::Print),
            "printv" => Some(OutputKind::PrintVars),
            "printraw" => Some(OutputKind::PrintRaw),
            _ => None,
        }
    }
}

/// Statements
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Function(FunctionDecl),
    /// `let`/`var`/`const` declaration
    VarDecl {
        name: Ident,
        value: Option<Expr>,
        span: Span,
    },
    /// `name = value` or `name[key] = value`
    Assign {
        target: Ident,
        key: Option<Expr>,
        value: Expr,
        span: Span,
    },
    Expr(Expr),
    If(IfChain),
    For(ForLoop),
    Break(Span),
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Try(TryStmt),
    Require(RequireStmt),
    Include(IncludeStmt),
    Eval(IncludeStmt),
    Output {
        kind: OutputKind,
        args: Vec<Expr>,
        span: Span,
    },
    /// Bare `{ ... }` block
    Block {
        body: Vec<Stmt>,
        span: Span,
    },
    /// `//###` comment carried into the output
    Comment {
        text: String,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Function(f) => f.span,
            Stmt::VarDecl { span, .. } => *span,
            Stmt::Assign { span, .. } => *span,
            Stmt::Expr(e) => e.span(),
            Stmt::If(chain) => chain.span,
            Stmt::For(l) => l.span,
            Stmt::Break(span) => *span,
            Stmt::Return { span, .. } => *span,
            Stmt::Try(t) => t.span,
            Stmt::Require(r) => r.span,
            Stmt::Include(i) | Stmt::Eval(i) => i.span,
            Stmt::Output { span, .. } => *span,
            Stmt::Block { span, .. } => *span,
            Stmt::Comment { span, .. } => *span,
        }
    }
}

// ==================== Expressions ====================

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    /// Operator text in both the source and the ESI expression syntax
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Negation (-)
    Neg,
    /// Logical not (!)
    Not,
    /// Bitwise not (~)
    BitNot,
}

impl UnOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
        }
    }
}

/// `matches` is a regular expression test, `has` a substring test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Matches,
    Has,
}

/// `subject matches[_i] pattern [as name]`, `subject has[_i] pattern`
#[derive(Debug, Clone, PartialEq)]
pub struct MatchExpr {
    pub subject: Box<Expr>,
    pub op: MatchOp,
    pub case_insensitive: bool,
    pub pattern: Box<Expr>,
    /// Name bound to the captured groups; only valid for `matches`
    pub capture: Option<Ident>,
    pub span: Span,
}

impl MatchExpr {
    /// Operator keyword as written in source and in ESI
    pub fn keyword(&self) -> &'static str {
        match (self.op, self.case_insensitive) {
            (MatchOp::Matches, false) => "matches",
            (MatchOp::Matches, true) => "matches_i",
            (MatchOp::Has, false) => "has",
            (MatchOp::Has, true) => "has_i",
        }
    }
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Ident(Ident),
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
        span: Span,
    },
    Match(MatchExpr),
    Call {
        callee: Ident,
        args: Vec<Expr>,
        span: Span,
    },
    /// `target[index]`
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    /// `[start..end]`, both bounds inclusive
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        span: Span,
    },
    Array {
        elements: Vec<Expr>,
        span: Span,
    },
    Dict {
        entries: Vec<(Expr, Expr)>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(lit) => lit.span(),
            Expr::Ident(ident) => ident.span,
            Expr::Binary { span, .. } => *span,
            Expr::Unary { span, .. } => *span,
            Expr::Match(m) => m.span,
            Expr::Call { span, .. } => *span,
            Expr::Index { span, .. } => *span,
            Expr::Range { span, .. } => *span,
            Expr::Array { span, .. } => *span,
            Expr::Dict { span, .. } => *span,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expr::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// True for nodes rendered with an infix or prefix operator
    pub fn is_operator(&self) -> bool {
        matches!(self, Expr::Binary { .. } | Expr::Unary { .. } | Expr::Match(_))
    }
}

/// Literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64, Span),
    String(String, Span),
    Bool(bool, Span),
}

impl Literal {
    pub fn span(&self) -> Span {
        match self {
            Literal::Int(_, s) => *s,
            Literal::String(_, s) => *s,
            Literal::Bool(_, s) => *s,
        }
    }

    /// Statically known truthiness; strings are left to the target
    pub fn truthiness(&self) -> Option<bool> {
        match self {
            Literal::Int(n, _) => Some(*n != 0),
            Literal::Bool(b, _) => Some(*b),
            Literal::String(..) => None,
        }
    }

    pub fn with_span(self, span: Span) -> Literal {
        match self {
            Literal::Int(n, _) => Literal::Int(n, span),
            Literal::String(s, _) => Literal::String(s, span),
            Literal::Bool(b, _) => Literal::Bool(b, span),
        }
    }
}
