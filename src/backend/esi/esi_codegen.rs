//! ESI Code Generator
//!
//! Translates a lowered program to ESI markup. Expressions are written in one
//! of two syntaxes: the ESI expression language (`test` attributes,
//! assignments, function arguments) and variable-substitution text (printed
//! output and include/eval attributes), where strings are emitted raw and
//! `+` is plain juxtaposition.

use std::collections::HashSet;

use log::{debug, warn};

use super::captures::{self, capture_name};
use crate::backend::codegen::CodeGen;
use crate::config::CompileOptions;
use crate::frontend::ast::*;
use crate::utils::{Error, Result, Span};

/// Comment emitted ahead of the markup when the banner is enabled
pub const WARNING_BANNER: &str = "<esi:comment text=\"---- WARNING: GENERATED ESI ----\"/>";

/// Which syntax an expression is rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// ESI expression language
    Expr,
    /// Text with `$(name)` substitution
    Vars,
}

/// ESI code generator
pub struct EsiCodeGen {
    warning_banner: bool,
    /// Longest list a range literal may expand to
    max_list_len: usize,
    /// Functions still declared after inlining; ESI cannot call them
    opaque_functions: HashSet<String>,
}

impl EsiCodeGen {
    pub fn new() -> Self {
        Self::from_options(&CompileOptions::default())
    }

    pub fn from_options(options: &CompileOptions) -> Self {
        Self {
            warning_banner: options.warning_banner,
            max_list_len: options.max_loop_iterations,
            opaque_functions: HashSet::new(),
        }
    }

    // ==================== Statements ====================

    fn gen_stmts(&self, out: &mut String, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            self.gen_stmt(out, stmt)?;
        }
        Ok(())
    }

    fn gen_stmt(&self, out: &mut String, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Function(func) => {
                if !func.inline {
                    warn!(
                        "function {}() is not inline and produces no markup",
                        func.name.name
                    );
                }
                Ok(())
            }
            Stmt::VarDecl { name, value: Some(value), .. } => self.gen_assign(out, name, None, value),
            Stmt::VarDecl { value: None, .. } => Ok(()),
            Stmt::Assign { target, key, value, .. } => {
                self.gen_assign(out, target, key.as_ref(), value)
            }
            Stmt::Expr(expr) => self.gen_expr_stmt(out, expr),
            Stmt::If(chain) => self.gen_choose(out, chain),
            Stmt::Try(t) => {
                out.push_str("<esi:try><esi:attempt>");
                self.gen_stmts(out, &t.attempt)?;
                out.push_str("</esi:attempt><esi:except>");
                if let Some(except) = &t.except {
                    self.gen_stmts(out, except)?;
                }
                out.push_str("</esi:except></esi:try>");
                Ok(())
            }
            Stmt::Include(inc) => self.gen_include(out, "include", inc),
            Stmt::Eval(inc) => self.gen_include(out, "eval", inc),
            Stmt::Output { kind, args, .. } => self.gen_output(out, *kind, args),
            Stmt::Block { body, .. } => self.gen_stmts(out, body),
            Stmt::Comment { text, .. } => {
                // comment text is never evaluated, so `$dquote()` would show up verbatim
                out.push_str("<esi:comment text=\"");
                out.push_str(&text.replace('"', "&quot;"));
                out.push_str("\"/>");
                Ok(())
            }
            Stmt::For(l) => Err(Error::unsupported("loop survived unrolling", l.span)),
            Stmt::Break(span) => Err(Error::unsupported("`break` outside of an unrolled loop", *span)),
            Stmt::Return { span, .. } => Err(Error::unsupported(
                "`return` outside of an inline function",
                *span,
            )),
            Stmt::Require(r) => Err(Error::unsupported(
                format!("require('{}') was not resolved", r.path),
                r.span,
            )),
        }
    }

    fn gen_assign(&self, out: &mut String, target: &Ident, key: Option<&Expr>, value: &Expr) -> Result<()> {
        out.push_str("<esi:assign name=\"");
        out.push_str(&target.name);
        if let Some(key) = key {
            out.push('{');
            self.gen_expr(out, key, Mode::Expr)?;
            out.push('}');
        }
        out.push('"');

        let mut rendered = String::new();
        self.gen_expr(&mut rendered, value, Mode::Expr)?;
        if rendered.contains('"') || rendered.contains('\n') {
            out.push('>');
            out.push_str(&rendered);
            out.push_str("</esi:assign>");
        } else {
            out.push_str(" value=\"");
            out.push_str(&rendered);
            out.push_str("\"/>");
        }
        Ok(())
    }

    fn gen_expr_stmt(&self, out: &mut String, expr: &Expr) -> Result<()> {
        if let Expr::Call { .. } = expr {
            out.push_str("<esi:vars>");
            self.gen_expr(out, expr, Mode::Expr)?;
            out.push_str("</esi:vars>");
            return Ok(());
        }
        // still rendered so that unsupported calls inside are reported
        let mut discarded = String::new();
        self.gen_expr(&mut discarded, expr, Mode::Expr)?;
        debug!("dropped expression statement `{}`", discarded);
        Ok(())
    }

    fn gen_choose(&self, out: &mut String, chain: &IfChain) -> Result<()> {
        out.push_str("<esi:choose>");
        for branch in &chain.branches {
            let mut test = String::new();
            self.gen_expr(&mut test, &branch.cond, Mode::Expr)?;
            out.push_str("<esi:when");
            push_attribute(out, "test", &test);
            if let Some(name) = capture_name(&branch.cond) {
                push_attribute(out, "matchname", name);
            }
            out.push('>');
            self.gen_stmts(out, &branch.body)?;
            out.push_str("</esi:when>");
        }
        if let Some(body) = &chain.else_body {
            let mut otherwise = String::new();
            self.gen_stmts(&mut otherwise, body)?;
            if !otherwise.is_empty() {
                out.push_str("<esi:otherwise>");
                out.push_str(&otherwise);
                out.push_str("</esi:otherwise>");
            }
        }
        out.push_str("</esi:choose>");
        Ok(())
    }

    fn gen_include(&self, out: &mut String, tag: &str, inc: &IncludeStmt) -> Result<()> {
        out.push_str("<esi:");
        out.push_str(tag);
        for key in IncludeKey::ALL.iter().filter(|k| !k.is_header()) {
            let Some(option) = inc.get(*key) else { continue };
            let mut value = match (key, &option.value) {
                (IncludeKey::NoStore, Expr::Literal(lit)) if lit.truthiness().is_some() => {
                    let on = lit.truthiness() == Some(true);
                    (if on { "on" } else { "off" }).to_string()
                }
                (_, expr) => self.vars_text(expr)?,
            };
            if *key == IncludeKey::Dca && value.contains('>') {
                value = format!("'{}'", value);
            }
            push_attribute(out, key.attribute(), &value);
        }
        for key in IncludeKey::ALL.iter().filter(|k| k.is_header()) {
            let Some(option) = inc.get(*key) else { continue };
            let values = match &option.value {
                Expr::Array { elements, .. } => elements.as_slice(),
                single => std::slice::from_ref(single),
            };
            for value in values {
                let text = self.vars_text(value)?;
                push_attribute(out, key.attribute(), &text);
            }
        }
        out.push_str("/>");
        Ok(())
    }

    fn gen_output(&self, out: &mut String, kind: OutputKind, args: &[Expr]) -> Result<()> {
        match kind {
            OutputKind::PrintRaw => {
                for arg in args {
                    match arg {
                        Expr::Literal(Literal::String(s, _)) => out.push_str(s),
                        Expr::Literal(lit) => gen_literal(out, lit, Mode::Vars),
                        other => {
                            return Err(Error::unsupported(
                                "printraw() only accepts literal values",
                                other.span(),
                            ))
                        }
                    }
                }
            }
            OutputKind::Print => {
                for arg in args {
                    self.gen_expr(out, arg, Mode::Vars)?;
                }
            }
            OutputKind::PrintVars => {
                out.push_str("<esi:vars>");
                for arg in args {
                    self.gen_expr(out, arg, Mode::Vars)?;
                }
                out.push_str("</esi:vars>");
            }
        }
        Ok(())
    }

    // ==================== Expressions ====================

    fn vars_text(&self, expr: &Expr) -> Result<String> {
        let mut text = String::new();
        self.gen_expr(&mut text, expr, Mode::Vars)?;
        Ok(text)
    }

    fn gen_expr(&self, out: &mut String, expr: &Expr, mode: Mode) -> Result<()> {
        match expr {
            Expr::Literal(lit) => {
                gen_literal(out, lit, mode);
                Ok(())
            }
            Expr::Ident(ident) => {
                out.push_str("$(");
                out.push_str(&ident.name);
                out.push(')');
                Ok(())
            }
            Expr::Index { target, index, span } => {
                let Expr::Ident(name) = target.as_ref() else {
                    return Err(Error::unsupported("only a named variable can be indexed", *span));
                };
                out.push_str("$(");
                out.push_str(&name.name);
                out.push('{');
                self.gen_expr(out, index, Mode::Expr)?;
                out.push_str("})");
                Ok(())
            }
            Expr::Binary { left, op: BinOp::Add, right, .. } if mode == Mode::Vars => {
                self.gen_expr(out, left, mode)?;
                self.gen_expr(out, right, mode)
            }
            Expr::Binary { left, op, right, .. } => {
                self.gen_operand(out, left, mode)?;
                out.push_str(op.symbol());
                self.gen_operand(out, right, mode)
            }
            Expr::Unary { op, expr: operand, .. } => {
                out.push_str(op.symbol());
                if operand.is_operator() {
                    out.push('(');
                    self.gen_expr(out, operand, mode)?;
                    out.push(')');
                    Ok(())
                } else {
                    self.gen_operand(out, operand, mode)
                }
            }
            Expr::Match(m) => {
                self.gen_operand(out, &m.subject, mode)?;
                out.push(' ');
                out.push_str(m.keyword());
                out.push(' ');
                self.gen_operand(out, &m.pattern, mode)
            }
            Expr::Call { callee, args, span } => {
                if self.opaque_functions.contains(&callee.name) {
                    return Err(Error::unsupported(
                        format!(
                            "call to {}() which is not an inline function; ESI has no user-defined functions",
                            callee.name
                        ),
                        *span,
                    ));
                }
                out.push('$');
                out.push_str(&callee.name);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.gen_expr(out, arg, Mode::Expr)?;
                }
                out.push(')');
                Ok(())
            }
            Expr::Range { start, end, span } => self.gen_range(out, start, end, *span),
            Expr::Array { elements, .. } => {
                out.push('[');
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.gen_expr(out, element, Mode::Expr)?;
                }
                out.push(']');
                Ok(())
            }
            Expr::Dict { entries, .. } => {
                out.push('{');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.gen_expr(out, key, Mode::Expr)?;
                    out.push(':');
                    self.gen_expr(out, value, Mode::Expr)?;
                }
                out.push('}');
                Ok(())
            }
        }
    }

    /// Operand of an infix operator; nested operators are parenthesised
    fn gen_operand(&self, out: &mut String, expr: &Expr, mode: Mode) -> Result<()> {
        let negative = matches!(expr, Expr::Literal(Literal::Int(n, _)) if *n < 0);
        if (expr.is_operator() && mode == Mode::Expr) || negative {
            out.push('(');
            self.gen_expr(out, expr, mode)?;
            out.push(')');
            Ok(())
        } else {
            self.gen_expr(out, expr, mode)
        }
    }

    /// A range outside of a loop becomes an explicit list
    fn gen_range(&self, out: &mut String, start: &Expr, end: &Expr, span: Span) -> Result<()> {
        let (Some(Literal::Int(first, _)), Some(Literal::Int(last, _))) =
            (start.as_literal(), end.as_literal())
        else {
            return Err(Error::unsupported("range bounds must be integer literals", span));
        };
        let len = last.saturating_sub(*first).saturating_add(1).max(0);
        if usize::try_from(len).map_or(true, |len| len > self.max_list_len) {
            return Err(Error::LimitExceeded {
                message: format!(
                    "range [{}..{}] expands to more than {} elements",
                    first, last, self.max_list_len
                ),
                span,
            });
        }
        out.push('[');
        for (i, n) in (*first..=*last).enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&n.to_string());
        }
        out.push(']');
        Ok(())
    }
}

impl Default for EsiCodeGen {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGen for EsiCodeGen {
    fn generate(&mut self, program: &Program) -> Result<String> {
        self.opaque_functions.clear();
        collect_functions(&program.body, &mut self.opaque_functions);
        captures::check(program)?;

        let mut out = String::new();
        if self.warning_banner {
            out.push_str(WARNING_BANNER);
            out.push('\n');
        }
        self.gen_stmts(&mut out, &program.body)?;
        Ok(out)
    }

    fn dialect(&self) -> &str {
        "esi/1.0"
    }

    fn name(&self) -> &str {
        "esi"
    }
}

// ==================== Helpers ====================

fn gen_literal(out: &mut String, lit: &Literal, mode: Mode) {
    match lit {
        Literal::Bool(b, _) => out.push(if *b { '1' } else { '0' }),
        Literal::Int(n, _) => out.push_str(&n.to_string()),
        Literal::String(s, _) => match mode {
            Mode::Expr => quote_string(out, s),
            Mode::Vars => escape_vars(out, s),
        },
    }
}

/// `'...'` with backslash escapes, or `'''...'''` when that reads better
fn quote_string(out: &mut String, s: &str) {
    let triple = (s.contains('\'') || s.contains('\\'))
        && !s.contains("'''")
        && !s.starts_with('\'')
        && !s.ends_with('\'');
    if triple {
        out.push_str("'''");
        out.push_str(s);
        out.push_str("'''");
        return;
    }
    out.push('\'');
    for ch in s.chars() {
        if ch == '\\' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('\'');
}

/// Raw text in which `$`, `\` and `<esi:` would otherwise be interpreted
fn escape_vars(out: &mut String, s: &str) {
    for (i, ch) in s.char_indices() {
        if ch == '\\' || ch == '$' || (ch == '<' && s[i..].starts_with("<esi:")) {
            out.push('\\');
        }
        out.push(ch);
    }
}

/// ` name="value"`; a double quote cannot be escaped inside an attribute
fn push_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&value.replace('"', "$dquote()"));
    out.push('"');
}

fn collect_functions(stmts: &[Stmt], names: &mut HashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Function(func) => {
                names.insert(func.name.name.clone());
                collect_functions(&func.body, names);
            }
            Stmt::If(chain) => {
                for branch in &chain.branches {
                    collect_functions(&branch.body, names);
                }
                if let Some(body) = &chain.else_body {
                    collect_functions(body, names);
                }
            }
            Stmt::Try(t) => {
                collect_functions(&t.attempt, names);
                if let Some(except) = &t.except {
                    collect_functions(except, names);
                }
            }
            Stmt::For(l) => collect_functions(&l.body, names),
            Stmt::Block { body, .. } => collect_functions(body, names),
            _ => {}
        }
    }
}
