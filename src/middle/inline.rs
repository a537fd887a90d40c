//! Function inlining
//!
//! Calls to functions declared `"inline"` are replaced by the function's
//! return expression with parameters substituted by the call's arguments.
//! The inline call graph is checked for cycles before anything is touched.

use std::collections::HashMap;

use log::debug;

use crate::frontend::ast::*;
use crate::middle::fold;
use crate::utils::{Error, Result, Span};

/// Target variable holding the request arguments; meaningless after inlining
const ARGS_VAR: &str = "ARGS";

/// An inline function reduced to its parameter list and return expression
#[derive(Debug, Clone)]
struct InlineFn {
    params: Vec<Param>,
    body: Expr,
    span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Inlines calls in a program and removes the inline declarations
pub struct FunctionInliner {
    functions: HashMap<String, InlineFn>,
    /// Refold substituted trees
    fold: bool,
    calls_inlined: usize,
}

impl FunctionInliner {
    pub fn new(fold: bool) -> Self {
        Self {
            functions: HashMap::new(),
            fold,
            calls_inlined: 0,
        }
    }

    pub fn calls_inlined(&self) -> usize {
        self.calls_inlined
    }

    pub fn functions_inlined(&self) -> usize {
        self.functions.len()
    }

    /// Run on a whole program
    pub fn run(&mut self, program: &mut Program) -> Result<()> {
        self.collect(&program.body)?;
        self.check_cycles()?;
        let body = std::mem::take(&mut program.body);
        let body = self.rewrite_stmts(body)?;
        program.body = if self.fold { fold::fold_stmts(body) } else { body };
        Ok(())
    }

    // ==================== Collection ====================

    /// Gather inline declarations from every statement sequence; a later
    /// declaration of the same name replaces an earlier one
    fn collect(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            match stmt {
                Stmt::Function(f) if f.inline => {
                    let inline_fn = Self::reduce(f)?;
                    if self.functions.insert(f.name.name.clone(), inline_fn).is_some() {
                        debug!("inline function {}() redefined", f.name.name);
                    }
                }
                Stmt::Function(f) => self.collect(&f.body)?,
                Stmt::If(chain) => {
                    for branch in &chain.branches {
                        self.collect(&branch.body)?;
                    }
                    if let Some(body) = &chain.else_body {
                        self.collect(body)?;
                    }
                }
                Stmt::For(l) => self.collect(&l.body)?,
                Stmt::Try(t) => {
                    self.collect(&t.attempt)?;
                    if let Some(body) = &t.except {
                        self.collect(body)?;
                    }
                }
                Stmt::Block { body, .. } => self.collect(body)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn reduce(f: &FunctionDecl) -> Result<InlineFn> {
        let name = &f.name.name;
        let body = match f.body.as_slice() {
            [Stmt::Return { value: Some(expr), .. }] => expr.clone(),
            _ => {
                return Err(Error::inline(
                    name,
                    "an inline function body must be a single `return <expression>` statement",
                    f.span,
                ))
            }
        };
        if let Some(span) = find_ident(&body, ARGS_VAR) {
            return Err(Error::inline(
                name,
                format!("inline functions cannot reference `{}`", ARGS_VAR),
                span,
            ));
        }
        Ok(InlineFn {
            params: f.params.clone(),
            body,
            span: f.span,
        })
    }

    // ==================== Cycle check ====================

    fn check_cycles(&self) -> Result<()> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        for name in names {
            let mut path = Vec::new();
            self.visit(name, &mut marks, &mut path)?;
        }
        Ok(())
    }

    fn visit<'s>(
        &'s self,
        name: &'s str,
        marks: &mut HashMap<&'s str, Mark>,
        path: &mut Vec<&'s str>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].to_vec();
                cycle.push(name);
                let span = self.functions.get(name).map(|f| f.span).unwrap_or_default();
                return Err(Error::inline(
                    name,
                    format!("recursive inline expansion ({})", cycle.join(" -> ")),
                    span,
                ));
            }
            None => {}
        }
        let Some(func) = self.functions.get(name) else {
            return Ok(());
        };
        marks.insert(name, Mark::Visiting);
        path.push(name);
        let mut callees = Vec::new();
        collect_calls(&func.body, &mut callees);
        for callee in callees {
            if let Some((key, _)) = self.functions.get_key_value(callee) {
                self.visit(key.as_str(), marks, path)?;
            }
        }
        path.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    // ==================== Rewriting ====================

    fn rewrite_stmts(&mut self, stmts: Vec<Stmt>) -> Result<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            let stmt = match stmt {
                Stmt::Function(f) if f.inline => continue,
                Stmt::Function(mut f) => {
                    f.body = self.rewrite_stmts(std::mem::take(&mut f.body))?;
                    Stmt::Function(f)
                }
                Stmt::VarDecl { name, value, span } => Stmt::VarDecl {
                    name,
                    value: value.map(|v| self.rewrite_expr(v)).transpose()?,
                    span,
                },
                Stmt::Assign { target, key, value, span } => Stmt::Assign {
                    target,
                    key: key.map(|k| self.rewrite_expr(k)).transpose()?,
                    value: self.rewrite_expr(value)?,
                    span,
                },
                Stmt::Expr(e) => Stmt::Expr(self.rewrite_expr(e)?),
                Stmt::If(chain) => {
                    let mut branches = Vec::with_capacity(chain.branches.len());
                    for branch in chain.branches {
                        branches.push(IfBranch {
                            cond: self.rewrite_expr(branch.cond)?,
                            body: self.rewrite_stmts(branch.body)?,
                            span: branch.span,
                        });
                    }
                    let else_body = chain
                        .else_body
                        .map(|body| self.rewrite_stmts(body))
                        .transpose()?;
                    Stmt::If(IfChain { branches, else_body, span: chain.span })
                }
                Stmt::For(l) => Stmt::For(ForLoop {
                    collection: self.rewrite_expr(l.collection)?,
                    body: self.rewrite_stmts(l.body)?,
                    ..l
                }),
                Stmt::Return { value, span } => Stmt::Return {
                    value: value.map(|v| self.rewrite_expr(v)).transpose()?,
                    span,
                },
                Stmt::Try(t) => Stmt::Try(TryStmt {
                    attempt: self.rewrite_stmts(t.attempt)?,
                    except: t.except.map(|b| self.rewrite_stmts(b)).transpose()?,
                    span: t.span,
                }),
                Stmt::Include(inc) => Stmt::Include(self.rewrite_include(inc)?),
                Stmt::Eval(inc) => Stmt::Eval(self.rewrite_include(inc)?),
                Stmt::Output { kind, args, span } => Stmt::Output {
                    kind,
                    args: self.rewrite_exprs(args)?,
                    span,
                },
                Stmt::Block { body, span } => Stmt::Block {
                    body: self.rewrite_stmts(body)?,
                    span,
                },
                other @ (Stmt::Break(_) | Stmt::Require(_) | Stmt::Comment { .. }) => other,
            };
            out.push(stmt);
        }
        Ok(out)
    }

    fn rewrite_include(&mut self, inc: IncludeStmt) -> Result<IncludeStmt> {
        let mut options = Vec::with_capacity(inc.options.len());
        for opt in inc.options {
            options.push(IncludeOption {
                value: self.rewrite_expr(opt.value)?,
                ..opt
            });
        }
        Ok(IncludeStmt { options, span: inc.span })
    }

    fn rewrite_exprs(&mut self, exprs: Vec<Expr>) -> Result<Vec<Expr>> {
        exprs.into_iter().map(|e| self.rewrite_expr(e)).collect()
    }

    /// Bottom-up: arguments are inlined before the call that receives them
    fn rewrite_expr(&mut self, expr: Expr) -> Result<Expr> {
        Ok(match expr {
            Expr::Call { callee, args, span } => {
                let args = self.rewrite_exprs(args)?;
                if self.functions.contains_key(&callee.name) {
                    self.expand_call(&callee, args, span)?
                } else {
                    Expr::Call { callee, args, span }
                }
            }
            Expr::Binary { left, op, right, span } => Expr::Binary {
                left: Box::new(self.rewrite_expr(*left)?),
                op,
                right: Box::new(self.rewrite_expr(*right)?),
                span,
            },
            Expr::Unary { op, expr, span } => Expr::Unary {
                op,
                expr: Box::new(self.rewrite_expr(*expr)?),
                span,
            },
            Expr::Match(m) => {
                let subject = self.rewrite_expr(*m.subject)?;
                let pattern = self.rewrite_expr(*m.pattern)?;
                Expr::Match(MatchExpr {
                    subject: Box::new(subject),
                    pattern: Box::new(pattern),
                    ..m
                })
            }
            Expr::Index { target, index, span } => Expr::Index {
                target: Box::new(self.rewrite_expr(*target)?),
                index: Box::new(self.rewrite_expr(*index)?),
                span,
            },
            Expr::Range { start, end, span } => Expr::Range {
                start: Box::new(self.rewrite_expr(*start)?),
                end: Box::new(self.rewrite_expr(*end)?),
                span,
            },
            Expr::Array { elements, span } => Expr::Array {
                elements: self.rewrite_exprs(elements)?,
                span,
            },
            Expr::Dict { entries, span } => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    out.push((self.rewrite_expr(k)?, self.rewrite_expr(v)?));
                }
                Expr::Dict { entries: out, span }
            }
            leaf @ (Expr::Literal(_) | Expr::Ident(_)) => leaf,
        })
    }

    fn expand_call(&mut self, callee: &Ident, args: Vec<Expr>, span: Span) -> Result<Expr> {
        let Some(func) = self.functions.get(&callee.name).cloned() else {
            return Ok(Expr::Call { callee: callee.clone(), args, span });
        };
        let name = callee.name.as_str();

        if args.len() > func.params.len() {
            return Err(Error::inline(
                name,
                format!(
                    "takes at most {} argument{} ({} given)",
                    func.params.len(),
                    if func.params.len() == 1 { "" } else { "s" },
                    args.len()
                ),
                span,
            ));
        }

        let mut bindings: HashMap<&str, Expr> = HashMap::new();
        let mut args = args.into_iter();
        for param in &func.params {
            let value = match (args.next(), &param.default) {
                (Some(arg), _) => arg,
                (None, Some(default)) => Expr::Literal(default.clone().with_span(span)),
                (None, None) => {
                    return Err(Error::inline(
                        name,
                        format!("missing argument for parameter `{}`", param.name.name),
                        span,
                    ))
                }
            };
            bindings.insert(param.name.name.as_str(), value);
        }

        let substituted = substitute(func.body.clone(), &bindings);
        // the body may call other inline functions; the graph is acyclic
        let expanded = self.rewrite_expr(substituted)?;
        self.calls_inlined += 1;
        debug!("inlined call to {}()", name);

        Ok(if self.fold { fold::fold_expr(expanded) } else { expanded })
    }
}

/// Replace free identifiers by the bound expressions
pub(crate) fn substitute(expr: Expr, bindings: &HashMap<&str, Expr>) -> Expr {
    let sub = |e: Box<Expr>| Box::new(substitute(*e, bindings));
    match expr {
        Expr::Ident(ident) => match bindings.get(ident.name.as_str()) {
            Some(value) => value.clone(),
            None => Expr::Ident(ident),
        },
        Expr::Binary { left, op, right, span } => Expr::Binary {
            left: sub(left),
            op,
            right: sub(right),
            span,
        },
        Expr::Unary { op, expr, span } => Expr::Unary { op, expr: sub(expr), span },
        Expr::Match(m) => Expr::Match(MatchExpr {
            subject: sub(m.subject),
            pattern: sub(m.pattern),
            ..m
        }),
        Expr::Call { callee, args, span } => Expr::Call {
            callee,
            args: args.into_iter().map(|a| substitute(a, bindings)).collect(),
            span,
        },
        Expr::Index { target, index, span } => Expr::Index {
            target: sub(target),
            index: sub(index),
            span,
        },
        Expr::Range { start, end, span } => Expr::Range {
            start: sub(start),
            end: sub(end),
            span,
        },
        Expr::Array { elements, span } => Expr::Array {
            elements: elements.into_iter().map(|e| substitute(e, bindings)).collect(),
            span,
        },
        Expr::Dict { entries, span } => Expr::Dict {
            entries: entries
                .into_iter()
                .map(|(k, v)| (substitute(k, bindings), substitute(v, bindings)))
                .collect(),
            span,
        },
        lit @ Expr::Literal(_) => lit,
    }
}

/// Names of every function called in `expr`
fn collect_calls<'e>(expr: &'e Expr, out: &mut Vec<&'e str>) {
    match expr {
        Expr::Call { callee, args, .. } => {
            out.push(callee.name.as_str());
            for arg in args {
                collect_calls(arg, out);
            }
        }
        _ => for_each_child(expr, |child| collect_calls(child, out)),
    }
}

fn find_ident(expr: &Expr, name: &str) -> Option<Span> {
    match expr {
        Expr::Ident(ident) if ident.name == name => Some(ident.span),
        _ => {
            let mut found = None;
            for_each_child(expr, |child| {
                if found.is_none() {
                    found = find_ident(child, name);
                }
            });
            found
        }
    }
}

fn for_each_child<'e>(expr: &'e Expr, mut f: impl FnMut(&'e Expr)) {
    match expr {
        Expr::Binary { left, right, .. } => {
            f(&**left);
            f(&**right);
        }
        Expr::Unary { expr, .. } => f(&**expr),
        Expr::Match(m) => {
            f(&*m.subject);
            f(&*m.pattern);
        }
        Expr::Call { args, .. } => args.iter().for_each(f),
        Expr::Index { target, index, .. } => {
            f(&**target);
            f(&**index);
        }
        Expr::Range { start, end, .. } => {
            f(&**start);
            f(&**end);
        }
        Expr::Array { elements, .. } => elements.iter().for_each(f),
        Expr::Dict { entries, .. } => {
            for (k, v) in entries {
                f(k);
                f(v);
            }
        }
        Expr::Literal(_) | Expr::Ident(_) => {}
    }
}
