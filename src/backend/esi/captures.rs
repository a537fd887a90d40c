//! Match capture scoping
//!
//! `if (v matches re as m)` binds `m` for the body of that one branch, where
//! ESI exposes it as `$(m{n})`. Outside that body the name means nothing, and
//! inside it only integer indexing has a rendering.

use std::collections::HashSet;

use crate::frontend::ast::*;
use crate::utils::{Error, Result, Span};

/// Name bound by the first `as` capture in a condition
pub(super) fn capture_name(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Match(m) => m
            .capture
            .as_ref()
            .map(|c| c.name.as_str())
            .or_else(|| capture_name(&m.subject))
            .or_else(|| capture_name(&m.pattern)),
        Expr::Binary { left, right, .. } => capture_name(left).or_else(|| capture_name(right)),
        Expr::Unary { expr, .. } => capture_name(expr),
        _ => None,
    }
}

/// Reject capture reads outside their branch, and any read that is not `m[<int>]`
pub(super) fn check(program: &Program) -> Result<()> {
    let mut checker = CaptureChecker::default();
    collect_captures(&program.body, &mut checker.captures);
    if checker.captures.is_empty() {
        return Ok(());
    }
    checker.check_stmts(&program.body)
}

#[derive(Default)]
struct CaptureChecker {
    /// Every name bound by a capture anywhere in the program
    captures: HashSet<String>,
    /// Captures of the enclosing branches, innermost last
    visible: Vec<String>,
}

impl CaptureChecker {
    fn check_stmts(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::VarDecl { value, .. } => value.iter().try_for_each(|v| self.check_expr(v)),
            Stmt::Assign { key, value, .. } => {
                key.iter().try_for_each(|k| self.check_expr(k))?;
                self.check_expr(value)
            }
            Stmt::Expr(expr) => self.check_expr(expr),
            Stmt::If(chain) => {
                for branch in &chain.branches {
                    self.check_expr(&branch.cond)?;
                    match capture_name(&branch.cond) {
                        Some(name) => {
                            self.visible.push(name.to_string());
                            let checked = self.check_stmts(&branch.body);
                            self.visible.pop();
                            checked?;
                        }
                        None => self.check_stmts(&branch.body)?,
                    }
                }
                match &chain.else_body {
                    Some(body) => self.check_stmts(body),
                    None => Ok(()),
                }
            }
            Stmt::For(l) => {
                self.check_expr(&l.collection)?;
                self.check_stmts(&l.body)
            }
            Stmt::Try(t) => {
                self.check_stmts(&t.attempt)?;
                match &t.except {
                    Some(body) => self.check_stmts(body),
                    None => Ok(()),
                }
            }
            Stmt::Include(inc) | Stmt::Eval(inc) => {
                inc.options.iter().try_for_each(|o| self.check_expr(&o.value))
            }
            Stmt::Output { args, .. } => args.iter().try_for_each(|a| self.check_expr(a)),
            Stmt::Block { body, .. } => self.check_stmts(body),
            Stmt::Return { value, .. } => value.iter().try_for_each(|v| self.check_expr(v)),
            // function bodies never reach the output
            Stmt::Function(_) | Stmt::Break(_) | Stmt::Require(_) | Stmt::Comment { .. } => Ok(()),
        }
    }

    fn check_expr(&self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Literal(_) => Ok(()),
            Expr::Ident(ident) if self.captures.contains(&ident.name) => {
                self.check_visible(&ident.name, ident.span)?;
                Err(Error::Misplaced {
                    message: format!(
                        "capture `{0}` can only be read by integer index, as in `{0}[1]`",
                        ident.name
                    ),
                    span: ident.span,
                })
            }
            Expr::Ident(_) => Ok(()),
            Expr::Index { target, index, span } => match target.as_ref() {
                Expr::Ident(ident) if self.captures.contains(&ident.name) => {
                    self.check_visible(&ident.name, *span)?;
                    match index.as_ref() {
                        Expr::Literal(Literal::Int(n, _)) if *n >= 0 => Ok(()),
                        other => Err(Error::Misplaced {
                            message: format!(
                                "capture `{}` must be indexed by a non-negative integer literal",
                                ident.name
                            ),
                            span: other.span(),
                        }),
                    }
                }
                _ => {
                    self.check_expr(target)?;
                    self.check_expr(index)
                }
            },
            Expr::Binary { left, right, .. } => {
                self.check_expr(left)?;
                self.check_expr(right)
            }
            Expr::Unary { expr, .. } => self.check_expr(expr),
            Expr::Match(m) => {
                self.check_expr(&m.subject)?;
                self.check_expr(&m.pattern)
            }
            Expr::Call { args, .. } => args.iter().try_for_each(|a| self.check_expr(a)),
            Expr::Range { start, end, .. } => {
                self.check_expr(start)?;
                self.check_expr(end)
            }
            Expr::Array { elements, .. } => elements.iter().try_for_each(|e| self.check_expr(e)),
            Expr::Dict { entries, .. } => entries.iter().try_for_each(|(k, v)| {
                self.check_expr(k)?;
                self.check_expr(v)
            }),
        }
    }

    fn check_visible(&self, name: &str, span: Span) -> Result<()> {
        if self.visible.iter().any(|v| v == name) {
            return Ok(());
        }
        Err(Error::Misplaced {
            message: format!(
                "capture `{}` is only visible inside the branch whose condition binds it",
                name
            ),
            span,
        })
    }
}

fn collect_captures(stmts: &[Stmt], names: &mut HashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::If(chain) => {
                for branch in &chain.branches {
                    if let Some(name) = capture_name(&branch.cond) {
                        names.insert(name.to_string());
                    }
                    collect_captures(&branch.body, names);
                }
                if let Some(body) = &chain.else_body {
                    collect_captures(body, names);
                }
            }
            Stmt::Try(t) => {
                collect_captures(&t.attempt, names);
                if let Some(body) = &t.except {
                    collect_captures(body, names);
                }
            }
            Stmt::For(l) => collect_captures(&l.body, names),
            Stmt::Block { body, .. } => collect_captures(body, names),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse;

    fn check_source(source: &str) -> Result<()> {
        check(&parse(source, 0)?)
    }

    fn message(source: &str) -> String {
        match check_source(source) {
            Err(Error::Misplaced { message, .. }) => message,
            other => panic!("expected a capture error, got {:?}", other),
        }
    }

    #[test]
    fn test_capture_inside_its_branch() {
        assert!(check_source("if (v matches '(a)(b)' as m) { x = m[1]; if (y) { print(m[2]); } }").is_ok());
        assert!(check_source("if (x) {} else if (v matches '(a)' as m) { x = m[0]; }").is_ok());
    }

    #[test]
    fn test_capture_outside_its_branch() {
        let msg = message("if (v matches '(a)' as m) { x = 1; } print(m[1]);");
        assert!(msg.contains("only visible inside the branch"));

        let msg = message("if (v matches '(a)' as m) { } else { x = m[1]; }");
        assert!(msg.contains("only visible inside the branch"));

        let msg = message("if (v matches '(a)' as m) { } else if (w matches 'b' as n) { x = m[1]; }");
        assert!(msg.contains("only visible inside the branch"));
    }

    #[test]
    fn test_capture_index_must_be_integer_literal() {
        let msg = message("if (v matches '(a)' as m) { print(m['k']); }");
        assert!(msg.contains("non-negative integer literal"));

        let msg = message("if (v matches '(a)' as m) { print(m[x]); }");
        assert!(msg.contains("non-negative integer literal"));

        let msg = message("if (v matches '(a)' as m) { y = m; }");
        assert!(msg.contains("integer index"));
    }

    #[test]
    fn test_error_points_at_the_use() {
        let source = "if (v matches '(a)' as m) { }\nprint(m[1]);";
        let err = check_source(source).unwrap_err();
        assert_eq!(err.span().map(|s| s.start), Some(36));
    }
}
