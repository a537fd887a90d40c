//! Loop unrolling
//!
//! ESI has no loops, so every `for (x of collection)` is replaced by one copy
//! of its body per element, with `x` substituted by the element literal.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::frontend::ast::*;
use crate::middle::fold;
use crate::middle::inline::substitute;
use crate::utils::{Error, Result, Span};

/// A statically enumerable loop collection
#[derive(Debug, Clone, PartialEq)]
enum Collection {
    /// Inclusive integer range
    Range { start: i64, end: i64 },
    Items(Vec<Literal>),
}

impl Collection {
    fn from_expr(expr: &Expr, known: &Known) -> Option<Collection> {
        match expr {
            Expr::Range { start, end, .. } => match (start.as_literal(), end.as_literal()) {
                (Some(Literal::Int(start, _)), Some(Literal::Int(end, _))) => Some(Collection::Range {
                    start: *start,
                    end: *end,
                }),
                _ => None,
            },
            Expr::Array { elements, .. } => elements
                .iter()
                .map(|e| e.as_literal().cloned())
                .collect::<Option<Vec<_>>>()
                .map(Collection::Items),
            Expr::Ident(ident) => known.get(&ident.name).cloned(),
            _ => None,
        }
    }

    fn element(&self, index: usize, span: Span) -> Option<Literal> {
        match self {
            Collection::Range { start, end } => {
                let value = start.checked_add(i64::try_from(index).ok()?)?;
                (value <= *end).then_some(Literal::Int(value, span))
            }
            Collection::Items(items) => items.get(index).map(|lit| lit.clone().with_span(span)),
        }
    }
}

/// Variables last assigned an enumerable collection
type Known = HashMap<String, Collection>;

/// Unrolls every loop of a program
///
/// `max_iterations` bounds the body copies of a whole run, nested loops
/// included, so the product of nested counts cannot escape it.
pub struct LoopUnroller {
    max_iterations: usize,
    loops_unrolled: usize,
    iterations: usize,
}

impl LoopUnroller {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            loops_unrolled: 0,
            iterations: 0,
        }
    }

    pub fn loops_unrolled(&self) -> usize {
        self.loops_unrolled
    }

    /// Loop body copies emitted so far, nested copies included
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn run(&mut self, program: &mut Program) -> Result<()> {
        let mut known = Known::new();
        let body = std::mem::take(&mut program.body);
        program.body = self.unroll_stmts(body, &mut known)?;
        Ok(())
    }

    fn unroll_stmts(&mut self, stmts: Vec<Stmt>, known: &mut Known) -> Result<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match stmt {
                Stmt::For(l) => {
                    let unrolled = self.unroll_loop(l, known)?;
                    forget_assigned(&unrolled, known);
                    out.extend(unrolled);
                }
                Stmt::Assign { ref target, key: None, ref value, .. } => {
                    remember(known, &target.name, Some(value));
                    out.push(stmt);
                }
                Stmt::Assign { ref target, .. } => {
                    known.remove(&target.name);
                    out.push(stmt);
                }
                Stmt::VarDecl { ref name, ref value, .. } => {
                    remember(known, &name.name, value.as_ref());
                    out.push(stmt);
                }
                Stmt::Block { body, span } => {
                    let body = self.unroll_stmts(body, known)?;
                    out.push(Stmt::Block { body, span });
                }
                Stmt::If(chain) => {
                    let mut branches = Vec::with_capacity(chain.branches.len());
                    for branch in chain.branches {
                        let body = self.unroll_stmts(branch.body, &mut known.clone())?;
                        branches.push(IfBranch { body, ..branch });
                    }
                    let else_body = match chain.else_body {
                        Some(body) => Some(self.unroll_stmts(body, &mut known.clone())?),
                        None => None,
                    };
                    let stmt = Stmt::If(IfChain { branches, else_body, span: chain.span });
                    forget_assigned(std::slice::from_ref(&stmt), known);
                    out.push(stmt);
                }
                Stmt::Try(t) => {
                    let attempt = self.unroll_stmts(t.attempt, &mut known.clone())?;
                    let except = match t.except {
                        Some(body) => Some(self.unroll_stmts(body, &mut known.clone())?),
                        None => None,
                    };
                    let stmt = Stmt::Try(TryStmt { attempt, except, span: t.span });
                    forget_assigned(std::slice::from_ref(&stmt), known);
                    out.push(stmt);
                }
                // function bodies never reach the output
                other => out.push(other),
            }
        }
        Ok(out)
    }

    fn unroll_loop(&mut self, l: ForLoop, known: &Known) -> Result<Vec<Stmt>> {
        let var = l.var_name().to_string();
        let collection_expr = fold::fold_expr(l.collection);
        let collection = Collection::from_expr(&collection_expr, known).ok_or_else(|| {
            Error::UnboundedLoop {
                message: format!(
                    "`for ({} of ...)` needs a range with literal bounds, an array of literals, \
                     or a variable assigned one",
                    var
                ),
                span: collection_expr.span(),
            }
        })?;

        let mut out = Vec::new();
        let mut count = 0;
        while let Some(element) = collection.element(count, collection_expr.span()) {
            if self.iterations >= self.max_iterations {
                return Err(Error::LimitExceeded {
                    message: format!(
                        "unrolling `{}` exceeds {} loop iterations in total",
                        var, self.max_iterations
                    ),
                    span: l.span,
                });
            }
            count += 1;
            self.iterations += 1;

            let bindings = HashMap::from([(var.as_str(), Expr::Literal(element))]);
            let body: Vec<Stmt> = l
                .body
                .iter()
                .cloned()
                .map(|stmt| substitute_stmt(stmt, &var, &bindings))
                .collect();
            let body = fold::fold_stmts(body);
            let body = self.unroll_stmts(body, &mut known.clone())?;
            let (body, broke) = truncate_at_break(body)?;
            out.extend(body);
            if broke {
                debug!("loop over `{}` breaks at iteration {}", var, count);
                break;
            }
        }

        self.loops_unrolled += 1;
        debug!("unrolled loop over `{}` into {} iterations", var, count);
        Ok(out)
    }
}

fn remember(known: &mut Known, name: &str, value: Option<&Expr>) {
    match value.and_then(|v| Collection::from_expr(v, known)) {
        Some(collection) => {
            known.insert(name.to_string(), collection);
        }
        None => {
            known.remove(name);
        }
    }
}

/// Drop every binding assigned anywhere inside `stmts`
fn forget_assigned(stmts: &[Stmt], known: &mut Known) {
    let mut names = HashSet::new();
    collect_assigned(stmts, &mut names);
    for name in names {
        known.remove(&name);
    }
}

fn collect_assigned(stmts: &[Stmt], names: &mut HashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { target, .. } => {
                names.insert(target.name.clone());
            }
            Stmt::VarDecl { name, .. } => {
                names.insert(name.name.clone());
            }
            Stmt::If(chain) => {
                for branch in &chain.branches {
                    collect_assigned(&branch.body, names);
                }
                if let Some(body) = &chain.else_body {
                    collect_assigned(body, names);
                }
            }
            Stmt::Try(t) => {
                collect_assigned(&t.attempt, names);
                if let Some(body) = &t.except {
                    collect_assigned(body, names);
                }
            }
            Stmt::For(l) => collect_assigned(&l.body, names),
            Stmt::Block { body, .. } => collect_assigned(body, names),
            _ => {}
        }
    }
}

/// Cut one iteration at its first `break`. Returns whether it broke.
fn truncate_at_break(stmts: Vec<Stmt>) -> Result<(Vec<Stmt>, bool)> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt {
            Stmt::Break(_) => return Ok((out, true)),
            Stmt::Block { body, span } => {
                let (body, broke) = truncate_at_break(body)?;
                out.push(Stmt::Block { body, span });
                if broke {
                    return Ok((out, true));
                }
            }
            Stmt::If(ref chain) => {
                let guarded = chain.branches.iter().any(|b| contains_break(&b.body))
                    || chain.else_body.as_deref().map_or(false, contains_break);
                if guarded {
                    return Err(Error::unsupported(
                        "`break` under a condition that cannot be decided at compile time",
                        chain.span,
                    ));
                }
                out.push(stmt);
            }
            Stmt::Try(ref t) => {
                if contains_break(&t.attempt) || t.except.as_deref().map_or(false, contains_break) {
                    return Err(Error::unsupported("`break` inside `try` cannot be unrolled", t.span));
                }
                out.push(stmt);
            }
            other => out.push(other),
        }
    }
    Ok((out, false))
}

fn contains_break(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        Stmt::Break(_) => true,
        Stmt::If(chain) => {
            chain.branches.iter().any(|b| contains_break(&b.body))
                || chain.else_body.as_deref().map_or(false, contains_break)
        }
        Stmt::Try(t) => {
            contains_break(&t.attempt) || t.except.as_deref().map_or(false, contains_break)
        }
        Stmt::Block { body, .. } => contains_break(body),
        _ => false,
    })
}

/// Substitute the loop variable in one statement; an inner loop over the
/// same name shadows it
fn substitute_stmt(stmt: Stmt, var: &str, bindings: &HashMap<&str, Expr>) -> Stmt {
    let sub = |e: Expr| substitute(e, bindings);
    let sub_body = |body: Vec<Stmt>| -> Vec<Stmt> {
        body.into_iter().map(|s| substitute_stmt(s, var, bindings)).collect()
    };
    match stmt {
        Stmt::VarDecl { name, value, span } => Stmt::VarDecl {
            name,
            value: value.map(sub),
            span,
        },
        Stmt::Assign { target, key, value, span } => Stmt::Assign {
            target,
            key: key.map(sub),
            value: sub(value),
            span,
        },
        Stmt::Expr(e) => Stmt::Expr(sub(e)),
        Stmt::If(chain) => Stmt::If(IfChain {
            branches: chain
                .branches
                .into_iter()
                .map(|b| IfBranch {
                    cond: sub(b.cond),
                    body: sub_body(b.body),
                    span: b.span,
                })
                .collect(),
            else_body: chain.else_body.map(sub_body),
            span: chain.span,
        }),
        Stmt::For(l) => {
            let shadowed = l.var_name() == var;
            Stmt::For(ForLoop {
                collection: sub(l.collection),
                body: if shadowed { l.body } else { sub_body(l.body) },
                var: l.var,
                span: l.span,
            })
        }
        Stmt::Try(t) => Stmt::Try(TryStmt {
            attempt: sub_body(t.attempt),
            except: t.except.map(sub_body),
            span: t.span,
        }),
        Stmt::Include(inc) => Stmt::Include(substitute_include(inc, bindings)),
        Stmt::Eval(inc) => Stmt::Eval(substitute_include(inc, bindings)),
        Stmt::Output { kind, args, span } => Stmt::Output {
            kind,
            args: args.into_iter().map(sub).collect(),
            span,
        },
        Stmt::Block { body, span } => Stmt::Block {
            body: sub_body(body),
            span,
        },
        Stmt::Return { value, span } => Stmt::Return {
            value: value.map(sub),
            span,
        },
        other @ (Stmt::Function(_) | Stmt::Break(_) | Stmt::Require(_) | Stmt::Comment { .. }) => other,
    }
}

fn substitute_include(inc: IncludeStmt, bindings: &HashMap<&str, Expr>) -> IncludeStmt {
    IncludeStmt {
        options: inc
            .options
            .into_iter()
            .map(|o| IncludeOption { value: substitute(o.value, bindings), ..o })
            .collect(),
        span: inc.span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse;

    fn unroll(source: &str, max: usize) -> Result<Vec<Stmt>> {
        let mut program = parse(source, 0)?;
        program.body = fold::fold_stmts(program.body);
        LoopUnroller::new(max).run(&mut program)?;
        Ok(program.body)
    }

    fn outputs(stmts: &[Stmt]) -> usize {
        stmts.iter().filter(|s| matches!(s, Stmt::Output { .. })).count()
    }

    #[test]
    fn test_range_unrolls_with_substitution() {
        let stmts = unroll("for (const day of [1..3]) { bananas = day * 3; }", 1024).unwrap();
        let values: Vec<i64> = stmts
            .iter()
            .map(|s| match s {
                Stmt::Assign { value: Expr::Literal(Literal::Int(n, _)), .. } => *n,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(values, vec![3, 6, 9]);
    }

    #[test]
    fn test_break_truncates() {
        let stmts = unroll(
            "for (item of ([1..365])) { if (item == 31) break; print('Day ', item); }",
            1024,
        )
        .unwrap();
        assert_eq!(outputs(&stmts), 30);
    }

    #[test]
    fn test_break_keeps_statements_before_it() {
        let stmts = unroll("for ([1..5]) { print(item); if (item == 2) break; }", 1024).unwrap();
        assert_eq!(outputs(&stmts), 2);
    }

    #[test]
    fn test_known_collection() {
        let stmts = unroll("days = [1 .. 31];\nfor (d of days) { print(d); }", 1024).unwrap();
        assert_eq!(outputs(&stmts), 31);

        let stmts = unroll("names = ['a', 'b'];\nfor (names) { print(item); }", 1024).unwrap();
        assert_eq!(outputs(&stmts), 2);
    }

    #[test]
    fn test_conditional_assignment_forgets_collection() {
        let err = unroll("days = [1..3];\nif (x) { days = [1..2]; }\nfor (d of days) print(d);", 1024)
            .unwrap_err();
        assert!(matches!(err, Error::UnboundedLoop { .. }));
    }

    #[test]
    fn test_dynamic_collection_is_error() {
        let err = unroll("for (x of [1..n]) print(x);", 1024).unwrap_err();
        assert!(matches!(err, Error::UnboundedLoop { .. }));
        let err = unroll("for (x of things) print(x);", 1024).unwrap_err();
        assert!(matches!(err, Error::UnboundedLoop { .. }));
    }

    #[test]
    fn test_dynamic_break_is_error() {
        let err = unroll("for (x of [1..3]) { if (y == x) break; }", 1024).unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
        let err = unroll("for (x of [1..3]) { try { break; } }", 1024).unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn test_iteration_limit() {
        let err = unroll("for (x of [1..100]) print(x);", 10).unwrap_err();
        assert!(matches!(err, Error::LimitExceeded { .. }));
        // a break before the limit is fine
        assert!(unroll("for (x of [1..100000]) { if (x == 5) break; print(x); }", 10).is_ok());
    }

    #[test]
    fn test_nested_loops_share_the_limit() {
        let source = "for (a of [1..10]) { for (b of [1..10]) { for (c of [1..10]) { print(c); } } }";
        let err = unroll(source, 10).unwrap_err();
        assert!(matches!(err, Error::LimitExceeded { .. }));

        // 2 outer copies plus 2 * 3 inner copies
        assert!(unroll("for (i of [1..2]) { for (j of [1..3]) { print(j); } }", 8).is_ok());
        let err = unroll("for (i of [1..2]) { for (j of [1..3]) { print(j); } }", 7).unwrap_err();
        assert!(matches!(err, Error::LimitExceeded { .. }));
    }

    #[test]
    fn test_sibling_loops_share_the_limit() {
        assert!(unroll("for (x of [1..5]) print(x); for (y of [1..5]) print(y);", 10).is_ok());
        let err = unroll("for (x of [1..6]) print(x); for (y of [1..5]) print(y);", 10).unwrap_err();
        assert!(matches!(err, Error::LimitExceeded { .. }));
    }

    #[test]
    fn test_nested_loops() {
        let stmts = unroll(
            "for (i of [1..2]) { for (j of [1..3]) { print(i * 10 + j); } }",
            1024,
        )
        .unwrap();
        assert_eq!(outputs(&stmts), 6);
        assert!(matches!(
            &stmts[5],
            Stmt::Output { args, .. } if matches!(args[0], Expr::Literal(Literal::Int(23, _)))
        ));
    }

    #[test]
    fn test_empty_and_reversed_ranges() {
        assert!(unroll("for (x of [3..1]) print(x);", 1024).unwrap().is_empty());
        assert!(unroll("for (x of []) print(x);", 1024).unwrap().is_empty());
    }
}
