//! Constant folding
//!
//! Bottom-up rewrite of operator nodes whose operands are literals. A node is
//! only folded when the result is exactly what the ESI processor would
//! compute, so mixed-type operations and string truthiness are left alone.

use crate::frontend::ast::*;
use crate::utils::Span;

/// Longest string `'s' * n` may fold to
const MAX_REPEAT_LEN: usize = 1 << 16;

/// Fold every expression in `stmts` and drop statically dead if-branches
pub fn fold_stmts(stmts: Vec<Stmt>) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        fold_stmt_into(stmt, &mut out);
    }
    out
}

fn fold_stmt_into(stmt: Stmt, out: &mut Vec<Stmt>) {
    let folded = match stmt {
        Stmt::Function(mut f) => {
            f.body = fold_stmts(std::mem::take(&mut f.body));
            Stmt::Function(f)
        }
        Stmt::VarDecl { name, value, span } => Stmt::VarDecl {
            name,
            value: value.map(fold_expr),
            span,
        },
        Stmt::Assign { target, key, value, span } => Stmt::Assign {
            target,
            key: key.map(fold_expr),
            value: fold_expr(value),
            span,
        },
        Stmt::Expr(e) => Stmt::Expr(fold_expr(e)),
        Stmt::If(chain) => {
            fold_if_into(chain, out);
            return;
        }
        Stmt::For(mut l) => {
            l.collection = fold_expr(l.collection);
            l.body = fold_stmts(std::mem::take(&mut l.body));
            Stmt::For(l)
        }
        Stmt::Return { value, span } => Stmt::Return {
            value: value.map(fold_expr),
            span,
        },
        Stmt::Try(t) => Stmt::Try(TryStmt {
            attempt: fold_stmts(t.attempt),
            except: t.except.map(fold_stmts),
            span: t.span,
        }),
        Stmt::Include(inc) => Stmt::Include(fold_include(inc)),
        Stmt::Eval(inc) => Stmt::Eval(fold_include(inc)),
        Stmt::Output { kind, args, span } => Stmt::Output {
            kind,
            args: args.into_iter().map(fold_expr).collect(),
            span,
        },
        Stmt::Block { body, span } => Stmt::Block {
            body: fold_stmts(body),
            span,
        },
        other @ (Stmt::Break(_) | Stmt::Require(_) | Stmt::Comment { .. }) => other,
    };
    out.push(folded);
}

fn fold_include(inc: IncludeStmt) -> IncludeStmt {
    IncludeStmt {
        options: inc
            .options
            .into_iter()
            .map(|o| IncludeOption { value: fold_expr(o.value), ..o })
            .collect(),
        span: inc.span,
    }
}

/// Branches with a literal condition are decided here. A chain left with
/// only an else body is spliced into the enclosing sequence.
fn fold_if_into(chain: IfChain, out: &mut Vec<Stmt>) {
    let mut branches = Vec::new();
    let mut else_body = None;
    let mut decided = false;

    for branch in chain.branches {
        let cond = fold_expr(branch.cond);
        match cond.as_literal().and_then(Literal::truthiness) {
            Some(false) => continue,
            Some(true) => {
                else_body = Some(fold_stmts(branch.body));
                decided = true;
                break;
            }
            None => branches.push(IfBranch {
                cond,
                body: fold_stmts(branch.body),
                span: branch.span,
            }),
        }
    }
    if !decided {
        else_body = chain.else_body.map(fold_stmts);
    }

    if branches.is_empty() {
        out.extend(else_body.unwrap_or_default());
    } else {
        out.push(Stmt::If(IfChain {
            branches,
            else_body,
            span: chain.span,
        }));
    }
}

/// Fold one expression tree
pub fn fold_expr(expr: Expr) -> Expr {
    match expr {
        Expr::Binary { left, op, right, span } => {
            let left = fold_expr(*left);
            let right = fold_expr(*right);
            fold_binary(left, op, right, span)
        }
        Expr::Unary { op, expr, span } => {
            let inner = fold_expr(*expr);
            match inner.as_literal().and_then(|lit| eval_unary(op, lit, span)) {
                Some(lit) => Expr::Literal(lit),
                None => Expr::Unary { op, expr: Box::new(inner), span },
            }
        }
        Expr::Match(m) => {
            let subject = fold_expr(*m.subject);
            let pattern = fold_expr(*m.pattern);
            if m.op == MatchOp::Has {
                if let (Some(Literal::String(s, _)), Some(Literal::String(p, _))) =
                    (subject.as_literal(), pattern.as_literal())
                {
                    let found = if m.case_insensitive {
                        s.to_lowercase().contains(&p.to_lowercase())
                    } else {
                        s.contains(p.as_str())
                    };
                    return Expr::Literal(Literal::Bool(found, m.span));
                }
            }
            Expr::Match(MatchExpr {
                subject: Box::new(subject),
                pattern: Box::new(pattern),
                ..m
            })
        }
        Expr::Call { callee, args, span } => Expr::Call {
            callee,
            args: args.into_iter().map(fold_expr).collect(),
            span,
        },
        Expr::Index { target, index, span } => Expr::Index {
            target: Box::new(fold_expr(*target)),
            index: Box::new(fold_expr(*index)),
            span,
        },
        Expr::Range { start, end, span } => Expr::Range {
            start: Box::new(fold_expr(*start)),
            end: Box::new(fold_expr(*end)),
            span,
        },
        Expr::Array { elements, span } => Expr::Array {
            elements: elements.into_iter().map(fold_expr).collect(),
            span,
        },
        Expr::Dict { entries, span } => Expr::Dict {
            entries: entries
                .into_iter()
                .map(|(k, v)| (fold_expr(k), fold_expr(v)))
                .collect(),
            span,
        },
        leaf @ (Expr::Literal(_) | Expr::Ident(_)) => leaf,
    }
}

fn fold_binary(left: Expr, op: BinOp, right: Expr, span: Span) -> Expr {
    // short-circuit only needs the left operand
    if matches!(op, BinOp::And | BinOp::Or) {
        if let Some(l) = left.as_literal().and_then(Literal::truthiness) {
            match (op, l) {
                (BinOp::And, false) => return Expr::Literal(Literal::Bool(false, span)),
                (BinOp::Or, true) => return Expr::Literal(Literal::Bool(true, span)),
                _ => {
                    if let Some(r) = right.as_literal().and_then(Literal::truthiness) {
                        return Expr::Literal(Literal::Bool(r, span));
                    }
                }
            }
        }
    } else if let (Some(l), Some(r)) = (left.as_literal(), right.as_literal()) {
        if let Some(lit) = eval_binary(op, l, r, span) {
            return Expr::Literal(lit);
        }
    }
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
        span,
    }
}

/// Evaluate a unary operator on a literal
pub fn eval_unary(op: UnOp, lit: &Literal, span: Span) -> Option<Literal> {
    match (op, lit) {
        (UnOp::Not, _) => lit.truthiness().map(|t| Literal::Bool(!t, span)),
        (UnOp::Neg, Literal::Int(n, _)) => n.checked_neg().map(|v| Literal::Int(v, span)),
        (UnOp::BitNot, Literal::Int(n, _)) => Some(Literal::Int(!n, span)),
        _ => None,
    }
}

/// Evaluate a non-logical binary operator on two literals
pub fn eval_binary(op: BinOp, left: &Literal, right: &Literal, span: Span) -> Option<Literal> {
    match (left, right) {
        (Literal::Int(l, _), Literal::Int(r, _)) => {
            let (l, r) = (*l, *r);
            let result = match op {
                BinOp::Add => l.checked_add(r)?,
                BinOp::Sub => l.checked_sub(r)?,
                BinOp::Mul => l.checked_mul(r)?,
                // only exact quotients; the target has no integer division
                BinOp::Div if r != 0 && l.checked_rem(r)? == 0 => l.checked_div(r)?,
                BinOp::Div => return None,
                BinOp::Mod if r != 0 => l.checked_rem(r)?,
                BinOp::Mod => return None,
                BinOp::Shl if (0..64).contains(&r) => l << r,
                BinOp::Shr if (0..64).contains(&r) => l >> r,
                BinOp::Shl | BinOp::Shr => return None,
                BinOp::BitAnd => l & r,
                BinOp::BitOr => l | r,
                BinOp::BitXor => l ^ r,
                BinOp::Eq => return Some(Literal::Bool(l == r, span)),
                BinOp::Ne => return Some(Literal::Bool(l != r, span)),
                BinOp::Lt => return Some(Literal::Bool(l < r, span)),
                BinOp::Le => return Some(Literal::Bool(l <= r, span)),
                BinOp::Gt => return Some(Literal::Bool(l > r, span)),
                BinOp::Ge => return Some(Literal::Bool(l >= r, span)),
                BinOp::And | BinOp::Or => return None,
            };
            Some(Literal::Int(result, span))
        }
        (Literal::String(l, _), Literal::String(r, _)) => match op {
            BinOp::Add => Some(Literal::String(format!("{}{}", l, r), span)),
            BinOp::Eq => Some(Literal::Bool(l == r, span)),
            BinOp::Ne => Some(Literal::Bool(l != r, span)),
            _ => None,
        },
        (Literal::String(s, _), Literal::Int(n, _)) if op == BinOp::Mul => {
            let times = usize::try_from(*n).ok()?;
            if s.len().checked_mul(times)? > MAX_REPEAT_LEN {
                return None;
            }
            Some(Literal::String(s.repeat(times), span))
        }
        (Literal::Bool(l, _), Literal::Bool(r, _)) => match op {
            BinOp::Eq => Some(Literal::Bool(l == r, span)),
            BinOp::Ne => Some(Literal::Bool(l != r, span)),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse;
    use pretty_assertions::assert_eq;

    fn folded_value(source: &str) -> Expr {
        let program = parse(source, 0).unwrap();
        match fold_stmts(program.body).remove(0) {
            Stmt::Assign { value, .. } => value,
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    fn int(source: &str) -> i64 {
        match folded_value(source) {
            Expr::Literal(Literal::Int(n, _)) => n,
            other => panic!("not folded to an int: {:?}", other),
        }
    }

    fn string(source: &str) -> String {
        match folded_value(source) {
            Expr::Literal(Literal::String(s, _)) => s,
            other => panic!("not folded to a string: {:?}", other),
        }
    }

    #[test]
    fn test_arithmetic_and_bitwise() {
        assert_eq!(int("v = (1 << 2) | (1 << 4);"), 20);
        assert_eq!(int("v = ((1 << 5) | (1 << 3)) >> 1;"), 20);
        assert_eq!(int("v = 20 ^ (~10);"), 20 ^ !10);
        assert_eq!(int("v = -7 % 3;"), -1);
        assert_eq!(int("v = 12 / 4;"), 3);
        assert_eq!(int("v = 0xFF & 15;"), 15);
    }

    #[test]
    fn test_string_repetition() {
        assert_eq!(
            string("result = ('*' * ((25 % 13) / (3 - 1))) + ' six stars!';"),
            "****** six stars!"
        );
        assert_eq!(string("s = 'ab' * 0;"), "");
    }

    #[test]
    fn test_conservative_cases_stay_unfolded() {
        assert!(matches!(folded_value("v = 7 / 2;"), Expr::Binary { .. }));
        assert!(matches!(folded_value("v = 1 % 0;"), Expr::Binary { .. }));
        assert!(matches!(folded_value("v = 1 << 64;"), Expr::Binary { .. }));
        assert!(matches!(folded_value("v = 16 == 'True';"), Expr::Binary { .. }));
        assert!(matches!(folded_value("v = 'a' * -1;"), Expr::Binary { .. }));
        assert!(matches!(folded_value("v = !'x';"), Expr::Unary { .. }));
        assert!(matches!(folded_value("v = 'abc' matches 'b';"), Expr::Match(_)));
    }

    #[test]
    fn test_short_circuit() {
        assert!(matches!(
            folded_value("v = false && len(x);"),
            Expr::Literal(Literal::Bool(false, _))
        ));
        assert!(matches!(
            folded_value("v = 1 || x;"),
            Expr::Literal(Literal::Bool(true, _))
        ));
        assert!(matches!(folded_value("v = true && x;"), Expr::Binary { op: BinOp::And, .. }));
    }

    #[test]
    fn test_has_folds_on_strings() {
        assert!(matches!(
            folded_value("v = 'FooBar' has_i 'bar';"),
            Expr::Literal(Literal::Bool(true, _))
        ));
        assert!(matches!(
            folded_value("v = 'FooBar' has 'bar';"),
            Expr::Literal(Literal::Bool(false, _))
        ));
    }

    #[test]
    fn test_folding_is_idempotent() {
        let program = parse(
            "a = (1 << 3) * 2 - 5; b = 'x' * (2 + 1); c = x + (2 * 3); d = !(3 > 4);",
            0,
        )
        .unwrap();
        let once = fold_stmts(program.body);
        let twice = fold_stmts(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_dead_branches() {
        let program = parse(
            "if (1 == 2) { a = 1; } else if (2 == 2) { b = 1; } else { c = 1; }\n\
             if (x) { d = 1; } else if (false) { e = 1; } else { f = 1; }",
            0,
        )
        .unwrap();
        let stmts = fold_stmts(program.body);
        assert!(matches!(&stmts[0], Stmt::Assign { target, .. } if target.name == "b"));
        let Stmt::If(chain) = &stmts[1] else { panic!("expected if") };
        assert_eq!(chain.branches.len(), 1);
        assert!(matches!(
            chain.else_body.as_deref(),
            Some([Stmt::Assign { target, .. }]) if target.name == "f"
        ));
    }
}
