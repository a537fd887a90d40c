//! Parser for the js2esi source language
//!
//! Recursive descent parser with Pratt parsing for expressions.

use crate::frontend::ast::*;
use crate::frontend::lexer::Lexer;
use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, Result, Span};

/// Lex and parse one source unit
pub fn parse(source: &str, file_id: usize) -> Result<Program> {
    Parser::new(Lexer::new(source, file_id))?.parse_program()
}

/// The parser
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    loop_depth: usize,
    function_depth: usize,
    /// Captures seen in the `if` condition being parsed; `None` outside one
    captures: Option<usize>,
}

impl Parser {
    /// Create a new parser from a lexer
    pub fn new(mut lexer: Lexer) -> Result<Self> {
        Ok(Self::from_tokens(lexer.tokenize()?))
    }

    /// Create a parser from pre-tokenized input
    pub fn from_tokens(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof) {
            let end = tokens.last().map(|t| t.span).unwrap_or_default();
            tokens.push(Token::eof(Span::new(end.end, end.end, end.file_id)));
        }
        Self {
            tokens,
            pos: 0,
            loop_depth: 0,
            function_depth: 0,
            captures: None,
        }
    }

    // ==================== Helper Methods ====================

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_kind(&self) -> &TokenKind {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected.to_string()))
        }
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: impl Into<String>) -> Error {
        Error::UnexpectedToken {
            expected: expected.into(),
            got: self.current_kind().to_string(),
            span: self.current().span,
        }
    }

    fn misplaced(message: impl Into<String>, span: Span) -> Error {
        Error::Misplaced { message: message.into(), span }
    }

    /// A statement ends at `;`, or right before `}` / end of input
    fn end_statement(&mut self) -> Result<()> {
        if self.consume(&TokenKind::Semicolon)
            || self.check(&TokenKind::RBrace)
            || self.is_at_end()
        {
            Ok(())
        } else {
            Err(self.unexpected("`;`"))
        }
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Ident::new(name, token.span))
            }
            other => Err(Error::ExpectedIdent {
                got: other.to_string(),
                span: token.span,
            }),
        }
    }

    // ==================== Statements ====================

    /// Parse a complete program
    pub fn parse_program(&mut self) -> Result<Program> {
        let mut body = Vec::new();
        while !self.is_at_end() {
            if let Some(stmt) = self.parse_statement()? {
                body.push(stmt);
            }
        }
        Ok(Program { body })
    }

    /// Parse one statement; empty statements yield `None`
    fn parse_statement(&mut self) -> Result<Option<Stmt>> {
        let start = self.current().span;
        let stmt = match self.current_kind() {
            TokenKind::Semicolon => {
                self.advance();
                return Ok(None);
            }
            TokenKind::LBrace => {
                let body = self.parse_block()?;
                Stmt::Block { body, span: start.merge(&self.prev_span()) }
            }
            TokenKind::Function => Stmt::Function(self.parse_function()?),
            TokenKind::Let | TokenKind::Var | TokenKind::Const => self.parse_var_decl()?,
            TokenKind::If => Stmt::If(self.parse_if()?),
            TokenKind::For => Stmt::For(self.parse_for()?),
            TokenKind::Try => Stmt::Try(self.parse_try()?),
            TokenKind::Require => Stmt::Require(self.parse_require()?),
            TokenKind::Include => Stmt::Include(self.parse_include()?),
            TokenKind::Eval => Stmt::Eval(self.parse_include()?),
            TokenKind::Break => {
                self.advance();
                if self.loop_depth == 0 {
                    return Err(Self::misplaced("`break` outside of a loop", start));
                }
                self.end_statement()?;
                Stmt::Break(start)
            }
            TokenKind::Return => self.parse_return()?,
            TokenKind::EsiComment(text) => {
                let text = text.clone();
                self.advance();
                Stmt::Comment { text, span: start }
            }
            _ => self.parse_expr_statement()?,
        };
        Ok(Some(stmt))
    }

    /// Parse `{ stmt* }`
    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if let Some(stmt) = self.parse_statement()? {
                body.push(stmt);
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(body)
    }

    /// Body of an `if`/`else`/`for`: a block or a single statement
    fn parse_body(&mut self) -> Result<Vec<Stmt>> {
        if self.check(&TokenKind::LBrace) {
            self.parse_block()
        } else {
            Ok(self.parse_statement()?.into_iter().collect())
        }
    }

    /// Parse a function declaration
    fn parse_function(&mut self) -> Result<FunctionDecl> {
        let start = self.current().span;
        self.expect(TokenKind::Function)?;

        // older `function inline name(...)` form
        let mut inline = false;
        if matches!(self.current_kind(), TokenKind::Ident(n) if n == "inline")
            && matches!(self.peek_kind(), TokenKind::Ident(_))
        {
            self.advance();
            inline = true;
        }

        let name = self.parse_ident()?;
        self.expect(TokenKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen)?;

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_block();
        self.function_depth -= 1;
        self.loop_depth = saved_loops;
        let mut body = body?;

        if let Some(Stmt::Expr(Expr::Literal(Literal::String(pragma, _)))) = body.first() {
            if pragma == "inline" {
                body.remove(0);
                inline = true;
            }
        }

        Ok(FunctionDecl {
            name,
            params,
            body,
            inline,
            span: start.merge(&self.prev_span()),
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.is_at_end() {
            let name = self.parse_ident()?;
            let default = if self.consume(&TokenKind::Eq) {
                Some(self.parse_default_literal()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                return Err(Self::misplaced(
                    format!("parameter `{}` without a default follows a defaulted one", name.name),
                    name.span,
                ));
            }
            let span = name.span.merge(&self.prev_span());
            params.push(Param { name, default, span });
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_default_literal(&mut self) -> Result<Literal> {
        let token = self.advance();
        match token.kind {
            TokenKind::IntLit(n) => Ok(Literal::Int(n, token.span)),
            TokenKind::StringLit(s) => Ok(Literal::String(s, token.span)),
            TokenKind::True => Ok(Literal::Bool(true, token.span)),
            TokenKind::False => Ok(Literal::Bool(false, token.span)),
            TokenKind::Minus => match self.current_kind().clone() {
                TokenKind::IntLit(n) => {
                    self.advance();
                    Ok(Literal::Int(n.wrapping_neg(), token.span.merge(&self.prev_span())))
                }
                _ => Err(self.unexpected("number")),
            },
            other => Err(Error::UnexpectedToken {
                expected: "literal default value".to_string(),
                got: other.to_string(),
                span: token.span,
            }),
        }
    }

    fn parse_var_decl(&mut self) -> Result<Stmt> {
        let start = self.advance().span;
        let name = self.parse_ident()?;
        let value = if self.consume(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.end_statement()?;
        Ok(Stmt::VarDecl {
            name,
            value,
            span: start.merge(&self.prev_span()),
        })
    }

    fn parse_if(&mut self) -> Result<IfChain> {
        let start = self.current().span;
        let mut branches = Vec::new();
        let mut else_body = None;

        loop {
            let branch_start = self.current().span;
            self.expect(TokenKind::If)?;
            self.expect(TokenKind::LParen)?;
            let cond = self.parse_condition()?;
            self.expect(TokenKind::RParen)?;
            let body = self.parse_body()?;
            branches.push(IfBranch {
                cond,
                body,
                span: branch_start.merge(&self.prev_span()),
            });

            if !self.consume(&TokenKind::Else) {
                break;
            }
            if !self.check(&TokenKind::If) {
                else_body = Some(self.parse_body()?);
                break;
            }
        }

        Ok(IfChain {
            branches,
            else_body,
            span: start.merge(&self.prev_span()),
        })
    }

    /// An `if` condition is the only place a `matches ... as name` capture may appear
    fn parse_condition(&mut self) -> Result<Expr> {
        let saved = self.captures.replace(0);
        let cond = self.parse_expr();
        self.captures = saved;
        cond
    }

    fn parse_for(&mut self) -> Result<ForLoop> {
        let start = self.current().span;
        self.expect(TokenKind::For)?;
        self.expect(TokenKind::LParen)?;

        let declared = matches!(
            self.current_kind(),
            TokenKind::Let | TokenKind::Var | TokenKind::Const
        );
        if declared {
            self.advance();
        }
        let var = if declared
            || (matches!(self.current_kind(), TokenKind::Ident(_))
                && matches!(self.peek_kind(), TokenKind::Of))
        {
            let var = self.parse_ident()?;
            self.expect(TokenKind::Of)?;
            Some(var)
        } else {
            None
        };

        let collection = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;

        self.loop_depth += 1;
        let body = self.parse_body();
        self.loop_depth -= 1;

        Ok(ForLoop {
            var,
            collection,
            body: body?,
            span: start.merge(&self.prev_span()),
        })
    }

    fn parse_try(&mut self) -> Result<TryStmt> {
        let start = self.current().span;
        self.expect(TokenKind::Try)?;
        let attempt = self.parse_block()?;

        let except = if self.consume(&TokenKind::Catch) {
            if self.consume(&TokenKind::LParen) {
                self.parse_ident()?;
                self.expect(TokenKind::RParen)?;
            }
            Some(self.parse_block()?)
        } else if self.consume(&TokenKind::Except) {
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(TryStmt {
            attempt,
            except,
            span: start.merge(&self.prev_span()),
        })
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        let start = self.advance().span;
        if self.function_depth == 0 {
            return Err(Self::misplaced("`return` outside of a function", start));
        }
        let value = if self.check(&TokenKind::Semicolon) || self.check(&TokenKind::RBrace) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.end_statement()?;
        Ok(Stmt::Return {
            value,
            span: start.merge(&self.prev_span()),
        })
    }

    /// `require('path'[, force=bool])`
    fn parse_require(&mut self) -> Result<RequireStmt> {
        let start = self.current().span;
        self.expect(TokenKind::Require)?;
        self.expect(TokenKind::LParen)?;

        let path = match self.current_kind().clone() {
            TokenKind::StringLit(path) => {
                self.advance();
                path
            }
            _ => return Err(self.unexpected("string literal path")),
        };

        let mut force = false;
        if self.consume(&TokenKind::Comma) && !self.check(&TokenKind::RParen) {
            self.expect(TokenKind::Force)?;
            self.expect(TokenKind::Eq)?;
            force = match self.advance().kind {
                TokenKind::True => true,
                TokenKind::False => false,
                TokenKind::IntLit(n) => n != 0,
                other => {
                    return Err(Error::UnexpectedToken {
                        expected: "`true` or `false`".to_string(),
                        got: other.to_string(),
                        span: self.prev_span(),
                    })
                }
            };
            self.consume(&TokenKind::Comma);
        }
        self.expect(TokenKind::RParen)?;
        self.end_statement()?;

        Ok(RequireStmt {
            path,
            force,
            span: start.merge(&self.prev_span()),
        })
    }

    /// `include(src=..., onError=..., ...)`; a leading positional argument is `src`
    fn parse_include(&mut self) -> Result<IncludeStmt> {
        let start = self.advance().span;
        self.expect(TokenKind::LParen)?;

        let mut options: Vec<IncludeOption> = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.is_at_end() {
            let opt_start = self.current().span;
            let key = if matches!(self.current_kind(), TokenKind::Ident(_))
                && matches!(self.peek_kind(), TokenKind::Eq)
            {
                let name = self.parse_ident()?;
                self.advance();
                Self::include_key(&name)?
            } else if options.is_empty() {
                IncludeKey::Src
            } else {
                return Err(self.unexpected("`name = value` option"));
            };

            if options.iter().any(|o| o.key == key) {
                return Err(Self::misplaced(
                    format!("duplicate `{}` option", key.source_name()),
                    opt_start,
                ));
            }
            let value = self.parse_expr()?;
            options.push(IncludeOption {
                key,
                value,
                span: opt_start.merge(&self.prev_span()),
            });
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        self.end_statement()?;

        let span = start.merge(&self.prev_span());
        if !options.iter().any(|o| o.key == IncludeKey::Src) {
            return Err(Error::unsupported("include/eval requires a `src` option", span));
        }
        Ok(IncludeStmt { options, span })
    }

    fn include_key(name: &Ident) -> Result<IncludeKey> {
        if let Some(key) = IncludeKey::from_name(&name.name) {
            return Ok(key);
        }
        let hint = IncludeKey::ALL
            .iter()
            .find(|k| k.source_name().eq_ignore_ascii_case(&name.name))
            .map(|k| format!(" (did you mean `{}`?)", k.source_name()))
            .unwrap_or_default();
        Err(Error::unsupported(
            format!("unknown include/eval option `{}`{}", name.name, hint),
            name.span,
        ))
    }

    /// Assignment, output built-in, or bare expression
    fn parse_expr_statement(&mut self) -> Result<Stmt> {
        let start = self.current().span;
        let expr = self.parse_expr()?;

        let op = match self.current_kind() {
            TokenKind::Eq => Some(None),
            TokenKind::PlusEq | TokenKind::PlusPlus => Some(Some(BinOp::Add)),
            TokenKind::MinusEq | TokenKind::MinusMinus => Some(Some(BinOp::Sub)),
            TokenKind::StarEq => Some(Some(BinOp::Mul)),
            TokenKind::SlashEq => Some(Some(BinOp::Div)),
            TokenKind::PercentEq => Some(Some(BinOp::Mod)),
            _ => None,
        };

        let Some(op) = op else {
            self.end_statement()?;
            return self.finish_expr_statement(expr, start);
        };

        let op_token = self.advance();
        let (target, key) = match expr.clone() {
            Expr::Ident(ident) => (ident, None),
            Expr::Index { target, index, .. } => match *target {
                Expr::Ident(ident) => (ident, Some(*index)),
                other => {
                    return Err(Self::misplaced("invalid assignment target", other.span()));
                }
            },
            other => return Err(Self::misplaced("invalid assignment target", other.span())),
        };

        let rhs = if matches!(op_token.kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            Expr::Literal(Literal::Int(1, op_token.span))
        } else {
            self.parse_expr()?
        };
        let value = match op {
            None => rhs,
            Some(op) => {
                let span = expr.span().merge(&rhs.span());
                Expr::Binary {
                    left: Box::new(expr),
                    op,
                    right: Box::new(rhs),
                    span,
                }
            }
        };
        self.end_statement()?;

        Ok(Stmt::Assign {
            target,
            key,
            value,
            span: start.merge(&self.prev_span()),
        })
    }

    fn finish_expr_statement(&self, expr: Expr, start: Span) -> Result<Stmt> {
        let Expr::Call { callee, args, span } = expr else {
            return Ok(Stmt::Expr(expr));
        };
        let Some(kind) = OutputKind::from_name(&callee.name) else {
            return Ok(Stmt::Expr(Expr::Call { callee, args, span }));
        };
        if kind == OutputKind::PrintRaw {
            if let Some(arg) = args.iter().find(|a| a.as_literal().is_none()) {
                return Err(Self::misplaced(
                    "printraw() only accepts literal values",
                    arg.span(),
                ));
            }
        }
        Ok(Stmt::Output {
            kind,
            args,
            span: start.merge(&self.prev_span()),
        })
    }

    // ==================== Expressions ====================

    /// Parse an expression
    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_expr_bp(1)
    }

    /// Pratt parsing for binary operators
    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let op_token = self.current().clone();
            let Some(bp) = op_token.kind.binary_precedence() else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.advance();

            let right = self.parse_expr_bp(bp + 1)?;
            let span = left.span().merge(&right.span());

            left = match Self::token_to_matchop(&op_token.kind) {
                Some((op, case_insensitive)) => {
                    let capture = self.parse_capture(op)?;
                    let span = capture.as_ref().map_or(span, |c| span.merge(&c.span));
                    Expr::Match(MatchExpr {
                        subject: Box::new(left),
                        op,
                        case_insensitive,
                        pattern: Box::new(right),
                        capture,
                        span,
                    })
                }
                None => Expr::Binary {
                    left: Box::new(left),
                    op: Self::token_to_binop(&op_token)?,
                    right: Box::new(right),
                    span,
                },
            };
        }

        Ok(left)
    }

    /// Optional `as name` after a match operator
    fn parse_capture(&mut self, op: MatchOp) -> Result<Option<Ident>> {
        if !self.check(&TokenKind::As) {
            return Ok(None);
        }
        let as_span = self.advance().span;
        if op != MatchOp::Matches {
            return Err(Self::misplaced("`as` capture requires `matches` or `matches_i`", as_span));
        }
        match self.captures.as_mut() {
            None => {
                return Err(Self::misplaced(
                    "`as` capture is only allowed in an if condition",
                    as_span,
                ))
            }
            Some(count) if *count > 0 => {
                return Err(Self::misplaced("only one capture per condition is supported", as_span))
            }
            Some(count) => *count += 1,
        }
        Ok(Some(self.parse_ident()?))
    }

    fn token_to_matchop(kind: &TokenKind) -> Option<(MatchOp, bool)> {
        match kind {
            TokenKind::Matches => Some((MatchOp::Matches, false)),
            TokenKind::MatchesI => Some((MatchOp::Matches, true)),
            TokenKind::Has => Some((MatchOp::Has, false)),
            TokenKind::HasI => Some((MatchOp::Has, true)),
            _ => None,
        }
    }

    fn token_to_binop(token: &Token) -> Result<BinOp> {
        match token.kind {
            TokenKind::Plus => Ok(BinOp::Add),
            TokenKind::Minus => Ok(BinOp::Sub),
            TokenKind::Star => Ok(BinOp::Mul),
            TokenKind::Slash => Ok(BinOp::Div),
            TokenKind::Percent => Ok(BinOp::Mod),
            TokenKind::EqEq => Ok(BinOp::Eq),
            TokenKind::Ne => Ok(BinOp::Ne),
            TokenKind::Lt => Ok(BinOp::Lt),
            TokenKind::Le => Ok(BinOp::Le),
            TokenKind::Gt => Ok(BinOp::Gt),
            TokenKind::Ge => Ok(BinOp::Ge),
            TokenKind::AndAnd => Ok(BinOp::And),
            TokenKind::OrOr => Ok(BinOp::Or),
            TokenKind::And => Ok(BinOp::BitAnd),
            TokenKind::Or => Ok(BinOp::BitOr),
            TokenKind::Caret => Ok(BinOp::BitXor),
            TokenKind::Shl => Ok(BinOp::Shl),
            TokenKind::Shr => Ok(BinOp::Shr),
            ref other => Err(Error::UnexpectedToken {
                expected: "binary operator".to_string(),
                got: other.to_string(),
                span: token.span,
            }),
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.current_kind() {
            TokenKind::Not => Some(UnOp::Not),
            TokenKind::Tilde => Some(UnOp::BitNot),
            TokenKind::Minus => Some(UnOp::Neg),
            _ => None,
        };
        match op {
            Some(op) => {
                let start = self.advance().span;
                let expr = self.parse_unary()?;
                let span = start.merge(&expr.span());
                Ok(Expr::Unary { op, expr: Box::new(expr), span })
            }
            None => {
                let primary = self.parse_primary()?;
                self.parse_postfix(primary)
            }
        }
    }

    /// Calls, indexing and `.member` access
    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr> {
        loop {
            match self.current_kind() {
                TokenKind::LParen => {
                    let Expr::Ident(callee) = expr else {
                        return Err(Self::misplaced(
                            "only named functions can be called",
                            self.current().span,
                        ));
                    };
                    self.advance();
                    let mut args = Vec::new();
                    while !self.check(&TokenKind::RParen) && !self.is_at_end() {
                        args.push(self.parse_expr()?);
                        if !self.consume(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    let span = callee.span.merge(&self.prev_span());
                    expr = Expr::Call { callee, args, span };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    let span = expr.span().merge(&self.prev_span());
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                        span,
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let member = self.parse_ident()?;
                    let span = expr.span().merge(&member.span);
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(Expr::Literal(Literal::String(member.name, member.span))),
                        span,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.current().clone();

        let expr = match token.kind {
            TokenKind::IntLit(n) => {
                self.advance();
                Expr::Literal(Literal::Int(n, token.span))
            }
            TokenKind::StringLit(s) => {
                self.advance();
                // adjacent literals concatenate
                let mut value = s;
                let mut span = token.span;
                while let TokenKind::StringLit(next) = self.current_kind().clone() {
                    value.push_str(&next);
                    span = span.merge(&self.advance().span);
                }
                Expr::Literal(Literal::String(value, span))
            }
            TokenKind::True => {
                self.advance();
                Expr::Literal(Literal::Bool(true, token.span))
            }
            TokenKind::False => {
                self.advance();
                Expr::Literal(Literal::Bool(false, token.span))
            }
            TokenKind::Ident(_) => Expr::Ident(self.parse_ident()?),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                expr
            }
            TokenKind::LBracket => self.parse_array_or_range()?,
            TokenKind::LBrace => self.parse_dict()?,
            other => {
                return Err(Error::ExpectedExpr {
                    got: other.to_string(),
                    span: token.span,
                })
            }
        };

        Ok(expr)
    }

    /// `[a..b]` or `[e1, e2, ...]`
    fn parse_array_or_range(&mut self) -> Result<Expr> {
        let start = self.advance().span;
        if self.consume(&TokenKind::RBracket) {
            return Ok(Expr::Array {
                elements: Vec::new(),
                span: start.merge(&self.prev_span()),
            });
        }

        let first = self.parse_expr()?;
        if self.consume(&TokenKind::DotDot) {
            let end = self.parse_expr()?;
            self.expect(TokenKind::RBracket)?;
            return Ok(Expr::Range {
                start: Box::new(first),
                end: Box::new(end),
                span: start.merge(&self.prev_span()),
            });
        }

        let mut elements = vec![first];
        while self.consume(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            elements.push(self.parse_expr()?);
        }
        self.expect(TokenKind::RBracket)?;
        Ok(Expr::Array {
            elements,
            span: start.merge(&self.prev_span()),
        })
    }

    /// `{ 'key': value, name: value }`
    fn parse_dict(&mut self) -> Result<Expr> {
        let start = self.advance().span;
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let key = match self.current_kind() {
                TokenKind::Ident(_) => {
                    let ident = self.parse_ident()?;
                    Expr::Literal(Literal::String(ident.name, ident.span))
                }
                _ => self.parse_expr()?,
            };
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expr()?;
            entries.push((key, value));
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expr::Dict {
            entries,
            span: start.merge(&self.prev_span()),
        })
    }
}
