//! Token definitions for the js2esi source language

use std::fmt;

use crate::utils::Span;

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn eof(span: Span) -> Self {
        Self { kind: TokenKind::Eof, span }
    }
}

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ============ Keywords ============
    /// function
    Function,
    /// return
    Return,
    /// if
    If,
    /// else
    Else,
    /// for
    For,
    /// of
    Of,
    /// break
    Break,
    /// try
    Try,
    /// catch
    Catch,
    /// except
    Except,
    /// let
    Let,
    /// var
    Var,
    /// const
    Const,
    /// true
    True,
    /// false
    False,
    /// require
    Require,
    /// include
    Include,
    /// eval
    Eval,
    /// force (only meaningful inside `require(...)`)
    Force,
    /// as (capture binding after `matches`)
    As,

    // ============ Keyword operators ============
    /// matches
    Matches,
    /// matches_i
    MatchesI,
    /// has
    Has,
    /// has_i
    HasI,

    // ============ Identifiers and Literals ============
    Ident(String),
    IntLit(i64),
    StringLit(String),
    /// `//### text`, kept as an ESI comment; consecutive lines are joined
    EsiComment(String),

    // ============ Operators ============
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// =
    Eq,
    /// == (also ===)
    EqEq,
    /// != (also !==)
    Ne,
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,
    /// &&
    AndAnd,
    /// ||
    OrOr,
    /// !
    Not,
    /// &
    And,
    /// |
    Or,
    /// ^
    Caret,
    /// ~
    Tilde,
    /// <<
    Shl,
    /// >>
    Shr,
    /// +=
    PlusEq,
    /// -=
    MinusEq,
    /// *=
    StarEq,
    /// /=
    SlashEq,
    /// %=
    PercentEq,
    /// ++
    PlusPlus,
    /// --
    MinusMinus,
    /// .
    Dot,
    /// ..
    DotDot,

    // ============ Delimiters ============
    /// (
    LParen,
    /// )
    RParen,
    /// {
    LBrace,
    /// }
    RBrace,
    /// [
    LBracket,
    /// ]
    RBracket,
    /// ,
    Comma,
    /// :
    Colon,
    /// ;
    Semicolon,

    /// End of file
    Eof,
}

impl TokenKind {
    /// Try to convert an identifier to a keyword
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "function" => Some(TokenKind::Function),
            "return" => Some(TokenKind::Return),
            "if" => Some(TokenKind::If),
            "else" => Some(TokenKind::Else),
            "for" => Some(TokenKind::For),
            "of" => Some(TokenKind::Of),
            "break" => Some(TokenKind::Break),
            "try" => Some(TokenKind::Try),
            "catch" => Some(TokenKind::Catch),
            "except" => Some(TokenKind::Except),
            "let" => Some(TokenKind::Let),
            "var" => Some(TokenKind::Var),
            "const" => Some(TokenKind::Const),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "require" => Some(TokenKind::Require),
            "include" => Some(TokenKind::Include),
            "eval" => Some(TokenKind::Eval),
            "force" => Some(TokenKind::Force),
            "as" => Some(TokenKind::As),
            "matches" => Some(TokenKind::Matches),
            "matches_i" => Some(TokenKind::MatchesI),
            "has" => Some(TokenKind::Has),
            "has_i" => Some(TokenKind::HasI),
            _ => None,
        }
    }

    /// Get the binding power of a binary operator (higher binds tighter).
    /// Unary operators bind tighter than all of these, including
    /// `matches`/`has`, so `!v matches 'x'` is `(!v) matches 'x'`.
    pub fn binary_precedence(&self) -> Option<u8> {
        match self {
            TokenKind::OrOr => Some(1),
            TokenKind::AndAnd => Some(2),
            TokenKind::EqEq
            | TokenKind::Ne
            | TokenKind::Lt
            | TokenKind::Le
            | TokenKind::Gt
            | TokenKind::Ge
            | TokenKind::Matches
            | TokenKind::MatchesI
            | TokenKind::Has
            | TokenKind::HasI => Some(3),
            TokenKind::Or => Some(4),
            TokenKind::Caret => Some(5),
            TokenKind::And => Some(6),
            TokenKind::Shl | TokenKind::Shr => Some(7),
            TokenKind::Plus | TokenKind::Minus => Some(8),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some(9),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Function => "function",
            TokenKind::Return => "return",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::For => "for",
            TokenKind::Of => "of",
            TokenKind::Break => "break",
            TokenKind::Try => "try",
            TokenKind::Catch => "catch",
            TokenKind::Except => "except",
            TokenKind::Let => "let",
            TokenKind::Var => "var",
            TokenKind::Const => "const",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Require => "require",
            TokenKind::Include => "include",
            TokenKind::Eval => "eval",
            TokenKind::Force => "force",
            TokenKind::As => "as",
            TokenKind::Matches => "matches",
            TokenKind::MatchesI => "matches_i",
            TokenKind::Has => "has",
            TokenKind::HasI => "has_i",
            TokenKind::Ident(name) => return write!(f, "identifier `{}`", name),
            TokenKind::IntLit(n) => return write!(f, "number `{}`", n),
            TokenKind::StringLit(s) => return write!(f, "string {:?}", s),
            TokenKind::EsiComment(text) => return write!(f, "ESI comment {:?}", text),
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Eq => "=",
            TokenKind::EqEq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Not => "!",
            TokenKind::And => "&",
            TokenKind::Or => "|",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::PercentEq => "%=",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::Dot => ".",
            TokenKind::DotDot => "..",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Eof => "end of file",
        };
        write!(f, "`{}`", text)
    }
}
