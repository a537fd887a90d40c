//! Lexer for the js2esi source language
//!
//! Converts source text into a stream of tokens. Line and block comments are
//! skipped, except `//###` lines, which become `EsiComment` tokens. Every
//! span stays a byte offset into the original text so later diagnostics
//! still point at the right line and column.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, Result, Span};

/// The lexer state
pub struct Lexer {
    /// Source characters with their byte offsets
    source: Vec<(usize, char)>,
    /// Byte length of the source
    len: usize,
    /// Current position in `source`
    pos: usize,
    /// Start position of current token
    start: usize,
    /// File ID for span tracking
    file_id: usize,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: &str, file_id: usize) -> Self {
        Self {
            source: source.char_indices().collect(),
            len: source.len(),
            pos: 0,
            start: 0,
            file_id,
        }
    }

    /// Rewind to the beginning of the input
    pub fn reset(&mut self) {
        self.pos = 0;
        self.start = 0;
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.source.get(self.pos + n).map(|&(_, c)| c)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn offset(&self, pos: usize) -> usize {
        self.source.get(pos).map(|&(o, _)| o).unwrap_or(self.len)
    }

    /// Create a span from start to current position
    fn make_span(&self) -> Span {
        Span::new(self.offset(self.start), self.offset(self.pos), self.file_id)
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.make_span())
    }

    fn text(&self, from: usize, to: usize) -> String {
        self.source[from..to].iter().map(|&(_, c)| c).collect()
    }

    /// Skip whitespace and comments
    fn skip_trivia(&mut self) -> Result<()> {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '/' if self.at_esi_comment() => break,
                '/' if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                '/' if self.peek_at(1) == Some('*') => {
                    let open = self.pos;
                    self.pos += 2;
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.pos += 2;
                                break;
                            }
                            (Some(_), _) => {
                                self.advance();
                            }
                            (None, _) => {
                                return Err(Error::UnterminatedComment {
                                    span: Span::new(self.offset(open), self.len, self.file_id),
                                });
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn at_esi_comment(&self) -> bool {
        (0..5).all(|i| self.peek_at(i) == Some(if i < 2 { '/' } else { '#' }))
    }

    /// Read a `//###` comment; directly following `//###` lines continue it
    fn read_esi_comment(&mut self) -> Token {
        let mut lines = Vec::new();
        loop {
            self.pos += 5;
            let line_start = self.pos;
            while self.peek().map_or(false, |c| c != '\n') {
                self.advance();
            }
            lines.push(self.text(line_start, self.pos).trim_end().to_string());

            let end = self.pos;
            if self.eat('\n') {
                while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
                    self.advance();
                }
            }
            if !self.at_esi_comment() {
                self.pos = end;
                break;
            }
        }
        self.make_token(TokenKind::EsiComment(strip_common_indent(&lines)))
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                self.advance();
            } else {
                break;
            }
        }
        let text = self.text(self.start, self.pos);
        let kind = TokenKind::keyword_from_str(&text).unwrap_or(TokenKind::Ident(text));
        self.make_token(kind)
    }

    /// Read an integer literal (decimal or hex)
    fn read_number(&mut self) -> Result<Token> {
        let radix = if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.pos += 2;
            16
        } else {
            10
        };
        let digits_start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_digit(radix) || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        // `1.5` but not the range in `[1..5]`
        if radix == 10 && self.peek() == Some('.') && self.peek_at(1).map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().map_or(false, |c| c.is_ascii_digit() || c == '_') {
                self.advance();
            }
            return Err(Error::FloatLiteral {
                text: self.text(self.start, self.pos),
                span: self.make_span(),
            });
        }
        // `12abc` is neither a number nor an identifier
        if self.peek().map_or(false, |c| c.is_alphanumeric()) {
            while self.peek().map_or(false, |c| c.is_alphanumeric() || c == '_') {
                self.advance();
            }
        }
        let digits: String = self.text(digits_start, self.pos).chars().filter(|&c| c != '_').collect();
        match i64::from_str_radix(&digits, radix) {
            Ok(value) => Ok(self.make_token(TokenKind::IntLit(value))),
            Err(_) => Err(Error::InvalidNumber {
                text: self.text(self.start, self.pos),
                span: self.make_span(),
            }),
        }
    }

    /// Read a quoted string; `'''...'''` is raw and may span lines
    fn read_string(&mut self, quote: char) -> Result<Token> {
        if quote == '\'' && self.peek_at(1) == Some('\'') && self.peek_at(2) == Some('\'') {
            self.pos += 3;
            let body_start = self.pos;
            loop {
                if self.is_at_end() {
                    return Err(Error::UnterminatedString { span: self.make_span() });
                }
                if self.peek() == Some('\'') && self.peek_at(1) == Some('\'') && self.peek_at(2) == Some('\'') {
                    let value = self.text(body_start, self.pos);
                    self.pos += 3;
                    return Ok(self.make_token(TokenKind::StringLit(value)));
                }
                self.advance();
            }
        }

        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return Err(Error::UnterminatedString { span: self.make_span() }),
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some('0') => value.push('\0'),
                    Some(c) => value.push(c),
                    None => return Err(Error::UnterminatedString { span: self.make_span() }),
                },
                Some(c) => value.push(c),
            }
        }
        Ok(self.make_token(TokenKind::StringLit(value)))
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia()?;
        self.start = self.pos;

        let Some(c) = self.peek() else {
            return Ok(Token::eof(self.make_span()));
        };

        if self.at_esi_comment() {
            return Ok(self.read_esi_comment());
        }
        if c.is_alphabetic() || c == '_' || c == '$' {
            return Ok(self.read_identifier());
        }
        if c.is_ascii_digit() {
            return self.read_number();
        }
        if c == '\'' || c == '"' {
            return self.read_string(c);
        }

        self.advance();
        let kind = match c {
            '+' => {
                if self.eat('=') {
                    TokenKind::PlusEq
                } else if self.eat('+') {
                    TokenKind::PlusPlus
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('=') {
                    TokenKind::MinusEq
                } else if self.eat('-') {
                    TokenKind::MinusMinus
                } else {
                    TokenKind::Minus
                }
            }
            '*' => if self.eat('=') { TokenKind::StarEq } else { TokenKind::Star },
            '/' => if self.eat('=') { TokenKind::SlashEq } else { TokenKind::Slash },
            '%' => if self.eat('=') { TokenKind::PercentEq } else { TokenKind::Percent },
            '=' => {
                if self.eat('=') {
                    self.eat('=');
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            '!' => {
                if self.eat('=') {
                    self.eat('=');
                    TokenKind::Ne
                } else {
                    TokenKind::Not
                }
            }
            '<' => {
                if self.eat('=') {
                    TokenKind::Le
                } else if self.eat('<') {
                    TokenKind::Shl
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::Ge
                } else if self.eat('>') {
                    TokenKind::Shr
                } else {
                    TokenKind::Gt
                }
            }
            '&' => if self.eat('&') { TokenKind::AndAnd } else { TokenKind::And },
            '|' => if self.eat('|') { TokenKind::OrOr } else { TokenKind::Or },
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '.' => if self.eat('.') { TokenKind::DotDot } else { TokenKind::Dot },
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            other => {
                return Err(Error::UnexpectedChar { ch: other, span: self.make_span() });
            }
        };

        Ok(self.make_token(kind))
    }

    /// Tokenize the entire source; the last token is always `Eof`
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }
}

/// One line loses its leading blanks; several lose only the indent they share
fn strip_common_indent(lines: &[String]) -> String {
    if let [line] = lines {
        return line.trim_start().to_string();
    }
    let indent = lines
        .iter()
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| l.chars().skip(indent).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, 0)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_tokens() {
        let tokens = kinds("function f(a) { return a; }");
        assert!(matches!(tokens[0], TokenKind::Function));
        assert!(matches!(tokens[1], TokenKind::Ident(ref s) if s == "f"));
        assert!(matches!(tokens[2], TokenKind::LParen));
        assert!(matches!(tokens[5], TokenKind::LBrace));
        assert!(matches!(tokens[6], TokenKind::Return));
        assert!(matches!(tokens.last(), Some(TokenKind::Eof)));
    }

    #[test]
    fn test_operators() {
        let tokens = kinds("+ - * / % & | ^ ~ << >> ! == != <= >= < > && || === !== ..");
        let expected = vec![
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Percent,
            TokenKind::And,
            TokenKind::Or,
            TokenKind::Caret,
            TokenKind::Tilde,
            TokenKind::Shl,
            TokenKind::Shr,
            TokenKind::Not,
            TokenKind::EqEq,
            TokenKind::Ne,
            TokenKind::Le,
            TokenKind::Ge,
            TokenKind::Lt,
            TokenKind::Gt,
            TokenKind::AndAnd,
            TokenKind::OrOr,
            TokenKind::EqEq,
            TokenKind::Ne,
            TokenKind::DotDot,
            TokenKind::Eof,
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_keyword_operators() {
        let tokens = kinds("v matches_i 'x' as m has has_i force of");
        assert!(matches!(tokens[1], TokenKind::MatchesI));
        assert!(matches!(tokens[3], TokenKind::As));
        assert!(matches!(tokens[5], TokenKind::Has));
        assert!(matches!(tokens[6], TokenKind::HasI));
        assert!(matches!(tokens[7], TokenKind::Force));
        assert!(matches!(tokens[8], TokenKind::Of));
    }

    #[test]
    fn test_numbers_and_ranges() {
        let tokens = kinds("42 0xFF [1..31]");
        assert!(matches!(tokens[0], TokenKind::IntLit(42)));
        assert!(matches!(tokens[1], TokenKind::IntLit(255)));
        assert!(matches!(tokens[3], TokenKind::IntLit(1)));
        assert!(matches!(tokens[4], TokenKind::DotDot));
        assert!(matches!(tokens[5], TokenKind::IntLit(31)));
    }

    #[test]
    fn test_strings() {
        let tokens = kinds(r#"'it\'s' "a\nb" '''^17$'''"#);
        assert!(matches!(tokens[0], TokenKind::StringLit(ref s) if s == "it's"));
        assert!(matches!(tokens[1], TokenKind::StringLit(ref s) if s == "a\nb"));
        assert!(matches!(tokens[2], TokenKind::StringLit(ref s) if s == "^17$"));
    }

    #[test]
    fn test_comments_keep_positions() {
        let mut lexer = Lexer::new("/* one\n two */\n// three\nx", 0);
        let tokens = lexer.tokenize().unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::Ident(ref s) if s == "x"));
        assert_eq!(tokens[0].span.start, 24);
    }

    #[test]
    fn test_esi_comments() {
        let tokens = kinds("//###   hello\nx // plain\n//### a\n  //###   b\n//###  c\n\n//### d");
        assert_eq!(
            tokens,
            vec![
                TokenKind::EsiComment("hello".into()),
                TokenKind::Ident("x".into()),
                TokenKind::EsiComment("a\n  b\n c".into()),
                TokenKind::EsiComment("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_esi_comment_span() {
        let tokens = Lexer::new("a\n//### one\n//### two\nb", 0).tokenize().unwrap();
        assert_eq!((tokens[1].span.start, tokens[1].span.end), (2, 21));
        assert!(matches!(tokens[2].kind, TokenKind::Ident(ref s) if s == "b"));
    }

    #[test]
    fn test_float_literal_is_rejected() {
        let err = Lexer::new("x = 1.5;", 0).tokenize().unwrap_err();
        assert!(matches!(err, Error::FloatLiteral { ref text, span } if text == "1.5" && span.start == 4));
        assert!(Lexer::new("[1..5]", 0).tokenize().is_ok());
    }

    #[test]
    fn test_unrecognized_character() {
        let err = Lexer::new("a = #;", 0).tokenize().unwrap_err();
        assert!(matches!(err, Error::UnexpectedChar { ch: '#', span } if span.start == 4));
    }

    #[test]
    fn test_unterminated() {
        assert!(matches!(
            Lexer::new("'abc", 0).tokenize(),
            Err(Error::UnterminatedString { .. })
        ));
        assert!(matches!(
            Lexer::new("/* abc", 0).tokenize(),
            Err(Error::UnterminatedComment { .. })
        ));
    }

    #[test]
    fn test_restartable() {
        let mut lexer = Lexer::new("a b", 0);
        let first = lexer.tokenize().unwrap();
        lexer.reset();
        assert_eq!(first, lexer.tokenize().unwrap());
    }
}
