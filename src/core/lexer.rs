// lexer.rs

use std::time::{Duration, Instant};
use thiserror::Error;
use unicode_ident::{is_xid_continue, is_xid_start};
use unicode_normalization::UnicodeNormalization;

use crate::core::keywords;
use crate::core::token::{Token, TokenKind};

/// Lexer error types with detailed location.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("Invalid character '{ch}' at {line}:{column}")]
    InvalidCharacter { ch: char, line: usize, column: usize },
    #[error("Unterminated string starting at {line}:{column}")]
    UnterminatedString { line: usize, column: usize },
    #[error("Unterminated comment starting at {line}:{column}")]
    UnterminatedComment { line: usize, column: usize },
    #[error("Invalid number literal '{text}' at {line}:{column}")]
    InvalidNumber { text: String, line: usize, column: usize },
}

impl LexError {
    pub fn position(&self) -> (usize, usize) {
        match self {
            LexError::InvalidCharacter { line, column, .. }
            | LexError::UnterminatedString { line, column }
            | LexError::UnterminatedComment { line, column }
            | LexError::InvalidNumber { line, column, .. } => (*line, *column),
        }
    }
}

/// Timing collected when profiling is enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexProfile {
    pub elapsed: Duration,
    pub tokens: usize,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    profiling: bool,
    profile: Option<LexProfile>,
    consumed_eof: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.nfc().collect();
        Self {
            chars,
            pos: 0,
            line: 1,
            col: 1,
            profiling: false,
            profile: None,
            consumed_eof: false,
        }
    }

    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    /// Timing of the last `tokenize` call, when profiling was on.
    pub fn profile(&self) -> Option<LexProfile> {
        self.profile
    }

    #[inline]
    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    #[inline]
    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    #[inline]
    fn advance_char(&mut self) -> Option<char> {
        let ch = self.current()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        if self.consumed_eof {
            return Ok(None);
        }
        loop {
            let ch = match self.current() {
                Some(ch) => ch,
                None => {
                    self.consumed_eof = true;
                    return Ok(Some(Token::eof(self.line, self.col)));
                }
            };

            if ch.is_whitespace() {
                self.advance_char();
                continue;
            }
            if ch == '#' || (ch == '/' && self.peek_char() == Some('/')) {
                self.skip_line_comment();
                continue;
            }
            if ch == '/' && self.peek_char() == Some('*') {
                self.skip_block_comment()?;
                continue;
            }

            let (line, column) = (self.line, self.col);
            let token = if ch.is_ascii_digit() {
                self.lex_number()?
            } else if ch == '"' || ch == '\'' {
                self.lex_string(ch)?
            } else if is_identifier_start(ch) {
                self.lex_identifier()
            } else if let Some(kind) = self.match_multi_char_operator(ch) {
                self.advance_char();
                self.advance_char();
                let lexeme = kind.to_string();
                Token::new(kind, lexeme, line, column)
            } else if let Some(kind) = match_single_char_token(ch) {
                self.advance_char();
                Token::new(kind, ch.to_string(), line, column)
            } else {
                return Err(LexError::InvalidCharacter { ch, line, column });
            };
            return Ok(Some(token));
        }
    }

    /// Tokenizes the whole input. The result always ends with exactly one
    /// `Eof` token.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let started = self.profiling.then(Instant::now);
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            let is_eof = matches!(token.kind, TokenKind::Eof);
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        if let Some(started) = started {
            let profile = LexProfile { elapsed: started.elapsed(), tokens: tokens.len() };
            tracing::info!(elapsed_us = profile.elapsed.as_micros() as u64, tokens = profile.tokens, "tokenize profile");
            self.profile = Some(profile);
        }
        Ok(tokens)
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.advance_char() {
            if ch == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let (line, column) = (self.line, self.col);
        self.advance_char();
        self.advance_char();
        while let Some(ch) = self.advance_char() {
            if ch == '*' && self.current() == Some('/') {
                self.advance_char();
                return Ok(());
            }
        }
        Err(LexError::UnterminatedComment { line, column })
    }

    fn lex_number(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.col);
        let mut text = String::new();
        while let Some(ch) = self.current().filter(|c| c.is_ascii_digit()) {
            text.push(ch);
            self.advance_char();
        }
        let is_float = self.current() == Some('.')
            && self.peek_char().map(|c| c.is_ascii_digit()).unwrap_or(false);
        if is_float {
            text.push('.');
            self.advance_char();
            while let Some(ch) = self.current().filter(|c| c.is_ascii_digit()) {
                text.push(ch);
                self.advance_char();
            }
            let value: f64 = text
                .parse()
                .map_err(|_| LexError::InvalidNumber { text: text.clone(), line, column })?;
            return Ok(Token::new(TokenKind::Float(value), text, line, column));
        }
        let value: i64 = text
            .parse()
            .map_err(|_| LexError::InvalidNumber { text: text.clone(), line, column })?;
        Ok(Token::new(TokenKind::Integer(value), text, line, column))
    }

    fn lex_string(&mut self, quote: char) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.col);
        self.advance_char();
        let mut value = String::new();
        let mut lexeme = String::from(quote);
        loop {
            let ch = match self.advance_char() {
                Some(ch) => ch,
                None => return Err(LexError::UnterminatedString { line, column }),
            };
            lexeme.push(ch);
            if ch == quote {
                break;
            }
            if ch == '\n' {
                return Err(LexError::UnterminatedString { line, column });
            }
            if ch == '\\' {
                let esc = self
                    .advance_char()
                    .ok_or(LexError::UnterminatedString { line, column })?;
                lexeme.push(esc);
                value.push(match esc {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
                continue;
            }
            value.push(ch);
        }
        Ok(Token::new(TokenKind::Str(value), lexeme, line, column))
    }

    fn lex_identifier(&mut self) -> Token {
        let (line, column) = (self.line, self.col);
        let mut ident = String::new();
        while let Some(ch) = self.current().filter(|c| is_identifier_continue(*c)) {
            ident.push(ch);
            self.advance_char();
        }
        let kind = keywords::lookup(&ident).unwrap_or_else(|| TokenKind::Identifier(ident.clone()));
        Token::new(kind, ident, line, column)
    }

    fn match_multi_char_operator(&self, ch: char) -> Option<TokenKind> {
        let next = self.peek_char()?;
        Some(match (ch, next) {
            (':', '=') => TokenKind::ColonAssign,
            ('=', '=') => TokenKind::DoubleEquals,
            ('!', '=') => TokenKind::NotEquals,
            ('<', '=') => TokenKind::LessEqual,
            ('>', '=') => TokenKind::GreaterEqual,
            ('&', '&') => TokenKind::AndAnd,
            ('|', '|') => TokenKind::OrOr,
            _ => return None,
        })
    }
}

fn match_single_char_token(ch: char) -> Option<TokenKind> {
    Some(match ch {
        '+' => TokenKind::Plus,
        '-' => TokenKind::Minus,
        '*' => TokenKind::Star,
        '/' => TokenKind::Slash,
        '%' => TokenKind::Percent,
        '=' => TokenKind::Assign,
        '<' => TokenKind::LessThan,
        '>' => TokenKind::GreaterThan,
        '!' => TokenKind::Bang,
        '(' => TokenKind::OpenParen,
        ')' => TokenKind::CloseParen,
        '{' => TokenKind::OpenBrace,
        '}' => TokenKind::CloseBrace,
        '[' => TokenKind::OpenBracket,
        ']' => TokenKind::CloseBracket,
        ',' => TokenKind::Comma,
        ':' => TokenKind::Colon,
        ';' => TokenKind::Semicolon,
        '.' => TokenKind::Dot,
        '@' => TokenKind::At,
        _ => return None,
    })
}

#[inline]
fn is_identifier_start(ch: char) -> bool {
    ch == '_' || is_xid_start(ch)
}

#[inline]
fn is_identifier_continue(ch: char) -> bool {
    ch == '_' || is_xid_continue(ch)
}

/// Convenience wrapper over `Lexer::tokenize`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn numbers_and_operators() {
        assert_eq!(
            kinds("x := 3.5 + 2 % 1"),
            vec![
                TokenKind::Identifier("x".into()),
                TokenKind::ColonAssign,
                TokenKind::Float(3.5),
                TokenKind::Plus,
                TokenKind::Integer(2),
                TokenKind::Percent,
                TokenKind::Integer(1),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_aliases() {
        assert_eq!(
            kinds("definir func y verdadero nulo"),
            vec![
                TokenKind::Func,
                TokenKind::Func,
                TokenKind::AndAnd,
                TokenKind::Boolean(true),
                TokenKind::Null,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let src = "var a = 1 // tail\n# hash\n/* block\n */ a";
        assert_eq!(kinds(src).len(), 6);
    }

    #[test]
    fn string_escapes_and_positions() {
        let toks = tokenize("imprimir('a\\tb')").unwrap();
        assert_eq!(toks[2].kind, TokenKind::Str("a\tb".into()));
        assert_eq!((toks[2].line, toks[2].column), (1, 10));
    }

    #[test]
    fn unterminated_string_reports_start() {
        let err = tokenize("var s = \"abc").unwrap_err();
        assert_eq!(err, LexError::UnterminatedString { line: 1, column: 9 });
    }

    #[test]
    fn invalid_character() {
        let err = tokenize("var a = 1\nvar b = $").unwrap_err();
        assert_eq!(err, LexError::InvalidCharacter { ch: '$', line: 2, column: 9 });
    }

    #[test]
    fn unterminated_block_comment() {
        assert!(matches!(tokenize("/* nope"), Err(LexError::UnterminatedComment { .. })));
    }

    #[test]
    fn profiling_records_token_count() {
        let mut lx = Lexer::new("var x = 1").with_profiling(true);
        let toks = lx.tokenize().unwrap();
        assert_eq!(lx.profile().map(|p| p.tokens), Some(toks.len()));
    }
}
