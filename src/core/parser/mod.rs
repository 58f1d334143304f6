//! Recursive-descent parser for Cobra with per-construct error recovery.
//!
//! Statements are selected through a dispatch table keyed by the leading
//! token kind. Multi-statement constructs record their errors and skip the
//! offending token, so one pass reports every problem it can find. Advisory
//! issues go to a side channel and never fail the parse.

mod declarations;
mod expressions;
mod statements;

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::mem::Discriminant;
use thiserror::Error;

use crate::core::ast::{Block, Node};
use crate::core::token::{Token, TokenKind};

/// A single fatal problem found while parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.column)
    }
}

/// Every fatal error of one parse, joined by newlines when displayed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", join_errors(.errors))]
pub struct ParseError {
    pub errors: Vec<SyntaxError>,
}

fn join_errors(errors: &[SyntaxError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n")
}

impl ParseError {
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisoryKind {
    AliasMixing,
    SpecialMethodCollision,
    DeferOutsideFunction,
    UnprovenGuardTermination,
    KeywordSuggestion,
}

/// Non-fatal finding reported alongside the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Advisory {
    pub kind: AdvisoryKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    pub program: Vec<Node>,
    pub advisories: Vec<Advisory>,
}

type PResult<T> = Result<T, SyntaxError>;
type Production = fn(&mut Parser) -> PResult<Node>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockContext {
    Function,
    Method,
    With,
    Class,
}

/// Leading token kind → statement production.
static DISPATCH: Lazy<HashMap<Discriminant<TokenKind>, Production>> = Lazy::new(|| {
    let entries: [(TokenKind, Production); 36] = [
        (TokenKind::Var, Parser::parse_var_decl),
        (TokenKind::Variable, Parser::parse_var_decl),
        (TokenKind::If, Parser::parse_conditional),
        (TokenKind::Guard, Parser::parse_guard),
        (TokenKind::While, Parser::parse_while),
        (TokenKind::For, Parser::parse_for),
        (TokenKind::Func, Parser::parse_function),
        (TokenKind::Async, Parser::parse_async),
        (TokenKind::At, Parser::parse_decorated),
        (TokenKind::Class, Parser::parse_class),
        (TokenKind::Enum, Parser::parse_enum),
        (TokenKind::Interface, Parser::parse_interface),
        (TokenKind::Return, Parser::parse_return),
        (TokenKind::Yield, Parser::parse_yield),
        (TokenKind::Throw, Parser::parse_throw),
        (TokenKind::Try, Parser::parse_try),
        (TokenKind::Import, Parser::parse_import),
        (TokenKind::Use, Parser::parse_use),
        (TokenKind::From, Parser::parse_import_from),
        (TokenKind::Export, Parser::parse_export),
        (TokenKind::Print, Parser::parse_print),
        (TokenKind::Thread, Parser::parse_thread),
        (TokenKind::Break, Parser::parse_break),
        (TokenKind::Continue, Parser::parse_continue),
        (TokenKind::Pass, Parser::parse_pass),
        (TokenKind::Assert, Parser::parse_assert),
        (TokenKind::Del, Parser::parse_del),
        (TokenKind::Global, Parser::parse_global),
        (TokenKind::NonLocal, Parser::parse_nonlocal),
        (TokenKind::With, Parser::parse_with),
        (TokenKind::Defer, Parser::parse_defer),
        (TokenKind::Switch, Parser::parse_switch),
        (TokenKind::Macro, Parser::parse_macro),
        (TokenKind::List, Parser::parse_typed_list),
        (TokenKind::Dict, Parser::parse_typed_dict),
        (TokenKind::Option, Parser::parse_option_decl),
    ];
    entries
        .into_iter()
        .map(|(kind, production)| (std::mem::discriminant(&kind), production))
        .collect()
});

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
    advisories: Vec<Advisory>,
    context: Vec<BlockContext>,
    /// normalized method name → spelling that produced it, per class being parsed
    class_aliases: Vec<HashMap<String, String>>,
    known_classes: HashSet<String>,
}

impl Parser {
    /// Create new parser instance; ensure trailing EOF token present
    pub fn new(mut tokens: Vec<Token>) -> Self {
        let needs_eof = match tokens.last() {
            Some(t) => !matches!(t.kind, TokenKind::Eof),
            None => true,
        };
        if needs_eof {
            let (line, column) = tokens.last().map(|t| (t.line, t.column + 1)).unwrap_or((1, 1));
            tokens.push(Token::eof(line, column));
        }
        Parser {
            tokens,
            pos: 0,
            errors: Vec::new(),
            advisories: Vec::new(),
            context: Vec::new(),
            class_aliases: Vec::new(),
            known_classes: HashSet::new(),
        }
    }

    /// Parses every statement. Fails with all recorded errors if any
    /// construct reported one.
    pub fn parse(&mut self) -> Result<Vec<Node>, ParseError> {
        let (program, errors) = self.parse_partial();
        if errors.is_empty() {
            Ok(program)
        } else {
            Err(ParseError { errors })
        }
    }

    /// Best-effort AST plus every fatal error found. A top-level statement
    /// error stops the pass.
    pub fn parse_partial(&mut self) -> (Vec<Node>, Vec<SyntaxError>) {
        self.check_alias_mixing();
        let mut nodes = Vec::new();
        while !self.is_at_end() {
            if self.match_token(&[TokenKind::Semicolon]) {
                continue;
            }
            match self.parse_statement() {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    tracing::debug!(error = %e, "top-level statement failed");
                    self.errors.push(e);
                    break;
                }
            }
        }
        tracing::debug!(statements = nodes.len(), errors = self.errors.len(), "parse finished");
        (nodes, std::mem::take(&mut self.errors))
    }

    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }

    /// Parses a single statement based on current token peek
    fn parse_statement(&mut self) -> PResult<Node> {
        let kind = self.peek().kind.clone();
        if let Some(production) = DISPATCH.get(&std::mem::discriminant(&kind)) {
            let node = production(self)?;
            let _ = self.match_token(&[TokenKind::Semicolon]);
            return Ok(node);
        }
        let node = self.parse_expression_statement()?;
        let _ = self.match_token(&[TokenKind::Semicolon]);
        Ok(node)
    }

    /// Statements up to (not including) one of `terminators`. Errors are
    /// recorded and the offending token skipped.
    fn parse_block_until(&mut self, terminators: &[TokenKind], construct: &str) -> Block {
        let mut stmts = Vec::new();
        while !self.check_any(terminators) && !self.is_at_end() {
            if self.match_token(&[TokenKind::Semicolon]) {
                continue;
            }
            let start = self.pos;
            match self.parse_statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(e) => {
                    tracing::debug!(construct, error = %e, "recovering inside block");
                    self.errors.push(SyntaxError {
                        message: format!("Error in '{}' body: {}", construct, e.message),
                        line: e.line,
                        column: e.column,
                    });
                    if !self.is_at_end() {
                        self.advance();
                    }
                    continue;
                }
            }
            if self.pos == start {
                self.report_here(&format!("Statement inside '{}' consumed no tokens", construct));
                self.advance();
            }
        }
        stmts
    }

    /// `':' block 'fin'` with recovery on both delimiters.
    fn parse_colon_block(&mut self, construct: &str) -> Block {
        self.expect_or_report(TokenKind::Colon, &format!("Expected ':' after '{}' header", construct));
        let body = self.parse_block_until(&[TokenKind::End], construct);
        self.expect_or_report(TokenKind::End, &format!("Expected 'fin' to close '{}'", construct));
        body
    }

    fn in_context(&self, wanted: &[BlockContext]) -> bool {
        self.context.iter().any(|c| wanted.contains(c))
    }

    fn with_context<T>(&mut self, ctx: BlockContext, f: impl FnOnce(&mut Self) -> T) -> T {
        self.context.push(ctx);
        let out = f(self);
        self.context.pop();
        out
    }

    /* ── Advisories ───────────────────────────────────────── */

    fn advise(&mut self, kind: AdvisoryKind, message: String, line: usize, column: usize) {
        tracing::warn!(?kind, line, column, "{}", message);
        self.advisories.push(Advisory { kind, message, line, column });
    }

    /// One advisory per construct whose keyword appears in two spellings.
    fn check_alias_mixing(&mut self) {
        let mut first_seen: HashMap<Discriminant<TokenKind>, String> = HashMap::new();
        let mut reported: HashSet<Discriminant<TokenKind>> = HashSet::new();
        let mut found = Vec::new();
        for tok in &self.tokens {
            if !tok.kind.is_keyword() {
                continue;
            }
            let key = std::mem::discriminant(&tok.kind);
            match first_seen.get(&key) {
                None => {
                    first_seen.insert(key, tok.lexeme.clone());
                }
                Some(first) if *first != tok.lexeme && reported.insert(key) => {
                    found.push((
                        format!("Mixed spellings '{}' and '{}' for the same keyword", first, tok.lexeme),
                        tok.line,
                        tok.column,
                    ));
                }
                Some(_) => {}
            }
        }
        for (message, line, column) in found {
            self.advise(AdvisoryKind::AliasMixing, message, line, column);
        }
    }

    /* ── Token utils ─────────────────────────────────────── */
    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    fn previous(&self) -> &Token {
        if self.pos == 0 {
            &self.tokens[0]
        } else {
            &self.tokens[self.pos - 1]
        }
    }

    fn peek(&self) -> &Token {
        // an EOF token is always present at the end
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        !self.is_at_end() && &self.peek().kind == kind
    }

    fn check_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.iter().any(|k| self.check(k))
    }

    fn match_token(&mut self, kinds: &[TokenKind]) -> bool {
        for kind in kinds {
            if self.check(kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, msg: &str) -> PResult<&Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.err_here(msg))
        }
    }

    fn consume_identifier(&mut self, msg: &str) -> PResult<String> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            ref k if k.is_keyword() => Err(self.err_here(&format!("{}: '{}' is a reserved word", msg, tok.lexeme))),
            _ => Err(self.err_here(msg)),
        }
    }

    fn consume_string(&mut self, msg: &str) -> PResult<String> {
        if let TokenKind::Str(s) = self.peek().kind.clone() {
            self.advance();
            Ok(s)
        } else {
            Err(self.err_here(msg))
        }
    }

    /// Consumes `kind` or records an error and skips one token.
    fn expect_or_report(&mut self, kind: TokenKind, msg: &str) -> bool {
        if self.check(&kind) {
            self.advance();
            return true;
        }
        self.report_here(msg);
        if !self.is_at_end() {
            self.advance();
        }
        false
    }

    fn report_here(&mut self, msg: &str) {
        let e = self.err_here(msg);
        self.errors.push(e);
    }

    /// True when the current token sits on the same line as the previous one.
    fn same_line(&self) -> bool {
        self.pos > 0 && self.peek().line == self.previous().line
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn err_here(&self, msg: &str) -> SyntaxError {
        let tok = self.peek();
        self.err_at(msg, tok.line, tok.column)
    }

    fn err_at(&self, msg: &str, line: usize, column: usize) -> SyntaxError {
        SyntaxError { message: msg.into(), line, column }
    }
}

/// Parses a token stream, returning the program and its advisories.
pub fn parse(tokens: Vec<Token>) -> Result<ParseOutput, ParseError> {
    let mut parser = Parser::new(tokens);
    let program = parser.parse()?;
    Ok(ParseOutput { program, advisories: parser.advisories })
}

/// Tokenizes and parses in one step.
pub fn parse_source(source: &str) -> Result<ParseOutput, crate::core::error::CobraError> {
    let tokens = crate::core::lexer::tokenize(source)?;
    Ok(parse(tokens)?)
}

#[cfg(test)]
mod tests;
