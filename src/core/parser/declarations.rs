//! Functions, classes, enums and interfaces.

use std::collections::HashMap;

use super::{AdvisoryKind, BlockContext, PResult, Parser};
use crate::core::ast::{AbstractMethod, ClassDef, FunctionDef, MethodDef, Node};
use crate::core::token::TokenKind;

impl Parser {
    pub(super) fn parse_function(&mut self) -> PResult<Node> {
        self.parse_function_def(Vec::new(), false).map(Node::Function)
    }

    /// `func nombre<T>(a, b): ... fin` starting at `func`.
    pub(super) fn parse_function_def(&mut self, decorators: Vec<Node>, is_async: bool) -> PResult<FunctionDef> {
        self.consume(TokenKind::Func, "Expected 'func'")?;
        let name = self.consume_identifier("Expected function name")?;
        let type_params = self.parse_type_params()?;
        let params = self.parse_params()?;
        let body = self.with_context(BlockContext::Function, |p| p.parse_colon_block("func"));
        Ok(FunctionDef { name, params, body, decorators, is_async, type_params })
    }

    /// One or more `@expr` lines followed by a (possibly async) function.
    pub(super) fn parse_decorated(&mut self) -> PResult<Node> {
        let mut decorators = Vec::new();
        while self.match_token(&[TokenKind::At]) {
            let expr = self.parse_expression()?;
            decorators.push(Node::Decorator(Box::new(expr)));
        }
        let is_async = self.match_token(&[TokenKind::Async]);
        if !self.check(&TokenKind::Func) {
            return Err(self.err_here("Decorators must be followed by a function definition"));
        }
        self.parse_function_def(decorators, is_async).map(Node::Function)
    }

    /// Optional `<T, U>` after a declared name.
    fn parse_type_params(&mut self) -> PResult<Vec<String>> {
        let mut out = Vec::new();
        if !self.match_token(&[TokenKind::LessThan]) {
            return Ok(out);
        }
        loop {
            out.push(self.consume_identifier("Expected type parameter")?);
            if !self.match_token(&[TokenKind::Comma]) {
                break;
            }
        }
        self.consume(TokenKind::GreaterThan, "Expected '>' after type parameters")?;
        Ok(out)
    }

    /// `(a, b, ...)`; reserved words and repeated names are rejected.
    fn parse_params(&mut self) -> PResult<Vec<String>> {
        self.consume(TokenKind::OpenParen, "Expected '(' before parameters")?;
        let mut params: Vec<String> = Vec::new();
        if !self.check(&TokenKind::CloseParen) {
            loop {
                let (line, column) = (self.peek().line, self.peek().column);
                let name = self.consume_identifier("Expected parameter name")?;
                if params.contains(&name) {
                    return Err(self.err_at(&format!("Duplicate parameter '{}'", name), line, column));
                }
                params.push(name);
                if !self.match_token(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::CloseParen, "Expected ')' after parameters")?;
        Ok(params)
    }

    /// `clase Nombre<T>(Base1, Base2): miembros fin`
    pub(super) fn parse_class(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Class, "Expected 'clase'")?;
        let name = self.consume_identifier("Expected class name")?;
        let type_params = self.parse_type_params()?;
        let mut bases = Vec::new();
        if self.match_token(&[TokenKind::OpenParen]) {
            if !self.check(&TokenKind::CloseParen) {
                loop {
                    bases.push(self.consume_identifier("Expected base class name")?);
                    if !self.match_token(&[TokenKind::Comma]) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::CloseParen, "Expected ')' after base classes")?;
        }
        self.known_classes.insert(name.clone());
        self.expect_or_report(TokenKind::Colon, "Expected ':' after class header");

        self.class_aliases.push(HashMap::new());
        let methods = self.with_context(BlockContext::Class, |p| p.parse_class_members());
        self.class_aliases.pop();

        self.expect_or_report(TokenKind::End, "Expected 'fin' to close 'clase'");
        Ok(Node::Class(ClassDef { name, bases, methods, type_params }))
    }

    fn parse_class_members(&mut self) -> Vec<MethodDef> {
        let mut methods = Vec::new();
        while !self.check(&TokenKind::End) && !self.is_at_end() {
            if self.match_token(&[TokenKind::Semicolon, TokenKind::Pass]) {
                continue;
            }
            let is_async = self.match_token(&[TokenKind::Async]);
            if !self.check_any(&[TokenKind::Method, TokenKind::Func]) {
                self.report_here("Expected 'metodo' or 'func' inside class body");
                self.advance();
                continue;
            }
            match self.parse_method(is_async) {
                Ok(m) => methods.push(m),
                Err(e) => {
                    self.errors.push(super::SyntaxError {
                        message: format!("Error in 'clase' body: {}", e.message),
                        line: e.line,
                        column: e.column,
                    });
                    if !self.is_at_end() {
                        self.advance();
                    }
                }
            }
        }
        methods
    }

    /// `metodo nombre(self, a): ... fin` (or `func`) inside a class.
    fn parse_method(&mut self, is_async: bool) -> PResult<MethodDef> {
        self.advance();
        let name_tok = self.peek().clone();
        let name = self.consume_identifier("Expected method name")?;
        let type_params = self.parse_type_params()?;
        let params = self.parse_params()?;
        let body = self.with_context(BlockContext::Method, |p| p.parse_colon_block("metodo"));
        let mut method = MethodDef::new(&name, params, body);
        method.is_async = is_async;
        method.type_params = type_params;
        self.note_special_method(&method, name_tok.line, name_tok.column);
        Ok(method)
    }

    /// Flags two different spellings landing on the same special method.
    fn note_special_method(&mut self, method: &MethodDef, line: usize, column: usize) {
        let spelling = method.original_name.clone().unwrap_or_else(|| method.name.clone());
        let previous = match self.class_aliases.last_mut() {
            Some(seen) => match seen.get(&method.name) {
                Some(prev) => Some(prev.clone()),
                None => {
                    seen.insert(method.name.clone(), spelling.clone());
                    None
                }
            },
            None => None,
        };
        if let Some(prev) = previous {
            if prev != spelling {
                self.advise(
                    AdvisoryKind::SpecialMethodCollision,
                    format!("'{}' and '{}' both define '{}'", prev, spelling, method.name),
                    line,
                    column,
                );
            }
        }
    }

    /// `enum Nombre: A, B, C fin`
    pub(super) fn parse_enum(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Enum, "Expected 'enum'")?;
        let name = self.consume_identifier("Expected enum name")?;
        self.consume(TokenKind::Colon, "Expected ':' after enum name")?;
        let mut members = Vec::new();
        while !self.check(&TokenKind::End) && !self.is_at_end() {
            let member = self.consume_identifier("Expected enum member")?;
            if members.contains(&member) {
                return Err(self.err_here(&format!("Duplicate enum member '{}'", member)));
            }
            members.push(member);
            let _ = self.match_token(&[TokenKind::Comma]);
        }
        self.consume(TokenKind::End, "Expected 'fin' to close 'enum'")?;
        Ok(Node::Enum { name, members })
    }

    /// `interface Nombre: metodo f(a) ... fin`
    pub(super) fn parse_interface(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Interface, "Expected 'interface'")?;
        let name = self.consume_identifier("Expected interface name")?;
        self.consume(TokenKind::Colon, "Expected ':' after interface name")?;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::End) && !self.is_at_end() {
            if !self.match_token(&[TokenKind::Method, TokenKind::Func]) {
                return Err(self.err_here("Expected 'metodo' inside interface"));
            }
            let method = self.consume_identifier("Expected method name")?;
            let params = self.parse_params()?;
            methods.push(AbstractMethod { name: method, params });
        }
        self.consume(TokenKind::End, "Expected 'fin' to close 'interface'")?;
        Ok(Node::Interface { name, methods })
    }
}
