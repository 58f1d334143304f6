//! Expression ladder, primaries and switch patterns.

use super::{PResult, Parser};
use crate::core::ast::{BinaryOp, Literal, Node, Pattern, UnaryOp};
use crate::core::token::TokenKind;

impl Parser {
    pub(super) fn parse_expression(&mut self) -> PResult<Node> {
        self.parse_or()
    }

    /// True when the current token can begin an expression.
    pub(super) fn starts_expression(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Identifier(_)
                | TokenKind::Integer(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::Boolean(_)
                | TokenKind::Null
                | TokenKind::OpenParen
                | TokenKind::OpenBracket
                | TokenKind::OpenBrace
                | TokenKind::Minus
                | TokenKind::Bang
                | TokenKind::Await
                | TokenKind::Lambda
                | TokenKind::Attribute
                | TokenKind::Holobit
                | TokenKind::List
                | TokenKind::Print
        )
    }

    fn parse_binary_level(
        &mut self,
        ops: &[TokenKind],
        next: fn(&mut Parser) -> PResult<Node>,
    ) -> PResult<Node> {
        let mut left = next(self)?;
        while self.check_any(ops) {
            let op = match BinaryOp::from_token(&self.advance().kind) {
                Some(op) => op,
                None => return Err(self.err_here("Unknown binary operator")),
            };
            let right = next(self)?;
            left = Node::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> PResult<Node> {
        self.parse_binary_level(&[TokenKind::OrOr], Parser::parse_and)
    }

    fn parse_and(&mut self) -> PResult<Node> {
        self.parse_binary_level(&[TokenKind::AndAnd], Parser::parse_equality)
    }

    fn parse_equality(&mut self) -> PResult<Node> {
        self.parse_binary_level(&[TokenKind::DoubleEquals, TokenKind::NotEquals], Parser::parse_relational)
    }

    fn parse_relational(&mut self) -> PResult<Node> {
        self.parse_binary_level(
            &[TokenKind::LessThan, TokenKind::LessEqual, TokenKind::GreaterThan, TokenKind::GreaterEqual],
            Parser::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> PResult<Node> {
        self.parse_binary_level(&[TokenKind::Plus, TokenKind::Minus], Parser::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> PResult<Node> {
        self.parse_binary_level(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent], Parser::parse_unary)
    }

    fn parse_unary(&mut self) -> PResult<Node> {
        if self.match_token(&[TokenKind::Bang]) {
            return Ok(Node::unary(UnaryOp::Not, self.parse_unary()?));
        }
        if self.match_token(&[TokenKind::Minus]) {
            return Ok(Node::unary(UnaryOp::Neg, self.parse_unary()?));
        }
        if self.match_token(&[TokenKind::Await]) {
            return Ok(Node::Await(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Node> {
        let mut expr = self.parse_primary()?;
        while self.match_token(&[TokenKind::Dot]) {
            let name = self.consume_member_name()?;
            if self.check(&TokenKind::OpenParen) && self.same_line() {
                self.advance();
                let args = self.parse_arguments()?;
                expr = Node::MethodCall { object: Box::new(expr), method: name, args };
            } else {
                expr = Node::Attribute { object: Box::new(expr), name };
            }
        }
        Ok(expr)
    }

    /// Member names may reuse keyword spellings (`obj.lista`).
    fn consume_member_name(&mut self) -> PResult<String> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            ref k if k.is_keyword() => {
                self.advance();
                Ok(tok.lexeme)
            }
            _ => Err(self.err_here("Expected attribute name after '.'")),
        }
    }

    /// Comma-separated expressions up to `)`; the `(` is already consumed.
    pub(super) fn parse_arguments(&mut self) -> PResult<Vec<Node>> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::CloseParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::CloseParen, "Expected ')' after arguments")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Node> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Integer(v) => {
                self.advance();
                Ok(Node::int(v))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Node::float(v))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Node::Value(Literal::Str(s)))
            }
            TokenKind::Boolean(b) => {
                self.advance();
                Ok(Node::boolean(b))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Node::null())
            }
            TokenKind::Identifier(name) => {
                self.advance();
                self.parse_named(name)
            }
            // builtins whose names double as keywords
            TokenKind::List | TokenKind::Print if self.peek_next().kind == TokenKind::OpenParen => {
                self.advance();
                self.advance();
                let args = self.parse_arguments()?;
                Ok(Node::Call { callee: tok.lexeme, args })
            }
            TokenKind::OpenParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.consume(TokenKind::CloseParen, "Expected ')' after expression")?;
                Ok(expr)
            }
            TokenKind::OpenBracket => {
                self.advance();
                self.parse_list()
            }
            TokenKind::OpenBrace => {
                self.advance();
                self.parse_dict()
            }
            TokenKind::Lambda => {
                self.advance();
                self.parse_lambda()
            }
            TokenKind::Attribute => {
                self.advance();
                let object = self.consume_identifier("Expected object name after 'atributo'")?;
                let name = self.consume_member_name()?;
                Ok(Node::Attribute { object: Box::new(Node::Identifier(object)), name })
            }
            TokenKind::Holobit => {
                self.advance();
                self.consume(TokenKind::OpenParen, "Expected '(' after 'holobit'")?;
                let args = self.parse_arguments()?;
                let values = match args.as_slice() {
                    [Node::List(items)] => items.clone(),
                    _ => args,
                };
                Ok(Node::Holobit { name: None, values })
            }
            _ => Err(self.err_here(&format!("Unexpected token '{}' in expression", display_token(&tok.lexeme, &tok.kind)))),
        }
    }

    /// Identifier just consumed: plain name, call, instance or option form.
    fn parse_named(&mut self, name: String) -> PResult<Node> {
        let call_follows = self.check(&TokenKind::OpenParen) && self.same_line();
        match name.as_str() {
            "None" => return Ok(Node::Option(None)),
            "Some" if call_follows => {
                self.advance();
                let value = self.parse_expression()?;
                self.consume(TokenKind::CloseParen, "Expected ')' after 'Some' value")?;
                return Ok(Node::Option(Some(Box::new(value))));
            }
            _ => {}
        }
        if !call_follows {
            return Ok(Node::Identifier(name));
        }
        self.advance();
        let args = self.parse_arguments()?;
        if self.known_classes.contains(&name) {
            Ok(Node::Instance { class_name: name, args })
        } else {
            Ok(Node::Call { callee: name, args })
        }
    }

    /// `[` already consumed.
    fn parse_list(&mut self) -> PResult<Node> {
        if self.match_token(&[TokenKind::CloseBracket]) {
            return Ok(Node::List(Vec::new()));
        }
        let first = self.parse_expression()?;
        if self.match_token(&[TokenKind::For]) {
            let (var, iterable, cond) = self.parse_comprehension_tail()?;
            self.consume(TokenKind::CloseBracket, "Expected ']' after list comprehension")?;
            return Ok(Node::ListComprehension { expr: Box::new(first), var, iterable, cond });
        }
        let mut items = vec![first];
        while self.match_token(&[TokenKind::Comma]) {
            if self.check(&TokenKind::CloseBracket) {
                break;
            }
            items.push(self.parse_expression()?);
        }
        self.consume(TokenKind::CloseBracket, "Expected ']' after list elements")?;
        Ok(Node::List(items))
    }

    /// `{` already consumed.
    fn parse_dict(&mut self) -> PResult<Node> {
        if self.match_token(&[TokenKind::CloseBrace]) {
            return Ok(Node::Dict(Vec::new()));
        }
        let key = self.parse_expression()?;
        self.consume(TokenKind::Colon, "Expected ':' after dictionary key")?;
        let value = self.parse_expression()?;
        if self.match_token(&[TokenKind::For]) {
            let (var, iterable, cond) = self.parse_comprehension_tail()?;
            self.consume(TokenKind::CloseBrace, "Expected '}' after dictionary comprehension")?;
            return Ok(Node::DictComprehension { key: Box::new(key), value: Box::new(value), var, iterable, cond });
        }
        let mut entries = vec![(key, value)];
        while self.match_token(&[TokenKind::Comma]) {
            if self.check(&TokenKind::CloseBrace) {
                break;
            }
            let k = self.parse_expression()?;
            self.consume(TokenKind::Colon, "Expected ':' after dictionary key")?;
            let v = self.parse_expression()?;
            entries.push((k, v));
        }
        self.consume(TokenKind::CloseBrace, "Expected '}' after dictionary entries")?;
        Ok(Node::Dict(entries))
    }

    /// `x in it [si c]` after `para`.
    fn parse_comprehension_tail(&mut self) -> PResult<(String, Box<Node>, Option<Box<Node>>)> {
        let var = self.consume_identifier("Expected comprehension variable")?;
        self.consume(TokenKind::In, "Expected 'in' in comprehension")?;
        let iterable = Box::new(self.parse_expression()?);
        let cond = if self.match_token(&[TokenKind::If]) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        Ok((var, iterable, cond))
    }

    /// `lambda a, b: e` with `lambda` already consumed.
    fn parse_lambda(&mut self) -> PResult<Node> {
        let mut params: Vec<String> = Vec::new();
        if !self.check(&TokenKind::Colon) {
            loop {
                let p = self.consume_identifier("Expected lambda parameter")?;
                if params.contains(&p) {
                    return Err(self.err_here(&format!("Duplicate parameter '{}'", p)));
                }
                params.push(p);
                if !self.match_token(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::Colon, "Expected ':' after lambda parameters")?;
        let body = self.parse_expression()?;
        Ok(Node::Lambda { params, body: Box::new(body) })
    }

    /// Switch-case pattern: `_`, literal, binding or `(p, ...)`.
    pub(super) fn parse_pattern(&mut self) -> PResult<Pattern> {
        let tok = self.peek().clone();
        let pattern = match tok.kind {
            TokenKind::Identifier(ref name) if name == "_" => Pattern::Wildcard,
            TokenKind::Identifier(name) => Pattern::Binding(name),
            TokenKind::Integer(v) => Pattern::Literal(Literal::Int(v)),
            TokenKind::Float(v) => Pattern::Literal(Literal::Float(v)),
            TokenKind::Str(s) => Pattern::Literal(Literal::Str(s)),
            TokenKind::Boolean(b) => Pattern::Literal(Literal::Bool(b)),
            TokenKind::Null => Pattern::Literal(Literal::Null),
            TokenKind::Minus => {
                self.advance();
                return match self.peek().kind {
                    TokenKind::Integer(v) => {
                        self.advance();
                        Ok(Pattern::Literal(Literal::Int(-v)))
                    }
                    TokenKind::Float(v) => {
                        self.advance();
                        Ok(Pattern::Literal(Literal::Float(-v)))
                    }
                    _ => Err(self.err_here("Expected number after '-' in pattern")),
                };
            }
            TokenKind::OpenParen => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(&TokenKind::CloseParen) {
                    loop {
                        items.push(self.parse_pattern()?);
                        if !self.match_token(&[TokenKind::Comma]) {
                            break;
                        }
                    }
                }
                self.consume(TokenKind::CloseParen, "Expected ')' after tuple pattern")?;
                return Ok(Pattern::Tuple(items));
            }
            _ => return Err(self.err_here("Expected pattern after 'case'")),
        };
        self.advance();
        Ok(pattern)
    }
}

fn display_token(lexeme: &str, kind: &TokenKind) -> String {
    if lexeme.is_empty() {
        kind.to_string()
    } else {
        lexeme.to_string()
    }
}
