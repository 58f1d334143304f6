//! Control-flow and simple statements.

use super::{AdvisoryKind, BlockContext, PResult, Parser};
use crate::core::ast::{self, Block, Case, Node, Target};
use crate::core::keywords;
use crate::core::token::TokenKind;

impl Parser {
    /// `var x = e` (plain) or `variable x := e` (inferred).
    pub(super) fn parse_var_decl(&mut self) -> PResult<Node> {
        let keyword = self.advance().kind.clone();
        let name = self.consume_identifier("Expected variable name")?;
        let walrus = self.match_token(&[TokenKind::ColonAssign]);
        if !walrus {
            self.consume(TokenKind::Assign, "Expected '=' in variable declaration")?;
        }
        let value = self.parse_expression()?;
        Ok(Node::Assignment {
            target: Target::Name(name),
            value: Box::new(value),
            inferred: walrus || keyword == TokenKind::Variable,
        })
    }

    /// `option x = e` wraps the value in an option unless it already is one.
    pub(super) fn parse_option_decl(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Option, "Expected 'option'")?;
        let name = self.consume_identifier("Expected option name")?;
        self.consume(TokenKind::Assign, "Expected '=' in option declaration")?;
        let value = match self.parse_expression()? {
            opt @ Node::Option(_) => opt,
            Node::Value(ast::Literal::Null) => Node::Option(None),
            other => Node::Option(Some(Box::new(other))),
        };
        Ok(Node::assign(&name, value))
    }

    /// Assignment, attribute assignment or bare expression.
    pub(super) fn parse_expression_statement(&mut self) -> PResult<Node> {
        if let TokenKind::Identifier(name) = self.peek().kind.clone() {
            match self.peek_next().kind {
                TokenKind::Assign | TokenKind::ColonAssign => {
                    self.advance();
                    let inferred = self.advance().kind == TokenKind::ColonAssign;
                    let value = self.parse_expression()?;
                    return Ok(Node::Assignment { target: Target::Name(name), value: Box::new(value), inferred });
                }
                TokenKind::Identifier(_) | TokenKind::Str(_) | TokenKind::Integer(_) | TokenKind::Float(_) => {
                    if let Some(kw) = keywords::suggest_keyword(&name) {
                        let (line, column) = (self.peek().line, self.peek().column);
                        self.advise(
                            AdvisoryKind::KeywordSuggestion,
                            format!("Unknown statement '{}'; did you mean '{}'?", name, kw),
                            line,
                            column,
                        );
                    }
                }
                _ => {}
            }
        }
        let expr = self.parse_expression()?;
        if self.check(&TokenKind::Assign) {
            if let Node::Attribute { object, name } = expr {
                self.advance();
                let value = self.parse_expression()?;
                return Ok(Node::Assignment {
                    target: Target::Attribute { object, name },
                    value: Box::new(value),
                    inferred: false,
                });
            }
            return Err(self.err_here("Invalid assignment target"));
        }
        Ok(expr)
    }

    /// `si c: ... [sino si c: ...] [sino: ...] fin`
    pub(super) fn parse_conditional(&mut self) -> PResult<Node> {
        self.consume(TokenKind::If, "Expected 'si'")?;
        self.parse_conditional_tail()
    }

    fn parse_conditional_tail(&mut self) -> PResult<Node> {
        let cond = self.parse_expression()?;
        self.expect_or_report(TokenKind::Colon, "Expected ':' after condition");
        let then_block = self.parse_block_until(&[TokenKind::Else, TokenKind::End], "si");
        let mut else_block = Vec::new();
        if self.match_token(&[TokenKind::Else]) {
            if self.match_token(&[TokenKind::If]) {
                // the nested chain owns the closing 'fin'
                else_block.push(self.parse_conditional_tail()?);
                return Ok(Node::Conditional { cond: Box::new(cond), then_block, else_block });
            }
            self.expect_or_report(TokenKind::Colon, "Expected ':' after 'sino'");
            else_block = self.parse_block_until(&[TokenKind::End], "sino");
        }
        self.expect_or_report(TokenKind::End, "Expected 'fin' to close 'si'");
        Ok(Node::Conditional { cond: Box::new(cond), then_block, else_block })
    }

    /// `garantia c: continuation sino: escape fin`
    pub(super) fn parse_guard(&mut self) -> PResult<Node> {
        let start = self.consume(TokenKind::Guard, "Expected 'garantia'")?.clone();
        let cond = self.parse_expression()?;
        self.consume(TokenKind::Colon, "Expected ':' after guard condition")?;
        let body = self.parse_block_until(&[TokenKind::Else, TokenKind::End], "garantia");
        self.consume(TokenKind::Else, "Guard clause requires a 'sino' branch")?;
        self.consume(TokenKind::Colon, "Expected ':' after 'sino' in guard clause")?;
        let escape = self.parse_block_until(&[TokenKind::End], "garantia");
        self.expect_or_report(TokenKind::End, "Expected 'fin' to close 'garantia'");
        if !ast::block_terminates(&escape) {
            self.advise(
                AdvisoryKind::UnprovenGuardTermination,
                "Guard escape branch does not provably leave the enclosing block".into(),
                start.line,
                start.column,
            );
        }
        Ok(Node::Guard { cond: Box::new(cond), body, escape })
    }

    pub(super) fn parse_while(&mut self) -> PResult<Node> {
        self.consume(TokenKind::While, "Expected 'mientras'")?;
        let cond = self.parse_expression()?;
        let body = self.parse_colon_block("mientras");
        Ok(Node::While { cond: Box::new(cond), body })
    }

    pub(super) fn parse_for(&mut self) -> PResult<Node> {
        self.parse_for_loop(false)
    }

    pub(super) fn parse_for_loop(&mut self, is_async: bool) -> PResult<Node> {
        self.consume(TokenKind::For, "Expected 'para'")?;
        let var = self.consume_identifier("Expected loop variable after 'para'")?;
        self.consume(TokenKind::In, "Expected 'in' after loop variable")?;
        let iterable = self.parse_expression()?;
        let body = self.parse_colon_block("para");
        Ok(Node::For { var, iterable: Box::new(iterable), body, is_async })
    }

    /// `asincronico` before `func`, `para` or, inside classes, `metodo`.
    pub(super) fn parse_async(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Async, "Expected 'asincronico'")?;
        match self.peek().kind {
            TokenKind::Func => self.parse_function_def(Vec::new(), true).map(Node::Function),
            TokenKind::For => self.parse_for_loop(true),
            _ => Err(self.err_here("Expected 'func' or 'para' after 'asincronico'")),
        }
    }

    /// Optional expression on the same line as the keyword just consumed.
    fn parse_optional_value(&mut self) -> PResult<Option<Box<Node>>> {
        if self.same_line() && self.starts_expression() {
            Ok(Some(Box::new(self.parse_expression()?)))
        } else {
            Ok(None)
        }
    }

    pub(super) fn parse_return(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Return, "Expected 'retorno'")?;
        Ok(Node::Return(self.parse_optional_value()?))
    }

    pub(super) fn parse_yield(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Yield, "Expected 'yield'")?;
        Ok(Node::Yield(self.parse_optional_value()?))
    }

    pub(super) fn parse_throw(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Throw, "Expected 'lanzar'")?;
        Ok(Node::Throw(Box::new(self.parse_expression()?)))
    }

    /// `intentar: ... [capturar [e]: ...] [finalmente: ...] fin`
    pub(super) fn parse_try(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Try, "Expected 'intentar'")?;
        self.expect_or_report(TokenKind::Colon, "Expected ':' after 'intentar'");
        let stops = [TokenKind::Catch, TokenKind::Finally, TokenKind::End];
        let body = self.parse_block_until(&stops, "intentar");
        let mut catch_name = None;
        let mut catch_block = Vec::new();
        let mut finally_block = Vec::new();
        if self.match_token(&[TokenKind::Catch]) {
            if let TokenKind::Identifier(name) = self.peek().kind.clone() {
                self.advance();
                catch_name = Some(name);
            }
            self.expect_or_report(TokenKind::Colon, "Expected ':' after 'capturar'");
            catch_block = self.parse_block_until(&[TokenKind::Finally, TokenKind::End], "capturar");
        }
        if self.match_token(&[TokenKind::Finally]) {
            self.expect_or_report(TokenKind::Colon, "Expected ':' after 'finalmente'");
            finally_block = self.parse_block_until(&[TokenKind::End], "finalmente");
        }
        self.expect_or_report(TokenKind::End, "Expected 'fin' to close 'intentar'");
        Ok(Node::TryCatch { body, catch_name, catch_block, finally_block })
    }

    pub(super) fn parse_import(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Import, "Expected 'import'")?;
        let path = self.consume_string("Expected module path string after 'import'")?;
        Ok(Node::Import { path })
    }

    pub(super) fn parse_use(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Use, "Expected 'usar'")?;
        let module = match self.peek().kind.clone() {
            TokenKind::Str(s) | TokenKind::Identifier(s) => {
                self.advance();
                s
            }
            _ => return Err(self.err_here("Expected module name after 'usar'")),
        };
        Ok(Node::Use { module })
    }

    /// `desde "mod" import nombre [como alias]`
    pub(super) fn parse_import_from(&mut self) -> PResult<Node> {
        self.consume(TokenKind::From, "Expected 'desde'")?;
        let module = self.consume_string("Expected module path string after 'desde'")?;
        self.consume(TokenKind::Import, "Expected 'import' after module path")?;
        let name = self.consume_identifier("Expected imported name")?;
        let alias = if self.match_token(&[TokenKind::As]) {
            Some(self.consume_identifier("Expected alias after 'como'")?)
        } else {
            None
        };
        Ok(Node::ImportFrom { module, name, alias })
    }

    pub(super) fn parse_export(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Export, "Expected 'export'")?;
        let name = self.consume_identifier("Expected name after 'export'")?;
        Ok(Node::Export { name })
    }

    pub(super) fn parse_print(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Print, "Expected 'imprimir'")?;
        self.consume(TokenKind::OpenParen, "Expected '(' after 'imprimir'")?;
        let args = self.parse_arguments()?;
        Ok(Node::Print(args))
    }

    /// `hilo f(args)`
    pub(super) fn parse_thread(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Thread, "Expected 'hilo'")?;
        let callee = self.consume_identifier("Expected function name after 'hilo'")?;
        self.consume(TokenKind::OpenParen, "Expected '(' after thread target")?;
        let args = self.parse_arguments()?;
        Ok(Node::Thread(Box::new(Node::Call { callee, args })))
    }

    pub(super) fn parse_break(&mut self) -> PResult<Node> {
        self.advance();
        Ok(Node::Break)
    }

    pub(super) fn parse_continue(&mut self) -> PResult<Node> {
        self.advance();
        Ok(Node::Continue)
    }

    pub(super) fn parse_pass(&mut self) -> PResult<Node> {
        self.advance();
        Ok(Node::Pass)
    }

    /// `afirmar c[, mensaje]`
    pub(super) fn parse_assert(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Assert, "Expected 'afirmar'")?;
        let cond = self.parse_expression()?;
        let message = if self.match_token(&[TokenKind::Comma]) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        Ok(Node::Assert { cond: Box::new(cond), message })
    }

    pub(super) fn parse_del(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Del, "Expected 'eliminar'")?;
        let target = self.parse_expression()?;
        match target {
            Node::Identifier(_) | Node::Attribute { .. } => Ok(Node::Del(Box::new(target))),
            _ => Err(self.err_here("'eliminar' expects a name or attribute")),
        }
    }

    pub(super) fn parse_global(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Global, "Expected 'global'")?;
        Ok(Node::Global(self.parse_name_list("global")?))
    }

    pub(super) fn parse_nonlocal(&mut self) -> PResult<Node> {
        self.consume(TokenKind::NonLocal, "Expected 'nolocal'")?;
        Ok(Node::NonLocal(self.parse_name_list("nolocal")?))
    }

    fn parse_name_list(&mut self, construct: &str) -> PResult<Vec<String>> {
        let mut names = vec![self.consume_identifier(&format!("Expected name after '{}'", construct))?];
        while self.match_token(&[TokenKind::Comma]) {
            names.push(self.consume_identifier("Expected name after ','")?);
        }
        Ok(names)
    }

    /// `con expr [como alias]: ... fin`
    pub(super) fn parse_with(&mut self) -> PResult<Node> {
        self.consume(TokenKind::With, "Expected 'con'")?;
        let context = self.parse_expression()?;
        let alias = if self.match_token(&[TokenKind::As]) {
            Some(self.consume_identifier("Expected alias after 'como'")?)
        } else {
            None
        };
        let body = self.with_context(BlockContext::With, |p| p.parse_colon_block("con"));
        Ok(Node::With { context: Box::new(context), alias, body })
    }

    pub(super) fn parse_defer(&mut self) -> PResult<Node> {
        let tok = self.consume(TokenKind::Defer, "Expected 'defer'")?.clone();
        if !self.in_context(&[BlockContext::Function, BlockContext::Method, BlockContext::With]) {
            self.advise(
                AdvisoryKind::DeferOutsideFunction,
                format!("'{}' outside a function or method body has no enclosing scope to run at", tok.lexeme),
                tok.line,
                tok.column,
            );
        }
        let action = self.parse_expression()?;
        Ok(Node::Defer(Box::new(action)))
    }

    /// `switch e: case p [si g]: ... [sino: ...] fin`
    pub(super) fn parse_switch(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Switch, "Expected 'switch'")?;
        let subject = self.parse_expression()?;
        self.expect_or_report(TokenKind::Colon, "Expected ':' after switch subject");
        let mut cases = Vec::new();
        let mut default: Block = Vec::new();
        let stops = [TokenKind::Case, TokenKind::Else, TokenKind::End];
        while !self.check(&TokenKind::End) && !self.is_at_end() {
            if self.match_token(&[TokenKind::Case]) {
                let pattern = match self.parse_pattern() {
                    Ok(p) => p,
                    Err(e) => {
                        self.errors.push(e);
                        self.advance();
                        continue;
                    }
                };
                let guard = if self.match_token(&[TokenKind::If]) { Some(self.parse_expression()?) } else { None };
                self.expect_or_report(TokenKind::Colon, "Expected ':' after case pattern");
                let body = self.parse_block_until(&stops, "case");
                cases.push(Case { pattern, guard, body });
            } else if self.match_token(&[TokenKind::Else]) {
                self.expect_or_report(TokenKind::Colon, "Expected ':' after 'sino' in switch");
                default = self.parse_block_until(&stops, "sino");
            } else {
                self.report_here("Expected 'case' or 'sino' inside switch");
                self.advance();
            }
        }
        self.expect_or_report(TokenKind::End, "Expected 'fin' to close 'switch'");
        Ok(Node::Switch { subject: Box::new(subject), cases, default })
    }

    /// `macro nombre { ... }`
    pub(super) fn parse_macro(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Macro, "Expected 'macro'")?;
        let name = self.consume_identifier("Expected macro name")?;
        self.consume(TokenKind::OpenBrace, "Expected '{' after macro name")?;
        let body = self.parse_block_until(&[TokenKind::CloseBrace], "macro");
        self.expect_or_report(TokenKind::CloseBrace, "Expected '}' to close macro");
        Ok(Node::Macro { name, body })
    }

    /// `lista<T> nombre = [..]`
    pub(super) fn parse_typed_list(&mut self) -> PResult<Node> {
        self.consume(TokenKind::List, "Expected 'lista'")?;
        self.consume(TokenKind::LessThan, "Expected '<' after 'lista'")?;
        let elem_type = self.consume_identifier("Expected element type")?;
        self.consume(TokenKind::GreaterThan, "Expected '>' after element type")?;
        let name = self.consume_identifier("Expected list name")?;
        self.consume(TokenKind::Assign, "Expected '=' in typed list declaration")?;
        match self.parse_expression()? {
            Node::List(elements) => Ok(Node::TypedList { name, elem_type, elements }),
            _ => Err(self.err_here("Typed list must be initialized with a list literal")),
        }
    }

    /// `diccionario<K, V> nombre = {..}`
    pub(super) fn parse_typed_dict(&mut self) -> PResult<Node> {
        self.consume(TokenKind::Dict, "Expected 'diccionario'")?;
        self.consume(TokenKind::LessThan, "Expected '<' after 'diccionario'")?;
        let key_type = self.consume_identifier("Expected key type")?;
        self.consume(TokenKind::Comma, "Expected ',' between key and value types")?;
        let value_type = self.consume_identifier("Expected value type")?;
        self.consume(TokenKind::GreaterThan, "Expected '>' after value type")?;
        let name = self.consume_identifier("Expected dictionary name")?;
        self.consume(TokenKind::Assign, "Expected '=' in typed dictionary declaration")?;
        match self.parse_expression()? {
            Node::Dict(entries) => Ok(Node::TypedDict { name, key_type, value_type, entries }),
            _ => Err(self.err_here("Typed dictionary must be initialized with a dictionary literal")),
        }
    }
}
