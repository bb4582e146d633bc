/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the U Language Compiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

//! U source parser.
//!
//! Declarations and statements are parsed by recursive descent into the
//! scope forest and statement trees of [`Module`]; expressions are
//! linearized straight into postfix (RPN) node lists by an
//! operator-precedence (shunting-yard) loop, so no expression tree is ever
//! built.

use crate::ast::{
    Decl, DeclKind, DeclScope, Expr, ExprKind, Function, Module, Operator, Statement,
    GLOBAL_SCOPE,
};
use crate::lexer::{LexError, Lexer, Token, TokenKind};
use thiserror::Error;

// ─── Error Types ─────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("{line}:{col}: {message}")]
    Syntax {
        message: String,
        line: u32,
        col: u32,
    },
    #[error("{line}:{col}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: u32,
        col: u32,
    },
    #[error("{line}:{col}: redeclaration of `{name}`")]
    Redeclaration { name: String, line: u32, col: u32 },
    #[error("{line}:{col}: mismatched parenthesis")]
    MismatchedParen { line: u32, col: u32 },
    #[error(transparent)]
    Lex(#[from] LexError),
}

impl ParseError {
    fn syntax(msg: impl Into<String>, tok: &Token) -> Self {
        ParseError::Syntax {
            message: msg.into(),
            line: tok.line,
            col: tok.col,
        }
    }

    fn unexpected(expected: impl Into<String>, tok: &Token) -> Self {
        ParseError::UnexpectedToken {
            expected: expected.into(),
            found: format!("{:?}", tok.kind),
            line: tok.line,
            col: tok.col,
        }
    }
}

// ─── Operator tables ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

fn operator_precedence(op: Operator) -> u32 {
    match op {
        Operator::Multiplication | Operator::Remainder | Operator::Division => 6,
        Operator::Addition | Operator::Subtraction => 5,
        Operator::Equality => 4,
        Operator::Conjunction => 3,
        Operator::Alternative => 2,
        Operator::Assignment => 1,
        // Indexing is emitted directly when `]` closes its bracket; it never
        // sits on the pending-operator stack.
        Operator::Indexing => unreachable!("indexing has no infix precedence"),
    }
}

fn operator_associativity(op: Operator) -> Assoc {
    match op {
        Operator::Assignment => Assoc::Right,
        Operator::Indexing => unreachable!("indexing has no infix associativity"),
        _ => Assoc::Left,
    }
}

fn operator_of_token(kind: &TokenKind) -> Option<Operator> {
    match kind {
        TokenKind::Assign => Some(Operator::Assignment),
        TokenKind::Minus => Some(Operator::Subtraction),
        TokenKind::Plus => Some(Operator::Addition),
        TokenKind::Star => Some(Operator::Multiplication),
        TokenKind::Percent => Some(Operator::Remainder),
        TokenKind::Slash => Some(Operator::Division),
        TokenKind::Equal => Some(Operator::Equality),
        TokenKind::KwOr => Some(Operator::Alternative),
        TokenKind::KwAnd => Some(Operator::Conjunction),
        _ => None,
    }
}

/// Marker on the pending stack of the shunting-yard loop.
#[derive(Debug, Clone)]
enum PendingOp {
    Operator(Operator),
    OpenParen,
    OpenBracket,
    /// `name(` seen: emits a call node when the matching `)` closes.
    Call(String),
}

/// How an expression is allowed to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationMode {
    /// Ends at `;` (left unconsumed); a stray `)` is a hard error.
    Default,
    /// A `)` with no matching `(` ends the expression and is left
    /// unconsumed, for expressions embedded in a parenthesized construct
    /// such as an `if` condition.
    OnMismatchedParen,
}

// ─── Parser ──────────────────────────────────────────────────────────────────

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    module: Module,
    current_scope: usize,
}

/// Parse a whole compilation unit into a [`Module`].
pub fn parse(source: &str) -> Result<Module, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        module: Module::new(),
        current_scope: GLOBAL_SCOPE,
    };
    parser.parse_global_scope()?;
    Ok(parser.module)
}

impl Parser {
    // ─── Token cursor ────────────────────────────────────────────────────────

    fn next(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn undo(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }

    fn expect_semicolon(&mut self, after: &str) -> Result<(), ParseError> {
        let tok = self.next();
        if tok.kind != TokenKind::Semicolon {
            return Err(ParseError::unexpected(
                format!("`;` after {}", after),
                &tok,
            ));
        }
        Ok(())
    }

    // ─── Types & names ───────────────────────────────────────────────────────

    fn parse_value_type(&mut self) -> Result<crate::ast::ValueType, ParseError> {
        use crate::ast::ValueType;
        let tok = self.next();
        match tok.kind {
            TokenKind::KwI32 => Ok(ValueType::i32()),
            TokenKind::KwU8 => Ok(ValueType::u8()),
            TokenKind::KwU32 => Ok(ValueType::u32()),
            TokenKind::KwBool => Ok(ValueType::Bool),
            TokenKind::OpenBracket => {
                let close = self.next();
                if close.kind != TokenKind::CloseBracket {
                    return Err(ParseError::unexpected("`]` in slice type", &close));
                }
                Ok(ValueType::Slice(Box::new(self.parse_value_type()?)))
            }
            _ => Err(ParseError::unexpected("value type", &tok)),
        }
    }

    /// A name is available if nothing on the scope chain already uses it.
    fn decl_name_available(&self, name: &str) -> bool {
        let mut scope = self.current_scope;
        loop {
            let s = &self.module.scopes[scope];
            if s.decls.iter().any(|d| d.name == name) {
                return false;
            }
            if scope == GLOBAL_SCOPE {
                return true;
            }
            scope = s.parent;
        }
    }

    // ─── Expression linearizer ───────────────────────────────────────────────

    /// Append the postfix form of one expression to `out`, leaving the
    /// cursor on the terminator (`;`, or the unmatched `)` in
    /// [`TerminationMode::OnMismatchedParen`]).
    pub fn parse_expression(
        &mut self,
        out: &mut Vec<Expr>,
        mode: TerminationMode,
    ) -> Result<(), ParseError> {
        let mut pending: Vec<PendingOp> = Vec::new();

        'tokens: loop {
            let tok = self.next();

            if tok.kind == TokenKind::Semicolon && mode == TerminationMode::Default {
                self.undo();
                break;
            }

            if let Some(new_op) = operator_of_token(&tok.kind) {
                while let Some(&PendingOp::Operator(top)) = pending.last() {
                    let pops = operator_precedence(top) > operator_precedence(new_op)
                        || (operator_precedence(top) == operator_precedence(new_op)
                            && operator_associativity(new_op) == Assoc::Left);
                    if !pops {
                        break;
                    }
                    out.push(Expr {
                        kind: ExprKind::Operator(top),
                        line: tok.line,
                        col: tok.col,
                    });
                    pending.pop();
                }
                pending.push(PendingOp::Operator(new_op));
                continue;
            }

            match tok.kind {
                TokenKind::OpenParen => pending.push(PendingOp::OpenParen),
                TokenKind::OpenBracket => pending.push(PendingOp::OpenBracket),
                TokenKind::CloseParen => {
                    loop {
                        match pending.pop() {
                            Some(PendingOp::Operator(op)) => out.push(Expr {
                                kind: ExprKind::Operator(op),
                                line: tok.line,
                                col: tok.col,
                            }),
                            Some(PendingOp::OpenParen) => break,
                            Some(PendingOp::OpenBracket) | Some(PendingOp::Call(_)) | None => {
                                if mode == TerminationMode::OnMismatchedParen {
                                    self.undo();
                                    break 'tokens;
                                }
                                return Err(ParseError::MismatchedParen {
                                    line: tok.line,
                                    col: tok.col,
                                });
                            }
                        }
                    }
                    // A call marker directly under the matched paren means
                    // this was an argument list.
                    if matches!(pending.last(), Some(PendingOp::Call(_))) {
                        let Some(PendingOp::Call(name)) = pending.pop() else {
                            unreachable!();
                        };
                        out.push(Expr {
                            kind: ExprKind::FuncCall(name),
                            line: tok.line,
                            col: tok.col,
                        });
                    }
                }
                TokenKind::CloseBracket => loop {
                    match pending.pop() {
                        Some(PendingOp::Operator(op)) => out.push(Expr {
                            kind: ExprKind::Operator(op),
                            line: tok.line,
                            col: tok.col,
                        }),
                        Some(PendingOp::OpenBracket) => {
                            out.push(Expr {
                                kind: ExprKind::Operator(Operator::Indexing),
                                line: tok.line,
                                col: tok.col,
                            });
                            break;
                        }
                        _ => {
                            return Err(ParseError::MismatchedParen {
                                line: tok.line,
                                col: tok.col,
                            })
                        }
                    }
                },
                TokenKind::Ident(name) => {
                    let lookahead = self.next();
                    self.undo();
                    if lookahead.kind == TokenKind::OpenParen {
                        pending.push(PendingOp::Call(name));
                    } else {
                        out.push(Expr {
                            kind: ExprKind::Var(name),
                            line: tok.line,
                            col: tok.col,
                        });
                    }
                }
                TokenKind::Int {
                    value,
                    bits,
                    unsigned,
                } => out.push(Expr {
                    kind: ExprKind::IntConst {
                        value,
                        bits,
                        unsigned,
                    },
                    line: tok.line,
                    col: tok.col,
                }),
                TokenKind::Bool(b) => out.push(Expr {
                    kind: ExprKind::BoolConst(b),
                    line: tok.line,
                    col: tok.col,
                }),
                TokenKind::Str(bytes) => {
                    let index = self.module.string_constants.len();
                    self.module.string_constants.push(bytes);
                    out.push(Expr {
                        kind: ExprKind::StringConst(index),
                        line: tok.line,
                        col: tok.col,
                    });
                }
                TokenKind::Dot => {
                    let field = self.next();
                    let TokenKind::Ident(name) = field.kind else {
                        return Err(ParseError::unexpected("field name after `.`", &field));
                    };
                    out.push(Expr {
                        kind: ExprKind::FieldAccess(name),
                        line: field.line,
                        col: field.col,
                    });
                }
                TokenKind::Comma => {
                    while let Some(&PendingOp::Operator(op)) = pending.last() {
                        out.push(Expr {
                            kind: ExprKind::Operator(op),
                            line: tok.line,
                            col: tok.col,
                        });
                        pending.pop();
                    }
                }
                _ => return Err(ParseError::unexpected("expression", &tok)),
            }
        }

        while let Some(op) = pending.pop() {
            match op {
                PendingOp::Operator(op) => {
                    let loc = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
                    out.push(Expr {
                        kind: ExprKind::Operator(op),
                        line: loc.line,
                        col: loc.col,
                    });
                }
                PendingOp::OpenParen | PendingOp::OpenBracket | PendingOp::Call(_) => {
                    let loc = &self.tokens[self.pos.min(self.tokens.len() - 1)];
                    return Err(ParseError::MismatchedParen {
                        line: loc.line,
                        col: loc.col,
                    });
                }
            }
        }

        Ok(())
    }

    // ─── Declarations ────────────────────────────────────────────────────────

    /// Parse the `fn(p: T, ...) -> T` part of a function, creating its
    /// parameter scope and interning its signature. Leaves the body `{` (or
    /// the `;` of an extern) unconsumed.
    fn parse_function_type(&mut self) -> Result<Function, ParseError> {
        let param_scope = self.module.scopes.len();
        self.module.scopes.push(DeclScope {
            decls: Vec::new(),
            parent: self.current_scope,
            param_scope: true,
        });

        let old_scope = self.current_scope;
        self.current_scope = param_scope;

        let open = self.next();
        if open.kind != TokenKind::OpenParen {
            return Err(ParseError::unexpected("`(` after `fn`", &open));
        }

        loop {
            let tok = self.next();
            match tok.kind {
                TokenKind::CloseParen => break,
                TokenKind::Ident(name) => {
                    if !self.decl_name_available(&name) {
                        return Err(ParseError::Redeclaration {
                            name,
                            line: tok.line,
                            col: tok.col,
                        });
                    }
                    let colon = self.next();
                    if colon.kind != TokenKind::Colon {
                        return Err(ParseError::unexpected("`:` after parameter name", &colon));
                    }
                    let vt = self.parse_value_type()?;
                    self.module.scopes[param_scope].decls.push(Decl {
                        name,
                        kind: DeclKind::Param(vt),
                    });

                    let sep = self.next();
                    match sep.kind {
                        TokenKind::Comma => {}
                        TokenKind::CloseParen => break,
                        _ => return Err(ParseError::unexpected("`,` or `)`", &sep)),
                    }
                }
                _ => return Err(ParseError::unexpected("parameter name or `)`", &tok)),
            }
        }

        self.current_scope = old_scope;

        let return_type = if self.next().kind == TokenKind::Arrow {
            self.parse_value_type()?
        } else {
            self.undo();
            crate::ast::ValueType::Nil
        };

        let function_type = self
            .module
            .intern_function_type(param_scope, return_type.clone());

        Ok(Function {
            param_scope,
            return_type,
            body: Statement::Empty,
            function_type,
        })
    }

    /// `name := fn(...) -> T { ... }` or `name := T init-expr;`.
    ///
    /// Variable declarations desugar into an assignment expression statement
    /// (`[var, …init…, assign]`); global declarations (`global == true`)
    /// take no initializer, matching the source grammar.
    fn parse_decl_statement(
        &mut self,
        name: String,
        line: u32,
        col: u32,
        global: bool,
    ) -> Result<Statement, ParseError> {
        if !self.decl_name_available(&name) {
            return Err(ParseError::Redeclaration { name, line, col });
        }

        let declare = self.next();
        if declare.kind != TokenKind::Declare {
            return Err(ParseError::unexpected("`:=`", &declare));
        }

        let mut statement = Statement::Empty;

        let tok = self.next();
        match tok.kind {
            TokenKind::KwFn => {
                // The declaration is visible before the body parses, so the
                // function may call itself.
                let func_index = self.module.functions.len();
                self.module.scopes[self.current_scope].decls.push(Decl {
                    name,
                    kind: DeclKind::Function(func_index),
                });

                let mut f = self.parse_function_type()?;
                let old_scope = self.current_scope;
                self.current_scope = f.param_scope;
                f.body = self.parse_statement()?;
                self.current_scope = old_scope;

                self.module.functions.push(f);

                // The semicolon after a function body is optional.
                if self.next().kind != TokenKind::Semicolon {
                    self.undo();
                }
                return Ok(statement);
            }
            _ => {
                self.undo();
                let vt = self.parse_value_type()?;
                self.module.scopes[self.current_scope].decls.push(Decl {
                    name: name.clone(),
                    kind: DeclKind::Variable(vt),
                });

                if !global {
                    let mut nodes = vec![Expr {
                        kind: ExprKind::Var(name),
                        line,
                        col,
                    }];
                    self.parse_expression(&mut nodes, TerminationMode::Default)?;
                    if nodes.len() > 1 {
                        nodes.push(Expr {
                            kind: ExprKind::Operator(Operator::Assignment),
                            line,
                            col,
                        });
                        statement = Statement::Expression(nodes);
                    }
                }
            }
        }

        self.expect_semicolon("declaration")?;
        Ok(statement)
    }

    fn parse_export_statement(&mut self) -> Result<(), ParseError> {
        let tok = self.next();
        let TokenKind::Ident(name) = tok.kind else {
            return Err(ParseError::unexpected("exported name", &tok));
        };
        self.module.exports.push(name);
        self.expect_semicolon("export statement")
    }

    /// `extern name := fn(...) -> T;` — declared in the global scope and
    /// appended to the import list.
    fn parse_extern_statement(&mut self) -> Result<(), ParseError> {
        let tok = self.next();
        let TokenKind::Ident(name) = tok.kind else {
            return Err(ParseError::unexpected("extern name", &tok));
        };
        if !self.decl_name_available(&name) {
            return Err(ParseError::Redeclaration {
                name,
                line: tok.line,
                col: tok.col,
            });
        }

        let declare = self.next();
        if declare.kind != TokenKind::Declare {
            return Err(ParseError::unexpected("`:=` after extern name", &declare));
        }

        let fn_tok = self.next();
        if fn_tok.kind != TokenKind::KwFn {
            return Err(ParseError::syntax("extern supports only functions", &fn_tok));
        }

        let extern_index = self.module.extern_functions.len();
        self.module.scopes[GLOBAL_SCOPE].decls.push(Decl {
            name,
            kind: DeclKind::ExternFunction(extern_index),
        });

        let f = self.parse_function_type()?;
        self.expect_semicolon("extern statement")?;
        self.module.extern_functions.push(f);
        Ok(())
    }

    // ─── Statements ──────────────────────────────────────────────────────────

    fn parse_block_statement(&mut self) -> Result<Statement, ParseError> {
        let old_scope = self.current_scope;
        self.module.scopes.push(DeclScope {
            decls: Vec::new(),
            parent: old_scope,
            param_scope: false,
        });
        self.current_scope = self.module.scopes.len() - 1;
        let scope = self.current_scope;

        let mut statements = Vec::new();
        loop {
            let tok = self.next();
            match tok.kind {
                TokenKind::CloseBrace => break,
                TokenKind::Eof => {
                    return Err(ParseError::unexpected("`}` closing block", &tok));
                }
                _ => {
                    self.undo();
                    statements.push(self.parse_statement()?);
                }
            }
        }

        self.current_scope = old_scope;
        Ok(Statement::Block { scope, statements })
    }

    fn parse_return_statement(&mut self) -> Result<Statement, ParseError> {
        let mut nodes = Vec::new();
        self.parse_expression(&mut nodes, TerminationMode::Default)?;
        self.expect_semicolon("return statement")?;
        Ok(Statement::Return(nodes))
    }

    fn parse_if_statement(&mut self) -> Result<Statement, ParseError> {
        let open = self.next();
        if open.kind != TokenKind::OpenParen {
            return Err(ParseError::unexpected("`(` after `if`", &open));
        }

        let mut condition = Vec::new();
        self.parse_expression(&mut condition, TerminationMode::OnMismatchedParen)?;

        let close = self.next();
        if close.kind != TokenKind::CloseParen {
            return Err(ParseError::unexpected("`)` after `if` condition", &close));
        }

        let positive = Box::new(self.parse_statement()?);

        let negative = if self.next().kind == TokenKind::KwElse {
            Some(Box::new(self.parse_statement()?))
        } else {
            self.undo();
            None
        };

        Ok(Statement::If {
            condition,
            positive,
            negative,
        })
    }

    fn parse_expr_statement(&mut self) -> Result<Statement, ParseError> {
        let mut nodes = Vec::new();
        self.parse_expression(&mut nodes, TerminationMode::Default)?;
        self.expect_semicolon("expression statement")?;
        Ok(Statement::Expression(nodes))
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let tok = self.next();
        match tok.kind {
            TokenKind::OpenBrace => self.parse_block_statement(),
            TokenKind::KwReturn => self.parse_return_statement(),
            TokenKind::KwIf => self.parse_if_statement(),
            // A stray semicolon is tolerated as an empty statement.
            TokenKind::Semicolon => Ok(Statement::Empty),
            TokenKind::Ident(name) => {
                // `name :=` starts a declaration; anything else is an
                // expression statement beginning with this identifier.
                let backup = self.pos;
                if self.next().kind == TokenKind::Declare {
                    self.pos = backup;
                    self.parse_decl_statement(name, tok.line, tok.col, false)
                } else {
                    self.pos = backup - 1;
                    self.parse_expr_statement()
                }
            }
            _ => {
                self.undo();
                self.parse_expr_statement()
            }
        }
    }

    fn parse_global_scope(&mut self) -> Result<(), ParseError> {
        loop {
            let tok = self.next();
            match tok.kind {
                TokenKind::Eof => return Ok(()),
                TokenKind::KwExport => self.parse_export_statement()?,
                TokenKind::KwExtern => self.parse_extern_statement()?,
                TokenKind::Ident(name) => {
                    self.parse_decl_statement(name, tok.line, tok.col, true)?;
                }
                _ => return Err(ParseError::unexpected("declaration", &tok)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ValueType;

    fn rpn(expr_src: &str) -> Vec<ExprKind> {
        // Wrap the expression in a function body so scope bookkeeping works.
        let src = format!("f := fn() {{ {}; }}", expr_src);
        let module = parse(&src).expect("parse failure");
        let Statement::Block { statements, .. } = &module.functions[0].body else {
            panic!("Expected block body");
        };
        let Statement::Expression(nodes) = &statements[0] else {
            panic!("Expected expression statement, got {:?}", statements[0]);
        };
        nodes.iter().map(|e| e.kind.clone()).collect()
    }

    fn int(value: i64) -> ExprKind {
        ExprKind::IntConst {
            value,
            bits: 32,
            unsigned: false,
        }
    }

    fn var(name: &str) -> ExprKind {
        ExprKind::Var(name.to_string())
    }

    fn op(o: Operator) -> ExprKind {
        ExprKind::Operator(o)
    }

    #[test]
    fn test_precedence_mul_over_add() {
        assert_eq!(
            rpn("1 + 2 * 3"),
            vec![int(1), int(2), int(3), op(Operator::Multiplication), op(Operator::Addition)]
        );
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(
            rpn("1 - 2 + 3"),
            vec![int(1), int(2), op(Operator::Subtraction), int(3), op(Operator::Addition)]
        );
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let src = "f := fn() { a := i32; b := i32; a = b = 1; }";
        let module = parse(src).unwrap();
        let Statement::Block { statements, .. } = &module.functions[0].body else {
            panic!("Expected block");
        };
        let Statement::Expression(nodes) = &statements[2] else {
            panic!("Expected expression statement");
        };
        let kinds: Vec<_> = nodes.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                var("a"),
                var("b"),
                int(1),
                op(Operator::Assignment),
                op(Operator::Assignment),
            ]
        );
    }

    #[test]
    fn test_parentheses_override_precedence() {
        assert_eq!(
            rpn("(1 + 2) * 3"),
            vec![int(1), int(2), op(Operator::Addition), int(3), op(Operator::Multiplication)]
        );
    }

    #[test]
    fn test_call_with_arguments() {
        assert_eq!(
            rpn("g(1, 2 + 3)"),
            vec![
                int(1),
                int(2),
                int(3),
                op(Operator::Addition),
                ExprKind::FuncCall("g".to_string()),
            ]
        );
    }

    #[test]
    fn test_nested_calls() {
        assert_eq!(
            rpn("g(h(1))"),
            vec![
                int(1),
                ExprKind::FuncCall("h".to_string()),
                ExprKind::FuncCall("g".to_string()),
            ]
        );
    }

    #[test]
    fn test_zero_argument_call() {
        assert_eq!(rpn("g()"), vec![ExprKind::FuncCall("g".to_string())]);
    }

    #[test]
    fn test_indexing_binds_tightest() {
        let src = "f := fn(s: []u8) { s[0] + 1; }";
        let module = parse(src).unwrap();
        let Statement::Block { statements, .. } = &module.functions[0].body else {
            panic!("Expected block");
        };
        let Statement::Expression(nodes) = &statements[0] else {
            panic!("Expected expression statement");
        };
        let kinds: Vec<_> = nodes.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                var("s"),
                int(0),
                op(Operator::Indexing),
                int(1),
                op(Operator::Addition),
            ]
        );
    }

    #[test]
    fn test_field_access_is_postfix() {
        let src = "f := fn(s: []u8) { s.len + 1; }";
        let module = parse(src).unwrap();
        let Statement::Block { statements, .. } = &module.functions[0].body else {
            panic!("Expected block");
        };
        let Statement::Expression(nodes) = &statements[0] else {
            panic!("Expected expression statement");
        };
        let kinds: Vec<_> = nodes.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                var("s"),
                ExprKind::FieldAccess("len".to_string()),
                int(1),
                op(Operator::Addition),
            ]
        );
    }

    #[test]
    fn test_mismatched_paren_is_error_in_default_mode() {
        match parse("f := fn() { 1 + 2); }") {
            Err(ParseError::MismatchedParen { .. }) => {}
            other => panic!("Expected MismatchedParen, got {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_paren_is_error() {
        match parse("f := fn() { (1 + 2; }") {
            Err(ParseError::MismatchedParen { .. }) => {}
            other => panic!("Expected MismatchedParen, got {:?}", other),
        }
    }

    #[test]
    fn test_if_condition_termination_mode() {
        let src = "f := fn() -> i32 { if ((1 + 2) == 3) { return 1; } else { return 2; } }";
        let module = parse(src).unwrap();
        let Statement::Block { statements, .. } = &module.functions[0].body else {
            panic!("Expected block");
        };
        let Statement::If {
            condition, negative, ..
        } = &statements[0]
        else {
            panic!("Expected if statement, got {:?}", statements[0]);
        };
        let kinds: Vec<_> = condition.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![int(1), int(2), op(Operator::Addition), int(3), op(Operator::Equality)]
        );
        assert!(negative.is_some());
    }

    #[test]
    fn test_variable_decl_desugars_to_assignment() {
        let src = "f := fn() { x := u8 250u8; }";
        let module = parse(src).unwrap();
        let Statement::Block { statements, scope } = &module.functions[0].body else {
            panic!("Expected block");
        };
        let Statement::Expression(nodes) = &statements[0] else {
            panic!("Expected expression statement");
        };
        let kinds: Vec<_> = nodes.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                var("x"),
                ExprKind::IntConst {
                    value: 250,
                    bits: 8,
                    unsigned: true
                },
                op(Operator::Assignment),
            ]
        );
        // The declaration landed in the block scope.
        assert!(module.scopes[*scope].decls.iter().any(|d| d.name == "x"));
    }

    #[test]
    fn test_decl_without_initializer_is_empty_statement() {
        let src = "f := fn() { x := i32; }";
        let module = parse(src).unwrap();
        let Statement::Block { statements, .. } = &module.functions[0].body else {
            panic!("Expected block");
        };
        assert!(matches!(statements[0], Statement::Empty));
    }

    #[test]
    fn test_redeclaration_in_scope_chain() {
        match parse("f := fn(a: i32) { a := i32 1; }") {
            Err(ParseError::Redeclaration { name, .. }) => assert_eq!(name, "a"),
            other => panic!("Expected Redeclaration, got {:?}", other),
        }
    }

    #[test]
    fn test_function_type_dedup_across_functions() {
        let src = "\
            f := fn(x: i32) -> i32 { return x; }\n\
            g := fn(y: i32) -> i32 { return y + 1; }\n\
            h := fn(b: bool) -> i32 { return 0; }\n";
        let module = parse(src).unwrap();
        assert_eq!(module.function_types.len(), 2);
        assert_eq!(
            module.functions[0].function_type,
            module.functions[1].function_type
        );
        assert_ne!(
            module.functions[0].function_type,
            module.functions[2].function_type
        );
    }

    #[test]
    fn test_extern_functions_precede_user_functions() {
        let src = "\
            extern log := fn(x: i32);\n\
            main := fn() -> i32 { return 0; }\n";
        let module = parse(src).unwrap();
        assert_eq!(module.extern_functions.len(), 1);
        assert_eq!(module.lookup_fn(GLOBAL_SCOPE, "log"), Some(0));
        assert_eq!(module.lookup_fn(GLOBAL_SCOPE, "main"), Some(1));
    }

    #[test]
    fn test_exports_recorded() {
        let src = "main := fn() -> i32 { return 0; }\nexport main;\n";
        let module = parse(src).unwrap();
        assert_eq!(module.exports, vec!["main".to_string()]);
    }

    #[test]
    fn test_slice_type_annotation() {
        let src = "f := fn(s: []u8) -> u32 { return s.len; }";
        let module = parse(src).unwrap();
        let params = &module.scopes[module.functions[0].param_scope];
        let DeclKind::Param(vt) = &params.decls[0].kind else {
            panic!("Expected param");
        };
        assert_eq!(*vt, ValueType::Slice(Box::new(ValueType::u8())));
    }

    #[test]
    fn test_string_literals_are_interned_in_order() {
        let src = "f := fn() { s := []u8 \"ab\"; t := []u8 \"cde\"; }";
        let module = parse(src).unwrap();
        assert_eq!(module.string_constants.len(), 2);
        assert_eq!(module.string_constants[0], b"ab".to_vec());
        assert_eq!(module.string_constants[1], b"cde".to_vec());
        assert_eq!(module.string_offset(1), 2);
    }
}
