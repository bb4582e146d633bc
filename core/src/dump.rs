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

//! Human-readable dump of a parsed module: scopes, signatures, functions
//! and the raw postfix expression lists. Debug aid behind the driver's
//! `--dump` flag; nothing in the pipeline depends on it.

use crate::ast::{DeclKind, Expr, ExprKind, Function, Module, Operator, Statement};
use std::fmt::Write;

pub fn dump_module(module: &Module) -> String {
    let mut d = Dumper {
        out: String::new(),
        indent: 0,
        module,
    };
    d.module();
    d.out
}

struct Dumper<'a> {
    out: String,
    indent: usize,
    module: &'a Module,
}

impl Dumper<'_> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self)) {
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    fn module(&mut self) {
        self.line("module {");
        self.out.push('\n');
        self.exports();
        self.out.push('\n');
        self.scopes();
        self.out.push('\n');
        self.function_types();
        self.out.push('\n');
        self.functions();
        self.out.push('\n');
        self.string_constants();
        self.out.push('\n');
        self.line("}");
    }

    fn exports(&mut self) {
        self.line("exports {");
        self.nested(|d| {
            for (i, name) in d.module.exports.iter().enumerate() {
                d.line(&format!("#{}: export \"{}\"", i, name));
            }
        });
        self.line("}");
    }

    fn scopes(&mut self) {
        self.line("scopes {");
        self.nested(|d| {
            for (i, scope) in d.module.scopes.iter().enumerate() {
                d.line(&format!("#{}: scope {{", i));
                d.nested(|d| {
                    d.line(&format!("parent: #{}", scope.parent));
                    if scope.param_scope {
                        d.line("param_scope");
                    }
                    for (j, decl) in scope.decls.iter().enumerate() {
                        let rendered = match &decl.kind {
                            DeclKind::Function(f) => format!(
                                "{} := fn #{}",
                                decl.name,
                                f + d.module.extern_functions.len()
                            ),
                            DeclKind::ExternFunction(f) => {
                                format!("extern {} := fn #{}", decl.name, f)
                            }
                            DeclKind::Param(vt) => format!("{} := param {}", decl.name, vt),
                            DeclKind::Variable(vt) => format!("{} := var {}", decl.name, vt),
                        };
                        d.line(&format!("#{}: decl {{{}}}", j, rendered));
                    }
                });
                d.line("}");
            }
        });
        self.line("}");
    }

    fn function_types(&mut self) {
        self.line("function types {");
        self.nested(|d| {
            for (i, ft) in d.module.function_types.iter().enumerate() {
                d.line(&format!(
                    "#{}: fn type {{param_scope: #{}, return_type: {}}}",
                    i, ft.param_scope, ft.return_type
                ));
            }
        });
        self.line("}");
    }

    fn functions(&mut self) {
        self.line("extern functions {");
        self.nested(|d| {
            for (i, f) in d.module.extern_functions.iter().enumerate() {
                d.function(i, f);
            }
        });
        self.line("}");
        self.out.push('\n');

        self.line("functions {");
        self.nested(|d| {
            for (i, f) in d.module.functions.iter().enumerate() {
                d.function(i + d.module.extern_functions.len(), f);
            }
        });
        self.line("}");
    }

    fn function(&mut self, index: usize, f: &Function) {
        self.line(&format!("#{}: fn {{", index));
        self.nested(|d| {
            d.line(&format!("param_scope: #{}", f.param_scope));
            d.line(&format!("return_type: {}", f.return_type));
            d.line(&format!("function_type: #{}", f.function_type));
            d.line("content:");
            d.nested(|d| d.statement(&f.body));
        });
        self.line("}");
    }

    fn string_constants(&mut self) {
        self.line("string constants {");
        self.nested(|d| {
            for (i, s) in d.module.string_constants.iter().enumerate() {
                d.line(&format!(
                    "#{}: offset {} len {} hex {}",
                    i,
                    d.module.string_offset(i),
                    s.len(),
                    hex::encode(s)
                ));
            }
        });
        self.line("}");
    }

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Empty => self.line(";"),
            Statement::Block { scope, statements } => {
                self.line("block {");
                self.nested(|d| {
                    d.line(&format!("scope: #{}", scope));
                    for st in statements {
                        d.statement(st);
                    }
                });
                self.line("}");
            }
            Statement::Return(nodes) => {
                self.line("return {");
                self.nested(|d| d.expression(nodes));
                self.line("}");
            }
            Statement::If {
                condition,
                positive,
                negative,
            } => {
                self.line("if (");
                self.nested(|d| d.expression(condition));
                self.line(")");
                self.nested(|d| d.statement(positive));
                if let Some(negative) = negative {
                    self.line("else");
                    self.nested(|d| d.statement(negative));
                }
            }
            Statement::Expression(nodes) => {
                self.line("expr {");
                self.nested(|d| d.expression(nodes));
                self.line("}");
            }
        }
    }

    fn expression(&mut self, nodes: &[Expr]) {
        self.line("expression {");
        self.nested(|d| {
            for node in nodes {
                let mut text = String::new();
                match &node.kind {
                    ExprKind::IntConst { value, bits, unsigned } => {
                        let _ = write!(
                            text,
                            "int_const {}{}{}",
                            value,
                            if *unsigned { 'u' } else { 'i' },
                            bits
                        );
                    }
                    ExprKind::BoolConst(b) => {
                        let _ = write!(text, "bool_const {}", b);
                    }
                    ExprKind::StringConst(i) => {
                        let _ = write!(text, "string_const #{}", i);
                    }
                    ExprKind::Var(name) => {
                        let _ = write!(text, "var {}", name);
                    }
                    ExprKind::Operator(operator) => {
                        let symbol = match operator {
                            Operator::Addition => "+",
                            Operator::Subtraction => "-",
                            Operator::Multiplication => "*",
                            Operator::Remainder => "%",
                            Operator::Division => "/",
                            Operator::Assignment => "=",
                            Operator::Equality => "==",
                            Operator::Alternative => "or",
                            Operator::Conjunction => "and",
                            Operator::Indexing => "[]",
                        };
                        let _ = write!(text, "op {}", symbol);
                    }
                    ExprKind::FuncCall(name) => {
                        let _ = write!(text, "call {}", name);
                    }
                    ExprKind::FieldAccess(name) => {
                        let _ = write!(text, "field .{}", name);
                    }
                }
                d.line(&text);
            }
        });
        self.line("}");
    }
}
