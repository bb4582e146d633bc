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

//! Code generation over the postfix expression lists, in two passes.
//!
//! The decision pass walks an expression list once with a type stack and a
//! node-index stack, records per-node [`ExprDecision`]s (operand types,
//! reference mode, dependency links) and performs all user-facing type
//! checking. The emission pass then turns each node into one opcode
//! fragment; by that point every remaining failure is either a reference
//! taken to something without an address, or an internal invariant.

use crate::ast::{
    DeclKind, Expr, ExprKind, Function, Module, Operator, Statement, ValueType,
};
use crate::encoder::{op, ByteBuffer, BLOCKTYPE_EMPTY, GLOBAL_STACK_PTR, VALTYPE_I32, VALTYPE_I64};
use thiserror::Error;

// ─── Error Types ─────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("{line}:{col}: unknown identifier `{name}`")]
    UnknownIdentifier { name: String, line: u32, col: u32 },
    #[error("{line}:{col}: {message}")]
    TypeMismatch {
        message: String,
        line: u32,
        col: u32,
    },
    #[error("{line}:{col}: `{name}` takes {expected} argument(s), only {found} value(s) available")]
    WrongArity {
        name: String,
        expected: usize,
        found: usize,
        line: u32,
        col: u32,
    },
    #[error("{line}:{col}: cannot assign to {what}")]
    NotAddressable { what: String, line: u32, col: u32 },
    #[error("{line}:{col}: no field `{name}` on slices")]
    InvalidField { name: String, line: u32, col: u32 },
    #[error("{line}:{col}: {bits}-bit integers are not supported")]
    UnsupportedWidth { bits: u32, line: u32, col: u32 },
    #[error("cannot export `{name}`: not a function")]
    BadExport { name: String },
    #[error("internal error: {0}")]
    Internal(String),
}

fn type_mismatch(message: impl Into<String>, node: &Expr) -> CodegenError {
    CodegenError::TypeMismatch {
        message: message.into(),
        line: node.line,
        col: node.col,
    }
}

// ─── Decision pass ───────────────────────────────────────────────────────────

/// What the decision pass worked out about one expression node.
#[derive(Debug, Clone, Default)]
pub struct ExprDecision {
    /// Emit the node's address instead of its value (assignment targets and
    /// the objects such targets are reached through).
    pub take_reference: bool,
    pub left_type: ValueType,
    pub right_type: ValueType,
    /// Node index this node reads through (field access only); reference
    /// marking follows these links.
    pub dependency: Option<usize>,
}

/// Type-check one postfix expression list and compute per-node decisions.
/// The second return is the type of the value the expression leaves on the
/// stack, `Nil` for none.
pub fn compute_expression_decisions(
    module: &Module,
    nodes: &[Expr],
    scope: usize,
) -> Result<(Vec<ExprDecision>, ValueType), CodegenError> {
    let mut index_stack: Vec<usize> = Vec::new();
    let mut type_stack: Vec<ValueType> = Vec::new();
    let mut decisions: Vec<ExprDecision> = Vec::new();

    for (i, node) in nodes.iter().enumerate() {
        let mut decision = ExprDecision::default();

        match &node.kind {
            ExprKind::IntConst { bits, unsigned, .. } => {
                index_stack.push(i);
                type_stack.push(ValueType::Int {
                    bits: *bits,
                    unsigned: *unsigned,
                });
            }
            ExprKind::BoolConst(_) => {
                index_stack.push(i);
                type_stack.push(ValueType::Bool);
            }
            ExprKind::StringConst(_) => {
                index_stack.push(i);
                type_stack.push(ValueType::Slice(Box::new(ValueType::u8())));
            }
            ExprKind::Var(name) => {
                let Some((_, decl)) = module.lookup_var(scope, name) else {
                    return Err(CodegenError::UnknownIdentifier {
                        name: name.clone(),
                        line: node.line,
                        col: node.col,
                    });
                };
                let vt = match &decl.kind {
                    DeclKind::Param(vt) | DeclKind::Variable(vt) => vt.clone(),
                    DeclKind::Function(_) | DeclKind::ExternFunction(_) => {
                        return Err(type_mismatch(
                            format!("function `{}` used as a value", name),
                            node,
                        ));
                    }
                };
                index_stack.push(i);
                type_stack.push(vt);
            }
            ExprKind::Operator(operator) => {
                if type_stack.len() < 2 {
                    return Err(type_mismatch(
                        format!("operator `{:?}` is missing an operand", operator),
                        node,
                    ));
                }
                decision.right_type = type_stack.pop().unwrap_or_default();
                decision.left_type = type_stack.pop().unwrap_or_default();
                index_stack.pop();
                let left_index = index_stack.pop().unwrap_or_default();

                let result = decide_operator(*operator, &decision, node)?;

                if *operator == Operator::Assignment {
                    // Mark the target node, and everything it reads through,
                    // for address emission.
                    let mut it = left_index;
                    loop {
                        decisions[it].take_reference = true;
                        match decisions[it].dependency {
                            Some(next) => it = next,
                            None => break,
                        }
                    }
                }

                index_stack.push(i);
                type_stack.push(result);
            }
            ExprKind::FuncCall(name) => {
                let Some(fn_index) = module.lookup_fn(scope, name) else {
                    return Err(CodegenError::UnknownIdentifier {
                        name: name.clone(),
                        line: node.line,
                        col: node.col,
                    });
                };
                let f = module.function_by_index(fn_index);
                let params = &module.scopes[f.param_scope];
                let arity = params.decls.len();

                if type_stack.len() < arity {
                    return Err(CodegenError::WrongArity {
                        name: name.clone(),
                        expected: arity,
                        found: type_stack.len(),
                        line: node.line,
                        col: node.col,
                    });
                }

                let args_start = type_stack.len() - arity;
                for (j, param) in params.decls.iter().enumerate() {
                    let DeclKind::Param(expected) = &param.kind else {
                        return Err(CodegenError::Internal(format!(
                            "non-parameter declaration in parameter scope of `{}`",
                            name
                        )));
                    };
                    let found = &type_stack[args_start + j];
                    if !found.matches(expected) {
                        return Err(type_mismatch(
                            format!(
                                "argument {} of `{}` expects {}, got {}",
                                j + 1,
                                name,
                                expected,
                                found
                            ),
                            node,
                        ));
                    }
                }

                type_stack.truncate(args_start);
                index_stack.truncate(args_start);

                if !f.return_type.is_nil() {
                    index_stack.push(i);
                    type_stack.push(f.return_type.clone());
                }
            }
            ExprKind::FieldAccess(name) => {
                let Some(object_type) = type_stack.pop() else {
                    return Err(type_mismatch(
                        format!("field `.{}` accessed without an object", name),
                        node,
                    ));
                };
                let ValueType::Slice(_) = &object_type else {
                    return Err(type_mismatch(
                        format!("type {} has no fields", object_type),
                        node,
                    ));
                };
                if name != "len" && name != "ptr" {
                    return Err(CodegenError::InvalidField {
                        name: name.clone(),
                        line: node.line,
                        col: node.col,
                    });
                }

                decision.dependency = index_stack.pop();
                decision.left_type = object_type;
                decision.right_type = ValueType::u32();

                index_stack.push(i);
                type_stack.push(ValueType::u32());
            }
        }

        decisions.push(decision);
    }

    let remaining = match type_stack.len() {
        0 => ValueType::Nil,
        1 => type_stack.pop().unwrap_or_default(),
        n => {
            let last = nodes.last().map(|e| (e.line, e.col)).unwrap_or((0, 0));
            return Err(CodegenError::TypeMismatch {
                message: format!("malformed expression: {} values left over", n),
                line: last.0,
                col: last.1,
            });
        }
    };

    Ok((decisions, remaining))
}

fn decide_operator(
    operator: Operator,
    decision: &ExprDecision,
    node: &Expr,
) -> Result<ValueType, CodegenError> {
    let l = &decision.left_type;
    let r = &decision.right_type;
    match operator {
        Operator::Addition
        | Operator::Subtraction
        | Operator::Multiplication => {
            if !matches!(l, ValueType::Int { .. }) || !l.matches(r) {
                return Err(type_mismatch(
                    format!("arithmetic needs matching integer operands, got {} and {}", l, r),
                    node,
                ));
            }
            Ok(l.clone())
        }
        Operator::Division | Operator::Remainder => {
            let (ValueType::Int { unsigned: lu, .. }, ValueType::Int { unsigned: ru, .. }) = (l, r)
            else {
                return Err(type_mismatch(
                    format!("division needs integer operands, got {} and {}", l, r),
                    node,
                ));
            };
            if !l.matches(r) || lu != ru {
                return Err(type_mismatch(
                    format!(
                        "division needs operands of the same width and signedness, got {} and {}",
                        l, r
                    ),
                    node,
                ));
            }
            Ok(l.clone())
        }
        Operator::Equality => {
            if !matches!(l, ValueType::Int { .. }) || !l.matches(r) {
                return Err(type_mismatch(
                    format!("`==` needs matching integer operands, got {} and {}", l, r),
                    node,
                ));
            }
            Ok(ValueType::Bool)
        }
        Operator::Alternative | Operator::Conjunction => {
            if *l != ValueType::Bool || *r != ValueType::Bool {
                return Err(type_mismatch(
                    format!("`and`/`or` need bool operands, got {} and {}", l, r),
                    node,
                ));
            }
            Ok(ValueType::Bool)
        }
        Operator::Indexing => {
            let ValueType::Slice(item) = l else {
                return Err(type_mismatch(format!("cannot index into {}", l), node));
            };
            if !matches!(r, ValueType::Int { .. }) {
                return Err(type_mismatch(
                    format!("slice index must be an integer, got {}", r),
                    node,
                ));
            }
            Ok((**item).clone())
        }
        Operator::Assignment => {
            if !l.matches(r) {
                return Err(type_mismatch(
                    format!("cannot assign {} to {}", r, l),
                    node,
                ));
            }
            Ok(l.clone())
        }
    }
}

// ─── Emission helpers ────────────────────────────────────────────────────────

fn load_value(
    buf: &mut ByteBuffer,
    vt: &ValueType,
    offset: u32,
    node: &Expr,
) -> Result<(), CodegenError> {
    let opcode = match vt {
        ValueType::Int { bits: 8, .. } | ValueType::Bool => op::I32_LOAD8_U,
        ValueType::Int { bits: 32, .. } => op::I32_LOAD,
        ValueType::Int { bits, .. } => {
            return Err(CodegenError::UnsupportedWidth {
                bits: *bits,
                line: node.line,
                col: node.col,
            });
        }
        ValueType::Slice(_) => op::I64_LOAD,
        ValueType::Nil => {
            return Err(CodegenError::Internal("load of a nil value".into()));
        }
    };
    buf.push(opcode);
    buf.leb128_u(0); // align
    buf.leb128_u(u64::from(offset));
    Ok(())
}

fn store_value(buf: &mut ByteBuffer, vt: &ValueType, node: &Expr) -> Result<(), CodegenError> {
    let opcode = match vt {
        ValueType::Int { bits: 8, .. } | ValueType::Bool => op::I32_STORE8,
        ValueType::Int { bits: 32, .. } => op::I32_STORE,
        ValueType::Int { bits, .. } => {
            return Err(CodegenError::UnsupportedWidth {
                bits: *bits,
                line: node.line,
                col: node.col,
            });
        }
        ValueType::Slice(_) => op::I64_STORE,
        ValueType::Nil => {
            return Err(CodegenError::Internal("store of a nil value".into()));
        }
    };
    buf.push(opcode);
    buf.leb128_u(0); // align
    buf.leb128_u(0); // offset
    Ok(())
}

/// Arithmetic on sub-32-bit integers runs in a full i32 lane and is clipped
/// back to the declared width afterwards.
fn apply_bitmask_i32(buf: &mut ByteBuffer, vt: &ValueType) {
    if let ValueType::Int { bits, .. } = vt {
        if *bits < 32 {
            buf.push(op::I32_CONST);
            buf.leb128_s(i64::from((1i32 << bits) - 1));
            buf.push(op::I32_AND);
        }
    }
}

fn scratch_slots(module: &Module, scope: usize) -> Result<(u32, u32, u32), CodegenError> {
    let base = module
        .stack_base_slot(scope)
        .ok_or_else(|| CodegenError::Internal("expression outside any function".into()))?;
    Ok((base, base + 1, base + 2))
}

fn assert_not_reference(decision: &ExprDecision, what: &str, node: &Expr) -> Result<(), CodegenError> {
    if decision.take_reference {
        return Err(CodegenError::NotAddressable {
            what: what.to_string(),
            line: node.line,
            col: node.col,
        });
    }
    Ok(())
}

// ─── Emission pass ───────────────────────────────────────────────────────────

fn codegen_expr(
    module: &Module,
    node: &Expr,
    decision: &ExprDecision,
    decisions: &[ExprDecision],
    scope: usize,
) -> Result<ByteBuffer, CodegenError> {
    let mut e = ByteBuffer::new();

    match &node.kind {
        ExprKind::IntConst { value, bits, .. } => {
            assert_not_reference(decision, "a constant", node)?;
            match bits {
                8 | 32 => {
                    e.push(op::I32_CONST);
                    // Wrap into the signed i32 lane; u32 immediates above
                    // i32::MAX come out as their negative bit pattern.
                    e.leb128_s(i64::from(*value as i32));
                }
                _ => {
                    return Err(CodegenError::UnsupportedWidth {
                        bits: *bits,
                        line: node.line,
                        col: node.col,
                    });
                }
            }
        }
        ExprKind::BoolConst(value) => {
            assert_not_reference(decision, "a constant", node)?;
            e.push(op::I32_CONST);
            e.leb128_s(i64::from(*value));
        }
        ExprKind::StringConst(index) => {
            assert_not_reference(decision, "a constant", node)?;
            let ptr = u64::from(module.string_offset(*index));
            let len = module.string_constants[*index].len() as u64;
            let slice = (len << 32) | ptr;
            e.push(op::I64_CONST);
            e.leb128_s(slice as i64);
        }
        ExprKind::Var(name) => {
            let Some((slot, decl)) = module.lookup_var(scope, name) else {
                return Err(CodegenError::Internal(format!(
                    "variable `{}` vanished between passes",
                    name
                )));
            };
            match &decl.kind {
                DeclKind::Param(_) => {
                    assert_not_reference(decision, &format!("parameter `{}`", name), node)?;
                    e.push(op::LOCAL_GET);
                    e.leb128_u(u64::from(slot));
                }
                DeclKind::Variable(vt) => {
                    let (stack_base, _, _) = scratch_slots(module, scope)?;
                    e.push(op::LOCAL_GET);
                    e.leb128_u(u64::from(stack_base));
                    if decision.take_reference {
                        if slot != 0 {
                            e.push(op::I32_CONST);
                            e.leb128_s(i64::from(slot));
                            e.push(op::I32_ADD);
                        }
                    } else {
                        load_value(&mut e, vt, slot, node)?;
                    }
                }
                DeclKind::Function(_) | DeclKind::ExternFunction(_) => {
                    return Err(CodegenError::Internal(format!(
                        "function `{}` reached the emission pass as a value",
                        name
                    )));
                }
            }
        }
        ExprKind::Operator(operator) => {
            codegen_operator(module, *operator, node, decision, scope, &mut e)?;
        }
        ExprKind::FuncCall(name) => {
            assert_not_reference(decision, "a temporary value", node)?;
            let (stack_base, _, _) = scratch_slots(module, scope)?;
            let frame_size = module
                .frame_size(scope)
                .ok_or_else(|| CodegenError::Internal("call outside any function".into()))?;
            let Some(fn_index) = module.lookup_fn(scope, name) else {
                return Err(CodegenError::Internal(format!(
                    "function `{}` vanished between passes",
                    name
                )));
            };

            // The callee's frame starts right after every byte this scope
            // chain can touch.
            e.push(op::LOCAL_GET);
            e.leb128_u(u64::from(stack_base));
            e.push(op::I32_CONST);
            e.leb128_s(i64::from(frame_size));
            e.push(op::I32_ADD);
            e.push(op::GLOBAL_SET);
            e.leb128_u(u64::from(GLOBAL_STACK_PTR));

            e.push(op::CALL);
            e.leb128_u(u64::from(fn_index));
        }
        ExprKind::FieldAccess(name) => {
            if decision.take_reference {
                let Some(dep) = decision.dependency else {
                    return Err(CodegenError::Internal(
                        "field access in reference mode without a dependency".into(),
                    ));
                };
                if !decisions[dep].take_reference {
                    return Err(CodegenError::Internal(
                        "field-access dependency not in reference mode".into(),
                    ));
                }
                match name.as_str() {
                    "len" => {
                        // len lives in the upper half of the stored i64.
                        e.push(op::I32_CONST);
                        e.leb128_s(4);
                        e.push(op::I32_ADD);
                    }
                    "ptr" => {} // stored at offset 0: the address is already right
                    _ => {
                        return Err(CodegenError::Internal(format!(
                            "field `{}` survived the decision pass",
                            name
                        )));
                    }
                }
            } else {
                match name.as_str() {
                    "len" => {
                        e.push(op::I64_CONST);
                        e.leb128_s(32);
                        e.push(op::I64_SHR_U);
                        e.push(op::I32_WRAP_I64);
                    }
                    "ptr" => e.push(op::I32_WRAP_I64),
                    _ => {
                        return Err(CodegenError::Internal(format!(
                            "field `{}` survived the decision pass",
                            name
                        )));
                    }
                }
            }
        }
    }

    Ok(e)
}

fn codegen_operator(
    module: &Module,
    operator: Operator,
    node: &Expr,
    decision: &ExprDecision,
    scope: usize,
    e: &mut ByteBuffer,
) -> Result<(), CodegenError> {
    let signed = matches!(decision.left_type, ValueType::Int { unsigned: false, .. });

    match operator {
        Operator::Addition => {
            assert_not_reference(decision, "a temporary value", node)?;
            e.push(op::I32_ADD);
            apply_bitmask_i32(e, &decision.left_type);
        }
        Operator::Subtraction => {
            assert_not_reference(decision, "a temporary value", node)?;
            e.push(op::I32_SUB);
            apply_bitmask_i32(e, &decision.left_type);
        }
        Operator::Multiplication => {
            assert_not_reference(decision, "a temporary value", node)?;
            e.push(op::I32_MUL);
            apply_bitmask_i32(e, &decision.left_type);
        }
        Operator::Division => {
            assert_not_reference(decision, "a temporary value", node)?;
            e.push(if signed { op::I32_DIV_S } else { op::I32_DIV_U });
            apply_bitmask_i32(e, &decision.left_type);
        }
        Operator::Remainder => {
            assert_not_reference(decision, "a temporary value", node)?;
            e.push(if signed { op::I32_REM_S } else { op::I32_REM_U });
            apply_bitmask_i32(e, &decision.left_type);
        }
        Operator::Equality => {
            assert_not_reference(decision, "a temporary value", node)?;
            e.push(op::I32_EQ);
        }
        Operator::Alternative => {
            assert_not_reference(decision, "a temporary value", node)?;
            e.push(op::I32_OR);
        }
        Operator::Conjunction => {
            assert_not_reference(decision, "a temporary value", node)?;
            e.push(op::I32_AND);
        }
        Operator::Indexing => {
            let ValueType::Slice(item_type) = &decision.left_type else {
                return Err(CodegenError::Internal(
                    "indexing a non-slice survived the decision pass".into(),
                ));
            };
            let (_, temp_i32, _) = scratch_slots(module, scope)?;

            // Stack is [slice, index]: park the index, turn the slice into
            // its pointer, then combine.
            e.push(op::LOCAL_SET);
            e.leb128_u(u64::from(temp_i32));
            e.push(op::I32_WRAP_I64);
            e.push(op::LOCAL_GET);
            e.leb128_u(u64::from(temp_i32));

            let item_size = item_type.size_in_bytes();
            if item_size != 1 {
                e.push(op::I32_CONST);
                e.leb128_s(i64::from(item_size));
                e.push(op::I32_MUL);
            }
            e.push(op::I32_ADD);

            if !decision.take_reference {
                load_value(e, item_type, 0, node)?;
            }
        }
        Operator::Assignment => {
            assert_not_reference(decision, "a temporary value", node)?;
            let (_, temp_i32, temp_i64) = scratch_slots(module, scope)?;
            let scratch = match decision.left_type {
                ValueType::Slice(_) => temp_i64,
                _ => temp_i32,
            };

            // Stack is [address, value]: keep the value in a scratch local
            // across the store so the assignment yields it again.
            e.push(op::LOCAL_TEE);
            e.leb128_u(u64::from(scratch));
            store_value(e, &decision.left_type, node)?;
            e.push(op::LOCAL_GET);
            e.leb128_u(u64::from(scratch));
        }
    }

    Ok(())
}

/// Compile one postfix expression list; returns the code and the type of
/// the value it leaves behind.
pub fn codegen_expression(
    module: &Module,
    nodes: &[Expr],
    scope: usize,
) -> Result<(ByteBuffer, ValueType), CodegenError> {
    let (decisions, remaining) = compute_expression_decisions(module, nodes, scope)?;
    let mut out = ByteBuffer::new();
    for (i, node) in nodes.iter().enumerate() {
        let e = codegen_expr(module, node, &decisions[i], &decisions, scope)?;
        out.append(&e);
    }
    Ok((out, remaining))
}

// ─── Statements ──────────────────────────────────────────────────────────────

fn codegen_statement(
    module: &Module,
    statement: &Statement,
    scope: usize,
    return_type: &ValueType,
) -> Result<ByteBuffer, CodegenError> {
    match statement {
        Statement::Empty => Ok(ByteBuffer::new()),
        Statement::Block {
            scope: block_scope,
            statements,
        } => {
            let mut out = ByteBuffer::new();
            for st in statements {
                let child = codegen_statement(module, st, *block_scope, return_type)?;
                out.append(&child);
            }
            Ok(out)
        }
        Statement::Return(nodes) => {
            let (mut out, vt) = codegen_expression(module, nodes, scope)?;
            if !vt.matches(return_type) {
                let loc = nodes.first().map(|e| (e.line, e.col)).unwrap_or((0, 0));
                return Err(CodegenError::TypeMismatch {
                    message: format!("return of {} from a function returning {}", vt, return_type),
                    line: loc.0,
                    col: loc.1,
                });
            }
            out.push(op::RETURN);
            Ok(out)
        }
        Statement::If {
            condition,
            positive,
            negative,
        } => {
            let (mut out, vt) = codegen_expression(module, condition, scope)?;
            if vt != ValueType::Bool {
                let loc = condition.first().map(|e| (e.line, e.col)).unwrap_or((0, 0));
                return Err(CodegenError::TypeMismatch {
                    message: format!("if condition must be bool, got {}", vt),
                    line: loc.0,
                    col: loc.1,
                });
            }
            out.push(op::IF);
            out.push(BLOCKTYPE_EMPTY);
            out.append(&codegen_statement(module, positive, scope, return_type)?);
            if let Some(negative) = negative {
                out.push(op::ELSE);
                out.append(&codegen_statement(module, negative, scope, return_type)?);
            }
            out.push(op::END);
            Ok(out)
        }
        Statement::Expression(nodes) => {
            let (mut out, vt) = codegen_expression(module, nodes, scope)?;
            if !vt.is_nil() {
                out.push(op::DROP);
            }
            Ok(out)
        }
    }
}

// ─── Functions ───────────────────────────────────────────────────────────────

/// Every function body carries the same three extra locals: the stack base
/// and an i32/i64 scratch pair right after it.
fn codegen_function_locals(buf: &mut ByteBuffer) {
    buf.leb128_u(2); // two local groups
    buf.leb128_u(2);
    buf.push(VALTYPE_I32);
    buf.leb128_u(1);
    buf.push(VALTYPE_I64);
}

/// Compile one function into its code-section body (locals, prologue,
/// statements, terminator).
pub fn codegen_function(module: &Module, f: &Function) -> Result<ByteBuffer, CodegenError> {
    let mut code = ByteBuffer::new();
    codegen_function_locals(&mut code);

    let stack_base = module
        .stack_base_slot(f.param_scope)
        .ok_or_else(|| CodegenError::Internal("function without a parameter scope".into()))?;
    code.push(op::GLOBAL_GET);
    code.leb128_u(u64::from(GLOBAL_STACK_PTR));
    code.push(op::LOCAL_SET);
    code.leb128_u(u64::from(stack_base));

    code.append(&codegen_statement(
        module,
        &f.body,
        f.param_scope,
        &f.return_type,
    )?);

    if !f.return_type.is_nil() {
        // Falling off the end of a value-returning function traps.
        code.push(op::UNREACHABLE);
    }
    code.push(op::END);

    Ok(code)
}
