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

//! Compiler for the U language: a small curly-brace language with typed
//! variables, sub-word integers, booleans, byte slices and functions,
//! compiled to a WebAssembly binary module.
//!
//! Pipeline: `lexer` → `parser` (scope forest + RPN expression lists) →
//! `codegen` (decision pass + emission pass) → `encoder` (binary container).

use thiserror::Error;

pub mod ast;
pub mod codegen;
pub mod dump;
pub mod encoder;
pub mod lexer;
pub mod parser;
pub mod runner;

/// Any error the pipeline can surface to a user.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] parser::ParseError),
    #[error(transparent)]
    Codegen(#[from] codegen::CodegenError),
}

/// Compile U source text into a WebAssembly binary.
///
/// This is the whole pipeline in one call; the driver and the tests go
/// through here.
pub fn compile(source: &str) -> Result<Vec<u8>, CompileError> {
    let module = parser::parse(source)?;
    let bytes = encoder::encode_module(&module)?;
    Ok(bytes)
}
