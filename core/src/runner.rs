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

//! Wasmtime execution of emitted modules.
//!
//! Drives the end-to-end tests: instantiate a compiled binary, optionally
//! link host functions under the `env` import module, call an export and
//! read back its result. Integer and bool results come back widened to i64.

use std::fmt;
use wasmtime::{Engine, Linker, Module, Store, Val, ValType};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Clone)]
pub struct RunError {
    pub message: String,
    pub context: String,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}", self.context, self.message)
    }
}

impl std::error::Error for RunError {}

// =============================================================================
// Host State
// =============================================================================

/// State shared with host functions during a run; host closures record what
/// the module handed them here.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    pub logged: Vec<i64>,
}

/// Result of one exported-function call.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub result: Option<i64>,
    /// Values host functions captured into [`HostState::logged`].
    pub logged: Vec<i64>,
}

// =============================================================================
// Public API
// =============================================================================

/// Call an exported function of a compiled binary with no host imports.
pub fn call_exported(bytes: &[u8], name: &str, args: &[i64]) -> Result<Option<i64>, RunError> {
    let output = call_exported_linked(bytes, name, args, |_| Ok(()))?;
    Ok(output.result)
}

/// Call an exported function, letting `configure` install host functions
/// (under the `env` module) into the linker first.
pub fn call_exported_linked(
    bytes: &[u8],
    name: &str,
    args: &[i64],
    configure: impl FnOnce(&mut Linker<HostState>) -> Result<(), RunError>,
) -> Result<RunOutput, RunError> {
    let engine = Engine::default();
    let module = Module::from_binary(&engine, bytes).map_err(|e| RunError {
        message: format!("Failed to load WASM module: {}", e),
        context: "call_exported::load".to_string(),
    })?;

    let mut linker = Linker::<HostState>::new(&engine);
    configure(&mut linker)?;

    let mut store = Store::new(&engine, HostState::default());

    let instance = linker
        .instantiate(&mut store, &module)
        .map_err(|e| RunError {
            message: format!("Failed to instantiate: {}", e),
            context: "call_exported::instantiate".to_string(),
        })?;

    let func = instance
        .get_func(&mut store, name)
        .ok_or_else(|| RunError {
            message: format!("Export '{}' not found", name),
            context: "call_exported::get_func".to_string(),
        })?;

    let func_type = func.ty(&store);
    let param_types: Vec<ValType> = func_type.params().collect();
    if param_types.len() != args.len() {
        return Err(RunError {
            message: format!(
                "Export '{}' takes {} argument(s), {} given",
                name,
                param_types.len(),
                args.len()
            ),
            context: "call_exported::arity".to_string(),
        });
    }

    let params: Vec<Val> = param_types
        .iter()
        .zip(args)
        .map(|(ty, &v)| match ty {
            ValType::I64 => Ok(Val::I64(v)),
            ValType::I32 => Ok(Val::I32(v as i32)),
            other => Err(RunError {
                message: format!("Unsupported parameter type {}", other),
                context: "call_exported::params".to_string(),
            }),
        })
        .collect::<Result<_, _>>()?;

    let mut results = vec![Val::I64(0); func_type.results().len()];

    func.call(&mut store, &params, &mut results)
        .map_err(|e| RunError {
            message: format!("Call to '{}' trapped: {}", name, e),
            context: "call_exported::call".to_string(),
        })?;

    let result = match results.first() {
        Some(Val::I64(v)) => Some(*v),
        Some(Val::I32(v)) => Some(i64::from(*v)),
        _ => None,
    };

    Ok(RunOutput {
        result,
        logged: store.data().logged.clone(),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: compile U source and validate the binary before running it.
    fn compile_u(source: &str) -> Vec<u8> {
        let bytes = crate::compile(source).expect("compile failed");
        wasmparser::validate(&bytes).expect("emitted module failed validation");
        bytes
    }

    #[test]
    fn test_e2e_return_constant() {
        let wasm = compile_u("main := fn() -> i32 { return 5; }\nexport main;\n");
        let result = call_exported(&wasm, "main", &[]).expect("call failed");
        assert_eq!(result, Some(5));
    }

    #[test]
    fn test_e2e_u8_arithmetic_wraps() {
        let source = "\
            main := fn() -> u8 {\n\
                x := u8 250u8;\n\
                x = x + 10u8;\n\
                return x;\n\
            }\n\
            export main;\n";
        let wasm = compile_u(source);
        let result = call_exported(&wasm, "main", &[]).expect("call failed");
        assert_eq!(result, Some(4), "250 + 10 must wrap to 4 at 8 bits");
    }

    #[test]
    fn test_e2e_parameters_and_arithmetic() {
        let source = "add := fn(a: i32, b: i32) -> i32 { return a + b * 2; }\nexport add;\n";
        let wasm = compile_u(source);
        let result = call_exported(&wasm, "add", &[10, 16]).expect("call failed");
        assert_eq!(result, Some(42));
    }

    #[test]
    fn test_e2e_if_else_branches() {
        let source = "\
            pick := fn(b: bool) -> i32 {\n\
                if (b) { return 1; } else { return 2; }\n\
            }\n\
            export pick;\n";
        let wasm = compile_u(source);
        assert_eq!(call_exported(&wasm, "pick", &[1]).unwrap(), Some(1));
        assert_eq!(call_exported(&wasm, "pick", &[0]).unwrap(), Some(2));
    }

    #[test]
    fn test_e2e_missing_return_traps() {
        let source = "\
            maybe := fn(b: bool) -> i32 {\n\
                if (b) { return 1; }\n\
            }\n\
            export maybe;\n";
        let wasm = compile_u(source);
        assert_eq!(call_exported(&wasm, "maybe", &[1]).unwrap(), Some(1));
        let trapped = call_exported(&wasm, "maybe", &[0]);
        assert!(trapped.is_err(), "fallthrough must trap, got {:?}", trapped);
    }

    #[test]
    fn test_e2e_recursion_uses_fresh_frames() {
        let source = "\
            fact := fn(n: i32) -> i32 {\n\
                if (n == 0) { return 1; }\n\
                acc := i32 fact(n - 1);\n\
                return n * acc;\n\
            }\n\
            export fact;\n";
        let wasm = compile_u(source);
        let result = call_exported(&wasm, "fact", &[5]).expect("call failed");
        assert_eq!(result, Some(120));
    }

    #[test]
    fn test_e2e_callee_frame_does_not_clobber_caller() {
        let source = "\
            scribble := fn() -> i32 {\n\
                y := i32 99;\n\
                return y;\n\
            }\n\
            main := fn() -> i32 {\n\
                x := i32 7;\n\
                scribble();\n\
                return x;\n\
            }\n\
            export main;\n";
        let wasm = compile_u(source);
        let result = call_exported(&wasm, "main", &[]).expect("call failed");
        assert_eq!(result, Some(7), "callee writes must land past the caller's frame");
    }

    #[test]
    fn test_e2e_string_len_and_index() {
        let source = "\
            len := fn() -> u32 {\n\
                s := []u8 \"hello\";\n\
                return s.len;\n\
            }\n\
            first := fn() -> u8 {\n\
                s := []u8 \"AB\";\n\
                return s[0];\n\
            }\n\
            export len;\n\
            export first;\n";
        let wasm = compile_u(source);
        assert_eq!(call_exported(&wasm, "len", &[]).unwrap(), Some(5));
        assert_eq!(call_exported(&wasm, "first", &[]).unwrap(), Some(65));
    }

    #[test]
    fn test_e2e_store_through_slice_index() {
        let source = "\
            main := fn() -> u8 {\n\
                s := []u8 \"AB\";\n\
                s[0] = 90u8;\n\
                return s[0];\n\
            }\n\
            export main;\n";
        let wasm = compile_u(source);
        let result = call_exported(&wasm, "main", &[]).expect("call failed");
        assert_eq!(result, Some(90));
    }

    #[test]
    fn test_e2e_boolean_operators() {
        let source = "\
            check := fn(a: i32, b: i32) -> bool {\n\
                return a == 1 and b == 2 or a == 9;\n\
            }\n\
            export check;\n";
        let wasm = compile_u(source);
        assert_eq!(call_exported(&wasm, "check", &[1, 2]).unwrap(), Some(1));
        assert_eq!(call_exported(&wasm, "check", &[9, 0]).unwrap(), Some(1));
        assert_eq!(call_exported(&wasm, "check", &[1, 3]).unwrap(), Some(0));
    }

    #[test]
    fn test_e2e_extern_function_round_trip() {
        let source = "\
            extern add_host := fn(a: i32, b: i32) -> i32;\n\
            main := fn() -> i32 { return add_host(20, 22); }\n\
            export main;\n";
        let wasm = compile_u(source);
        let output = call_exported_linked(&wasm, "main", &[], |linker| {
            linker
                .func_wrap("env", "add_host", |a: i32, b: i32| -> i32 { a + b })
                .map_err(|e| RunError {
                    message: format!("Failed to link add_host: {}", e),
                    context: "test::link".to_string(),
                })?;
            Ok(())
        })
        .expect("call failed");
        assert_eq!(output.result, Some(42));
    }

    #[test]
    fn test_e2e_extern_log_captures_values() {
        let source = "\
            extern log := fn(x: i32);\n\
            main := fn() -> i32 {\n\
                log(7);\n\
                log(8);\n\
                return 0;\n\
            }\n\
            export main;\n";
        let wasm = compile_u(source);
        let output = call_exported_linked(&wasm, "main", &[], |linker| {
            linker
                .func_wrap(
                    "env",
                    "log",
                    |mut caller: wasmtime::Caller<'_, HostState>, x: i32| {
                        caller.data_mut().logged.push(i64::from(x));
                    },
                )
                .map_err(|e| RunError {
                    message: format!("Failed to link log: {}", e),
                    context: "test::link".to_string(),
                })?;
            Ok(())
        })
        .expect("call failed");
        assert_eq!(output.logged, vec![7, 8]);
    }

    #[test]
    fn test_e2e_unsigned_division() {
        let source = "div := fn(a: u32, b: u32) -> u32 { return a / b; }\nexport div;\n";
        let wasm = compile_u(source);
        // 0xFFFFFFFE / 2: unsigned division must not sign-extend.
        let result = call_exported(&wasm, "div", &[0xFFFF_FFFE, 2]).expect("call failed");
        assert_eq!(result, Some(0x7FFF_FFFF));
    }

    #[test]
    fn test_invalid_wasm_rejected() {
        let result = call_exported(&[0, 1, 2, 3], "main", &[]);
        assert!(result.is_err(), "invalid WASM should error");
    }

    #[test]
    fn test_missing_export_rejected() {
        let wasm = compile_u("main := fn() -> i32 { return 0; }\nexport main;\n");
        let result = call_exported(&wasm, "nonexistent", &[]);
        assert!(result.is_err(), "missing export should error");
    }

    #[test]
    fn test_wrong_argument_count_rejected() {
        let wasm = compile_u("id := fn(a: i32) -> i32 { return a; }\nexport id;\n");
        let result = call_exported(&wasm, "id", &[]);
        assert!(result.is_err(), "arity mismatch should error");
    }
}
