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

//! WebAssembly binary serialization: LEB128 primitives, the byte-buffer
//! and vector builders, and the whole-module section writer.
//!
//! Counts, lengths, indices and memory-access immediates are canonical
//! unsigned LEB128; `i32.const` / `i64.const` immediates are signed LEB128
//! as the format requires.

use crate::ast::{DeclKind, Module, ValueType};
use crate::codegen::{self, CodegenError};

/// Index of the module's single mutable global, the linear-memory stack
/// pointer.
pub const GLOBAL_STACK_PTR: u32 = 0;

/// Pages of linear memory requested at instantiation (64 KiB each).
const MEMORY_MIN_PAGES: u64 = 2;

/// Name under which the linear memory is exported.
const MEMORY_EXPORT_NAME: &str = "u_memory";

// =============================================================================
// Opcodes & type tags
// =============================================================================

/// Instruction opcodes, by their names in the WebAssembly spec.
pub mod op {
    pub const UNREACHABLE: u8 = 0x00;
    pub const IF: u8 = 0x04;
    pub const ELSE: u8 = 0x05;
    pub const END: u8 = 0x0B;
    pub const RETURN: u8 = 0x0F;
    pub const CALL: u8 = 0x10;
    pub const DROP: u8 = 0x1A;
    pub const LOCAL_GET: u8 = 0x20;
    pub const LOCAL_SET: u8 = 0x21;
    pub const LOCAL_TEE: u8 = 0x22;
    pub const GLOBAL_GET: u8 = 0x23;
    pub const GLOBAL_SET: u8 = 0x24;
    pub const I32_LOAD: u8 = 0x28;
    pub const I64_LOAD: u8 = 0x29;
    pub const I32_LOAD8_U: u8 = 0x2D;
    pub const I32_STORE: u8 = 0x36;
    pub const I64_STORE: u8 = 0x37;
    pub const I32_STORE8: u8 = 0x3A;
    pub const I32_CONST: u8 = 0x41;
    pub const I64_CONST: u8 = 0x42;
    pub const I32_EQ: u8 = 0x46;
    pub const I32_ADD: u8 = 0x6A;
    pub const I32_SUB: u8 = 0x6B;
    pub const I32_MUL: u8 = 0x6C;
    pub const I32_DIV_S: u8 = 0x6D;
    pub const I32_DIV_U: u8 = 0x6E;
    pub const I32_REM_S: u8 = 0x6F;
    pub const I32_REM_U: u8 = 0x70;
    pub const I32_AND: u8 = 0x71;
    pub const I32_OR: u8 = 0x72;
    pub const I64_SHR_U: u8 = 0x88;
    pub const I32_WRAP_I64: u8 = 0xA7;
}

pub const VALTYPE_I32: u8 = 0x7F;
pub const VALTYPE_I64: u8 = 0x7E;
pub const FUNC_TYPE: u8 = 0x60;
pub const BLOCKTYPE_EMPTY: u8 = 0x40;

const EXPORT_KIND_FUNC: u8 = 0x00;
const EXPORT_KIND_MEMORY: u8 = 0x02;
const IMPORT_KIND_FUNC: u8 = 0x00;
const GLOBAL_MUTABLE: u8 = 0x01;
const LIMITS_MIN_ONLY: u8 = 0x00;

/// Section ids, in the order the container requires them.
#[derive(Debug, Clone, Copy)]
enum SectionId {
    Type = 1,
    Import = 2,
    Function = 3,
    Memory = 5,
    Global = 6,
    Export = 7,
    Code = 10,
    Data = 11,
}

/// Wire representation of a value kind: slices ride in an `i64`, everything
/// else in an `i32`.
pub fn encode_value_type(vt: &ValueType) -> u8 {
    match vt {
        ValueType::Int { .. } | ValueType::Bool => VALTYPE_I32,
        ValueType::Slice(_) => VALTYPE_I64,
        ValueType::Nil => unreachable!("nil has no wire representation"),
    }
}

// =============================================================================
// Byte buffer
// =============================================================================

/// Growable byte sink with the WASM integer/name encodings on it.
#[derive(Debug, Clone, Default)]
pub struct ByteBuffer {
    bytes: Vec<u8>,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn extend_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn append(&mut self, other: &ByteBuffer) {
        self.bytes.extend_from_slice(&other.bytes);
    }

    /// Canonical (shortest-form) unsigned LEB128.
    pub fn leb128_u(&mut self, mut value: u64) {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.bytes.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    /// Signed LEB128, for `i32.const` / `i64.const` immediates.
    pub fn leb128_s(&mut self, mut value: i64) {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            let sign_clear = byte & 0x40 == 0;
            let done = (value == 0 && sign_clear) || (value == -1 && !sign_clear);
            if !done {
                byte |= 0x80;
            }
            self.bytes.push(byte);
            if done {
                break;
            }
        }
    }

    /// A WASM name: byte length then UTF-8 contents.
    pub fn name(&mut self, s: &str) {
        self.leb128_u(s.len() as u64);
        self.bytes.extend_from_slice(s.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// A counted vector under construction: entries are written into `content`
/// and the count is prefixed when the vector is flushed into its section.
#[derive(Debug, Default)]
pub struct WasmVec {
    count: u64,
    content: ByteBuffer,
}

impl WasmVec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start one entry; the caller writes its bytes into the returned buffer.
    pub fn entry(&mut self) -> &mut ByteBuffer {
        self.count += 1;
        &mut self.content
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn write_to(&self, out: &mut ByteBuffer) {
        out.leb128_u(self.count);
        out.append(&self.content);
    }
}

fn write_section(out: &mut ByteBuffer, id: SectionId, content: &ByteBuffer) {
    out.push(id as u8);
    out.leb128_u(content.len() as u64);
    out.append(content);
}

// =============================================================================
// Module serialization
// =============================================================================

/// Serialize a parsed module into a complete WebAssembly binary, generating
/// each function body through the code generator on the way.
pub fn encode_module(module: &Module) -> Result<Vec<u8>, CodegenError> {
    let mut out = ByteBuffer::new();
    out.extend_bytes(&[0x00, 0x61, 0x73, 0x6D]); // magic
    out.extend_bytes(&[0x01, 0x00, 0x00, 0x00]); // version

    encode_type_section(module, &mut out);
    encode_import_section(module, &mut out)?;
    encode_function_section(module, &mut out);
    encode_memory_section(&mut out);
    encode_global_section(module, &mut out);
    encode_export_section(module, &mut out)?;
    encode_code_section(module, &mut out)?;
    encode_data_section(module, &mut out);

    Ok(out.into_bytes())
}

fn encode_type_section(module: &Module, out: &mut ByteBuffer) {
    let mut types = WasmVec::new();
    for ft in &module.function_types {
        let buf = types.entry();
        buf.push(FUNC_TYPE);

        let params = &module.scopes[ft.param_scope];
        buf.leb128_u(params.decls.len() as u64);
        for decl in &params.decls {
            if let DeclKind::Param(vt) = &decl.kind {
                buf.push(encode_value_type(vt));
            }
        }

        if ft.return_type.is_nil() {
            buf.leb128_u(0);
        } else {
            buf.leb128_u(1);
            buf.push(encode_value_type(&ft.return_type));
        }
    }

    let mut content = ByteBuffer::new();
    types.write_to(&mut content);
    write_section(out, SectionId::Type, &content);
}

fn encode_import_section(module: &Module, out: &mut ByteBuffer) -> Result<(), CodegenError> {
    if module.extern_functions.is_empty() {
        return Ok(());
    }

    let mut imports = WasmVec::new();
    for (i, f) in module.extern_functions.iter().enumerate() {
        let name = module.extern_function_name(i).ok_or_else(|| {
            CodegenError::Internal(format!("extern function {} has no declaration", i))
        })?;
        let buf = imports.entry();
        buf.name("env");
        buf.name(name);
        buf.push(IMPORT_KIND_FUNC);
        buf.leb128_u(f.function_type as u64);
    }

    let mut content = ByteBuffer::new();
    imports.write_to(&mut content);
    write_section(out, SectionId::Import, &content);
    Ok(())
}

fn encode_function_section(module: &Module, out: &mut ByteBuffer) {
    let mut funcs = WasmVec::new();
    for f in &module.functions {
        funcs.entry().leb128_u(f.function_type as u64);
    }

    let mut content = ByteBuffer::new();
    funcs.write_to(&mut content);
    write_section(out, SectionId::Function, &content);
}

fn encode_memory_section(out: &mut ByteBuffer) {
    let mut content = ByteBuffer::new();
    content.leb128_u(1);
    content.push(LIMITS_MIN_ONLY);
    content.leb128_u(MEMORY_MIN_PAGES);
    write_section(out, SectionId::Memory, &content);
}

/// The stack pointer starts just past the string pool, so frames never
/// overlap the interned constants.
fn encode_global_section(module: &Module, out: &mut ByteBuffer) {
    let mut content = ByteBuffer::new();
    content.leb128_u(1);
    content.push(VALTYPE_I32);
    content.push(GLOBAL_MUTABLE);
    content.push(op::I32_CONST);
    content.leb128_s(module.string_pool_size() as i64);
    content.push(op::END);
    write_section(out, SectionId::Global, &content);
}

fn encode_export_section(module: &Module, out: &mut ByteBuffer) -> Result<(), CodegenError> {
    let mut exports = WasmVec::new();

    let buf = exports.entry();
    buf.name(MEMORY_EXPORT_NAME);
    buf.push(EXPORT_KIND_MEMORY);
    buf.leb128_u(0);

    for name in &module.exports {
        let decl = module
            .find_global_decl(name)
            .ok_or_else(|| CodegenError::BadExport { name: name.clone() })?;
        let DeclKind::Function(i) = decl.kind else {
            return Err(CodegenError::BadExport { name: name.clone() });
        };
        let buf = exports.entry();
        buf.name(name);
        buf.push(EXPORT_KIND_FUNC);
        buf.leb128_u((i + module.extern_functions.len()) as u64);
    }

    let mut content = ByteBuffer::new();
    exports.write_to(&mut content);
    write_section(out, SectionId::Export, &content);
    Ok(())
}

fn encode_code_section(module: &Module, out: &mut ByteBuffer) -> Result<(), CodegenError> {
    let mut bodies = WasmVec::new();
    for f in &module.functions {
        let body = codegen::codegen_function(module, f)?;
        let buf = bodies.entry();
        buf.leb128_u(body.len() as u64);
        buf.append(&body);
    }

    let mut content = ByteBuffer::new();
    bodies.write_to(&mut content);
    write_section(out, SectionId::Code, &content);
    Ok(())
}

fn encode_data_section(module: &Module, out: &mut ByteBuffer) {
    if module.string_constants.is_empty() {
        return;
    }

    let mut content = ByteBuffer::new();
    content.leb128_u(1); // one active segment
    content.leb128_u(0); // memory 0
    content.push(op::I32_CONST);
    content.leb128_s(0);
    content.push(op::END);
    content.leb128_u(module.string_pool_size() as u64);
    for s in &module.string_constants {
        content.extend_bytes(s);
    }
    write_section(out, SectionId::Data, &content);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leb_u(value: u64) -> Vec<u8> {
        let mut buf = ByteBuffer::new();
        buf.leb128_u(value);
        buf.into_bytes()
    }

    fn leb_s(value: i64) -> Vec<u8> {
        let mut buf = ByteBuffer::new();
        buf.leb128_s(value);
        buf.into_bytes()
    }

    fn decode_leb_u(bytes: &[u8]) -> (u64, usize) {
        let mut value = 0u64;
        let mut shift = 0;
        for (i, &b) in bytes.iter().enumerate() {
            value |= u64::from(b & 0x7F) << shift;
            if b & 0x80 == 0 {
                return (value, i + 1);
            }
            shift += 7;
        }
        panic!("Unterminated LEB128");
    }

    fn decode_leb_s(bytes: &[u8]) -> (i64, usize) {
        let mut value = 0i64;
        let mut shift = 0;
        for (i, &b) in bytes.iter().enumerate() {
            value |= i64::from(b & 0x7F) << shift;
            shift += 7;
            if b & 0x80 == 0 {
                if shift < 64 && b & 0x40 != 0 {
                    value |= -1i64 << shift;
                }
                return (value, i + 1);
            }
        }
        panic!("Unterminated LEB128");
    }

    #[test]
    fn test_unsigned_leb_canonical_forms() {
        assert_eq!(leb_u(0), vec![0x00]);
        assert_eq!(leb_u(127), vec![0x7F]);
        assert_eq!(leb_u(128), vec![0x80, 0x01]);
        assert_eq!(leb_u(16383), vec![0xFF, 0x7F]);
        assert_eq!(leb_u(16384), vec![0x80, 0x80, 0x01]);
    }

    #[test]
    fn test_unsigned_leb_round_trip_boundaries() {
        for value in [
            0u64,
            1,
            127,
            128,
            16383,
            16384,
            (1 << 28) - 1,
            1 << 28,
            u64::from(u32::MAX),
            u64::MAX,
        ] {
            let bytes = leb_u(value);
            let (decoded, used) = decode_leb_u(&bytes);
            assert_eq!(decoded, value);
            assert_eq!(used, bytes.len(), "trailing bytes for {}", value);
        }
    }

    #[test]
    fn test_signed_leb_known_encodings() {
        assert_eq!(leb_s(0), vec![0x00]);
        assert_eq!(leb_s(63), vec![0x3F]);
        assert_eq!(leb_s(64), vec![0xC0, 0x00]);
        assert_eq!(leb_s(-1), vec![0x7F]);
        assert_eq!(leb_s(-64), vec![0x40]);
        assert_eq!(leb_s(-65), vec![0xBF, 0x7F]);
    }

    #[test]
    fn test_signed_leb_round_trip_boundaries() {
        for value in [
            0i64,
            1,
            -1,
            63,
            64,
            -64,
            -65,
            i64::from(i32::MAX),
            i64::from(i32::MIN),
            i64::from(u32::MAX), // u32 immediate viewed through i32.const
            i64::MAX,
            i64::MIN,
        ] {
            let bytes = leb_s(value);
            let (decoded, used) = decode_leb_s(&bytes);
            assert_eq!(decoded, value);
            assert_eq!(used, bytes.len(), "trailing bytes for {}", value);
        }
    }

    #[test]
    fn test_name_encoding() {
        let mut buf = ByteBuffer::new();
        buf.name("env");
        assert_eq!(buf.as_slice(), &[0x03, b'e', b'n', b'v']);
    }

    #[test]
    fn test_wasm_vec_prefixes_count() {
        let mut v = WasmVec::new();
        v.entry().push(0xAA);
        v.entry().push(0xBB);
        let mut out = ByteBuffer::new();
        v.write_to(&mut out);
        assert_eq!(out.as_slice(), &[0x02, 0xAA, 0xBB]);
    }

    #[test]
    fn test_module_header() {
        let bytes = crate::compile("main := fn() -> i32 { return 0; }").unwrap();
        assert_eq!(hex::encode(&bytes[..8]), "0061736d01000000");
    }

    #[test]
    fn test_section_ids_strictly_increase() {
        let src = "\
            extern log := fn(x: i32);\n\
            main := fn() -> i32 { s := []u8 \"hi\"; return s.len; }\n\
            export main;\n";
        let bytes = crate::compile(src).unwrap();
        let mut pos = 8;
        let mut seen = Vec::new();
        while pos < bytes.len() {
            let id = bytes[pos];
            let (len, used) = decode_leb_u(&bytes[pos + 1..]);
            seen.push(id);
            pos += 1 + used + len as usize;
        }
        assert_eq!(pos, bytes.len());
        assert_eq!(seen, vec![1, 2, 3, 5, 6, 7, 10, 11]);
    }

    #[test]
    fn test_data_section_omitted_without_strings() {
        let bytes = crate::compile("main := fn() -> i32 { return 0; }").unwrap();
        let mut pos = 8;
        let mut seen = Vec::new();
        while pos < bytes.len() {
            let id = bytes[pos];
            let (len, used) = decode_leb_u(&bytes[pos + 1..]);
            seen.push(id);
            pos += 1 + used + len as usize;
        }
        assert!(!seen.contains(&2), "no imports expected");
        assert!(!seen.contains(&11), "no data section expected");
    }

    #[test]
    fn test_export_of_unknown_name_is_rejected() {
        let module = crate::parser::parse("export missing;\n").unwrap();
        match encode_module(&module) {
            Err(CodegenError::BadExport { name }) => assert_eq!(name, "missing"),
            other => panic!("Expected BadExport, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_export_of_variable_is_rejected() {
        let module = crate::parser::parse("g := i32;\nexport g;\n").unwrap();
        match encode_module(&module) {
            Err(CodegenError::BadExport { name }) => assert_eq!(name, "g"),
            other => panic!("Expected BadExport, got {:?}", other.map(|_| ())),
        }
    }
}
