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

//! Data model of a parsed U module: value types, the declaration-scope
//! arena, RPN expression lists, statements and functions.
//!
//! Scopes form a forest stored as a flat `Vec<DeclScope>` with parent
//! indices; index 0 is always the global scope. The frame-layout queries
//! (`lookup_var`, `frame_size`, `stack_base_slot`, …) live here as methods
//! on [`Module`] so both passes of the code generator share them.

use std::fmt;

/// Index of the global scope in [`Module::scopes`].
pub const GLOBAL_SCOPE: usize = 0;

// =============================================================================
// Value Types
// =============================================================================

/// Compile-time type of an expression or declaration.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ValueType {
    /// Absent type: void returns, discarded expression values.
    #[default]
    Nil,
    /// Integer of a given bit width. Arithmetic is modulo 2^bits; the
    /// signedness flag only affects division, remainder and comparisons.
    Int { bits: u32, unsigned: bool },
    Bool,
    /// Pointer+length pair packed into one 64-bit value: high 32 bits are
    /// the length, low 32 bits the pointer.
    Slice(Box<ValueType>),
}

impl ValueType {
    /// u32, the type of slice `.len` / `.ptr` fields and of slice indices.
    pub fn u32() -> Self {
        ValueType::Int {
            bits: 32,
            unsigned: true,
        }
    }

    pub fn i32() -> Self {
        ValueType::Int {
            bits: 32,
            unsigned: false,
        }
    }

    pub fn u8() -> Self {
        ValueType::Int {
            bits: 8,
            unsigned: true,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ValueType::Nil)
    }

    /// Storage size in the linear-memory stack frame.
    pub fn size_in_bytes(&self) -> u32 {
        match self {
            ValueType::Nil => 0,
            ValueType::Int { bits, .. } => bits.div_ceil(8),
            ValueType::Bool => 1,
            ValueType::Slice(_) => 8,
        }
    }

    /// Structural comparison used by operators, assignments, calls and
    /// signature dedup. Signedness is deliberately not part of it; only
    /// widths and shapes are.
    pub fn matches(&self, other: &ValueType) -> bool {
        match (self, other) {
            (ValueType::Nil, ValueType::Nil) => true,
            (ValueType::Int { bits: a, .. }, ValueType::Int { bits: b, .. }) => a == b,
            (ValueType::Bool, ValueType::Bool) => true,
            (ValueType::Slice(a), ValueType::Slice(b)) => a.matches(b),
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueType::Nil => write!(f, "nil"),
            ValueType::Int { bits, unsigned } => {
                write!(f, "{}{}", if *unsigned { 'u' } else { 'i' }, bits)
            }
            ValueType::Bool => write!(f, "bool"),
            ValueType::Slice(inner) => write!(f, "[]{}", inner),
        }
    }
}

// =============================================================================
// Declarations & Scopes
// =============================================================================

#[derive(Debug, Clone)]
pub enum DeclKind {
    /// User function; payload is the index into [`Module::functions`].
    Function(usize),
    /// Imported function; payload is the index into [`Module::extern_functions`].
    ExternFunction(usize),
    Param(ValueType),
    Variable(ValueType),
}

#[derive(Debug, Clone)]
pub struct Decl {
    pub name: String,
    pub kind: DeclKind,
}

/// One level of the nested symbol table. Declarations are appended during
/// parsing and never move; everything is read-only during code generation.
#[derive(Debug, Clone, Default)]
pub struct DeclScope {
    pub decls: Vec<Decl>,
    pub parent: usize,
    /// True for the scope introduced at a function boundary (its entries are
    /// all parameters).
    pub param_scope: bool,
}

// =============================================================================
// Expressions (postfix / RPN)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Addition,
    Subtraction,
    Multiplication,
    Remainder,
    Division,
    Assignment,
    Equality,
    /// `or`
    Alternative,
    /// `and`
    Conjunction,
    Indexing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntConst { value: i64, bits: u32, unsigned: bool },
    BoolConst(bool),
    /// Index into [`Module::string_constants`].
    StringConst(usize),
    Var(String),
    Operator(Operator),
    FuncCall(String),
    FieldAccess(String),
}

/// One node of a postfix expression list, with the source location of the
/// token it came from (used for error reporting in the decision pass).
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
    pub col: u32,
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone)]
pub enum Statement {
    Empty,
    Block {
        scope: usize,
        statements: Vec<Statement>,
    },
    Return(Vec<Expr>),
    If {
        condition: Vec<Expr>,
        positive: Box<Statement>,
        negative: Option<Box<Statement>>,
    },
    Expression(Vec<Expr>),
}

// =============================================================================
// Functions & Module
// =============================================================================

/// A deduplicated function signature: parameter kinds (via the parameter
/// scope) plus return kind.
#[derive(Debug, Clone)]
pub struct FunctionType {
    pub param_scope: usize,
    pub return_type: ValueType,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub param_scope: usize,
    pub return_type: ValueType,
    /// `Statement::Empty` for extern functions, which have no body.
    pub body: Statement,
    /// Index into [`Module::function_types`].
    pub function_type: usize,
}

/// Everything the parser produces and the code generator consumes.
///
/// In the final index space extern functions are numbered before user
/// functions, so a user function's index is
/// `extern_functions.len() + position`.
#[derive(Debug, Default)]
pub struct Module {
    pub exports: Vec<String>,
    pub scopes: Vec<DeclScope>,
    pub function_types: Vec<FunctionType>,
    pub extern_functions: Vec<Function>,
    pub functions: Vec<Function>,
    /// Interned string literals, laid out back-to-back at address 0 of the
    /// emitted module's linear memory.
    pub string_constants: Vec<Vec<u8>>,
}

impl Module {
    pub fn new() -> Self {
        Module {
            scopes: vec![DeclScope::default()],
            ..Default::default()
        }
    }

    // =========================================================================
    // Scope lookup & frame layout
    // =========================================================================

    /// Look up a name through the scope chain.
    ///
    /// The parent chain is searched before the scope's own entries, so outer
    /// declarations win and their slots are independent of sibling blocks.
    /// The returned slot is the parameter ordinal for parameters and the
    /// cumulative byte offset of preceding variables for variables; for
    /// function declarations it is meaningless.
    pub fn lookup_var(&self, scope: usize, name: &str) -> Option<(u32, &Decl)> {
        let mut offset = 0u32;
        self.lookup_var_from(scope, name, &mut offset)
    }

    fn lookup_var_from<'a>(
        &'a self,
        scope: usize,
        name: &str,
        offset: &mut u32,
    ) -> Option<(u32, &'a Decl)> {
        let s = &self.scopes[scope];

        if scope != GLOBAL_SCOPE {
            if let Some(found) = self.lookup_var_from(s.parent, name, offset) {
                return Some(found);
            }
        }

        let mut param_index = 0u32;
        for decl in &s.decls {
            if decl.name == name {
                let slot = match decl.kind {
                    DeclKind::Param(_) => param_index,
                    _ => *offset,
                };
                return Some((slot, decl));
            }
            match &decl.kind {
                DeclKind::Param(_) => param_index += 1,
                DeclKind::Variable(vt) => *offset += vt.size_in_bytes(),
                _ => {}
            }
        }

        None
    }

    /// Resolve a callee name to its index in the final function index space
    /// (extern functions first, then user functions). A name that resolves
    /// to a non-function declaration yields `None`.
    pub fn lookup_fn(&self, scope: usize, name: &str) -> Option<u32> {
        let s = &self.scopes[scope];

        if scope != GLOBAL_SCOPE {
            if let Some(idx) = self.lookup_fn(s.parent, name) {
                return Some(idx);
            }
        }

        for decl in &s.decls {
            if decl.name == name {
                return match decl.kind {
                    DeclKind::Function(i) => Some((i + self.extern_functions.len()) as u32),
                    DeclKind::ExternFunction(i) => Some(i as u32),
                    _ => None,
                };
            }
        }

        None
    }

    /// Function referenced by a final-index-space function index.
    pub fn function_by_index(&self, index: u32) -> &Function {
        let index = index as usize;
        if index >= self.extern_functions.len() {
            &self.functions[index - self.extern_functions.len()]
        } else {
            &self.extern_functions[index]
        }
    }

    /// Total bytes of spill-region variables from the enclosing function
    /// boundary down to `scope`. `None` outside any function.
    pub fn frame_size(&self, scope: usize) -> Option<u32> {
        if scope == GLOBAL_SCOPE {
            return None;
        }
        let s = &self.scopes[scope];
        let mut size = if s.param_scope {
            0
        } else {
            self.frame_size(s.parent)?
        };
        for decl in &s.decls {
            if let DeclKind::Variable(vt) = &decl.kind {
                size += vt.size_in_bytes();
            }
        }
        Some(size)
    }

    /// Local slot holding the current call's spill-region base address: by
    /// convention the first local after the parameters.
    pub fn stack_base_slot(&self, scope: usize) -> Option<u32> {
        if scope == GLOBAL_SCOPE {
            return None;
        }
        let s = &self.scopes[scope];
        if s.param_scope {
            return Some(s.decls.len() as u32);
        }
        self.stack_base_slot(s.parent)
    }

    /// Scratch i32 local, next after the stack base.
    pub fn temp_i32_slot(&self, scope: usize) -> Option<u32> {
        Some(self.stack_base_slot(scope)? + 1)
    }

    /// Scratch i64 local, next after the scratch i32.
    pub fn temp_i64_slot(&self, scope: usize) -> Option<u32> {
        Some(self.stack_base_slot(scope)? + 2)
    }

    // =========================================================================
    // String constant pool
    // =========================================================================

    /// Byte offset of a pool entry: the sum of the lengths of all entries
    /// before it (the pool starts at linear-memory address 0).
    pub fn string_offset(&self, index: usize) -> u32 {
        self.string_constants[..index]
            .iter()
            .map(|s| s.len() as u32)
            .sum()
    }

    pub fn string_pool_size(&self) -> u32 {
        self.string_offset(self.string_constants.len())
    }

    // =========================================================================
    // Function types
    // =========================================================================

    /// Linear scan for a structurally equal signature. Tables are small, so
    /// no hashing.
    pub fn find_function_type(&self, param_scope: usize, return_type: &ValueType) -> Option<usize> {
        let params = &self.scopes[param_scope];
        'outer: for (i, ft) in self.function_types.iter().enumerate() {
            if !ft.return_type.matches(return_type) {
                continue;
            }
            let other = &self.scopes[ft.param_scope];
            if params.decls.len() != other.decls.len() {
                continue;
            }
            for (a, b) in params.decls.iter().zip(&other.decls) {
                let (DeclKind::Param(ta), DeclKind::Param(tb)) = (&a.kind, &b.kind) else {
                    continue 'outer;
                };
                if !ta.matches(tb) {
                    continue 'outer;
                }
            }
            return Some(i);
        }
        None
    }

    /// Find-or-insert into the deduplicated signature table.
    pub fn intern_function_type(&mut self, param_scope: usize, return_type: ValueType) -> usize {
        if let Some(i) = self.find_function_type(param_scope, &return_type) {
            return i;
        }
        self.function_types.push(FunctionType {
            param_scope,
            return_type,
        });
        self.function_types.len() - 1
    }

    pub fn find_global_decl(&self, name: &str) -> Option<&Decl> {
        self.scopes[GLOBAL_SCOPE]
            .decls
            .iter()
            .find(|d| d.name == name)
    }

    /// Name of the extern function with the given import index (reverse
    /// lookup through the global scope).
    pub fn extern_function_name(&self, index: usize) -> Option<&str> {
        self.scopes[GLOBAL_SCOPE].decls.iter().find_map(|d| match d.kind {
            DeclKind::ExternFunction(i) if i == index => Some(d.name.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, vt: ValueType) -> Decl {
        Decl {
            name: name.to_string(),
            kind: DeclKind::Variable(vt),
        }
    }

    fn param(name: &str, vt: ValueType) -> Decl {
        Decl {
            name: name.to_string(),
            kind: DeclKind::Param(vt),
        }
    }

    /// Global scope (0) ← param scope (1: a, b) ← block (2: x u8, y i32)
    /// ← inner block (3: z []u8).
    fn layout_fixture() -> Module {
        let mut module = Module::new();
        module.scopes.push(DeclScope {
            decls: vec![param("a", ValueType::i32()), param("b", ValueType::Bool)],
            parent: GLOBAL_SCOPE,
            param_scope: true,
        });
        module.scopes.push(DeclScope {
            decls: vec![var("x", ValueType::u8()), var("y", ValueType::i32())],
            parent: 1,
            param_scope: false,
        });
        module.scopes.push(DeclScope {
            decls: vec![var("z", ValueType::Slice(Box::new(ValueType::u8())))],
            parent: 2,
            param_scope: false,
        });
        module
    }

    #[test]
    fn test_value_type_sizes() {
        assert_eq!(ValueType::Nil.size_in_bytes(), 0);
        assert_eq!(ValueType::u8().size_in_bytes(), 1);
        assert_eq!(ValueType::i32().size_in_bytes(), 4);
        assert_eq!(ValueType::Int { bits: 12, unsigned: true }.size_in_bytes(), 2);
        assert_eq!(ValueType::Bool.size_in_bytes(), 1);
        assert_eq!(
            ValueType::Slice(Box::new(ValueType::u8())).size_in_bytes(),
            8
        );
    }

    #[test]
    fn test_value_type_matches_ignores_signedness() {
        assert!(ValueType::i32().matches(&ValueType::u32()));
        assert!(!ValueType::u8().matches(&ValueType::i32()));
        assert!(!ValueType::Bool.matches(&ValueType::i32()));
        assert!(ValueType::Slice(Box::new(ValueType::u8()))
            .matches(&ValueType::Slice(Box::new(ValueType::u8()))));
        assert!(!ValueType::Slice(Box::new(ValueType::u8()))
            .matches(&ValueType::Slice(Box::new(ValueType::i32()))));
    }

    #[test]
    fn test_param_ordinals() {
        let module = layout_fixture();
        let (slot, decl) = module.lookup_var(3, "b").expect("b not found");
        assert_eq!(slot, 1);
        assert!(matches!(decl.kind, DeclKind::Param(ValueType::Bool)));
    }

    #[test]
    fn test_variable_offsets_accumulate_through_scopes() {
        let module = layout_fixture();
        assert_eq!(module.lookup_var(3, "x").unwrap().0, 0);
        assert_eq!(module.lookup_var(3, "y").unwrap().0, 1); // after x: u8
        assert_eq!(module.lookup_var(3, "z").unwrap().0, 5); // after x + y
    }

    #[test]
    fn test_variable_ranges_are_disjoint() {
        let module = layout_fixture();
        let mut ranges = Vec::new();
        for name in ["x", "y", "z"] {
            let (offset, decl) = module.lookup_var(3, name).unwrap();
            let DeclKind::Variable(vt) = &decl.kind else {
                panic!("Expected variable decl for {}", name);
            };
            ranges.push(offset..offset + vt.size_in_bytes());
        }
        for (i, a) in ranges.iter().enumerate() {
            for b in &ranges[i + 1..] {
                assert!(a.end <= b.start || b.end <= a.start, "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_frame_size_sums_to_innermost() {
        let module = layout_fixture();
        assert_eq!(module.frame_size(1), Some(0));
        assert_eq!(module.frame_size(2), Some(5));
        assert_eq!(module.frame_size(3), Some(13));
        assert_eq!(module.frame_size(GLOBAL_SCOPE), None);
    }

    #[test]
    fn test_stack_base_and_scratch_slots() {
        let module = layout_fixture();
        // Two parameters, so the reserved locals start at slot 2.
        assert_eq!(module.stack_base_slot(3), Some(2));
        assert_eq!(module.temp_i32_slot(3), Some(3));
        assert_eq!(module.temp_i64_slot(3), Some(4));
        assert_eq!(module.stack_base_slot(GLOBAL_SCOPE), None);
    }

    #[test]
    fn test_shadowing_resolves_outer_first() {
        // The parent chain is scanned before the current scope, so an outer
        // `x` wins over a block-local one.
        let mut module = layout_fixture();
        module.scopes[3].decls.push(var("x", ValueType::i32()));
        let (slot, decl) = module.lookup_var(3, "x").unwrap();
        assert_eq!(slot, 0);
        let DeclKind::Variable(vt) = &decl.kind else {
            panic!("Expected variable");
        };
        assert_eq!(*vt, ValueType::u8());
    }

    #[test]
    fn test_string_offsets_are_prefix_sums() {
        let mut module = Module::new();
        module.string_constants.push(b"abc".to_vec());
        module.string_constants.push(b"de".to_vec());
        module.string_constants.push(b"".to_vec());
        module.string_constants.push(b"f".to_vec());
        assert_eq!(module.string_offset(0), 0);
        assert_eq!(module.string_offset(1), 3);
        assert_eq!(module.string_offset(2), 5);
        assert_eq!(module.string_offset(3), 5);
        assert_eq!(module.string_pool_size(), 6);
    }

    #[test]
    fn test_function_type_dedup_is_structural() {
        let mut module = Module::new();
        for _ in 0..2 {
            module.scopes.push(DeclScope {
                decls: vec![param("p", ValueType::i32())],
                parent: GLOBAL_SCOPE,
                param_scope: true,
            });
        }
        let a = module.intern_function_type(1, ValueType::i32());
        let b = module.intern_function_type(2, ValueType::i32());
        assert_eq!(a, b);
        let c = module.intern_function_type(2, ValueType::Nil);
        assert_ne!(a, c);
        assert_eq!(module.function_types.len(), 2);
    }
}
