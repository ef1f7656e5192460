//! LLVM IR code generation.
//!
//! Generates LLVM IR as text (`.ll` files); `backend.rs` invokes `clang` to
//! turn that into an object file or executable. This is deliberately
//! simpler and more portable than linking against `inkwell`/`llvm-sys`: the
//! crate has no LLVM library dependency at all, just a `clang` on `PATH`.
//!
//! # Module structure
//!
//! - `error.rs`: `CodeGenError`
//! - `platform.rs`: target triple detection
//! - `expr.rs`: expression lowering
//! - `stmt.rs`: statement lowering
//! - `function.rs`: function- and program-level orchestration
//!
//! # SSA naming
//!
//! Every temporary register and basic block gets a name from a monotonic
//! counter (`fresh_temp`/`fresh_block`) rather than being derived from
//! source identifiers — this sidesteps needing to mangle arbitrary source
//! names into valid LLVM identifiers for anything but globals and functions.

mod error;
mod expr;
mod function;
mod platform;
mod stmt;

pub use error::CodeGenError;
pub use function::generate;
pub use platform::get_target_triple;

use crate::ast::{BaseType, TypeName};
use crate::diagnostics::SourceLocation;
use crate::scope::{JumpStack, LabelTable, ScopeStack};
use crate::types::{TypeIdx, TypeTable};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

/// A value produced by lowering an expression: either an SSA register
/// (`%tNN`) or a literal constant spelled directly in IR syntax (`42`,
/// `1.5e0`), paired with its ToyC type.
#[derive(Debug, Clone)]
pub(crate) struct Value {
    pub repr: String,
    pub ty: TypeIdx,
}

impl Value {
    pub fn new(repr: impl Into<String>, ty: TypeIdx) -> Self {
        Value {
            repr: repr.into(),
            ty,
        }
    }
}

/// The address of an lvalue: a pointer register plus the type stored there.
#[derive(Debug, Clone)]
pub(crate) struct Place {
    pub ptr: String,
    pub ty: TypeIdx,
}

/// One function's signature, registered before any function body is
/// lowered so forward calls (including recursive and mutually recursive
/// calls) resolve without a second pass over the AST.
#[derive(Debug, Clone)]
pub(crate) struct FunctionSig {
    pub return_ty: TypeIdx,
    pub params: Vec<TypeIdx>,
    pub variadic: bool,
    pub defined: bool,
}

/// All mutable state threaded through a single compilation:
/// the type table, the active scope/jump/label stacks, the emitted IR
/// buffer, and the SSA name counters. There is exactly one of these per
/// `generate()` call.
pub(crate) struct CodeGenContext {
    pub output: String,
    /// Struct/global type declarations, emitted before any function body in
    /// the final module (`backend::assemble`, function.rs).
    pub type_decls: String,
    temp_counter: u64,
    block_counter: u64,
    string_counter: u64,
    pub types: TypeTable,
    pub scopes: ScopeStack,
    pub jumps: JumpStack,
    pub labels: LabelTable,
    pub functions: HashMap<String, FunctionSig>,
    pub string_constants: Vec<(String, String)>,
    pub current_function_return_ty: TypeIdx,
    declared_structs: HashSet<TypeIdx>,
    /// Whether the block currently being written already ended with a
    /// terminator (`br`/`ret`/`switch`/`unreachable`). Anything emitted
    /// after a terminator would make the function fail LLVM's verifier, so
    /// statement lowering opens an orphan block first.
    pub terminated: bool,
    /// One frame per switch currently being lowered, holding the case/
    /// default block names collected in `stmt`'s first pass. A stack
    /// because switches nest.
    pub(crate) switch_stack: Vec<stmt::SwitchFrame>,
}

impl CodeGenContext {
    pub fn new() -> Self {
        CodeGenContext {
            output: String::new(),
            type_decls: String::new(),
            temp_counter: 0,
            block_counter: 0,
            string_counter: 0,
            types: TypeTable::new(),
            scopes: ScopeStack::new(),
            jumps: JumpStack::new(),
            labels: LabelTable::new(),
            functions: HashMap::new(),
            string_constants: Vec::new(),
            current_function_return_ty: TypeIdx::INVALID,
            declared_structs: HashSet::new(),
            terminated: true,
            switch_stack: Vec::new(),
        }
    }

    pub fn fresh_temp(&mut self) -> String {
        let name = format!("t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    pub fn fresh_block(&mut self, prefix: &str) -> String {
        let name = format!("{}{}", prefix, self.block_counter);
        self.block_counter += 1;
        name
    }

    pub fn fresh_string_constant(&mut self, value: &str) -> String {
        let name = format!("@.str.{}", self.string_counter);
        self.string_counter += 1;
        self.string_constants
            .push((name.clone(), value.to_string()));
        name
    }

    /// Appends one already-formatted instruction line to the current
    /// function's body.
    pub fn emit(&mut self, line: impl std::fmt::Display) -> Result<(), CodeGenError> {
        writeln!(self.output, "  {}", line)?;
        Ok(())
    }

    /// Opens basic block `name` as the current insertion point.
    pub fn start_block(&mut self, name: &str) -> Result<(), CodeGenError> {
        writeln!(self.output, "{}:", name)?;
        self.terminated = false;
        Ok(())
    }

    /// Unconditionally branches to `target`, unless the current block is
    /// already terminated (e.g. the preceding statement was itself a
    /// `return`) — matching C's "statement after return is unreachable"
    /// rather than emitting a second terminator.
    pub fn br(&mut self, target: &str) -> Result<(), CodeGenError> {
        if !self.terminated {
            self.emit(format!("br label %{}", target))?;
            self.terminated = true;
        }
        Ok(())
    }

    /// If the current block is already terminated, opens a fresh orphan
    /// block so subsequent statement lowering (dead code after a `return`,
    /// `break`, or `goto`) still has somewhere legal to write to.
    pub fn ensure_open_block(&mut self) -> Result<(), CodeGenError> {
        if self.terminated {
            let name = self.fresh_block("unreachable.");
            self.start_block(&name)?;
        }
        Ok(())
    }

    /// Emits `%struct.Name = type { ... }` the first time a complete struct
    /// is referenced, and mutates it in place if an opaque forward
    /// declaration is completed after already being referenced.
    pub fn ensure_struct_declared(&mut self, idx: TypeIdx) -> Result<(), CodeGenError> {
        let Some(layout) = self.types.struct_layout(idx).cloned() else {
            return Ok(());
        };
        if !self.declared_structs.insert(idx) {
            return Ok(());
        }
        let backend = self
            .types
            .realize(idx)
            .map_err(|e| CodeGenError::logic(e.to_string(), SourceLocation::unknown()))?;
        let mut field_types = Vec::with_capacity(layout.members.len());
        for member in &layout.members {
            self.ensure_struct_declared(member.ty)?;
            let member_backend = self
                .types
                .realize(member.ty)
                .map_err(|e| CodeGenError::logic(e.to_string(), SourceLocation::unknown()))?;
            field_types.push(member_backend.ir_spelling);
        }
        writeln!(
            self.type_decls,
            "{} = type {{ {} }}",
            backend.ir_spelling,
            field_types.join(", ")
        )?;
        Ok(())
    }

    /// Resolves a parsed `TypeName` (plus a declarator's pointer suffix)
    /// against the type table, producing the canonical `TypeIdx`.
    pub fn resolve_type_name(
        &mut self,
        type_name: &TypeName,
        pointer_level: u32,
    ) -> Result<TypeIdx, CodeGenError> {
        let base = match &type_name.base {
            BaseType::Primitive(kind) => self.types.primitive(*kind),
            BaseType::Struct(name) => self
                .types
                .struct_type(name, None)
                .map_err(|e| CodeGenError::logic(e.to_string(), SourceLocation::unknown()))?,
        };
        let qualified = self.types.qualified(base, type_name.qualifiers);
        self.types
            .pointer(qualified, pointer_level)
            .map_err(|e| CodeGenError::logic(e.to_string(), SourceLocation::unknown()))
    }
}

/// Escapes source identifiers that collide with LLVM reserved words or
/// contain characters `@`/`%` can't spell directly. ToyC identifiers are
/// already valid C identifiers, so in practice this is the identity
/// function — kept as a seam in case a future frontend (name mangling for
/// overloads, decorated symbols) needs to hook in here.
pub(crate) fn mangle_name(name: &str) -> String {
    name.to_string()
}
