//! The type table: a hash-consed registry of every type the compiler knows
//! about.
//!
//! A `TypeIdx` is a compact handle into `TypeTable`; two handles compare
//! equal iff they denote the same normalized type ("structural equality iff
//! index equality"). The table owns a `Vec<TypeNode>` plus a map from a
//! normalized key back to the index, so asking for "pointer to int" twice
//! returns the same `TypeIdx` both times.

use bitflags::bitflags;
use std::collections::HashMap;
use std::fmt;

/// Opaque handle into the type table. `INVALID` is the sentinel for "no
/// type".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIdx(u32);

impl TypeIdx {
    pub const INVALID: TypeIdx = TypeIdx(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != TypeIdx::INVALID
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    Void,
    Bool,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    /// Integer conversion rank used by `common_type`. Floats
    /// are handled separately before rank is ever consulted.
    fn integer_rank(self) -> u8 {
        match self {
            PrimitiveKind::Bool => 0,
            PrimitiveKind::Char => 1,
            PrimitiveKind::Short => 2,
            PrimitiveKind::Int => 3,
            PrimitiveKind::Long => 4,
            PrimitiveKind::Void | PrimitiveKind::Float | PrimitiveKind::Double => {
                unreachable!("integer_rank called on non-integer kind")
            }
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimitiveKind::Float | PrimitiveKind::Double)
    }

    pub fn is_integer(self) -> bool {
        !self.is_float() && !matches!(self, PrimitiveKind::Void)
    }

    /// ABI size in bytes, used by `sizeof` and by struct layout.
    pub fn abi_size(self) -> u64 {
        match self {
            PrimitiveKind::Void => 0,
            PrimitiveKind::Bool | PrimitiveKind::Char => 1,
            PrimitiveKind::Short => 2,
            PrimitiveKind::Int | PrimitiveKind::Float => 4,
            PrimitiveKind::Long | PrimitiveKind::Double => 8,
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveKind::Void => "void",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        };
        write!(f, "{}", s)
    }
}

bitflags! {
    /// Type qualifier bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Qualifiers: u8 {
        const NONE = 0b00;
        const CONST = 0b01;
        const VOLATILE = 0b10;
    }
}

impl fmt::Display for Qualifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Qualifiers::CONST) {
            parts.push("const");
        }
        if self.contains(Qualifiers::VOLATILE) {
            parts.push("volatile");
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Sentinel outer dimension for a variable-length array; the runtime extent
/// is carried by the AST, not the type.
pub const VLA_DIM: i64 = -1;

/// One field of a completed struct type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructMember {
    pub name: String,
    pub ty: TypeIdx,
}

/// Side metadata for a struct beyond its `TypeNode`: an ordered member list
/// plus a name→index map for O(1) member lookups during codegen.
#[derive(Debug, Clone, Default)]
pub struct StructLayout {
    pub members: Vec<StructMember>,
    pub member_index: HashMap<String, usize>,
}

impl StructLayout {
    fn new(members: Vec<StructMember>) -> Self {
        let member_index = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        StructLayout {
            members,
            member_index,
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.member_index.get(name).copied()
    }
}

/// A node in the type table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeNode {
    Primitive(PrimitiveKind),
    /// `level` is the chained-indirection count; `int **` is level 2. Always
    /// >= 1 — a pointer of level 0 does not exist, it is just the pointee
    /// type.
    Pointer { pointee: TypeIdx, level: u32 },
    /// `dims` is non-empty. A fixed array's outermost (and only the
    /// outermost) dimension may be `VLA_DIM` for a variable-length array.
    Array { element: TypeIdx, dims: Vec<i64> },
    /// `None` denotes an opaque/forward-declared struct.
    Struct {
        name: String,
        members: Option<Vec<StructMember>>,
    },
    Qualified { base: TypeIdx, flags: Qualifiers },
}

/// A normalized hash-cons key. Structs key on name alone so that a forward
/// declaration and its later completion share one slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Primitive(PrimitiveKind),
    Pointer(TypeIdx, u32),
    Array(TypeIdx, Vec<i64>),
    Struct(String),
    Qualified(TypeIdx, Qualifiers),
}

#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    #[error("struct '{0}' redefined with different members")]
    StructMemberMismatch(String),
    #[error("array dimension must be positive or the VLA marker, got {0}")]
    InvalidArrayDimension(i64),
    #[error("array type must have at least one dimension")]
    EmptyArrayDimensions,
    #[error("pointer level must be >= 1, got {0}")]
    InvalidPointerLevel(u32),
    #[error("unknown type index {0}")]
    UnknownType(TypeIdx),
}

/// The hash-consed type registry. One instance lives for the duration of a
/// single compilation.
pub struct TypeTable {
    nodes: Vec<TypeNode>,
    index: HashMap<TypeKey, TypeIdx>,
    struct_layouts: HashMap<TypeIdx, StructLayout>,
    primitives: HashMap<PrimitiveKind, TypeIdx>,
    realized: HashMap<TypeIdx, BackendType>,
}

/// The lazily-materialized backend type produced by `realize`. We are our own backend (textual LLVM IR, see `backend.rs`), so
/// this is simply the textual type spelling plus its ABI size — there is no
/// separate FFI handle to cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendType {
    pub ir_spelling: String,
    pub abi_size: u64,
    pub abi_align: u64,
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = TypeTable {
            nodes: Vec::new(),
            index: HashMap::new(),
            struct_layouts: HashMap::new(),
            primitives: HashMap::new(),
            realized: HashMap::new(),
        };
        // Pre-intern the eight primitive kinds at construction so a
        // `TypeIdx` for `int` is stable for the whole compilation, mirroring
        // how the type table is meant to be a singleton per unique type.
        for kind in [
            PrimitiveKind::Void,
            PrimitiveKind::Bool,
            PrimitiveKind::Char,
            PrimitiveKind::Short,
            PrimitiveKind::Int,
            PrimitiveKind::Long,
            PrimitiveKind::Float,
            PrimitiveKind::Double,
        ] {
            let idx = table.intern(TypeKey::Primitive(kind), TypeNode::Primitive(kind));
            table.primitives.insert(kind, idx);
        }
        table
    }

    fn intern(&mut self, key: TypeKey, node: TypeNode) -> TypeIdx {
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = TypeIdx(self.nodes.len() as u32);
        self.nodes.push(node);
        self.index.insert(key, idx);
        idx
    }

    pub fn node(&self, idx: TypeIdx) -> &TypeNode {
        &self.nodes[idx.index()]
    }

    pub fn primitive(&mut self, kind: PrimitiveKind) -> TypeIdx {
        self.primitives[&kind]
    }

    /// Pointer level zero is simply `pointee`; this
    /// never constructs a `Pointer` node for `level == 0`.
    pub fn pointer(&mut self, pointee: TypeIdx, level: u32) -> Result<TypeIdx, TypeError> {
        if level == 0 {
            return Ok(pointee);
        }
        // "pointer to (pointer to T, level k), level 1" canonicalizes to
        // "pointer to T, level k+1".
        let (base, total_level) = match self.node(pointee).clone() {
            TypeNode::Pointer {
                pointee: inner,
                level: inner_level,
            } => (inner, inner_level + level),
            _ => (pointee, level),
        };
        Ok(self.intern(
            TypeKey::Pointer(base, total_level),
            TypeNode::Pointer {
                pointee: base,
                level: total_level,
            },
        ))
    }

    /// A zero-dimension array is malformed and rejected. Chains a multi-dimensional fixed array into nested element
    /// types so that the element of `T[d1][d2]` is `T[d2]`.
    pub fn array(&mut self, element: TypeIdx, dims: &[i64]) -> Result<TypeIdx, TypeError> {
        if dims.is_empty() {
            return Err(TypeError::EmptyArrayDimensions);
        }
        for (i, &d) in dims.iter().enumerate() {
            let is_outermost = i == 0;
            if d == VLA_DIM {
                if !is_outermost {
                    return Err(TypeError::InvalidArrayDimension(d));
                }
            } else if d <= 0 {
                return Err(TypeError::InvalidArrayDimension(d));
            }
        }
        self.array_chain(element, dims)
    }

    fn array_chain(&mut self, element: TypeIdx, dims: &[i64]) -> Result<TypeIdx, TypeError> {
        if dims.len() == 1 {
            return Ok(self.intern(
                TypeKey::Array(element, vec![dims[0]]),
                TypeNode::Array {
                    element,
                    dims: vec![dims[0]],
                },
            ));
        }
        let inner = self.array_chain(element, &dims[1..])?;
        Ok(self.intern(
            TypeKey::Array(inner, vec![dims[0]]),
            TypeNode::Array {
                element: inner,
                dims: vec![dims[0]],
            },
        ))
    }

    /// First call with `members = None` creates an opaque/forward-declared
    /// entry. A later call with `Some(members)` completes that same index
    ///. A second completion with different
    /// members is a fatal error.
    pub fn struct_type(
        &mut self,
        name: &str,
        members: Option<Vec<StructMember>>,
    ) -> Result<TypeIdx, TypeError> {
        let key = TypeKey::Struct(name.to_string());
        if let Some(&idx) = self.index.get(&key) {
            if let Some(new_members) = members {
                let existing = match self.node(idx).clone() {
                    TypeNode::Struct { members, .. } => members,
                    _ => unreachable!("struct key mapped to non-struct node"),
                };
                match existing {
                    None => {
                        self.nodes[idx.index()] = TypeNode::Struct {
                            name: name.to_string(),
                            members: Some(new_members.clone()),
                        };
                        self.struct_layouts
                            .insert(idx, StructLayout::new(new_members));
                        // Invalidate any cached opaque backend type so
                        // `realize` fills in the body on next call.
                        self.realized.remove(&idx);
                    }
                    Some(existing_members) if existing_members == new_members => {}
                    Some(_) => return Err(TypeError::StructMemberMismatch(name.to_string())),
                }
            }
            return Ok(idx);
        }
        let idx = self.intern(
            key,
            TypeNode::Struct {
                name: name.to_string(),
                members: members.clone(),
            },
        );
        if let Some(members) = members {
            self.struct_layouts.insert(idx, StructLayout::new(members));
        }
        Ok(idx)
    }

    pub fn struct_layout(&self, idx: TypeIdx) -> Option<&StructLayout> {
        self.struct_layouts.get(&idx)
    }

    pub fn is_struct_complete(&self, idx: TypeIdx) -> bool {
        matches!(
            self.node(idx),
            TypeNode::Struct { members: Some(_), .. }
        )
    }

    /// `qualified(T, NONE)` returns `T` unchanged — a `Qualified` node with
    /// no flags is never stored.
    pub fn qualified(&mut self, base: TypeIdx, flags: Qualifiers) -> TypeIdx {
        if flags.is_empty() {
            return base;
        }
        // Folding `qualified(qualified(T, a), b)` into a single node with
        // `a | b` keeps qualifiers one level deep.
        let (inner_base, merged) = match self.node(base) {
            TypeNode::Qualified {
                base: inner,
                flags: existing,
            } => (*inner, *existing | flags),
            _ => (base, flags),
        };
        self.intern(
            TypeKey::Qualified(inner_base, merged),
            TypeNode::Qualified {
                base: inner_base,
                flags: merged,
            },
        )
    }

    /// Strips a `Qualified` wrapper if present.
    pub fn unqualify(&self, idx: TypeIdx) -> TypeIdx {
        match self.node(idx) {
            TypeNode::Qualified { base, .. } => *base,
            _ => idx,
        }
    }

    pub fn is_const(&self, idx: TypeIdx) -> bool {
        matches!(self.node(idx), TypeNode::Qualified { flags, .. } if flags.contains(Qualifiers::CONST))
    }

    pub fn is_volatile(&self, idx: TypeIdx) -> bool {
        matches!(self.node(idx), TypeNode::Qualified { flags, .. } if flags.contains(Qualifiers::VOLATILE))
    }

    fn primitive_kind(&self, idx: TypeIdx) -> Option<PrimitiveKind> {
        match self.node(self.unqualify(idx)) {
            TypeNode::Primitive(k) => Some(*k),
            _ => None,
        }
    }

    pub fn is_pointer(&self, idx: TypeIdx) -> bool {
        matches!(self.node(self.unqualify(idx)), TypeNode::Pointer { .. })
    }

    pub fn is_arithmetic(&self, idx: TypeIdx) -> bool {
        self.primitive_kind(idx)
            .is_some_and(|k| k != PrimitiveKind::Void)
    }

    pub fn is_float(&self, idx: TypeIdx) -> bool {
        self.primitive_kind(idx).is_some_and(PrimitiveKind::is_float)
    }

    /// Usual arithmetic conversion result: equal types return
    /// as-is; between floats, `double` wins over `float`; a float beats any
    /// integer; otherwise the integer of higher rank wins
    /// (`long > int > short > char > bool`).
    pub fn common_type(&self, a: TypeIdx, b: TypeIdx) -> TypeIdx {
        let ua = self.unqualify(a);
        let ub = self.unqualify(b);
        if ua == ub {
            return ua;
        }
        let ka = self.primitive_kind(ua);
        let kb = self.primitive_kind(ub);
        match (ka, kb) {
            (Some(ka), Some(kb)) => {
                if ka.is_float() && kb.is_float() {
                    if ka == PrimitiveKind::Double || kb == PrimitiveKind::Double {
                        self.primitives[&PrimitiveKind::Double]
                    } else {
                        ua
                    }
                } else if ka.is_float() {
                    ua
                } else if kb.is_float() {
                    ub
                } else if ka.integer_rank() >= kb.integer_rank() {
                    ua
                } else {
                    ub
                }
            }
            // Pointers and other non-primitive operands: prefer whichever
            // side is the pointer (pointer arithmetic callers resolve this
            // themselves; this fallback only matters for ambiguous casts).
            _ => ua,
        }
    }

    /// Produces (and caches) the backend type for `idx`. For a struct this
    /// lazily creates an opaque body on first reference and fills it in
    /// once all members are known. `realize` is
    /// deterministic: calling it twice returns an identical `BackendType`
    ///, though for an opaque struct later
    /// completed the *contents* legitimately change between calls.
    pub fn realize(&mut self, idx: TypeIdx) -> Result<BackendType, TypeError> {
        if idx.index() >= self.nodes.len() {
            return Err(TypeError::UnknownType(idx));
        }
        let node = self.nodes[idx.index()].clone();
        let backend = match node {
            TypeNode::Primitive(kind) => BackendType {
                ir_spelling: primitive_ir_spelling(kind).to_string(),
                abi_size: kind.abi_size(),
                abi_align: kind.abi_size().max(1),
            },
            TypeNode::Pointer { .. } => BackendType {
                ir_spelling: "ptr".to_string(),
                abi_size: 8,
                abi_align: 8,
            },
            TypeNode::Array { element, ref dims } => {
                let elem_backend = self.realize(element)?;
                let outer = dims[0];
                let count = if outer == VLA_DIM { 0 } else { outer as u64 };
                BackendType {
                    ir_spelling: format!("[{} x {}]", count, elem_backend.ir_spelling),
                    abi_size: elem_backend.abi_size * count,
                    abi_align: elem_backend.abi_align,
                }
            }
            TypeNode::Struct { ref name, members } => {
                let spelling = format!("%struct.{}", mangle_struct_name(name));
                match members {
                    None => BackendType {
                        ir_spelling: spelling,
                        abi_size: 0,
                        abi_align: 1,
                    },
                    Some(ref members) => {
                        let mut offset = 0u64;
                        let mut align = 1u64;
                        for m in members {
                            let mb = self.realize(m.ty)?;
                            align = align.max(mb.abi_align);
                            offset = offset.next_multiple_of(mb.abi_align);
                            offset += mb.abi_size;
                        }
                        let size = offset.next_multiple_of(align);
                        BackendType {
                            ir_spelling: spelling,
                            abi_size: size,
                            abi_align: align,
                        }
                    }
                }
            }
            TypeNode::Qualified { base, .. } => self.realize(base)?,
        };
        self.realized.insert(idx, backend.clone());
        Ok(backend)
    }

    pub fn abi_size(&mut self, idx: TypeIdx) -> Result<u64, TypeError> {
        Ok(self.realize(idx)?.abi_size)
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        TypeTable::new()
    }
}

fn primitive_ir_spelling(kind: PrimitiveKind) -> &'static str {
    match kind {
        PrimitiveKind::Void => "void",
        PrimitiveKind::Bool => "i1",
        PrimitiveKind::Char => "i8",
        PrimitiveKind::Short => "i16",
        PrimitiveKind::Int => "i32",
        PrimitiveKind::Long => "i64",
        PrimitiveKind::Float => "float",
        PrimitiveKind::Double => "double",
    }
}

fn mangle_struct_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_is_hash_consed() {
        let mut table = TypeTable::new();
        let a = table.primitive(PrimitiveKind::Int);
        let b = table.primitive(PrimitiveKind::Int);
        assert_eq!(a, b);
    }

    #[test]
    fn pointer_levels_collapse() {
        let mut table = TypeTable::new();
        let int = table.primitive(PrimitiveKind::Int);
        let p1 = table.pointer(int, 1).unwrap();
        let pp_direct = table.pointer(int, 2).unwrap();
        let pp_chained = table.pointer(p1, 1).unwrap();
        assert_eq!(pp_direct, pp_chained);
    }

    #[test]
    fn pointer_level_zero_is_pointee() {
        let mut table = TypeTable::new();
        let int = table.primitive(PrimitiveKind::Int);
        assert_eq!(table.pointer(int, 0).unwrap(), int);
    }

    #[test]
    fn qualify_none_returns_base() {
        let mut table = TypeTable::new();
        let int = table.primitive(PrimitiveKind::Int);
        assert_eq!(table.qualified(int, Qualifiers::NONE), int);
    }

    #[test]
    fn unqualify_round_trips() {
        let mut table = TypeTable::new();
        let int = table.primitive(PrimitiveKind::Int);
        let qualified = table.qualified(int, Qualifiers::CONST);
        assert_eq!(table.unqualify(qualified), int);
        assert_ne!(qualified, int);
    }

    #[test]
    fn struct_forward_declaration_keeps_index() {
        let mut table = TypeTable::new();
        let opaque = table.struct_type("N", None).unwrap();
        let int = table.primitive(PrimitiveKind::Int);
        let ptr_to_n = table.pointer(opaque, 1).unwrap();
        let completed = table
            .struct_type(
                "N",
                Some(vec![
                    StructMember {
                        name: "v".into(),
                        ty: int,
                    },
                    StructMember {
                        name: "next".into(),
                        ty: ptr_to_n,
                    },
                ]),
            )
            .unwrap();
        assert_eq!(opaque, completed);
        assert!(table.is_struct_complete(completed));
    }

    #[test]
    fn struct_member_mismatch_is_error() {
        let mut table = TypeTable::new();
        let int = table.primitive(PrimitiveKind::Int);
        let float = table.primitive(PrimitiveKind::Float);
        table
            .struct_type(
                "S",
                Some(vec![StructMember {
                    name: "a".into(),
                    ty: int,
                }]),
            )
            .unwrap();
        let result = table.struct_type(
            "S",
            Some(vec![StructMember {
                name: "a".into(),
                ty: float,
            }]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn zero_dimension_array_is_rejected() {
        let mut table = TypeTable::new();
        let int = table.primitive(PrimitiveKind::Int);
        assert!(table.array(int, &[]).is_err());
    }

    #[test]
    fn multi_dim_array_chains_element_types() {
        let mut table = TypeTable::new();
        let int = table.primitive(PrimitiveKind::Int);
        let arr = table.array(int, &[2, 3]).unwrap();
        match table.node(arr).clone() {
            TypeNode::Array { element, dims } => {
                assert_eq!(dims, vec![2]);
                match table.node(element) {
                    TypeNode::Array { dims, .. } => assert_eq!(*dims, vec![3]),
                    _ => panic!("expected nested array"),
                }
            }
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn common_type_prefers_double_then_rank() {
        let mut table = TypeTable::new();
        let int = table.primitive(PrimitiveKind::Int);
        let long = table.primitive(PrimitiveKind::Long);
        let float = table.primitive(PrimitiveKind::Float);
        let double = table.primitive(PrimitiveKind::Double);
        assert_eq!(table.common_type(int, long), long);
        assert_eq!(table.common_type(float, double), double);
        assert_eq!(table.common_type(int, float), float);
    }

    #[test]
    fn realize_is_deterministic() {
        let mut table = TypeTable::new();
        let int = table.primitive(PrimitiveKind::Int);
        let a = table.realize(int).unwrap();
        let b = table.realize(int).unwrap();
        assert_eq!(a, b);
    }
}
