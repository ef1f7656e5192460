//! Hash-consing invariants for the type table exercised from outside the
//! crate — the colocated unit tests in
//! `src/types.rs` cover the rest; these confirm the invariants still hold
//! through the crate's public surface.

use toyc::types::{PrimitiveKind, Qualifiers, TypeNode, TypeTable, VLA_DIM};

#[test]
fn pointer_to_int_is_the_same_index_every_time() {
    let mut table = TypeTable::new();
    let int = table.primitive(PrimitiveKind::Int);
    let a = table.pointer(int, 1).unwrap();
    let b = table.pointer(int, 1).unwrap();
    assert_eq!(a, b);
}

#[test]
fn qualified_with_no_flags_is_identity() {
    let mut table = TypeTable::new();
    let int = table.primitive(PrimitiveKind::Int);
    assert_eq!(table.qualified(int, Qualifiers::NONE), int);
}

#[test]
fn zero_dimension_array_is_malformed() {
    let mut table = TypeTable::new();
    let int = table.primitive(PrimitiveKind::Int);
    assert!(table.array(int, &[]).is_err());
}

#[test]
fn vla_marker_only_valid_as_outermost_dimension() {
    let mut table = TypeTable::new();
    let int = table.primitive(PrimitiveKind::Int);
    assert!(table.array(int, &[VLA_DIM, 4]).is_ok());
    assert!(table.array(int, &[4, VLA_DIM]).is_err());
}

#[test]
fn forward_declared_struct_completes_in_place_and_keeps_its_index() {
    let mut table = TypeTable::new();
    let opaque = table.struct_type("Node", None).unwrap();
    let int = table.primitive(PrimitiveKind::Int);
    let self_ptr = table.pointer(opaque, 1).unwrap();
    assert!(!table.is_struct_complete(opaque));

    let completed = table
        .struct_type(
            "Node",
            Some(vec![
                toyc::types::StructMember {
                    name: "value".to_string(),
                    ty: int,
                },
                toyc::types::StructMember {
                    name: "next".to_string(),
                    ty: self_ptr,
                },
            ]),
        )
        .unwrap();

    assert_eq!(opaque, completed);
    assert!(table.is_struct_complete(completed));
    assert!(matches!(table.node(completed), TypeNode::Struct { members: Some(_), .. }));
}

#[test]
fn realize_is_stable_across_calls() {
    let mut table = TypeTable::new();
    let double = table.primitive(PrimitiveKind::Double);
    let first = table.realize(double).unwrap();
    let second = table.realize(double).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.ir_spelling, "double");
}
