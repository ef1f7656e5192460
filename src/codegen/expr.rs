//! Expression lowering.
//!
//! Every lowering function takes `&mut CodeGenContext` plus an `&Expr` and
//! returns a `Value` (an SSA register or literal, paired with its type). The
//! handful of expressions that are also valid l-values (identifiers,
//! `*p`, `a[i]`, `a.m`/`a->m`) additionally expose an `lvalue` variant that
//! returns a `Place` instead of loading through it.

use crate::ast::{BinOp, Expr, LogicalOp, UnOp};
use crate::codegen::{CodeGenContext, CodeGenError, FunctionSig, Place, Value};
use crate::diagnostics::SourceLocation;
use crate::types::PrimitiveKind;

/// Lowers `expr` as an r-value, producing a `Value`.
pub(crate) fn lower_expr(ctx: &mut CodeGenContext, expr: &Expr) -> Result<Value, CodeGenError> {
    match expr {
        Expr::Integer { value, .. } => {
            let ty = ctx.types.primitive(PrimitiveKind::Int);
            Ok(Value::new(value.to_string(), ty))
        }
        Expr::Float { value, .. } => {
            let ty = ctx.types.primitive(PrimitiveKind::Double);
            Ok(Value::new(format_double_constant(*value), ty))
        }
        Expr::StringLiteral { value, .. } => lower_string_literal(ctx, value),
        Expr::Identifier { name, loc } => {
            let place = lvalue(ctx, expr)?;
            load_function_or_place(ctx, name, place, loc)
        }
        Expr::Binary { op, lhs, rhs, loc } => lower_binary(ctx, *op, lhs, rhs, loc),
        Expr::Unary { op, operand, loc } => lower_unary(ctx, *op, operand, loc),
        Expr::Logical { op, lhs, rhs, loc } => lower_logical(ctx, *op, lhs, rhs, loc),
        Expr::Conditional {
            cond,
            then_expr,
            else_expr,
            loc,
        } => lower_conditional(ctx, cond, then_expr, else_expr, loc),
        Expr::Assignment { target, value, loc } => lower_assignment(ctx, target, value, loc),
        Expr::CompoundAssignment {
            op,
            target,
            value,
            loc,
        } => lower_compound_assignment(ctx, *op, target, value, loc),
        Expr::Comma { lhs, rhs, .. } => {
            lower_expr(ctx, lhs)?;
            lower_expr(ctx, rhs)
        }
        Expr::FunctionCall { callee, args, loc } => lower_call(ctx, callee, args, loc),
        Expr::MemberAccess { .. } | Expr::ArraySubscript { .. } => {
            let place = lvalue(ctx, expr)?;
            load_place(ctx, place)
        }
        Expr::Cast {
            type_name,
            pointer_level,
            expr: inner,
            loc,
        } => {
            let target_ty = ctx.resolve_type_name(type_name, *pointer_level)?;
            let value = lower_expr(ctx, inner)?;
            cast_value(ctx, value, target_ty, loc)
        }
        Expr::SizeofType {
            type_name,
            pointer_level,
            loc,
        } => {
            let ty = ctx.resolve_type_name(type_name, *pointer_level)?;
            let size = ctx
                .types
                .abi_size(ty)
                .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
            let result_ty = ctx.types.primitive(PrimitiveKind::Long);
            Ok(Value::new(size.to_string(), result_ty))
        }
        Expr::SizeofExpr { expr: inner, loc } => {
            let ty = static_type_of(ctx, inner, loc)?;
            let size = ctx
                .types
                .abi_size(ty)
                .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
            let result_ty = ctx.types.primitive(PrimitiveKind::Long);
            Ok(Value::new(size.to_string(), result_ty))
        }
        Expr::InitializerList { loc, .. } => Err(CodeGenError::logic(
            "initializer list is only valid as a declaration initializer",
            loc.clone(),
        )),
    }
}

/// Determines an expression's static type without evaluating it, as
/// required by `sizeof expr`. We don't maintain a separate
/// type-checking pass, so this reuses the same recursive descent as
/// `lower_expr`/`lvalue` would, but on a scratch context copy would be
/// wasteful; instead we walk the AST computing types only, never emitting
/// instructions: `sizeof(x++)` must not actually increment `x`.
fn static_type_of(
    ctx: &mut CodeGenContext,
    expr: &Expr,
    loc: &SourceLocation,
) -> Result<crate::types::TypeIdx, CodeGenError> {
    Ok(match expr {
        Expr::Integer { .. } => ctx.types.primitive(PrimitiveKind::Int),
        Expr::Float { .. } => ctx.types.primitive(PrimitiveKind::Double),
        Expr::StringLiteral { .. } => {
            let char_ty = ctx.types.primitive(PrimitiveKind::Char);
            ctx.types
                .pointer(char_ty, 1)
                .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?
        }
        Expr::Identifier { name, loc } => {
            if let Some(binding) = ctx.scopes.lookup(name) {
                binding.ty
            } else if let Some(sig) = ctx.functions.get(name) {
                sig.return_ty
            } else {
                return Err(CodeGenError::logic(
                    format!("use of undeclared identifier '{}'", name),
                    loc.clone(),
                ));
            }
        }
        Expr::Binary { lhs, rhs, loc, .. } => {
            let lt = static_type_of(ctx, lhs, loc)?;
            let rt = static_type_of(ctx, rhs, loc)?;
            ctx.types.common_type(lt, rt)
        }
        Expr::Unary { op, operand, loc } => match op {
            UnOp::AddrOf => {
                let inner = static_type_of(ctx, operand, loc)?;
                ctx.types
                    .pointer(inner, 1)
                    .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?
            }
            UnOp::Deref => {
                let inner = static_type_of(ctx, operand, loc)?;
                pointee_of(ctx, inner, loc)?
            }
            _ => static_type_of(ctx, operand, loc)?,
        },
        Expr::Conditional {
            then_expr, loc, ..
        } => static_type_of(ctx, then_expr, loc)?,
        Expr::Logical { .. } => ctx.types.primitive(PrimitiveKind::Bool),
        Expr::Assignment { target, loc, .. } => static_type_of(ctx, target, loc)?,
        Expr::CompoundAssignment { target, loc, .. } => static_type_of(ctx, target, loc)?,
        Expr::Comma { rhs, loc, .. } => static_type_of(ctx, rhs, loc)?,
        Expr::FunctionCall { callee, loc, .. } => {
            ctx.functions
                .get(callee)
                .map(|sig| sig.return_ty)
                .ok_or_else(|| {
                    CodeGenError::logic(format!("call to undeclared function '{}'", callee), loc.clone())
                })?
        }
        Expr::MemberAccess {
            base, member, loc, ..
        } => {
            let base_ty = static_type_of(ctx, base, loc)?;
            let struct_ty = ctx.types.unqualify(base_ty);
            let struct_ty = if ctx.types.is_pointer(struct_ty) {
                pointee_of(ctx, struct_ty, loc)?
            } else {
                struct_ty
            };
            let layout = ctx.types.struct_layout(struct_ty).ok_or_else(|| {
                CodeGenError::logic("member access on non-struct type", loc.clone())
            })?;
            let idx = layout.index_of(member).ok_or_else(|| {
                CodeGenError::logic(format!("no member named '{}'", member), loc.clone())
            })?;
            layout.members[idx].ty
        }
        Expr::ArraySubscript { base, loc, .. } => {
            let base_ty = static_type_of(ctx, base, loc)?;
            element_type_of(ctx, base_ty, loc)?
        }
        Expr::Cast {
            type_name,
            pointer_level,
            ..
        } => ctx.resolve_type_name(type_name, *pointer_level)?,
        Expr::SizeofType { .. } | Expr::SizeofExpr { .. } => {
            ctx.types.primitive(PrimitiveKind::Long)
        }
        Expr::InitializerList { loc, .. } => {
            return Err(CodeGenError::logic(
                "initializer list has no standalone type",
                loc.clone(),
            ))
        }
    })
}

/// The type one dereference strips off a pointer: `int**` (stored as one
/// `Pointer { pointee: int, level: 2 }` node) dereferences to
/// `int*` (level 1), re-interned through `TypeTable::pointer` rather than
/// assumed to already exist.
fn pointee_of(
    ctx: &mut CodeGenContext,
    ty: crate::types::TypeIdx,
    loc: &SourceLocation,
) -> Result<crate::types::TypeIdx, CodeGenError> {
    match ctx.types.node(ctx.types.unqualify(ty)).clone() {
        crate::types::TypeNode::Pointer { pointee, level } => ctx
            .types
            .pointer(pointee, level - 1)
            .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone())),
        _ => Err(CodeGenError::logic("dereference of non-pointer type", loc.clone())),
    }
}

fn element_type_of(
    ctx: &CodeGenContext,
    ty: crate::types::TypeIdx,
    loc: &SourceLocation,
) -> Result<crate::types::TypeIdx, CodeGenError> {
    let unqual = ctx.types.unqualify(ty);
    match ctx.types.node(unqual) {
        crate::types::TypeNode::Array { element, .. } => Ok(*element),
        crate::types::TypeNode::Pointer { pointee, .. } => Ok(*pointee),
        _ => Err(CodeGenError::logic("subscript of non-array, non-pointer type", loc.clone())),
    }
}

/// Lowers `expr` as an l-value, producing the address it denotes plus the
/// type stored there.
pub(crate) fn lvalue(ctx: &mut CodeGenContext, expr: &Expr) -> Result<Place, CodeGenError> {
    match expr {
        Expr::Identifier { name, loc } => {
            let binding = ctx.scopes.lookup(name).cloned().ok_or_else(|| {
                CodeGenError::logic(format!("use of undeclared identifier '{}'", name), loc.clone())
            })?;
            // A global variable's slot is its mangled `@name`, already
            // carrying its sigil; a local's slot is a bare register name
            // that still needs `%` prepended.
            let ptr = if binding.slot.starts_with('@') {
                binding.slot
            } else {
                format!("%{}", binding.slot)
            };
            Ok(Place {
                ptr,
                ty: binding.ty,
            })
        }
        Expr::Unary {
            op: UnOp::Deref,
            operand,
            loc,
        } => {
            let ptr_value = lower_expr(ctx, operand)?;
            let pointee = pointee_of(ctx, ptr_value.ty, loc)?;
            Ok(Place {
                ptr: ptr_value.repr,
                ty: pointee,
            })
        }
        Expr::ArraySubscript { base, index, loc } => lower_array_subscript_place(ctx, base, index, loc),
        Expr::MemberAccess {
            base,
            member,
            arrow,
            loc,
        } => lower_member_place(ctx, base, member, *arrow, loc),
        other => Err(CodeGenError::logic(
            "expression is not assignable",
            other.loc().clone(),
        )),
    }
}

fn load_place(ctx: &mut CodeGenContext, place: Place) -> Result<Value, CodeGenError> {
    let backend = ctx
        .types
        .realize(place.ty)
        .map_err(|e| CodeGenError::logic(e.to_string(), SourceLocation::unknown()))?;
    ctx.ensure_struct_declared(place.ty)?;
    let temp = ctx.fresh_temp();
    ctx.emit(format!(
        "%{} = load {}, ptr {}",
        temp, backend.ir_spelling, place.ptr
    ))?;
    Ok(Value::new(format!("%{}", temp), place.ty))
}

/// An identifier can denote either a variable (load through its slot) or a
/// function (not a first-class value in ToyC, but we surface it as its
/// mangled global name so `&f`-style expressions at least don't crash).
fn load_function_or_place(
    ctx: &mut CodeGenContext,
    name: &str,
    place_or_fn: Place,
    loc: &SourceLocation,
) -> Result<Value, CodeGenError> {
    if ctx.scopes.lookup(name).is_some() {
        load_place(ctx, place_or_fn)
    } else if let Some(sig) = ctx.functions.get(name) {
        Ok(Value::new(format!("@{}", name), sig.return_ty))
    } else {
        Err(CodeGenError::logic(
            format!("use of undeclared identifier '{}'", name),
            loc.clone(),
        ))
    }
}

fn lower_array_subscript_place(
    ctx: &mut CodeGenContext,
    base: &Expr,
    index: &Expr,
    loc: &SourceLocation,
) -> Result<Place, CodeGenError> {
    let index_value = lower_expr(ctx, index)?;
    // `a[i]` on an array lvalue indexes in place (first GEP index 0, second
    // i); on a pointer r-value it indexes through the pointer directly
    //").
    if let Ok(array_place) = lvalue(ctx, base) {
        let unqual = ctx.types.unqualify(array_place.ty);
        if let crate::types::TypeNode::Array { element, .. } = ctx.types.node(unqual).clone() {
            ctx.ensure_struct_declared(array_place.ty)?;
            let array_backend = ctx
                .types
                .realize(array_place.ty)
                .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
            let temp = ctx.fresh_temp();
            ctx.emit(format!(
                "%{} = getelementptr {}, ptr {}, i64 0, i64 {}",
                temp, array_backend.ir_spelling, array_place.ptr, index_value.repr
            ))?;
            return Ok(Place {
                ptr: format!("%{}", temp),
                ty: element,
            });
        }
    }
    let base_value = lower_expr(ctx, base)?;
    let element = element_type_of(ctx, base_value.ty, loc)?;
    ctx.ensure_struct_declared(element)?;
    let elem_backend = ctx
        .types
        .realize(element)
        .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
    let temp = ctx.fresh_temp();
    ctx.emit(format!(
        "%{} = getelementptr {}, ptr {}, i64 {}",
        temp, elem_backend.ir_spelling, base_value.repr, index_value.repr
    ))?;
    Ok(Place {
        ptr: format!("%{}", temp),
        ty: element,
    })
}

fn lower_member_place(
    ctx: &mut CodeGenContext,
    base: &Expr,
    member: &str,
    arrow: bool,
    loc: &SourceLocation,
) -> Result<Place, CodeGenError> {
    let struct_place = if arrow {
        let ptr_value = lower_expr(ctx, base)?;
        let pointee = pointee_of(ctx, ptr_value.ty, loc)?;
        Place {
            ptr: ptr_value.repr,
            ty: pointee,
        }
    } else {
        lvalue(ctx, base)?
    };
    let struct_ty = ctx.types.unqualify(struct_place.ty);
    let layout = ctx
        .types
        .struct_layout(struct_ty)
        .ok_or_else(|| CodeGenError::logic("member access on non-struct type", loc.clone()))?
        .clone();
    let idx = layout
        .index_of(member)
        .ok_or_else(|| CodeGenError::logic(format!("no member named '{}'", member), loc.clone()))?;
    let member_ty = layout.members[idx].ty;
    ctx.ensure_struct_declared(struct_ty)?;
    let struct_backend = ctx
        .types
        .realize(struct_ty)
        .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
    let temp = ctx.fresh_temp();
    ctx.emit(format!(
        "%{} = getelementptr {}, ptr {}, i32 0, i32 {}",
        temp, struct_backend.ir_spelling, struct_place.ptr, idx
    ))?;
    Ok(Place {
        ptr: format!("%{}", temp),
        ty: member_ty,
    })
}

fn lower_string_literal(ctx: &mut CodeGenContext, text: &str) -> Result<Value, CodeGenError> {
    let name = ctx.fresh_string_constant(text);
    let char_ty = ctx.types.primitive(PrimitiveKind::Char);
    let ptr_ty = ctx
        .types
        .pointer(char_ty, 1)
        .map_err(|e| CodeGenError::logic(e.to_string(), SourceLocation::unknown()))?;
    Ok(Value::new(name, ptr_ty))
}

fn lower_binary(
    ctx: &mut CodeGenContext,
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    loc: &SourceLocation,
) -> Result<Value, CodeGenError> {
    let lv = lower_expr(ctx, lhs)?;
    let rv = lower_expr(ctx, rhs)?;

    // Pointer difference and pointer +/- integer are handled before the
    // usual arithmetic conversions, which don't apply to pointers.
    if ctx.types.is_pointer(lv.ty) || ctx.types.is_pointer(rv.ty) {
        return lower_pointer_binary(ctx, op, lv, rv, loc);
    }

    let common = ctx.types.common_type(lv.ty, rv.ty);
    let lv = cast_value(ctx, lv, common, loc)?;
    let rv = cast_value(ctx, rv, common, loc)?;
    let is_float = ctx.types.is_float(common);
    let backend = ctx
        .types
        .realize(common)
        .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;

    let (mnemonic, result_is_bool) = binary_mnemonic(op, is_float);
    let temp = ctx.fresh_temp();
    ctx.emit(format!(
        "%{} = {} {} {}, {}",
        temp, mnemonic, backend.ir_spelling, lv.repr, rv.repr
    ))?;
    let result_ty = if result_is_bool {
        ctx.types.primitive(PrimitiveKind::Bool)
    } else {
        common
    };
    Ok(Value::new(format!("%{}", temp), result_ty))
}

fn binary_mnemonic(op: BinOp, is_float: bool) -> (&'static str, bool) {
    match (op, is_float) {
        (BinOp::Add, false) => ("add nsw", false),
        (BinOp::Add, true) => ("fadd", false),
        (BinOp::Sub, false) => ("sub nsw", false),
        (BinOp::Sub, true) => ("fsub", false),
        (BinOp::Mul, false) => ("mul nsw", false),
        (BinOp::Mul, true) => ("fmul", false),
        (BinOp::Div, false) => ("sdiv", false),
        (BinOp::Div, true) => ("fdiv", false),
        (BinOp::Mod, false) => ("srem", false),
        (BinOp::Mod, true) => ("frem", false),
        (BinOp::BitAnd, _) => ("and", false),
        (BinOp::BitOr, _) => ("or", false),
        (BinOp::BitXor, _) => ("xor", false),
        (BinOp::Shl, _) => ("shl", false),
        (BinOp::Shr, _) => ("ashr", false),
        (BinOp::Eq, false) => ("icmp eq", true),
        (BinOp::Eq, true) => ("fcmp oeq", true),
        (BinOp::Ne, false) => ("icmp ne", true),
        (BinOp::Ne, true) => ("fcmp one", true),
        (BinOp::Lt, false) => ("icmp slt", true),
        (BinOp::Lt, true) => ("fcmp olt", true),
        (BinOp::Gt, false) => ("icmp sgt", true),
        (BinOp::Gt, true) => ("fcmp ogt", true),
        (BinOp::Le, false) => ("icmp sle", true),
        (BinOp::Le, true) => ("fcmp ole", true),
        (BinOp::Ge, false) => ("icmp sge", true),
        (BinOp::Ge, true) => ("fcmp oge", true),
    }
}

fn lower_pointer_binary(
    ctx: &mut CodeGenContext,
    op: BinOp,
    lv: Value,
    rv: Value,
    loc: &SourceLocation,
) -> Result<Value, CodeGenError> {
    let lv_is_ptr = ctx.types.is_pointer(lv.ty);
    let rv_is_ptr = ctx.types.is_pointer(rv.ty);

    match op {
        BinOp::Sub if lv_is_ptr && rv_is_ptr => {
            let elem = pointee_of(ctx, lv.ty, loc)?;
            ctx.ensure_struct_declared(elem)?;
            let elem_backend = ctx
                .types
                .realize(elem)
                .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
            let lt = ctx.fresh_temp();
            ctx.emit(format!("%{} = ptrtoint ptr {} to i64", lt, lv.repr))?;
            let rt = ctx.fresh_temp();
            ctx.emit(format!("%{} = ptrtoint ptr {} to i64", rt, rv.repr))?;
            let diff = ctx.fresh_temp();
            ctx.emit(format!("%{} = sub nsw i64 %{}, %{}", diff, lt, rt))?;
            let result = ctx.fresh_temp();
            let elem_size = elem_backend.abi_size.max(1);
            ctx.emit(format!(
                "%{} = sdiv i64 %{}, {}",
                result, diff, elem_size
            ))?;
            let long_ty = ctx.types.primitive(PrimitiveKind::Long);
            Ok(Value::new(format!("%{}", result), long_ty))
        }
        BinOp::Add | BinOp::Sub => {
            let (ptr_value, ptr_ty, int_value) = if lv_is_ptr {
                (lv.repr, lv.ty, rv.repr)
            } else {
                (rv.repr, rv.ty, lv.repr)
            };
            let elem = pointee_of(ctx, ptr_ty, loc)?;
            ctx.ensure_struct_declared(elem)?;
            let elem_backend = ctx
                .types
                .realize(elem)
                .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
            let offset = if matches!(op, BinOp::Sub) {
                let negated = ctx.fresh_temp();
                ctx.emit(format!("%{} = sub nsw i64 0, {}", negated, int_value))?;
                format!("%{}", negated)
            } else {
                int_value
            };
            let temp = ctx.fresh_temp();
            ctx.emit(format!(
                "%{} = getelementptr {}, ptr {}, i64 {}",
                temp, elem_backend.ir_spelling, ptr_value, offset
            ))?;
            Ok(Value::new(format!("%{}", temp), ptr_ty))
        }
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let predicate = match op {
                BinOp::Eq => "eq",
                BinOp::Ne => "ne",
                BinOp::Lt => "ult",
                BinOp::Gt => "ugt",
                BinOp::Le => "ule",
                BinOp::Ge => "uge",
                _ => unreachable!(),
            };
            let temp = ctx.fresh_temp();
            ctx.emit(format!(
                "%{} = icmp {} ptr {}, {}",
                temp, predicate, lv.repr, rv.repr
            ))?;
            let bool_ty = ctx.types.primitive(PrimitiveKind::Bool);
            Ok(Value::new(format!("%{}", temp), bool_ty))
        }
        _ => Err(CodeGenError::logic(
            "operator not valid on pointer operands",
            loc.clone(),
        )),
    }
}

fn lower_unary(
    ctx: &mut CodeGenContext,
    op: UnOp,
    operand: &Expr,
    loc: &SourceLocation,
) -> Result<Value, CodeGenError> {
    match op {
        UnOp::AddrOf => {
            let place = lvalue(ctx, operand)?;
            let ptr_ty = ctx
                .types
                .pointer(place.ty, 1)
                .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
            Ok(Value::new(place.ptr, ptr_ty))
        }
        UnOp::Deref => {
            let ptr_value = lower_expr(ctx, operand)?;
            let pointee = pointee_of(ctx, ptr_value.ty, loc)?;
            load_place(
                ctx,
                Place {
                    ptr: ptr_value.repr,
                    ty: pointee,
                },
            )
        }
        UnOp::Neg => {
            let v = lower_expr(ctx, operand)?;
            let is_float = ctx.types.is_float(v.ty);
            let backend = ctx
                .types
                .realize(v.ty)
                .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
            let temp = ctx.fresh_temp();
            if is_float {
                ctx.emit(format!("%{} = fneg {} {}", temp, backend.ir_spelling, v.repr))?;
            } else {
                ctx.emit(format!(
                    "%{} = sub nsw {} 0, {}",
                    temp, backend.ir_spelling, v.repr
                ))?;
            }
            Ok(Value::new(format!("%{}", temp), v.ty))
        }
        UnOp::BitNot => {
            let v = lower_expr(ctx, operand)?;
            let backend = ctx
                .types
                .realize(v.ty)
                .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
            let temp = ctx.fresh_temp();
            ctx.emit(format!(
                "%{} = xor {} {}, -1",
                temp, backend.ir_spelling, v.repr
            ))?;
            Ok(Value::new(format!("%{}", temp), v.ty))
        }
        UnOp::Not => {
            let v = lower_expr(ctx, operand)?;
            let bool_value = coerce_to_bool(ctx, v, loc)?;
            let temp = ctx.fresh_temp();
            ctx.emit(format!("%{} = xor i1 {}, true", temp, bool_value.repr))?;
            Ok(Value::new(format!("%{}", temp), bool_value.ty))
        }
        UnOp::PreIncDec { is_increment } => {
            let place = lvalue(ctx, operand)?;
            let current = load_place(ctx, place.clone())?;
            let updated = step_value(ctx, current, is_increment, loc)?;
            store_place(ctx, &place, &updated)?;
            Ok(updated)
        }
        UnOp::PostIncDec { is_increment } => {
            let place = lvalue(ctx, operand)?;
            let current = load_place(ctx, place.clone())?;
            let updated = step_value(ctx, current.clone(), is_increment, loc)?;
            store_place(ctx, &place, &updated)?;
            Ok(current)
        }
    }
}

fn step_value(
    ctx: &mut CodeGenContext,
    value: Value,
    is_increment: bool,
    loc: &SourceLocation,
) -> Result<Value, CodeGenError> {
    if ctx.types.is_pointer(value.ty) {
        let one = Value::new("1", ctx.types.primitive(PrimitiveKind::Long));
        let op = if is_increment { BinOp::Add } else { BinOp::Sub };
        return lower_pointer_binary(ctx, op, value, one, loc);
    }
    let one = if ctx.types.is_float(value.ty) {
        Value::new("1.0", value.ty)
    } else {
        Value::new("1", value.ty)
    };
    let op = if is_increment { BinOp::Add } else { BinOp::Sub };
    let is_float = ctx.types.is_float(value.ty);
    let backend = ctx
        .types
        .realize(value.ty)
        .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
    let (mnemonic, _) = binary_mnemonic(op, is_float);
    let temp = ctx.fresh_temp();
    ctx.emit(format!(
        "%{} = {} {} {}, {}",
        temp, mnemonic, backend.ir_spelling, value.repr, one.repr
    ))?;
    Ok(Value::new(format!("%{}", temp), value.ty))
}

pub(crate) fn store_place(
    ctx: &mut CodeGenContext,
    place: &Place,
    value: &Value,
) -> Result<(), CodeGenError> {
    let casted = cast_value(ctx, value.clone(), place.ty, &SourceLocation::unknown())?;
    ctx.ensure_struct_declared(place.ty)?;
    let backend = ctx
        .types
        .realize(place.ty)
        .map_err(|e| CodeGenError::logic(e.to_string(), SourceLocation::unknown()))?;
    ctx.emit(format!(
        "store {} {}, ptr {}",
        backend.ir_spelling, casted.repr, place.ptr
    ))?;
    Ok(())
}

fn lower_logical(
    ctx: &mut CodeGenContext,
    op: LogicalOp,
    lhs: &Expr,
    rhs: &Expr,
    loc: &SourceLocation,
) -> Result<Value, CodeGenError> {
    let lv = lower_expr(ctx, lhs)?;
    let lb = coerce_to_bool(ctx, lv, loc)?;
    let lhs_block_end = ctx.fresh_block("logical.lhs.end.");
    let rhs_block = ctx.fresh_block("logical.rhs.");
    let join_block = ctx.fresh_block("logical.join.");
    ctx.br(&lhs_block_end)?;
    ctx.start_block(&lhs_block_end)?;
    let (true_target, false_target) = match op {
        LogicalOp::And => (rhs_block.clone(), join_block.clone()),
        LogicalOp::Or => (join_block.clone(), rhs_block.clone()),
    };
    ctx.emit(format!(
        "br i1 {}, label %{}, label %{}",
        lb.repr, true_target, false_target
    ))?;
    ctx.terminated = true;

    ctx.start_block(&rhs_block)?;
    let rv = lower_expr(ctx, rhs)?;
    let rb = coerce_to_bool(ctx, rv, loc)?;
    let rhs_block_end = ctx.fresh_block("logical.rhs.end.");
    ctx.br(&rhs_block_end)?;
    ctx.start_block(&rhs_block_end)?;
    ctx.br(&join_block)?;

    ctx.start_block(&join_block)?;
    let short_circuit_value = match op {
        LogicalOp::And => "false",
        LogicalOp::Or => "true",
    };
    let temp = ctx.fresh_temp();
    ctx.emit(format!(
        "%{} = phi i1 [ {}, %{} ], [ {}, %{} ]",
        temp, short_circuit_value, lhs_block_end, rb.repr, rhs_block_end
    ))?;
    Ok(Value::new(format!("%{}", temp), rb.ty))
}

fn lower_conditional(
    ctx: &mut CodeGenContext,
    cond: &Expr,
    then_expr: &Expr,
    else_expr: &Expr,
    loc: &SourceLocation,
) -> Result<Value, CodeGenError> {
    let cv = lower_expr(ctx, cond)?;
    let cb = coerce_to_bool(ctx, cv, loc)?;
    let then_block = ctx.fresh_block("cond.then.");
    let else_block = ctx.fresh_block("cond.else.");
    let join_block = ctx.fresh_block("cond.join.");
    ctx.emit(format!(
        "br i1 {}, label %{}, label %{}",
        cb.repr, then_block, else_block
    ))?;
    ctx.terminated = true;

    ctx.start_block(&then_block)?;
    let then_value = lower_expr(ctx, then_expr)?;
    let then_block_end = ctx.fresh_block("cond.then.end.");
    ctx.br(&then_block_end)?;
    ctx.start_block(&then_block_end)?;

    ctx.start_block(&else_block)?;
    let else_value = lower_expr(ctx, else_expr)?;
    let else_block_end = ctx.fresh_block("cond.else.end.");

    let common = ctx.types.common_type(then_value.ty, else_value.ty);
    let then_value = cast_value(ctx, then_value, common, loc)?;
    ctx.start_block(&then_block_end)?;
    ctx.br(&join_block)?;

    ctx.start_block(&else_block_end)?;
    let else_value = cast_value(ctx, else_value, common, loc)?;
    ctx.br(&join_block)?;

    ctx.start_block(&join_block)?;
    let backend = ctx
        .types
        .realize(common)
        .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
    let temp = ctx.fresh_temp();
    ctx.emit(format!(
        "%{} = phi {} [ {}, %{} ], [ {}, %{} ]",
        temp, backend.ir_spelling, then_value.repr, then_block_end, else_value.repr, else_block_end
    ))?;
    Ok(Value::new(format!("%{}", temp), common))
}

fn lower_assignment(
    ctx: &mut CodeGenContext,
    target: &Expr,
    value: &Expr,
    _loc: &SourceLocation,
) -> Result<Value, CodeGenError> {
    let place = lvalue(ctx, target)?;
    let rvalue = lower_expr(ctx, value)?;
    let casted = cast_value(ctx, rvalue, place.ty, target.loc())?;
    store_place(ctx, &place, &casted)?;
    Ok(casted)
}

fn lower_compound_assignment(
    ctx: &mut CodeGenContext,
    op: BinOp,
    target: &Expr,
    value: &Expr,
    loc: &SourceLocation,
) -> Result<Value, CodeGenError> {
    let place = lvalue(ctx, target)?;
    let current = load_place(ctx, place.clone())?;
    let rhs = lower_expr(ctx, value)?;
    let combined = if ctx.types.is_pointer(current.ty) {
        lower_pointer_binary(ctx, op, current, rhs, loc)?
    } else {
        let common = ctx.types.common_type(current.ty, rhs.ty);
        let lv = cast_value(ctx, current, common, loc)?;
        let rv = cast_value(ctx, rhs, common, loc)?;
        let is_float = ctx.types.is_float(common);
        let backend = ctx
            .types
            .realize(common)
            .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
        let (mnemonic, _) = binary_mnemonic(op, is_float);
        let temp = ctx.fresh_temp();
        ctx.emit(format!(
            "%{} = {} {} {}, {}",
            temp, mnemonic, backend.ir_spelling, lv.repr, rv.repr
        ))?;
        Value::new(format!("%{}", temp), common)
    };
    let casted = cast_value(ctx, combined, place.ty, loc)?;
    store_place(ctx, &place, &casted)?;
    Ok(casted)
}

fn lower_call(
    ctx: &mut CodeGenContext,
    callee: &str,
    args: &[Expr],
    loc: &SourceLocation,
) -> Result<Value, CodeGenError> {
    let sig: FunctionSig = ctx.functions.get(callee).cloned().ok_or_else(|| {
        CodeGenError::logic(format!("call to undeclared function '{}'", callee), loc.clone())
    })?;
    let mut arg_values = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let value = lower_expr(ctx, arg)?;
        let target_ty = if i < sig.params.len() {
            sig.params[i]
        } else {
            default_promote(ctx, value.ty)
        };
        arg_values.push(cast_value(ctx, value, target_ty, loc)?);
    }
    let mut rendered_args = Vec::with_capacity(arg_values.len());
    for v in &arg_values {
        let backend = ctx
            .types
            .realize(v.ty)
            .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
        rendered_args.push(format!("{} {}", backend.ir_spelling, v.repr));
    }
    let return_backend = ctx
        .types
        .realize(sig.return_ty)
        .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
    let is_void = matches!(ctx.types.node(ctx.types.unqualify(sig.return_ty)), crate::types::TypeNode::Primitive(PrimitiveKind::Void));
    if is_void {
        ctx.emit(format!(
            "call {} @{}({})",
            return_backend.ir_spelling,
            crate::codegen::mangle_name(callee),
            rendered_args.join(", ")
        ))?;
        return Ok(Value::new("0", sig.return_ty));
    }
    let temp = ctx.fresh_temp();
    ctx.emit(format!(
        "%{} = call {} @{}({})",
        temp,
        return_backend.ir_spelling,
        crate::codegen::mangle_name(callee),
        rendered_args.join(", ")
    ))?;
    Ok(Value::new(format!("%{}", temp), sig.return_ty))
}

/// Default argument promotions applied past a variadic function's fixed
/// parameter list: `char`/`short` widen to `int`, `float` widens to
/// `double`.
fn default_promote(ctx: &mut CodeGenContext, ty: crate::types::TypeIdx) -> crate::types::TypeIdx {
    match ctx.types.node(ctx.types.unqualify(ty)) {
        crate::types::TypeNode::Primitive(PrimitiveKind::Char)
        | crate::types::TypeNode::Primitive(PrimitiveKind::Short)
        | crate::types::TypeNode::Primitive(PrimitiveKind::Bool) => {
            ctx.types.primitive(PrimitiveKind::Int)
        }
        crate::types::TypeNode::Primitive(PrimitiveKind::Float) => {
            ctx.types.primitive(PrimitiveKind::Double)
        }
        _ => ty,
    }
}

/// Casts `value` to `target_ty`, dispatching on the source/target backend
/// spellings. A no-op if the two types are already
/// identical (modulo qualifiers).
pub(crate) fn cast_value(
    ctx: &mut CodeGenContext,
    value: Value,
    target_ty: crate::types::TypeIdx,
    loc: &SourceLocation,
) -> Result<Value, CodeGenError> {
    let source_unqual = ctx.types.unqualify(value.ty);
    let target_unqual = ctx.types.unqualify(target_ty);
    if source_unqual == target_unqual {
        return Ok(Value::new(value.repr, target_ty));
    }

    let source_backend = ctx
        .types
        .realize(source_unqual)
        .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
    let target_backend = ctx
        .types
        .realize(target_unqual)
        .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;

    let source_is_ptr = ctx.types.is_pointer(source_unqual);
    let target_is_ptr = ctx.types.is_pointer(target_unqual);
    let source_is_float = ctx.types.is_float(source_unqual);
    let target_is_float = ctx.types.is_float(target_unqual);
    let source_is_bool = matches!(
        ctx.types.node(source_unqual),
        crate::types::TypeNode::Primitive(PrimitiveKind::Bool)
    );
    let target_is_bool = matches!(
        ctx.types.node(target_unqual),
        crate::types::TypeNode::Primitive(PrimitiveKind::Bool)
    );

    let temp = ctx.fresh_temp();
    let instr = if target_is_bool && !source_is_bool {
        if source_is_float {
            format!(
                "%{} = fcmp one {} {}, 0.0",
                temp, source_backend.ir_spelling, value.repr
            )
        } else if source_is_ptr {
            format!("%{} = icmp ne ptr {}, null", temp, value.repr)
        } else {
            format!(
                "%{} = icmp ne {} {}, 0",
                temp, source_backend.ir_spelling, value.repr
            )
        }
    } else if source_is_bool && !target_is_bool {
        if target_is_float {
            format!(
                "%{} = uitofp i1 {} to {}",
                temp, value.repr, target_backend.ir_spelling
            )
        } else {
            format!(
                "%{} = zext i1 {} to {}",
                temp, value.repr, target_backend.ir_spelling
            )
        }
    } else if source_is_ptr && target_is_ptr {
        return Ok(Value::new(value.repr, target_ty));
    } else if source_is_ptr && !target_is_ptr {
        format!(
            "%{} = ptrtoint ptr {} to {}",
            temp, value.repr, target_backend.ir_spelling
        )
    } else if !source_is_ptr && target_is_ptr {
        format!(
            "%{} = inttoptr {} {} to ptr",
            temp, source_backend.ir_spelling, value.repr
        )
    } else if source_is_float && target_is_float {
        if source_backend.abi_size < target_backend.abi_size {
            format!(
                "%{} = fpext {} {} to {}",
                temp, source_backend.ir_spelling, value.repr, target_backend.ir_spelling
            )
        } else {
            format!(
                "%{} = fptrunc {} {} to {}",
                temp, source_backend.ir_spelling, value.repr, target_backend.ir_spelling
            )
        }
    } else if source_is_float && !target_is_float {
        format!(
            "%{} = fptosi {} {} to {}",
            temp, source_backend.ir_spelling, value.repr, target_backend.ir_spelling
        )
    } else if !source_is_float && target_is_float {
        format!(
            "%{} = sitofp {} {} to {}",
            temp, source_backend.ir_spelling, value.repr, target_backend.ir_spelling
        )
    } else if source_backend.abi_size < target_backend.abi_size {
        format!(
            "%{} = sext {} {} to {}",
            temp, source_backend.ir_spelling, value.repr, target_backend.ir_spelling
        )
    } else if source_backend.abi_size > target_backend.abi_size {
        format!(
            "%{} = trunc {} {} to {}",
            temp, source_backend.ir_spelling, value.repr, target_backend.ir_spelling
        )
    } else {
        return Ok(Value::new(value.repr, target_ty));
    };
    ctx.emit(instr)?;
    Ok(Value::new(format!("%{}", temp), target_ty))
}

/// Coerces `value` to `i1`, as required at every branch condition site
/// (`if`, `while`, `&&`/`||`, `?:`).
pub(crate) fn coerce_to_bool(
    ctx: &mut CodeGenContext,
    value: Value,
    loc: &SourceLocation,
) -> Result<Value, CodeGenError> {
    let bool_ty = ctx.types.primitive(PrimitiveKind::Bool);
    cast_value(ctx, value, bool_ty, loc)
}

/// Encodes a `double` constant as LLVM's exact hexadecimal bit-pattern
/// form, avoiding any decimal-to-binary rounding mismatch between the
/// source literal and what the backend parses back.
pub(crate) fn format_double_constant(value: f64) -> String {
    format!("0x{:016X}", value.to_bits())
}
