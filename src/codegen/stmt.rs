//! Statement lowering.
//!
//! `Case`/`Default` are lowered exactly like `Label`: each gets a basic
//! block and statement lowering falls through into it in source order.
//! What makes them a switch rather than an ordinary sequence of labels is
//! the `switch` instruction `lower_switch` emits up front, which jumps
//! directly into whichever block the discriminant selects — the labels
//! themselves may be arbitrarily nested inside `if`/`while`/`do...while`
//! bodies (Duff's Device), so the first pass that locates them walks the
//! body recursively rather than scanning only its immediate statement list.

use crate::ast::{Declarator, Expr, Stmt};
use crate::codegen::expr::{cast_value, coerce_to_bool, lower_expr};
use crate::codegen::{CodeGenContext, CodeGenError, Value};
use crate::diagnostics::SourceLocation;
use crate::scope::{Binding, JumpContext};
use crate::types::{PrimitiveKind, TypeIdx, VLA_DIM};
use std::collections::HashMap;

/// Case/default block names collected for one active switch.
#[derive(Debug, Default)]
pub(crate) struct SwitchFrame {
    pub cases: HashMap<i64, String>,
    pub default_block: Option<String>,
}

pub(crate) fn lower_stmt(ctx: &mut CodeGenContext, stmt: &Stmt) -> Result<(), CodeGenError> {
    match stmt {
        Stmt::Expression(expr) => {
            lower_expr(ctx, expr)?;
            Ok(())
        }
        Stmt::Declaration {
            type_name,
            declarators,
            loc,
        } => lower_declaration(ctx, type_name, declarators, loc),
        Stmt::Block(stmts, _) => lower_block(ctx, stmts),
        Stmt::Return(expr, loc) => lower_return(ctx, expr.as_ref(), loc),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            loc,
        } => lower_if(ctx, cond, then_branch, else_branch.as_deref(), loc),
        Stmt::While { cond, body, loc } => lower_while(ctx, cond, body, loc),
        Stmt::DoWhile { body, cond, loc } => lower_do_while(ctx, body, cond, loc),
        Stmt::For {
            init,
            cond,
            increment,
            body,
            loc,
        } => lower_for(ctx, init.as_deref(), cond.as_ref(), increment.as_ref(), body, loc),
        Stmt::Break(loc) => lower_break(ctx, loc),
        Stmt::Continue(loc) => lower_continue(ctx, loc),
        Stmt::Label { name, stmt, loc } => lower_label(ctx, name, stmt, loc),
        Stmt::Goto(name, loc) => lower_goto(ctx, name, loc),
        Stmt::Switch {
            discriminant,
            body,
            loc,
        } => lower_switch(ctx, discriminant, body, loc),
        Stmt::Case(value, loc) => lower_case(ctx, value, loc),
        Stmt::Default(loc) => lower_default(ctx, loc),
    }
}

fn lower_block(ctx: &mut CodeGenContext, stmts: &[Stmt]) -> Result<(), CodeGenError> {
    ctx.scopes.push();
    for stmt in stmts {
        lower_stmt(ctx, stmt)?;
    }
    ctx.scopes.pop();
    Ok(())
}

/// Allocates one stack slot per declarator. Rather than hoisting these
/// allocas to the function's entry block, this crate doesn't
/// maintain a separate entry-block insertion cursor, so allocas are
/// emitted at the point of declaration instead; this only matters for
/// goto jumping backward over a declaration, which LLVM tolerates as long
/// as the `alloca` itself dominates every use, and a declaration's uses
/// are always lexically below it.
fn lower_declaration(
    ctx: &mut CodeGenContext,
    type_name: &crate::ast::TypeName,
    declarators: &[Declarator],
    _loc: &SourceLocation,
) -> Result<(), CodeGenError> {
    for decl in declarators {
        lower_declarator(ctx, type_name, decl)?;
    }
    Ok(())
}

fn lower_declarator(
    ctx: &mut CodeGenContext,
    type_name: &crate::ast::TypeName,
    decl: &Declarator,
) -> Result<(), CodeGenError> {
    let base_ty = ctx.resolve_type_name(type_name, decl.pointer_level)?;
    let qualified_base = ctx.types.qualified(base_ty, decl.qualifiers);

    if decl.array_dims.is_empty() {
        let ty = qualified_base;
        let backend = ctx
            .types
            .realize(ty)
            .map_err(|e| CodeGenError::logic(e.to_string(), decl.loc.clone()))?;
        ctx.ensure_struct_declared(ty)?;
        let slot = format!("{}.addr.{}", decl.name, ctx.fresh_temp());
        ctx.emit(format!("%{} = alloca {}", slot, backend.ir_spelling))?;
        if let Some(init) = &decl.initializer {
            lower_initializer(ctx, &slot, ty, init)?;
        }
        if !ctx.scopes.declare(&decl.name, Binding { slot, ty }) {
            return Err(CodeGenError::logic(
                format!("redeclaration of '{}' in the same scope", decl.name),
                decl.loc.clone(),
            ));
        }
        return Ok(());
    }

    // Array declarator. The outermost dimension is a VLA when it fails to
    // const-fold or when the parser left it as an unsized `[]`
    // (surfaced as the `VLA_DIM` constant itself) — everything but the
    // outermost dimension must be a compile-time constant.
    let mut dims = Vec::with_capacity(decl.array_dims.len());
    let mut vla_runtime_len: Option<Value> = None;
    for (i, dim_expr) in decl.array_dims.iter().enumerate() {
        match const_eval_i64(dim_expr) {
            Some(value) if value != VLA_DIM => dims.push(value),
            Some(_) if i == 0 => dims.push(VLA_DIM),
            None if i == 0 => {
                dims.push(VLA_DIM);
                vla_runtime_len = Some(lower_expr(ctx, dim_expr)?);
            }
            _ => {
                return Err(CodeGenError::logic(
                    "array dimension must be a compile-time constant except the outermost",
                    decl.loc.clone(),
                ))
            }
        }
    }

    // An unsized `[]` with no runtime length expression is only valid when
    // an initializer list supplies the element count.
    if dims[0] == VLA_DIM && vla_runtime_len.is_none() {
        let count = match &decl.initializer {
            Some(Expr::InitializerList { elements, .. }) => elements.len() as i64,
            _ => {
                return Err(CodeGenError::logic(
                    "array must have a size, a variable length, or an initializer",
                    decl.loc.clone(),
                ))
            }
        };
        dims[0] = count;
    }

    let array_ty = ctx
        .types
        .array(qualified_base, &dims)
        .map_err(|e| CodeGenError::logic(e.to_string(), decl.loc.clone()))?;

    if let Some(len) = vla_runtime_len {
        let elem_ty = match ctx.types.node(array_ty).clone() {
            crate::types::TypeNode::Array { element, .. } => element,
            _ => unreachable!(),
        };
        let elem_backend = ctx
            .types
            .realize(elem_ty)
            .map_err(|e| CodeGenError::logic(e.to_string(), decl.loc.clone()))?;
        let slot = format!("{}.addr.{}", decl.name, ctx.fresh_temp());
        ctx.emit(format!(
            "%{} = alloca {}, i64 {}",
            slot, elem_backend.ir_spelling, len.repr
        ))?;
        // A VLA decays to a pointer to its element type; there is no fixed
        // `[N x T]` backend type to store it as.
        let ptr_ty = ctx
            .types
            .pointer(elem_ty, 1)
            .map_err(|e| CodeGenError::logic(e.to_string(), decl.loc.clone()))?;
        if !ctx.scopes.declare(&decl.name, Binding { slot, ty: ptr_ty }) {
            return Err(CodeGenError::logic(
                format!("redeclaration of '{}' in the same scope", decl.name),
                decl.loc.clone(),
            ));
        }
        return Ok(());
    }

    let backend = ctx
        .types
        .realize(array_ty)
        .map_err(|e| CodeGenError::logic(e.to_string(), decl.loc.clone()))?;
    ctx.ensure_struct_declared(array_ty)?;
    let slot = format!("{}.addr.{}", decl.name, ctx.fresh_temp());
    ctx.emit(format!("%{} = alloca {}", slot, backend.ir_spelling))?;

    if let Some(Expr::InitializerList { elements, .. }) = &decl.initializer {
        let elem_ty = match ctx.types.node(array_ty).clone() {
            crate::types::TypeNode::Array { element, .. } => element,
            _ => unreachable!(),
        };
        let elem_backend = ctx
            .types
            .realize(elem_ty)
            .map_err(|e| CodeGenError::logic(e.to_string(), decl.loc.clone()))?;
        for (i, elem_expr) in elements.iter().enumerate() {
            let elem_value = lower_expr(ctx, elem_expr)?;
            let casted = cast_value(ctx, elem_value, elem_ty, &decl.loc)?;
            let gep = ctx.fresh_temp();
            ctx.emit(format!(
                "%{} = getelementptr {}, ptr %{}, i64 0, i64 {}",
                gep, backend.ir_spelling, slot, i
            ))?;
            ctx.emit(format!(
                "store {} {}, ptr %{}",
                elem_backend.ir_spelling, casted.repr, gep
            ))?;
        }
    } else if decl.initializer.is_some() {
        return Err(CodeGenError::logic(
            "array declarator must be initialized with an initializer list",
            decl.loc.clone(),
        ));
    }

    if !ctx.scopes.declare(&decl.name, Binding { slot, ty: array_ty }) {
        return Err(CodeGenError::logic(
            format!("redeclaration of '{}' in the same scope", decl.name),
            decl.loc.clone(),
        ));
    }
    Ok(())
}

pub(crate) fn const_eval_i64(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Integer { value, .. } => Some(*value),
        Expr::Unary {
            op: crate::ast::UnOp::Neg,
            operand,
            ..
        } => const_eval_i64(operand).map(|v| -v),
        Expr::Binary { op, lhs, rhs, .. } => {
            let l = const_eval_i64(lhs)?;
            let r = const_eval_i64(rhs)?;
            use crate::ast::BinOp::*;
            match op {
                Add => Some(l + r),
                Sub => Some(l - r),
                Mul => Some(l * r),
                Div if r != 0 => Some(l / r),
                Mod if r != 0 => Some(l % r),
                _ => None,
            }
        }
        _ => None,
    }
}

fn lower_initializer(
    ctx: &mut CodeGenContext,
    slot: &str,
    ty: TypeIdx,
    init: &Expr,
) -> Result<(), CodeGenError> {
    if let Expr::InitializerList { loc, .. } = init {
        return Err(CodeGenError::logic(
            "initializer list on a non-array declaration",
            loc.clone(),
        ));
    }
    let value = lower_expr(ctx, init)?;
    let casted = cast_value(ctx, value, ty, init.loc())?;
    let backend = ctx
        .types
        .realize(ty)
        .map_err(|e| CodeGenError::logic(e.to_string(), init.loc().clone()))?;
    ctx.emit(format!(
        "store {} {}, ptr %{}",
        backend.ir_spelling, casted.repr, slot
    ))?;
    Ok(())
}

fn lower_return(
    ctx: &mut CodeGenContext,
    expr: Option<&Expr>,
    loc: &SourceLocation,
) -> Result<(), CodeGenError> {
    match expr {
        Some(expr) => {
            let value = lower_expr(ctx, expr)?;
            let casted = cast_value(ctx, value, ctx.current_function_return_ty, loc)?;
            let backend = ctx
                .types
                .realize(ctx.current_function_return_ty)
                .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
            ctx.emit(format!("ret {} {}", backend.ir_spelling, casted.repr))?;
        }
        None => {
            ctx.emit("ret void")?;
        }
    }
    ctx.terminated = true;
    Ok(())
}

fn lower_if(
    ctx: &mut CodeGenContext,
    cond: &Expr,
    then_branch: &Stmt,
    else_branch: Option<&Stmt>,
    loc: &SourceLocation,
) -> Result<(), CodeGenError> {
    let cv = lower_expr(ctx, cond)?;
    let cb = coerce_to_bool(ctx, cv, loc)?;
    let then_block = ctx.fresh_block("if.then.");
    let else_block = ctx.fresh_block("if.else.");
    let merge_block = ctx.fresh_block("if.merge.");
    let false_target = if else_branch.is_some() {
        &else_block
    } else {
        &merge_block
    };
    ctx.emit(format!(
        "br i1 {}, label %{}, label %{}",
        cb.repr, then_block, false_target
    ))?;
    ctx.terminated = true;

    ctx.start_block(&then_block)?;
    lower_stmt(ctx, then_branch)?;
    ctx.br(&merge_block)?;

    if let Some(else_branch) = else_branch {
        ctx.start_block(&else_block)?;
        lower_stmt(ctx, else_branch)?;
        ctx.br(&merge_block)?;
    }

    ctx.start_block(&merge_block)?;
    Ok(())
}

fn lower_while(ctx: &mut CodeGenContext, cond: &Expr, body: &Stmt, loc: &SourceLocation) -> Result<(), CodeGenError> {
    let header = ctx.fresh_block("while.header.");
    let body_block = ctx.fresh_block("while.body.");
    let exit = ctx.fresh_block("while.exit.");

    ctx.br(&header)?;
    ctx.start_block(&header)?;
    let cv = lower_expr(ctx, cond)?;
    let cb = coerce_to_bool(ctx, cv, loc)?;
    ctx.emit(format!(
        "br i1 {}, label %{}, label %{}",
        cb.repr, body_block, exit
    ))?;
    ctx.terminated = true;

    ctx.start_block(&body_block)?;
    ctx.jumps.push(JumpContext {
        continue_target: Some(header.clone()),
        break_target: exit.clone(),
    });
    lower_stmt(ctx, body)?;
    ctx.jumps.pop();
    ctx.br(&header)?;

    ctx.start_block(&exit)?;
    Ok(())
}

fn lower_do_while(
    ctx: &mut CodeGenContext,
    body: &Stmt,
    cond: &Expr,
    loc: &SourceLocation,
) -> Result<(), CodeGenError> {
    let body_block = ctx.fresh_block("do.body.");
    let cond_block = ctx.fresh_block("do.cond.");
    let exit = ctx.fresh_block("do.exit.");

    ctx.br(&body_block)?;
    ctx.start_block(&body_block)?;
    ctx.jumps.push(JumpContext {
        continue_target: Some(cond_block.clone()),
        break_target: exit.clone(),
    });
    lower_stmt(ctx, body)?;
    ctx.jumps.pop();
    ctx.br(&cond_block)?;

    ctx.start_block(&cond_block)?;
    let cv = lower_expr(ctx, cond)?;
    let cb = coerce_to_bool(ctx, cv, loc)?;
    ctx.emit(format!(
        "br i1 {}, label %{}, label %{}",
        cb.repr, body_block, exit
    ))?;
    ctx.terminated = true;

    ctx.start_block(&exit)?;
    Ok(())
}

fn lower_for(
    ctx: &mut CodeGenContext,
    init: Option<&Stmt>,
    cond: Option<&Expr>,
    increment: Option<&Expr>,
    body: &Stmt,
    loc: &SourceLocation,
) -> Result<(), CodeGenError> {
    ctx.scopes.push();
    if let Some(init) = init {
        lower_stmt(ctx, init)?;
    }

    let cond_block = ctx.fresh_block("for.cond.");
    let body_block = ctx.fresh_block("for.body.");
    let increment_block = ctx.fresh_block("for.inc.");
    let exit = ctx.fresh_block("for.exit.");

    ctx.br(&cond_block)?;
    ctx.start_block(&cond_block)?;
    match cond {
        Some(cond) => {
            let cv = lower_expr(ctx, cond)?;
            let cb = coerce_to_bool(ctx, cv, loc)?;
            ctx.emit(format!(
                "br i1 {}, label %{}, label %{}",
                cb.repr, body_block, exit
            ))?;
        }
        None => ctx.emit(format!("br label %{}", body_block))?,
    }
    ctx.terminated = true;

    ctx.start_block(&body_block)?;
    ctx.jumps.push(JumpContext {
        continue_target: Some(increment_block.clone()),
        break_target: exit.clone(),
    });
    lower_stmt(ctx, body)?;
    ctx.jumps.pop();
    ctx.br(&increment_block)?;

    ctx.start_block(&increment_block)?;
    if let Some(increment) = increment {
        lower_expr(ctx, increment)?;
    }
    ctx.br(&cond_block)?;

    ctx.start_block(&exit)?;
    ctx.scopes.pop();
    Ok(())
}

fn lower_break(ctx: &mut CodeGenContext, loc: &SourceLocation) -> Result<(), CodeGenError> {
    let target = ctx
        .jumps
        .break_target()
        .ok_or_else(|| CodeGenError::logic("'break' outside a loop or switch", loc.clone()))?
        .to_string();
    ctx.br(&target)?;
    Ok(())
}

fn lower_continue(ctx: &mut CodeGenContext, loc: &SourceLocation) -> Result<(), CodeGenError> {
    let target = ctx
        .jumps
        .continue_target()
        .ok_or_else(|| CodeGenError::logic("'continue' outside a loop", loc.clone()))?
        .to_string();
    ctx.br(&target)?;
    Ok(())
}

fn lower_label(ctx: &mut CodeGenContext, name: &str, stmt: &Stmt, _loc: &SourceLocation) -> Result<(), CodeGenError> {
    let block = ctx.labels.block_for(name, || format!("label.{}", name));
    ctx.br(&block)?;
    ctx.start_block(&block)?;
    ctx.labels.resolve(name);
    lower_stmt(ctx, stmt)
}

fn lower_goto(ctx: &mut CodeGenContext, name: &str, _loc: &SourceLocation) -> Result<(), CodeGenError> {
    let block = ctx.labels.block_for(name, || format!("label.{}", name));
    ctx.br(&block)?;
    Ok(())
}

/// Recursively collects every `Case`/`Default` reachable from `stmt`
/// without descending into a *nested* switch's own body (its cases belong
/// to that inner switch, not this one) — this is what lets the Duff's
/// Device pattern of a `case` label inside a `do...while` loop inside a
/// `switch` resolve correctly.
fn collect_cases(
    ctx: &mut CodeGenContext,
    stmt: &Stmt,
    frame: &mut SwitchFrame,
) -> Result<(), CodeGenError> {
    match stmt {
        Stmt::Case(value, loc) => {
            let const_value = const_eval_i64(value).ok_or_else(|| {
                CodeGenError::logic("case label is not an integer constant expression", loc.clone())
            })?;
            if !(i32::MIN as i64..=i32::MAX as i64).contains(&const_value) {
                return Err(CodeGenError::logic(
                    "case value does not fit in int",
                    loc.clone(),
                ));
            }
            let block_name = ctx.fresh_block("case.");
            if frame.cases.insert(const_value, block_name).is_some() {
                return Err(CodeGenError::logic(
                    format!("duplicate case value {}", const_value),
                    loc.clone(),
                ));
            }
        }
        Stmt::Default(loc) => {
            let block_name = ctx.fresh_block("default.");
            if frame.default_block.replace(block_name).is_some() {
                return Err(CodeGenError::logic("multiple 'default' labels in one switch", loc.clone()));
            }
        }
        Stmt::Block(stmts, _) => {
            for s in stmts {
                collect_cases(ctx, s, frame)?;
            }
        }
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_cases(ctx, then_branch, frame)?;
            if let Some(else_branch) = else_branch {
                collect_cases(ctx, else_branch, frame)?;
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::For { body, .. } => {
            collect_cases(ctx, body, frame)?;
        }
        Stmt::Label { stmt, .. } => collect_cases(ctx, stmt, frame)?,
        // A nested `switch` owns its own cases; do not descend into it.
        Stmt::Switch { .. } => {}
        _ => {}
    }
    Ok(())
}

fn lower_switch(
    ctx: &mut CodeGenContext,
    discriminant: &Expr,
    body: &Stmt,
    loc: &SourceLocation,
) -> Result<(), CodeGenError> {
    let mut frame = SwitchFrame::default();
    collect_cases(ctx, body, &mut frame)?;

    let merge_block = ctx.fresh_block("switch.merge.");
    let default_target = frame.default_block.clone().unwrap_or_else(|| merge_block.clone());

    let discriminant_value = lower_expr(ctx, discriminant)?;
    let int_ty = ctx.types.primitive(PrimitiveKind::Int);
    let discriminant_value = cast_value(ctx, discriminant_value, int_ty, loc)?;

    let mut arms: Vec<(i64, String)> = frame.cases.iter().map(|(v, b)| (*v, b.clone())).collect();
    arms.sort_by_key(|(v, _)| *v);
    let arms_rendered = arms
        .iter()
        .map(|(v, b)| format!("i32 {}, label %{}", v, b))
        .collect::<Vec<_>>()
        .join(" ");
    ctx.emit(format!(
        "switch i32 {}, label %{} [ {} ]",
        discriminant_value.repr, default_target, arms_rendered
    ))?;
    ctx.terminated = true;

    // No block is open when the body's first statement is lowered; if the
    // very first reachable statement isn't itself a case/default label,
    // the switch's own body never becomes reachable except through a
    // label jumped to from elsewhere, mirroring what a real `switch`
    // compiles to.
    ctx.ensure_open_block()?;

    ctx.switch_stack.push(frame);
    ctx.jumps.push(JumpContext {
        continue_target: None,
        break_target: merge_block.clone(),
    });
    lower_stmt(ctx, body)?;
    ctx.jumps.pop();
    ctx.switch_stack.pop();

    ctx.br(&merge_block)?;
    ctx.start_block(&merge_block)?;
    Ok(())
}

fn lower_case(ctx: &mut CodeGenContext, value: &Expr, loc: &SourceLocation) -> Result<(), CodeGenError> {
    let const_value = const_eval_i64(value).ok_or_else(|| {
        CodeGenError::logic("case label is not an integer constant expression", loc.clone())
    })?;
    let block = ctx
        .switch_stack
        .last()
        .and_then(|frame| frame.cases.get(&const_value))
        .cloned()
        .ok_or_else(|| CodeGenError::logic("'case' outside a switch", loc.clone()))?;
    ctx.br(&block)?;
    ctx.start_block(&block)?;
    Ok(())
}

fn lower_default(ctx: &mut CodeGenContext, loc: &SourceLocation) -> Result<(), CodeGenError> {
    let block = ctx
        .switch_stack
        .last()
        .and_then(|frame| frame.default_block.clone())
        .ok_or_else(|| CodeGenError::logic("'default' outside a switch", loc.clone()))?;
    ctx.br(&block)?;
    ctx.start_block(&block)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeName;
    use crate::types::PrimitiveKind;

    fn new_ctx_with_int_main(ctx: &mut CodeGenContext) {
        ctx.scopes.push();
        ctx.current_function_return_ty = ctx.types.primitive(PrimitiveKind::Int);
        ctx.terminated = false;
    }

    #[test]
    fn break_without_loop_is_error() {
        let mut ctx = CodeGenContext::new();
        new_ctx_with_int_main(&mut ctx);
        let loc = SourceLocation::unknown();
        assert!(lower_break(&mut ctx, &loc).is_err());
    }

    #[test]
    fn continue_without_loop_is_error() {
        let mut ctx = CodeGenContext::new();
        new_ctx_with_int_main(&mut ctx);
        let loc = SourceLocation::unknown();
        assert!(lower_continue(&mut ctx, &loc).is_err());
    }

    #[test]
    fn declaring_same_name_twice_in_one_scope_errors() {
        let mut ctx = CodeGenContext::new();
        new_ctx_with_int_main(&mut ctx);
        let loc = SourceLocation::unknown();
        let int_type = TypeName::new(crate::ast::BaseType::Primitive(PrimitiveKind::Int));
        let decl = Declarator {
            name: "x".to_string(),
            pointer_level: 0,
            qualifiers: crate::types::Qualifiers::NONE,
            array_dims: vec![],
            initializer: None,
            next: None,
            loc: loc.clone(),
        };
        lower_declarator(&mut ctx, &int_type, &decl).unwrap();
        assert!(lower_declarator(&mut ctx, &int_type, &decl).is_err());
    }

    #[test]
    fn short_circuit_and_skips_side_effect() {
        let mut ctx = CodeGenContext::new();
        new_ctx_with_int_main(&mut ctx);
        // int c = 0; int r = 0 && (c = c + 1);
        let loc = SourceLocation::unknown();
        let int_type = TypeName::new(crate::ast::BaseType::Primitive(PrimitiveKind::Int));
        let c_decl = Declarator {
            name: "c".to_string(),
            pointer_level: 0,
            qualifiers: crate::types::Qualifiers::NONE,
            array_dims: vec![],
            initializer: Some(Expr::Integer { value: 0, loc: loc.clone() }),
            next: None,
            loc: loc.clone(),
        };
        lower_declarator(&mut ctx, &int_type, &c_decl).unwrap();
        let side_effect = Expr::Assignment {
            target: Box::new(Expr::Identifier { name: "c".to_string(), loc: loc.clone() }),
            value: Box::new(Expr::Binary {
                op: crate::ast::BinOp::Add,
                lhs: Box::new(Expr::Identifier { name: "c".to_string(), loc: loc.clone() }),
                rhs: Box::new(Expr::Integer { value: 1, loc: loc.clone() }),
                loc: loc.clone(),
            }),
            loc: loc.clone(),
        };
        let expr = Expr::Logical {
            op: crate::ast::LogicalOp::And,
            lhs: Box::new(Expr::Integer { value: 0, loc: loc.clone() }),
            rhs: Box::new(side_effect),
            loc: loc.clone(),
        };
        lower_expr(&mut ctx, &expr).unwrap();
        // The rhs (with its side effect) must only be reachable through the
        // branch taken when the lhs is true; for `&&` that means the `br`
        // deciding short-circuit sends the false path straight to the join
        // block, bypassing the block holding the assignment.
        let branch_line = ctx
            .output
            .lines()
            .find(|l| l.contains("br i1") && l.contains("logical.rhs."))
            .expect("expected a conditional branch into the logical rhs block");
        let rhs_pos = branch_line.find("logical.rhs.").unwrap();
        let join_pos = branch_line.find("logical.join.").unwrap();
        assert!(
            rhs_pos < join_pos,
            "for `&&`, the true target (rhs) must come before the false target (join) in the br"
        );
    }
}
