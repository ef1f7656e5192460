//! Function- and program-level orchestration.
//!
//! `generate` is the single entry point the rest of the crate calls. It
//! runs the resolver over the whole program, emits global variables,
//! lowers every function body, and assembles the final module text in the
//! order `backend.rs` expects: target triple, struct/global declarations,
//! string constant globals, extern prototypes for undefined functions, then
//! the function bodies themselves.

use crate::ast::{Declarator, Expr, ExternalDecl, Param, Program, Stmt, TypeName, UnOp};
use crate::codegen::expr::format_double_constant;
use crate::codegen::platform::get_target_triple;
use crate::codegen::stmt::{const_eval_i64, lower_stmt};
use crate::codegen::{CodeGenContext, CodeGenError, FunctionSig, mangle_name};
use crate::diagnostics::SourceLocation;
use crate::resolver::Resolver;
use crate::scope::Binding;
use crate::types::{PrimitiveKind, TypeIdx, TypeNode};
use std::collections::HashSet;
use std::fmt::Write as _;

/// Compiles a whole `Program` to LLVM IR text.
pub fn generate(program: &Program) -> Result<String, CodeGenError> {
    let mut ctx = CodeGenContext::new();
    Resolver::register_program(&mut ctx, program).map_err(|e| {
        tracing::error!(error = %e, "symbol resolution failed");
        e
    })?;

    // File scope: global variables live in the bottom-most scope frame for
    // the whole compilation, never popped until the module is fully lowered.
    ctx.scopes.push();

    for decl in &program.decls {
        if let ExternalDecl::GlobalVar {
            type_name,
            declarator,
            loc,
        } = decl
        {
            declare_global(&mut ctx, type_name, declarator, loc)?;
        }
    }

    let mut extern_decls = String::new();
    let mut seen_externs = HashSet::new();
    for decl in &program.decls {
        if let ExternalDecl::FunctionProto { name, .. } = decl
            && seen_externs.insert(name.clone())
        {
            let sig = ctx.functions.get(name).cloned().expect("registered by resolver");
            if !sig.defined {
                write_extern_decl(&mut ctx, &mut extern_decls, name, &sig)?;
            }
        }
    }

    for decl in &program.decls {
        if let ExternalDecl::FunctionDef {
            name,
            params,
            variadic,
            body,
            loc,
            ..
        } = decl
        {
            tracing::debug!(function = %name, "lowering function");
            generate_function(&mut ctx, name, params, *variadic, body, loc).map_err(|e| {
                tracing::error!(function = %name, error = %e, "codegen failed");
                e
            })?;
        }
    }

    ctx.scopes.pop();

    assemble_module(&mut ctx, &extern_decls)
}

/// Registers `decl` as a global and emits its `@name = global ...` line
/// into `type_decls`.
fn declare_global(
    ctx: &mut CodeGenContext,
    type_name: &TypeName,
    decl: &Declarator,
    loc: &SourceLocation,
) -> Result<(), CodeGenError> {
    let base_ty = ctx.resolve_type_name(type_name, decl.pointer_level)?;
    let ty = ctx.types.qualified(base_ty, decl.qualifiers);

    let ty = if decl.array_dims.is_empty() {
        ty
    } else {
        let dims: Vec<i64> = decl
            .array_dims
            .iter()
            .map(|e| const_eval_i64(e).unwrap_or(0))
            .collect();
        ctx.types
            .array(ty, &dims)
            .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?
    };

    let backend = ctx
        .types
        .realize(ty)
        .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
    ctx.ensure_struct_declared(ty)?;

    let initializer = match &decl.initializer {
        Some(expr) => constant_initializer(ctx, expr, ty)?,
        None => zero_constant(ctx, ty)?,
    };

    let mangled = mangle_name(&decl.name);
    writeln!(
        ctx.type_decls,
        "@{} = global {} {}",
        mangled, backend.ir_spelling, initializer
    )?;

    ctx.scopes.force_declare(
        &decl.name,
        Binding {
            slot: format!("@{}", mangled),
            ty,
        },
    );
    Ok(())
}

/// Folds the handful of literal forms a global initializer can take without
/// running any instructions (globals aren't inside a function body, so
/// there's nowhere to `lower_expr` into); anything richer falls back to a
/// zero initializer, matching the crate's "no link-time constant folding"
/// non-goal.
fn constant_initializer(
    ctx: &mut CodeGenContext,
    expr: &Expr,
    ty: TypeIdx,
) -> Result<String, CodeGenError> {
    match expr {
        Expr::Integer { value, .. } => Ok(value.to_string()),
        Expr::Float { value, .. } => Ok(format_double_constant(*value)),
        Expr::Unary {
            op: UnOp::Neg,
            operand,
            ..
        } => match operand.as_ref() {
            Expr::Integer { value, .. } => Ok((-value).to_string()),
            Expr::Float { value, .. } => Ok(format_double_constant(-*value)),
            _ => zero_constant(ctx, ty),
        },
        _ => zero_constant(ctx, ty),
    }
}

/// The LLVM-legal zero constant for `ty`'s backend representation: `0`/`0.0`
/// for scalars, `null` for pointers, `zeroinitializer` for arrays/structs.
fn zero_constant(ctx: &mut CodeGenContext, ty: TypeIdx) -> Result<String, CodeGenError> {
    let unqualified = ctx.types.unqualify(ty);
    Ok(match ctx.types.node(unqualified) {
        TypeNode::Primitive(kind) => match kind {
            PrimitiveKind::Float | PrimitiveKind::Double => "0.0".to_string(),
            _ => "0".to_string(),
        },
        TypeNode::Pointer { .. } => "null".to_string(),
        _ => "zeroinitializer".to_string(),
    })
}

fn write_extern_decl(
    ctx: &mut CodeGenContext,
    out: &mut String,
    name: &str,
    sig: &FunctionSig,
) -> Result<(), CodeGenError> {
    let return_backend = ctx
        .types
        .realize(sig.return_ty)
        .map_err(|e| CodeGenError::logic(e.to_string(), SourceLocation::unknown()))?;
    ctx.ensure_struct_declared(sig.return_ty)?;
    let mut params = Vec::with_capacity(sig.params.len());
    for ty in &sig.params {
        let backend = ctx
            .types
            .realize(*ty)
            .map_err(|e| CodeGenError::logic(e.to_string(), SourceLocation::unknown()))?;
        ctx.ensure_struct_declared(*ty)?;
        params.push(backend.ir_spelling);
    }
    if sig.variadic {
        params.push("...".to_string());
    }
    writeln!(
        out,
        "declare {} @{}({})",
        return_backend.ir_spelling,
        mangle_name(name),
        params.join(", ")
    )?;
    Ok(())
}

/// Lowers one function definition: prologue (parameter slots), body, and an
/// implicit return if control can fall off the end.
fn generate_function(
    ctx: &mut CodeGenContext,
    name: &str,
    params: &[Param],
    variadic: bool,
    body: &Stmt,
    loc: &SourceLocation,
) -> Result<(), CodeGenError> {
    let sig = ctx
        .functions
        .get(name)
        .cloned()
        .expect("function registered by resolver before codegen");

    ctx.current_function_return_ty = sig.return_ty;
    ctx.labels.clear();
    ctx.terminated = true;
    ctx.scopes.push();

    let return_backend = ctx
        .types
        .realize(sig.return_ty)
        .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
    ctx.ensure_struct_declared(sig.return_ty)?;

    let mut header_params = Vec::with_capacity(sig.params.len());
    for (i, ty) in sig.params.iter().enumerate() {
        let backend = ctx
            .types
            .realize(*ty)
            .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
        header_params.push(format!("{} %arg{}", backend.ir_spelling, i));
    }
    if variadic {
        header_params.push("...".to_string());
    }

    writeln!(
        ctx.output,
        "define {} @{}({}) {{",
        return_backend.ir_spelling,
        mangle_name(name),
        header_params.join(", ")
    )?;

    let entry = ctx.fresh_block("entry.");
    ctx.start_block(&entry)?;

    for (i, (param, ty)) in params.iter().zip(sig.params.iter()).enumerate() {
        let backend = ctx
            .types
            .realize(*ty)
            .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
        ctx.ensure_struct_declared(*ty)?;
        let slot_name = if param.declarator.name.is_empty() {
            "arg".to_string()
        } else {
            param.declarator.name.clone()
        };
        let slot = format!("{}.addr.{}", slot_name, ctx.fresh_temp());
        ctx.emit(format!("%{} = alloca {}", slot, backend.ir_spelling))?;
        ctx.emit(format!("store {} %arg{}, ptr %{}", backend.ir_spelling, i, slot))?;
        if !param.declarator.name.is_empty()
            && !ctx.scopes.declare(&param.declarator.name, Binding { slot, ty: *ty })
        {
            return Err(CodeGenError::logic(
                format!("redeclaration of parameter '{}'", param.declarator.name),
                loc.clone(),
            ));
        }
    }

    lower_stmt(ctx, body)?;

    if !ctx.terminated {
        let void_ty = ctx.types.primitive(PrimitiveKind::Void);
        if sig.return_ty == void_ty {
            ctx.emit("ret void")?;
        } else {
            let zero = zero_constant(ctx, sig.return_ty)?;
            ctx.emit(format!("ret {} {}", return_backend.ir_spelling, zero))?;
        }
        ctx.terminated = true;
    }

    writeln!(ctx.output, "}}\n")?;
    ctx.scopes.pop();

    let pending: Vec<String> = ctx.labels.pending_labels().map(str::to_string).collect();
    if !pending.is_empty() {
        return Err(CodeGenError::logic(
            format!("use of undeclared label(s): {}", pending.join(", ")),
            loc.clone(),
        ));
    }

    Ok(())
}

/// Escapes a decoded string literal back into LLVM's `c"..."` constant
/// syntax: printable ASCII passes through, everything else (including the
/// nul terminator) becomes a `\XX` hex escape.
fn escape_ir_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b' '..=b'~' if byte != b'"' && byte != b'\\' => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\{:02X}", byte);
            }
        }
    }
    out
}

/// Assembles the final module: target triple, struct/global declarations,
/// string constants, extern prototypes, then every function body in source
/// order.
fn assemble_module(ctx: &mut CodeGenContext, extern_decls: &str) -> Result<String, CodeGenError> {
    let mut module = String::new();
    writeln!(module, "target triple = \"{}\"", get_target_triple())?;
    module.push('\n');

    if !ctx.type_decls.is_empty() {
        module.push_str(&ctx.type_decls);
        module.push('\n');
    }

    for (name, value) in &ctx.string_constants {
        writeln!(
            module,
            "{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
            name,
            value.as_bytes().len() + 1,
            escape_ir_string(value)
        )?;
    }
    if !ctx.string_constants.is_empty() {
        module.push('\n');
    }

    if !extern_decls.is_empty() {
        module.push_str(extern_decls);
        module.push('\n');
    }

    module.push_str(&ctx.output);
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BaseType, Declarator, ExternalDecl, Param, TypeName};
    use crate::types::{PrimitiveKind, Qualifiers};

    fn int_ty() -> TypeName {
        TypeName::new(BaseType::Primitive(PrimitiveKind::Int))
    }

    fn loc() -> SourceLocation {
        SourceLocation::unknown()
    }

    fn void_main_returning(expr_value: i64) -> Program {
        let body = Stmt::Block(
            vec![Stmt::Return(
                Some(Expr::Integer {
                    value: expr_value,
                    loc: loc(),
                }),
                loc(),
            )],
            loc(),
        );
        Program {
            decls: vec![ExternalDecl::FunctionDef {
                return_type: int_ty(),
                return_pointer_level: 0,
                name: "main".to_string(),
                params: Vec::new(),
                variadic: false,
                body,
                loc: loc(),
            }],
        }
    }

    #[test]
    fn generates_a_defined_main_with_a_ret() {
        let program = void_main_returning(0);
        let ir = generate(&program).expect("codegen should succeed");
        assert!(ir.contains("define i32 @main()"));
        assert!(ir.contains("ret i32 0"));
        assert!(ir.contains("target triple"));
    }

    #[test]
    fn falls_off_the_end_gets_an_implicit_return() {
        let body = Stmt::Block(vec![], loc());
        let program = Program {
            decls: vec![ExternalDecl::FunctionDef {
                return_type: TypeName::new(BaseType::Primitive(PrimitiveKind::Void)),
                return_pointer_level: 0,
                name: "noop".to_string(),
                params: Vec::new(),
                variadic: false,
                body,
                loc: loc(),
            }],
        };
        let ir = generate(&program).expect("codegen should succeed");
        assert!(ir.contains("ret void"));
    }

    #[test]
    fn undeclared_goto_target_is_a_fatal_error() {
        let body = Stmt::Block(
            vec![Stmt::Goto("nowhere".to_string(), loc())],
            loc(),
        );
        let program = Program {
            decls: vec![ExternalDecl::FunctionDef {
                return_type: int_ty(),
                return_pointer_level: 0,
                name: "main".to_string(),
                params: Vec::new(),
                variadic: false,
                body,
                loc: loc(),
            }],
        };
        assert!(generate(&program).is_err());
    }

    #[test]
    fn declares_a_global_variable_and_makes_it_visible_to_functions() {
        let decl = Declarator {
            name: "counter".to_string(),
            pointer_level: 0,
            qualifiers: Qualifiers::NONE,
            array_dims: Vec::new(),
            initializer: Some(Expr::Integer { value: 7, loc: loc() }),
            next: None,
            loc: loc(),
        };
        let body = Stmt::Block(
            vec![Stmt::Return(
                Some(Expr::Identifier {
                    name: "counter".to_string(),
                    loc: loc(),
                }),
                loc(),
            )],
            loc(),
        );
        let program = Program {
            decls: vec![
                ExternalDecl::GlobalVar {
                    type_name: int_ty(),
                    declarator: decl,
                    loc: loc(),
                },
                ExternalDecl::FunctionDef {
                    return_type: int_ty(),
                    return_pointer_level: 0,
                    name: "main".to_string(),
                    params: Vec::<Param>::new(),
                    variadic: false,
                    body,
                    loc: loc(),
                },
            ],
        };
        let ir = generate(&program).expect("codegen should succeed");
        assert!(ir.contains("@counter = global i32 7"));
        assert!(ir.contains("load i32, ptr @counter"));
    }

    #[test]
    fn calling_a_prototype_only_function_emits_a_declare() {
        let body = Stmt::Block(
            vec![Stmt::Expression(Expr::FunctionCall {
                callee: "external_fn".to_string(),
                args: vec![],
                loc: loc(),
            })],
            loc(),
        );
        let program = Program {
            decls: vec![
                ExternalDecl::FunctionProto {
                    return_type: TypeName::new(BaseType::Primitive(PrimitiveKind::Void)),
                    return_pointer_level: 0,
                    name: "external_fn".to_string(),
                    params: Vec::new(),
                    variadic: false,
                    loc: loc(),
                },
                ExternalDecl::FunctionDef {
                    return_type: TypeName::new(BaseType::Primitive(PrimitiveKind::Void)),
                    return_pointer_level: 0,
                    name: "main".to_string(),
                    params: Vec::new(),
                    variadic: false,
                    body,
                    loc: loc(),
                },
            ],
        };
        let ir = generate(&program).expect("codegen should succeed");
        assert!(ir.contains("declare void @external_fn()"));
    }
}
