//! First pass over a parsed `Program`: registers every struct type and
//! function signature before any function body is lowered.
//!
//! Running this ahead of codegen means a call to a function defined later
//! in the file — or a mutually recursive pair of functions — resolves on
//! the first (and only) pass `codegen::function::generate` makes over the
//! declaration list: a single registration pass that builds up
//! cross-references before codegen touches anything, over structs and
//! function signatures instead of modules.

use crate::ast::{BaseType, ExternalDecl, Program};
use crate::codegen::{CodeGenContext, CodeGenError, FunctionSig};
use crate::diagnostics::SourceLocation;
use crate::types::StructMember;

pub struct Resolver;

impl Resolver {
    /// Registers every struct and function declaration in `program` into
    /// `ctx`. Struct member types are resolved in declaration order, so a
    /// struct referencing an earlier struct (by value or by pointer) sees
    /// it already interned; a struct referencing *itself* only ever does
    /// so through a pointer, which resolves against the opaque forward
    /// declaration created at the start of this struct's own registration.
    pub fn register_program(ctx: &mut CodeGenContext, program: &Program) -> Result<(), CodeGenError> {
        for decl in &program.decls {
            if let ExternalDecl::StructDecl { name, members, loc } = decl {
                Self::register_struct(ctx, name, members.as_deref(), loc)?;
            }
        }
        for decl in &program.decls {
            match decl {
                ExternalDecl::FunctionProto {
                    return_type,
                    return_pointer_level,
                    name,
                    params,
                    variadic,
                    loc,
                } => {
                    let sig = Self::build_signature(ctx, return_type, *return_pointer_level, params, *variadic)?;
                    Self::register_function(ctx, name, sig, false, loc)?;
                }
                ExternalDecl::FunctionDef {
                    return_type,
                    return_pointer_level,
                    name,
                    params,
                    variadic,
                    loc,
                    ..
                } => {
                    let sig = Self::build_signature(ctx, return_type, *return_pointer_level, params, *variadic)?;
                    Self::register_function(ctx, name, sig, true, loc)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn register_struct(
        ctx: &mut CodeGenContext,
        name: &str,
        members: Option<&[(String, crate::ast::TypeName, u32)]>,
        loc: &SourceLocation,
    ) -> Result<(), CodeGenError> {
        // Forward-declare first so a self-referential member (always via a
        // pointer) resolves against this same index.
        ctx.types
            .struct_type(name, None)
            .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;

        let Some(members) = members else {
            return Ok(());
        };
        let mut resolved = Vec::with_capacity(members.len());
        for (member_name, type_name, pointer_level) in members {
            let ty = ctx.resolve_type_name(type_name, *pointer_level)?;
            resolved.push(StructMember {
                name: member_name.clone(),
                ty,
            });
        }
        ctx.types
            .struct_type(name, Some(resolved))
            .map_err(|e| CodeGenError::logic(e.to_string(), loc.clone()))?;
        Ok(())
    }

    fn build_signature(
        ctx: &mut CodeGenContext,
        return_type: &crate::ast::TypeName,
        return_pointer_level: u32,
        params: &[crate::ast::Param],
        variadic: bool,
    ) -> Result<FunctionSig, CodeGenError> {
        let return_ty = ctx.resolve_type_name(return_type, return_pointer_level)?;
        let mut param_types = Vec::with_capacity(params.len());
        for p in params {
            param_types.push(ctx.resolve_type_name(&p.type_name, p.declarator.pointer_level)?);
        }
        Ok(FunctionSig {
            return_ty,
            params: param_types,
            variadic,
            defined: false,
        })
    }

    /// Registers `name` with signature `sig` in `ctx.functions`. A second
    /// declaration with a differing signature is a fatal redeclaration
    /// error; completing a previously-prototyped function
    /// with a matching signature is allowed and marks it defined.
    fn register_function(
        ctx: &mut CodeGenContext,
        name: &str,
        sig: FunctionSig,
        defines_body: bool,
        loc: &SourceLocation,
    ) -> Result<(), CodeGenError> {
        if let Some(existing) = ctx.functions.get(name) {
            let same_shape = existing.return_ty == sig.return_ty
                && existing.params == sig.params
                && existing.variadic == sig.variadic;
            if !same_shape {
                return Err(CodeGenError::logic(
                    format!("conflicting declarations of function '{}'", name),
                    loc.clone(),
                ));
            }
            if defines_body && existing.defined {
                return Err(CodeGenError::logic(
                    format!("redefinition of function '{}'", name),
                    loc.clone(),
                ));
            }
        }
        let mut sig = sig;
        sig.defined = defines_body || ctx.functions.get(name).is_some_and(|f| f.defined);
        ctx.functions.insert(name.to_string(), sig);
        Ok(())
    }
}

/// Human-readable name for a parsed (not-yet-interned) base type, used in
/// error messages produced before a `TypeIdx` exists.
pub fn base_type_name(base: &BaseType) -> &str {
    match base {
        BaseType::Primitive(kind) => match kind {
            crate::types::PrimitiveKind::Void => "void",
            crate::types::PrimitiveKind::Bool => "bool",
            crate::types::PrimitiveKind::Char => "char",
            crate::types::PrimitiveKind::Short => "short",
            crate::types::PrimitiveKind::Int => "int",
            crate::types::PrimitiveKind::Long => "long",
            crate::types::PrimitiveKind::Float => "float",
            crate::types::PrimitiveKind::Double => "double",
        },
        BaseType::Struct(name) => name.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BaseType, TypeName};

    #[test]
    fn redeclaration_with_different_signature_is_rejected() {
        let mut ctx = CodeGenContext::new();
        let loc = SourceLocation::unknown();
        let int_ty = TypeName::new(BaseType::Primitive(crate::types::PrimitiveKind::Int));
        let sig_a = Resolver::build_signature(&mut ctx, &int_ty, 0, &[], false).unwrap();
        Resolver::register_function(&mut ctx, "f", sig_a, false, &loc).unwrap();

        let float_ty = TypeName::new(BaseType::Primitive(crate::types::PrimitiveKind::Float));
        let sig_b = Resolver::build_signature(&mut ctx, &float_ty, 0, &[], false).unwrap();
        assert!(Resolver::register_function(&mut ctx, "f", sig_b, false, &loc).is_err());
    }

    #[test]
    fn forward_struct_completes_in_place() {
        let mut ctx = CodeGenContext::new();
        let loc = SourceLocation::unknown();
        let ptr_member = (
            "next".to_string(),
            TypeName::new(BaseType::Struct("N".to_string())),
            1,
        );
        let int_member = (
            "v".to_string(),
            TypeName::new(BaseType::Primitive(crate::types::PrimitiveKind::Int)),
            0,
        );
        Resolver::register_struct(&mut ctx, "N", Some(&[int_member, ptr_member]), &loc).unwrap();
        let idx = ctx.types.struct_type("N", None).unwrap();
        assert!(ctx.types.is_struct_complete(idx));
    }
}
