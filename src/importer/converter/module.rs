//! Modules: static classes of constants and DLL entry points.

use crate::{
    importer::{
        context::{ImportContext, TypeConverter},
        converter::{
            method::{emit_method, note_projection, shape_function, FunctionShape},
            type_def,
        },
        diagnostics::codes,
        naming::{or_fallback, NameScope},
        typemap::{constant_from_variant, project, Usage},
    },
    metadata::{
        flags::{FieldAttributes, MethodAttributes, MethodImplAttributes, PInvokeAttributes, TypeAttributes},
        signatures::SignatureField,
    },
    typelib::{CallConv, EntryPoint, FuncDesc, FuncFlags, TypeInfo, VarKind},
    Result,
};

/// Abstract sealed class deriving from `System.Object`.
///
/// # Errors
/// Returns an error if the reserved row is missing.
pub fn define(ctx: &mut ImportContext, output: usize, converter: &TypeConverter) -> Result<()> {
    let token = type_def(converter)?;
    let base = ctx.framework_type(output, "System", "Object");
    let builder = ctx.builder(output);
    builder.set_type_flags(
        token,
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
    )?;
    builder.set_type_extends(token, Some(base))
}

/// Literal fields for the constants, P/Invoke methods for the functions.
///
/// # Errors
/// Returns an error if a member type cannot be resolved.
pub fn create(
    ctx: &mut ImportContext,
    output: usize,
    converter: &TypeConverter,
    info: TypeInfo<'_>,
) -> Result<()> {
    let token = type_def(converter)?;
    let mut fields = NameScope::new();
    let mut lossy = false;

    for var in info.variables() {
        let value = match (var.kind(), var.const_value()) {
            (VarKind::Const, Some(value)) => value,
            _ => {
                ctx.diagnostics.warning(
                    codes::UNSUPPORTED_FLAG,
                    format!(
                        "variable '{}' of module '{}' is not a constant and was skipped",
                        var.name(),
                        converter.full_name()
                    ),
                );
                continue;
            }
        };
        let Some(constant) = constant_from_variant(value) else {
            ctx.diagnostics.warning(
                codes::DEFAULT_OMITTED,
                format!(
                    "constant '{}' of module '{}' ({}) cannot be represented and was skipped",
                    var.name(),
                    converter.full_name(),
                    value.vartype()
                ),
            );
            continue;
        };

        let name = or_fallback(var.name(), || format!("Constant{}", var.index()));
        let member = format!("{}.{name}", converter.full_name());
        let projection = project(ctx, output, info, var.elem().type_desc(), Usage::Field)?;
        note_projection(ctx, &member, &projection, &mut lossy);

        let name = fields.claim_reported(&name, &mut ctx.diagnostics);
        let builder = ctx.builder(output);
        let field = builder.add_field(
            token,
            FieldAttributes::PUBLIC | FieldAttributes::STATIC | FieldAttributes::LITERAL,
            &name,
            &SignatureField {
                base: projection.signature,
            },
        )?;
        builder.add_constant(field, constant.element_type, &constant.bytes)?;
    }

    let functions: Vec<FuncDesc<'_>> = info.functions().collect();
    let Some(dll) = info.dll_name() else {
        if !functions.is_empty() {
            ctx.diagnostics.warning(
                codes::UNSUPPORTED_FLAG,
                format!(
                    "module '{}' names no DLL, its {} functions were skipped",
                    converter.full_name(),
                    functions.len()
                ),
            );
        }
        return Ok(());
    };

    let mut methods = NameScope::new();
    for func in functions {
        let shape = shape_function(ctx, output, func, false, false)?;
        let name = methods.claim_reported(
            &or_fallback(func.name(), || format!("Function{}", func.index())),
            &mut ctx.diagnostics,
        );
        let method = emit_method(
            ctx,
            output,
            token,
            &name,
            MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG,
            MethodImplAttributes::PRESERVE_SIG,
            &FunctionShape {
                preserve_sig: false,
                ..shape
            },
        )?;

        let entry = match func.entry() {
            Some(EntryPoint::Name(entry)) => entry.clone(),
            Some(EntryPoint::Ordinal(ordinal)) => format!("#{ordinal}"),
            None => func.name().to_string(),
        };
        let mut flags = PInvokeAttributes::NO_MANGLE
            | match func.callconv() {
                CallConv::CDecl | CallConv::MpwCDecl => PInvokeAttributes::CALL_CONV_CDECL,
                CallConv::StdCall => PInvokeAttributes::CALL_CONV_STDCALL,
                _ => PInvokeAttributes::CALL_CONV_WINAPI,
            };
        if func.flags().contains(FuncFlags::USESGETLASTERROR) {
            flags |= PInvokeAttributes::SUPPORTS_LAST_ERROR;
        }

        let builder = ctx.builder(output);
        let module_ref = builder.add_module_ref(dll);
        builder.add_impl_map(method, flags, &entry, module_ref)?;
    }
    Ok(())
}
