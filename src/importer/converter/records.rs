//! Records and unions.
//!
//! Records become sequential value types and unions explicit ones with every field at offset
//! zero. Both carry the native size and alignment as `ClassLayout`. C array fields are either
//! kept as by-value arrays or unfolded into `name_0`, `name_1`, ... depending on
//! [`CArrayPolicy`]; union fields are never unfolded since they all overlap.

use crate::{
    importer::{
        attributes::{self, InteropAttribute},
        context::{ImportContext, TypeConverter},
        converter::{method::note_projection, type_def},
        diagnostics::codes,
        naming::{or_fallback, NameScope},
        options::{CArrayPolicy, Transforms},
        typemap::{project, Usage},
    },
    metadata::{
        flags::{FieldAttributes, TypeAttributes},
        signatures::SignatureField,
        token::Token,
    },
    typelib::{ArrayDesc, TypeDesc, TypeInfo, TypeKind, VarDesc, VarKind},
    Result,
};

/// Layout, base type and attributes.
///
/// # Errors
/// Returns an error if the reserved row is missing.
pub fn define(
    ctx: &mut ImportContext,
    output: usize,
    converter: &TypeConverter,
    info: TypeInfo<'_>,
) -> Result<()> {
    let token = type_def(converter)?;
    let layout = if info.kind() == TypeKind::Union {
        TypeAttributes::EXPLICIT_LAYOUT
    } else {
        TypeAttributes::SEQUENTIAL_LAYOUT
    };
    let attr = info.attributes();
    let base = ctx.framework_type(output, "System", "ValueType");

    let builder = ctx.builder(output);
    builder.set_type_flags(token, TypeAttributes::PUBLIC | TypeAttributes::SEALED | layout)?;
    builder.set_type_extends(token, Some(base))?;
    builder.set_class_layout(token, packing(attr.alignment), attr.size_instance)?;

    if ctx
        .options
        .transforms
        .contains(Transforms::SERIALIZABLE_VALUE_CLASSES)
    {
        attributes::attach(ctx, output, token, InteropAttribute::Serializable, Vec::new())?;
    }
    Ok(())
}

/// Packing sizes must be a power of two no larger than 128; anything else means default.
fn packing(alignment: u16) -> u16 {
    if alignment.is_power_of_two() && alignment <= 128 {
        alignment
    } else {
        0
    }
}

/// The instance fields.
///
/// # Errors
/// Returns an error if a field type cannot be resolved; the fields emitted so far stay.
pub fn create(
    ctx: &mut ImportContext,
    output: usize,
    converter: &TypeConverter,
    info: TypeInfo<'_>,
) -> Result<()> {
    let token = type_def(converter)?;
    let union = info.kind() == TypeKind::Union;
    let vars: Vec<VarDesc<'_>> = info.variables().collect();
    let sole = vars.len() == 1;
    let policy = ctx.options.carray_policy;

    let mut names = NameScope::new();
    let mut lossy = false;
    for var in &vars {
        if var.kind() != VarKind::PerInstance {
            ctx.diagnostics.warning(
                codes::UNSUPPORTED_FLAG,
                format!(
                    "member '{}' of '{}' is not an instance field and was skipped",
                    var.name(),
                    converter.full_name()
                ),
            );
            continue;
        }

        let name = or_fallback(var.name(), || format!("field{}", var.index()));
        let member = format!("{}.{name}", converter.full_name());
        let desc = var.elem().type_desc();

        let unfold = match desc {
            TypeDesc::CArray(array) if !union => match policy {
                CArrayPolicy::UnfoldAll => Some(array.as_ref()),
                CArrayPolicy::UnfoldSoleField if sole => Some(array.as_ref()),
                _ => None,
            },
            _ => None,
        };
        if let Some(array) = unfold {
            unfold_array(ctx, output, token, info, &member, &name, array, &mut names, &mut lossy)?;
            continue;
        }

        let projection = project(ctx, output, info, desc, Usage::Field)?;
        note_projection(ctx, &member, &projection, &mut lossy);
        let name = names.claim_reported(&name, &mut ctx.diagnostics);

        let builder = ctx.builder(output);
        let field = builder.add_field(
            token,
            FieldAttributes::PUBLIC,
            &name,
            &SignatureField {
                base: projection.signature,
            },
        )?;
        if let Some(native) = &projection.native {
            builder.add_field_marshal(field, native)?;
        }
        if union {
            builder.set_field_offset(field, 0)?;
        }
        attributes::attach_flags(
            ctx,
            output,
            field,
            InteropAttribute::TypeLibVar,
            var.flags().bits(),
        )?;
    }

    if lossy {
        attributes::attach(ctx, output, token, InteropAttribute::ComConversionLoss, Vec::new())?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn unfold_array(
    ctx: &mut ImportContext,
    output: usize,
    owner: Token,
    info: TypeInfo<'_>,
    member: &str,
    name: &str,
    array: &ArrayDesc,
    names: &mut NameScope,
    lossy: &mut bool,
) -> Result<()> {
    let element = project(ctx, output, info, &array.element, Usage::Field)?;
    note_projection(ctx, member, &element, lossy);

    for position in 0..array.total_elements() {
        let field_name = names.claim_reported(&format!("{name}_{position}"), &mut ctx.diagnostics);
        let builder = ctx.builder(output);
        let field = builder.add_field(
            owner,
            FieldAttributes::PUBLIC,
            &field_name,
            &SignatureField {
                base: element.signature.clone(),
            },
        )?;
        if let Some(native) = &element.native {
            builder.add_field_marshal(field, native)?;
        }
    }
    Ok(())
}
