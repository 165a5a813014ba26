//! Enumerations.

use crate::{
    importer::{
        attributes::{self, InteropAttribute},
        context::{ImportContext, TypeConverter},
        converter::type_def,
        diagnostics::codes,
        naming::{or_fallback, NameScope},
        typemap::{enum_underlying, fits_integral, integral_constant},
    },
    metadata::{
        flags::{FieldAttributes, TypeAttributes},
        signatures::{SignatureField, TypeSignature},
    },
    typelib::{TypeInfo, VarDesc},
    Result,
};

/// Name of the instance field holding the value of an enum.
pub const VALUE_FIELD: &str = "value__";

/// Sealed value type deriving from `System.Enum`.
///
/// # Errors
/// Returns an error if the reserved row is missing.
pub fn define(ctx: &mut ImportContext, output: usize, converter: &TypeConverter) -> Result<()> {
    let token = type_def(converter)?;
    let base = ctx.framework_type(output, "System", "Enum");
    let builder = ctx.builder(output);
    builder.set_type_flags(token, TypeAttributes::PUBLIC | TypeAttributes::SEALED)?;
    builder.set_type_extends(token, Some(base))
}

/// The `value__` field and one literal per constant.
///
/// The underlying type follows the type of the first constant. If a later constant does not
/// fit, the type is widened to the narrowest of `int`, `uint`, `long` and `ulong` that holds
/// every value and `TI2006` is reported, so no literal loses bits.
///
/// # Errors
/// Returns an error if the builder rejects a row.
pub fn create(
    ctx: &mut ImportContext,
    output: usize,
    converter: &TypeConverter,
    info: TypeInfo<'_>,
) -> Result<()> {
    let token = type_def(converter)?;
    let vars: Vec<VarDesc<'_>> = info.variables().collect();
    let values: Vec<i64> = vars
        .iter()
        .filter_map(|var| var.const_value().and_then(|value| value.as_i64()))
        .collect();
    let declared = vars
        .iter()
        .find_map(|var| var.const_value())
        .map_or(TypeSignature::I4, |value| enum_underlying(value.vartype()));
    let underlying = underlying_for(&declared, &values);
    if underlying != declared {
        ctx.diagnostics.warning(
            codes::ENUM_WIDENED,
            format!(
                "constants of enum '{}' do not fit {declared:?}, underlying type widened to {underlying:?}",
                converter.full_name()
            ),
        );
    }

    let mut names = NameScope::new();
    names.claim(VALUE_FIELD);
    ctx.builder(output).add_field(
        token,
        FieldAttributes::PUBLIC | FieldAttributes::SPECIAL_NAME | FieldAttributes::RT_SPECIAL_NAME,
        VALUE_FIELD,
        &SignatureField {
            base: underlying.clone(),
        },
    )?;

    for var in vars {
        let Some(value) = var.const_value().and_then(|value| value.as_i64()) else {
            ctx.diagnostics.warning(
                codes::UNSUPPORTED_FLAG,
                format!(
                    "member '{}' of enum '{}' has no integral value and was skipped",
                    var.name(),
                    converter.full_name()
                ),
            );
            continue;
        };
        let Some(constant) = integral_constant(&underlying, value) else {
            ctx.diagnostics.warning(
                codes::UNSUPPORTED_FLAG,
                format!(
                    "member '{}' of enum '{}' cannot be stored as {underlying:?} and was skipped",
                    var.name(),
                    converter.full_name()
                ),
            );
            continue;
        };

        let name = names.claim_reported(
            &or_fallback(var.name(), || format!("Value{}", var.index())),
            &mut ctx.diagnostics,
        );
        let builder = ctx.builder(output);
        let field = builder.add_field(
            token,
            FieldAttributes::PUBLIC | FieldAttributes::STATIC | FieldAttributes::LITERAL,
            &name,
            &SignatureField {
                base: TypeSignature::ValueType(token),
            },
        )?;
        builder.add_constant(field, constant.element_type, &constant.bytes)?;
        attributes::attach_flags(
            ctx,
            output,
            field,
            InteropAttribute::TypeLibVar,
            var.flags().bits(),
        )?;
    }
    Ok(())
}

/// `declared` if every value fits it, otherwise the narrowest wider type that holds them all.
fn underlying_for(declared: &TypeSignature, values: &[i64]) -> TypeSignature {
    if values.iter().all(|value| fits_integral(declared, *value)) {
        return declared.clone();
    }
    [
        TypeSignature::I4,
        TypeSignature::U4,
        TypeSignature::I8,
        TypeSignature::U8,
    ]
    .into_iter()
    .find(|candidate| values.iter().all(|value| fits_integral(candidate, *value)))
    .unwrap_or(TypeSignature::I8)
}
