//! Coclasses.
//!
//! A coclass becomes a public class implementing its incoming interfaces. Outgoing (source)
//! interfaces are listed in `ComSourceInterfaces` and turned into events, see
//! [`crate::importer::events`].

use crate::{
    importer::{
        attributes::{self, InteropAttribute, CLASS_INTERFACE_NONE},
        context::{guid_argument, ImportContext, Target, TypeConverter},
        converter::{interface::RUNTIME_IMPL, type_def},
        events,
        resolver::WellKnown,
        symbols::ConverterId,
    },
    metadata::{
        customattributes::CustomAttributeArgument,
        flags::{MethodAttributes, TypeAttributes},
        signatures::{SignatureMethod, SignatureParameter, TypeSignature},
    },
    typelib::{ImplType, ImplTypeFlags, TypeInfo},
    Result,
};

/// Base class, implemented interfaces and attributes.
///
/// # Errors
/// Returns an error if an implemented interface cannot be resolved.
pub fn define(
    ctx: &mut ImportContext,
    output: usize,
    converter: &TypeConverter,
    info: TypeInfo<'_>,
) -> Result<()> {
    let token = type_def(converter)?;
    let base = ctx.framework_type(output, "System", "Object");
    let builder = ctx.builder(output);
    builder.set_type_flags(token, TypeAttributes::PUBLIC)?;
    builder.set_type_extends(token, Some(base))?;

    attributes::attach(ctx, output, token, InteropAttribute::ComImport, Vec::new())?;
    attributes::attach(
        ctx,
        output,
        token,
        InteropAttribute::Guid,
        vec![guid_argument(info.guid())],
    )?;
    attributes::attach(
        ctx,
        output,
        token,
        InteropAttribute::ClassInterface,
        vec![CustomAttributeArgument::I2(CLASS_INTERFACE_NONE)],
    )?;
    attributes::attach_flags(
        ctx,
        output,
        token,
        InteropAttribute::TypeLibType,
        info.flags().bits(),
    )?;
    if ctx.options.unsafe_interfaces {
        attributes::attach(
            ctx,
            output,
            token,
            InteropAttribute::SuppressUnmanagedCodeSecurity,
            Vec::new(),
        )?;
    }

    let mut sources = Vec::new();
    for implemented in info.impl_types() {
        let flags = implemented.flags();
        let target = ctx.resolve(info, implemented.href())?;
        if flags.contains(ImplTypeFlags::SOURCE) {
            if let Target::Converter(id) = target {
                sources.push(ctx.converter(id)?.full_name());
            }
            continue;
        }
        if flags.contains(ImplTypeFlags::RESTRICTED) {
            continue;
        }

        let interface = match target {
            Target::WellKnown(WellKnown::IUnknown | WellKnown::IDispatch | WellKnown::Guid) => {
                continue
            }
            Target::WellKnown(WellKnown::IEnumVariant) => {
                ctx.framework_type(output, "System.Collections", "IEnumerator")
            }
            Target::Converter(id) => ctx.type_token(output, id)?,
        };
        ctx.builder(output).add_interface_impl(token, interface)?;
    }

    if !sources.is_empty() {
        let mut names = sources.join("\0");
        names.push('\0');
        attributes::attach(
            ctx,
            output,
            token,
            InteropAttribute::ComSourceInterfaces,
            vec![CustomAttributeArgument::String(Some(names))],
        )?;
    }
    Ok(())
}

/// The default constructor and the events of the source interfaces.
///
/// # Errors
/// Returns an error if a source interface cannot be projected.
pub fn create(
    ctx: &mut ImportContext,
    output: usize,
    converter: &TypeConverter,
    info: TypeInfo<'_>,
) -> Result<()> {
    let token = type_def(converter)?;
    ctx.builder(output).add_method(
        token,
        MethodAttributes::PUBLIC
            | MethodAttributes::HIDE_BY_SIG
            | MethodAttributes::SPECIAL_NAME
            | MethodAttributes::RT_SPECIAL_NAME,
        RUNTIME_IMPL,
        ".ctor",
        &SignatureMethod {
            has_this: true,
            return_type: SignatureParameter::value(TypeSignature::Void),
            params: Vec::new(),
        },
    )?;

    events::synthesize(ctx, output, converter, info)
}

/// The interface standing for coclass `id` in signatures: the first `[default]` incoming
/// interface, else the first incoming one that is not restricted.
///
/// # Errors
/// Returns an error if the chosen interface cannot be resolved.
pub fn default_interface(ctx: &mut ImportContext, id: ConverterId) -> Result<Option<Target>> {
    let (lib, source) = ctx.source(id)?;
    let info = lib.type_info(source.index)?;
    let implemented: Vec<ImplType<'_>> = info.impl_types().collect();

    let chosen = implemented
        .iter()
        .find(|candidate| {
            candidate.flags().contains(ImplTypeFlags::DEFAULT)
                && !candidate.flags().contains(ImplTypeFlags::SOURCE)
        })
        .or_else(|| {
            implemented.iter().find(|candidate| {
                !candidate
                    .flags()
                    .intersects(ImplTypeFlags::SOURCE | ImplTypeFlags::RESTRICTED)
            })
        });

    match chosen {
        Some(candidate) => Ok(Some(ctx.resolve(info, candidate.href())?)),
        None => Ok(None),
    }
}
