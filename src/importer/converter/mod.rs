//! Per-kind converters.
//!
//! Every source type goes through two phases after registration. `define` emits what other
//! types may depend on: flags, base type, implemented interfaces and type-level attributes.
//! `create` emits the members. A failure in either phase is reported against the type, which
//! stays in the output with whatever was emitted; only errors that make the whole run
//! meaningless (an unreadable library, a missing dependency) abort the import.

use crate::{
    importer::{
        context::{ConverterState, Home, ImportContext, TypeConverter},
        diagnostics::codes,
        naming::{or_fallback, UNNAMED},
        symbols::ConverterId,
    },
    metadata::token::Token,
    typelib::{TypeInfo, TypeKind},
    Error, Result,
};

pub mod alias;
pub mod coclass;
pub mod enums;
pub mod interface;
pub mod method;
pub mod module;
pub mod records;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Define,
    Create,
}

/// Run the define phase of `id` if it is still registered.
///
/// # Errors
/// Returns only errors that abort the whole import.
pub fn define(ctx: &mut ImportContext, id: ConverterId) -> Result<()> {
    run(ctx, id, Phase::Define)
}

/// Run the create phase of `id` if it is defined.
///
/// # Errors
/// Returns only errors that abort the whole import.
pub fn create(ctx: &mut ImportContext, id: ConverterId) -> Result<()> {
    run(ctx, id, Phase::Create)
}

fn run(ctx: &mut ImportContext, id: ConverterId, phase: Phase) -> Result<()> {
    let converter = ctx.converter(id)?.clone();
    let expected = match phase {
        Phase::Define => ConverterState::Registered,
        Phase::Create => ConverterState::Defined,
    };
    if converter.state != expected {
        return Ok(());
    }
    let (Some(source), Home::Output(output)) = (converter.source, converter.home) else {
        return Ok(());
    };

    let lib = ctx.library(source.library)?;
    let info = lib.type_info(source.index)?;
    log::trace!("{phase:?} {}", converter.full_name());

    let result = match (phase, source.kind) {
        (Phase::Define, TypeKind::Enum) => enums::define(ctx, output, &converter),
        (Phase::Define, TypeKind::Record | TypeKind::Union) => {
            records::define(ctx, output, &converter, info)
        }
        (Phase::Define, TypeKind::Module) => module::define(ctx, output, &converter),
        (Phase::Define, TypeKind::Interface | TypeKind::Dispatch) => {
            interface::define(ctx, output, &converter, info)
        }
        (Phase::Define, TypeKind::CoClass) => coclass::define(ctx, output, &converter, info),
        (Phase::Define, TypeKind::Alias) => alias::define(ctx, output, info),
        (Phase::Create, TypeKind::Enum) => enums::create(ctx, output, &converter, info),
        (Phase::Create, TypeKind::Record | TypeKind::Union) => {
            records::create(ctx, output, &converter, info)
        }
        (Phase::Create, TypeKind::Module) => module::create(ctx, output, &converter, info),
        (Phase::Create, TypeKind::Interface | TypeKind::Dispatch) => {
            interface::create(ctx, output, &converter, info)
        }
        (Phase::Create, TypeKind::CoClass) => coclass::create(ctx, output, &converter, info),
        (Phase::Create, TypeKind::Alias) => Ok(()),
    };

    let state = match result {
        Ok(()) => match phase {
            Phase::Define => ConverterState::Defined,
            Phase::Create => ConverterState::Created,
        },
        Err(error) if is_fatal(&error) => return Err(error),
        Err(error) => {
            report_failure(ctx, info, &error);
            ConverterState::FailedButEmitted
        }
    };
    ctx.converter_mut(id)?.state = state;
    Ok(())
}

fn is_fatal(error: &Error) -> bool {
    matches!(
        error,
        Error::MissingDependency { .. }
            | Error::NotFound { .. }
            | Error::BadFormat { .. }
            | Error::PlatformMismatch { .. }
            | Error::FileError(_)
            | Error::InvalidKey(_)
    )
}

fn report_failure(ctx: &mut ImportContext, info: TypeInfo<'_>, error: &Error) {
    let code = match error {
        Error::AliasCycle(_) => codes::ALIAS_CYCLE,
        Error::RefNotFound { .. } => codes::REFERENCE_UNRESOLVED,
        _ => codes::DESCRIPTOR_UNREADABLE,
    };
    ctx.diagnostics.warning(
        code,
        format!(
            "type '{}' emitted partially: {error}",
            or_fallback(info.name(), || UNNAMED.into())
        ),
    );
}

/// The reserved `TypeDef` of `converter`.
///
/// # Errors
/// Returns an error for converters without a type definition.
pub fn type_def(converter: &TypeConverter) -> Result<Token> {
    converter
        .token
        .ok_or_else(|| malformed_error!("'{}' has no type definition", converter.full_name()))
}
