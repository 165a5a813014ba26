//! Aliases have no managed type; references to them resolve to their target. Defining one only
//! validates the chain so a cycle is reported against the alias itself.

use crate::{
    importer::{
        context::ImportContext,
        typemap::{project, Usage},
    },
    typelib::TypeInfo,
    Result,
};

/// Check that the alias chain starting at `info` ends in a concrete type.
///
/// # Errors
/// Returns [`crate::Error::AliasCycle`] for a chain longer than
/// [`crate::importer::typemap::MAX_ALIAS_DEPTH`], or the resolution error of a dangling target.
pub fn define(ctx: &mut ImportContext, output: usize, info: TypeInfo<'_>) -> Result<()> {
    let Some(target) = info.alias() else {
        return Err(malformed_error!("alias '{}' has no target", info.name()));
    };
    project(ctx, output, info, target, Usage::Field).map(|_| ())
}
