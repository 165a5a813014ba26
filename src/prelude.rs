//! # tlbscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from the
//! tlbscope library. Import this module to get quick access to everything needed to read a
//! type library, import it and inspect the result.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all tlbscope operations
pub use crate::Error;

/// The result type used throughout tlbscope
pub use crate::Result;

// ================================================================================================
// Import
// ================================================================================================

/// Entry point of an import run and its results
pub use crate::importer::{ImportResult, ImportedAssembly, Importer};

/// Settings of an import run
pub use crate::importer::options::{CArrayPolicy, ImportOptions, Transforms};

/// Diagnostics collected during an import
pub use crate::importer::diagnostics::{codes, Diagnostic, Diagnostics, Severity};

/// Reference assemblies consulted before importing a dependency
pub use crate::importer::resolver::ReferenceAssembly;

// ================================================================================================
// Type Libraries
// ================================================================================================

/// The type library model and its views
pub use crate::typelib::{
    FuncDesc, ImplType, OpenFlags, TypeAttr, TypeDesc, TypeInfo, TypeLib, VarDesc, Variant,
};

/// In-memory construction of type libraries
pub use crate::typelib::{FuncBuilder, TypeInfoBuilder, TypeLibBuilder, VarBuilder};

/// Type library enumerations and flag sets
pub use crate::typelib::{
    CallConv, FuncFlags, FuncKind, HRefType, ImplTypeFlags, InvokeKind, ParamFlags, SysKind,
    TypeFlags, TypeKind, VarFlags, VarKind, VarType,
};

// ================================================================================================
// Metadata
// ================================================================================================

/// Assembly construction and reading
pub use crate::metadata::{builder::AssemblyBuilder, reader::AssemblyImage};

/// Assembly identity
pub use crate::metadata::identity::{AssemblyIdentity, AssemblyVersion};

/// Metadata tokens
pub use crate::metadata::token::Token;
