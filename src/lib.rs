// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' and 'file/output.rs' use mmap for input and output files

//! # tlbscope
//!
//! A cross-platform COM type library importer. `tlbscope` reads MSFT type libraries (`.tlb`)
//! and writes metadata-only ECMA-335 assemblies describing the same types, without requiring
//! Windows, the COM runtime or the .NET SDK.
//!
//! ## Features
//!
//! - **Type library decoding** - MSFT images from files or memory, with imports and custom data
//! - **In-memory libraries** - [`typelib::TypeLibBuilder`] builds libraries without a compiler
//! - **Full conversion** - interfaces, dispinterfaces, coclasses with events, enums, records,
//!   unions, modules and aliases
//! - **Dependency handling** - referenced libraries are satisfied from reference assemblies or
//!   imported alongside the primary assembly
//! - **Metadata emission** - a PE32 image with `#~`, `#Strings`, `#US`, `#GUID` and `#Blob`
//!   streams, optionally carrying a strong-name public key
//! - **Diagnostics** - every conversion decision that loses or alters information is reported
//!   with a stable numeric code
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tlbscope::prelude::*;
//!
//! let options = ImportOptions::new().with_namespace("Interop.Shapes");
//! let mut result = Importer::new(options).import_file("shapes.tlb")?;
//! for diagnostic in result.diagnostics.iter() {
//!     println!("{diagnostic}");
//! }
//! for path in result.save_all()? {
//!     println!("wrote {}", path.display());
//! }
//! # Ok::<(), tlbscope::Error>(())
//! ```
//!
//! ### Building a library in memory
//!
//! ```rust
//! use tlbscope::prelude::*;
//! use uguid::guid;
//!
//! let mut builder = TypeLibBuilder::new("Shapes", guid!("5d4c8e90-2a11-4b7e-9c1e-0a1b2c3d4e5f"));
//! builder.add_type(
//!     TypeInfoBuilder::new("Color", TypeKind::Enum)
//!         .constant("Red", Variant::I4(0))
//!         .constant("Green", Variant::I4(1)),
//! );
//!
//! let result = Importer::default().import(builder.build())?;
//! let image = AssemblyImage::from_bytes(result.assemblies[0].to_bytes()?)?;
//! assert!(image.find_type("Shapes", "Color")?.is_some());
//! # Ok::<(), tlbscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`typelib`] - the source side: MSFT decoding, the type library model and its builder
//! - [`importer`] - conversion of type library types into metadata
//! - [`metadata`] - the target side: tables, heaps, signatures, the assembly builder, the PE
//!   writer and a reader used to consume reference assemblies
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result`]. Problems that invalidate a whole run (an unreadable
//! library, a missing dependency) are [`Error`] values; problems local to a single type or
//! member are collected as diagnostics on the [`importer::ImportResult`] and the run goes on.
#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use tlbscope::prelude::*;
///
/// let lib = TypeLib::open("shapes.tlb", OpenFlags::empty())?;
/// let result = Importer::new(ImportOptions::new()).import(lib)?;
/// println!("{} assemblies", result.assemblies.len());
/// # Ok::<(), tlbscope::Error>(())
/// ```
pub mod prelude;

/// Type libraries: the MSFT decoder, the library model and [`typelib::TypeLibBuilder`].
///
/// # Examples
///
/// ```rust,no_run
/// use tlbscope::typelib::{OpenFlags, TypeLib};
///
/// let lib = TypeLib::open("stdole2.tlb", OpenFlags::empty())?;
/// for info in lib.types() {
///     println!("{:?} {}", info.kind(), info.name());
/// }
/// # Ok::<(), tlbscope::Error>(())
/// ```
pub mod typelib;

/// Definitions, emission and reading of CIL metadata based on ECMA-335
///
/// The emission side centres on [`metadata::builder::AssemblyBuilder`], which accumulates rows
/// for every table the importer produces and serializes them through [`metadata::writer`].
/// [`metadata::reader::AssemblyImage`] reads such images back, which is how reference
/// assemblies are consulted and how emitted output is verified.
pub mod metadata;

/// Conversion of type libraries into assemblies.
///
/// See [`importer::Importer`] for the entry point and [`importer::options::ImportOptions`] for
/// the settings of a run.
pub mod importer;

/// `tlbscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `tlbscope` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust,no_run
/// use tlbscope::{Error, Importer};
///
/// match Importer::default().import_file("shapes.tlb") {
///     Ok(result) => println!("{} assemblies", result.assemblies.len()),
///     Err(Error::MissingDependency { library, needed_by }) => {
///         eprintln!("{needed_by} needs {library}")
///     }
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
pub use error::Error;

/// Entry point of an import run and its results.
pub use importer::{options::ImportOptions, ImportResult, Importer};

/// The source type library and its in-memory builder.
pub use typelib::{TypeLib, TypeLibBuilder};

/// Low-level byte access used by the decoders.
///
/// # Example
///
/// ```rust
/// use tlbscope::Parser;
///
/// let mut parser = Parser::new(&[0x4D, 0x53, 0x46, 0x54]);
/// assert_eq!(parser.read_le::<u32>()?, 0x5446_534D);
/// # Ok::<(), tlbscope::Error>(())
/// ```
pub use file::Parser;
