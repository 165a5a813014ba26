//! COM type library import.
//!
//! [`Importer`] turns a [`TypeLib`] into one or more metadata-only assemblies: the primary
//! assembly for the library itself and one sibling assembly per dependent library that is not
//! covered by a reference assembly.
//!
//! # Architecture
//!
//! Every source type gets a converter in the [`symbols::SymbolTable`]. Registration fixes its
//! managed name and reserves its `TypeDef`, so any type can be referenced before it is
//! emitted. The driver then runs two phases:
//!
//! - **define**, in registration order: flags, base type, interfaces and type-level
//!   attributes. Defining a type may register more types (dependencies, referenced libraries),
//!   which are defined next.
//! - **create**, breadth-first over the defined types: members.
//!
//! Problems local to one type are reported as diagnostics and the type is kept with whatever
//! could be emitted; problems that invalidate the run (an unreadable library, a missing
//! dependency) abort it.
//!
//! # Example
//!
//! ```rust,no_run
//! use tlbscope::importer::{options::ImportOptions, Importer};
//!
//! let options = ImportOptions::new().with_namespace("Interop.Shapes");
//! let mut result = Importer::new(options).import_file("shapes.tlb")?;
//! for diagnostic in result.diagnostics.iter() {
//!     eprintln!("{diagnostic}");
//! }
//! result.save_all()?;
//! # Ok::<(), tlbscope::Error>(())
//! ```

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

use crate::{
    metadata::{builder::AssemblyBuilder, identity::AssemblyIdentity},
    typelib::{LibraryIdentity, TypeLib},
    Result,
};

use self::{context::ImportContext, diagnostics::Diagnostics, options::ImportOptions};

pub mod attributes;
pub mod context;
pub mod converter;
pub mod diagnostics;
pub mod events;
pub mod naming;
pub mod options;
pub mod resolver;
pub mod symbols;
pub mod typemap;

/// Entry point of an import run.
#[derive(Debug, Default)]
pub struct Importer {
    options: ImportOptions,
    provided: Vec<TypeLib>,
}

impl Importer {
    /// An importer with `options`.
    #[must_use]
    pub fn new(options: ImportOptions) -> Self {
        Importer {
            options,
            provided: Vec::new(),
        }
    }

    /// Make `library` available as a dependency without looking for it on disk.
    #[must_use]
    pub fn with_library(mut self, library: TypeLib) -> Self {
        self.provided.push(library);
        self
    }

    /// Open the type library at `path` and import it.
    ///
    /// # Errors
    /// Returns an error if the library cannot be read, see [`Importer::import`].
    pub fn import_file(self, path: impl AsRef<Path>) -> Result<ImportResult> {
        let library = TypeLib::open(path, self.options.open_flags)?;
        self.import(library)
    }

    /// Import `library` and every library it depends on.
    ///
    /// # Errors
    /// Returns an error if the signing key or a reference assembly cannot be read, or if a
    /// dependency cannot be found.
    pub fn import(self, library: TypeLib) -> Result<ImportResult> {
        let mut ctx = ImportContext::new(self.options)?;
        for dependency in self.provided {
            ctx.resolver.provide(dependency);
        }

        let primary = ctx.resolver.add_library(library);
        ctx.import_library(primary)?;
        drive(&mut ctx)?;

        log::info!(
            "imported {} types into {} assemblies, {} diagnostics",
            ctx.symbols.len(),
            ctx.outputs.len(),
            ctx.diagnostics.count()
        );
        ImportResult::from_context(ctx)
    }
}

/// Define every registered type, then create them in the order they were defined.
fn drive(ctx: &mut ImportContext) -> Result<()> {
    let mut to_create = VecDeque::new();
    loop {
        while let Some(id) = ctx.symbols.next_added() {
            converter::define(ctx, id)?;
            to_create.push_back(id);
        }
        let Some(id) = to_create.pop_front() else {
            break;
        };
        converter::create(ctx, id)?;
    }
    Ok(())
}

/// One assembly produced by an import.
#[derive(Debug)]
pub struct ImportedAssembly {
    /// Assembly name, version and public key
    pub identity: AssemblyIdentity,
    /// The type library the assembly was imported from
    pub library: LibraryIdentity,
    /// Destination file
    pub path: PathBuf,
    /// `true` for the assembly of the library passed to the importer
    pub primary: bool,
    builder: AssemblyBuilder,
}

impl ImportedAssembly {
    /// The serialized PE image.
    ///
    /// # Errors
    /// Returns an error if the metadata cannot be laid out.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.builder.to_bytes()
    }

    /// Write the image to [`ImportedAssembly::path`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be written or was already saved.
    pub fn save(&mut self) -> Result<()> {
        let path = self.path.clone();
        self.builder.save(path)
    }

    /// Write the image to `path` instead of the planned destination.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written or was already saved.
    pub fn save_to(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        self.builder.save(&path)?;
        self.path = path;
        Ok(())
    }

    /// The builder holding the assembly's tables.
    #[must_use]
    pub fn builder(&self) -> &AssemblyBuilder {
        &self.builder
    }
}

/// The assemblies and diagnostics of a finished import.
#[derive(Debug)]
pub struct ImportResult {
    /// Produced assemblies, the primary one first
    pub assemblies: Vec<ImportedAssembly>,
    /// Everything reported during the run
    pub diagnostics: Diagnostics,
}

impl ImportResult {
    fn from_context(ctx: ImportContext) -> Result<ImportResult> {
        let libraries = ctx
            .outputs
            .iter()
            .map(|output| ctx.library(output.library).map(|lib| lib.identity()))
            .collect::<Result<Vec<LibraryIdentity>>>()?;

        let assemblies = ctx
            .outputs
            .into_iter()
            .zip(libraries)
            .enumerate()
            .map(|(position, (output, library))| ImportedAssembly {
                identity: output.identity,
                library,
                path: output.path,
                primary: position == 0,
                builder: output.builder,
            })
            .collect();

        Ok(ImportResult {
            assemblies,
            diagnostics: ctx.diagnostics,
        })
    }

    /// The assembly of the imported library.
    #[must_use]
    pub fn primary(&self) -> Option<&ImportedAssembly> {
        self.assemblies.iter().find(|assembly| assembly.primary)
    }

    /// The assembly named `name`, compared case-insensitively.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ImportedAssembly> {
        self.assemblies
            .iter()
            .find(|assembly| assembly.identity.name.eq_ignore_ascii_case(name))
    }

    /// Write every assembly to its destination and return the written paths.
    ///
    /// # Errors
    /// Returns the first write error; assemblies written before it stay on disk.
    pub fn save_all(&mut self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.assemblies.len());
        for assembly in &mut self.assemblies {
            assembly.save()?;
            written.push(assembly.path.clone());
        }
        Ok(written)
    }
}
