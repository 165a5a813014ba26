//! TLB binding layer.
//!
//! This module exposes the contents of a COM type library as a [`TypeLib`] value plus a family
//! of borrowed views ([`TypeInfo`], [`FuncDesc`], [`VarDesc`], [`ElemDesc`], [`ImplType`]).
//! Decoding copies every descriptor out of the source image into owned records, so:
//!
//! - the file mapping is released as soon as [`TypeLib::open`] returns,
//! - a view borrows the library (or the parent view's data) and cannot outlive it, which is the
//!   Rust rendition of "a nested descriptor extends the lifetime of its parent",
//! - dropping the [`TypeLib`] releases everything exactly once.
//!
//! # Sources
//!
//! - [`TypeLib::open`] / [`TypeLib::from_bytes`] decode MSFT images (see [`msft`])
//! - [`builder::TypeLibBuilder`] assembles a library in memory
//!
//! # Examples
//!
//! ```rust,no_run
//! use tlbscope::typelib::{OpenFlags, TypeLib};
//!
//! let lib = TypeLib::open("shapes.tlb", OpenFlags::empty())?;
//! for info in lib.types() {
//!     println!("{} ({})", info.name(), info.kind());
//!     for func in info.functions() {
//!         println!("  {} with {} params", func.name(), func.param_count());
//!     }
//! }
//! # Ok::<(), tlbscope::Error>(())
//! ```
//!
//! # Errors
//!
//! All failures are returned as [`crate::Error`] values that carry the library path or name
//! and, where the OLE Automation API defines one, the matching [`status`] code.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use bitflags::bitflags;
use uguid::Guid;

pub mod builder;
pub mod desc;
pub mod msft;
pub mod types;
pub mod value;
mod view;

pub use builder::{FuncBuilder, TypeInfoBuilder, TypeLibBuilder, VarBuilder};
pub use desc::{
    ArrayBound, ArrayDesc, CustomData, EntryPoint, ExternalRef, ExternalTarget, HRefType,
    ImportedLib, LibAttr, LibraryIdentity, TypeDesc, TypeInfoData,
};
pub use types::{
    CallConv, FuncFlags, FuncKind, ImplTypeFlags, InvokeKind, LibFlags, ParamFlags, SysKind,
    TypeFlags, TypeKind, VarFlags, VarKind, VarType,
};
pub use value::Variant;
pub use view::{ElemDesc, FuncDesc, ImplType, RefTarget, TypeAttr, TypeInfo, VarDesc};

use crate::{file::Physical, Error, Result};

/// Status codes of the OLE Automation typelib API carried by binding-layer errors.
pub mod status {
    /// The file could not be found
    pub const STG_E_FILENOTFOUND: u32 = 0x8003_0002;
    /// Error reading the library data
    pub const TYPE_E_INVDATAREAD: u32 = 0x8002_8018;
    /// The library has an unsupported format
    pub const TYPE_E_UNSUPFORMAT: u32 = 0x8002_8019;
    /// The library is not registered
    pub const TYPE_E_LIBNOTREGISTERED: u32 = 0x8002_801D;
    /// The requested element was not found
    pub const TYPE_E_ELEMENTNOTFOUND: u32 = 0x8002_802B;
    /// The library could not be loaded
    pub const TYPE_E_CANTLOADLIBRARY: u32 = 0x8002_9C4A;
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    /// Options for [`TypeLib::open`].
    pub struct OpenFlags: u32 {
        /// Register the library after loading; accepted but not performed on this platform
        const REGISTER = 0x0001;
        /// Require a library compiled for 32-bit Windows
        const LOAD_AS_32_BIT = 0x0002;
        /// Require a library compiled for 64-bit Windows
        const LOAD_AS_64_BIT = 0x0004;
    }
}

/// A decoded COM type library.
#[derive(Debug, Clone)]
pub struct TypeLib {
    pub(crate) name: String,
    pub(crate) doc: Option<String>,
    pub(crate) help_file: Option<String>,
    pub(crate) attr: LibAttr,
    pub(crate) path: Option<PathBuf>,
    pub(crate) types: Vec<TypeInfoData>,
    pub(crate) imports: Vec<ImportedLib>,
    pub(crate) external_refs: HashMap<HRefType, ExternalRef>,
    pub(crate) custom: Vec<CustomData>,
}

impl TypeLib {
    /// Load the type library stored at `path`.
    ///
    /// # Errors
    /// - [`Error::NotFound`] if the file does not exist
    /// - [`Error::BadFormat`] if it is not an MSFT type library
    /// - [`Error::PlatformMismatch`] if `flags` request a platform the library was not built for
    /// - [`Error::Malformed`] for structural damage inside the image
    pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> Result<TypeLib> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::NotFound {
                path: path.display().to_string(),
            });
        }

        let mapping = Physical::new(path)?;
        let mut lib = msft::parse(mapping.data(), &path.display().to_string())?;
        drop(mapping);

        lib.path = Some(path.to_path_buf());
        lib.check_platform(flags)?;
        if flags.contains(OpenFlags::REGISTER) {
            log::info!("registration of '{}' skipped, no registry available", lib.name);
        }

        log::debug!(
            "loaded type library '{}' {} with {} types",
            lib.name,
            lib.identity(),
            lib.types.len()
        );
        Ok(lib)
    }

    /// Decode a type library image held in memory.
    ///
    /// # Errors
    /// Same as [`TypeLib::open`], minus [`Error::NotFound`].
    pub fn from_bytes(data: &[u8], flags: OpenFlags) -> Result<TypeLib> {
        let lib = msft::parse(data, "<memory>")?;
        lib.check_platform(flags)?;
        Ok(lib)
    }

    fn check_platform(&self, flags: OpenFlags) -> Result<()> {
        let expected = if flags.contains(OpenFlags::LOAD_AS_64_BIT) {
            SysKind::Win64
        } else if flags.contains(OpenFlags::LOAD_AS_32_BIT) {
            SysKind::Win32
        } else {
            return Ok(());
        };

        if self.attr.syskind == expected {
            return Ok(());
        }

        Err(Error::PlatformMismatch {
            path: self.display_path(),
            expected: expected.to_string(),
            found: self.attr.syskind.to_string(),
        })
    }

    /// The path this library was loaded from, or its name for in-memory libraries.
    #[must_use]
    pub fn display_path(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => self.name.clone(),
        }
    }

    /// Library name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Library help string.
    #[must_use]
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Help file name.
    #[must_use]
    pub fn help_file(&self) -> Option<&str> {
        self.help_file.as_deref()
    }

    /// Source path, `None` for libraries built or decoded in memory.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The library descriptor.
    #[must_use]
    pub fn attributes(&self) -> LibAttr {
        self.attr.clone()
    }

    /// `(GUID, major, minor, LCID)` of this library.
    #[must_use]
    pub fn identity(&self) -> LibraryIdentity {
        self.attr.identity()
    }

    /// Number of types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// All types in index order. Each call starts a fresh iteration.
    pub fn types(&self) -> impl Iterator<Item = TypeInfo<'_>> + '_ {
        self.types
            .iter()
            .enumerate()
            .map(move |(index, data)| TypeInfo::new(self, index as u32, data))
    }

    /// The type at `index`.
    ///
    /// # Errors
    /// Returns [`Error::RefNotFound`] with `TYPE_E_ELEMENTNOTFOUND` if no such type exists.
    pub fn type_info(&self, index: u32) -> Result<TypeInfo<'_>> {
        match self.types.get(index as usize) {
            Some(data) => Ok(TypeInfo::new(self, index, data)),
            None => Err(Error::RefNotFound {
                library: self.name.clone(),
                href: HRefType::local(index).0,
                status: status::TYPE_E_ELEMENTNOTFOUND,
            }),
        }
    }

    /// Find a type by its GUID.
    #[must_use]
    pub fn find_by_guid(&self, guid: Guid) -> Option<TypeInfo<'_>> {
        if guid == Guid::ZERO {
            return None;
        }

        self.types().find(|info| info.guid() == guid)
    }

    /// Find a type by name, case-sensitively.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<TypeInfo<'_>> {
        self.types().find(|info| info.name() == name)
    }

    /// Libraries this library imports types from.
    #[must_use]
    pub fn imports(&self) -> &[ImportedLib] {
        &self.imports
    }

    /// The cross-library reference behind `href`, if it designates one.
    #[must_use]
    pub fn external_ref(&self, href: HRefType) -> Option<&ExternalRef> {
        self.external_refs.get(&href)
    }

    /// Library-level custom data.
    #[must_use]
    pub fn custom_data(&self) -> &[CustomData] {
        &self.custom
    }
}

#[cfg(test)]
mod tests {
    use uguid::guid;

    use super::*;

    fn sample() -> TypeLib {
        let mut builder = TypeLibBuilder::new("Sample", guid!("6a8a6a18-5c1b-4e0a-9a55-1f0e27c6a001"))
            .syskind(SysKind::Win32);
        builder.add_type(
            TypeInfoBuilder::new("Color", TypeKind::Enum)
                .guid(guid!("6a8a6a18-5c1b-4e0a-9a55-1f0e27c6a002")),
        );
        builder.add_type(TypeInfoBuilder::new("IShape", TypeKind::Interface));
        builder.build()
    }

    #[test]
    fn enumeration_is_restartable() {
        let lib = sample();
        let first: Vec<_> = lib.types().map(|t| t.name().to_string()).collect();
        let second: Vec<_> = lib.types().map(|t| t.name().to_string()).collect();
        assert_eq!(first, ["Color", "IShape"]);
        assert_eq!(first, second);
    }

    #[test]
    fn lookups() {
        let lib = sample();
        assert_eq!(
            lib.find_by_guid(guid!("6a8a6a18-5c1b-4e0a-9a55-1f0e27c6a002"))
                .map(|t| t.index()),
            Some(0)
        );
        assert!(lib.find_by_guid(Guid::ZERO).is_none());
        assert_eq!(lib.find_by_name("IShape").map(|t| t.index()), Some(1));

        match lib.type_info(7) {
            Err(Error::RefNotFound { status: code, .. }) => {
                assert_eq!(code, status::TYPE_E_ELEMENTNOTFOUND)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn platform_check() {
        let lib = sample();
        assert!(lib.check_platform(OpenFlags::empty()).is_ok());
        assert!(lib.check_platform(OpenFlags::LOAD_AS_32_BIT).is_ok());
        assert!(matches!(
            lib.check_platform(OpenFlags::LOAD_AS_64_BIT),
            Err(Error::PlatformMismatch { .. })
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        assert!(matches!(
            TypeLib::open("/nowhere/missing.tlb", OpenFlags::empty()),
            Err(Error::NotFound { .. })
        ));
    }
}
