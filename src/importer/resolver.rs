//! Locating type libraries and previously imported assemblies.
//!
//! The [`Resolver`] owns every type library of a run. Libraries are loaded on demand when a
//! cross-library reference needs them and are identified by [`LibraryIdentity`]. Reference
//! assemblies are decoded once up front; their types are matched by type GUID before the
//! importer considers importing a dependency again.
//!
//! A handful of `stdole` types have a fixed managed projection and are never imported; see
//! [`WellKnown`].

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    rc::Rc,
};

use uguid::{guid, Guid};

use crate::{
    importer::context::ManagedKind,
    metadata::{
        customattributes::CustomAttributeArgument,
        flags::TypeAttributes,
        identity::AssemblyIdentity,
        reader::AssemblyImage,
        tables::TableId,
        token::Token,
    },
    typelib::{ImportedLib, LibraryIdentity, OpenFlags, TypeLib},
    Error, Result,
};

/// `LIBID` of the OLE Automation library.
pub const STDOLE_LIBID: Guid = guid!("00020430-0000-0000-C000-000000000046");

const IID_IUNKNOWN: Guid = guid!("00000000-0000-0000-C000-000000000046");
const IID_IDISPATCH: Guid = guid!("00020400-0000-0000-C000-000000000046");
const IID_IENUMVARIANT: Guid = guid!("00020404-0000-0000-C000-000000000046");

/// `stdole` types with a fixed managed projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnown {
    /// `IUnknown`, projected to `object`
    IUnknown,
    /// `IDispatch`, projected to `object`
    IDispatch,
    /// `IEnumVARIANT`, projected to `System.Collections.IEnumerator`
    IEnumVariant,
    /// The `GUID` record, projected to `System.Guid`
    Guid,
}

impl WellKnown {
    /// The well-known interface with `iid`.
    #[must_use]
    pub fn by_guid(iid: Guid) -> Option<WellKnown> {
        match iid {
            IID_IUNKNOWN => Some(WellKnown::IUnknown),
            IID_IDISPATCH => Some(WellKnown::IDispatch),
            IID_IENUMVARIANT => Some(WellKnown::IEnumVariant),
            _ => None,
        }
    }

    /// The well-known type `name` of the library `library`; only `stdole` qualifies.
    #[must_use]
    pub fn by_name(library: &LibraryIdentity, name: &str) -> Option<WellKnown> {
        if library.guid != STDOLE_LIBID {
            return None;
        }
        match name {
            "IUnknown" => Some(WellKnown::IUnknown),
            "IDispatch" => Some(WellKnown::IDispatch),
            "IEnumVARIANT" => Some(WellKnown::IEnumVariant),
            "GUID" => Some(WellKnown::Guid),
            _ => None,
        }
    }

    /// Framework namespace and name of the projection, `None` for `object`.
    #[must_use]
    pub fn framework_type(self) -> Option<(&'static str, &'static str)> {
        match self {
            WellKnown::IUnknown | WellKnown::IDispatch => None,
            WellKnown::IEnumVariant => Some(("System.Collections", "IEnumerator")),
            WellKnown::Guid => Some(("System", "Guid")),
        }
    }
}

/// A type exported by a reference assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceType {
    /// Namespace
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// What the type is
    pub managed: ManagedKind,
}

/// A previously imported assembly consulted before importing a dependency.
#[derive(Debug, Clone)]
pub struct ReferenceAssembly {
    /// Assembly name
    pub identity: AssemblyIdentity,
    /// `LIBID` of the type library the assembly was imported from
    pub library: Guid,
    /// Major version of that library
    pub major: u16,
    /// Minor version of that library
    pub minor: u16,
    /// Types by their `Guid` attribute
    pub types: HashMap<Guid, ReferenceType>,
    /// Types without a `Guid` attribute, such as records and modules
    pub unattributed: Vec<ReferenceType>,
}

impl ReferenceAssembly {
    /// Decode the assembly at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or lacks the `Guid` and `TypeLibVersion`
    /// assembly attributes that mark an imported assembly.
    pub fn load(path: impl AsRef<Path>) -> Result<ReferenceAssembly> {
        let path = path.as_ref();
        Self::from_image(&AssemblyImage::from_file(path)?, &path.display().to_string())
    }

    /// Decode an assembly image held in memory; `origin` names it in errors.
    ///
    /// # Errors
    /// Same as [`ReferenceAssembly::load`].
    pub fn from_image(image: &AssemblyImage, origin: &str) -> Result<ReferenceAssembly> {
        let Some(identity) = image.identity()? else {
            return Err(malformed_error!("{} has no assembly manifest", origin));
        };

        let assembly = Token::from_parts(TableId::Assembly, 1);
        let library = image
            .find_attribute(assembly, "System.Runtime.InteropServices", "GuidAttribute")?
            .and_then(|attribute| attribute.string_argument())
            .and_then(|text| Guid::try_parse(&text).ok())
            .ok_or_else(|| malformed_error!("{} carries no library Guid attribute", origin))?;

        let (major, minor) = match image.find_attribute(
            assembly,
            "System.Runtime.InteropServices",
            "TypeLibVersionAttribute",
        )? {
            Some(attribute) => {
                let value = attribute.parse_value()?;
                match value.fixed_args.as_slice() {
                    [CustomAttributeArgument::I4(major), CustomAttributeArgument::I4(minor)] => {
                        (u16::try_from(*major).unwrap_or(0), u16::try_from(*minor).unwrap_or(0))
                    }
                    _ => return Err(malformed_error!("{} has a bad TypeLibVersion", origin)),
                }
            }
            None => (identity.version.major, identity.version.minor),
        };

        let mut types = HashMap::new();
        let mut unattributed = Vec::new();
        for ty in image.type_defs()? {
            if ty.name == "<Module>" {
                continue;
            }
            let guid = image
                .find_attribute(ty.token, "System.Runtime.InteropServices", "GuidAttribute")?
                .and_then(|attribute| attribute.string_argument())
                .and_then(|text| Guid::try_parse(&text).ok());

            let managed = if ty.flags & TypeAttributes::INTERFACE != 0 {
                ManagedKind::Interface
            } else {
                match image.type_name(ty.extends).unwrap_or_default() {
                    (ns, name) if ns == "System" && name == "Enum" => ManagedKind::Enum,
                    (ns, name) if ns == "System" && name == "ValueType" => ManagedKind::Struct,
                    _ => ManagedKind::Class,
                }
            };

            let exported = ReferenceType {
                namespace: ty.namespace.clone(),
                name: ty.name.clone(),
                managed,
            };
            match guid {
                Some(guid) => {
                    types.insert(guid, exported);
                }
                None => unattributed.push(exported),
            }
        }

        log::debug!(
            "reference assembly '{}' covers library {{{}}} {}.{} with {} types",
            identity.name,
            library,
            major,
            minor,
            types.len() + unattributed.len()
        );

        Ok(ReferenceAssembly {
            identity,
            library,
            major,
            minor,
            types,
            unattributed,
        })
    }

    /// Identity of the library the assembly was imported from.
    #[must_use]
    pub fn library_identity(&self) -> LibraryIdentity {
        LibraryIdentity {
            guid: self.library,
            major: self.major,
            minor: self.minor,
            lcid: 0,
        }
    }

    /// The exported type whose simple name is `name`, preferring one without a `Guid`.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&ReferenceType> {
        self.unattributed
            .iter()
            .chain(self.types.values())
            .find(|ty| ty.name == name)
    }

    /// `true` if this assembly was imported from `library`.
    #[must_use]
    pub fn covers(&self, library: &LibraryIdentity) -> bool {
        self.library == library.guid && self.major == library.major && self.minor == library.minor
    }
}

/// The libraries and reference assemblies of one run.
#[derive(Debug, Default)]
pub struct Resolver {
    libraries: Vec<Rc<TypeLib>>,
    loaded: HashMap<LibraryIdentity, usize>,
    provided: Vec<TypeLib>,
    references: Vec<ReferenceAssembly>,
    search_paths: Vec<PathBuf>,
    open_flags: OpenFlags,
}

impl Resolver {
    /// A resolver searching `search_paths` and opening libraries with `open_flags`.
    #[must_use]
    pub fn new(search_paths: Vec<PathBuf>, open_flags: OpenFlags) -> Self {
        Resolver {
            search_paths,
            open_flags,
            ..Resolver::default()
        }
    }

    /// Offer an in-memory library to satisfy dependencies before the file system is searched.
    pub fn provide(&mut self, library: TypeLib) {
        self.provided.push(library);
    }

    /// Consult `reference` before importing dependencies.
    pub fn add_reference(&mut self, reference: ReferenceAssembly) -> usize {
        self.references.push(reference);
        self.references.len() - 1
    }

    /// Take ownership of `library`; a library with the same identity that is already loaded is
    /// kept instead.
    pub fn add_library(&mut self, library: TypeLib) -> usize {
        let identity = library.identity();
        if let Some(index) = self.loaded.get(&identity) {
            return *index;
        }
        self.libraries.push(Rc::new(library));
        let index = self.libraries.len() - 1;
        self.loaded.insert(identity, index);
        index
    }

    /// The library at `index`.
    ///
    /// # Errors
    /// Returns an error for an index not handed out by this resolver.
    pub fn library(&self, index: usize) -> Result<Rc<TypeLib>> {
        self.libraries
            .get(index)
            .cloned()
            .ok_or_else(|| malformed_error!("library index {} out of range", index))
    }

    /// The index of the loaded library with `identity`.
    #[must_use]
    pub fn index_of(&self, identity: &LibraryIdentity) -> Option<usize> {
        self.loaded.get(identity).copied()
    }

    /// The reference assembly at `index`.
    ///
    /// # Errors
    /// Returns an error for an index not handed out by this resolver.
    pub fn reference(&self, index: usize) -> Result<&ReferenceAssembly> {
        self.references
            .get(index)
            .ok_or_else(|| malformed_error!("reference index {} out of range", index))
    }

    /// The reference assembly imported from `library`.
    #[must_use]
    pub fn find_reference(&self, library: &LibraryIdentity) -> Option<usize> {
        self.references
            .iter()
            .position(|reference| reference.covers(library))
    }

    /// Find and load the library `imported` names, on behalf of `needed_by`.
    ///
    /// Candidates are tried in order: libraries already loaded, libraries provided in memory,
    /// the directory of `needed_by`, then every search path. A candidate file whose `LIBID`
    /// differs is skipped.
    ///
    /// # Errors
    /// Returns [`Error::MissingDependency`] if no candidate matches, or the error of a
    /// matching library that fails to decode.
    pub fn locate(&mut self, imported: &ImportedLib, needed_by: &TypeLib) -> Result<usize> {
        let wanted = &imported.identity;
        if let Some(index) = self.loaded_match(wanted) {
            return Ok(index);
        }

        if let Some(position) = self
            .provided
            .iter()
            .position(|candidate| same_library(&candidate.identity(), wanted))
        {
            let library = self.provided.swap_remove(position);
            log::debug!("dependency '{}' satisfied from memory", library.name());
            return Ok(self.add_library(library));
        }

        for path in self.candidate_paths(&imported.file_name, needed_by) {
            if !path.is_file() {
                continue;
            }
            let library = TypeLib::open(&path, self.open_flags)?;
            if library.identity().guid != wanted.guid {
                log::debug!(
                    "'{}' is not library {{{}}}, skipped",
                    path.display(),
                    wanted.guid
                );
                continue;
            }
            log::debug!("dependency '{}' loaded from {}", library.name(), path.display());
            return Ok(self.add_library(library));
        }

        Err(Error::MissingDependency {
            library: if imported.file_name.is_empty() {
                wanted.to_string()
            } else {
                imported.file_name.clone()
            },
            needed_by: needed_by.name().to_string(),
        })
    }

    fn loaded_match(&self, wanted: &LibraryIdentity) -> Option<usize> {
        if let Some(index) = self.loaded.get(wanted) {
            return Some(*index);
        }
        self.libraries
            .iter()
            .position(|library| same_library(&library.identity(), wanted))
    }

    fn candidate_paths(&self, file_name: &str, needed_by: &TypeLib) -> Vec<PathBuf> {
        if file_name.is_empty() {
            return Vec::new();
        }

        let file = Path::new(file_name);
        let mut candidates = Vec::new();
        if file.is_absolute() {
            candidates.push(file.to_path_buf());
        }

        // Only the last component is meaningful when the recorded path is foreign.
        let leaf = file_name
            .rsplit(['\\', '/'])
            .next()
            .unwrap_or(file_name)
            .to_string();
        if let Some(dir) = needed_by.path().and_then(Path::parent) {
            candidates.push(dir.join(&leaf));
        }
        candidates.extend(self.search_paths.iter().map(|dir| dir.join(&leaf)));
        candidates
    }
}

/// Libraries match on `LIBID` and version; the locale is not significant.
fn same_library(candidate: &LibraryIdentity, wanted: &LibraryIdentity) -> bool {
    candidate.guid == wanted.guid
        && candidate.major == wanted.major
        && candidate.minor == wanted.minor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typelib::TypeLibBuilder;

    const DEP: Guid = guid!("7c1e0000-0000-4000-8000-000000000001");
    const HOST: Guid = guid!("7c1e0000-0000-4000-8000-000000000002");

    fn dependency() -> TypeLib {
        TypeLibBuilder::new("Dep", DEP).version(1, 0).build()
    }

    fn imported(file_name: &str) -> ImportedLib {
        ImportedLib {
            identity: LibraryIdentity {
                guid: DEP,
                major: 1,
                minor: 0,
                lcid: 0,
            },
            file_name: file_name.to_string(),
        }
    }

    #[test]
    fn well_known_types() {
        assert_eq!(WellKnown::by_guid(IID_IUNKNOWN), Some(WellKnown::IUnknown));
        assert_eq!(WellKnown::by_guid(IID_IDISPATCH), Some(WellKnown::IDispatch));
        assert_eq!(WellKnown::by_guid(DEP), None);

        let stdole = LibraryIdentity {
            guid: STDOLE_LIBID,
            major: 2,
            minor: 0,
            lcid: 0,
        };
        assert_eq!(WellKnown::by_name(&stdole, "GUID"), Some(WellKnown::Guid));
        assert_eq!(
            WellKnown::Guid.framework_type(),
            Some(("System", "Guid"))
        );
        assert_eq!(WellKnown::IUnknown.framework_type(), None);
        assert_eq!(WellKnown::by_name(&imported("").identity, "GUID"), None);
    }

    #[test]
    fn provided_library_satisfies_dependency() {
        let host = TypeLibBuilder::new("Host", HOST).build();
        let mut resolver = Resolver::new(Vec::new(), OpenFlags::empty());
        resolver.provide(dependency());

        let index = resolver.locate(&imported("dep.tlb"), &host).unwrap();
        assert_eq!(resolver.library(index).unwrap().name(), "Dep");
        assert_eq!(resolver.locate(&imported("dep.tlb"), &host).unwrap(), index);
    }

    #[test]
    fn missing_dependency_names_both_libraries() {
        let host = TypeLibBuilder::new("Host", HOST).build();
        let mut resolver = Resolver::new(vec![std::env::temp_dir()], OpenFlags::empty());

        match resolver.locate(&imported("no-such-library.tlb"), &host) {
            Err(Error::MissingDependency { library, needed_by }) => {
                assert_eq!(library, "no-such-library.tlb");
                assert_eq!(needed_by, "Host");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn same_identity_loads_once() {
        let mut resolver = Resolver::default();
        let first = resolver.add_library(dependency());
        let second = resolver.add_library(dependency());
        assert_eq!(first, second);
        assert_eq!(resolver.index_of(&dependency().identity()), Some(first));
    }
}
