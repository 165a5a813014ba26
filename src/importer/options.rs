//! Import configuration.
//!
//! [`ImportOptions`] carries every knob of an import run: naming and versioning of the primary
//! output, strong-name signing, the well-known transforms, reference assemblies consulted
//! before a dependency is imported again, and where dependent libraries are searched.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use bitflags::bitflags;
use strum::{Display, EnumString};

use crate::{
    metadata::{identity::AssemblyVersion, strongname::StrongNameKey},
    typelib::OpenFlags,
    Result,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Optional rewrites applied while projecting types.
    pub struct Transforms: u32 {
        /// Mark every projected record and union `Serializable`
        const SERIALIZABLE_VALUE_CLASSES = 0x0001;
        /// Turn `[out, retval]` parameters of dispatch-only interfaces into return values
        const DISPATCH_RETVAL = 0x0002;
    }
}

impl Transforms {
    /// Parse a transform name as accepted on the command line.
    ///
    /// Names are matched case-insensitively; both the short `tlbimp` spellings and the flag
    /// names are recognized.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Transforms> {
        match name.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "serializablevalueclasses" | "serializable" => {
                Some(Transforms::SERIALIZABLE_VALUE_CLASSES)
            }
            "dispret" | "dispatchretval" => Some(Transforms::DISPATCH_RETVAL),
            _ => None,
        }
    }
}

/// How `VT_CARRAY` fields of records are projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
pub enum CArrayPolicy {
    /// Unfold a C array into sequential fields only when it is the single field of its record
    #[default]
    #[strum(serialize = "sole")]
    UnfoldSoleField,
    /// Unfold every C array field
    #[strum(serialize = "all")]
    UnfoldAll,
    /// Never unfold; emit a by-value array field with a fixed-size marshalling descriptor
    #[strum(serialize = "byval")]
    ByValArray,
}

/// Settings for one import run.
#[derive(Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ImportOptions {
    /// Name of the primary assembly, defaults to the library name
    pub assembly_name: Option<String>,
    /// Version of the primary assembly, defaults to the library version
    pub assembly_version: Option<AssemblyVersion>,
    /// Namespace of the primary assembly's types, defaults to the library name
    pub namespace: Option<String>,
    /// Raw public key blob to sign every output with
    pub public_key: Option<Vec<u8>>,
    /// Key file (`.snk` or public key blob); takes precedence over `public_key`
    pub key_file: Option<PathBuf>,
    /// Attach `SuppressUnmanagedCodeSecurity` to interfaces and classes
    pub unsafe_interfaces: bool,
    /// Enabled transforms
    pub transforms: Transforms,
    /// Previously imported assemblies consulted before importing a dependency
    pub references: Vec<PathBuf>,
    /// Keep informational diagnostics
    pub verbose: bool,
    /// Diagnostic codes that are dropped
    pub silenced: HashSet<u16>,
    /// Path of the primary output, defaults to `<assembly name>.dll`
    pub output: Option<PathBuf>,
    /// Directories searched for dependent type libraries
    pub search_paths: Vec<PathBuf>,
    /// Flags used to open the primary and every dependent library
    pub open_flags: OpenFlags,
    /// Projection of C array fields
    pub carray_policy: CArrayPolicy,
}

impl ImportOptions {
    /// Options with every default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the primary assembly name.
    #[must_use]
    pub fn with_assembly_name(mut self, name: impl Into<String>) -> Self {
        self.assembly_name = Some(name.into());
        self
    }

    /// Override the primary assembly version.
    #[must_use]
    pub fn with_assembly_version(mut self, version: AssemblyVersion) -> Self {
        self.assembly_version = Some(version);
        self
    }

    /// Override the namespace of the primary assembly.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sign with a raw public key blob.
    #[must_use]
    pub fn with_public_key(mut self, key: Vec<u8>) -> Self {
        self.public_key = Some(key);
        self
    }

    /// Sign with the key stored in `path`.
    #[must_use]
    pub fn with_key_file(mut self, path: impl AsRef<Path>) -> Self {
        self.key_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Toggle `SuppressUnmanagedCodeSecurity`.
    #[must_use]
    pub fn with_unsafe_interfaces(mut self, enabled: bool) -> Self {
        self.unsafe_interfaces = enabled;
        self
    }

    /// Enable `transforms` in addition to the ones already set.
    #[must_use]
    pub fn with_transforms(mut self, transforms: Transforms) -> Self {
        self.transforms |= transforms;
        self
    }

    /// Consult the assembly at `path` before importing a dependency.
    #[must_use]
    pub fn with_reference(mut self, path: impl AsRef<Path>) -> Self {
        self.references.push(path.as_ref().to_path_buf());
        self
    }

    /// Keep informational diagnostics.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Drop diagnostics with `code`.
    #[must_use]
    pub fn with_silenced(mut self, code: u16) -> Self {
        self.silenced.insert(code);
        self
    }

    /// Write the primary output to `path`.
    #[must_use]
    pub fn with_output(mut self, path: impl AsRef<Path>) -> Self {
        self.output = Some(path.as_ref().to_path_buf());
        self
    }

    /// Search `path` for dependent libraries.
    #[must_use]
    pub fn with_search_path(mut self, path: impl AsRef<Path>) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Open libraries with `flags`.
    #[must_use]
    pub fn with_open_flags(mut self, flags: OpenFlags) -> Self {
        self.open_flags = flags;
        self
    }

    /// Choose how C array fields are projected.
    #[must_use]
    pub fn with_carray_policy(mut self, policy: CArrayPolicy) -> Self {
        self.carray_policy = policy;
        self
    }

    /// The signing key, if any; `key_file` wins over `public_key`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the key file cannot be read and
    /// [`crate::Error::InvalidKey`] if either source is not a key blob.
    pub fn strong_name_key(&self) -> Result<Option<StrongNameKey>> {
        if let Some(path) = &self.key_file {
            return StrongNameKey::load(path).map(Some);
        }
        self.public_key
            .as_deref()
            .map(StrongNameKey::from_bytes)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_names() {
        assert_eq!(
            Transforms::from_name("SerializableValueClasses"),
            Some(Transforms::SERIALIZABLE_VALUE_CLASSES)
        );
        assert_eq!(
            Transforms::from_name("dispret"),
            Some(Transforms::DISPATCH_RETVAL)
        );
        assert_eq!(
            Transforms::from_name("dispatch_retval"),
            Some(Transforms::DISPATCH_RETVAL)
        );
        assert_eq!(Transforms::from_name("nope"), None);
    }

    #[test]
    fn carray_policy_names() {
        assert_eq!("sole".parse::<CArrayPolicy>().unwrap(), CArrayPolicy::UnfoldSoleField);
        assert_eq!("all".parse::<CArrayPolicy>().unwrap(), CArrayPolicy::UnfoldAll);
        assert_eq!("byval".parse::<CArrayPolicy>().unwrap(), CArrayPolicy::ByValArray);
        assert!("sideways".parse::<CArrayPolicy>().is_err());
        assert_eq!(CArrayPolicy::default().to_string(), "sole");
    }

    #[test]
    fn setters_accumulate() {
        let options = ImportOptions::new()
            .with_assembly_name("Interop.Shapes")
            .with_transforms(Transforms::DISPATCH_RETVAL)
            .with_transforms(Transforms::SERIALIZABLE_VALUE_CLASSES)
            .with_reference("a.dll")
            .with_reference("b.dll")
            .with_silenced(2001)
            .with_carray_policy(CArrayPolicy::UnfoldAll);

        assert_eq!(options.assembly_name.as_deref(), Some("Interop.Shapes"));
        assert_eq!(options.transforms, Transforms::all());
        assert_eq!(options.references.len(), 2);
        assert!(options.silenced.contains(&2001));
        assert_eq!(options.carray_policy, CArrayPolicy::UnfoldAll);
        assert!(!options.verbose);
    }

    #[test]
    fn key_selection() {
        assert!(ImportOptions::new().strong_name_key().unwrap().is_none());

        let ecma = vec![0, 0, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0];
        let key = ImportOptions::new()
            .with_public_key(ecma.clone())
            .strong_name_key()
            .unwrap()
            .unwrap();
        assert_eq!(key.public_key(), ecma.as_slice());

        let missing = ImportOptions::new()
            .with_public_key(ecma)
            .with_key_file("/nonexistent/key.snk");
        assert!(missing.strong_name_key().is_err());

        assert!(ImportOptions::new()
            .with_public_key(vec![1, 2, 3])
            .strong_name_key()
            .is_err());
    }
}
