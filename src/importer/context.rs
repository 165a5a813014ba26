//! State shared by every converter of one import run.
//!
//! [`ImportContext`] owns the libraries, the output assemblies, the symbol table of
//! [`TypeConverter`]s and the diagnostic sink. Converters are addressed by
//! [`ConverterId`] and read their source type back from the owning library on demand, so
//! nothing in the context borrows from a library.

use std::{collections::HashMap, path::PathBuf, rc::Rc};

use uguid::{guid, Guid};

use crate::{
    importer::{
        attributes::{self, InteropAttribute},
        diagnostics::{codes, Diagnostics},
        events::EventSink,
        naming::{full_name, or_fallback, split_full_name, NameScope},
        options::ImportOptions,
        resolver::{ReferenceAssembly, ReferenceType, Resolver, WellKnown},
        symbols::{ConverterId, SymbolKey, SymbolTable},
    },
    metadata::{
        builder::AssemblyBuilder,
        customattributes::CustomAttributeArgument,
        identity::{AssemblyIdentity, AssemblyVersion},
        strongname::StrongNameKey,
        token::Token,
    },
    typelib::{
        status, ExternalTarget, HRefType, ImportedLib, RefTarget, TypeFlags, TypeInfo, TypeKind,
        TypeLib, Variant,
    },
    Error, Result,
};

/// Custom data carrying the managed full name of a type.
pub const GUID_MANAGED_NAME: Guid = guid!("0F21F359-AB84-41E8-9A78-36D110E6D2F9");

/// The managed shape a source type projects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagedKind {
    /// Reference type: coclasses, modules and classes of reference assemblies
    Class,
    /// Interface
    Interface,
    /// Value type: records and unions
    Struct,
    /// Enumeration
    Enum,
    /// No type of its own; stands for its target
    Alias,
}

/// Where the managed type of a converter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Home {
    /// Defined in the output at this index
    Output(usize),
    /// Exported by the reference assembly at this index
    Reference(usize),
}

/// Lifecycle of a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterState {
    /// Managed identity fixed, `TypeDef` row reserved
    Registered,
    /// Flags, base type, interfaces and type-level attributes emitted
    Defined,
    /// Members emitted
    Created,
    /// Emitted with only the members that could be converted
    FailedButEmitted,
}

/// A source type of a library, addressed by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceType {
    /// Index of the library in the resolver
    pub library: usize,
    /// Index of the type in the library
    pub index: u32,
    /// Kind of the type
    pub kind: TypeKind,
}

/// The projection of one source type.
#[derive(Debug, Clone)]
pub struct TypeConverter {
    /// The source type; `None` for types of reference assemblies
    pub source: Option<SourceType>,
    /// Managed shape
    pub managed: ManagedKind,
    /// Namespace of the managed type
    pub namespace: String,
    /// Simple name of the managed type
    pub name: String,
    /// Where the managed type lives
    pub home: Home,
    /// The reserved `TypeDef`; `None` for aliases and reference types
    pub token: Option<Token>,
    /// Interfaces only: reachable through `IDispatch`
    pub dispatchable: bool,
    /// Lifecycle state
    pub state: ConverterState,
}

impl TypeConverter {
    /// `namespace.name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        full_name(&self.namespace, &self.name)
    }
}

/// How a type is found in a reference assembly.
#[derive(Debug, Clone, Copy)]
enum ReferenceLookup<'a> {
    /// By its `Guid` attribute
    Guid(Guid),
    /// By source index and simple name, for types without a GUID
    Name(u32, &'a str),
}

/// What a type reference designates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A type with a converter
    Converter(ConverterId),
    /// A `stdole` type with a fixed projection
    WellKnown(WellKnown),
}

/// One assembly produced by the run, under construction.
#[derive(Debug)]
pub struct OutputAssembly {
    /// Index of the source library in the resolver
    pub library: usize,
    /// Assembly name
    pub identity: AssemblyIdentity,
    /// Namespace for types without a managed-name override
    pub namespace: String,
    /// Destination file
    pub path: PathBuf,
    /// The emitter
    pub builder: AssemblyBuilder,
    /// The `Assembly` row
    pub assembly: Token,
    pub(crate) type_names: NameScope,
    pub(crate) event_sinks: HashMap<ConverterId, EventSink>,
}

/// Mutable state of one run.
#[derive(Debug)]
pub struct ImportContext {
    /// Run settings
    pub options: ImportOptions,
    /// Diagnostic sink
    pub diagnostics: Diagnostics,
    /// One converter per source type
    pub symbols: SymbolTable<TypeConverter>,
    /// Libraries and reference assemblies
    pub resolver: Resolver,
    /// Assemblies under construction, the primary one first
    pub outputs: Vec<OutputAssembly>,
    key: Option<StrongNameKey>,
}

impl ImportContext {
    /// A context for `options` with the key and reference assemblies loaded.
    ///
    /// # Errors
    /// Returns an error if the signing key or a reference assembly cannot be read.
    pub fn new(options: ImportOptions) -> Result<ImportContext> {
        let key = options.strong_name_key()?;
        let mut resolver = Resolver::new(options.search_paths.clone(), options.open_flags);
        for path in &options.references {
            resolver.add_reference(ReferenceAssembly::load(path)?);
        }

        Ok(ImportContext {
            diagnostics: Diagnostics::new(options.silenced.clone(), options.verbose),
            symbols: SymbolTable::new(),
            resolver,
            outputs: Vec::new(),
            options,
            key,
        })
    }

    /// The converter `id`.
    ///
    /// # Errors
    /// Returns an error for an id not handed out by this context.
    pub fn converter(&self, id: ConverterId) -> Result<&TypeConverter> {
        self.symbols
            .get(id)
            .ok_or_else(|| malformed_error!("unknown converter {}", id.0))
    }

    /// The converter `id`, mutably.
    ///
    /// # Errors
    /// Returns an error for an id not handed out by this context.
    pub fn converter_mut(&mut self, id: ConverterId) -> Result<&mut TypeConverter> {
        self.symbols
            .get_mut(id)
            .ok_or_else(|| malformed_error!("unknown converter {}", id.0))
    }

    /// The library at resolver index `index`.
    ///
    /// # Errors
    /// Returns an error for an unknown index.
    pub fn library(&self, index: usize) -> Result<Rc<TypeLib>> {
        self.resolver.library(index)
    }

    /// The builder of output `output`.
    pub fn builder(&mut self, output: usize) -> &mut AssemblyBuilder {
        &mut self.outputs[output].builder
    }

    /// The output assembly the library at `library` is imported into.
    #[must_use]
    pub fn output_of(&self, library: usize) -> Option<usize> {
        self.outputs.iter().position(|out| out.library == library)
    }

    /// Create the output assembly for the library at `library` and register all its types.
    ///
    /// The first output is the primary one and takes the naming overrides of the options;
    /// dependent libraries become sibling assemblies named after the library.
    ///
    /// # Errors
    /// Returns an error if the library cannot be read or a type cannot be registered.
    pub fn import_library(&mut self, library: usize) -> Result<usize> {
        if let Some(output) = self.output_of(library) {
            return Ok(output);
        }

        let lib = self.library(library)?;
        let output = self.create_output(library, &lib)?;
        for info in lib.types() {
            self.register(library, info.index())?;
        }
        Ok(output)
    }

    fn create_output(&mut self, library: usize, lib: &TypeLib) -> Result<usize> {
        let attr = lib.attributes();
        let primary = self.outputs.is_empty();

        let (name, version, namespace) = if primary {
            (
                self.options
                    .assembly_name
                    .clone()
                    .unwrap_or_else(|| lib.name().to_string()),
                self.options
                    .assembly_version
                    .unwrap_or(AssemblyVersion::new(attr.major, attr.minor, 0, 0)),
                self.options
                    .namespace
                    .clone()
                    .unwrap_or_else(|| lib.name().to_string()),
            )
        } else {
            (
                lib.name().to_string(),
                AssemblyVersion::new(attr.major, attr.minor, 0, 0),
                lib.name().to_string(),
            )
        };

        let file_name = format!("{name}.dll");
        let path = match (primary, &self.options.output) {
            (true, Some(path)) => path.clone(),
            (true, None) => PathBuf::from(&file_name),
            (false, _) => self
                .outputs
                .first()
                .and_then(|out| out.path.parent())
                .map_or_else(|| PathBuf::from(&file_name), |dir| dir.join(&file_name)),
        };

        let mut identity = AssemblyIdentity::new(&name, version);
        if let Some(key) = &self.key {
            identity = identity.with_public_key(key.public_key());
        }

        let mut builder = AssemblyBuilder::new();
        let assembly = builder.begin_assembly(&identity)?;
        let module_name = path
            .file_name()
            .map_or_else(|| file_name.clone(), |leaf| leaf.to_string_lossy().into_owned());
        builder.define_module(&module_name)?;

        log::info!(
            "importing '{}' {} into '{}' ({})",
            lib.name(),
            lib.identity(),
            identity.display_name(),
            path.display()
        );

        self.outputs.push(OutputAssembly {
            library,
            identity,
            namespace,
            path,
            builder,
            assembly,
            type_names: NameScope::new(),
            event_sinks: HashMap::new(),
        });
        let output = self.outputs.len() - 1;

        attributes::attach(
            self,
            output,
            assembly,
            InteropAttribute::Guid,
            vec![guid_argument(attr.guid)],
        )?;
        attributes::attach(
            self,
            output,
            assembly,
            InteropAttribute::ImportedFromTypeLib,
            vec![CustomAttributeArgument::String(Some(lib.name().to_string()))],
        )?;
        attributes::attach(
            self,
            output,
            assembly,
            InteropAttribute::TypeLibVersion,
            vec![
                CustomAttributeArgument::I4(i32::from(attr.major)),
                CustomAttributeArgument::I4(i32::from(attr.minor)),
            ],
        )?;

        Ok(output)
    }

    /// Register the type `index` of the library at `library`.
    ///
    /// Registration fixes the managed name and reserves the `TypeDef` row; members are
    /// emitted later by the driver. The type is bound under its index and, when it has one,
    /// its GUID.
    ///
    /// # Errors
    /// Returns an error if the type cannot be read or its library has no output yet.
    pub fn register(&mut self, library: usize, index: u32) -> Result<ConverterId> {
        let lib = self.library(library)?;
        let identity = lib.identity();
        let key = SymbolKey::by_index(&identity, index);
        if let Some(id) = self.symbols.lookup(&key) {
            return Ok(id);
        }

        let Some(output) = self.output_of(library) else {
            return Err(malformed_error!(
                "library '{}' has no output assembly",
                lib.name()
            ));
        };

        let info = lib.type_info(index)?;
        let kind = info.kind();
        let (namespace, name) = self.source_name(output, info);
        // aliases never own a TypeDef, so they leave the name free
        let (namespace, name) = if kind == TypeKind::Alias {
            (namespace, name)
        } else {
            self.claim_type_name(output, namespace, &name)
        };

        let outputs = &mut self.outputs;
        let id = self.symbols.get_or_create(key, |_| {
            let token = if kind == TypeKind::Alias {
                None
            } else {
                Some(outputs[output].builder.add_type_def(0, &namespace, &name, None)?)
            };

            Ok(TypeConverter {
                source: Some(SourceType {
                    library,
                    index,
                    kind,
                }),
                managed: managed_kind(kind),
                namespace,
                name,
                home: Home::Output(output),
                token,
                dispatchable: kind == TypeKind::Dispatch
                    || info
                        .flags()
                        .intersects(TypeFlags::DUAL | TypeFlags::DISPATCHABLE),
                state: ConverterState::Registered,
            })
        })?;

        if info.guid() != Guid::ZERO {
            self.symbols
                .bind(SymbolKey::by_guid(&identity, info.guid()), id);
        }
        Ok(id)
    }

    /// Managed namespace and name `info` asks for inside `output`.
    fn source_name(&self, output: usize, info: TypeInfo<'_>) -> (String, String) {
        match info.custom_data(GUID_MANAGED_NAME) {
            Some(Variant::Bstr(Some(full))) if !full.is_empty() => {
                let (ns, name) = split_full_name(full);
                (ns.to_string(), name.to_string())
            }
            _ => (
                self.outputs[output].namespace.clone(),
                or_fallback(info.name(), || format!("Type{}", info.index())),
            ),
        }
    }

    /// Reserve `namespace.name` in `output`, renaming it with a `TI2001` warning if taken.
    pub fn claim_type_name(
        &mut self,
        output: usize,
        namespace: String,
        name: &str,
    ) -> (String, String) {
        let scope = &mut self.outputs[output].type_names;
        let wanted = full_name(&namespace, name);
        if !scope.contains(&wanted) {
            scope.claim(&wanted);
            return (namespace, name.to_string());
        }

        let mut suffix = 2_u32;
        loop {
            let candidate = format!("{name}_{suffix}");
            if !scope.contains(&full_name(&namespace, &candidate)) {
                scope.claim(&full_name(&namespace, &candidate));
                self.diagnostics.warning(
                    codes::NAME_COLLISION,
                    format!("type name '{wanted}' duplicated, renamed to '{candidate}'"),
                );
                return (namespace, candidate);
            }
            suffix += 1;
        }
    }

    /// Resolve the reference `href` made by `owner`.
    ///
    /// Local references register the designated type. External references are served, in
    /// order, by the well-known `stdole` types, a reference assembly covering the library,
    /// and finally by importing the library into an assembly of its own.
    ///
    /// # Errors
    /// Returns [`Error::RefNotFound`] for dangling handles and [`Error::MissingDependency`]
    /// if the referenced library cannot be found.
    pub fn resolve(&mut self, owner: TypeInfo<'_>, href: HRefType) -> Result<Target> {
        let needed_by = owner.library();
        let Some(library) = self.resolver.index_of(&needed_by.identity()) else {
            return Err(malformed_error!(
                "library '{}' is not part of this run",
                needed_by.name()
            ));
        };

        match owner.resolve_ref(href)? {
            RefTarget::Local(info) => Ok(Target::Converter(self.register(library, info.index())?)),
            RefTarget::External {
                library: imported,
                target,
            } => self.resolve_external(needed_by, imported, target),
        }
    }

    fn resolve_external(
        &mut self,
        needed_by: &TypeLib,
        imported: &ImportedLib,
        target: ExternalTarget,
    ) -> Result<Target> {
        if let ExternalTarget::Guid(guid) = target {
            if let Some(known) = WellKnown::by_guid(guid) {
                return Ok(Target::WellKnown(known));
            }
        }

        let reference = self.resolver.find_reference(&imported.identity);
        if let (Some(reference), ExternalTarget::Guid(guid)) = (reference, target) {
            return self.reference_type(reference, ReferenceLookup::Guid(guid), needed_by);
        }

        // an index names no type by itself; the library must be read to learn which one
        let library = match self.resolver.locate(imported, needed_by) {
            Ok(library) => library,
            Err(Error::MissingDependency { library, needed_by }) if reference.is_some() => {
                return Err(Error::MissingDependency {
                    library: format!("{library} (needed to resolve a by-index reference)"),
                    needed_by,
                })
            }
            Err(error) => return Err(error),
        };
        let lib = self.library(library)?;
        let info = match target {
            ExternalTarget::Guid(guid) => {
                lib.find_by_guid(guid).ok_or_else(|| Error::RefNotFound {
                    library: lib.name().to_string(),
                    href: 0,
                    status: status::TYPE_E_ELEMENTNOTFOUND,
                })?
            }
            ExternalTarget::Index(index) => lib.type_info(index)?,
        };

        if let Some(known) = WellKnown::by_name(&lib.identity(), info.name()) {
            return Ok(Target::WellKnown(known));
        }
        if let Some(reference) = reference {
            let lookup = if info.guid() == Guid::ZERO {
                ReferenceLookup::Name(info.index(), info.name())
            } else {
                ReferenceLookup::Guid(info.guid())
            };
            return self.reference_type(reference, lookup, needed_by);
        }

        if self.output_of(library).is_none() {
            self.diagnostics.info(
                codes::DEPENDENCY_IMPORTED,
                format!(
                    "type library '{}' referenced by '{}' imported into its own assembly",
                    lib.name(),
                    needed_by.name()
                ),
            );
            self.import_library(library)?;
        }
        Ok(Target::Converter(self.register(library, info.index())?))
    }

    fn reference_type(
        &mut self,
        reference: usize,
        lookup: ReferenceLookup<'_>,
        needed_by: &TypeLib,
    ) -> Result<Target> {
        let assembly = self.resolver.reference(reference)?;
        let library = assembly.library_identity();
        let (key, found) = match lookup {
            ReferenceLookup::Guid(guid) => (
                SymbolKey::by_guid(&library, guid),
                assembly.types.get(&guid).cloned(),
            ),
            ReferenceLookup::Name(index, name) => (
                SymbolKey::by_index(&library, index),
                assembly.find_by_name(name).cloned(),
            ),
        };
        if let Some(id) = self.symbols.lookup(&key) {
            return Ok(Target::Converter(id));
        }

        let Some(ReferenceType {
            namespace,
            name,
            managed,
        }) = found
        else {
            return Err(Error::RefNotFound {
                library: assembly.identity.name.clone(),
                href: 0,
                status: status::TYPE_E_ELEMENTNOTFOUND,
            });
        };

        let message = format!(
            "type '{}' needed by '{}' taken from reference assembly '{}'",
            full_name(&namespace, &name),
            needed_by.name(),
            assembly.identity.name
        );
        let id = self.symbols.get_or_create(key, |_| {
            Ok(TypeConverter {
                source: None,
                managed,
                namespace,
                name,
                home: Home::Reference(reference),
                token: None,
                dispatchable: false,
                state: ConverterState::Created,
            })
        })?;
        self.diagnostics.info(codes::REFERENCE_USED, message);
        Ok(Target::Converter(id))
    }

    /// A token naming the managed type of `id` inside `output`: its `TypeDef` when it lives
    /// there, a `TypeRef` scoped to the owning assembly otherwise.
    ///
    /// # Errors
    /// Returns an error for aliases, which have no managed type of their own.
    pub fn type_token(&mut self, output: usize, id: ConverterId) -> Result<Token> {
        let converter = self.converter(id)?;
        if converter.managed == ManagedKind::Alias {
            return Err(malformed_error!(
                "alias '{}' has no managed type",
                converter.name
            ));
        }

        let identity = match converter.home {
            Home::Output(home) if home == output => {
                return converter.token.ok_or_else(|| {
                    malformed_error!("'{}' has no type definition", converter.name)
                })
            }
            Home::Output(home) => self.outputs[home].identity.clone(),
            Home::Reference(reference) => self.resolver.reference(reference)?.identity.clone(),
        };
        let (namespace, name) = (converter.namespace.clone(), converter.name.clone());

        let builder = self.builder(output);
        let scope = builder.add_assembly_ref(&identity);
        Ok(builder.add_type_ref(scope, &namespace, &name))
    }

    /// A `TypeRef` to the framework type `namespace.name`.
    pub fn framework_type(&mut self, output: usize, namespace: &str, name: &str) -> Token {
        let builder = self.builder(output);
        let scope = builder.add_assembly_ref(&AssemblyIdentity::mscorlib());
        builder.add_type_ref(scope, namespace, name)
    }

    /// The type name of `id` as serialized in a `System.Type` attribute argument: plain for
    /// types of `output`, assembly-qualified otherwise.
    ///
    /// # Errors
    /// Returns an error for an unknown converter or reference assembly.
    pub fn type_argument(&self, output: usize, id: ConverterId) -> Result<String> {
        let converter = self.converter(id)?;
        let name = converter.full_name();
        match converter.home {
            Home::Output(home) if home == output => Ok(name),
            Home::Output(home) => Ok(format!(
                "{name}, {}",
                self.outputs[home].identity.display_name()
            )),
            Home::Reference(reference) => Ok(format!(
                "{name}, {}",
                self.resolver.reference(reference)?.identity.display_name()
            )),
        }
    }

    /// The source type of `id` together with its library.
    ///
    /// # Errors
    /// Returns an error for reference types, which have no source.
    pub fn source(&self, id: ConverterId) -> Result<(Rc<TypeLib>, SourceType)> {
        let converter = self.converter(id)?;
        let Some(source) = converter.source else {
            return Err(malformed_error!(
                "'{}' comes from a reference assembly",
                converter.full_name()
            ));
        };
        Ok((self.library(source.library)?, source))
    }
}

/// The managed shape of a source type kind.
#[must_use]
pub fn managed_kind(kind: TypeKind) -> ManagedKind {
    match kind {
        TypeKind::Enum => ManagedKind::Enum,
        TypeKind::Record | TypeKind::Union => ManagedKind::Struct,
        TypeKind::Interface | TypeKind::Dispatch => ManagedKind::Interface,
        TypeKind::Module | TypeKind::CoClass => ManagedKind::Class,
        TypeKind::Alias => ManagedKind::Alias,
    }
}

/// The `Guid` attribute argument for `guid`.
#[must_use]
pub fn guid_argument(guid: Guid) -> CustomAttributeArgument {
    CustomAttributeArgument::String(Some(guid.to_string().to_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::tables::TableId,
        test::factories,
        typelib::{TypeDesc, TypeInfoBuilder, TypeLibBuilder, VarBuilder, VarType},
    };

    #[test]
    fn registration_is_keyed_by_index_and_guid() {
        let lib = factories::shapes_library();
        let mut ctx = ImportContext::new(ImportOptions::new()).unwrap();
        let library = ctx.resolver.add_library(lib);
        ctx.import_library(library).unwrap();

        let lib = ctx.library(library).unwrap();
        assert_eq!(ctx.symbols.len(), lib.type_count());

        let shape = lib.find_by_name("IShape").unwrap();
        let by_index = ctx.register(library, shape.index()).unwrap();
        let by_guid = ctx
            .symbols
            .lookup(&SymbolKey::by_guid(&lib.identity(), shape.guid()))
            .unwrap();
        assert_eq!(by_index, by_guid);

        let converter = ctx.converter(by_index).unwrap();
        assert_eq!(converter.full_name(), "Shapes.IShape");
        assert_eq!(converter.managed, ManagedKind::Interface);
        assert_eq!(converter.state, ConverterState::Registered);
        assert!(converter.token.is_some());
    }

    #[test]
    fn primary_output_takes_overrides() {
        let options = ImportOptions::new()
            .with_assembly_name("Interop.Shapes")
            .with_namespace("Acme.Shapes")
            .with_output(std::env::temp_dir().join("Interop.Shapes.dll"));
        let mut ctx = ImportContext::new(options).unwrap();
        let library = ctx.resolver.add_library(factories::shapes_library());
        let output = ctx.import_library(library).unwrap();

        let out = &ctx.outputs[output];
        assert_eq!(out.identity.name, "Interop.Shapes");
        assert_eq!(out.identity.version, AssemblyVersion::new(1, 2, 0, 0));
        assert_eq!(out.namespace, "Acme.Shapes");
        assert_eq!(
            out.path.file_name().and_then(|name| name.to_str()),
            Some("Interop.Shapes.dll")
        );
    }

    #[test]
    fn type_names_are_unique_per_assembly() {
        let mut ctx = ImportContext::new(ImportOptions::new()).unwrap();
        let library = ctx.resolver.add_library(factories::shapes_library());
        let output = ctx.import_library(library).unwrap();

        let (_, first) = ctx.claim_type_name(output, "Shapes".into(), "Extra");
        let (_, second) = ctx.claim_type_name(output, "Shapes".into(), "Extra");
        assert_eq!(first, "Extra");
        assert_eq!(second, "Extra_2");
        assert_eq!(ctx.diagnostics.with_code(codes::NAME_COLLISION).count(), 1);
    }

    #[test]
    fn aliases_leave_names_free() {
        let mut builder =
            TypeLibBuilder::new("Geo", guid!("9e0a0000-0000-4000-8000-000000000001"));
        builder.add_type(
            TypeInfoBuilder::new("POINT", TypeKind::Alias).alias(TypeDesc::Base(VarType::I4)),
        );
        builder.add_type(
            TypeInfoBuilder::new("tagPOINT", TypeKind::Record)
                .custom(GUID_MANAGED_NAME, Variant::Bstr(Some("Geo.POINT".into())))
                .variable(VarBuilder::new("x", TypeDesc::Base(VarType::I4))),
        );

        let mut ctx = ImportContext::new(ImportOptions::new()).unwrap();
        let library = ctx.resolver.add_library(builder.build());
        ctx.import_library(library).unwrap();

        let names: Vec<String> = ctx
            .symbols
            .ids()
            .map(|id| ctx.converter(id).unwrap().full_name())
            .collect();
        assert_eq!(names, ["Geo.POINT", "Geo.POINT"]);
        assert_eq!(ctx.converter(ConverterId(0)).unwrap().managed, ManagedKind::Alias);
        assert_eq!(ctx.diagnostics.with_code(codes::NAME_COLLISION).count(), 0);
    }

    #[test]
    fn cross_output_tokens_are_type_refs() {
        let mut ctx = ImportContext::new(ImportOptions::new()).unwrap();
        let library = ctx.resolver.add_library(factories::shapes_library());
        let output = ctx.import_library(library).unwrap();
        let id = ctx.symbols.ids().next().unwrap();

        let token = ctx.type_token(output, id).unwrap();
        assert_eq!(token.table_id(), Some(TableId::TypeDef));
        assert_eq!(
            ctx.framework_type(output, "System", "Object").table_id(),
            Some(TableId::TypeRef)
        );
        assert_eq!(
            ctx.type_argument(output, id).unwrap(),
            ctx.converter(id).unwrap().full_name()
        );
    }
}
