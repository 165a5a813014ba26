//! Row-level construction of a metadata-only assembly.
//!
//! [`AssemblyBuilder`] accepts rows in whatever order the importer produces them and hands out a
//! [`Token`] for every row immediately, so a type can be named in signatures long before its
//! members exist. Members are recorded together with their owner; tokens of `Field`,
//! `MethodDef`, `Param`, `Property` and `Event` rows are provisional until
//! [`AssemblyBuilder::to_bytes`] groups them into one contiguous run per owner and rewrites
//! every reference through the resulting permutation.
//!
//! `AssemblyRef`, `TypeRef`, `MemberRef` and `ModuleRef` rows are deduplicated on insertion by
//! their logical identity, and identical `CustomAttribute` rows are only stored once.
//!
//! # Examples
//!
//! ```rust
//! use tlbscope::metadata::{
//!     builder::AssemblyBuilder,
//!     flags::TypeAttributes,
//!     identity::{AssemblyIdentity, AssemblyVersion},
//! };
//!
//! let mut builder = AssemblyBuilder::new();
//! builder.begin_assembly(&AssemblyIdentity::new("Interop.Demo", AssemblyVersion::new(1, 0, 0, 0)))?;
//! builder.define_module("Interop.Demo.dll")?;
//! let mscorlib = builder.add_assembly_ref(&AssemblyIdentity::mscorlib());
//! let object = builder.add_type_ref(mscorlib, "System", "Object");
//! builder.add_type_def(TypeAttributes::PUBLIC, "Demo", "Widget", Some(object))?;
//!
//! let image = builder.to_bytes()?;
//! assert_eq!(&image[..2], b"MZ");
//! # Ok::<(), tlbscope::Error>(())
//! ```

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use crate::{
    file::Output,
    metadata::{
        customattributes::{encode_custom_attribute_value, CustomAttributeValue},
        flags::{
            AssemblyFlags, FieldAttributes, MethodAttributes, MethodImplAttributes,
            PInvokeAttributes, ParamAttributes, PropertyAttributes, TypeAttributes,
            HASH_ALGORITHM_SHA1,
        },
        heaps::{BlobHeapBuilder, GuidHeapBuilder, StringHeapBuilder},
        identity::{AssemblyIdentity, StrongName},
        marshalling::{encode_marshalling_descriptor, NativeType},
        signatures::{
            encode_field_signature, encode_method_signature, encode_property_signature,
            SignatureField, SignatureMethod, SignatureProperty,
        },
        strongname::StrongNameKey,
        tables::{
            AssemblyRefRow, AssemblyRow, ClassLayoutRow, CodedIndex, CodedIndexType, ConstantRow,
            CustomAttributeRow, EventMapRow, EventRow, FieldLayoutRow, FieldMarshalRow, FieldRow,
            ImplMapRow, InterfaceImplRow, MemberRefRow, MethodDefRow, MethodSemanticsRow,
            ModuleRefRow, ModuleRow, NestedClassRow, ParamRow, PropertyMapRow, PropertyRow,
            TableId, TypeDefRow, TypeRefRow,
        },
        token::Token,
        writer::{self, TableSet},
    },
    Error::{self, AlreadySaved, MultipleModules, NoModule},
    Result,
};

/// Attributes that are stored as flag bits instead of `CustomAttribute` rows.
enum PseudoAttribute {
    TypeFlag(u32),
    PreserveSig,
}

fn pseudo_attribute(namespace: &str, name: &str) -> Option<PseudoAttribute> {
    match (namespace, name) {
        ("System.Runtime.InteropServices", "ComImportAttribute") => {
            Some(PseudoAttribute::TypeFlag(TypeAttributes::IMPORT))
        }
        ("System", "SerializableAttribute") => {
            Some(PseudoAttribute::TypeFlag(TypeAttributes::SERIALIZABLE))
        }
        ("System.Runtime.InteropServices", "PreserveSigAttribute") => {
            Some(PseudoAttribute::PreserveSig)
        }
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct TypeEntry {
    flags: u32,
    namespace: String,
    name: String,
    strings: (u32, u32),
    extends: Option<Token>,
}

#[derive(Debug, Clone)]
struct TypeRefEntry {
    scope: Token,
    namespace: String,
    name: String,
    strings: (u32, u32),
}

#[derive(Debug, Clone)]
struct Member<R> {
    owner: u32,
    row: R,
}

#[derive(Debug, Clone)]
struct EventEntry {
    owner: u32,
    flags: u16,
    name: u32,
    event_type: Token,
}

#[derive(Debug, Clone)]
struct MemberRefEntry {
    parent: Token,
    name: String,
    name_index: u32,
    signature: u32,
}

/// Accumulates the metadata of one assembly and serializes it as a PE image.
#[derive(Debug, Clone)]
pub struct AssemblyBuilder {
    strings: StringHeapBuilder,
    blobs: BlobHeapBuilder,
    guids: GuidHeapBuilder,

    assembly: Option<AssemblyRow>,
    signature_size: usize,
    module: Option<ModuleRow>,

    assembly_refs: Vec<AssemblyRefRow>,
    assembly_ref_index: HashMap<AssemblyIdentity, Token>,
    type_refs: Vec<TypeRefEntry>,
    type_ref_index: HashMap<(Token, String, String), Token>,
    member_refs: Vec<MemberRefEntry>,
    member_ref_index: HashMap<(Token, String, u32), Token>,
    module_refs: Vec<ModuleRefRow>,
    module_ref_index: HashMap<String, Token>,

    types: Vec<TypeEntry>,
    fields: Vec<Member<FieldRow>>,
    methods: Vec<Member<MethodDefRow>>,
    params: Vec<Member<ParamRow>>,
    properties: Vec<Member<PropertyRow>>,
    events: Vec<EventEntry>,

    interface_impls: Vec<(u32, Token)>,
    custom_attributes: Vec<(Token, Token, u32)>,
    custom_attribute_index: HashSet<(Token, Token, u32)>,
    constants: Vec<(Token, u8, u32)>,
    field_marshals: Vec<(Token, u32)>,
    class_layouts: Vec<ClassLayoutRow>,
    field_layouts: Vec<(Token, u32)>,
    method_semantics: Vec<(u16, Token, Token)>,
    impl_maps: Vec<(PInvokeAttributes, Token, u32, Token)>,
    nested_classes: Vec<NestedClassRow>,

    saved: Option<PathBuf>,
}

impl Default for AssemblyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AssemblyBuilder {
    /// An empty builder. `TypeDef` row 1 is the `<Module>` type.
    #[must_use]
    pub fn new() -> Self {
        let mut strings = StringHeapBuilder::new();
        let module_name = strings.add("<Module>");

        AssemblyBuilder {
            strings,
            blobs: BlobHeapBuilder::new(),
            guids: GuidHeapBuilder::new(),
            assembly: None,
            signature_size: 0,
            module: None,
            assembly_refs: Vec::new(),
            assembly_ref_index: HashMap::new(),
            type_refs: Vec::new(),
            type_ref_index: HashMap::new(),
            member_refs: Vec::new(),
            member_ref_index: HashMap::new(),
            module_refs: Vec::new(),
            module_ref_index: HashMap::new(),
            types: vec![TypeEntry {
                flags: TypeAttributes::NOT_PUBLIC,
                namespace: String::new(),
                name: "<Module>".to_string(),
                strings: (0, module_name),
                extends: None,
            }],
            fields: Vec::new(),
            methods: Vec::new(),
            params: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            interface_impls: Vec::new(),
            custom_attributes: Vec::new(),
            custom_attribute_index: HashSet::new(),
            constants: Vec::new(),
            field_marshals: Vec::new(),
            class_layouts: Vec::new(),
            field_layouts: Vec::new(),
            method_semantics: Vec::new(),
            impl_maps: Vec::new(),
            nested_classes: Vec::new(),
            saved: None,
        }
    }

    /// Create the `Assembly` row.
    ///
    /// A full public key in `identity` sets the `PublicKey` flag and reserves a strong-name
    /// signature slot sized for that key.
    ///
    /// # Errors
    /// Returns an error if the assembly row already exists.
    pub fn begin_assembly(&mut self, identity: &AssemblyIdentity) -> Result<Token> {
        if self.assembly.is_some() {
            return Err(Error::Error(format!(
                "assembly '{}' has already been started",
                identity.name
            )));
        }

        let mut flags = 0;
        let mut public_key = 0;
        if let Some(key) = identity.public_key() {
            flags |= AssemblyFlags::PUBLIC_KEY;
            public_key = self.blobs.add(key);
            self.signature_size =
                StrongNameKey::from_bytes(key).map_or(128, |key| key.signature_size());
        }

        self.assembly = Some(AssemblyRow {
            hash_alg_id: HASH_ALGORITHM_SHA1,
            major_version: identity.version.major,
            minor_version: identity.version.minor,
            build_number: identity.version.build,
            revision_number: identity.version.revision,
            flags,
            public_key,
            name: self.strings.add(&identity.name),
            culture: self.strings.add(identity.culture.as_deref().unwrap_or("")),
        });
        Ok(Token::from_parts(TableId::Assembly, 1))
    }

    /// Create the single `Module` row.
    ///
    /// The module version id is reserved here and filled in from the content hash when the
    /// image is serialized.
    ///
    /// # Errors
    /// Returns [`Error::MultipleModules`] for a second module.
    pub fn define_module(&mut self, name: &str) -> Result<Token> {
        if self.module.is_some() {
            return Err(MultipleModules);
        }

        let mvid = self.guids.add(uguid::Guid::ZERO);
        self.module = Some(ModuleRow {
            generation: 0,
            name: self.strings.add(name),
            mvid,
        });
        Ok(Token::from_parts(TableId::Module, 1))
    }

    /// Reference another assembly; equal identities share one row.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_assembly_ref(&mut self, identity: &AssemblyIdentity) -> Token {
        if let Some(token) = self.assembly_ref_index.get(identity) {
            return *token;
        }

        let (flags, public_key_or_token) = match &identity.strong_name {
            Some(StrongName::PublicKey(key)) => (AssemblyFlags::PUBLIC_KEY, self.blobs.add(key)),
            Some(StrongName::Token(token)) => (0, self.blobs.add(token)),
            None => (0, 0),
        };

        let row = AssemblyRefRow {
            major_version: identity.version.major,
            minor_version: identity.version.minor,
            build_number: identity.version.build,
            revision_number: identity.version.revision,
            flags,
            public_key_or_token,
            name: self.strings.add(&identity.name),
            culture: self.strings.add(identity.culture.as_deref().unwrap_or("")),
            hash_value: 0,
        };
        self.assembly_refs.push(row);

        let token = Token::from_parts(TableId::AssemblyRef, self.assembly_refs.len() as u32);
        self.assembly_ref_index.insert(identity.clone(), token);
        token
    }

    /// Reference a type in `scope` (an `AssemblyRef`, `ModuleRef`, `Module` or enclosing
    /// `TypeRef`); the same scope and name always yield the same row.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_type_ref(&mut self, scope: Token, namespace: &str, name: &str) -> Token {
        let key = (scope, namespace.to_string(), name.to_string());
        if let Some(token) = self.type_ref_index.get(&key) {
            return *token;
        }

        let strings = (self.strings.add(namespace), self.strings.add(name));
        self.type_refs.push(TypeRefEntry {
            scope,
            namespace: namespace.to_string(),
            name: name.to_string(),
            strings,
        });

        let token = Token::from_parts(TableId::TypeRef, self.type_refs.len() as u32);
        self.type_ref_index.insert(key, token);
        token
    }

    /// Define a type. Rows are committed in call order.
    ///
    /// # Errors
    /// Returns an error if `extends` is not a `TypeDef` or `TypeRef` token.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_type_def(
        &mut self,
        flags: u32,
        namespace: &str,
        name: &str,
        extends: Option<Token>,
    ) -> Result<Token> {
        if let Some(base) = extends {
            Self::expect_type(base)?;
        }

        let strings = (self.strings.add(namespace), self.strings.add(name));
        self.types.push(TypeEntry {
            flags,
            namespace: namespace.to_string(),
            name: name.to_string(),
            strings,
            extends,
        });
        Ok(Token::from_parts(TableId::TypeDef, self.types.len() as u32))
    }

    /// Replace the base type of `ty`.
    ///
    /// # Errors
    /// Returns an error if `ty` is not a defined type or `extends` is not a type token.
    pub fn set_type_extends(&mut self, ty: Token, extends: Option<Token>) -> Result<()> {
        if let Some(base) = extends {
            Self::expect_type(base)?;
        }

        let index = self.type_index(ty)?;
        self.types[index].extends = extends;
        Ok(())
    }

    /// Replace the `TypeAttributes` of `ty`.
    ///
    /// # Errors
    /// Returns an error if `ty` is not a defined type.
    pub fn set_type_flags(&mut self, ty: Token, flags: u32) -> Result<()> {
        let index = self.type_index(ty)?;
        self.types[index].flags = flags;
        Ok(())
    }

    /// The `TypeAttributes` of `ty`.
    ///
    /// # Errors
    /// Returns an error if `ty` is not a defined type.
    pub fn type_flags(&self, ty: Token) -> Result<u32> {
        Ok(self.types[self.type_index(ty)?].flags)
    }

    /// `Namespace.Name` of a `TypeDef` or `TypeRef`.
    #[must_use]
    pub fn type_name(&self, ty: Token) -> Option<String> {
        let (namespace, name) = match ty.table_id()? {
            TableId::TypeDef => {
                let entry = self.types.get((ty.row() as usize).checked_sub(1)?)?;
                (&entry.namespace, &entry.name)
            }
            TableId::TypeRef => {
                let entry = self.type_refs.get((ty.row() as usize).checked_sub(1)?)?;
                (&entry.namespace, &entry.name)
            }
            _ => return None,
        };

        if namespace.is_empty() {
            Some(name.clone())
        } else {
            Some(format!("{namespace}.{name}"))
        }
    }

    /// The `TypeDef` named `namespace.name`, if one was defined.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn find_type_def(&self, namespace: &str, name: &str) -> Option<Token> {
        self.types
            .iter()
            .position(|entry| entry.namespace == namespace && entry.name == name)
            .map(|index| Token::from_parts(TableId::TypeDef, index as u32 + 1))
    }

    /// Number of `TypeDef` rows, `<Module>` included.
    #[must_use]
    pub fn type_def_count(&self) -> usize {
        self.types.len()
    }

    /// Record that `class` implements `interface`.
    ///
    /// # Errors
    /// Returns an error for a `class` that is not defined or an `interface` that is not a type.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_interface_impl(&mut self, class: Token, interface: Token) -> Result<Token> {
        let index = self.type_index(class)?;
        Self::expect_type(interface)?;

        self.interface_impls.push((index as u32 + 1, interface));
        Ok(Token::from_parts(
            TableId::InterfaceImpl,
            self.interface_impls.len() as u32,
        ))
    }

    /// Add a field to `owner`.
    ///
    /// # Errors
    /// Returns an error for an unknown owner or a signature that cannot be encoded.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_field(
        &mut self,
        owner: Token,
        flags: u16,
        name: &str,
        signature: &SignatureField,
    ) -> Result<Token> {
        let owner = self.type_index(owner)? as u32 + 1;
        let signature = self.blobs.add(&encode_field_signature(signature)?);

        self.fields.push(Member {
            owner,
            row: FieldRow {
                flags,
                name: self.strings.add(name),
                signature,
            },
        });
        Ok(Token::from_parts(TableId::Field, self.fields.len() as u32))
    }

    /// Add a method to `owner`. Metadata-only images carry no bodies, so the RVA is always 0.
    ///
    /// # Errors
    /// Returns an error for an unknown owner or a signature that cannot be encoded.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_method(
        &mut self,
        owner: Token,
        flags: u16,
        impl_flags: MethodImplAttributes,
        name: &str,
        signature: &SignatureMethod,
    ) -> Result<Token> {
        let owner = self.type_index(owner)? as u32 + 1;
        let signature = self.blobs.add(&encode_method_signature(signature)?);

        self.methods.push(Member {
            owner,
            row: MethodDefRow {
                rva: 0,
                impl_flags: impl_flags.bits(),
                flags,
                name: self.strings.add(name),
                signature,
                param_list: 0,
            },
        });
        Ok(Token::from_parts(TableId::MethodDef, self.methods.len() as u32))
    }

    /// Add a parameter row; `sequence` 0 describes the return value.
    ///
    /// # Errors
    /// Returns an error if `method` was not added by this builder.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_param(
        &mut self,
        method: Token,
        flags: u16,
        sequence: u16,
        name: &str,
    ) -> Result<Token> {
        let method = self.member_index(method, TableId::MethodDef, self.methods.len())? as u32 + 1;

        self.params.push(Member {
            owner: method,
            row: ParamRow {
                flags,
                sequence,
                name: self.strings.add(name),
            },
        });
        Ok(Token::from_parts(TableId::Param, self.params.len() as u32))
    }

    /// Reference a method of `parent`; equal parent, name and signature bytes share one row.
    ///
    /// # Errors
    /// Returns an error if the signature cannot be encoded or `parent` cannot own a member
    /// reference.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_member_ref(
        &mut self,
        parent: Token,
        name: &str,
        signature: &SignatureMethod,
    ) -> Result<Token> {
        CodedIndex::try_from(parent)?.encode(CodedIndexType::MemberRefParent)?;

        let signature = self.blobs.add(&encode_method_signature(signature)?);
        let key = (parent, name.to_string(), signature);
        if let Some(token) = self.member_ref_index.get(&key) {
            return Ok(*token);
        }

        let name_index = self.strings.add(name);
        self.member_refs.push(MemberRefEntry {
            parent,
            name: name.to_string(),
            name_index,
            signature,
        });

        let token = Token::from_parts(TableId::MemberRef, self.member_refs.len() as u32);
        self.member_ref_index.insert(key, token);
        Ok(token)
    }

    /// Attach a custom attribute.
    ///
    /// Pseudo-custom attributes (`ComImport`, `Serializable`, `PreserveSig`) are folded into the
    /// flags of `parent` and `Ok(None)` is returned. An attribute identical to an existing one
    /// returns the existing row.
    ///
    /// # Errors
    /// Returns an error if `constructor` is not a `MethodDef` or `MemberRef` of this builder, or
    /// `parent` cannot carry attributes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_custom_attribute(
        &mut self,
        parent: Token,
        constructor: Token,
        value: &CustomAttributeValue,
    ) -> Result<Option<Token>> {
        CodedIndex::try_from(parent)?.encode(CodedIndexType::HasCustomAttribute)?;
        CodedIndex::try_from(constructor)?.encode(CodedIndexType::CustomAttributeType)?;

        if let Some(pseudo) = self.constructor_pseudo_attribute(constructor) {
            match (pseudo, parent.table_id()) {
                (PseudoAttribute::TypeFlag(flag), Some(TableId::TypeDef)) => {
                    let index = self.type_index(parent)?;
                    self.types[index].flags |= flag;
                    log::debug!("folded attribute into flags {flag:#x} of {parent}");
                    return Ok(None);
                }
                (PseudoAttribute::PreserveSig, Some(TableId::MethodDef)) => {
                    let index = self.member_index(parent, TableId::MethodDef, self.methods.len())?;
                    self.methods[index].row.impl_flags |= MethodImplAttributes::PRESERVE_SIG.bits();
                    log::debug!("folded PreserveSig into {parent}");
                    return Ok(None);
                }
                _ => {}
            }
        }

        let blob = self.blobs.add(&encode_custom_attribute_value(value));
        let key = (parent, constructor, blob);
        if !self.custom_attribute_index.insert(key) {
            let position = self
                .custom_attributes
                .iter()
                .position(|existing| *existing == key)
                .unwrap_or_default();
            return Ok(Some(Token::from_parts(
                TableId::CustomAttribute,
                position as u32 + 1,
            )));
        }

        self.custom_attributes.push(key);
        Ok(Some(Token::from_parts(
            TableId::CustomAttribute,
            self.custom_attributes.len() as u32,
        )))
    }

    fn constructor_pseudo_attribute(&self, constructor: Token) -> Option<PseudoAttribute> {
        if constructor.table_id()? != TableId::MemberRef {
            return None;
        }

        let member = self.member_refs.get((constructor.row() as usize).checked_sub(1)?)?;
        if member.name != ".ctor" || member.parent.table_id()? != TableId::TypeRef {
            return None;
        }

        let ty = self
            .type_refs
            .get((member.parent.row() as usize).checked_sub(1)?)?;
        pseudo_attribute(&ty.namespace, &ty.name)
    }

    /// Give a `Field`, `Param` or `Property` a default value and set its `HasDefault` flag.
    ///
    /// `value` holds the little-endian bytes of an `ELEMENT_TYPE_*` constant.
    ///
    /// # Errors
    /// Returns an error if `parent` cannot hold a constant or already has one.
    pub fn add_constant(&mut self, parent: Token, element_type: u8, value: &[u8]) -> Result<()> {
        if self.constants.iter().any(|(owner, _, _)| *owner == parent) {
            return Err(malformed_error!("{} already has a constant value", parent));
        }

        match parent.table_id() {
            Some(TableId::Field) => {
                let index = self.member_index(parent, TableId::Field, self.fields.len())?;
                self.fields[index].row.flags |= FieldAttributes::HAS_DEFAULT;
            }
            Some(TableId::Param) => {
                let index = self.member_index(parent, TableId::Param, self.params.len())?;
                self.params[index].row.flags |= ParamAttributes::HAS_DEFAULT;
            }
            Some(TableId::Property) => {
                let index = self.member_index(parent, TableId::Property, self.properties.len())?;
                self.properties[index].row.flags |= PropertyAttributes::HAS_DEFAULT;
            }
            _ => return Err(malformed_error!("{} cannot hold a constant", parent)),
        }

        let blob = self.blobs.add(value);
        self.constants.push((parent, element_type, blob));
        Ok(())
    }

    /// Attach a marshalling descriptor to a `Field` or `Param` and set `HasFieldMarshal`.
    ///
    /// # Errors
    /// Returns an error if `parent` is neither a field nor a parameter of this builder.
    pub fn add_field_marshal(&mut self, parent: Token, native_type: &NativeType) -> Result<()> {
        match parent.table_id() {
            Some(TableId::Field) => {
                let index = self.member_index(parent, TableId::Field, self.fields.len())?;
                self.fields[index].row.flags |= FieldAttributes::HAS_FIELD_MARSHAL;
            }
            Some(TableId::Param) => {
                let index = self.member_index(parent, TableId::Param, self.params.len())?;
                self.params[index].row.flags |= ParamAttributes::HAS_FIELD_MARSHAL;
            }
            _ => return Err(malformed_error!("{} cannot carry marshalling", parent)),
        }

        let blob = self.blobs.add(&encode_marshalling_descriptor(native_type));
        self.field_marshals.retain(|(owner, _)| *owner != parent);
        self.field_marshals.push((parent, blob));
        Ok(())
    }

    /// Set packing and instance size of `ty`.
    ///
    /// # Errors
    /// Returns an error if `ty` is not a defined type.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_class_layout(&mut self, ty: Token, packing_size: u16, class_size: u32) -> Result<()> {
        let parent = self.type_index(ty)? as u32 + 1;
        self.class_layouts.retain(|row| row.parent != parent);
        self.class_layouts.push(ClassLayoutRow {
            packing_size,
            class_size,
            parent,
        });
        Ok(())
    }

    /// Set the explicit byte offset of `field`.
    ///
    /// # Errors
    /// Returns an error if `field` was not added by this builder.
    pub fn set_field_offset(&mut self, field: Token, offset: u32) -> Result<()> {
        self.member_index(field, TableId::Field, self.fields.len())?;
        self.field_layouts.retain(|(existing, _)| *existing != field);
        self.field_layouts.push((field, offset));
        Ok(())
    }

    /// Add a property to `owner`; accessors are linked with [`Self::add_method_semantics`].
    ///
    /// # Errors
    /// Returns an error for an unknown owner or a signature that cannot be encoded.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_property(
        &mut self,
        owner: Token,
        flags: u16,
        name: &str,
        signature: &SignatureProperty,
    ) -> Result<Token> {
        let owner = self.type_index(owner)? as u32 + 1;
        let signature = self.blobs.add(&encode_property_signature(signature)?);

        self.properties.push(Member {
            owner,
            row: PropertyRow {
                flags,
                name: self.strings.add(name),
                signature,
            },
        });
        Ok(Token::from_parts(TableId::Property, self.properties.len() as u32))
    }

    /// Add an event of delegate type `event_type` to `owner`.
    ///
    /// # Errors
    /// Returns an error for an unknown owner or an `event_type` that is not a type.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_event(
        &mut self,
        owner: Token,
        flags: u16,
        name: &str,
        event_type: Token,
    ) -> Result<Token> {
        let owner = self.type_index(owner)? as u32 + 1;
        Self::expect_type(event_type)?;

        self.events.push(EventEntry {
            owner,
            flags,
            name: self.strings.add(name),
            event_type,
        });
        Ok(Token::from_parts(TableId::Event, self.events.len() as u32))
    }

    /// Link `method` to a property or event as accessor `semantics`.
    ///
    /// # Errors
    /// Returns an error for tokens that were not added by this builder.
    pub fn add_method_semantics(
        &mut self,
        semantics: u16,
        method: Token,
        association: Token,
    ) -> Result<()> {
        self.member_index(method, TableId::MethodDef, self.methods.len())?;
        match association.table_id() {
            Some(TableId::Property) => {
                self.member_index(association, TableId::Property, self.properties.len())?;
            }
            Some(TableId::Event) => {
                self.member_index(association, TableId::Event, self.events.len())?;
            }
            _ => {
                return Err(malformed_error!(
                    "{} is neither a property nor an event",
                    association
                ))
            }
        }

        self.method_semantics.push((semantics, method, association));
        Ok(())
    }

    /// Reference a native module; names are deduplicated case-insensitively.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_module_ref(&mut self, name: &str) -> Token {
        let key = name.to_ascii_lowercase();
        if let Some(token) = self.module_ref_index.get(&key) {
            return *token;
        }

        self.module_refs.push(ModuleRefRow {
            name: self.strings.add(name),
        });
        let token = Token::from_parts(TableId::ModuleRef, self.module_refs.len() as u32);
        self.module_ref_index.insert(key, token);
        token
    }

    /// Forward `method` to `import_name` in `module_ref` and mark it `PinvokeImpl`.
    ///
    /// # Errors
    /// Returns an error for tokens that were not added by this builder.
    pub fn add_impl_map(
        &mut self,
        method: Token,
        flags: PInvokeAttributes,
        import_name: &str,
        module_ref: Token,
    ) -> Result<()> {
        let index = self.member_index(method, TableId::MethodDef, self.methods.len())?;
        self.member_index(module_ref, TableId::ModuleRef, self.module_refs.len())?;

        self.methods[index].row.flags |= MethodAttributes::PINVOKE_IMPL;
        let import_name = self.strings.add(import_name);
        self.impl_maps.push((flags, method, import_name, module_ref));
        Ok(())
    }

    /// Nest `nested` inside `enclosing`.
    ///
    /// # Errors
    /// Returns an error if either type is not defined.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_nested_class(&mut self, nested: Token, enclosing: Token) -> Result<()> {
        let nested_class = self.type_index(nested)? as u32 + 1;
        let enclosing_class = self.type_index(enclosing)? as u32 + 1;

        self.nested_classes.push(NestedClassRow {
            nested_class,
            enclosing_class,
        });
        Ok(())
    }

    /// `true` once [`Self::save`] succeeded.
    #[must_use]
    pub fn is_saved(&self) -> bool {
        self.saved.is_some()
    }

    /// Serialize the assembly into a PE image.
    ///
    /// # Errors
    /// Returns [`Error::NoModule`] if no module was defined, or an error if a recorded reference
    /// cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let Some(module) = &self.module else {
            return Err(NoModule);
        };

        let tables = self.layout()?;
        let mut guids = self.guids.clone();
        let metadata = writer::write_metadata(
            &tables,
            &self.strings,
            &self.blobs,
            &mut guids,
            module.mvid,
        )?;

        Ok(writer::write_pe(
            &metadata.data,
            self.signature_size,
            metadata.timestamp,
        ))
    }

    /// Write the image to `path`. An assembly can be saved exactly once; later calls fail with
    /// [`Error::AlreadySaved`] and leave the file untouched.
    ///
    /// # Errors
    /// Returns [`Error::AlreadySaved`], the errors of [`Self::to_bytes`], or an I/O error.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(previous) = &self.saved {
            return Err(AlreadySaved(previous.clone()));
        }

        let image = self.to_bytes()?;
        let mut output = Output::create(path.as_ref(), image.len() as u64)?;
        output.write_at(0, &image)?;
        output.finalize()?;

        log::info!(
            "wrote {} ({} bytes)",
            path.as_ref().display(),
            image.len()
        );
        self.saved = Some(path.as_ref().to_path_buf());
        Ok(())
    }

    fn expect_type(token: Token) -> Result<()> {
        match token.table_id() {
            Some(TableId::TypeDef | TableId::TypeRef | TableId::TypeSpec) => Ok(()),
            _ => Err(malformed_error!("{} is not a type token", token)),
        }
    }

    fn type_index(&self, token: Token) -> Result<usize> {
        self.member_index(token, TableId::TypeDef, self.types.len())
    }

    fn member_index(&self, token: Token, table: TableId, count: usize) -> Result<usize> {
        let row = token.row() as usize;
        if token.table_id() != Some(table) || row == 0 || row > count {
            return Err(malformed_error!("{} is not a {:?} of this assembly", token, table));
        }
        Ok(row - 1)
    }

    /// Resolve every provisional token and produce the final, ordered rows.
    fn layout(&self) -> Result<TableSet> {
        let remap = Remap {
            field: permutation(self.fields.iter().map(|field| field.owner)),
            method: permutation(self.methods.iter().map(|method| method.owner)),
            param: Vec::new(),
            property: permutation(self.properties.iter().map(|property| property.owner)),
            event: permutation(self.events.iter().map(|event| event.owner)),
        };
        let param = permutation(self.params.iter().map(|param| {
            (
                remap.method[param.owner as usize - 1],
                param.row.sequence,
            )
        }));
        let remap = Remap { param, ..remap };

        let mut tables = TableSet::default();

        if let Some(module) = &self.module {
            tables.module.push(module.clone());
        }
        if let Some(assembly) = &self.assembly {
            tables.assembly.push(assembly.clone());
        }
        tables.assembly_ref.clone_from(&self.assembly_refs);
        tables.module_ref.clone_from(&self.module_refs);

        for entry in &self.type_refs {
            tables.type_ref.push(TypeRefRow {
                resolution_scope: CodedIndex::try_from(entry.scope)?,
                type_name: entry.strings.1,
                type_namespace: entry.strings.0,
            });
        }

        for entry in &self.member_refs {
            tables.member_ref.push(MemberRefRow {
                class: remap.coded(entry.parent)?,
                name: entry.name_index,
                signature: entry.signature,
            });
        }

        tables.field = apply(&remap.field, &self.fields, |field| field.row.clone());
        tables.param = apply(&remap.param, &self.params, |param| param.row.clone());
        tables.property = apply(&remap.property, &self.properties, |property| {
            property.row.clone()
        });
        for event in apply(&remap.event, &self.events, Clone::clone) {
            tables.event.push(EventRow {
                flags: event.flags,
                name: event.name,
                event_type: remap.coded(event.event_type)?,
            });
        }

        let param_starts = run_starts(
            self.methods.len(),
            self.params
                .iter()
                .map(|param| remap.method[param.owner as usize - 1]),
        );
        let mut methods = apply(&remap.method, &self.methods, |method| method.row.clone());
        for (index, method) in methods.iter_mut().enumerate() {
            method.param_list = param_starts[index];
        }
        tables.method_def = methods;

        let field_starts = run_starts(self.types.len(), self.fields.iter().map(|f| f.owner));
        let method_starts = run_starts(self.types.len(), self.methods.iter().map(|m| m.owner));
        for (index, entry) in self.types.iter().enumerate() {
            tables.type_def.push(TypeDefRow {
                flags: entry.flags,
                type_name: entry.strings.1,
                type_namespace: entry.strings.0,
                extends: match entry.extends {
                    Some(base) => CodedIndex::try_from(base)?,
                    None => CodedIndex::null(),
                },
                field_list: field_starts[index],
                method_list: method_starts[index],
            });
        }

        let property_starts =
            run_starts(self.types.len(), self.properties.iter().map(|p| p.owner));
        let event_starts = run_starts(self.types.len(), self.events.iter().map(|e| e.owner));
        for owner in owners(self.properties.iter().map(|p| p.owner)) {
            tables.property_map.push(PropertyMapRow {
                parent: owner,
                property_list: property_starts[owner as usize - 1],
            });
        }
        for owner in owners(self.events.iter().map(|e| e.owner)) {
            tables.event_map.push(EventMapRow {
                parent: owner,
                event_list: event_starts[owner as usize - 1],
            });
        }

        for (class, interface) in &self.interface_impls {
            tables.interface_impl.push(InterfaceImplRow {
                class: *class,
                interface: CodedIndex::try_from(*interface)?,
            });
        }
        tables
            .interface_impl
            .sort_by_key(|row| row.class);

        for (parent, base, value) in &self.constants {
            tables.constant.push(ConstantRow {
                base: *base,
                parent: remap.coded(*parent)?,
                value: *value,
            });
        }
        sort_by_coded(&mut tables.constant, CodedIndexType::HasConstant, |row| {
            row.parent
        })?;

        for (parent, constructor, value) in &self.custom_attributes {
            tables.custom_attribute.push(CustomAttributeRow {
                parent: remap.coded(*parent)?,
                constructor: remap.coded(*constructor)?,
                value: *value,
            });
        }
        sort_by_coded(
            &mut tables.custom_attribute,
            CodedIndexType::HasCustomAttribute,
            |row| row.parent,
        )?;

        for (parent, native_type) in &self.field_marshals {
            tables.field_marshal.push(FieldMarshalRow {
                parent: remap.coded(*parent)?,
                native_type: *native_type,
            });
        }
        sort_by_coded(
            &mut tables.field_marshal,
            CodedIndexType::HasFieldMarshal,
            |row| row.parent,
        )?;

        tables.class_layout.clone_from(&self.class_layouts);
        tables.class_layout.sort_by_key(|row| row.parent);

        for (field, offset) in &self.field_layouts {
            tables.field_layout.push(FieldLayoutRow {
                offset: *offset,
                field: remap.coded(*field)?.row,
            });
        }
        tables.field_layout.sort_by_key(|row| row.field);

        for (semantics, method, association) in &self.method_semantics {
            tables.method_semantics.push(MethodSemanticsRow {
                semantics: *semantics,
                method: remap.coded(*method)?.row,
                association: remap.coded(*association)?,
            });
        }
        sort_by_coded(
            &mut tables.method_semantics,
            CodedIndexType::HasSemantics,
            |row| row.association,
        )?;

        for (flags, method, import_name, module_ref) in &self.impl_maps {
            tables.impl_map.push(ImplMapRow {
                mapping_flags: flags.bits(),
                member_forwarded: remap.coded(*method)?,
                import_name: *import_name,
                import_scope: module_ref.row(),
            });
        }
        sort_by_coded(
            &mut tables.impl_map,
            CodedIndexType::MemberForwarded,
            |row| row.member_forwarded,
        )?;

        tables.nested_class.clone_from(&self.nested_classes);
        tables.nested_class.sort_by_key(|row| row.nested_class);

        Ok(tables)
    }
}

/// Final row numbers of the member tables, indexed by provisional row - 1.
struct Remap {
    field: Vec<u32>,
    method: Vec<u32>,
    param: Vec<u32>,
    property: Vec<u32>,
    event: Vec<u32>,
}

impl Remap {
    fn coded(&self, token: Token) -> Result<CodedIndex> {
        let index = CodedIndex::try_from(token)?;
        let table = match index.tag {
            TableId::Field => &self.field,
            TableId::MethodDef => &self.method,
            TableId::Param => &self.param,
            TableId::Property => &self.property,
            TableId::Event => &self.event,
            _ => return Ok(index),
        };

        match table.get(index.row as usize - 1) {
            Some(row) => Ok(CodedIndex::new(index.tag, *row)),
            None => Err(malformed_error!("Dangling reference to {}", token)),
        }
    }
}

/// Stable ordering of rows by `key`: returns the final 1-based row of every provisional row.
#[allow(clippy::cast_possible_truncation)]
fn permutation<K: Ord>(keys: impl Iterator<Item = K>) -> Vec<u32> {
    let mut order: Vec<(K, usize)> = keys.enumerate().map(|(index, key)| (key, index)).collect();
    order.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut remap = vec![0; order.len()];
    for (position, (_, provisional)) in order.into_iter().enumerate() {
        remap[provisional] = position as u32 + 1;
    }
    remap
}

/// Rows in final order.
fn apply<T, R>(remap: &[u32], rows: &[T], convert: impl Fn(&T) -> R) -> Vec<R> {
    let mut ordered: Vec<(u32, R)> = rows
        .iter()
        .zip(remap)
        .map(|(row, position)| (*position, convert(row)))
        .collect();
    ordered.sort_by_key(|(position, _)| *position);
    ordered.into_iter().map(|(_, row)| row).collect()
}

/// First row of each owner's run, for owners `1..=owner_count`.
///
/// An owner without rows points at the start of the next run, or one past the end.
#[allow(clippy::cast_possible_truncation)]
fn run_starts(owner_count: usize, owners: impl Iterator<Item = u32>) -> Vec<u32> {
    let mut counts = vec![0_u32; owner_count + 1];
    for owner in owners {
        counts[owner as usize - 1] += 1;
    }

    let mut next = 1;
    counts
        .iter()
        .take(owner_count)
        .map(|count| {
            let start = next;
            next += count;
            start
        })
        .collect()
}

/// Distinct owners in ascending order.
fn owners(owners: impl Iterator<Item = u32>) -> Vec<u32> {
    let mut owners: Vec<u32> = owners.collect();
    owners.sort_unstable();
    owners.dedup();
    owners
}

fn sort_by_coded<R>(
    rows: &mut Vec<R>,
    ci_type: CodedIndexType,
    key: impl Fn(&R) -> CodedIndex,
) -> Result<()> {
    let mut keyed = Vec::with_capacity(rows.len());
    for row in rows.drain(..) {
        keyed.push((key(&row).encode(ci_type)?, row));
    }

    keyed.sort_by_key(|(key, _)| *key);
    rows.extend(keyed.into_iter().map(|(_, row)| row));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        identity::AssemblyVersion,
        signatures::{SignatureParameter, TypeSignature},
    };

    fn started() -> AssemblyBuilder {
        let mut builder = AssemblyBuilder::new();
        builder
            .begin_assembly(&AssemblyIdentity::new(
                "Interop.Test",
                AssemblyVersion::new(1, 0, 0, 0),
            ))
            .unwrap();
        builder.define_module("Interop.Test.dll").unwrap();
        builder
    }

    fn void_method() -> SignatureMethod {
        SignatureMethod {
            has_this: true,
            return_type: SignatureParameter::value(TypeSignature::Void),
            params: vec![],
        }
    }

    fn int_field() -> SignatureField {
        SignatureField {
            base: TypeSignature::I4,
        }
    }

    #[test]
    fn references_are_deduplicated() {
        let mut builder = started();
        let first = builder.add_assembly_ref(&AssemblyIdentity::mscorlib());
        let second = builder.add_assembly_ref(&AssemblyIdentity::mscorlib());
        assert_eq!(first, second);

        let object = builder.add_type_ref(first, "System", "Object");
        assert_eq!(builder.add_type_ref(first, "System", "Object"), object);
        assert_ne!(builder.add_type_ref(first, "System", "Enum"), object);

        let ctor = builder.add_member_ref(object, ".ctor", &void_method()).unwrap();
        assert_eq!(
            builder.add_member_ref(object, ".ctor", &void_method()).unwrap(),
            ctor
        );
        assert_eq!(builder.add_module_ref("KERNEL32.dll"), builder.add_module_ref("kernel32.dll"));

        let tables = builder.layout().unwrap();
        assert_eq!(tables.assembly_ref.len(), 1);
        assert_eq!(tables.type_ref.len(), 2);
        assert_eq!(tables.member_ref.len(), 1);
        assert_eq!(tables.module_ref.len(), 1);
    }

    #[test]
    fn members_become_contiguous() {
        let mut builder = started();
        let a = builder.add_type_def(TypeAttributes::PUBLIC, "N", "A", None).unwrap();
        let b = builder.add_type_def(TypeAttributes::PUBLIC, "N", "B", None).unwrap();
        let empty = builder.add_type_def(TypeAttributes::PUBLIC, "N", "C", None).unwrap();

        // interleaved insertion: B's members first
        let b_field = builder.add_field(b, FieldAttributes::PUBLIC, "b1", &int_field()).unwrap();
        let a_field = builder.add_field(a, FieldAttributes::PUBLIC, "a1", &int_field()).unwrap();
        builder.add_field(b, FieldAttributes::PUBLIC, "b2", &int_field()).unwrap();
        let b_method = builder
            .add_method(b, MethodAttributes::PUBLIC, MethodImplAttributes::empty(), "M", &void_method())
            .unwrap();
        let a_method = builder
            .add_method(a, MethodAttributes::PUBLIC, MethodImplAttributes::empty(), "N", &void_method())
            .unwrap();
        builder.add_param(b_method, 0, 1, "x").unwrap();
        builder.add_param(a_method, 0, 1, "y").unwrap();
        builder.add_field_marshal(b_field, &NativeType::I4).unwrap();
        builder.add_constant(a_field, 0x08, &7_i32.to_le_bytes()).unwrap();

        let tables = builder.layout().unwrap();
        let rows = &tables.type_def;
        assert_eq!(rows.len(), 4);
        // <Module>, A, B, C
        assert_eq!(
            rows.iter().map(|row| row.field_list).collect::<Vec<_>>(),
            [1, 1, 2, 4]
        );
        assert_eq!(
            rows.iter().map(|row| row.method_list).collect::<Vec<_>>(),
            [1, 1, 2, 3]
        );
        let _ = empty;

        // A's field moved to row 1 and kept its constant
        assert_eq!(tables.field[0].flags & FieldAttributes::HAS_DEFAULT, FieldAttributes::HAS_DEFAULT);
        assert_eq!(tables.constant[0].parent, CodedIndex::new(TableId::Field, 1));
        assert_eq!(tables.field_marshal[0].parent, CodedIndex::new(TableId::Field, 2));

        // params follow their methods
        assert_eq!(tables.method_def[0].param_list, 1);
        assert_eq!(tables.method_def[1].param_list, 2);
        assert_eq!(tables.param[0].name, builder.strings.clone().add("y"));
    }

    #[test]
    fn pseudo_attributes_are_folded() {
        let mut builder = started();
        let mscorlib = builder.add_assembly_ref(&AssemblyIdentity::mscorlib());
        let com_import = builder.add_type_ref(
            mscorlib,
            "System.Runtime.InteropServices",
            "ComImportAttribute",
        );
        let guid = builder.add_type_ref(mscorlib, "System.Runtime.InteropServices", "GuidAttribute");
        let ctor = builder.add_member_ref(com_import, ".ctor", &void_method()).unwrap();
        let guid_ctor = builder
            .add_member_ref(
                guid,
                ".ctor",
                &SignatureMethod {
                    has_this: true,
                    return_type: SignatureParameter::value(TypeSignature::Void),
                    params: vec![SignatureParameter::value(TypeSignature::String)],
                },
            )
            .unwrap();

        let ty = builder
            .add_type_def(TypeAttributes::PUBLIC | TypeAttributes::INTERFACE, "N", "IFoo", None)
            .unwrap();
        let folded = builder
            .add_custom_attribute(ty, ctor, &CustomAttributeValue::default())
            .unwrap();
        assert!(folded.is_none());
        assert_ne!(builder.type_flags(ty).unwrap() & TypeAttributes::IMPORT, 0);

        let value = CustomAttributeValue::new(vec![
            crate::metadata::customattributes::CustomAttributeArgument::String(Some(
                "D437908E-65E6-487C-9735-7BDFF699BEA5".to_string(),
            )),
        ]);
        let first = builder.add_custom_attribute(ty, guid_ctor, &value).unwrap();
        let again = builder.add_custom_attribute(ty, guid_ctor, &value).unwrap();
        assert!(first.is_some());
        assert_eq!(first, again);
        assert_eq!(builder.layout().unwrap().custom_attribute.len(), 1);
    }

    #[test]
    fn module_contract() {
        let mut builder = AssemblyBuilder::new();
        assert!(matches!(builder.to_bytes(), Err(NoModule)));
        builder.define_module("a.dll").unwrap();
        assert!(matches!(builder.define_module("b.dll"), Err(MultipleModules)));
    }

    #[test]
    fn invalid_tokens_are_rejected() {
        let mut builder = started();
        let ty = builder.add_type_def(0, "N", "T", None).unwrap();
        assert!(builder
            .add_field(Token::from_parts(TableId::TypeDef, 9), 0, "f", &int_field())
            .is_err());
        assert!(builder.add_param(Token::from_parts(TableId::MethodDef, 1), 0, 1, "p").is_err());
        assert!(builder
            .add_type_def(0, "N", "U", Some(Token::from_parts(TableId::Field, 1)))
            .is_err());
        assert!(builder.add_constant(ty, 0x08, &[0; 4]).is_err());
        assert_eq!(builder.type_name(ty).as_deref(), Some("N.T"));
        assert_eq!(builder.find_type_def("N", "T"), Some(ty));
    }

    #[test]
    fn run_starts_skip_empty_owners() {
        assert_eq!(run_starts(4, [2_u32, 2, 4].into_iter()), [1, 1, 3, 3]);
        assert_eq!(run_starts(2, std::iter::empty()), [1, 1]);
        assert_eq!(permutation([3_u32, 1, 3, 2].into_iter()), [3, 1, 4, 2]);
    }
}
