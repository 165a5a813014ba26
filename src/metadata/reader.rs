//! Reading metadata back out of a PE image.
//!
//! [`AssemblyImage`] locates the CLI header through goblin's data directories, decodes every
//! table through the shared column schema and offers typed views of the rows the importer
//! cares about: the assembly identity, types, members and their custom attributes. It is used
//! to load previously imported reference assemblies and to inspect freshly written output.
//!
//! # Examples
//!
//! ```rust,no_run
//! use tlbscope::metadata::reader::AssemblyImage;
//!
//! let image = AssemblyImage::from_file("Interop.Shapes.dll")?;
//! for ty in image.type_defs()? {
//!     println!("{}", ty.full_name());
//! }
//! # Ok::<(), tlbscope::Error>(())
//! ```

use std::{ops::Range, path::Path};

use goblin::pe::PE;

use crate::{
    file::{
        io::{read_le_at, read_le_at_dyn},
        Physical,
    },
    metadata::{
        cor20header::Cor20Header,
        customattributes::{
            parse_custom_attribute_value, CustomAttributeArgument, CustomAttributeArgumentKind,
            CustomAttributeValue,
        },
        heaps::{Blob, Guids, Strings},
        identity::{AssemblyIdentity, AssemblyVersion},
        root::Root,
        signatures::{parse_method_signature, TypeSignature},
        tables::{
            ClassLayoutRow, CodedIndex, CodedIndexType, Column, FieldLayoutRow, NestedClassRow,
            TableId, TableInfo, TABLE_COUNT,
        },
        token::Token,
    },
    Result,
};

/// A `TypeDef` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefInfo {
    /// Token of the row
    pub token: Token,
    /// `TypeAttributes`
    pub flags: u32,
    /// Namespace, empty for none
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Base type, null for interfaces and `<Module>`
    pub extends: CodedIndex,
    /// `Field` rows owned by this type
    pub fields: Range<u32>,
    /// `MethodDef` rows owned by this type
    pub methods: Range<u32>,
}

impl TypeDefInfo {
    /// `Namespace.Name`
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// A `TypeRef` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRefInfo {
    /// Token of the row
    pub token: Token,
    /// Resolution scope
    pub scope: CodedIndex,
    /// Namespace
    pub namespace: String,
    /// Simple name
    pub name: String,
}

/// A `Field` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Token of the row
    pub token: Token,
    /// `FieldAttributes`
    pub flags: u16,
    /// Name
    pub name: String,
    /// Field signature blob
    pub signature: Vec<u8>,
}

/// A `MethodDef` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Token of the row
    pub token: Token,
    /// RVA of the body, 0 for metadata-only images
    pub rva: u32,
    /// `MethodImplAttributes`
    pub impl_flags: u16,
    /// `MethodAttributes`
    pub flags: u16,
    /// Name
    pub name: String,
    /// Method signature blob
    pub signature: Vec<u8>,
    /// `Param` rows owned by this method
    pub params: Range<u32>,
}

/// A `Param` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    /// Token of the row
    pub token: Token,
    /// `ParamAttributes`
    pub flags: u16,
    /// 0 for the return value, otherwise the 1-based position
    pub sequence: u16,
    /// Name
    pub name: String,
}

/// A `MemberRef` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRefInfo {
    /// Token of the row
    pub token: Token,
    /// Owning type or module
    pub parent: CodedIndex,
    /// Name
    pub name: String,
    /// Signature blob
    pub signature: Vec<u8>,
}

/// A `CustomAttribute` row with its attribute type resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    /// The attributed row
    pub parent: CodedIndex,
    /// Constructor reference
    pub constructor: CodedIndex,
    /// Namespace of the attribute type
    pub namespace: String,
    /// Name of the attribute type
    pub name: String,
    /// Raw value blob
    pub value: Vec<u8>,
    /// Parameter kinds of the constructor, when all of them can appear in a value blob
    pub kinds: Option<Vec<CustomAttributeArgumentKind>>,
}

impl AttributeInfo {
    /// Decode the value blob.
    ///
    /// # Errors
    /// Returns an error if the constructor takes parameters that cannot be decoded or the blob
    /// is malformed.
    pub fn parse_value(&self) -> Result<CustomAttributeValue> {
        match &self.kinds {
            Some(kinds) => parse_custom_attribute_value(&self.value, kinds),
            None => Err(crate::Error::NotSupported(format!(
                "constructor parameters of {}.{}",
                self.namespace, self.name
            ))),
        }
    }

    /// The first constructor argument as a string.
    #[must_use]
    pub fn string_argument(&self) -> Option<String> {
        match self.parse_value().ok()?.fixed_args.into_iter().next()? {
            CustomAttributeArgument::String(value) => value,
            _ => None,
        }
    }
}

/// A `Constant` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantInfo {
    /// `ELEMENT_TYPE_*` of the value
    pub element_type: u8,
    /// Owning field, parameter or property
    pub parent: CodedIndex,
    /// Little-endian value bytes
    pub value: Vec<u8>,
}

/// A `Property` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    /// Token of the row
    pub token: Token,
    /// `PropertyAttributes`
    pub flags: u16,
    /// Name
    pub name: String,
    /// Property signature blob
    pub signature: Vec<u8>,
}

/// An `Event` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    /// Token of the row
    pub token: Token,
    /// `EventAttributes`
    pub flags: u16,
    /// Name
    pub name: String,
    /// Delegate type
    pub event_type: CodedIndex,
}

/// A `MethodSemantics` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemanticsInfo {
    /// `MethodSemanticsAttributes`
    pub semantics: u16,
    /// The accessor method
    pub method: Token,
    /// The property or event
    pub association: CodedIndex,
}

/// An `ImplMap` row with its names resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplMapInfo {
    /// `PInvokeAttributes`
    pub flags: u16,
    /// The forwarded method
    pub member: CodedIndex,
    /// Entry point name
    pub import_name: String,
    /// Native module name
    pub module: String,
}

/// A parsed metadata-bearing PE image.
pub struct AssemblyImage {
    data: Vec<u8>,
    metadata: Range<usize>,
    header: Cor20Header,
    root: Root,
    info: TableInfo,
    rows: Vec<Vec<Vec<u32>>>,
}

impl AssemblyImage {
    /// Load and parse the image at `path`.
    ///
    /// # Errors
    /// Returns an I/O error, a goblin error for an invalid PE file, or
    /// [`crate::Error::Malformed`] for an image without valid metadata.
    pub fn from_file(path: impl AsRef<Path>) -> Result<AssemblyImage> {
        let physical = Physical::new(path)?;
        Self::from_bytes(physical.data().to_vec())
    }

    /// Parse an image held in memory.
    ///
    /// # Errors
    /// See [`AssemblyImage::from_file`].
    pub fn from_bytes(data: Vec<u8>) -> Result<AssemblyImage> {
        let (header, metadata) = {
            let pe = PE::parse(&data)?;
            let Some(optional_header) = pe.header.optional_header.as_ref() else {
                return Err(malformed_error!("File does not have an OptionalHeader"));
            };
            let Some(clr) = optional_header.data_directories.get_clr_runtime_header() else {
                return Err(malformed_error!(
                    "File does not have a CLR runtime header directory"
                ));
            };

            let clr_offset = rva_to_offset(&pe, clr.virtual_address)?;
            let Some(clr_data) = data.get(clr_offset..) else {
                return Err(out_of_bounds_error!());
            };
            let header = Cor20Header::read(clr_data)?;

            let start = rva_to_offset(&pe, header.meta_data_rva)?;
            let end = start + header.meta_data_size as usize;
            if end > data.len() {
                return Err(out_of_bounds_error!());
            }
            (header, start..end)
        };

        let root = Root::read(&data[metadata.clone()])?;
        let Some(tables) = root.stream(&data[metadata.clone()], "#~") else {
            return Err(malformed_error!("Metadata has no #~ stream"));
        };

        let (info, offset) = TableInfo::parse(tables)?;
        let rows = read_rows(tables, &info, offset)?;

        Ok(AssemblyImage {
            data,
            metadata,
            header,
            root,
            info,
            rows,
        })
    }

    /// The CLI header.
    #[must_use]
    pub fn header(&self) -> &Cor20Header {
        &self.header
    }

    /// The raw file bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of rows in `table`.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.info.rows(table)
    }

    /// Column values of one 1-based row, with coded indices still packed.
    #[must_use]
    pub fn row(&self, table: TableId, row: u32) -> Option<&[u32]> {
        self.rows[table as usize]
            .get((row as usize).checked_sub(1)?)
            .map(Vec::as_slice)
    }

    fn stream(&self, name: &str) -> &[u8] {
        self.root
            .stream(&self.data[self.metadata.clone()], name)
            .unwrap_or_default()
    }

    fn string(&self, index: u32) -> Result<String> {
        if index == 0 {
            return Ok(String::new());
        }
        Ok(Strings::from(self.stream("#Strings"))?
            .get(index as usize)?
            .to_string())
    }

    fn blob(&self, index: u32) -> Result<Vec<u8>> {
        if index == 0 {
            return Ok(Vec::new());
        }
        Ok(Blob::from(self.stream("#Blob"))?.get(index as usize)?.to_vec())
    }

    fn table(&self, table: TableId) -> impl Iterator<Item = (Token, &[u32])> {
        self.rows[table as usize]
            .iter()
            .enumerate()
            .map(move |(index, values)| {
                #[allow(clippy::cast_possible_truncation)]
                let token = Token::from_parts(table, index as u32 + 1);
                (token, values.as_slice())
            })
    }

    /// Name of the `Module` row.
    ///
    /// # Errors
    /// Returns an error for a missing module or a bad string index.
    pub fn module_name(&self) -> Result<String> {
        match self.row(TableId::Module, 1) {
            Some(values) => self.string(values[1]),
            None => Err(malformed_error!("Image has no Module row")),
        }
    }

    /// The module version id.
    ///
    /// # Errors
    /// Returns an error for a missing module or a bad GUID index.
    pub fn mvid(&self) -> Result<uguid::Guid> {
        match self.row(TableId::Module, 1) {
            Some(values) => Guids::from(self.stream("#GUID")).get(values[2] as usize),
            None => Err(malformed_error!("Image has no Module row")),
        }
    }

    /// Identity from the `Assembly` row, `None` for a bare module.
    ///
    /// # Errors
    /// Returns an error for bad heap indices.
    pub fn identity(&self) -> Result<Option<AssemblyIdentity>> {
        let Some(values) = self.row(TableId::Assembly, 1) else {
            return Ok(None);
        };

        let version = version_of(&values[1..5]);
        let identity = AssemblyIdentity::new(self.string(values[7])?, version)
            .with_public_key(&self.blob(values[6])?)
            .with_culture(&self.string(values[8])?);
        Ok(Some(identity))
    }

    /// All `AssemblyRef` rows.
    ///
    /// # Errors
    /// Returns an error for bad heap indices.
    pub fn assembly_refs(&self) -> Result<Vec<AssemblyIdentity>> {
        let mut result = Vec::new();
        for (_, values) in self.table(TableId::AssemblyRef) {
            let version = version_of(&values[0..4]);
            let identity = AssemblyIdentity::new(self.string(values[6])?, version)
                .with_culture(&self.string(values[7])?);
            let key = self.blob(values[5])?;

            result.push(if values[4] & 1 == 1 {
                identity.with_public_key(&key)
            } else if let Ok(token) = <[u8; 8]>::try_from(key.as_slice()) {
                identity.with_token(token)
            } else {
                identity
            });
        }
        Ok(result)
    }

    /// All `TypeDef` rows with their member ranges.
    ///
    /// # Errors
    /// Returns an error for bad heap indices or coded indices.
    pub fn type_defs(&self) -> Result<Vec<TypeDefInfo>> {
        let field_end = self.row_count(TableId::Field) + 1;
        let method_end = self.row_count(TableId::MethodDef) + 1;
        let rows = &self.rows[TableId::TypeDef as usize];

        let mut result = Vec::with_capacity(rows.len());
        for (token, values) in self.table(TableId::TypeDef) {
            let next = rows.get(token.row() as usize);
            result.push(TypeDefInfo {
                token,
                flags: values[0],
                name: self.string(values[1])?,
                namespace: self.string(values[2])?,
                extends: CodedIndex::decode(values[3], CodedIndexType::TypeDefOrRef)?,
                fields: values[4]..next.map_or(field_end, |next| next[4]),
                methods: values[5]..next.map_or(method_end, |next| next[5]),
            });
        }
        Ok(result)
    }

    /// The `TypeDef` named `namespace.name`.
    ///
    /// # Errors
    /// Returns an error for bad heap indices.
    pub fn find_type(&self, namespace: &str, name: &str) -> Result<Option<TypeDefInfo>> {
        Ok(self
            .type_defs()?
            .into_iter()
            .find(|ty| ty.namespace == namespace && ty.name == name))
    }

    /// All `TypeRef` rows.
    ///
    /// # Errors
    /// Returns an error for bad heap indices or coded indices.
    pub fn type_refs(&self) -> Result<Vec<TypeRefInfo>> {
        let mut result = Vec::new();
        for (token, values) in self.table(TableId::TypeRef) {
            result.push(TypeRefInfo {
                token,
                scope: CodedIndex::decode(values[0], CodedIndexType::ResolutionScope)?,
                name: self.string(values[1])?,
                namespace: self.string(values[2])?,
            });
        }
        Ok(result)
    }

    /// All `Field` rows.
    ///
    /// # Errors
    /// Returns an error for bad heap indices.
    #[allow(clippy::cast_possible_truncation)]
    pub fn fields(&self) -> Result<Vec<FieldInfo>> {
        let mut result = Vec::new();
        for (token, values) in self.table(TableId::Field) {
            result.push(FieldInfo {
                token,
                flags: values[0] as u16,
                name: self.string(values[1])?,
                signature: self.blob(values[2])?,
            });
        }
        Ok(result)
    }

    /// All `MethodDef` rows with their parameter ranges.
    ///
    /// # Errors
    /// Returns an error for bad heap indices.
    #[allow(clippy::cast_possible_truncation)]
    pub fn methods(&self) -> Result<Vec<MethodInfo>> {
        let param_end = self.row_count(TableId::Param) + 1;
        let rows = &self.rows[TableId::MethodDef as usize];

        let mut result = Vec::new();
        for (token, values) in self.table(TableId::MethodDef) {
            let next = rows.get(token.row() as usize);
            result.push(MethodInfo {
                token,
                rva: values[0],
                impl_flags: values[1] as u16,
                flags: values[2] as u16,
                name: self.string(values[3])?,
                signature: self.blob(values[4])?,
                params: values[5]..next.map_or(param_end, |next| next[5]),
            });
        }
        Ok(result)
    }

    /// All `Param` rows.
    ///
    /// # Errors
    /// Returns an error for bad heap indices.
    #[allow(clippy::cast_possible_truncation)]
    pub fn params(&self) -> Result<Vec<ParamInfo>> {
        let mut result = Vec::new();
        for (token, values) in self.table(TableId::Param) {
            result.push(ParamInfo {
                token,
                flags: values[0] as u16,
                sequence: values[1] as u16,
                name: self.string(values[2])?,
            });
        }
        Ok(result)
    }

    /// All `MemberRef` rows.
    ///
    /// # Errors
    /// Returns an error for bad heap indices or coded indices.
    pub fn member_refs(&self) -> Result<Vec<MemberRefInfo>> {
        let mut result = Vec::new();
        for (token, values) in self.table(TableId::MemberRef) {
            result.push(MemberRefInfo {
                token,
                parent: CodedIndex::decode(values[0], CodedIndexType::MemberRefParent)?,
                name: self.string(values[1])?,
                signature: self.blob(values[2])?,
            });
        }
        Ok(result)
    }

    /// `(class, interface)` of every `InterfaceImpl` row.
    ///
    /// # Errors
    /// Returns an error for a bad coded index.
    pub fn interface_impls(&self) -> Result<Vec<(Token, CodedIndex)>> {
        self.table(TableId::InterfaceImpl)
            .map(|(_, values)| {
                Ok((
                    Token::from_parts(TableId::TypeDef, values[0]),
                    CodedIndex::decode(values[1], CodedIndexType::TypeDefOrRef)?,
                ))
            })
            .collect()
    }

    /// All `Constant` rows.
    ///
    /// # Errors
    /// Returns an error for bad heap indices or coded indices.
    #[allow(clippy::cast_possible_truncation)]
    pub fn constants(&self) -> Result<Vec<ConstantInfo>> {
        let mut result = Vec::new();
        for (_, values) in self.table(TableId::Constant) {
            result.push(ConstantInfo {
                element_type: values[0] as u8,
                parent: CodedIndex::decode(values[1], CodedIndexType::HasConstant)?,
                value: self.blob(values[2])?,
            });
        }
        Ok(result)
    }

    /// `(parent, descriptor)` of every `FieldMarshal` row.
    ///
    /// # Errors
    /// Returns an error for bad heap indices or coded indices.
    pub fn field_marshals(&self) -> Result<Vec<(CodedIndex, Vec<u8>)>> {
        let mut result = Vec::new();
        for (_, values) in self.table(TableId::FieldMarshal) {
            result.push((
                CodedIndex::decode(values[0], CodedIndexType::HasFieldMarshal)?,
                self.blob(values[1])?,
            ));
        }
        Ok(result)
    }

    /// All `ClassLayout` rows.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn class_layouts(&self) -> Vec<ClassLayoutRow> {
        self.table(TableId::ClassLayout)
            .map(|(_, values)| ClassLayoutRow {
                packing_size: values[0] as u16,
                class_size: values[1],
                parent: values[2],
            })
            .collect()
    }

    /// All `FieldLayout` rows.
    #[must_use]
    pub fn field_layouts(&self) -> Vec<FieldLayoutRow> {
        self.table(TableId::FieldLayout)
            .map(|(_, values)| FieldLayoutRow {
                offset: values[0],
                field: values[1],
            })
            .collect()
    }

    /// All `NestedClass` rows.
    #[must_use]
    pub fn nested_classes(&self) -> Vec<NestedClassRow> {
        self.table(TableId::NestedClass)
            .map(|(_, values)| NestedClassRow {
                nested_class: values[0],
                enclosing_class: values[1],
            })
            .collect()
    }

    /// Fields of the `TypeDef` `owner`.
    ///
    /// # Errors
    /// Returns an error for bad heap indices or an unknown owner.
    pub fn fields_of(&self, owner: Token) -> Result<Vec<FieldInfo>> {
        let range = self.type_def(owner)?.fields;
        Ok(self
            .fields()?
            .into_iter()
            .filter(|field| range.contains(&field.token.row()))
            .collect())
    }

    /// Methods of the `TypeDef` `owner`.
    ///
    /// # Errors
    /// Returns an error for bad heap indices or an unknown owner.
    pub fn methods_of(&self, owner: Token) -> Result<Vec<MethodInfo>> {
        let range = self.type_def(owner)?.methods;
        Ok(self
            .methods()?
            .into_iter()
            .filter(|method| range.contains(&method.token.row()))
            .collect())
    }

    /// Parameter rows of the `MethodDef` `method`, return parameter included.
    ///
    /// # Errors
    /// Returns an error for bad heap indices or an unknown method.
    pub fn params_of(&self, method: Token) -> Result<Vec<ParamInfo>> {
        let range = self
            .methods()?
            .into_iter()
            .find(|info| info.token == method)
            .map(|info| info.params)
            .ok_or_else(|| malformed_error!("no method {method}"))?;
        Ok(self
            .params()?
            .into_iter()
            .filter(|param| range.contains(&param.token.row()))
            .collect())
    }

    fn type_def(&self, owner: Token) -> Result<TypeDefInfo> {
        self.type_defs()?
            .into_iter()
            .find(|ty| ty.token == owner)
            .ok_or_else(|| malformed_error!("no type definition {owner}"))
    }

    /// Properties of the `TypeDef` `owner`, found through `PropertyMap`.
    ///
    /// # Errors
    /// Returns an error for bad heap indices.
    #[allow(clippy::cast_possible_truncation)]
    pub fn properties_of(&self, owner: Token) -> Result<Vec<PropertyInfo>> {
        let range = self.map_range(TableId::PropertyMap, TableId::Property, owner);
        let mut result = Vec::new();
        for row in range {
            if let Some(values) = self.row(TableId::Property, row) {
                result.push(PropertyInfo {
                    token: Token::from_parts(TableId::Property, row),
                    flags: values[0] as u16,
                    name: self.string(values[1])?,
                    signature: self.blob(values[2])?,
                });
            }
        }
        Ok(result)
    }

    /// Events of the `TypeDef` `owner`, found through `EventMap`.
    ///
    /// # Errors
    /// Returns an error for bad heap indices or coded indices.
    #[allow(clippy::cast_possible_truncation)]
    pub fn events_of(&self, owner: Token) -> Result<Vec<EventInfo>> {
        let range = self.map_range(TableId::EventMap, TableId::Event, owner);
        let mut result = Vec::new();
        for row in range {
            if let Some(values) = self.row(TableId::Event, row) {
                result.push(EventInfo {
                    token: Token::from_parts(TableId::Event, row),
                    flags: values[0] as u16,
                    name: self.string(values[1])?,
                    event_type: CodedIndex::decode(values[2], CodedIndexType::TypeDefOrRef)?,
                });
            }
        }
        Ok(result)
    }

    fn map_range(&self, map: TableId, members: TableId, owner: Token) -> Range<u32> {
        let rows = &self.rows[map as usize];
        let Some(position) = rows.iter().position(|values| values[0] == owner.row()) else {
            return 0..0;
        };

        let end = rows
            .get(position + 1)
            .map_or(self.row_count(members) + 1, |next| next[1]);
        rows[position][1]..end
    }

    /// All `MethodSemantics` rows.
    ///
    /// # Errors
    /// Returns an error for a bad coded index.
    #[allow(clippy::cast_possible_truncation)]
    pub fn method_semantics(&self) -> Result<Vec<SemanticsInfo>> {
        self.table(TableId::MethodSemantics)
            .map(|(_, values)| {
                Ok(SemanticsInfo {
                    semantics: values[0] as u16,
                    method: Token::from_parts(TableId::MethodDef, values[1]),
                    association: CodedIndex::decode(values[2], CodedIndexType::HasSemantics)?,
                })
            })
            .collect()
    }

    /// All `ImplMap` rows.
    ///
    /// # Errors
    /// Returns an error for bad heap indices or coded indices.
    #[allow(clippy::cast_possible_truncation)]
    pub fn impl_maps(&self) -> Result<Vec<ImplMapInfo>> {
        let mut result = Vec::new();
        for (_, values) in self.table(TableId::ImplMap) {
            let module = match self.row(TableId::ModuleRef, values[3]) {
                Some(module) => self.string(module[0])?,
                None => String::new(),
            };
            result.push(ImplMapInfo {
                flags: values[0] as u16,
                member: CodedIndex::decode(values[1], CodedIndexType::MemberForwarded)?,
                import_name: self.string(values[2])?,
                module,
            });
        }
        Ok(result)
    }

    /// Every custom attribute with its attribute type resolved.
    ///
    /// # Errors
    /// Returns an error for bad heap indices, coded indices or constructor signatures.
    pub fn custom_attributes(&self) -> Result<Vec<AttributeInfo>> {
        let mut result = Vec::new();
        for (_, values) in self.table(TableId::CustomAttribute) {
            let parent = CodedIndex::decode(values[0], CodedIndexType::HasCustomAttribute)?;
            let constructor = CodedIndex::decode(values[1], CodedIndexType::CustomAttributeType)?;
            let (namespace, name, signature) = self.constructor_info(constructor)?;

            let kinds = parse_method_signature(&signature)
                .ok()
                .and_then(|signature| {
                    signature
                        .params
                        .iter()
                        .map(|param| self.argument_kind(&param.base))
                        .collect::<Option<Vec<_>>>()
                });

            result.push(AttributeInfo {
                parent,
                constructor,
                namespace,
                name,
                value: self.blob(values[2])?,
                kinds,
            });
        }
        Ok(result)
    }

    /// Custom attributes attached to `parent`.
    ///
    /// # Errors
    /// See [`AssemblyImage::custom_attributes`].
    pub fn attributes_of(&self, parent: Token) -> Result<Vec<AttributeInfo>> {
        Ok(self
            .custom_attributes()?
            .into_iter()
            .filter(|attribute| attribute.parent.token == parent)
            .collect())
    }

    /// The attribute of type `namespace.name` on `parent`.
    ///
    /// # Errors
    /// See [`AssemblyImage::custom_attributes`].
    pub fn find_attribute(
        &self,
        parent: Token,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AttributeInfo>> {
        Ok(self
            .attributes_of(parent)?
            .into_iter()
            .find(|attribute| attribute.namespace == namespace && attribute.name == name))
    }

    fn constructor_info(&self, constructor: CodedIndex) -> Result<(String, String, Vec<u8>)> {
        let (parent, signature) = match constructor.tag {
            TableId::MemberRef => {
                let Some(values) = self.row(TableId::MemberRef, constructor.row) else {
                    return Err(malformed_error!("Dangling constructor {}", constructor.token));
                };
                (
                    CodedIndex::decode(values[0], CodedIndexType::MemberRefParent)?,
                    self.blob(values[2])?,
                )
            }
            TableId::MethodDef => {
                let Some(values) = self.row(TableId::MethodDef, constructor.row) else {
                    return Err(malformed_error!("Dangling constructor {}", constructor.token));
                };
                let owner = self.method_owner(constructor.row);
                (CodedIndex::new(TableId::TypeDef, owner), self.blob(values[4])?)
            }
            _ => return Err(malformed_error!("Invalid constructor {}", constructor.token)),
        };

        let (namespace, name) = self.type_name(parent)?;
        Ok((namespace, name, signature))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn method_owner(&self, method: u32) -> u32 {
        let rows = &self.rows[TableId::TypeDef as usize];
        let mut owner = 0;
        for (index, values) in rows.iter().enumerate() {
            if values[5] <= method {
                owner = index as u32 + 1;
            }
        }
        owner
    }

    /// `(namespace, name)` of a `TypeDef` or `TypeRef`.
    ///
    /// # Errors
    /// Returns an error for other tables or dangling rows.
    pub fn type_name(&self, ty: CodedIndex) -> Result<(String, String)> {
        if !matches!(ty.tag, TableId::TypeDef | TableId::TypeRef) {
            return Err(malformed_error!("{} does not name a type", ty.token));
        }

        // both tables store the name in column 1 and the namespace in column 2
        let Some(values) = self.row(ty.tag, ty.row) else {
            return Err(malformed_error!("Dangling type reference {}", ty.token));
        };
        let (name, namespace) = (values[1], values[2]);
        Ok((self.string(namespace)?, self.string(name)?))
    }

    fn argument_kind(&self, signature: &TypeSignature) -> Option<CustomAttributeArgumentKind> {
        match signature {
            TypeSignature::Boolean => Some(CustomAttributeArgumentKind::Bool),
            TypeSignature::I2 => Some(CustomAttributeArgumentKind::I2),
            TypeSignature::U2 => Some(CustomAttributeArgumentKind::U2),
            TypeSignature::I4 => Some(CustomAttributeArgumentKind::I4),
            TypeSignature::U4 => Some(CustomAttributeArgumentKind::U4),
            TypeSignature::I8 => Some(CustomAttributeArgumentKind::I8),
            TypeSignature::String => Some(CustomAttributeArgumentKind::String),
            TypeSignature::Class(token) => {
                let index = CodedIndex::try_from(*token).ok()?;
                match self.type_name(index).ok()? {
                    (namespace, name) if namespace == "System" && name == "Type" => {
                        Some(CustomAttributeArgumentKind::Type)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn version_of(values: &[u32]) -> AssemblyVersion {
    AssemblyVersion::new(
        values[0] as u16,
        values[1] as u16,
        values[2] as u16,
        values[3] as u16,
    )
}

/// Map an RVA to a file offset through the section table.
fn rva_to_offset(pe: &PE<'_>, rva: u32) -> Result<usize> {
    for section in &pe.sections {
        let size = section.virtual_size.max(section.size_of_raw_data);
        let Some(end) = section.virtual_address.checked_add(size) else {
            continue;
        };

        if section.virtual_address <= rva && rva < end {
            let offset = rva - section.virtual_address + section.pointer_to_raw_data;
            return Ok(offset as usize);
        }
    }

    Err(malformed_error!("RVA {:#x} lies outside every section", rva))
}

fn read_rows(data: &[u8], info: &TableInfo, mut offset: usize) -> Result<Vec<Vec<Vec<u32>>>> {
    use strum::IntoEnumIterator;

    let mut tables = vec![Vec::new(); TABLE_COUNT];
    for table in TableId::iter() {
        let count = info.rows(table);
        if count == 0 {
            continue;
        }
        if (count as usize).saturating_mul(info.row_size(table)) > data.len() {
            return Err(out_of_bounds_error!());
        }

        let columns = table.columns();
        let mut rows = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut values = Vec::with_capacity(columns.len());
            for column in columns {
                values.push(match column {
                    Column::U16 => u32::from(read_le_at::<u16>(data, &mut offset)?),
                    Column::U32 => read_le_at::<u32>(data, &mut offset)?,
                    _ => read_le_at_dyn(data, &mut offset, info.column_size(*column) == 4)?,
                });
            }
            rows.push(values);
        }
        tables[table as usize] = rows;
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        builder::AssemblyBuilder,
        customattributes::CustomAttributeValue,
        flags::{FieldAttributes, MethodAttributes, MethodImplAttributes, TypeAttributes},
        signatures::{SignatureField, SignatureMethod, SignatureParameter},
    };

    fn sample() -> Vec<u8> {
        let mut builder = AssemblyBuilder::new();
        builder
            .begin_assembly(
                &AssemblyIdentity::new("Interop.Sample", AssemblyVersion::new(2, 1, 0, 0)),
            )
            .unwrap();
        builder.define_module("Interop.Sample.dll").unwrap();

        let mscorlib = builder.add_assembly_ref(&AssemblyIdentity::mscorlib());
        let value_type = builder.add_type_ref(mscorlib, "System", "ValueType");
        let guid_attr =
            builder.add_type_ref(mscorlib, "System.Runtime.InteropServices", "GuidAttribute");
        let guid_ctor = builder
            .add_member_ref(
                guid_attr,
                ".ctor",
                &SignatureMethod {
                    has_this: true,
                    return_type: SignatureParameter::value(TypeSignature::Void),
                    params: vec![SignatureParameter::value(TypeSignature::String)],
                },
            )
            .unwrap();

        let point = builder
            .add_type_def(
                TypeAttributes::PUBLIC | TypeAttributes::SEQUENTIAL_LAYOUT,
                "Sample",
                "Point",
                Some(value_type),
            )
            .unwrap();
        let field_sig = SignatureField {
            base: TypeSignature::I4,
        };
        builder.add_field(point, FieldAttributes::PUBLIC, "x", &field_sig).unwrap();
        builder.add_field(point, FieldAttributes::PUBLIC, "y", &field_sig).unwrap();
        builder.set_class_layout(point, 4, 0).unwrap();

        let iface = builder
            .add_type_def(
                TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
                "Sample",
                "IShape",
                None,
            )
            .unwrap();
        builder
            .add_method(
                iface,
                MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::ABSTRACT,
                MethodImplAttributes::RUNTIME | MethodImplAttributes::INTERNAL_CALL,
                "Draw",
                &SignatureMethod {
                    has_this: true,
                    return_type: SignatureParameter::value(TypeSignature::Void),
                    params: vec![],
                },
            )
            .unwrap();
        builder
            .add_custom_attribute(
                iface,
                guid_ctor,
                &CustomAttributeValue::new(vec![CustomAttributeArgument::String(Some(
                    "11111111-2222-3333-4444-555555555555".to_string(),
                ))]),
            )
            .unwrap();

        builder.to_bytes().unwrap()
    }

    #[test]
    fn reads_back_builder_output() {
        let image = AssemblyImage::from_bytes(sample()).unwrap();

        let identity = image.identity().unwrap().unwrap();
        assert_eq!(identity.name, "Interop.Sample");
        assert_eq!(identity.version, AssemblyVersion::new(2, 1, 0, 0));
        assert_eq!(image.module_name().unwrap(), "Interop.Sample.dll");
        assert_ne!(image.mvid().unwrap(), uguid::Guid::ZERO);

        let refs = image.assembly_refs().unwrap();
        assert_eq!(refs, vec![AssemblyIdentity::mscorlib()]);

        let types = image.type_defs().unwrap();
        assert_eq!(types.len(), 3);
        assert_eq!(types[0].name, "<Module>");
        assert_eq!(types[1].full_name(), "Sample.Point");
        assert_eq!(types[1].fields, 1..3);
        assert_eq!(types[2].fields, 3..3);
        assert_eq!(types[2].methods, 1..2);

        let fields = image.fields().unwrap();
        assert_eq!(fields[1].name, "y");
        assert_eq!(image.class_layouts()[0].packing_size, 4);

        let methods = image.methods().unwrap();
        assert_eq!(methods[0].name, "Draw");
        assert_eq!(methods[0].rva, 0);

        let guid = image
            .find_attribute(types[2].token, "System.Runtime.InteropServices", "GuidAttribute")
            .unwrap()
            .unwrap();
        assert_eq!(
            guid.string_argument().as_deref(),
            Some("11111111-2222-3333-4444-555555555555")
        );
    }

    #[test]
    fn output_is_deterministic() {
        assert_eq!(sample(), sample());
    }

    #[test]
    fn rejects_non_pe() {
        assert!(AssemblyImage::from_bytes(vec![0; 64]).is_err());

        let mut image = sample();
        // break the metadata signature
        let header = AssemblyImage::from_bytes(image.clone()).unwrap();
        let offset = 0x200 + (header.header().meta_data_rva - 0x2000) as usize;
        image[offset] = 0;
        assert!(AssemblyImage::from_bytes(image).is_err());
    }
}
