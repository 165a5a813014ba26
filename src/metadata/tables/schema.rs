use crate::metadata::tables::{CodedIndexType, TableId};

/// The storage class of one metadata table column.
///
/// Heap and table index columns are 2 or 4 bytes wide depending on the sizes recorded in
/// [`crate::metadata::tables::TableInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// Fixed 2-byte value (the `Constant.Type` byte plus its padding byte also uses this)
    U16,
    /// Fixed 4-byte value
    U32,
    /// Index into `#Strings`
    Str,
    /// Index into `#GUID`
    Guid,
    /// Index into `#Blob`
    Blob,
    /// Index into a single table
    Index(TableId),
    /// Coded index
    Coded(CodedIndexType),
}

use Column::{Blob, Coded, Guid, Index, Str, U16, U32};

impl TableId {
    /// Column layout of this table per ECMA-335 II.22.
    #[must_use]
    pub fn columns(self) -> &'static [Column] {
        match self {
            TableId::Module => &[U16, Str, Guid, Guid, Guid],
            TableId::TypeRef => &[Coded(CodedIndexType::ResolutionScope), Str, Str],
            TableId::TypeDef => &[
                U32,
                Str,
                Str,
                Coded(CodedIndexType::TypeDefOrRef),
                Index(TableId::Field),
                Index(TableId::MethodDef),
            ],
            TableId::FieldPtr => &[Index(TableId::Field)],
            TableId::Field => &[U16, Str, Blob],
            TableId::MethodPtr => &[Index(TableId::MethodDef)],
            TableId::MethodDef => &[U32, U16, U16, Str, Blob, Index(TableId::Param)],
            TableId::ParamPtr => &[Index(TableId::Param)],
            TableId::Param => &[U16, U16, Str],
            TableId::InterfaceImpl => &[
                Index(TableId::TypeDef),
                Coded(CodedIndexType::TypeDefOrRef),
            ],
            TableId::MemberRef => &[Coded(CodedIndexType::MemberRefParent), Str, Blob],
            TableId::Constant => &[U16, Coded(CodedIndexType::HasConstant), Blob],
            TableId::CustomAttribute => &[
                Coded(CodedIndexType::HasCustomAttribute),
                Coded(CodedIndexType::CustomAttributeType),
                Blob,
            ],
            TableId::FieldMarshal => &[Coded(CodedIndexType::HasFieldMarshal), Blob],
            TableId::DeclSecurity => &[U16, Coded(CodedIndexType::HasDeclSecurity), Blob],
            TableId::ClassLayout => &[U16, U32, Index(TableId::TypeDef)],
            TableId::FieldLayout => &[U32, Index(TableId::Field)],
            TableId::StandAloneSig => &[Blob],
            TableId::EventMap => &[Index(TableId::TypeDef), Index(TableId::Event)],
            TableId::EventPtr => &[Index(TableId::Event)],
            TableId::Event => &[U16, Str, Coded(CodedIndexType::TypeDefOrRef)],
            TableId::PropertyMap => &[Index(TableId::TypeDef), Index(TableId::Property)],
            TableId::PropertyPtr => &[Index(TableId::Property)],
            TableId::Property => &[U16, Str, Blob],
            TableId::MethodSemantics => &[
                U16,
                Index(TableId::MethodDef),
                Coded(CodedIndexType::HasSemantics),
            ],
            TableId::MethodImpl => &[
                Index(TableId::TypeDef),
                Coded(CodedIndexType::MethodDefOrRef),
                Coded(CodedIndexType::MethodDefOrRef),
            ],
            TableId::ModuleRef => &[Str],
            TableId::TypeSpec => &[Blob],
            TableId::ImplMap => &[
                U16,
                Coded(CodedIndexType::MemberForwarded),
                Str,
                Index(TableId::ModuleRef),
            ],
            TableId::FieldRVA => &[U32, Index(TableId::Field)],
            TableId::EncLog => &[U32, U32],
            TableId::EncMap => &[U32],
            TableId::Assembly => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
            TableId::AssemblyProcessor => &[U32],
            TableId::AssemblyOS => &[U32, U32, U32],
            TableId::AssemblyRef => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
            TableId::AssemblyRefProcessor => &[U32, Index(TableId::AssemblyRef)],
            TableId::AssemblyRefOS => &[U32, U32, U32, Index(TableId::AssemblyRef)],
            TableId::File => &[U32, Str, Blob],
            TableId::ExportedType => &[
                U32,
                U32,
                Str,
                Str,
                Coded(CodedIndexType::Implementation),
            ],
            TableId::ManifestResource => &[U32, U32, Str, Coded(CodedIndexType::Implementation)],
            TableId::NestedClass => &[Index(TableId::TypeDef), Index(TableId::TypeDef)],
            TableId::GenericParam => &[U16, U16, Coded(CodedIndexType::TypeOrMethodDef), Str],
            TableId::MethodSpec => &[Coded(CodedIndexType::MethodDefOrRef), Blob],
            TableId::GenericParamConstraint => &[
                Index(TableId::GenericParam),
                Coded(CodedIndexType::TypeDefOrRef),
            ],
        }
    }
}
