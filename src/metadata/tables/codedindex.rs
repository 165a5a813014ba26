use strum::{EnumCount, EnumIter};

use crate::{
    metadata::{tables::TableId, token::Token},
    Error, Result,
};

/// The coded index kinds of ECMA-335 II.24.2.6.
///
/// A coded index packs a table tag into its low bits and a row into the rest, so a single column
/// can point into one of several tables.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[repr(usize)]
pub enum CodedIndexType {
    /// `TypeDef`, `TypeRef` or `TypeSpec`
    TypeDefOrRef,
    /// `Field`, `Param` or `Property`
    HasConstant,
    /// Anything that can carry a custom attribute
    HasCustomAttribute,
    /// `Field` or `Param`
    HasFieldMarshal,
    /// `TypeDef`, `MethodDef` or `Assembly`
    HasDeclSecurity,
    /// Parent of a `MemberRef`
    MemberRefParent,
    /// `Event` or `Property`
    HasSemantics,
    /// `MethodDef` or `MemberRef`
    MethodDefOrRef,
    /// `Field` or `MethodDef`
    MemberForwarded,
    /// `File`, `AssemblyRef` or `ExportedType`
    Implementation,
    /// Constructor of a custom attribute
    CustomAttributeType,
    /// Scope of a `TypeRef`
    ResolutionScope,
    /// `TypeDef` or `MethodDef`
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// The tables this coded index can reference, in tag order.
    #[must_use]
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            CodedIndexType::TypeDefOrRef => {
                &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec]
            }
            CodedIndexType::HasConstant => &[TableId::Field, TableId::Param, TableId::Property],
            CodedIndexType::HasCustomAttribute => &[
                TableId::MethodDef,
                TableId::Field,
                TableId::TypeRef,
                TableId::TypeDef,
                TableId::Param,
                TableId::InterfaceImpl,
                TableId::MemberRef,
                TableId::Module,
                TableId::DeclSecurity,
                TableId::Property,
                TableId::Event,
                TableId::StandAloneSig,
                TableId::ModuleRef,
                TableId::TypeSpec,
                TableId::Assembly,
                TableId::AssemblyRef,
                TableId::File,
                TableId::ExportedType,
                TableId::ManifestResource,
                TableId::GenericParam,
                TableId::GenericParamConstraint,
                TableId::MethodSpec,
            ],
            CodedIndexType::HasFieldMarshal => &[TableId::Field, TableId::Param],
            CodedIndexType::HasDeclSecurity => {
                &[TableId::TypeDef, TableId::MethodDef, TableId::Assembly]
            }
            CodedIndexType::MemberRefParent => &[
                TableId::TypeDef,
                TableId::TypeRef,
                TableId::ModuleRef,
                TableId::MethodDef,
                TableId::TypeSpec,
            ],
            CodedIndexType::HasSemantics => &[TableId::Event, TableId::Property],
            CodedIndexType::MethodDefOrRef => &[TableId::MethodDef, TableId::MemberRef],
            CodedIndexType::MemberForwarded => &[TableId::Field, TableId::MethodDef],
            CodedIndexType::Implementation => {
                &[TableId::File, TableId::AssemblyRef, TableId::ExportedType]
            }
            // Tags 0, 1 and 4 are unused; only 2 (MethodDef) and 3 (MemberRef) occur.
            CodedIndexType::CustomAttributeType => &[
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MemberRef,
                TableId::MemberRef,
            ],
            CodedIndexType::ResolutionScope => &[
                TableId::Module,
                TableId::ModuleRef,
                TableId::AssemblyRef,
                TableId::TypeRef,
            ],
            CodedIndexType::TypeOrMethodDef => &[TableId::TypeDef, TableId::MethodDef],
        }
    }

    /// Number of low bits holding the tag.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn tag_bits(&self) -> u8 {
        let count = self.tables().len() as u32;
        (u32::BITS - (count - 1).leading_zeros()) as u8
    }

    /// The tag that selects `table`, `None` if this coded index cannot reference it.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn tag_of(&self, table: TableId) -> Option<u32> {
        match (self, table) {
            (CodedIndexType::CustomAttributeType, TableId::MethodDef) => Some(2),
            (CodedIndexType::CustomAttributeType, TableId::MemberRef) => Some(3),
            (CodedIndexType::CustomAttributeType, _) => None,
            _ => self
                .tables()
                .iter()
                .position(|candidate| *candidate == table)
                .map(|pos| pos as u32),
        }
    }
}

/// A decoded coded index: the referenced table and row, plus the equivalent token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CodedIndex {
    /// The referenced table
    pub tag: TableId,
    /// The 1-based row, 0 for a null reference
    pub row: u32,
    /// The token equivalent of `tag` and `row`
    pub token: Token,
}

impl CodedIndex {
    /// Create a coded index pointing at `row` of `tag`.
    #[must_use]
    pub fn new(tag: TableId, row: u32) -> CodedIndex {
        CodedIndex {
            tag,
            row,
            token: Token::from_parts(tag, row),
        }
    }

    /// A null reference, used for `TypeDef.Extends` of interfaces and `<Module>`.
    #[must_use]
    pub fn null() -> CodedIndex {
        CodedIndex::new(TableId::TypeDef, 0)
    }

    /// `true` for a null reference.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.row == 0
    }

    /// Pack this reference as a `ci_type` coded index value.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `ci_type` cannot reference the tagged table.
    pub fn encode(&self, ci_type: CodedIndexType) -> Result<u32> {
        if self.row == 0 {
            return Ok(0);
        }

        match ci_type.tag_of(self.tag) {
            Some(tag) => Ok((self.row << ci_type.tag_bits()) | tag),
            None => Err(malformed_error!(
                "Table {:?} cannot be referenced by a {:?} coded index",
                self.tag,
                ci_type
            )),
        }
    }

    /// Unpack a `ci_type` coded index value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for a tag beyond the table list.
    pub fn decode(value: u32, ci_type: CodedIndexType) -> Result<CodedIndex> {
        let tag_bits = ci_type.tag_bits();
        let tag = value & ((1 << tag_bits) - 1);
        let row = value >> tag_bits;

        match ci_type.tables().get(tag as usize) {
            Some(table) => Ok(CodedIndex::new(*table, row)),
            None => Err(out_of_bounds_error!()),
        }
    }
}

impl TryFrom<Token> for CodedIndex {
    type Error = Error;

    fn try_from(token: Token) -> Result<Self> {
        if token.is_null() {
            return Err(malformed_error!("Cannot convert null token to CodedIndex"));
        }

        match token.table_id() {
            Some(table) => Ok(CodedIndex::new(table, token.row())),
            None => Err(malformed_error!("Unknown table in token {}", token)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_widths() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::HasSemantics.tag_bits(), 1);
        assert_eq!(CodedIndexType::MemberRefParent.tag_bits(), 3);
    }

    #[test]
    fn encode_decode() {
        let typeref = CodedIndex::new(TableId::TypeRef, 3);
        let value = typeref.encode(CodedIndexType::TypeDefOrRef).unwrap();
        assert_eq!(value, (3 << 2) | 1);
        assert_eq!(
            CodedIndex::decode(value, CodedIndexType::TypeDefOrRef).unwrap(),
            typeref
        );

        let ctor = CodedIndex::new(TableId::MemberRef, 7);
        let value = ctor.encode(CodedIndexType::CustomAttributeType).unwrap();
        assert_eq!(value, (7 << 3) | 3);
        assert_eq!(
            CodedIndex::decode(value, CodedIndexType::CustomAttributeType)
                .unwrap()
                .tag,
            TableId::MemberRef
        );
    }

    #[test]
    fn rejects_foreign_tables() {
        let field = CodedIndex::new(TableId::Field, 1);
        assert!(field.encode(CodedIndexType::TypeDefOrRef).is_err());
        assert_eq!(CodedIndex::null().encode(CodedIndexType::TypeDefOrRef).unwrap(), 0);
        assert!(CodedIndex::decode(3, CodedIndexType::TypeDefOrRef).is_err());
    }

    #[test]
    fn from_token() {
        let index = CodedIndex::try_from(Token(0x2300_0002)).unwrap();
        assert_eq!(index.tag, TableId::AssemblyRef);
        assert_eq!(index.row, 2);
        assert!(CodedIndex::try_from(Token(0)).is_err());
    }
}
