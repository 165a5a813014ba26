//! Typed rows for every table the emitter produces.

use crate::{
    metadata::tables::{CodedIndex, CodedIndexType, TableId, TableInfo},
    Result,
};

/// A row that can be serialized into the `#~` stream.
///
/// Implementors list their column values in [`TableId::columns`] order with coded indices
/// already packed; widths come from the [`TableInfo`] of the image being written.
pub trait RowWritable {
    /// The table this row belongs to.
    const TABLE: TableId;

    /// Column values in schema order.
    ///
    /// # Errors
    /// Returns an error if a coded index references a table its column cannot hold.
    fn values(&self) -> Result<Vec<u32>>;

    /// Append the serialized row to `buffer`.
    ///
    /// # Errors
    /// Returns an error if [`RowWritable::values`] fails or disagrees with the schema.
    fn row_write(&self, buffer: &mut Vec<u8>, sizes: &TableInfo) -> Result<()> {
        let columns = Self::TABLE.columns();
        let values = self.values()?;
        if values.len() != columns.len() {
            return Err(malformed_error!(
                "{:?} row has {} values for {} columns",
                Self::TABLE,
                values.len(),
                columns.len()
            ));
        }

        for (column, value) in columns.iter().zip(values) {
            sizes.write_column(buffer, *column, value);
        }
        Ok(())
    }
}

/// `Module` row.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRow {
    /// Generation, always 0
    pub generation: u16,
    /// `#Strings` index of the module name
    pub name: u32,
    /// `#GUID` index of the module version id
    pub mvid: u32,
}

impl RowWritable for ModuleRow {
    const TABLE: TableId = TableId::Module;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![u32::from(self.generation), self.name, self.mvid, 0, 0])
    }
}

/// `TypeRef` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRefRow {
    /// `Module`, `ModuleRef`, `AssemblyRef` or enclosing `TypeRef`
    pub resolution_scope: CodedIndex,
    /// `#Strings` index of the name
    pub type_name: u32,
    /// `#Strings` index of the namespace
    pub type_namespace: u32,
}

impl RowWritable for TypeRefRow {
    const TABLE: TableId = TableId::TypeRef;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            self.resolution_scope
                .encode(CodedIndexType::ResolutionScope)?,
            self.type_name,
            self.type_namespace,
        ])
    }
}

/// `TypeDef` row.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefRow {
    /// `TypeAttributes`
    pub flags: u32,
    /// `#Strings` index of the name
    pub type_name: u32,
    /// `#Strings` index of the namespace
    pub type_namespace: u32,
    /// Base type, null for interfaces and `<Module>`
    pub extends: CodedIndex,
    /// First row of this type's run in `Field`
    pub field_list: u32,
    /// First row of this type's run in `MethodDef`
    pub method_list: u32,
}

impl RowWritable for TypeDefRow {
    const TABLE: TableId = TableId::TypeDef;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            self.flags,
            self.type_name,
            self.type_namespace,
            self.extends.encode(CodedIndexType::TypeDefOrRef)?,
            self.field_list,
            self.method_list,
        ])
    }
}

/// `Field` row.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRow {
    /// `FieldAttributes`
    pub flags: u16,
    /// `#Strings` index of the name
    pub name: u32,
    /// `#Blob` index of the field signature
    pub signature: u32,
}

impl RowWritable for FieldRow {
    const TABLE: TableId = TableId::Field;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![u32::from(self.flags), self.name, self.signature])
    }
}

/// `MethodDef` row.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefRow {
    /// Body RVA, always 0 for metadata-only images
    pub rva: u32,
    /// `MethodImplAttributes`
    pub impl_flags: u16,
    /// `MethodAttributes`
    pub flags: u16,
    /// `#Strings` index of the name
    pub name: u32,
    /// `#Blob` index of the method signature
    pub signature: u32,
    /// First row of this method's run in `Param`
    pub param_list: u32,
}

impl RowWritable for MethodDefRow {
    const TABLE: TableId = TableId::MethodDef;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            self.rva,
            u32::from(self.impl_flags),
            u32::from(self.flags),
            self.name,
            self.signature,
            self.param_list,
        ])
    }
}

/// `Param` row.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRow {
    /// `ParamAttributes`
    pub flags: u16,
    /// 0 for the return value, 1.. for parameters
    pub sequence: u16,
    /// `#Strings` index of the name
    pub name: u32,
}

impl RowWritable for ParamRow {
    const TABLE: TableId = TableId::Param;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            u32::from(self.flags),
            u32::from(self.sequence),
            self.name,
        ])
    }
}

/// `InterfaceImpl` row.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceImplRow {
    /// Implementing `TypeDef` row
    pub class: u32,
    /// The implemented interface
    pub interface: CodedIndex,
}

impl RowWritable for InterfaceImplRow {
    const TABLE: TableId = TableId::InterfaceImpl;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            self.class,
            self.interface.encode(CodedIndexType::TypeDefOrRef)?,
        ])
    }
}

/// `MemberRef` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRefRow {
    /// Declaring type
    pub class: CodedIndex,
    /// `#Strings` index of the name
    pub name: u32,
    /// `#Blob` index of the signature
    pub signature: u32,
}

impl RowWritable for MemberRefRow {
    const TABLE: TableId = TableId::MemberRef;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            self.class.encode(CodedIndexType::MemberRefParent)?,
            self.name,
            self.signature,
        ])
    }
}

/// `Constant` row.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantRow {
    /// `ELEMENT_TYPE` of the value
    pub base: u8,
    /// Owning `Field`, `Param` or `Property`
    pub parent: CodedIndex,
    /// `#Blob` index of the little-endian value
    pub value: u32,
}

impl RowWritable for ConstantRow {
    const TABLE: TableId = TableId::Constant;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            u32::from(self.base),
            self.parent.encode(CodedIndexType::HasConstant)?,
            self.value,
        ])
    }
}

/// `CustomAttribute` row.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeRow {
    /// Attributed entity
    pub parent: CodedIndex,
    /// Attribute constructor
    pub constructor: CodedIndex,
    /// `#Blob` index of the attribute value
    pub value: u32,
}

impl RowWritable for CustomAttributeRow {
    const TABLE: TableId = TableId::CustomAttribute;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            self.parent.encode(CodedIndexType::HasCustomAttribute)?,
            self.constructor
                .encode(CodedIndexType::CustomAttributeType)?,
            self.value,
        ])
    }
}

/// `FieldMarshal` row.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMarshalRow {
    /// Marshalled `Field` or `Param`
    pub parent: CodedIndex,
    /// `#Blob` index of the native type descriptor
    pub native_type: u32,
}

impl RowWritable for FieldMarshalRow {
    const TABLE: TableId = TableId::FieldMarshal;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            self.parent.encode(CodedIndexType::HasFieldMarshal)?,
            self.native_type,
        ])
    }
}

/// `ClassLayout` row.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLayoutRow {
    /// Field alignment
    pub packing_size: u16,
    /// Total instance size
    pub class_size: u32,
    /// `TypeDef` row
    pub parent: u32,
}

impl RowWritable for ClassLayoutRow {
    const TABLE: TableId = TableId::ClassLayout;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            u32::from(self.packing_size),
            self.class_size,
            self.parent,
        ])
    }
}

/// `FieldLayout` row.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayoutRow {
    /// Byte offset inside the instance
    pub offset: u32,
    /// `Field` row
    pub field: u32,
}

impl RowWritable for FieldLayoutRow {
    const TABLE: TableId = TableId::FieldLayout;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![self.offset, self.field])
    }
}

/// `EventMap` row.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMapRow {
    /// `TypeDef` row
    pub parent: u32,
    /// First row of the type's run in `Event`
    pub event_list: u32,
}

impl RowWritable for EventMapRow {
    const TABLE: TableId = TableId::EventMap;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![self.parent, self.event_list])
    }
}

/// `Event` row.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    /// `EventAttributes`
    pub flags: u16,
    /// `#Strings` index of the name
    pub name: u32,
    /// Delegate type of the event
    pub event_type: CodedIndex,
}

impl RowWritable for EventRow {
    const TABLE: TableId = TableId::Event;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            u32::from(self.flags),
            self.name,
            self.event_type.encode(CodedIndexType::TypeDefOrRef)?,
        ])
    }
}

/// `PropertyMap` row.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMapRow {
    /// `TypeDef` row
    pub parent: u32,
    /// First row of the type's run in `Property`
    pub property_list: u32,
}

impl RowWritable for PropertyMapRow {
    const TABLE: TableId = TableId::PropertyMap;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![self.parent, self.property_list])
    }
}

/// `Property` row.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRow {
    /// `PropertyAttributes`
    pub flags: u16,
    /// `#Strings` index of the name
    pub name: u32,
    /// `#Blob` index of the property signature
    pub signature: u32,
}

impl RowWritable for PropertyRow {
    const TABLE: TableId = TableId::Property;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![u32::from(self.flags), self.name, self.signature])
    }
}

/// `MethodSemantics` row.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSemanticsRow {
    /// `MethodSemanticsAttributes`
    pub semantics: u16,
    /// Accessor `MethodDef` row
    pub method: u32,
    /// Owning `Event` or `Property`
    pub association: CodedIndex,
}

impl RowWritable for MethodSemanticsRow {
    const TABLE: TableId = TableId::MethodSemantics;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            u32::from(self.semantics),
            self.method,
            self.association.encode(CodedIndexType::HasSemantics)?,
        ])
    }
}

/// `ModuleRef` row.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRefRow {
    /// `#Strings` index of the native module name
    pub name: u32,
}

impl RowWritable for ModuleRefRow {
    const TABLE: TableId = TableId::ModuleRef;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![self.name])
    }
}

/// `ImplMap` row.
#[derive(Debug, Clone, PartialEq)]
pub struct ImplMapRow {
    /// `PInvokeAttributes`
    pub mapping_flags: u16,
    /// The forwarded `MethodDef`
    pub member_forwarded: CodedIndex,
    /// `#Strings` index of the entry point name
    pub import_name: u32,
    /// `ModuleRef` row
    pub import_scope: u32,
}

impl RowWritable for ImplMapRow {
    const TABLE: TableId = TableId::ImplMap;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            u32::from(self.mapping_flags),
            self.member_forwarded
                .encode(CodedIndexType::MemberForwarded)?,
            self.import_name,
            self.import_scope,
        ])
    }
}

/// `Assembly` row.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyRow {
    /// Hash algorithm, `0x8004` (SHA-1)
    pub hash_alg_id: u32,
    /// Version major
    pub major_version: u16,
    /// Version minor
    pub minor_version: u16,
    /// Version build
    pub build_number: u16,
    /// Version revision
    pub revision_number: u16,
    /// `AssemblyFlags`
    pub flags: u32,
    /// `#Blob` index of the public key
    pub public_key: u32,
    /// `#Strings` index of the name
    pub name: u32,
    /// `#Strings` index of the culture
    pub culture: u32,
}

impl RowWritable for AssemblyRow {
    const TABLE: TableId = TableId::Assembly;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            self.hash_alg_id,
            u32::from(self.major_version),
            u32::from(self.minor_version),
            u32::from(self.build_number),
            u32::from(self.revision_number),
            self.flags,
            self.public_key,
            self.name,
            self.culture,
        ])
    }
}

/// `AssemblyRef` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyRefRow {
    /// Version major
    pub major_version: u16,
    /// Version minor
    pub minor_version: u16,
    /// Version build
    pub build_number: u16,
    /// Version revision
    pub revision_number: u16,
    /// `AssemblyFlags`
    pub flags: u32,
    /// `#Blob` index of the public key or token
    pub public_key_or_token: u32,
    /// `#Strings` index of the name
    pub name: u32,
    /// `#Strings` index of the culture
    pub culture: u32,
    /// `#Blob` index of the hash value
    pub hash_value: u32,
}

impl RowWritable for AssemblyRefRow {
    const TABLE: TableId = TableId::AssemblyRef;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![
            u32::from(self.major_version),
            u32::from(self.minor_version),
            u32::from(self.build_number),
            u32::from(self.revision_number),
            self.flags,
            self.public_key_or_token,
            self.name,
            self.culture,
            self.hash_value,
        ])
    }
}

/// `NestedClass` row.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedClassRow {
    /// Nested `TypeDef` row
    pub nested_class: u32,
    /// Enclosing `TypeDef` row
    pub enclosing_class: u32,
}

impl RowWritable for NestedClassRow {
    const TABLE: TableId = TableId::NestedClass;

    fn values(&self) -> Result<Vec<u32>> {
        Ok(vec![self.nested_class, self.enclosing_class])
    }
}
