//! ECMA-335 metadata tables.
//!
//! - [`TableId`] names every table of the `#~` stream
//! - [`CodedIndexType`] / [`CodedIndex`] pack multi-table references
//! - [`Column`] and [`TableId::columns`] describe each table's schema
//! - [`TableInfo`] derives column widths from row counts and heap sizes
//! - the `*Row` structs are the rows the emitter writes, serialized through [`RowWritable`]
//!
//! The reader in [`crate::metadata::reader`] decodes any table through the same schema, so
//! writer and reader cannot disagree about a row layout.

mod codedindex;
mod rows;
mod schema;
mod tableid;
mod tableinfo;

pub use codedindex::{CodedIndex, CodedIndexType};
pub use rows::{
    AssemblyRefRow, AssemblyRow, ClassLayoutRow, ConstantRow, CustomAttributeRow, EventMapRow,
    EventRow, FieldLayoutRow, FieldMarshalRow, FieldRow, ImplMapRow, InterfaceImplRow,
    MemberRefRow, MethodDefRow, MethodSemanticsRow, ModuleRefRow, ModuleRow, NestedClassRow,
    ParamRow, PropertyMapRow, PropertyRow, RowWritable, TypeDefRow, TypeRefRow,
};
pub use schema::Column;
pub use tableid::{TableId, TABLE_COUNT};
pub use tableinfo::{TableInfo, TableRowInfo};
