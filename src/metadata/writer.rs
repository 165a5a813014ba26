//! Serialization of finished table rows into metadata streams and a PE32 image.
//!
//! The image is a metadata-only library: one `.text` section holding the CLI header, an
//! optional strong-name signature slot and the metadata root. There is no IL, no import table
//! and no entry point.
//!
//! The module version id and the COFF timestamp are derived from a SHA-1 over the serialized
//! streams, so identical input always produces byte-identical output.

use sha1::{Digest, Sha1};

use crate::{
    file::io::{pad_to, patch_le_at, write_le},
    metadata::{
        cor20header::{Cor20Header, COR20_HEADER_SIZE, COMIMAGE_FLAGS_STRONGNAMESIGNED},
        heaps::{empty_user_strings, BlobHeapBuilder, GuidHeapBuilder, StringHeapBuilder},
        root::Root,
        tables::{
            AssemblyRefRow, AssemblyRow, ClassLayoutRow, ConstantRow, CustomAttributeRow,
            EventMapRow, EventRow, FieldLayoutRow, FieldMarshalRow, FieldRow, ImplMapRow,
            InterfaceImplRow, MemberRefRow, MethodDefRow, MethodSemanticsRow, ModuleRefRow,
            ModuleRow, NestedClassRow, ParamRow, PropertyMapRow, PropertyRow, RowWritable,
            TableId, TableInfo, TypeDefRow, TypeRefRow, TABLE_COUNT,
        },
    },
    Result,
};

/// Offset of `e_lfanew`'s target, the PE signature.
pub const PE_HEADER_OFFSET: usize = 0x80;
/// File offset of the optional header checksum.
pub const CHECKSUM_OFFSET: usize = PE_HEADER_OFFSET + 4 + 20 + 64;
/// RVA of the `.text` section and the CLI header at its start.
pub const TEXT_RVA: u32 = 0x2000;
/// Preferred load address.
pub const IMAGE_BASE: u32 = 0x1000_0000;

const FILE_ALIGNMENT: u32 = 0x200;
const SECTION_ALIGNMENT: u32 = 0x2000;
const OPTIONAL_HEADER_SIZE: u16 = 0xE0;
const IMAGE_FILE_MACHINE_I386: u16 = 0x014C;
// EXECUTABLE_IMAGE | 32BIT_MACHINE | DLL
const IMAGE_FILE_CHARACTERISTICS: u16 = 0x2102;
// DYNAMIC_BASE | NX_COMPAT | NO_SEH | TERMINAL_SERVER_AWARE
const DLL_CHARACTERISTICS: u16 = 0x8540;
// CNT_CODE | MEM_EXECUTE | MEM_READ
const TEXT_CHARACTERISTICS: u32 = 0x6000_0020;
const CLR_RUNTIME_HEADER_DIRECTORY: usize = 14;

#[rustfmt::skip]
const DOS_HEADER: [u8; 128] = [
    0x4D, 0x5A, 0x90, 0x00, 0x03, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00,
    0xB8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00,
    0x0E, 0x1F, 0xBA, 0x0E, 0x00, 0xB4, 0x09, 0xCD, 0x21, 0xB8, 0x01, 0x4C, 0xCD, 0x21, 0x54, 0x68,
    0x69, 0x73, 0x20, 0x70, 0x72, 0x6F, 0x67, 0x72, 0x61, 0x6D, 0x20, 0x63, 0x61, 0x6E, 0x6E, 0x6F,
    0x74, 0x20, 0x62, 0x65, 0x20, 0x72, 0x75, 0x6E, 0x20, 0x69, 0x6E, 0x20, 0x44, 0x4F, 0x53, 0x20,
    0x6D, 0x6F, 0x64, 0x65, 0x2E, 0x0D, 0x0D, 0x0A, 0x24, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Final rows of every table the importer produces, in table order.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    /// `Module`
    pub module: Vec<ModuleRow>,
    /// `TypeRef`
    pub type_ref: Vec<TypeRefRow>,
    /// `TypeDef`
    pub type_def: Vec<TypeDefRow>,
    /// `Field`
    pub field: Vec<FieldRow>,
    /// `MethodDef`
    pub method_def: Vec<MethodDefRow>,
    /// `Param`
    pub param: Vec<ParamRow>,
    /// `InterfaceImpl`
    pub interface_impl: Vec<InterfaceImplRow>,
    /// `MemberRef`
    pub member_ref: Vec<MemberRefRow>,
    /// `Constant`
    pub constant: Vec<ConstantRow>,
    /// `CustomAttribute`
    pub custom_attribute: Vec<CustomAttributeRow>,
    /// `FieldMarshal`
    pub field_marshal: Vec<FieldMarshalRow>,
    /// `ClassLayout`
    pub class_layout: Vec<ClassLayoutRow>,
    /// `FieldLayout`
    pub field_layout: Vec<FieldLayoutRow>,
    /// `EventMap`
    pub event_map: Vec<EventMapRow>,
    /// `Event`
    pub event: Vec<EventRow>,
    /// `PropertyMap`
    pub property_map: Vec<PropertyMapRow>,
    /// `Property`
    pub property: Vec<PropertyRow>,
    /// `MethodSemantics`
    pub method_semantics: Vec<MethodSemanticsRow>,
    /// `ModuleRef`
    pub module_ref: Vec<ModuleRefRow>,
    /// `ImplMap`
    pub impl_map: Vec<ImplMapRow>,
    /// `Assembly`
    pub assembly: Vec<AssemblyRow>,
    /// `AssemblyRef`
    pub assembly_ref: Vec<AssemblyRefRow>,
    /// `NestedClass`
    pub nested_class: Vec<NestedClassRow>,
}

impl TableSet {
    /// Row count of every table, indexed by [`TableId`].
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn counts(&self) -> [u32; TABLE_COUNT] {
        let mut counts = [0; TABLE_COUNT];
        let mut set = |table: TableId, rows: usize| counts[table as usize] = rows as u32;

        set(TableId::Module, self.module.len());
        set(TableId::TypeRef, self.type_ref.len());
        set(TableId::TypeDef, self.type_def.len());
        set(TableId::Field, self.field.len());
        set(TableId::MethodDef, self.method_def.len());
        set(TableId::Param, self.param.len());
        set(TableId::InterfaceImpl, self.interface_impl.len());
        set(TableId::MemberRef, self.member_ref.len());
        set(TableId::Constant, self.constant.len());
        set(TableId::CustomAttribute, self.custom_attribute.len());
        set(TableId::FieldMarshal, self.field_marshal.len());
        set(TableId::ClassLayout, self.class_layout.len());
        set(TableId::FieldLayout, self.field_layout.len());
        set(TableId::EventMap, self.event_map.len());
        set(TableId::Event, self.event.len());
        set(TableId::PropertyMap, self.property_map.len());
        set(TableId::Property, self.property.len());
        set(TableId::MethodSemantics, self.method_semantics.len());
        set(TableId::ModuleRef, self.module_ref.len());
        set(TableId::ImplMap, self.impl_map.len());
        set(TableId::Assembly, self.assembly.len());
        set(TableId::AssemblyRef, self.assembly_ref.len());
        set(TableId::NestedClass, self.nested_class.len());
        counts
    }

    /// Serialize all rows in table order using the column widths of `info`.
    ///
    /// # Errors
    /// Returns an error if a row holds a reference its column cannot encode.
    pub fn write_rows(&self, buffer: &mut Vec<u8>, info: &TableInfo) -> Result<()> {
        write_rows(buffer, info, &self.module)?;
        write_rows(buffer, info, &self.type_ref)?;
        write_rows(buffer, info, &self.type_def)?;
        write_rows(buffer, info, &self.field)?;
        write_rows(buffer, info, &self.method_def)?;
        write_rows(buffer, info, &self.param)?;
        write_rows(buffer, info, &self.interface_impl)?;
        write_rows(buffer, info, &self.member_ref)?;
        write_rows(buffer, info, &self.constant)?;
        write_rows(buffer, info, &self.custom_attribute)?;
        write_rows(buffer, info, &self.field_marshal)?;
        write_rows(buffer, info, &self.class_layout)?;
        write_rows(buffer, info, &self.field_layout)?;
        write_rows(buffer, info, &self.event_map)?;
        write_rows(buffer, info, &self.event)?;
        write_rows(buffer, info, &self.property_map)?;
        write_rows(buffer, info, &self.property)?;
        write_rows(buffer, info, &self.method_semantics)?;
        write_rows(buffer, info, &self.module_ref)?;
        write_rows(buffer, info, &self.impl_map)?;
        write_rows(buffer, info, &self.assembly)?;
        write_rows(buffer, info, &self.assembly_ref)?;
        write_rows(buffer, info, &self.nested_class)
    }
}

fn write_rows<R: RowWritable>(buffer: &mut Vec<u8>, info: &TableInfo, rows: &[R]) -> Result<()> {
    for row in rows {
        row.row_write(buffer, info)?;
    }
    Ok(())
}

/// Build the `#~` stream.
///
/// # Errors
/// Returns an error if a row cannot be serialized.
#[allow(clippy::cast_possible_truncation)]
pub fn write_tables_stream(
    tables: &TableSet,
    strings_len: usize,
    guids_len: usize,
    blobs_len: usize,
) -> Result<Vec<u8>> {
    let counts = tables.counts();
    let info = TableInfo::from_counts(&counts, strings_len, guids_len, blobs_len);

    let mut buffer = Vec::new();
    write_le(&mut buffer, 0_u32);
    write_le(&mut buffer, 2_u8);
    write_le(&mut buffer, 0_u8);
    write_le(&mut buffer, info.heap_sizes());
    write_le(&mut buffer, 1_u8);
    write_le(&mut buffer, info.valid_mask());
    write_le(&mut buffer, TableId::sorted_mask());
    for rows in counts.iter().filter(|rows| **rows > 0) {
        write_le(&mut buffer, *rows);
    }

    tables.write_rows(&mut buffer, &info)?;
    pad_to(&mut buffer, 4);
    Ok(buffer)
}

/// A serialized metadata root plus the values derived from its content hash.
#[derive(Debug, Clone)]
pub struct Metadata {
    /// The metadata root and all streams
    pub data: Vec<u8>,
    /// Module version id written into the `#GUID` heap
    pub mvid: uguid::Guid,
    /// COFF timestamp for the image
    pub timestamp: u32,
}

/// Serialize tables and heaps, fill the module version id at `mvid_index` from the content hash
/// and wrap everything in a metadata root.
///
/// # Errors
/// Returns an error if a row cannot be serialized or `mvid_index` is not a heap entry.
pub fn write_metadata(
    tables: &TableSet,
    strings: &StringHeapBuilder,
    blobs: &BlobHeapBuilder,
    guids: &mut GuidHeapBuilder,
    mvid_index: u32,
) -> Result<Metadata> {
    guids.set(mvid_index, uguid::Guid::ZERO)?;

    let tables_stream = write_tables_stream(tables, strings.len(), guids.len(), blobs.len())?;
    let strings_stream = strings.to_bytes();
    let user_strings = empty_user_strings();
    let blob_stream = blobs.to_bytes();

    let mut hasher = Sha1::new();
    hasher.update(&tables_stream);
    hasher.update(&strings_stream);
    hasher.update(&blob_stream);
    hasher.update(guids.to_bytes());
    let mut digest = [0_u8; 20];
    digest.copy_from_slice(&hasher.finalize());

    let (mvid, timestamp) = derive_identity(&digest);
    guids.set(mvid_index, mvid)?;
    let guid_stream = guids.to_bytes();

    let data = Root::write(&[
        ("#~", &tables_stream),
        ("#Strings", &strings_stream),
        ("#US", &user_strings),
        ("#GUID", &guid_stream),
        ("#Blob", &blob_stream),
    ]);

    Ok(Metadata {
        data,
        mvid,
        timestamp,
    })
}

/// Turn a content digest into a version 5 style GUID and a positive 31-bit timestamp.
#[must_use]
pub fn derive_identity(digest: &[u8; 20]) -> (uguid::Guid, u32) {
    let mut bytes = [0_u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes[7] = (bytes[7] & 0x0F) | 0x50;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;

    let timestamp =
        u32::from_le_bytes([digest[16], digest[17], digest[18], digest[19]]) & 0x7FFF_FFFF;
    (uguid::Guid::from_bytes(bytes), timestamp)
}

fn align(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Lay out a PE32 metadata-only image around `metadata`.
///
/// A non-zero `signature_size` reserves a zeroed strong-name signature slot directly behind the
/// CLI header and marks the image as strong-name signed.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn write_pe(metadata: &[u8], signature_size: usize, timestamp: u32) -> Vec<u8> {
    let signature_rva = TEXT_RVA + COR20_HEADER_SIZE;
    let signature_size = align(signature_size as u32, 4);
    let metadata_rva = signature_rva + signature_size;
    let text_size = metadata_rva - TEXT_RVA + metadata.len() as u32;
    let raw_size = align(text_size, FILE_ALIGNMENT);
    let image_size = align(TEXT_RVA + text_size, SECTION_ALIGNMENT);

    let mut image = Vec::with_capacity((FILE_ALIGNMENT + raw_size) as usize);
    image.extend_from_slice(&DOS_HEADER);

    // PE signature and COFF file header
    image.extend_from_slice(b"PE\0\0");
    write_le(&mut image, IMAGE_FILE_MACHINE_I386);
    write_le(&mut image, 1_u16);
    write_le(&mut image, timestamp);
    write_le(&mut image, 0_u32);
    write_le(&mut image, 0_u32);
    write_le(&mut image, OPTIONAL_HEADER_SIZE);
    write_le(&mut image, IMAGE_FILE_CHARACTERISTICS);

    // PE32 optional header
    write_le(&mut image, 0x010B_u16);
    write_le(&mut image, 8_u8);
    write_le(&mut image, 0_u8);
    write_le(&mut image, raw_size);
    write_le(&mut image, 0_u32);
    write_le(&mut image, 0_u32);
    write_le(&mut image, 0_u32);
    write_le(&mut image, TEXT_RVA);
    write_le(&mut image, 0_u32);
    write_le(&mut image, IMAGE_BASE);
    write_le(&mut image, SECTION_ALIGNMENT);
    write_le(&mut image, FILE_ALIGNMENT);
    write_le(&mut image, 4_u16);
    write_le(&mut image, 0_u16);
    write_le(&mut image, 0_u16);
    write_le(&mut image, 0_u16);
    write_le(&mut image, 4_u16);
    write_le(&mut image, 0_u16);
    write_le(&mut image, 0_u32);
    write_le(&mut image, image_size);
    write_le(&mut image, FILE_ALIGNMENT);
    write_le(&mut image, 0_u32);
    write_le(&mut image, 3_u16);
    write_le(&mut image, DLL_CHARACTERISTICS);
    write_le(&mut image, 0x0010_0000_u32);
    write_le(&mut image, 0x1000_u32);
    write_le(&mut image, 0x0010_0000_u32);
    write_le(&mut image, 0x1000_u32);
    write_le(&mut image, 0_u32);
    write_le(&mut image, 16_u32);
    for directory in 0..16 {
        if directory == CLR_RUNTIME_HEADER_DIRECTORY {
            write_le(&mut image, TEXT_RVA);
            write_le(&mut image, COR20_HEADER_SIZE);
        } else {
            write_le(&mut image, 0_u64);
        }
    }

    // section table
    image.extend_from_slice(b".text\0\0\0");
    write_le(&mut image, text_size);
    write_le(&mut image, TEXT_RVA);
    write_le(&mut image, raw_size);
    write_le(&mut image, FILE_ALIGNMENT);
    write_le(&mut image, 0_u32);
    write_le(&mut image, 0_u32);
    write_le(&mut image, 0_u16);
    write_le(&mut image, 0_u16);
    write_le(&mut image, TEXT_CHARACTERISTICS);
    image.resize(FILE_ALIGNMENT as usize, 0);

    // .text
    let mut header = Cor20Header::metadata_only(metadata_rva, metadata.len() as u32);
    if signature_size > 0 {
        header.flags |= COMIMAGE_FLAGS_STRONGNAMESIGNED;
        header.strong_name_signature_rva = signature_rva;
        header.strong_name_signature_size = signature_size;
    }
    header.write(&mut image);
    image.resize(image.len() + signature_size as usize, 0);
    image.extend_from_slice(metadata);
    image.resize((FILE_ALIGNMENT + raw_size) as usize, 0);

    let checksum = pe_checksum(&image, CHECKSUM_OFFSET);
    // the checksum field lies inside the header written above
    let _ = patch_le_at(&mut image, CHECKSUM_OFFSET, checksum);
    image
}

/// The PE optional header checksum of `data`, skipping the 4 byte field at `checksum_offset`.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn pe_checksum(data: &[u8], checksum_offset: usize) -> u32 {
    let mut sum: u64 = 0;
    let mut position = 0;
    while position + 1 < data.len() {
        if position >= checksum_offset && position < checksum_offset + 4 {
            position += 2;
            continue;
        }
        sum += u64::from(u16::from_le_bytes([data[position], data[position + 1]]));
        position += 2;
    }
    if position < data.len() && (position < checksum_offset || position >= checksum_offset + 4) {
        sum += u64::from(data[position]);
    }

    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    (sum as u32).wrapping_add(data.len() as u32)
}
