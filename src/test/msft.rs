//! Byte-level MSFT image assembler.
//!
//! Produces images in the layout `typelib::msft` decodes, so the decoder can be tested against
//! libraries built with [`crate::typelib::TypeLibBuilder`] instead of checked-in binaries. Member
//! blocks are appended after the last segment, as `midl` does.

use std::collections::HashMap;

use uguid::Guid;

use crate::{
    file::io::write_le,
    typelib::{
        msft::{
            HEADER_SIZE, IMPINFO_OFFSET_IS_GUID, IMPINFO_SIZE, MSFT_MAGIC, SEGMENT_COUNT,
            SEGMENT_ENTRY_SIZE, FUNC_HAS_DEFAULTS, FUNC_ORDINAL_ENTRY, Segment,
        },
        CustomData, EntryPoint, ExternalTarget, ParamFlags, TypeDesc, TypeInfoData, TypeKind,
        TypeLib, Variant,
    },
    typelib::desc::{FuncData, VarData, VarValue, TYPEINFO_RECORD_SIZE},
};

/// Fixed part of a function record including every optional field.
const FUNC_RECORD_FIXED: usize = 52;
/// Size of a variable record including every optional field.
const VAR_RECORD_SIZE: usize = 40;

/// Serialize `lib` as an MSFT image.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn write_image(lib: &TypeLib) -> Vec<u8> {
    let mut tables = Tables::default();

    let lib_guid = tables.guid(lib.attr.guid);
    let lib_name = tables.name(&lib.name);
    let lib_doc = tables.string(lib.doc.as_deref());
    let help_file = tables.string(lib.help_file.as_deref());
    let lib_custom = tables.custom(&lib.custom);

    tables.imports(lib);

    let mut members = Vec::new();
    for data in &lib.types {
        tables.type_info(data);
        members.push(if data.funcs.is_empty() && data.vars.is_empty() {
            None
        } else {
            Some(tables.member_block(data))
        });
    }

    let segments = tables.segments();
    let mut start = HEADER_SIZE + lib.types.len() * 4 + SEGMENT_COUNT * SEGMENT_ENTRY_SIZE;
    let mut directory = Vec::with_capacity(SEGMENT_COUNT);
    for segment in &segments {
        if segment.is_empty() {
            directory.push((-1_i32, 0_i32));
        } else {
            directory.push((start as i32, segment.len() as i32));
            start += segment.len();
        }
    }

    // Member blocks follow the segments; patch their offsets into the type-info records
    let mut type_infos = segments[Segment::TypeInfo as usize].clone();
    let mut member_bytes = Vec::new();
    for (index, block) in members.iter().enumerate() {
        if let Some(block) = block {
            let at = index * TYPEINFO_RECORD_SIZE as usize + 4;
            let memoffset = (start + member_bytes.len()) as i32;
            type_infos[at..at + 4].copy_from_slice(&memoffset.to_le_bytes());
            member_bytes.extend_from_slice(block);
        }
    }

    let mut image = Vec::new();
    write_le(&mut image, MSFT_MAGIC);
    write_le(&mut image, 0x0001_0002_u32);
    write_le(&mut image, lib_guid);
    write_le(&mut image, lib.attr.lcid);
    write_le(&mut image, lib.attr.lcid);
    write_le(&mut image, lib.attr.syskind as u32);
    write_le(&mut image, u32::from(lib.attr.major) | (u32::from(lib.attr.minor) << 16));
    write_le(&mut image, u32::from(lib.attr.flags.bits()));
    write_le(&mut image, lib.types.len() as u32);
    write_le(&mut image, lib_doc);
    write_le(&mut image, 0_u32);
    write_le(&mut image, 0_u32);
    write_le(&mut image, tables.name_count);
    write_le(&mut image, tables.names.len() as u32);
    write_le(&mut image, lib_name);
    write_le(&mut image, help_file);
    write_le(&mut image, lib_custom);
    write_le(&mut image, 0_u32);
    write_le(&mut image, 0_u32);
    write_le(&mut image, -1_i32);
    write_le(&mut image, (segments[Segment::ImpInfo as usize].len() / IMPINFO_SIZE) as u32);
    debug_assert_eq!(image.len(), HEADER_SIZE);

    for index in 0..lib.types.len() {
        write_le(&mut image, (index * TYPEINFO_RECORD_SIZE as usize) as u32);
    }
    for (offset, length) in &directory {
        write_le(&mut image, *offset);
        write_le(&mut image, *length);
        write_le(&mut image, -1_i32);
        write_le(&mut image, 0x0F_i32);
    }
    for (index, segment) in segments.iter().enumerate() {
        if index == Segment::TypeInfo as usize {
            image.extend_from_slice(&type_infos);
        } else {
            image.extend_from_slice(segment);
        }
    }
    image.extend_from_slice(&member_bytes);
    image
}

#[derive(Default)]
struct Tables {
    type_infos: Vec<u8>,
    imp_info: Vec<u8>,
    imp_files: Vec<u8>,
    ref_tab: Vec<u8>,
    guids: Vec<u8>,
    names: Vec<u8>,
    name_count: u32,
    strings: Vec<u8>,
    typedescs: Vec<u8>,
    arrays: Vec<u8>,
    cust_data: Vec<u8>,
    cd_guids: Vec<u8>,
    name_cache: HashMap<String, i32>,
    guid_cache: HashMap<Guid, i32>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
impl Tables {
    fn segments(&self) -> Vec<Vec<u8>> {
        let mut segments = vec![Vec::new(); SEGMENT_COUNT];
        segments[Segment::TypeInfo as usize] = self.type_infos.clone();
        segments[Segment::ImpInfo as usize] = self.imp_info.clone();
        segments[Segment::ImpFiles as usize] = self.imp_files.clone();
        segments[Segment::RefTab as usize] = self.ref_tab.clone();
        segments[Segment::Guid as usize] = self.guids.clone();
        segments[Segment::Name as usize] = self.names.clone();
        segments[Segment::String as usize] = self.strings.clone();
        segments[Segment::TypeDesc as usize] = self.typedescs.clone();
        segments[Segment::ArrayDesc as usize] = self.arrays.clone();
        segments[Segment::CustData as usize] = self.cust_data.clone();
        segments[Segment::CdGuids as usize] = self.cd_guids.clone();
        segments
    }

    fn name(&mut self, name: &str) -> i32 {
        if let Some(offset) = self.name_cache.get(name) {
            return *offset;
        }
        let offset = self.names.len() as i32;
        write_le(&mut self.names, -1_i32);
        write_le(&mut self.names, -1_i32);
        write_le(&mut self.names, name.len() as u32);
        self.names.extend_from_slice(name.as_bytes());
        pad(&mut self.names);
        self.name_count += 1;
        self.name_cache.insert(name.to_string(), offset);
        offset
    }

    fn string(&mut self, value: Option<&str>) -> i32 {
        let Some(value) = value else {
            return -1;
        };
        let offset = self.strings.len() as i32;
        write_le(&mut self.strings, value.len() as u16);
        self.strings.extend_from_slice(value.as_bytes());
        pad(&mut self.strings);
        offset
    }

    fn guid(&mut self, guid: Guid) -> i32 {
        if guid == Guid::ZERO {
            return -1;
        }
        if let Some(offset) = self.guid_cache.get(&guid) {
            return *offset;
        }
        let offset = self.guids.len() as i32;
        self.guids.extend_from_slice(&guid.to_bytes());
        write_le(&mut self.guids, -1_i32);
        write_le(&mut self.guids, -1_i32);
        self.guid_cache.insert(guid, offset);
        offset
    }

    fn value(&mut self, value: &Variant) -> i32 {
        let vt = value.vartype() as u16;
        let packed_bits = match *value {
            Variant::Empty | Variant::Null => Some(0_u32),
            Variant::I1(v) => Some(u32::from(v as u8)),
            Variant::UI1(v) => Some(u32::from(v)),
            Variant::I2(v) => Some(u32::from(v as u16)),
            Variant::UI2(v) => Some(u32::from(v)),
            Variant::Bool(v) => Some(if v { 0xFFFF } else { 0 }),
            Variant::I4(v) | Variant::Int(v) | Variant::Error(v) => Some(v as u32),
            Variant::UI4(v) | Variant::UInt(v) => Some(v),
            _ => None,
        };
        if let Some(bits) = packed_bits {
            if bits <= 0x03FF_FFFF {
                return (0x8000_0000 | (u32::from(vt) << 26) | bits) as i32;
            }
        }

        let offset = self.cust_data.len() as i32;
        let out = &mut self.cust_data;
        write_le(out, vt);
        match value {
            Variant::Bstr(None) => write_le(out, -1_i32),
            Variant::Bstr(Some(text)) => {
                write_le(out, text.len() as i32);
                out.extend_from_slice(text.as_bytes());
            }
            Variant::R4(v) => write_le(out, *v),
            Variant::R8(v) | Variant::Date(v) => write_le(out, *v),
            Variant::Cy(v) | Variant::I8(v) => write_le(out, *v),
            Variant::UI8(v) => write_le(out, *v),
            Variant::Decimal(bytes) => out.extend_from_slice(bytes),
            Variant::Bool(v) => write_le(out, if *v { 0xFFFF_i32 } else { 0 }),
            other => write_le(out, other.as_i64().unwrap_or_default() as i32),
        }
        pad(out);
        offset
    }

    fn custom(&mut self, entries: &[CustomData]) -> i32 {
        let mut next = -1_i32;
        // Built back to front so every entry can point at its successor
        for entry in entries.iter().rev() {
            let guid = self.guid(entry.guid);
            let value = self.value(&entry.value);
            let offset = self.cd_guids.len() as i32;
            write_le(&mut self.cd_guids, guid);
            write_le(&mut self.cd_guids, value);
            write_le(&mut self.cd_guids, next);
            next = offset;
        }
        next
    }

    fn typedesc(&mut self, desc: &TypeDesc) -> i32 {
        let (w2, w3): (u16, u16) = match desc {
            TypeDesc::Base(vt) => return (0x8000_0000 | u32::from(*vt as u16)) as i32,
            TypeDesc::Ptr(inner) | TypeDesc::SafeArray(inner) => match inner.as_ref() {
                TypeDesc::Base(vt) => (*vt as u16, 0xFFFF),
                compound => (self.typedesc(compound) as u16, 0),
            },
            TypeDesc::UserDefined(href) => (href.0 as u16, (href.0 >> 16) as u16),
            TypeDesc::CArray(array) => {
                let element = self.typedesc(&array.element);
                let offset = self.arrays.len() as u16;
                write_le(&mut self.arrays, element);
                write_le(&mut self.arrays, array.bounds.len() as u16);
                write_le(&mut self.arrays, 0_u16);
                for bound in &array.bounds {
                    write_le(&mut self.arrays, bound.elements);
                    write_le(&mut self.arrays, bound.lower);
                }
                (offset, 0)
            }
        };

        let offset = self.typedescs.len() as i32;
        write_le(&mut self.typedescs, desc.vartype() as u16);
        write_le(&mut self.typedescs, 0_u16);
        write_le(&mut self.typedescs, w2);
        write_le(&mut self.typedescs, w3);
        offset
    }

    fn imports(&mut self, lib: &TypeLib) {
        let mut file_offsets = Vec::with_capacity(lib.imports.len());
        for import in &lib.imports {
            file_offsets.push(self.imp_files.len() as i32);
            let guid = self.guid(import.identity.guid);
            write_le(&mut self.imp_files, guid);
            write_le(&mut self.imp_files, import.identity.lcid);
            write_le(&mut self.imp_files, import.identity.major);
            write_le(&mut self.imp_files, import.identity.minor);
            write_le(&mut self.imp_files, (import.file_name.len() << 2) as u16);
            self.imp_files.extend_from_slice(import.file_name.as_bytes());
            pad(&mut self.imp_files);
        }

        let mut refs: Vec<_> = lib.external_refs.iter().collect();
        refs.sort_by_key(|(href, _)| href.0);
        for (href, reference) in refs {
            let at = (href.0 & !3) as usize;
            if self.imp_info.len() < at + IMPINFO_SIZE {
                self.imp_info.resize(at + IMPINFO_SIZE, 0);
            }
            let (flags, target) = match reference.target {
                ExternalTarget::Guid(guid) => (IMPINFO_OFFSET_IS_GUID, self.guid(guid)),
                ExternalTarget::Index(index) => (0, index as i32),
            };
            let mut record = Vec::with_capacity(IMPINFO_SIZE);
            write_le(&mut record, flags);
            write_le(&mut record, file_offsets[reference.import]);
            write_le(&mut record, target);
            self.imp_info[at..at + IMPINFO_SIZE].copy_from_slice(&record);
        }
    }

    fn type_info(&mut self, data: &TypeInfoData) {
        let datatype1 = match data.kind {
            TypeKind::Alias => data.alias.as_ref().map_or(-1, |alias| self.typedesc(alias)),
            TypeKind::Module => self.string(data.dll_name.as_deref()),
            TypeKind::Interface | TypeKind::Dispatch => {
                data.impls.first().map_or(-1, |parent| parent.href.0 as i32)
            }
            TypeKind::CoClass => {
                let mut next = -1_i32;
                for implemented in data.impls.iter().rev() {
                    let offset = self.ref_tab.len() as i32;
                    write_le(&mut self.ref_tab, implemented.href.0);
                    write_le(&mut self.ref_tab, u32::from(implemented.flags.bits()));
                    write_le(&mut self.ref_tab, -1_i32);
                    write_le(&mut self.ref_tab, next);
                    next = offset;
                }
                next
            }
            _ => -1,
        };

        let guid = self.guid(data.guid);
        let name = self.name(&data.name);
        let doc = self.string(data.doc.as_deref());
        let custom = self.custom(&data.custom);

        let out = &mut self.type_infos;
        write_le(out, data.kind as u32 | (u32::from(data.alignment) << 11));
        write_le(out, -1_i32);
        for _ in 0..4 {
            write_le(out, 0_u32);
        }
        write_le(out, data.funcs.len() as u32 | ((data.vars.len() as u32) << 16));
        for _ in 0..4 {
            write_le(out, 0_u32);
        }
        write_le(out, guid);
        write_le(out, u32::from(data.flags.bits()));
        write_le(out, name);
        write_le(out, u32::from(data.major) | (u32::from(data.minor) << 16));
        write_le(out, doc);
        write_le(out, 0_u32);
        write_le(out, 0_u32);
        write_le(out, custom);
        write_le(out, data.impls.len() as u16);
        write_le(out, data.size_vft);
        write_le(out, data.size_instance);
        write_le(out, datatype1);
        for _ in 0..3 {
            write_le(out, 0_u32);
        }
    }

    fn member_block(&mut self, data: &TypeInfoData) -> Vec<u8> {
        let mut records = Vec::new();
        let mut offsets = Vec::new();
        for func in &data.funcs {
            offsets.push(records.len() as i32);
            let record = self.func_record(func);
            records.extend_from_slice(&record);
        }
        for var in &data.vars {
            offsets.push(records.len() as i32);
            let record = self.var_record(var);
            records.extend_from_slice(&record);
        }

        let mut block = Vec::new();
        write_le(&mut block, records.len() as u32);
        block.extend_from_slice(&records);
        for func in &data.funcs {
            write_le(&mut block, func.memid);
        }
        for var in &data.vars {
            write_le(&mut block, var.memid);
        }
        for func in &data.funcs {
            let name = self.name(&func.name);
            write_le(&mut block, name);
        }
        for var in &data.vars {
            let name = self.name(&var.name);
            write_le(&mut block, name);
        }
        for offset in offsets {
            write_le(&mut block, offset);
        }
        block
    }

    fn func_record(&mut self, func: &FuncData) -> Vec<u8> {
        let has_defaults = func.params.iter().any(|p| p.elem.default.is_some());
        let count = func.params.len();
        let reclen = FUNC_RECORD_FIXED + count * 12 + if has_defaults { count * 4 } else { 0 };

        let mut fkccic = func.kind as u32 | ((func.invoke as u32) << 3) | ((func.callconv as u32) << 8);
        if has_defaults {
            fkccic |= FUNC_HAS_DEFAULTS;
        }
        let entry = match &func.entry {
            Some(EntryPoint::Ordinal(ordinal)) => {
                fkccic |= FUNC_ORDINAL_ENTRY;
                i32::from(*ordinal)
            }
            Some(EntryPoint::Name(name)) => self.string(Some(name)),
            None => -1,
        };
        let ret = self.typedesc(&func.ret.tdesc);
        let doc = self.string(func.doc.as_deref());

        let mut out = Vec::with_capacity(reclen);
        write_le(&mut out, reclen as u32);
        write_le(&mut out, ret);
        write_le(&mut out, u32::from(func.flags.bits()));
        write_le(&mut out, func.vtable_offset);
        write_le(&mut out, 0_u16);
        write_le(&mut out, fkccic);
        write_le(&mut out, count as u16);
        write_le(&mut out, func.opt_params);
        write_le(&mut out, 0_u32);
        write_le(&mut out, doc);
        write_le(&mut out, entry);
        write_le(&mut out, 0_u32);
        write_le(&mut out, 0_u32);
        write_le(&mut out, 0_u32);
        write_le(&mut out, -1_i32);

        if has_defaults {
            for param in &func.params {
                let raw = match &param.elem.default {
                    Some(value) if param.elem.flags.contains(ParamFlags::HASDEFAULT) => {
                        self.value(value)
                    }
                    _ => -1,
                };
                write_le(&mut out, raw);
            }
        }
        for param in &func.params {
            let tdesc = self.typedesc(&param.elem.tdesc);
            let name = param.name.as_deref().map_or(-1, |name| self.name(name));
            write_le(&mut out, tdesc);
            write_le(&mut out, name);
            write_le(&mut out, u32::from(param.elem.flags.bits()));
        }
        debug_assert_eq!(out.len(), reclen);
        out
    }

    fn var_record(&mut self, var: &VarData) -> Vec<u8> {
        let tdesc = self.typedesc(&var.elem.tdesc);
        let value = match &var.value {
            VarValue::Offset(offset) => *offset as i32,
            VarValue::Const(value) => self.value(value),
        };
        let doc = self.string(var.doc.as_deref());

        let mut out = Vec::with_capacity(VAR_RECORD_SIZE);
        write_le(&mut out, VAR_RECORD_SIZE as u32);
        write_le(&mut out, tdesc);
        write_le(&mut out, u32::from(var.flags.bits()));
        write_le(&mut out, var.kind as u16);
        write_le(&mut out, 0_u16);
        write_le(&mut out, value);
        write_le(&mut out, 0_u32);
        write_le(&mut out, doc);
        write_le(&mut out, 0_u32);
        write_le(&mut out, -1_i32);
        write_le(&mut out, 0_u32);
        debug_assert_eq!(out.len(), VAR_RECORD_SIZE);
        out
    }
}

fn pad(buffer: &mut Vec<u8>) {
    while buffer.len() % 4 != 0 {
        buffer.push(0x57);
    }
}

#[cfg(test)]
mod tests {
    use uguid::guid;

    use super::*;
    use crate::typelib::{TypeInfoBuilder, TypeLibBuilder};

    #[test]
    fn header_and_directory() {
        let mut builder = TypeLibBuilder::new("Tiny", guid!("0a0b0c0d-0000-4000-8000-00000000000a"));
        builder.add_type(TypeInfoBuilder::new("IOne", TypeKind::Interface));
        let image = write_image(&builder.build());
        assert_eq!(&image[..4], b"MSFT");
        assert_eq!(u32::from_le_bytes(image[0x20..0x24].try_into().unwrap()), 1);
        let typeinfo_dir = HEADER_SIZE + 4;
        let offset = i32::from_le_bytes(image[typeinfo_dir..typeinfo_dir + 4].try_into().unwrap());
        assert_eq!(
            offset as usize,
            HEADER_SIZE + 4 + SEGMENT_COUNT * SEGMENT_ENTRY_SIZE
        );
    }

    #[test]
    fn small_values_are_packed() {
        let mut tables = Tables::default();
        assert!(tables.value(&Variant::I4(5)) < 0);
        assert!(tables.value(&Variant::I2(-1)) < 0);
        assert_eq!(tables.value(&Variant::I4(-1)), 0);
        assert!(tables.value(&Variant::Bstr(Some("x".into()))) > 0);
    }
}
