//! Decoder for MSFT type library images.
//!
//! MSFT is the format written by `midl` and `ICreateTypeLib2` since OLE Automation 2. An image
//! starts with a fixed header, followed by one offset per type-info, a directory of fifteen
//! segments and the segments themselves:
//!
//! | # | Segment | Contents |
//! |---|---|---|
//! | 0 | type-info table | one 0x64-byte record per type |
//! | 1 | import info | 12-byte records naming a type inside an imported library |
//! | 2 | import files | identity and file name of imported libraries |
//! | 3 | reference table | implemented-interface chains of coclasses |
//! | 5 | GUID table | 24-byte GUID entries |
//! | 7 | name table | identifiers |
//! | 8 | string table | help strings, DLL names, entry points |
//! | 9 | typedesc table | 8-byte compound type descriptions |
//! | 10 | array descriptions | bounds of C-style arrays |
//! | 11 | custom data | out-of-line constant values |
//! | 12 | custom data GUIDs | chains linking GUID keys to values |
//!
//! Function and variable records of a type live behind the type-info record at its member
//! offset, followed by parallel arrays of member ids, names and record offsets.
//!
//! The decoder copies everything into owned [`TypeInfoData`] records; nothing borrows from the
//! input once [`parse`] returns.

use std::collections::HashMap;

use uguid::Guid;

use crate::{
    file::{io::read_le_at, Parser},
    typelib::{
        desc::{
            ArrayBound, ArrayDesc, ElemData, EntryPoint, ExternalRef, ExternalTarget, FuncData,
            HRefType, ImplTypeData, ImportedLib, LibAttr, LibraryIdentity, ParamData, TypeDesc,
            TypeInfoData, VarData, VarValue, TYPEINFO_RECORD_SIZE,
        },
        status,
        types::{
            CallConv, FuncFlags, FuncKind, ImplTypeFlags, InvokeKind, LibFlags, ParamFlags,
            SysKind, TypeFlags, TypeKind, VarFlags, VarKind, VarType, VARTYPE_MASK,
        },
        value::Variant,
        CustomData, TypeLib,
    },
    Error, Result,
};

/// `MSFT`
pub const MSFT_MAGIC: u32 = 0x5446_534D;
/// `SLTG`, the compact format of 16-bit and early 32-bit tools
pub const SLTG_MAGIC: u32 = 0x4754_4C53;
/// Size of the fixed header
pub const HEADER_SIZE: usize = 0x54;
/// Size of one segment directory entry
pub const SEGMENT_ENTRY_SIZE: usize = 16;
/// Number of segment directory entries
pub const SEGMENT_COUNT: usize = 15;
/// Size of one import-info record
pub const IMPINFO_SIZE: usize = 12;
/// `varflags` bit announcing an extra help-DLL string offset after the header
pub const HELPDLL_FLAG: u32 = 0x100;
/// Import-info flag: `oGuid` is an offset into the GUID table, not a type index
pub const IMPINFO_OFFSET_IS_GUID: u32 = 0x0001_0000;

/// `FKCCIC` bit: the function record carries custom data
pub const FUNC_HAS_CUSTDATA: u32 = 0x0080;
/// `FKCCIC` bit: the function record carries default values
pub const FUNC_HAS_DEFAULTS: u32 = 0x1000;
/// `FKCCIC` bit: the entry point is an ordinal
pub const FUNC_ORDINAL_ENTRY: u32 = 0x2000;

/// Size of one parameter info inside a function record
pub const PARAMINFO_SIZE: usize = 12;

/// Field offsets inside a function record; optional fields exist if the record reaches past them.
pub mod func_record {
    /// `HelpContext`
    pub const HELP_CONTEXT: usize = 24;
    /// `oHelpString`
    pub const HELP_STRING: usize = 28;
    /// `oEntry`
    pub const ENTRY: usize = 32;
    /// `oCustData`
    pub const CUSTDATA: usize = 48;
}

/// Field offsets inside a variable record.
pub mod var_record {
    /// `HelpContext`
    pub const HELP_CONTEXT: usize = 20;
    /// `HelpString`
    pub const HELP_STRING: usize = 24;
}

const MAX_TYPEDESC_DEPTH: usize = 32;

/// Segment directory index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Segment {
    TypeInfo = 0,
    ImpInfo = 1,
    ImpFiles = 2,
    RefTab = 3,
    GuidHash = 4,
    Guid = 5,
    NameHash = 6,
    Name = 7,
    String = 8,
    TypeDesc = 9,
    ArrayDesc = 10,
    CustData = 11,
    CdGuids = 12,
}

#[derive(Debug, Clone, Copy, Default)]
struct SegmentEntry {
    offset: i32,
    length: i32,
}

/// Decode the MSFT image in `data`; `path` names the image in errors.
///
/// # Errors
/// - [`Error::BadFormat`] if `data` is not an MSFT image (`SLTG` included)
/// - [`Error::Malformed`] / [`Error::OutOfBounds`] for structural damage
pub fn parse(data: &[u8], path: &str) -> Result<TypeLib> {
    let bad_format = |status| Error::BadFormat {
        path: path.to_string(),
        status,
    };

    let mut offset = 0_usize;
    let magic = read_le_at::<u32>(data, &mut offset).map_err(|_| bad_format(status::TYPE_E_INVDATAREAD))?;
    match magic {
        MSFT_MAGIC => {}
        SLTG_MAGIC => {
            log::warn!("{path}: SLTG type libraries are not supported");
            return Err(bad_format(status::TYPE_E_UNSUPFORMAT));
        }
        _ => return Err(bad_format(status::TYPE_E_UNSUPFORMAT)),
    }
    if data.len() < HEADER_SIZE {
        return Err(bad_format(status::TYPE_E_INVDATAREAD));
    }

    MsftReader::new(data)?.read_library()
}

struct MsftReader<'a> {
    data: &'a [u8],
    segments: [SegmentEntry; SEGMENT_COUNT],
    type_count: usize,
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
impl<'a> MsftReader<'a> {
    fn new(data: &'a [u8]) -> Result<Self> {
        let reader = MsftReader {
            data,
            segments: [SegmentEntry::default(); SEGMENT_COUNT],
            type_count: 0,
        };
        let varflags = reader.u32_at(0x14)?;
        let type_count = reader.u32_at(0x20)? as usize;

        let mut dir = HEADER_SIZE + type_count * 4;
        if varflags & HELPDLL_FLAG != 0 {
            dir += 4;
        }

        let mut segments = [SegmentEntry::default(); SEGMENT_COUNT];
        for segment in &mut segments {
            segment.offset = reader.i32_at(dir)?;
            segment.length = reader.i32_at(dir + 4)?;
            dir += SEGMENT_ENTRY_SIZE;
        }

        Ok(MsftReader {
            data,
            segments,
            type_count,
        })
    }

    fn i32_at(&self, offset: usize) -> Result<i32> {
        let mut offset = offset;
        read_le_at::<i32>(self.data, &mut offset)
    }

    fn u32_at(&self, offset: usize) -> Result<u32> {
        let mut offset = offset;
        read_le_at::<u32>(self.data, &mut offset)
    }

    fn i16_at(&self, offset: usize) -> Result<i16> {
        let mut offset = offset;
        read_le_at::<i16>(self.data, &mut offset)
    }

    fn bytes_at(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(len).ok_or(out_of_bounds_error!())?;
        self.data.get(offset..end).ok_or(out_of_bounds_error!())
    }

    /// Absolute file offset of `offset` inside `segment`.
    fn locate(&self, segment: Segment, offset: i32) -> Result<usize> {
        let entry = self.segments[segment as usize];
        if entry.offset < 0 || offset < 0 {
            return Err(malformed_error!(
                "offset {:#x} into absent or invalid segment {:?}",
                offset,
                segment
            ));
        }
        if entry.length >= 0 && offset > entry.length {
            return Err(malformed_error!(
                "offset {:#x} past the end of segment {:?}",
                offset,
                segment
            ));
        }
        Ok(entry.offset as usize + offset as usize)
    }

    fn read_library(&self) -> Result<TypeLib> {
        let syskind_raw = self.u32_at(0x14)? & 0xF;
        let syskind = SysKind::from_repr(syskind_raw as u8)
            .ok_or_else(|| malformed_error!("unknown syskind {}", syskind_raw))?;
        let version = self.u32_at(0x18)?;

        let attr = LibAttr {
            guid: self.guid(self.i32_at(0x08)?)?,
            lcid: self.u32_at(0x0C)?,
            syskind,
            major: (version & 0xFFFF) as u16,
            minor: (version >> 16) as u16,
            flags: LibFlags::from_bits_truncate(self.u32_at(0x1C)? as u16),
        };

        let name = self.name(self.i32_at(0x38)?)?;
        let doc = self.string(self.i32_at(0x24)?)?;
        let help_file = self.string(self.i32_at(0x3C)?)?;
        let custom = self.custom_data(self.i32_at(0x40)?)?;

        let (imports, external_refs) = self.imports()?;

        let mut types = Vec::with_capacity(self.type_count);
        for index in 0..self.type_count {
            types.push(self.type_info(index)?);
        }

        Ok(TypeLib {
            name,
            doc,
            help_file,
            attr,
            path: None,
            types,
            imports,
            external_refs,
            custom,
        })
    }

    fn name(&self, offset: i32) -> Result<String> {
        let start = self.locate(Segment::Name, offset)?;
        let len = (self.u32_at(start + 8)? & 0xFF) as usize;
        let bytes = self.bytes_at(start + 12, len)?;
        Ok(bytes.iter().map(|&b| char::from(b)).collect())
    }

    fn string(&self, offset: i32) -> Result<Option<String>> {
        if offset < 0 {
            return Ok(None);
        }
        let start = self.locate(Segment::String, offset)?;
        let len = self.i16_at(start)?;
        let len = usize::try_from(len).map_err(|_| malformed_error!("negative string length"))?;
        let bytes = self.bytes_at(start + 2, len)?;
        Ok(Some(bytes.iter().map(|&b| char::from(b)).collect()))
    }

    fn guid(&self, offset: i32) -> Result<Guid> {
        if offset < 0 {
            return Ok(Guid::ZERO);
        }
        let start = self.locate(Segment::Guid, offset)?;
        let bytes: [u8; 16] = self
            .bytes_at(start, 16)?
            .try_into()
            .map_err(|_| out_of_bounds_error!())?;
        Ok(Guid::from_bytes(bytes))
    }

    /// A value stored either packed inside `raw` or out of line in the custom data segment.
    fn value(&self, raw: i32) -> Result<Variant> {
        if raw < 0 {
            let vt = ((raw as u32 & 0x7C00_0000) >> 26) as u16;
            let packed = i64::from(raw as u32 & 0x03FF_FFFF);
            let vartype =
                VarType::from_raw(vt).ok_or_else(|| malformed_error!("unknown packed vt {}", vt))?;
            return Variant::from_integral(vartype, packed)
                .ok_or_else(|| malformed_error!("{} cannot be packed", vartype));
        }

        let start = self.locate(Segment::CustData, raw)?;
        let mut parser = Parser::new(self.data);
        parser.seek(start)?;
        let vt = parser.read_le::<u16>()?;
        let vartype =
            VarType::from_raw(vt).ok_or_else(|| malformed_error!("unknown value vt {}", vt))?;

        Ok(match vartype {
            VarType::Bstr => {
                let len = parser.read_le::<i32>()?;
                if len < 0 {
                    Variant::Bstr(None)
                } else {
                    let bytes = parser.read_bytes(len as usize)?;
                    Variant::Bstr(Some(bytes.iter().map(|&b| char::from(b)).collect()))
                }
            }
            VarType::R4 => Variant::R4(parser.read_le::<f32>()?),
            VarType::R8 => Variant::R8(parser.read_le::<f64>()?),
            VarType::Date => Variant::Date(parser.read_le::<f64>()?),
            VarType::Cy => Variant::Cy(parser.read_le::<i64>()?),
            VarType::I8 => Variant::I8(parser.read_le::<i64>()?),
            VarType::UI8 => Variant::UI8(parser.read_le::<u64>()?),
            VarType::Decimal => {
                let bytes: [u8; 16] = parser
                    .read_bytes(16)?
                    .try_into()
                    .map_err(|_| out_of_bounds_error!())?;
                Variant::Decimal(bytes)
            }
            VarType::Bool => Variant::Bool(parser.read_le::<i32>()? as u16 != 0),
            other => {
                let raw = parser.read_le::<i32>()?;
                Variant::from_integral(other, i64::from(raw))
                    .ok_or_else(|| malformed_error!("unsupported value type {}", other))?
            }
        })
    }

    fn custom_data(&self, mut offset: i32) -> Result<Vec<CustomData>> {
        let mut entries = Vec::new();
        let limit = (self.segments[Segment::CdGuids as usize].length.max(0) / 12) as usize + 1;

        while offset >= 0 {
            if entries.len() >= limit {
                return Err(malformed_error!("custom data chain does not terminate"));
            }
            let start = self.locate(Segment::CdGuids, offset)?;
            let guid = self.guid(self.i32_at(start)?)?;
            let value = self.value(self.i32_at(start + 4)?)?;
            entries.push(CustomData { guid, value });
            offset = self.i32_at(start + 8)?;
        }
        Ok(entries)
    }

    fn typedesc(&self, raw: i32, depth: usize) -> Result<TypeDesc> {
        if depth > MAX_TYPEDESC_DEPTH {
            return Err(Error::RecursionLimit(MAX_TYPEDESC_DEPTH));
        }
        if raw < 0 {
            let vt = (raw as u32 & u32::from(VARTYPE_MASK)) as u16;
            return VarType::from_raw(vt)
                .map(TypeDesc::Base)
                .ok_or_else(|| malformed_error!("unknown inline vt {}", vt));
        }

        // Entries are 8 bytes: vt, flags, then two words whose meaning depends on vt
        let start = self.locate(Segment::TypeDesc, (raw / 8) * 8)?;
        let vt = self.i16_at(start)? as u16 & VARTYPE_MASK;
        let w2 = self.i16_at(start + 4)?;
        let w3 = self.i16_at(start + 6)?;

        let nested = |depth| -> Result<TypeDesc> {
            if w3 < 0 {
                let inline = w2 as u16 & VARTYPE_MASK;
                VarType::from_raw(inline)
                    .map(TypeDesc::Base)
                    .ok_or_else(|| malformed_error!("unknown inline vt {}", inline))
            } else {
                self.typedesc(i32::from(w2 as u16), depth)
            }
        };

        match VarType::from_raw(vt) {
            Some(VarType::Ptr) => Ok(TypeDesc::ptr(nested(depth + 1)?)),
            Some(VarType::SafeArray) => Ok(TypeDesc::safearray(nested(depth + 1)?)),
            Some(VarType::UserDefined) => Ok(TypeDesc::UserDefined(HRefType(
                u32::from(w2 as u16) | (u32::from(w3 as u16) << 16),
            ))),
            Some(VarType::CArray) => self.array_desc(i32::from(w2 as u16), depth + 1),
            Some(other) => Ok(TypeDesc::Base(other)),
            None => Err(malformed_error!("unknown typedesc vt {}", vt)),
        }
    }

    fn array_desc(&self, offset: i32, depth: usize) -> Result<TypeDesc> {
        let start = self.locate(Segment::ArrayDesc, offset)?;
        let element = self.typedesc(self.i32_at(start)?, depth)?;
        let dims = self.i16_at(start + 4)?;
        let dims = usize::try_from(dims).map_err(|_| malformed_error!("negative array rank"))?;

        let mut bounds = Vec::with_capacity(dims);
        for dim in 0..dims {
            let at = start + 8 + dim * 8;
            bounds.push(ArrayBound {
                elements: self.u32_at(at)?,
                lower: self.i32_at(at + 4)?,
            });
        }
        Ok(TypeDesc::CArray(Box::new(ArrayDesc { element, bounds })))
    }

    fn imports(&self) -> Result<(Vec<ImportedLib>, HashMap<HRefType, ExternalRef>)> {
        let mut imports = Vec::new();
        let mut by_offset = HashMap::new();

        let files = self.segments[Segment::ImpFiles as usize];
        if files.offset >= 0 {
            let mut cursor = 0_i32;
            while cursor < files.length {
                let start = self.locate(Segment::ImpFiles, cursor)?;
                let guid = self.guid(self.i32_at(start)?)?;
                let lcid = self.u32_at(start + 4)?;
                let major = self.i16_at(start + 8)? as u16;
                let minor = self.i16_at(start + 10)? as u16;
                let name_len = (self.i16_at(start + 12)? as u16 >> 2) as usize;
                let name = self.bytes_at(start + 14, name_len)?;

                by_offset.insert(cursor, imports.len());
                imports.push(ImportedLib {
                    identity: LibraryIdentity {
                        guid,
                        major,
                        minor,
                        lcid,
                    },
                    file_name: name.iter().map(|&b| char::from(b)).collect(),
                });
                cursor = (cursor + 14 + name_len as i32 + 3) & !3;
            }
        }

        let mut refs = HashMap::new();
        let infos = self.segments[Segment::ImpInfo as usize];
        if infos.offset >= 0 {
            let count = infos.length.max(0) as usize / IMPINFO_SIZE;
            for index in 0..count {
                let relative = (index * IMPINFO_SIZE) as i32;
                let start = self.locate(Segment::ImpInfo, relative)?;
                let flags = self.u32_at(start)?;
                let file = self.i32_at(start + 4)?;
                let target = self.i32_at(start + 8)?;

                let import = *by_offset.get(&file).ok_or_else(|| {
                    malformed_error!("import info {} names unknown import file {:#x}", index, file)
                })?;
                let target = if flags & IMPINFO_OFFSET_IS_GUID != 0 {
                    ExternalTarget::Guid(self.guid(target)?)
                } else {
                    ExternalTarget::Index(target as u32)
                };
                refs.insert(
                    HRefType(relative as u32 | 1),
                    ExternalRef { import, target },
                );
            }
        }

        Ok((imports, refs))
    }

    fn type_info(&self, index: usize) -> Result<TypeInfoData> {
        let base = self.locate(
            Segment::TypeInfo,
            (index * TYPEINFO_RECORD_SIZE as usize) as i32,
        )?;

        let typekind = self.u32_at(base)?;
        let kind = TypeKind::from_repr((typekind & 0xF) as u8)
            .ok_or_else(|| malformed_error!("type {} has unknown kind {}", index, typekind & 0xF))?;
        let name = self.name(self.i32_at(base + 0x34)?)?;

        let mut data = TypeInfoData::new(name, kind);
        data.alignment = ((typekind >> 11) & 0x1F) as u16;
        data.guid = self.guid(self.i32_at(base + 0x2C)?)?;
        data.flags = TypeFlags::from_bits_truncate(self.u32_at(base + 0x30)? as u16);
        let version = self.u32_at(base + 0x38)?;
        data.major = (version & 0xFFFF) as u16;
        data.minor = (version >> 16) as u16;
        data.doc = self.string(self.i32_at(base + 0x3C)?)?;
        data.custom = self.custom_data(self.i32_at(base + 0x48)?)?;
        let impl_count = self.i16_at(base + 0x4C)?.max(0) as usize;
        data.size_vft = self.i16_at(base + 0x4E)? as u16;
        data.size_instance = self.u32_at(base + 0x50)?;
        let datatype1 = self.i32_at(base + 0x54)?;

        match kind {
            TypeKind::Alias => data.alias = Some(self.typedesc(datatype1, 0)?),
            TypeKind::Module => data.dll_name = self.string(datatype1)?,
            TypeKind::Interface | TypeKind::Dispatch if datatype1 != -1 => {
                data.impls.push(ImplTypeData {
                    href: HRefType(datatype1 as u32),
                    flags: ImplTypeFlags::empty(),
                });
            }
            TypeKind::CoClass => data.impls = self.ref_chain(datatype1, impl_count)?,
            _ => {}
        }

        let elements = self.u32_at(base + 0x18)?;
        let func_count = (elements & 0xFFFF) as usize;
        let var_count = (elements >> 16) as usize;
        if func_count + var_count > 0 {
            let memoffset = self.i32_at(base + 0x04)?;
            let memoffset = usize::try_from(memoffset)
                .map_err(|_| malformed_error!("type {} has members but no member data", index))?;
            let (funcs, vars) = self.members(memoffset, func_count, var_count)?;
            data.funcs = funcs;
            data.vars = vars;
        }

        Ok(data)
    }

    fn ref_chain(&self, mut offset: i32, count: usize) -> Result<Vec<ImplTypeData>> {
        let mut impls = Vec::with_capacity(count);
        while impls.len() < count && offset >= 0 {
            let start = self.locate(Segment::RefTab, offset)?;
            impls.push(ImplTypeData {
                href: HRefType(self.u32_at(start)?),
                flags: ImplTypeFlags::from_bits_truncate(self.u32_at(start + 4)? as u16),
            });
            offset = self.i32_at(start + 12)?;
        }
        Ok(impls)
    }

    /// Decode the member block at `memoffset`.
    ///
    /// Layout: a length word, the records, then member ids (functions then variables), names
    /// in the same order, and record offsets in the same order.
    fn members(
        &self,
        memoffset: usize,
        func_count: usize,
        var_count: usize,
    ) -> Result<(Vec<FuncData>, Vec<VarData>)> {
        let records = memoffset + 4;
        let infolen = self.u32_at(memoffset)? as usize;
        let total = func_count + var_count;
        let array = |slot: usize| self.i32_at(memoffset + infolen + (slot + 1) * 4);

        let mut funcs = Vec::with_capacity(func_count);
        let mut cursor = records;
        for i in 0..func_count {
            let memid = array(i)?;
            let name_offset = array(total + i)?;
            let name = match (name_offset, funcs.last()) {
                (-1, Some(FuncData { name, .. })) => name.clone(),
                _ => self.name(name_offset)?,
            };
            let (func, len) = self.function(cursor, memid, name)?;
            funcs.push(func);
            cursor += len;
        }

        let mut vars = Vec::with_capacity(var_count);
        if var_count > 0 {
            let first = array(2 * total + func_count)?;
            let mut cursor = records
                + usize::try_from(first).map_err(|_| malformed_error!("negative record offset"))?;
            for i in 0..var_count {
                let memid = array(func_count + i)?;
                let name = self.name(array(total + func_count + i)?)?;
                let (var, len) = self.variable(cursor, memid, name)?;
                vars.push(var);
                cursor += len;
            }
        }

        Ok((funcs, vars))
    }

    fn function(&self, start: usize, memid: i32, name: String) -> Result<(FuncData, usize)> {
        let reclen = (self.u32_at(start)? & 0xFFFF) as usize;
        let record = self.bytes_at(start, reclen)?;
        let mut parser = Parser::new(record);
        parser.seek(4)?;
        let datatype = parser.read_le::<i32>()?;
        let flags = parser.read_le::<u32>()?;
        let vtable = parser.read_le::<u16>()?;
        let _descsize = parser.read_le::<u16>()?;
        let fkccic = parser.read_le::<u32>()?;
        let nrargs = parser.read_le::<i16>()?.max(0) as usize;
        let opt_params = parser.read_le::<i16>()?;

        let params_at = reclen
            .checked_sub(nrargs * PARAMINFO_SIZE)
            .ok_or_else(|| malformed_error!("function '{}' record too short", name))?;
        let has_defaults = fkccic & FUNC_HAS_DEFAULTS != 0;
        let optional = if has_defaults {
            params_at.saturating_sub(nrargs * 4)
        } else {
            params_at
        };

        let field = |at: usize| -> Result<Option<i32>> {
            if optional > at {
                let mut offset = at;
                Ok(Some(read_le_at::<i32>(record, &mut offset)?))
            } else {
                Ok(None)
            }
        };

        let doc = match field(func_record::HELP_STRING)? {
            Some(offset) => self.string(offset)?,
            None => None,
        };
        let entry = match field(func_record::ENTRY)? {
            Some(raw) if fkccic & FUNC_ORDINAL_ENTRY != 0 => {
                Some(EntryPoint::Ordinal((raw & 0xFFFF) as u16))
            }
            Some(raw) => self.string(raw)?.map(EntryPoint::Name),
            None => None,
        };

        let kind = FuncKind::from_repr((fkccic & 0x7) as u8)
            .ok_or_else(|| malformed_error!("function '{}' has unknown kind", name))?;
        let invoke = InvokeKind::from_repr(((fkccic >> 3) & 0xF) as u8)
            .ok_or_else(|| malformed_error!("function '{}' has unknown invoke kind", name))?;
        let callconv = CallConv::from_repr(((fkccic >> 8) & 0xF) as u8)
            .ok_or_else(|| malformed_error!("function '{}' has unknown calling convention", name))?;

        let mut params = Vec::with_capacity(nrargs);
        for j in 0..nrargs {
            let mut offset = params_at + j * PARAMINFO_SIZE;
            let ptype = read_le_at::<i32>(record, &mut offset)?;
            let oname = read_le_at::<i32>(record, &mut offset)?;
            let pflags = ParamFlags::from_bits_truncate(read_le_at::<u32>(record, &mut offset)? as u16);

            let default = if has_defaults && pflags.contains(ParamFlags::HASDEFAULT) {
                let mut offset = params_at - nrargs * 4 + j * 4;
                match read_le_at::<i32>(record, &mut offset)? {
                    -1 => None,
                    raw => Some(self.value(raw)?),
                }
            } else {
                None
            };

            params.push(ParamData {
                name: if oname == -1 {
                    None
                } else {
                    Some(self.name(oname)?)
                },
                elem: ElemData {
                    tdesc: self.typedesc(ptype, 0)?,
                    flags: pflags,
                    default,
                },
            });
        }

        let func = FuncData {
            ret: ElemData::new(self.typedesc(datatype, 0)?),
            name,
            memid,
            kind,
            invoke,
            callconv,
            vtable_offset: vtable & !1,
            flags: FuncFlags::from_bits_truncate(flags as u16),
            opt_params,
            params,
            entry,
            doc,
        };
        Ok((func, reclen))
    }

    fn variable(&self, start: usize, memid: i32, name: String) -> Result<(VarData, usize)> {
        let reclen = (self.u32_at(start)? & 0xFF) as usize;
        let record = self.bytes_at(start, reclen)?;
        let mut parser = Parser::new(record);
        parser.seek(4)?;
        let datatype = parser.read_le::<i32>()?;
        let flags = parser.read_le::<u32>()?;
        let kind_raw = parser.read_le::<u16>()?;
        let _descsize = parser.read_le::<u16>()?;
        let offs_value = parser.read_le::<i32>()?;

        let kind = VarKind::from_repr(kind_raw as u8)
            .ok_or_else(|| malformed_error!("variable '{}' has unknown kind {}", name, kind_raw))?;
        let doc = if reclen > var_record::HELP_STRING {
            let mut offset = var_record::HELP_STRING;
            self.string(read_le_at::<i32>(record, &mut offset)?)?
        } else {
            None
        };

        let value = if kind == VarKind::Const {
            VarValue::Const(self.value(offs_value)?)
        } else {
            VarValue::Offset(offs_value as u32)
        };

        let var = VarData {
            name,
            memid,
            kind,
            flags: VarFlags::from_bits_truncate(flags as u16),
            elem: ElemData::new(self.typedesc(datatype, 0)?),
            value,
            doc,
        };
        Ok((var, reclen))
    }
}
