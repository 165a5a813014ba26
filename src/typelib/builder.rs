//! In-memory construction of type libraries.
//!
//! [`TypeLibBuilder`] produces the same [`TypeLib`] value the MSFT decoder does, which is how
//! tools generate libraries without a compiler and how the importer is exercised in tests.
//!
//! ```rust
//! use tlbscope::typelib::{
//!     FuncBuilder, ParamFlags, TypeDesc, TypeInfoBuilder, TypeKind, TypeLibBuilder, VarType,
//! };
//! use uguid::guid;
//!
//! let mut builder = TypeLibBuilder::new("Shapes", guid!("5d4c8e90-2a11-4b7e-9c1e-0a1b2c3d4e5f"));
//! builder.add_type(
//!     TypeInfoBuilder::new("IShape", TypeKind::Interface).function(
//!         FuncBuilder::new("Area", 1).retval("pArea", TypeDesc::Base(VarType::R8)),
//!     ),
//! );
//! let lib = builder.build();
//! assert_eq!(lib.type_count(), 1);
//! ```
//!
//! Layout details left open by the caller are filled in by [`TypeLibBuilder::build`]: vtable
//! offsets follow the three `IUnknown` slots, record fields are placed at their natural
//! alignment, union fields all start at zero.

use std::collections::HashMap;

use uguid::Guid;

use crate::typelib::{
    desc::{
        ElemData, EntryPoint, ExternalRef, ExternalTarget, FuncData, HRefType, ImplTypeData,
        ImportedLib, LibAttr, LibraryIdentity, ParamData, TypeDesc, TypeInfoData, VarData,
        VarValue,
    },
    types::{
        CallConv, FuncFlags, FuncKind, ImplTypeFlags, InvokeKind, LibFlags, ParamFlags, SysKind,
        TypeFlags, TypeKind, VarFlags, VarKind, VarType,
    },
    value::Variant,
    CustomData, TypeLib,
};

/// Number of `IUnknown` slots preceding the first method of every vtable.
const IUNKNOWN_SLOTS: u16 = 3;

/// Base member id handed to variables without an explicit one.
const DEFAULT_VAR_MEMID: i32 = 0x4000_0000;

/// Builds a [`TypeLib`] in memory.
#[derive(Debug, Clone)]
pub struct TypeLibBuilder {
    name: String,
    doc: Option<String>,
    help_file: Option<String>,
    attr: LibAttr,
    types: Vec<TypeInfoData>,
    pending: Vec<PendingLayout>,
    imports: Vec<ImportedLib>,
    external_refs: HashMap<HRefType, ExternalRef>,
    custom: Vec<CustomData>,
}

/// Layout choices deferred to [`TypeLibBuilder::build`].
#[derive(Debug, Clone, Default)]
struct PendingLayout {
    vtable: Vec<Option<u16>>,
    offsets: Vec<Option<u32>>,
}

impl TypeLibBuilder {
    /// Start a library version 1.0 for 32-bit Windows.
    #[must_use]
    pub fn new(name: impl Into<String>, guid: Guid) -> Self {
        TypeLibBuilder {
            name: name.into(),
            doc: None,
            help_file: None,
            attr: LibAttr {
                guid,
                lcid: 0,
                syskind: SysKind::Win32,
                major: 1,
                minor: 0,
                flags: LibFlags::HASDISKIMAGE,
            },
            types: Vec::new(),
            pending: Vec::new(),
            imports: Vec::new(),
            external_refs: HashMap::new(),
            custom: Vec::new(),
        }
    }

    /// Set the target platform.
    #[must_use]
    pub fn syskind(mut self, syskind: SysKind) -> Self {
        self.attr.syskind = syskind;
        self
    }

    /// Set the library version.
    #[must_use]
    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.attr.major = major;
        self.attr.minor = minor;
        self
    }

    /// Set the locale id.
    #[must_use]
    pub fn lcid(mut self, lcid: u32) -> Self {
        self.attr.lcid = lcid;
        self
    }

    /// Set the library flags.
    #[must_use]
    pub fn flags(mut self, flags: LibFlags) -> Self {
        self.attr.flags = flags;
        self
    }

    /// Set the help string.
    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Set the help file.
    #[must_use]
    pub fn help_file(mut self, file: impl Into<String>) -> Self {
        self.help_file = Some(file.into());
        self
    }

    /// Attach library-level custom data.
    #[must_use]
    pub fn custom(mut self, guid: Guid, value: Variant) -> Self {
        self.custom.push(CustomData { guid, value });
        self
    }

    /// The handle the next added type will receive.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_href(&self) -> HRefType {
        HRefType::local(self.types.len() as u32)
    }

    /// Append a type and return its local handle.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_type(&mut self, builder: TypeInfoBuilder) -> HRefType {
        let href = self.next_href();
        let (data, pending) = builder.finish();
        self.types.push(data);
        self.pending.push(pending);
        href
    }

    /// Declare a library this one imports from and return its import index.
    pub fn import_library(
        &mut self,
        identity: LibraryIdentity,
        file_name: impl Into<String>,
    ) -> usize {
        self.imports.push(ImportedLib {
            identity,
            file_name: file_name.into(),
        });
        self.imports.len() - 1
    }

    /// A handle designating the type with `guid` inside import `import`.
    pub fn import_type_by_guid(&mut self, import: usize, guid: Guid) -> HRefType {
        self.add_external(import, ExternalTarget::Guid(guid))
    }

    /// A handle designating the type at `index` inside import `import`.
    pub fn import_type_by_index(&mut self, import: usize, index: u32) -> HRefType {
        self.add_external(import, ExternalTarget::Index(index))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_external(&mut self, import: usize, target: ExternalTarget) -> HRefType {
        let reference = ExternalRef { import, target };
        if let Some((href, _)) = self
            .external_refs
            .iter()
            .find(|(_, existing)| **existing == reference)
        {
            return *href;
        }

        // Same encoding as MSFT: byte offset of the 12-byte import record, low bit set
        let href = HRefType((self.external_refs.len() as u32 * 12) | 1);
        self.external_refs.insert(href, reference);
        href
    }

    /// Finish the library, filling in every layout detail left open.
    #[must_use]
    pub fn build(mut self) -> TypeLib {
        let ptr_size = self.attr.syskind.pointer_size();
        let pending = std::mem::take(&mut self.pending);

        for (index, layout) in pending.into_iter().enumerate() {
            self.layout_functions(index, &layout.vtable, ptr_size);
            self.layout_variables(index, &layout.offsets, ptr_size);
        }

        TypeLib {
            name: self.name,
            doc: self.doc,
            help_file: self.help_file,
            attr: self.attr,
            path: None,
            types: self.types,
            imports: self.imports,
            external_refs: self.external_refs,
            custom: self.custom,
        }
    }

    fn layout_functions(&mut self, index: usize, vtable: &[Option<u16>], ptr_size: u16) {
        let data = &mut self.types[index];
        let is_vtable = matches!(data.kind, TypeKind::Interface | TypeKind::Dispatch);
        let mut next_slot = IUNKNOWN_SLOTS;

        for (func, explicit) in data.funcs.iter_mut().zip(vtable) {
            func.vtable_offset = match explicit {
                Some(offset) => *offset,
                None if is_vtable => next_slot * ptr_size,
                None => 0,
            };
            next_slot = func.vtable_offset / ptr_size.max(1) + 1;
        }

        if is_vtable && data.size_vft == 0 {
            data.size_vft = next_slot.max(IUNKNOWN_SLOTS) * ptr_size;
        }
    }

    fn layout_variables(&mut self, index: usize, offsets: &[Option<u32>], ptr_size: u16) {
        let kind = self.types[index].kind;
        let mut cursor = 0_u32;
        let mut max_align = 1_u32;
        let mut extent = 0_u32;

        let vars = self.types[index].vars.clone();
        let mut placed = Vec::with_capacity(vars.len());
        for (var, explicit) in vars.iter().zip(offsets) {
            if var.kind != VarKind::PerInstance {
                placed.push(None);
                continue;
            }

            let (size, align) = self.type_size(&var.elem.tdesc, ptr_size, 0);
            max_align = max_align.max(align);
            let offset = match (explicit, kind) {
                (Some(offset), _) => *offset,
                (None, TypeKind::Union) => 0,
                (None, _) => cursor.div_ceil(align) * align,
            };
            cursor = offset + size;
            extent = extent.max(cursor);
            placed.push(Some(offset));
        }

        let data = &mut self.types[index];
        for (var, offset) in data.vars.iter_mut().zip(placed) {
            if let Some(offset) = offset {
                var.value = VarValue::Offset(offset);
            }
        }

        match kind {
            TypeKind::Record | TypeKind::Union if data.size_instance == 0 => {
                data.size_instance = extent.div_ceil(max_align) * max_align;
                data.alignment = u16::try_from(max_align).unwrap_or(4);
            }
            TypeKind::Enum if data.size_instance == 0 => data.size_instance = 4,
            TypeKind::Interface | TypeKind::Dispatch | TypeKind::CoClass
                if data.size_instance == 0 =>
            {
                data.size_instance = u32::from(ptr_size);
            }
            _ => {}
        }
    }

    /// Size and alignment of `desc`; user-defined types are looked up among the local types.
    fn type_size(&self, desc: &TypeDesc, ptr_size: u16, depth: usize) -> (u32, u32) {
        let ptr = u32::from(ptr_size);
        match desc {
            TypeDesc::Base(vt) => base_size(*vt, ptr),
            TypeDesc::Ptr(_) | TypeDesc::SafeArray(_) => (ptr, ptr),
            TypeDesc::CArray(array) => {
                let (size, align) = self.type_size(&array.element, ptr_size, depth + 1);
                (size.saturating_mul(array.total_elements()), align)
            }
            TypeDesc::UserDefined(href) => {
                let target = href
                    .local_index()
                    .and_then(|index| self.types.get(index as usize));
                match target {
                    Some(data) if depth < 16 => match data.kind {
                        TypeKind::Alias => match &data.alias {
                            Some(alias) => self.type_size(alias, ptr_size, depth + 1),
                            None => (4, 4),
                        },
                        TypeKind::Record | TypeKind::Union => {
                            (data.size_instance, u32::from(data.alignment.max(1)))
                        }
                        TypeKind::Enum => (4, 4),
                        _ => (ptr, ptr),
                    },
                    _ => (4, 4),
                }
            }
        }
    }
}

fn base_size(vt: VarType, ptr: u32) -> (u32, u32) {
    match vt {
        VarType::I1 | VarType::UI1 => (1, 1),
        VarType::I2 | VarType::UI2 | VarType::Bool => (2, 2),
        VarType::R8 | VarType::I8 | VarType::UI8 | VarType::Cy | VarType::Date => (8, 8),
        VarType::Decimal => (16, 8),
        VarType::Variant => (8 + 2 * ptr, 8),
        VarType::Bstr
        | VarType::LpStr
        | VarType::LpWStr
        | VarType::Unknown
        | VarType::Dispatch
        | VarType::IntPtr
        | VarType::UIntPtr => (ptr, ptr),
        _ => (4, 4),
    }
}

/// Builds one [`TypeInfoData`].
#[derive(Debug, Clone)]
pub struct TypeInfoBuilder {
    data: TypeInfoData,
    pending: PendingLayout,
}

impl TypeInfoBuilder {
    /// Start a type named `name`.
    ///
    /// Dispatch interfaces get the `DISPATCHABLE` flag, coclasses `CANCREATE`.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        let mut data = TypeInfoData::new(name, kind);
        data.flags = match kind {
            TypeKind::Dispatch => TypeFlags::DISPATCHABLE,
            TypeKind::CoClass => TypeFlags::CANCREATE,
            _ => TypeFlags::empty(),
        };
        TypeInfoBuilder {
            data,
            pending: PendingLayout::default(),
        }
    }

    /// Set the type GUID.
    #[must_use]
    pub fn guid(mut self, guid: Guid) -> Self {
        self.data.guid = guid;
        self
    }

    /// Set the help string.
    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.data.doc = Some(doc.into());
        self
    }

    /// Add type flags.
    #[must_use]
    pub fn flags(mut self, flags: TypeFlags) -> Self {
        self.data.flags |= flags;
        self
    }

    /// Set the type version.
    #[must_use]
    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.data.major = major;
        self.data.minor = minor;
        self
    }

    /// Set the aliased type of an alias.
    #[must_use]
    pub fn alias(mut self, target: TypeDesc) -> Self {
        self.data.alias = Some(target);
        self
    }

    /// Set the DLL of a module.
    #[must_use]
    pub fn dll(mut self, name: impl Into<String>) -> Self {
        self.data.dll_name = Some(name.into());
        self
    }

    /// Set instance size and alignment explicitly.
    #[must_use]
    pub fn size(mut self, size: u32, alignment: u16) -> Self {
        self.data.size_instance = size;
        self.data.alignment = alignment;
        self
    }

    /// Set the vtable size explicitly.
    #[must_use]
    pub fn vtable_size(mut self, size: u16) -> Self {
        self.data.size_vft = size;
        self
    }

    /// Declare an implemented interface.
    #[must_use]
    pub fn implements(mut self, href: HRefType, flags: ImplTypeFlags) -> Self {
        self.data.impls.push(ImplTypeData { href, flags });
        self
    }

    /// Declare the base interface of an interface.
    #[must_use]
    pub fn inherits(self, href: HRefType) -> Self {
        self.implements(href, ImplTypeFlags::empty())
    }

    /// Append a function.
    #[must_use]
    pub fn function(mut self, builder: FuncBuilder) -> Self {
        let mut data = builder.data;
        if builder.kind.is_none() {
            data.kind = match self.data.kind {
                TypeKind::Dispatch => FuncKind::Dispatch,
                TypeKind::Module => FuncKind::Static,
                _ => FuncKind::PureVirtual,
            };
        }
        self.pending.vtable.push(builder.vtable_offset);
        self.data.funcs.push(data);
        self
    }

    /// Append a variable.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn variable(mut self, builder: VarBuilder) -> Self {
        let mut data = builder.data;
        data.memid = builder
            .memid
            .unwrap_or(DEFAULT_VAR_MEMID + self.data.vars.len() as i32);
        if self.data.kind == TypeKind::Dispatch && data.kind == VarKind::PerInstance {
            data.kind = VarKind::Dispatch;
        }
        self.pending.offsets.push(builder.offset);
        self.data.vars.push(data);
        self
    }

    /// Append a constant, the form enum members and module constants take.
    #[must_use]
    pub fn constant(self, name: impl Into<String>, value: Variant) -> Self {
        self.variable(VarBuilder::constant(name, value))
    }

    /// Attach custom data.
    #[must_use]
    pub fn custom(mut self, guid: Guid, value: Variant) -> Self {
        self.data.custom.push(CustomData { guid, value });
        self
    }

    fn finish(self) -> (TypeInfoData, PendingLayout) {
        (self.data, self.pending)
    }
}

/// Builds one [`FuncData`].
///
/// The return type defaults to `HRESULT`, the calling convention to `stdcall`.
#[derive(Debug, Clone)]
pub struct FuncBuilder {
    data: FuncData,
    kind: Option<FuncKind>,
    vtable_offset: Option<u16>,
}

impl FuncBuilder {
    /// Start a method named `name` with member id `memid`.
    #[must_use]
    pub fn new(name: impl Into<String>, memid: i32) -> Self {
        FuncBuilder {
            data: FuncData {
                name: name.into(),
                memid,
                kind: FuncKind::PureVirtual,
                invoke: InvokeKind::Func,
                callconv: CallConv::StdCall,
                vtable_offset: 0,
                flags: FuncFlags::empty(),
                opt_params: 0,
                ret: ElemData::new(TypeDesc::Base(VarType::HResult)),
                params: Vec::new(),
                entry: None,
                doc: None,
            },
            kind: None,
            vtable_offset: None,
        }
    }

    /// Make this a property accessor or plain method.
    #[must_use]
    pub fn invoke(mut self, invoke: InvokeKind) -> Self {
        self.data.invoke = invoke;
        self
    }

    /// Override the binding kind.
    #[must_use]
    pub fn kind(mut self, kind: FuncKind) -> Self {
        self.kind = Some(kind);
        self.data.kind = kind;
        self
    }

    /// Set the calling convention.
    #[must_use]
    pub fn callconv(mut self, callconv: CallConv) -> Self {
        self.data.callconv = callconv;
        self
    }

    /// Add function flags.
    #[must_use]
    pub fn flags(mut self, flags: FuncFlags) -> Self {
        self.data.flags |= flags;
        self
    }

    /// Pin the vtable byte offset.
    #[must_use]
    pub fn vtable_offset(mut self, offset: u16) -> Self {
        self.vtable_offset = Some(offset);
        self
    }

    /// Set the return type.
    #[must_use]
    pub fn returns(mut self, tdesc: TypeDesc) -> Self {
        self.data.ret = ElemData::new(tdesc);
        self
    }

    /// Append a parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, tdesc: TypeDesc, flags: ParamFlags) -> Self {
        self.data.params.push(ParamData {
            name: Some(name.into()),
            elem: ElemData {
                tdesc,
                flags,
                default: None,
            },
        });
        self
    }

    /// Append a parameter carrying a default value.
    ///
    /// The `HASDEFAULT` and `OPT` flags are added.
    #[must_use]
    pub fn param_with_default(
        mut self,
        name: impl Into<String>,
        tdesc: TypeDesc,
        flags: ParamFlags,
        default: Variant,
    ) -> Self {
        self.data.params.push(ParamData {
            name: Some(name.into()),
            elem: ElemData {
                tdesc,
                flags: flags | ParamFlags::HASDEFAULT | ParamFlags::OPT,
                default: Some(default),
            },
        });
        self
    }

    /// Append a raw parameter, for shapes the helpers above cannot express.
    #[must_use]
    pub fn raw_param(mut self, name: Option<String>, elem: ElemData) -> Self {
        self.data.params.push(ParamData { name, elem });
        self
    }

    /// Append the `[out, retval]` pointer to `pointee`.
    #[must_use]
    pub fn retval(self, name: impl Into<String>, pointee: TypeDesc) -> Self {
        self.param(
            name,
            TypeDesc::ptr(pointee),
            ParamFlags::OUT | ParamFlags::RETVAL,
        )
    }

    /// Set the optional parameter count.
    #[must_use]
    pub fn opt_params(mut self, count: i16) -> Self {
        self.data.opt_params = count;
        self
    }

    /// Set the DLL entry point of a module function.
    #[must_use]
    pub fn entry(mut self, entry: EntryPoint) -> Self {
        self.data.entry = Some(entry);
        self
    }

    /// Set the help string.
    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.data.doc = Some(doc.into());
        self
    }
}

/// Builds one [`VarData`].
#[derive(Debug, Clone)]
pub struct VarBuilder {
    data: VarData,
    memid: Option<i32>,
    offset: Option<u32>,
}

impl VarBuilder {
    /// A per-instance field of type `tdesc`.
    #[must_use]
    pub fn new(name: impl Into<String>, tdesc: TypeDesc) -> Self {
        VarBuilder {
            data: VarData {
                name: name.into(),
                memid: 0,
                kind: VarKind::PerInstance,
                flags: VarFlags::empty(),
                elem: ElemData::new(tdesc),
                value: VarValue::Offset(0),
                doc: None,
            },
            memid: None,
            offset: None,
        }
    }

    /// A constant whose type follows from `value`.
    #[must_use]
    pub fn constant(name: impl Into<String>, value: Variant) -> Self {
        let mut builder = VarBuilder::new(name, TypeDesc::Base(value.vartype()));
        builder.data.kind = VarKind::Const;
        builder.data.value = VarValue::Const(value);
        builder
    }

    /// Override the declared type.
    #[must_use]
    pub fn typed(mut self, tdesc: TypeDesc) -> Self {
        self.data.elem.tdesc = tdesc;
        self
    }

    /// Set the member id.
    #[must_use]
    pub fn memid(mut self, memid: i32) -> Self {
        self.memid = Some(memid);
        self
    }

    /// Add variable flags.
    #[must_use]
    pub fn flags(mut self, flags: VarFlags) -> Self {
        self.data.flags |= flags;
        self
    }

    /// Set the storage kind.
    #[must_use]
    pub fn kind(mut self, kind: VarKind) -> Self {
        self.data.kind = kind;
        self
    }

    /// Pin the byte offset of a field.
    #[must_use]
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Set the help string.
    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.data.doc = Some(doc.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use uguid::guid;

    use super::*;
    use crate::typelib::RefTarget;

    #[test]
    fn vtable_offsets_follow_iunknown() {
        let mut builder = TypeLibBuilder::new("V", guid!("11111111-2222-3333-4444-555555555555"))
            .syskind(SysKind::Win64);
        builder.add_type(
            TypeInfoBuilder::new("IThing", TypeKind::Interface)
                .function(FuncBuilder::new("A", 1))
                .function(FuncBuilder::new("B", 2)),
        );
        let lib = builder.build();
        let info = lib.type_info(0).unwrap();
        let offsets: Vec<_> = info.functions().map(|f| f.vtable_offset()).collect();
        assert_eq!(offsets, [24, 32]);
        assert_eq!(info.attributes().size_vft, 40);
        assert_eq!(
            info.functions().next().unwrap().kind(),
            FuncKind::PureVirtual
        );
    }

    #[test]
    fn record_layout() {
        let mut builder = TypeLibBuilder::new("R", guid!("11111111-2222-3333-4444-555555555556"));
        builder.add_type(
            TypeInfoBuilder::new("POINT", TypeKind::Record)
                .variable(VarBuilder::new("flag", TypeDesc::Base(VarType::UI1)))
                .variable(VarBuilder::new("x", TypeDesc::Base(VarType::I4)))
                .variable(VarBuilder::new("y", TypeDesc::Base(VarType::R8))),
        );
        builder.add_type(
            TypeInfoBuilder::new("VALUE", TypeKind::Union)
                .variable(VarBuilder::new("i", TypeDesc::Base(VarType::I4)))
                .variable(VarBuilder::new("d", TypeDesc::Base(VarType::R8))),
        );
        let lib = builder.build();

        let point = lib.type_info(0).unwrap();
        let offsets: Vec<_> = point.variables().map(|v| v.offset().unwrap()).collect();
        assert_eq!(offsets, [0, 4, 8]);
        assert_eq!(point.attributes().size_instance, 16);

        let value = lib.type_info(1).unwrap();
        assert!(value.variables().all(|v| v.offset() == Some(0)));
        assert_eq!(value.attributes().size_instance, 8);
    }

    #[test]
    fn enum_members_get_sequential_memids() {
        let mut builder = TypeLibBuilder::new("E", guid!("11111111-2222-3333-4444-555555555557"));
        builder.add_type(
            TypeInfoBuilder::new("Color", TypeKind::Enum)
                .constant("Red", Variant::I4(0))
                .constant("Green", Variant::I4(1)),
        );
        let lib = builder.build();
        let memids: Vec<_> = lib.type_info(0).unwrap().variables().map(|v| v.memid()).collect();
        assert_eq!(memids, [0x4000_0000, 0x4000_0001]);
    }

    #[test]
    fn external_references_are_deduplicated() {
        let other = LibraryIdentity {
            guid: guid!("11111111-2222-3333-4444-555555555558"),
            major: 2,
            minor: 0,
            lcid: 0,
        };
        let mut builder = TypeLibBuilder::new("X", guid!("11111111-2222-3333-4444-555555555559"));
        let import = builder.import_library(other, "other.tlb");
        let first = builder.import_type_by_guid(import, guid!("aaaaaaaa-0000-0000-0000-000000000001"));
        let again = builder.import_type_by_guid(import, guid!("aaaaaaaa-0000-0000-0000-000000000001"));
        let second = builder.import_type_by_index(import, 4);
        assert_eq!(first, again);
        assert_eq!(first.0, 1);
        assert_eq!(second.0, 13);

        builder.add_type(TypeInfoBuilder::new("IUser", TypeKind::Interface).inherits(first));
        let lib = builder.build();
        let parent = lib.type_info(0).unwrap().impl_types().next().unwrap();
        match parent.resolve().unwrap() {
            RefTarget::External { library, target } => {
                assert_eq!(library.identity, other);
                assert_eq!(
                    target,
                    ExternalTarget::Guid(guid!("aaaaaaaa-0000-0000-0000-000000000001"))
                );
            }
            RefTarget::Local(_) => panic!("expected an external reference"),
        }
    }
}
