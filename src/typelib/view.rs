//! Borrowed views over the records of a [`TypeLib`].
//!
//! Every view is a small `Copy` value holding a reference to its library (and through
//! [`TypeInfo`] to its owning type), so a nested view can always navigate back to its parent and
//! can never outlive the library it came from.

use uguid::Guid;

use crate::{
    typelib::{
        desc::{
            ElemData, EntryPoint, ExternalTarget, FuncData, HRefType, ImplTypeData, ImportedLib,
            ParamData, TypeDesc, TypeInfoData, VarData, VarValue,
        },
        status,
        types::{
            CallConv, FuncFlags, FuncKind, ImplTypeFlags, InvokeKind, ParamFlags, TypeFlags,
            TypeKind, VarFlags, VarKind,
        },
        value::Variant,
        TypeLib,
    },
    Error, Result,
};

/// `TYPEATTR`: the descriptor of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAttr {
    /// Type GUID, zero when absent
    pub guid: Guid,
    /// Kind of type
    pub kind: TypeKind,
    /// Type flags
    pub flags: TypeFlags,
    /// Locale of the owning library
    pub lcid: u32,
    /// Vtable size in bytes
    pub size_vft: u16,
    /// Instance size in bytes
    pub size_instance: u32,
    /// Alignment in bytes
    pub alignment: u16,
    /// Number of implemented types
    pub impl_types: u16,
    /// Number of functions
    pub funcs: u16,
    /// Number of variables
    pub vars: u16,
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Aliased type for aliases
    pub alias: Option<TypeDesc>,
}

/// The result of resolving an `HREFTYPE` inside a library.
#[derive(Debug, Clone, Copy)]
pub enum RefTarget<'lib> {
    /// A type of the same library
    Local(TypeInfo<'lib>),
    /// A type of an imported library, which the caller has to locate
    External {
        /// The imported library
        library: &'lib ImportedLib,
        /// The designated type inside it
        target: ExternalTarget,
    },
}

/// View of one type of a library (`ITypeInfo`).
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo<'lib> {
    lib: &'lib TypeLib,
    index: u32,
    data: &'lib TypeInfoData,
}

#[allow(clippy::cast_possible_truncation)]
impl<'lib> TypeInfo<'lib> {
    pub(crate) fn new(lib: &'lib TypeLib, index: u32, data: &'lib TypeInfoData) -> Self {
        TypeInfo { lib, index, data }
    }

    /// The owning library.
    #[must_use]
    pub fn library(&self) -> &'lib TypeLib {
        self.lib
    }

    /// Index of this type inside its library.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Type name.
    #[must_use]
    pub fn name(&self) -> &'lib str {
        &self.data.name
    }

    /// Help string.
    #[must_use]
    pub fn doc(&self) -> Option<&'lib str> {
        self.data.doc.as_deref()
    }

    /// Type GUID, zero when absent.
    #[must_use]
    pub fn guid(&self) -> Guid {
        self.data.guid
    }

    /// Kind of type.
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.data.kind
    }

    /// Type flags.
    #[must_use]
    pub fn flags(&self) -> TypeFlags {
        self.data.flags
    }

    /// The full descriptor.
    #[must_use]
    pub fn attributes(&self) -> TypeAttr {
        TypeAttr {
            guid: self.data.guid,
            kind: self.data.kind,
            flags: self.data.flags,
            lcid: self.lib.attr.lcid,
            size_vft: self.data.size_vft,
            size_instance: self.data.size_instance,
            alignment: self.data.alignment,
            impl_types: self.data.impls.len() as u16,
            funcs: self.data.funcs.len() as u16,
            vars: self.data.vars.len() as u16,
            major: self.data.major,
            minor: self.data.minor,
            alias: self.data.alias.clone(),
        }
    }

    /// The aliased type of an alias.
    #[must_use]
    pub fn alias(&self) -> Option<&'lib TypeDesc> {
        self.data.alias.as_ref()
    }

    /// DLL name of a module.
    #[must_use]
    pub fn dll_name(&self) -> Option<&'lib str> {
        self.data.dll_name.as_deref()
    }

    /// Custom data stored under `guid`.
    #[must_use]
    pub fn custom_data(&self, guid: Guid) -> Option<&'lib Variant> {
        self.data
            .custom
            .iter()
            .find(|entry| entry.guid == guid)
            .map(|entry| &entry.value)
    }

    /// Functions in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = FuncDesc<'lib>> + 'lib {
        let owner = *self;
        self.data
            .funcs
            .iter()
            .enumerate()
            .map(move |(index, data)| FuncDesc {
                owner,
                index: index as u32,
                data,
            })
    }

    /// Variables in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = VarDesc<'lib>> + 'lib {
        let owner = *self;
        self.data
            .vars
            .iter()
            .enumerate()
            .map(move |(index, data)| VarDesc {
                owner,
                index: index as u32,
                data,
            })
    }

    /// Implemented types in declaration order.
    pub fn impl_types(&self) -> impl Iterator<Item = ImplType<'lib>> + 'lib {
        let owner = *self;
        self.data
            .impls
            .iter()
            .enumerate()
            .map(move |(index, data)| ImplType {
                owner,
                index: index as u32,
                data,
            })
    }

    /// Resolve an `HREFTYPE` used by this type.
    ///
    /// # Errors
    /// Returns [`Error::RefNotFound`] if the handle designates nothing in this library.
    pub fn resolve_ref(&self, href: HRefType) -> Result<RefTarget<'lib>> {
        if let Some(index) = href.local_index() {
            return match self.lib.types.get(index as usize) {
                Some(data) => Ok(RefTarget::Local(TypeInfo::new(self.lib, index, data))),
                None => Err(self.ref_not_found(href)),
            };
        }

        let Some(external) = self.lib.external_refs.get(&href) else {
            return Err(self.ref_not_found(href));
        };
        match self.lib.imports.get(external.import) {
            Some(library) => Ok(RefTarget::External {
                library,
                target: external.target,
            }),
            None => Err(self.ref_not_found(href)),
        }
    }

    fn ref_not_found(&self, href: HRefType) -> Error {
        Error::RefNotFound {
            library: self.lib.name.clone(),
            href: href.0,
            status: status::TYPE_E_ELEMENTNOTFOUND,
        }
    }
}

/// View of one function (`FUNCDESC`).
#[derive(Debug, Clone, Copy)]
pub struct FuncDesc<'lib> {
    owner: TypeInfo<'lib>,
    index: u32,
    data: &'lib FuncData,
}

#[allow(missing_docs)]
impl<'lib> FuncDesc<'lib> {
    /// The type declaring this function.
    #[must_use]
    pub fn owner(&self) -> TypeInfo<'lib> {
        self.owner
    }

    /// Position inside the owner's function list.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn name(&self) -> &'lib str {
        &self.data.name
    }

    #[must_use]
    pub fn memid(&self) -> i32 {
        self.data.memid
    }

    #[must_use]
    pub fn kind(&self) -> FuncKind {
        self.data.kind
    }

    #[must_use]
    pub fn invoke_kind(&self) -> InvokeKind {
        self.data.invoke
    }

    #[must_use]
    pub fn callconv(&self) -> CallConv {
        self.data.callconv
    }

    /// Byte offset inside the vtable.
    #[must_use]
    pub fn vtable_offset(&self) -> u16 {
        self.data.vtable_offset
    }

    #[must_use]
    pub fn flags(&self) -> FuncFlags {
        self.data.flags
    }

    #[must_use]
    pub fn param_count(&self) -> usize {
        self.data.params.len()
    }

    /// Optional parameter count, `-1` for vararg functions.
    #[must_use]
    pub fn opt_param_count(&self) -> i16 {
        self.data.opt_params
    }

    #[must_use]
    pub fn entry(&self) -> Option<&'lib EntryPoint> {
        self.data.entry.as_ref()
    }

    #[must_use]
    pub fn doc(&self) -> Option<&'lib str> {
        self.data.doc.as_deref()
    }

    /// The return element.
    #[must_use]
    pub fn ret(&self) -> ElemDesc<'lib> {
        ElemDesc {
            owner: self.owner,
            name: None,
            data: &self.data.ret,
        }
    }

    /// Parameters in declaration order.
    pub fn params(&self) -> impl Iterator<Item = ElemDesc<'lib>> + 'lib {
        let owner = self.owner;
        self.data
            .params
            .iter()
            .map(move |param: &'lib ParamData| ElemDesc {
                owner,
                name: param.name.as_deref(),
                data: &param.elem,
            })
    }
}

/// View of one variable (`VARDESC`).
#[derive(Debug, Clone, Copy)]
pub struct VarDesc<'lib> {
    owner: TypeInfo<'lib>,
    index: u32,
    data: &'lib VarData,
}

#[allow(missing_docs)]
impl<'lib> VarDesc<'lib> {
    /// The type declaring this variable.
    #[must_use]
    pub fn owner(&self) -> TypeInfo<'lib> {
        self.owner
    }

    /// Position inside the owner's variable list.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn name(&self) -> &'lib str {
        &self.data.name
    }

    #[must_use]
    pub fn memid(&self) -> i32 {
        self.data.memid
    }

    #[must_use]
    pub fn kind(&self) -> VarKind {
        self.data.kind
    }

    #[must_use]
    pub fn flags(&self) -> VarFlags {
        self.data.flags
    }

    #[must_use]
    pub fn doc(&self) -> Option<&'lib str> {
        self.data.doc.as_deref()
    }

    /// Type of the variable.
    #[must_use]
    pub fn elem(&self) -> ElemDesc<'lib> {
        ElemDesc {
            owner: self.owner,
            name: Some(&self.data.name),
            data: &self.data.elem,
        }
    }

    /// Byte offset of a per-instance variable.
    #[must_use]
    pub fn offset(&self) -> Option<u32> {
        match &self.data.value {
            VarValue::Offset(offset) => Some(*offset),
            VarValue::Const(_) => None,
        }
    }

    /// Literal value of a constant.
    #[must_use]
    pub fn const_value(&self) -> Option<&'lib Variant> {
        match &self.data.value {
            VarValue::Const(value) => Some(value),
            VarValue::Offset(_) => None,
        }
    }
}

/// View of an element (`ELEMDESC`): a return value, parameter or variable type.
#[derive(Debug, Clone, Copy)]
pub struct ElemDesc<'lib> {
    owner: TypeInfo<'lib>,
    name: Option<&'lib str>,
    data: &'lib ElemData,
}

impl<'lib> ElemDesc<'lib> {
    /// The type whose member this element belongs to; references resolve against it.
    #[must_use]
    pub fn owner(&self) -> TypeInfo<'lib> {
        self.owner
    }

    /// Parameter or variable name, `None` for return values and unnamed parameters.
    #[must_use]
    pub fn name(&self) -> Option<&'lib str> {
        self.name
    }

    /// The type description.
    #[must_use]
    pub fn type_desc(&self) -> &'lib TypeDesc {
        &self.data.tdesc
    }

    /// Parameter flags.
    #[must_use]
    pub fn flags(&self) -> ParamFlags {
        self.data.flags
    }

    /// The raw default value slot.
    #[must_use]
    pub fn default_value(&self) -> Option<&'lib Variant> {
        self.data.default.as_ref()
    }
}

/// View of an implemented interface.
#[derive(Debug, Clone, Copy)]
pub struct ImplType<'lib> {
    owner: TypeInfo<'lib>,
    index: u32,
    data: &'lib ImplTypeData,
}

impl<'lib> ImplType<'lib> {
    /// Position inside the owner's list.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Reference to the interface.
    #[must_use]
    pub fn href(&self) -> HRefType {
        self.data.href
    }

    /// Role flags.
    #[must_use]
    pub fn flags(&self) -> ImplTypeFlags {
        self.data.flags
    }

    /// Resolve the referenced interface.
    ///
    /// # Errors
    /// Returns [`Error::RefNotFound`] if the reference is dangling.
    pub fn resolve(&self) -> Result<RefTarget<'lib>> {
        self.owner.resolve_ref(self.data.href)
    }
}

#[cfg(test)]
mod tests {
    use uguid::guid;

    use crate::typelib::{
        FuncBuilder, ImplTypeFlags, TypeInfoBuilder, TypeKind, TypeLibBuilder, VarType,
    };

    use super::*;

    #[test]
    fn nested_views_reach_their_parents() {
        let mut builder = TypeLibBuilder::new("Views", guid!("0e1f2a3b-0000-4000-8000-000000000001"));
        let base = builder.add_type(TypeInfoBuilder::new("IBase", TypeKind::Interface));
        builder.add_type(
            TypeInfoBuilder::new("IDerived", TypeKind::Interface)
                .implements(base, ImplTypeFlags::empty())
                .function(
                    FuncBuilder::new("Run", 1)
                        .param("count", TypeDesc::Base(VarType::I4), ParamFlags::IN),
                ),
        );
        let lib = builder.build();

        let derived = lib.type_info(1).unwrap();
        let func = derived.functions().next().unwrap();
        let param = func.params().next().unwrap();
        assert_eq!(param.name(), Some("count"));
        assert_eq!(param.owner().name(), "IDerived");
        assert_eq!(func.ret().type_desc(), &TypeDesc::Base(VarType::HResult));

        let parent = derived.impl_types().next().unwrap();
        match parent.resolve().unwrap() {
            RefTarget::Local(info) => assert_eq!(info.name(), "IBase"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(derived.attributes().funcs, 1);
        assert_eq!(derived.attributes().impl_types, 1);
    }

    #[test]
    fn dangling_reference() {
        let mut builder = TypeLibBuilder::new("Views", guid!("0e1f2a3b-0000-4000-8000-000000000002"));
        builder.add_type(TypeInfoBuilder::new("IAlone", TypeKind::Interface));
        let lib = builder.build();
        let info = lib.type_info(0).unwrap();
        assert!(matches!(
            info.resolve_ref(HRefType::local(9)),
            Err(Error::RefNotFound { .. })
        ));
        assert!(info.resolve_ref(HRefType(0x31)).is_err());
    }
}
