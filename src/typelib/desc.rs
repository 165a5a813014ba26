//! Owned descriptor records of a decoded type library.
//!
//! These are the data behind the borrowed views in [`crate::typelib::view`]. A [`crate::typelib::TypeLib`]
//! owns every record; nothing here refers back into the source file, so the file mapping can be
//! released as soon as decoding finishes.

use std::fmt;

use uguid::Guid;

use crate::typelib::{
    types::{
        CallConv, FuncFlags, FuncKind, ImplTypeFlags, InvokeKind, LibFlags, ParamFlags, SysKind,
        TypeFlags, TypeKind, VarFlags, VarKind, VarType,
    },
    value::Variant,
};

/// Opaque handle to a type referenced from inside a library (`HREFTYPE`).
///
/// Local references are type-info offsets (multiples of `0x64`, low two bits clear); references
/// into other libraries have a low bit set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HRefType(pub u32);

/// Size of one type-info record in an MSFT image; local `HREFTYPE`s are multiples of it.
pub const TYPEINFO_RECORD_SIZE: u32 = 0x64;

impl HRefType {
    /// The local `HREFTYPE` of the type at `index`.
    #[must_use]
    pub fn local(index: u32) -> Self {
        HRefType(index * TYPEINFO_RECORD_SIZE)
    }

    /// `true` if the handle designates a type of the same library.
    #[must_use]
    pub fn is_local(self) -> bool {
        self.0 & 3 == 0
    }

    /// The type index designated by a local handle.
    #[must_use]
    pub fn local_index(self) -> Option<u32> {
        self.is_local().then_some(self.0 / TYPEINFO_RECORD_SIZE)
    }
}

impl fmt::Debug for HRefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HRefType({:#x})", self.0)
    }
}

impl fmt::Display for HRefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identity of a type library as used for cross-library matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryIdentity {
    /// The `LIBID`
    pub guid: Guid,
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Locale id
    pub lcid: u32,
}

impl fmt::Display for LibraryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}} {}.{} lcid {:#x}", self.guid, self.major, self.minor, self.lcid)
    }
}

/// `TLIBATTR`: the library-level descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct LibAttr {
    /// The `LIBID`
    pub guid: Guid,
    /// Locale id
    pub lcid: u32,
    /// Target platform
    pub syskind: SysKind,
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Library flags
    pub flags: LibFlags,
}

impl LibAttr {
    /// The identity used to match this library against references.
    #[must_use]
    pub fn identity(&self) -> LibraryIdentity {
        LibraryIdentity {
            guid: self.guid,
            major: self.major,
            minor: self.minor,
            lcid: self.lcid,
        }
    }
}

/// A bound of one dimension of a C-style array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayBound {
    /// Number of elements
    pub elements: u32,
    /// Lower bound
    pub lower: i32,
}

/// `ARRAYDESC`
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDesc {
    /// Element type
    pub element: TypeDesc,
    /// One bound per dimension
    pub bounds: Vec<ArrayBound>,
}

impl ArrayDesc {
    /// Total element count across all dimensions.
    #[must_use]
    pub fn total_elements(&self) -> u32 {
        self.bounds
            .iter()
            .fold(1_u32, |acc, bound| acc.saturating_mul(bound.elements))
    }
}

/// `TYPEDESC`: a recursive type reference.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDesc {
    /// A base type carried inline
    Base(VarType),
    /// `VT_PTR` to the nested type
    Ptr(Box<TypeDesc>),
    /// `VT_SAFEARRAY` of the nested type
    SafeArray(Box<TypeDesc>),
    /// `VT_CARRAY` with fixed bounds
    CArray(Box<ArrayDesc>),
    /// `VT_USERDEFINED` naming another type
    UserDefined(HRefType),
}

impl TypeDesc {
    /// Shorthand for a pointer to `inner`.
    #[must_use]
    pub fn ptr(inner: TypeDesc) -> TypeDesc {
        TypeDesc::Ptr(Box::new(inner))
    }

    /// Shorthand for a safe array of `inner`.
    #[must_use]
    pub fn safearray(inner: TypeDesc) -> TypeDesc {
        TypeDesc::SafeArray(Box::new(inner))
    }

    /// Shorthand for a one-dimensional C array of `count` elements.
    #[must_use]
    pub fn carray(inner: TypeDesc, count: u32) -> TypeDesc {
        TypeDesc::CArray(Box::new(ArrayDesc {
            element: inner,
            bounds: vec![ArrayBound {
                elements: count,
                lower: 0,
            }],
        }))
    }

    /// The `VARTYPE` tag of this node.
    #[must_use]
    pub fn vartype(&self) -> VarType {
        match self {
            TypeDesc::Base(vt) => *vt,
            TypeDesc::Ptr(_) => VarType::Ptr,
            TypeDesc::SafeArray(_) => VarType::SafeArray,
            TypeDesc::CArray(_) => VarType::CArray,
            TypeDesc::UserDefined(_) => VarType::UserDefined,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Base(vt) => write!(f, "{vt}"),
            TypeDesc::Ptr(inner) => write!(f, "{inner}*"),
            TypeDesc::SafeArray(inner) => write!(f, "SAFEARRAY({inner})"),
            TypeDesc::CArray(desc) => {
                write!(f, "{}", desc.element)?;
                for bound in &desc.bounds {
                    write!(f, "[{}]", bound.elements)?;
                }
                Ok(())
            }
            TypeDesc::UserDefined(href) => write!(f, "USERDEFINED({href})"),
        }
    }
}

/// `ELEMDESC`: a type plus parameter flags and an optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct ElemData {
    /// The element type
    pub tdesc: TypeDesc,
    /// Parameter flags
    pub flags: ParamFlags,
    /// The default value slot
    pub default: Option<Variant>,
}

impl ElemData {
    /// An element of `tdesc` without flags or default.
    #[must_use]
    pub fn new(tdesc: TypeDesc) -> Self {
        ElemData {
            tdesc,
            flags: ParamFlags::empty(),
            default: None,
        }
    }
}

/// One parameter of a function.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamData {
    /// Parameter name, absent in some libraries
    pub name: Option<String>,
    /// Type and flags
    pub elem: ElemData,
}

/// Where a module function lives inside its DLL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    /// Exported by name
    Name(String),
    /// Exported by ordinal
    Ordinal(u16),
}

/// `FUNCDESC` together with the function's names.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncData {
    /// Function name
    pub name: String,
    /// Member id (`DISPID`)
    pub memid: i32,
    /// Binding kind
    pub kind: FuncKind,
    /// Method or property accessor
    pub invoke: InvokeKind,
    /// Calling convention
    pub callconv: CallConv,
    /// Byte offset of the function in the vtable
    pub vtable_offset: u16,
    /// Function flags
    pub flags: FuncFlags,
    /// Optional parameter count; `-1` marks a vararg function
    pub opt_params: i16,
    /// Return element
    pub ret: ElemData,
    /// Parameters in declaration order
    pub params: Vec<ParamData>,
    /// DLL entry point for module functions
    pub entry: Option<EntryPoint>,
    /// Help string
    pub doc: Option<String>,
}

/// Storage of a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    /// Byte offset inside the instance
    Offset(u32),
    /// Literal value of a constant
    Const(Variant),
}

/// `VARDESC` together with the variable's name.
#[derive(Debug, Clone, PartialEq)]
pub struct VarData {
    /// Variable name
    pub name: String,
    /// Member id
    pub memid: i32,
    /// Storage kind
    pub kind: VarKind,
    /// Variable flags
    pub flags: VarFlags,
    /// Type
    pub elem: ElemData,
    /// Offset or constant value
    pub value: VarValue,
    /// Help string
    pub doc: Option<String>,
}

/// An implemented (or inherited) interface of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImplTypeData {
    /// Reference to the interface
    pub href: HRefType,
    /// Role of the interface on a coclass
    pub flags: ImplTypeFlags,
}

/// A custom data entry keyed by GUID.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomData {
    /// The key
    pub guid: Guid,
    /// The value
    pub value: Variant,
}

/// Everything known about one type of a library.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfoData {
    /// Type name
    pub name: String,
    /// Help string
    pub doc: Option<String>,
    /// Type GUID, zero when absent
    pub guid: Guid,
    /// Kind of type
    pub kind: TypeKind,
    /// Type flags
    pub flags: TypeFlags,
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Instance size in bytes
    pub size_instance: u32,
    /// Alignment in bytes
    pub alignment: u16,
    /// Vtable size in bytes, including inherited slots
    pub size_vft: u16,
    /// Aliased type for [`TypeKind::Alias`]
    pub alias: Option<TypeDesc>,
    /// DLL name for [`TypeKind::Module`]
    pub dll_name: Option<String>,
    /// Functions in declaration order
    pub funcs: Vec<FuncData>,
    /// Variables in declaration order
    pub vars: Vec<VarData>,
    /// Implemented interfaces; for interfaces the single entry is the base interface
    pub impls: Vec<ImplTypeData>,
    /// Custom data
    pub custom: Vec<CustomData>,
}

impl TypeInfoData {
    /// An empty type of `kind` named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        TypeInfoData {
            name: name.into(),
            doc: None,
            guid: Guid::ZERO,
            kind,
            flags: TypeFlags::empty(),
            major: 0,
            minor: 0,
            size_instance: 0,
            alignment: 4,
            size_vft: 0,
            alias: None,
            dll_name: None,
            funcs: Vec::new(),
            vars: Vec::new(),
            impls: Vec::new(),
            custom: Vec::new(),
        }
    }
}

/// A library another library imports types from.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedLib {
    /// Identity of the imported library
    pub identity: LibraryIdentity,
    /// The file name recorded for it
    pub file_name: String,
}

/// How a reference into an imported library designates its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalTarget {
    /// By type GUID
    Guid(Guid),
    /// By type index inside the imported library
    Index(u32),
}

/// A reference into an imported library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalRef {
    /// Index into [`crate::typelib::TypeLib::imports`]
    pub import: usize,
    /// The designated type
    pub target: ExternalTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_hrefs() {
        let href = HRefType::local(3);
        assert_eq!(href.0, 0x12C);
        assert_eq!(href.local_index(), Some(3));
        assert_eq!(HRefType(0x19).local_index(), None);
    }

    #[test]
    fn typedesc_display() {
        let desc = TypeDesc::ptr(TypeDesc::safearray(TypeDesc::Base(VarType::Bstr)));
        assert_eq!(desc.to_string(), "SAFEARRAY(VT_BSTR)*");
        assert_eq!(desc.vartype(), VarType::Ptr);
        let array = TypeDesc::carray(TypeDesc::Base(VarType::UI1), 16);
        assert_eq!(array.to_string(), "VT_UI1[16]");
    }
}
