//! Enumerations and flag sets of the OLE Automation type description model.
//!
//! The numeric values are the ones stored in MSFT type library images and returned by the
//! `ITypeLib` / `ITypeInfo` API, so they can be decoded with `from_repr` / `from_bits_truncate`.

use bitflags::bitflags;
use strum::{Display, EnumIter, FromRepr};

/// The OLE Automation `VARTYPE` tag.
///
/// Only the base tags are modelled; the `VT_VECTOR`, `VT_ARRAY` and `VT_BYREF` modifier bits
/// never appear inside a `TYPEDESC` and are masked off with [`VARTYPE_MASK`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display, EnumIter)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum VarType {
    #[strum(serialize = "VT_EMPTY")]
    Empty = 0,
    #[strum(serialize = "VT_NULL")]
    Null = 1,
    #[strum(serialize = "VT_I2")]
    I2 = 2,
    #[strum(serialize = "VT_I4")]
    I4 = 3,
    #[strum(serialize = "VT_R4")]
    R4 = 4,
    #[strum(serialize = "VT_R8")]
    R8 = 5,
    #[strum(serialize = "VT_CY")]
    Cy = 6,
    #[strum(serialize = "VT_DATE")]
    Date = 7,
    #[strum(serialize = "VT_BSTR")]
    Bstr = 8,
    #[strum(serialize = "VT_DISPATCH")]
    Dispatch = 9,
    #[strum(serialize = "VT_ERROR")]
    Error = 10,
    #[strum(serialize = "VT_BOOL")]
    Bool = 11,
    #[strum(serialize = "VT_VARIANT")]
    Variant = 12,
    #[strum(serialize = "VT_UNKNOWN")]
    Unknown = 13,
    #[strum(serialize = "VT_DECIMAL")]
    Decimal = 14,
    #[strum(serialize = "VT_I1")]
    I1 = 16,
    #[strum(serialize = "VT_UI1")]
    UI1 = 17,
    #[strum(serialize = "VT_UI2")]
    UI2 = 18,
    #[strum(serialize = "VT_UI4")]
    UI4 = 19,
    #[strum(serialize = "VT_I8")]
    I8 = 20,
    #[strum(serialize = "VT_UI8")]
    UI8 = 21,
    #[strum(serialize = "VT_INT")]
    Int = 22,
    #[strum(serialize = "VT_UINT")]
    UInt = 23,
    #[strum(serialize = "VT_VOID")]
    Void = 24,
    #[strum(serialize = "VT_HRESULT")]
    HResult = 25,
    #[strum(serialize = "VT_PTR")]
    Ptr = 26,
    #[strum(serialize = "VT_SAFEARRAY")]
    SafeArray = 27,
    #[strum(serialize = "VT_CARRAY")]
    CArray = 28,
    #[strum(serialize = "VT_USERDEFINED")]
    UserDefined = 29,
    #[strum(serialize = "VT_LPSTR")]
    LpStr = 30,
    #[strum(serialize = "VT_LPWSTR")]
    LpWStr = 31,
    #[strum(serialize = "VT_RECORD")]
    Record = 36,
    #[strum(serialize = "VT_INT_PTR")]
    IntPtr = 37,
    #[strum(serialize = "VT_UINT_PTR")]
    UIntPtr = 38,
    #[strum(serialize = "VT_FILETIME")]
    FileTime = 64,
    #[strum(serialize = "VT_BLOB")]
    Blob = 65,
    #[strum(serialize = "VT_CLSID")]
    Clsid = 72,
}

/// Mask selecting the base tag of a `VARTYPE`.
pub const VARTYPE_MASK: u16 = 0x0FFF;

impl VarType {
    /// Decode the base tag of a raw `VARTYPE`, ignoring modifier bits.
    #[must_use]
    pub fn from_raw(raw: u16) -> Option<VarType> {
        VarType::from_repr(raw & VARTYPE_MASK)
    }

    /// `true` for the tags that carry a nested type description.
    #[must_use]
    pub fn is_compound(self) -> bool {
        matches!(
            self,
            VarType::Ptr | VarType::SafeArray | VarType::CArray | VarType::UserDefined
        )
    }
}

/// `TYPEKIND`: the variant of a type description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display, EnumIter)]
#[repr(u8)]
pub enum TypeKind {
    /// An enumeration of named constants.
    Enum = 0,
    /// A structure with per-instance fields.
    Record = 1,
    /// A module of static functions and constants.
    Module = 2,
    /// A vtable-based interface.
    Interface = 3,
    /// A dispatch (`IDispatch`-only) interface.
    Dispatch = 4,
    /// A creatable component class.
    CoClass = 5,
    /// A typedef of another type.
    Alias = 6,
    /// A union: every field at offset zero.
    Union = 7,
}

/// `FUNCKIND`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum FuncKind {
    Virtual = 0,
    PureVirtual = 1,
    NonVirtual = 2,
    Static = 3,
    Dispatch = 4,
}

/// `INVOKEKIND`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
pub enum InvokeKind {
    /// A plain method.
    Func = 1,
    /// A property getter.
    PropertyGet = 2,
    /// A by-value property setter.
    PropertyPut = 4,
    /// A by-reference property setter.
    PropertyPutRef = 8,
}

/// `CALLCONV`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum CallConv {
    FastCall = 0,
    CDecl = 1,
    Pascal = 2,
    MacPascal = 3,
    StdCall = 4,
    FpFastCall = 5,
    Syscall = 6,
    MpwCDecl = 7,
    MpwPascal = 8,
}

/// `VARKIND`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum VarKind {
    PerInstance = 0,
    Static = 1,
    Const = 2,
    Dispatch = 3,
}

/// `SYSKIND`: the platform a library was compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum SysKind {
    Win16 = 0,
    Win32 = 1,
    Mac = 2,
    Win64 = 3,
}

impl SysKind {
    /// Size of a pointer on this platform, used to scale vtable offsets.
    #[must_use]
    pub fn pointer_size(self) -> u16 {
        match self {
            SysKind::Win64 => 8,
            SysKind::Win16 => 2,
            SysKind::Win32 | SysKind::Mac => 4,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `TYPEFLAGS`
    pub struct TypeFlags: u16 {
        /// An application object
        const APPOBJECT = 0x0001;
        /// Instances can be created with `CoCreateInstance`
        const CANCREATE = 0x0002;
        /// Requires a license to create
        const LICENSED = 0x0004;
        /// Predeclared instance
        const PREDECLID = 0x0008;
        /// Hidden from browsers
        const HIDDEN = 0x0010;
        /// An ActiveX control
        const CONTROL = 0x0020;
        /// Exposes both vtable and `IDispatch` binding
        const DUAL = 0x0040;
        /// Members cannot be added at run time
        const NONEXTENSIBLE = 0x0080;
        /// Uses only Automation compatible types
        const OLEAUTOMATION = 0x0100;
        /// Not accessible from macro languages
        const RESTRICTED = 0x0200;
        /// Supports aggregation
        const AGGREGATABLE = 0x0400;
        /// Supports `IConnectionPointWithDefault`
        const REPLACEABLE = 0x0800;
        /// Derives from `IDispatch`
        const DISPATCHABLE = 0x1000;
        /// Reverse binding order for `IDispatch`
        const REVERSEBIND = 0x2000;
        /// Interfaces are proxied
        const PROXY = 0x4000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `FUNCFLAGS`
    pub struct FuncFlags: u16 {
        /// Not accessible from macro languages
        const RESTRICTED = 0x0001;
        /// Fires events
        const SOURCE = 0x0002;
        /// Supports data binding
        const BINDABLE = 0x0004;
        /// Calls `OnRequestEdit` before changing
        const REQUESTEDIT = 0x0008;
        /// Displayed to the user as bindable
        const DISPLAYBIND = 0x0010;
        /// The default bindable property
        const DEFAULTBIND = 0x0020;
        /// Hidden from browsers
        const HIDDEN = 0x0040;
        /// Uses `SetLastError`
        const USESGETLASTERROR = 0x0080;
        /// The default member of a collection
        const DEFAULTCOLLELEM = 0x0100;
        /// The default member for the user interface
        const UIDEFAULT = 0x0200;
        /// Not shown in property browsers
        const NONBROWSABLE = 0x0400;
        /// Supports `IConnectionPointWithDefault`
        const REPLACEABLE = 0x0800;
        /// Change notifications are immediate
        const IMMEDIATEBIND = 0x1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `VARFLAGS`
    pub struct VarFlags: u16 {
        /// Cannot be assigned
        const READONLY = 0x0001;
        /// Fires events
        const SOURCE = 0x0002;
        /// Supports data binding
        const BINDABLE = 0x0004;
        /// Calls `OnRequestEdit` before changing
        const REQUESTEDIT = 0x0008;
        /// Displayed to the user as bindable
        const DISPLAYBIND = 0x0010;
        /// The default bindable property
        const DEFAULTBIND = 0x0020;
        /// Hidden from browsers
        const HIDDEN = 0x0040;
        /// Not accessible from macro languages
        const RESTRICTED = 0x0080;
        /// The default member of a collection
        const DEFAULTCOLLELEM = 0x0100;
        /// The default member for the user interface
        const UIDEFAULT = 0x0200;
        /// Not shown in property browsers
        const NONBROWSABLE = 0x0400;
        /// Supports `IConnectionPointWithDefault`
        const REPLACEABLE = 0x0800;
        /// Change notifications are immediate
        const IMMEDIATEBIND = 0x1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `PARAMFLAGS`
    pub struct ParamFlags: u16 {
        /// Passes information from caller to callee
        const IN = 0x0001;
        /// Returns information from callee to caller
        const OUT = 0x0002;
        /// Receives the caller's locale id
        const LCID = 0x0004;
        /// Receives the return value
        const RETVAL = 0x0008;
        /// May be omitted
        const OPT = 0x0010;
        /// Carries a default value
        const HASDEFAULT = 0x0020;
        /// Carries custom data
        const HASCUSTDATA = 0x0040;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `IMPLTYPEFLAGS`
    pub struct ImplTypeFlags: u16 {
        /// The default interface or source interface
        const DEFAULT = 0x0001;
        /// A source (event) interface
        const SOURCE = 0x0002;
        /// Not accessible from macro languages
        const RESTRICTED = 0x0004;
        /// The vtable-bound default of a dual interface pair
        const DEFAULTVTABLE = 0x0008;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `LIBFLAGS`
    pub struct LibFlags: u16 {
        /// Not accessible from macro languages
        const RESTRICTED = 0x0001;
        /// Describes controls
        const CONTROL = 0x0002;
        /// Hidden from browsers
        const HIDDEN = 0x0004;
        /// Exists in a persisted form on disk
        const HASDISKIMAGE = 0x0008;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vartype_masks_modifiers() {
        assert_eq!(VarType::from_raw(0x4003), Some(VarType::I4));
        assert_eq!(VarType::from_raw(0x2008), Some(VarType::Bstr));
        assert_eq!(VarType::from_raw(15), None);
        assert_eq!(VarType::Bstr.to_string(), "VT_BSTR");
    }

    #[test]
    fn kinds_decode_from_raw() {
        assert_eq!(TypeKind::from_repr(5), Some(TypeKind::CoClass));
        assert_eq!(InvokeKind::from_repr(8), Some(InvokeKind::PropertyPutRef));
        assert_eq!(InvokeKind::from_repr(3), None);
        assert_eq!(SysKind::Win64.pointer_size(), 8);
    }

    #[test]
    fn flags_truncate_unknown_bits() {
        let flags = ImplTypeFlags::from_bits_truncate(0x0103);
        assert_eq!(flags, ImplTypeFlags::DEFAULT | ImplTypeFlags::SOURCE);
    }
}
