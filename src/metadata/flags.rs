//! Attribute flag values of the ECMA-335 II.23.1 enumerations used by the emitter.
//!
//! Row flags are plain integers in the tables, so they are grouped here as constant modules
//! that can be or-ed together directly. Method implementation and P/Invoke flags are `bitflags`.
#![allow(non_snake_case)]

use bitflags::bitflags;

/// `TypeAttributes` (II.23.1.15).
pub mod TypeAttributes {
    /// Mask for the visibility bits
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Not visible outside the assembly
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Visible outside the assembly
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Nested type, public
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Nested type, visible to the assembly only
    pub const NESTED_ASSEMBLY: u32 = 0x0000_0005;
    /// Fields laid out by the runtime
    pub const AUTO_LAYOUT: u32 = 0x0000_0000;
    /// Fields laid out in declaration order
    pub const SEQUENTIAL_LAYOUT: u32 = 0x0000_0008;
    /// Field offsets are given explicitly
    pub const EXPLICIT_LAYOUT: u32 = 0x0000_0010;
    /// Mask for the layout bits
    pub const LAYOUT_MASK: u32 = 0x0000_0018;
    /// The type is an interface
    pub const INTERFACE: u32 = 0x0000_0020;
    /// The type cannot be instantiated
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// The type cannot be derived from
    pub const SEALED: u32 = 0x0000_0100;
    /// The name is significant to tools
    pub const SPECIAL_NAME: u32 = 0x0000_0400;
    /// The type is imported from COM
    pub const IMPORT: u32 = 0x0000_1000;
    /// The type can be serialized
    pub const SERIALIZABLE: u32 = 0x0000_2000;
    /// Strings marshal as ANSI
    pub const ANSI_CLASS: u32 = 0x0000_0000;
    /// Strings marshal as Unicode
    pub const UNICODE_CLASS: u32 = 0x0001_0000;
    /// Static initialization may run before first static field access
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

/// `FieldAttributes` (II.23.1.5).
pub mod FieldAttributes {
    /// Accessible only inside the type
    pub const PRIVATE: u16 = 0x0001;
    /// Accessible inside the assembly
    pub const ASSEMBLY: u16 = 0x0003;
    /// Accessible everywhere
    pub const PUBLIC: u16 = 0x0006;
    /// Per-type rather than per-instance
    pub const STATIC: u16 = 0x0010;
    /// Only assignable during initialization
    pub const INIT_ONLY: u16 = 0x0020;
    /// Compile-time constant
    pub const LITERAL: u16 = 0x0040;
    /// The name is significant to tools
    pub const SPECIAL_NAME: u16 = 0x0200;
    /// The runtime checks the name
    pub const RT_SPECIAL_NAME: u16 = 0x0400;
    /// The field has marshalling information
    pub const HAS_FIELD_MARSHAL: u16 = 0x1000;
    /// The field has a default value
    pub const HAS_DEFAULT: u16 = 0x8000;
}

/// `MethodAttributes` (II.23.1.10).
pub mod MethodAttributes {
    /// Accessible only inside the type
    pub const PRIVATE: u16 = 0x0001;
    /// Accessible everywhere
    pub const PUBLIC: u16 = 0x0006;
    /// Defined on the type rather than per-instance
    pub const STATIC: u16 = 0x0010;
    /// Cannot be overridden
    pub const FINAL: u16 = 0x0020;
    /// Virtual method
    pub const VIRTUAL: u16 = 0x0040;
    /// Hidden by name and signature
    pub const HIDE_BY_SIG: u16 = 0x0080;
    /// Always takes a new slot in the vtable
    pub const NEW_SLOT: u16 = 0x0100;
    /// No implementation in this type
    pub const ABSTRACT: u16 = 0x0400;
    /// The name is significant to tools
    pub const SPECIAL_NAME: u16 = 0x0800;
    /// Implementation forwarded through P/Invoke
    pub const PINVOKE_IMPL: u16 = 0x2000;
    /// The runtime checks the name
    pub const RT_SPECIAL_NAME: u16 = 0x1000;
}

/// `ParamAttributes` (II.23.1.13).
pub mod ParamAttributes {
    /// Input parameter
    pub const IN: u16 = 0x0001;
    /// Output parameter
    pub const OUT: u16 = 0x0002;
    /// Optional parameter
    pub const OPTIONAL: u16 = 0x0010;
    /// The parameter has a default value
    pub const HAS_DEFAULT: u16 = 0x1000;
    /// The parameter has marshalling information
    pub const HAS_FIELD_MARSHAL: u16 = 0x2000;
}

/// `PropertyAttributes` (II.23.1.14).
pub mod PropertyAttributes {
    /// The name is significant to tools
    pub const SPECIAL_NAME: u16 = 0x0200;
    /// The runtime checks the name
    pub const RT_SPECIAL_NAME: u16 = 0x0400;
    /// The property has a default value
    pub const HAS_DEFAULT: u16 = 0x1000;
}

/// `MethodSemanticsAttributes` (II.23.1.12).
pub mod MethodSemanticsAttributes {
    /// Property setter
    pub const SETTER: u16 = 0x0001;
    /// Property getter
    pub const GETTER: u16 = 0x0002;
    /// Other accessor
    pub const OTHER: u16 = 0x0004;
    /// Event subscription
    pub const ADD_ON: u16 = 0x0008;
    /// Event unsubscription
    pub const REMOVE_ON: u16 = 0x0010;
    /// Event raise
    pub const FIRE: u16 = 0x0020;
}

/// `AssemblyFlags` (II.23.1.2).
pub mod AssemblyFlags {
    /// The assembly reference holds the full public key
    pub const PUBLIC_KEY: u32 = 0x0001;
}

/// `AssemblyHashAlgorithm` SHA-1.
pub const HASH_ALGORITHM_SHA1: u32 = 0x8004;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `MethodImplAttributes` (II.23.1.10).
    pub struct MethodImplAttributes: u16 {
        /// Implementation is provided by the runtime
        const RUNTIME = 0x0003;
        /// The signature is exported exactly as declared
        const PRESERVE_SIG = 0x0080;
        /// Internal call
        const INTERNAL_CALL = 0x1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `PInvokeAttributes` (II.23.1.8).
    pub struct PInvokeAttributes: u16 {
        /// Use the member name as specified
        const NO_MANGLE = 0x0001;
        /// Strings marshal as ANSI
        const CHAR_SET_ANSI = 0x0002;
        /// Strings marshal as Unicode
        const CHAR_SET_UNICODE = 0x0004;
        /// Strings marshal by platform
        const CHAR_SET_AUTO = 0x0006;
        /// The callee sets the last error
        const SUPPORTS_LAST_ERROR = 0x0040;
        /// Platform default calling convention
        const CALL_CONV_WINAPI = 0x0100;
        /// C calling convention
        const CALL_CONV_CDECL = 0x0200;
        /// Standard calling convention
        const CALL_CONV_STDCALL = 0x0300;
    }
}
