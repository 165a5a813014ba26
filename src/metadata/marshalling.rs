//! Native type marshalling descriptors (ECMA-335 II.23.4).
//!
//! Every COM type that does not map one-to-one onto a managed type gets a `FieldMarshal` row
//! whose blob is an encoded [`NativeType`]: `BSTR` for strings, `VARIANT_BOOL` for booleans,
//! `SAFEARRAY` for safe arrays and so on. [`encode_marshalling_descriptor`] produces those blobs;
//! [`parse_marshalling_descriptor`] decodes them again for inspection.
//!
//! # Examples
//!
//! ```rust
//! use tlbscope::metadata::marshalling::{
//!     encode_marshalling_descriptor, parse_marshalling_descriptor, NativeType, VARIANT_TYPE,
//! };
//!
//! let safe_array = NativeType::SafeArray {
//!     variant_type: VARIANT_TYPE::BSTR,
//!     user_defined_name: None,
//! };
//! let blob = encode_marshalling_descriptor(&safe_array);
//! assert_eq!(blob, [0x1d, 0x08]);
//! assert_eq!(parse_marshalling_descriptor(&blob)?.primary_type, safe_array);
//! # Ok::<(), tlbscope::Error>(())
//! ```

use crate::{
    file::{io::write_compressed_uint, Parser},
    Error::RecursionLimit,
    Result,
};

#[allow(non_snake_case)]
/// Native type constants of ECMA-335 II.23.4 and the COM interop extensions.
pub mod NATIVE_TYPE {
    /// End of the descriptor
    pub const END: u8 = 0x00;
    /// `void`
    pub const VOID: u8 = 0x01;
    /// 4-byte Win32 `BOOL`
    pub const BOOLEAN: u8 = 0x02;
    /// `signed char`
    pub const I1: u8 = 0x03;
    /// `unsigned char`
    pub const U1: u8 = 0x04;
    /// `short`
    pub const I2: u8 = 0x05;
    /// `unsigned short`
    pub const U2: u8 = 0x06;
    /// `long`
    pub const I4: u8 = 0x07;
    /// `unsigned long`
    pub const U4: u8 = 0x08;
    /// `__int64`
    pub const I8: u8 = 0x09;
    /// `unsigned __int64`
    pub const U8: u8 = 0x0a;
    /// `float`
    pub const R4: u8 = 0x0b;
    /// `double`
    pub const R8: u8 = 0x0c;
    /// `CY`
    pub const CURRENCY: u8 = 0x0f;
    /// `DATE`
    pub const DATE: u8 = 0x10;
    /// `BSTR`
    pub const BSTR: u8 = 0x13;
    /// ANSI string pointer
    pub const LPSTR: u8 = 0x14;
    /// Unicode string pointer
    pub const LPWSTR: u8 = 0x15;
    /// `IUnknown*`
    pub const IUNKNOWN: u8 = 0x19;
    /// `IDispatch*`
    pub const IDISPATCH: u8 = 0x1a;
    /// By-value structure, also used for `VARIANT`
    pub const STRUCT: u8 = 0x1b;
    /// COM interface pointer
    pub const INTERFACE: u8 = 0x1c;
    /// `SAFEARRAY`
    pub const SAFEARRAY: u8 = 0x1d;
    /// Fixed-length in-line array
    pub const FIXEDARRAY: u8 = 0x1e;
    /// Platform `int`
    pub const INT: u8 = 0x1f;
    /// Platform `unsigned int`
    pub const UINT: u8 = 0x20;
    /// Fixed-length in-line string
    pub const BYVALSTR: u8 = 0x22;
    /// `VARIANT_BOOL`
    pub const VARIANTBOOL: u8 = 0x25;
    /// Function pointer
    pub const FUNC: u8 = 0x26;
    /// Pointer to a structure
    pub const LPSTRUCT: u8 = 0x2b;
    /// `HRESULT`
    pub const ERROR: u8 = 0x2d;
    /// Sentinel for "no type"
    pub const MAX: u8 = 0x50;
}

#[allow(non_snake_case)]
/// `VARTYPE` values that tag `SAFEARRAY` elements.
pub mod VARIANT_TYPE {
    /// No element type recorded
    pub const EMPTY: u16 = 0;
    /// `short`
    pub const I2: u16 = 2;
    /// `long`
    pub const I4: u16 = 3;
    /// `float`
    pub const R4: u16 = 4;
    /// `double`
    pub const R8: u16 = 5;
    /// `CY`
    pub const CY: u16 = 6;
    /// `DATE`
    pub const DATE: u16 = 7;
    /// `BSTR`
    pub const BSTR: u16 = 8;
    /// `IDispatch*`
    pub const DISPATCH: u16 = 9;
    /// `SCODE`
    pub const ERROR: u16 = 10;
    /// `VARIANT_BOOL`
    pub const BOOL: u16 = 11;
    /// `VARIANT`
    pub const VARIANT: u16 = 12;
    /// `IUnknown*`
    pub const UNKNOWN: u16 = 13;
    /// `DECIMAL`
    pub const DECIMAL: u16 = 14;
    /// `char`
    pub const I1: u16 = 16;
    /// `unsigned char`
    pub const UI1: u16 = 17;
    /// `unsigned short`
    pub const UI2: u16 = 18;
    /// `unsigned long`
    pub const UI4: u16 = 19;
    /// `__int64`
    pub const I8: u16 = 20;
    /// `unsigned __int64`
    pub const UI8: u16 = 21;
    /// `int`
    pub const INT: u16 = 22;
    /// `unsigned int`
    pub const UINT: u16 = 23;
    /// User defined record
    pub const RECORD: u16 = 36;
    /// Mask for the base type
    pub const TYPEMASK: u16 = 0x0fff;
}

const MAX_RECURSION_DEPTH: usize = 50;

/// A decoded marshalling descriptor.
#[derive(Debug, PartialEq, Clone)]
pub struct MarshallingInfo {
    /// The primary native type
    pub primary_type: NativeType,
    /// Trailing types after the primary one, rarely present
    pub additional_types: Vec<NativeType>,
}

/// A native type for marshalling between managed and unmanaged code.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum NativeType {
    /// `void`
    Void,
    /// 4-byte `BOOL`
    Boolean,
    /// `signed char`
    I1,
    /// `unsigned char`
    U1,
    /// `short`
    I2,
    /// `unsigned short`
    U2,
    /// `long`
    I4,
    /// `unsigned long`
    U4,
    /// `__int64`
    I8,
    /// `unsigned __int64`
    U8,
    /// `float`
    R4,
    /// `double`
    R8,
    /// `CY`
    Currency,
    /// `DATE`
    Date,
    /// Platform `int`
    Int,
    /// Platform `unsigned int`
    UInt,
    /// `HRESULT`
    Error,
    /// `BSTR`
    BStr,
    /// ANSI string pointer
    LPStr {
        /// Parameter holding the length
        size_param_index: Option<u32>,
    },
    /// Unicode string pointer
    LPWStr {
        /// Parameter holding the length
        size_param_index: Option<u32>,
    },
    /// Fixed-length in-line string
    ByValStr {
        /// Length in characters
        size: u32,
    },
    /// `VARIANT_BOOL`
    VariantBool,
    /// Fixed-length in-line array
    FixedArray {
        /// Element count
        size: u32,
        /// Element native type
        element_type: Option<Box<NativeType>>,
    },
    /// `SAFEARRAY`
    SafeArray {
        /// `VARTYPE` of the elements
        variant_type: u16,
        /// Element type name for `VT_RECORD` arrays
        user_defined_name: Option<String>,
    },
    /// `IUnknown*`
    IUnknown,
    /// `IDispatch*`
    IDispatch,
    /// COM interface pointer
    Interface {
        /// Parameter holding the IID
        iid_param_index: Option<u32>,
    },
    /// By-value structure, `VARIANT` included
    Struct {
        /// Packing size
        packing_size: Option<u8>,
        /// Total size
        class_size: Option<u32>,
    },
    /// Pointer to a structure
    LPStruct,
    /// Function pointer
    Func,
    /// End marker
    End,
}

fn encode_native_type(native_type: &NativeType, buffer: &mut Vec<u8>) {
    match native_type {
        NativeType::Void => buffer.push(NATIVE_TYPE::VOID),
        NativeType::Boolean => buffer.push(NATIVE_TYPE::BOOLEAN),
        NativeType::I1 => buffer.push(NATIVE_TYPE::I1),
        NativeType::U1 => buffer.push(NATIVE_TYPE::U1),
        NativeType::I2 => buffer.push(NATIVE_TYPE::I2),
        NativeType::U2 => buffer.push(NATIVE_TYPE::U2),
        NativeType::I4 => buffer.push(NATIVE_TYPE::I4),
        NativeType::U4 => buffer.push(NATIVE_TYPE::U4),
        NativeType::I8 => buffer.push(NATIVE_TYPE::I8),
        NativeType::U8 => buffer.push(NATIVE_TYPE::U8),
        NativeType::R4 => buffer.push(NATIVE_TYPE::R4),
        NativeType::R8 => buffer.push(NATIVE_TYPE::R8),
        NativeType::Currency => buffer.push(NATIVE_TYPE::CURRENCY),
        NativeType::Date => buffer.push(NATIVE_TYPE::DATE),
        NativeType::Int => buffer.push(NATIVE_TYPE::INT),
        NativeType::UInt => buffer.push(NATIVE_TYPE::UINT),
        NativeType::Error => buffer.push(NATIVE_TYPE::ERROR),
        NativeType::BStr => buffer.push(NATIVE_TYPE::BSTR),
        NativeType::LPStr { size_param_index } => {
            buffer.push(NATIVE_TYPE::LPSTR);
            if let Some(index) = size_param_index {
                write_compressed_uint(*index, buffer);
            }
        }
        NativeType::LPWStr { size_param_index } => {
            buffer.push(NATIVE_TYPE::LPWSTR);
            if let Some(index) = size_param_index {
                write_compressed_uint(*index, buffer);
            }
        }
        NativeType::ByValStr { size } => {
            buffer.push(NATIVE_TYPE::BYVALSTR);
            write_compressed_uint(*size, buffer);
        }
        NativeType::VariantBool => buffer.push(NATIVE_TYPE::VARIANTBOOL),
        NativeType::FixedArray { size, element_type } => {
            buffer.push(NATIVE_TYPE::FIXEDARRAY);
            write_compressed_uint(*size, buffer);
            if let Some(element) = element_type {
                encode_native_type(element, buffer);
            }
        }
        NativeType::SafeArray {
            variant_type,
            user_defined_name,
        } => {
            buffer.push(NATIVE_TYPE::SAFEARRAY);
            if *variant_type != VARIANT_TYPE::EMPTY || user_defined_name.is_some() {
                write_compressed_uint(u32::from(*variant_type), buffer);
            }
            if let Some(name) = user_defined_name {
                #[allow(clippy::cast_possible_truncation)]
                write_compressed_uint(name.len() as u32, buffer);
                buffer.extend_from_slice(name.as_bytes());
            }
        }
        NativeType::IUnknown => buffer.push(NATIVE_TYPE::IUNKNOWN),
        NativeType::IDispatch => buffer.push(NATIVE_TYPE::IDISPATCH),
        NativeType::Interface { iid_param_index } => {
            buffer.push(NATIVE_TYPE::INTERFACE);
            if let Some(index) = iid_param_index {
                write_compressed_uint(*index, buffer);
            }
        }
        NativeType::Struct {
            packing_size,
            class_size,
        } => {
            buffer.push(NATIVE_TYPE::STRUCT);
            if let Some(packing) = packing_size {
                buffer.push(*packing);
                if let Some(size) = class_size {
                    write_compressed_uint(*size, buffer);
                }
            }
        }
        NativeType::LPStruct => buffer.push(NATIVE_TYPE::LPSTRUCT),
        NativeType::Func => buffer.push(NATIVE_TYPE::FUNC),
        NativeType::End => buffer.push(NATIVE_TYPE::END),
    }
}

/// Encode `native_type` as a `FieldMarshal` blob.
#[must_use]
pub fn encode_marshalling_descriptor(native_type: &NativeType) -> Vec<u8> {
    let mut buffer = Vec::new();
    encode_native_type(native_type, &mut buffer);
    buffer
}

/// Parses a marshalling descriptor from bytes.
///
/// # Errors
/// Returns an error for truncated or unknown descriptors, or when nesting exceeds the
/// recursion limit.
pub fn parse_marshalling_descriptor(data: &[u8]) -> Result<MarshallingInfo> {
    let mut parser = MarshallingParser::new(data);
    parser.parse_descriptor()
}

/// Decoder for marshalling descriptors.
pub struct MarshallingParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> MarshallingParser<'a> {
    /// Create a parser over a descriptor blob.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        MarshallingParser {
            parser: Parser::new(data),
            depth: 0,
        }
    }

    fn optional_uint(&mut self) -> Result<Option<u32>> {
        if self.parser.has_more_data() && self.parser.peek_byte()? != NATIVE_TYPE::END {
            Ok(Some(self.parser.read_compressed_uint()?))
        } else {
            Ok(None)
        }
    }

    /// Parse a single native type.
    ///
    /// # Errors
    /// Returns an error if the native type cannot be parsed or the recursion limit is exceeded.
    pub fn parse_native_type(&mut self) -> Result<NativeType> {
        self.depth += 1;
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(RecursionLimit(MAX_RECURSION_DEPTH));
        }

        let head_byte = self.parser.read_le::<u8>()?;
        let native_type = match head_byte {
            NATIVE_TYPE::END | NATIVE_TYPE::MAX => NativeType::End,
            NATIVE_TYPE::VOID => NativeType::Void,
            NATIVE_TYPE::BOOLEAN => NativeType::Boolean,
            NATIVE_TYPE::I1 => NativeType::I1,
            NATIVE_TYPE::U1 => NativeType::U1,
            NATIVE_TYPE::I2 => NativeType::I2,
            NATIVE_TYPE::U2 => NativeType::U2,
            NATIVE_TYPE::I4 => NativeType::I4,
            NATIVE_TYPE::U4 => NativeType::U4,
            NATIVE_TYPE::I8 => NativeType::I8,
            NATIVE_TYPE::U8 => NativeType::U8,
            NATIVE_TYPE::R4 => NativeType::R4,
            NATIVE_TYPE::R8 => NativeType::R8,
            NATIVE_TYPE::CURRENCY => NativeType::Currency,
            NATIVE_TYPE::DATE => NativeType::Date,
            NATIVE_TYPE::INT => NativeType::Int,
            NATIVE_TYPE::UINT => NativeType::UInt,
            NATIVE_TYPE::ERROR => NativeType::Error,
            NATIVE_TYPE::BSTR => NativeType::BStr,
            NATIVE_TYPE::LPSTR => NativeType::LPStr {
                size_param_index: self.optional_uint()?,
            },
            NATIVE_TYPE::LPWSTR => NativeType::LPWStr {
                size_param_index: self.optional_uint()?,
            },
            NATIVE_TYPE::BYVALSTR => NativeType::ByValStr {
                size: self.parser.read_compressed_uint()?,
            },
            NATIVE_TYPE::VARIANTBOOL => NativeType::VariantBool,
            NATIVE_TYPE::FIXEDARRAY => {
                let size = self.parser.read_compressed_uint()?;
                let element_type = if self.parser.has_more_data()
                    && self.parser.peek_byte()? != NATIVE_TYPE::END
                {
                    Some(Box::new(self.parse_native_type()?))
                } else {
                    None
                };
                NativeType::FixedArray { size, element_type }
            }
            NATIVE_TYPE::SAFEARRAY => {
                #[allow(clippy::cast_possible_truncation)]
                let variant_type = if self.parser.has_more_data() {
                    (self.parser.read_compressed_uint()? as u16) & VARIANT_TYPE::TYPEMASK
                } else {
                    VARIANT_TYPE::EMPTY
                };

                let user_defined_name = if self.parser.has_more_data() {
                    self.parser.read_ser_string()?
                } else {
                    None
                };

                NativeType::SafeArray {
                    variant_type,
                    user_defined_name,
                }
            }
            NATIVE_TYPE::IUNKNOWN => NativeType::IUnknown,
            NATIVE_TYPE::IDISPATCH => NativeType::IDispatch,
            NATIVE_TYPE::INTERFACE => NativeType::Interface {
                iid_param_index: self.optional_uint()?,
            },
            NATIVE_TYPE::STRUCT => {
                let packing_size = if self.parser.has_more_data()
                    && self.parser.peek_byte()? != NATIVE_TYPE::END
                {
                    Some(self.parser.read_le::<u8>()?)
                } else {
                    None
                };
                NativeType::Struct {
                    packing_size,
                    class_size: self.optional_uint()?,
                }
            }
            NATIVE_TYPE::LPSTRUCT => NativeType::LPStruct,
            NATIVE_TYPE::FUNC => NativeType::Func,
            _ => return Err(malformed_error!("Invalid NATIVE_TYPE byte - {}", head_byte)),
        };

        self.depth -= 1;
        Ok(native_type)
    }

    /// Parse a complete descriptor.
    ///
    /// # Errors
    /// Returns an error if the descriptor is malformed.
    pub fn parse_descriptor(&mut self) -> Result<MarshallingInfo> {
        let primary_type = self.parse_native_type()?;

        let mut descriptor = MarshallingInfo {
            primary_type,
            additional_types: Vec::new(),
        };

        while self.parser.has_more_data() {
            if self.parser.peek_byte()? == NATIVE_TYPE::END {
                self.parser.read_le::<u8>()?;
                break;
            }

            let next_type = self.parse_native_type()?;
            descriptor.additional_types.push(next_type);
        }

        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_types() {
        for (native, byte) in [
            (NativeType::BStr, NATIVE_TYPE::BSTR),
            (NativeType::VariantBool, NATIVE_TYPE::VARIANTBOOL),
            (NativeType::Currency, NATIVE_TYPE::CURRENCY),
            (NativeType::IUnknown, NATIVE_TYPE::IUNKNOWN),
            (NativeType::IDispatch, NATIVE_TYPE::IDISPATCH),
            (NativeType::Error, NATIVE_TYPE::ERROR),
        ] {
            let blob = encode_marshalling_descriptor(&native);
            assert_eq!(blob, [byte]);
            assert_eq!(parse_marshalling_descriptor(&blob).unwrap().primary_type, native);
        }
    }

    #[test]
    fn variant_is_plain_struct() {
        let variant = NativeType::Struct {
            packing_size: None,
            class_size: None,
        };
        assert_eq!(encode_marshalling_descriptor(&variant), [0x1b]);
    }

    #[test]
    fn fixed_array_with_element() {
        let native = NativeType::FixedArray {
            size: 16,
            element_type: Some(Box::new(NativeType::I4)),
        };
        let blob = encode_marshalling_descriptor(&native);
        assert_eq!(blob, [0x1e, 0x10, 0x07]);
        assert_eq!(parse_marshalling_descriptor(&blob).unwrap().primary_type, native);
    }

    #[test]
    fn safe_array_of_records() {
        let native = NativeType::SafeArray {
            variant_type: VARIANT_TYPE::RECORD,
            user_defined_name: Some("Shapes.Point".to_string()),
        };
        let blob = encode_marshalling_descriptor(&native);
        assert_eq!(&blob[..3], &[0x1d, 0x24, 12]);
        assert_eq!(parse_marshalling_descriptor(&blob).unwrap().primary_type, native);
    }

    #[test]
    fn unknown_byte() {
        assert!(parse_marshalling_descriptor(&[0x40]).is_err());
        assert!(parse_marshalling_descriptor(&[]).is_err());
    }
}
