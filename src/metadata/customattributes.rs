//! Custom attribute value blobs (ECMA-335 II.23.3).
//!
//! Interop attributes carry few and simple constructor arguments: strings, 16/32-bit integers,
//! booleans and type names. [`encode_custom_attribute_value`] serializes such a value;
//! [`parse_custom_attribute_value`] decodes one given the constructor's parameter kinds, which
//! the reader uses to recover `Guid` and `ImportedFromTypeLib` values from referenced assemblies.

use crate::{
    file::{io::write_compressed_uint, Parser},
    Result,
};

/// `CorSerializationType` tags used in named arguments.
#[allow(non_snake_case, missing_docs)]
pub mod SERIALIZATION_TYPE {
    pub const BOOLEAN: u8 = 0x02;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const STRING: u8 = 0x0E;
    pub const TYPE: u8 = 0x50;
}

const NAMED_FIELD: u8 = 0x53;
const NAMED_PROPERTY: u8 = 0x54;

/// A parsed or to-be-encoded custom attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CustomAttributeValue {
    /// Constructor arguments in declaration order
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Named field and property assignments
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

impl CustomAttributeValue {
    /// A value with the given constructor arguments and no named arguments.
    #[must_use]
    pub fn new(fixed_args: Vec<CustomAttributeArgument>) -> Self {
        CustomAttributeValue {
            fixed_args,
            named_args: Vec::new(),
        }
    }
}

/// A single argument value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CustomAttributeArgument {
    /// Boolean value
    Bool(bool),
    /// Signed 16-bit integer, also the underlying type of the interop enums
    I2(i16),
    /// Unsigned 16-bit integer
    U2(u16),
    /// Signed 32-bit integer
    I4(i32),
    /// Unsigned 32-bit integer
    U4(u32),
    /// Signed 64-bit integer
    I8(i64),
    /// String, `None` for a null reference
    String(Option<String>),
    /// Assembly-qualified type name
    Type(String),
}

/// The declared kind of a constructor parameter, needed to decode fixed arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomAttributeArgumentKind {
    /// `bool`
    Bool,
    /// `short`
    I2,
    /// `ushort`
    U2,
    /// `int`
    I4,
    /// `uint`
    U4,
    /// `long`
    I8,
    /// `string`
    String,
    /// `System.Type`
    Type,
}

/// A named argument (field or property).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomAttributeNamedArgument {
    /// `true` for a field, `false` for a property
    pub is_field: bool,
    /// Field or property name
    pub name: String,
    /// The assigned value
    pub value: CustomAttributeArgument,
}

impl CustomAttributeArgument {
    fn kind(&self) -> CustomAttributeArgumentKind {
        match self {
            CustomAttributeArgument::Bool(_) => CustomAttributeArgumentKind::Bool,
            CustomAttributeArgument::I2(_) => CustomAttributeArgumentKind::I2,
            CustomAttributeArgument::U2(_) => CustomAttributeArgumentKind::U2,
            CustomAttributeArgument::I4(_) => CustomAttributeArgumentKind::I4,
            CustomAttributeArgument::U4(_) => CustomAttributeArgumentKind::U4,
            CustomAttributeArgument::I8(_) => CustomAttributeArgumentKind::I8,
            CustomAttributeArgument::String(_) => CustomAttributeArgumentKind::String,
            CustomAttributeArgument::Type(_) => CustomAttributeArgumentKind::Type,
        }
    }
}

impl CustomAttributeArgumentKind {
    fn serialization_type(self) -> u8 {
        match self {
            CustomAttributeArgumentKind::Bool => SERIALIZATION_TYPE::BOOLEAN,
            CustomAttributeArgumentKind::I2 => SERIALIZATION_TYPE::I2,
            CustomAttributeArgumentKind::U2 => SERIALIZATION_TYPE::U2,
            CustomAttributeArgumentKind::I4 => SERIALIZATION_TYPE::I4,
            CustomAttributeArgumentKind::U4 => SERIALIZATION_TYPE::U4,
            CustomAttributeArgumentKind::I8 => SERIALIZATION_TYPE::I8,
            CustomAttributeArgumentKind::String => SERIALIZATION_TYPE::STRING,
            CustomAttributeArgumentKind::Type => SERIALIZATION_TYPE::TYPE,
        }
    }

    fn from_serialization_type(tag: u8) -> Result<Self> {
        match tag {
            SERIALIZATION_TYPE::BOOLEAN => Ok(CustomAttributeArgumentKind::Bool),
            SERIALIZATION_TYPE::I2 => Ok(CustomAttributeArgumentKind::I2),
            SERIALIZATION_TYPE::U2 => Ok(CustomAttributeArgumentKind::U2),
            SERIALIZATION_TYPE::I4 => Ok(CustomAttributeArgumentKind::I4),
            SERIALIZATION_TYPE::U4 => Ok(CustomAttributeArgumentKind::U4),
            SERIALIZATION_TYPE::I8 => Ok(CustomAttributeArgumentKind::I8),
            SERIALIZATION_TYPE::STRING => Ok(CustomAttributeArgumentKind::String),
            SERIALIZATION_TYPE::TYPE => Ok(CustomAttributeArgumentKind::Type),
            _ => Err(crate::Error::NotSupported(format!(
                "named argument serialization type 0x{tag:02x}"
            ))),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_ser_string(value: Option<&str>, buffer: &mut Vec<u8>) {
    match value {
        Some(value) => {
            write_compressed_uint(value.len() as u32, buffer);
            buffer.extend_from_slice(value.as_bytes());
        }
        None => buffer.push(0xFF),
    }
}

fn encode_argument(argument: &CustomAttributeArgument, buffer: &mut Vec<u8>) {
    match argument {
        CustomAttributeArgument::Bool(value) => buffer.push(u8::from(*value)),
        CustomAttributeArgument::I2(value) => buffer.extend_from_slice(&value.to_le_bytes()),
        CustomAttributeArgument::U2(value) => buffer.extend_from_slice(&value.to_le_bytes()),
        CustomAttributeArgument::I4(value) => buffer.extend_from_slice(&value.to_le_bytes()),
        CustomAttributeArgument::U4(value) => buffer.extend_from_slice(&value.to_le_bytes()),
        CustomAttributeArgument::I8(value) => buffer.extend_from_slice(&value.to_le_bytes()),
        CustomAttributeArgument::String(value) => write_ser_string(value.as_deref(), buffer),
        CustomAttributeArgument::Type(name) => write_ser_string(Some(name), buffer),
    }
}

/// Encode `value` as a `CustomAttribute.Value` blob.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_custom_attribute_value(value: &CustomAttributeValue) -> Vec<u8> {
    let mut buffer = vec![0x01, 0x00];

    for argument in &value.fixed_args {
        encode_argument(argument, &mut buffer);
    }

    buffer.extend_from_slice(&(value.named_args.len() as u16).to_le_bytes());
    for named in &value.named_args {
        buffer.push(if named.is_field {
            NAMED_FIELD
        } else {
            NAMED_PROPERTY
        });
        buffer.push(named.value.kind().serialization_type());
        write_ser_string(Some(&named.name), &mut buffer);
        encode_argument(&named.value, &mut buffer);
    }

    buffer
}

fn parse_argument(
    parser: &mut Parser<'_>,
    kind: CustomAttributeArgumentKind,
) -> Result<CustomAttributeArgument> {
    Ok(match kind {
        CustomAttributeArgumentKind::Bool => {
            CustomAttributeArgument::Bool(parser.read_le::<u8>()? != 0)
        }
        CustomAttributeArgumentKind::I2 => CustomAttributeArgument::I2(parser.read_le::<i16>()?),
        CustomAttributeArgumentKind::U2 => CustomAttributeArgument::U2(parser.read_le::<u16>()?),
        CustomAttributeArgumentKind::I4 => CustomAttributeArgument::I4(parser.read_le::<i32>()?),
        CustomAttributeArgumentKind::U4 => CustomAttributeArgument::U4(parser.read_le::<u32>()?),
        CustomAttributeArgumentKind::I8 => CustomAttributeArgument::I8(parser.read_le::<i64>()?),
        CustomAttributeArgumentKind::String => {
            CustomAttributeArgument::String(parser.read_ser_string()?)
        }
        CustomAttributeArgumentKind::Type => match parser.read_ser_string()? {
            Some(name) => CustomAttributeArgument::Type(name),
            None => return Err(malformed_error!("Null type name in custom attribute")),
        },
    })
}

/// Decode a `CustomAttribute.Value` blob whose constructor takes `params`.
///
/// # Errors
/// Returns an error for a missing prolog, truncated data, or unsupported named argument types.
pub fn parse_custom_attribute_value(
    data: &[u8],
    params: &[CustomAttributeArgumentKind],
) -> Result<CustomAttributeValue> {
    let mut parser = Parser::new(data);
    let prolog = parser.read_le::<u16>()?;
    if prolog != 0x0001 {
        return Err(malformed_error!(
            "Invalid custom attribute prolog - 0x{:04x}",
            prolog
        ));
    }

    let mut value = CustomAttributeValue::default();
    for kind in params {
        value.fixed_args.push(parse_argument(&mut parser, *kind)?);
    }

    if !parser.has_more_data() {
        return Ok(value);
    }

    let named_count = parser.read_le::<u16>()?;
    for _ in 0..named_count {
        let is_field = match parser.read_le::<u8>()? {
            NAMED_FIELD => true,
            NAMED_PROPERTY => false,
            other => {
                return Err(malformed_error!(
                    "Invalid named argument marker - 0x{:02x}",
                    other
                ))
            }
        };
        let kind = CustomAttributeArgumentKind::from_serialization_type(parser.read_le::<u8>()?)?;
        let Some(name) = parser.read_ser_string()? else {
            return Err(malformed_error!("Null named argument name"));
        };

        value.named_args.push(CustomAttributeNamedArgument {
            is_field,
            name,
            value: parse_argument(&mut parser, kind)?,
        });
    }

    Ok(value)
}
