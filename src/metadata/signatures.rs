//! ECMA-335 II.23.2 signature blobs.
//!
//! The importer describes every method, field and property type as a [`TypeSignature`] tree and
//! serializes it with [`encode_method_signature`], [`encode_field_signature`] or
//! [`encode_property_signature`]. [`SignatureParser`] decodes the same subset, which the reader and
//! the tests use to inspect emitted assemblies.
//!
//! References to other types are carried as tokens (`TypeDef` or `TypeRef`) and packed as
//! `TypeDefOrRef` coded indices, so a type that is merely reserved can already be named.

use std::fmt;

use crate::{
    file::{io::write_compressed_uint, Parser},
    metadata::{
        tables::{CodedIndex, CodedIndexType},
        token::Token,
    },
    Error::RecursionLimit,
    Result,
};

/// Element type tags (II.23.1.16).
#[allow(non_snake_case, missing_docs)]
pub mod ELEMENT_TYPE {
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    pub const PTR: u8 = 0x0f;
    pub const BYREF: u8 = 0x10;
    pub const VALUETYPE: u8 = 0x11;
    pub const CLASS: u8 = 0x12;
    pub const I: u8 = 0x18;
    pub const U: u8 = 0x19;
    pub const OBJECT: u8 = 0x1c;
    pub const SZARRAY: u8 = 0x1d;
    pub const CMOD_REQD: u8 = 0x1f;
    pub const CMOD_OPT: u8 = 0x20;
}

/// Calling convention byte of method signatures.
#[allow(non_snake_case)]
pub mod CALLING_CONVENTION {
    /// Managed default
    pub const DEFAULT: u8 = 0x00;
    /// Instance method
    pub const HASTHIS: u8 = 0x20;
}

/// Leading byte of non-method signatures.
#[allow(non_snake_case)]
pub mod SIGNATURE_HEADER {
    /// Field signature
    pub const FIELD: u8 = 0x06;
    /// Property signature
    pub const PROPERTY: u8 = 0x08;
}

const MAX_RECURSION_DEPTH: usize = 50;

/// A type inside a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TypeSignature {
    /// `void`, return types only
    #[default]
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `sbyte`
    I1,
    /// `byte`
    U1,
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
    /// `ulong`
    U8,
    /// `float`
    R4,
    /// `double`
    R8,
    /// `string`
    String,
    /// `object`
    Object,
    /// `IntPtr`
    I,
    /// `UIntPtr`
    U,
    /// Unmanaged pointer
    Ptr(Box<TypeSignature>),
    /// A value type named by a `TypeDef` or `TypeRef` token
    ValueType(Token),
    /// A reference type named by a `TypeDef` or `TypeRef` token
    Class(Token),
    /// Single-dimensional zero-based array
    SzArray(Box<TypeSignature>),
}

/// A parameter or return type; `by_ref` adds the `BYREF` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureParameter {
    /// Passed by reference
    pub by_ref: bool,
    /// The parameter type
    pub base: TypeSignature,
}

impl SignatureParameter {
    /// A by-value parameter of type `base`.
    #[must_use]
    pub fn value(base: TypeSignature) -> Self {
        SignatureParameter {
            by_ref: false,
            base,
        }
    }

    /// A by-reference parameter of type `base`.
    #[must_use]
    pub fn by_ref(base: TypeSignature) -> Self {
        SignatureParameter { by_ref: true, base }
    }
}

/// A `MethodDefSig` / `MethodRefSig`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureMethod {
    /// Instance method
    pub has_this: bool,
    /// Return type
    pub return_type: SignatureParameter,
    /// Parameters
    pub params: Vec<SignatureParameter>,
}

/// A `FieldSig`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureField {
    /// The field type
    pub base: TypeSignature,
}

/// A `PropertySig`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureProperty {
    /// Instance property
    pub has_this: bool,
    /// Property type
    pub base: TypeSignature,
    /// Index parameters
    pub params: Vec<SignatureParameter>,
}

impl TypeSignature {
    /// `true` for signatures the runtime treats as value types.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        !matches!(
            self,
            TypeSignature::String
                | TypeSignature::Object
                | TypeSignature::Class(_)
                | TypeSignature::SzArray(_)
                | TypeSignature::Void
        )
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Void => write!(f, "void"),
            TypeSignature::Boolean => write!(f, "bool"),
            TypeSignature::Char => write!(f, "char"),
            TypeSignature::I1 => write!(f, "sbyte"),
            TypeSignature::U1 => write!(f, "byte"),
            TypeSignature::I2 => write!(f, "short"),
            TypeSignature::U2 => write!(f, "ushort"),
            TypeSignature::I4 => write!(f, "int"),
            TypeSignature::U4 => write!(f, "uint"),
            TypeSignature::I8 => write!(f, "long"),
            TypeSignature::U8 => write!(f, "ulong"),
            TypeSignature::R4 => write!(f, "float"),
            TypeSignature::R8 => write!(f, "double"),
            TypeSignature::String => write!(f, "string"),
            TypeSignature::Object => write!(f, "object"),
            TypeSignature::I => write!(f, "IntPtr"),
            TypeSignature::U => write!(f, "UIntPtr"),
            TypeSignature::Ptr(base) => write!(f, "{base}*"),
            TypeSignature::ValueType(token) => write!(f, "valuetype {token}"),
            TypeSignature::Class(token) => write!(f, "class {token}"),
            TypeSignature::SzArray(base) => write!(f, "{base}[]"),
        }
    }
}

impl fmt::Display for SignatureParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.by_ref {
            write!(f, "ref {}", self.base)
        } else {
            write!(f, "{}", self.base)
        }
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

fn encode_type_def_or_ref(token: Token, buffer: &mut Vec<u8>) -> Result<()> {
    let index = CodedIndex::try_from(token)?.encode(CodedIndexType::TypeDefOrRef)?;
    write_compressed_uint(index, buffer);
    Ok(())
}

/// Append the encoding of `signature`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a `Class` / `ValueType` token is not a `TypeDef`,
/// `TypeRef` or `TypeSpec`.
pub fn encode_type_signature(signature: &TypeSignature, buffer: &mut Vec<u8>) -> Result<()> {
    match signature {
        TypeSignature::Void => buffer.push(ELEMENT_TYPE::VOID),
        TypeSignature::Boolean => buffer.push(ELEMENT_TYPE::BOOLEAN),
        TypeSignature::Char => buffer.push(ELEMENT_TYPE::CHAR),
        TypeSignature::I1 => buffer.push(ELEMENT_TYPE::I1),
        TypeSignature::U1 => buffer.push(ELEMENT_TYPE::U1),
        TypeSignature::I2 => buffer.push(ELEMENT_TYPE::I2),
        TypeSignature::U2 => buffer.push(ELEMENT_TYPE::U2),
        TypeSignature::I4 => buffer.push(ELEMENT_TYPE::I4),
        TypeSignature::U4 => buffer.push(ELEMENT_TYPE::U4),
        TypeSignature::I8 => buffer.push(ELEMENT_TYPE::I8),
        TypeSignature::U8 => buffer.push(ELEMENT_TYPE::U8),
        TypeSignature::R4 => buffer.push(ELEMENT_TYPE::R4),
        TypeSignature::R8 => buffer.push(ELEMENT_TYPE::R8),
        TypeSignature::String => buffer.push(ELEMENT_TYPE::STRING),
        TypeSignature::Object => buffer.push(ELEMENT_TYPE::OBJECT),
        TypeSignature::I => buffer.push(ELEMENT_TYPE::I),
        TypeSignature::U => buffer.push(ELEMENT_TYPE::U),
        TypeSignature::Ptr(base) => {
            buffer.push(ELEMENT_TYPE::PTR);
            encode_type_signature(base, buffer)?;
        }
        TypeSignature::ValueType(token) => {
            buffer.push(ELEMENT_TYPE::VALUETYPE);
            encode_type_def_or_ref(*token, buffer)?;
        }
        TypeSignature::Class(token) => {
            buffer.push(ELEMENT_TYPE::CLASS);
            encode_type_def_or_ref(*token, buffer)?;
        }
        TypeSignature::SzArray(base) => {
            buffer.push(ELEMENT_TYPE::SZARRAY);
            encode_type_signature(base, buffer)?;
        }
    }
    Ok(())
}

fn encode_parameter(parameter: &SignatureParameter, buffer: &mut Vec<u8>) -> Result<()> {
    if parameter.by_ref {
        buffer.push(ELEMENT_TYPE::BYREF);
    }

    encode_type_signature(&parameter.base, buffer)
}

/// Encode a method signature.
///
/// # Errors
/// Returns an error if a contained type cannot be encoded.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_method_signature(signature: &SignatureMethod) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();

    let mut calling_convention = CALLING_CONVENTION::DEFAULT;
    if signature.has_this {
        calling_convention |= CALLING_CONVENTION::HASTHIS;
    }
    buffer.push(calling_convention);

    write_compressed_uint(signature.params.len() as u32, &mut buffer);
    encode_parameter(&signature.return_type, &mut buffer)?;
    for param in &signature.params {
        encode_parameter(param, &mut buffer)?;
    }

    Ok(buffer)
}

/// Encode a field signature.
///
/// # Errors
/// Returns an error if the field type cannot be encoded.
pub fn encode_field_signature(signature: &SignatureField) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::FIELD];
    encode_type_signature(&signature.base, &mut buffer)?;
    Ok(buffer)
}

/// Encode a property signature.
///
/// # Errors
/// Returns an error if the property or an index parameter type cannot be encoded.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_property_signature(signature: &SignatureProperty) -> Result<Vec<u8>> {
    let mut prolog = SIGNATURE_HEADER::PROPERTY;
    if signature.has_this {
        prolog |= CALLING_CONVENTION::HASTHIS;
    }

    let mut buffer = vec![prolog];
    write_compressed_uint(signature.params.len() as u32, &mut buffer);
    encode_type_signature(&signature.base, &mut buffer)?;
    for param in &signature.params {
        encode_parameter(param, &mut buffer)?;
    }

    Ok(buffer)
}

/// Decoder for the signature subset the importer emits.
pub struct SignatureParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> SignatureParser<'a> {
    /// Create a parser over a signature blob.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SignatureParser {
            parser: Parser::new(data),
            depth: 0,
        }
    }

    fn read_type_def_or_ref(&mut self) -> Result<Token> {
        let value = self.parser.read_compressed_uint()?;
        Ok(CodedIndex::decode(value, CodedIndexType::TypeDefOrRef)?.token)
    }

    fn skip_custom_mods(&mut self) -> Result<()> {
        while self.parser.has_more_data() {
            let next_byte = self.parser.peek_byte()?;
            if next_byte != ELEMENT_TYPE::CMOD_OPT && next_byte != ELEMENT_TYPE::CMOD_REQD {
                break;
            }

            self.parser.advance_by(1)?;
            self.read_type_def_or_ref()?;
        }
        Ok(())
    }

    fn parse_type(&mut self) -> Result<TypeSignature> {
        self.depth += 1;
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(RecursionLimit(MAX_RECURSION_DEPTH));
        }

        let current_byte = self.parser.read_le::<u8>()?;
        let signature = match current_byte {
            ELEMENT_TYPE::VOID => TypeSignature::Void,
            ELEMENT_TYPE::BOOLEAN => TypeSignature::Boolean,
            ELEMENT_TYPE::CHAR => TypeSignature::Char,
            ELEMENT_TYPE::I1 => TypeSignature::I1,
            ELEMENT_TYPE::U1 => TypeSignature::U1,
            ELEMENT_TYPE::I2 => TypeSignature::I2,
            ELEMENT_TYPE::U2 => TypeSignature::U2,
            ELEMENT_TYPE::I4 => TypeSignature::I4,
            ELEMENT_TYPE::U4 => TypeSignature::U4,
            ELEMENT_TYPE::I8 => TypeSignature::I8,
            ELEMENT_TYPE::U8 => TypeSignature::U8,
            ELEMENT_TYPE::R4 => TypeSignature::R4,
            ELEMENT_TYPE::R8 => TypeSignature::R8,
            ELEMENT_TYPE::STRING => TypeSignature::String,
            ELEMENT_TYPE::OBJECT => TypeSignature::Object,
            ELEMENT_TYPE::I => TypeSignature::I,
            ELEMENT_TYPE::U => TypeSignature::U,
            ELEMENT_TYPE::PTR => {
                self.skip_custom_mods()?;
                TypeSignature::Ptr(Box::new(self.parse_type()?))
            }
            ELEMENT_TYPE::VALUETYPE => TypeSignature::ValueType(self.read_type_def_or_ref()?),
            ELEMENT_TYPE::CLASS => TypeSignature::Class(self.read_type_def_or_ref()?),
            ELEMENT_TYPE::SZARRAY => {
                self.skip_custom_mods()?;
                TypeSignature::SzArray(Box::new(self.parse_type()?))
            }
            _ => {
                return Err(malformed_error!(
                    "Unsupported ELEMENT_TYPE - {}",
                    current_byte
                ))
            }
        };

        self.depth -= 1;
        Ok(signature)
    }

    fn parse_param(&mut self) -> Result<SignatureParameter> {
        self.skip_custom_mods()?;
        let by_ref = self.parser.peek_byte()? == ELEMENT_TYPE::BYREF;
        if by_ref {
            self.parser.advance_by(1)?;
        }

        Ok(SignatureParameter {
            by_ref,
            base: self.parse_type()?,
        })
    }

    /// Parse a `MethodDefSig` / `MethodRefSig`.
    ///
    /// # Errors
    /// Returns an error for truncated blobs or unsupported element types.
    pub fn parse_method_signature(&mut self) -> Result<SignatureMethod> {
        let convention = self.parser.read_le::<u8>()?;
        let param_count = self.parser.read_compressed_uint()?;
        let return_type = self.parse_param()?;

        let mut params = Vec::with_capacity(param_count.min(256) as usize);
        for _ in 0..param_count {
            params.push(self.parse_param()?);
        }

        Ok(SignatureMethod {
            has_this: convention & CALLING_CONVENTION::HASTHIS != 0,
            return_type,
            params,
        })
    }

    /// Parse a `FieldSig`.
    ///
    /// # Errors
    /// Returns an error for a missing `FIELD` prolog or an unsupported type.
    pub fn parse_field_signature(&mut self) -> Result<SignatureField> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != SIGNATURE_HEADER::FIELD {
            return Err(malformed_error!(
                "SignatureField - invalid start - {}",
                head_byte
            ));
        }

        self.skip_custom_mods()?;
        Ok(SignatureField {
            base: self.parse_type()?,
        })
    }

    /// Parse a `PropertySig`.
    ///
    /// # Errors
    /// Returns an error for a missing `PROPERTY` prolog or an unsupported type.
    pub fn parse_property_signature(&mut self) -> Result<SignatureProperty> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte & SIGNATURE_HEADER::PROPERTY == 0 {
            return Err(malformed_error!(
                "SignatureProperty - invalid start - {}",
                head_byte
            ));
        }

        let param_count = self.parser.read_compressed_uint()?;
        self.skip_custom_mods()?;
        let base = self.parse_type()?;

        let mut params = Vec::with_capacity(param_count.min(256) as usize);
        for _ in 0..param_count {
            params.push(self.parse_param()?);
        }

        Ok(SignatureProperty {
            has_this: head_byte & CALLING_CONVENTION::HASTHIS != 0,
            base,
            params,
        })
    }
}

/// Parse a method signature blob.
///
/// # Errors
/// See [`SignatureParser::parse_method_signature`].
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    SignatureParser::new(data).parse_method_signature()
}

/// Parse a field signature blob.
///
/// # Errors
/// See [`SignatureParser::parse_field_signature`].
pub fn parse_field_signature(data: &[u8]) -> Result<SignatureField> {
    SignatureParser::new(data).parse_field_signature()
}

/// Parse a property signature blob.
///
/// # Errors
/// See [`SignatureParser::parse_property_signature`].
pub fn parse_property_signature(data: &[u8]) -> Result<SignatureProperty> {
    SignatureParser::new(data).parse_property_signature()
}
