//! Constant values stored in a type library.
//!
//! Enum members, module constants, parameter defaults and custom data all carry an OLE
//! `VARIANT`. Only the scalar and string forms can appear in a persisted library, so that is
//! all [`Variant`] models.

use std::fmt;

use crate::typelib::types::VarType;

/// A persisted `VARIANT` value.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Variant {
    Empty,
    Null,
    I1(i8),
    I2(i16),
    I4(i32),
    I8(i64),
    UI1(u8),
    UI2(u16),
    UI4(u32),
    UI8(u64),
    Int(i32),
    UInt(u32),
    R4(f32),
    R8(f64),
    /// `VARIANT_BOOL`, true is stored as `-1`
    Bool(bool),
    /// `CURRENCY`, scaled by 10 000
    Cy(i64),
    /// OLE automation date
    Date(f64),
    /// `SCODE`
    Error(i32),
    Bstr(Option<String>),
    /// `DECIMAL` as its 16 raw bytes
    Decimal([u8; 16]),
}

impl Variant {
    /// The `VARTYPE` tag of this value.
    #[must_use]
    pub fn vartype(&self) -> VarType {
        match self {
            Variant::Empty => VarType::Empty,
            Variant::Null => VarType::Null,
            Variant::I1(_) => VarType::I1,
            Variant::I2(_) => VarType::I2,
            Variant::I4(_) => VarType::I4,
            Variant::I8(_) => VarType::I8,
            Variant::UI1(_) => VarType::UI1,
            Variant::UI2(_) => VarType::UI2,
            Variant::UI4(_) => VarType::UI4,
            Variant::UI8(_) => VarType::UI8,
            Variant::Int(_) => VarType::Int,
            Variant::UInt(_) => VarType::UInt,
            Variant::R4(_) => VarType::R4,
            Variant::R8(_) => VarType::R8,
            Variant::Bool(_) => VarType::Bool,
            Variant::Cy(_) => VarType::Cy,
            Variant::Date(_) => VarType::Date,
            Variant::Error(_) => VarType::Error,
            Variant::Bstr(_) => VarType::Bstr,
            Variant::Decimal(_) => VarType::Decimal,
        }
    }

    /// The value as a signed 64-bit integer, for the integral forms.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Variant::I1(v) => Some(i64::from(v)),
            Variant::I2(v) => Some(i64::from(v)),
            Variant::I4(v) | Variant::Int(v) | Variant::Error(v) => Some(i64::from(v)),
            Variant::I8(v) => Some(v),
            Variant::UI1(v) => Some(i64::from(v)),
            Variant::UI2(v) => Some(i64::from(v)),
            Variant::UI4(v) | Variant::UInt(v) => Some(i64::from(v)),
            Variant::UI8(v) => i64::try_from(v).ok(),
            Variant::Bool(v) => Some(if v { -1 } else { 0 }),
            _ => None,
        }
    }

    /// Build a value of the integral `vartype` from the low bits of `raw`.
    ///
    /// This is how packed values inside MSFT records are widened.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_integral(vartype: VarType, raw: i64) -> Option<Variant> {
        Some(match vartype {
            VarType::Empty => Variant::Empty,
            VarType::Null => Variant::Null,
            VarType::I1 => Variant::I1(raw as i8),
            VarType::I2 => Variant::I2(raw as i16),
            VarType::I4 => Variant::I4(raw as i32),
            VarType::I8 => Variant::I8(raw),
            VarType::UI1 => Variant::UI1(raw as u8),
            VarType::UI2 => Variant::UI2(raw as u16),
            VarType::UI4 => Variant::UI4(raw as u32),
            VarType::UI8 => Variant::UI8(raw as u64),
            VarType::Int => Variant::Int(raw as i32),
            VarType::UInt => Variant::UInt(raw as u32),
            VarType::Bool => Variant::Bool(raw != 0),
            VarType::Error | VarType::HResult => Variant::Error(raw as i32),
            VarType::Cy => Variant::Cy(raw),
            _ => return None,
        })
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Empty => write!(f, "<empty>"),
            Variant::Null => write!(f, "<null>"),
            Variant::R4(v) => write!(f, "{v}"),
            Variant::R8(v) | Variant::Date(v) => write!(f, "{v}"),
            Variant::Bstr(Some(s)) => write!(f, "\"{s}\""),
            Variant::Bstr(None) => write!(f, "<null bstr>"),
            Variant::Decimal(_) => write!(f, "<decimal>"),
            other => match other.as_i64() {
                Some(v) => write!(f, "{v}"),
                None => write!(f, "{other:?}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_widening() {
        assert_eq!(
            Variant::from_integral(VarType::I2, 0x1_FFFF),
            Some(Variant::I2(-1))
        );
        assert_eq!(Variant::from_integral(VarType::Bool, 1), Some(Variant::Bool(true)));
        assert_eq!(Variant::from_integral(VarType::Bstr, 1), None);
        assert_eq!(Variant::Bool(true).as_i64(), Some(-1));
        assert_eq!(Variant::UI8(u64::MAX).as_i64(), None);
    }

    #[test]
    fn display() {
        assert_eq!(Variant::I4(-7).to_string(), "-7");
        assert_eq!(Variant::Bstr(Some("x".into())).to_string(), "\"x\"");
    }
}
