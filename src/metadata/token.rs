//! Metadata tokens.
//!
//! A token is a 32-bit value whose top byte names a metadata table and whose low 24 bits are the
//! 1-based row within it. The emitter hands out tokens as soon as a row is reserved, which lets
//! signatures reference a type before its members exist.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::metadata::tables::TableId;

/// A metadata token (`table << 24 | row`).
///
/// # Examples
///
/// ```rust
/// use tlbscope::metadata::{tables::TableId, token::Token};
///
/// let token = Token::from_parts(TableId::TypeDef, 2);
/// assert_eq!(token.value(), 0x0200_0002);
/// assert_eq!(token.table_id(), Some(TableId::TypeDef));
/// assert_eq!(token.row(), 2);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Wrap a raw token value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Build a token from a table and a 1-based row.
    #[must_use]
    pub fn from_parts(table: TableId, row: u32) -> Self {
        Token(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    /// The raw value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table byte.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The table byte as a [`TableId`], `None` for values outside the known tables.
    #[must_use]
    pub fn table_id(&self) -> Option<TableId> {
        TableId::from_u8(self.table())
    }

    /// The 1-based row.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// `true` for the all-zero token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}
