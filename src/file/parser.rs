//! A bounds-checked cursor over a byte slice.
//!
//! [`Parser`] is used wherever a structure is decoded sequentially: MSFT records inside a type
//! library, blob heap entries and custom-attribute values inside a referenced assembly. Every
//! read checks bounds and reports [`crate::Error::OutOfBounds`] rather than panicking.

use crate::{
    file::io::{read_le_at, TlbIO},
    Result,
};

/// A positioned reader over borrowed bytes.
///
/// # Examples
///
/// ```rust
/// use tlbscope::Parser;
///
/// let data = [0x05, 0x00, 0x81, 0x02];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_le::<u16>()?, 5);
/// assert_eq!(parser.read_compressed_uint()?, 0x102);
/// assert!(!parser.has_more_data());
/// # Ok::<(), tlbscope::Error>(())
/// ```
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `true` while unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move to an absolute position. Seeking to exactly the end is allowed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is past the end.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Skip `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if this would pass the end.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(end) if end <= self.data.len() => {
                self.position = end;
                Ok(())
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Current position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Look at the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        match self.data.get(self.position) {
            Some(byte) => Ok(*byte),
            None => Err(out_of_bounds_error!()),
        }
    }

    /// Skip forward to the next multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding passes the end.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Read a little-endian `T` and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_le<T: TlbIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `len` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let start = self.position;
        self.advance_by(len)?;
        Ok(&self.data[start..self.position])
    }

    /// Read an ECMA-335 II.23.2 compressed unsigned integer.
    ///
    /// # Errors
    /// Returns an error for truncated data or an invalid lead byte.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        // 1-byte encoding: 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        // 2-byte encoding: 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
        }

        // 4-byte encoding: 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            return Ok(((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3);
        }

        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }

    /// Read a custom-attribute `SerString`: a compressed length followed by UTF-8 bytes,
    /// or the single byte `0xFF` for a null string.
    ///
    /// # Errors
    /// Returns an error for truncated data or invalid UTF-8.
    pub fn read_ser_string(&mut self) -> Result<Option<String>> {
        if self.data.get(self.position) == Some(&0xFF) {
            self.position += 1;
            return Ok(None);
        }

        let len = self.read_compressed_uint()? as usize;
        let bytes = self.read_bytes(len)?;
        match std::str::from_utf8(bytes) {
            Ok(value) => Ok(Some(value.to_string())),
            Err(_) => Err(malformed_error!("SerString is not valid UTF-8")),
        }
    }
}
