//! Metadata heaps: `#Strings`, `#Blob`, `#GUID` and `#US`.
//!
//! The `*HeapBuilder` types accumulate heap content while an assembly is emitted. Each one
//! deduplicates its entries so identical names, signatures and attribute blobs share a single
//! index. [`Strings`], [`Blob`] and [`Guids`] are read-only views used by
//! [`crate::metadata::reader`].

use std::collections::HashMap;

use crate::{
    file::{
        io::{pad_to, write_compressed_uint},
        Parser,
    },
    Result,
};

/// Builder for the `#Strings` heap.
///
/// Index 0 is the empty string; every other entry is NUL terminated.
#[derive(Debug, Clone)]
pub struct StringHeapBuilder {
    data: Vec<u8>,
    index: HashMap<String, u32>,
}

impl Default for StringHeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StringHeapBuilder {
    /// An empty heap holding only the leading NUL.
    #[must_use]
    pub fn new() -> Self {
        StringHeapBuilder {
            data: vec![0],
            index: HashMap::new(),
        }
    }

    /// Intern `value`, returning its heap index.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }
        if let Some(index) = self.index.get(value) {
            return *index;
        }

        let index = self.data.len() as u32;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.index.insert(value.to_string(), index);
        index
    }

    /// Unpadded size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if only the leading NUL is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 1
    }

    /// The heap bytes padded to 4.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        pad_to(&mut data, 4);
        data
    }
}

/// Builder for the `#Blob` heap.
#[derive(Debug, Clone)]
pub struct BlobHeapBuilder {
    data: Vec<u8>,
    index: HashMap<Vec<u8>, u32>,
}

impl Default for BlobHeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobHeapBuilder {
    /// An empty heap holding only the leading empty blob.
    #[must_use]
    pub fn new() -> Self {
        BlobHeapBuilder {
            data: vec![0],
            index: HashMap::new(),
        }
    }

    /// Intern `value`, returning its heap index.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, value: &[u8]) -> u32 {
        if value.is_empty() {
            return 0;
        }
        if let Some(index) = self.index.get(value) {
            return *index;
        }

        let index = self.data.len() as u32;
        write_compressed_uint(value.len() as u32, &mut self.data);
        self.data.extend_from_slice(value);
        self.index.insert(value.to_vec(), index);
        index
    }

    /// Unpadded size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if only the leading empty blob is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 1
    }

    /// The heap bytes padded to 4.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        pad_to(&mut data, 4);
        data
    }
}

/// Builder for the `#GUID` heap. Indices are 1-based.
#[derive(Debug, Clone, Default)]
pub struct GuidHeapBuilder {
    guids: Vec<uguid::Guid>,
}

impl GuidHeapBuilder {
    /// An empty heap.
    #[must_use]
    pub fn new() -> Self {
        GuidHeapBuilder::default()
    }

    /// Intern `guid`, returning its 1-based index.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, guid: uguid::Guid) -> u32 {
        if let Some(pos) = self.guids.iter().position(|existing| *existing == guid) {
            return pos as u32 + 1;
        }

        self.guids.push(guid);
        self.guids.len() as u32
    }

    /// Overwrite the entry at 1-based `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for an index that was never handed out.
    pub fn set(&mut self, index: u32, guid: uguid::Guid) -> Result<()> {
        match self.guids.get_mut((index as usize).wrapping_sub(1)) {
            Some(slot) => {
                *slot = guid;
                Ok(())
            }
            None => Err(out_of_bounds_error!()),
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guids.len() * 16
    }

    /// `true` if no GUID was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guids.is_empty()
    }

    /// The heap bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.guids.iter().flat_map(|guid| guid.to_bytes()).collect()
    }
}

/// The `#US` heap. Imported assemblies carry no IL, so it only ever holds the leading entry.
#[must_use]
pub fn empty_user_strings() -> Vec<u8> {
    vec![0, 0, 0, 0]
}

/// A view over a `#Strings` heap.
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Wrap the heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with a NUL.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.first() != Some(&0) {
            return Err(malformed_error!("Invalid memory for #Strings heap"));
        }

        Ok(Strings { data })
    }

    /// The string starting at `index`.
    ///
    /// # Errors
    /// Returns an error for an index past the heap or a string that is not UTF-8.
    pub fn get(&self, index: usize) -> Result<&'a str> {
        let Some(tail) = self.data.get(index..) else {
            return Err(out_of_bounds_error!());
        };

        let Some(end) = tail.iter().position(|byte| *byte == 0) else {
            return Err(malformed_error!("Unterminated string at #Strings index {}", index));
        };

        match std::str::from_utf8(&tail[..end]) {
            Ok(value) => Ok(value),
            Err(_) => Err(malformed_error!("Invalid UTF-8 at #Strings index {}", index)),
        }
    }
}

/// A view over a `#Blob` heap.
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Wrap the heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty blob.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.first() != Some(&0) {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob { data })
    }

    /// The blob starting at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the blob extends past the heap.
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        let Some(tail) = self.data.get(index..) else {
            return Err(out_of_bounds_error!());
        };

        let mut parser = Parser::new(tail);
        let len = parser.read_compressed_uint()? as usize;
        parser.read_bytes(len)
    }
}

/// A view over a `#GUID` heap.
pub struct Guids<'a> {
    data: &'a [u8],
}

impl<'a> Guids<'a> {
    /// Wrap the heap bytes.
    #[must_use]
    pub fn from(data: &'a [u8]) -> Guids<'a> {
        Guids { data }
    }

    /// The GUID at 1-based `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for index 0 or an index past the heap.
    pub fn get(&self, index: usize) -> Result<uguid::Guid> {
        if index == 0 {
            return Err(out_of_bounds_error!());
        }

        let start = (index - 1) * 16;
        let Some(bytes) = self.data.get(start..start + 16) else {
            return Err(out_of_bounds_error!());
        };

        let mut buffer = [0_u8; 16];
        buffer.copy_from_slice(bytes);
        Ok(uguid::Guid::from_bytes(buffer))
    }
}

#[cfg(test)]
mod tests {
    use uguid::guid;

    use super::*;

    #[test]
    fn strings_dedup() {
        let mut heap = StringHeapBuilder::new();
        assert_eq!(heap.add(""), 0);
        let first = heap.add("IFoo");
        assert_eq!(first, 1);
        assert_eq!(heap.add("Bar"), 6);
        assert_eq!(heap.add("IFoo"), first);

        let bytes = heap.to_bytes();
        assert_eq!(bytes.len() % 4, 0);
        let view = Strings::from(&bytes).unwrap();
        assert_eq!(view.get(1).unwrap(), "IFoo");
        assert_eq!(view.get(6).unwrap(), "Bar");
        assert_eq!(view.get(0).unwrap(), "");
        assert!(view.get(100).is_err());
    }

    #[test]
    fn blobs_dedup() {
        let mut heap = BlobHeapBuilder::new();
        let sig = heap.add(&[0x20, 0x00, 0x01]);
        assert_eq!(sig, 1);
        assert_eq!(heap.add(&[0x20, 0x00, 0x01]), sig);
        let long = vec![0xAB; 200];
        let second = heap.add(&long);
        assert_eq!(second, 5);

        let bytes = heap.to_bytes();
        let view = Blob::from(&bytes).unwrap();
        assert_eq!(view.get(1).unwrap(), &[0x20, 0x00, 0x01]);
        assert_eq!(view.get(5).unwrap(), long.as_slice());
        assert_eq!(view.get(0).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn guids_are_one_based() {
        let mut heap = GuidHeapBuilder::new();
        let a = guid!("d437908e-65e6-487c-9735-7bdff699bea5");
        let b = guid!("00020400-0000-0000-c000-000000000046");
        assert_eq!(heap.add(a), 1);
        assert_eq!(heap.add(b), 2);
        assert_eq!(heap.add(a), 1);
        heap.set(1, b).unwrap();
        assert!(heap.set(3, a).is_err());

        let bytes = heap.to_bytes();
        let view = Guids::from(&bytes);
        assert_eq!(view.get(1).unwrap(), b);
        assert!(view.get(0).is_err());
        assert!(view.get(3).is_err());
    }
}
