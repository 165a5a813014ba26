//! Memory-mapped access to input files.
//!
//! Type libraries and reference assemblies are decoded straight out of a read-only mapping;
//! the mapping lives exactly as long as the [`Physical`] that owns it.

use std::{fs, path::Path};

use memmap2::Mmap;

use crate::{Error::FileError, Result};

/// A read-only memory mapping of a file on disk.
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Map the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        // The mapping is read-only and the crate never hands out mutable views of it.
        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(FileError(error)),
        };

        Ok(Physical { data: mmap })
    }

    /// The mapped bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Length of the mapping.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if the mapped file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
