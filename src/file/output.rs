//! Memory-mapped output files.
//!
//! [`Output`] creates the target file at its final size, exposes it as a writable mapping and
//! removes it again unless [`Output::finalize`] is reached, so an interrupted save never leaves
//! a truncated image behind.

use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::Result;

/// A memory-mapped output file that is deleted on drop unless finalized.
pub struct Output {
    mmap: MmapMut,
    target_path: PathBuf,
    finalized: bool,
}

impl Output {
    /// Create (or truncate) `target_path` with `size` bytes and map it.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be created, sized or mapped.
    pub fn create<P: AsRef<Path>>(target_path: P, size: u64) -> Result<Self> {
        let target_path = target_path.as_ref().to_path_buf();

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&target_path)?;
        file.set_len(size)?;

        // The mapping is owned by this value and never aliased.
        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };

        Ok(Self {
            mmap,
            target_path,
            finalized: false,
        })
    }

    /// Copy `data` to `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the write would pass the end of the file.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let Some(end) = offset.checked_add(data.len()) else {
            return Err(out_of_bounds_error!());
        };
        if end > self.mmap.len() {
            return Err(out_of_bounds_error!());
        }

        self.mmap[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Size of the file.
    #[must_use]
    pub fn size(&self) -> usize {
        self.mmap.len()
    }

    /// The file this output writes to.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Flush the mapping and keep the file.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the flush fails; the file is removed in that case.
    pub fn finalize(mut self) -> Result<()> {
        self.mmap.flush()?;
        self.finalized = true;
        Ok(())
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = self.mmap.flush();
            let _ = std::fs::remove_file(&self.target_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tlbscope_output_{}_{tag}.bin", std::process::id()))
    }

    #[test]
    fn finalized_file_is_kept() {
        let path = temp_path("kept");
        let mut output = Output::create(&path, 8).unwrap();
        assert_eq!(output.size(), 8);
        output.write_at(0, b"MZ").unwrap();
        output.write_at(6, &[0xAA, 0xBB]).unwrap();
        assert!(output.write_at(7, &[1, 2]).is_err());
        output.finalize().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data, [b'M', b'Z', 0, 0, 0, 0, 0xAA, 0xBB]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unfinalized_file_is_removed() {
        let path = temp_path("dropped");
        {
            let mut output = Output::create(&path, 4).unwrap();
            output.write_at(0, &[1, 2, 3, 4]).unwrap();
            assert_eq!(output.target_path(), path.as_path());
        }
        assert!(!path.exists());
    }
}
