//! The CLI header (`IMAGE_COR20_HEADER`), located by data directory 14 of the PE optional header.
//!
//! Imported assemblies carry no code, so only the metadata directory, the `ILONLY` flag and the
//! optional strong-name signature slot are ever populated.
//!
//! # Reference
//! - [ECMA-335 II.25.3.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::{io::write_le, parser::Parser},
    Result,
};

/// Size of the header in bytes.
pub const COR20_HEADER_SIZE: u32 = 72;

/// `COMIMAGE_FLAGS_ILONLY`
pub const COMIMAGE_FLAGS_ILONLY: u32 = 0x0000_0001;
/// `COMIMAGE_FLAGS_STRONGNAMESIGNED`
pub const COMIMAGE_FLAGS_STRONGNAMESIGNED: u32 = 0x0000_0008;

/// The CLI header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cor20Header {
    /// Size of header in bytes
    pub cb: u32,
    /// The minimum version of runtime required to run this program
    pub major_runtime_version: u16,
    /// The minor portion of the version
    pub minor_runtime_version: u16,
    /// RVA of the `MetaData`
    pub meta_data_rva: u32,
    /// Size of the `MetaData`
    pub meta_data_size: u32,
    /// Flags describing this runtime
    pub flags: u32,
    /// Token for the `MethodDef` or File of the entry point for the image
    pub entry_point_token: u32,
    /// RVA of the strong-name signature slot
    pub strong_name_signature_rva: u32,
    /// Size of the strong-name signature slot
    pub strong_name_signature_size: u32,
}

impl Cor20Header {
    /// Header for a metadata-only image with the metadata at `meta_data_rva`.
    #[must_use]
    pub fn metadata_only(meta_data_rva: u32, meta_data_size: u32) -> Self {
        Cor20Header {
            cb: COR20_HEADER_SIZE,
            major_runtime_version: 2,
            minor_runtime_version: 5,
            meta_data_rva,
            meta_data_size,
            flags: COMIMAGE_FLAGS_ILONLY,
            ..Cor20Header::default()
        }
    }

    /// Read the header from the start of `data`.
    ///
    /// # Errors
    /// Returns an error if the data is too short or the size, version or metadata directory is
    /// implausible.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        const VALID_FLAGS: u32 = 0x0001_001F;

        if data.len() < COR20_HEADER_SIZE as usize {
            return Err(out_of_bounds_error!());
        }

        let mut parser = Parser::new(data);

        let cb = parser.read_le::<u32>()?;
        if cb != COR20_HEADER_SIZE {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;
        if major_runtime_version == 0 || major_runtime_version > 10 {
            return Err(malformed_error!(
                "Invalid major runtime version: {}",
                major_runtime_version
            ));
        }

        let meta_data_rva = parser.read_le::<u32>()?;
        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_rva == 0 || meta_data_size == 0 {
            return Err(malformed_error!("Metadata directory cannot be empty"));
        }

        let flags = parser.read_le::<u32>()?;
        if flags & !VALID_FLAGS != 0 {
            return Err(malformed_error!(
                "Invalid CLR flags: 0x{:08X} contains undefined bits",
                flags
            ));
        }

        let entry_point_token = parser.read_le::<u32>()?;
        // resources
        parser.advance_by(8)?;
        let strong_name_signature_rva = parser.read_le::<u32>()?;
        let strong_name_signature_size = parser.read_le::<u32>()?;

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token,
            strong_name_signature_rva,
            strong_name_signature_size,
        })
    }

    /// Append the 72 byte encoding; the remaining directories are written as zero.
    pub fn write(&self, buffer: &mut Vec<u8>) {
        write_le(buffer, self.cb);
        write_le(buffer, self.major_runtime_version);
        write_le(buffer, self.minor_runtime_version);
        write_le(buffer, self.meta_data_rva);
        write_le(buffer, self.meta_data_size);
        write_le(buffer, self.flags);
        write_le(buffer, self.entry_point_token);
        write_le(buffer, 0_u64);
        write_le(buffer, self.strong_name_signature_rva);
        write_le(buffer, self.strong_name_signature_size);
        // code manager table, vtable fixups, export address table jumps, managed native header
        buffer.resize(buffer.len() + 32, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let mut header = Cor20Header::metadata_only(0x2048, 0x400);
        header.flags |= COMIMAGE_FLAGS_STRONGNAMESIGNED;
        header.strong_name_signature_rva = 0x2048;
        header.strong_name_signature_size = 128;

        let mut buffer = Vec::new();
        header.write(&mut buffer);
        assert_eq!(buffer.len(), 72);
        assert_eq!(&buffer[..8], &[0x48, 0, 0, 0, 2, 0, 5, 0]);

        assert_eq!(Cor20Header::read(&buffer).unwrap(), header);
    }

    #[test]
    fn rejects_invalid() {
        let mut buffer = Vec::new();
        Cor20Header::metadata_only(0x2048, 0x400).write(&mut buffer);

        assert!(Cor20Header::read(&buffer[..40]).is_err());

        let mut bad_size = buffer.clone();
        bad_size[0] = 0x40;
        assert!(Cor20Header::read(&bad_size).is_err());

        let mut no_metadata = buffer.clone();
        no_metadata[8..12].copy_from_slice(&[0, 0, 0, 0]);
        assert!(Cor20Header::read(&no_metadata).is_err());

        let mut bad_flags = buffer;
        bad_flags[16] = 0x80;
        assert!(Cor20Header::read(&bad_flags).is_err());
    }
}
