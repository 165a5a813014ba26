//! The metadata root (`BSJB` header) and its stream directory.
//!
//! # Reference
//! - [ECMA-335 II.24.2.1: Metadata root](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::io::{pad_to, read_le, read_le_at, write_le},
    Result,
};

/// The MAGIC value indicating the CIL header
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// Runtime version string written into every image.
pub const RUNTIME_VERSION: &str = "v4.0.30319";

const STREAM_NAMES: [&str; 5] = ["#~", "#Strings", "#US", "#GUID", "#Blob"];

/// One entry of the stream directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset from the start of the metadata root
    pub offset: u32,
    /// Size of this stream in bytes, a multiple of 4
    pub size: u32,
    /// Name of the stream
    pub name: String,
}

impl StreamHeader {
    /// Read a stream header; returns it and its encoded length.
    ///
    /// # Errors
    /// Returns an error for a truncated header or an unknown stream name.
    pub fn from(data: &[u8]) -> Result<(StreamHeader, usize)> {
        if data.len() < 9 {
            return Err(out_of_bounds_error!());
        }

        let name_bytes = &data[8..data.len().min(8 + 32)];
        let Some(name_len) = name_bytes.iter().position(|byte| *byte == 0) else {
            return Err(malformed_error!("Unterminated stream name"));
        };
        let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();

        if !STREAM_NAMES.contains(&name.as_str()) {
            return Err(malformed_error!("Invalid stream header name - {}", name));
        }

        let header = StreamHeader {
            offset: read_le::<u32>(data)?,
            size: read_le::<u32>(&data[4..])?,
            name,
        };
        Ok((header, 8 + ((name_len + 1 + 3) & !3)))
    }
}

/// The metadata root.
#[derive(Debug, Clone)]
pub struct Root {
    /// `MajorVersion`, 1
    pub major_version: u16,
    /// `MinorVersion`, 1
    pub minor_version: u16,
    /// Runtime version string
    pub version: String,
    /// Streams in directory order
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Read the root from the start of the metadata blob.
    ///
    /// # Errors
    /// Returns an error if the signature is wrong or any stream lies outside `data`.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 20 {
            return Err(out_of_bounds_error!());
        }

        let signature = read_le::<u32>(data)?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - {:#x}",
                signature
            ));
        }

        let version_len = read_le_at::<u32>(data, &mut 12)? as usize;
        let Some(version_bytes) = data.get(16..16 + version_len) else {
            return Err(out_of_bounds_error!());
        };
        let version = String::from_utf8_lossy(version_bytes)
            .trim_end_matches('\0')
            .to_string();

        let mut offset = 16 + version_len + 2;
        let stream_count = read_le_at::<u16>(data, &mut offset)?;
        if stream_count == 0 || stream_count > 5 {
            return Err(malformed_error!("Invalid stream count - {}", stream_count));
        }

        let mut stream_headers = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            let Some(rest) = data.get(offset..) else {
                return Err(out_of_bounds_error!());
            };

            let (header, consumed) = StreamHeader::from(rest)?;
            match header.offset.checked_add(header.size) {
                Some(end) if end as usize <= data.len() => {}
                _ => return Err(out_of_bounds_error!()),
            }

            offset += consumed;
            stream_headers.push(header);
        }

        Ok(Root {
            major_version: read_le::<u16>(&data[4..])?,
            minor_version: read_le::<u16>(&data[6..])?,
            version,
            stream_headers,
        })
    }

    /// The bytes of stream `name` inside `data`, the same blob [`Root::read`] parsed.
    #[must_use]
    pub fn stream<'a>(&self, data: &'a [u8], name: &str) -> Option<&'a [u8]> {
        let header = self.stream_headers.iter().find(|header| header.name == name)?;
        data.get(header.offset as usize..(header.offset + header.size) as usize)
    }

    /// Serialize a root followed by `streams`, each already padded to 4 bytes.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn write(streams: &[(&str, &[u8])]) -> Vec<u8> {
        let mut version = RUNTIME_VERSION.as_bytes().to_vec();
        version.push(0);
        pad_to(&mut version, 4);

        let mut directory_len = 0;
        for (name, _) in streams {
            directory_len += 8 + ((name.len() + 1 + 3) & !3);
        }

        let header_len = 16 + version.len() + 4 + directory_len;
        let mut buffer = Vec::with_capacity(header_len);
        write_le(&mut buffer, CIL_HEADER_MAGIC);
        write_le(&mut buffer, 1_u16);
        write_le(&mut buffer, 1_u16);
        write_le(&mut buffer, 0_u32);
        write_le(&mut buffer, version.len() as u32);
        buffer.extend_from_slice(&version);
        write_le(&mut buffer, 0_u16);
        write_le(&mut buffer, streams.len() as u16);

        let mut offset = header_len;
        for (name, data) in streams {
            write_le(&mut buffer, offset as u32);
            write_le(&mut buffer, data.len() as u32);
            buffer.extend_from_slice(name.as_bytes());
            buffer.push(0);
            pad_to(&mut buffer, 4);
            offset += data.len();
        }

        for (_, data) in streams {
            buffer.extend_from_slice(data);
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let tables: &[u8] = &[1, 2, 3, 4];
        let strings: &[u8] = &[0, b'A', 0, 0];
        let blob = Root::write(&[("#~", tables), ("#Strings", strings)]);

        let root = Root::read(&blob).unwrap();
        assert_eq!(root.version, RUNTIME_VERSION);
        assert_eq!(root.major_version, 1);
        assert_eq!(root.stream_headers.len(), 2);
        assert_eq!(root.stream(&blob, "#~").unwrap(), tables);
        assert_eq!(root.stream(&blob, "#Strings").unwrap(), strings);
        assert!(root.stream(&blob, "#Blob").is_none());
    }

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x42, 0x53, 0x4A, 0x42,
            0x01, 0x00,
            0x01, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x00,
            b'v', b'4', 0x00, 0x00,
            0x00, 0x00,
            0x01, 0x00,
            0x24, 0x00, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x00,
            0x23, 0x7E, 0x00, 0x00,
            0xAA, 0xBB, 0xCC, 0xDD,
        ];

        let root = Root::read(&header_bytes).unwrap();
        assert_eq!(root.version, "v4");
        assert_eq!(root.stream_headers[0].name, "#~");
        assert_eq!(root.stream(&header_bytes, "#~").unwrap(), &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn rejects_bad_magic_and_streams() {
        let empty: &[u8] = &[0, 0, 0, 0];
        let mut blob = Root::write(&[("#~", empty)]);
        blob[0] = 0;
        assert!(Root::read(&blob).is_err());

        let mut blob = Root::write(&[("#~", empty)]);
        let name_at = blob.len() - 4 - 4;
        blob[name_at] = b'X';
        assert!(Root::read(&blob).is_err());
    }
}
