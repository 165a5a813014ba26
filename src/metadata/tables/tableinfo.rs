use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::{read_le_at, write_le_dyn},
    metadata::tables::{CodedIndexType, Column, TableId, TABLE_COUNT},
    Result,
};

/// Row count of one table plus the index width it implies.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct TableRowInfo {
    /// Number of rows
    pub rows: u32,
    /// Bits needed to address every row
    pub bits: u8,
    /// `true` if indices into this table need 4 bytes
    pub is_large: bool,
}

impl TableRowInfo {
    /// Describe a table with `rows` rows.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(rows: u32) -> Self {
        let bits = if rows == 0 {
            1
        } else {
            (32 - rows.leading_zeros()) as u8
        };

        Self {
            rows,
            bits,
            is_large: rows > u32::from(u16::MAX),
        }
    }
}

/// Row counts and heap index widths of one metadata image; decides every column's width.
#[derive(Clone, Debug, Default)]
pub struct TableInfo {
    rows: Vec<TableRowInfo>,
    coded_indexes: Vec<u8>,
    is_large_index_str: bool,
    is_large_index_guid: bool,
    is_large_index_blob: bool,
}

impl TableInfo {
    /// Build the layout for a writer from final row counts and heap sizes.
    #[must_use]
    pub fn from_counts(
        counts: &[u32; TABLE_COUNT],
        strings_len: usize,
        guids_len: usize,
        blobs_len: usize,
    ) -> Self {
        let mut table_info = TableInfo {
            rows: counts.iter().map(|rows| TableRowInfo::new(*rows)).collect(),
            coded_indexes: vec![0; CodedIndexType::COUNT],
            is_large_index_str: strings_len > usize::from(u16::MAX),
            is_large_index_guid: guids_len > usize::from(u16::MAX),
            is_large_index_blob: blobs_len > usize::from(u16::MAX),
        };
        table_info.calculate_coded_index_bits();
        table_info
    }

    /// Parse the `#~` stream header. Returns the layout and the offset of the first row.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for a truncated header and
    /// [`crate::Error::NotSupported`] for tables this crate has no schema for.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 6;
        let heap_size_flags = read_le_at::<u8>(data, &mut offset)?;
        offset = 8;
        let valid = read_le_at::<u64>(data, &mut offset)?;
        let _sorted = read_le_at::<u64>(data, &mut offset)?;

        if valid >> TABLE_COUNT != 0 {
            return Err(crate::Error::NotSupported(format!(
                "metadata tables beyond 0x{:02x} (valid mask 0x{valid:016x})",
                TABLE_COUNT - 1
            )));
        }

        let mut table_info = TableInfo {
            rows: vec![TableRowInfo::default(); TABLE_COUNT],
            coded_indexes: vec![0; CodedIndexType::COUNT],
            is_large_index_str: heap_size_flags & 1 == 1,
            is_large_index_guid: heap_size_flags & 2 == 2,
            is_large_index_blob: heap_size_flags & 4 == 4,
        };

        for table_id in TableId::iter() {
            if valid & (1 << table_id as usize) == 0 {
                continue;
            }

            let row_count = read_le_at::<u32>(data, &mut offset)?;
            table_info.rows[table_id as usize] = TableRowInfo::new(row_count);
        }

        table_info.calculate_coded_index_bits();
        Ok((table_info, offset))
    }

    /// Number of rows in `table`.
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize].rows
    }

    /// The `valid` bit vector for these row counts.
    #[must_use]
    pub fn valid_mask(&self) -> u64 {
        TableId::iter()
            .filter(|table| self.rows(*table) > 0)
            .fold(0, |mask, table| mask | (1_u64 << (table as u8)))
    }

    /// The `HeapSizes` byte of the `#~` header.
    #[must_use]
    pub fn heap_sizes(&self) -> u8 {
        u8::from(self.is_large_index_str)
            | (u8::from(self.is_large_index_guid) << 1)
            | (u8::from(self.is_large_index_blob) << 2)
    }

    /// `true` if indices into `id` need 4 bytes.
    #[must_use]
    pub fn is_large(&self, id: TableId) -> bool {
        self.rows[id as usize].is_large
    }

    /// `true` if `#Strings` indices need 4 bytes.
    #[must_use]
    pub fn is_large_str(&self) -> bool {
        self.is_large_index_str
    }

    /// `true` if `#GUID` indices need 4 bytes.
    #[must_use]
    pub fn is_large_guid(&self) -> bool {
        self.is_large_index_guid
    }

    /// `true` if `#Blob` indices need 4 bytes.
    #[must_use]
    pub fn is_large_blob(&self) -> bool {
        self.is_large_index_blob
    }

    /// `true` if `ci_type` values need 4 bytes.
    #[must_use]
    pub fn is_large_coded(&self, ci_type: CodedIndexType) -> bool {
        self.coded_indexes[ci_type as usize] > 16
    }

    /// Width in bytes of `column`.
    #[must_use]
    pub fn column_size(&self, column: Column) -> usize {
        let large = match column {
            Column::U16 => false,
            Column::U32 => true,
            Column::Str => self.is_large_index_str,
            Column::Guid => self.is_large_index_guid,
            Column::Blob => self.is_large_index_blob,
            Column::Index(table) => self.is_large(table),
            Column::Coded(ci_type) => self.is_large_coded(ci_type),
        };

        if large {
            4
        } else {
            2
        }
    }

    /// Width in bytes of one row of `table`.
    #[must_use]
    pub fn row_size(&self, table: TableId) -> usize {
        table
            .columns()
            .iter()
            .map(|column| self.column_size(*column))
            .sum()
    }

    /// Append `value` with the width of `column`.
    pub fn write_column(&self, buffer: &mut Vec<u8>, column: Column, value: u32) {
        write_le_dyn(buffer, value, self.column_size(column) == 4);
    }

    fn calculate_coded_index_bits(&mut self) {
        for ci_type in CodedIndexType::iter() {
            let max_bits = ci_type
                .tables()
                .iter()
                .map(|table| self.rows[*table as usize].bits)
                .max()
                .unwrap_or(1);
            self.coded_indexes[ci_type as usize] = max_bits + ci_type.tag_bits();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(entries: &[(TableId, u32)]) -> [u32; TABLE_COUNT] {
        let mut counts = [0; TABLE_COUNT];
        for (table, rows) in entries {
            counts[*table as usize] = *rows;
        }
        counts
    }

    #[test]
    fn small_layout() {
        let info = TableInfo::from_counts(
            &counts(&[(TableId::TypeDef, 3), (TableId::Field, 2)]),
            100,
            16,
            10,
        );
        assert_eq!(info.row_size(TableId::TypeDef), 4 + 2 + 2 + 2 + 2 + 2);
        assert_eq!(info.row_size(TableId::Constant), 6);
        assert_eq!(info.heap_sizes(), 0);
        assert_eq!(info.valid_mask(), (1 << 0x02) | (1 << 0x04));
    }

    #[test]
    fn coded_index_widening() {
        // 2 tag bits leave 14 bits for the row
        let info = TableInfo::from_counts(&counts(&[(TableId::TypeRef, 0x4000)]), 0, 0, 0);
        assert!(info.is_large_coded(CodedIndexType::TypeDefOrRef));
        assert!(!info.is_large(TableId::TypeRef));

        let info = TableInfo::from_counts(&counts(&[(TableId::TypeRef, 0x3FFF)]), 0, 0, 0);
        assert!(!info.is_large_coded(CodedIndexType::TypeDefOrRef));
    }

    #[test]
    fn large_heaps() {
        let info = TableInfo::from_counts(&counts(&[]), 0x1_0000, 0, 0x2_0000);
        assert_eq!(info.heap_sizes(), 0b101);
        assert_eq!(info.column_size(Column::Str), 4);
        assert_eq!(info.column_size(Column::Guid), 2);
    }

    #[test]
    fn parse_header() {
        let mut data = vec![0, 0, 0, 0, 2, 0, 0b001, 1];
        data.extend_from_slice(&((1_u64 << 0x00) | (1_u64 << 0x02)).to_le_bytes());
        data.extend_from_slice(&0_u64.to_le_bytes());
        data.extend_from_slice(&1_u32.to_le_bytes());
        data.extend_from_slice(&5_u32.to_le_bytes());

        let (info, offset) = TableInfo::parse(&data).unwrap();
        assert_eq!(offset, 32);
        assert_eq!(info.rows(TableId::Module), 1);
        assert_eq!(info.rows(TableId::TypeDef), 5);
        assert!(info.is_large_str());
    }
}
