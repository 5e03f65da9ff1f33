use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::io::{self, Read, Write};

use crate::errors::{XbaseError, XbaseResult};
use crate::models::date_utils::{header_date_to_naive_date, naive_date_to_header_date};
use crate::models::dbf::fields::{FieldDescriptor, FieldInfo};

/// DBF file header (32 bytes, little-endian)
///
/// ```text
/// 0      version
/// 1..4   last update: year - 1900, month, day
/// 4..8   record count (u32)
/// 8..10  header length = offset of the first record (u16)
/// 10..12 record length incl. deletion flag (u16)
/// 12..32 reserved
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    pub version: u8,
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub record_count: u32,
    pub header_length: u16,
    pub record_length: u16,
    #[serde(skip)]
    pub reserved: [u8; 20],
}

impl FileHeader {
    pub const SIZE: usize = 32;
    /// Plain dBase III without memo
    pub const VERSION_DBASE_III: u8 = 0x03;

    /// Header for a freshly written file holding `fields` and `record_count` records
    pub fn for_fields(
        fields: &[FieldInfo],
        record_count: u32,
        date: NaiveDate,
    ) -> XbaseResult<Self> {
        let header_length =
            Self::SIZE + FieldDescriptor::SIZE * fields.len() + FieldDescriptor::TERMINATOR_SIZE;
        let record_length = 1 + fields.iter().map(|f| usize::from(f.length)).sum::<usize>();

        let header_length = u16::try_from(header_length).map_err(|_| {
            XbaseError::schema_too_large(format!(
                "{} fields exceed the 16-bit header length",
                fields.len()
            ))
        })?;
        let record_length = u16::try_from(record_length).map_err(|_| {
            XbaseError::schema_too_large(format!(
                "record length {record_length} exceeds the 16-bit limit"
            ))
        })?;
        let (year, month, day) = naive_date_to_header_date(date);

        Ok(Self {
            version: Self::VERSION_DBASE_III,
            year,
            month,
            day,
            record_count,
            header_length,
            record_length,
            reserved: [0; 20],
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = self.version;
        bytes[1] = self.year;
        bytes[2] = self.month;
        bytes[3] = self.day;
        bytes[4..8].copy_from_slice(&self.record_count.to_le_bytes());
        bytes[8..10].copy_from_slice(&self.header_length.to_le_bytes());
        bytes[10..12].copy_from_slice(&self.record_length.to_le_bytes());
        bytes[12..32].copy_from_slice(&self.reserved);
        bytes
    }

    /// Parse and validate a raw header
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> XbaseResult<Self> {
        let mut reserved = [0u8; 20];
        reserved.copy_from_slice(&bytes[12..32]);

        let header = Self {
            version: bytes[0],
            year: bytes[1],
            month: bytes[2],
            day: bytes[3],
            record_count: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            header_length: u16::from_le_bytes([bytes[8], bytes[9]]),
            record_length: u16::from_le_bytes([bytes[10], bytes[11]]),
            reserved,
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> XbaseResult<()> {
        if usize::from(self.header_length) < Self::SIZE {
            return Err(XbaseError::malformed_header(format!(
                "header length {} is smaller than {} bytes",
                self.header_length,
                Self::SIZE
            )));
        }
        if self.record_length == 0 && self.record_count > 0 {
            return Err(XbaseError::malformed_header(format!(
                "record length is zero but {} records are declared",
                self.record_count
            )));
        }
        Ok(())
    }

    /// Last-update date, if the stored bytes form a valid date
    pub fn last_modified(&self) -> Option<NaiveDate> {
        header_date_to_naive_date(self.year, self.month, self.day)
    }

    /// Bytes between the descriptor terminator and the first record, assuming
    /// `field_count` descriptors (non-zero for VFP files with a backlink area)
    pub fn backlink_length(&self, field_count: usize) -> usize {
        usize::from(self.header_length).saturating_sub(
            Self::SIZE + FieldDescriptor::SIZE * field_count + FieldDescriptor::TERMINATOR_SIZE,
        )
    }
}

/// Read and validate the 32-byte header
pub fn read_header<R: Read>(reader: &mut R) -> XbaseResult<FileHeader> {
    let mut bytes = [0u8; FileHeader::SIZE];
    reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            XbaseError::malformed_header("file is shorter than the 32-byte header")
        }
        _ => XbaseError::Io(e),
    })?;
    FileHeader::from_bytes(&bytes)
}

/// Write a dBase III header for `fields`, stamped with today's date
pub fn write_header<W: Write>(
    writer: &mut W,
    fields: &[FieldInfo],
    record_count: u32,
) -> XbaseResult<FileHeader> {
    let header = FileHeader::for_fields(fields, record_count, Local::now().date_naive())?;
    writer.write_all(&header.to_bytes())?;
    Ok(header)
}
