use serde::Serialize;
use std::fmt;
use std::io::{self, Read, Write};

use crate::errors::{XbaseError, XbaseResult};
use crate::models::config::DescriptorStrategy;
use crate::models::dbf::header::FileHeader;
use crate::models::encoding_utils::Transcoder;

/// dBase / Visual FoxPro field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `C`: text in the table encoding
    Character,
    /// `N`: ASCII number
    Numeric,
    /// `F`: ASCII float
    Float,
    /// `L`: one-byte logical
    Logical,
    /// `D`: ASCII `YYYYMMDD`
    Date,
    /// `I`: VFP little-endian i32
    Integer,
    /// `Y`: VFP little-endian i64 scaled by 10 000
    Currency,
    /// `B`: VFP little-endian f64
    Double,
    /// `T`: VFP Julian day + milliseconds
    DateTime,
    /// `M`: memo stored in a side-car file
    Memo,
    /// `G`: OLE object stored in a side-car file
    General,
    /// Any other tag; values are read as text
    Other(u8),
}

impl FieldType {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            b'C' => FieldType::Character,
            b'N' => FieldType::Numeric,
            b'F' => FieldType::Float,
            b'L' => FieldType::Logical,
            b'D' => FieldType::Date,
            b'I' => FieldType::Integer,
            b'Y' => FieldType::Currency,
            b'B' => FieldType::Double,
            b'T' => FieldType::DateTime,
            b'M' => FieldType::Memo,
            b'G' => FieldType::General,
            other => FieldType::Other(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            FieldType::Character => b'C',
            FieldType::Numeric => b'N',
            FieldType::Float => b'F',
            FieldType::Logical => b'L',
            FieldType::Date => b'D',
            FieldType::Integer => b'I',
            FieldType::Currency => b'Y',
            FieldType::Double => b'B',
            FieldType::DateTime => b'T',
            FieldType::Memo => b'M',
            FieldType::General => b'G',
            FieldType::Other(tag) => tag,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Character => write!(f, "Character"),
            FieldType::Numeric => write!(f, "Numeric"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Logical => write!(f, "Logical"),
            FieldType::Date => write!(f, "Date"),
            FieldType::Integer => write!(f, "Integer"),
            FieldType::Currency => write!(f, "Currency"),
            FieldType::Double => write!(f, "Double"),
            FieldType::DateTime => write!(f, "DateTime"),
            FieldType::Memo => write!(f, "Memo"),
            FieldType::General => write!(f, "General"),
            FieldType::Other(tag) => write!(f, "Other({})", char::from(*tag)),
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Decoded column metadata, shared by every record of the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub field_type: FieldType,
    /// Width of the field inside each record, in bytes
    pub length: u8,
    pub decimal_count: u8,
}

impl FieldInfo {
    pub fn new(name: &str, field_type: FieldType, length: u8, decimal_count: u8) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            length,
            decimal_count,
        }
    }

    pub fn character(name: &str, length: u8) -> Self {
        Self::new(name, FieldType::Character, length, 0)
    }

    pub fn width(&self) -> usize {
        usize::from(self.length)
    }
}

/// On-disk field descriptor (32 bytes)
///
/// ```text
/// 0..11  name, NUL padded
/// 11     type tag
/// 12..16 reserved (VFP: displacement in record)
/// 16     length
/// 17     decimal count
/// 18..32 reserved
/// ```
pub struct FieldDescriptor;

impl FieldDescriptor {
    pub const SIZE: usize = 32;
    pub const NAME_SLOT: usize = 11;
    /// Longest name in encoded bytes; the 11th byte stays NUL
    pub const MAX_NAME_BYTES: usize = 10;
    pub const TERMINATOR: u8 = 0x0D;
    pub const TERMINATOR_SIZE: usize = 1;
    /// Guard against corrupted tables that never terminate
    pub const MAX_FIELDS: usize = 4096;

    pub fn decode(bytes: &[u8; Self::SIZE], transcoder: &Transcoder) -> FieldInfo {
        let name_slot = &bytes[..Self::NAME_SLOT];
        let name_len = name_slot
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |last| last + 1);
        let decoded = transcoder.decode(&name_slot[..name_len]);
        if decoded.fallback {
            log::debug!("Field name {:?} is not valid {}", decoded.text, transcoder.name());
        }

        let field_type = FieldType::from_tag(bytes[11]);
        if let FieldType::Other(tag) = field_type {
            log::debug!(
                "Field {} has unrecognized type tag 0x{:02X}; reading it as text",
                decoded.text,
                tag
            );
        }

        FieldInfo {
            name: decoded.text,
            field_type,
            length: bytes[16],
            decimal_count: bytes[17],
        }
    }

    pub fn encode(field: &FieldInfo, transcoder: &Transcoder) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        let (name, _) = transcoder.encode_truncated(&field.name, Self::MAX_NAME_BYTES);
        bytes[..name.len()].copy_from_slice(&name);
        bytes[11] = field.field_type.tag();
        bytes[16] = field.length;
        bytes[17] = field.decimal_count;
        bytes
    }
}

/// Read the descriptor table that follows the header.
///
/// Leaves `reader` positioned after the last descriptor consumed; callers must
/// seek to `header.header_length` before reading records.
pub fn read_field_descriptors<R: Read>(
    reader: &mut R,
    header: &FileHeader,
    transcoder: &Transcoder,
    strategy: DescriptorStrategy,
) -> XbaseResult<Vec<FieldInfo>> {
    match strategy {
        DescriptorStrategy::TerminatorScan => scan_until_terminator(reader, transcoder),
        DescriptorStrategy::ComputedCount => {
            let count = usize::from(header.header_length)
                .saturating_sub(FileHeader::SIZE + FieldDescriptor::TERMINATOR_SIZE)
                / FieldDescriptor::SIZE;
            read_counted(reader, count, transcoder)
        }
    }
}

fn scan_until_terminator<R: Read>(
    reader: &mut R,
    transcoder: &Transcoder,
) -> XbaseResult<Vec<FieldInfo>> {
    let mut fields = Vec::new();

    for index in 0..FieldDescriptor::MAX_FIELDS {
        let mut bytes = [0u8; FieldDescriptor::SIZE];
        read_descriptor_part(reader, &mut bytes[..1], index)?;
        if bytes[0] == FieldDescriptor::TERMINATOR {
            return Ok(fields);
        }
        read_descriptor_part(reader, &mut bytes[1..], index)?;
        fields.push(FieldDescriptor::decode(&bytes, transcoder));
    }

    Err(XbaseError::MissingFieldTerminator {
        limit: FieldDescriptor::MAX_FIELDS,
    })
}

fn read_counted<R: Read>(
    reader: &mut R,
    count: usize,
    transcoder: &Transcoder,
) -> XbaseResult<Vec<FieldInfo>> {
    let mut fields = Vec::with_capacity(count);
    for index in 0..count {
        let mut bytes = [0u8; FieldDescriptor::SIZE];
        read_descriptor_part(reader, &mut bytes, index)?;
        fields.push(FieldDescriptor::decode(&bytes, transcoder));
    }
    Ok(fields)
}

fn read_descriptor_part<R: Read>(reader: &mut R, buf: &mut [u8], index: usize) -> XbaseResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => XbaseError::TruncatedFieldDescriptor { index },
        _ => XbaseError::Io(e),
    })
}

/// Write one descriptor per field followed by the 0x0D terminator
pub fn write_field_descriptors<W: Write>(
    writer: &mut W,
    fields: &[FieldInfo],
    transcoder: &Transcoder,
) -> XbaseResult<()> {
    for field in fields {
        writer.write_all(&FieldDescriptor::encode(field, transcoder))?;
    }
    writer.write_all(&[FieldDescriptor::TERMINATOR])?;
    Ok(())
}
