use chrono::NaiveDate;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::errors::{XbaseError, XbaseResult};
use crate::models::config::{ConversionConfig, DbfReadOptions, DeletionPolicy, DescriptorStrategy};
use crate::models::dbf::fields::{FieldInfo, read_field_descriptors};
use crate::models::dbf::header::{FileHeader, read_header};
use crate::models::dbf::values::decode_value;
use crate::models::dbf::{
    ConversionStats, END_OF_FILE, IO_BUFFER_SIZE, Progress, ProgressIndicator, RECORD_DELETED,
};
use crate::models::encoding_utils::{EncodingWriter, Transcoder};

/// Header and field table of a DBF file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbfStructure {
    pub header: FileHeader,
    pub fields: Vec<FieldInfo>,
}

impl DbfStructure {
    /// Record length implied by the field table, deletion flag included
    pub fn fields_record_length(&self) -> usize {
        1 + self.fields.iter().map(FieldInfo::width).sum::<usize>()
    }
}

/// Read the header and field descriptors.
///
/// The reader is left inside the header area; seek to
/// `header.header_length` before reading records.
pub fn read_structure<R: Read>(
    reader: &mut R,
    transcoder: &Transcoder,
    strategy: DescriptorStrategy,
) -> XbaseResult<DbfStructure> {
    let header = read_header(reader)?;
    let fields = read_field_descriptors(reader, &header, transcoder, strategy)?;

    let structure = DbfStructure { header, fields };
    let implied = structure.fields_record_length();
    if implied != usize::from(structure.header.record_length) {
        log::warn!(
            "Header record length is {} but the fields add up to {}",
            structure.header.record_length,
            implied
        );
    }
    Ok(structure)
}

enum RecordRead {
    Full,
    End,
}

/// Fill `buf` with the next record. End of input before the first byte, or
/// right after a lone 0x1A, is the end of the data; anything else short is a
/// truncated record.
fn read_record<R: Read>(reader: &mut R, buf: &mut [u8], index: u64) -> XbaseResult<RecordRead> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    match filled {
        n if n == buf.len() => Ok(RecordRead::Full),
        0 => Ok(RecordRead::End),
        1 if buf[0] == END_OF_FILE => Ok(RecordRead::End),
        got => Err(XbaseError::TruncatedRecord {
            index,
            expected: buf.len(),
            got,
        }),
    }
}

/// Stream every record of a DBF table into `sink` as CSV.
///
/// The CSV header row holds the field names; text is written in the
/// configured encoding.
pub fn dbf_to_csv<R, W>(
    mut source: R,
    sink: W,
    config: &ConversionConfig,
    options: &DbfReadOptions,
    progress: Option<&mut dyn FnMut(Progress)>,
) -> XbaseResult<ConversionStats>
where
    R: Read + Seek,
    W: Write,
{
    let transcoder = config.transcoder;
    let DbfStructure { header, fields } =
        read_structure(&mut source, &transcoder, options.descriptor_strategy)?;
    log::info!(
        "Structure: {} fields, {} records, record length {}",
        fields.len(),
        header.record_count,
        header.record_length
    );

    source.seek(SeekFrom::Start(u64::from(header.header_length)))?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(config.csv.delimiter)
        .quote(config.csv.quote)
        .terminator(config.csv.line_ending.terminator())
        .from_writer(EncodingWriter::new(sink, transcoder));
    writer.write_record(fields.iter().map(|f| f.name.as_str()))?;

    let mut stats = ConversionStats {
        field_count: fields.len(),
        record_count: header.record_count,
        ..ConversionStats::default()
    };
    let mut indicator =
        ProgressIndicator::new(progress, config.progress_interval, u64::from(header.record_count));

    let mut record = vec![0u8; usize::from(header.record_length)];
    let mut row = vec![String::new(); fields.len()];

    for index in 0..u64::from(header.record_count) {
        if let RecordRead::End = read_record(&mut source, &mut record, index)? {
            log::info!(
                "Data ended after {} of {} declared records",
                index,
                header.record_count
            );
            break;
        }
        indicator.increment();

        if record[0] == RECORD_DELETED && options.deletion_policy == DeletionPolicy::SkipDeleted {
            stats.deleted_skipped += 1;
            continue;
        }

        let mut offset = 1;
        for (i, field) in fields.iter().enumerate() {
            let end = offset + field.width();
            let Some(raw) = record.get(offset..end) else {
                // Field runs past the record; it and every later field stay empty
                row[i..].iter_mut().for_each(String::clear);
                break;
            };
            let decoded = decode_value(raw, field, &transcoder);
            if decoded.fallback {
                stats.decode_fallbacks += 1;
                log::debug!(
                    "Record {}: field {} is not valid {}",
                    index,
                    field.name,
                    transcoder.name()
                );
            }
            row[i] = decoded.text;
            offset = end;
        }

        writer.write_record(&row)?;
        stats.records_written += 1;
    }
    indicator.finish();

    let encoder = writer
        .into_inner()
        .map_err(|e| XbaseError::Io(e.into_error()))?;
    encoder.finish()?;

    Ok(stats)
}

/// Convert the DBF file at `src` into a CSV file at `dst`
pub fn convert_dbf_to_csv(
    src: &Path,
    dst: &Path,
    config: &ConversionConfig,
    options: &DbfReadOptions,
    progress: Option<&mut dyn FnMut(Progress)>,
) -> XbaseResult<ConversionStats> {
    let source = BufReader::with_capacity(IO_BUFFER_SIZE, File::open(src)?);
    let sink = BufWriter::with_capacity(IO_BUFFER_SIZE, File::create(dst)?);
    dbf_to_csv(source, sink, config, options, progress)
}

/// Structural summary of a DBF file, for display or JSON output
#[derive(Debug, Clone, Serialize)]
pub struct DbfFileSummary {
    pub path: String,
    pub version: u8,
    pub last_modified: Option<NaiveDate>,
    pub record_count: u32,
    pub header_length: u16,
    pub record_length: u16,
    /// Bytes between the field table and the first record
    pub backlink_length: usize,
    pub fields: Vec<FieldInfo>,
}

impl DbfFileSummary {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Read only the structure of the DBF file at `path`
pub fn describe_dbf_file(
    path: &Path,
    transcoder: &Transcoder,
    strategy: DescriptorStrategy,
) -> XbaseResult<DbfFileSummary> {
    let mut reader = BufReader::new(File::open(path)?);
    let DbfStructure { header, fields } = read_structure(&mut reader, transcoder, strategy)?;

    Ok(DbfFileSummary {
        path: path.display().to_string(),
        version: header.version,
        last_modified: header.last_modified(),
        record_count: header.record_count,
        header_length: header.header_length,
        record_length: header.record_length,
        backlink_length: header.backlink_length(fields.len()),
        fields,
    })
}
