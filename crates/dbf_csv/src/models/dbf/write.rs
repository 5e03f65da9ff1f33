use csv::StringRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::errors::{XbaseError, XbaseResult};
use crate::models::config::ConversionConfig;
use crate::models::dbf::fields::{FieldInfo, write_field_descriptors};
use crate::models::dbf::header::write_header;
use crate::models::dbf::schema::{CsvSource, RowRead, analyze_csv, csv_reader, read_row};
use crate::models::dbf::values::encode_value;
use crate::models::dbf::{
    ConversionStats, END_OF_FILE, IO_BUFFER_SIZE, Progress, ProgressIndicator, RECORD_ACTIVE,
};

/// Build a dBase III table from CSV.
///
/// Pass one sizes the columns and counts rows; pass two reopens `source`
/// and writes one record per well-formed row, then the 0x1A marker. Every
/// column becomes a character field.
pub fn csv_to_dbf<S, W>(
    source: &S,
    mut sink: W,
    config: &ConversionConfig,
    progress: Option<&mut dyn FnMut(Progress)>,
) -> XbaseResult<ConversionStats>
where
    S: CsvSource + ?Sized,
    W: Write,
{
    let schema = analyze_csv(source.open()?, config)?;
    log::info!(
        "Analyzed CSV: {} fields, {} rows ({} malformed rows skipped)",
        schema.fields.len(),
        schema.record_count,
        schema.rows_skipped
    );

    let header = write_header(&mut sink, &schema.fields, schema.record_count)?;
    write_field_descriptors(&mut sink, &schema.fields, &config.transcoder)?;

    let mut stats = ConversionStats {
        field_count: schema.fields.len(),
        record_count: schema.record_count,
        rows_skipped: schema.rows_skipped,
        ..ConversionStats::default()
    };
    let mut indicator =
        ProgressIndicator::new(progress, config.progress_interval, u64::from(header.record_count));

    let mut reader = csv_reader(source.open()?, config);
    let mut row = StringRecord::new();
    // Header row, already consumed by the analysis pass
    loop {
        match read_row(&mut reader, &mut row)? {
            RowRead::Row => break,
            RowRead::Malformed(_) => continue,
            RowRead::End => return Err(XbaseError::NoFields),
        }
    }

    let slots = field_slots(&schema.fields);
    let mut record = vec![b' '; usize::from(header.record_length)];

    loop {
        match read_row(&mut reader, &mut row)? {
            RowRead::End => break,
            RowRead::Malformed(_) => continue,
            RowRead::Row => {}
        }

        record[0] = RECORD_ACTIVE;
        for (i, (field, (start, end))) in schema.fields.iter().zip(&slots).enumerate() {
            let value = row.get(i).unwrap_or("");
            if encode_value(value, &mut record[*start..*end], &config.transcoder) {
                log::debug!(
                    "Value in column {} truncated to {} bytes",
                    field.name,
                    field.length
                );
            }
        }

        sink.write_all(&record)?;
        stats.records_written += 1;
        indicator.increment();
    }
    indicator.finish();

    sink.write_all(&[END_OF_FILE])?;
    sink.flush()?;
    stats.decode_fallbacks = reader.get_ref().replacements();

    if stats.records_written != u64::from(header.record_count) {
        return Err(XbaseError::RecordCountMismatch {
            declared: header.record_count,
            written: u32::try_from(stats.records_written).unwrap_or(u32::MAX),
        });
    }
    Ok(stats)
}

/// Byte range of each field inside a record, after the deletion flag
fn field_slots(fields: &[FieldInfo]) -> Vec<(usize, usize)> {
    let mut offset = 1;
    fields
        .iter()
        .map(|field| {
            let slot = (offset, offset + field.width());
            offset = slot.1;
            slot
        })
        .collect()
}

/// Convert the CSV file at `src` into a DBF file at `dst`.
///
/// On error `dst` is left incomplete; callers should discard it.
pub fn convert_csv_to_dbf(
    src: &Path,
    dst: &Path,
    config: &ConversionConfig,
    progress: Option<&mut dyn FnMut(Progress)>,
) -> XbaseResult<ConversionStats> {
    let sink = BufWriter::with_capacity(IO_BUFFER_SIZE, File::create(dst)?);
    csv_to_dbf(src, sink, config, progress)
}
