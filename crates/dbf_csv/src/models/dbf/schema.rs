use csv::StringRecord;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::errors::{XbaseError, XbaseResult};
use crate::models::config::ConversionConfig;
use crate::models::dbf::IO_BUFFER_SIZE;
use crate::models::dbf::fields::FieldInfo;
use crate::models::encoding_utils::DecodingReader;

/// Widest value a character field can hold
pub const MAX_CHARACTER_WIDTH: usize = 254;

const BYTE_ORDER_MARK: char = '\u{FEFF}';

/// CSV input that can be read from the start more than once.
///
/// CSV→DBF needs two passes over identical input: one to size the columns,
/// one to write the records.
pub trait CsvSource {
    type Reader<'a>: Read
    where
        Self: 'a;

    fn open(&self) -> io::Result<Self::Reader<'_>>;
}

impl CsvSource for Path {
    type Reader<'a> = BufReader<File>;

    fn open(&self) -> io::Result<Self::Reader<'_>> {
        Ok(BufReader::with_capacity(IO_BUFFER_SIZE, File::open(self)?))
    }
}

impl CsvSource for [u8] {
    type Reader<'a> = &'a [u8];

    fn open(&self) -> io::Result<Self::Reader<'_>> {
        Ok(self)
    }
}

/// Table layout inferred from a CSV source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvSchema {
    /// One `C` field per column, sized to the widest encoded value
    pub fields: Vec<FieldInfo>,
    /// Well-formed data rows; becomes the header's record count
    pub record_count: u32,
    pub rows_skipped: u64,
}

pub(crate) enum RowRead {
    Row,
    Malformed(csv::Error),
    End,
}

/// CSV reader over decoded text, configured from `config`
pub(crate) fn csv_reader<R: Read>(
    source: R,
    config: &ConversionConfig,
) -> csv::Reader<DecodingReader<R>> {
    csv::ReaderBuilder::new()
        .delimiter(config.csv.delimiter)
        .quote(config.csv.quote)
        .has_headers(false)
        .flexible(false)
        .from_reader(DecodingReader::new(source, config.transcoder))
}

/// Read the next row; I/O failures are fatal, parse failures are reported as
/// [`RowRead::Malformed`] so each pass can skip the same rows.
pub(crate) fn read_row<R: Read>(
    reader: &mut csv::Reader<R>,
    record: &mut StringRecord,
) -> XbaseResult<RowRead> {
    match reader.read_record(record) {
        Ok(true) => Ok(RowRead::Row),
        Ok(false) => Ok(RowRead::End),
        Err(e) if e.is_io_error() => Err(XbaseError::Csv(e)),
        Err(e) => Ok(RowRead::Malformed(e)),
    }
}

/// Field names from the CSV header row: trimmed and uppercased
pub(crate) fn header_fields(header: &StringRecord) -> Vec<FieldInfo> {
    header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let name = if i == 0 {
                name.trim_start_matches(BYTE_ORDER_MARK)
            } else {
                name
            };
            FieldInfo::character(&name.trim().to_uppercase(), 1)
        })
        .collect()
}

/// First pass: infer one character field per column.
///
/// Widths are measured in encoded bytes, start at 1 and are clamped to
/// [`MAX_CHARACTER_WIDTH`]. Rows the CSV parser rejects, including rows whose
/// cell count differs from the header, are skipped and not counted.
pub fn analyze_csv<R: Read>(source: R, config: &ConversionConfig) -> XbaseResult<CsvSchema> {
    let mut reader = csv_reader(source, config);
    let mut record = StringRecord::new();

    let mut fields = loop {
        match read_row(&mut reader, &mut record)? {
            RowRead::Row => break header_fields(&record),
            RowRead::End => return Err(XbaseError::NoFields),
            RowRead::Malformed(e) => {
                log::warn!("Skipping unreadable CSV header line: {}", e);
            }
        }
    };
    if fields.is_empty() {
        return Err(XbaseError::NoFields);
    }

    let mut widths = vec![1usize; fields.len()];
    let mut record_count: u64 = 0;
    let mut rows_skipped: u64 = 0;

    loop {
        match read_row(&mut reader, &mut record)? {
            RowRead::End => break,
            RowRead::Malformed(e) => {
                rows_skipped += 1;
                log::warn!(
                    "Skipping malformed CSV line at record {}: {}",
                    record_count + 1,
                    e
                );
            }
            RowRead::Row => {
                for (width, value) in widths.iter_mut().zip(record.iter()) {
                    *width = (*width).max(config.transcoder.encoded_len(value));
                }
                record_count += 1;
            }
        }
    }

    for (field, width) in fields.iter_mut().zip(widths) {
        if width > MAX_CHARACTER_WIDTH {
            log::debug!(
                "Column {} needs {} bytes; clamping to {}",
                field.name,
                width,
                MAX_CHARACTER_WIDTH
            );
        }
        // Clamped to 254, so the conversion cannot fail
        field.length = u8::try_from(width.min(MAX_CHARACTER_WIDTH)).unwrap_or(u8::MAX);
    }

    let record_count = u32::try_from(record_count).map_err(|_| {
        XbaseError::schema_too_large(format!("{record_count} rows exceed the 32-bit record count"))
    })?;

    Ok(CsvSchema {
        fields,
        record_count,
        rows_skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::CsvFormat;
    use crate::models::dbf::fields::FieldType;
    use crate::models::encoding_utils::Transcoder;

    fn analyze(input: &[u8], config: &ConversionConfig) -> XbaseResult<CsvSchema> {
        analyze_csv(input.open().unwrap(), config)
    }

    fn utf8_config() -> ConversionConfig {
        ConversionConfig::new(Transcoder::utf8())
    }

    #[test]
    fn test_infers_names_and_widths() {
        let schema = analyze(b" name ,city\nAl,Rome\nBeatrice,Oslo\n", &utf8_config()).unwrap();

        assert_eq!(schema.record_count, 2);
        assert_eq!(schema.fields[0].name, "NAME");
        assert_eq!(schema.fields[0].length, 8);
        assert_eq!(schema.fields[1].name, "CITY");
        assert_eq!(schema.fields[1].length, 4);
        assert!(schema.fields.iter().all(|f| f.field_type == FieldType::Character));
        assert!(schema.fields.iter().all(|f| f.decimal_count == 0));
    }

    #[test]
    fn test_width_is_encoded_bytes() {
        let gbk = ConversionConfig::new(Transcoder::from_label("gbk").unwrap());
        let input = "名字\n中文字\n".as_bytes();

        assert_eq!(analyze(input, &gbk).unwrap().fields[0].length, 6);
        assert_eq!(analyze(input, &utf8_config()).unwrap().fields[0].length, 9);
    }

    #[test]
    fn test_empty_body_uses_minimum_width() {
        let schema = analyze(b"a,b,c\n", &utf8_config()).unwrap();
        assert_eq!(schema.record_count, 0);
        assert_eq!(schema.fields.len(), 3);
        assert!(schema.fields.iter().all(|f| f.length == 1));

        let schema = analyze(b"a\n\"\"\n", &utf8_config()).unwrap();
        assert_eq!(schema.record_count, 1);
        assert_eq!(schema.fields[0].length, 1);
    }

    #[test]
    fn test_width_clamped_to_254() {
        let mut input = b"wide\n".to_vec();
        input.extend(std::iter::repeat(b'x').take(400));
        input.push(b'\n');
        let schema = analyze(&input, &utf8_config()).unwrap();
        assert_eq!(usize::from(schema.fields[0].length), MAX_CHARACTER_WIDTH);
    }

    #[test]
    fn test_empty_input_has_no_fields() {
        let err = analyze(b"", &utf8_config()).unwrap_err();
        assert!(matches!(err, XbaseError::NoFields));
    }

    #[test]
    fn test_malformed_rows_not_counted() {
        let schema = analyze(b"a,b\n1,2\n3\n4,5,6\n7,8\n", &utf8_config()).unwrap();
        assert_eq!(schema.record_count, 2);
        assert_eq!(schema.rows_skipped, 2);
    }

    #[test]
    fn test_strips_byte_order_mark() {
        let schema = analyze("\u{FEFF}id,name\n1,x\n".as_bytes(), &utf8_config()).unwrap();
        assert_eq!(schema.fields[0].name, "ID");
    }

    #[test]
    fn test_custom_delimiter_and_quote() {
        let config = utf8_config().with_csv(CsvFormat {
            delimiter: b';',
            quote: b'\'',
            ..CsvFormat::default()
        });
        let schema = analyze(b"a;b\n'x;y';z\n", &config).unwrap();
        assert_eq!(schema.fields.len(), 2);
        assert_eq!(schema.fields[0].length, 3);
    }

    #[test]
    fn test_gbk_trail_byte_is_not_a_delimiter() {
        // 0x7C ('|') appears as the trail byte of this GBK character
        let gbk = Transcoder::from_label("gbk").unwrap();
        let config = ConversionConfig::new(gbk).with_csv(CsvFormat {
            delimiter: b'|',
            ..CsvFormat::default()
        });
        let mut input = b"a|b\n".to_vec();
        input.extend_from_slice(&[0x81, 0x7C]);
        input.extend_from_slice(b"|z\n");
        let schema = analyze(&input, &config).unwrap();
        assert_eq!(schema.record_count, 1);
        assert_eq!(schema.fields[0].length, 2);
    }
}
