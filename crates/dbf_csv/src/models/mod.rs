pub mod config;
pub mod date_utils;
pub mod dbf;
pub mod encoding_utils;

pub use config::{
    ConversionConfig, CsvFormat, DbfReadOptions, DeletionPolicy, DescriptorStrategy, LineEnding,
    parse_delimiter, parse_quote,
};
pub use dbf::{
    ConversionStats, CsvSchema, CsvSource, DbfFileSummary, DbfStructure, FieldInfo, FieldType,
    FileHeader, Progress, analyze_csv, convert_csv_to_dbf, convert_dbf_to_csv, csv_to_dbf,
    dbf_to_csv, describe_dbf_file, read_structure,
};
pub use encoding_utils::{Decoded, DecodingReader, EncodingWriter, Transcoder};
