//! dBase / Visual FoxPro table codec and the two CSV conversion directions
//!
//! Leaf modules (`header`, `fields`, `values`) handle the byte layout; `schema`
//! infers a table layout from CSV text; `read` and `write` stream records.

pub mod fields;
pub mod header;
pub mod read;
pub mod schema;
pub mod values;
pub mod write;

use serde::Serialize;

pub use fields::{FieldDescriptor, FieldInfo, FieldType, read_field_descriptors, write_field_descriptors};
pub use header::{FileHeader, read_header, write_header};
pub use read::{
    DbfFileSummary, DbfStructure, convert_dbf_to_csv, dbf_to_csv, describe_dbf_file, read_structure,
};
pub use schema::{CsvSchema, CsvSource, analyze_csv};
pub use values::{MEMO_PLACEHOLDER, decode_value, encode_value};
pub use write::{convert_csv_to_dbf, csv_to_dbf};

/// Buffer size for file-level reads and writes
pub const IO_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Deletion flag of an active record
pub const RECORD_ACTIVE: u8 = b' ';
/// Deletion flag of a logically deleted record
pub const RECORD_DELETED: u8 = b'*';
/// Written after the last record
pub const END_OF_FILE: u8 = 0x1A;

/// Progress snapshot handed to the caller's callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Records read (DBF→CSV) or rows written (CSV→DBF) so far
    pub processed: u64,
    /// Record count declared in the header
    pub total: u64,
}

/// Outcome of one file conversion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    pub field_count: usize,
    /// Record count declared in the DBF header
    pub record_count: u32,
    /// CSV rows (DBF→CSV) or DBF records (CSV→DBF) actually written
    pub records_written: u64,
    pub deleted_skipped: u64,
    /// Malformed CSV rows left out of the table
    pub rows_skipped: u64,
    /// Values whose bytes were not valid in the declared encoding
    pub decode_fallbacks: u64,
}

/// Calls the progress callback every `interval` records and once at the end
pub(crate) struct ProgressIndicator<'a> {
    callback: Option<&'a mut dyn FnMut(Progress)>,
    interval: u64,
    total: u64,
    current: u64,
}

impl<'a> ProgressIndicator<'a> {
    pub(crate) fn new(
        callback: Option<&'a mut dyn FnMut(Progress)>,
        interval: u64,
        total: u64,
    ) -> Self {
        Self {
            callback,
            interval,
            total,
            current: 0,
        }
    }

    pub(crate) fn increment(&mut self) {
        self.current += 1;
        if self.interval > 0 && self.current % self.interval == 0 {
            self.report();
        }
    }

    pub(crate) fn finish(&mut self) {
        if self.interval > 0 {
            self.report();
        }
    }

    fn report(&mut self) {
        let progress = Progress {
            processed: self.current,
            total: self.total,
        };
        if let Some(callback) = self.callback.as_deref_mut() {
            callback(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_indicator_interval() {
        let mut seen = Vec::new();
        let mut record = |p: Progress| seen.push(p.processed);
        let mut progress = ProgressIndicator::new(Some(&mut record), 2, 5);
        for _ in 0..5 {
            progress.increment();
        }
        progress.finish();
        drop(progress);
        assert_eq!(seen, vec![2, 4, 5]);
    }

    #[test]
    fn test_progress_indicator_disabled() {
        let mut calls = 0;
        let mut count = |_: Progress| calls += 1;
        let mut progress = ProgressIndicator::new(Some(&mut count), 0, 3);
        progress.increment();
        progress.finish();
        drop(progress);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_progress_indicator_without_callback() {
        let mut progress = ProgressIndicator::new(None, 1, 1);
        progress.increment();
        progress.finish();
        assert_eq!(progress.current, 1);
    }
}
