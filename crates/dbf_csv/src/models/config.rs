use serde::Serialize;

use crate::errors::{XbaseError, XbaseResult};
use crate::models::encoding_utils::Transcoder;

/// Line terminator written after each CSV row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    /// Accepts a literal or backslash-escaped `\n` / `\r\n`
    pub fn parse(value: &str) -> XbaseResult<Self> {
        match value {
            "\n" | "\\n" => Ok(LineEnding::Lf),
            "\r\n" | "\\r\\n" => Ok(LineEnding::CrLf),
            other => Err(XbaseError::InvalidLineEnding(other.to_string())),
        }
    }

    pub(crate) fn terminator(self) -> csv::Terminator {
        match self {
            LineEnding::Lf => csv::Terminator::Any(b'\n'),
            LineEnding::CrLf => csv::Terminator::CRLF,
        }
    }
}

/// What happens to records whose deletion flag is `*` on the DBF→CSV path.
///
/// Deployed variants disagree, so there is deliberately no `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeletionPolicy {
    /// Emit every record, flagged or not
    ExportAll,
    /// Leave flagged records out of the output
    SkipDeleted,
}

/// How the field-descriptor table is delimited when reading a DBF header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DescriptorStrategy {
    /// Read descriptors until the 0x0D terminator; tolerates VFP backlink regions
    #[default]
    TerminatorScan,
    /// Trust the header: `(header_length - 33) / 32` descriptors
    ComputedCount,
}

/// Delimiter, quote and line ending of the CSV side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CsvFormat {
    pub delimiter: u8,
    pub quote: u8,
    pub line_ending: LineEnding,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            line_ending: LineEnding::Lf,
        }
    }
}

/// Resolved, immutable settings for one conversion run
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionConfig {
    pub csv: CsvFormat,
    pub transcoder: Transcoder,
    /// Invoke the progress callback every N records; 0 disables it
    pub progress_interval: u64,
}

impl ConversionConfig {
    pub fn new(transcoder: Transcoder) -> Self {
        Self {
            csv: CsvFormat::default(),
            transcoder,
            progress_interval: 0,
        }
    }

    /// Build from the raw textual settings a caller collected
    pub fn from_settings(
        delimiter: &str,
        quote: &str,
        line_ending: &str,
        encoding: &str,
        progress_interval: u64,
    ) -> XbaseResult<Self> {
        Ok(Self {
            csv: CsvFormat {
                delimiter: parse_delimiter(delimiter)?,
                quote: parse_quote(quote)?,
                line_ending: LineEnding::parse(line_ending)?,
            },
            transcoder: Transcoder::from_label(encoding)?,
            progress_interval,
        })
    }

    pub fn with_csv(mut self, csv: CsvFormat) -> Self {
        self.csv = csv;
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// Options that only apply to the DBF→CSV direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DbfReadOptions {
    pub deletion_policy: DeletionPolicy,
    pub descriptor_strategy: DescriptorStrategy,
}

impl DbfReadOptions {
    pub fn new(deletion_policy: DeletionPolicy) -> Self {
        Self {
            deletion_policy,
            descriptor_strategy: DescriptorStrategy::default(),
        }
    }

    pub fn with_descriptor_strategy(mut self, strategy: DescriptorStrategy) -> Self {
        self.descriptor_strategy = strategy;
        self
    }
}

/// Parse a single delimiter character, allowing backslash escapes like `\t`
pub fn parse_delimiter(value: &str) -> XbaseResult<u8> {
    parse_single_byte(value).ok_or_else(|| XbaseError::InvalidDelimiter(value.to_string()))
}

/// Parse a single quote character, allowing backslash escapes like `\'`
pub fn parse_quote(value: &str) -> XbaseResult<u8> {
    parse_single_byte(value).ok_or_else(|| XbaseError::InvalidQuote(value.to_string()))
}

fn parse_single_byte(value: &str) -> Option<u8> {
    let ch = match value.as_bytes() {
        [b'\\', escaped] => match escaped {
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'\\' => b'\\',
            b'"' => b'"',
            b'\'' => b'\'',
            b'0' => 0,
            _ => return None,
        },
        [single] => *single,
        _ => return None,
    };
    // NUL and non-ASCII bytes cannot act as CSV control characters
    (ch != 0 && ch.is_ascii()).then_some(ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(",").unwrap(), b',');
        assert_eq!(parse_delimiter("|").unwrap(), b'|');
        assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
        assert_eq!(parse_delimiter("\t").unwrap(), b'\t');
    }

    #[test]
    fn test_parse_delimiter_rejects_bad_values() {
        for bad in ["", "\\0", ";;", "\\x", "é"] {
            let err = parse_delimiter(bad).unwrap_err();
            assert!(
                matches!(err, XbaseError::InvalidDelimiter(_)),
                "expected InvalidDelimiter for {bad:?}"
            );
        }
    }

    #[test]
    fn test_parse_quote() {
        assert_eq!(parse_quote("\"").unwrap(), b'"');
        assert_eq!(parse_quote("\\'").unwrap(), b'\'');
        assert!(matches!(parse_quote(""), Err(XbaseError::InvalidQuote(_))));
    }

    #[test]
    fn test_line_ending_parse() {
        assert_eq!(LineEnding::parse("\n").unwrap(), LineEnding::Lf);
        assert_eq!(LineEnding::parse("\\r\\n").unwrap(), LineEnding::CrLf);
        assert!(LineEnding::parse("\r").is_err());
    }

    #[test]
    fn test_from_settings() {
        let config = ConversionConfig::from_settings("|", "'", "\\r\\n", "GBK", 500).unwrap();
        assert_eq!(config.csv.delimiter, b'|');
        assert_eq!(config.csv.quote, b'\'');
        assert_eq!(config.csv.line_ending, LineEnding::CrLf);
        assert!(!config.transcoder.is_utf8());
        assert_eq!(config.progress_interval, 500);

        let err = ConversionConfig::from_settings(",", "\"", "\n", "ebcdic", 0).unwrap_err();
        assert!(matches!(err, XbaseError::UnsupportedEncoding(_)));
    }

    #[test]
    fn test_read_options_default_strategy() {
        let options = DbfReadOptions::new(DeletionPolicy::SkipDeleted);
        assert_eq!(options.descriptor_strategy, DescriptorStrategy::TerminatorScan);
        let options = options.with_descriptor_strategy(DescriptorStrategy::ComputedCount);
        assert_eq!(options.descriptor_strategy, DescriptorStrategy::ComputedCount);
        assert_eq!(options.deletion_policy, DeletionPolicy::SkipDeleted);
    }
}
