use encoding::all::{BIG5_2003, EUC_JP, GB18030, UTF_8, WINDOWS_31J, WINDOWS_949};
use encoding::{DecoderTrap, EncoderTrap, Encoding, EncodingRef, RawDecoder};
use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};

use crate::errors::{XbaseError, XbaseResult};

/// Size of the raw chunk pulled from the source by [`DecodingReader`]
const DECODE_CHUNK_SIZE: usize = 64 * 1024;

/// Accepted encoding labels (lowercase) and the codec each one selects
static ENCODING_ALIASES: Lazy<HashMap<&'static str, EncodingRef>> = Lazy::new(|| {
    let mut aliases: HashMap<&'static str, EncodingRef> = HashMap::new();
    aliases.insert("utf-8", UTF_8);
    aliases.insert("utf8", UTF_8);
    // GB18030 is a superset of GBK and GB2312, so one codec serves all three.
    aliases.insert("gbk", GB18030);
    aliases.insert("gb2312", GB18030);
    aliases.insert("gb18030", GB18030);
    aliases.insert("cp936", GB18030);
    aliases.insert("big5", BIG5_2003);
    aliases.insert("shift_jis", WINDOWS_31J);
    aliases.insert("sjis", WINDOWS_31J);
    aliases.insert("cp932", WINDOWS_31J);
    aliases.insert("euc-jp", EUC_JP);
    aliases.insert("euc-kr", WINDOWS_949);
    aliases.insert("cp949", WINDOWS_949);
    aliases
});

/// Result of decoding a byte slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    /// True when strict decoding failed and the raw bytes were reinterpreted instead
    pub fallback: bool,
}

/// Text codec for one declared encoding.
///
/// Every component that touches field names, character values or CSV text
/// goes through the same `Transcoder`, resolved once from the configured label.
#[derive(Clone, Copy)]
pub struct Transcoder {
    encoding: EncodingRef,
}

impl Transcoder {
    /// Resolve a user-supplied encoding label (case-insensitive, trimmed)
    pub fn from_label(label: &str) -> XbaseResult<Self> {
        let key = label.trim().to_lowercase();
        ENCODING_ALIASES
            .get(key.as_str())
            .map(|encoding| Self {
                encoding: *encoding,
            })
            .ok_or_else(|| XbaseError::UnsupportedEncoding(label.to_string()))
    }

    pub fn utf8() -> Self {
        Self { encoding: UTF_8 }
    }

    /// Labels accepted by [`Transcoder::from_label`], sorted
    pub fn supported_labels() -> Vec<&'static str> {
        let mut labels: Vec<&'static str> = ENCODING_ALIASES.keys().copied().collect();
        labels.sort_unstable();
        labels
    }

    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    pub fn is_utf8(&self) -> bool {
        self.encoding.name() == UTF_8.name()
    }

    /// Decode bytes to text. Never fails: undecodable input is reinterpreted
    /// lossily and flagged through [`Decoded::fallback`].
    pub fn decode(&self, raw: &[u8]) -> Decoded {
        let strict = if self.is_utf8() {
            std::str::from_utf8(raw).map(str::to_string).ok()
        } else {
            self.encoding.decode(raw, DecoderTrap::Strict).ok()
        };

        match strict {
            Some(text) => Decoded {
                text,
                fallback: false,
            },
            None => Decoded {
                text: String::from_utf8_lossy(raw).into_owned(),
                fallback: true,
            },
        }
    }

    /// Encode text; characters the target charset cannot express are replaced
    pub fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        if self.is_utf8() {
            return Cow::Borrowed(text.as_bytes());
        }
        match self.encoding.encode(text, EncoderTrap::Replace) {
            Ok(bytes) => Cow::Owned(bytes),
            Err(_) => Cow::Borrowed(text.as_bytes()),
        }
    }

    /// Byte width of `text` once encoded
    pub fn encoded_len(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    /// Encode `text` and cut it to at most `max_len` bytes, never splitting
    /// a multibyte sequence. The flag is `true` when the text was cut.
    pub fn encode_truncated<'a>(&self, text: &'a str, max_len: usize) -> (Cow<'a, [u8]>, bool) {
        let encoded = self.encode(text);
        if encoded.len() <= max_len {
            return (encoded, false);
        }

        if self.is_utf8() {
            let mut end = max_len;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            return (Cow::Borrowed(&text.as_bytes()[..end]), true);
        }

        let mut out = Vec::with_capacity(max_len);
        let mut scratch = [0u8; 4];
        for ch in text.chars() {
            let piece = self.encode(ch.encode_utf8(&mut scratch));
            if out.len() + piece.len() > max_len {
                break;
            }
            out.extend_from_slice(&piece);
        }
        (Cow::Owned(out), true)
    }
}

impl fmt::Debug for Transcoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transcoder")
            .field("encoding", &self.name())
            .finish()
    }
}

impl PartialEq for Transcoder {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

/// Streams source-encoded bytes out as UTF-8.
///
/// Invalid sequences become U+FFFD; the count is exposed through
/// [`DecodingReader::replacements`].
pub struct DecodingReader<R> {
    inner: R,
    decoder: Box<dyn RawDecoder>,
    chunk: Vec<u8>,
    output: String,
    pos: usize,
    finished: bool,
    replacements: u64,
}

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, transcoder: Transcoder) -> Self {
        Self {
            inner,
            decoder: transcoder.encoding.raw_decoder(),
            chunk: vec![0; DECODE_CHUNK_SIZE],
            output: String::new(),
            pos: 0,
            finished: false,
            replacements: 0,
        }
    }

    pub fn replacements(&self) -> u64 {
        self.replacements
    }

    fn fill(&mut self) -> io::Result<()> {
        self.output.clear();
        self.pos = 0;

        while self.output.is_empty() && !self.finished {
            let n = self.inner.read(&mut self.chunk)?;
            if n == 0 {
                if self.decoder.raw_finish(&mut self.output).is_some() {
                    self.output.push(char::REPLACEMENT_CHARACTER);
                    self.replacements += 1;
                }
                self.finished = true;
            } else {
                self.feed(n);
            }
        }
        Ok(())
    }

    fn feed(&mut self, len: usize) {
        let mut remaining = 0;
        while remaining < len {
            let (offset, err) = self
                .decoder
                .raw_feed(&self.chunk[remaining..len], &mut self.output);
            match err {
                Some(err) => {
                    self.output.push(char::REPLACEMENT_CHARACTER);
                    self.replacements += 1;
                    let resume = (remaining as isize + err.upto).max((remaining + offset) as isize);
                    // Always make progress past the invalid sequence
                    remaining = (resume as usize).max(remaining + 1).min(len);
                }
                None => remaining = len,
            }
        }
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.output.len() {
            self.fill()?;
        }
        let available = &self.output.as_bytes()[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Encodes UTF-8 written into it to the target charset before passing it on.
///
/// Writes may split a UTF-8 sequence; the incomplete tail is held back until
/// the rest arrives.
pub struct EncodingWriter<W: Write> {
    inner: W,
    transcoder: Transcoder,
    pending: Vec<u8>,
}

impl<W: Write> EncodingWriter<W> {
    pub fn new(inner: W, transcoder: Transcoder) -> Self {
        Self {
            inner,
            transcoder,
            pending: Vec::new(),
        }
    }

    /// Flush everything, including an incomplete trailing sequence, and
    /// return the wrapped writer.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.pending.is_empty() {
            let text = String::from_utf8_lossy(&self.pending).into_owned();
            self.inner.write_all(&self.transcoder.encode(&text))?;
            self.pending.clear();
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn drain_complete(&mut self) -> io::Result<()> {
        let valid_len = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        };
        if valid_len == 0 {
            return Ok(());
        }
        {
            let text = String::from_utf8_lossy(&self.pending[..valid_len]);
            let encoded = self.transcoder.encode(&text);
            self.inner.write_all(&encoded)?;
        }
        self.pending.drain(..valid_len);
        Ok(())
    }
}

impl<W: Write> Write for EncodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.transcoder.is_utf8() {
            return self.inner.write(buf);
        }
        self.pending.extend_from_slice(buf);
        self.drain_complete()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // "中文" in GB18030
    const ZHONGWEN_GB: [u8; 4] = [0xD6, 0xD0, 0xCE, 0xC4];

    #[test]
    fn test_from_label_aliases() {
        assert!(Transcoder::from_label("UTF-8").unwrap().is_utf8());
        assert!(Transcoder::from_label(" utf8 ").unwrap().is_utf8());
        let gbk = Transcoder::from_label("GBK").unwrap();
        assert!(!gbk.is_utf8());
        assert_eq!(gbk, Transcoder::from_label("gb18030").unwrap());
        assert_eq!(gbk, Transcoder::from_label("Gb2312").unwrap());
    }

    #[test]
    fn test_unsupported_label_is_configuration_error() {
        let err = Transcoder::from_label("latin-42").unwrap_err();
        assert!(matches!(err, XbaseError::UnsupportedEncoding(name) if name == "latin-42"));
    }

    #[test]
    fn test_supported_labels_sorted() {
        let labels = Transcoder::supported_labels();
        assert!(labels.contains(&"gbk"));
        assert!(labels.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_decode_gb18030() {
        let gbk = Transcoder::from_label("gbk").unwrap();
        let decoded = gbk.decode(&ZHONGWEN_GB);
        assert_eq!(decoded.text, "中文");
        assert!(!decoded.fallback);
    }

    #[test]
    fn test_decode_invalid_utf8_falls_back() {
        let decoded = Transcoder::utf8().decode(&[b'a', 0xFF, b'b']);
        assert!(decoded.fallback);
        assert!(decoded.text.starts_with('a'));
        assert!(decoded.text.ends_with('b'));
    }

    #[test]
    fn test_encode_round_trip() {
        let gbk = Transcoder::from_label("gbk").unwrap();
        let encoded = gbk.encode("中文");
        assert_eq!(encoded.as_ref(), &ZHONGWEN_GB);
        assert_eq!(gbk.encoded_len("中文abc"), 7);
        assert_eq!(Transcoder::utf8().encoded_len("中文"), 6);
    }

    #[test]
    fn test_encode_truncated_keeps_char_boundaries() {
        let utf8 = Transcoder::utf8();
        // 3 bytes per char in UTF-8; 10 bytes fit three chars
        let (cut, truncated) = utf8.encode_truncated("一二三四", 10);
        assert_eq!(cut.len(), 9);
        assert!(truncated);
        let (whole, truncated) = utf8.encode_truncated("abc", 10);
        assert_eq!(whole.as_ref(), b"abc");
        assert!(!truncated);

        let gbk = Transcoder::from_label("gbk").unwrap();
        let (cut, truncated) = gbk.encode_truncated("中文中文中文", 5);
        assert_eq!(cut.len(), 4);
        assert_eq!(cut.as_ref(), &ZHONGWEN_GB);
        assert!(truncated);
        assert!(!gbk.encode_truncated("中文", 4).1);
    }

    #[test]
    fn test_decoding_reader_across_chunk_boundaries() {
        let gbk = Transcoder::from_label("gbk").unwrap();
        let mut source = Vec::new();
        for _ in 0..(DECODE_CHUNK_SIZE / 3) {
            source.extend_from_slice(&ZHONGWEN_GB);
            source.push(b',');
        }
        let mut reader = DecodingReader::new(source.as_slice(), gbk);
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();

        assert_eq!(reader.replacements(), 0);
        assert_eq!(text.matches("中文,").count(), DECODE_CHUNK_SIZE / 3);
    }

    #[test]
    fn test_decoding_reader_replaces_invalid_bytes() {
        let mut reader = DecodingReader::new(&b"ok\xFFok"[..], Transcoder::utf8());
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "ok\u{FFFD}ok");
        assert_eq!(reader.replacements(), 1);
    }

    #[test]
    fn test_encoding_writer_handles_split_sequences() {
        let gbk = Transcoder::from_label("gbk").unwrap();
        let mut writer = EncodingWriter::new(Vec::new(), gbk);
        let utf8 = "中文".as_bytes();
        // Split in the middle of the first character
        writer.write_all(&utf8[..2]).unwrap();
        writer.write_all(&utf8[2..]).unwrap();
        let out = writer.finish().unwrap();
        assert_eq!(out, ZHONGWEN_GB.to_vec());
    }

    #[test]
    fn test_encoding_writer_utf8_passthrough() {
        let mut writer = EncodingWriter::new(Vec::new(), Transcoder::utf8());
        writer.write_all("a,中\n".as_bytes()).unwrap();
        assert_eq!(writer.finish().unwrap(), "a,中\n".as_bytes());
    }
}
