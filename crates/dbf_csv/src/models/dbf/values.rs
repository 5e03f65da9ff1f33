use crate::models::date_utils::{TIMESTAMP_FORMAT, julian_day_to_timestamp};
use crate::models::dbf::fields::{FieldInfo, FieldType};
use crate::models::encoding_utils::{Decoded, Transcoder};

/// Emitted for memo and OLE fields, whose content lives in a side-car file
pub const MEMO_PLACEHOLDER: &str = "[MEMO/OLE]";

/// Scale of the VFP currency type (four implied decimals)
const CURRENCY_SCALE: u64 = 10_000;

/// Decimal exponent at which doubles switch to scientific notation
const SCIENTIFIC_FROM_EXPONENT: i32 = 21;

/// Convert the raw bytes of one field to text.
///
/// Never fails. A payload of the wrong width for a fixed-size binary type
/// yields an empty string; undecodable character data falls back to a lossy
/// reinterpretation and sets [`Decoded::fallback`].
pub fn decode_value(raw: &[u8], field: &FieldInfo, transcoder: &Transcoder) -> Decoded {
    let text = match field.field_type {
        FieldType::Character | FieldType::Other(_) => return decode_text(raw, transcoder),
        FieldType::Numeric | FieldType::Float => ascii_trimmed(raw),
        FieldType::Logical => decode_logical(raw).to_string(),
        FieldType::Date => decode_date(raw),
        FieldType::Integer => decode_integer(raw),
        FieldType::Currency => decode_currency(raw),
        FieldType::Double => decode_double(raw),
        FieldType::DateTime => decode_datetime(raw),
        FieldType::Memo | FieldType::General => MEMO_PLACEHOLDER.to_string(),
    };
    Decoded {
        text,
        fallback: false,
    }
}

/// Decode first, then trim: a multibyte trail byte may equal 0x20.
fn decode_text(raw: &[u8], transcoder: &Transcoder) -> Decoded {
    let decoded = transcoder.decode(raw);
    let text = decoded.text.trim_end_matches('\0').trim().to_string();
    Decoded {
        text,
        fallback: decoded.fallback,
    }
}

fn ascii_trimmed(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

fn decode_logical(raw: &[u8]) -> &'static str {
    match raw {
        [b'Y' | b'y' | b'T' | b't'] => "TRUE",
        [b'N' | b'n' | b'F' | b'f'] => "FALSE",
        _ => "",
    }
}

fn decode_date(raw: &[u8]) -> String {
    let blank = raw.iter().all(|b| *b == b' ' || *b == 0);
    match raw {
        [y0, y1, y2, y3, m0, m1, d0, d1] if !blank && raw.is_ascii() => {
            let bytes = [*y0, *y1, *y2, *y3, b'-', *m0, *m1, b'-', *d0, *d1];
            String::from_utf8_lossy(&bytes).into_owned()
        }
        _ => ascii_trimmed(raw),
    }
}

fn decode_integer(raw: &[u8]) -> String {
    match <[u8; 4]>::try_from(raw) {
        Ok(bytes) => i32::from_le_bytes(bytes).to_string(),
        Err(_) => String::new(),
    }
}

fn decode_currency(raw: &[u8]) -> String {
    let Ok(bytes) = <[u8; 8]>::try_from(raw) else {
        return String::new();
    };
    let value = i64::from_le_bytes(bytes);
    let magnitude = value.unsigned_abs();
    let sign = if value < 0 { "-" } else { "" };
    format!(
        "{sign}{}.{:04}",
        magnitude / CURRENCY_SCALE,
        magnitude % CURRENCY_SCALE
    )
}

fn decode_double(raw: &[u8]) -> String {
    match <[u8; 8]>::try_from(raw) {
        Ok(bytes) => format_double(f64::from_le_bytes(bytes)),
        Err(_) => String::new(),
    }
}

/// Shortest round-trip digits; scientific notation below 1e-4 and from 1e21
/// on, with a signed two-digit exponent. Non-finite values print as `+Inf`,
/// `-Inf` and `NaN`.
fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        let sign = if value > 0.0 { '+' } else { '-' };
        return format!("{sign}Inf");
    }

    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return value.to_string();
    };
    if (-4..SCIENTIFIC_FROM_EXPONENT).contains(&exponent) || value == 0.0 {
        return value.to_string();
    }
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
}

fn decode_datetime(raw: &[u8]) -> String {
    if raw.len() != 8 {
        return String::new();
    }
    let julian_day = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
    let millis = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);

    julian_day_to_timestamp(i64::from(julian_day), i64::from(millis))
        .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

/// Write `text` into a field slot of the record buffer.
///
/// The slot is space-filled first; text that does not fit is cut at the last
/// whole character. Returns `true` when the value was truncated.
pub fn encode_value(text: &str, slot: &mut [u8], transcoder: &Transcoder) -> bool {
    slot.fill(b' ');
    let (encoded, truncated) = transcoder.encode_truncated(text, slot.len());
    slot[..encoded.len()].copy_from_slice(&encoded);
    truncated
}
