use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta};

/// Base year of the year-offset byte in DBF headers
pub const DBASE_HEADER_BASE_YEAR: i32 = 1900;

/// Time unit conversion constants
pub const MILLISECONDS_PER_SECOND: i64 = 1_000;

/// Output format of DateTime (`T`) values
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Converts a Julian day number to a proleptic Gregorian (year, month, day).
///
/// Fliegel & Van Flandern (1968), integer arithmetic only. Division
/// truncates toward zero, matching the published algorithm.
pub fn julian_day_to_ymd(julian_day: i64) -> (i64, u32, u32) {
    let mut l = julian_day + 68_569;
    let n = (4 * l) / 146_097;
    l -= (146_097 * n + 3) / 4;
    let i = (4_000 * (l + 1)) / 1_461_001;
    l = l - (1_461 * i) / 4 + 31;
    let j = (80 * l) / 2_447;
    let day = l - (2_447 * j) / 80;
    l = j / 11;
    let month = j + 2 - 12 * l;
    let year = 100 * (n - 49) + i + l;

    (year, month as u32, day as u32)
}

/// Converts a VFP DateTime payload to a timestamp.
///
/// Returns `None` when both parts are zero (the field holds no value) or when
/// the day falls outside the range chrono can represent. Sub-second precision
/// is discarded.
///
/// # Example
/// ```rust
/// use dbf_csv::models::date_utils::julian_day_to_timestamp;
///
/// let ts = julian_day_to_timestamp(2_451_545, 0).unwrap();
/// assert_eq!(ts.to_string(), "2000-01-01 00:00:00");
/// assert!(julian_day_to_timestamp(0, 0).is_none());
/// ```
pub fn julian_day_to_timestamp(julian_day: i64, millisecond_of_day: i64) -> Option<NaiveDateTime> {
    if julian_day == 0 && millisecond_of_day == 0 {
        return None;
    }

    let (year, month, day) = julian_day_to_ymd(julian_day);
    let year = i32::try_from(year).ok()?;
    let midnight = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    let seconds = TimeDelta::try_seconds(millisecond_of_day / MILLISECONDS_PER_SECOND)?;

    midnight.checked_add_signed(seconds)
}

/// Last-modified date stored in a DBF header (year as offset from 1900)
pub fn header_date_to_naive_date(year_offset: u8, month: u8, day: u8) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        DBASE_HEADER_BASE_YEAR + i32::from(year_offset),
        u32::from(month),
        u32::from(day),
    )
}

/// Inverse of [`header_date_to_naive_date`]; years outside 1900..=2155 are clamped
pub fn naive_date_to_header_date(date: NaiveDate) -> (u8, u8, u8) {
    let offset = (date.year() - DBASE_HEADER_BASE_YEAR).clamp(0, i32::from(u8::MAX));
    (offset as u8, date.month() as u8, date.day() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_julian_day_epoch_2000() {
        assert_eq!(julian_day_to_ymd(2_451_545), (2000, 1, 1));
        let ts = julian_day_to_timestamp(2_451_545, 0).unwrap();
        assert_eq!(ts, NaiveDate::from_ymd_opt(2000, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_julian_day_known_dates() {
        // Gregorian reform, unix epoch, leap day
        assert_eq!(julian_day_to_ymd(2_299_161), (1582, 10, 15));
        assert_eq!(julian_day_to_ymd(2_440_588), (1970, 1, 1));
        assert_eq!(julian_day_to_ymd(2_451_604), (2000, 2, 29));
        assert_eq!(julian_day_to_ymd(2_451_605), (2000, 3, 1));
    }

    #[test]
    fn test_julian_day_with_time_of_day() {
        // 12:34:56.789 -> milliseconds dropped
        let millis = ((12 * 60 + 34) * 60 + 56) * 1_000 + 789;
        let ts = julian_day_to_timestamp(2_451_545, millis).unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "2000-01-01 12:34:56");
    }

    #[test]
    fn test_julian_day_zero_is_empty() {
        assert!(julian_day_to_timestamp(0, 0).is_none());
        // Day zero with a time part is still a value
        assert!(julian_day_to_timestamp(0, 1_000).is_some());
    }

    #[test]
    fn test_header_date_conversion() {
        let date = header_date_to_naive_date(125, 6, 15).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
        assert_eq!(naive_date_to_header_date(date), (125, 6, 15));
        assert!(header_date_to_naive_date(125, 13, 1).is_none());
        assert!(header_date_to_naive_date(0, 0, 0).is_none());
    }
}
