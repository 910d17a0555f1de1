//! ISO-8601 date-time parsing and formatting at microsecond precision.
//!
//! The wire protocol exchanges timestamps as ISO-8601 strings. The parser
//! accepts the combinations the deployed clients produce:
//!
//! * `2021-02-11` (date only, midnight UTC)
//! * `2021-02-11T11:17:43Z`
//! * `2021-02-11T11:17:43-0600` / `2021-02-11T11:17:43+05:30`
//! * fractional seconds with exactly two, three, or six digits, e.g.
//!   `…T11:17:43.12Z`, `…T11:17:43.123+0100`, `…T11:17:43.123456-05:00`
//!
//! A time without a zone designator is rejected, as are non-digit
//! separators and out-of-range zone components.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use thiserror::Error;

/// Errors produced while parsing an ISO-8601 string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateParseError {
    /// Input shorter than the minimal `yyyy-MM-dd` form.
    #[error("invalid date format")]
    TooShort,
    /// Input longer than a date but shorter than a full date-time.
    #[error("invalid datetime format")]
    Truncated,
    /// A separator character is not the one the grammar requires.
    #[error("invalid datetime separator")]
    Separator,
    /// A numeric component contains a non-digit.
    #[error("invalid datetime {0}")]
    Digit(&'static str),
    /// A component is out of its valid range.
    #[error("out of range datetime {0}")]
    OutOfRange(&'static str),
    /// Fractional seconds with an unsupported number of digits.
    #[error("invalid datetime fraction")]
    Fraction,
    /// Missing or malformed zone designator.
    #[error("invalid datetime zone")]
    Zone,
}

fn digits(bytes: &[u8], start: usize, len: usize, what: &'static str) -> Result<u32, DateParseError> {
    let end = start + len;
    let slice = bytes.get(start..end).ok_or(DateParseError::Truncated)?;
    let mut value: u32 = 0;
    for byte in slice {
        if !byte.is_ascii_digit() {
            return Err(DateParseError::Digit(what));
        }
        value = value * 10 + u32::from(byte - b'0');
    }
    Ok(value)
}

fn expect_byte(bytes: &[u8], index: usize, expected: u8) -> Result<(), DateParseError> {
    match bytes.get(index) {
        Some(byte) if *byte == expected => Ok(()),
        _ => Err(DateParseError::Separator),
    }
}

/// Parse the `±HH:MM` / `±HHMM` zone suffix into an offset in seconds.
fn zone_offset(bytes: &[u8], start: usize) -> Result<i64, DateParseError> {
    let sign = match bytes.get(start) {
        Some(b'+') => 1_i64,
        Some(b'-') => -1_i64,
        _ => return Err(DateParseError::Zone),
    };
    let rest = bytes.len() - start - 1;
    let (hour, minute) = match rest {
        4 => (
            digits(bytes, start + 1, 2, "zone hour")?,
            digits(bytes, start + 3, 2, "zone minute")?,
        ),
        5 => {
            if bytes.get(start + 3) != Some(&b':') {
                return Err(DateParseError::Zone);
            }
            (
                digits(bytes, start + 1, 2, "zone hour")?,
                digits(bytes, start + 4, 2, "zone minute")?,
            )
        }
        _ => return Err(DateParseError::Zone),
    };
    if hour > 23 {
        return Err(DateParseError::OutOfRange("zone hour"));
    }
    if minute > 59 {
        return Err(DateParseError::OutOfRange("zone minute"));
    }
    Ok(sign * (i64::from(hour) * 3600 + i64::from(minute) * 60))
}

/// Parse an ISO-8601 date or date-time into a UTC instant.
///
/// # Errors
/// Returns a [`DateParseError`] describing the first offending component.
#[must_use = "handle the result"]
pub fn parse_iso8601(input: &str) -> Result<DateTime<Utc>, DateParseError> {
    let bytes = input.as_bytes();
    if bytes.len() < 10 {
        return Err(DateParseError::TooShort);
    }

    let year = digits(bytes, 0, 4, "year")?;
    expect_byte(bytes, 4, b'-')?;
    let month = digits(bytes, 5, 2, "month")?;
    expect_byte(bytes, 7, b'-')?;
    let day = digits(bytes, 8, 2, "day")?;
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(year).map_err(|_| DateParseError::OutOfRange("year"))?,
        month,
        day,
    )
    .ok_or(DateParseError::OutOfRange("day"))?;

    if bytes.len() == 10 {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    if bytes.len() < 20 {
        return Err(DateParseError::Truncated);
    }
    if bytes[10] != b'T' {
        return Err(DateParseError::Separator);
    }

    let hour = digits(bytes, 11, 2, "hour")?;
    expect_byte(bytes, 13, b':')?;
    let minute = digits(bytes, 14, 2, "minute")?;
    expect_byte(bytes, 16, b':')?;
    let second = digits(bytes, 17, 2, "second")?;

    let mut position = 19;
    let mut micros = 0_u32;
    if bytes.get(position) == Some(&b'.') {
        let mut count = 0;
        while bytes
            .get(position + 1 + count)
            .is_some_and(u8::is_ascii_digit)
        {
            count += 1;
        }
        micros = match count {
            2 => digits(bytes, position + 1, 2, "fraction")? * 10_000,
            3 => digits(bytes, position + 1, 3, "fraction")? * 1_000,
            6 => digits(bytes, position + 1, 6, "fraction")?,
            _ => return Err(DateParseError::Fraction),
        };
        position += 1 + count;
    }

    let offset = match bytes.get(position) {
        Some(b'Z') => {
            if position + 1 != bytes.len() {
                return Err(DateParseError::Zone);
            }
            0
        }
        Some(b'+' | b'-') => zone_offset(bytes, position)?,
        _ => return Err(DateParseError::Zone),
    };

    let time = NaiveTime::from_hms_micro_opt(hour, minute, second, micros)
        .ok_or(DateParseError::OutOfRange("time"))?;
    Ok(Utc.from_utc_datetime(&date.and_time(time)) - Duration::seconds(offset))
}

/// Microseconds since the UNIX epoch, or zero when the input is invalid.
#[must_use]
pub fn micro_seconds(input: &str) -> i64 {
    parse_iso8601(input).map_or(0, |instant| instant.timestamp_micros())
}

/// Rebuild an instant from microseconds since the UNIX epoch.
///
/// Out-of-range values saturate to the epoch.
#[must_use]
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(micros)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Format an instant as ISO-8601 with microsecond precision.
#[must_use]
pub fn iso_date_micros(instant: &DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Format an instant as ISO-8601 with millisecond precision.
#[must_use]
pub fn iso_date_millis(instant: &DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::utc_long("2015-05-04T02:51:59+00:00", 1_430_707_919_000_000)]
    #[case::utc_medium("2015-05-04T02:51:59+0000", 1_430_707_919_000_000)]
    #[case::utc_short("2015-05-04T02:51:59Z", 1_430_707_919_000_000)]
    #[case::plus_one_long("2015-05-04T02:51:59+01:00", 1_430_704_319_000_000)]
    #[case::plus_one_medium("2015-05-04T02:51:59+0100", 1_430_704_319_000_000)]
    #[case::minus_one_long("2015-05-04T02:51:59-01:00", 1_430_711_519_000_000)]
    #[case::millis_utc("2015-05-04T02:51:59.123+00:00", 1_430_707_919_123_000)]
    #[case::millis_medium("2015-05-04T02:51:59.456+0000", 1_430_707_919_456_000)]
    #[case::millis_short("2015-05-04T02:51:59.789Z", 1_430_707_919_789_000)]
    #[case::millis_plus_one("2015-05-04T02:51:59.123+01:00", 1_430_704_319_123_000)]
    #[case::millis_minus_one("2015-05-04T02:51:59.238-0100", 1_430_711_519_238_000)]
    #[case::micros_utc("2015-05-04T02:51:59.123456+00:00", 1_430_707_919_123_456)]
    #[case::micros_medium("2015-05-04T02:51:59.456789+0000", 1_430_707_919_456_789)]
    #[case::micros_short("2015-05-04T02:51:59.789123Z", 1_430_707_919_789_123)]
    #[case::micros_plus_one("2015-05-04T02:51:59.123789+01:00", 1_430_704_319_123_789)]
    #[case::micros_minus_one("2015-05-04T02:51:59.238971-0100", 1_430_711_519_238_971)]
    #[case::day_only("2015-05-04", 1_430_697_600_000_000)]
    #[case::short_millis("2020-10-18T15:01:59.31Z", 1_603_033_319_310_000)]
    #[case::short_millis_zone("2015-05-04T02:51:59.12+05:30", 1_430_688_119_120_000)]
    #[case::y2k("2000-01-01T00:00:00+00:00", 946_684_800_000_000)]
    fn parses_known_times(#[case] input: &str, #[case] expected: i64) {
        let parsed = parse_iso8601(input).expect("must parse");
        assert_eq!(parsed.timestamp_micros(), expected);
        assert_eq!(micro_seconds(input), expected);
    }

    #[rstest]
    #[case::shorter_than_day("2015-05")]
    #[case::invalid_time_part("2015-05-04T02")]
    #[case::space_instead_of_t("2015-05-04 02:51:59.238971-0100")]
    #[case::missing_zone("2015-05-04T02:51:59")]
    #[case::invalid_zone_code("2015-05-04T02:51:59X")]
    #[case::invalid_zone_hour("2015-05-04T02:51:59+24:30")]
    #[case::invalid_zone_minute("2015-05-04T02:51:59+05:60")]
    #[case::one_digit_fraction("2015-05-04T02:51:59.1+05:30")]
    #[case::four_digit_fraction("2015-05-04T02:51:59.1234+05:30")]
    #[case::non_digit_month("2015-0a-04")]
    #[case::bad_day("2015-02-30")]
    #[case::trailing_garbage("2015-05-04T02:51:59Zabc")]
    fn rejects_invalid_input(#[case] input: &str) {
        assert!(parse_iso8601(input).is_err(), "{input} must not parse");
        assert_eq!(micro_seconds(input), 0);
    }

    #[rstest]
    fn converts_offsets_to_utc() {
        let parsed = parse_iso8601("2023-05-18T09:00:00.000-05:00").expect("must parse");
        assert_eq!(iso_date_millis(&parsed), "2023-05-18T14:00:00.000Z");
    }

    #[rstest]
    fn formats_micros_and_millis() {
        let instant = from_micros(1_430_707_919_123_456);
        assert_eq!(iso_date_micros(&instant), "2015-05-04T02:51:59.123456Z");
        assert_eq!(iso_date_millis(&instant), "2015-05-04T02:51:59.123Z");
    }

    proptest! {
        // parse(format(t)) == t at microsecond precision.
        #[test]
        fn round_trips_microseconds(micros in -30_610_224_000_000_000_i64..=32_503_680_000_000_000) {
            let instant = from_micros(micros);
            let formatted = iso_date_micros(&instant);
            let parsed = parse_iso8601(&formatted).expect("formatted output must parse");
            prop_assert_eq!(parsed.timestamp_micros(), micros);
        }
    }
}
