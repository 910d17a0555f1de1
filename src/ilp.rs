//! Line-protocol batch builder for the time-series telemetry sink.
//!
//! Each record becomes one line of the form
//! `measurement,tag=value field=value <unixNanos>\n`. Special characters
//! (`,`, `"`, `=`, newline, carriage return, backslash) are
//! backslash-escaped everywhere; spaces are additionally escaped in tag
//! values but never in field names. Integer fields carry an `i` suffix,
//! unsigned integers `u`, timestamps `t` (serialised as microseconds since
//! the UNIX epoch), while floats and booleans are bare and strings are
//! double-quoted.

use chrono::{DateTime, Utc};

fn clean(value: &str, escape_space: bool) -> String {
    let mut out = String::with_capacity(value.len() + 16);
    for ch in value.chars() {
        match ch {
            ',' => out.push_str("\\,"),
            '"' => out.push_str("\\\""),
            '=' => out.push_str("\\="),
            '\n' => out.push_str("\\\n"),
            '\r' => out.push_str("\\\r"),
            '\\' => out.push_str("\\\\"),
            ' ' if escape_space => out.push_str("\\ "),
            _ => out.push(ch),
        }
    }
    out
}

#[derive(Debug)]
struct Record {
    name: String,
    tags: String,
    fields: String,
    timestamp: i64,
}

impl Record {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            tags: String::new(),
            fields: String::new(),
            timestamp: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        }
    }
}

/// Builder composing a batch of records for transmission over ILP.
///
/// Records are started, populated, and ended in sequence; `finish`
/// yields the batch as one newline-terminated string per record. The
/// builder is consumed by `finish` and should not be reused.
#[derive(Debug, Default)]
pub struct Builder {
    lines: String,
    record: Option<Record>,
}

impl Builder {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Start a new record for the named timeseries.
    #[must_use]
    pub fn start_record(mut self, name: &str) -> Self {
        self.record = Some(Record::new(name));
        self
    }

    fn push_tag(&mut self, key: &str, value: &str) {
        if let Some(record) = self.record.as_mut() {
            if !record.tags.is_empty() {
                record.tags.push(',');
            }
            record.tags.push_str(key);
            record.tags.push('=');
            record.tags.push_str(&clean(value, true));
        }
    }

    fn push_field(&mut self, key: &str, value: &str) {
        if let Some(record) = self.record.as_mut() {
            if !record.fields.is_empty() {
                record.fields.push(',');
            }
            record.fields.push_str(key);
            record.fields.push('=');
            record.fields.push_str(value);
        }
    }

    /// Add a tag to the current record.
    #[must_use]
    pub fn add_tag(mut self, key: &str, value: &str) -> Self {
        self.push_tag(key, value);
        self
    }

    /// Add a boolean field to the current record.
    #[must_use]
    pub fn add_bool(mut self, key: &str, value: bool) -> Self {
        self.push_field(key, &format!("{value}"));
        self
    }

    /// Add a signed integer field to the current record.
    #[must_use]
    pub fn add_i64(mut self, key: &str, value: i64) -> Self {
        self.push_field(key, &format!("{value}i"));
        self
    }

    /// Add an unsigned integer field to the current record.
    #[must_use]
    pub fn add_u64(mut self, key: &str, value: u64) -> Self {
        self.push_field(key, &format!("{value}u"));
        self
    }

    /// Add a floating point field to the current record.
    #[must_use]
    pub fn add_f64(mut self, key: &str, value: f64) -> Self {
        self.push_field(key, &format!("{value}"));
        self
    }

    /// Add a string field to the current record.
    #[must_use]
    pub fn add_string(mut self, key: &str, value: &str) -> Self {
        self.push_field(key, &format!("\"{}\"", clean(value, false)));
        self
    }

    /// Add a date-time field, serialised as microseconds since the epoch.
    #[must_use]
    pub fn add_datetime(mut self, key: &str, value: &DateTime<Utc>) -> Self {
        self.push_field(key, &format!("{}t", value.timestamp_micros()));
        self
    }

    /// Set the record timestamp in nanoseconds since the epoch.
    #[must_use]
    pub fn timestamp(mut self, nanos: i64) -> Self {
        if let Some(record) = self.record.as_mut() {
            record.timestamp = nanos;
        }
        self
    }

    /// End the current record, appending its line to the batch.
    #[must_use]
    pub fn end_record(mut self) -> Self {
        if let Some(record) = self.record.take() {
            self.lines.push_str(&record.name);
            if !record.tags.is_empty() {
                self.lines.push(',');
                self.lines.push_str(&record.tags);
            }
            self.lines.push(' ');
            self.lines.push_str(&record.fields);
            self.lines.push(' ');
            self.lines.push_str(&record.timestamp.to_string());
            self.lines.push('\n');
        }
        self
    }

    /// Produce the batch payload.
    #[must_use]
    pub fn finish(self) -> String { self.lines }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn builds_generic_example() {
        let payload = Builder::new()
            .start_record("readings")
            .add_tag("city", "London")
            .add_tag("make", "Omron")
            .add_f64("temperature", 23.5)
            .add_f64("humidity", 0.343)
            .timestamp(1_465_839_830_100_400_000)
            .end_record()
            .start_record("readings")
            .add_tag("city", "Bristol")
            .add_tag("make", "Honeywell")
            .add_f64("temperature", 23.2)
            .add_f64("humidity", 0.443)
            .timestamp(1_465_839_830_100_600_000)
            .end_record()
            .finish();

        let expected = "readings,city=London,make=Omron temperature=23.5,humidity=0.343 1465839830100400000\n\
                        readings,city=Bristol,make=Honeywell temperature=23.2,humidity=0.443 1465839830100600000\n";
        assert_eq!(payload, expected);
    }

    #[rstest]
    fn suffixes_integer_fields() {
        let payload = Builder::new()
            .start_record("temps")
            .add_tag("device", "cpu")
            .add_tag("location", "south")
            .add_i64("value", 96)
            .timestamp(1_638_202_821_000_000_000)
            .end_record()
            .finish();
        assert_eq!(payload, "temps,device=cpu,location=south value=96i 1638202821000000000\n");
    }

    #[rstest]
    fn quotes_and_escapes_strings() {
        let payload = Builder::new()
            .start_record("trade")
            .add_tag("ticker", "BTCUSD")
            .add_string("description", "this is a \"rare\" value")
            .add_string("user", "John")
            .timestamp(1_638_202_821_000_000_000)
            .end_record()
            .finish();
        assert_eq!(
            payload,
            "trade,ticker=BTCUSD description=\"this is a \\\"rare\\\" value\",user=\"John\" 1638202821000000000\n"
        );
    }

    #[rstest]
    fn escapes_spaces_in_tag_values() {
        let payload = Builder::new()
            .start_record("apm")
            .add_tag("application", "unit test")
            .add_u64("count", 1)
            .timestamp(42)
            .end_record()
            .finish();
        assert_eq!(payload, "apm,application=unit\\ test count=1u 42\n");
    }

    #[rstest]
    fn serialises_datetime_fields_as_micros() {
        let instant = crate::dates::from_micros(1_638_202_821_123_456);
        let payload = Builder::new()
            .start_record("apm")
            .add_tag("application", "svc")
            .add_datetime("end_timestamp", &instant)
            .timestamp(7)
            .end_record()
            .finish();
        assert_eq!(payload, "apm,application=svc end_timestamp=1638202821123456t 7\n");
    }

    #[rstest]
    #[case("a,b", "a\\,b")]
    #[case("a=b", "a\\=b")]
    #[case("a\\b", "a\\\\b")]
    #[case("a\rb", "a\\\rb")]
    #[case("a\nb", "a\\\nb")]
    fn escapes_special_characters(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(clean(input, false), expected);
    }

    fn unescape(value: &str) -> String {
        let mut out = String::new();
        let mut chars = value.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(ch);
            }
        }
        out
    }

    proptest! {
        // Escaping round-trips under the inverse rules.
        #[test]
        fn escaping_is_reversible(value in "\\PC{0,48}") {
            prop_assert_eq!(unescape(&clean(&value, true)), value.clone());
            prop_assert_eq!(unescape(&clean(&value, false)), value);
        }
    }
}
