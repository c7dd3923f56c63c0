//! Textual timestamp parsers.
//!
//! [`TimeParser`] is the seam between the timestamp codec and format
//! detection. [`Rfc3339`] accepts only RFC 3339 text; [`DateParse`] accepts
//! the common notations seen in JSON payloads, query strings and logs.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::error::{MicrotimeError, Result};

/// Parses text into an instant.
///
/// Implementations return the instant converted to UTC without rounding;
/// callers normalize precision.
pub trait TimeParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<DateTime<Utc>>;
}

/// Strict RFC 3339 parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rfc3339;

impl TimeParser for Rfc3339 {
    fn parse(&self, text: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                debug!("microtime: rfc3339 rejected {:?}: {}", text, e);
                MicrotimeError::unparseable(text, e.to_string())
            })
    }
}

/// Controls [`DateParse`] behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    /// Offset from UTC, in seconds, for inputs that carry no zone.
    /// Default: 0.
    pub utc_offset_secs: i32,

    /// Reads `01/02/2006` as January 2nd rather than February 1st.
    /// Default: true.
    pub prefer_month_first: bool,

    /// Rejects slash dates whose day and month fields are both <= 12.
    /// Default: true.
    pub strict: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            utc_offset_secs: 0,
            prefer_month_first: true,
            strict: true,
        }
    }
}

impl ParseConfig {
    fn location(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or_else(|| {
            warn!(
                "microtime: utc_offset_secs {} out of range, using UTC",
                self.utc_offset_secs
            );
            Utc.fix()
        })
    }
}

// 2006-01-02, 2006-01-02T15:04, 2006-01-02 15:04:05.999999999-07:00
static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([0-9]{4})-([0-9]{1,2})-([0-9]{1,2})(?:[Tt ]([0-9]{1,2}):([0-9]{2})(?::([0-9]{2})(?:[.,]([0-9]+))?)?\s*(Z|z|UTC|[+-][0-9]{2}(?::?[0-9]{2})?)?)?$",
    )
    .unwrap()
});

// 2006/01/02, 2006/01/02 15:04:05.999
static SLASH_YMD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{4})/([0-9]{1,2})/([0-9]{1,2})(?:[Tt ]([0-9]{1,2}):([0-9]{2})(?::([0-9]{2})(?:\.([0-9]+))?)?)?$").unwrap()
});

// 01/02/2006, 02/01/2006 15:04:05
static SLASH_DMY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{1,2})/([0-9]{1,2})/([0-9]{4})(?:[Tt ]([0-9]{1,2}):([0-9]{2})(?::([0-9]{2})(?:\.([0-9]+))?)?)?$").unwrap()
});

/// Best-effort multi-format parser.
///
/// Accepts ISO 8601 dates and date-times with `T` or space separators,
/// optional seconds, any number of fractional digits and an optional zone
/// (`Z`, `UTC`, `+07:00`, `+0700`, `+07`); slash dates in year-first or
/// year-last order; and RFC 2822. Purely numeric strings are rejected.
#[derive(Debug, Clone, Copy)]
pub struct DateParse {
    location: FixedOffset,
    prefer_month_first: bool,
    strict: bool,
}

impl DateParse {
    pub fn new(cfg: ParseConfig) -> Self {
        Self {
            location: cfg.location(),
            prefer_month_first: cfg.prefer_month_first,
            strict: cfg.strict,
        }
    }

    fn parse_iso(&self, text: &str, caps: &Captures) -> Result<DateTime<Utc>> {
        let date: (i32, u32, u32) = (num(text, caps, 1)?, num(text, caps, 2)?, num(text, caps, 3)?);
        let offset = match caps.get(8) {
            Some(zone) => parse_zone(zone.as_str())
                .ok_or_else(|| MicrotimeError::unparseable(text, "zone out of range"))?,
            None => self.location,
        };
        build(text, date, caps, offset)
    }

    fn parse_slash_ymd(&self, text: &str, caps: &Captures) -> Result<DateTime<Utc>> {
        let date: (i32, u32, u32) = (num(text, caps, 1)?, num(text, caps, 2)?, num(text, caps, 3)?);
        build(text, date, caps, self.location)
    }

    fn parse_slash_dmy(&self, text: &str, caps: &Captures) -> Result<DateTime<Utc>> {
        let (a, b, year): (u32, u32, i32) = (num(text, caps, 1)?, num(text, caps, 2)?, num(text, caps, 3)?);
        let month_first = if a > 12 {
            false
        } else if b > 12 {
            true
        } else if self.strict {
            return Err(MicrotimeError::AmbiguousTimestamp(text.to_string()));
        } else {
            self.prefer_month_first
        };
        let date = if month_first { (year, a, b) } else { (year, b, a) };
        build(text, date, caps, self.location)
    }
}

impl Default for DateParse {
    fn default() -> Self {
        Self::new(ParseConfig::default())
    }
}

impl TimeParser for DateParse {
    fn parse(&self, text: &str) -> Result<DateTime<Utc>> {
        let input = text.trim();

        if let Some(caps) = ISO_DATE.captures(input) {
            trace!("microtime: {:?} matched iso8601 layout", text);
            return self.parse_iso(text, &caps);
        }
        if let Some(caps) = SLASH_YMD.captures(input) {
            trace!("microtime: {:?} matched yyyy/mm/dd layout", text);
            return self.parse_slash_ymd(text, &caps);
        }
        if let Some(caps) = SLASH_DMY.captures(input) {
            trace!("microtime: {:?} matched mm/dd/yyyy layout", text);
            return self.parse_slash_dmy(text, &caps);
        }
        if let Ok(t) = DateTime::parse_from_rfc2822(input) {
            trace!("microtime: {:?} matched rfc2822 layout", text);
            return Ok(t.with_timezone(&Utc));
        }

        debug!("microtime: no layout matched {:?}", text);
        Err(MicrotimeError::unparseable(text, "no layout matched"))
    }
}

/// Reads a numeric capture group. An absent optional group reads as zero.
fn num<T: std::str::FromStr + Default>(text: &str, caps: &Captures, i: usize) -> Result<T> {
    match caps.get(i) {
        Some(m) => m.as_str().parse().map_err(|_| {
            MicrotimeError::unparseable(text, format!("invalid number {:?}", m.as_str()))
        }),
        None => Ok(T::default()),
    }
}

/// Pads or truncates fractional digits to nanoseconds.
fn frac_nanos(text: &str, digits: &str) -> Result<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MicrotimeError::unparseable(
            text,
            format!("invalid fraction {:?}", digits),
        ));
    }
    let mut nanos = 0u32;
    for i in 0..9 {
        let d = digits.as_bytes().get(i).map_or(0, |b| u32::from(b - b'0'));
        nanos = nanos * 10 + d;
    }
    Ok(nanos)
}

fn parse_zone(zone: &str) -> Option<FixedOffset> {
    if matches!(zone, "Z" | "z" | "UTC") {
        return Some(Utc.fix());
    }
    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let digits: String = zone[1..].chars().filter(char::is_ascii_digit).collect();
    let hours: i32 = digits.get(..2)?.parse().ok()?;
    let mins: i32 = digits.get(2..).filter(|m| !m.is_empty()).map_or(Some(0), |m| m.parse().ok())?;
    if mins >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + mins * 60))
}

/// Assembles a date and the optional clock groups (4..=7) in `offset`.
fn build(text: &str, (year, month, day): (i32, u32, u32), caps: &Captures, offset: FixedOffset) -> Result<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| MicrotimeError::unparseable(text, "date out of range"))?;
    let nanos = match caps.get(7) {
        Some(m) => frac_nanos(text, m.as_str())?,
        None => 0,
    };
    let (hour, min, sec): (u32, u32, u32) = (num(text, caps, 4)?, num(text, caps, 5)?, num(text, caps, 6)?);
    let time = NaiveTime::from_hms_nano_opt(hour, min, sec, nanos)
        .ok_or_else(|| MicrotimeError::unparseable(text, "time out of range"))?;
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| MicrotimeError::unparseable(text, "instant out of range"))
}

#[cfg(test)]
mod parser_tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, nanos: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap() + chrono::TimeDelta::nanoseconds(nanos as i64)
    }

    #[test]
    fn test_date_parse_layouts() {
        let p = DateParse::default();
        let want = utc(2019, 1, 28, 16, 54, 58, 99_000_000);
        for input in [
            "2019-01-28T16:54:58.099Z",
            "2019-01-28T16:54:58.099000Z",
            "2019-01-28 16:54:58.099",
            "2019-01-28 16:54:58.099Z",
            "2019-01-28T16:54:58.099",
            "2019-01-28 16:54:58.09900000",
            "2019-01-28T18:54:58.099+02:00",
            "2019-01-28T11:54:58.099-0500",
            "2019-01-28 16:54:58.099 UTC",
            "2019/01/28 16:54:58.099",
            "01/28/2019 16:54:58.099",
            "28/01/2019 16:54:58.099",
        ] {
            assert_eq!(p.parse(input).unwrap(), want, "input {:?}", input);
        }
    }

    #[test]
    fn test_date_parse_short_forms() {
        let p = DateParse::default();
        assert_eq!(p.parse("2019-01-28").unwrap(), utc(2019, 1, 28, 0, 0, 0, 0));
        assert_eq!(p.parse("2019-01-28 16:54").unwrap(), utc(2019, 1, 28, 16, 54, 0, 0));
        assert_eq!(
            p.parse("Mon, 28 Jan 2019 16:54:58 +0000").unwrap(),
            utc(2019, 1, 28, 16, 54, 58, 0)
        );
    }

    #[test]
    fn test_date_parse_long_fraction_truncates() {
        let p = DateParse::default();
        assert_eq!(
            p.parse("2019-01-28T16:54:58.1234567891Z").unwrap(),
            utc(2019, 1, 28, 16, 54, 58, 123_456_789)
        );
    }

    #[test]
    fn test_date_parse_rejects_numeric() {
        let p = DateParse::default();
        for input in ["20190128165458099000", "-20190128165458099", "1548694498"] {
            let err = p.parse(input).unwrap_err();
            assert_eq!(err.to_string(), format!("Could not find format for {:?}", input));
        }
    }

    #[test]
    fn test_date_parse_out_of_range() {
        let p = DateParse::default();
        assert!(p.parse("2019-02-30").is_err());
        assert!(p.parse("2019-01-28T25:00:00Z").is_err());
        assert!(p.parse("2019-01-28T10:00:00+25:00").is_err());
    }

    #[test]
    fn test_date_parse_non_ascii_digits() {
        let p = DateParse::default();
        for input in [
            "2019-01-28T16:54:58.٩٩٩٩٩Z",
            "٢٠١٩-01-28T16:54:58Z",
            "2019-01-28T١٦:54:58Z",
            "2019/01/28 16:54:58.٠٩٩",
            "01/28/٢٠١٩",
            "2019-01-28T16:54:58+٠٢:00",
        ] {
            let err = p.parse(input).unwrap_err();
            assert!(
                matches!(err, MicrotimeError::UnparseableTimestamp { .. }),
                "input {:?}: {:?}",
                input,
                err
            );
        }
    }

    #[test]
    fn test_date_parse_edge_inputs() {
        let p = DateParse::default();
        let err = p.parse("").unwrap_err();
        assert_eq!(err.to_string(), r#"Could not find format for """#);
        assert!(p.parse("   ").is_err());

        assert_eq!(
            p.parse("2019-01-28 16:54:58 +02:00 ").unwrap(),
            utc(2019, 1, 28, 14, 54, 58, 0)
        );
        assert_eq!(
            p.parse(" 2019-01-28T16:54:58.5   Z").unwrap(),
            utc(2019, 1, 28, 16, 54, 58, 500_000_000)
        );
    }

    #[test]
    fn test_frac_nanos() {
        assert_eq!(frac_nanos("t", "099").unwrap(), 99_000_000);
        assert_eq!(frac_nanos("t", "1234567891").unwrap(), 123_456_789);
        assert!(frac_nanos("t", "٩٩").is_err());
        assert!(frac_nanos("t", "").is_err());
    }

    #[test]
    fn test_date_parse_ambiguous() {
        let strict = DateParse::default();
        let err = strict.parse("02/03/2019").unwrap_err();
        assert_eq!(err, MicrotimeError::AmbiguousTimestamp("02/03/2019".into()));

        let month_first = DateParse::new(ParseConfig {
            strict: false,
            ..ParseConfig::default()
        });
        assert_eq!(month_first.parse("02/03/2019").unwrap(), utc(2019, 2, 3, 0, 0, 0, 0));

        let day_first = DateParse::new(ParseConfig {
            strict: false,
            prefer_month_first: false,
            ..ParseConfig::default()
        });
        assert_eq!(day_first.parse("02/03/2019").unwrap(), utc(2019, 3, 2, 0, 0, 0, 0));
    }

    #[test]
    fn test_date_parse_location() {
        let p = DateParse::new(ParseConfig {
            utc_offset_secs: 2 * 3600,
            ..ParseConfig::default()
        });
        assert_eq!(p.parse("1987-02-04 16:52:19").unwrap(), utc(1987, 2, 4, 14, 52, 19, 0));
        // An explicit zone wins over the configured location.
        assert_eq!(p.parse("1987-02-04 16:52:19Z").unwrap(), utc(1987, 2, 4, 16, 52, 19, 0));
    }

    #[test]
    fn test_rfc3339_strict() {
        let p = Rfc3339;
        assert_eq!(
            p.parse("1987-02-04T16:52:19.00033Z").unwrap(),
            utc(1987, 2, 4, 16, 52, 19, 330_000)
        );
        assert_eq!(
            p.parse("1987-02-04T18:52:19+02:00").unwrap(),
            utc(1987, 2, 4, 16, 52, 19, 0)
        );
        assert!(p.parse("2019-01-28T16:54:58.099").is_err());
        assert!(p.parse("01/28/2019 16:54:58").is_err());
    }
}
