//! Microsecond UTC timestamp with null-for-zero encodings.

use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::cache::{CacheArg, CacheScan, CacheValue};
use crate::duration::{Duration, MICROSECOND};
use crate::error::{MicrotimeError, Result};
use crate::parser::{DateParse, Rfc3339, TimeParser};
use crate::sql::{SqlScanner, SqlValue, SqlValuer};

/// Unix seconds of 0001-01-01T00:00:00Z.
const ZERO_UNIX_SECS: i64 = -62_135_596_800;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// A point in time, or the zero value.
///
/// The zero value (`Timestamp::default()`) stands for an absent time and is
/// written as `null`, empty bytes or SQL NULL. Valid timestamps are written
/// in UTC, rounded to the microsecond, e.g. `"1987-02-04T16:52:19.00033Z"`.
///
/// Ordering follows [`Timestamp::instant`], so the zero value sorts as
/// 0001-01-01T00:00:00Z, just before an explicit timestamp at that instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp(Option<DateTime<Utc>>);

impl Timestamp {
    /// Creates a Timestamp from a date-time in any zone.
    pub fn new<Tz: TimeZone>(dt: DateTime<Tz>) -> Self {
        Self(Some(dt.with_timezone(&Utc)))
    }

    /// Returns the zero value.
    pub const fn zero() -> Self {
        Self(None)
    }

    /// Returns the current time. Precision is normalized when encoding.
    pub fn now() -> Self {
        Self(Some(Utc::now()))
    }

    /// Returns the underlying instant, or None for the zero value.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    /// Returns the instant, reading the zero value as 0001-01-01T00:00:00Z.
    pub fn instant(&self) -> DateTime<Utc> {
        self.0.unwrap_or_else(zero_instant)
    }

    /// Reports whether this is the zero value.
    pub fn is_zero(&self) -> bool {
        self.0.is_none()
    }

    /// Reports whether this time is before the other.
    pub fn before(&self, other: &Self) -> bool {
        self.instant() < other.instant()
    }

    /// Reports whether this time is after the other.
    pub fn after(&self, other: &Self) -> bool {
        self.instant() > other.instant()
    }

    /// Returns the elapsed time `self - other`, saturating at the Duration range.
    pub fn sub(&self, other: &Self) -> Duration {
        Duration::from(self.instant().signed_duration_since(other.instant()))
    }

    /// Returns the time plus `d`, or None when the result is out of range.
    pub fn checked_add(&self, d: Duration) -> Option<Self> {
        self.instant()
            .checked_add_signed(TimeDelta::from(d))
            .map(|t| Self(Some(t)))
    }

    /// Returns the Unix seconds of the instant.
    pub fn unix_secs(&self) -> i64 {
        self.instant().timestamp()
    }

    /// Rounds to a multiple of `m` since the zero instant, halfway values up.
    ///
    /// The zero value and `m <= 0` are returned unchanged.
    pub fn round(&self, m: Duration) -> Self {
        self.quantize(m, true)
    }

    /// Rounds down to a multiple of `m` since the zero instant.
    pub fn truncate(&self, m: Duration) -> Self {
        self.quantize(m, false)
    }

    fn quantize(&self, m: Duration, round: bool) -> Self {
        let (Some(t), true) = (self.0, m.as_nanos() > 0) else {
            return *self;
        };
        let m = i128::from(m.as_nanos());
        let since = i128::from(t.timestamp() - ZERO_UNIX_SECS) * NANOS_PER_SEC
            + i128::from(t.timestamp_subsec_nanos());
        let r = since.rem_euclid(m);
        let down = since - r;
        if round && r * 2 >= m {
            // Rounding past the last representable instant falls back to truncation.
            if let Some(t) = from_nanos_since_zero(down + m) {
                return Self(Some(t));
            }
        }
        match from_nanos_since_zero(down) {
            Some(t) => Self(Some(t)),
            None => *self,
        }
    }

    /// Returns the canonical form: UTC, rounded to the microsecond.
    pub fn canonical(&self) -> Self {
        self.round(MICROSECOND)
    }

    /// Parses strict RFC 3339 text.
    pub fn from_display_string(text: &str) -> Result<Self> {
        Self::from_free_text_with(text, &Rfc3339)
    }

    /// Parses any notation [`DateParse`] recognizes.
    pub fn from_free_text(text: &str) -> Result<Self> {
        Self::from_free_text_with(text, &DateParse::default())
    }

    /// Parses text with the given parser and canonicalizes the result.
    pub fn from_free_text_with(text: &str, parser: &dyn TimeParser) -> Result<Self> {
        Ok(Self(Some(parser.parse(text)?)).canonical())
    }

    /// Encodes as JSON: `null` for zero, otherwise the quoted display string.
    pub fn to_json(&self) -> String {
        if self.is_zero() {
            return "null".to_string();
        }
        format!("\"{}\"", self)
    }

    /// Decodes a JSON payload into `self`.
    ///
    /// `null` leaves `self` untouched. Any other payload must be a JSON
    /// string holding a timestamp [`DateParse`] recognizes.
    pub fn unmarshal_json(&mut self, data: &[u8]) -> Result<()> {
        let text: Option<String> = serde_json::from_slice(data)
            .map_err(|e| MicrotimeError::MalformedJson(format!("invalid syntax: {}", e)))?;
        match text {
            Some(text) => {
                *self = Self::from_free_text(&text)?;
            }
            None => tracing::trace!("microtime: null timestamp, keeping {}", self),
        }
        Ok(())
    }

    /// Decodes a request parameter into `self`.
    ///
    /// Quoted input is read as JSON; bare input is quoted first.
    pub fn unmarshal_param(&mut self, data: &str) -> Result<()> {
        if serde_json::from_str::<String>(data).is_ok() {
            return self.unmarshal_json(data.as_bytes());
        }
        let quoted = serde_json::Value::String(data.to_string()).to_string();
        self.unmarshal_json(quoted.as_bytes())
    }

    /// Encodes as binary text: empty for zero, otherwise the display string.
    pub fn to_binary_text(&self) -> Vec<u8> {
        if self.is_zero() {
            return Vec::new();
        }
        self.to_string().into_bytes()
    }

    /// Decodes binary text into `self`. Empty input leaves `self` untouched.
    pub fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let text = std::str::from_utf8(data).map_err(|e| {
            MicrotimeError::unparseable(&String::from_utf8_lossy(data), e.to_string())
        })?;
        *self = Self::from_free_text(text)?;
        Ok(())
    }

    /// Returns decimal Unix seconds. Sub-second precision is dropped.
    pub fn to_cache_token(&self) -> String {
        self.unix_secs().to_string()
    }

    /// Parses decimal Unix seconds written by [`Timestamp::to_cache_token`].
    pub fn from_cache_token(token: &str) -> Result<Self> {
        token
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|t| Self(Some(t)))
            .ok_or_else(|| MicrotimeError::InvalidTimestamp(token.to_string()))
    }
}

fn from_nanos_since_zero(q: i128) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(q.div_euclid(NANOS_PER_SEC)).ok()?;
    let nanos = q.rem_euclid(NANOS_PER_SEC) as u32;
    DateTime::from_timestamp(secs.checked_add(ZERO_UNIX_SECS)?, nanos)
}

fn zero_instant() -> DateTime<Utc> {
    DateTime::from_timestamp(ZERO_UNIX_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.canonical().instant();
        write!(f, "{}", t.format("%Y-%m-%dT%H:%M:%S"))?;
        let nanos = t.timestamp_subsec_nanos();
        if nanos != 0 {
            let digits = format!("{:09}", nanos);
            write!(f, ".{}", digits.trim_end_matches('0'))?;
        }
        f.write_str("Z")
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant()
            .cmp(&other.instant())
            .then_with(|| self.0.is_some().cmp(&other.0.is_some()))
    }
}

impl FromStr for Timestamp {
    type Err = MicrotimeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_display_string(s)
    }
}

impl CacheArg for Timestamp {
    fn cache_arg(&self) -> String {
        self.to_cache_token()
    }
}

impl CacheScan for Timestamp {
    fn scan_cache(&mut self, src: &CacheValue) -> Result<()> {
        if src.is_nil() {
            return Ok(());
        }
        let token = src
            .as_text()
            .ok_or_else(|| MicrotimeError::InvalidTimestamp(src.to_string()))?;
        *self = Self::from_cache_token(&token)?;
        Ok(())
    }
}

impl SqlValuer for Timestamp {
    fn sql_value(&self) -> SqlValue {
        match self.canonical().0 {
            Some(t) => SqlValue::Timestamp(t.fixed_offset()),
            None => SqlValue::Null,
        }
    }
}

impl SqlScanner for Timestamp {
    fn scan_sql(&mut self, src: &SqlValue) -> Result<()> {
        match src {
            SqlValue::Null => Ok(()),
            SqlValue::Timestamp(t) => {
                *self = Self::new(*t).canonical();
                Ok(())
            }
            other => Err(MicrotimeError::UnsupportedSourceType {
                value: other.to_string(),
                type_name: other.type_name(),
            }),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.is_zero() {
            return serializer.serialize_none();
        }
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TimestampVisitor;

        impl<'de> serde::de::Visitor<'de> for TimestampVisitor {
            type Value = Timestamp;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a timestamp string (e.g., '2006-01-02T15:04:05Z') or null")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                Timestamp::from_free_text(v).map_err(serde::de::Error::custom)
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> std::result::Result<Self::Value, D::Error> {
                d.deserialize_str(TimestampVisitor)
            }

            fn visit_none<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(Timestamp::default())
            }

            fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(Timestamp::default())
            }
        }

        deserializer.deserialize_option(TimestampVisitor)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(Some(dt))
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self::new(dt)
    }
}

impl From<Timestamp> for Option<DateTime<Utc>> {
    fn from(t: Timestamp) -> Self {
        t.0
    }
}
