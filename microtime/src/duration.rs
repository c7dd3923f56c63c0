//! Nanosecond duration with display-string JSON and integer cache encodings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;
use std::time::Duration as StdDuration;

use crate::cache::{CacheArg, CacheScan, CacheValue};
use crate::error::{MicrotimeError, Result};

/// A signed count of nanoseconds.
///
/// On JSON and binary surfaces the value is written as a display string such
/// as `"34h17m36.789101112s"`, with the zero duration written as `null` or
/// empty bytes. The cache surface uses the plain decimal nanosecond count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(i64);

pub const NANOSECOND: Duration = Duration(1);
pub const MICROSECOND: Duration = Duration(1_000);
pub const MILLISECOND: Duration = Duration(1_000_000);
pub const SECOND: Duration = Duration(1_000_000_000);
pub const MINUTE: Duration = Duration(60 * 1_000_000_000);
pub const HOUR: Duration = Duration(60 * 60 * 1_000_000_000);

impl Duration {
    pub const MIN: Duration = Duration(i64::MIN);
    pub const MAX: Duration = Duration(i64::MAX);

    /// Creates a Duration from nanoseconds.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Creates a Duration from whole seconds, saturating at the i64 range.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(SECOND.0))
    }

    /// Returns the duration as nanoseconds.
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Returns the duration as seconds (floating point).
    pub fn as_secs_f64(&self) -> f64 {
        let secs = self.0 / SECOND.0;
        let nanos = self.0 % SECOND.0;
        secs as f64 + nanos as f64 / 1e9
    }

    /// Returns true if this duration is zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns the absolute value, with `MIN` mapping to `MAX`.
    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// Rounds to the nearest multiple of `m`, halfway values away from zero.
    ///
    /// Returns `self` unchanged when `m <= 0`. Saturates at `MIN`/`MAX` when
    /// the rounded value would overflow.
    pub fn round(self, m: Duration) -> Duration {
        if m.0 <= 0 {
            return self;
        }
        let (d, m) = (self.0, m.0);
        let r = (d % m).abs();
        if d < 0 {
            if less_than_half(r, m) {
                return Duration(d + r);
            }
            return Duration(d.checked_sub(m - r).unwrap_or(i64::MIN));
        }
        if less_than_half(r, m) {
            return Duration(d - r);
        }
        Duration(d.checked_add(m - r).unwrap_or(i64::MAX))
    }

    /// Rounds toward zero to a multiple of `m`. No-op when `m <= 0`.
    pub fn truncate(self, m: Duration) -> Duration {
        if m.0 <= 0 {
            return self;
        }
        Duration(self.0 - self.0 % m.0)
    }

    /// Returns the decimal nanosecond count used on the cache surface.
    pub fn to_cache_token(&self) -> String {
        self.0.to_string()
    }

    /// Parses a decimal nanosecond count written by [`Duration::to_cache_token`].
    pub fn from_cache_token(token: &str) -> Result<Self> {
        token
            .parse::<i64>()
            .map(Self)
            .map_err(|_| MicrotimeError::InvalidDuration(format!("cache scan: invalid duration: {}", token)))
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
    /// `null` leaves `self` untouched.
    pub fn unmarshal_json(&mut self, data: &[u8]) -> Result<()> {
        let text: Option<String> = serde_json::from_slice(data).map_err(|e| {
            MicrotimeError::MalformedJson(format!("duration must be valid json string: {}", e))
        })?;
        match text {
            Some(text) => {
                *self = text.parse()?;
            }
            None => tracing::trace!("microtime: null duration, keeping {}", self),
        }
        Ok(())
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
        let text = std::str::from_utf8(data)
            .map_err(|e| MicrotimeError::InvalidDuration(format!("time: invalid duration: {}", e)))?;
        *self = text.parse()?;
        Ok(())
    }
}

fn less_than_half(x: i64, y: i64) -> bool {
    (x as u64) * 2 < y as u64
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut u = self.0.unsigned_abs();
        if u == 0 {
            return f.write_str("0s");
        }
        if self.0 < 0 {
            f.write_str("-")?;
        }

        if u < SECOND.0 as u64 {
            // Sub-second values pick the largest unit that keeps a whole part.
            let (prec, unit) = if u < MICROSECOND.0 as u64 {
                (0, "ns")
            } else if u < MILLISECOND.0 as u64 {
                (3, "µs")
            } else {
                (6, "ms")
            };
            let frac = fraction(u, prec);
            u /= 10u64.pow(prec);
            return write!(f, "{}{}{}", u, frac, unit);
        }

        let frac = fraction(u, 9);
        let secs = u / SECOND.0 as u64;
        let (hours, mins, secs) = (secs / 3600, (secs / 60) % 60, secs % 60);
        if hours > 0 {
            write!(f, "{}h{}m", hours, mins)?;
        } else if mins > 0 {
            write!(f, "{}m", mins)?;
        }
        write!(f, "{}{}s", secs, frac)
    }
}

/// Formats the low `prec` digits of `v` as ".ddd" without trailing zeros.
fn fraction(v: u64, prec: u32) -> String {
    let frac = v % 10u64.pow(prec);
    if frac == 0 {
        return String::new();
    }
    let digits = format!("{:0width$}", frac, width = prec as usize);
    format!(".{}", digits.trim_end_matches('0'))
}

impl FromStr for Duration {
    type Err = MicrotimeError;

    fn from_str(s: &str) -> Result<Self> {
        parse_duration(s)
    }
}

/// Parses a duration string such as "300ms", "-1.5h" or "2h45m".
///
/// Valid units are "ns", "us" (or "µs"), "ms", "s", "m", "h". The bare
/// string "0" is accepted without a unit.
pub fn parse_duration(orig: &str) -> Result<Duration> {
    let invalid = || MicrotimeError::InvalidDuration(format!("time: invalid duration {:?}", orig));

    let mut s = orig;
    let mut neg = false;
    if let Some(rest) = s.strip_prefix('-') {
        neg = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }
    if s == "0" {
        return Ok(Duration(0));
    }
    if s.is_empty() {
        return Err(invalid());
    }

    const OVERFLOW: u64 = 1 << 63;
    let mut total: u64 = 0;
    while !s.is_empty() {
        if !s.starts_with(|c: char| c == '.' || c.is_ascii_digit()) {
            return Err(invalid());
        }

        let before = s.len();
        let (whole, rest) = leading_int(s).ok_or_else(invalid)?;
        s = rest;
        let has_whole = before != s.len();

        let mut frac = 0u64;
        let mut scale = 1f64;
        let mut has_frac = false;
        if let Some(rest) = s.strip_prefix('.') {
            let before = rest.len();
            let (f, sc, rest) = leading_fraction(rest);
            frac = f;
            scale = sc;
            s = rest;
            has_frac = before != s.len();
        }
        if !has_whole && !has_frac {
            return Err(invalid());
        }

        let end = s
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(s.len());
        if end == 0 {
            return Err(MicrotimeError::InvalidDuration(format!(
                "time: missing unit in duration {:?}",
                orig
            )));
        }
        let (unit_name, rest) = s.split_at(end);
        s = rest;
        let unit = unit_nanos(unit_name).ok_or_else(|| {
            MicrotimeError::InvalidDuration(format!(
                "time: unknown unit {:?} in duration {:?}",
                unit_name, orig
            ))
        })?;

        if whole > OVERFLOW / unit {
            return Err(invalid());
        }
        let mut v = whole * unit;
        if frac > 0 {
            v += (frac as f64 * (unit as f64 / scale)) as u64;
            if v > OVERFLOW {
                return Err(invalid());
            }
        }
        total = total.checked_add(v).filter(|t| *t <= OVERFLOW).ok_or_else(invalid)?;
    }

    if neg {
        // -(1 << 63) is the one magnitude only representable as a negative.
        return Ok(Duration((total as i64).wrapping_neg()));
    }
    if total > i64::MAX as u64 {
        return Err(invalid());
    }
    Ok(Duration(total as i64))
}

fn unit_nanos(unit: &str) -> Option<u64> {
    let n = match unit {
        "ns" => NANOSECOND,
        "us" | "µs" | "μs" => MICROSECOND,
        "ms" => MILLISECOND,
        "s" => SECOND,
        "m" => MINUTE,
        "h" => HOUR,
        _ => return None,
    };
    Some(n.0 as u64)
}

/// Consumes leading digits. Returns None on overflow.
fn leading_int(s: &str) -> Option<(u64, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let mut x: u64 = 0;
    for b in s[..end].bytes() {
        x = x.checked_mul(10)?.checked_add(u64::from(b - b'0'))?;
        if x > 1 << 63 {
            return None;
        }
    }
    Some((x, &s[end..]))
}

/// Consumes leading fraction digits, ignoring precision past what fits.
fn leading_fraction(s: &str) -> (u64, f64, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let mut x: u64 = 0;
    let mut scale = 1f64;
    let mut overflow = false;
    for b in s[..end].bytes() {
        if overflow {
            continue;
        }
        match x.checked_mul(10).and_then(|y| y.checked_add(u64::from(b - b'0'))) {
            Some(y) if y <= 1 << 63 => {
                x = y;
                scale *= 10.0;
            }
            _ => overflow = true,
        }
    }
    (x, scale, &s[end..])
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Duration {
    type Output = Duration;

    fn neg(self) -> Duration {
        Duration(self.0.saturating_neg())
    }
}

impl std::ops::Mul<i64> for Duration {
    type Output = Duration;

    fn mul(self, rhs: i64) -> Duration {
        Duration(self.0.saturating_mul(rhs))
    }
}

impl CacheArg for Duration {
    fn cache_arg(&self) -> String {
        self.to_cache_token()
    }
}

impl CacheScan for Duration {
    fn scan_cache(&mut self, src: &CacheValue) -> Result<()> {
        if src.is_nil() {
            return Ok(());
        }
        let token = src.as_text().ok_or_else(|| {
            MicrotimeError::InvalidDuration(format!("cache scan: invalid duration: {}", src))
        })?;
        *self = Self::from_cache_token(&token)?;
        Ok(())
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.is_zero() {
            return serializer.serialize_none();
        }
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct DurationVisitor;

        impl<'de> serde::de::Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration string (e.g., '1h30m') or null")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                parse_duration(v).map_err(serde::de::Error::custom)
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> std::result::Result<Self::Value, D::Error> {
                d.deserialize_str(DurationVisitor)
            }

            fn visit_none<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(Duration::default())
            }

            fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(Duration::default())
            }
        }

        deserializer.deserialize_option(DurationVisitor)
    }
}

impl From<StdDuration> for Duration {
    fn from(d: StdDuration) -> Self {
        Self(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl TryFrom<Duration> for StdDuration {
    type Error = MicrotimeError;

    fn try_from(d: Duration) -> Result<Self> {
        u64::try_from(d.0)
            .map(StdDuration::from_nanos)
            .map_err(|_| MicrotimeError::InvalidDuration(format!("negative duration {}", d)))
    }
}

impl From<chrono::TimeDelta> for Duration {
    fn from(d: chrono::TimeDelta) -> Self {
        match d.num_nanoseconds() {
            Some(n) => Self(n),
            None if d < chrono::TimeDelta::zero() => Self::MIN,
            None => Self::MAX,
        }
    }
}

impl From<Duration> for chrono::TimeDelta {
    fn from(d: Duration) -> Self {
        chrono::TimeDelta::nanoseconds(d.0)
    }
}
