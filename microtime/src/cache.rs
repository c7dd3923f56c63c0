//! Key-value cache surface.
//!
//! Cache clients hand replies to [`CacheScan`] implementations and send
//! arguments produced by [`CacheArg`]. Both microtime types use decimal
//! integer tokens on this surface.

use std::borrow::Cow;
use std::fmt;

use crate::error::Result;

/// A reply value read from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    /// The key is absent.
    Nil,
    Bytes(Vec<u8>),
    Str(String),
    /// An integer reply. Microtime types only accept text replies.
    Int(i64),
}

impl CacheValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, CacheValue::Nil)
    }

    /// Returns the reply as text if it is a bulk or string reply.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            CacheValue::Bytes(b) => Some(String::from_utf8_lossy(b)),
            CacheValue::Str(s) => Some(Cow::Borrowed(s)),
            CacheValue::Nil | CacheValue::Int(_) => None,
        }
    }
}

impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheValue::Nil => f.write_str("<nil>"),
            CacheValue::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            CacheValue::Str(s) => f.write_str(s),
            CacheValue::Int(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        CacheValue::Str(s.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(s: String) -> Self {
        CacheValue::Str(s)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(b: Vec<u8>) -> Self {
        CacheValue::Bytes(b)
    }
}

impl From<i64> for CacheValue {
    fn from(n: i64) -> Self {
        CacheValue::Int(n)
    }
}

impl<T: Into<CacheValue>> From<Option<T>> for CacheValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(CacheValue::Nil, Into::into)
    }
}

/// Produces the argument written to the cache.
pub trait CacheArg {
    fn cache_arg(&self) -> String;
}

/// Decodes a cache reply in place.
///
/// A [`CacheValue::Nil`] reply must leave the target untouched.
pub trait CacheScan {
    fn scan_cache(&mut self, src: &CacheValue) -> Result<()>;
}
