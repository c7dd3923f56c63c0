//! Microsecond timestamps and nanosecond durations for wire formats.
//!
//! This crate provides two value types that encode the same way wherever
//! they cross a process boundary:
//!
//! - [`Timestamp`]: UTC instant, rounded to the microsecond on output
//! - [`Duration`]: signed nanoseconds with a `"1h30m0.5s"` display form
//!
//! | Surface | `Duration` | `Timestamp` |
//! |---|---|---|
//! | JSON | `"1h30m0s"`, `null` for zero | `"2019-01-28T16:54:58.099Z"`, `null` for zero |
//! | Binary text | display string, empty for zero | display string, empty for zero |
//! | Cache | decimal nanoseconds | decimal Unix seconds |
//! | SQL | - | [`SqlValue::Timestamp`], [`SqlValue::Null`] for zero |
//!
//! Decoding `null`, empty bytes, a nil cache reply or a NULL column leaves
//! the target value untouched.
//!
//! # Example
//!
//! ```rust
//! use giztoy_microtime::{Duration, Timestamp, HOUR, MINUTE};
//!
//! let t = Timestamp::from_free_text("2019-01-28 16:54:58.099").unwrap();
//! assert_eq!(t.to_json(), r#""2019-01-28T16:54:58.099Z""#);
//!
//! let d = HOUR + MINUTE * 30;
//! assert_eq!(serde_json::to_string(&d).unwrap(), r#""1h30m0s""#);
//!
//! let mut kept = d;
//! kept.unmarshal_json(b"null").unwrap();
//! assert_eq!(kept, d);
//!
//! let zero = Duration::default();
//! assert_eq!(serde_json::to_string(&zero).unwrap(), "null");
//! ```

mod cache;
mod duration;
mod error;
mod parser;
mod sql;
mod timestamp;

pub use cache::{CacheArg, CacheScan, CacheValue};
pub use duration::{
    parse_duration, Duration, HOUR, MICROSECOND, MILLISECOND, MINUTE, NANOSECOND, SECOND,
};
pub use error::{MicrotimeError, Result};
pub use parser::{DateParse, ParseConfig, Rfc3339, TimeParser};
pub use sql::{SqlScanner, SqlValue, SqlValuer};
pub use timestamp::Timestamp;
