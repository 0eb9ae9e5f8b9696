//! Core data types for the forecast pipeline.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Timestamp in milliseconds since Unix epoch (UTC).
pub type TimestampMs = i64;

/// Raw timestamps below this value are read as seconds.
pub const SECONDS_THRESHOLD: i64 = 1_000_000_000_000;

/// Normalize an upstream timestamp to milliseconds.
///
/// Sources disagree on the unit, so anything below [`SECONDS_THRESHOLD`]
/// is taken to be seconds. Applied uniformly to every row. `None` when the
/// conversion overflows.
#[inline]
pub fn ts_to_millis(ts: i64) -> Option<TimestampMs> {
    if ts < SECONDS_THRESHOLD {
        ts.checked_mul(1000)
    } else {
        Some(ts)
    }
}

/// UTC calendar parts of a timestamp: (day of week with Monday = 0, month 1-12).
pub fn calendar_parts(ts_ms: TimestampMs) -> Option<(u32, u32)> {
    let dt: DateTime<Utc> = DateTime::from_timestamp_millis(ts_ms)?;
    Some((dt.weekday().num_days_from_monday(), dt.month()))
}

/// Canonical OHLCV bar.
///
/// Serialized as a positional tuple `[ts_ms, open, high, low, close(, volume)]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "BarTuple", into = "BarTuple")]
pub struct Bar {
    /// Interval start (ms).
    pub ts_ms: TimestampMs,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume, when the source carries one.
    pub volume: Option<f64>,
}

impl Bar {
    /// Flat bar at `price` used to fill a missing interval.
    pub fn flat(ts_ms: TimestampMs, price: f64, volume: Option<f64>) -> Self {
        Self {
            ts_ms,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// Check the per-bar invariants: finite OHLC, high/low bracket
    /// open/close, non-negative volume.
    pub fn is_valid(&self) -> bool {
        let finite = self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite();
        if !finite {
            return false;
        }
        if self.high < self.open.max(self.close) || self.low > self.open.min(self.close) {
            return false;
        }
        match self.volume {
            Some(v) => v.is_finite() && v >= 0.0,
            None => true,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BarTuple {
    Volumed(TimestampMs, f64, f64, f64, f64, Option<f64>),
    Plain(TimestampMs, f64, f64, f64, f64),
}

impl From<BarTuple> for Bar {
    fn from(t: BarTuple) -> Self {
        match t {
            BarTuple::Volumed(ts_ms, open, high, low, close, volume) => Bar {
                ts_ms,
                open,
                high,
                low,
                close,
                volume,
            },
            BarTuple::Plain(ts_ms, open, high, low, close) => Bar {
                ts_ms,
                open,
                high,
                low,
                close,
                volume: None,
            },
        }
    }
}

impl From<Bar> for BarTuple {
    fn from(b: Bar) -> Self {
        match b.volume {
            Some(v) => BarTuple::Volumed(b.ts_ms, b.open, b.high, b.low, b.close, Some(v)),
            None => BarTuple::Plain(b.ts_ms, b.open, b.high, b.low, b.close),
        }
    }
}

/// One `(timestamp, close)` point of a parity tail, serialized as `[ts_ms, close]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(TimestampMs, f64)", into = "(TimestampMs, f64)")]
pub struct TailPoint {
    pub ts_ms: TimestampMs,
    pub close: f64,
}

impl From<(TimestampMs, f64)> for TailPoint {
    fn from((ts_ms, close): (TimestampMs, f64)) -> Self {
        Self { ts_ms, close }
    }
}

impl From<TailPoint> for (TimestampMs, f64) {
    fn from(p: TailPoint) -> Self {
        (p.ts_ms, p.close)
    }
}

impl From<&Bar> for TailPoint {
    fn from(bar: &Bar) -> Self {
        Self {
            ts_ms: bar.ts_ms,
            close: bar.close,
        }
    }
}

/// Check that a bar sequence is canonical at `interval_ms`: valid bars,
/// strictly increasing timestamps, fixed spacing.
pub fn is_canonical(bars: &[Bar], interval_ms: i64) -> bool {
    bars.iter().all(Bar::is_valid)
        && bars
            .windows(2)
            .all(|w| w[1].ts_ms - w[0].ts_ms == interval_ms)
}

/// What a forward-looking target measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// `close[i + h] - close[i]`.
    DeltaPrice,
    /// `ln(close[i + h] / close[i])`, 0.0 when either price is non-positive.
    LogReturn,
}

impl TargetKind {
    /// Compute the target from the current and future close.
    #[inline]
    pub fn compute(self, current: f64, future: f64) -> f64 {
        match self {
            TargetKind::DeltaPrice => future - current,
            TargetKind::LogReturn => log_return(current, future),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::DeltaPrice => "delta_price",
            TargetKind::LogReturn => "log_return",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delta_price" => Ok(TargetKind::DeltaPrice),
            "log_return" => Ok(TargetKind::LogReturn),
            other => Err(Error::config(format!(
                "unknown target kind '{other}' (expected delta_price or log_return)"
            ))),
        }
    }
}

/// Log return guarded against non-positive prices.
#[inline]
pub fn log_return(prev: f64, curr: f64) -> f64 {
    if prev <= 0.0 || curr <= 0.0 {
        0.0
    } else {
        (curr / prev).ln()
    }
}

/// Simple return guarded against a zero base.
#[inline]
pub fn simple_return(prev: f64, curr: f64) -> f64 {
    if prev == 0.0 {
        0.0
    } else {
        (curr - prev) / prev
    }
}
