//! Raw bar file envelopes and per-source row mapping.
//!
//! Fetch clients store one JSON file per symbol/timeframe. Each exchange
//! lays its rows out differently; this module maps them to the positional
//! `[ts, open, high, low, close, volume?]` form the normalizer consumes and
//! works out the declared sampling interval.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use forecast_core::{Error, Result, TimestampMs};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

/// One positional upstream row.
pub type RawRow = Vec<Value>;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;

/// MOEX reports exchange-local time (UTC+3).
const MOEX_UTC_OFFSET_SECS: i32 = 3 * 3600;

/// Upstream data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Moex,
    Binance,
    /// Anything else; rows are taken to be positional already.
    Generic(String),
}

impl Source {
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "MOEX" => Source::Moex,
            "BINANCE" => Source::Binance,
            _ => Source::Generic(name.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Source::Moex => "MOEX",
            Source::Binance => "BINANCE",
            Source::Generic(name) => name,
        }
    }
}

/// Raw bar file as written by a fetch client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBarFile {
    #[serde(default)]
    pub source: String,
    #[serde(default, alias = "ticker")]
    pub symbol: Option<String>,
    /// Declared sampling interval: a label like `"1h"` or a MOEX interval code.
    #[serde(default, alias = "timeframe")]
    pub interval: Option<Value>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub till: Option<String>,
    #[serde(default)]
    pub fetched_at: Option<String>,
    #[serde(default)]
    pub data: Vec<Value>,
}

impl RawBarFile {
    /// Parse a raw file. A bare JSON array is accepted as generic
    /// positional rows with no declared interval.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        match value {
            Value::Array(rows) => Ok(RawBarFile {
                data: rows,
                ..RawBarFile::default()
            }),
            Value::Object(_) => Ok(serde_json::from_value(value)?),
            _ => Err(Error::data("raw bar file must be a JSON object or array")),
        }
    }

    /// Read and parse a raw file from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn source(&self) -> Source {
        Source::parse(&self.source)
    }

    /// Map the source-specific rows to positional `[ts, o, h, l, c, v?]`.
    ///
    /// Rows that cannot be mapped (too short, undecodable time) are dropped.
    pub fn positional_rows(&self) -> Vec<RawRow> {
        let source = self.source();
        let mut out = Vec::with_capacity(self.data.len());
        for row in &self.data {
            let Some(fields) = row.as_array() else {
                continue;
            };
            match &source {
                Source::Moex => {
                    // [begin, open, high, low, close, volume]
                    if fields.len() < 6 {
                        continue;
                    }
                    let Some(ts) = fields[0].as_str().and_then(moex_begin_to_millis) else {
                        debug!(row = ?fields[0], "dropping MOEX row with undecodable begin");
                        continue;
                    };
                    let mut mapped = Vec::with_capacity(6);
                    mapped.push(Value::from(ts));
                    mapped.extend_from_slice(&fields[1..6]);
                    out.push(mapped);
                }
                Source::Binance => {
                    // kline: [openTime, open, high, low, close, volume, ...]
                    if fields.len() < 6 {
                        continue;
                    }
                    out.push(fields[..6].to_vec());
                }
                Source::Generic(_) => out.push(fields.clone()),
            }
        }
        out
    }

    /// Sampling interval declared by the file, when it maps to a fixed length.
    pub fn interval_ms(&self) -> Option<i64> {
        let interval = self.interval.as_ref()?;
        match self.source() {
            Source::Moex => {
                let code = match interval {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                }?;
                moex_interval_ms(code)
            }
            Source::Binance | Source::Generic(_) => {
                interval.as_str().and_then(parse_interval_label)
            }
        }
    }
}

/// Parse an interval label such as `15m`, `1h` or `1d`.
pub fn parse_interval_label(label: &str) -> Option<i64> {
    let label = label.trim();
    let unit = label.chars().last()?;
    let count: i64 = label[..label.len() - unit.len_utf8()].parse().ok()?;
    if count <= 0 {
        return None;
    }
    let unit_ms = match unit {
        'm' => MINUTE_MS,
        'h' => HOUR_MS,
        'd' => DAY_MS,
        _ => return None,
    };
    count.checked_mul(unit_ms)
}

/// MOEX candle interval codes: minutes, or 24 for daily. Weekly (7),
/// monthly (31) and quarterly (4) candles have no fixed length.
pub fn moex_interval_ms(code: i64) -> Option<i64> {
    match code {
        24 => Some(DAY_MS),
        4 | 7 | 31 => None,
        c if c > 0 => c.checked_mul(MINUTE_MS),
        _ => None,
    }
}

/// Decode a MOEX `begin` timestamp (exchange-local time) to epoch ms.
/// Strings carrying an explicit offset are honored as-is.
pub fn moex_begin_to_millis(value: &str) -> Option<TimestampMs> {
    let iso = value.trim().replace(' ', "T");
    if let Ok(dt) = DateTime::parse_from_rfc3339(&iso) {
        return Some(dt.timestamp_millis());
    }
    let naive = NaiveDateTime::parse_from_str(&iso, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&iso, "%Y-%m-%dT%H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(&iso, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    let msk = FixedOffset::east_opt(MOEX_UTC_OFFSET_SECS)?;
    let local = msk.from_local_datetime(&naive).single()?;
    Some(local.timestamp_millis())
}
