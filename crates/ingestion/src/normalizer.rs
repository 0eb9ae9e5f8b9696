//! Bar normalization: validation, deduplication, ordering and gap filling.
//!
//! Turns positional upstream rows into a canonical bar sequence: every bar
//! valid, timestamps strictly increasing and, when the sampling interval is
//! known, spaced exactly `interval_ms` apart.

use chrono::DateTime;
use forecast_core::config::NormalizeConfig;
use forecast_core::{ts_to_millis, Bar, TimestampMs};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// What the caller knows about the stream being normalized.
#[derive(Debug, Clone, Default)]
pub struct SourceHint {
    /// Source label, for diagnostics only.
    pub source: String,
    /// Declared sampling interval. `None` disables gap filling.
    pub interval_ms: Option<i64>,
}

/// Per-stream normalization diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeReport {
    /// Rows handed to the normalizer.
    pub input_rows: usize,
    /// Rows dropped by validation.
    pub rejected_rows: usize,
    /// Rows dropped because an earlier row had the same timestamp.
    pub duplicate_rows: usize,
    /// Rows dropped because they do not sit on the interval grid.
    pub off_grid_rows: usize,
    /// Flat bars synthesized for missing intervals.
    pub filled_gaps: usize,
}

/// Output of [`BarNormalizer::normalize`].
#[derive(Debug, Clone)]
pub struct NormalizedBars {
    /// Canonical bars.
    pub bars: Vec<Bar>,
    /// Interval the bars were aligned to, if any.
    pub interval_ms: Option<i64>,
    /// Diagnostics.
    pub report: NormalizeReport,
}

/// Bar normalizer.
#[derive(Debug, Clone)]
pub struct BarNormalizer {
    fill_gaps: bool,
    interval_override_ms: Option<i64>,
}

impl BarNormalizer {
    /// Create a new normalizer from configuration.
    pub fn new(config: &NormalizeConfig) -> Self {
        Self {
            fill_gaps: config.fill_gaps,
            interval_override_ms: config.interval_override_ms,
        }
    }

    /// Normalize positional rows `[ts, open, high, low, close, volume?]`.
    ///
    /// A malformed row is dropped and counted; it never fails the stream.
    pub fn normalize(&self, rows: &[Vec<Value>], hint: &SourceHint) -> NormalizedBars {
        let mut report = NormalizeReport {
            input_rows: rows.len(),
            ..NormalizeReport::default()
        };

        let mut bars: Vec<Bar> = Vec::with_capacity(rows.len());
        for row in rows {
            match coerce_row(row) {
                Some(bar) => bars.push(bar),
                None => report.rejected_rows += 1,
            }
        }
        if report.rejected_rows > 0 {
            debug!(
                source = %hint.source,
                rejected = report.rejected_rows,
                "dropped malformed rows"
            );
        }

        // Stable sort: among equal timestamps the first row encountered wins.
        bars.sort_by_key(|b| b.ts_ms);
        let before = bars.len();
        bars.dedup_by_key(|b| b.ts_ms);
        report.duplicate_rows = before - bars.len();

        let interval_ms = hint.interval_ms.or(self.interval_override_ms).filter(|&i| i > 0);
        if let Some(interval) = interval_ms {
            let (aligned, filled, off_grid) = align(bars, interval, self.fill_gaps);
            bars = aligned;
            report.filled_gaps = filled;
            report.off_grid_rows = off_grid;
        }

        if report.filled_gaps > 0 {
            warn!(
                source = %hint.source,
                filled_gaps = report.filled_gaps,
                "synthesized flat bars for missing intervals"
            );
        }
        if report.off_grid_rows > 0 {
            warn!(
                source = %hint.source,
                off_grid = report.off_grid_rows,
                "dropped bars off the interval grid"
            );
        }

        NormalizedBars {
            bars,
            interval_ms,
            report,
        }
    }
}

impl Default for BarNormalizer {
    fn default() -> Self {
        Self::new(&NormalizeConfig::default())
    }
}

/// Coerce and validate one positional row. Returns `None` if the row
/// should be dropped.
pub fn coerce_row(row: &[Value]) -> Option<Bar> {
    if row.len() < 5 {
        return None;
    }
    // Anything chrono cannot place on the UTC calendar is corrupt; this also
    // keeps the grid arithmetic in `align` far from overflow.
    let ts_ms = ts_to_millis(coerce_ts(&row[0])?)?;
    DateTime::from_timestamp_millis(ts_ms)?;
    let volume = match row.get(5) {
        None | Some(Value::Null) => None,
        Some(v) => Some(coerce_f64(v)?),
    };
    let bar = Bar {
        ts_ms,
        open: coerce_f64(&row[1])?,
        high: coerce_f64(&row[2])?,
        low: coerce_f64(&row[3])?,
        close: coerce_f64(&row[4])?,
        volume,
    };
    bar.is_valid().then_some(bar)
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn coerce_ts(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Align sorted, deduplicated bars to the grid anchored at the first bar.
///
/// Returns (aligned bars, synthesized count, off-grid count).
fn align(bars: Vec<Bar>, interval_ms: i64, fill_gaps: bool) -> (Vec<Bar>, usize, usize) {
    let Some(start) = bars.first().map(|b| b.ts_ms) else {
        return (bars, 0, 0);
    };
    let has_volume = bars.iter().any(|b| b.volume.is_some());
    let fill_volume = has_volume.then_some(0.0);

    let mut out = Vec::with_capacity(bars.len());
    let mut filled = 0usize;
    let mut off_grid = 0usize;
    let mut next_ts: TimestampMs = start;
    let mut prev_close: Option<f64> = None;

    for bar in bars {
        if (bar.ts_ms - start) % interval_ms != 0 {
            off_grid += 1;
            continue;
        }
        if fill_gaps {
            while next_ts < bar.ts_ms {
                // Without a reference close there is nothing to carry forward.
                if let Some(close) = prev_close {
                    out.push(Bar::flat(next_ts, close, fill_volume));
                    filled += 1;
                }
                next_ts = next_ts.saturating_add(interval_ms);
            }
        }
        prev_close = Some(bar.close);
        next_ts = bar.ts_ms.saturating_add(interval_ms);
        out.push(bar);
    }

    (out, filled, off_grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_core::is_canonical;
    use serde_json::json;

    const MIN: i64 = 60_000;
    const T0: i64 = 1_700_000_040_000;

    fn hint(interval_ms: Option<i64>) -> SourceHint {
        SourceHint {
            source: "test".to_string(),
            interval_ms,
        }
    }

    fn row(ts: i64, o: f64, h: f64, l: f64, c: f64) -> Vec<Value> {
        vec![json!(ts), json!(o), json!(h), json!(l), json!(c)]
    }

    fn vrow(ts: i64, o: f64, h: f64, l: f64, c: f64, v: f64) -> Vec<Value> {
        vec![json!(ts), json!(o), json!(h), json!(l), json!(c), json!(v)]
    }

    #[test]
    fn test_rejects_invalid_rows_silently() {
        let rows = vec![
            vrow(T0, 10.0, 11.0, 9.0, 10.5, 1.0),
            vrow(T0 + MIN, 10.0, 10.2, 9.0, 10.5, 1.0), // high below close
            vrow(T0 + 2 * MIN, 10.0, 11.0, 10.1, 10.5, 1.0), // low above open
            vrow(T0 + 3 * MIN, 10.0, 11.0, 9.0, 10.5, -1.0), // negative volume
            vec![json!(T0 + 4 * MIN), json!("NaN"), json!(11.0), json!(9.0), json!(10.5)],
            vec![json!(T0 + 5 * MIN), json!(null), json!(11.0), json!(9.0), json!(10.5)],
            vec![json!(T0 + 6 * MIN), json!(10.0), json!(11.0)],
            vec![json!("abc"), json!(10.0), json!(11.0), json!(9.0), json!(10.5)],
            vrow(T0 + 7 * MIN, 10.0, 11.0, 9.0, 10.5, 2.0),
        ];
        let out = BarNormalizer::default().normalize(&rows, &hint(None));
        assert_eq!(out.report.input_rows, 9);
        assert_eq!(out.report.rejected_rows, 7);
        assert_eq!(out.bars.len(), 2);
        assert_eq!(out.bars[1].volume, Some(2.0));
    }

    #[test]
    fn test_out_of_range_timestamps_are_rejected() {
        let rows = vec![
            row(T0, 1.0, 1.0, 1.0, 1.0),
            row(-100_000_000_000_000_000, 1.0, 1.0, 1.0, 1.0),
            row(i64::MAX, 1.0, 1.0, 1.0, 1.0),
            vec![json!(-1e17), json!(1.0), json!(1.0), json!(1.0), json!(1.0)],
        ];
        let out = BarNormalizer::default().normalize(&rows, &hint(Some(MIN)));
        assert_eq!(out.report.rejected_rows, 3);
        assert_eq!(out.report.filled_gaps, 0);
        assert_eq!(out.bars.len(), 1);
        assert_eq!(out.bars[0].ts_ms, T0);
    }

    #[test]
    fn test_huge_interval_does_not_overflow() {
        let config = NormalizeConfig {
            fill_gaps: true,
            interval_override_ms: Some(i64::MAX),
        };
        let rows = vec![row(T0, 1.0, 1.0, 1.0, 1.0)];
        let out = BarNormalizer::new(&config).normalize(&rows, &hint(None));
        assert_eq!(out.bars.len(), 1);
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let rows = vec![vec![
            json!(T0.to_string()),
            json!("10"),
            json!("11"),
            json!("9"),
            json!("10.5"),
            json!("3.25"),
        ]];
        let out = BarNormalizer::default().normalize(&rows, &hint(None));
        assert_eq!(out.bars.len(), 1);
        assert_eq!(out.bars[0].ts_ms, T0);
        assert_eq!(out.bars[0].volume, Some(3.25));
    }

    #[test]
    fn test_seconds_are_converted_to_millis() {
        let secs = T0 / 1000;
        let rows = vec![row(secs, 1.0, 1.0, 1.0, 1.0), row(T0 + MIN, 1.0, 1.0, 1.0, 1.0)];
        let out = BarNormalizer::default().normalize(&rows, &hint(Some(MIN)));
        assert_eq!(out.bars[0].ts_ms, T0);
        assert_eq!(out.bars[1].ts_ms, T0 + MIN);
    }

    #[test]
    fn test_sorts_and_keeps_first_duplicate() {
        let rows = vec![
            row(T0 + MIN, 20.0, 21.0, 19.0, 20.0),
            row(T0, 10.0, 11.0, 9.0, 10.0),
            row(T0 + MIN, 30.0, 31.0, 29.0, 30.0),
        ];
        let out = BarNormalizer::default().normalize(&rows, &hint(Some(MIN)));
        assert_eq!(out.bars.len(), 2);
        assert_eq!(out.bars[0].close, 10.0);
        assert_eq!(out.bars[1].close, 20.0);
        assert_eq!(out.report.duplicate_rows, 1);
    }

    #[test]
    fn test_gap_fill_with_previous_close() {
        let rows = vec![
            vrow(T0, 10.0, 12.0, 9.0, 11.0, 5.0),
            vrow(T0 + 4 * MIN, 11.0, 13.0, 10.0, 12.0, 6.0),
        ];
        let out = BarNormalizer::default().normalize(&rows, &hint(Some(MIN)));
        assert_eq!(out.report.filled_gaps, 3);
        assert_eq!(out.bars.len(), 5);
        for (k, bar) in out.bars[1..4].iter().enumerate() {
            assert_eq!(*bar, Bar::flat(T0 + (k as i64 + 1) * MIN, 11.0, Some(0.0)));
        }
        assert!(is_canonical(&out.bars, MIN));
    }

    #[test]
    fn test_gap_fill_without_volume() {
        let rows = vec![row(T0, 10.0, 12.0, 9.0, 11.0), row(T0 + 2 * MIN, 11.0, 13.0, 10.0, 12.0)];
        let out = BarNormalizer::default().normalize(&rows, &hint(Some(MIN)));
        assert_eq!(out.report.filled_gaps, 1);
        assert_eq!(out.bars[1], Bar::flat(T0 + MIN, 11.0, None));
    }

    #[test]
    fn test_gap_fill_can_be_disabled() {
        let config = NormalizeConfig {
            fill_gaps: false,
            interval_override_ms: None,
        };
        let rows = vec![row(T0, 10.0, 12.0, 9.0, 11.0), row(T0 + 3 * MIN, 11.0, 13.0, 10.0, 12.0)];
        let out = BarNormalizer::new(&config).normalize(&rows, &hint(Some(MIN)));
        assert_eq!(out.bars.len(), 2);
        assert_eq!(out.report.filled_gaps, 0);
    }

    #[test]
    fn test_off_grid_bars_are_dropped() {
        let rows = vec![
            row(T0, 10.0, 12.0, 9.0, 11.0),
            row(T0 + 30_000, 11.0, 13.0, 10.0, 12.0),
            row(T0 + MIN, 11.0, 13.0, 10.0, 12.0),
        ];
        let out = BarNormalizer::default().normalize(&rows, &hint(Some(MIN)));
        assert_eq!(out.bars.len(), 2);
        assert_eq!(out.report.off_grid_rows, 1);
        assert!(is_canonical(&out.bars, MIN));
    }

    #[test]
    fn test_interval_override_applies_when_undeclared() {
        let config = NormalizeConfig {
            fill_gaps: true,
            interval_override_ms: Some(MIN),
        };
        let rows = vec![row(T0, 10.0, 12.0, 9.0, 11.0), row(T0 + 2 * MIN, 11.0, 13.0, 10.0, 12.0)];
        let out = BarNormalizer::new(&config).normalize(&rows, &hint(None));
        assert_eq!(out.interval_ms, Some(MIN));
        assert_eq!(out.bars.len(), 3);
    }

    #[test]
    fn test_normalizing_canonical_bars_is_identity() {
        let rows = vec![
            vrow(T0, 10.0, 12.0, 9.0, 11.0, 5.0),
            vrow(T0 + 3 * MIN, 11.0, 13.0, 10.0, 12.0, 6.0),
            vrow(T0 + 5 * MIN, 12.0, 12.5, 11.0, 11.5, 1.0),
        ];
        let normalizer = BarNormalizer::default();
        let first = normalizer.normalize(&rows, &hint(Some(MIN)));

        let reencoded: Vec<Vec<Value>> = first
            .bars
            .iter()
            .map(|b| serde_json::from_value(serde_json::to_value(b).unwrap()).unwrap())
            .collect();
        let second = normalizer.normalize(&reencoded, &hint(Some(MIN)));

        assert_eq!(first.bars, second.bars);
        assert_eq!(second.report.filled_gaps, 0);
        assert_eq!(second.report.rejected_rows, 0);
        assert_eq!(second.report.duplicate_rows, 0);
    }

    #[test]
    fn test_empty_input() {
        let out = BarNormalizer::default().normalize(&[], &hint(Some(MIN)));
        assert!(out.bars.is_empty());
        assert_eq!(out.report, NormalizeReport::default());
    }
}
