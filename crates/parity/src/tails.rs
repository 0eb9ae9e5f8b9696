//! Representative tail selection from a held-out bar sequence.

use forecast_core::config::ParityConfig;
use forecast_core::{Bar, Error, Result, TailPoint};

/// Pick `case_count` tails of `tail_size` bars spaced evenly across `bars`.
///
/// Tail `i` ends at `tail_size + i * step`, with
/// `step = max(1, (len - tail_size - horizon) / case_count)`. Fails when
/// the sequence is shorter than `tail_size + feature_window + horizon`.
/// Tails never run past the last bar, so a large `case_count` on a short
/// sequence repeats the final tail.
pub fn pick_tails(bars: &[Bar], config: &ParityConfig) -> Result<Vec<Vec<TailPoint>>> {
    let needed = config.min_source_bars();
    if bars.len() < needed {
        return Err(Error::insufficient_data(format!(
            "need at least {needed} bars to build test vectors, got {}",
            bars.len()
        )));
    }
    if config.case_count == 0 {
        return Err(Error::config("parity case_count must be at least 1"));
    }

    let span = bars.len() - config.tail_size - config.horizon;
    let step = (span / config.case_count).max(1);
    let tails = (0..config.case_count)
        .map(|i| {
            let end = (config.tail_size + i * step).min(bars.len());
            bars[end - config.tail_size..end].iter().map(TailPoint::from).collect()
        })
        .collect();
    Ok(tails)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar::flat(i as i64 * 60_000, 100.0 + i as f64, None))
            .collect()
    }

    #[test]
    fn test_too_short_is_fatal() {
        let config = ParityConfig::default();
        let err = pick_tails(&bars(215), &config).unwrap_err();
        assert!(matches!(err, Error::InsufficientData(_)));
        assert!(pick_tails(&bars(216), &config).is_ok());
    }

    #[test]
    fn test_even_spacing() {
        let config = ParityConfig::default();
        let tails = pick_tails(&bars(400), &config).unwrap();
        // step = (400 - 128 - 24) / 2 = 124
        assert_eq!(tails.len(), 2);
        assert_eq!(tails[0].len(), 128);
        assert_eq!(tails[0][0].close, 100.0);
        assert_eq!(tails[0][127].close, 227.0);
        assert_eq!(tails[1][0].close, 224.0);
        assert_eq!(tails[1][127].ts_ms, 251 * 60_000);
    }

    #[test]
    fn test_tails_stay_in_range() {
        let config = ParityConfig {
            case_count: 5,
            ..ParityConfig::default()
        };
        let tails = pick_tails(&bars(216), &config).unwrap();
        assert_eq!(tails.len(), 5);
        assert!(tails.iter().all(|t| t.len() == 128));
    }

    #[test]
    fn test_many_cases_on_short_sequence() {
        let config = ParityConfig {
            case_count: 100,
            ..ParityConfig::default()
        };
        let tails = pick_tails(&bars(216), &config).unwrap();
        assert_eq!(tails.len(), 100);
        assert_eq!(tails[99].last().unwrap().ts_ms, 215 * 60_000);
    }
}
