//! Scoring a loaded split and comparing against the zero-delta baseline.

use forecast_core::{Error, Result};
use forecast_dataset::{
    select_targets, EvaluationReport, LoadedSplit, MetricsCalculator, ModelMetadata, SplitName,
};
use tracing::info;

use crate::scorer::Scorer;

/// Evaluate `scorer` on `split` using the model's persisted normalization
/// and target selection.
pub fn evaluate_model(
    scorer: &dyn Scorer,
    meta: &ModelMetadata,
    split: &LoadedSplit,
    split_name: SplitName,
) -> Result<EvaluationReport> {
    if meta.target_columns.is_empty() {
        return Err(Error::schema(format!(
            "model '{}' metadata lists no target_columns",
            meta.model_name
        )));
    }
    let indices = select_targets(&split.target_columns, &meta.target_columns)?;
    if scorer.horizon() != indices.len() {
        return Err(Error::schema(format!(
            "scorer produces {} outputs but model metadata lists {} targets",
            scorer.horizon(),
            indices.len()
        )));
    }
    meta.normalization.validate(scorer.feature_count())?;

    let actual = split.select_targets(&indices);
    let predicted = split
        .features
        .iter()
        .map(|row| scorer.score(&meta.normalization.apply(row)?))
        .collect::<Result<Vec<_>>>()?;

    let metrics = MetricsCalculator::calculate(&actual, &predicted, &split.last_close)?;
    let baseline = MetricsCalculator::baseline(&actual, &split.last_close)?;
    info!(
        model = %meta.model_name,
        split = %split_name,
        rows = split.len(),
        mae = metrics.mae_delta,
        baseline_mae = baseline.mae_delta,
        "evaluated model"
    );

    Ok(EvaluationReport {
        model: meta.model_name.clone(),
        split: split_name.as_str().to_string(),
        rows: split.len(),
        targets: meta.target_columns.clone(),
        metrics,
        baseline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::LinearScorer;
    use approx::assert_relative_eq;
    use forecast_dataset::{NormalizationStats, SplitCounts};
    use std::collections::BTreeMap;

    fn split() -> LoadedSplit {
        LoadedSplit {
            features: vec![vec![1.0, 0.0], vec![2.0, 0.0]],
            targets: vec![vec![0.0, 1.0], vec![0.0, 2.0]],
            last_close: vec![100.0, 100.0],
            target_columns: vec!["target_1".to_string(), "target_2".to_string()],
            files: vec![],
        }
    }

    fn meta(targets: &[&str]) -> ModelMetadata {
        ModelMetadata {
            model_name: "linear".to_string(),
            features: vec!["a".to_string(), "b".to_string()],
            target_columns: targets.iter().map(|s| s.to_string()).collect(),
            normalization: NormalizationStats {
                kind: "zscore".to_string(),
                mean: vec![0.0, 0.0],
                std: vec![1.0, 1.0],
                epsilon: 0.0,
            },
            metrics: BTreeMap::new(),
            splits: SplitCounts::default(),
            data_dirs: vec![],
            params: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_selected_target_is_scored() {
        // Predicts x[0], which equals target_2 exactly.
        let scorer = LinearScorer::new(vec![vec![1.0, 0.0]], vec![0.0]).unwrap();
        let report = evaluate_model(&scorer, &meta(&["target_2"]), &split(), SplitName::Test).unwrap();

        assert_eq!(report.rows, 2);
        assert_eq!(report.targets, vec!["target_2"]);
        assert_relative_eq!(report.metrics.mae_delta, 0.0);
        assert_relative_eq!(report.baseline.mae_delta, 1.5);
    }

    #[test]
    fn test_missing_target_is_fatal() {
        let scorer = LinearScorer::new(vec![vec![1.0, 0.0]], vec![0.0]).unwrap();
        let err = evaluate_model(&scorer, &meta(&["target_24"]), &split(), SplitName::Test).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_output_count_must_match_targets() {
        let scorer = LinearScorer::new(vec![vec![1.0, 0.0]], vec![0.0]).unwrap();
        assert!(evaluate_model(&scorer, &meta(&["target_1", "target_2"]), &split(), SplitName::Val).is_err());
    }
}
