//! `forecast`: batch tools for the bar-to-feature pipeline and parity vectors.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use forecast_core::config::PipelineConfig;
use forecast_core::io::write_json_atomic;
use forecast_core::{FeatureStrategyKind, TargetKind, TargetShape};
use forecast_dataset::table_io::find_split_files;
use forecast_dataset::{
    load_split, read_bars, DatasetBuilder, ModelMetadata, NormalizationStats, SplitCounts,
    SplitName,
};
use forecast_features::{FeatureEngine, FeatureVector, FixedTenFeatures};
use forecast_ingestion::{BarNormalizer, RawBarFile, SourceHint};
use forecast_parity::{
    check_manifest, check_sidecar, ensure_sidecar, evaluate_model, pick_tails, write_manifest,
    write_sidecar, LinearScorer, ParityHarness, TestVectorManifest,
};
use rayon::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "forecast")]
#[command(about = "Normalize bars, build feature datasets and certify scoring parity")]
struct Cli {
    /// Pipeline configuration (JSON). Flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize raw exchange dumps into canonical bar files
    Normalize {
        /// Raw JSON files or directories containing them
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Interval to assume when a file declares none
        #[arg(long)]
        interval_ms: Option<i64>,

        /// Keep holes instead of filling them with flat bars
        #[arg(long)]
        no_fill_gaps: bool,
    },

    /// Derive feature tables and split them into train/val/test CSVs
    Features {
        /// Canonical bar files or directories containing them
        #[arg(required = true)]
        bars: Vec<PathBuf>,

        #[arg(long)]
        out_dir: Option<PathBuf>,

        #[command(flatten)]
        knobs: FeatureKnobs,
    },

    /// Fit normalization statistics on the train split and write model metadata
    FitStats {
        /// Directories holding `*_train.csv` (and optionally val/test) files
        #[arg(long, required = true, value_delimiter = ',')]
        data_dirs: Vec<PathBuf>,

        #[arg(long)]
        model_name: String,

        /// Target columns the model predicts; defaults to every target found
        #[arg(long, value_delimiter = ',')]
        targets: Vec<String>,

        /// Model metadata output path
        #[arg(long)]
        out: PathBuf,

        #[arg(long)]
        strategy: Option<FeatureStrategyKind>,
    },

    /// Build the golden test-vector manifest for an exported scorer
    ExportVectors {
        /// Held-out canonical bar file
        #[arg(long)]
        bars: PathBuf,

        /// Linear scoring artifact (JSON)
        #[arg(long)]
        scorer: PathBuf,

        /// Model metadata holding the normalization statistics
        #[arg(long)]
        model_meta: PathBuf,

        #[arg(long)]
        model_version: String,

        #[arg(long)]
        out_dir: Option<PathBuf>,

        #[command(flatten)]
        knobs: ParityKnobs,
    },

    /// Recompute a manifest's cases and compare within tolerance
    VerifyVectors {
        #[arg(long)]
        manifest: PathBuf,

        #[arg(long)]
        scorer: PathBuf,

        #[arg(long)]
        model_meta: PathBuf,
    },

    /// Score a split and compare against the zero-delta baseline
    Evaluate {
        #[arg(long, required = true, value_delimiter = ',')]
        data_dirs: Vec<PathBuf>,

        #[arg(long, default_value = "test")]
        split: SplitName,

        #[arg(long)]
        scorer: PathBuf,

        #[arg(long)]
        model_meta: PathBuf,

        /// Evaluation report output path
        #[arg(long)]
        out: PathBuf,
    },

    /// Verify SHA-256 sidecars of exported artifacts
    CheckArtifacts {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Args, Default)]
struct FeatureKnobs {
    #[arg(long)]
    strategy: Option<FeatureStrategyKind>,

    /// EMA span (configurable-window strategy)
    #[arg(long)]
    ema_span: Option<usize>,

    /// Volatility window (configurable-window strategy)
    #[arg(long)]
    vol_window: Option<usize>,

    /// Bars ahead to forecast
    #[arg(long)]
    horizon: Option<usize>,

    /// `delta_price` or `log_return`
    #[arg(long)]
    target: Option<TargetKind>,

    /// `single` or `per_step` (fixed ten-feature strategy)
    #[arg(long)]
    target_shape: Option<TargetShape>,

    #[arg(long)]
    train_end: Option<f64>,

    #[arg(long)]
    val_end: Option<f64>,
}

impl FeatureKnobs {
    fn apply(&self, config: &mut PipelineConfig) {
        let features = &mut config.features;
        if let Some(strategy) = self.strategy {
            features.strategy = strategy;
        }
        if let Some(span) = self.ema_span {
            features.configurable_window.ema_span = span;
        }
        if let Some(window) = self.vol_window {
            features.configurable_window.vol_window = window;
        }
        if let Some(horizon) = self.horizon {
            features.configurable_window.horizon = horizon;
            features.fixed_ten.horizon = horizon;
        }
        if let Some(target) = self.target {
            features.configurable_window.target_kind = target;
            features.fixed_ten.target_kind = target;
        }
        if let Some(shape) = self.target_shape {
            features.fixed_ten.target_shape = shape;
        }
        if let Some(train_end) = self.train_end {
            config.split.train_end = train_end;
        }
        if let Some(val_end) = self.val_end {
            config.split.val_end = val_end;
        }
    }
}

#[derive(Args, Default)]
struct ParityKnobs {
    #[arg(long)]
    case_count: Option<usize>,

    #[arg(long)]
    tail_size: Option<usize>,

    #[arg(long)]
    feature_window: Option<usize>,

    #[arg(long)]
    horizon: Option<usize>,

    #[arg(long)]
    rtol: Option<f64>,

    #[arg(long)]
    atol: Option<f64>,
}

impl ParityKnobs {
    fn apply(&self, config: &mut PipelineConfig) {
        let parity = &mut config.parity;
        if let Some(n) = self.case_count {
            parity.case_count = n;
        }
        if let Some(n) = self.tail_size {
            parity.tail_size = n;
        }
        if let Some(n) = self.feature_window {
            parity.feature_window = n;
        }
        if let Some(n) = self.horizon {
            parity.horizon = n;
        }
        if let Some(x) = self.rtol {
            parity.rtol = x;
        }
        if let Some(x) = self.atol {
            parity.atol = x;
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Normalize {
            inputs,
            out_dir,
            interval_ms,
            no_fill_gaps,
        } => {
            if interval_ms.is_some() {
                config.normalize.interval_override_ms = interval_ms;
            }
            if no_fill_gaps {
                config.normalize.fill_gaps = false;
            }
            config.validate()?;
            let out_dir = out_dir.unwrap_or_else(|| config.output.out_dir.clone());
            run_normalize(&config, &inputs, &out_dir)
        }
        Commands::Features {
            bars,
            out_dir,
            knobs,
        } => {
            knobs.apply(&mut config);
            config.validate()?;
            let out_dir = out_dir.unwrap_or_else(|| config.output.out_dir.clone());
            run_features(&config, &bars, &out_dir)
        }
        Commands::FitStats {
            data_dirs,
            model_name,
            targets,
            out,
            strategy,
        } => {
            if let Some(strategy) = strategy {
                config.features.strategy = strategy;
            }
            config.validate()?;
            run_fit_stats(&config, &data_dirs, &model_name, &targets, &out)
        }
        Commands::ExportVectors {
            bars,
            scorer,
            model_meta,
            model_version,
            out_dir,
            knobs,
        } => {
            knobs.apply(&mut config);
            config.validate()?;
            let out_dir = out_dir.unwrap_or_else(|| config.output.out_dir.clone());
            run_export_vectors(&config, &bars, &scorer, &model_meta, &model_version, &out_dir)
        }
        Commands::VerifyVectors {
            manifest,
            scorer,
            model_meta,
        } => {
            config.validate()?;
            run_verify_vectors(&config, &manifest, &scorer, &model_meta)
        }
        Commands::Evaluate {
            data_dirs,
            split,
            scorer,
            model_meta,
            out,
        } => run_evaluate(&config, &data_dirs, split, &scorer, &model_meta, &out),
        Commands::CheckArtifacts { paths } => run_check_artifacts(&paths),
    }
}

/// Expand files and directories into a sorted list of `.json` files.
fn collect_json_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
            continue;
        }
        if !input.is_dir() {
            bail!("input {} does not exist", input.display());
        }
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path.to_path_buf());
            }
        }
    }
    files.sort();
    files.dedup();
    if files.is_empty() {
        bail!("no .json files found in {:?}", inputs);
    }

    // Outputs are named after the input stem in a flat directory.
    let mut seen: HashMap<&std::ffi::OsStr, &Path> = HashMap::new();
    for path in &files {
        let stem = path
            .file_stem()
            .with_context(|| format!("bad input name {}", path.display()))?;
        if let Some(other) = seen.insert(stem, path) {
            bail!(
                "inputs {} and {} would write the same output name",
                other.display(),
                path.display()
            );
        }
    }
    Ok(files)
}

/// Run `job` on every file in parallel; report every failure, then fail once.
fn for_each_file<F>(files: &[PathBuf], job: F) -> Result<()>
where
    F: Fn(&Path) -> Result<String> + Sync,
{
    let failures: Vec<String> = files
        .par_iter()
        .filter_map(|path| match job(path) {
            Ok(line) => {
                println!("{line}");
                None
            }
            Err(e) => Some(format!("{}: {e:#}", path.display())),
        })
        .collect();
    if failures.is_empty() {
        return Ok(());
    }
    for failure in &failures {
        eprintln!("error: {failure}");
    }
    bail!("{} of {} files failed", failures.len(), files.len())
}

fn run_normalize(config: &PipelineConfig, inputs: &[PathBuf], out_dir: &Path) -> Result<()> {
    let files = collect_json_files(inputs)?;
    let normalizer = BarNormalizer::new(&config.normalize);
    info!(files = files.len(), out_dir = %out_dir.display(), "normalizing");

    for_each_file(&files, |path| {
        let raw = RawBarFile::from_path(path).with_context(|| format!("reading {}", path.display()))?;
        let hint = SourceHint {
            source: raw.source().label().to_string(),
            interval_ms: raw.interval_ms(),
        };
        let normalized = normalizer.normalize(&raw.positional_rows(), &hint);
        let file_name = path
            .file_name()
            .with_context(|| format!("bad input name {}", path.display()))?;
        let dest = out_dir.join(file_name);
        write_json_atomic(&dest, &normalized.bars, false)
            .with_context(|| format!("writing {}", dest.display()))?;
        Ok(format!(
            "[normalize] {} -> {} ({} bars, filled_gaps={})",
            path.display(),
            dest.display(),
            normalized.bars.len(),
            normalized.report.filled_gaps
        ))
    })
}

fn run_features(config: &PipelineConfig, inputs: &[PathBuf], out_dir: &Path) -> Result<()> {
    let files = collect_json_files(inputs)?;
    let builder = DatasetBuilder::new(config);
    info!(
        files = files.len(),
        strategy = %builder.engine().kind(),
        out_dir = %out_dir.display(),
        "building feature datasets"
    );

    for_each_file(&files, |path| {
        let output = builder
            .build_file(path, out_dir)
            .with_context(|| format!("building features for {}", path.display()))?;
        let counts = &output.metadata.splits;
        Ok(format!(
            "[features] {} -> {} ({} rows, train={} val={} test={})",
            path.display(),
            out_dir.display(),
            output.metadata.rows,
            counts.train,
            counts.val,
            counts.test
        ))
    })
}

fn run_fit_stats(
    config: &PipelineConfig,
    data_dirs: &[PathBuf],
    model_name: &str,
    targets: &[String],
    out: &Path,
) -> Result<()> {
    let engine = FeatureEngine::new(&config.features);
    let names = engine.feature_names();
    let train = load_split(data_dirs, SplitName::Train, names).context("loading train split")?;
    let stats = NormalizationStats::fit(&train.features, config.parity.epsilon)?;

    let target_columns = if targets.is_empty() {
        train.target_columns.clone()
    } else {
        forecast_dataset::select_targets(&train.target_columns, targets)?;
        targets.to_vec()
    };

    let mut splits = SplitCounts {
        train: train.len(),
        ..SplitCounts::default()
    };
    for name in [SplitName::Val, SplitName::Test] {
        if find_split_files(data_dirs, name).is_empty() {
            continue;
        }
        let loaded = load_split(data_dirs, name, names)
            .with_context(|| format!("loading {name} split"))?;
        match name {
            SplitName::Val => splits.val = loaded.len(),
            _ => splits.test = loaded.len(),
        }
    }

    let meta = ModelMetadata {
        model_name: model_name.to_string(),
        features: names.iter().map(|s| s.to_string()).collect(),
        target_columns,
        normalization: stats,
        metrics: Default::default(),
        splits,
        data_dirs: data_dirs.iter().map(|d| d.display().to_string()).collect(),
        params: json!({ "strategy": engine.kind().as_str(), "horizon": engine.horizon() }),
    };
    meta.save(out, config.output.pretty_json)
        .with_context(|| format!("writing {}", out.display()))?;
    println!(
        "[fit-stats] {} train rows from {} files -> {}",
        train.len(),
        train.files.len(),
        out.display()
    );
    Ok(())
}

fn run_export_vectors(
    config: &PipelineConfig,
    bars_path: &Path,
    scorer_path: &Path,
    meta_path: &Path,
    model_version: &str,
    out_dir: &Path,
) -> Result<()> {
    let bars = read_bars(bars_path).with_context(|| format!("reading {}", bars_path.display()))?;
    let scorer = LinearScorer::load(scorer_path)
        .with_context(|| format!("reading scorer {}", scorer_path.display()))?;
    // An existing scorer sidecar is the recorded identity; never overwrite it.
    ensure_sidecar(scorer_path)?;
    let meta = ModelMetadata::load(meta_path)
        .with_context(|| format!("reading {}", meta_path.display()))?;
    meta.check_features(FixedTenFeatures::NAMES)?;

    let tails = pick_tails(&bars, &config.parity)?;
    let harness = ParityHarness::new(&config.parity);
    let manifest = harness.build_test_vectors(&scorer, &meta.normalization, &tails, model_version)?;
    let path = write_manifest(out_dir, &manifest, config.output.pretty_json)?;
    write_sidecar(&path)?;

    println!(
        "[export-vectors] {} -> {} ({} cases)",
        bars_path.display(),
        path.display(),
        manifest.cases.len()
    );
    Ok(())
}

fn run_verify_vectors(
    config: &PipelineConfig,
    manifest_path: &Path,
    scorer_path: &Path,
    meta_path: &Path,
) -> Result<()> {
    let manifest = TestVectorManifest::load(manifest_path)
        .with_context(|| format!("reading {}", manifest_path.display()))?;
    let scorer = LinearScorer::load(scorer_path)
        .with_context(|| format!("reading scorer {}", scorer_path.display()))?;
    let meta = ModelMetadata::load(meta_path)
        .with_context(|| format!("reading {}", meta_path.display()))?;

    let report = ParityHarness::new(&config.parity).verify_manifest(&scorer, &meta.normalization, &manifest)?;
    let worst = report
        .cases
        .iter()
        .map(|c| c.max_abs_error)
        .fold(0.0, f64::max);
    println!(
        "[verify-vectors] {} ({} cases ok, max_abs_error={worst:e})",
        manifest_path.display(),
        report.cases.len()
    );
    Ok(())
}

fn run_evaluate(
    config: &PipelineConfig,
    data_dirs: &[PathBuf],
    split: SplitName,
    scorer_path: &Path,
    meta_path: &Path,
    out: &Path,
) -> Result<()> {
    let meta = ModelMetadata::load(meta_path)
        .with_context(|| format!("reading {}", meta_path.display()))?;
    let scorer = LinearScorer::load(scorer_path)
        .with_context(|| format!("reading scorer {}", scorer_path.display()))?;
    let names: Vec<&str> = meta.features.iter().map(String::as_str).collect();
    let loaded = load_split(data_dirs, split, &names).with_context(|| format!("loading {split} split"))?;

    let report = evaluate_model(&scorer, &meta, &loaded, split)?;
    write_json_atomic(out, &report, config.output.pretty_json)
        .with_context(|| format!("writing {}", out.display()))?;
    println!(
        "[evaluate] {} {split} ({} rows, mae={:.6} baseline_mae={:.6}) -> {}",
        meta.model_name,
        report.rows,
        report.metrics.mae_delta,
        report.baseline.mae_delta,
        out.display()
    );
    Ok(())
}

fn is_manifest(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("test_vectors_") && n.ends_with(".json"))
}

fn run_check_artifacts(paths: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for path in paths {
        let check = if is_manifest(path) {
            check_manifest(path)
        } else {
            check_sidecar(path)
        };
        let status = if check.ok { "ok" } else { "FAIL" };
        println!("[check-artifacts] {} {status} ({})", path.display(), check.detail);
        if !check.ok {
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} of {} artifacts failed verification", paths.len());
    }
    Ok(())
}
