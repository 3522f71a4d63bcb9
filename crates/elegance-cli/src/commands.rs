//! Subcommand implementations.

use crate::config::CliConfig;
use anyhow::{Context, Result};
use chess_analysis::{
    annotate_game, AnalysisScheduler, CancellationSignal, GameAnalysis, GameProgress,
    GoldenHarness, GoldenManifest, PositionProgress, ProgressObserver,
};
use chess_replay::read_games;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, info, warn};

/// Logs batch progress.
struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_position(&self, game_index: usize, progress: PositionProgress) {
        debug!(
            game = game_index,
            position = progress.processed,
            of = progress.total,
            "position evaluated"
        );
    }

    fn on_game(&self, progress: GameProgress) {
        info!(done = progress.processed, of = progress.total, "game finished");
    }
}

/// Cancel `signal` on Ctrl-C.
fn cancel_on_ctrl_c(signal: CancellationSignal) {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling analysis");
            signal.cancel();
        }
    });
}

/// Counts for the annotate summary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AnnotateSummary {
    pub analysed: usize,
    pub failed: usize,
}

/// Analyse every game of `input` and write the annotated PGN of the
/// successful ones to `out`, or stdout.
pub async fn annotate(config: CliConfig, input: &Path, out: Option<&PathBuf>) -> Result<AnnotateSummary> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let games = read_games(&text).with_context(|| format!("Failed to parse {}", input.display()))?;
    info!(games = games.len(), file = %input.display(), "loaded games");

    let cancel = CancellationSignal::new();
    cancel_on_ctrl_c(cancel.clone());

    let scheduler = AnalysisScheduler::new(config.engine, config.scheduler)
        .with_policy(config.scoring)
        .with_observer(Arc::new(LogProgress));
    let mut stream = scheduler.analyze_games(games.clone(), cancel);

    let mut analyses: Vec<Option<GameAnalysis>> = vec![None; games.len()];
    let mut summary = AnnotateSummary::default();
    while let Some(report) = stream.next().await {
        eprintln!("{}", report.status_line());
        match report.outcome {
            Ok(analysis) => {
                summary.analysed += 1;
                analyses[report.index] = Some(analysis);
            }
            Err(_) => summary.failed += 1,
        }
    }

    let annotated: Vec<String> = games
        .iter()
        .zip(&analyses)
        .filter_map(|(game, analysis)| analysis.as_ref().map(|a| annotate_game(game, a)))
        .collect();
    let output = annotated.join("\n");

    match out {
        Some(path) => std::fs::write(path, output)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", output),
    }

    info!(analysed = summary.analysed, failed = summary.failed, "annotation finished");
    Ok(summary)
}

/// Run a golden manifest. Returns whether every case passed.
pub async fn golden(
    config: CliConfig,
    manifest: &Path,
    engine: Option<&PathBuf>,
    json: bool,
) -> Result<bool> {
    let manifest = GoldenManifest::load(manifest)
        .with_context(|| format!("Failed to load manifest {}", manifest.display()))?;

    let mut harness = GoldenHarness::new(manifest)
        .with_policy(config.scoring)
        .context("Invalid scoring policy")?;
    if let Some(path) = engine {
        harness = harness.with_engine_path(path);
    }
    let report = harness.run().await;

    if json {
        println!("{}", report.to_json().context("Failed to serialise report")?);
    } else {
        for case in &report.cases {
            match (&case.mismatch, &case.error, &case.score) {
                (Some(mismatch), _, _) => println!("FAIL {}: {}", case.name, mismatch),
                (None, Some(error), _) => println!("FAIL {}: {}", case.name, error),
                (None, None, Some(score)) => println!("ok   {}: {}", case.name, score),
                (None, None, None) => println!("ok   {}", case.name),
            }
        }
        println!("{}/{} cases passed", report.passed, report.total);
    }

    Ok(report.is_success())
}
