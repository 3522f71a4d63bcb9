//! Golden validation harness: runs fixed cases through the full pipeline and
//! compares the scores with expected ranges.
//!
//! A manifest is a TOML file:
//!
//! ```toml
//! tolerance = 0.5
//!
//! [engine]
//! depth = 2
//!
//! [[case]]
//! name = "ruy-lopez"
//! moves = ["e4", "e5", "Nf3", "Nc6", "Bb5"]
//! expect = { soundness = [95.0, 100.0] }
//! classifications = [{ ply = 5, class = "Quiet" }]
//! ```

use crate::analyzer::GameAnalysis;
use crate::config::{ConfigError, EngineConfig, SchedulerConfig};
use crate::quality::{GameEleganceScore, MoveClass};
use crate::scheduler::{AnalysisScheduler, CancellationSignal};
use crate::scoring::ScoringPolicy;
use chess_replay::{read_games, Game};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// A computed value fell outside its expected range.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("case '{case}': {metric} is {observed}, expected {expected}")]
pub struct GoldenMismatch {
    pub case: String,
    pub metric: String,
    pub observed: String,
    pub expected: String,
}

#[derive(Error, Debug)]
pub enum GoldenError {
    #[error("Failed to read manifest: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid case '{case}': {reason}")]
    InvalidCase { case: String, reason: String },
    #[error(transparent)]
    Mismatch(#[from] GoldenMismatch),
    #[error("Case '{case}' failed: {reason}")]
    CaseFailed { case: String, reason: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Inclusive `[low, high]` range for one sub-score.
pub type ScoreRange = [f64; 2];

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ExpectedScores {
    pub composite: Option<ScoreRange>,
    pub soundness: Option<ScoreRange>,
    pub coherence: Option<ScoreRange>,
    pub tactical: Option<ScoreRange>,
    pub quiet: Option<ScoreRange>,
}

impl ExpectedScores {
    fn range(&self, metric: &str) -> Option<ScoreRange> {
        match metric {
            "composite" => self.composite,
            "soundness" => self.soundness,
            "coherence" => self.coherence,
            "tactical" => self.tactical,
            "quiet" => self.quiet,
            _ => None,
        }
    }

    fn all(&self) -> impl Iterator<Item = ScoreRange> + '_ {
        [
            self.composite,
            self.soundness,
            self.coherence,
            self.tactical,
            self.quiet,
        ]
        .into_iter()
        .flatten()
    }
}

/// Expected class of the move that produces position `ply`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExpectedClass {
    pub ply: usize,
    pub class: MoveClass,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GoldenCase {
    pub name: String,
    /// Moves in SAN or UCI form; ignored when `pgn` is given.
    #[serde(default)]
    pub moves: Vec<String>,
    /// A full PGN game, the first game in the text is used.
    #[serde(default)]
    pub pgn: Option<String>,
    /// Starting position for `moves`.
    #[serde(default)]
    pub fen: Option<String>,
    /// Overrides the manifest's engine depth.
    #[serde(default)]
    pub depth: Option<u32>,
    /// Overrides the manifest's tolerance.
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub expect: ExpectedScores,
    #[serde(default)]
    pub classifications: Vec<ExpectedClass>,
}

impl GoldenCase {
    /// The game this case analyses.
    pub fn game(&self) -> Result<Game, GoldenError> {
        match &self.pgn {
            Some(text) => read_games(text)
                .map_err(|e| self.invalid(e.to_string()))?
                .into_iter()
                .next()
                .ok_or_else(|| self.invalid("pgn contains no game".to_string())),
            None => {
                let game = Game::from_moves(self.moves.as_slice()).with_header("Event", self.name.clone());
                Ok(match &self.fen {
                    Some(fen) => game.with_header("SetUp", "1").with_header("FEN", fen.clone()),
                    None => game,
                })
            }
        }
    }

    fn invalid(&self, reason: String) -> GoldenError {
        GoldenError::InvalidCase {
            case: self.name.clone(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GoldenManifest {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Slack added on both sides of every expected range.
    #[serde(default)]
    pub tolerance: f64,
    #[serde(default, rename = "case")]
    pub cases: Vec<GoldenCase>,
}

impl GoldenManifest {
    pub fn load(path: &Path) -> Result<Self, GoldenError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    pub fn from_toml(text: &str) -> Result<Self, GoldenError> {
        let manifest: Self = toml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), GoldenError> {
        let mut names = HashSet::new();
        for case in &self.cases {
            if case.name.trim().is_empty() {
                return Err(case.invalid("name must not be empty".to_string()));
            }
            if !names.insert(case.name.as_str()) {
                return Err(case.invalid("duplicate case name".to_string()));
            }
            if case.depth == Some(0) {
                return Err(case.invalid("depth must be at least 1".to_string()));
            }
            if case.expect.all().any(|[lo, hi]| lo > hi) {
                return Err(case.invalid("expected range has low above high".to_string()));
            }
            case.game()?;
        }
        Ok(())
    }
}

/// Outcome of one case.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CaseResult {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<GoldenMismatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<GameEleganceScore>,
}

impl CaseResult {
    fn failed(name: &str, error: String) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            mismatch: None,
            error: Some(error),
            score: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GoldenReport {
    pub total: usize,
    pub passed: usize,
    pub cases: Vec<CaseResult>,
}

impl GoldenReport {
    pub fn is_success(&self) -> bool {
        self.passed == self.total
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.cases.iter().filter(|c| !c.passed)
    }

    /// The first failing case as an error.
    pub fn ensure_passed(&self) -> Result<(), GoldenError> {
        match self.failures().next() {
            None => Ok(()),
            Some(CaseResult {
                mismatch: Some(m), ..
            }) => Err(GoldenError::Mismatch(m.clone())),
            Some(case) => Err(GoldenError::CaseFailed {
                case: case.name.clone(),
                reason: case.error.clone().unwrap_or_default(),
            }),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs every case of a manifest through replay, engine analysis and scoring.
pub struct GoldenHarness {
    manifest: GoldenManifest,
    policy: ScoringPolicy,
}

impl GoldenHarness {
    pub fn new(manifest: GoldenManifest) -> Self {
        Self {
            manifest,
            policy: ScoringPolicy::default(),
        }
    }

    /// Use this engine instead of the one named in the manifest.
    pub fn with_engine_path(mut self, path: impl AsRef<Path>) -> Self {
        self.manifest.engine.path = path.as_ref().to_path_buf();
        self
    }

    /// Score with `policy` instead of the defaults. Fails if the policy
    /// does not validate.
    pub fn with_policy(mut self, policy: ScoringPolicy) -> Result<Self, GoldenError> {
        policy.validate()?;
        self.policy = policy;
        Ok(self)
    }

    pub fn manifest(&self) -> &GoldenManifest {
        &self.manifest
    }

    /// Run all cases in manifest order. A failing case never stops the run.
    pub async fn run(&self) -> GoldenReport {
        let mut cases = Vec::with_capacity(self.manifest.cases.len());
        for case in &self.manifest.cases {
            let result = self.run_case(case).await;
            if result.passed {
                info!(case = %case.name, "golden case passed");
            } else {
                warn!(case = %case.name, mismatch = ?result.mismatch, error = ?result.error, "golden case failed");
            }
            cases.push(result);
        }

        GoldenReport {
            total: cases.len(),
            passed: cases.iter().filter(|c| c.passed).count(),
            cases,
        }
    }

    async fn run_case(&self, case: &GoldenCase) -> CaseResult {
        let game = match case.game() {
            Ok(game) => game,
            Err(e) => return CaseResult::failed(&case.name, e.to_string()),
        };

        let mut engine = self.manifest.engine.clone();
        if let Some(depth) = case.depth {
            engine.depth = depth;
        }
        let scheduler =
            AnalysisScheduler::new(engine, SchedulerConfig::default().with_max_concurrency(1))
                .with_policy(self.policy.clone());
        let report = scheduler
            .analyze_games(vec![game], CancellationSignal::new())
            .collect_ordered()
            .await
            .into_iter()
            .next();

        match report.map(|r| r.outcome) {
            Some(Ok(analysis)) => {
                let tolerance = case.tolerance.unwrap_or(self.manifest.tolerance);
                let mismatch = check_case(case, &analysis, tolerance);
                CaseResult {
                    name: case.name.clone(),
                    passed: mismatch.is_none(),
                    mismatch,
                    error: None,
                    score: Some(analysis.score),
                }
            }
            Some(Err(e)) => CaseResult::failed(&case.name, e.to_string()),
            None => CaseResult::failed(&case.name, "no result produced".to_string()),
        }
    }
}

/// First metric, then first move class, that does not match the case.
fn check_case(case: &GoldenCase, analysis: &GameAnalysis, tolerance: f64) -> Option<GoldenMismatch> {
    let mismatch = |metric: String, observed: String, expected: String| GoldenMismatch {
        case: case.name.clone(),
        metric,
        observed,
        expected,
    };

    for (metric, observed) in analysis.score.metrics() {
        let Some([lo, hi]) = case.expect.range(metric) else {
            continue;
        };
        if observed < lo - tolerance || observed > hi + tolerance {
            return Some(mismatch(
                metric.to_string(),
                format!("{:.2}", observed),
                format!("[{}, {}] ± {}", lo, hi, tolerance),
            ));
        }
    }

    for expected in &case.classifications {
        let observed = analysis.moves.iter().find(|r| r.ply == expected.ply);
        match observed {
            Some(record) if record.class == expected.class => {}
            Some(record) => {
                return Some(mismatch(
                    format!("class of ply {} ({})", expected.ply, record.move_text),
                    record.class.to_string(),
                    expected.class.to_string(),
                ))
            }
            None => {
                return Some(mismatch(
                    format!("class of ply {}", expected.ply),
                    "no such move".to_string(),
                    expected.class.to_string(),
                ))
            }
        }
    }

    None
}
