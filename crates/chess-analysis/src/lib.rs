//! Engine-driven game analysis and elegance scoring.
//!
//! This crate drives UCI analysis engines over every position of a game and
//! turns the resulting evaluation trajectory into an elegance score.
//!
//! # Overview
//!
//! - [`EngineSession`] - One engine subprocess: handshake, fixed-depth search, shutdown
//! - [`AnalysisScheduler`] - Bounded pool of sessions analysing a batch of games
//! - [`EleganceScorer`] - Move classification and the four sub-scores plus composite
//! - [`annotate_game`] - PGN output with summary tags and per-move comments
//! - [`GoldenHarness`] - Regression cases with expected score ranges
//!
//! # Example
//!
//! ```ignore
//! use chess_analysis::{AnalysisScheduler, CancellationSignal, EngineConfig, SchedulerConfig};
//! use futures_util::StreamExt;
//!
//! let scheduler = AnalysisScheduler::new(EngineConfig::new("stockfish"), SchedulerConfig::default());
//! let mut reports = scheduler.analyze_games(games, CancellationSignal::new());
//! while let Some(report) = reports.next().await {
//!     println!("{}", report.status_line());
//! }
//! ```

pub mod analyzer;
pub mod annotate;
pub mod config;
pub mod engine;
pub mod evaluation;
pub mod golden;
pub mod quality;
pub mod scheduler;
pub mod scoring;

pub use analyzer::{AnalysisError, GameAnalysis};
pub use annotate::annotate_game;
pub use config::{ConfigError, EngineConfig, SchedulerConfig};
pub use engine::{
    EngineError, EngineEvaluation, EnginePhase, EngineSession, SessionCounter, SessionState,
};
pub use evaluation::Evaluation;
pub use golden::{GoldenError, GoldenHarness, GoldenManifest, GoldenMismatch, GoldenReport};
pub use quality::{GameEleganceScore, MoveClass, MoveQualityRecord};
pub use scheduler::{
    AnalysisScheduler, AnalysisStream, CancellationSignal, GameProgress, GameReport,
    PositionProgress, ProgressObserver,
};
pub use scoring::{CompositeWeights, EleganceScorer, ScoredGame, ScoringPolicy};
