//! Per-game analysis: replay, evaluate every position, score.

use crate::config::EngineConfig;
use crate::engine::{EngineError, EngineEvaluation, EngineSession, SessionCounter, SessionState};
use crate::quality::{GameEleganceScore, MoveQualityRecord};
use crate::scheduler::{CancellationSignal, PositionProgress, ProgressObserver};
use crate::scoring::EleganceScorer;
use crate::Evaluation;
use chess_replay::{replay_game, Game, InvalidMoveError, ReplayError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Why a single game could not be analysed.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    InvalidMove(#[from] InvalidMoveError),
    #[error("Invalid starting position: {0}")]
    InvalidStart(String),
    #[error("Analysis cancelled")]
    Cancelled,
    /// The worker analysing the game stopped unexpectedly.
    #[error("Analysis worker failed: {0}")]
    WorkerFailed(String),
}

impl From<ReplayError> for AnalysisError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::InvalidMove(e) => AnalysisError::InvalidMove(e),
            other => AnalysisError::InvalidStart(other.to_string()),
        }
    }
}

/// Complete analysis of one game.
#[derive(Debug, Clone)]
pub struct GameAnalysis {
    /// Engine name as reported by the engine.
    pub engine: String,
    pub depth: u32,
    /// One evaluation per position, starting position first.
    pub evaluations: Vec<EngineEvaluation>,
    pub moves: Vec<MoveQualityRecord>,
    pub score: GameEleganceScore,
    /// Sessions replaced after a fault while analysing this game.
    pub restarts: u32,
}

/// Everything a worker needs besides its own session.
pub(crate) struct AnalysisContext {
    pub engine: Arc<EngineConfig>,
    pub scorer: EleganceScorer,
    pub max_consecutive_faults: u32,
    pub observer: Option<Arc<dyn ProgressObserver>>,
    pub cancel: CancellationSignal,
}

/// The session a worker owns, started lazily and reused across games.
pub(crate) struct SessionSlot {
    config: Arc<EngineConfig>,
    counter: SessionCounter,
    session: Option<EngineSession>,
    /// The current session has evaluated something since it started.
    used: bool,
}

impl SessionSlot {
    pub(crate) fn new(config: Arc<EngineConfig>, counter: SessionCounter) -> Self {
        Self {
            config,
            counter,
            session: None,
            used: false,
        }
    }

    async fn session(&mut self) -> Result<&mut EngineSession, EngineError> {
        if self.session.is_none() {
            let session = EngineSession::start_counted(self.config.clone(), &self.counter).await?;
            self.session = Some(session);
            self.used = false;
        }
        self.session
            .as_mut()
            .ok_or(EngineError::InvalidState(SessionState::NotStarted))
    }

    /// Reset a session that already served a game; drop it if it will not reset.
    async fn begin_game(&mut self) {
        if !self.used {
            return;
        }
        let failed = match self.session.as_mut() {
            Some(session) => match session.new_game().await {
                Ok(()) => false,
                Err(e) => {
                    warn!(error = %e, "engine failed to reset between games");
                    true
                }
            },
            None => false,
        };
        if failed {
            self.discard().await;
        }
    }

    /// Ask the engine to stop; drop it if it does not answer.
    async fn stop(&mut self) {
        let failed = match self.session.as_mut() {
            Some(session) => session.stop().await.is_err(),
            None => false,
        };
        if failed {
            self.discard().await;
        }
    }

    /// Shut the current session down, if any.
    pub(crate) async fn discard(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown().await;
        }
        self.used = false;
    }

    fn engine_name(&self) -> String {
        match &self.session {
            Some(session) => session.name().to_string(),
            None => self.config.path.display().to_string(),
        }
    }
}

/// Analyse one game on the worker's session.
///
/// A session fault replaces the session and retries the same position; the
/// game fails once `max_consecutive_faults` faults happen in a row.
pub(crate) async fn analyze_game(
    ctx: &AnalysisContext,
    slot: &mut SessionSlot,
    index: usize,
    game: &Game,
) -> Result<GameAnalysis, AnalysisError> {
    let replay = replay_game(game)?;
    if ctx.cancel.is_cancelled() {
        return Err(AnalysisError::Cancelled);
    }
    slot.begin_game().await;

    let depth = ctx.engine.depth;
    let total = replay.positions.len();
    let max_faults = ctx.max_consecutive_faults.max(1);
    let mut evaluations: Vec<EngineEvaluation> = Vec::with_capacity(total);
    let mut consecutive_faults = 0;
    let mut restarts = 0;

    while evaluations.len() < total {
        if ctx.cancel.is_cancelled() {
            debug!(game = index, "cancelled, stopping engine");
            slot.stop().await;
            return Err(AnalysisError::Cancelled);
        }

        let position = &replay.positions[evaluations.len()];
        let session = slot.session().await?;
        match session.evaluate_position(position, depth).await {
            Ok(evaluation) => {
                slot.used = true;
                consecutive_faults = 0;
                evaluations.push(evaluation);
                if let Some(observer) = &ctx.observer {
                    observer.on_position(
                        index,
                        PositionProgress {
                            processed: evaluations.len(),
                            total,
                        },
                    );
                }
            }
            Err(e) if e.is_session_fault() => {
                consecutive_faults += 1;
                slot.discard().await;
                if consecutive_faults >= max_faults {
                    error!(game = index, ply = position.ply, error = %e, "engine keeps failing, giving up on game");
                    return Err(e.into());
                }
                restarts += 1;
                warn!(game = index, ply = position.ply, error = %e, "engine fault, restarting session");
            }
            Err(e) => {
                slot.discard().await;
                return Err(e.into());
            }
        }
    }

    let scores: Vec<Evaluation> = evaluations.iter().map(|e| e.score).collect();
    let scored = ctx.scorer.score(&replay.moves, &scores);
    info!(game = index, label = %game.label(), score = %scored.score, "game analysed");

    Ok(GameAnalysis {
        engine: slot.engine_name(),
        depth,
        evaluations,
        moves: scored.moves,
        score: scored.score,
        restarts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_errors_map_to_analysis_errors() {
        let game = Game::from_moves(&["e4", "e4"]);
        let err: AnalysisError = replay_game(&game).unwrap_err().into();
        match err {
            AnalysisError::InvalidMove(e) => assert_eq!(e.ply, 2),
            other => panic!("expected invalid move, got {other:?}"),
        }

        let game = Game::from_moves::<&str>(&[]).with_header("FEN", "not a fen");
        let err: AnalysisError = replay_game(&game).unwrap_err().into();
        assert!(matches!(err, AnalysisError::InvalidStart(_)));
    }

    #[test]
    fn test_cancelled_display() {
        assert_eq!(AnalysisError::Cancelled.to_string(), "Analysis cancelled");
    }
}
