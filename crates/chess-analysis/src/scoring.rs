//! Elegance scoring of an evaluated game.
//!
//! The scorer is a pure function of the move list and one evaluation per
//! position; it never talks to an engine. All thresholds and weights live in
//! [`ScoringPolicy`] so they can be tuned against the golden cases.

use crate::config::ConfigError;
use crate::quality::{GameEleganceScore, MoveClass, MoveQualityRecord};
use crate::Evaluation;
use chess_replay::{Color, PlayedMove};
use serde::{Deserialize, Serialize};

/// Relative weight of each sub-score in the composite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub soundness: f64,
    pub coherence: f64,
    pub tactical: f64,
    pub quiet: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            soundness: 0.40,
            coherence: 0.25,
            tactical: 0.15,
            quiet: 0.20,
        }
    }
}

/// Largest accepted `mate_value`.
pub const MAX_MATE_VALUE: i32 = 100_000;

/// Thresholds and weights used by [`EleganceScorer`].
///
/// Centipawn values are from the mover's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Saturation value for mate scores and large centipawn scores.
    pub mate_value: i32,
    /// A drop of at least this much is a blunder.
    pub blunder_threshold: i32,
    /// Swings within this band count as no change.
    pub noise_band: i32,
    /// Minimum gain for a forcing move to count as tactical.
    pub tactical_gain: i32,
    /// Plies looked ahead when measuring a tactical gain.
    pub tactical_window: usize,
    /// Quiet moves only count when the mover is no worse than this.
    pub balance_floor: i32,
    pub blunder_weight: f64,
    pub inaccuracy_weight: f64,
    /// Inaccuracy losses in games longer than this many moves are scaled
    /// down by length. Blunder losses never are.
    pub reference_length: usize,
    /// Standard deviation of the trajectory that halves coherence.
    pub coherence_scale: f64,
    /// Accumulated gain that brings the tactical score to ~63.
    pub tactical_scale: f64,
    pub weights: CompositeWeights,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            mate_value: 1000,
            blunder_threshold: 300,
            noise_band: 50,
            tactical_gain: 150,
            tactical_window: 3,
            balance_floor: -100,
            blunder_weight: 2.0,
            inaccuracy_weight: 1.0,
            reference_length: 40,
            coherence_scale: 100.0,
            tactical_scale: 300.0,
            weights: CompositeWeights::default(),
        }
    }
}

impl ScoringPolicy {
    /// Reject policies the scorer cannot evaluate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_MATE_VALUE).contains(&self.mate_value) {
            return Err(ConfigError::Invalid(format!(
                "mate_value must be between 1 and {MAX_MATE_VALUE}"
            )));
        }
        if self.blunder_threshold <= 0 {
            return Err(ConfigError::Invalid("blunder_threshold must be positive".to_string()));
        }
        if self.noise_band < 0 || self.tactical_gain < 0 {
            return Err(ConfigError::Invalid(
                "noise_band and tactical_gain must not be negative".to_string(),
            ));
        }
        if self.balance_floor.saturating_abs() > MAX_MATE_VALUE {
            return Err(ConfigError::Invalid(format!(
                "balance_floor must be within {MAX_MATE_VALUE} of zero"
            )));
        }
        if !(self.coherence_scale.is_finite() && self.coherence_scale > 0.0)
            || !(self.tactical_scale.is_finite() && self.tactical_scale > 0.0)
        {
            return Err(ConfigError::Invalid(
                "coherence_scale and tactical_scale must be positive".to_string(),
            ));
        }
        let w = &self.weights;
        let weights = [
            self.blunder_weight,
            self.inaccuracy_weight,
            w.soundness,
            w.coherence,
            w.tactical,
            w.quiet,
        ];
        if weights.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return Err(ConfigError::Invalid(
                "weights must be finite and not negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Classify one move; the first matching rule wins.
    pub fn classify(&self, delta: i32, gain: i32, forcing: bool) -> MoveClass {
        if delta <= -self.blunder_threshold {
            MoveClass::Blunder
        } else if forcing && gain >= self.tactical_gain {
            MoveClass::Tactical
        } else if delta < -self.noise_band {
            MoveClass::Inaccuracy
        } else if !forcing && delta.abs() <= self.noise_band {
            MoveClass::Quiet
        } else {
            MoveClass::Neutral
        }
    }
}

/// Per-move records and the aggregate score of one game.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredGame {
    pub moves: Vec<MoveQualityRecord>,
    pub score: GameEleganceScore,
}

#[derive(Debug, Clone, Default)]
pub struct EleganceScorer {
    policy: ScoringPolicy,
}

impl EleganceScorer {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Score a game from its moves and the engine evaluation of every
    /// position, each from the side to move there.
    ///
    /// `evaluations` holds one entry per position, so one more than `moves`.
    /// Extra entries on either side are ignored.
    pub fn score(&self, moves: &[PlayedMove], evaluations: &[Evaluation]) -> ScoredGame {
        let p = &self.policy;
        let n = moves.len().min(evaluations.len().saturating_sub(1));
        let moves = &moves[..n];

        let white: Vec<i32> = evaluations[..evaluations.len().min(n + 1)]
            .iter()
            .enumerate()
            .map(|(pos, eval)| eval.white_centipawns(white_to_move_at(moves, pos), p.mate_value))
            .collect();

        let records: Vec<MoveQualityRecord> = moves
            .iter()
            .enumerate()
            .map(|(i, mv)| {
                let sign = if mv.mover == Color::White { 1 } else { -1 };
                let before = sign * white[i];
                let after = sign * white[i + 1];
                let delta = after - before;
                let best_ahead = (1..=p.tactical_window)
                    .take_while(|k| i + k <= n)
                    .map(|k| sign * white[i + k])
                    .max()
                    .unwrap_or(after);
                let gain = best_ahead - before;
                let forcing = mv.is_capture || mv.gives_check;
                let white_eval_after = if white_to_move_at(moves, i + 1) {
                    evaluations[i + 1]
                } else {
                    evaluations[i + 1].flip()
                };

                MoveQualityRecord {
                    ply: mv.ply,
                    move_text: mv.text.clone(),
                    mover: mv.mover,
                    before,
                    after,
                    delta,
                    gain,
                    class: p.classify(delta, gain, forcing),
                    white_eval_after,
                }
            })
            .collect();

        let score = self.aggregate(&records, &white);
        ScoredGame {
            moves: records,
            score,
        }
    }

    fn aggregate(&self, records: &[MoveQualityRecord], white: &[i32]) -> GameEleganceScore {
        let soundness = bounded(self.soundness(records));
        let coherence = bounded(self.coherence(white));
        let tactical = bounded(self.tactical(records));
        let quiet = bounded(self.quiet(records));

        let w = &self.policy.weights;
        let total = w.soundness + w.coherence + w.tactical + w.quiet;
        let composite = if total > 0.0 {
            bounded(
                (w.soundness * soundness
                    + w.coherence * coherence
                    + w.tactical * tactical
                    + w.quiet * quiet)
                    / total,
            )
        } else {
            0.0
        };

        GameEleganceScore {
            soundness,
            coherence,
            tactical,
            quiet,
            composite,
        }
    }

    fn soundness(&self, records: &[MoveQualityRecord]) -> f64 {
        let p = &self.policy;
        let cap = f64::from(p.mate_value);
        let swing = |r: &MoveQualityRecord| f64::from(r.delta.saturating_abs()).min(cap) / cap;

        let blunders: f64 = records
            .iter()
            .filter(|r| r.class == MoveClass::Blunder)
            .map(|r| p.blunder_weight * swing(r))
            .sum();
        let inaccuracies: f64 = records
            .iter()
            .filter(|r| r.class == MoveClass::Inaccuracy)
            .map(|r| p.inaccuracy_weight * swing(r))
            .sum();

        // Only small errors are diluted by game length; a blunder costs the
        // same in move 10 as in move 60.
        let reference = p.reference_length.max(1) as f64;
        let loss = blunders + inaccuracies * reference / (records.len() as f64).max(reference);
        100.0 / (1.0 + loss)
    }

    fn coherence(&self, white: &[i32]) -> f64 {
        if white.len() < 3 {
            return 100.0;
        }
        let diffs: Vec<f64> = white.windows(2).map(|w| f64::from(w[1] - w[0])).collect();
        let count = diffs.len() as f64;
        let mean = diffs.iter().sum::<f64>() / count;
        let variance = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / count;
        100.0 / (1.0 + variance.sqrt() / self.policy.coherence_scale)
    }

    fn tactical(&self, records: &[MoveQualityRecord]) -> f64 {
        let p = &self.policy;
        let total: f64 = records
            .iter()
            .filter(|r| r.class == MoveClass::Tactical)
            .map(|r| f64::from(r.gain.min(p.mate_value)) / p.tactical_scale)
            .sum();
        100.0 * (1.0 - (-total).exp())
    }

    fn quiet(&self, records: &[MoveQualityRecord]) -> f64 {
        if records.is_empty() {
            return 0.0;
        }
        let balanced = records
            .iter()
            .filter(|r| r.class == MoveClass::Quiet && r.after >= self.policy.balance_floor)
            .count();
        100.0 * balanced as f64 / records.len() as f64
    }
}

/// Side to move at position `pos`, derived from who made the surrounding moves.
fn white_to_move_at(moves: &[PlayedMove], pos: usize) -> bool {
    match moves.get(pos) {
        Some(mv) => mv.mover == Color::White,
        None => moves.last().map_or(true, |last| last.mover == Color::Black),
    }
}

fn bounded(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
