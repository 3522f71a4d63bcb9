//! Move quality classification and per-game elegance scores.

use crate::Evaluation;
use chess_replay::Color;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category assigned to a single move from the evaluation swing it caused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveClass {
    /// The mover gave away at least a minor piece worth of evaluation.
    Blunder,
    /// A noticeable but smaller loss.
    Inaccuracy,
    /// A capture or check that the following plies show was winning.
    Tactical,
    /// A non-forcing move that kept the balance.
    Quiet,
    /// Anything else.
    Neutral,
}

impl MoveClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveClass::Blunder => "Blunder",
            MoveClass::Inaccuracy => "Inaccuracy",
            MoveClass::Tactical => "Tactical",
            MoveClass::Quiet => "Quiet",
            MoveClass::Neutral => "Neutral",
        }
    }
}

impl fmt::Display for MoveClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoring result for one move.
///
/// `before`, `after` and `delta` are saturated centipawns from the mover's
/// point of view, so a negative delta always means the mover lost ground.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveQualityRecord {
    /// 1-based ply of the move within the game.
    pub ply: usize,
    /// Move as written in the game record.
    pub move_text: String,
    pub mover: Color,
    pub before: i32,
    pub after: i32,
    pub delta: i32,
    /// Best evaluation the mover reached within the tactical window, minus `before`.
    pub gain: i32,
    pub class: MoveClass,
    /// Engine evaluation of the resulting position from White's point of view.
    pub white_eval_after: Evaluation,
}

/// The four sub-scores and their weighted composite, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameEleganceScore {
    pub soundness: f64,
    pub coherence: f64,
    pub tactical: f64,
    pub quiet: f64,
    pub composite: f64,
}

impl GameEleganceScore {
    /// Named sub-scores in report order.
    pub fn metrics(&self) -> [(&'static str, f64); 5] {
        [
            ("soundness", self.soundness),
            ("coherence", self.coherence),
            ("tactical", self.tactical),
            ("quiet", self.quiet),
            ("composite", self.composite),
        ]
    }
}

impl fmt::Display for GameEleganceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "composite {:.1} (soundness {:.1}, coherence {:.1}, tactical {:.1}, quiet {:.1})",
            self.composite, self.soundness, self.coherence, self.tactical, self.quiet
        )
    }
}
