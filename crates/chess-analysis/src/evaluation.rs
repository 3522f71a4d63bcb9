//! Chess position evaluation types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uci::Score;

/// Represents a chess position evaluation.
///
/// Evaluations can be either centipawn scores (for normal positions)
/// or mate scores (when a forced mate is found). Engines report both from
/// the side to move's point of view; [`Evaluation::flip`] switches sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evaluation {
    /// Centipawn evaluation
    Centipawns(i32),
    /// Mate in N moves (positive = side wins, negative = side gets mated,
    /// zero = side is already mated)
    Mate(i32),
}

impl Evaluation {
    /// Convert a UCI score into an evaluation.
    pub fn from_uci_score(score: Score) -> Self {
        match score {
            Score::Cp(cp) => Evaluation::Centipawns(cp),
            Score::Mate(n) => Evaluation::Mate(n),
        }
    }

    /// The same evaluation seen by the other side.
    ///
    /// `Mate(0)` has no sign to flip; saturate with [`Self::to_centipawns`]
    /// before changing perspective when it may occur.
    pub fn flip(self) -> Self {
        match self {
            Evaluation::Centipawns(cp) => Evaluation::Centipawns(-cp),
            Evaluation::Mate(n) => Evaluation::Mate(-n),
        }
    }

    /// Saturated centipawns from White's point of view, given who was to
    /// move when the engine produced this evaluation.
    pub fn white_centipawns(self, white_to_move: bool, cap: i32) -> i32 {
        let own = self.to_centipawns(cap);
        if white_to_move {
            own
        } else {
            -own
        }
    }

    pub fn is_mate(&self) -> bool {
        matches!(self, Evaluation::Mate(_))
    }

    /// Centipawn-equivalent value clamped to `±cap`.
    ///
    /// Mate scores saturate to the cap: a mate for the side is `+cap`, a
    /// mate against it (including `Mate(0)`) is `-cap`.
    pub fn to_centipawns(self, cap: i32) -> i32 {
        match self {
            Evaluation::Centipawns(cp) => cp.clamp(-cap, cap),
            Evaluation::Mate(n) if n > 0 => cap,
            Evaluation::Mate(_) => -cap,
        }
    }
}

impl fmt::Display for Evaluation {
    /// Pawn units with two decimals (`+0.35`), or `#N` for mates.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Centipawns(cp) => {
                let sign = if *cp < 0 { "-" } else { "+" };
                let abs = cp.unsigned_abs();
                write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
            }
            Evaluation::Mate(n) => write!(f, "#{}", n),
        }
    }
}
