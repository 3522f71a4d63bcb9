//! Game records and board state replay.
//!
//! - [`Game`]: headers, move texts and result as read from PGN.
//! - [`Replayer`]: turns a move list into one [`Position`] per ply plus the
//!   starting position, failing with [`InvalidMoveError`] at the first
//!   illegal move.
//! - [`pgn`]: a small PGN reader and movetext writer.

mod game;
pub mod pgn;
mod replay;
pub mod san;

pub use chess::Color;
pub use game::{Game, UNKNOWN_RESULT};
pub use pgn::{read_games, PgnError};
pub use replay::{
    replay_game, InvalidMoveError, PlayedMove, Position, Replay, ReplayError, Replayer,
};
