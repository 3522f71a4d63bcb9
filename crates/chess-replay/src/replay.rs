//! Board State Replayer: turns a move list into the positions it passes through.

use crate::san::{san_to_move, uci_to_move};
use crate::Game;
use chess::{Board, BoardStatus, ChessMove, Color, Piece};
use std::str::FromStr;
use thiserror::Error;

/// A board-state snapshot and its ply index within the game.
///
/// Ply 0 is the starting position; ply `k` is the position after the
/// `k`-th half-move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// Full FEN including castling, en passant and move counters.
    pub fen: String,
    pub ply: usize,
    pub side_to_move: Color,
}

impl Position {
    pub fn white_to_move(&self) -> bool {
        self.side_to_move == Color::White
    }
}

/// Facts about one played move that scoring needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    /// Ply of the position this move produces (first move is ply 1).
    pub ply: usize,
    /// The move as it appeared in the game record.
    pub text: String,
    /// The same move in UCI long algebraic form.
    pub uci: String,
    pub mover: Color,
    pub is_capture: bool,
    pub gives_check: bool,
    pub is_checkmate: bool,
}

/// Output of a successful replay: `moves.len() + 1` positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    pub positions: Vec<Position>,
    pub moves: Vec<PlayedMove>,
}

/// The first illegal move of a move list.
///
/// `positions` holds every position reached before the failing move, so
/// callers can still report where the game went wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal move '{move_text}' at ply {ply}: {reason}")]
pub struct InvalidMoveError {
    pub ply: usize,
    pub move_text: String,
    pub reason: String,
    pub positions: Vec<Position>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },
    #[error(transparent)]
    InvalidMove(#[from] InvalidMoveError),
}

/// Replays move lists from a fixed starting position.
///
/// Deterministic and side-effect free; the same replayer can be reused for
/// any number of move lists.
#[derive(Debug, Clone)]
pub struct Replayer {
    start: Board,
    halfmove_clock: u32,
    fullmove_number: u32,
}

impl Default for Replayer {
    fn default() -> Self {
        Self {
            start: Board::default(),
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }
}

impl Replayer {
    /// Replayer starting from the standard initial setup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replayer starting from an arbitrary FEN. Missing move counters
    /// default to `0 1`.
    pub fn from_fen(fen: &str) -> Result<Self, ReplayError> {
        let start = Board::from_str(fen).map_err(|e| ReplayError::InvalidFen {
            fen: fen.to_string(),
            reason: e.to_string(),
        })?;

        let fields: Vec<&str> = fen.split_whitespace().collect();
        let halfmove_clock = fields.get(4).and_then(|s| s.parse().ok()).unwrap_or(0);
        let fullmove_number = fields
            .get(5)
            .and_then(|s| s.parse().ok())
            .unwrap_or(1u32)
            .max(1);

        Ok(Self {
            start,
            halfmove_clock,
            fullmove_number,
        })
    }

    /// Replayer for a game's own starting position (its `FEN` header, if any).
    pub fn for_game(game: &Game) -> Result<Self, ReplayError> {
        match game.starting_fen() {
            Some(fen) => Self::from_fen(fen),
            None => Ok(Self::new()),
        }
    }

    /// Fullmove number of the starting position.
    pub fn starting_fullmove(&self) -> u32 {
        self.fullmove_number
    }

    pub fn starting_side(&self) -> Color {
        self.start.side_to_move()
    }

    /// Applies `moves` in order, producing one position per ply plus the
    /// starting one.
    ///
    /// Moves may be given in SAN or in UCI long algebraic form.
    pub fn replay<S: AsRef<str>>(&self, moves: &[S]) -> Result<Replay, InvalidMoveError> {
        let mut board = self.start;
        let mut halfmove_clock = self.halfmove_clock;
        let mut fullmove_number = self.fullmove_number;

        let mut positions = Vec::with_capacity(moves.len() + 1);
        positions.push(snapshot(&board, 0, halfmove_clock, fullmove_number));
        let mut played = Vec::with_capacity(moves.len());

        for (index, text) in moves.iter().enumerate() {
            let text = text.as_ref();
            let ply = index + 1;

            let mv = match resolve(&board, text) {
                Ok(mv) => mv,
                Err(reason) => {
                    return Err(InvalidMoveError {
                        ply,
                        move_text: text.to_string(),
                        reason,
                        positions,
                    })
                }
            };

            let mover = board.side_to_move();
            let moving_piece = board.piece_on(mv.get_source());
            let is_pawn = moving_piece == Some(Piece::Pawn);
            // Diagonal pawn moves onto an empty square are en passant captures.
            let is_capture = board.piece_on(mv.get_dest()).is_some()
                || (is_pawn && mv.get_source().get_file() != mv.get_dest().get_file());

            let next = board.make_move_new(mv);

            halfmove_clock = if is_pawn || is_capture {
                0
            } else {
                halfmove_clock + 1
            };
            if mover == Color::Black {
                fullmove_number += 1;
            }

            played.push(PlayedMove {
                ply,
                text: text.to_string(),
                uci: mv.to_string(),
                mover,
                is_capture,
                gives_check: next.checkers().popcnt() > 0,
                is_checkmate: next.status() == BoardStatus::Checkmate,
            });

            board = next;
            positions.push(snapshot(&board, ply, halfmove_clock, fullmove_number));
        }

        Ok(Replay {
            positions,
            moves: played,
        })
    }
}

/// Replays a game from its own starting position.
pub fn replay_game(game: &Game) -> Result<Replay, ReplayError> {
    Ok(Replayer::for_game(game)?.replay(game.moves())?)
}

fn resolve(board: &Board, text: &str) -> Result<ChessMove, String> {
    match san_to_move(board, text) {
        Ok(mv) => Ok(mv),
        Err(san_err) => uci_to_move(board, text.trim()).ok_or_else(|| san_err.to_string()),
    }
}

fn snapshot(board: &Board, ply: usize, halfmove_clock: u32, fullmove_number: u32) -> Position {
    // The board only tracks placement, side, castling and en passant; the
    // counters are ours.
    let fen = board.to_string();
    let fields: Vec<&str> = fen.split_whitespace().take(4).collect();
    Position {
        fen: format!("{} {} {}", fields.join(" "), halfmove_clock, fullmove_number),
        ply,
        side_to_move: board.side_to_move(),
    }
}
