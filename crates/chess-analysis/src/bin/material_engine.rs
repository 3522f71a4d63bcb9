//! Material-only reference engine.
//!
//! A small deterministic UCI engine used by the integration tests and the
//! golden cases: negamax with alpha-beta over material, capture quiescence,
//! and mate detection. It answers `go depth N` with one info line per
//! completed iteration followed by `bestmove`.
//!
//! `FailOnSearch` and `FailMode` make the engine misbehave on purpose on the
//! n-th search so callers can exercise their fault handling.

use chess::{Board, BoardStatus, ChessMove, Color, MoveGen, Piece, ALL_PIECES};
use std::io::{BufReader, Stdin, Stdout};
use std::str::FromStr;
use std::time::Instant;
use uci::{stdio_engine, EngineMessage, GuiCommand, InfoBuilder, UciEngine, UciError};

type StdioEngine = UciEngine<BufReader<Stdin>, Stdout>;

const MATE: i32 = 30_000;
const INFINITY: i32 = MATE + 1;
/// Scores beyond this are mate scores.
const MATE_BOUND: i32 = MATE - 1_000;
const DEFAULT_DEPTH: u32 = 4;

/// Piece values in centipawns
fn piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => 100,
        Piece::Knight => 300,
        Piece::Bishop => 300,
        Piece::Rook => 500,
        Piece::Queen => 900,
        Piece::King => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailMode {
    /// Exit without answering.
    Crash,
    /// Print a line that is not part of the protocol.
    Garbage,
    /// Never answer the search.
    Hang,
    /// Answer `bestmove` without any info line.
    Silent,
}

impl FailMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "crash" => Some(FailMode::Crash),
            "garbage" => Some(FailMode::Garbage),
            "hang" => Some(FailMode::Hang),
            "silent" => Some(FailMode::Silent),
            _ => None,
        }
    }
}

/// Search state
struct Searcher {
    nodes: u64,
}

impl Searcher {
    fn new() -> Self {
        Searcher { nodes: 0 }
    }

    /// Alpha-beta search; fills `pv` with the best line found.
    fn alpha_beta(
        &mut self,
        board: &Board,
        depth: u32,
        mut alpha: i32,
        beta: i32,
        ply: i32,
        pv: &mut Vec<ChessMove>,
    ) -> i32 {
        self.nodes += 1;

        if depth == 0 {
            return self.quiesce(board, alpha, beta, ply);
        }

        let moves = ordered_moves(board, false);
        if moves.is_empty() {
            return terminal_score(board, ply);
        }

        for mv in moves {
            let child = board.make_move_new(mv);
            let mut line = Vec::new();
            let score = -self.alpha_beta(&child, depth - 1, -beta, -alpha, ply + 1, &mut line);

            if score >= beta {
                return beta;
            }
            if score > alpha {
                alpha = score;
                pv.clear();
                pv.push(mv);
                pv.extend(line);
            }
        }

        alpha
    }

    /// Captures only, until the position is quiet.
    fn quiesce(&mut self, board: &Board, mut alpha: i32, beta: i32, ply: i32) -> i32 {
        self.nodes += 1;

        if MoveGen::new_legal(board).len() == 0 {
            return terminal_score(board, ply);
        }

        let stand_pat = evaluate(board);
        if stand_pat >= beta {
            return beta;
        }
        if stand_pat > alpha {
            alpha = stand_pat;
        }

        for mv in ordered_moves(board, true) {
            let score = -self.quiesce(&board.make_move_new(mv), -beta, -alpha, ply + 1);
            if score >= beta {
                return beta;
            }
            if score > alpha {
                alpha = score;
            }
        }

        alpha
    }
}

/// Score of a position without legal moves, for the side to move.
fn terminal_score(board: &Board, ply: i32) -> i32 {
    if board.checkers().popcnt() > 0 {
        -(MATE - ply)
    } else {
        0
    }
}

/// Material balance from the side to move's perspective.
fn evaluate(board: &Board) -> i32 {
    let mut score = 0;
    for piece in ALL_PIECES {
        let pieces = *board.pieces(piece);
        let white = (pieces & *board.color_combined(Color::White)).popcnt() as i32;
        let black = (pieces & *board.color_combined(Color::Black)).popcnt() as i32;
        score += piece_value(piece) * (white - black);
    }
    if board.side_to_move() == Color::White {
        score
    } else {
        -score
    }
}

fn captured_piece(board: &Board, mv: ChessMove) -> Option<Piece> {
    board.piece_on(mv.get_dest()).or_else(|| {
        let en_passant = board.piece_on(mv.get_source()) == Some(Piece::Pawn)
            && mv.get_source().get_file() != mv.get_dest().get_file();
        en_passant.then_some(Piece::Pawn)
    })
}

/// Legal moves with captures first (most valuable victim, least valuable
/// attacker); with `captures_only` the quiet moves are dropped.
fn ordered_moves(board: &Board, captures_only: bool) -> Vec<ChessMove> {
    let mut scored: Vec<(i32, ChessMove)> = MoveGen::new_legal(board)
        .filter_map(|mv| match captured_piece(board, mv) {
            Some(victim) => {
                let attacker = board.piece_on(mv.get_source()).map_or(0, piece_value);
                Some((10 * piece_value(victim) - attacker + 1, mv))
            }
            None if captures_only => None,
            None => Some((0, mv)),
        })
        .collect();
    // Stable sort keeps generation order among equals.
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, mv)| mv).collect()
}

/// Iterative deepening to a fixed depth, reporting each completed iteration.
fn search(board: &Board, max_depth: u32, engine: &mut StdioEngine) -> Result<(), UciError> {
    match board.status() {
        BoardStatus::Checkmate => {
            engine.send_info(InfoBuilder::new().depth(0).score_mate(0).build())?;
            return engine.send_bestmove(None);
        }
        BoardStatus::Stalemate => {
            engine.send_info(InfoBuilder::new().depth(0).score_cp(0).build())?;
            return engine.send_bestmove(None);
        }
        BoardStatus::Ongoing => {}
    }

    let start = Instant::now();
    let mut searcher = Searcher::new();
    let mut best: Option<ChessMove> = None;

    for depth in 1..=max_depth.max(1) {
        let mut pv = Vec::new();
        let score = searcher.alpha_beta(board, depth, -INFINITY, INFINITY, 0, &mut pv);
        best = pv.first().copied().or(best);

        let builder = InfoBuilder::new().depth(depth).seldepth(depth);
        let builder = match mate_distance(score) {
            Some(moves) => builder.score_mate(moves),
            None => builder.score_cp(score),
        };
        let info = builder
            .nodes(searcher.nodes)
            .time(start.elapsed().as_millis() as u64)
            .pv(pv.iter().map(|mv| mv.to_string()).collect())
            .build();
        engine.send_info(info)?;
    }

    let best = best.or_else(|| MoveGen::new_legal(board).next());
    engine.send_bestmove(best.map(|mv| mv.to_string()).as_deref())
}

/// Moves to mate for a mate score, negative when the side to move is mated.
fn mate_distance(score: i32) -> Option<i32> {
    if score > MATE_BOUND {
        Some((MATE - score + 1) / 2)
    } else if score < -MATE_BOUND {
        Some(-(MATE + score + 1) / 2)
    } else {
        None
    }
}

/// Set up the board from a `position` command, ignoring anything illegal.
fn set_position(fen: Option<String>, moves: Vec<String>) -> Result<Board, String> {
    let mut board = match fen {
        Some(f) => Board::from_str(&f).map_err(|e| format!("invalid fen '{}': {}", f, e))?,
        None => Board::default(),
    };
    for text in moves {
        let mv = MoveGen::new_legal(&board)
            .find(|mv| mv.to_string() == text)
            .ok_or_else(|| format!("illegal move '{}'", text))?;
        board = board.make_move_new(mv);
    }
    Ok(board)
}

struct State {
    board: Board,
    searches: u32,
    fail_on: u32,
    fail_mode: FailMode,
}

fn run() -> Result<(), UciError> {
    let mut engine = stdio_engine();
    let mut state = State {
        board: Board::default(),
        searches: 0,
        fail_on: 0,
        fail_mode: FailMode::Crash,
    };

    loop {
        let cmd = match engine.read_command() {
            Ok(cmd) => cmd,
            Err(UciError::IoError(e)) => return Err(UciError::IoError(e)),
            Err(e) => {
                eprintln!("Error reading command: {}", e);
                continue;
            }
        };

        match cmd {
            GuiCommand::Uci => {
                engine.send_id("MaterialEngine", "Chess Devtools")?;
                engine.send_option("Threads", "spin", "1")?;
                engine.send_option("Hash", "spin", "16")?;
                engine.send_option("FailOnSearch", "spin", "0")?;
                engine.send_option("FailMode", "combo", "crash")?;
                engine.send_uciok()?;
            }

            GuiCommand::SetOption { name, value } => {
                let value = value.unwrap_or_default();
                if name.eq_ignore_ascii_case("FailOnSearch") {
                    state.fail_on = value.trim().parse().unwrap_or(0);
                } else if name.eq_ignore_ascii_case("FailMode") {
                    if let Some(mode) = FailMode::parse(value.trim()) {
                        state.fail_mode = mode;
                    }
                }
                // Threads and Hash are accepted and ignored.
            }

            GuiCommand::IsReady => engine.send_readyok()?,

            GuiCommand::UciNewGame => state.board = Board::default(),

            GuiCommand::Position { fen, moves } => match set_position(fen, moves) {
                Ok(board) => state.board = board,
                Err(reason) => {
                    engine.send_info(InfoBuilder::new().string(&reason).build())?;
                }
            },

            GuiCommand::Go(opts) => {
                state.searches += 1;
                if state.fail_on != 0 && state.searches == state.fail_on {
                    match state.fail_mode {
                        FailMode::Crash => std::process::exit(3),
                        FailMode::Garbage => {
                            engine.send(&EngineMessage::Unrecognized(
                                "evaluation exploded".to_string(),
                            ))?;
                        }
                        FailMode::Hang => {}
                        FailMode::Silent => {
                            let first = MoveGen::new_legal(&state.board).next();
                            engine.send_bestmove(first.map(|mv| mv.to_string()).as_deref())?;
                        }
                    }
                    continue;
                }
                search(&state.board, opts.depth.unwrap_or(DEFAULT_DEPTH), &mut engine)?;
            }

            GuiCommand::Stop => {
                // Searches run to completion before the next command is read.
            }

            GuiCommand::Quit => break,

            GuiCommand::Unknown(_) => {}
        }
    }

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("material-engine: {}", e);
        std::process::exit(1);
    }
}
