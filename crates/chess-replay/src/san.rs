//! Standard Algebraic Notation (SAN) parsing.
//!
//! SAN is the standard way to record chess moves in human-readable form.
//! Examples: "e4", "Nf3", "Bxc6", "O-O", "e8=Q", "Nbd2", "R1e1"

use chess::{Board, ChessMove, File, MoveGen, Piece, Rank, Square};
use thiserror::Error;

/// Error type for SAN parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanError {
    /// The SAN string is empty.
    #[error("empty move text")]
    Empty,
    /// The SAN string has invalid format.
    #[error("invalid SAN format: {0}")]
    InvalidFormat(String),
    /// No legal move matches the SAN.
    #[error("no legal move matches: {0}")]
    NoMatchingMove(String),
    /// Multiple legal moves match the SAN (ambiguous).
    #[error("ambiguous move: {0}")]
    AmbiguousMove(String),
}

/// Parses a SAN string and returns the corresponding legal move.
///
/// Check, mate and annotation suffixes (`+`, `#`, `!`, `?`) are ignored.
pub fn san_to_move(board: &Board, san: &str) -> Result<ChessMove, SanError> {
    let san = san
        .trim()
        .trim_end_matches(|c: char| matches!(c, '+' | '#' | '!' | '?'));
    if san.is_empty() {
        return Err(SanError::Empty);
    }

    // Handle castling
    if san == "O-O" || san == "0-0" {
        return find_castling_move(board, true);
    }
    if san == "O-O-O" || san == "0-0-0" {
        return find_castling_move(board, false);
    }

    let parsed = parse_san_components(san)?;
    find_matching_move(board, &parsed, san)
}

/// Finds a legal move given in UCI long algebraic form (`e2e4`, `e7e8q`).
pub fn uci_to_move(board: &Board, text: &str) -> Option<ChessMove> {
    MoveGen::new_legal(board).find(|m| m.to_string() == text)
}

/// Parsed components of a SAN string.
#[derive(Debug)]
struct ParsedSan {
    piece: Piece,
    from_file: Option<File>,
    from_rank: Option<Rank>,
    to_square: Square,
    promotion: Option<Piece>,
}

fn parse_san_components(san: &str) -> Result<ParsedSan, SanError> {
    let (piece, rest) = match san.chars().next() {
        Some(c) if c.is_ascii_uppercase() => {
            let p = san_char_to_piece(c).ok_or_else(|| {
                SanError::InvalidFormat(format!("invalid piece character: {}", c))
            })?;
            (p, &san[1..])
        }
        Some(_) => (Piece::Pawn, san),
        None => return Err(SanError::Empty),
    };

    let rest = rest.replace('x', "");

    // Promotion is usually written `e8=Q`; some sources drop the `=`.
    let (rest, promotion) = match rest.find('=') {
        Some(idx) => {
            let promo = rest[idx + 1..]
                .chars()
                .next()
                .and_then(san_char_to_piece)
                .ok_or_else(|| SanError::InvalidFormat(format!("invalid promotion: {}", san)))?;
            (rest[..idx].to_string(), Some(promo))
        }
        None => match rest.chars().last() {
            Some(c) if piece == Piece::Pawn && c.is_ascii_uppercase() => {
                let promo = san_char_to_piece(c).ok_or_else(|| {
                    SanError::InvalidFormat(format!("invalid promotion: {}", san))
                })?;
                (rest[..rest.len() - 1].to_string(), Some(promo))
            }
            _ => (rest, None),
        },
    };

    let chars: Vec<char> = rest.chars().collect();

    // The last two characters should be the destination square
    if chars.len() < 2 {
        return Err(SanError::InvalidFormat(format!("too short: {}", san)));
    }

    let to_file = char_to_file(chars[chars.len() - 2])
        .ok_or_else(|| SanError::InvalidFormat(format!("invalid file: {}", san)))?;
    let to_rank = char_to_rank(chars[chars.len() - 1])
        .ok_or_else(|| SanError::InvalidFormat(format!("invalid rank: {}", san)))?;

    // Any characters before the destination are disambiguation
    let (from_file, from_rank) = parse_disambiguation(&chars[..chars.len() - 2], san)?;

    Ok(ParsedSan {
        piece,
        from_file,
        from_rank,
        to_square: Square::make_square(to_rank, to_file),
        promotion,
    })
}

fn parse_disambiguation(chars: &[char], san: &str) -> Result<(Option<File>, Option<Rank>), SanError> {
    let invalid = || SanError::InvalidFormat(format!("invalid disambiguation: {}", san));

    match chars {
        [] => Ok((None, None)),
        [c] => match (char_to_file(*c), char_to_rank(*c)) {
            (Some(f), _) => Ok((Some(f), None)),
            (None, Some(r)) => Ok((None, Some(r))),
            (None, None) => Err(invalid()),
        },
        [f, r] => Ok((
            Some(char_to_file(*f).ok_or_else(invalid)?),
            Some(char_to_rank(*r).ok_or_else(invalid)?),
        )),
        _ => Err(invalid()),
    }
}

fn find_castling_move(board: &Board, kingside: bool) -> Result<ChessMove, SanError> {
    let found = MoveGen::new_legal(board).find(|m| {
        if board.piece_on(m.get_source()) != Some(Piece::King) {
            return false;
        }
        let src = m.get_source().get_file().to_index() as i32;
        let dst = m.get_dest().get_file().to_index() as i32;
        if kingside {
            dst - src == 2
        } else {
            src - dst == 2
        }
    });

    found.ok_or_else(|| {
        let name = if kingside { "O-O" } else { "O-O-O" };
        SanError::NoMatchingMove(name.to_string())
    })
}

fn find_matching_move(board: &Board, parsed: &ParsedSan, san: &str) -> Result<ChessMove, SanError> {
    let matching: Vec<ChessMove> = MoveGen::new_legal(board)
        .filter(|m| m.get_dest() == parsed.to_square)
        .filter(|m| board.piece_on(m.get_source()) == Some(parsed.piece))
        .filter(|m| parsed.from_file.map_or(true, |f| m.get_source().get_file() == f))
        .filter(|m| parsed.from_rank.map_or(true, |r| m.get_source().get_rank() == r))
        .filter(|m| m.get_promotion() == parsed.promotion)
        .collect();

    match matching.as_slice() {
        [] => Err(SanError::NoMatchingMove(san.to_string())),
        [m] => Ok(*m),
        _ => Err(SanError::AmbiguousMove(san.to_string())),
    }
}

fn san_char_to_piece(c: char) -> Option<Piece> {
    match c {
        'K' => Some(Piece::King),
        'Q' => Some(Piece::Queen),
        'R' => Some(Piece::Rook),
        'B' => Some(Piece::Bishop),
        'N' => Some(Piece::Knight),
        _ => None,
    }
}

fn char_to_file(c: char) -> Option<File> {
    match c {
        'a'..='h' => Some(File::from_index(c as usize - 'a' as usize)),
        _ => None,
    }
}

fn char_to_rank(c: char) -> Option<Rank> {
    match c {
        '1'..='8' => Some(Rank::from_index(c as usize - '1' as usize)),
        _ => None,
    }
}
