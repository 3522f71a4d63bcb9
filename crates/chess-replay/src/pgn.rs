//! PGN (Portable Game Notation) reading and writing.
//!
//! The reader extracts what the analysis pipeline consumes: tag pairs in
//! order, the mainline move texts and the result. Comments, NAGs and
//! variations in the input are skipped. The writer side formats tag pairs
//! and numbered movetext wrapped at 80 columns.

use crate::game::{Game, UNKNOWN_RESULT};
use std::fmt::Write as _;
use thiserror::Error;

/// Maximum movetext line width when writing.
pub const LINE_WIDTH: usize = 80;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PgnError {
    #[error("malformed tag pair on line {line}: {text}")]
    MalformedTag { line: usize, text: String },
    #[error("unterminated comment starting on line {line}")]
    UnterminatedComment { line: usize },
    #[error("unbalanced variation parentheses on line {line}")]
    UnbalancedVariation { line: usize },
}

const RESULTS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

#[derive(Default)]
struct GameBuilder {
    headers: Vec<(String, String)>,
    moves: Vec<String>,
}

impl GameBuilder {
    fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.moves.is_empty()
    }

    fn finish(&mut self, result: Option<&str>) -> Game {
        let builder = std::mem::take(self);
        let result = result
            .map(str::to_string)
            .or_else(|| {
                builder
                    .headers
                    .iter()
                    .find(|(k, _)| k == "Result")
                    .map(|(_, v)| v.clone())
            })
            .unwrap_or_else(|| UNKNOWN_RESULT.to_string());
        Game::new(builder.headers, builder.moves, result)
    }
}

/// Reads every game in a PGN document.
pub fn read_games(input: &str) -> Result<Vec<Game>, PgnError> {
    let chars: Vec<char> = input.chars().collect();
    let mut games = Vec::new();
    let mut current = GameBuilder::default();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            // Escape lines are ignored entirely.
            '%' if i == 0 || chars[i - 1] == '\n' => i = skip_line(&chars, i),
            ';' => i = skip_line(&chars, i),
            '[' => {
                if !current.moves.is_empty() {
                    // A new tag section after movetext without a result token.
                    games.push(current.finish(None));
                }
                let end = find_tag_end(&chars, i).ok_or_else(|| PgnError::MalformedTag {
                    line,
                    text: chars[i..].iter().take(40).collect(),
                })?;
                let text: String = chars[i + 1..end].iter().collect();
                let (key, value) = parse_tag(&text).ok_or_else(|| PgnError::MalformedTag {
                    line,
                    text: text.clone(),
                })?;
                current.headers.push((key, value));
                i = end + 1;
            }
            '{' => {
                let end = find_from(&chars, i, '}')
                    .ok_or(PgnError::UnterminatedComment { line })?;
                line += chars[i..end].iter().filter(|&&c| c == '\n').count();
                i = end + 1;
            }
            '(' => {
                let start_line = line;
                let mut depth = 0usize;
                loop {
                    match chars.get(i) {
                        Some('(') => depth += 1,
                        Some(')') => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        Some('{') => {
                            let end = find_from(&chars, i, '}')
                                .ok_or(PgnError::UnterminatedComment { line })?;
                            line += chars[i..end].iter().filter(|&&c| c == '\n').count();
                            i = end;
                        }
                        Some('\n') => line += 1,
                        Some(_) => {}
                        None => {
                            return Err(PgnError::UnbalancedVariation { line: start_line })
                        }
                    }
                    i += 1;
                }
                i += 1;
            }
            ')' => return Err(PgnError::UnbalancedVariation { line }),
            // Stray closers are tolerated.
            '}' | ']' => i += 1,
            '$' => {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            _ => {
                let start = i;
                while i < chars.len() && !is_delimiter(chars[i]) {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();

                if RESULTS.contains(&token.as_str()) {
                    games.push(current.finish(Some(token.as_str())));
                } else if let Some(mv) = strip_move_number(&token) {
                    current.moves.push(mv.to_string());
                }
            }
        }
    }

    if !current.is_empty() {
        games.push(current.finish(None));
    }

    Ok(games)
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '{' | '}' | '(' | ')' | '[' | ']' | ';' | '$')
}

fn skip_line(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i] != '\n' {
        i += 1;
    }
    i
}

fn find_from(chars: &[char], start: usize, target: char) -> Option<usize> {
    chars[start..]
        .iter()
        .position(|&c| c == target)
        .map(|offset| start + offset)
}

/// Finds the `]` closing the tag pair opened at `start`, skipping brackets
/// inside the quoted value.
fn find_tag_end(chars: &[char], start: usize) -> Option<usize> {
    let mut quoted = false;
    let mut escaped = false;
    for (offset, &c) in chars[start..].iter().enumerate() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ']' if !quoted => return Some(start + offset),
            '\n' => return None,
            _ => {}
        }
    }
    None
}

/// Strips a leading move number (`12.`, `12...`) from a token. Returns
/// `None` if nothing but the number remains.
fn strip_move_number(token: &str) -> Option<&str> {
    let rest = token.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == token.len() {
        return Some(token);
    }
    if !rest.starts_with('.') {
        // Something like `0-0` castling written with zeros.
        return Some(token);
    }
    let rest = rest.trim_start_matches('.');
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

fn parse_tag(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    let space = text.find(char::is_whitespace)?;
    let key = &text[..space];
    let quoted = text[space..].trim();
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;

    let mut value = String::with_capacity(inner.len());
    let mut escaped = false;
    for c in inner.chars() {
        if escaped {
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            value.push(c);
        }
    }

    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value))
}

/// Formats one tag pair line, escaping quotes and backslashes.
pub fn format_tag(key: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("[{} \"{}\"]", key, escaped)
}

/// Builds numbered movetext with optional comments, wrapped at [`LINE_WIDTH`].
#[derive(Debug)]
pub struct MovetextWriter {
    tokens: Vec<String>,
    fullmove: u32,
    white_to_move: bool,
    number_black: bool,
}

impl MovetextWriter {
    /// Starts movetext at the given fullmove number and side.
    pub fn new(fullmove: u32, white_to_move: bool) -> Self {
        Self {
            tokens: Vec::new(),
            fullmove,
            white_to_move,
            number_black: true,
        }
    }

    pub fn push_move(&mut self, text: &str) {
        if self.white_to_move {
            self.tokens.push(format!("{}. {}", self.fullmove, text));
        } else if self.number_black {
            self.tokens.push(format!("{}... {}", self.fullmove, text));
        } else {
            self.tokens.push(text.to_string());
        }

        if !self.white_to_move {
            self.fullmove += 1;
        }
        self.white_to_move = !self.white_to_move;
        self.number_black = false;
    }

    /// Adds a `{ ... }` comment after the last move.
    pub fn push_comment(&mut self, text: &str) {
        self.tokens.push(format!("{{ {} }}", text.replace('}', ")")));
        // Black's reply after a comment needs its own number.
        self.number_black = true;
    }

    /// Appends the result token and returns the wrapped movetext.
    pub fn finish(mut self, result: &str) -> String {
        self.tokens.push(result.to_string());

        let mut out = String::new();
        let mut width = 0;
        for token in &self.tokens {
            if width > 0 && width + 1 + token.len() > LINE_WIDTH {
                out.push('\n');
                width = 0;
            } else if width > 0 {
                out.push(' ');
                width += 1;
            }
            out.push_str(token);
            width += token.len();
        }
        out.push('\n');
        out
    }
}

/// Writes a game back to PGN text without annotations.
pub fn write_game(game: &Game, fullmove: u32, white_to_move: bool) -> String {
    let mut out = String::new();
    for (key, value) in game.headers() {
        let _ = writeln!(out, "{}", format_tag(key, value));
    }
    out.push('\n');

    let mut movetext = MovetextWriter::new(fullmove, white_to_move);
    for mv in game.moves() {
        movetext.push_move(mv);
    }
    out.push_str(&movetext.finish(game.result()));
    out
}
