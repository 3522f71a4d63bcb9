//! Game records as supplied by a PGN reader.

use serde::{Deserialize, Serialize};

/// Result token used when a game has no recorded outcome.
pub const UNKNOWN_RESULT: &str = "*";

/// A recorded game: ordered headers, move texts and the result token.
///
/// Header keys are unique and keep their insertion order so the game can be
/// written back exactly as it was read. Move texts are kept verbatim,
/// including any check or annotation suffixes (`Nf3+`, `e4!?`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Game {
    headers: Vec<(String, String)>,
    moves: Vec<String>,
    result: String,
}

impl Game {
    /// Creates a game from its parts.
    ///
    /// A repeated header key keeps its first position and takes the last value.
    pub fn new(headers: Vec<(String, String)>, moves: Vec<String>, result: impl Into<String>) -> Self {
        let mut game = Self {
            headers: Vec::with_capacity(headers.len()),
            moves,
            result: result.into(),
        };
        for (key, value) in headers {
            game.insert_header(key, value);
        }
        if game.result.is_empty() {
            game.result = UNKNOWN_RESULT.to_string();
        }
        game
    }

    /// Creates a headerless game from move texts, mostly useful in tests and manifests.
    pub fn from_moves<S: AsRef<str>>(moves: &[S]) -> Self {
        Self::new(
            Vec::new(),
            moves.iter().map(|m| m.as_ref().to_string()).collect(),
            UNKNOWN_RESULT,
        )
    }

    /// Returns a copy of this game with one more header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert_header(key.into(), value.into());
        self
    }

    fn insert_header(&mut self, key: String, value: String) {
        match self.headers.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((key, value)),
        }
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    /// Starting position from the `FEN` header, if the game does not start
    /// from the standard setup.
    pub fn starting_fen(&self) -> Option<&str> {
        self.header("FEN")
    }

    /// Short human-readable label, e.g. `Carlsen - Nepomniachtchi`.
    pub fn label(&self) -> String {
        match (self.header("White"), self.header("Black")) {
            (Some(w), Some(b)) => format!("{} - {}", w, b),
            _ => self.header("Event").unwrap_or("?").to_string(),
        }
    }
}
