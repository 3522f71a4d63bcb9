//! UCI command parsing and formatting.

use crate::UciError;

/// Commands sent from GUI to engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    /// Initialize UCI mode.
    Uci,
    /// Set an engine option.
    SetOption { name: String, value: Option<String> },
    /// Check if engine is ready.
    IsReady,
    /// Start of a new game; engines may clear their hash tables.
    UciNewGame,
    /// Set up position.
    Position {
        fen: Option<String>,
        moves: Vec<String>,
    },
    /// Start calculating.
    Go(GoOptions),
    /// Stop calculating.
    Stop,
    /// Quit the engine.
    Quit,
    /// Unknown command (for forward compatibility).
    Unknown(String),
}

/// Options for the `go` command.
///
/// Only fixed-depth searches are modelled; time controls and other search
/// limits are skipped when parsing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoOptions {
    /// Search to this depth.
    pub depth: Option<u32>,
}

impl GoOptions {
    /// Fixed-depth search.
    pub fn depth(depth: u32) -> Self {
        Self { depth: Some(depth) }
    }
}

impl GuiCommand {
    /// Parse a UCI command string.
    pub fn parse(input: &str) -> Result<Self, UciError> {
        let input = input.trim();
        let mut parts = input.split_whitespace();

        let cmd = parts.next().unwrap_or("");

        match cmd {
            "uci" => Ok(GuiCommand::Uci),
            "isready" => Ok(GuiCommand::IsReady),
            "ucinewgame" => Ok(GuiCommand::UciNewGame),
            "setoption" => Self::parse_setoption(input),
            "stop" => Ok(GuiCommand::Stop),
            "quit" => Ok(GuiCommand::Quit),
            "position" => Self::parse_position(parts),
            "go" => Self::parse_go(parts),
            "" => Ok(GuiCommand::Unknown(String::new())),
            _ => Ok(GuiCommand::Unknown(input.to_string())),
        }
    }

    fn parse_setoption(input: &str) -> Result<Self, UciError> {
        let body = input
            .strip_prefix("setoption")
            .map(str::trim)
            .and_then(|s| s.strip_prefix("name "))
            .ok_or_else(|| UciError::ParseError(format!("Expected 'name' in '{}'", input)))?;

        match body.find(" value ") {
            Some(idx) => Ok(GuiCommand::SetOption {
                name: body[..idx].trim().to_string(),
                value: Some(body[idx + 7..].trim().to_string()),
            }),
            None => Ok(GuiCommand::SetOption {
                name: body.trim().to_string(),
                value: None,
            }),
        }
    }

    fn parse_position<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        let mut fen = None;
        let mut moves = Vec::new();

        // Parse "startpos" or "fen <fen>"
        match parts.next() {
            Some("startpos") => {}
            Some("fen") => {
                // Collect FEN parts until "moves" or end
                let mut fen_parts = Vec::new();
                for part in parts.by_ref() {
                    if part == "moves" {
                        break;
                    }
                    fen_parts.push(part);
                }
                if !fen_parts.is_empty() {
                    fen = Some(fen_parts.join(" "));
                }
            }
            Some(other) => {
                return Err(UciError::ParseError(format!(
                    "Expected 'startpos' or 'fen', got '{}'",
                    other
                )));
            }
            None => {
                return Err(UciError::ParseError(
                    "Expected 'startpos' or 'fen'".to_string(),
                ));
            }
        }

        let remaining: Vec<&str> = parts.collect();
        let moves_start = remaining.iter().position(|&s| s == "moves");

        if let Some(idx) = moves_start {
            moves = remaining[idx + 1..].iter().map(|s| s.to_string()).collect();
        } else if fen.is_some() {
            // FEN case already consumed "moves" in the loop
            moves = remaining.iter().map(|s| s.to_string()).collect();
        }

        Ok(GuiCommand::Position { fen, moves })
    }

    fn parse_go<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        let mut opts = GoOptions::default();
        let parts: Vec<&str> = parts.collect();
        let mut i = 0;

        while i < parts.len() {
            if parts[i] == "depth" {
                i += 1;
                if i < parts.len() {
                    opts.depth = parts[i].parse().ok();
                }
            }
            i += 1;
        }

        Ok(GuiCommand::Go(opts))
    }

    /// Format command for sending to an engine.
    pub fn to_uci(&self) -> String {
        match self {
            GuiCommand::Uci => "uci".to_string(),
            GuiCommand::SetOption { name, value } => match value {
                Some(v) => format!("setoption name {} value {}", name, v),
                None => format!("setoption name {}", name),
            },
            GuiCommand::IsReady => "isready".to_string(),
            GuiCommand::UciNewGame => "ucinewgame".to_string(),
            GuiCommand::Position { fen, moves } => {
                let mut s = match fen {
                    Some(f) => format!("position fen {}", f),
                    None => "position startpos".to_string(),
                };
                if !moves.is_empty() {
                    s.push_str(" moves ");
                    s.push_str(&moves.join(" "));
                }
                s
            }
            GuiCommand::Go(opts) => {
                let mut s = "go".to_string();
                if let Some(d) = opts.depth {
                    s.push_str(&format!(" depth {}", d));
                }
                s
            }
            GuiCommand::Stop => "stop".to_string(),
            GuiCommand::Quit => "quit".to_string(),
            GuiCommand::Unknown(raw) => raw.clone(),
        }
    }
}
