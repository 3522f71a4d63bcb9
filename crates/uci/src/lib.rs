//! UCI (Universal Chess Interface) protocol library.
//!
//! This crate provides types and parsing for both sides of the UCI protocol:
//! the analysis client that drives an engine subprocess, and the engine that
//! answers it.
//!
//! # Commands (client → engine)
//!
//! - `uci` - Initialize engine, get id and options
//! - `setoption name <name> value <value>` - Configure the engine
//! - `isready` / `readyok` - Synchronization
//! - `ucinewgame` - Reset engine state between games
//! - `position fen <fen> [moves <move>...]` - Set position
//! - `go depth <d>` - Start a fixed-depth search
//! - `stop` - Stop search
//! - `quit` - Exit engine
//!
//! # Messages (engine → client)
//!
//! Every line an engine prints decodes into exactly one [`EngineMessage`]
//! variant. Lines that are not part of the protocol become
//! [`EngineMessage::Unrecognized`] so callers decide how strict to be.

mod command;
mod info;

pub use command::{GoOptions, GuiCommand};
pub use info::{EngineInfo, InfoBuilder, Score, ScoreBound};

use std::io::{BufRead, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UciError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification.
    Id { name: Option<String>, author: Option<String> },
    /// Option declaration, e.g. `option name Threads type spin default 1 min 1 max 512`.
    Option {
        name: String,
        kind: String,
        default: Option<String>,
    },
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search information.
    Info(EngineInfo),
    /// Best move found. `None` when the position has no legal moves.
    BestMove {
        mv: Option<String>,
        ponder: Option<String>,
    },
    /// Anything else the engine printed (banners, debug output).
    Unrecognized(String),
}

impl EngineMessage {
    /// Decode one line of engine output.
    ///
    /// Returns an error only for lines that start with a known keyword but
    /// are malformed, such as `bestmove` without a move or with a token that
    /// is not a move.
    pub fn parse(line: &str) -> Result<Self, UciError> {
        let line = line.trim();
        let mut parts = line.split_whitespace();

        match parts.next().unwrap_or("") {
            "id" => match parts.next() {
                Some("name") => Ok(EngineMessage::Id {
                    name: Some(rest_of(parts)),
                    author: None,
                }),
                Some("author") => Ok(EngineMessage::Id {
                    name: None,
                    author: Some(rest_of(parts)),
                }),
                _ => Err(UciError::ParseError(format!("Malformed id line: '{}'", line))),
            },
            "option" => Self::parse_option(line),
            "uciok" => Ok(EngineMessage::UciOk),
            "readyok" => Ok(EngineMessage::ReadyOk),
            "info" => EngineInfo::parse(line)
                .map(EngineMessage::Info)
                .ok_or_else(|| UciError::ParseError(format!("Malformed info line: '{}'", line))),
            "bestmove" => {
                let mv = parts
                    .next()
                    .ok_or_else(|| UciError::ParseError("bestmove without a move".to_string()))?;
                let mv = match mv {
                    "(none)" | "0000" => None,
                    m if is_move_token(m) => Some(m.to_string()),
                    m => {
                        return Err(UciError::ParseError(format!(
                            "Invalid bestmove token: '{}'",
                            m
                        )))
                    }
                };
                let ponder = match (parts.next(), parts.next()) {
                    (Some("ponder"), Some(p)) if is_move_token(p) => Some(p.to_string()),
                    _ => None,
                };
                Ok(EngineMessage::BestMove { mv, ponder })
            }
            _ => Ok(EngineMessage::Unrecognized(line.to_string())),
        }
    }

    fn parse_option(line: &str) -> Result<Self, UciError> {
        // Option names may contain spaces, so split on the keywords instead.
        let body = line
            .strip_prefix("option")
            .map(str::trim)
            .and_then(|s| s.strip_prefix("name "))
            .ok_or_else(|| UciError::ParseError(format!("Malformed option line: '{}'", line)))?;

        let (name, rest) = match body.find(" type ") {
            Some(idx) => (&body[..idx], &body[idx + 6..]),
            None => return Err(UciError::ParseError(format!("Option without type: '{}'", line))),
        };

        let mut rest = rest.split_whitespace();
        let kind = rest.next().unwrap_or("").to_string();
        let mut default = None;
        while let Some(token) = rest.next() {
            if token == "default" {
                default = rest.next().map(|s| s.to_string());
                break;
            }
        }

        Ok(EngineMessage::Option {
            name: name.trim().to_string(),
            kind,
            default,
        })
    }

    /// Format message for output.
    pub fn to_uci(&self) -> String {
        match self {
            EngineMessage::Id { name, author } => {
                let mut parts = Vec::new();
                if let Some(n) = name {
                    parts.push(format!("id name {}", n));
                }
                if let Some(a) = author {
                    parts.push(format!("id author {}", a));
                }
                parts.join("\n")
            }
            EngineMessage::Option { name, kind, default } => match default {
                Some(d) => format!("option name {} type {} default {}", name, kind, d),
                None => format!("option name {} type {}", name, kind),
            },
            EngineMessage::UciOk => "uciok".to_string(),
            EngineMessage::ReadyOk => "readyok".to_string(),
            EngineMessage::Info(info) => info.to_uci(),
            EngineMessage::BestMove { mv, ponder } => {
                let mv = mv.as_deref().unwrap_or("(none)");
                match ponder {
                    Some(p) => format!("bestmove {} ponder {}", mv, p),
                    None => format!("bestmove {}", mv),
                }
            }
            EngineMessage::Unrecognized(line) => line.clone(),
        }
    }
}

fn rest_of<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(" ")
}

/// Check that a token is a move in UCI long algebraic form (`e2e4`, `e7e8q`).
pub fn is_move_token(token: &str) -> bool {
    let b = token.as_bytes();
    let square = |f: u8, r: u8| (b'a'..=b'h').contains(&f) && (b'1'..=b'8').contains(&r);
    match b.len() {
        4 => square(b[0], b[1]) && square(b[2], b[3]),
        5 => square(b[0], b[1]) && square(b[2], b[3]) && matches!(b[4], b'q' | b'r' | b'b' | b'n'),
        _ => false,
    }
}

/// Simple UCI engine wrapper for writing engines.
pub struct UciEngine<R: BufRead, W: Write> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> UciEngine<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read and parse the next command from GUI.
    ///
    /// End of input is reported as [`GuiCommand::Quit`].
    pub fn read_command(&mut self) -> Result<GuiCommand, UciError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(GuiCommand::Quit);
        }
        GuiCommand::parse(&line)
    }

    /// Send a message to the GUI.
    pub fn send(&mut self, msg: &EngineMessage) -> Result<(), UciError> {
        writeln!(self.writer, "{}", msg.to_uci())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Send engine identification.
    pub fn send_id(&mut self, name: &str, author: &str) -> Result<(), UciError> {
        self.send(&EngineMessage::Id {
            name: Some(name.to_string()),
            author: Some(author.to_string()),
        })
    }

    /// Declare a spin option.
    pub fn send_option(&mut self, name: &str, kind: &str, default: &str) -> Result<(), UciError> {
        self.send(&EngineMessage::Option {
            name: name.to_string(),
            kind: kind.to_string(),
            default: Some(default.to_string()),
        })
    }

    /// Send uciok.
    pub fn send_uciok(&mut self) -> Result<(), UciError> {
        self.send(&EngineMessage::UciOk)
    }

    /// Send readyok.
    pub fn send_readyok(&mut self) -> Result<(), UciError> {
        self.send(&EngineMessage::ReadyOk)
    }

    /// Send best move, or `(none)` when there is no legal move.
    pub fn send_bestmove(&mut self, mv: Option<&str>) -> Result<(), UciError> {
        self.send(&EngineMessage::BestMove {
            mv: mv.map(|m| m.to_string()),
            ponder: None,
        })
    }

    /// Send search info.
    pub fn send_info(&mut self, info: EngineInfo) -> Result<(), UciError> {
        self.send(&EngineMessage::Info(info))
    }
}

/// Create a UCI engine using stdin/stdout.
pub fn stdio_engine() -> UciEngine<std::io::BufReader<std::io::Stdin>, std::io::Stdout> {
    UciEngine::new(
        std::io::BufReader::new(std::io::stdin()),
        std::io::stdout(),
    )
}
