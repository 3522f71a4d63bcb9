//! UCI info command types.

use serde::{Deserialize, Serialize};

/// Score in centipawns or mate distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Score {
    /// Centipawn score (100 = 1 pawn advantage).
    Cp(i32),
    /// Mate in N moves (positive = engine winning, negative = engine losing,
    /// zero = side to move is already mated).
    Mate(i32),
}

/// Marks a score reported while the search window failed high or low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreBound {
    Lower,
    Upper,
}

/// Search information from engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineInfo {
    /// Search depth in plies.
    pub depth: Option<u32>,
    /// Selective search depth.
    pub seldepth: Option<u32>,
    /// Index of the line when the engine reports several variations.
    pub multipv: Option<u32>,
    /// Score evaluation.
    pub score: Option<Score>,
    /// Set when the score is only a bound.
    pub bound: Option<ScoreBound>,
    /// Nodes searched.
    pub nodes: Option<u64>,
    /// Nodes per second.
    pub nps: Option<u64>,
    /// Time spent in milliseconds.
    pub time: Option<u64>,
    /// Principal variation (best line found).
    pub pv: Vec<String>,
    /// Current move being searched.
    pub currmove: Option<String>,
    /// Current move number.
    pub currmovenumber: Option<u32>,
    /// Hash table usage (per mille).
    pub hashfull: Option<u32>,
    /// Arbitrary string info.
    pub string: Option<String>,
}

impl EngineInfo {
    /// Create a new empty info.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when this line carries an exact score for the primary variation.
    pub fn is_exact_primary(&self) -> bool {
        self.score.is_some() && self.bound.is_none() && self.multipv.map_or(true, |n| n == 1)
    }

    /// Format as UCI info string.
    pub fn to_uci(&self) -> String {
        let mut parts = vec!["info".to_string()];

        if let Some(d) = self.depth {
            parts.push(format!("depth {}", d));
        }
        if let Some(d) = self.seldepth {
            parts.push(format!("seldepth {}", d));
        }
        if let Some(n) = self.multipv {
            parts.push(format!("multipv {}", n));
        }
        if let Some(ref s) = self.score {
            match s {
                Score::Cp(cp) => parts.push(format!("score cp {}", cp)),
                Score::Mate(m) => parts.push(format!("score mate {}", m)),
            }
            match self.bound {
                Some(ScoreBound::Lower) => parts.push("lowerbound".to_string()),
                Some(ScoreBound::Upper) => parts.push("upperbound".to_string()),
                None => {}
            }
        }
        if let Some(n) = self.nodes {
            parts.push(format!("nodes {}", n));
        }
        if let Some(n) = self.nps {
            parts.push(format!("nps {}", n));
        }
        if let Some(t) = self.time {
            parts.push(format!("time {}", t));
        }
        if !self.pv.is_empty() {
            parts.push(format!("pv {}", self.pv.join(" ")));
        }
        if let Some(ref m) = self.currmove {
            parts.push(format!("currmove {}", m));
        }
        if let Some(n) = self.currmovenumber {
            parts.push(format!("currmovenumber {}", n));
        }
        if let Some(h) = self.hashfull {
            parts.push(format!("hashfull {}", h));
        }
        if let Some(ref s) = self.string {
            parts.push(format!("string {}", s));
        }

        parts.join(" ")
    }

    /// Parse UCI info line.
    ///
    /// Returns `None` if the line is not an info line, or if a numeric field
    /// carries a value that does not parse.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.first() != Some(&"info") {
            return None;
        }

        let mut info = EngineInfo::new();
        let mut i = 1; // Skip "info"

        while i < parts.len() {
            match parts[i] {
                "depth" => {
                    i += 1;
                    info.depth = Some(parts.get(i)?.parse().ok()?);
                }
                "seldepth" => {
                    i += 1;
                    info.seldepth = Some(parts.get(i)?.parse().ok()?);
                }
                "multipv" => {
                    i += 1;
                    info.multipv = Some(parts.get(i)?.parse().ok()?);
                }
                "score" => {
                    i += 1;
                    match *parts.get(i)? {
                        "cp" => {
                            i += 1;
                            info.score = Some(Score::Cp(parts.get(i)?.parse().ok()?));
                        }
                        "mate" => {
                            i += 1;
                            info.score = Some(Score::Mate(parts.get(i)?.parse().ok()?));
                        }
                        _ => return None,
                    }
                }
                "lowerbound" => info.bound = Some(ScoreBound::Lower),
                "upperbound" => info.bound = Some(ScoreBound::Upper),
                "nodes" => {
                    i += 1;
                    info.nodes = Some(parts.get(i)?.parse().ok()?);
                }
                "nps" => {
                    i += 1;
                    info.nps = Some(parts.get(i)?.parse().ok()?);
                }
                "time" => {
                    i += 1;
                    info.time = Some(parts.get(i)?.parse().ok()?);
                }
                "pv" => {
                    i += 1;
                    // Collect all remaining moves until another keyword or end
                    while i < parts.len() && !is_info_keyword(parts[i]) {
                        info.pv.push(parts[i].to_string());
                        i += 1;
                    }
                    continue; // Don't increment i again
                }
                "currmove" => {
                    i += 1;
                    info.currmove = parts.get(i).map(|s| s.to_string());
                }
                "currmovenumber" => {
                    i += 1;
                    info.currmovenumber = parts.get(i).and_then(|s| s.parse().ok());
                }
                "hashfull" => {
                    i += 1;
                    info.hashfull = parts.get(i).and_then(|s| s.parse().ok());
                }
                "string" => {
                    // String consumes rest of line
                    info.string = Some(parts[i + 1..].join(" "));
                    break;
                }
                _ => {}
            }
            i += 1;
        }

        Some(info)
    }
}

fn is_info_keyword(s: &str) -> bool {
    matches!(
        s,
        "depth"
            | "seldepth"
            | "multipv"
            | "score"
            | "nodes"
            | "nps"
            | "time"
            | "pv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "tbhits"
            | "cpuload"
            | "string"
    )
}

/// Builder for constructing EngineInfo.
#[derive(Default)]
pub struct InfoBuilder {
    info: EngineInfo,
}

impl InfoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(mut self, d: u32) -> Self {
        self.info.depth = Some(d);
        self
    }

    pub fn seldepth(mut self, d: u32) -> Self {
        self.info.seldepth = Some(d);
        self
    }

    pub fn score_cp(mut self, cp: i32) -> Self {
        self.info.score = Some(Score::Cp(cp));
        self
    }

    pub fn score_mate(mut self, moves: i32) -> Self {
        self.info.score = Some(Score::Mate(moves));
        self
    }

    pub fn nodes(mut self, n: u64) -> Self {
        self.info.nodes = Some(n);
        self
    }

    pub fn time(mut self, ms: u64) -> Self {
        self.info.time = Some(ms);
        self
    }

    pub fn pv(mut self, moves: Vec<String>) -> Self {
        self.info.pv = moves;
        self
    }

    pub fn string(mut self, s: &str) -> Self {
        self.info.string = Some(s.to_string());
        self
    }

    pub fn build(self) -> EngineInfo {
        self.info
    }
}
