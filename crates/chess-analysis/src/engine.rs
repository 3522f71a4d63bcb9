//! Engine session: one UCI engine subprocess and the protocol spoken with it.
//!
//! A session is started with [`EngineSession::start`], which launches the
//! process and completes the `uci`/`isready` handshake. Each call to
//! [`EngineSession::evaluate_position`] runs one fixed-depth search. Any fault
//! during a search leaves the session [`SessionState::Terminated`]; the owner
//! then calls [`EngineSession::shutdown`] and starts a fresh one.

use crate::config::EngineConfig;
use crate::Evaluation;
use chess_replay::Position;
use serde::Serialize;
use std::fmt;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uci::{EngineMessage, GoOptions, GuiCommand, Score};

/// Maximum number of lines to read before giving up on a UCI response.
pub const MAX_UCI_LINES: usize = 100_000;

/// Protocol step that was running when a deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Handshake,
    Search,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnginePhase::Handshake => f.write_str("handshake"),
            EnginePhase::Search => f.write_str("search"),
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Process launched, handshake not yet complete.
    NotStarted,
    /// Idle and able to accept a search.
    Ready,
    /// A search is in flight.
    Busy,
    /// Faulted or shut down; every request is rejected.
    Terminated,
}

/// Errors that can occur when working with chess engines.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The executable is missing, not runnable, or exited before the handshake.
    #[error("Failed to launch engine '{path}': {reason}")]
    Launch { path: String, reason: String },
    /// The engine printed something the protocol does not allow here.
    #[error("Engine protocol error: {0}")]
    Protocol(String),
    /// The engine did not answer within the configured deadline.
    #[error("Engine did not respond within {limit:?} during {phase}")]
    Timeout { phase: EnginePhase, limit: Duration },
    /// The engine closed its output mid-conversation.
    #[error("Engine closed its output unexpectedly")]
    Closed,
    /// The session cannot take this request in its current state.
    #[error("Engine session is {0:?}")]
    InvalidState(SessionState),
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True for faults of a running session that a fresh session may not
    /// repeat. Launch failures and handshake timeouts are not among them.
    pub fn is_session_fault(&self) -> bool {
        match self {
            EngineError::Protocol(_) | EngineError::Closed | EngineError::Io(_) => true,
            EngineError::Timeout { phase, .. } => *phase == EnginePhase::Search,
            EngineError::InvalidState(state) => *state == SessionState::Terminated,
            EngineError::Launch { .. } => false,
        }
    }
}

/// Result of one fixed-depth search, from the side to move's point of view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineEvaluation {
    /// Depth of the info line the score was taken from.
    pub depth: u32,
    pub score: Evaluation,
    /// `None` when the position has no legal moves.
    pub best_move: Option<String>,
    pub pv: Vec<String>,
}

/// Shared count of engine processes that have been launched and not yet
/// released.
#[derive(Debug, Clone, Default)]
pub struct SessionCounter(Arc<AtomicUsize>);

impl SessionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> LiveToken {
        self.0.fetch_add(1, Ordering::SeqCst);
        LiveToken(self.0.clone())
    }
}

/// Decrements the owning counter when dropped.
#[derive(Debug)]
struct LiveToken(Arc<AtomicUsize>);

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Exclusive handle on one engine subprocess.
pub struct EngineSession {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    config: Arc<EngineConfig>,
    state: SessionState,
    name: String,
    reaped: bool,
    _live: Option<LiveToken>,
}

impl EngineSession {
    /// Launch the configured engine and complete the handshake.
    pub async fn start(config: Arc<EngineConfig>) -> Result<Self, EngineError> {
        Self::launch(config, None).await
    }

    /// Like [`Self::start`], counting the process in `counter` until it is released.
    pub async fn start_counted(
        config: Arc<EngineConfig>,
        counter: &SessionCounter,
    ) -> Result<Self, EngineError> {
        Self::launch(config, Some(counter)).await
    }

    async fn launch(
        config: Arc<EngineConfig>,
        counter: Option<&SessionCounter>,
    ) -> Result<Self, EngineError> {
        let path = config.path.display().to_string();
        let launch_error = |reason: String| EngineError::Launch {
            path: path.clone(),
            reason,
        };

        let mut child = Command::new(&config.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| launch_error(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_error("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_error("stdout not captured".to_string()))?;

        let mut session = Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            config: config.clone(),
            state: SessionState::NotStarted,
            name: String::new(),
            reaped: false,
            _live: counter.map(SessionCounter::acquire),
        };

        let limit = config.handshake_timeout();
        let result = match timeout(limit, session.handshake()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(EngineError::Closed)) => Err(launch_error(
                "engine exited during the handshake".to_string(),
            )),
            Ok(Err(EngineError::Io(e))) => Err(launch_error(e.to_string())),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::Timeout {
                phase: EnginePhase::Handshake,
                limit,
            }),
        };

        match result {
            Ok(()) => {
                session.state = SessionState::Ready;
                info!(engine = %session.name, pid = ?session.child.id(), "engine session ready");
                Ok(session)
            }
            Err(e) => {
                warn!(path = %path, error = %e, "engine handshake failed");
                session.release().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), EngineError> {
        self.send(&GuiCommand::Uci).await?;

        for _ in 0..MAX_UCI_LINES {
            match self.next_message().await? {
                EngineMessage::UciOk => {
                    if self.name.is_empty() {
                        self.name = "Unknown Engine".to_string();
                    }
                    return self.configure().await;
                }
                EngineMessage::Id {
                    name: Some(name), ..
                } => self.name = name,
                EngineMessage::Id { .. } | EngineMessage::Option { .. } => {}
                EngineMessage::Info(_) | EngineMessage::Unrecognized(_) => {}
                other => {
                    return Err(EngineError::Protocol(format!(
                        "unexpected message before uciok: '{}'",
                        other.to_uci()
                    )))
                }
            }
        }
        Err(EngineError::Protocol("too many lines without uciok".to_string()))
    }

    async fn configure(&mut self) -> Result<(), EngineError> {
        let config = self.config.clone();
        self.set_option("Threads", &config.threads.to_string()).await?;
        if let Some(hash) = config.hash_mb {
            self.set_option("Hash", &hash.to_string()).await?;
        }
        if let Some(path) = &config.syzygy_path {
            self.set_option("SyzygyPath", &path.display().to_string()).await?;
        }
        for (name, value) in &config.options {
            self.set_option(name, value).await?;
        }
        self.sync().await
    }

    async fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        self.send(&GuiCommand::SetOption {
            name: name.to_string(),
            value: Some(value.to_string()),
        })
        .await
    }

    /// Send `isready` and drain output until `readyok`.
    async fn sync(&mut self) -> Result<(), EngineError> {
        self.send(&GuiCommand::IsReady).await?;
        for _ in 0..MAX_UCI_LINES {
            match self.next_message().await? {
                EngineMessage::ReadyOk => return Ok(()),
                other => debug!(message = ?other, "skipping while waiting for readyok"),
            }
        }
        Err(EngineError::Protocol("too many lines without readyok".to_string()))
    }

    /// Name reported by the engine in its `id name` line.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// OS process id, while the process is running.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Evaluate one position at a fixed depth.
    ///
    /// The score is taken from the deepest info line with an exact score for
    /// the primary variation. On any error the session becomes terminated.
    pub async fn evaluate_position(
        &mut self,
        position: &Position,
        depth: u32,
    ) -> Result<EngineEvaluation, EngineError> {
        if self.state != SessionState::Ready {
            return Err(EngineError::InvalidState(self.state));
        }
        self.state = SessionState::Busy;

        let limit = self.config.search_timeout();
        let result = match timeout(limit, self.search(position, depth.max(1))).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout {
                phase: EnginePhase::Search,
                limit,
            }),
        };

        match &result {
            Ok(_) => self.state = SessionState::Ready,
            Err(e) => {
                warn!(engine = %self.name, fen = %position.fen, error = %e, "search failed");
                self.state = SessionState::Terminated;
            }
        }
        result
    }

    async fn search(
        &mut self,
        position: &Position,
        depth: u32,
    ) -> Result<EngineEvaluation, EngineError> {
        self.send(&GuiCommand::Position {
            fen: Some(position.fen.clone()),
            moves: Vec::new(),
        })
        .await?;
        self.send(&GuiCommand::Go(GoOptions::depth(depth))).await?;

        let mut best: Option<(u32, Score, Vec<String>)> = None;
        for _ in 0..MAX_UCI_LINES {
            match self.next_message().await? {
                EngineMessage::Info(info) => {
                    let Some(score) = info.score.filter(|_| info.is_exact_primary()) else {
                        continue;
                    };
                    let line_depth = info.depth.unwrap_or(0);
                    if best.as_ref().map_or(true, |(d, _, _)| line_depth >= *d) {
                        best = Some((line_depth, score, info.pv));
                    }
                }
                EngineMessage::BestMove { mv, .. } => {
                    let (depth, score, pv) = best.ok_or_else(|| {
                        EngineError::Protocol("bestmove without a scored info line".to_string())
                    })?;
                    return Ok(EngineEvaluation {
                        depth,
                        score: Evaluation::from_uci_score(score),
                        best_move: mv,
                        pv,
                    });
                }
                EngineMessage::Unrecognized(line) => {
                    return Err(EngineError::Protocol(format!(
                        "unexpected output during search: '{}'",
                        line
                    )))
                }
                other => debug!(message = ?other, "ignoring message during search"),
            }
        }
        Err(EngineError::Protocol("too many lines without bestmove".to_string()))
    }

    /// Tell the engine a new game starts and wait until it has reset.
    pub async fn new_game(&mut self) -> Result<(), EngineError> {
        self.guarded(GuiCommand::UciNewGame).await
    }

    /// Ask the engine to stop searching and wait until it is idle.
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        self.guarded(GuiCommand::Stop).await
    }

    /// Send `cmd` followed by an `isready` round trip under the handshake deadline.
    async fn guarded(&mut self, cmd: GuiCommand) -> Result<(), EngineError> {
        if self.state != SessionState::Ready {
            return Err(EngineError::InvalidState(self.state));
        }
        let limit = self.config.handshake_timeout();
        let result = match timeout(limit, async {
            self.send(&cmd).await?;
            self.sync().await
        })
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout {
                phase: EnginePhase::Handshake,
                limit,
            }),
        };
        if result.is_err() {
            self.state = SessionState::Terminated;
        }
        result
    }

    /// Ask the engine to quit, kill it if it does not exit within the grace
    /// period, and release the process.
    pub async fn shutdown(mut self) {
        self.release().await;
    }

    async fn release(&mut self) {
        if self.reaped {
            return;
        }
        self.state = SessionState::Terminated;

        if let Err(e) = self.send(&GuiCommand::Quit).await {
            debug!(error = %e, "could not send quit");
        }

        let grace = self.config.shutdown_grace();
        match timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(engine = %self.name, %status, "engine exited"),
            Ok(Err(e)) => {
                warn!(engine = %self.name, error = %e, "failed to wait for engine, killing");
                self.kill().await;
            }
            Err(_) => {
                warn!(engine = %self.name, ?grace, "engine ignored quit, killing");
                self.kill().await;
            }
        }
        self.reaped = true;
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(engine = %self.name, error = %e, "failed to kill engine");
        }
    }

    async fn send(&mut self, cmd: &GuiCommand) -> Result<(), EngineError> {
        let line = cmd.to_uci();
        debug!(cmd = %line, "engine <");
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Next non-empty line, decoded.
    async fn next_message(&mut self) -> Result<EngineMessage, EngineError> {
        loop {
            let line = self.lines.next_line().await?.ok_or(EngineError::Closed)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!(line, "engine >");
            return EngineMessage::parse(line).map_err(|e| EngineError::Protocol(e.to_string()));
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if !self.reaped {
            warn!(engine = %self.name, "engine session dropped without shutdown, killing");
            let _ = self.child.start_kill();
        }
    }
}

impl fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSession")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("pid", &self.child.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_fault_classification() {
        assert!(EngineError::Protocol("x".into()).is_session_fault());
        assert!(EngineError::Closed.is_session_fault());
        assert!(EngineError::Timeout {
            phase: EnginePhase::Search,
            limit: Duration::from_secs(1)
        }
        .is_session_fault());
        assert!(!EngineError::Timeout {
            phase: EnginePhase::Handshake,
            limit: Duration::from_secs(1)
        }
        .is_session_fault());
        assert!(!EngineError::Launch {
            path: "x".into(),
            reason: "y".into()
        }
        .is_session_fault());
        assert!(!EngineError::InvalidState(SessionState::Busy).is_session_fault());
    }

    #[test]
    fn test_engine_error_display() {
        let launch = EngineError::Launch {
            path: "/opt/sf".into(),
            reason: "No such file or directory".into(),
        };
        assert!(launch.to_string().contains("/opt/sf"));

        let timeout = EngineError::Timeout {
            phase: EnginePhase::Search,
            limit: Duration::from_millis(250),
        };
        assert_eq!(
            timeout.to_string(),
            "Engine did not respond within 250ms during search"
        );
    }

    #[test]
    fn test_session_counter_tokens() {
        let counter = SessionCounter::new();
        let a = counter.acquire();
        let b = counter.acquire();
        assert_eq!(counter.get(), 2);
        drop(a);
        assert_eq!(counter.get(), 1);
        drop(b);
        assert_eq!(counter.get(), 0);
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let config = Arc::new(EngineConfig::new("/nonexistent/path/to/stockfish"));
        let counter = SessionCounter::new();
        let err = EngineSession::start_counted(config, &counter)
            .await
            .unwrap_err();
        match err {
            EngineError::Launch { path, .. } => assert_eq!(path, "/nonexistent/path/to/stockfish"),
            other => panic!("expected launch error, got {other:?}"),
        }
        assert_eq!(counter.get(), 0);
    }
}
