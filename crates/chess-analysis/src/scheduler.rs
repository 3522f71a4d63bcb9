//! Analysis scheduler: a bounded pool of engine sessions working through a
//! batch of games.
//!
//! Each worker task owns at most one engine session and pulls games from a
//! shared queue, so no more than `max_concurrency` engine processes run at
//! once. Results are streamed back in completion order. When the stream
//! ends, every session has been shut down. A supervisor task waits for the
//! workers and reports any game a failed worker left behind.

use crate::analyzer::{analyze_game, AnalysisContext, AnalysisError, GameAnalysis, SessionSlot};
use crate::config::{EngineConfig, SchedulerConfig};
use crate::engine::SessionCounter;
use crate::scoring::{EleganceScorer, ScoringPolicy};
use chess_replay::Game;
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Cooperative cancellation shared by the caller and every worker.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Positions evaluated so far within one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionProgress {
    pub processed: usize,
    pub total: usize,
}

/// Games finished so far within the batch, successful or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameProgress {
    pub processed: usize,
    pub total: usize,
}

/// Receives progress events from the workers.
///
/// Called from worker tasks; implementations must be cheap and must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_position(&self, _game_index: usize, _progress: PositionProgress) {}

    fn on_game(&self, _progress: GameProgress) {}
}

/// Outcome for one input game.
#[derive(Debug)]
pub struct GameReport {
    /// Position of the game in the input batch.
    pub index: usize,
    pub label: String,
    pub outcome: Result<GameAnalysis, AnalysisError>,
}

impl GameReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// One-line summary, e.g. `#3 Carlsen - Nepomniachtchi: ok, composite 71.2 (...)`.
    pub fn status_line(&self) -> String {
        match &self.outcome {
            Ok(analysis) => format!("#{} {}: ok, {}", self.index + 1, self.label, analysis.score),
            Err(e) => format!("#{} {}: failed, {}", self.index + 1, self.label, e),
        }
    }
}

/// Stream of [`GameReport`]s, one per input game, in completion order.
pub struct AnalysisStream {
    rx: mpsc::Receiver<GameReport>,
    total: usize,
}

impl AnalysisStream {
    /// Number of reports the stream will yield.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Drain the stream and return the reports sorted by input index.
    pub async fn collect_ordered(mut self) -> Vec<GameReport> {
        let mut reports = Vec::with_capacity(self.total);
        while let Some(report) = self.next().await {
            reports.push(report);
        }
        reports.sort_by_key(|r| r.index);
        reports
    }
}

impl Stream for AnalysisStream {
    type Item = GameReport;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Runs game analyses on a bounded pool of engine sessions.
pub struct AnalysisScheduler {
    engine: Arc<EngineConfig>,
    config: SchedulerConfig,
    policy: ScoringPolicy,
    observer: Option<Arc<dyn ProgressObserver>>,
    sessions: SessionCounter,
}

impl AnalysisScheduler {
    pub fn new(engine: EngineConfig, config: SchedulerConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            config,
            policy: ScoringPolicy::default(),
            observer: None,
            sessions: SessionCounter::new(),
        }
    }

    pub fn with_policy(mut self, policy: ScoringPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Engine processes currently alive across all batches of this scheduler.
    pub fn live_sessions(&self) -> usize {
        self.sessions.get()
    }

    /// Analyse `games` concurrently. Must be called from within a tokio runtime.
    ///
    /// Every game yields exactly one report. Games not finished when `cancel`
    /// fires report [`AnalysisError::Cancelled`].
    pub fn analyze_games(&self, games: Vec<Game>, cancel: CancellationSignal) -> AnalysisStream {
        let total = games.len();
        let (tx, rx) = mpsc::channel(total.max(1));
        let workers = self.config.max_concurrency.max(1).min(total);
        info!(games = total, workers, engine = %self.engine.path.display(), "starting analysis");

        let labels = games.iter().map(Game::label).collect();
        let shared = Arc::new(Shared {
            ctx: AnalysisContext {
                engine: self.engine.clone(),
                scorer: EleganceScorer::new(self.policy.clone()),
                max_consecutive_faults: self.config.max_consecutive_faults,
                observer: self.observer.clone(),
                cancel,
            },
            queue: Mutex::new(games.into_iter().enumerate().collect()),
            reported: (0..total).map(|_| AtomicBool::new(false)).collect(),
            labels,
            finished: AtomicUsize::new(0),
            total,
        });

        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|worker| {
                let slot = SessionSlot::new(self.engine.clone(), self.sessions.clone());
                tokio::spawn(run_worker(worker, shared.clone(), slot, tx.clone()))
            })
            .collect();
        tokio::spawn(supervise(handles, shared, tx));

        AnalysisStream { rx, total }
    }
}

struct Shared {
    ctx: AnalysisContext,
    queue: Mutex<VecDeque<(usize, Game)>>,
    /// Set once the game's report has been handed to the channel.
    reported: Vec<AtomicBool>,
    labels: Vec<String>,
    finished: AtomicUsize,
    total: usize,
}

impl Shared {
    fn next_job(&self) -> Option<(usize, Game)> {
        match self.queue.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }

    /// Count the game as finished and build its report. Returns `None` if
    /// the game was already reported.
    fn finish(&self, index: usize, outcome: Result<GameAnalysis, AnalysisError>) -> Option<GameReport> {
        if self.reported[index].swap(true, Ordering::SeqCst) {
            return None;
        }
        let processed = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(observer) = &self.ctx.observer {
            observer.on_game(GameProgress {
                processed,
                total: self.total,
            });
        }
        Some(GameReport {
            index,
            label: self.labels[index].clone(),
            outcome,
        })
    }
}

async fn run_worker(
    worker: usize,
    shared: Arc<Shared>,
    mut slot: SessionSlot,
    tx: mpsc::Sender<GameReport>,
) {
    let ctx = &shared.ctx;
    debug!(worker, "worker started");

    while let Some((index, game)) = shared.next_job() {
        let outcome = if ctx.cancel.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            analyze_game(ctx, &mut slot, index, &game).await
        };
        if ctx.cancel.is_cancelled() {
            slot.discard().await;
        }

        let Some(report) = shared.finish(index, outcome) else {
            continue;
        };
        if tx.send(report).await.is_err() {
            debug!(worker, "report receiver dropped, stopping");
            break;
        }
    }

    slot.discard().await;
    debug!(worker, "worker finished");
}

/// Wait for every worker, then fail each game nobody reported. Holds a
/// sender, so the stream stays open until this returns.
async fn supervise(handles: Vec<JoinHandle<()>>, shared: Arc<Shared>, tx: mpsc::Sender<GameReport>) {
    let mut failure = None;
    for (worker, handle) in handles.into_iter().enumerate() {
        if let Err(e) = handle.await {
            error!(worker, error = %e, "analysis worker failed");
            failure.get_or_insert_with(|| e.to_string());
        }
    }
    let Some(reason) = failure else {
        return;
    };

    for index in 0..shared.total {
        let outcome = Err(AnalysisError::WorkerFailed(reason.clone()));
        if let Some(report) = shared.finish(index, outcome) {
            if tx.send(report).await.is_err() {
                break;
            }
        }
    }
}
