//! Batch analysis through the scheduler with the bundled `material-engine`.

use chess_analysis::{
    AnalysisError, AnalysisScheduler, CancellationSignal, EngineConfig, EngineError,
    EnginePhase, GameProgress, MoveClass, PositionProgress, ProgressObserver, SchedulerConfig,
    ScoringPolicy,
};
use chess_replay::Game;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn material_engine() -> EngineConfig {
    let mut config = EngineConfig::new(env!("CARGO_BIN_EXE_material-engine")).with_depth(2);
    config.search_timeout_ms = 5_000;
    config.shutdown_grace_ms = 1_000;
    config
}

fn ruy_lopez() -> Game {
    Game::from_moves(&["e4", "e5", "Nf3", "Nc6", "Bb5"])
}

fn queen_hang() -> Game {
    Game::from_moves(&["e4", "e5", "Nf3", "Qg5", "Nxg5"])
}

#[tokio::test]
async fn test_batch_analysis_reports_every_game() {
    let scheduler = AnalysisScheduler::new(
        material_engine(),
        SchedulerConfig::default().with_max_concurrency(2),
    );
    let games = vec![ruy_lopez(), queen_hang(), Game::from_moves(&["d4", "d5"])];
    let reports = scheduler
        .analyze_games(games, CancellationSignal::new())
        .collect_ordered()
        .await;

    assert_eq!(reports.len(), 3);
    for (i, report) in reports.iter().enumerate() {
        assert_eq!(report.index, i);
        assert!(report.is_success(), "{}", report.status_line());
    }

    let quiet = reports[0].outcome.as_ref().unwrap();
    assert_eq!(quiet.engine, "MaterialEngine");
    assert_eq!(quiet.evaluations.len(), 6);
    assert_eq!(quiet.moves.len(), 5);
    assert!(quiet.moves.iter().all(|m| m.class == MoveClass::Quiet));
    assert!((quiet.score.soundness - 100.0).abs() < 1e-9);
    assert_eq!(quiet.restarts, 0);

    let blunder = reports[1].outcome.as_ref().unwrap();
    assert_eq!(blunder.moves[3].move_text, "Qg5");
    assert_eq!(blunder.moves[3].class, MoveClass::Blunder);
    assert!(blunder.score.soundness < quiet.score.soundness);
    assert!(blunder.score.composite < quiet.score.composite);

    assert_eq!(scheduler.live_sessions(), 0);
}

#[tokio::test]
async fn test_results_match_across_concurrency_levels() {
    let games = || vec![ruy_lopez(), queen_hang(), ruy_lopez(), queen_hang()];

    let serial = AnalysisScheduler::new(
        material_engine(),
        SchedulerConfig::default().with_max_concurrency(1),
    )
    .analyze_games(games(), CancellationSignal::new())
    .collect_ordered()
    .await;
    let parallel = AnalysisScheduler::new(
        material_engine(),
        SchedulerConfig::default().with_max_concurrency(4),
    )
    .analyze_games(games(), CancellationSignal::new())
    .collect_ordered()
    .await;

    for (a, b) in serial.iter().zip(parallel.iter()) {
        let a = a.outcome.as_ref().unwrap();
        let b = b.outcome.as_ref().unwrap();
        assert_eq!(a.score, b.score);
        assert_eq!(a.moves, b.moves);
    }
}

#[derive(Default)]
struct Recorder {
    positions: Mutex<Vec<(usize, PositionProgress)>>,
    games: Mutex<Vec<GameProgress>>,
}

impl ProgressObserver for Recorder {
    fn on_position(&self, game_index: usize, progress: PositionProgress) {
        self.positions.lock().unwrap().push((game_index, progress));
    }

    fn on_game(&self, progress: GameProgress) {
        self.games.lock().unwrap().push(progress);
    }
}

#[tokio::test]
async fn test_progress_events() {
    let recorder = Arc::new(Recorder::default());
    let scheduler = AnalysisScheduler::new(
        material_engine(),
        SchedulerConfig::default().with_max_concurrency(1),
    )
    .with_observer(recorder.clone());

    let mut stream = scheduler.analyze_games(
        vec![Game::from_moves(&["e4"]), Game::from_moves(&["d4", "d5"])],
        CancellationSignal::new(),
    );
    assert_eq!(stream.total(), 2);
    while let Some(report) = stream.next().await {
        assert!(report.is_success());
    }

    let positions = recorder.positions.lock().unwrap().clone();
    assert_eq!(positions.len(), 2 + 3);
    assert_eq!(positions[0], (0, PositionProgress { processed: 1, total: 2 }));
    assert_eq!(positions[4], (1, PositionProgress { processed: 3, total: 3 }));

    let games = recorder.games.lock().unwrap().clone();
    assert_eq!(
        games,
        vec![
            GameProgress { processed: 1, total: 2 },
            GameProgress { processed: 2, total: 2 },
        ]
    );
}

struct CancelAfter {
    games: usize,
    signal: CancellationSignal,
    seen: AtomicUsize,
}

impl ProgressObserver for CancelAfter {
    fn on_game(&self, progress: GameProgress) {
        self.seen.fetch_add(1, Ordering::SeqCst);
        if progress.processed == self.games {
            self.signal.cancel();
        }
    }
}

#[tokio::test]
async fn test_cancellation_stops_remaining_games() {
    let signal = CancellationSignal::new();
    let observer = Arc::new(CancelAfter {
        games: 2,
        signal: signal.clone(),
        seen: AtomicUsize::new(0),
    });
    let scheduler = AnalysisScheduler::new(
        material_engine(),
        SchedulerConfig::default().with_max_concurrency(1),
    )
    .with_observer(observer.clone());

    let games = (0..10).map(|_| ruy_lopez()).collect();
    let reports = scheduler.analyze_games(games, signal).collect_ordered().await;

    assert_eq!(reports.len(), 10);
    assert!(reports[0].is_success());
    assert!(reports[1].is_success());
    for report in &reports[2..] {
        assert!(matches!(report.outcome, Err(AnalysisError::Cancelled)));
    }
    assert_eq!(observer.seen.load(Ordering::SeqCst), 10);
    assert_eq!(scheduler.live_sessions(), 0);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let signal = CancellationSignal::new();
    signal.cancel();
    let scheduler = AnalysisScheduler::new(material_engine(), SchedulerConfig::default());
    let reports = scheduler
        .analyze_games(vec![ruy_lopez(), queen_hang()], signal)
        .collect_ordered()
        .await;
    assert!(reports
        .iter()
        .all(|r| matches!(r.outcome, Err(AnalysisError::Cancelled))));
    assert_eq!(scheduler.live_sessions(), 0);
}

#[tokio::test]
async fn test_single_fault_restarts_session() {
    let engine = material_engine()
        .with_option("FailOnSearch", "3")
        .with_option("FailMode", "crash");
    let scheduler = AnalysisScheduler::new(engine, SchedulerConfig::default().with_max_concurrency(1));

    let reports = scheduler
        .analyze_games(vec![Game::from_moves(&["e4", "e5", "Nf3"])], CancellationSignal::new())
        .collect_ordered()
        .await;

    let analysis = reports[0].outcome.as_ref().expect("game should survive one crash");
    assert_eq!(analysis.restarts, 1);
    assert_eq!(analysis.evaluations.len(), 4);
    assert_eq!(scheduler.live_sessions(), 0);
}

#[tokio::test]
async fn test_repeated_faults_fail_the_game() {
    let engine = material_engine()
        .with_option("FailOnSearch", "1")
        .with_option("FailMode", "garbage");
    let scheduler = AnalysisScheduler::new(engine, SchedulerConfig::default().with_max_concurrency(1));

    let reports = scheduler
        .analyze_games(vec![ruy_lopez()], CancellationSignal::new())
        .collect_ordered()
        .await;

    assert!(matches!(
        reports[0].outcome,
        Err(AnalysisError::Engine(EngineError::Protocol(_)))
    ));
    assert!(reports[0].status_line().contains("failed"));
    assert_eq!(scheduler.live_sessions(), 0);
}

#[tokio::test]
async fn test_repeated_timeouts_fail_the_game() {
    let mut engine = material_engine()
        .with_option("FailOnSearch", "1")
        .with_option("FailMode", "hang");
    engine.search_timeout_ms = 300;
    engine.shutdown_grace_ms = 200;
    let scheduler = AnalysisScheduler::new(engine, SchedulerConfig::default().with_max_concurrency(1));

    let reports = scheduler
        .analyze_games(vec![Game::from_moves(&["e4"])], CancellationSignal::new())
        .collect_ordered()
        .await;

    match &reports[0].outcome {
        Err(AnalysisError::Engine(EngineError::Timeout { phase, .. })) => {
            assert_eq!(*phase, EnginePhase::Search)
        }
        other => panic!("expected search timeout, got {other:?}"),
    }
    assert_eq!(scheduler.live_sessions(), 0);
}

#[tokio::test]
async fn test_invalid_game_does_not_affect_others() {
    let scheduler = AnalysisScheduler::new(
        material_engine(),
        SchedulerConfig::default().with_max_concurrency(2),
    );
    let games = vec![
        ruy_lopez(),
        Game::from_moves(&["e4", "e5", "Nf3", "Nf3"]).with_header("White", "Careless"),
        queen_hang(),
    ];
    let reports = scheduler
        .analyze_games(games, CancellationSignal::new())
        .collect_ordered()
        .await;

    assert!(reports[0].is_success());
    assert!(reports[2].is_success());
    match &reports[1].outcome {
        Err(AnalysisError::InvalidMove(e)) => {
            assert_eq!(e.ply, 4);
            assert_eq!(e.move_text, "Nf3");
        }
        other => panic!("expected invalid move, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_worker_still_reports_every_game() {
    // A negative saturation value makes the scorer panic inside the worker.
    let policy = ScoringPolicy {
        mate_value: -1,
        ..ScoringPolicy::default()
    };
    assert!(policy.validate().is_err());

    let observer = Arc::new(Recorder::default());
    let scheduler = AnalysisScheduler::new(
        material_engine(),
        SchedulerConfig::default().with_max_concurrency(1),
    )
    .with_policy(policy)
    .with_observer(observer.clone());

    let reports = scheduler
        .analyze_games(
            vec![ruy_lopez(), queen_hang(), Game::from_moves(&["d4"])],
            CancellationSignal::new(),
        )
        .collect_ordered()
        .await;

    assert_eq!(reports.len(), 3);
    for (i, report) in reports.iter().enumerate() {
        assert_eq!(report.index, i);
        assert!(
            matches!(report.outcome, Err(AnalysisError::WorkerFailed(_))),
            "{}",
            report.status_line()
        );
    }
    assert_eq!(observer.games.lock().unwrap().len(), 3);
    assert_eq!(scheduler.live_sessions(), 0);
}
