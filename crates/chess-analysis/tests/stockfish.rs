//! Checks against a real Stockfish binary.
//!
//! Run with `cargo test -- --ignored` when `stockfish` is on the PATH, or
//! point `STOCKFISH_PATH` at the binary.

use chess_analysis::{
    AnalysisScheduler, CancellationSignal, EngineConfig, EngineSession, Evaluation,
    SchedulerConfig,
};
use chess_replay::{Game, Replayer};
use std::process::{Command, Stdio};
use std::sync::Arc;

fn stockfish_path() -> String {
    std::env::var("STOCKFISH_PATH").unwrap_or_else(|_| "stockfish".to_string())
}

fn stockfish_available() -> bool {
    Command::new(stockfish_path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|mut child| {
            let _ = child.kill();
            let _ = child.wait();
        })
        .is_ok()
}

fn stockfish() -> EngineConfig {
    EngineConfig::new(stockfish_path()).with_depth(10)
}

#[tokio::test]
#[ignore = "requires Stockfish"]
async fn test_stockfish_finds_back_rank_mate() {
    if !stockfish_available() {
        eprintln!("stockfish not found, skipping");
        return;
    }
    let replay = Replayer::from_fen("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1")
        .unwrap()
        .replay::<&str>(&[])
        .unwrap();

    let mut session = EngineSession::start(Arc::new(stockfish())).await.unwrap();
    let eval = session.evaluate_position(&replay.positions[0], 10).await.unwrap();
    assert_eq!(eval.score, Evaluation::Mate(1));
    assert_eq!(eval.best_move.as_deref(), Some("a1a8"));
    session.shutdown().await;
}

#[tokio::test]
#[ignore = "requires Stockfish"]
async fn test_stockfish_ranks_blunder_below_sound_game() {
    if !stockfish_available() {
        eprintln!("stockfish not found, skipping");
        return;
    }
    let scheduler = AnalysisScheduler::new(stockfish(), SchedulerConfig::default());
    let reports = scheduler
        .analyze_games(
            vec![
                Game::from_moves(&["e4", "e5", "Nf3", "Nc6", "Bb5"]),
                Game::from_moves(&["e4", "e5", "Nf3", "Qg5", "Nxg5"]),
            ],
            CancellationSignal::new(),
        )
        .collect_ordered()
        .await;

    let sound = reports[0].outcome.as_ref().unwrap();
    let blunder = reports[1].outcome.as_ref().unwrap();
    assert!(blunder.score.soundness < sound.score.soundness);
    assert!(blunder.score.composite < sound.score.composite);
}
