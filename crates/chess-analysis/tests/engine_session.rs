//! Engine session tests against the bundled `material-engine`.

use chess_analysis::{
    EngineConfig, EngineError, EnginePhase, EngineSession, Evaluation, SessionCounter,
    SessionState,
};
use chess_replay::{Position, Replayer};
use std::sync::Arc;

const MATE_IN_ONE: &str = "6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1";
const MATED: &str = "R5k1/5ppp/8/8/8/8/8/6K1 b - - 1 1";
const STALEMATE: &str = "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1";

fn material_engine() -> EngineConfig {
    let mut config = EngineConfig::new(env!("CARGO_BIN_EXE_material-engine")).with_depth(2);
    config.search_timeout_ms = 5_000;
    config.shutdown_grace_ms = 1_000;
    config
}

fn position(fen: &str) -> Position {
    let replay = Replayer::from_fen(fen).unwrap().replay::<&str>(&[]).unwrap();
    replay.positions[0].clone()
}

fn start_position() -> Position {
    Replayer::new().replay::<&str>(&[]).unwrap().positions[0].clone()
}

#[tokio::test]
async fn test_handshake_and_start_position() {
    let mut session = EngineSession::start(Arc::new(material_engine())).await.unwrap();
    assert_eq!(session.name(), "MaterialEngine");
    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.pid().is_some());

    let eval = session.evaluate_position(&start_position(), 2).await.unwrap();
    assert_eq!(eval.depth, 2);
    assert_eq!(eval.score, Evaluation::Centipawns(0));
    assert!(eval.best_move.is_some());
    assert_eq!(session.state(), SessionState::Ready);

    session.shutdown().await;
}

#[tokio::test]
async fn test_mate_scores_and_terminal_positions() {
    let mut session = EngineSession::start(Arc::new(material_engine())).await.unwrap();

    let eval = session.evaluate_position(&position(MATE_IN_ONE), 2).await.unwrap();
    assert_eq!(eval.score, Evaluation::Mate(1));
    assert_eq!(eval.best_move.as_deref(), Some("a1a8"));
    assert_eq!(eval.pv.first().map(String::as_str), Some("a1a8"));

    let eval = session.evaluate_position(&position(MATED), 2).await.unwrap();
    assert_eq!(eval.score, Evaluation::Mate(0));
    assert_eq!(eval.best_move, None);

    let eval = session.evaluate_position(&position(STALEMATE), 2).await.unwrap();
    assert_eq!(eval.score, Evaluation::Centipawns(0));
    assert_eq!(eval.best_move, None);

    session.shutdown().await;
}

#[tokio::test]
async fn test_evaluation_is_deterministic_across_sessions() {
    let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3";
    let mut first = EngineSession::start(Arc::new(material_engine())).await.unwrap();
    let mut second = EngineSession::start(Arc::new(material_engine())).await.unwrap();

    let a = first.evaluate_position(&position(fen), 2).await.unwrap();
    let b = second.evaluate_position(&position(fen), 2).await.unwrap();
    assert_eq!(a, b);

    first.shutdown().await;
    second.shutdown().await;
}

#[tokio::test]
async fn test_new_game_and_stop_keep_session_ready() {
    let mut session = EngineSession::start(Arc::new(material_engine())).await.unwrap();
    session.evaluate_position(&start_position(), 1).await.unwrap();
    session.new_game().await.unwrap();
    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    session.evaluate_position(&start_position(), 1).await.unwrap();
    session.shutdown().await;
}

#[tokio::test]
async fn test_unrecognized_output_is_protocol_error() {
    let config = material_engine()
        .with_option("FailOnSearch", "1")
        .with_option("FailMode", "garbage");
    let mut session = EngineSession::start(Arc::new(config)).await.unwrap();

    let err = session.evaluate_position(&start_position(), 2).await.unwrap_err();
    assert!(matches!(err, EngineError::Protocol(_)), "got {err:?}");
    assert!(err.is_session_fault());
    assert_eq!(session.state(), SessionState::Terminated);

    let err = session.evaluate_position(&start_position(), 2).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(SessionState::Terminated)));

    session.shutdown().await;
}

#[tokio::test]
async fn test_bestmove_without_score_is_protocol_error() {
    let config = material_engine()
        .with_option("FailOnSearch", "2")
        .with_option("FailMode", "silent");
    let mut session = EngineSession::start(Arc::new(config)).await.unwrap();

    session.evaluate_position(&start_position(), 1).await.unwrap();
    let err = session.evaluate_position(&start_position(), 1).await.unwrap_err();
    assert!(matches!(err, EngineError::Protocol(_)), "got {err:?}");

    session.shutdown().await;
}

#[tokio::test]
async fn test_crash_mid_search_is_closed() {
    let config = material_engine()
        .with_option("FailOnSearch", "1")
        .with_option("FailMode", "crash");
    let counter = SessionCounter::new();
    let mut session = EngineSession::start_counted(Arc::new(config), &counter)
        .await
        .unwrap();
    assert_eq!(counter.get(), 1);

    let err = session.evaluate_position(&start_position(), 2).await.unwrap_err();
    assert!(matches!(err, EngineError::Closed | EngineError::Io(_)), "got {err:?}");

    session.shutdown().await;
    assert_eq!(counter.get(), 0);
}

#[tokio::test]
async fn test_hung_search_times_out() {
    let mut config = material_engine()
        .with_option("FailOnSearch", "1")
        .with_option("FailMode", "hang");
    config.search_timeout_ms = 300;
    let mut session = EngineSession::start(Arc::new(config)).await.unwrap();

    let err = session.evaluate_position(&start_position(), 2).await.unwrap_err();
    match err {
        EngineError::Timeout { phase, .. } => assert_eq!(phase, EnginePhase::Search),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Terminated);
    session.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_releases_counted_session() {
    let counter = SessionCounter::new();
    let session = EngineSession::start_counted(Arc::new(material_engine()), &counter)
        .await
        .unwrap();
    assert_eq!(counter.get(), 1);
    session.shutdown().await;
    assert_eq!(counter.get(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_silent_program_times_out_in_handshake() {
    // `cat` echoes every command back and never says uciok.
    let mut config = EngineConfig::new("/bin/cat");
    config.handshake_timeout_ms = 300;
    config.shutdown_grace_ms = 200;
    let counter = SessionCounter::new();

    let err = EngineSession::start_counted(Arc::new(config), &counter)
        .await
        .unwrap_err();
    match err {
        EngineError::Timeout { phase, .. } => assert_eq!(phase, EnginePhase::Handshake),
        other => panic!("expected handshake timeout, got {other:?}"),
    }
    assert_eq!(counter.get(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_program_exiting_immediately_is_launch_error() {
    let err = EngineSession::start(Arc::new(EngineConfig::new("/bin/true")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Launch { .. }), "got {err:?}");
}
