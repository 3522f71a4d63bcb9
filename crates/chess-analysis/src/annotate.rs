//! Game annotator: writes an analysed game back as PGN with elegance tags and
//! per-move evaluation comments.

use crate::analyzer::GameAnalysis;
use crate::Evaluation;
use chess_replay::pgn::{format_tag, MovetextWriter};
use chess_replay::{Color, Game, Replayer};
use std::fmt::Write;

/// Render `game` with the results of `analysis`.
///
/// Summary tags are appended after the original headers; a tag the game
/// already carries keeps its original value. Every analysed move gets a
/// `{ [%eval X] Class }` comment with the evaluation from White's side.
pub fn annotate_game(game: &Game, analysis: &GameAnalysis) -> String {
    let mut out = String::new();
    for (key, value) in game.headers() {
        let _ = writeln!(out, "{}", format_tag(key, value));
    }
    for (key, value) in summary_tags(analysis) {
        if game.header(key).is_none() {
            let _ = writeln!(out, "{}", format_tag(key, &value));
        }
    }
    out.push('\n');

    let (fullmove, white_to_move) = match Replayer::for_game(game) {
        Ok(replayer) => (
            replayer.starting_fullmove(),
            replayer.starting_side() == Color::White,
        ),
        Err(_) => (1, true),
    };

    let mut movetext = MovetextWriter::new(fullmove, white_to_move);
    for (i, mv) in game.moves().iter().enumerate() {
        movetext.push_move(mv);
        if let Some(record) = analysis.moves.get(i) {
            movetext.push_comment(&format!(
                "[%eval {}] {}",
                eval_token(record.white_eval_after, record.mover),
                record.class
            ));
        }
    }
    out.push_str(&movetext.finish(game.result()));
    out
}

fn summary_tags(analysis: &GameAnalysis) -> Vec<(&'static str, String)> {
    let s = &analysis.score;
    vec![
        ("EleganceComposite", format!("{:.1}", s.composite)),
        ("EleganceSoundness", format!("{:.1}", s.soundness)),
        ("EleganceCoherence", format!("{:.1}", s.coherence)),
        ("EleganceTactical", format!("{:.1}", s.tactical)),
        ("EleganceQuiet", format!("{:.1}", s.quiet)),
        ("EleganceEngine", analysis.engine.clone()),
        ("EleganceDepth", analysis.depth.to_string()),
    ]
}

/// `%eval` value: pawns with two decimals, or `#N` for mates.
///
/// A delivered mate is `#0` when White mated and `#-0` when Black mated,
/// judged by the side that made the move.
fn eval_token(eval: Evaluation, mover: Color) -> String {
    match eval {
        Evaluation::Mate(0) if mover == Color::Black => "#-0".to_string(),
        Evaluation::Centipawns(cp) => {
            let sign = if cp < 0 { "-" } else { "" };
            let abs = cp.unsigned_abs();
            format!("{}{}.{:02}", sign, abs / 100, abs % 100)
        }
        Evaluation::Mate(n) => format!("#{}", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{GameEleganceScore, MoveClass, MoveQualityRecord};

    fn record(ply: usize, text: &str, class: MoveClass, eval: Evaluation) -> MoveQualityRecord {
        MoveQualityRecord {
            ply,
            move_text: text.to_string(),
            mover: if ply % 2 == 1 { Color::White } else { Color::Black },
            before: 0,
            after: 0,
            delta: 0,
            gain: 0,
            class,
            white_eval_after: eval,
        }
    }

    fn analysis(moves: Vec<MoveQualityRecord>) -> GameAnalysis {
        GameAnalysis {
            engine: "MaterialEngine".to_string(),
            depth: 2,
            evaluations: Vec::new(),
            moves,
            score: GameEleganceScore {
                soundness: 100.0,
                coherence: 97.3,
                tactical: 0.0,
                quiet: 100.0,
                composite: 84.3125,
            },
            restarts: 0,
        }
    }

    #[test]
    fn test_annotates_moves_and_appends_tags() {
        let game = Game::from_moves(&["e4", "e5"])
            .with_header("White", "Anderssen")
            .with_header("Black", "Kieseritzky");
        let analysis = analysis(vec![
            record(1, "e4", MoveClass::Quiet, Evaluation::Centipawns(35)),
            record(2, "e5", MoveClass::Quiet, Evaluation::Centipawns(-120)),
        ]);

        let pgn = annotate_game(&game, &analysis);
        let lines: Vec<&str> = pgn.lines().collect();
        assert_eq!(lines[0], "[White \"Anderssen\"]");
        assert_eq!(lines[1], "[Black \"Kieseritzky\"]");
        assert!(pgn.contains("[EleganceComposite \"84.3\"]"));
        assert!(pgn.contains("[EleganceCoherence \"97.3\"]"));
        assert!(pgn.contains("[EleganceEngine \"MaterialEngine\"]"));
        assert!(pgn.contains("[EleganceDepth \"2\"]"));
        assert!(pgn.contains("1. e4 { [%eval 0.35] Quiet } 1... e5 { [%eval -1.20] Quiet } *"));
    }

    #[test]
    fn test_existing_summary_tag_is_kept() {
        let game = Game::from_moves(&["e4"]).with_header("EleganceComposite", "12.0");
        let pgn = annotate_game(
            &game,
            &analysis(vec![record(1, "e4", MoveClass::Quiet, Evaluation::Centipawns(0))]),
        );
        assert!(pgn.contains("[EleganceComposite \"12.0\"]"));
        assert_eq!(pgn.matches("EleganceComposite").count(), 1);
    }

    #[test]
    fn test_mate_and_black_start() {
        let game = Game::from_moves(&["Qh4#"])
            .with_header("FEN", "rnbqkbnr/pppp1ppp/8/4p3/6P1/5P2/PPPPP2P/RNBQKBNR b KQkq - 0 2");
        let mut mate = record(1, "Qh4#", MoveClass::Neutral, Evaluation::Mate(0));
        mate.mover = Color::Black;
        let pgn = annotate_game(&game, &analysis(vec![mate]));
        assert!(pgn.contains("2... Qh4# { [%eval #-0] Neutral } *"));
    }

    #[test]
    fn test_white_mate_keeps_positive_sign() {
        let game = Game::from_moves(&["Ra8#"])
            .with_header("FEN", "6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1");
        let pgn = annotate_game(
            &game,
            &analysis(vec![record(1, "Ra8#", MoveClass::Neutral, Evaluation::Mate(0))]),
        );
        assert!(pgn.contains("1. Ra8# { [%eval #0] Neutral } *"));
    }

    #[test]
    fn test_output_reads_back_with_same_headers_and_moves() {
        let game = Game::from_moves(&["e4", "c5", "Nf3", "d6", "d4", "cxd4", "Nxd4"])
            .with_header("Event", "Open [Round 2]")
            .with_header("Site", "Hastings \"Congress\"")
            .with_header("White", "Anderssen")
            .with_header("Black", "Kieseritzky")
            .with_header("Result", "1-0");
        let records = game
            .moves()
            .iter()
            .enumerate()
            .map(|(i, mv)| record(i + 1, mv, MoveClass::Quiet, Evaluation::Centipawns(15)))
            .collect();

        let pgn = annotate_game(&game, &analysis(records));
        let reread = chess_replay::read_games(&pgn).unwrap();
        assert_eq!(reread.len(), 1);
        let reread = &reread[0];

        let original = game.headers();
        assert_eq!(&reread.headers()[..original.len()], original);
        assert!(reread.headers()[original.len()..]
            .iter()
            .all(|(k, _)| k.starts_with("Elegance")));
        assert_eq!(reread.header("EleganceComposite"), Some("84.3"));
        assert_eq!(reread.moves(), game.moves());
        assert_eq!(reread.result(), game.result());
    }

    #[test]
    fn test_eval_token() {
        assert_eq!(eval_token(Evaluation::Centipawns(0), Color::White), "0.00");
        assert_eq!(eval_token(Evaluation::Centipawns(-5), Color::Black), "-0.05");
        assert_eq!(eval_token(Evaluation::Mate(-3), Color::White), "#-3");
        assert_eq!(eval_token(Evaluation::Mate(0), Color::White), "#0");
        assert_eq!(eval_token(Evaluation::Mate(0), Color::Black), "#-0");
    }
}
