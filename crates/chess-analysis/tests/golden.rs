//! The golden manifest in `tests/fixtures` must pass against the bundled engine.

use chess_analysis::{GoldenHarness, GoldenManifest, MoveClass};
use std::path::Path;

fn manifest() -> GoldenManifest {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/golden.toml");
    GoldenManifest::load(&path).unwrap()
}

#[test]
fn test_fixture_manifest_loads() {
    let manifest = manifest();
    assert_eq!(manifest.engine.depth, 2);
    assert_eq!(manifest.cases.len(), 4);
    assert_eq!(manifest.cases[1].classifications[0].class, MoveClass::Blunder);
    let scholars = manifest.cases[2].game().unwrap();
    assert_eq!(scholars.moves().len(), 7);
    assert_eq!(scholars.header("Result"), Some("1-0"));
}

#[tokio::test]
async fn test_golden_cases_pass() {
    let report = GoldenHarness::new(manifest())
        .with_engine_path(env!("CARGO_BIN_EXE_material-engine"))
        .run()
        .await;

    assert_eq!(report.total, 4);
    assert!(report.is_success(), "{}", report.to_json().unwrap());
    assert!(report.ensure_passed().is_ok());
    assert!(report.cases.iter().all(|c| c.score.is_some()));
}

#[tokio::test]
async fn test_out_of_range_case_fails_without_stopping_the_run() {
    let mut manifest = manifest();
    manifest.cases[0].expect.composite = Some([0.0, 10.0]);

    let report = GoldenHarness::new(manifest)
        .with_engine_path(env!("CARGO_BIN_EXE_material-engine"))
        .run()
        .await;

    assert_eq!(report.total, 4);
    assert_eq!(report.passed, 3);
    let failure = report.failures().next().unwrap();
    assert_eq!(failure.name, "ruy-lopez-quiet");
    assert_eq!(failure.mismatch.as_ref().unwrap().metric, "composite");
    assert!(report.ensure_passed().is_err());
}

#[tokio::test]
async fn test_missing_engine_fails_every_case() {
    let report = GoldenHarness::new(manifest())
        .with_engine_path("/nonexistent/engine")
        .run()
        .await;
    assert_eq!(report.passed, 0);
    assert!(report.cases.iter().all(|c| c.error.is_some()));
}
