//! Model file tests
//!
//! Parses the YAML models under test-data/ and runs them through the
//! model calculator.

use pretty_assertions::assert_eq;
use std::path::PathBuf;
use uec_expr::core::expression::TextTrace;
use uec_expr::core::ModelCalculator;
use uec_expr::parser::{parse_model, parse_model_str};
use uec_expr::variables::EvalContext;
use uec_expr::UecError;

fn test_data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test-data")
        .join(name)
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// MODE CHOICE MODEL
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_mode_choice_model_parses() {
    let model = parse_model(&test_data("mode_choice.yaml")).unwrap();
    assert_eq!(model.scalars.len(), 2);
    assert_eq!(model.matrix_arrays[0].members.len(), 2);
    assert_eq!(model.formulas["peak"], "1");
    assert_eq!(model.utilities[0].alternatives, vec!["drive", "transit", "walk"]);
    assert_eq!(model.utilities[0].rows.len(), 7);
}

#[test]
fn test_mode_choice_zero_auto_household() {
    let model = parse_model(&test_data("mode_choice.yaml")).unwrap();
    let mut prepared = ModelCalculator::new(model).prepare().unwrap();

    let ctx = EvalContext::new().with_zones(1, 2).with_household(0);
    let results = prepared.run(&ctx).unwrap();

    assert_close(results.formulas["auto_cost"], 3.98);
    assert_close(results.formulas["peak"], 1.0);

    let mode = &results.utilities[0];
    assert_eq!(mode.name, "mode_choice");
    assert_close(mode.utilities[0], -6.494);
    assert_close(mode.utilities[1], -2.3);
    assert_close(mode.utilities[2], -3.68);

    assert_eq!(prepared.variables().scalar("period_ivt"), Some(10.0));
}

#[test]
fn test_mode_choice_two_auto_household() {
    let model = parse_model(&test_data("mode_choice.yaml")).unwrap();
    let mut prepared = ModelCalculator::new(model).prepare().unwrap();

    let ctx = EvalContext::new().with_zones(1, 2).with_household(2);
    let results = prepared.run(&ctx).unwrap();
    assert_close(results.utilities[0].utilities[0], -1.494);
}

#[test]
fn test_long_trip_drops_walk_time() {
    let model = parse_model(&test_data("mode_choice.yaml")).unwrap();
    let mut prepared = ModelCalculator::new(model).prepare().unwrap();

    // distance 1 -> 3 is 9 km, above the walk filter
    let ctx = EvalContext::new().with_zones(1, 3).with_household(1);
    let results = prepared.run(&ctx).unwrap();
    assert_close(results.utilities[0].utilities[2], -0.8);
}

#[test]
fn test_prepared_model_runs_many_trips() {
    let model = parse_model(&test_data("mode_choice.yaml")).unwrap();
    let mut prepared = ModelCalculator::new(model).prepare().unwrap();

    for orig in 1..=3 {
        for dest in 1..=3 {
            let ctx = EvalContext::new().with_zones(orig, dest).with_household(1);
            let results = prepared.run(&ctx).unwrap();
            assert!(results.utilities[0].utilities.iter().all(|u| u.is_finite()));
        }
    }
}

#[test]
fn test_run_traced_collects_steps() {
    let model = parse_model(&test_data("mode_choice.yaml")).unwrap();
    let mut prepared = ModelCalculator::new(model).prepare().unwrap();

    let mut trace = TextTrace::new();
    let ctx = EvalContext::new().with_zones(1, 2).with_household(0);
    prepared.run_traced(&ctx, &mut trace).unwrap();
    assert!(trace.lines().iter().any(|l| l.contains("distance -> 4")));
}

#[test]
fn test_missing_household_aborts_run() {
    let model = parse_model(&test_data("mode_choice.yaml")).unwrap();
    let mut prepared = ModelCalculator::new(model).prepare().unwrap();

    let err = prepared
        .run(&EvalContext::new().with_zones(1, 2))
        .unwrap_err();
    match err {
        UecError::Solve {
            utility, alternative, ..
        } => {
            assert_eq!(utility, "mode_choice");
            assert_eq!(alternative, "drive");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// BROKEN MODELS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_circular_formulas() {
    let model = parse_model(&test_data("circular.yaml")).unwrap();
    let err = ModelCalculator::new(model).prepare().err().unwrap();
    assert!(matches!(err, UecError::CircularDependency(_)));
}

#[test]
fn test_self_referencing_formula() {
    let model = parse_model_str("formulas:\n  a: a + 1\n").unwrap();
    assert!(matches!(
        ModelCalculator::new(model).formula_order(),
        Err(UecError::CircularDependency(_))
    ));
}

#[test]
fn test_check_reports_every_problem() {
    let model = parse_model(&test_data("broken.yaml")).unwrap();
    let problems = ModelCalculator::new(model).check();
    assert_eq!(problems.len(), 2);
    assert!(problems
        .iter()
        .all(|p| matches!(p, UecError::Syntax { .. })));
}

#[test]
fn test_check_passes_clean_model() {
    let model = parse_model(&test_data("mode_choice.yaml")).unwrap();
    assert!(ModelCalculator::new(model).check().is_empty());
}
