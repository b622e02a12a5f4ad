//! Utility expression calculator tests
//!
//! Builds utility specifications by hand and solves them against a
//! composite variable table.

use pretty_assertions::assert_eq;
use uec_expr::core::expression::TextTrace;
use uec_expr::core::Uec;
use uec_expr::types::{Orientation, UtilityRow, UtilitySpec};
use uec_expr::variables::{EvalContext, Matrix, ModelVariables};
use uec_expr::{EvalError, UecError};

fn row(expression: &str, coefficients: &[f64]) -> UtilityRow {
    UtilityRow {
        expression: expression.to_string(),
        coefficients: coefficients.to_vec(),
        ..Default::default()
    }
}

fn filtered(filter: &str, expression: &str, coefficients: &[f64]) -> UtilityRow {
    UtilityRow {
        filter: Some(filter.to_string()),
        ..row(expression, coefficients)
    }
}

fn spec(rows: Vec<UtilityRow>) -> UtilitySpec {
    UtilitySpec {
        name: "mode_choice".to_string(),
        alternatives: vec!["auto".to_string(), "bus".to_string(), "bike".to_string()],
        rows,
    }
}

fn variables() -> ModelVariables {
    let mut vars = ModelVariables::new();
    vars.set_scalar("fuel", 0.1);
    vars.add_household_column("autos", vec![0.0, 1.0]).unwrap();
    vars.add_alternative_column("asc", vec![0.0, -1.0, -2.0])
        .unwrap();
    vars.matrices_mut()
        .add_matrix(
            Matrix::from_rows("dist", vec![vec![1.0, 8.0], vec![8.0, 1.0]]).unwrap(),
            Orientation::OrigDest,
        )
        .unwrap();
    vars
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "expected {expected:?}, got {actual:?}");
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SOLVING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_utilities_sum_rows() {
    let mut vars = variables();
    let uec = Uec::compile(
        &spec(vec![
            row("dist", &[-0.1, -0.05, -0.3]),
            row("asc", &[1.0, 1.0, 1.0]),
        ]),
        &mut vars,
    )
    .unwrap();

    let ctx = EvalContext::new().with_zones(1, 2).with_household(1);
    let utilities = uec.solve(&mut vars, &ctx).unwrap();
    assert_close(&utilities, &[-0.8, -1.4, -4.4]);
}

#[test]
fn test_assignment_rows_feed_later_rows() {
    let mut vars = variables();
    let uec = Uec::compile(
        &spec(vec![
            row("cost = dist * fuel", &[]),
            row("cost", &[-1.0, 0.0, 0.0]),
        ]),
        &mut vars,
    )
    .unwrap();

    let ctx = EvalContext::new().with_zones(1, 2);
    let utilities = uec.solve(&mut vars, &ctx).unwrap();
    assert_close(&utilities, &[-0.8, 0.0, 0.0]);
    assert_eq!(vars.scalar("cost"), Some(0.8));
}

#[test]
fn test_filters_skip_rows() {
    let mut vars = variables();
    let uec = Uec::compile(
        &spec(vec![
            filtered("autos == 0", "1", &[-10.0, 0.0, 0.0]),
            filtered("dist > 5", "dist", &[0.0, 0.0, -1.0]),
        ]),
        &mut vars,
    )
    .unwrap();

    let short = EvalContext::new().with_zones(1, 1).with_household(1);
    assert_close(&uec.solve(&mut vars, &short).unwrap(), &[0.0, 0.0, 0.0]);

    let long = EvalContext::new().with_zones(1, 2).with_household(0);
    assert_close(&uec.solve(&mut vars, &long).unwrap(), &[-10.0, 0.0, -8.0]);
}

#[test]
fn test_zero_coefficient_rows_are_not_evaluated() {
    let mut vars = variables();
    // autos needs a household; only the bike alternative evaluates it
    let uec = Uec::compile(&spec(vec![row("autos", &[0.0, 0.0, 2.0])]), &mut vars).unwrap();

    let mut out = [0.0; 3];
    let err = uec
        .solve_into(&mut vars, &EvalContext::new(), &mut out)
        .unwrap_err();
    match err {
        UecError::Solve {
            alternative,
            row,
            source,
            ..
        } => {
            assert_eq!(alternative, "bike");
            assert_eq!(row, 1);
            assert!(matches!(source, EvalError::MissingContext { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_output_length_must_match() {
    let mut vars = variables();
    let uec = Uec::compile(&spec(vec![row("asc", &[1.0, 1.0, 1.0])]), &mut vars).unwrap();
    let mut out = [0.0; 2];
    assert!(uec
        .solve_into(&mut vars, &EvalContext::new(), &mut out)
        .is_err());
}

// ═══════════════════════════════════════════════════════════════════════════
// COMPILATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_compile_rejects_bad_rows() {
    let mut vars = variables();

    let wrong_count = Uec::compile(&spec(vec![row("dist", &[1.0])]), &mut vars);
    assert!(matches!(wrong_count, Err(UecError::Validation(_))));

    let no_effect = Uec::compile(&spec(vec![row("dist", &[])]), &mut vars);
    assert!(matches!(no_effect, Err(UecError::Validation(_))));

    let assigning_filter =
        Uec::compile(&spec(vec![filtered("x = 1", "dist", &[1.0, 1.0, 1.0])]), &mut vars);
    assert!(matches!(assigning_filter, Err(UecError::Validation(_))));

    let unknown = Uec::compile(&spec(vec![row("speed", &[1.0, 1.0, 1.0])]), &mut vars);
    assert!(matches!(unknown, Err(UecError::Syntax { .. })));
}

#[test]
fn test_filters_are_compiled_alongside_rows() {
    let mut vars = variables();
    let uec = Uec::compile(
        &spec(vec![
            filtered("autos == 0", "1", &[-10.0, 0.0, 0.0]),
            row("asc", &[1.0, 1.0, 1.0]),
        ]),
        &mut vars,
    )
    .unwrap();
    assert_eq!(uec.len(), 2);
    let texts: Vec<&str> = uec.expressions().map(|e| e.text()).collect();
    assert_eq!(texts, vec!["autos == 0", "1", "asc"]);
}

#[test]
fn test_compile_requires_alternatives() {
    let mut vars = variables();
    let empty = UtilitySpec {
        name: "empty".to_string(),
        ..Default::default()
    };
    assert!(Uec::compile(&empty, &mut vars).is_err());
}

// ═══════════════════════════════════════════════════════════════════════════
// TRACING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_trace_single_alternative() {
    let mut vars = variables();
    let uec = Uec::compile(
        &spec(vec![
            row("dist * fuel", &[-1.0, 0.0, 0.0]),
            row("asc", &[1.0, 1.0, 1.0]),
        ]),
        &mut vars,
    )
    .unwrap();

    let ctx = EvalContext::new().with_zones(1, 2);
    let mut trace = TextTrace::new();
    let utility = uec.trace(&mut vars, &ctx, 2, &mut trace).unwrap();
    assert_eq!(utility, -1.0);
    // the bus alternative skips the zero-coefficient distance row
    assert_eq!(trace.lines().len(), 1);
    assert!(trace.lines()[0].contains("asc -> -1"));

    assert!(uec.trace(&mut vars, &ctx, 4, &mut trace).is_err());
}
