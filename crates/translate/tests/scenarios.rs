//! End-to-end coverage of the documented scenarios (§8).

use fpsat_translate::config::{Mode, SolveConfig};
use fpsat_translate::solve::{parse_smtlib2, solve_formula, SolveModeOutput, SolveOutcome};

fn new_ctx() -> z3::Context {
    z3::Context::new(&z3::Config::new())
}

#[test]
fn scenario_1_ground_equality_is_satisfiable_at_zero() {
    let ctx = new_ctx();
    let root = parse_smtlib2(
        &ctx,
        "(declare-const x (_ FloatingPoint 11 53)) \
         (assert (= x ((_ to_fp 11 53) RNE 0.0)))",
    )
    .unwrap();
    let cfg = SolveConfig::default().with_mode(Mode::Solve);
    let output = solve_formula(&ctx, "scenario1", &root, &cfg).unwrap();
    match output {
        SolveModeOutput::Solve(SolveOutcome::Sat { residual, .. }) => {
            assert!(residual <= cfg.opt.rel_tolerance);
        }
        other => panic!("expected Sat, got {other:?}", other = describe(&other)),
    }
}

#[test]
fn scenario_2_conjunction_of_strict_bounds_is_satisfiable() {
    let ctx = new_ctx();
    let root = parse_smtlib2(
        &ctx,
        "(declare-const x (_ FloatingPoint 11 53)) \
         (assert (and (fp.lt x ((_ to_fp 11 53) RNE 1.0)) (fp.gt x ((_ to_fp 11 53) RNE 0.0))))",
    )
    .unwrap();
    let cfg = SolveConfig::default().with_mode(Mode::Solve);
    let output = solve_formula(&ctx, "scenario2", &root, &cfg).unwrap();
    match output {
        SolveModeOutput::Solve(SolveOutcome::Sat { residual, .. }) => {
            assert!(residual <= cfg.opt.rel_tolerance);
        }
        other => panic!("expected Sat, got {other:?}", other = describe(&other)),
    }
}

#[test]
fn scenario_4_additive_equation_solves_for_the_expected_root() {
    let ctx = new_ctx();
    let root = parse_smtlib2(
        &ctx,
        "(declare-const x (_ FloatingPoint 11 53)) \
         (assert (fp.eq (fp.add RNE x ((_ to_fp 11 53) RNE 1.0)) ((_ to_fp 11 53) RNE 2.0)))",
    )
    .unwrap();
    let cfg = SolveConfig::default().with_mode(Mode::Solve);
    let output = solve_formula(&ctx, "scenario4", &root, &cfg).unwrap();
    match output {
        SolveModeOutput::Solve(SolveOutcome::Sat { witness, .. }) => {
            assert_eq!(witness.len(), 1);
            assert!((witness[0].1 - 1.0).abs() < 1e-6);
        }
        other => panic!("expected Sat, got {other:?}", other = describe(&other)),
    }
}

#[test]
fn scenario_5_disjunction_of_equalities_is_satisfiable() {
    let ctx = new_ctx();
    let root = parse_smtlib2(
        &ctx,
        "(declare-const x (_ FloatingPoint 11 53)) \
         (assert (or (fp.eq x ((_ to_fp 11 53) RNE 3.0)) (fp.eq x ((_ to_fp 11 53) RNE 5.0))))",
    )
    .unwrap();
    let cfg = SolveConfig::default().with_mode(Mode::Solve);
    let output = solve_formula(&ctx, "scenario5", &root, &cfg).unwrap();
    match output {
        SolveModeOutput::Solve(SolveOutcome::Sat { residual, .. }) => {
            assert!(residual <= cfg.opt.rel_tolerance);
        }
        other => panic!("expected Sat, got {other:?}", other = describe(&other)),
    }
}

#[test]
fn analyze_mode_reports_linear_single_variable_formula() {
    let ctx = new_ctx();
    let root = parse_smtlib2(
        &ctx,
        "(declare-const x (_ FloatingPoint 11 53)) \
         (assert (fp.eq x ((_ to_fp 11 53) RNE 3.0)))",
    )
    .unwrap();
    let cfg = SolveConfig::default().with_mode(Mode::Analyze);
    match solve_formula(&ctx, "analyze1", &root, &cfg).unwrap() {
        SolveModeOutput::Analysis(summary) => {
            assert_eq!(summary.fp64_var_count, 1);
            assert!(summary.is_linear);
        }
        other => panic!("expected Analysis, got {other:?}", other = describe(&other)),
    }
}

#[test]
fn source_emit_mode_produces_compilable_looking_function_text() {
    let ctx = new_ctx();
    let root = parse_smtlib2(
        &ctx,
        "(declare-const x (_ FloatingPoint 11 53)) \
         (assert (fp.eq x ((_ to_fp 11 53) RNE 3.0)))",
    )
    .unwrap();
    let cfg = SolveConfig::default().with_mode(Mode::SourceEmit);
    match solve_formula(&ctx, "emit1", &root, &cfg).unwrap() {
        SolveModeOutput::Source { code, var_count } => {
            assert_eq!(var_count, 1);
            assert!(code.contains("double emit1(unsigned n, const double *x, double *grad, void *data)"));
            assert!(code.contains("return "));
        }
        other => panic!("expected Source, got {other:?}", other = describe(&other)),
    }
}

#[test]
fn to_fp_wrapping_a_compound_expression_does_not_misfire_as_unsupported() {
    // The `to_fp` cast here wraps `fp.add`'s result, not a bare variable or
    // numeral, so both backends must translate only the value argument and
    // leave the preceding rounding-mode argument alone.
    let ctx = new_ctx();
    let root = parse_smtlib2(
        &ctx,
        "(declare-const x (_ FloatingPoint 11 53)) \
         (assert (fp.eq ((_ to_fp 11 53) RNE (fp.add RNE x ((_ to_fp 11 53) RNE 1.0))) \
                         ((_ to_fp 11 53) RNE 2.0)))",
    )
    .unwrap();
    let cfg = SolveConfig::default().with_mode(Mode::Solve);
    let output = solve_formula(&ctx, "wrap1", &root, &cfg).unwrap();
    match output {
        SolveModeOutput::Solve(SolveOutcome::Sat { witness, residual, .. }) => {
            assert!(residual <= cfg.opt.rel_tolerance);
            assert_eq!(witness.len(), 1);
            assert!((witness[0].1 - 1.0).abs() < 1e-6);
        }
        other => panic!("expected Sat, got {other:?}", other = describe(&other)),
    }
}

#[test]
fn to_fp_wrapping_a_compound_expression_emits_source_without_error() {
    let ctx = new_ctx();
    let root = parse_smtlib2(
        &ctx,
        "(declare-const x (_ FloatingPoint 11 53)) \
         (assert (fp.eq ((_ to_fp 11 53) RNE (fp.add RNE x ((_ to_fp 11 53) RNE 1.0))) \
                         ((_ to_fp 11 53) RNE 2.0)))",
    )
    .unwrap();
    let cfg = SolveConfig::default().with_mode(Mode::SourceEmit);
    match solve_formula(&ctx, "wrapemit1", &root, &cfg).unwrap() {
        SolveModeOutput::Source { code, .. } => assert!(code.contains("return ")),
        other => panic!("expected Source, got {other:?}", other = describe(&other)),
    }
}

#[test]
fn validated_model_survives_a_widening_fp32_to_fp64_wrap() {
    // `x` is declared fp32 but only ever appears wrapped in a `to_fp` to
    // fp64; the validator must rebuild its substitution numeral at `x`'s own
    // fp32 precision, not the wrapper's fp64 target sort, or re-checking the
    // formula against the candidate model would fail spuriously.
    let ctx = new_ctx();
    let root = parse_smtlib2(
        &ctx,
        "(declare-const x (_ FloatingPoint 8 24)) \
         (assert (fp.eq ((_ to_fp 11 53) RNE x) ((_ to_fp 11 53) RNE 1.0)))",
    )
    .unwrap();
    let cfg = SolveConfig::default().with_mode(Mode::Solve).with_validate(true);
    let output = solve_formula(&ctx, "wrapfp32", &root, &cfg).unwrap();
    match output {
        SolveModeOutput::Solve(SolveOutcome::Sat { model_confirmed, .. }) => {
            assert_eq!(model_confirmed, Some(true));
        }
        other => panic!("expected Sat, got {other:?}", other = describe(&other)),
    }
}

fn describe(output: &SolveModeOutput) -> &'static str {
    match output {
        SolveModeOutput::Analysis(_) => "Analysis",
        SolveModeOutput::Source { .. } => "Source",
        SolveModeOutput::Solve(_) => "Solve",
    }
}
