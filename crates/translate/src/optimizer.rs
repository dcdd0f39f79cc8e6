//! Derivative-free global search plus local polish (§4.7).
//!
//! Mirrors `NLoptOptimizer`: a global search over `[-bound, bound]^n`
//! looking for an objective value at or below `rel_tolerance`, optionally
//! paired with a local optimizer for the `MLSL` family, followed by a
//! local-polish pass that chases away the rounding-error residue a
//! derivative-free search leaves near a true root.

use std::cell::RefCell;
use std::rc::Rc;

use nlopt::{Nlopt, Target};

use crate::config::{GlobalAlgorithm, LocalAlgorithm, OptConfig};
use crate::error::TranslateError;

/// A boxed, reference-counted objective lets the global optimizer and its
/// paired local optimizer (`G_MLSL`/`G_MLSL_LDS`, §4.7) share one evaluator
/// behind a single named closure type, which is what `Nlopt::set_local_optimizer`
/// requires — two `impl FnMut` parameters never name the same type, but two
/// `Rc<RefCell<dyn FnMut(&[f64]) -> f64>>` instances do.
type SharedObjective<'a> = Rc<RefCell<dyn FnMut(&[f64]) -> f64 + 'a>>;

fn eval_shared(x: &[f64], _grad: Option<&mut [f64]>, data: &mut SharedObjective<'_>) -> f64 {
    (data.borrow_mut())(x)
}

/// One optimization attempt's outcome.
#[derive(Debug, Clone)]
pub struct OptimizeResult {
    pub point: Vec<f64>,
    pub value: f64,
    pub converged: bool,
}

fn nlopt_err<E: std::fmt::Debug>(e: E) -> TranslateError {
    TranslateError::Jit(format!("nlopt: {e:?}"))
}

/// A value this small or smaller, but not exactly zero, is treated as a
/// derivative-free search's rounding residue rather than a genuine miss
/// (mirrors `existsRoundingError`).
const ROUNDING_ERROR_TOLERANCE: f64 = 1e-6;

/// Snaps each coordinate within `ROUNDING_ERROR_TOLERANCE` of its own
/// nearest integer to that exact integer, keeping the snap only if it does
/// not raise the objective above `min` (mirrors `fixRoundingErrorNearZero`).
/// A derivative-free search often lands at `k ± ε` rather than the exact
/// integer boundary most SMT-LIB2 witnesses need; skipped entirely when
/// `min` is already an exact zero or farther than `ROUNDING_ERROR_TOLERANCE`
/// from zero, since the cleanup is only meaningful right at a near-miss.
/// Returns the objective re-evaluated at the (possibly updated) point.
pub fn fix_rounding_error_near_zero(
    point: &mut [f64],
    min: f64,
    mut objective: impl FnMut(&[f64]) -> f64,
) -> f64 {
    if min == 0.0 || min.abs() > ROUNDING_ERROR_TOLERANCE {
        return min;
    }
    for i in 0..point.len() {
        let k = point[i].trunc();
        if (point[i] - k).abs() < ROUNDING_ERROR_TOLERANCE {
            let original = point[i];
            point[i] = k;
            let candidate = objective(point);
            if candidate.is_nan() || candidate > min {
                point[i] = original;
            }
        }
    }
    objective(point)
}

pub fn exists_rounding_error(value: f64) -> bool {
    value > 0.0 && value < ROUNDING_ERROR_TOLERANCE
}

/// Runs the configured global search over `num_vars` unknowns.
///
/// Step 1 of `NLoptOptimizer::optimize` (§4.7): a quick exit at the all-zero
/// point before any real search — a trivially satisfiable formula (e.g.
/// `(assert true)`, or any formula already true at the origin) is recognized
/// without ever invoking the global algorithm. `num_vars == 0` is the
/// degenerate ground formula, where the quick-exit check at the (empty)
/// point is the entire search.
pub fn optimize(
    num_vars: usize,
    cfg: &OptConfig,
    global: GlobalAlgorithm,
    mut objective: impl FnMut(&[f64]) -> f64,
) -> Result<OptimizeResult, TranslateError> {
    let zero_point = vec![0.0f64; num_vars];
    let zero_value = objective(&zero_point);
    if zero_value == 0.0 {
        return Ok(OptimizeResult { point: zero_point, value: 0.0, converged: true });
    }
    if num_vars == 0 {
        return Ok(OptimizeResult { point: zero_point, value: zero_value, converged: zero_value <= cfg.rel_tolerance });
    }

    let shared: SharedObjective<'_> = Rc::new(RefCell::new(objective));
    let mut opt = Nlopt::new(global.to_nlopt(), num_vars, eval_shared, Target::Minimize, shared.clone());
    opt.set_lower_bounds(&vec![-cfg.bound; num_vars]).map_err(nlopt_err)?;
    opt.set_upper_bounds(&vec![cfg.bound; num_vars]).map_err(nlopt_err)?;
    opt.set_initial_step1(cfg.step_size).map_err(nlopt_err)?;
    opt.set_maxeval(cfg.max_eval_count).map_err(nlopt_err)?;
    opt.set_stopval(0.0).map_err(nlopt_err)?;
    opt.set_xtol_rel(cfg.rel_tolerance).map_err(nlopt_err)?;
    if global.requires_population() && cfg.initial_population > 0 {
        opt.set_population(cfg.initial_population).map_err(nlopt_err)?;
    }
    if global.requires_local_optimizer() {
        let mut local = Nlopt::new(
            LocalAlgorithm::Bobyqa.to_nlopt(),
            num_vars,
            eval_shared,
            Target::Minimize,
            shared.clone(),
        );
        local.set_initial_step1(cfg.step_size).map_err(nlopt_err)?;
        local.set_stopval(0.0).map_err(nlopt_err)?;
        local.set_maxeval(cfg.max_local_eval_count).map_err(nlopt_err)?;
        opt.set_local_optimizer(local).map_err(nlopt_err)?;
    }

    let mut point = zero_point;
    let value = opt
        .optimize(&mut point)
        .map_err(|(fail, value)| TranslateError::Jit(format!("optimizer status negative: {fail:?} (reached {value})")))?
        .1;
    Ok(OptimizeResult { point, value, converged: value <= cfg.rel_tolerance })
}

/// Local polish pass (BOBYQA/SBPLX) starting from `start`, used either to
/// refine a global search's near-miss or as `refine_result`'s standalone
/// entry point for a formula small enough to skip the global phase.
pub fn refine_result(
    num_vars: usize,
    cfg: &OptConfig,
    local: LocalAlgorithm,
    start: &[f64],
    mut objective: impl FnMut(&[f64]) -> f64,
) -> Result<OptimizeResult, TranslateError> {
    if num_vars == 0 {
        let value = objective(&[]);
        return Ok(OptimizeResult { point: Vec::new(), value, converged: value <= cfg.rel_tolerance });
    }

    let obj_fn = move |x: &[f64], _grad: Option<&mut [f64]>, _data: &mut ()| objective(x);
    let mut opt = Nlopt::new(local.to_nlopt(), num_vars, obj_fn, Target::Minimize, ());
    opt.set_lower_bounds(&vec![-cfg.bound; num_vars]).map_err(nlopt_err)?;
    opt.set_upper_bounds(&vec![cfg.bound; num_vars]).map_err(nlopt_err)?;
    opt.set_maxeval(cfg.max_local_eval_count).map_err(nlopt_err)?;
    opt.set_stopval(0.0).map_err(nlopt_err)?;
    opt.set_xtol_rel(cfg.rel_tolerance).map_err(nlopt_err)?;
    opt.set_initial_step1(cfg.step_size).map_err(nlopt_err)?;

    let mut point = start.to_vec();
    let value = opt
        .optimize(&mut point)
        .map_err(|(fail, value)| TranslateError::Jit(format!("local optimizer status negative: {fail:?} (reached {value})")))?
        .1;
    Ok(OptimizeResult { point, value, converged: value <= cfg.rel_tolerance })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_formula_evaluates_once_without_calling_nlopt() {
        let cfg = OptConfig::default();
        let mut calls = 0;
        let result = optimize(0, &cfg, GlobalAlgorithm::Crs2Lm, |_| {
            calls += 1;
            0.0
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert!(result.point.is_empty());
        assert!(result.converged);
    }

    #[test]
    fn rounding_error_window_excludes_exact_zero_and_large_values() {
        assert!(!exists_rounding_error(0.0));
        assert!(exists_rounding_error(1e-9));
        assert!(!exists_rounding_error(1.0));
    }

    #[test]
    fn near_integer_coordinate_snaps_when_the_snap_does_not_worsen_the_objective() {
        // 2.0000005 truncates to 2.0 and sits within the tolerance of that
        // truncated value, so `trunc`-based snapping (not round-to-nearest)
        // catches it.
        let mut point = vec![2.0000005];
        let min = 1e-8;
        let result = fix_rounding_error_near_zero(&mut point, min, |x| (x[0] - 2.0).abs());
        assert_eq!(point[0], 2.0);
        assert_eq!(result, 0.0);
    }

    #[test]
    fn snap_reverts_when_it_would_worsen_the_objective() {
        let mut point = vec![2.0000005];
        let min = 1e-8;
        // an objective that strongly prefers the un-snapped value
        let result = fix_rounding_error_near_zero(&mut point, min, |x| if x[0] == 2.0 { 5.0 } else { 0.0 });
        assert_eq!(point[0], 2.0000005);
        assert_eq!(result, 0.0);
    }

    #[test]
    fn skipped_when_min_is_exactly_zero_or_too_large() {
        let mut point = vec![2.0000005];
        let result = fix_rounding_error_near_zero(&mut point, 0.0, |_| panic!("objective should not be called"));
        assert_eq!(result, 0.0);
        assert_eq!(point[0], 2.0000005);

        let mut point2 = vec![2.0000005];
        let result2 = fix_rounding_error_near_zero(&mut point2, 1.0, |_| panic!("objective should not be called"));
        assert_eq!(result2, 1.0);
        assert_eq!(point2[0], 2.0000005);
    }
}
