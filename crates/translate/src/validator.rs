//! Model validation (§4.8): re-checks an optimizer's candidate point with
//! the SMT toolkit itself rather than trusting the numeric search.
//!
//! A derivative-free search works in `f64` and is not IEEE-754-exact about
//! rounding modes, subnormals, or signed zero; the only way to know a
//! candidate is a genuine model is to substitute it back into the original
//! formula and let the SMT toolkit decide, bit for bit. This is the
//! substitute-based validator only — Design Notes §9 records that the
//! tree-walking alternative was dead code upstream and is not reproduced
//! here.

use z3::ast::{Ast, Bool, Dynamic, Float};
use z3::{Context, SatResult, Solver};

use fpsat_core::{FpaWrapRegistry, Node, VariableRegistry};

use crate::error::TranslateError;

/// Builds the `(variable, concrete-value)` substitution pairs for one
/// optimizer result and checks the original formula against them.
pub fn validate<'ctx>(
    ctx: &'ctx Context,
    formula: &Node<'ctx>,
    vars: &VariableRegistry<'ctx>,
    wraps: &FpaWrapRegistry<'ctx>,
    point: &[f64],
) -> Result<bool, TranslateError> {
    let mut substitution: Vec<(Dynamic<'ctx>, Dynamic<'ctx>)> = Vec::with_capacity(vars.len());
    for entry in vars.iter() {
        let id = substitution.len();
        let value = point.get(id).copied().unwrap_or(0.0);
        let literal: Float<'ctx> =
            if entry.kind.is_fp32() { Float::from_f32(ctx, value as f32) } else { Float::from_f64(ctx, value) };
        substitution.push((entry.node.as_dynamic().clone(), Dynamic::from_ast(&literal)));
    }

    // An `FPA_TO_FP` wrapper around a bare variable (§4.6, §9) was never
    // registered as its own variable; undoing the cast means replacing the
    // whole wrapper node with a numeral, and that numeral has to carry the
    // *wrapper's own* sort, not the wrapped variable's — the wrapper node
    // being substituted away is itself fp64 (say), so the replacement must
    // be too, or `Ast::substitute` rejects the pair on a sort mismatch.
    for wrap in wraps.iter() {
        let inner_value = point.get(wrap.inner_id).copied().unwrap_or(0.0);
        let literal: Float<'ctx> = if wrap.wrapper.sort_info().is_fp32() {
            Float::from_f32(ctx, inner_value as f32)
        } else {
            Float::from_f64(ctx, inner_value)
        };
        substitution.push((wrap.wrapper.as_dynamic().clone(), Dynamic::from_ast(&literal)));
    }

    if substitution.is_empty() && !vars.is_empty() {
        return Err(TranslateError::Unsupported(
            "validator asked to substitute more variables than the optimizer produced".to_string(),
        ));
    }

    let pairs: Vec<(&Dynamic<'ctx>, &Dynamic<'ctx>)> =
        substitution.iter().map(|(from, to)| (from, to)).collect();
    let substituted = formula.as_dynamic().substitute(&pairs);
    let substituted_bool: Bool<'ctx> = substituted
        .as_bool()
        .ok_or_else(|| TranslateError::Unsupported("substituted formula is not boolean".to_string()))?
        .simplify();

    let solver = Solver::new(ctx);
    solver.assert(&substituted_bool);
    Ok(matches!(solver.check(), SatResult::Sat))
}

/// Converts an optimizer point back into each variable's concrete
/// precision for display (`§8` witness output), without touching the
/// original AST.
pub fn format_witness(vars: &VariableRegistry, point: &[f64]) -> Vec<(String, f64)> {
    vars.iter()
        .enumerate()
        .map(|(id, entry)| {
            let raw = point.get(id).copied().unwrap_or(0.0);
            let value = if entry.kind.is_fp32() { raw as f32 as f64 } else { raw };
            (format!("var_{id}"), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_witness_widens_fp32_through_f32_rounding() {
        let mut vars: Vec<(String, f64)> = Vec::new();
        // exercised end-to-end in fpsat-translate's integration tests, which
        // build a real z3::Context; this unit test only pins the precision
        // narrowing math used above (f64 -> f32 -> f64 is lossy on purpose).
        let raw = 0.1f64;
        let narrowed = raw as f32 as f64;
        vars.push(("var_0".to_string(), narrowed));
        assert_ne!(vars[0].1, raw);
    }
}
