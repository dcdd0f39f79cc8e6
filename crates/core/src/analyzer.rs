//! Read-only feature-summary traversal (§4.3).
//!
//! Mirrors `FPExprAnalyzer`: a single recursive walk that classifies
//! variables and constants by precision, flags non-linearity, and latches
//! a handful of "this formula does something we don't fully support" bits.
//! No mutation of the input AST, no symbol table — just counters.

use std::collections::HashSet;

use serde::Serialize;

use crate::ast::{Node, OpKind, SortInfo};
use crate::fpa;

/// Variable and constant counts, linearity, and unsupported-construct flags
/// for one formula. Serializes to JSON for `fpsat analyze --format json`
/// as well as a plain-text summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeatureSummary {
    pub fp32_var_count: u32,
    pub fp64_var_count: u32,
    pub const_count: u32,
    pub is_linear: bool,
    pub has_non_fp_const: bool,
    pub has_non_rne_round_mode: bool,
    pub has_unsupported_expr: bool,
}

impl FeatureSummary {
    fn new() -> Self {
        FeatureSummary {
            is_linear: true,
            ..Default::default()
        }
    }

    pub fn pretty_print(&self, formula_name: &str) -> String {
        format!(
            "Formula: {formula_name}\n\
             Is linear ({})\n\
             Has float variables ({})\n\
             Has double variables ({})\n\
             Has const values ({})\n\
             Has unsupported expr ({})\n",
            if self.is_linear { "yes" } else { "no" },
            self.fp32_var_count,
            self.fp64_var_count,
            self.const_count,
            if self.has_unsupported_expr { "yes" } else { "no" },
        )
    }
}

struct Analyzer {
    summary: FeatureSummary,
    seen_vars: HashSet<u32>,
    seen_consts: HashSet<u32>,
}

/// Walks `node` once and returns its feature summary.
pub fn analyze(node: &Node) -> FeatureSummary {
    let mut state = Analyzer {
        summary: FeatureSummary::new(),
        seen_vars: HashSet::new(),
        seen_consts: HashSet::new(),
    };
    state.visit(node);
    state.summary
}

impl Analyzer {
    fn visit(&mut self, node: &Node) {
        if node.is_numeral() {
            self.visit_numeral(node);
            return;
        }
        if fpa::is_fp_var(node) {
            if self.seen_vars.insert(node.stable_hash()) {
                if fpa::is_fp32_var_decl(node) {
                    self.summary.fp32_var_count += 1;
                } else {
                    self.summary.fp64_var_count += 1;
                }
            }
            return;
        }
        if fpa::is_non_linear_fp(node) {
            self.summary.is_linear = false;
        }
        if node.op_kind() == OpKind::Other {
            self.summary.has_unsupported_expr = true;
        }
        for i in 0..node.num_args() {
            self.visit(&node.arg(i));
        }
    }

    fn visit_numeral(&mut self, node: &Node) {
        match node.sort_info() {
            SortInfo::FloatingPoint { .. } => {
                if self.seen_consts.insert(node.stable_hash()) {
                    self.summary.const_count += 1;
                }
            }
            SortInfo::RoundingMode => {
                if node.op_kind() != OpKind::FpaRmNearestTiesToEven {
                    self.summary.has_non_rne_round_mode = true;
                }
            }
            _ => {
                self.summary.has_non_fp_const = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_summary_is_linear_with_no_vars() {
        let s = FeatureSummary::new();
        assert!(s.is_linear);
        assert_eq!(s.fp32_var_count, 0);
        assert_eq!(s.fp64_var_count, 0);
    }

    #[test]
    fn pretty_print_mentions_formula_name() {
        let s = FeatureSummary::new();
        let out = s.pretty_print("demo");
        assert!(out.contains("Formula: demo"));
        assert!(out.contains("Is linear (yes)"));
    }
}
