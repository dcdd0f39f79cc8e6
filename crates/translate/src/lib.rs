//! Translation, optimization, and solve-loop orchestration for the
//! floating-point SMT solver built on top of `fpsat-core`.
//!
//! Two independent backends turn one formula into one numeric objective
//! (§4.5 source-text, §4.6 JIT), a shared optimizer driver searches for a
//! zero (§4.7), and a model validator re-checks the solution with the SMT
//! toolkit itself (§4.8). `solve` wires the three together into the loop
//! the `fpsat` binary drives.

pub mod config;
pub mod error;
pub mod jit;
pub mod optimizer;
pub mod solve;
pub mod sourcegen;
pub mod validator;

pub use config::{GlobalAlgorithm, LocalAlgorithm, ManifestFormat, Mode, OptConfig, SolveConfig};
pub use error::TranslateError;
pub use solve::{parse_smtlib2, solve_formula, SolveModeOutput, SolveOutcome};
