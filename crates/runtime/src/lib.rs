//! fpsat native helper library
//!
//! Four small `extern "C"` functions that the JIT IR backend binds into the
//! compiled objective module via `add_global_mapping`. They are also called
//! directly (through `fpsat_core::fpa`) by the in-process analyzer and by
//! the optimizer's quick-exit check, so both code paths see bit-identical
//! results.
//!
//! - `fp64_dis`: scaled ULP-distance between two f64 values.
//! - `fp64_eq_dis`: alias of `fp64_dis` (positive-polarity equality).
//! - `fp64_neq_dis`: 0 if unequal, 1 if equal (negative-polarity equality).
//! - `fp64_isnan`: polarity-aware NaN test.

pub mod float_ops;

pub use float_ops::{fp64_dis, fp64_eq_dis, fp64_isnan, fp64_neq_dis};
