//! Predicates and numeral-reconstruction helpers over [`Node`] (§4.1).
//!
//! The scaled-ULP distance and NaN predicate themselves live in
//! `fpsat-runtime` so that the JIT-compiled objective and the in-process
//! analyzer call the exact same code. This module re-exports them and adds
//! the AST-level predicates the original tool keeps in `FPAUtils`.

use regex::Regex;
use std::sync::LazyLock;

use crate::ast::{Node, OpKind, SortInfo};

pub use fpsat_runtime::{fp64_dis, fp64_eq_dis, fp64_isnan, fp64_neq_dis};

pub fn is_fp32(ebits: u32, sbits: u32) -> bool {
    ebits == 8 && sbits == 24
}

pub fn is_fp64(ebits: u32, sbits: u32) -> bool {
    ebits == 11 && sbits == 53
}

/// `e.num_args=0 ∧ e.kind=UNINTERPRETED ∧ e.sort=FLOATING_POINT`.
pub fn is_fp_var(node: &Node) -> bool {
    node.num_args() == 0
        && node.op_kind() == OpKind::Uninterpreted
        && matches!(node.sort_info(), SortInfo::FloatingPoint { .. })
}

/// The original tool greps the declaration's printed range sort for "8"/"24"
/// or "11"/"53" because the C++ z3 wrapper exposes no direct accessor for
/// `(ebits, sbits)` on a declaration. The Rust `z3` crate's `Dynamic::get_sort`
/// does expose them directly on the *value*'s sort, which is the same sort a
/// variable's declaration range would report, so these two predicates read
/// `sort_info()` rather than regex-matching a printed string.
pub fn is_fp32_var_decl(node: &Node) -> bool {
    matches!(node.sort_info(), SortInfo::FloatingPoint { ebits, sbits } if is_fp32(ebits, sbits))
}

pub fn is_fp64_var_decl(node: &Node) -> bool {
    matches!(node.sort_info(), SortInfo::FloatingPoint { ebits, sbits } if is_fp64(ebits, sbits))
}

pub fn is_bool_op(kind: OpKind) -> bool {
    matches!(
        kind,
        OpKind::True
            | OpKind::False
            | OpKind::Eq
            | OpKind::FpaEq
            | OpKind::Not
            | OpKind::And
            | OpKind::Or
            | OpKind::FpaLt
            | OpKind::FpaGt
            | OpKind::FpaLe
            | OpKind::FpaGe
            | OpKind::FpaIsNan
            | OpKind::FpaIsInf
            | OpKind::FpaIsZero
            | OpKind::FpaIsNormal
            | OpKind::FpaIsSubnormal
            | OpKind::FpaIsPositive
            | OpKind::FpaIsNegative
    )
}

pub fn is_non_linear_fp(node: &Node) -> bool {
    if !matches!(node.sort_info(), SortInfo::FloatingPoint { .. }) {
        return false;
    }
    matches!(
        node.op_kind(),
        OpKind::FpaMul
            | OpKind::FpaDiv
            | OpKind::FpaRem
            | OpKind::FpaAbs
            | OpKind::FpaMin
            | OpKind::FpaMax
            | OpKind::FpaFma
            | OpKind::FpaSqrt
            | OpKind::FpaRoundToIntegral
    )
}

/// A numeral's base-prefixed operand string (`0b…`, `0x…`, `0o…`) is
/// rewritten to an unprefixed base-10 string so `u64::from_str_radix` can
/// parse it without the prefix; the same trick the C++ tool's
/// `getBaseofNumStr` + `std::stoull` pair performs.
static BASE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#(b|x|o)").unwrap());

fn parse_bitfield(raw: &str) -> u64 {
    let caps = BASE_PREFIX.captures(raw);
    let (base, rest) = match caps {
        Some(c) => {
            let marker = c.get(1).unwrap().as_str();
            let base = match marker {
                "b" => 2,
                "x" => 16,
                "o" => 8,
                _ => 10,
            };
            (base, &raw[c.get(0).unwrap().end()..])
        }
        None => (10, raw),
    };
    u64::from_str_radix(rest, base).unwrap_or(0)
}

/// Reassembles `(sign || exponent || significand)` into a 32-bit pattern,
/// the hidden mantissa bit not represented, and reinterprets it as `f32`.
pub fn to_f32(node: &Node) -> f32 {
    match node.op_kind() {
        OpKind::FpaPlusInf => return f32::INFINITY,
        OpKind::FpaMinusInf => return f32::NEG_INFINITY,
        OpKind::FpaNan => return f32::NAN,
        OpKind::FpaPlusZero => return 0.0,
        OpKind::FpaMinusZero => return -0.0,
        _ => {}
    }
    let sign = parse_bitfield(&node.arg(0).numeral_decimal_string().unwrap_or_default());
    let exponent = parse_bitfield(&node.arg(1).numeral_decimal_string().unwrap_or_default());
    let significand = parse_bitfield(&node.arg(2).numeral_decimal_string().unwrap_or_default());
    let mut bits = (exponent as u32) << 23;
    bits |= significand as u32;
    if sign != 0 {
        bits |= 0x8000_0000;
    }
    f32::from_bits(bits)
}

pub fn to_f64(node: &Node) -> f64 {
    match node.op_kind() {
        OpKind::FpaPlusInf => return f64::INFINITY,
        OpKind::FpaMinusInf => return f64::NEG_INFINITY,
        OpKind::FpaNan => return f64::NAN,
        OpKind::FpaPlusZero => return 0.0,
        OpKind::FpaMinusZero => return -0.0,
        _ => {}
    }
    let sign = parse_bitfield(&node.arg(0).numeral_decimal_string().unwrap_or_default());
    let exponent = parse_bitfield(&node.arg(1).numeral_decimal_string().unwrap_or_default());
    let significand = parse_bitfield(&node.arg(2).numeral_decimal_string().unwrap_or_default());
    let mut bits = exponent << 52;
    bits |= significand;
    if sign != 0 {
        bits |= 0x8000_0000_0000_0000;
    }
    f64::from_bits(bits)
}

/// A bit-vector numeral (`BNUM`) prints with a leading sign nibble that must
/// be rewritten to `0` before parsing as decimal (mirrors
/// `numeral_str.replace(0, 1, 1, '0')` in the original code generator).
pub fn bnum_to_f64(printed: &str) -> f64 {
    let mut chars: Vec<char> = printed.chars().collect();
    if !chars.is_empty() {
        chars[0] = '0';
    }
    let rewritten: String = chars.into_iter().collect();
    rewritten.parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fp32_fp64_precision_predicates() {
        assert!(is_fp32(8, 24));
        assert!(!is_fp32(11, 53));
        assert!(is_fp64(11, 53));
        assert!(!is_fp64(8, 24));
    }

    #[test]
    fn bool_op_classification() {
        assert!(is_bool_op(OpKind::FpaLt));
        assert!(is_bool_op(OpKind::And));
        assert!(!is_bool_op(OpKind::FpaAdd));
        assert!(!is_bool_op(OpKind::FpaToFp));
    }

    #[test]
    fn bnum_rewrites_leading_sign_nibble() {
        assert_eq!(bnum_to_f64("10.5"), 0.5);
    }

    #[test]
    fn parse_bitfield_handles_bases() {
        assert_eq!(parse_bitfield("#b1010"), 10);
        assert_eq!(parse_bitfield("#xff"), 255);
        assert_eq!(parse_bitfield("#o17"), 15);
        assert_eq!(parse_bitfield("42"), 42);
    }
}
