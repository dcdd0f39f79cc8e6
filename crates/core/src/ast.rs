//! Thin node wrapper over `z3::ast::Dynamic`.
//!
//! The ergonomic parts of the `z3` crate (contexts, solvers, SMT-LIB2
//! parsing, `Bool`/`Dynamic` construction) are used directly everywhere
//! else in this workspace. This module isolates the handful of
//! FP-specific introspection queries — declaration kind, sort (ebits,
//! sbits), and numeral bit extraction — that the safe wrapper does not
//! expose, going straight to the raw Z3 C API through `z3-sys` via
//! `Context::get_z3_context` and `Ast::get_z3_ast`. The original tool does
//! the same thing for the same reason: its own C++ wrapper has no
//! ergonomic accessor for FPA sort parameters either.

use std::os::raw::c_uint;

use z3::ast::{Ast, Dynamic};
use z3::{Context, Sort};
use z3_sys::{
    DeclKind, SortKind, Z3_ast, Z3_get_app_arg, Z3_get_app_decl, Z3_get_app_num_args,
    Z3_get_ast_hash, Z3_get_decl_kind, Z3_get_numeral_string, Z3_get_sort, Z3_get_sort_kind,
    Z3_is_numeral_ast, Z3_to_app,
};

/// This crate's own operator vocabulary, translated once from `z3::DeclKind`
/// so that every later match is against plain local variants instead of
/// guessing at the exact spelling of the upstream enum each time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    True,
    False,
    Eq,
    Not,
    And,
    Or,
    FpaEq,
    FpaLt,
    FpaGt,
    FpaLe,
    FpaGe,
    FpaIsNan,
    FpaIsInf,
    FpaIsZero,
    FpaIsNormal,
    FpaIsSubnormal,
    FpaIsPositive,
    FpaIsNegative,
    FpaAdd,
    FpaSub,
    FpaMul,
    FpaDiv,
    FpaRem,
    FpaNeg,
    FpaAbs,
    FpaMin,
    FpaMax,
    FpaFma,
    FpaSqrt,
    FpaRoundToIntegral,
    FpaPlusInf,
    FpaMinusInf,
    FpaNan,
    FpaPlusZero,
    FpaMinusZero,
    FpaToFp,
    FpaRmNearestTiesToEven,
    BitVectorNumeral,
    Uninterpreted,
    Other,
}

impl From<DeclKind> for OpKind {
    fn from(kind: DeclKind) -> Self {
        match kind {
            DeclKind::TRUE => OpKind::True,
            DeclKind::FALSE => OpKind::False,
            DeclKind::EQ => OpKind::Eq,
            DeclKind::NOT => OpKind::Not,
            DeclKind::AND => OpKind::And,
            DeclKind::OR => OpKind::Or,
            DeclKind::FPA_EQ => OpKind::FpaEq,
            DeclKind::FPA_LT => OpKind::FpaLt,
            DeclKind::FPA_GT => OpKind::FpaGt,
            DeclKind::FPA_LE => OpKind::FpaLe,
            DeclKind::FPA_GE => OpKind::FpaGe,
            DeclKind::FPA_IS_NAN => OpKind::FpaIsNan,
            DeclKind::FPA_IS_INFINITE => OpKind::FpaIsInf,
            DeclKind::FPA_IS_ZERO => OpKind::FpaIsZero,
            DeclKind::FPA_IS_NORMAL => OpKind::FpaIsNormal,
            DeclKind::FPA_IS_SUBNORMAL => OpKind::FpaIsSubnormal,
            DeclKind::FPA_IS_POSITIVE => OpKind::FpaIsPositive,
            DeclKind::FPA_IS_NEGATIVE => OpKind::FpaIsNegative,
            DeclKind::FPA_ADD => OpKind::FpaAdd,
            DeclKind::FPA_SUB => OpKind::FpaSub,
            DeclKind::FPA_MUL => OpKind::FpaMul,
            DeclKind::FPA_DIV => OpKind::FpaDiv,
            DeclKind::FPA_REM => OpKind::FpaRem,
            DeclKind::FPA_NEG => OpKind::FpaNeg,
            DeclKind::FPA_ABS => OpKind::FpaAbs,
            DeclKind::FPA_MIN => OpKind::FpaMin,
            DeclKind::FPA_MAX => OpKind::FpaMax,
            DeclKind::FPA_FMA => OpKind::FpaFma,
            DeclKind::FPA_SQRT => OpKind::FpaSqrt,
            DeclKind::FPA_ROUND_TO_INTEGRAL => OpKind::FpaRoundToIntegral,
            DeclKind::FPA_PLUS_INF => OpKind::FpaPlusInf,
            DeclKind::FPA_MINUS_INF => OpKind::FpaMinusInf,
            DeclKind::FPA_NAN => OpKind::FpaNan,
            DeclKind::FPA_PLUS_ZERO => OpKind::FpaPlusZero,
            DeclKind::FPA_MINUS_ZERO => OpKind::FpaMinusZero,
            DeclKind::FPA_TO_FP => OpKind::FpaToFp,
            DeclKind::FPA_RM_NEAREST_TIES_TO_EVEN => OpKind::FpaRmNearestTiesToEven,
            DeclKind::BNUM => OpKind::BitVectorNumeral,
            DeclKind::UNINTERPRETED => OpKind::Uninterpreted,
            _ => OpKind::Other,
        }
    }
}

/// Declared sort shape, enough to tell FP32 from FP64 from anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortInfo {
    FloatingPoint { ebits: u32, sbits: u32 },
    Bool,
    BitVector { width: u32 },
    RoundingMode,
    Other,
}

impl SortInfo {
    pub fn is_fp32(&self) -> bool {
        matches!(self, SortInfo::FloatingPoint { ebits: 8, sbits: 24 })
    }

    pub fn is_fp64(&self) -> bool {
        matches!(
            self,
            SortInfo::FloatingPoint { ebits: 11, sbits: 53 }
        )
    }
}

/// One AST node, borrowed for the duration of a single translation pass.
#[derive(Clone)]
pub struct Node<'ctx> {
    ctx: &'ctx Context,
    ast: Dynamic<'ctx>,
}

impl<'ctx> Node<'ctx> {
    pub fn new(ctx: &'ctx Context, ast: Dynamic<'ctx>) -> Self {
        Node { ctx, ast }
    }

    pub fn ctx(&self) -> &'ctx Context {
        self.ctx
    }

    pub fn raw(&self) -> Z3_ast {
        self.ast.get_z3_ast()
    }

    fn z3_ctx(&self) -> z3_sys::Z3_context {
        self.ctx.get_z3_context()
    }

    /// Structural hash, stable across equal sub-terms within the same
    /// context — the key this crate's symbol table is built around.
    pub fn stable_hash(&self) -> u32 {
        unsafe { Z3_get_ast_hash(self.z3_ctx(), self.raw()) as u32 }
    }

    pub fn op_kind(&self) -> OpKind {
        unsafe {
            let app = Z3_to_app(self.z3_ctx(), self.raw());
            let decl = Z3_get_app_decl(self.z3_ctx(), app);
            OpKind::from(Z3_get_decl_kind(self.z3_ctx(), decl))
        }
    }

    pub fn num_args(&self) -> usize {
        unsafe {
            let app = Z3_to_app(self.z3_ctx(), self.raw());
            Z3_get_app_num_args(self.z3_ctx(), app) as usize
        }
    }

    pub fn arg(&self, i: usize) -> Node<'ctx> {
        unsafe {
            let app = Z3_to_app(self.z3_ctx(), self.raw());
            let raw_arg = Z3_get_app_arg(self.z3_ctx(), app, i as c_uint);
            Node {
                ctx: self.ctx,
                ast: Dynamic::wrap(self.ctx, raw_arg),
            }
        }
    }

    pub fn sort_info(&self) -> SortInfo {
        let sort: Sort<'ctx> = self.ast.get_sort();
        unsafe {
            let raw_sort = sort.get_z3_sort();
            match Z3_get_sort_kind(self.z3_ctx(), raw_sort) {
                SortKind::FLOATING_POINT => {
                    let ebits = z3_sys::Z3_fpa_get_ebits(self.z3_ctx(), raw_sort);
                    let sbits = z3_sys::Z3_fpa_get_sbits(self.z3_ctx(), raw_sort);
                    SortInfo::FloatingPoint { ebits, sbits }
                }
                SortKind::BOOL => SortInfo::Bool,
                SortKind::BV => {
                    let width = z3_sys::Z3_get_bv_sort_size(self.z3_ctx(), raw_sort);
                    SortInfo::BitVector { width }
                }
                SortKind::ROUNDING_MODE => SortInfo::RoundingMode,
                _ => SortInfo::Other,
            }
        }
    }

    pub fn is_numeral(&self) -> bool {
        unsafe { Z3_is_numeral_ast(self.z3_ctx(), self.raw()) }
    }

    /// The numeral's value as a base-10 string, for numeral kinds Z3 can
    /// render without a prefixed base marker (bit-vector and int numerals).
    pub fn numeral_decimal_string(&self) -> Option<String> {
        if !self.is_numeral() {
            return None;
        }
        unsafe {
            let raw = Z3_get_numeral_string(self.z3_ctx(), self.raw());
            if raw.is_null() {
                return None;
            }
            Some(std::ffi::CStr::from_ptr(raw).to_string_lossy().into_owned())
        }
    }

    pub fn as_dynamic(&self) -> &Dynamic<'ctx> {
        &self.ast
    }

    pub fn into_dynamic(self) -> Dynamic<'ctx> {
        self.ast
    }
}
