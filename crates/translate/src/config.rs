//! Optimizer and solve configuration (§3, §4.7, §6).
//!
//! `OptConfig` is the plain data struct spec.md §3 gives, built with a
//! `CompilerConfig`-style builder. `SolveConfig` is the CLI-level
//! configuration (mode, algorithm, output format); an optional `fpsat.toml`
//! in the working directory can override its defaults, merged the way a
//! user config layers over built-in defaults (user values win, unset keys
//! fall through).

use std::path::Path;

use serde::Deserialize;

/// Global derivative-free search algorithms this driver supports (§4.7).
/// Names map 1:1 onto `nlopt::Algorithm` variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalAlgorithm {
    Direct,
    DirectL,
    DirectLRand,
    OrigDirect,
    OrigDirectL,
    MlslLds,
    GMlsl,
    GMlslLds,
    Crs2Lm,
    Isres,
    Esch,
}

impl GlobalAlgorithm {
    /// `-alg direct|crs2|isres|mlsl` (§6); `crs2` is the default.
    pub fn from_cli_name(name: &str) -> Result<Self, String> {
        match name {
            "direct" => Ok(GlobalAlgorithm::DirectL),
            "crs2" => Ok(GlobalAlgorithm::Crs2Lm),
            "isres" => Ok(GlobalAlgorithm::Isres),
            "mlsl" => Ok(GlobalAlgorithm::GMlsl),
            other => Err(format!("unknown -alg value: {other}")),
        }
    }

    /// Population-requiring algorithms (§3). "MLSL" here refers to the
    /// population-free `MLSL_LDS` variant — `G_MLSL`
    /// and `G_MLSL_LDS` are paired with a local optimizer instead and take
    /// no population parameter of their own (see DESIGN.md).
    pub fn requires_population(self) -> bool {
        matches!(
            self,
            GlobalAlgorithm::MlslLds
                | GlobalAlgorithm::Crs2Lm
                | GlobalAlgorithm::Isres
                | GlobalAlgorithm::Esch
        )
    }

    /// Local-optimizer-requiring algorithms (§4.7).
    pub fn requires_local_optimizer(self) -> bool {
        matches!(self, GlobalAlgorithm::GMlsl | GlobalAlgorithm::GMlslLds)
    }

    /// True for the `MLSL` family that tightens the default eval budget
    /// and relative tolerance (§3).
    fn is_mlsl_family(self) -> bool {
        matches!(
            self,
            GlobalAlgorithm::MlslLds | GlobalAlgorithm::GMlsl | GlobalAlgorithm::GMlslLds
        )
    }

    pub fn to_nlopt(self) -> nlopt::Algorithm {
        match self {
            GlobalAlgorithm::Direct => nlopt::Algorithm::Direct,
            GlobalAlgorithm::DirectL => nlopt::Algorithm::DirectL,
            GlobalAlgorithm::DirectLRand => nlopt::Algorithm::DirectLRand,
            GlobalAlgorithm::OrigDirect => nlopt::Algorithm::OrigDirect,
            GlobalAlgorithm::OrigDirectL => nlopt::Algorithm::OrigDirectL,
            GlobalAlgorithm::MlslLds => nlopt::Algorithm::MlslLds,
            GlobalAlgorithm::GMlsl => nlopt::Algorithm::GMlsl,
            GlobalAlgorithm::GMlslLds => nlopt::Algorithm::GMlslLds,
            GlobalAlgorithm::Crs2Lm => nlopt::Algorithm::Crs2Lm,
            GlobalAlgorithm::Isres => nlopt::Algorithm::Isres,
            GlobalAlgorithm::Esch => nlopt::Algorithm::Esch,
        }
    }
}

/// Local polisher used either standalone (`refine_result`) or chained
/// beneath an `MLSL`-family global search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAlgorithm {
    Bobyqa,
    Sbplx,
}

impl LocalAlgorithm {
    pub fn to_nlopt(self) -> nlopt::Algorithm {
        match self {
            LocalAlgorithm::Bobyqa => nlopt::Algorithm::Bobyqa,
            LocalAlgorithm::Sbplx => nlopt::Algorithm::Sbplx,
        }
    }
}

/// Bounds, budgets, and tolerances the optimizer driver enforces (§3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptConfig {
    pub max_eval_count: u32,
    pub max_local_eval_count: u32,
    pub rel_tolerance: f64,
    pub bound: f64,
    pub step_size: f64,
    pub initial_population: u32,
}

impl Default for OptConfig {
    fn default() -> Self {
        OptConfig {
            max_eval_count: 500_000,
            max_local_eval_count: 50_000,
            rel_tolerance: 1e-10,
            bound: 1e9,
            step_size: 0.5,
            initial_population: 0,
        }
    }
}

impl OptConfig {
    /// Built for a specific `(global, local)` algorithm pairing, tightening
    /// the eval budget and tolerance for the `MLSL` family (§3).
    pub fn for_algorithm(global: GlobalAlgorithm) -> Self {
        let mut cfg = OptConfig::default();
        if global.is_mlsl_family() {
            cfg.max_eval_count = 50_000;
            cfg.rel_tolerance = 1e-8;
        }
        cfg
    }

    pub fn with_bound(mut self, bound: f64) -> Self {
        self.bound = bound;
        self
    }

    pub fn with_step_size(mut self, step_size: f64) -> Self {
        self.step_size = step_size;
        self
    }

    pub fn with_max_eval_count(mut self, max_eval_count: u32) -> Self {
        self.max_eval_count = max_eval_count;
        self
    }
}

/// Which of the three top-level modes (§4.9, §6) to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Solve,
    Analyze,
    SourceEmit,
}

/// Manifest format for source-emit mode (§4.5, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Plain,
    Cpp,
}

/// CLI-level configuration, built via a `CompilerConfig`-style builder and
/// optionally overridden by an `fpsat.toml` in the working directory.
#[derive(Debug, Clone)]
pub struct SolveConfig {
    pub mode: Mode,
    pub algorithm: GlobalAlgorithm,
    pub manifest_format: ManifestFormat,
    pub validate: bool,
    pub smtlib_output: bool,
    pub opt: OptConfig,
}

impl Default for SolveConfig {
    fn default() -> Self {
        let algorithm = GlobalAlgorithm::Crs2Lm;
        SolveConfig {
            mode: Mode::Solve,
            algorithm,
            manifest_format: ManifestFormat::Plain,
            validate: false,
            smtlib_output: false,
            opt: OptConfig::for_algorithm(algorithm),
        }
    }
}

impl SolveConfig {
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_algorithm(mut self, algorithm: GlobalAlgorithm) -> Self {
        self.algorithm = algorithm;
        self.opt = OptConfig::for_algorithm(algorithm);
        self
    }

    pub fn with_manifest_format(mut self, format: ManifestFormat) -> Self {
        self.manifest_format = format;
        self
    }

    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_smtlib_output(mut self, smtlib_output: bool) -> Self {
        self.smtlib_output = smtlib_output;
        self
    }

    /// Merges an on-disk `fpsat.toml` over these defaults, if present.
    /// Unset keys in the file fall through to whatever this config already
    /// has: user values win, everything else keeps its built-in default.
    pub fn merge_toml_file(mut self, path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(self);
        }
        let text =
            std::fs::read_to_string(path).map_err(|e| format!("reading {path:?}: {e}"))?;
        let file: TomlOverrides =
            toml::from_str(&text).map_err(|e| format!("parsing {path:?}: {e}"))?;
        if let Some(bound) = file.bound {
            self.opt.bound = bound;
        }
        if let Some(step_size) = file.step_size {
            self.opt.step_size = step_size;
        }
        if let Some(rel_tolerance) = file.rel_tolerance {
            self.opt.rel_tolerance = rel_tolerance;
        }
        if let Some(max_eval_count) = file.max_eval_count {
            self.opt.max_eval_count = max_eval_count;
        }
        if let Some(max_local_eval_count) = file.max_local_eval_count {
            self.opt.max_local_eval_count = max_local_eval_count;
        }
        if let Some(population) = file.initial_population {
            self.opt.initial_population = population;
        }
        Ok(self)
    }
}

#[derive(Debug, Default, Deserialize)]
struct TomlOverrides {
    bound: Option<f64>,
    step_size: Option<f64>,
    rel_tolerance: Option<f64>,
    max_eval_count: Option<u32>,
    max_local_eval_count: Option<u32>,
    initial_population: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_opt_config_matches_the_property_table() {
        let cfg = OptConfig::default();
        assert_eq!(cfg.max_eval_count, 500_000);
        assert_eq!(cfg.max_local_eval_count, 50_000);
        assert_eq!(cfg.rel_tolerance, 1e-10);
        assert_eq!(cfg.bound, 1e9);
        assert_eq!(cfg.step_size, 0.5);
        assert_eq!(cfg.initial_population, 0);
    }

    #[test]
    fn mlsl_family_tightens_eval_budget_and_tolerance() {
        let cfg = OptConfig::for_algorithm(GlobalAlgorithm::GMlsl);
        assert_eq!(cfg.max_eval_count, 50_000);
        assert_eq!(cfg.rel_tolerance, 1e-8);
        // unrelated fields are unchanged
        assert_eq!(cfg.bound, 1e9);
        assert_eq!(cfg.step_size, 0.5);
    }

    #[test]
    fn non_mlsl_algorithm_keeps_plain_defaults() {
        let cfg = OptConfig::for_algorithm(GlobalAlgorithm::Crs2Lm);
        assert_eq!(cfg.max_eval_count, 500_000);
        assert_eq!(cfg.rel_tolerance, 1e-10);
    }

    #[test]
    fn cli_algorithm_names_map_to_expected_variants() {
        assert_eq!(GlobalAlgorithm::from_cli_name("crs2").unwrap(), GlobalAlgorithm::Crs2Lm);
        assert_eq!(GlobalAlgorithm::from_cli_name("direct").unwrap(), GlobalAlgorithm::DirectL);
        assert_eq!(GlobalAlgorithm::from_cli_name("isres").unwrap(), GlobalAlgorithm::Isres);
        assert_eq!(GlobalAlgorithm::from_cli_name("mlsl").unwrap(), GlobalAlgorithm::GMlsl);
        assert!(GlobalAlgorithm::from_cli_name("bogus").is_err());
    }

    #[test]
    fn merge_toml_file_is_a_noop_when_absent() {
        let cfg = SolveConfig::default()
            .merge_toml_file(Path::new("/nonexistent/fpsat.toml"))
            .unwrap();
        assert_eq!(cfg.opt, OptConfig::default());
    }

    #[test]
    fn merge_toml_file_overrides_only_set_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fpsat.toml");
        std::fs::write(&path, "bound = 10.0\nmax_eval_count = 1000\n").unwrap();
        let cfg = SolveConfig::default().merge_toml_file(&path).unwrap();
        assert_eq!(cfg.opt.bound, 10.0);
        assert_eq!(cfg.opt.max_eval_count, 1000);
        // untouched keys keep their algorithm-derived defaults
        assert_eq!(cfg.opt.rel_tolerance, OptConfig::for_algorithm(GlobalAlgorithm::Crs2Lm).rel_tolerance);
    }
}
