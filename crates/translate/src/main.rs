//! `fpsat` — native floating-point SMT solving by objective-function
//! compilation and derivative-free global optimization (§1, §6).
//!
//! Flat flags rather than subcommands (`-mode`/`-alg`/`-fmt` select this
//! one invocation's behavior; see DESIGN.md): `clap`'s derive API plus a
//! `--completions` flag generating shell completions via `clap_complete`.

use std::io;
use std::path::PathBuf;
use std::time::Instant;

use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::{generate, Shell};
use tracing::{error, info, warn};

use fpsat_translate::config::{GlobalAlgorithm, ManifestFormat, Mode, SolveConfig};
use fpsat_translate::solve::{parse_smtlib2, solve_formula, SolveModeOutput, SolveOutcome};
use fpsat_translate::sourcegen::func_name_from_path;

#[derive(Parser)]
#[command(name = "fpsat")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Native floating-point SMT solving by global optimization", long_about = None)]
struct Cli {
    /// SMT-LIBv2 input file
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    file: Option<PathBuf>,

    /// `go` (solve), `fa` (analyze), or `cg` (emit source/manifest)
    #[arg(long = "mode", value_enum, default_value_t = CliMode::Go)]
    mode: CliMode,

    /// Global search algorithm
    #[arg(long = "alg", default_value = "crs2")]
    alg: String,

    /// Manifest format in `cg` mode
    #[arg(long = "fmt", value_enum, default_value_t = CliFmt::Plain)]
    fmt: CliFmt,

    /// Feature-summary format in `fa` mode
    #[arg(long = "format", value_enum, default_value_t = AnalyzeFormat::Plain)]
    format: AnalyzeFormat,

    /// After `sat`, re-validate the model against the SMT toolkit
    #[arg(short = 'c', long = "check")]
    check: bool,

    /// Emit `sat`/`unsat`/`unknown` (one line) instead of CSV
    #[arg(long = "smtlib-output")]
    smtlib_output: bool,

    /// Directory to write `gofuncs.h`/`.c`/`.api` into (`cg` mode)
    #[arg(long = "out-dir", default_value = ".")]
    out_dir: PathBuf,

    /// Generate a shell completion script and exit
    #[arg(long = "completions", value_enum)]
    completions: Option<Shell>,
}

#[derive(Copy, Clone, ValueEnum)]
enum CliMode {
    Go,
    Fa,
    Cg,
}

#[derive(Copy, Clone, ValueEnum)]
enum CliFmt {
    Plain,
    Cpp,
}

#[derive(Copy, Clone, ValueEnum)]
enum AnalyzeFormat {
    Plain,
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("fpsat=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "fpsat", &mut io::stdout());
        return;
    }

    let Some(path) = cli.file.clone() else {
        eprintln!("error: -f/--file is required unless --completions is given");
        std::process::exit(1);
    };

    std::process::exit(run(&cli, &path));
}

fn run(cli: &Cli, path: &PathBuf) -> i32 {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            error!("reading {path:?}: {e}");
            println!("{},error,0.0,INF,error", func_name_from_path(path));
            return 1;
        }
    };

    let base_cfg = build_config(cli);
    let cfg = match base_cfg.clone().merge_toml_file(&PathBuf::from("fpsat.toml")) {
        Ok(c) => c,
        Err(e) => {
            warn!("ignoring fpsat.toml: {e}");
            base_cfg
        }
    };

    let func_name = func_name_from_path(path);
    let z3_cfg = z3::Config::new();
    let ctx = z3::Context::new(&z3_cfg);

    let root = match parse_smtlib2(&ctx, &text) {
        Ok(r) => r,
        Err(e) => {
            error!("{e}");
            if cli.smtlib_output {
                println!("unknown");
            } else {
                println!("{func_name},error,0.0,INF,error");
            }
            return 0;
        }
    };

    let start = Instant::now();
    let outcome = solve_formula(&ctx, &func_name, &root, &cfg);
    let elapsed = start.elapsed().as_secs_f64();

    match outcome {
        Ok(SolveModeOutput::Analysis(summary)) => {
            match cli.format {
                AnalyzeFormat::Plain => println!("{}", summary.pretty_print(&func_name)),
                AnalyzeFormat::Json => match serde_json::to_string_pretty(&summary) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        error!("serializing feature summary: {e}");
                        return 1;
                    }
                },
            }
            0
        }
        Ok(SolveModeOutput::Source { code, var_count }) => {
            if let Err(e) = write_manifest(&cli.out_dir, &func_name, &code, var_count, cfg.manifest_format) {
                error!("writing manifest: {e}");
                return 1;
            }
            info!("emitted {func_name} ({var_count} variables) to {:?}", cli.out_dir);
            0
        }
        Ok(SolveModeOutput::Solve(outcome)) => report_solve(&func_name, elapsed, outcome, cli.smtlib_output),
        Err(e) => {
            error!("{e}");
            if cli.smtlib_output {
                println!("unknown");
            } else {
                println!("{func_name},error,{elapsed:.4},INF,error");
            }
            1
        }
    }
}

fn build_config(cli: &Cli) -> SolveConfig {
    let mode = match cli.mode {
        CliMode::Go => Mode::Solve,
        CliMode::Fa => Mode::Analyze,
        CliMode::Cg => Mode::SourceEmit,
    };
    let algorithm = GlobalAlgorithm::from_cli_name(&cli.alg).unwrap_or_else(|e| {
        warn!("{e}, falling back to crs2");
        GlobalAlgorithm::Crs2Lm
    });
    let manifest_format = match cli.fmt {
        CliFmt::Plain => ManifestFormat::Plain,
        CliFmt::Cpp => ManifestFormat::Cpp,
    };
    SolveConfig::default()
        .with_mode(mode)
        .with_algorithm(algorithm)
        .with_manifest_format(manifest_format)
        .with_validate(cli.check)
        .with_smtlib_output(cli.smtlib_output)
}

fn report_solve(func_name: &str, elapsed: f64, outcome: SolveOutcome, smtlib_output: bool) -> i32 {
    match outcome {
        SolveOutcome::Sat { witness, residual, model_confirmed } => {
            if smtlib_output {
                println!("sat");
            } else {
                let status = match model_confirmed {
                    Some(true) => ",valid",
                    Some(false) => ",invalid",
                    None => "",
                };
                println!("{func_name},sat,{elapsed:.4},{residual},success{status}");
            }
            for (name, value) in witness {
                info!("  {name} = {value}");
            }
            0
        }
        SolveOutcome::Unsat { best_residual } => {
            if smtlib_output {
                println!("unknown");
            } else {
                println!("{func_name},unsat,{elapsed:.4},{best_residual},success");
            }
            0
        }
    }
}

fn write_manifest(
    out_dir: &PathBuf,
    func_name: &str,
    code: &str,
    var_count: usize,
    format: ManifestFormat,
) -> std::io::Result<()> {
    use fpsat_translate::sourcegen::DISTANCE_FUNC_C;

    std::fs::create_dir_all(out_dir)?;
    let header_path = out_dir.join("gofuncs.h");
    let source_path = out_dir.join("gofuncs.c");
    let manifest_path = out_dir.join("gofuncs.api");

    let signature = fpsat_translate::sourcegen::SourceGenerator::func_signature(func_name);

    let existing_header = std::fs::read_to_string(&header_path).unwrap_or_default();
    if !existing_header.contains(&signature) {
        let mut header = existing_header;
        if header.is_empty() {
            header.push_str("#pragma once\n\n");
        }
        header.push_str(&signature);
        header.push_str(";\n");
        std::fs::write(&header_path, header)?;
    }

    let mut source = std::fs::read_to_string(&source_path).unwrap_or_default();
    if source.is_empty() {
        source.push_str("#include \"gofuncs.h\"\n#include <math.h>\n#include <stdint.h>\n\n");
        source.push_str(DISTANCE_FUNC_C);
    }
    source.push('\n');
    source.push_str(code);
    std::fs::write(&source_path, source)?;

    let mut manifest = std::fs::read_to_string(&manifest_path).unwrap_or_default();
    let entry = match format {
        ManifestFormat::Plain => format!("{func_name},{var_count}\n"),
        ManifestFormat::Cpp => format!("{{\"{func_name}\", {{{func_name}, {var_count}}}}},\n"),
    };
    manifest.push_str(&entry);
    std::fs::write(&manifest_path, manifest)?;

    Ok(())
}
