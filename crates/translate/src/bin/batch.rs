//! `fpsat-batch` — re-solves an accumulated `gofuncs` manifest in one
//! process instead of one `cc`/JIT/optimize cycle per formula (§6 item 12).
//!
//! Grounded on the original `nl_solver` tool: compile the manifest's
//! `gofuncs.c` once with the system `cc`, `dlopen` the result, and drive
//! the same optimizer over each function's native pointer directly —
//! useful after a batch of `fpsat --mode cg` runs has built up a library
//! of objectives worth re-solving without re-generating source each time.

use std::os::raw::c_void;
use std::path::{Path, PathBuf};
use std::process::Command;

use clap::Parser;
use libloading::{Library, Symbol};
use tracing::{error, info, warn};

use fpsat_translate::config::{GlobalAlgorithm, OptConfig};
use fpsat_translate::optimizer;

#[derive(Parser)]
#[command(name = "fpsat-batch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Re-solve an accumulated gofuncs manifest", long_about = None)]
struct Cli {
    /// Directory containing gofuncs.h/.c/.api
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// Global search algorithm
    #[arg(long = "alg", default_value = "crs2")]
    alg: String,
}

type Objective = unsafe extern "C" fn(u32, *const f64, *mut f64, *mut c_void) -> f64;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fpsat_batch=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    std::process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let manifest_path = cli.dir.join("gofuncs.api");
    let entries = match parse_manifest(&manifest_path) {
        Ok(e) => e,
        Err(e) => {
            error!("reading {manifest_path:?}: {e}");
            return 1;
        }
    };
    if entries.is_empty() {
        warn!("{manifest_path:?} has no entries");
        return 0;
    }

    let lib_path = match compile_manifest(&cli.dir) {
        Ok(p) => p,
        Err(e) => {
            error!("compiling gofuncs.c: {e}");
            return 1;
        }
    };

    let library = match unsafe { Library::new(&lib_path) } {
        Ok(l) => l,
        Err(e) => {
            error!("dlopen {lib_path:?}: {e}");
            return 1;
        }
    };

    let algorithm = GlobalAlgorithm::from_cli_name(&cli.alg).unwrap_or_else(|e| {
        warn!("{e}, falling back to crs2");
        GlobalAlgorithm::Crs2Lm
    });
    let opt_cfg = OptConfig::for_algorithm(algorithm);

    let mut exit_code = 0;
    for entry in entries {
        let func: Symbol<Objective> = match unsafe { library.get(entry.name.as_bytes()) } {
            Ok(f) => f,
            Err(e) => {
                error!("{}: symbol not found in {lib_path:?}: {e}", entry.name);
                println!("{},error,0.0,INF,error", entry.name);
                exit_code = 1;
                continue;
            }
        };

        let start = std::time::Instant::now();
        let result = optimizer::optimize(entry.var_count, &opt_cfg, algorithm, |x| unsafe {
            func(x.len() as u32, x.as_ptr(), std::ptr::null_mut(), std::ptr::null_mut())
        });
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(r) if r.converged => {
                println!("{},sat,{elapsed:.4},{},success", entry.name, r.value);
                info!("{}: converged at {:?}", entry.name, r.point);
            }
            Ok(r) => {
                println!("{},unsat,{elapsed:.4},{},success", entry.name, r.value);
            }
            Err(e) => {
                error!("{}: {e}", entry.name);
                println!("{},error,{elapsed:.4},INF,error", entry.name);
                exit_code = 1;
            }
        }
    }
    exit_code
}

struct ManifestEntry {
    name: String,
    var_count: usize,
}

/// Parses the plain-format manifest (`func_name,arg_count` per line); the
/// `cpp`-format manifest is a lookup table for C++ callers, not meant to
/// be read back by this driver.
fn parse_manifest(path: &Path) -> std::io::Result<Vec<ManifestEntry>> {
    let text = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((name, count)) = line.split_once(',') {
            if let Ok(var_count) = count.trim().parse() {
                entries.push(ManifestEntry { name: name.trim().to_string(), var_count });
            }
        }
    }
    Ok(entries)
}

fn compile_manifest(dir: &Path) -> std::io::Result<PathBuf> {
    let source = dir.join("gofuncs.c");
    let lib_path = dir.join("libgofuncs.so");
    let status = Command::new("cc")
        .args(["-shared", "-fPIC", "-O2", "-o"])
        .arg(&lib_path)
        .arg(&source)
        .arg("-lm")
        .status()?;
    if !status.success() {
        return Err(std::io::Error::other(format!("cc exited with {status}")));
    }
    Ok(lib_path)
}
