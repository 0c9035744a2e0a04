//! zetawasm Command-Line Interface
//!
//! Probe tools for engine modules:
//! - Listing a module's function exports
//! - Checking an instance against the bridge method table
//! - Issuing raw payload calls with bytes from a file or stdin

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use zetawasm_bridge::{BridgeConfig, BridgeError, CallKind, EngineRuntime, Method};

#[derive(Parser)]
#[command(name = "zetawasm")]
#[command(author, version, about = "zetawasm engine bridge CLI", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Bridge configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Host tz database to expose to the engine
    #[arg(long, global = true)]
    zoneinfo: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the function exports of a module
    Exports {
        /// Engine module (.wasm)
        module: PathBuf,
    },

    /// Instantiate a module and report bridge exports it lacks
    Check {
        /// Engine module (.wasm)
        module: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Issue a raw payload call
    Call {
        /// Engine module (.wasm)
        module: PathBuf,

        /// Method name (`PrepareQuery` or `prepare_query`)
        method: String,

        /// Request bytes (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Response bytes (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_ref(), cli.zoneinfo.as_ref())?;

    match cli.command {
        Commands::Exports { module } => cmd_exports(config, module),
        Commands::Check { module, json } => cmd_check(config, module, json),
        Commands::Call {
            module,
            method,
            input,
            output,
        } => cmd_call(config, module, method, input, output),
    }
}

fn load_config(path: Option<&PathBuf>, zoneinfo: Option<&PathBuf>) -> Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => BridgeConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BridgeConfig::default(),
    };

    if let Some(dir) = zoneinfo {
        if !dir.is_dir() {
            bail!("zoneinfo directory not found: {}", dir.display());
        }
        config.capabilities = config.capabilities.zoneinfo(dir);
    }

    Ok(config)
}

fn cmd_exports(config: BridgeConfig, module: PathBuf) -> Result<()> {
    let runtime = EngineRuntime::new(config)?;
    let module = runtime
        .load_module(&module)
        .with_context(|| format!("Failed to load {}", module.display()))?;

    let mut names: Vec<&str> = module.exports().collect();
    names.sort_unstable();

    println!("=== {} ({} function exports) ===", module.name(), names.len());
    for name in names {
        println!("  {}", name);
    }

    Ok(())
}

fn cmd_check(config: BridgeConfig, module: PathBuf, json: bool) -> Result<()> {
    let prefix = config.export_prefix.clone();
    let runtime = EngineRuntime::new(config)?;
    let mut guest = runtime
        .open(&module)
        .with_context(|| format!("Failed to instantiate {}", module.display()))?;

    let problems = guest.verify_exports();
    let served = Method::ALL.len() - problems.len();

    if json {
        let report = serde_json::json!({
            "module": guest.name(),
            "prefix": prefix,
            "methods": Method::ALL.len(),
            "served": served,
            "problems": problems
                .iter()
                .map(|(method, err)| serde_json::json!({
                    "method": method.name(),
                    "error": err.to_string(),
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("=== Bridge Check: {} ===", guest.name());
        println!();
        println!("  Export prefix:     {}", prefix);
        println!("  Memory:            {} bytes", guest.memory_size());
        println!("  Methods served:    {}/{}", served, Method::ALL.len());
        if !problems.is_empty() {
            println!();
            println!("Problems:");
            for (method, err) in &problems {
                println!("  {:<36} {}", method.name(), err);
            }
        }
    }

    if !problems.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_call(
    config: BridgeConfig,
    module: PathBuf,
    method: String,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let method: Method = method.parse()?;
    if method.kind() != CallKind::Payload {
        bail!("{} is a {} method; only payload methods can be called here", method, method.kind());
    }

    let request = match &input {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    let runtime = EngineRuntime::new(config)?;
    let mut guest = runtime
        .open(&module)
        .with_context(|| format!("Failed to instantiate {}", module.display()))?;

    let start = Instant::now();
    let response = match guest.call(method, &request) {
        Ok(response) => response,
        Err(BridgeError::Engine(err)) => {
            eprintln!("Engine error {}: {}", err.code, err.message);
            std::process::exit(2);
        }
        Err(e) => return Err(e).with_context(|| format!("{} failed", method)),
    };
    info!(
        %method,
        request_len = request.len(),
        response_len = response.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "call complete"
    );

    match &output {
        Some(path) => std::fs::write(path, &response)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&response)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
