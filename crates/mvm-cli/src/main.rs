//! Analog MVM CLI
//!
//! Drives the quantization bridge and tile runtime against the simulated
//! accelerator: single-tile and chained products, configuration, and
//! system information.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use console::style;
use mvm_common::AcceleratorConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

mod commands;
mod output;

use commands::config::resolve_config_path;
use commands::{ChainCommand, ConfigAction, DemoCommand};
use output::{OutputConfig, OutputFormat};

const EXIT_FAILURE: i32 = 1;

/// Analog MVM - quantized matrix-vector products on accelerator tiles
#[derive(Parser)]
#[command(name = "mvm")]
#[command(about = "Quantize host tensors and run matrix-vector products on analog MVM tiles")]
#[command(long_about = r#"
Quantizes host matrices and vectors into the accelerator's element type,
programs them into tiles, runs the matrix-vector product, and dequantizes
the result with the composed scale.

Examples:
  # 3x4 matrix of 3.0 times a vector of 2.0 on tile 0
  mvm demo

  # Route tile 0's output into tile 1 and store from the end of the chain
  mvm chain --stages 2

  # Machine-readable output
  mvm --format json demo --matrix-value 1.5

  # Effective configuration (file, then MVM_* overrides, then flags)
  mvm --config mvm.toml config show
"#)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log format
    #[arg(
        long,
        value_enum,
        value_name = "FORMAT",
        global = true,
        default_value_t = LogFormat::Compact
    )]
    log_format: LogFormat,

    /// Number of tiles (overrides the configuration)
    #[arg(long, value_name = "N", global = true)]
    tiles: Option<u32>,

    /// Output format
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one matrix-vector product on a tile
    Demo(DemoCommand),

    /// Chain products across tiles with move_vector
    Chain(ChainCommand),

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show system and accelerator information
    Info,
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref(), cli.log_format);

    if let Err(e) = run(cli) {
        error!("command failed: {e}");
        for cause in e.chain().skip(1) {
            error!("  caused by: {cause}");
        }
        eprintln!("{} {e:#}", style("error:").red().bold());
        std::process::exit(EXIT_FAILURE);
    }
}

fn run(cli: Cli) -> Result<()> {
    let output = OutputConfig::new(cli.format);
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = load_configuration(&config_path, cli.config.is_some(), cli.tiles)?;

    match cli.command {
        Some(Commands::Demo(cmd)) => cmd.execute(&config, &output),
        Some(Commands::Chain(cmd)) => cmd.execute(&config, &output),
        Some(Commands::Config { action }) => action.execute(&config, &config_path, &output),
        Some(Commands::Info) => commands::info::execute(&config, &output),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

/// Load the configuration file (required when named explicitly), apply
/// `MVM_*` overrides, then the `--tiles` flag.
fn load_configuration(
    path: &Path,
    explicit: bool,
    tiles: Option<u32>,
) -> Result<AcceleratorConfig> {
    let mut config = if explicit || path.is_file() {
        AcceleratorConfig::load(path).with_context(|| {
            format!("failed to load configuration from {}", path.display())
        })?
    } else {
        debug!("no configuration file, using defaults");
        AcceleratorConfig::from_env().context("invalid MVM_* environment override")?
    };
    if let Some(n) = tiles {
        config.num_tiles = n;
        config.validate().context("invalid --tiles")?;
    }
    Ok(config)
}

fn setup_logging(level_override: Option<&str>, format: LogFormat) {
    let filter = match level_override {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => {
            subscriber.json().with_timer(tracing_subscriber::fmt::time::uptime()).init()
        }
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }
}
