//! picman - inspect tiled buffers and composite pixels from the command line

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "picman")]
#[command(author, version, about = "Tiled buffer and compositing toolkit")]
#[command(long_about = "
Inspection and demo tool for picman's tiled buffers, format registry and
layer modes.

Examples:
  picman formats                              # List pixel formats
  picman tiles --width 1000 --height 700      # Walk a buffer tile by tile
  picman tiles -W 300 -H 300 --format 'Y u16' --tile-size 128
  picman composite --mode multiply --opacity 0.5 \\
      --src 1,0,0,1 --dst 0.5,0.5,1,1
  picman -v --config picman.yaml tiles -W 4096 -H 4096
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Worker threads for blending (0 = from configuration)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered pixel formats
    #[command(visible_alias = "f")]
    Formats(FormatsArgs),

    /// Walk a buffer tile by tile and report cache statistics
    #[command(visible_alias = "t")]
    Tiles(TilesArgs),

    /// Composite two solid buffers with a layer mode
    #[command(visible_alias = "comp")]
    Composite(CompositeArgs),
}

#[derive(Args)]
struct FormatsArgs {
    /// Show per-component formats
    #[arg(short, long)]
    components: bool,
}

#[derive(Args)]
struct TilesArgs {
    /// Buffer width
    #[arg(short = 'W', long)]
    width: u32,

    /// Buffer height
    #[arg(short = 'H', long)]
    height: u32,

    /// Pixel format name
    #[arg(short, long, default_value = "R'G'B'A u8")]
    format: String,

    /// Tile edge length (default from configuration)
    #[arg(short, long)]
    tile_size: Option<u32>,

    /// Fill the buffer with this RGBA color while walking
    #[arg(long)]
    fill: Option<String>,
}

#[derive(Args)]
struct CompositeArgs {
    /// Layer mode name
    #[arg(short, long, default_value = "normal")]
    mode: String,

    /// Opacity in [0, 1]
    #[arg(short, long, default_value = "1.0")]
    opacity: f32,

    /// Source color R,G,B,A
    #[arg(long)]
    src: String,

    /// Destination color R,G,B,A
    #[arg(long)]
    dst: String,

    /// Edge length of both buffers
    #[arg(short, long, default_value = "128")]
    size: u32,

    /// Pixel format of both buffers
    #[arg(short, long, default_value = "R'G'B'A u8")]
    format: String,
}

fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    let ctx = commands::load_context(cli.config.as_deref(), cli.threads)?;

    match cli.command {
        Commands::Formats(args) => commands::formats::run(args, &ctx, cli.verbose),
        Commands::Tiles(args) => commands::tiles::run(args, &ctx, cli.verbose),
        Commands::Composite(args) => commands::composite::run(args, &ctx, cli.verbose),
    }
}
