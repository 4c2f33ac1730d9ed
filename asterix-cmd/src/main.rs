mod convert;
mod info;

use std::io::stderr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use asterix::{get_or_create_context, FormatDescriptor, FormatId};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Category definitions list (asterix.ini).
    ///
    /// Defaults to the path in ASTERIX_DEFINITIONS. Definition files are resolved
    /// relative to the directory of the list.
    #[arg(short, long, global = true, value_name = "path")]
    definitions: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the supported formats.
    Formats,
    /// Convert ASTERIX data from one format to another.
    ///
    /// Without an output format the input is only framed and decoded, which is useful
    /// for validating a recording.
    Convert {
        /// Input format, e.g., ASTERIX_PCAP.
        #[arg(short = 'f', long, value_name = "format")]
        input_format: FormatId,

        /// Output format, e.g., ASTERIX_TXT.
        #[arg(short = 'F', long, value_name = "format")]
        output_format: Option<FormatId>,

        /// Output file path. Defaults to stdout.
        #[arg(short, long, value_name = "path")]
        output: Option<PathBuf>,

        /// Delete output file if it already exists
        #[arg(long, action)]
        clobber: bool,

        /// Input file, or - for stdin.
        input: PathBuf,
    },
    /// Show a summary of the blocks and records in a file.
    Info {
        /// Input format, e.g., ASTERIX_RAW.
        #[arg(short = 'f', long, value_name = "format")]
        input_format: FormatId,

        /// Output format
        #[arg(long, default_value = "text")]
        format: info::Format,

        /// Input file, or - for stdin.
        input: PathBuf,
    },
}

fn load_context(definitions: Option<&PathBuf>) -> Result<Arc<FormatDescriptor>> {
    match definitions {
        Some(path) => {
            let ctx = FormatDescriptor::load(path)
                .with_context(|| format!("loading definitions from {path:?}"))?;
            Ok(Arc::new(ctx))
        }
        None => get_or_create_context().ok_or_else(|| {
            anyhow!(
                "no definitions; use --definitions or set {}",
                asterix::descriptor::DEFINITIONS_ENV
            )
        }),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("ASTERIX_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Formats => {
            for format in FormatId::ALL {
                let role = if format.is_output_only() {
                    "output"
                } else {
                    "input/output"
                };
                println!("{:>2}  {:<24} {role}", format.index(), format.name());
            }
            Ok(())
        }
        Commands::Convert {
            input_format,
            output_format,
            output,
            clobber,
            input,
        } => {
            let ctx = load_context(cli.definitions.as_ref())?;
            convert::convert(
                ctx,
                input,
                *input_format,
                output.as_deref(),
                *output_format,
                *clobber,
            )
        }
        Commands::Info {
            input_format,
            format,
            input,
        } => {
            let ctx = load_context(cli.definitions.as_ref())?;
            info::info(ctx, input, *input_format, format)
        }
    }
}
