//! memdump CLI
//!
//! Command-line tools for capture dump files.
//!
//! # Commands
//!
//! - `inspect` - Display a dump file's header and record counts
//! - `verify` - Check every record checksum in a dump file
//! - `simulate` - Drive a dumper with synthetic events and extract a window

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Capture ring-buffer and dump file tools.
#[derive(Parser)]
#[command(name = "memdump")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display a dump file's header and record counts
    Inspect {
        /// Dump file
        file: PathBuf,

        /// Print records, up to this many
        #[arg(short, long)]
        records: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check every record checksum in a dump file
    Verify {
        /// Dump file
        file: PathBuf,
    },

    /// Drive a dumper with synthetic events and extract a window
    Simulate {
        /// Directory for dump files
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Total ring buffer size in bytes
        #[arg(long, default_value = "196608")]
        buffer_size: u64,

        /// Events to ingest
        #[arg(short, long, default_value = "10000")]
        events: u64,

        /// Rotate after this many events
        #[arg(long, default_value = "1000")]
        rotate_every: u64,

        /// Look-back span of the extraction job, in events
        #[arg(long, default_value = "500")]
        look_back: u64,

        /// Also run a continuous dump session with this name
        #[arg(long)]
        continuous: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect {
            file,
            records,
            format,
        } => {
            commands::inspect::run(&file, records, &format)?;
        }
        Commands::Verify { file } => {
            commands::verify::run(&file)?;
        }
        Commands::Simulate {
            out_dir,
            buffer_size,
            events,
            rotate_every,
            look_back,
            continuous,
            format,
        } => {
            let options = commands::simulate::SimulateOptions {
                out_dir,
                buffer_size,
                events,
                rotate_every,
                look_back,
                continuous,
            };
            commands::simulate::run(&options, &format)?;
        }
        Commands::Version => {
            println!("memdump CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("memdump core v{}", memdump_core::VERSION);
        }
    }

    Ok(())
}
