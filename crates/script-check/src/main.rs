use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use script_check::config::{self, ConfigBuilder, OutputFormat};
use script_check::observability::init_basic_logging;
use script_check::{Command, read_script, run};

#[derive(Parser, Debug)]
#[command(name = "script-check")]
#[command(about = "Split, classify and validate SQL scripts", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Objects that may not be dropped (comma-separated)
    #[arg(long, value_delimiter = ',')]
    protected: Vec<String>,

    /// Output format (text or json)
    #[arg(long)]
    format: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable JSON logging output
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Print each statement with its position
    Split {
        /// Script file, or `-` for stdin
        file: PathBuf,
    },
    /// Print the kind and category of each statement
    Classify {
        /// Script file, or `-` for stdin
        file: PathBuf,
    },
    /// Check the script; exits with status 1 when it is rejected
    Validate {
        /// Script file, or `-` for stdin
        file: PathBuf,
    },
}

impl CliCommand {
    fn into_parts(self) -> (Command, PathBuf) {
        match self {
            Self::Split { file } => (Command::Split, file),
            Self::Classify { file } => (Command::Classify, file),
            Self::Validate { file } => (Command::Validate, file),
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // CLI flags form the lowest layer; file and environment override them.
    let mut builder = ConfigBuilder::new()
        .protected_objects(args.protected)
        .json_logs(args.json_logs);
    if let Some(ref format) = args.format {
        builder = builder.format(format.parse::<OutputFormat>()?);
    }
    if args.verbose {
        builder = builder.log_level("debug".to_string());
    }

    let builder = if let Some(ref path) = args.config {
        config::load_config_from_path(path, builder)?
    } else {
        config::load_config(builder)?
    };
    let config = builder.build()?;

    init_basic_logging(&config.observability);

    let (command, file) = args.command.into_parts();
    tracing::debug!(?command, file = %file.display(), format = %config.format, "running");

    let script = read_script(&file)?;
    let output = run(command, &script, &config)?;
    print!("{}", output.rendered);

    Ok(if output.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
