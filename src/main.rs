use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use segread::driver::build_segments;
use segread::formats::{open_reader, InputFormat};
use segread::{MismatchPolicy, ReaderConfig, RecordReader, Schema, SchemaRef};

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum Format {
    /// Delimited text with a header row (csv, tsv)
    Csv,
    /// Newline-delimited JSON objects
    Jsonl,
    /// Parquet file
    Parquet,
}

impl From<Format> for InputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => InputFormat::Delimited,
            Format::Jsonl => InputFormat::JsonLines,
            Format::Parquet => InputFormat::Parquet,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMismatchPolicy {
    /// Stop at the first record that does not match the schema
    Abort,
    /// Drop non-matching records and keep going
    Skip,
}

impl From<CliMismatchPolicy> for MismatchPolicy {
    fn from(policy: CliMismatchPolicy) -> Self {
        match policy {
            CliMismatchPolicy::Abort => MismatchPolicy::Abort,
            CliMismatchPolicy::Skip => MismatchPolicy::Skip,
        }
    }
}

/// Read record files and build dictionary-encoded segments from them
#[derive(Parser, Debug)]
#[command(name = "segread", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a segment from each input and report column cardinalities
    Scan(ScanArgs),

    /// Print the schema of a self-describing input
    Schema(SchemaArgs),
}

#[derive(Parser, Debug)]
struct ScanArgs {
    /// Input file(s); several inputs are built in parallel
    #[arg(required = true, num_args = 1..)]
    input: Vec<PathBuf>,

    /// Schema file (JSON); required for csv and jsonl input
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Reader configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input format (inferred from the file extension if not specified)
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// What to do with records that do not match the schema; overrides the config file
    #[arg(long, value_enum)]
    on_mismatch: Option<CliMismatchPolicy>,
}

#[derive(Parser, Debug)]
struct SchemaArgs {
    /// Input file
    input: PathBuf,

    /// Input format (inferred from the file extension if not specified)
    #[arg(short, long, value_enum)]
    format: Option<Format>,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scan(args) => run_scan(args),
        Commands::Schema(args) => run_schema(args),
    }
}

fn resolve_format(path: &Path, format: Option<Format>) -> Result<InputFormat, String> {
    format
        .map(InputFormat::from)
        .or_else(|| InputFormat::from_path(path))
        .ok_or_else(|| {
            format!(
                "cannot infer input format from '{}', use --format",
                path.display()
            )
        })
}

fn run_scan(args: ScanArgs) -> ExitCode {
    let mut config = match &args.config {
        Some(path) => match ReaderConfig::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ReaderConfig::default(),
    };
    if let Some(policy) = args.on_mismatch {
        config.on_mismatch = policy.into();
    }

    let schema: Option<SchemaRef> = match &args.schema {
        Some(path) => match Schema::from_path(path) {
            Ok(schema) => Some(Arc::new(schema)),
            Err(e) => {
                eprintln!("Error: cannot load schema '{}': {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let mut readers: Vec<Box<dyn RecordReader + Send>> = Vec::with_capacity(args.input.len());
    for path in &args.input {
        let opened = resolve_format(path, args.format).and_then(|format| {
            open_reader(format, path, schema.clone(), &config).map_err(|e| e.to_string())
        });
        match opened {
            Ok(reader) => readers.push(reader),
            Err(e) => {
                eprintln!("Error: {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }

    let mut failed = false;
    for (path, result) in args.input.iter().zip(build_segments(readers)) {
        match result {
            Ok(segment) => {
                println!(
                    "{}: {} rows, {} skipped",
                    path.display(),
                    segment.num_rows,
                    segment.skipped
                );
                for (field, dictionary) in segment.schema.fields().iter().zip(&segment.dictionaries) {
                    println!("  {}: {} ({} distinct)", field.name, field, dictionary.len());
                }
            }
            Err(e) => {
                eprintln!("Error: {}: {e}", path.display());
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_schema(args: SchemaArgs) -> ExitCode {
    let format = match resolve_format(&args.input, args.format) {
        Ok(format) => format,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if !format.is_self_describing() {
        eprintln!(
            "Error: {} input has no embedded schema",
            format.name()
        );
        return ExitCode::FAILURE;
    }

    let result = open_reader(format, &args.input, None, &ReaderConfig::default()).and_then(
        |mut reader| {
            reader.init()?;
            let schema = reader.schema();
            reader.close()?;
            schema
        },
    );

    match result {
        Ok(schema) => {
            for field in schema.fields() {
                println!("{}: {}", field.name, field);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}: {e}", args.input.display());
            ExitCode::FAILURE
        }
    }
}
