use clap::{Parser, Subcommand, ValueEnum};
use onecd::catalog::{Catalog, ReaderOptions};
use onecd::export::{describe_fields, describe_table, export_table, CsvWriter, JsonLinesWriter, RowWriter, TableWriter};
use onecd::BlobRef;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "1cd", about = "Read-only inspector for 1CD database files")]
struct Cli {
    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// JSON file with reader options
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print GUID fields as raw hex
    #[arg(long, global = true)]
    raw_guids: bool,
    /// Fail on truncated objects instead of stopping quietly
    #[arg(long, global = true)]
    strict: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show database header metadata
    Info {
        input: PathBuf,
    },
    /// List tables with their row counts
    Tables {
        input: PathBuf,
    },
    /// Describe one table and its field layout
    Schema {
        input: PathBuf,
        table: String,
    },
    /// Export the rows of a table
    Dump {
        input: PathBuf,
        table: String,
        #[arg(short, long, value_enum, default_value = "table")]
        format: Format,
        /// Resolve NT/I fields from the BLOB heap
        #[arg(short, long)]
        blobs: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract one BLOB value by reference
    Blob {
        input: PathBuf,
        table: String,
        start: u32,
        length: u32,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Table,
    Csv,
    Jsonl,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let options = load_options(&cli)?;

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let db = Catalog::open_with(&input, options)?;
            println!("── 1CD Database ─────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Version        {}", db.version().map(|v| v.to_string()).unwrap_or_else(|| "—".into()));
            println!("  Base length    {}", db.base_length());
            println!("  Language       {}", db.language());
            println!("  Tables         {}", db.tables().len());
        }

        // ── Tables ───────────────────────────────────────────────────────────
        Commands::Tables { input } => {
            let mut db = Catalog::open_with(&input, options)?;
            let names: Vec<String> = db.tables().iter().map(|t| t.name.clone()).collect();
            println!("{:<32} {:>8} {:>12} {:>10}  Blob", "Table", "Row size", "Bytes", "Rows");
            for name in names {
                let size = db.table_size(&name)?;
                let schema = db.table(&name)?;
                println!("{:<32} {:>8} {:>12} {:>10}  {}",
                    schema.name, schema.row_size, size.total_bytes, size.row_count,
                    if schema.blob_addr.is_some() { "yes" } else { "—" });
            }
        }

        // ── Schema ───────────────────────────────────────────────────────────
        Commands::Schema { input, table } => {
            let mut db = Catalog::open_with(&input, options)?;
            let size = db.table_size(&table)?;
            let schema = db.table(&table)?;
            let mut out = io::stdout().lock();
            describe_table(&mut out, schema, size)?;
            writeln!(out)?;
            describe_fields(&mut out, schema)?;
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, table, format, blobs, output } => {
            let mut db = Catalog::open_with(&input, options)?;
            let sink = open_output(output.as_deref())?;
            let mut writer: Box<dyn RowWriter> = match format {
                Format::Table => Box::new(TableWriter::new(sink)),
                Format::Csv   => Box::new(CsvWriter::new(sink)),
                Format::Jsonl => Box::new(JsonLinesWriter::new(sink)),
            };
            let rows = export_table(&mut db, &table, blobs, writer.as_mut())?;
            if let Some(path) = output {
                eprintln!("Wrote {} row(s) to {}", rows, path.display());
            }
        }

        // ── Blob ─────────────────────────────────────────────────────────────
        Commands::Blob { input, table, start, length, output } => {
            let mut db = Catalog::open_with(&input, options)?;
            match db.resolve_blob(&table, BlobRef::new(start, length))? {
                Some(bytes) => {
                    let mut sink = open_output(output.as_deref())?;
                    sink.write_all(&bytes)?;
                    sink.flush()?;
                }
                None => eprintln!("Empty BLOB reference"),
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("onecd=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("onecd=warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// Options from `--config`, then command-line flags on top.
fn load_options(cli: &Cli) -> Result<ReaderOptions, Box<dyn std::error::Error>> {
    let mut options = match &cli.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None       => ReaderOptions::default(),
    };
    if cli.raw_guids {
        options = options.raw_guids(true);
    }
    if cli.strict {
        options = options.strict(true);
    }
    Ok(options)
}

fn open_output(path: Option<&Path>) -> io::Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) => Box::new(BufWriter::new(File::create(p)?)),
        None    => Box::new(BufWriter::new(io::stdout().lock())),
    })
}
