use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use polyload::ddl;
use polyload::export::export_datasource;
use polyload::loader::fetch_and_load;
use polyload::progress::{Phase, Progress, ProgressObserver};
use polyload::schema::DatasourceSchema;
use polyload::stats::LoadSummary;
use std::path::Path;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "polyload")]
#[command(about = "Load a multi-format dataset into relational, document and graph views")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, parse, filter and convert a dataset
    Load(LoadArgs),
    /// Print the SQL schema of the relational view
    Ddl(SchemaArgs),
    /// Check a dataset schema without reading any data
    Validate(SchemaArgs),
}

#[derive(Args)]
struct LoadArgs {
    /// Path to the dataset schema (JSON)
    #[arg(short, long)]
    schema: String,

    /// Local path or URL overriding the schema's file path
    #[arg(short, long)]
    input: Option<String>,

    /// Write the converted views as CSV/JSON files into this directory
    #[arg(long)]
    dump: Option<String>,
}

#[derive(Args)]
struct SchemaArgs {
    /// Path to the dataset schema (JSON)
    #[arg(short, long)]
    schema: String,
}

/// Renders load progress on one terminal line.
struct BarObserver {
    bar: ProgressBar,
}

impl BarObserver {
    const SCALE: u64 = 1000;

    fn new() -> Self {
        let bar = ProgressBar::new(Self::SCALE);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} {msg:<12} [{bar:30.cyan/blue}] {percent:>3}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl ProgressObserver for BarObserver {
    fn on_progress(&mut self, progress: Progress) {
        self.bar.set_message(progress.phase.to_string());
        match progress.fraction {
            Some(fraction) => self.bar.set_position((fraction * Self::SCALE as f64) as u64),
            None if progress.phase != Phase::Download => self.bar.set_position(0),
            None => {}
        }
    }
}

fn load_schema(path: &str) -> Result<DatasourceSchema> {
    DatasourceSchema::from_path(path).with_context(|| format!("Failed to read schema: {}", path))
}

fn run_load(args: LoadArgs) -> Result<()> {
    let schema = load_schema(&args.schema)?;
    let location = args.input.as_deref().unwrap_or_else(|| schema.source_path());
    info!(label = %schema.label, source = location, "Loading dataset");

    let start = Instant::now();
    let mut observer = BarObserver::new();
    let result = fetch_and_load(&schema, Some(location), &mut observer);
    observer.bar.finish_and_clear();
    let data = result.with_context(|| format!("Failed to load dataset from {}", location))?;
    let load_duration = start.elapsed();

    if let Some(dir) = &args.dump {
        let written = export_datasource(&data, &schema, Path::new(dir))
            .with_context(|| format!("Failed to export dataset to {}", dir))?;
        info!(dir = %dir, files = written.len(), "Dump complete");
    }

    let summary = LoadSummary::from_data(&data);

    println!();
    println!("=== Summary ===");
    println!("Dataset:            {}", schema.label);
    println!("Load time:          {:.2}s", load_duration.as_secs_f64());
    println!("Files parsed:       {}", summary.files);
    println!();
    println!("Relational tables:  {}", summary.relational.len());
    for table in &summary.relational {
        println!("  {:<24} {:>10} rows", table.name, table.rows);
    }
    println!("Multimodel tables:  {}", summary.multimodel_tables.len());
    for table in &summary.multimodel_tables {
        println!("  {:<24} {:>10} rows", table.name, table.rows);
    }
    println!("Graphs:             {}", summary.graphs.len());
    for graph in &summary.graphs {
        println!(
            "  {:<24} {:>10} nodes {:>10} edges",
            graph.name, graph.nodes, graph.edges
        );
    }
    println!("Documents:          {}", summary.documents.len());
    for document in &summary.documents {
        println!("  {:<24} {:>10} records", document.name, document.records);
    }

    Ok(())
}

fn run_ddl(args: SchemaArgs) -> Result<()> {
    let schema = load_schema(&args.schema)?;
    schema.validate().context("Schema is invalid")?;

    let script = ddl::create_schema(&schema);
    for statement in &script.statements {
        println!("{}", statement);
        println!();
    }
    for table in &script.tables {
        println!("-- {}", ddl::insert_statement(table));
    }
    Ok(())
}

fn run_validate(args: SchemaArgs) -> Result<()> {
    let schema = load_schema(&args.schema)?;
    schema.validate().context("Schema is invalid")?;
    println!(
        "Schema \"{}\" is valid: {} files, {} relational and {} multimodel kinds",
        schema.label,
        schema.files().len(),
        schema.relational_kinds().count(),
        schema.multimodel_kinds().count()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Load(args) => run_load(args),
        Commands::Ddl(args) => run_ddl(args),
        Commands::Validate(args) => run_validate(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
