use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use curio_storage::{DuplicatePolicy, ImportOptions, Importer, Store, TracingSink};
use tokio_util::sync::CancellationToken;

/// A schema-driven, file-backed object store
#[derive(Parser, Debug)]
#[command(name = "curio")]
#[command(about = "A schema-driven, file-backed object store", long_about = None)]
struct Args {
    /// Path to the store root
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild every derived index from the document set
    RebuildIndexes,
    /// Bulk-load a delimited file into things of one schema
    Import {
        /// File to import
        file: PathBuf,

        /// Target schema name
        #[arg(short, long)]
        schema: String,

        /// Import map to use (defaults to the schema's only map)
        #[arg(short, long)]
        map: Option<String>,

        /// Column delimiter
        #[arg(long, default_value_t = ',')]
        delimiter: char,

        /// What to do when a row's name collides
        #[arg(long, value_enum, default_value_t = PolicyArg::Abort)]
        on_duplicate: PolicyArg,

        /// Perform every step except the writes
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    Abort,
    Skip,
    Merge,
    Overwrite,
}

impl From<PolicyArg> for DuplicatePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Abort => DuplicatePolicy::Abort,
            PolicyArg::Skip => DuplicatePolicy::Skip,
            PolicyArg::Merge => DuplicatePolicy::Merge,
            PolicyArg::Overwrite => DuplicatePolicy::Overwrite,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting curio v{}", env!("CARGO_PKG_VERSION"));
    info!("Store root: {:?}", args.data_dir);

    let store = Store::open(&args.data_dir);
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received; finishing the current step");
            on_ctrl_c.cancel();
        }
    });
    let sink = TracingSink;

    match args.command {
        Command::RebuildIndexes => {
            store.rebuild_indexes(&sink, &cancel).await?;
            info!("Indexes rebuilt");
        }
        Command::Import {
            file,
            schema,
            map,
            delimiter,
            on_duplicate,
            dry_run,
        } => {
            let reference = store
                .schemas()
                .find_by_name(&schema, &cancel)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no schema named {schema:?}"))?;
            let mut options = ImportOptions::new(reference.id);
            options.map_name = map;
            options.delimiter = delimiter;
            options.policy = on_duplicate.into();
            options.dry_run = dry_run;

            let report = Importer::new(&store, &sink)
                .import_file(&file, &options, &cancel)
                .await?;
            info!(
                "Import {}: {} created, {} merged, {} overwritten, {} skipped{}",
                report.job_id,
                report.created,
                report.merged,
                report.overwritten,
                report.skipped,
                if report.dry_run { " (dry run)" } else { "" },
            );
        }
    }

    Ok(())
}
