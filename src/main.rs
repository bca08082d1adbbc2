use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use taxi_ingest::runner::{
    DEFAULT_CHUNK_SIZE, DEFAULT_URL_PREFIX, FetchOutcome, Format, IngestArgs, TaxiType,
    default_table_name, run_ingest, trip_data_url,
};

#[derive(Parser, Clone)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Load a CSV file (e.g. the taxi zone lookup) into a table
    Csv {
        /// Target table name
        #[arg(long)]
        table: String,

        /// URL (or local path) of the CSV file
        #[arg(long)]
        url: String,

        #[command(flatten)]
        connection: ConnectionOpts,

        #[command(flatten)]
        load: LoadOpts,
    },
    /// Load one month of taxi trip data in parquet format
    Parquet {
        /// Taxi dataset to load
        #[arg(long, value_parser = TaxiType::parse, default_value = "yellow")]
        taxi_type: TaxiType,

        /// Year of the trip data
        #[arg(long)]
        year: u16,

        /// Month of the trip data (1-12)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=12))]
        month: u8,

        /// Base URL the monthly files are published under
        #[arg(long, default_value = DEFAULT_URL_PREFIX)]
        url_prefix: String,

        /// Target table name (default: <taxi-type>_taxi_trips)
        #[arg(long)]
        table: Option<String>,

        /// Full URL (or local path) of the file, overriding the constructed one
        #[arg(long)]
        url: Option<String>,

        #[command(flatten)]
        connection: ConnectionOpts,

        #[command(flatten)]
        load: LoadOpts,
    },
}

#[derive(Clone, ClapArgs)]
struct ConnectionOpts {
    /// PostgreSQL user
    #[arg(long, default_value = "root")]
    user: String,

    /// PostgreSQL password
    #[arg(long, default_value = "root")]
    password: String,

    /// PostgreSQL host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// PostgreSQL port
    #[arg(long, default_value_t = 5432)]
    port: u16,

    /// PostgreSQL database name
    #[arg(long, default_value = "ny_taxi")]
    db: String,
}

#[derive(Clone, ClapArgs)]
struct LoadOpts {
    /// Rows per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunksize: usize,

    /// Directory downloaded files are cached in
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Quiet mode - minimal output, only show summary
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (source_uri, table, format, connection, load) = match args.command {
        Command::Csv {
            table,
            url,
            connection,
            load,
        } => (url, table, Format::Csv, connection, load),
        Command::Parquet {
            taxi_type,
            year,
            month,
            url_prefix,
            table,
            url,
            connection,
            load,
        } => {
            let url = match url {
                Some(url) => url,
                None => trip_data_url(&url_prefix, taxi_type, year, month)?,
            };
            let table = table.unwrap_or_else(|| default_table_name(taxi_type));
            (url, table, Format::Parquet, connection, load)
        }
    };

    init_tracing(load.quiet);

    let ingest_args = IngestArgs {
        user: connection.user,
        password: connection.password,
        host: connection.host,
        port: connection.port,
        database: connection.db,
        source_uri,
        target_table: table,
        format: Some(format),
        chunk_size: load.chunksize,
        data_dir: load.data_dir,
        quiet: load.quiet,
    };

    let result = run_ingest(ingest_args).await?;

    let source = match &result.download {
        FetchOutcome::Local(path) => format!("{} (local)", path.display()),
        FetchOutcome::AlreadyPresent(path) => format!("{} (cached)", path.display()),
        FetchOutcome::Downloaded { path, bytes } => {
            format!("{} (downloaded {} bytes)", path.display(), bytes)
        }
    };

    println!();
    println!("Load Summary");
    println!("============");
    println!("Table: {}", result.table);
    println!("File: {}", source);
    println!("Chunks: {}", result.chunks);
    println!("Rows loaded: {}", result.rows_loaded);
    println!("Duration: {:.2}s", result.duration.as_secs_f64());
    println!(
        "Throughput: {:.2} rows/sec",
        result.rows_loaded as f64 / result.duration.as_secs_f64().max(f64::EPSILON)
    );
    if let Some(slowest) = result.chunk_timings.iter().max_by_key(|t| t.duration) {
        println!(
            "Slowest chunk: #{} ({} rows in {:.2}s)",
            slowest.chunk,
            slowest.rows,
            slowest.duration.as_secs_f64()
        );
    }

    Ok(())
}

/// Initialize tracing; `RUST_LOG` takes precedence over the quiet-mode default
fn init_tracing(quiet: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let default_filter = if quiet {
        "warn"
    } else {
        "taxi_ingest=info,sqlx=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
