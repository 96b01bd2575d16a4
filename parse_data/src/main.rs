use run_log::config::ParseConfig;
use run_log::delimited;
use run_log::parser;
use run_log::store::ResultStore;
use run_log::table::Variant;
use run_log::{Error, Result};

use clap::Parser;
use log::info;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Parse experiment data.
///
/// Without --database or --filter the rows are written to <FILE>.csv. Otherwise they are loaded
/// into the `data` table of the given database (in memory when no database is given) and the
/// filter query, if any, is printed to standard output as CSV.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log file to parse.
    file: PathBuf,

    /// Database file to load the rows into.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Read-only SQL query to run after loading, printed as CSV.
    #[arg(long)]
    filter: Option<String>,

    /// Parse the build diagnostic counters (total, terminal, build nn queries) as well.
    #[arg(long)]
    extended: bool,

    /// CSV output path instead of <FILE>.csv.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML file with parser settings; flags override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep log order in the CSV output instead of sorting rows.
    #[arg(long)]
    no_sort: bool,
}

/// How a failed run is shown to the user.
#[derive(Debug, PartialEq, Eq)]
struct Report {
    to_stdout: bool,
    message: String,
    status: u8,
}

/// Problems with the log itself go to stdout, as the batch scripts driving this tool expect;
/// everything else goes to stderr.
fn report(err: &Error) -> Report {
    match err.is_input_error() {
        true => Report {
            to_stdout: true,
            message: format!("error: {err}"),
            status: 1,
        },
        false => Report {
            to_stdout: false,
            message: format!("Error: {err}"),
            status: 1,
        },
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let report = report(&e);
            match report.to_stdout {
                true => println!("{}", report.message),
                false => eprintln!("{}", report.message),
            }
            ExitCode::from(report.status)
        }
    }
}

fn resolve_config(args: &Args) -> Result<ParseConfig> {
    let mut config = match &args.config {
        Some(filename) => ParseConfig::from_file(filename)?,
        None => ParseConfig::default(),
    };

    if args.extended {
        config.variant = Variant::Extended;
    }

    if args.no_sort {
        config.sort_csv = false;
    }

    config.validate()?;

    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = resolve_config(args)?;

    let table = parser::parse_file(&args.file, config.variant)?;

    if args.database.is_none() && args.filter.is_none() {
        let csv_path = match &args.output {
            Some(path) => path.clone(),
            None => config.csv_path_for(&args.file),
        };

        return delimited::write_csv_file(&table, csv_path, config.sort_csv);
    }

    let mut store = match &args.database {
        Some(path) => ResultStore::open(path)?,
        None => ResultStore::open_in_memory()?,
    };

    store.load(&table, &config.table_name)?;

    if let Some(filter) = &args.filter {
        let result = store.query(filter)?;
        info!("{} rows matched in {}", result.len(), store.path());

        result.write_csv(io::stdout().lock(), true)?;
    }

    store.close()
}
