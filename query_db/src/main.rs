use run_log::store::{QueryResult, ResultStore};
use run_log::{Error, Result};

use clap::Parser;
use glob::glob;
use log::{info, warn};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// Run a read-only query against one or more experiment databases.
///
/// Databases matching the pattern are visited in sorted path order and their results are
/// concatenated under a single header.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Database glob pattern to use, e.g. "dim*.db".
    #[arg(short, long)]
    database_pattern: String,

    /// Read-only SQL query to run against each database.
    #[arg(short, long)]
    filter: String,

    /// Print one JSON object per row instead of CSV.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let stdout = io::stdout();
    match run(&args, stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn database_paths(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for entry in glob(pattern)? {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => warn!("skipping unreadable path {}", e.path().display()),
        }
    }

    paths.sort();

    Ok(paths)
}

fn run<W: Write>(args: &Args, mut out: W) -> Result<()> {
    let paths = database_paths(&args.database_pattern)?;

    if paths.is_empty() {
        return Err(Error::io(
            format!("no database matches {}", args.database_pattern),
            io::Error::from(io::ErrorKind::NotFound),
        ));
    }

    let mut header_written = false;

    for path in paths.iter() {
        let store = ResultStore::open(path)?;
        let result: QueryResult = store.query(&args.filter)?;
        store.close()?;

        info!("{}: {} rows", path.display(), result.len());

        match args.json {
            true => result.write_json_lines(&mut out)?,
            false => {
                result.write_csv(&mut out, !header_written)?;
                header_written = true;
            }
        }
    }

    Ok(())
}
