//! Parsing of kd-tree vs odds-on tree experiment logs into relational rows.
//!
//! The experiment driver appends labelled lines (`dim: 2`, `running kdtree`, `info: hits: 95`,
//! `done: 0`, ...) to a log as it invokes the two tree binaries. This crate scans such a log
//! once, carrying the current run's parameters and measurements in a [`context::RunContext`],
//! and emits one [`context::ObservationRow`] per `done:` line. The resulting
//! [`table::ResultTable`] can be written as CSV or loaded into a SQLite table for querying.
//!
//! ```no_run
//! use run_log::{parser, store::ResultStore, table::Variant};
//!
//! let table = parser::parse_file("log.txt", Variant::Standard)?;
//! let mut store = ResultStore::open("dim2.db")?;
//! store.load(&table, "data")?;
//! let result = store.query("select kdtree, avg(qtime) from data group by kdtree")?;
//! # Ok::<(), run_log::error::Error>(())
//! ```
pub mod config;
pub mod context;
pub mod delimited;
pub mod error;
pub mod parser;
pub mod store;
pub mod table;

pub use error::{Error, Result};
