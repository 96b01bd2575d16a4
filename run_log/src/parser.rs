//! Line-oriented parser for experiment run logs
//!
//! A log is scanned once, front to back. Each line is classified against a fixed prefix table,
//! checked in the order below; the first match wins and anything unrecognized is skipped.
//!
//! ```text
//! dim: <int>                    pts: <int>            sigma: <float>
//! search size: <int>            sample size: <int>    run: <int>
//! k: <int>                      build depth: <int>
//! running kdtree                running odds-on tree
//! info: <label>: <number>       done: <int>
//! ```
//!
//! A `done:` line snapshots the current [`RunContext`] as one row. A run that never reaches its
//! `done:` line is dropped when input ends.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use log::{debug, info};
use regex::Regex;

use crate::context::{ObservationRow, RunContext};
use crate::error::{Error, Result};
use crate::table::{ResultTable, Variant};

/// A numeric field that a log line can set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Dim,
    Pts,
    Sigma,
    Search,
    Sample,
    Run,
    K,
    BuildDepth,
    ConstructionTime,
    QueryTime,
    Hits,
    Backup,
    TotalNodes,
    TerminalNodes,
    BuildNnQueries,
}

impl Field {
    pub fn label(&self) -> &'static str {
        match self {
            Field::Dim => "dim",
            Field::Pts => "pts",
            Field::Sigma => "sigma",
            Field::Search => "search size",
            Field::Sample => "sample size",
            Field::Run => "run",
            Field::K => "k",
            Field::BuildDepth => "build depth",
            Field::ConstructionTime => "tree construction took",
            Field::QueryTime => "running queries took",
            Field::Hits => "hits",
            Field::Backup => "backup nodes visited",
            Field::TotalNodes => "total nodes",
            Field::TerminalNodes => "terminal nodes",
            Field::BuildNnQueries => "build nn queries",
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(
            self,
            Field::Sigma | Field::ConstructionTime | Field::QueryTime
        )
    }

    /// Parses `text` as this field's type and stores it.
    pub fn assign(&self, ctx: &mut RunContext, text: &str, line: usize) -> Result<()> {
        let text = text.trim();

        let malformed = || Error::Parse {
            line,
            label: self.label(),
            value: text.to_string(),
        };

        match self.is_real() {
            true => {
                let value = text.parse::<f64>().map_err(|_| malformed())?;
                match self {
                    Field::Sigma => ctx.sigma = value,
                    Field::ConstructionTime => ctx.ctime = value,
                    _ => ctx.qtime = value,
                }
            }
            false => {
                let value = text.parse::<i64>().map_err(|_| malformed())?;
                let slot = match self {
                    Field::Dim => &mut ctx.dim,
                    Field::Pts => &mut ctx.pts,
                    Field::Search => &mut ctx.search,
                    Field::Sample => &mut ctx.sample,
                    Field::Run => &mut ctx.run,
                    Field::K => &mut ctx.k,
                    Field::BuildDepth => &mut ctx.build_depth,
                    Field::Hits => &mut ctx.hits,
                    Field::Backup => &mut ctx.backup,
                    Field::TotalNodes => &mut ctx.total,
                    Field::TerminalNodes => &mut ctx.terminal,
                    _ => &mut ctx.build_nn_queries,
                };
                *slot = value;
            }
        }

        Ok(())
    }
}

/// What a line was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Parameter(Field),
    KdTreeMarker,
    OddsOnMarker,
    Info,
    Done,
}

/// Prefix dispatch table. Order matters: it is the tie-break order.
pub const PREFIXES: [(&str, LineKind); 12] = [
    ("dim: ", LineKind::Parameter(Field::Dim)),
    ("pts: ", LineKind::Parameter(Field::Pts)),
    ("sigma: ", LineKind::Parameter(Field::Sigma)),
    ("search size: ", LineKind::Parameter(Field::Search)),
    ("sample size: ", LineKind::Parameter(Field::Sample)),
    ("run: ", LineKind::Parameter(Field::Run)),
    ("k: ", LineKind::Parameter(Field::K)),
    ("build depth: ", LineKind::Parameter(Field::BuildDepth)),
    ("running kdtree", LineKind::KdTreeMarker),
    ("running odds-on tree", LineKind::OddsOnMarker),
    ("info:", LineKind::Info),
    ("done:", LineKind::Done),
];

struct InfoPattern {
    regex: Regex,
    field: Field,
    extended_only: bool,
}

/// Times are matched as `digits, any char, digits` and counters as plain digits, both as a
/// prefix of the rest of the line: `12.500000ms` reads as 12.5, `hits: -1` matches nothing and
/// `took: 12x5` is captured whole and rejected when parsed.
fn info_pattern(label: &str, field: Field, extended_only: bool) -> InfoPattern {
    let number = match field.is_real() {
        true => r"(\d+.\d+)",
        false => r"(\d+)",
    };

    let regex = Regex::new(&format!(r"^info: {}: {}", regex::escape(label), number))
        .expect("Invalid info line regex");

    InfoPattern {
        regex,
        field,
        extended_only,
    }
}

static INFO_PATTERNS: LazyLock<Vec<InfoPattern>> = LazyLock::new(|| {
    vec![
        info_pattern("tree construction took", Field::ConstructionTime, false),
        info_pattern("running queries took", Field::QueryTime, false),
        info_pattern("hits", Field::Hits, false),
        info_pattern("backup nodes visited", Field::Backup, false),
        info_pattern("total nodes", Field::TotalNodes, true),
        info_pattern("terminal nodes", Field::TerminalNodes, true),
        info_pattern("build nn queries", Field::BuildNnQueries, true),
    ]
});

/// Returns the kind of `line` and the text following its prefix.
pub fn classify(line: &str) -> Option<(LineKind, &str)> {
    PREFIXES
        .iter()
        .find(|(prefix, _)| line.starts_with(prefix))
        .map(|(prefix, kind)| (*kind, &line[prefix.len()..]))
}

impl RunContext {
    /// One step of the fold over a log: applies `line` to the context and returns a row when
    /// the line closes a run.
    ///
    /// `line_number` is only used to locate malformed values.
    pub fn advance(
        &mut self,
        line: &str,
        line_number: usize,
        variant: Variant,
    ) -> Result<Option<ObservationRow>> {
        let (kind, rest) = match classify(line) {
            Some(c) => c,
            None => return Ok(None),
        };

        match kind {
            LineKind::Parameter(field) => field.assign(self, rest, line_number)?,
            LineKind::KdTreeMarker => self.start_kdtree(variant),
            LineKind::OddsOnMarker => self.start_oddson_tree(variant),
            LineKind::Info => {
                let matched = INFO_PATTERNS
                    .iter()
                    .filter(|p| variant.is_extended() || !p.extended_only)
                    .find_map(|p| p.regex.captures(line).map(|c| (p.field, c)));

                if let Some((field, captures)) = matched {
                    field.assign(self, &captures[1], line_number)?;
                }
            }
            LineKind::Done => return Ok(Some(self.snapshot())),
        }

        Ok(None)
    }
}

/// Incremental parser over a stream of lines.
#[derive(Debug)]
pub struct LogParser {
    variant: Variant,
    context: RunContext,
    table: ResultTable,
    line_number: usize,
    run_open: bool,
}

impl LogParser {
    pub fn new(variant: Variant) -> Self {
        return Self {
            variant,
            context: RunContext::default(),
            table: ResultTable::new(variant),
            line_number: 0,
            run_open: false,
        };
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn rows_emitted(&self) -> usize {
        self.table.len()
    }

    /// Feeds the next line, without its trailing newline.
    pub fn feed(&mut self, line: &str) -> Result<()> {
        self.line_number += 1;

        if let Some(row) = self.context.advance(line, self.line_number, self.variant)? {
            self.table.push(row);
            self.run_open = false;
        } else if line.starts_with("running ") {
            self.run_open = true;
        }

        Ok(())
    }

    pub fn finish(self) -> ResultTable {
        if self.run_open {
            debug!(
                "input ended inside a run after line {}, discarding it",
                self.line_number
            );
        }

        self.table
    }
}

pub fn parse_lines<I, S>(lines: I, variant: Variant) -> Result<ResultTable>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = LogParser::new(variant);
    for line in lines {
        parser.feed(line.as_ref())?;
    }

    Ok(parser.finish())
}

/// Parses a log from any buffered reader. Bytes that are not valid UTF-8 are replaced rather
/// than rejected; such lines never match a prefix anyway.
pub fn parse_reader<R: BufRead>(reader: R, variant: Variant) -> Result<ResultTable> {
    let mut parser = LogParser::new(variant);

    for chunk in reader.split(b'\n') {
        let bytes = chunk.map_err(|e| Error::io("reading log", e))?;
        let line = String::from_utf8_lossy(&bytes);
        parser.feed(line.trim_end_matches('\r'))?;
    }

    Ok(parser.finish())
}

pub fn parse_file<P: AsRef<Path>>(path: P, variant: Variant) -> Result<ResultTable> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(Error::InputNotFound {
            path: path.to_path_buf(),
        });
    }

    let file =
        File::open(path).map_err(|e| Error::io(format!("opening {}", path.display()), e))?;
    let table = parse_reader(BufReader::new(file), variant)?;

    info!("{}: {} rows", path.display(), table.len());

    Ok(table)
}
