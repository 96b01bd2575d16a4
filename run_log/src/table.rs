//! Column schema and the ordered table of observation rows
//!
//! The schema is fixed ahead of time rather than inferred from the data. The standard variant
//! carries twelve columns; the extended variant appends three build-diagnostic counters.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::ObservationRow;

/// Which flavour of log is being parsed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Standard,
    Extended,
}

impl Variant {
    pub fn columns(&self) -> &'static [Column] {
        match self {
            Variant::Standard => &COLUMNS[..STANDARD_COLUMN_COUNT],
            Variant::Extended => &COLUMNS[..],
        }
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns().iter().map(|c| c.name).collect()
    }

    pub fn is_extended(&self) -> bool {
        *self == Variant::Extended
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
}

const fn column(name: &'static str, sql_type: SqlType) -> Column {
    Column { name, sql_type }
}

pub const STANDARD_COLUMN_COUNT: usize = 12;

pub const COLUMNS: [Column; 15] = [
    column("dim", SqlType::Integer),
    column("pts", SqlType::Integer),
    column("sigma", SqlType::Real),
    column("search", SqlType::Integer),
    column("sample", SqlType::Integer),
    column("build_depth", SqlType::Integer),
    column("run", SqlType::Integer),
    column("kdtree", SqlType::Integer),
    column("ctime", SqlType::Real),
    column("qtime", SqlType::Real),
    column("hits", SqlType::Integer),
    column("backup", SqlType::Integer),
    //extended only
    column("total", SqlType::Integer),
    column("terminal", SqlType::Integer),
    column("build_nn_queries", SqlType::Integer),
];

/// A single table cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Int(i64),
    Real(f64),
    Bool(bool),
}

impl Cell {
    /// Total order used when sorting rows; floats use IEEE total ordering.
    pub fn total_cmp(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Int(a), Cell::Int(b)) => a.cmp(b),
            (Cell::Real(a), Cell::Real(b)) => a.total_cmp(b),
            (Cell::Bool(a), Cell::Bool(b)) => a.cmp(b),
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Cell::Int(v) => *v as f64,
            Cell::Real(v) => *v,
            Cell::Bool(v) => f64::from(u8::from(*v)),
        }
    }
}

/// Decimal text: floats in shortest round-trip form, booleans as 1/0.
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Int(v) => write!(f, "{}", v),
            Cell::Real(v) => write!(f, "{}", v),
            Cell::Bool(v) => write!(f, "{}", u8::from(*v)),
        }
    }
}

pub fn compare_cells(a: &[Cell], b: &[Cell]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.total_cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    return a.len().cmp(&b.len());
}

/// Ordered rows for a whole log. Rows are only ever appended.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    variant: Variant,
    rows: Vec<ObservationRow>,
}

impl ResultTable {
    pub fn new(variant: Variant) -> Self {
        return Self {
            variant,
            rows: Vec::new(),
        };
    }

    pub fn push(&mut self, row: ObservationRow) {
        self.rows.push(row);
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn columns(&self) -> &'static [Column] {
        self.variant.columns()
    }

    pub fn rows(&self) -> &[ObservationRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell values for every row, in emission order.
    pub fn cells(&self) -> Vec<Vec<Cell>> {
        self.rows.iter().map(|r| r.values(self.variant)).collect()
    }

    /// Cell values sorted ascending by the full tuple in schema order.
    pub fn sorted_cells(&self) -> Vec<Vec<Cell>> {
        let mut cells = self.cells();
        cells.sort_by(|a, b| compare_cells(a, b));

        return cells;
    }
}
