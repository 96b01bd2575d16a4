//! Writes a [`ResultTable`] as comma separated text

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::info;

use crate::error::{Error, Result};
use crate::table::ResultTable;

/// Writes a header naming every column in schema order, then one line per row.
///
/// With `sort` set the rows go out ascending by their full value tuple; otherwise in the order
/// they appeared in the log.
pub fn write_csv<W: Write>(table: &ResultTable, writer: W, sort: bool) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(table.variant().column_names())?;

    let cells = match sort {
        true => table.sorted_cells(),
        false => table.cells(),
    };

    for row in cells.iter() {
        csv_writer.write_record(row.iter().map(|c| c.to_string()))?;
    }

    csv_writer
        .flush()
        .map_err(|e| Error::io("flushing csv output", e))?;

    Ok(())
}

pub fn write_csv_file<P: AsRef<Path>>(table: &ResultTable, path: P, sort: bool) -> Result<()> {
    let path = path.as_ref();

    let output_error = |source| Error::Output {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(output_error)?;

    write_csv(table, file, sort).map_err(|e| match e {
        Error::Io { source, .. } => output_error(source),
        Error::Csv(e) if e.is_io_error() => output_error(e.into()),
        e => e,
    })?;

    info!("wrote {} rows to {}", table.len(), path.display());

    Ok(())
}

/// Reads back a header and rows of decimal text.
pub fn read_csv<R: Read>(reader: R) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut csv_reader = csv::Reader::from_reader(reader);

    let header = csv_reader
        .headers()?
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    Ok((header, rows))
}
