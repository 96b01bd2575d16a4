//! Loads observation rows into SQLite and runs read-only queries against them
//!
//! Loading always drops and recreates the target table, so loading the same rows twice leaves
//! the database exactly as loading them once. The connection is closed when the store is
//! dropped.

use std::io::Write;
use std::path::Path;

use log::{debug, info};
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rusqlite::{params_from_iter, Connection};

use crate::config::is_identifier;
use crate::error::{Error, Result};
use crate::table::{Cell, ResultTable};

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Cell::Int(v) => Value::Integer(*v),
            Cell::Real(v) => Value::Real(*v),
            Cell::Bool(v) => Value::Integer(i64::from(*v)),
        };

        Ok(ToSqlOutput::Owned(value))
    }
}

#[derive(Debug)]
pub struct ResultStore {
    conn: Connection,
    path: String,
}

impl ResultStore {
    /// Opens or creates a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;

        debug!("opened database {}", path.display());

        return Ok(Self {
            conn,
            path: path.to_string_lossy().to_string(),
        });
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        return Ok(Self {
            conn,
            path: ":memory:".to_string(),
        });
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replaces `table_name` with one typed column per schema column and inserts every row in
    /// emission order. Returns the number of rows inserted.
    pub fn load(&mut self, table: &ResultTable, table_name: &str) -> Result<usize> {
        if !is_identifier(table_name) {
            return Err(Error::Config {
                message: format!("table name {:?} is not a valid identifier", table_name),
            });
        }

        let columns = table.columns();

        let column_defs = columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.sql_type.as_sql()))
            .collect::<Vec<String>>()
            .join(", ");

        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<String>>()
            .join(", ");

        let tx = self.conn.transaction()?;

        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {name};
             CREATE TABLE {name} ({column_defs});",
            name = table_name,
            column_defs = column_defs,
        ))?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} VALUES ({})",
                table_name, placeholders
            ))?;

            for row in table.cells().iter() {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }

        tx.commit()?;

        info!(
            "loaded {} rows into {}.{}",
            table.len(),
            self.path,
            table_name
        );

        Ok(table.len())
    }

    /// Runs a single statement that does not modify the database.
    ///
    /// SQLite reports `ATTACH` and `DETACH` as read-only although `ATTACH` can create a file,
    /// so both are refused by keyword. Text after the first statement must be empty.
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        let (first, tail) = split_first_statement(sql);

        let statement = skip_blank(first);
        if statement.is_empty() {
            return Err(Error::InvalidQuery {
                message: "query is empty".to_string(),
            });
        }

        if !is_blank_tail(tail) {
            return Err(Error::InvalidQuery {
                message: format!(
                    "only one statement may be run, found more after {:?}",
                    first.trim()
                ),
            });
        }

        let keyword = leading_keyword(statement);
        if keyword == "ATTACH" || keyword == "DETACH" {
            return Err(Error::NotReadOnly {
                sql: sql.to_string(),
            });
        }

        let mut stmt = self.conn.prepare(first)?;

        if !stmt.readonly() {
            return Err(Error::NotReadOnly {
                sql: sql.to_string(),
            });
        }

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(row.get::<_, Value>(i)?);
            }
            rows.push(values);
        }

        debug!("query returned {} rows: {}", rows.len(), sql);

        Ok(QueryResult { columns, rows })
    }

    /// Closes the connection, reporting any error instead of swallowing it on drop.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Storage(e))
    }
}

/// Skips leading whitespace and SQL comments.
fn skip_blank(sql: &str) -> &str {
    let mut rest = sql;

    loop {
        let trimmed = rest.trim_start();

        if let Some(after) = trimmed.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(i) => &after[i + 1..],
                None => "",
            };
        } else if let Some(after) = trimmed.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(i) => &after[i + 2..],
                None => "",
            };
        } else {
            return trimmed;
        }
    }
}

/// True when `tail` holds nothing but whitespace, comments and stray semicolons.
fn is_blank_tail(tail: &str) -> bool {
    let mut rest = tail;

    loop {
        let trimmed = skip_blank(rest);
        match trimmed.strip_prefix(';') {
            Some(after) => rest = after,
            None => return trimmed.is_empty(),
        }
    }
}

/// Splits `sql` at the first `;` that is not inside a quoted string, identifier or comment.
fn split_first_statement(sql: &str) -> (&str, &str) {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut i = 0;

    while i < len {
        match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < len && bytes[i] != q {
                    i += 1;
                }
            }
            b'[' => {
                while i < len && bytes[i] != b']' {
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < len && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            b';' => return (&sql[..i], &sql[i + 1..]),
            _ => {}
        }
        i += 1;
    }

    return (sql, "");
}

fn leading_keyword(statement: &str) -> String {
    statement
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("")
        .to_ascii_uppercase()
}

/// Column names and every row a query produced.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => b.iter().map(|x| format!("{:02x}", x)).collect(),
    }
}

fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(v) => serde_json::Value::from(*v),
        Value::Real(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(_) | Value::Blob(_) => serde_json::Value::String(value_text(value)),
    }
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv<W: Write>(&self, writer: W, header: bool) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        if header {
            csv_writer.write_record(&self.columns)?;
        }

        for row in self.rows.iter() {
            csv_writer.write_record(row.iter().map(value_text))?;
        }

        csv_writer
            .flush()
            .map_err(|e| Error::io("flushing query output", e))?;

        Ok(())
    }

    /// One JSON object per row, keyed by column name.
    pub fn write_json_lines<W: Write>(&self, mut writer: W) -> Result<()> {
        for row in self.rows.iter() {
            let object: serde_json::Map<String, serde_json::Value> = self
                .columns
                .iter()
                .cloned()
                .zip(row.iter().map(value_json))
                .collect();

            serde_json::to_writer(&mut writer, &object)
                .map_err(|e| Error::io("writing query output", e.into()))?;
            writeln!(writer).map_err(|e| Error::io("writing query output", e))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_lines;
    use crate::table::Variant;
    use assert_approx_eq::assert_approx_eq;

    fn two_run_table(variant: Variant) -> ResultTable {
        let lines = [
            "dim: 2",
            "pts: 1000",
            "sigma: 0.100000",
            "search size: 500000",
            "sample size: 2000",
            "run: 3",
            "running kdtree",
            "info: tree construction took: 12.500000",
            "info: running queries took: 3.100000",
            "info: hits: 95",
            "done: 0",
            "build depth: 6",
            "running odds-on tree",
            "info: tree construction took: 20.000000",
            "info: running queries took: 1.500000",
            "info: hits: 80",
            "info: backup nodes visited: 9",
            "info: total nodes: 300",
            "done: 0",
        ];

        parse_lines(lines, variant).unwrap()
    }

    #[test]
    fn load_creates_typed_table() {
        let mut store = ResultStore::open_in_memory().unwrap();
        let n = store
            .load(&two_run_table(Variant::Standard), "data")
            .unwrap();
        assert_eq!(n, 2);

        let result = store
            .query("SELECT name, type FROM pragma_table_info('data') ORDER BY cid")
            .unwrap();
        let names: Vec<String> = result.rows.iter().map(|r| value_text(&r[0])).collect();
        assert_eq!(names, Variant::Standard.column_names());
        assert_eq!(value_text(&result.rows[2][1]), "REAL");
        assert_eq!(value_text(&result.rows[7][1]), "INTEGER");
    }

    #[test]
    fn rows_keep_insertion_order() {
        let mut store = ResultStore::open_in_memory().unwrap();
        store
            .load(&two_run_table(Variant::Standard), "data")
            .unwrap();

        let result = store
            .query("SELECT kdtree, build_depth, qtime FROM data ORDER BY rowid")
            .unwrap();

        assert_eq!(result.columns, vec!["kdtree", "build_depth", "qtime"]);
        assert_eq!(result.rows[0][0], Value::Integer(1));
        assert_eq!(result.rows[1][0], Value::Integer(0));
        assert_eq!(result.rows[1][1], Value::Integer(6));
        match result.rows[0][2] {
            Value::Real(q) => assert_approx_eq!(q, 3.1),
            ref v => panic!("unexpected value {:?}", v),
        }
    }

    #[test]
    fn loading_twice_equals_loading_once() {
        let table = two_run_table(Variant::Extended);

        let mut once = ResultStore::open_in_memory().unwrap();
        once.load(&table, "data").unwrap();

        let mut twice = ResultStore::open_in_memory().unwrap();
        twice.load(&table, "data").unwrap();
        twice.load(&table, "data").unwrap();

        let sql = "SELECT * FROM data ORDER BY rowid";
        assert_eq!(once.query(sql).unwrap(), twice.query(sql).unwrap());
        assert_eq!(twice.query(sql).unwrap().len(), 2);
    }

    #[test]
    fn extended_columns_are_loaded() {
        let mut store = ResultStore::open_in_memory().unwrap();
        store
            .load(&two_run_table(Variant::Extended), "data")
            .unwrap();

        let result = store
            .query("SELECT total, terminal FROM data WHERE kdtree = 0")
            .unwrap();
        assert_eq!(result.rows, vec![vec![Value::Integer(300), Value::Integer(0)]]);
    }

    #[test]
    fn aggregate_query_like_the_plots_use() {
        let mut store = ResultStore::open_in_memory().unwrap();
        store
            .load(&two_run_table(Variant::Standard), "data")
            .unwrap();

        let result = store
            .query(
                "SELECT kdtree, avg(ctime + qtime) FROM data \
                 WHERE pts = 1000 AND sample = 2000 GROUP BY kdtree ORDER BY kdtree",
            )
            .unwrap();

        assert_eq!(result.len(), 2);
        match result.rows[1][1] {
            Value::Real(total) => assert_approx_eq!(total, 15.6),
            ref v => panic!("unexpected value {:?}", v),
        }
    }

    #[test]
    fn writes_are_refused() {
        let mut store = ResultStore::open_in_memory().unwrap();
        store
            .load(&two_run_table(Variant::Standard), "data")
            .unwrap();

        let err = store.query("DELETE FROM data").unwrap_err();
        assert!(matches!(err, Error::NotReadOnly { .. }));

        let err = store.query("DROP TABLE data").unwrap_err();
        assert!(matches!(err, Error::NotReadOnly { .. }));

        assert_eq!(store.query("SELECT * FROM data").unwrap().len(), 2);
    }

    #[test]
    fn attach_and_detach_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let side = dir.path().join("side.db");

        let store = ResultStore::open_in_memory().unwrap();
        let sql = format!("ATTACH '{}' AS s", side.display());

        let err = store.query(&sql).unwrap_err();
        assert!(matches!(err, Error::NotReadOnly { .. }));
        assert!(!side.exists());

        let err = store.query("  /* x */ detach DATABASE s").unwrap_err();
        assert!(matches!(err, Error::NotReadOnly { .. }));
    }

    #[test]
    fn trailing_statements_are_refused() {
        let mut store = ResultStore::open_in_memory().unwrap();
        store
            .load(&two_run_table(Variant::Standard), "data")
            .unwrap();

        let err = store.query("select 1; delete from data").unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
        assert_eq!(store.query("SELECT * FROM data").unwrap().len(), 2);

        //a lone terminator or trailing comment is fine
        assert_eq!(store.query("select 1;").unwrap().len(), 1);
        assert_eq!(store.query("select 1; -- done\n;").unwrap().len(), 1);

        //semicolons inside literals do not split
        let result = store.query("select ';' as s, 'it''s' as t").unwrap();
        assert_eq!(result.rows[0][0], Value::Text(";".to_string()));
        assert_eq!(result.rows[0][1], Value::Text("it's".to_string()));
    }

    #[test]
    fn empty_query_is_refused() {
        let store = ResultStore::open_in_memory().unwrap();

        for sql in ["", "   ", "-- nothing here", "/* only a comment */", ";"] {
            let err = store.query(sql).unwrap_err();
            assert!(matches!(err, Error::InvalidQuery { .. }), "{:?}", sql);
        }
    }

    #[test]
    fn bad_sql_is_storage_error() {
        let store = ResultStore::open_in_memory().unwrap();
        let err = store.query("SELECT * FROM nowhere").unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn invalid_table_name_rejected() {
        let mut store = ResultStore::open_in_memory().unwrap();
        let table = ResultTable::new(Variant::Standard);
        assert!(store.load(&table, "data; --").is_err());
    }

    #[test]
    fn file_database_persists_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dim2.db");

        let mut store = ResultStore::open(&path).unwrap();
        store
            .load(&two_run_table(Variant::Standard), "data")
            .unwrap();
        store.close().unwrap();

        let store = ResultStore::open(&path).unwrap();
        assert_eq!(store.path(), path.to_string_lossy());
        let result = store.query("SELECT count(*) FROM data").unwrap();
        assert_eq!(result.rows[0][0], Value::Integer(2));

        assert_eq!(ResultStore::open_in_memory().unwrap().path(), ":memory:");
    }

    #[test]
    fn unopenable_database_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("x.db");

        let err = ResultStore::open(&path).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn query_output_formats() {
        let mut store = ResultStore::open_in_memory().unwrap();
        store
            .load(&two_run_table(Variant::Standard), "data")
            .unwrap();
        let result = store
            .query("SELECT dim, sigma, kdtree FROM data ORDER BY rowid")
            .unwrap();

        let mut csv_out: Vec<u8> = Vec::new();
        result.write_csv(&mut csv_out, true).unwrap();
        assert_eq!(
            String::from_utf8(csv_out).unwrap(),
            "dim,sigma,kdtree\n2,0.1,1\n2,0.1,0\n"
        );

        let mut json_out: Vec<u8> = Vec::new();
        result.write_json_lines(&mut json_out).unwrap();
        let text = String::from_utf8(json_out).unwrap();
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["dim"], 2);
        assert_eq!(first["kdtree"], 1);
        assert_eq!(first["sigma"], 0.1);
    }
}
