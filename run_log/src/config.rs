//! Parser and projection settings, loadable from a YAML file

use std::fs::File;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::table::Variant;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ParseConfig {
    pub variant: Variant,
    /// Name of the table rows are loaded into.
    pub table_name: String,
    pub sort_csv: bool,
    /// Appended to the log file name to name the CSV output.
    pub csv_suffix: String,
}

impl Default for ParseConfig {
    fn default() -> Self {
        return Self {
            variant: Variant::Standard,
            table_name: "data".to_string(),
            sort_csv: true,
            csv_suffix: ".csv".to_string(),
        };
    }
}

impl ParseConfig {
    pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let filename = filename.as_ref();

        let serialized = std::fs::read_to_string(filename)
            .map_err(|e| Error::io(format!("reading config {}", filename.display()), e))?;

        let deserialized: Self = serde_yaml::from_str(&serialized)?;
        deserialized.validate()?;

        Ok(deserialized)
    }

    pub fn to_file<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        let filename = filename.as_ref();

        let serialized = serde_yaml::to_string(&self)?;
        let mut file = File::create(filename)
            .map_err(|e| Error::io(format!("creating config {}", filename.display()), e))?;

        file.write_all(serialized.as_bytes())
            .map_err(|e| Error::io(format!("writing config {}", filename.display()), e))?;

        Ok(())
    }

    /// The table name is spliced into DDL, so it must be a plain identifier.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.table_name) {
            return Err(Error::Config {
                message: format!("table_name {:?} is not a valid identifier", self.table_name),
            });
        }

        if self.csv_suffix.is_empty() {
            return Err(Error::Config {
                message: "csv_suffix must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// `<logfile><suffix>`, e.g. `log.txt.csv`.
    pub fn csv_path_for<P: AsRef<Path>>(&self, log_path: P) -> PathBuf {
        let mut s = log_path.as_ref().as_os_str().to_os_string();
        s.push(&self.csv_suffix);

        return PathBuf::from(s);
    }
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
