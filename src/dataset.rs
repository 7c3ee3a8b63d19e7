//! In-memory tabular dataset backed by a CSV file.
//!
//! The whole file is read once, mutated in place and written back wholesale by
//! [`Dataset::persist`]. Nothing is streamed and nothing is saved per row.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use log::{debug, info};

use crate::error::DatasetError;
use crate::interpreter::FIELD_COUNT;
use crate::types::IdentityTuple;

/// Normalized view of a cell: surrounding whitespace is not significant.
pub fn normalize_cell(value: &str) -> &str {
    value.trim()
}

#[derive(Debug, Clone)]
pub struct Dataset {
    source: PathBuf,
    delimiter: u8,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn load(path: &Path, delimiter: u8) -> Result<Self, DatasetError> {
        let file = File::open(path)?;
        let dataset = Self::from_reader(file, path, delimiter)?;
        info!(
            "Loaded dataset {}: {} rows, {} columns",
            path.display(),
            dataset.len(),
            dataset.headers.len()
        );
        Ok(dataset)
    }

    /// Parses CSV from any reader. `source` only labels errors and is the
    /// default persistence target.
    pub fn from_reader<R: Read>(reader: R, source: &Path, delimiter: u8) -> Result<Self, DatasetError> {
        let csv_error = |e: csv::Error| DatasetError::Csv {
            path: source.to_path_buf(),
            source: e,
        };
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(DatasetError::MissingHeader(source.to_path_buf()));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            if row.len() < headers.len() {
                row.resize(headers.len(), String::new());
            }
            rows.push(row);
        }
        debug!("Parsed {} data rows from {}", rows.len(), source.display());

        Ok(Self {
            source: source.to_path_buf(),
            delimiter,
            headers,
            rows,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a header, failing when it is absent or ambiguous.
    pub fn column_index(&self, name: &str) -> Result<usize, DatasetError> {
        let name = name.trim();
        let mut matches = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.as_str() == name)
            .map(|(i, _)| i);
        let first = matches.next().ok_or_else(|| DatasetError::MissingColumn {
            column: name.to_string(),
            path: self.source.clone(),
        })?;
        if matches.next().is_some() {
            return Err(DatasetError::DuplicateColumn {
                column: name.to_string(),
                path: self.source.clone(),
            });
        }
        Ok(first)
    }

    /// Raw cell content; cells past the end of a short row read as empty.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub(crate) fn set_cell(&mut self, row: usize, column: usize, value: &str) {
        if let Some(cells) = self.rows.get_mut(row) {
            if cells.len() <= column {
                cells.resize(column + 1, String::new());
            }
            cells[column] = value.to_string();
        }
    }

    /// Writes every row to `writer` with the original header order.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), DatasetError> {
        let csv_error = |e: csv::Error| DatasetError::Csv {
            path: self.source.clone(),
            source: e,
        };
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_writer(writer);
        writer.write_record(&self.headers).map_err(csv_error)?;
        for row in &self.rows {
            writer.write_record(row).map_err(csv_error)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Overwrites `destination` with the full dataset.
    ///
    /// The table is written to a sibling temporary file first and renamed into
    /// place, so the destination holds either the old or the new content.
    pub fn persist(&self, destination: &Path) -> Result<(), DatasetError> {
        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "dataset.csv".to_string());
        let temp_path = destination.with_file_name(format!(".{}.tmp", file_name));

        let result = File::create(&temp_path)
            .map_err(DatasetError::from)
            .and_then(|file| self.write_to(file));
        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        fs::rename(&temp_path, destination)?;
        info!("Wrote {} rows to {}", self.len(), destination.display());
        Ok(())
    }
}

/// Resolved column positions for the identity and target roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    identity: Vec<usize>,
    targets: [usize; FIELD_COUNT],
}

impl ColumnLayout {
    /// Maps configured column names onto `dataset` headers, failing fast on
    /// the first absent or duplicated column.
    pub fn resolve<I: AsRef<str>, T: AsRef<str>>(
        dataset: &Dataset,
        identity_columns: &[I],
        target_columns: &[T; FIELD_COUNT],
    ) -> Result<Self, DatasetError> {
        let identity = identity_columns
            .iter()
            .map(|name| dataset.column_index(name.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut targets = [0; FIELD_COUNT];
        for (slot, name) in targets.iter_mut().zip(target_columns.iter()) {
            *slot = dataset.column_index(name.as_ref())?;
        }
        Ok(Self { identity, targets })
    }

    pub fn identity(&self) -> &[usize] {
        &self.identity
    }

    pub fn targets(&self) -> &[usize; FIELD_COUNT] {
        &self.targets
    }

    /// Normalized identity tuple of `row`.
    pub fn identity_of(&self, dataset: &Dataset, row: usize) -> IdentityTuple {
        self.identity
            .iter()
            .map(|&col| normalize_cell(dataset.cell(row, col)).to_string())
            .collect()
    }

    pub fn matches(&self, dataset: &Dataset, row: usize, identity: &[String]) -> bool {
        self.identity.len() == identity.len()
            && self
                .identity
                .iter()
                .zip(identity)
                .all(|(&col, expected)| normalize_cell(dataset.cell(row, col)) == normalize_cell(expected))
    }
}
