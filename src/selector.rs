//! Finds the rows that still need every target field filled.

use std::vec;

use log::debug;

use crate::dataset::{normalize_cell, ColumnLayout, Dataset};
use crate::error::DatasetError;
use crate::types::IdentityTuple;

/// A row whose target fields are all empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    /// Zero-based data row index (the header is not counted).
    pub row_index: usize,
    pub identity: IdentityTuple,
}

/// Pending rows in source order. Consumed once.
#[derive(Debug)]
pub struct PendingRecords {
    inner: vec::IntoIter<PendingRecord>,
}

impl Iterator for PendingRecords {
    type Item = PendingRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for PendingRecords {}

/// Selects rows where **every** column in `target_columns` is blank.
///
/// A cell counts as blank when it is absent or only whitespace. A target
/// column missing from the dataset is reported as an error rather than
/// treated as blank.
pub fn select_pending<S: AsRef<str>>(
    dataset: &Dataset,
    layout: &ColumnLayout,
    target_columns: &[S],
) -> Result<PendingRecords, DatasetError> {
    let targets = target_columns
        .iter()
        .map(|name| dataset.column_index(name.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let pending: Vec<PendingRecord> = (0..dataset.len())
        .filter(|&row| targets.iter().all(|&col| normalize_cell(dataset.cell(row, col)).is_empty()))
        .map(|row| PendingRecord {
            row_index: row,
            identity: layout.identity_of(dataset, row),
        })
        .collect();
    debug!(
        "{} of {} rows have all of {} target columns empty",
        pending.len(),
        dataset.len(),
        targets.len()
    );

    Ok(PendingRecords {
        inner: pending.into_iter(),
    })
}
