//! Writes parsed reply values back into every row sharing an identity tuple.

use log::debug;

use crate::dataset::{ColumnLayout, Dataset};
use crate::interpreter::ParsedReply;

/// Applies `reply` to the target columns of every row whose identifying
/// fields equal `identity` (compared normalized) and returns how many rows
/// were written.
///
/// Zero is a normal outcome: the caller decides whether to warn and move on.
pub fn merge(dataset: &mut Dataset, layout: &ColumnLayout, identity: &[String], reply: &ParsedReply) -> usize {
    let matching: Vec<usize> = (0..dataset.len())
        .filter(|&row| layout.matches(dataset, row, identity))
        .collect();

    for &row in &matching {
        for (&col, value) in layout.targets().iter().zip(reply.fields()) {
            dataset.set_cell(row, col, value);
        }
    }
    debug!("Merged reply into {} row(s) for identity {:?}", matching.len(), identity);
    matching.len()
}
