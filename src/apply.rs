//! Interpreting a batch of replies, merging them into the dataset and saving
//! the result once at the end.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::config::RunConfig;
use crate::dataset::{ColumnLayout, Dataset};
use crate::interpreter::interpret;
use crate::merger::merge;
use crate::replies::{read_replies, request_id, AuditLog, FieldTally, ReplyEntry};
use crate::selector::select_pending;

/// Loads the configured dataset and resolves its column layout, failing on
/// the first configured column the file does not carry.
pub fn load_dataset(config: &RunConfig) -> Result<(Dataset, ColumnLayout)> {
    let dataset = Dataset::load(&config.dataset, config.delimiter_byte())
        .with_context(|| format!("Failed to load dataset: {}", config.dataset.display()))?;
    let layout = ColumnLayout::resolve(&dataset, config.identity_columns.as_slice(), &config.target_columns_array())
        .with_context(|| format!("Dataset {} does not match the configured columns", config.dataset.display()))?;
    Ok((dataset, layout))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyStats {
    pub replies_merged: usize,
    pub replies_unmatched: usize,
    pub rows_updated: usize,
    /// Replies whose `request_id` does not belong to their identity tuple.
    pub request_id_mismatches: usize,
    /// Value kinds of merged replies only.
    pub tally: FieldTally,
}

/// Interprets and merges every entry in order.
///
/// The identity tuple decides where a reply lands. A `request_id` that
/// disagrees with it is warned about and counted, and the reply is still
/// merged by identity. `on_reply` is called once per entry with its identity.
pub fn apply_batch<F: FnMut(&[String])>(
    dataset: &mut Dataset,
    layout: &ColumnLayout,
    identity_columns: &[String],
    entries: &[ReplyEntry],
    mut audit: Option<&mut AuditLog>,
    mut on_reply: F,
) -> Result<ApplyStats> {
    let mut stats = ApplyStats::default();

    for entry in entries {
        let identity = entry.identity_tuple(identity_columns);
        if let Some(given) = &entry.request_id {
            let expected = request_id(&identity);
            if *given != expected {
                stats.request_id_mismatches += 1;
                warn!(
                    "Reply request_id {} does not match identity {} (expected {}); merging by identity",
                    given,
                    identity.join(", "),
                    expected
                );
            }
        }

        let parsed = interpret(&entry.reply);
        debug!("Parsed reply for {:?} via {:?}: {:?}", identity, parsed.strategy(), parsed.fields());

        let updated = merge(dataset, layout, &identity, &parsed);
        if updated == 0 {
            stats.replies_unmatched += 1;
            warn!("No matching row found for {}", identity.join(", "));
        } else {
            stats.replies_merged += 1;
            stats.rows_updated += updated;
            stats.tally.add(&parsed);
        }
        if let Some(audit) = audit.as_deref_mut() {
            audit.record(&identity, &entry.reply, &parsed, updated)?;
        }
        on_reply(&identity);
    }
    Ok(stats)
}

#[derive(Debug, Clone)]
pub struct ApplyOptions<'a> {
    /// Reply JSONL file, or a directory of them.
    pub replies: &'a Path,
    /// Save target; `None` overwrites the configured dataset.
    pub output: Option<&'a Path>,
    pub audit: Option<&'a Path>,
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub files_read: usize,
    pub replies_read: usize,
    pub malformed_lines: usize,
    pub pending_before: usize,
    pub pending_after: usize,
    pub stats: ApplyStats,
    /// Where the dataset was written, `None` when nothing was saved.
    pub saved_to: Option<PathBuf>,
}

/// Full `apply` run: load, read replies, merge, then persist the whole
/// dataset once.
///
/// Nothing is written when there are no replies or when `dry_run` is set.
/// `on_reply` receives the total reply count and each identity as it is
/// processed.
pub fn run_apply<F: FnMut(usize, &[String])>(
    config: &RunConfig,
    options: &ApplyOptions<'_>,
    mut on_reply: F,
) -> Result<ApplyReport> {
    let (mut dataset, layout) = load_dataset(config)?;
    let target_columns = config.target_columns.as_slice();
    let pending_before = select_pending(&dataset, &layout, target_columns)?.len();
    info!("Rows pending before merge: {} of {}", pending_before, dataset.len());

    let batch = read_replies(options.replies)
        .with_context(|| format!("Failed to read replies from {}", options.replies.display()))?;
    info!("Read {} replies from {} file(s)", batch.entries.len(), batch.files_read);
    if batch.malformed_lines > 0 {
        warn!("Skipped {} malformed reply lines", batch.malformed_lines);
    }

    let mut report = ApplyReport {
        files_read: batch.files_read,
        replies_read: batch.entries.len(),
        malformed_lines: batch.malformed_lines,
        pending_before,
        pending_after: pending_before,
        ..ApplyReport::default()
    };
    if batch.entries.is_empty() {
        warn!("No replies to apply. Dataset left untouched.");
        return Ok(report);
    }

    let mut audit = options.audit.map(AuditLog::create).transpose()?;
    let total = batch.entries.len();
    report.stats = apply_batch(
        &mut dataset,
        &layout,
        &config.identity_columns,
        &batch.entries,
        audit.as_mut(),
        |identity| on_reply(total, identity),
    )?;
    report.pending_after = select_pending(&dataset, &layout, target_columns)?.len();

    if options.dry_run {
        info!("Dry run: dataset not saved.");
    } else {
        let destination = options.output.unwrap_or(config.dataset.as_path());
        dataset
            .persist(destination)
            .with_context(|| format!("Failed to save dataset to {}", destination.display()))?;
        report.saved_to = Some(destination.to_path_buf());
    }
    if let Some(audit) = audit {
        audit.finish()?;
    }
    Ok(report)
}
