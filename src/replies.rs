//! File boundary with the conversational agent: pending-row export, reply
//! import and the reply audit log.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use csv::Writer;
use glob::glob;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::interpreter::{FieldKind, ParsedReply};
use crate::selector::PendingRecord;
use crate::types::{IdentityTuple, PromptText, ReplyText, RequestId};

const REQUEST_PREFIX: &str = "req";

fn generate_deterministic_id(prefix: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    format!("{}-sha256-{}", prefix, hex::encode(result))
}

/// Id shared by every row carrying the same normalized identity tuple.
pub fn request_id(identity: &[String]) -> RequestId {
    // unit separator keeps ("a", "bc") and ("ab", "c") apart
    generate_deterministic_id(REQUEST_PREFIX, &identity.join("\u{1f}"))
}

fn identity_map(columns: &[String], identity: &[String]) -> BTreeMap<String, String> {
    columns.iter().cloned().zip(identity.iter().cloned()).collect()
}

/// One line of the pending export handed to whatever talks to the agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PendingExport {
    pub request_id: RequestId,
    /// 1-based position among data rows.
    pub row_number: usize,
    pub identity: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prompt: Option<PromptText>,
}

impl PendingExport {
    pub fn new(identity_columns: &[String], record: &PendingRecord, prompt: Option<PromptText>) -> Self {
        Self {
            request_id: request_id(&record.identity),
            row_number: record.row_index + 1,
            identity: identity_map(identity_columns, &record.identity),
            prompt,
        }
    }
}

/// Writes one JSON object per line and returns the number written.
pub fn write_pending<W: Write, I: IntoIterator<Item = PendingExport>>(mut writer: W, exports: I) -> Result<usize> {
    let mut written = 0;
    for export in exports {
        serde_json::to_writer(&mut writer, &export).context("Failed to serialize pending record")?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// One reply from the agent, keyed by the identity it answers.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ReplyEntry {
    #[serde(default)]
    pub request_id: Option<RequestId>,
    pub identity: HashMap<String, String>,
    pub reply: ReplyText,
}

impl ReplyEntry {
    /// Identity values in configured column order; absent columns are empty.
    pub fn identity_tuple(&self, identity_columns: &[String]) -> IdentityTuple {
        identity_columns
            .iter()
            .map(|col| {
                self.identity
                    .get(col)
                    .map(|v| v.trim().to_string())
                    .unwrap_or_default()
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct ReplyBatch {
    pub entries: Vec<ReplyEntry>,
    pub malformed_lines: usize,
    pub files_read: usize,
}

/// A single `.jsonl` file, or every `**/*.jsonl` under a directory in sorted
/// order.
pub fn find_reply_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let pattern = path.join("**/*.jsonl");
    let pattern_str = pattern.to_string_lossy();
    info!("Searching for reply files matching pattern: {}", pattern_str);
    let mut paths: Vec<PathBuf> = glob(&pattern_str)
        .with_context(|| format!("Invalid reply file pattern: {}", pattern_str))?
        .filter_map(Result::ok)
        .collect();
    paths.sort();
    if paths.is_empty() {
        warn!("No reply files found matching the pattern: {}", pattern_str);
    }
    Ok(paths)
}

/// Reads every reply file under `path`. Malformed lines are counted and
/// skipped.
pub fn read_replies(path: &Path) -> Result<ReplyBatch> {
    let mut batch = ReplyBatch::default();
    for file_path in find_reply_files(path)? {
        let file = File::open(&file_path)
            .with_context(|| format!("Failed to open reply file: {}", file_path.display()))?;
        read_reply_lines(BufReader::new(file), &file_path, &mut batch)?;
        batch.files_read += 1;
    }
    Ok(batch)
}

fn read_reply_lines<R: BufRead>(reader: R, source: &Path, batch: &mut ReplyBatch) -> Result<()> {
    let mut parsed = 0;
    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result
            .with_context(|| format!("Error reading line {} from {}", line_num + 1, source.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ReplyEntry>(&line) {
            Ok(entry) => {
                batch.entries.push(entry);
                parsed += 1;
            }
            Err(e) => {
                batch.malformed_lines += 1;
                warn!("Skipping malformed reply at {}:{}: {}", source.display(), line_num + 1, e);
            }
        }
    }
    debug!("Read {} replies from {}", parsed, source.display());
    Ok(())
}

const AUDIT_HEADERS: [&str; 9] = [
    "request_id",
    "identity",
    "reply",
    "field_1",
    "field_2",
    "field_3",
    "field_4",
    "rows_updated",
    "processed_at",
];

/// CSV record of every reply handled during a run.
pub struct AuditLog {
    writer: Writer<File>,
    path: PathBuf,
    rows_written: usize,
}

impl AuditLog {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create audit log: {}", path.display()))?;
        let mut writer = Writer::from_writer(file);
        writer.write_record(AUDIT_HEADERS)?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows_written: 0,
        })
    }

    pub fn record(&mut self, identity: &[String], reply: &str, parsed: &ParsedReply, rows_updated: usize) -> Result<()> {
        let fields = parsed.fields();
        let rows_updated = rows_updated.to_string();
        let processed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let request = request_id(identity);
        let identity_joined = identity.join(" | ");
        self.writer.write_record([
            request.as_str(),
            identity_joined.as_str(),
            reply,
            fields[0].as_str(),
            fields[1].as_str(),
            fields[2].as_str(),
            fields[3].as_str(),
            rows_updated.as_str(),
            processed_at.as_str(),
        ])?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize> {
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush audit log: {}", self.path.display()))?;
        info!("Audit log {} written with {} entries", self.path.display(), self.rows_written);
        Ok(self.rows_written)
    }
}

/// Tally of value kinds across every merged reply.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldTally {
    pub determined: usize,
    pub assumed: usize,
    pub missing: usize,
}

impl FieldTally {
    pub fn add(&mut self, parsed: &ParsedReply) {
        for kind in parsed.kinds() {
            match kind {
                FieldKind::Determined => self.determined += 1,
                FieldKind::Assumed => self.assumed += 1,
                FieldKind::Missing => self.missing += 1,
            }
        }
    }
}
