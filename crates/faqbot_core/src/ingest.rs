//! Lenient CSV ingestion of support conversations.
//!
//! Sources are concatenated in the order given. A source that cannot be
//! opened, or that lacks one of the required columns, contributes nothing.
//! Unparseable numeric cells become `None` instead of rejecting the row.

use crate::error::{FaqError, Result};
use crate::model::Record;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

const ID_COLUMNS: &[&str] = &["id", "tweet_id"];
const TEXT_COLUMNS: &[&str] = &["text"];
const INBOUND_COLUMNS: &[&str] = &["isInbound", "is_inbound", "inbound"];
const REPLY_TO_COLUMNS: &[&str] = &["inReplyToId", "in_reply_to_id", "in_response_to_tweet_id"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub sources: usize,
    pub skipped_sources: usize,
    pub rows: usize,
    pub skipped_rows: usize,
}

impl IngestReport {
    fn absorb(&mut self, other: &IngestReport) {
        self.sources += other.sources;
        self.skipped_sources += other.skipped_sources;
        self.rows += other.rows;
        self.skipped_rows += other.skipped_rows;
    }
}

struct Columns {
    id: usize,
    text: usize,
    inbound: usize,
    reply_to: usize,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Option<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        Some(Self {
            id: find(ID_COLUMNS)?,
            text: find(TEXT_COLUMNS)?,
            inbound: find(INBOUND_COLUMNS)?,
            reply_to: find(REPLY_TO_COLUMNS)?,
        })
    }
}

/// Parses an identifier cell. Accepts integers and integral floats ("42.0").
pub fn parse_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    let v = raw.parse::<f64>().ok()?;
    let in_range = v >= i64::MIN as f64 && v < i64::MAX as f64;
    (v.is_finite() && v.fract() == 0.0 && in_range).then_some(v as i64)
}

/// Case-insensitive "true", "1", "yes" or "y"; everything else is false.
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y"
    )
}

/// Reads one CSV source. Only I/O failures on the header are returned as
/// errors; bad rows are counted in the report.
pub fn read_records<R: Read>(reader: R) -> Result<(Vec<Record>, IngestReport)> {
    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let mut report = IngestReport {
        sources: 1,
        ..IngestReport::default()
    };

    let headers = csv.headers()?.clone();
    let Some(columns) = Columns::resolve(&headers) else {
        warn!(headers = ?headers, "source lacks required columns; ignoring it");
        report.skipped_sources = 1;
        return Ok((Vec::new(), report));
    };

    let mut records = Vec::new();
    for row in csv.records() {
        report.rows += 1;
        let row = match row {
            Ok(row) => row,
            Err(err) if err.is_io_error() => {
                warn!(error = %err, "I/O error while reading rows; stopping source");
                report.skipped_rows += 1;
                break;
            }
            Err(err) => {
                debug!(error = %err, "skipping malformed row");
                report.skipped_rows += 1;
                continue;
            }
        };

        let cell = |idx: usize| row.get(idx).unwrap_or("");
        records.push(Record {
            id: parse_id(cell(columns.id)),
            text: cell(columns.text).to_string(),
            is_inbound: parse_flag(cell(columns.inbound)),
            in_reply_to_id: parse_id(cell(columns.reply_to)),
        });
    }

    Ok((records, report))
}

/// Loads and concatenates every readable source.
pub fn load_records<P: AsRef<Path>>(paths: &[P]) -> (Vec<Record>, IngestReport) {
    let mut records = Vec::new();
    let mut report = IngestReport::default();

    for path in paths {
        let path = path.as_ref();
        let loaded = File::open(path)
            .map_err(FaqError::from)
            .and_then(read_records);
        match loaded {
            Ok((mut rows, part)) => {
                info!(path = %path.display(), records = rows.len(), "loaded source");
                report.absorb(&part);
                records.append(&mut rows);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not read source; skipping");
                report.sources += 1;
                report.skipped_sources += 1;
            }
        }
    }

    (records, report)
}
