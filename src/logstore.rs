//! Conversation log store.
//!
//! Every exchange is written to three daily files named from the exchange's
//! own date:
//!
//! | Sink | Path | Write mode |
//! |------|------|------------|
//! | tabular | `<logs_dir>/<date>_response_log.csv` | row append, header once |
//! | structured | `<logs_dir>/<date>_response_log.json` | whole-array rewrite |
//! | narrative | `<history_dir>/<date>_conversation_history.md` | append |
//!
//! All three writes for one exchange happen under a single lock, so appends
//! from concurrent requests in this process never interleave. History replay
//! reads only the tabular files.
//!
//! The `unique_files` cell of the tabular sink holds a JSON array of file
//! names. Older rows that join names with `" - "` are still read.

use std::cmp::Ordering;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{ConversationExchange, DATE_FORMAT, TIME_FORMAT};

pub const CSV_HEADER: [&str; 10] = [
    "resident_name",
    "room",
    "date",
    "time",
    "question",
    "response",
    "unique_files",
    "chunk1_score",
    "chunk2_score",
    "chunk3_score",
];

const CSV_SUFFIX: &str = "_response_log.csv";
const LEGACY_FILES_SEPARATOR: &str = " - ";

pub struct ConversationLog {
    logs_dir: PathBuf,
    history_dir: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CsvRow {
    resident_name: String,
    room: String,
    date: String,
    time: String,
    question: String,
    response: String,
    unique_files: String,
    chunk1_score: String,
    chunk2_score: String,
    chunk3_score: String,
}

impl From<CsvRow> for ConversationExchange {
    fn from(row: CsvRow) -> Self {
        let unique_files = parse_unique_files(&row.unique_files);
        ConversationExchange {
            resident_name: row.resident_name,
            room: row.room,
            date: row.date,
            time: row.time,
            question: row.question,
            response: row.response,
            unique_files,
            chunk_info: vec![row.chunk1_score, row.chunk2_score, row.chunk3_score],
        }
    }
}

impl ConversationLog {
    pub fn open(logs_dir: impl Into<PathBuf>, history_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            history_dir: history_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn csv_path(&self, date: &str) -> PathBuf {
        self.logs_dir.join(format!("{}{}", date, CSV_SUFFIX))
    }

    pub fn json_path(&self, date: &str) -> PathBuf {
        self.logs_dir.join(format!("{}_response_log.json", date))
    }

    pub fn markdown_path(&self, date: &str) -> PathBuf {
        self.history_dir
            .join(format!("{}_conversation_history.md", date))
    }

    /// Append one exchange to all three sinks.
    ///
    /// `chunk_info` is normalised to exactly three entries in the tabular and
    /// structured sinks.
    ///
    /// The structured array is staged in a temp file, then the tabular row is
    /// appended, then the array is committed and the narrative entry written.
    /// A failure before the commit leaves no sink changed.
    pub fn append(&self, exchange: &ConversationExchange) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("conversation log lock poisoned"))?;

        fs::create_dir_all(&self.logs_dir)
            .with_context(|| format!("Failed to create {}", self.logs_dir.display()))?;
        fs::create_dir_all(&self.history_dir)
            .with_context(|| format!("Failed to create {}", self.history_dir.display()))?;

        let mut normalized = exchange.clone();
        normalized.chunk_info = exchange.padded_chunk_info();

        let staged = self.stage_json(&normalized)?;
        if let Err(e) = self.append_csv(&normalized) {
            staged.discard();
            return Err(e);
        }
        staged.commit()?;
        self.append_markdown(&normalized)?;

        debug!(
            resident = %exchange.resident_name,
            date = %exchange.date,
            time = %exchange.time,
            "exchange logged"
        );
        Ok(())
    }

    fn append_csv(&self, exchange: &ConversationExchange) -> Result<()> {
        let path = self.csv_path(&exchange.date);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let is_new = file.metadata().map(|m| m.len() == 0).unwrap_or(true);

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(CSV_HEADER)?;
        }

        let unique_files = serde_json::to_string(&exchange.unique_files)?;
        let mut record = vec![
            exchange.resident_name.as_str(),
            exchange.room.as_str(),
            exchange.date.as_str(),
            exchange.time.as_str(),
            exchange.question.as_str(),
            exchange.response.as_str(),
            unique_files.as_str(),
        ];
        record.extend(exchange.chunk_info.iter().map(String::as_str));
        writer.write_record(&record)?;
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Read the day's array, append, and write the result to a temp file.
    /// A malformed existing file is logged and replaced on commit.
    fn stage_json(&self, exchange: &ConversationExchange) -> Result<StagedJson> {
        let path = self.json_path(&exchange.date);

        let mut entries: Vec<Value> = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "malformed JSON log, starting a new array");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        entries.push(serde_json::to_value(exchange)?);

        let mut body = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut body, formatter);
        serde::Serialize::serialize(&entries, &mut ser)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &body).with_context(|| format!("Failed to write {}", tmp.display()))?;
        Ok(StagedJson { tmp, path })
    }

    fn append_markdown(&self, exchange: &ConversationExchange) -> Result<()> {
        let path = self.markdown_path(&exchange.date);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        write!(
            file,
            "## Date: {} | Time: {}\n\n### Resident: {} | Room: {}\n\n**Question:** {}\n\n**House Spirit:** {}\n\n---\n\n",
            exchange.date,
            exchange.time,
            exchange.resident_name,
            exchange.room,
            exchange.question,
            exchange.response
        )
        .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Every logged exchange for `resident_name`, newest first.
    ///
    /// Scans all daily tabular files. Unreadable files are skipped with a
    /// warning. Rows whose date or time does not parse sort last.
    pub fn history_for(&self, resident_name: &str) -> Result<Vec<ConversationExchange>> {
        let entries = match fs::read_dir(&self.logs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.logs_dir.display()))
            }
        };

        let mut history = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(CSV_SUFFIX));
            if !is_log {
                continue;
            }
            match read_rows(&path) {
                Ok(rows) => history.extend(
                    rows.into_iter()
                        .filter(|row| row.resident_name == resident_name)
                        .map(ConversationExchange::from),
                ),
                Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable log"),
            }
        }

        history.sort_by(|a, b| match (timestamp(a), timestamp(b)) {
            (Some(ta), Some(tb)) => tb.cmp(&ta),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        Ok(history)
    }
}

/// A rewritten structured log waiting next to the file it replaces.
struct StagedJson {
    tmp: PathBuf,
    path: PathBuf,
}

impl StagedJson {
    fn commit(self) -> Result<()> {
        fs::rename(&self.tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))
    }

    fn discard(self) {
        if let Err(e) = fs::remove_file(&self.tmp) {
            warn!(file = %self.tmp.display(), error = %e, "could not remove staged log");
        }
    }
}

fn parse_unique_files(cell: &str) -> Vec<String> {
    if cell.is_empty() {
        return Vec::new();
    }
    if cell.starts_with('[') {
        if let Ok(files) = serde_json::from_str(cell) {
            return files;
        }
    }
    cell.split(LEGACY_FILES_SEPARATOR).map(str::to_string).collect()
}

fn read_rows(path: &Path) -> Result<Vec<CsvRow>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

fn timestamp(exchange: &ConversationExchange) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(&exchange.date, DATE_FORMAT).ok()?;
    let time = NaiveTime::parse_from_str(&exchange.time, TIME_FORMAT).ok()?;
    Some(date.and_time(time))
}
