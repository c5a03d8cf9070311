//! Core data models shared by the ingestion, retrieval and logging pipeline.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Date format used in log rows and daily file names.
pub const DATE_FORMAT: &str = "%d-%m-%Y";
/// Time format used in log rows.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Number of relevance annotations persisted per exchange.
pub const RELEVANCE_SLOTS: usize = 3;

/// A window of extracted document text tagged with the file it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    pub text: String,
    pub source_filename: String,
}

impl DocumentChunk {
    pub fn new(text: impl Into<String>, source_filename: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_filename: source_filename.into(),
        }
    }
}

/// A retrieval hit: the chunk, its position in the corpus, and its cosine score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub corpus_position: usize,
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// One completed question/answer exchange, as persisted by the log store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationExchange {
    pub resident_name: String,
    pub room: String,
    pub date: String,
    pub time: String,
    pub question: String,
    pub response: String,
    pub unique_files: Vec<String>,
    pub chunk_info: Vec<String>,
}

impl ConversationExchange {
    /// Builds an exchange whose `date` and `time` come from `now`.
    pub fn stamped(
        now: NaiveDateTime,
        resident_name: impl Into<String>,
        room: impl Into<String>,
        question: impl Into<String>,
        response: impl Into<String>,
        unique_files: Vec<String>,
        chunk_info: Vec<String>,
    ) -> Self {
        Self {
            resident_name: resident_name.into(),
            room: room.into(),
            date: now.format(DATE_FORMAT).to_string(),
            time: now.format(TIME_FORMAT).to_string(),
            question: question.into(),
            response: response.into(),
            unique_files,
            chunk_info,
        }
    }

    /// Relevance annotations truncated or padded with empty strings to
    /// exactly [`RELEVANCE_SLOTS`] entries.
    pub fn padded_chunk_info(&self) -> Vec<String> {
        let mut slots: Vec<String> = self
            .chunk_info
            .iter()
            .take(RELEVANCE_SLOTS)
            .cloned()
            .collect();
        slots.resize(RELEVANCE_SLOTS, String::new());
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn stamped_uses_day_month_year() {
        let ex = ConversationExchange::stamped(
            at(9, 5, 1),
            "Ann",
            "Kitchen",
            "q",
            "r",
            vec![],
            vec![],
        );
        assert_eq!(ex.date, "07-03-2024");
        assert_eq!(ex.time, "09:05:01");
    }

    #[test]
    fn chunk_info_padded_to_three() {
        let ex = ConversationExchange::stamped(
            at(9, 0, 0),
            "Ann",
            "Kitchen",
            "q",
            "r",
            vec![],
            vec!["a.md (chunk 1, score: 0.5000)".to_string()],
        );
        let padded = ex.padded_chunk_info();
        assert_eq!(padded.len(), 3);
        assert_eq!(padded[1], "");
        assert_eq!(padded[2], "");
    }

    #[test]
    fn chunk_info_truncated_to_three() {
        let mut ex =
            ConversationExchange::stamped(at(9, 0, 0), "Ann", "Kitchen", "q", "r", vec![], vec![]);
        ex.chunk_info = (0..5).map(|i| i.to_string()).collect();
        assert_eq!(ex.padded_chunk_info(), vec!["0", "1", "2"]);
    }
}
