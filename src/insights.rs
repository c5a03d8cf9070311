//! Conversation patterns for a resident.
//!
//! Counts rooms, keyword topics and time-of-day buckets over a resident's
//! logged exchanges. Used by `house patterns`.

use std::collections::BTreeMap;

use chrono::{NaiveTime, Timelike};

use crate::models::{ConversationExchange, TIME_FORMAT};
use crate::situation::TimeOfDay;

/// Topic name and the lowercase substrings that mark a question as about it.
const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    ("maintenance", &["repair", "fix", "broken", "maintain", "clean"]),
    ("comfort", &["temperature", "warm", "cold", "cozy", "comfortable"]),
    ("history", &["built", "past", "remember", "original", "story"]),
    ("garden", &["plant", "tree", "flower", "grow", "outdoor"]),
    ("energy", &["power", "electric", "heat", "solar", "efficiency"]),
];

#[derive(Debug, Default, PartialEq)]
pub struct ConversationPatterns {
    pub total: usize,
    pub favorite_rooms: BTreeMap<String, usize>,
    pub common_topics: BTreeMap<&'static str, usize>,
    pub conversation_times: BTreeMap<&'static str, usize>,
}

impl ConversationPatterns {
    /// Entries sorted by count descending, then by key.
    pub fn ranked<K: Ord + Clone>(counts: &BTreeMap<K, usize>) -> Vec<(K, usize)> {
        let mut entries: Vec<(K, usize)> =
            counts.iter().map(|(k, n)| (k.clone(), *n)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }
}

pub fn topics(question: &str) -> Vec<&'static str> {
    let lower = question.to_lowercase();
    TOPIC_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(topic, _)| *topic)
        .collect()
}

pub fn analyze(exchanges: &[ConversationExchange]) -> ConversationPatterns {
    let mut patterns = ConversationPatterns {
        total: exchanges.len(),
        ..Default::default()
    };

    for exchange in exchanges {
        if !exchange.room.is_empty() {
            *patterns
                .favorite_rooms
                .entry(exchange.room.clone())
                .or_default() += 1;
        }
        for topic in topics(&exchange.question) {
            *patterns.common_topics.entry(topic).or_default() += 1;
        }
        // Unparseable times are left out of the time buckets.
        if let Ok(time) = NaiveTime::parse_from_str(&exchange.time, TIME_FORMAT) {
            let period = TimeOfDay::from_hour(time.hour()).name();
            *patterns.conversation_times.entry(period).or_default() += 1;
        }
    }
    patterns
}
