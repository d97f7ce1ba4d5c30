//! Bounded transcript history

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Most recent items kept: the last 50 plus the newest.
pub const TRANSCRIPT_CAPACITY: usize = 51;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptItem {
    pub id: String,
    pub text: String,
    pub sender: Speaker,
    pub timestamp: DateTime<Local>,
    pub is_final: bool,
}

/// Append-only log of transcript fragments, trimmed from the front.
///
/// Interim and final fragments are both kept; whitespace-only fragments are
/// dropped.
#[derive(Clone, Debug, Default)]
pub struct TranscriptLog {
    items: VecDeque<TranscriptItem>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TranscriptItem> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<TranscriptItem> {
        self.items.iter().cloned().collect()
    }

    /// Append a fragment. Returns the new item, or `None` if it was blank.
    pub fn push(&mut self, text: &str, sender: Speaker, is_final: bool) -> Option<TranscriptItem> {
        if text.trim().is_empty() {
            return None;
        }

        let item = TranscriptItem {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            sender,
            timestamp: Local::now(),
            is_final,
        };

        while self.items.len() >= TRANSCRIPT_CAPACITY {
            self.items.pop_front();
        }
        self.items.push_back(item.clone());
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_most_recent_items() {
        let mut log = TranscriptLog::new();
        for i in 0..60 {
            log.push(&format!("fragment {i}"), Speaker::User, false);
        }
        assert_eq!(log.len(), TRANSCRIPT_CAPACITY);
        assert_eq!(log.iter().next().unwrap().text, "fragment 9");
        assert_eq!(log.iter().last().unwrap().text, "fragment 59");
    }

    #[test]
    fn blank_fragments_are_skipped() {
        let mut log = TranscriptLog::new();
        assert!(log.push("  \n", Speaker::Model, true).is_none());
        assert!(log.push("", Speaker::User, false).is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn text_is_kept_verbatim_with_fresh_ids() {
        let mut log = TranscriptLog::new();
        let a = log.push(" cześć", Speaker::User, false).unwrap();
        let b = log.push(" cześć", Speaker::User, true).unwrap();
        assert_eq!(a.text, " cześć");
        assert_ne!(a.id, b.id);
        assert!(uuid::Uuid::parse_str(&a.id).is_ok());
        assert!(!a.is_final);
        assert!(b.is_final);
    }

    #[test]
    fn speaker_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Speaker::Model).unwrap(), "\"model\"");
    }
}
