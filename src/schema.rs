use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A direct message as it arrives from the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub conversation_id: String,
    pub message_id: String,
    pub text: String,
    pub timestamp: String,
}

/// Everything a conversation sent during one quiet-period window.
#[derive(Debug, Clone)]
pub struct AggregatedMessage {
    pub batch_id: Uuid,
    pub conversation_id: String,
    pub text: String,
    pub message_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<String>,
}

/// Document counts keyed by category label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentStats {
    pub counts: BTreeMap<String, usize>,
}

impl DocumentStats {
    pub const UNCATEGORIZED: &'static str = "uncategorized";

    pub fn record(&mut self, category: Option<&str>) {
        let key = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(Self::UNCATEGORIZED);
        *self.counts.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: DocumentStats) {
        for (category, count) in other.counts {
            *self.counts.entry(category).or_insert(0) += count;
        }
    }

    pub fn get(&self, category: &str) -> usize {
        self.counts.get(category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}
