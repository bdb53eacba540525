use crate::models::{ConversationRecord, Source};

/// Narrows a snapshot before aggregation. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub sources: Vec<Source>,
    /// Matches records whose primary intent is one of these. Secondary intents are ignored.
    pub intents: Vec<String>,
    pub data_sources: Vec<String>,
    pub escalated: Option<bool>,
}

impl RecordFilter {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
            && self.intents.is_empty()
            && self.data_sources.is_empty()
            && self.escalated.is_none()
    }

    pub fn matches(&self, record: &ConversationRecord) -> bool {
        if !self.sources.is_empty() && !self.sources.contains(&record.source) {
            return false;
        }

        if !self.intents.is_empty()
            && !record
                .primary_intent()
                .is_some_and(|primary| self.intents.iter().any(|intent| intent == primary))
        {
            return false;
        }

        if !self.data_sources.is_empty() && !self.data_sources.contains(&record.data_source) {
            return false;
        }

        match self.escalated {
            Some(escalated) => record.escalated == escalated,
            None => true,
        }
    }

    pub fn apply(&self, records: &[ConversationRecord]) -> Vec<ConversationRecord> {
        records
            .iter()
            .filter(|record| self.matches(record))
            .cloned()
            .collect()
    }
}
