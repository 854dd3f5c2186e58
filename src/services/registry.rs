use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::model::entry::{EntryKey, Failure, FailureCause};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FailureRecord {
    pub key: EntryKey,
    pub cause: FailureCause,
    pub message: String,
    pub attempts: u32,
    pub failed_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Keys(Vec<EntryKey>),
}

/// Failed entries of the most recent run, keyed by entry.
#[derive(Debug, Default, Clone)]
pub struct FailureRegistry {
    records: BTreeMap<EntryKey, FailureRecord>,
}

impl FailureRegistry {
    pub fn new() -> Self {
        FailureRegistry::default()
    }

    /// Replaces any earlier cause for the same key.
    pub fn record(&mut self, key: EntryKey, failure: &Failure) {
        let attempts = self.records.get(&key).map(|r| r.attempts).unwrap_or(0) + 1;
        self.records.insert(
            key.clone(),
            FailureRecord {
                key,
                cause: failure.cause,
                message: failure.message.clone(),
                attempts,
                failed_at: Local::now(),
            },
        );
    }

    pub fn clear(&mut self, key: &EntryKey) -> bool {
        self.records.remove(key).is_some()
    }

    pub fn clear_all(&mut self) {
        self.records.clear();
    }

    pub fn contains(&self, key: &EntryKey) -> bool {
        self.records.contains_key(key)
    }

    /// Registered keys matching the selection; unknown keys are dropped.
    pub fn select(&self, selection: &Selection) -> Vec<EntryKey> {
        match selection {
            Selection::All => self.records.keys().cloned().collect(),
            Selection::Keys(keys) => {
                let mut out: Vec<EntryKey> = keys
                    .iter()
                    .filter(|k| self.records.contains_key(k))
                    .cloned()
                    .collect();
                out.sort();
                out.dedup();
                out
            }
        }
    }

    pub fn list(&self) -> Vec<&FailureRecord> {
        self.records.values().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry::FieldKey;

    fn key(node: &str) -> EntryKey {
        EntryKey::new("p", FieldKey::title(node))
    }

    #[test]
    fn record_replaces_cause_and_counts_attempts() {
        let mut reg = FailureRegistry::new();
        reg.record(key("A"), &Failure::new(FailureCause::RateLimit, ""));
        reg.record(key("A"), &Failure::new(FailureCause::Authentication, "bad key"));

        assert_eq!(reg.len(), 1);
        let r = reg.list()[0];
        assert_eq!(r.cause, FailureCause::Authentication);
        assert_eq!(r.message, "bad key");
        assert_eq!(r.attempts, 2);
    }

    #[test]
    fn select_ignores_unregistered_keys() {
        let mut reg = FailureRegistry::new();
        reg.record(key("A"), &Failure::new(FailureCause::Service, "500"));
        reg.record(key("B"), &Failure::new(FailureCause::Service, "500"));

        let picked = reg.select(&Selection::Keys(vec![key("B"), key("Z"), key("B")]));
        assert_eq!(picked, vec![key("B")]);
        assert_eq!(reg.select(&Selection::All).len(), 2);

        assert!(reg.clear(&key("A")));
        assert!(!reg.contains(&key("A")));
    }
}
