//! Bounded result histories kept in the status store

use std::collections::VecDeque;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::db::KeyValueStore;
use crate::error::Result;
use crate::models::{MonitorResult, HISTORY_LIMIT, VALUE_REPLACEMENT, VALUE_SIZE_LIMIT};

/// The most recent results, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History<T> {
    entries: VecDeque<T>,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_LIMIT + 1),
        }
    }
}

impl<T> History<T> {
    /// Empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, dropping the oldest ones beyond the limit
    pub fn push(&mut self, entry: T) {
        self.entries.push_back(entry);
        while self.entries.len() > HISTORY_LIMIT {
            self.entries.pop_front();
        }
    }

    /// Entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl History<MonitorResult> {
    /// Append a fetch result.
    ///
    /// Only the newest entry keeps a long value; the previous newest one has
    /// its value replaced by a placeholder once it is superseded.
    pub fn record(&mut self, result: MonitorResult) {
        if let Some(previous) = self.entries.back_mut() {
            if previous.value.len() > VALUE_SIZE_LIMIT {
                previous.value = VALUE_REPLACEMENT.to_string();
            }
        }
        self.push(result);
    }
}

impl<T: Serialize + DeserializeOwned> History<T> {
    /// Load the history stored under `key`. Unreadable data starts a fresh one.
    pub async fn load(store: &dyn KeyValueStore, key: &str) -> Result<Self> {
        let Some(raw) = store.load(key).await? else {
            return Ok(Self::new());
        };

        match serde_json::from_slice::<Self>(&raw) {
            Ok(mut history) => {
                while history.entries.len() > HISTORY_LIMIT {
                    history.entries.pop_front();
                }
                Ok(history)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable history");
                Ok(Self::new())
            }
        }
    }

    /// Persist under `key`
    pub async fn save(&self, store: &dyn KeyValueStore, key: &str) -> Result<()> {
        let raw = serde_json::to_vec(self)?;
        store.save(key, &raw).await
    }
}

impl<'a, T> IntoIterator for &'a History<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::MonitorStatus;
    use proptest::prelude::*;

    fn result(value: &str) -> MonitorResult {
        MonitorResult::now(MonitorStatus::Success, value)
    }

    #[test]
    fn test_long_value_replaced_once_superseded() {
        let long = "x".repeat(VALUE_SIZE_LIMIT + 1);
        let exact = "y".repeat(VALUE_SIZE_LIMIT);
        let mut history = History::new();

        history.record(result(&long));
        assert_eq!(history.latest().unwrap().value, long);

        history.record(result(&exact));
        history.record(result("z"));

        let values: Vec<&str> = history.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(values, vec![VALUE_REPLACEMENT, exact.as_str(), "z"]);
    }

    #[tokio::test]
    async fn test_load_and_save() {
        let store = MemoryStore::new();
        let mut history = History::<MonitorResult>::load(&store, "monitor:api").await.unwrap();
        assert!(history.is_empty());

        history.record(result("up"));
        history.save(&store, "monitor:api").await.unwrap();

        let loaded = History::<MonitorResult>::load(&store, "monitor:api").await.unwrap();
        assert_eq!(loaded, history);

        store.save("monitor:api", b"not json").await.unwrap();
        assert!(History::<MonitorResult>::load(&store, "monitor:api")
            .await
            .unwrap()
            .is_empty());
    }

    proptest! {
        #[test]
        fn prop_push_keeps_newest_entries(values in proptest::collection::vec(any::<u32>(), 0..20)) {
            let mut history = History::new();
            for v in &values {
                history.push(*v);
            }

            let expected: Vec<u32> = values.iter().rev().take(HISTORY_LIMIT).rev().copied().collect();
            prop_assert!(history.len() <= HISTORY_LIMIT);
            prop_assert_eq!(history.iter().copied().collect::<Vec<_>>(), expected);
        }

        #[test]
        fn prop_record_truncates_only_superseded_values(values in proptest::collection::vec("[a-z]{0,60}", 1..12)) {
            let mut history = History::new();
            for v in &values {
                history.record(result(v));
            }

            let stored: Vec<&MonitorResult> = history.iter().collect();
            prop_assert_eq!(stored.len(), values.len().min(HISTORY_LIMIT));

            let (newest, older) = stored.split_last().unwrap();
            prop_assert_eq!(&newest.value, values.last().unwrap());
            for entry in older {
                prop_assert!(entry.value.len() <= VALUE_SIZE_LIMIT || entry.value == VALUE_REPLACEMENT);
            }
        }
    }
}
