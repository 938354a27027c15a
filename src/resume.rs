//! "Continue watching" tracker
//!
//! Keeps at most `capacity` records, one per title, most recent first.
//! Persisted as a JSON array under [`RESUME_KEY`].

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{EpisodeRef, ResumeRecord};
use crate::store::{Store, RESUME_KEY};

pub const DEFAULT_CAPACITY: usize = 20;

/// Resume tracker over an injected store
#[derive(Clone)]
pub struct ResumeTracker {
    store: Arc<dyn Store>,
    capacity: usize,
}

impl ResumeTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_capacity(store, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(store: Arc<dyn Store>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record playback of `episode`, replacing any record for the same
    /// title and moving it to the front
    pub fn record(
        &self,
        title_id: &str,
        episode: &EpisodeRef,
        episode_label: &str,
        poster_url: &str,
        title_label: &str,
    ) -> Result<()> {
        let mut records = self.list();
        records.retain(|r| r.title_id != title_id);
        records.insert(
            0,
            ResumeRecord {
                title_id: title_id.to_string(),
                episode_ref: episode.clone(),
                episode_label: episode_label.to_string(),
                poster_url: poster_url.to_string(),
                title_label: title_label.to_string(),
                last_touched: Utc::now(),
            },
        );
        records.truncate(self.capacity);
        debug!(title_id, %episode, "recorded resume point");
        self.save(&records)
    }

    /// Records, most recent first
    ///
    /// Missing or unreadable data yields an empty list.
    pub fn list(&self) -> Vec<ResumeRecord> {
        let raw = match self.store.load(RESUME_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("failed to read resume records: {:#}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<ResumeRecord>>(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!("ignoring malformed resume records: {}", e);
                Vec::new()
            }
        }
    }

    /// Record for one title, if any
    pub fn get(&self, title_id: &str) -> Option<ResumeRecord> {
        self.list().into_iter().find(|r| r.title_id == title_id)
    }

    /// Remove every record pointing at `episode`
    pub fn remove(&self, episode: &EpisodeRef) -> Result<()> {
        let mut records = self.list();
        let before = records.len();
        records.retain(|r| &r.episode_ref != episode);
        if records.len() == before {
            return Ok(());
        }
        self.save(&records)
    }

    pub fn clear(&self) -> Result<()> {
        self.save(&[])
    }

    fn save(&self, records: &[ResumeRecord]) -> Result<()> {
        let json = serde_json::to_string(records)
            .map_err(|e| crate::error::StreamError::Storage(e.to_string()))?;
        self.store.save(RESUME_KEY, &json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn tracker() -> ResumeTracker {
        ResumeTracker::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_record_unshifts_new_titles() {
        let t = tracker();
        t.record("a", &"a?ep=1".into(), "EP 1", "pa", "A").unwrap();
        t.record("b", &"b?ep=1".into(), "EP 1", "pb", "B").unwrap();
        let list = t.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].title_id, "b");
        assert_eq!(list[1].title_id, "a");
    }

    #[test]
    fn test_record_same_title_moves_to_front() {
        let t = tracker();
        t.record("a", &"a?ep=1".into(), "EP 1", "pa", "A").unwrap();
        t.record("b", &"b?ep=1".into(), "EP 1", "pb", "B").unwrap();
        t.record("a", &"a?ep=2".into(), "EP 2", "pa", "A").unwrap();

        let list = t.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].title_id, "a");
        assert_eq!(list[0].episode_ref.as_str(), "a?ep=2");
        assert_eq!(list[0].episode_label, "EP 2");
    }

    #[test]
    fn test_remove_by_episode() {
        let t = tracker();
        t.record("a", &"a?ep=1".into(), "EP 1", "", "A").unwrap();
        t.record("b", &"b?ep=3".into(), "EP 3", "", "B").unwrap();
        t.remove(&"a?ep=1".into()).unwrap();
        let list = t.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title_id, "b");

        // Unknown episode is a no-op
        t.remove(&"zzz".into()).unwrap();
        assert_eq!(t.list().len(), 1);
    }

    #[test]
    fn test_malformed_store_reads_empty() {
        let store = Arc::new(MemoryStore::new());
        store.save(RESUME_KEY, "{not an array").unwrap();
        let t = ResumeTracker::new(store);
        assert!(t.list().is_empty());

        t.record("a", &"a?ep=1".into(), "EP 1", "", "A").unwrap();
        assert_eq!(t.list().len(), 1);
    }
}
