//! Serializable snapshots of the stored state.
//!
//! Used for the `DATA_FILE` persistence and for the admin export/import
//! endpoints, so a running event can be backed up and restored.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Schema version for snapshot format compatibility
/// Version 1: categories, nominees (with creation seq) and votes
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// A serializable snapshot of every category, nominee and vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    /// Categories in creation order
    pub categories: Vec<Category>,
    /// Nominees in creation order
    pub nominees: Vec<Nominee>,
    #[serde(default)]
    pub votes: Vec<Vote>,
}

impl StoreSnapshot {
    /// Create a new snapshot with current timestamp
    pub fn new(categories: Vec<Category>, nominees: Vec<Nominee>, votes: Vec<Vote>) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            categories,
            nominees,
            votes,
        }
    }

    /// An empty snapshot
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }

    /// Validate the snapshot before import
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(format!(
                "Snapshot schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, SNAPSHOT_SCHEMA_VERSION
            ));
        }

        let mut category_ids = HashSet::new();
        for category in &self.categories {
            if !category_ids.insert(category.id.as_str()) {
                return Err(format!("Duplicate category id '{}'", category.id));
            }
        }

        let mut nominee_ids = HashSet::new();
        let mut seqs = HashSet::new();
        for nominee in &self.nominees {
            if !nominee_ids.insert(nominee.id.as_str()) {
                return Err(format!("Duplicate nominee id '{}'", nominee.id));
            }
            // The store hands out `seq + 1` next, so the top value is unusable
            if nominee.seq == u64::MAX {
                return Err(format!(
                    "Nominee '{}' has out-of-range creation seq {}",
                    nominee.id, nominee.seq
                ));
            }
            if !seqs.insert(nominee.seq) {
                return Err(format!(
                    "Nominee '{}' reuses creation seq {}",
                    nominee.id, nominee.seq
                ));
            }
            if !category_ids.contains(nominee.category_id.as_str()) {
                return Err(format!(
                    "Nominee '{}' references category '{}' which doesn't exist",
                    nominee.id, nominee.category_id
                ));
            }
        }

        // One vote per (voter, category), pointing at a nominee of that category
        let mut vote_keys = HashSet::new();
        for vote in &self.votes {
            if !vote_keys.insert((vote.voter_id.as_str(), vote.category_id.as_str())) {
                return Err(format!(
                    "Voter '{}' has more than one vote in category '{}'",
                    vote.voter_id, vote.category_id
                ));
            }
            let Some(nominee) = self.nominees.iter().find(|n| n.id == vote.nominee_id) else {
                return Err(format!(
                    "Vote '{}' references nominee '{}' which doesn't exist",
                    vote.id, vote.nominee_id
                ));
            };
            if nominee.category_id != vote.category_id {
                return Err(format!(
                    "Vote '{}' is for category '{}' but nominee '{}' belongs to '{}'",
                    vote.id, vote.category_id, nominee.id, nominee.category_id
                ));
            }
        }

        Ok(())
    }
}
