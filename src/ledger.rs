//! Vote ledger: one vote per voter per category.
//!
//! Casting again in a category replaces the earlier choice. Validation and
//! the write are delegated to [`VoteStore::upsert_vote`] as a single atomic
//! step; the rules themselves live in [`Ballot::admit`].

use crate::error::{AwardError, AwardResult};
use crate::store::VoteStore;
use crate::types::*;
use std::sync::Arc;

/// A voter's request to choose `nominee_id` in `category_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub voter_id: VoterId,
    pub category_id: CategoryId,
    pub nominee_id: NomineeId,
}

impl Ballot {
    /// Check the ballot against the category and nominee as currently stored.
    /// Stores call this under the same guard as the write.
    pub fn admit(&self, category: Option<&Category>, nominee: Option<&Nominee>) -> AwardResult<()> {
        let category =
            category.ok_or_else(|| AwardError::CategoryNotFound(self.category_id.clone()))?;
        let nominee = nominee.ok_or_else(|| AwardError::NomineeNotFound(self.nominee_id.clone()))?;

        if nominee.category_id != category.id {
            return Err(AwardError::InvalidNomineeForCategory {
                nominee_id: nominee.id.clone(),
                category_id: category.id.clone(),
            });
        }

        if category.voting_locked {
            return Err(AwardError::CategoryLocked(category.id.clone()));
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct VoteLedger {
    store: Arc<dyn VoteStore>,
}

impl VoteLedger {
    pub fn new(store: Arc<dyn VoteStore>) -> Self {
        Self { store }
    }

    /// Cast or replace a vote. A storage conflict is retried once before
    /// being surfaced.
    pub async fn cast_vote(
        &self,
        voter_id: &str,
        category_id: &str,
        nominee_id: &str,
    ) -> AwardResult<CastVote> {
        let ballot = Ballot {
            voter_id: voter_id.to_string(),
            category_id: category_id.to_string(),
            nominee_id: nominee_id.to_string(),
        };

        let result = match self.store.upsert_vote(&ballot, chrono::Utc::now()).await {
            Err(AwardError::StorageConflict) => {
                tracing::warn!(voter_id, category_id, "Vote upsert conflicted, retrying once");
                self.store.upsert_vote(&ballot, chrono::Utc::now()).await
            }
            other => other,
        };

        match &result {
            Ok(cast) => tracing::info!(
                voter_id,
                category_id,
                nominee_id,
                action = ?cast.action,
                "Vote recorded"
            ),
            Err(AwardError::CategoryLocked(_)) => {
                tracing::info!(voter_id, category_id, "Vote rejected: category locked")
            }
            Err(e) => tracing::warn!(voter_id, category_id, nominee_id, "Vote rejected: {}", e),
        }

        result
    }

    /// Current vote of a voter in a category; `None` means they have not voted
    pub async fn get_vote(&self, voter_id: &str, category_id: &str) -> AwardResult<Option<Vote>> {
        self.store.get_vote(voter_id, category_id).await
    }
}
