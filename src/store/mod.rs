//! Storage seams for categories, nominees and votes.
//!
//! The ledger and tabulator only see [`VoteStore`]; administrative CRUD and
//! snapshot handling go through [`CatalogStore`]. [`MemoryStore`] implements
//! both over a single lock so vote upserts are atomic with respect to
//! category and nominee changes.

mod memory;
pub mod snapshot;

pub use memory::MemoryStore;
pub use snapshot::StoreSnapshot;

use crate::error::AwardResult;
use crate::ledger::Ballot;
use crate::types::*;
use async_trait::async_trait;

/// Everything the tabulator needs for one category, read under one guard
#[derive(Debug, Clone)]
pub struct TallySnapshot {
    pub category: Category,
    /// Nominees of the category in creation order
    pub nominees: Vec<Nominee>,
    pub votes: Vec<Vote>,
}

/// Vote ledger storage: atomic upsert and consistent reads
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Validate the ballot against the current category and nominee and
    /// insert-or-replace the vote keyed by (voter_id, category_id), as one
    /// atomic step.
    async fn upsert_vote(&self, ballot: &Ballot, now: Timestamp) -> AwardResult<CastVote>;

    /// Look up a voter's current vote in a category
    async fn get_vote(&self, voter_id: &str, category_id: &str) -> AwardResult<Option<Vote>>;

    /// Read a category together with its nominees and votes
    async fn tally_snapshot(&self, category_id: &str) -> AwardResult<TallySnapshot>;
}

/// Administrative access to categories and nominees
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_categories(&self) -> AwardResult<Vec<Category>>;

    async fn get_category(&self, id: &str) -> AwardResult<Option<Category>>;

    async fn insert_category(&self, new: NewCategory) -> AwardResult<Category>;

    async fn update_category(&self, id: &str, update: CategoryUpdate) -> AwardResult<Category>;

    /// Delete a category along with its nominees and votes
    async fn delete_category(&self, id: &str) -> AwardResult<CategoryDeletion>;

    /// List nominees in creation order, optionally restricted to one category
    async fn list_nominees(&self, category_id: Option<&str>) -> AwardResult<Vec<Nominee>>;

    async fn get_nominee(&self, id: &str) -> AwardResult<Option<Nominee>>;

    async fn insert_nominee(&self, new: NewNominee) -> AwardResult<Nominee>;

    /// Update a nominee. Moving it to another category drops the votes cast
    /// for it in the old category.
    async fn update_nominee(&self, id: &str, update: NomineeUpdate) -> AwardResult<NomineeChange>;

    /// Delete a nominee and the votes cast for it; returns the number of votes removed
    async fn delete_nominee(&self, id: &str) -> AwardResult<(Nominee, usize)>;

    /// Full snapshot of the stored state
    async fn export(&self) -> AwardResult<StoreSnapshot>;

    /// Replace the stored state with a validated snapshot
    async fn import(&self, snapshot: StoreSnapshot) -> AwardResult<()>;
}
