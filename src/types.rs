use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type CategoryId = String;
pub type NomineeId = String;
pub type VoteId = String;
pub type VoterId = String;

pub type Timestamp = DateTime<Utc>;

/// Generate a new opaque record id
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// When true, the ledger rejects new or changed votes for this category
    #[serde(default)]
    pub voting_locked: bool,
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Nominee {
    pub id: NomineeId,
    pub category_id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub youtube_url: Option<String>,
    /// Creation order assigned by the store, used as the tabulation tie-break
    pub seq: u64,
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

/// Display subset of a nominee embedded in result rows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NomineeSummary {
    pub id: NomineeId,
    pub name: String,
    pub image_url: Option<String>,
}

impl From<&Nominee> for NomineeSummary {
    fn from(nominee: &Nominee) -> Self {
        Self {
            id: nominee.id.clone(),
            name: nominee.name.clone(),
            image_url: nominee.image_url.clone(),
        }
    }
}

/// A voter's current choice in one category. Unique per (voter_id, category_id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub id: VoteId,
    pub voter_id: VoterId,
    pub category_id: CategoryId,
    pub nominee_id: NomineeId,
    pub cast_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Created,
    Updated,
}

/// Outcome of a successful cast: the stored vote and whether it was new
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CastVote {
    #[serde(flatten)]
    pub vote: Vote,
    pub action: VoteAction,
}

/// Fields accepted when an administrator creates a category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub voting_locked: bool,
}

/// Partial category update; absent fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub voting_locked: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewNominee {
    pub category_id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub youtube_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NomineeUpdate {
    pub category_id: Option<CategoryId>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// `null` clears the link; an absent field keeps it
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_url: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub youtube_url: Option<Option<String>>,
}

/// Tell an explicit `null` (`Some(None)`) apart from a missing field (`None`)
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Result of deleting a category, including what the cascade removed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryDeletion {
    pub category: Category,
    pub deleted_nominees: usize,
    pub deleted_votes: usize,
}

/// Result of updating a nominee. `invalidated_votes` counts votes dropped
/// because the nominee moved to a different category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NomineeChange {
    pub nominee: Nominee,
    pub invalidated_votes: usize,
}
