use super::snapshot::StoreSnapshot;
use super::{CatalogStore, TallySnapshot, VoteStore};
use crate::error::{AwardError, AwardResult};
use crate::ledger::Ballot;
use crate::types::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// All tables, guarded together
#[derive(Debug, Clone, Default)]
struct Tables {
    categories: Vec<Category>,
    nominees: Vec<Nominee>,
    /// Keyed by (voter_id, category_id): at most one vote per key
    votes: HashMap<(VoterId, CategoryId), Vote>,
    next_seq: u64,
}

impl Tables {
    fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let next_seq = snapshot
            .nominees
            .iter()
            .map(|n| n.seq.saturating_add(1))
            .max()
            .unwrap_or(0);
        let votes = snapshot
            .votes
            .into_iter()
            .map(|v| ((v.voter_id.clone(), v.category_id.clone()), v))
            .collect();
        Self {
            categories: snapshot.categories,
            nominees: snapshot.nominees,
            votes,
            next_seq,
        }
    }

    fn to_snapshot(&self) -> StoreSnapshot {
        let mut votes: Vec<Vote> = self.votes.values().cloned().collect();
        votes.sort_by(|a, b| a.cast_at.cmp(&b.cast_at).then_with(|| a.id.cmp(&b.id)));
        StoreSnapshot::new(self.categories.clone(), self.nominees.clone(), votes)
    }

    fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    fn category_mut(&mut self, id: &str) -> Option<&mut Category> {
        self.categories.iter_mut().find(|c| c.id == id)
    }

    fn nominee(&self, id: &str) -> Option<&Nominee> {
        self.nominees.iter().find(|n| n.id == id)
    }
}

/// In-process store. Every operation runs under one `RwLock` over all
/// tables; with a data file configured each committed mutation is written
/// to disk before it becomes visible.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    data_file: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Volatile store, lost on restart
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            data_file: None,
        }
    }

    /// Store persisted to `path`. Loads the existing snapshot if there is one.
    pub async fn open(path: impl Into<PathBuf>) -> AwardResult<Self> {
        let path = path.into();
        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: StoreSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    AwardError::InvalidSnapshot(format!("{}: {}", path.display(), e))
                })?;
                snapshot.validate().map_err(AwardError::InvalidSnapshot)?;
                tracing::info!(
                    path = %path.display(),
                    categories = snapshot.categories.len(),
                    nominees = snapshot.nominees.len(),
                    votes = snapshot.votes.len(),
                    "Loaded data file"
                );
                Tables::from_snapshot(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No data file yet, starting empty");
                Tables::default()
            }
            Err(e) => {
                return Err(AwardError::StorageUnavailable(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            tables: RwLock::new(tables),
            data_file: Some(path),
        })
    }

    /// Apply `change` under the write guard. With a data file, the change is
    /// made on a copy that only replaces the live tables once written out.
    async fn commit<T: Send>(
        &self,
        change: impl FnOnce(&mut Tables) -> AwardResult<T> + Send,
    ) -> AwardResult<T> {
        let mut tables = self.tables.write().await;
        match &self.data_file {
            None => change(&mut tables),
            Some(path) => {
                let mut next = tables.clone();
                let out = change(&mut next)?;
                write_snapshot(path, &next.to_snapshot()).await?;
                *tables = next;
                Ok(out)
            }
        }
    }
}

/// Write to a sibling temp file, then rename over the target
async fn write_snapshot(path: &Path, snapshot: &StoreSnapshot) -> AwardResult<()> {
    let bytes = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| AwardError::StorageUnavailable(format!("Failed to encode snapshot: {}", e)))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let io_err = |e: std::io::Error| {
        tracing::error!(path = %path.display(), "Failed to write data file: {}", e);
        AwardError::StorageUnavailable(format!("Failed to write {}: {}", path.display(), e))
    };
    tokio::fs::write(&tmp, &bytes).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn upsert_vote(&self, ballot: &Ballot, now: Timestamp) -> AwardResult<CastVote> {
        self.commit(|tables| {
            ballot.admit(
                tables.category(&ballot.category_id),
                tables.nominee(&ballot.nominee_id),
            )?;

            let key = (ballot.voter_id.clone(), ballot.category_id.clone());
            let cast = match tables.votes.get_mut(&key) {
                Some(existing) => {
                    existing.nominee_id = ballot.nominee_id.clone();
                    existing.updated_at = now;
                    CastVote {
                        vote: existing.clone(),
                        action: VoteAction::Updated,
                    }
                }
                None => {
                    let vote = Vote {
                        id: new_id(),
                        voter_id: ballot.voter_id.clone(),
                        category_id: ballot.category_id.clone(),
                        nominee_id: ballot.nominee_id.clone(),
                        cast_at: now,
                        updated_at: now,
                    };
                    tables.votes.insert(key, vote.clone());
                    CastVote {
                        vote,
                        action: VoteAction::Created,
                    }
                }
            };
            Ok(cast)
        })
        .await
    }

    async fn get_vote(&self, voter_id: &str, category_id: &str) -> AwardResult<Option<Vote>> {
        let tables = self.tables.read().await;
        Ok(tables
            .votes
            .get(&(voter_id.to_string(), category_id.to_string()))
            .cloned())
    }

    async fn tally_snapshot(&self, category_id: &str) -> AwardResult<TallySnapshot> {
        let tables = self.tables.read().await;
        let category = tables
            .category(category_id)
            .cloned()
            .ok_or_else(|| AwardError::CategoryNotFound(category_id.to_string()))?;
        let nominees = tables
            .nominees
            .iter()
            .filter(|n| n.category_id == category_id)
            .cloned()
            .collect();
        let votes = tables
            .votes
            .values()
            .filter(|v| v.category_id == category_id)
            .cloned()
            .collect();

        Ok(TallySnapshot {
            category,
            nominees,
            votes,
        })
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_categories(&self) -> AwardResult<Vec<Category>> {
        Ok(self.tables.read().await.categories.clone())
    }

    async fn get_category(&self, id: &str) -> AwardResult<Option<Category>> {
        Ok(self.tables.read().await.category(id).cloned())
    }

    async fn insert_category(&self, new: NewCategory) -> AwardResult<Category> {
        let category = Category {
            id: new_id(),
            name: new.name,
            description: new.description,
            voting_locked: new.voting_locked,
            created_at: chrono::Utc::now(),
            updated_at: None,
        };
        let created = category.clone();
        self.commit(move |tables| {
            tables.categories.push(category);
            Ok(())
        })
        .await?;

        tracing::info!(category_id = %created.id, name = %created.name, "Category created");
        Ok(created)
    }

    async fn update_category(&self, id: &str, update: CategoryUpdate) -> AwardResult<Category> {
        let updated = self
            .commit(|tables| {
                let category = tables
                    .category_mut(id)
                    .ok_or_else(|| AwardError::CategoryNotFound(id.to_string()))?;
                if let Some(name) = update.name {
                    category.name = name;
                }
                if let Some(description) = update.description {
                    category.description = description;
                }
                if let Some(locked) = update.voting_locked {
                    category.voting_locked = locked;
                }
                category.updated_at = Some(chrono::Utc::now());
                Ok(category.clone())
            })
            .await?;

        tracing::info!(
            category_id = %updated.id,
            voting_locked = updated.voting_locked,
            "Category updated"
        );
        Ok(updated)
    }

    async fn delete_category(&self, id: &str) -> AwardResult<CategoryDeletion> {
        let deletion = self
            .commit(|tables| {
                let index = tables
                    .categories
                    .iter()
                    .position(|c| c.id == id)
                    .ok_or_else(|| AwardError::CategoryNotFound(id.to_string()))?;
                let category = tables.categories.remove(index);

                let nominees_before = tables.nominees.len();
                tables.nominees.retain(|n| n.category_id != id);
                let votes_before = tables.votes.len();
                tables.votes.retain(|(_, category_id), _| category_id != id);

                Ok(CategoryDeletion {
                    category,
                    deleted_nominees: nominees_before - tables.nominees.len(),
                    deleted_votes: votes_before - tables.votes.len(),
                })
            })
            .await?;

        tracing::info!(
            category_id = id,
            deleted_nominees = deletion.deleted_nominees,
            deleted_votes = deletion.deleted_votes,
            "Category deleted"
        );
        Ok(deletion)
    }

    async fn list_nominees(&self, category_id: Option<&str>) -> AwardResult<Vec<Nominee>> {
        let tables = self.tables.read().await;
        Ok(tables
            .nominees
            .iter()
            .filter(|n| match category_id {
                Some(c) => n.category_id == c,
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn get_nominee(&self, id: &str) -> AwardResult<Option<Nominee>> {
        Ok(self.tables.read().await.nominee(id).cloned())
    }

    async fn insert_nominee(&self, new: NewNominee) -> AwardResult<Nominee> {
        let nominee = self
            .commit(|tables| {
                if tables.category(&new.category_id).is_none() {
                    return Err(AwardError::CategoryNotFound(new.category_id.clone()));
                }
                let nominee = Nominee {
                    id: new_id(),
                    category_id: new.category_id,
                    name: new.name,
                    description: new.description,
                    image_url: new.image_url,
                    youtube_url: new.youtube_url,
                    seq: tables.next_seq,
                    created_at: chrono::Utc::now(),
                    updated_at: None,
                };
                tables.next_seq = nominee.seq.checked_add(1).ok_or_else(|| {
                    AwardError::StorageUnavailable("Nominee sequence exhausted".to_string())
                })?;
                tables.nominees.push(nominee.clone());
                Ok(nominee)
            })
            .await?;

        tracing::info!(
            nominee_id = %nominee.id,
            category_id = %nominee.category_id,
            "Nominee created"
        );
        Ok(nominee)
    }

    async fn update_nominee(&self, id: &str, update: NomineeUpdate) -> AwardResult<NomineeChange> {
        let change = self
            .commit(|tables| {
                if let Some(target) = &update.category_id {
                    if tables.category(target).is_none() {
                        return Err(AwardError::CategoryNotFound(target.clone()));
                    }
                }

                let nominee = tables
                    .nominees
                    .iter_mut()
                    .find(|n| n.id == id)
                    .ok_or_else(|| AwardError::NomineeNotFound(id.to_string()))?;
                let previous_category = nominee.category_id.clone();

                if let Some(category_id) = update.category_id {
                    nominee.category_id = category_id;
                }
                if let Some(name) = update.name {
                    nominee.name = name;
                }
                if let Some(description) = update.description {
                    nominee.description = description;
                }
                if let Some(image_url) = update.image_url {
                    nominee.image_url = image_url;
                }
                if let Some(youtube_url) = update.youtube_url {
                    nominee.youtube_url = youtube_url;
                }
                nominee.updated_at = Some(chrono::Utc::now());
                let nominee = nominee.clone();

                // Votes for a nominee that left the category no longer count there;
                // those voters can vote again.
                let mut invalidated_votes = 0;
                if nominee.category_id != previous_category {
                    let before = tables.votes.len();
                    tables.votes.retain(|(_, category_id), v| {
                        !(*category_id == previous_category && v.nominee_id == nominee.id)
                    });
                    invalidated_votes = before - tables.votes.len();
                }

                Ok(NomineeChange {
                    nominee,
                    invalidated_votes,
                })
            })
            .await?;

        if change.invalidated_votes > 0 {
            tracing::info!(
                nominee_id = id,
                invalidated_votes = change.invalidated_votes,
                "Nominee moved to another category, votes reset"
            );
        }
        Ok(change)
    }

    async fn delete_nominee(&self, id: &str) -> AwardResult<(Nominee, usize)> {
        let (nominee, deleted_votes) = self
            .commit(|tables| {
                let index = tables
                    .nominees
                    .iter()
                    .position(|n| n.id == id)
                    .ok_or_else(|| AwardError::NomineeNotFound(id.to_string()))?;
                let nominee = tables.nominees.remove(index);

                let before = tables.votes.len();
                tables.votes.retain(|_, v| v.nominee_id != id);
                Ok((nominee, before - tables.votes.len()))
            })
            .await?;

        tracing::info!(nominee_id = id, deleted_votes, "Nominee deleted");
        Ok((nominee, deleted_votes))
    }

    async fn export(&self) -> AwardResult<StoreSnapshot> {
        Ok(self.tables.read().await.to_snapshot())
    }

    async fn import(&self, snapshot: StoreSnapshot) -> AwardResult<()> {
        snapshot.validate().map_err(AwardError::InvalidSnapshot)?;
        let replacement = Tables::from_snapshot(snapshot);
        self.commit(move |tables| {
            *tables = replacement;
            Ok(())
        })
        .await?;

        tracing::info!("State imported from snapshot");
        Ok(())
    }
}
