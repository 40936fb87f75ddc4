//! Per-category results computed fresh from the vote ledger.
//!
//! Winners are every nominee whose count equals the maximum observed count,
//! so a shared maximum is reported as a tie regardless of row order.

use crate::error::AwardResult;
use crate::store::{TallySnapshot, VoteStore};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultRow {
    pub nominee_id: NomineeId,
    pub vote_count: u32,
    /// `vote_count / max_votes * 100`
    pub percentage: f64,
    pub is_winner: bool,
    pub nominee: Option<NomineeSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryResults {
    pub category_id: CategoryId,
    pub voting_locked: bool,
    pub total_votes: u32,
    pub max_votes: u32,
    /// More than one nominee reached `max_votes`
    pub tie: bool,
    pub winners: Vec<NomineeId>,
    /// Descending by count, ties broken by nominee creation order
    pub results: Vec<ResultRow>,
}

impl CategoryResults {
    /// True when exactly one nominee holds the maximum
    pub fn sole_winner(&self) -> Option<&NomineeId> {
        match self.winners.as_slice() {
            [winner] => Some(winner),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Tabulator {
    store: Arc<dyn VoteStore>,
}

impl Tabulator {
    pub fn new(store: Arc<dyn VoteStore>) -> Self {
        Self { store }
    }

    /// Compute results for a category from one consistent snapshot of its votes
    pub async fn compute_results(&self, category_id: &str) -> AwardResult<CategoryResults> {
        let snapshot = self.store.tally_snapshot(category_id).await?;
        Ok(tabulate(&snapshot))
    }
}

/// Group votes by nominee and derive winners
pub fn tabulate(snapshot: &TallySnapshot) -> CategoryResults {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for vote in &snapshot.votes {
        *counts.entry(vote.nominee_id.as_str()).or_insert(0) += 1;
    }

    let nominees: HashMap<&str, &Nominee> = snapshot
        .nominees
        .iter()
        .map(|n| (n.id.as_str(), n))
        .collect();

    // Unknown nominees sort after every known one
    let order_key = |id: &str| nominees.get(id).map(|n| n.seq).unwrap_or(u64::MAX);

    let mut tallies: Vec<(&str, u32)> = counts.into_iter().collect();
    tallies.sort_by(|(a_id, a_count), (b_id, b_count)| {
        b_count
            .cmp(a_count)
            .then_with(|| order_key(*a_id).cmp(&order_key(*b_id)))
            .then_with(|| a_id.cmp(b_id))
    });

    let max_votes = tallies.iter().map(|(_, count)| *count).max().unwrap_or(0);
    let total_votes = tallies.iter().map(|(_, count)| *count).sum();

    let results: Vec<ResultRow> = tallies
        .into_iter()
        .map(|(id, vote_count)| ResultRow {
            nominee_id: id.to_string(),
            vote_count,
            percentage: percentage(vote_count, max_votes),
            is_winner: max_votes > 0 && vote_count == max_votes,
            nominee: nominees.get(id).map(|n| NomineeSummary::from(*n)),
        })
        .collect();

    let winners: Vec<NomineeId> = results
        .iter()
        .filter(|r| r.is_winner)
        .map(|r| r.nominee_id.clone())
        .collect();

    CategoryResults {
        category_id: snapshot.category.id.clone(),
        voting_locked: snapshot.category.voting_locked,
        total_votes,
        max_votes,
        tie: winners.len() > 1,
        winners,
        results,
    }
}

/// Share of the leading count, 0 when nobody has voted
pub fn percentage(vote_count: u32, max_votes: u32) -> f64 {
    if max_votes == 0 {
        return 0.0;
    }
    f64::from(vote_count) / f64::from(max_votes) * 100.0
}
