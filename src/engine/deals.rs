//! Deal Store
//!
//! Owns every deal record. Only the lifecycle manager changes status; the
//! store itself only hands out ids and records.

use super::model::{Deal, DealId, DealStatus, UserId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct DealStore {
    deals: HashMap<DealId, Deal>,
}

impl DealStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next free id of the form `deal_<YYYYMMDDHHMMSS>_<creatorId>`.
    ///
    /// Same-second creations by the same creator get a `_<n>` suffix so ids
    /// never collide within this store.
    pub fn next_id(&self, creator: &UserId, now: DateTime<Utc>) -> DealId {
        let base = format!("deal_{}_{}", now.format("%Y%m%d%H%M%S"), creator);
        let candidate = DealId(base.clone());
        if !self.deals.contains_key(&candidate) {
            return candidate;
        }

        let mut n = 2u32;
        loop {
            let candidate = DealId(format!("{}_{}", base, n));
            if !self.deals.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn insert(&mut self, deal: Deal) {
        self.deals.insert(deal.id.clone(), deal);
    }

    pub fn get(&self, id: &DealId) -> Option<&Deal> {
        self.deals.get(id)
    }

    pub fn get_mut(&mut self, id: &DealId) -> Option<&mut Deal> {
        self.deals.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Deal> {
        self.deals.values()
    }

    /// Deals the user belongs to or was invited to, oldest first
    pub fn for_user(&self, user: &UserId) -> Vec<&Deal> {
        let mut deals: Vec<&Deal> = self
            .deals
            .values()
            .filter(|d| d.is_member(user) || d.is_invited(user))
            .collect();
        deals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        deals
    }

    /// Ids of non-terminal deals created strictly before `cutoff`
    pub fn stale_ids(&self, cutoff: DateTime<Utc>) -> Vec<DealId> {
        let mut ids: Vec<DealId> = self
            .deals
            .values()
            .filter(|d| !d.status.is_terminal())
            .filter(|d| d.created_at < cutoff)
            .map(|d| d.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn count_by_status(&self, status: DealStatus) -> usize {
        self.deals.values().filter(|d| d.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.deals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deals.is_empty()
    }
}
