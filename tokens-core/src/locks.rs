use serde::{Deserialize, Serialize};
use std::fmt;

use crate::criteria::{PageSpecification, TokenCriteria};
use crate::error::TokenError;
use crate::id::{LockId, StateRef};
use crate::states::{FungibleToken, StateAndRef};

/// Milliseconds since the Unix epoch
pub fn current_time_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// A soft lock held on one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationEntry {
    /// The record being reserved
    pub state_ref: StateRef,

    /// The selection that holds this reservation
    pub lock_id: LockId,

    /// When the reservation was taken (ms since the Unix epoch)
    pub acquired_at: u64,

    /// Soft expiry in milliseconds; `None` never expires
    pub timeout_ms: Option<u64>,
}

impl ReservationEntry {
    pub fn new(state_ref: StateRef, lock_id: LockId, acquired_at: u64, timeout_ms: Option<u64>) -> Self {
        Self {
            state_ref,
            lock_id,
            acquired_at,
            timeout_ms,
        }
    }

    /// Whether the reservation has lapsed at `now`
    pub fn is_expired(&self, now: u64) -> bool {
        match self.timeout_ms {
            Some(timeout) => now >= self.acquired_at.saturating_add(timeout),
            None => false,
        }
    }

    /// Whether this reservation stops `lock_id` from taking the record at `now`
    pub fn blocks(&self, lock_id: &LockId, now: u64) -> bool {
        &self.lock_id != lock_id && !self.is_expired(now)
    }
}

/// Result of an attempt to reserve a set of records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// Every record is now reserved under the requested lock id
    Reserved,

    /// Nothing was reserved; these records are held by another live lock
    /// or are no longer in the pool
    Conflict(Vec<StateRef>),
}

impl ReservationOutcome {
    pub fn is_reserved(&self) -> bool {
        matches!(self, ReservationOutcome::Reserved)
    }
}

/// Storage collaborator for token selection
///
/// Holds the pool of fungible records and the soft locks on them. The
/// selector never mutates the pool except through `try_reserve`, `release`
/// and `consume`.
pub trait TokenVault: Send + Sync + fmt::Debug {
    /// Add records to the pool
    ///
    /// # Returns
    /// Number of records that were not already present
    fn add_tokens(&self, tokens: &[StateAndRef<FungibleToken>]) -> Result<usize, TokenError>;

    /// Records matching `criteria` that carry no live reservation
    ///
    /// # Parameters
    /// * `criteria` - The filter to apply
    /// * `page` - Which slice of the ordered result to return
    ///
    /// # Returns
    /// Records in ascending `StateRef` order
    fn query_unreserved(
        &self,
        criteria: &TokenCriteria,
        page: PageSpecification,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError>;

    /// Records matching `criteria` whether reserved or not, in ascending `StateRef` order
    fn query_all(
        &self,
        criteria: &TokenCriteria,
        page: PageSpecification,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError>;

    /// Reserve every record in `refs` under `lock_id`, or none of them
    ///
    /// Records already held by `lock_id` are re-stamped. Expired reservations
    /// of other locks are treated as free and taken over.
    ///
    /// # Parameters
    /// * `refs` - The records to reserve
    /// * `lock_id` - The selection taking the reservation
    /// * `timeout_ms` - Soft expiry stamped on each reservation
    ///
    /// # Returns
    /// * `Reserved` - All records are now held by `lock_id`
    /// * `Conflict(refs)` - Nothing changed; `refs` are the records that blocked
    fn try_reserve(
        &self,
        refs: &[StateRef],
        lock_id: &LockId,
        timeout_ms: Option<u64>,
    ) -> Result<ReservationOutcome, TokenError>;

    /// Drop every reservation held by `lock_id`
    ///
    /// # Returns
    /// Number of reservations released
    fn release(&self, lock_id: &LockId) -> Result<usize, TokenError>;

    /// Drop the reservations `lock_id` holds on `refs`, leaving others untouched
    fn release_refs(&self, refs: &[StateRef], lock_id: &LockId) -> Result<usize, TokenError>;

    /// Live reservations held by `lock_id`
    fn reservations(&self, lock_id: &LockId) -> Result<Vec<ReservationEntry>, TokenError>;

    /// Remove spent records from the pool along with their reservations
    ///
    /// Every record must be held by `lock_id`; otherwise nothing is removed
    /// and a `Vault` error is returned.
    fn consume(&self, refs: &[StateRef], lock_id: &LockId) -> Result<usize, TokenError>;

    /// Delete reservations whose soft expiry has passed
    ///
    /// # Returns
    /// Number of reservations removed
    fn cleanup_expired(&self) -> Result<usize, TokenError>;
}

/// Guard over a reserved selection that releases it when dropped
#[derive(Debug)]
pub struct SoftLockGuard<'a, V: TokenVault + ?Sized> {
    /// The selection the reservations belong to
    lock_id: LockId,

    /// The reserved records
    states: Vec<StateAndRef<FungibleToken>>,

    /// The vault holding the reservations
    vault: &'a V,

    /// Whether the reservations were released or consumed already
    finished: bool,
}

impl<'a, V: TokenVault + ?Sized> SoftLockGuard<'a, V> {
    /// Wrap records already reserved under `lock_id`
    pub fn new(vault: &'a V, lock_id: LockId, states: Vec<StateAndRef<FungibleToken>>) -> Self {
        Self {
            lock_id,
            states,
            vault,
            finished: false,
        }
    }

    pub fn lock_id(&self) -> &LockId {
        &self.lock_id
    }

    pub fn states(&self) -> &[StateAndRef<FungibleToken>] {
        &self.states
    }

    pub fn state_refs(&self) -> Vec<StateRef> {
        self.states.iter().map(|s| s.state_ref).collect()
    }

    /// Spend the selected records
    ///
    /// # Returns
    /// The records that were removed from the pool
    pub fn commit(mut self) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        let refs = self.state_refs();
        self.vault.consume(&refs, &self.lock_id)?;
        self.finished = true;
        Ok(std::mem::take(&mut self.states))
    }

    /// Explicitly release the reservations before the guard is dropped
    pub fn release(&mut self) -> Result<usize, TokenError> {
        if self.finished {
            return Ok(0);
        }
        let released = self.vault.release(&self.lock_id)?;
        self.finished = true;
        Ok(released)
    }
}

impl<'a, V: TokenVault + ?Sized> Drop for SoftLockGuard<'a, V> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.vault.release(&self.lock_id) {
                log::warn!("Failed to release {} on drop: {}", self.lock_id, e);
            }
        }
    }
}
