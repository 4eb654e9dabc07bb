//! In-memory token vault backed by `RwLock`-guarded maps.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::RwLock;

use tokens_core::criteria::{PageSpecification, TokenCriteria};
use tokens_core::error::TokenError;
use tokens_core::id::{LockId, StateRef};
use tokens_core::locks::{current_time_millis, ReservationEntry, ReservationOutcome, TokenVault};
use tokens_core::states::{FungibleToken, StateAndRef};

fn poisoned<E: fmt::Display>(e: E) -> TokenError {
    TokenError::Vault(format!("Failed to acquire lock: {}", e))
}

/// Process-local vault
///
/// Records are kept in a `BTreeMap` so iteration is already in `StateRef`
/// order. The reservation map is only written while its write lock is held
/// for the whole check-and-insert, which makes `try_reserve` atomic.
/// Locks are always taken records first, reservations second.
#[derive(Debug, Default)]
pub struct InMemoryTokenVault {
    /// All unspent records keyed by reference
    records: RwLock<BTreeMap<StateRef, StateAndRef<FungibleToken>>>,

    /// At most one reservation per record
    reservations: RwLock<HashMap<StateRef, ReservationEntry>>,
}

impl InMemoryTokenVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in the pool, reserved or not
    pub fn len(&self) -> Result<usize, TokenError> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, TokenError> {
        Ok(self.len()? == 0)
    }

    fn query(
        &self,
        criteria: &TokenCriteria,
        page: PageSpecification,
        include_reserved: bool,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        let records = self.records.read().map_err(poisoned)?;
        let reservations = self.reservations.read().map_err(poisoned)?;
        let now = current_time_millis();

        Ok(records
            .values()
            .filter(|s| criteria.matches(&s.state))
            .filter(|s| {
                include_reserved
                    || reservations
                        .get(&s.state_ref)
                        .map_or(true, |entry| entry.is_expired(now))
            })
            .skip(page.offset())
            .take(page.size)
            .cloned()
            .collect())
    }
}

impl TokenVault for InMemoryTokenVault {
    fn add_tokens(&self, tokens: &[StateAndRef<FungibleToken>]) -> Result<usize, TokenError> {
        let mut records = self.records.write().map_err(poisoned)?;
        let mut added = 0;
        for token in tokens {
            if records.insert(token.state_ref, token.clone()).is_none() {
                added += 1;
            }
        }
        log::debug!("Added {} records to the in-memory vault", added);
        Ok(added)
    }

    fn query_unreserved(
        &self,
        criteria: &TokenCriteria,
        page: PageSpecification,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        self.query(criteria, page, false)
    }

    fn query_all(
        &self,
        criteria: &TokenCriteria,
        page: PageSpecification,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        self.query(criteria, page, true)
    }

    fn try_reserve(
        &self,
        refs: &[StateRef],
        lock_id: &LockId,
        timeout_ms: Option<u64>,
    ) -> Result<ReservationOutcome, TokenError> {
        let records = self.records.read().map_err(poisoned)?;
        let mut reservations = self.reservations.write().map_err(poisoned)?;
        let now = current_time_millis();

        let conflicts: Vec<StateRef> = refs
            .iter()
            .filter(|&r| {
                !records.contains_key(r)
                    || reservations
                        .get(r)
                        .map_or(false, |entry| entry.blocks(lock_id, now))
            })
            .copied()
            .collect();

        if !conflicts.is_empty() {
            log::debug!("{} could not reserve {} records", lock_id, conflicts.len());
            return Ok(ReservationOutcome::Conflict(conflicts));
        }

        for r in refs {
            reservations.insert(*r, ReservationEntry::new(*r, lock_id.clone(), now, timeout_ms));
        }
        log::debug!("{} reserved {} records", lock_id, refs.len());
        Ok(ReservationOutcome::Reserved)
    }

    fn release(&self, lock_id: &LockId) -> Result<usize, TokenError> {
        let mut reservations = self.reservations.write().map_err(poisoned)?;
        let before = reservations.len();
        reservations.retain(|_, entry| &entry.lock_id != lock_id);
        let released = before - reservations.len();
        log::debug!("{} released {} records", lock_id, released);
        Ok(released)
    }

    fn release_refs(&self, refs: &[StateRef], lock_id: &LockId) -> Result<usize, TokenError> {
        let mut reservations = self.reservations.write().map_err(poisoned)?;
        let mut released = 0;
        for r in refs {
            if reservations.get(r).map_or(false, |entry| &entry.lock_id == lock_id) {
                reservations.remove(r);
                released += 1;
            }
        }
        Ok(released)
    }

    fn reservations(&self, lock_id: &LockId) -> Result<Vec<ReservationEntry>, TokenError> {
        let reservations = self.reservations.read().map_err(poisoned)?;
        let now = current_time_millis();
        let mut held: Vec<ReservationEntry> = reservations
            .values()
            .filter(|entry| &entry.lock_id == lock_id && !entry.is_expired(now))
            .cloned()
            .collect();
        held.sort_by_key(|entry| entry.state_ref);
        Ok(held)
    }

    fn consume(&self, refs: &[StateRef], lock_id: &LockId) -> Result<usize, TokenError> {
        let mut records = self.records.write().map_err(poisoned)?;
        let mut reservations = self.reservations.write().map_err(poisoned)?;
        let now = current_time_millis();

        let not_held = refs.iter().find(|&r| {
            !records.contains_key(r)
                || reservations
                    .get(r)
                    .map_or(true, |entry| &entry.lock_id != lock_id || entry.is_expired(now))
        });
        if let Some(r) = not_held {
            return Err(TokenError::Vault(format!("{} does not hold a reservation on {}", lock_id, r)));
        }

        for r in refs {
            records.remove(r);
            reservations.remove(r);
        }
        log::debug!("{} consumed {} records", lock_id, refs.len());
        Ok(refs.len())
    }

    fn cleanup_expired(&self) -> Result<usize, TokenError> {
        let mut reservations = self.reservations.write().map_err(poisoned)?;
        let now = current_time_millis();
        let before = reservations.len();
        reservations.retain(|_, entry| !entry.is_expired(now));
        let removed = before - reservations.len();
        if removed > 0 {
            log::info!("Removed {} expired reservations", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use tokens_core::amount::Amount;
    use tokens_core::id::Party;
    use tokens_core::token_type::TokenType;

    fn gbp() -> TokenType {
        TokenType::new("GBP", 2)
    }

    fn record(index: u32, pounds: i64) -> StateAndRef<FungibleToken> {
        let token = Amount::from_int(pounds, gbp())
            .unwrap()
            .issued_by(&Party::named("O=Bank"))
            .held_by(&Party::named("O=Alice"))
            .unwrap();
        StateAndRef::new(token, StateRef::from_seeds(&[b"memory"], index))
    }

    fn seeded(count: u32) -> (InMemoryTokenVault, Vec<StateRef>) {
        let vault = InMemoryTokenVault::new();
        let records: Vec<_> = (0..count).map(|i| record(i, 10)).collect();
        assert_eq!(vault.add_tokens(&records).unwrap(), count as usize);
        let mut refs: Vec<_> = records.iter().map(|r| r.state_ref).collect();
        refs.sort();
        (vault, refs)
    }

    #[test]
    fn test_add_is_idempotent() {
        let (vault, _) = seeded(3);
        let again: Vec<_> = (0..3).map(|i| record(i, 10)).collect();
        assert_eq!(vault.add_tokens(&again).unwrap(), 0);
        assert_eq!(vault.len().unwrap(), 3);
    }

    #[test]
    fn test_query_is_ordered_and_paged() {
        let (vault, refs) = seeded(5);
        let criteria = TokenCriteria::by_token_type(gbp());

        let first = vault.query_all(&criteria, PageSpecification::first(2)).unwrap();
        let second = vault.query_all(&criteria, PageSpecification::first(2).next()).unwrap();
        let got: Vec<_> = first.iter().chain(second.iter()).map(|s| s.state_ref).collect();
        assert_eq!(got, refs[..4].to_vec());

        let other = TokenCriteria::by_token_type(TokenType::new("USD", 2));
        assert!(vault.query_all(&other, PageSpecification::default()).unwrap().is_empty());
    }

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let (vault, refs) = seeded(3);
        let first = LockId::random();
        let second = LockId::random();

        assert!(vault.try_reserve(&refs[..2], &first, None).unwrap().is_reserved());

        // Overlaps on refs[1], so refs[2] must stay free
        let outcome = vault.try_reserve(&refs[1..], &second, None).unwrap();
        assert_eq!(outcome, ReservationOutcome::Conflict(vec![refs[1]]));
        assert!(vault.reservations(&second).unwrap().is_empty());

        let criteria = TokenCriteria::by_token_type(gbp());
        let free = vault.query_unreserved(&criteria, PageSpecification::default()).unwrap();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].state_ref, refs[2]);

        // Same lock again is fine
        assert!(vault.try_reserve(&refs[..2], &first, None).unwrap().is_reserved());
    }

    #[test]
    fn test_reserve_missing_record_conflicts() {
        let (vault, _) = seeded(1);
        let missing = StateRef::from_seeds(&[b"missing"], 0);
        let outcome = vault.try_reserve(&[missing], &LockId::random(), None).unwrap();
        assert_eq!(outcome, ReservationOutcome::Conflict(vec![missing]));
    }

    #[test]
    fn test_release_and_release_refs() {
        let (vault, refs) = seeded(3);
        let lock = LockId::random();
        vault.try_reserve(&refs, &lock, None).unwrap();

        assert_eq!(vault.release_refs(&refs[..1], &LockId::random()).unwrap(), 0);
        assert_eq!(vault.release_refs(&refs[..1], &lock).unwrap(), 1);
        assert_eq!(vault.reservations(&lock).unwrap().len(), 2);
        assert_eq!(vault.release(&lock).unwrap(), 2);
        assert!(vault.reservations(&lock).unwrap().is_empty());
    }

    #[test]
    fn test_expired_reservations_are_free() {
        let (vault, refs) = seeded(2);
        let stale = LockId::random();
        vault.try_reserve(&refs, &stale, Some(1)).unwrap();
        thread::sleep(Duration::from_millis(5));

        let criteria = TokenCriteria::by_token_type(gbp());
        assert_eq!(vault.query_unreserved(&criteria, PageSpecification::default()).unwrap().len(), 2);

        // Another lock takes over without anyone releasing
        let fresh = LockId::random();
        assert!(vault.try_reserve(&refs[..1], &fresh, None).unwrap().is_reserved());

        // Only the untouched stale entry is left to sweep
        assert_eq!(vault.cleanup_expired().unwrap(), 1);
        assert_eq!(vault.reservations(&fresh).unwrap().len(), 1);
    }

    #[test]
    fn test_consume_requires_reservation() {
        let (vault, refs) = seeded(3);
        let lock = LockId::random();
        vault.try_reserve(&refs[..2], &lock, None).unwrap();

        assert!(vault.consume(&refs, &lock).is_err());
        assert_eq!(vault.len().unwrap(), 3);

        assert_eq!(vault.consume(&refs[..2], &lock).unwrap(), 2);
        assert_eq!(vault.len().unwrap(), 1);
        assert!(vault.reservations(&lock).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_reservations_are_exclusive() {
        let (vault, refs) = seeded(50);
        let winners: Vec<Vec<StateRef>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let vault = &vault;
                    let refs = &refs;
                    s.spawn(move || {
                        let lock = LockId::random();
                        refs.iter()
                            .filter(|r| {
                                vault
                                    .try_reserve(std::slice::from_ref(*r), &lock, None)
                                    .unwrap()
                                    .is_reserved()
                            })
                            .copied()
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut all: Vec<StateRef> = winners.into_iter().flatten().collect();
        all.sort();
        assert_eq!(all, refs);
    }
}
