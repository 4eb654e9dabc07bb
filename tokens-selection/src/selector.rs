//! Optimistic token selection
//!
//! A selection pages through unreserved candidates in ascending `StateRef`
//! order, accumulates them until the required amount is covered, and then
//! asks the vault to reserve the whole set at once. Losing a race to another
//! selection is not an error: the selector backs off and looks again. No
//! lock is held across attempts, so selections over unrelated token types
//! and holders never wait on each other.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokens_core::amount::Amount;
use tokens_core::criteria::{PageSpecification, TokenCriteria};
use tokens_core::error::TokenError;
use tokens_core::id::{LockId, StateRef};
use tokens_core::locks::{ReservationOutcome, SoftLockGuard, TokenVault};
use tokens_core::states::{FungibleToken, StateAndRef};
use tokens_core::token_type::{IssuedTokenType, TokenType};

use crate::config::SelectionConfig;

/// Longest uninterrupted sleep while backing off
const BACKOFF_SLICE: Duration = Duration::from_millis(10);

/// Cooperative cancellation flag shared between a caller and a selection
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What one pass over the candidates gathered
struct Gathered {
    states: Vec<StateAndRef<FungibleToken>>,
    quantity: u128,
}

/// Bounds for one selection call
struct Budget<'a> {
    started: Instant,
    deadline: Option<Duration>,
    cancel: Option<&'a CancellationToken>,
}

impl Budget<'_> {
    fn check(&self, description: &str) -> Result<(), TokenError> {
        if self.cancel.map_or(false, |c| c.is_cancelled()) {
            return Err(TokenError::Cancelled(format!("Selection of {} was cancelled", description)));
        }
        if let Some(deadline) = self.deadline {
            if self.started.elapsed() >= deadline {
                return Err(TokenError::Cancelled(format!(
                    "Selection of {} exceeded its deadline of {} ms",
                    description,
                    deadline.as_millis()
                )));
            }
        }
        Ok(())
    }

    /// Sleep for `duration`, waking early to honour cancellation and the deadline
    fn sleep(&self, duration: Duration, description: &str) -> Result<(), TokenError> {
        let wake_at = Instant::now() + duration;
        loop {
            self.check(description)?;
            let now = Instant::now();
            if now >= wake_at {
                return Ok(());
            }
            thread::sleep((wake_at - now).min(BACKOFF_SLICE));
        }
    }
}

/// Selects and soft-locks fungible records from a vault
#[derive(Debug)]
pub struct TokenSelector<V: TokenVault> {
    vault: Arc<V>,
    config: SelectionConfig,
}

impl<V: TokenVault> Clone for TokenSelector<V> {
    fn clone(&self) -> Self {
        Self {
            vault: Arc::clone(&self.vault),
            config: self.config.clone(),
        }
    }
}

impl<V: TokenVault> TokenSelector<V> {
    /// Create a selector over `vault`
    ///
    /// # Returns
    /// `InvalidConfig` if `config` does not validate
    pub fn new(vault: Arc<V>, config: SelectionConfig) -> Result<Self, TokenError> {
        config.validate()?;
        Ok(Self { vault, config })
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Select records of one issued token type covering `required`
    ///
    /// # Parameters
    /// * `required` - The amount to cover; its token type and issuer are
    ///   added to `criteria`
    /// * `criteria` - Further filters, typically the holder
    /// * `lock_id` - The reservation owner for the selected records
    ///
    /// # Returns
    /// Records whose sum is at least `required`, all reserved under `lock_id`
    pub fn select_tokens(
        &self,
        required: &Amount<IssuedTokenType>,
        criteria: &TokenCriteria,
        lock_id: &LockId,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        self.select_tokens_inner(required, criteria, lock_id, None)
    }

    /// `select_tokens` that stops early once `cancel` is triggered
    pub fn select_tokens_cancellable(
        &self,
        required: &Amount<IssuedTokenType>,
        criteria: &TokenCriteria,
        lock_id: &LockId,
        cancel: &CancellationToken,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        self.select_tokens_inner(required, criteria, lock_id, Some(cancel))
    }

    /// Select records of a token type from any issuer covering `required`
    pub fn select_tokens_any_issuer(
        &self,
        required: &Amount<TokenType>,
        criteria: &TokenCriteria,
        lock_id: &LockId,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        self.select_tokens_any_issuer_inner(required, criteria, lock_id, None)
    }

    /// `select_tokens_any_issuer` that stops early once `cancel` is triggered
    pub fn select_tokens_any_issuer_cancellable(
        &self,
        required: &Amount<TokenType>,
        criteria: &TokenCriteria,
        lock_id: &LockId,
        cancel: &CancellationToken,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        self.select_tokens_any_issuer_inner(required, criteria, lock_id, Some(cancel))
    }

    /// Select records and hand them back under a guard that releases them on drop
    pub fn select_scoped(
        &self,
        required: &Amount<IssuedTokenType>,
        criteria: &TokenCriteria,
        lock_id: LockId,
    ) -> Result<SoftLockGuard<'_, V>, TokenError> {
        let states = self.select_tokens(required, criteria, &lock_id)?;
        Ok(SoftLockGuard::new(self.vault.as_ref(), lock_id, states))
    }

    /// Free every reservation held under `lock_id`
    pub fn release(&self, lock_id: &LockId) -> Result<usize, TokenError> {
        self.vault.release(lock_id)
    }

    fn select_tokens_inner(
        &self,
        required: &Amount<IssuedTokenType>,
        criteria: &TokenCriteria,
        lock_id: &LockId,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        let issued = &required.token;
        let criteria = Self::fold_token_type(criteria, &issued.token_type)?
            .with_issuer(&issued.issuer);
        self.select_quantity(required.quantity, &required.to_string(), &criteria, lock_id, cancel)
    }

    fn select_tokens_any_issuer_inner(
        &self,
        required: &Amount<TokenType>,
        criteria: &TokenCriteria,
        lock_id: &LockId,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        let criteria = Self::fold_token_type(criteria, &required.token)?;
        self.select_quantity(required.quantity, &required.to_string(), &criteria, lock_id, cancel)
    }

    fn fold_token_type(criteria: &TokenCriteria, token_type: &TokenType) -> Result<TokenCriteria, TokenError> {
        if &criteria.token_type != token_type {
            return Err(TokenError::TypeMismatch {
                left: criteria.token_type.to_string(),
                right: token_type.to_string(),
            });
        }
        Ok(criteria.clone())
    }

    fn select_quantity(
        &self,
        required: u128,
        description: &str,
        criteria: &TokenCriteria,
        lock_id: &LockId,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<StateAndRef<FungibleToken>>, TokenError> {
        // Didn't need to select any tokens
        if required == 0 {
            return Ok(Vec::new());
        }

        let budget = Budget {
            started: Instant::now(),
            deadline: self.config.deadline(),
            cancel,
        };

        for attempt in 1..=self.config.max_retries {
            budget.check(description)?;
            log::debug!("{} selecting {} (attempt {})", lock_id, description, attempt);

            let gathered = self.gather_unreserved(required, criteria)?;
            if gathered.quantity >= required {
                let refs: Vec<StateRef> = gathered.states.iter().map(|s| s.state_ref).collect();
                match self
                    .vault
                    .try_reserve(&refs, lock_id, self.config.soft_lock_timeout_ms)?
                {
                    ReservationOutcome::Reserved => {
                        log::debug!(
                            "{} selected {} records for {} on attempt {}",
                            lock_id,
                            refs.len(),
                            description,
                            attempt
                        );
                        return Ok(gathered.states);
                    }
                    ReservationOutcome::Conflict(lost) => {
                        log::warn!(
                            "{} lost the race for {} records while selecting {}",
                            lock_id,
                            lost.len(),
                            description
                        );
                    }
                }
            } else {
                // No point in retrying if there will never be enough
                let available = self.available_including_reserved(criteria, lock_id)?;
                if available < required {
                    log::warn!("Insufficient spendable states identified for {}", description);
                    return Err(TokenError::InsufficientBalance(description.to_string()));
                }
                log::warn!(
                    "{} found enough for {} only when counting records reserved elsewhere (attempt {})",
                    lock_id,
                    description,
                    attempt
                );
            }

            if attempt < self.config.max_retries {
                let backoff = self.config.backoff(attempt, rand::random::<f64>());
                budget.sleep(backoff, description)?;
            }
        }

        log::warn!("Insufficient not locked spendable states identified for {}", description);
        Err(TokenError::SelectionContention(description.to_string()))
    }

    /// First-fit pass over unreserved candidates, stopping once `required` is covered
    ///
    /// The unreserved view can shift between pages as other selections
    /// reserve and release, so a record may show up on two pages. Each
    /// record is counted once.
    fn gather_unreserved(&self, required: u128, criteria: &TokenCriteria) -> Result<Gathered, TokenError> {
        let mut gathered = Gathered {
            states: Vec::new(),
            quantity: 0,
        };
        let mut seen: HashSet<StateRef> = HashSet::new();
        let mut page = PageSpecification::first(self.config.page_size);

        loop {
            let batch = self.vault.query_unreserved(criteria, page)?;
            let exhausted = batch.len() < page.size;

            for state in batch {
                if !seen.insert(state.state_ref) {
                    log::trace!("{} already gathered, skipping", state.state_ref);
                    continue;
                }
                gathered.quantity = gathered
                    .quantity
                    .checked_add(state.state.amount().quantity)
                    .ok_or_else(|| TokenError::Overflow("Selected quantity overflowed".to_string()))?;
                gathered.states.push(state);
                if gathered.quantity >= required {
                    return Ok(gathered);
                }
            }

            if exhausted {
                return Ok(gathered);
            }
            page = page.next();
        }
    }

    /// Total of matching records, counting those reserved by other locks
    /// but not those already held by `lock_id`
    fn available_including_reserved(&self, criteria: &TokenCriteria, lock_id: &LockId) -> Result<u128, TokenError> {
        let own: Vec<StateRef> = self
            .vault
            .reservations(lock_id)?
            .into_iter()
            .map(|entry| entry.state_ref)
            .collect();

        let mut counted: HashSet<StateRef> = own.into_iter().collect();
        let mut total: u128 = 0;
        let mut page = PageSpecification::first(self.config.page_size);
        loop {
            let batch = self.vault.query_all(criteria, page)?;
            let exhausted = batch.len() < page.size;
            for state in batch.iter().filter(|s| counted.insert(s.state_ref)) {
                total = total.saturating_add(state.state.amount().quantity);
            }
            if exhausted {
                return Ok(total);
            }
            page = page.next();
        }
    }
}
