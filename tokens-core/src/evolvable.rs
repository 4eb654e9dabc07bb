//! Evolvable token descriptors
//!
//! Reference data that changes over time (a valuation, a prospectus) is kept
//! in one descriptor owned by its maintainers. Value records never embed the
//! descriptor: they carry a pointer token type whose identifier is the
//! descriptor's linear id, and resolve it through the registry when needed.
//! Updating the descriptor therefore never touches the records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::error::TokenError;
use crate::id::{Party, UniqueIdentifier};
use crate::token_type::TokenType;

/// Reference data for a token type that evolves independently of its holders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolvableTokenType {
    /// Stable identity across versions
    pub linear_id: UniqueIdentifier,

    /// Parties allowed to update the descriptor
    pub maintainers: Vec<Party>,

    /// Fraction digits of amounts of the pointed-to token
    pub fraction_digits: u32,

    /// Free-form reference data
    pub attributes: BTreeMap<String, String>,

    /// Incremented on every update, starting at 1
    pub version: u64,
}

impl EvolvableTokenType {
    pub fn new(maintainers: Vec<Party>, fraction_digits: u32) -> Self {
        Self {
            linear_id: UniqueIdentifier::random(),
            maintainers,
            fraction_digits,
            attributes: BTreeMap::new(),
            version: 1,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The pointer token type that records should carry
    pub fn to_pointer(&self) -> TokenType {
        TokenType::pointer(&self.linear_id, self.fraction_digits)
    }

    pub fn is_maintainer(&self, party: &Party) -> bool {
        self.maintainers.contains(party)
    }
}

/// Arena of evolvable descriptors keyed by linear id
#[derive(Debug, Default)]
pub struct EvolvableTokenRegistry {
    descriptors: RwLock<HashMap<UniqueIdentifier, EvolvableTokenType>>,
}

impl EvolvableTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new descriptor and return the pointer to it
    pub fn create(&self, descriptor: EvolvableTokenType) -> Result<TokenType, TokenError> {
        if descriptor.maintainers.is_empty() {
            return Err(TokenError::Other(
                "An evolvable token type needs at least one maintainer".to_string(),
            ));
        }

        let mut descriptors = self
            .descriptors
            .write()
            .map_err(|e| TokenError::Other(format!("Failed to acquire lock: {}", e)))?;

        if descriptors.contains_key(&descriptor.linear_id) {
            return Err(TokenError::Other(format!(
                "Evolvable token type {} already exists",
                descriptor.linear_id
            )));
        }

        let pointer = descriptor.to_pointer();
        log::debug!("Created evolvable token type {}", descriptor.linear_id);
        descriptors.insert(descriptor.linear_id.clone(), descriptor);
        Ok(pointer)
    }

    /// Replace the reference data of a descriptor
    ///
    /// # Parameters
    /// * `linear_id` - The descriptor to update
    /// * `signer` - Must be one of the current maintainers
    /// * `update` - Called with a mutable copy; may change attributes and maintainers
    ///
    /// # Returns
    /// The new version of the descriptor
    pub fn update<F>(
        &self,
        linear_id: &UniqueIdentifier,
        signer: &Party,
        update: F,
    ) -> Result<EvolvableTokenType, TokenError>
    where
        F: FnOnce(&mut EvolvableTokenType),
    {
        let mut descriptors = self
            .descriptors
            .write()
            .map_err(|e| TokenError::Other(format!("Failed to acquire lock: {}", e)))?;

        let current = descriptors
            .get(linear_id)
            .ok_or_else(|| TokenError::EvolvableTokenNotFound(linear_id.to_string()))?;

        if !current.is_maintainer(signer) {
            return Err(TokenError::NotMaintainer(signer.to_string()));
        }

        let mut next = current.clone();
        update(&mut next);

        // Identity and precision are fixed for the lifetime of the descriptor
        next.linear_id = current.linear_id.clone();
        next.fraction_digits = current.fraction_digits;
        next.version = current.version + 1;

        if next.maintainers.is_empty() {
            return Err(TokenError::Other(
                "An evolvable token type needs at least one maintainer".to_string(),
            ));
        }

        log::debug!(
            "{} updated evolvable token type {} to version {}",
            signer,
            linear_id,
            next.version
        );
        descriptors.insert(linear_id.clone(), next.clone());
        Ok(next)
    }

    /// Current version of a descriptor
    pub fn get(&self, linear_id: &UniqueIdentifier) -> Result<EvolvableTokenType, TokenError> {
        let descriptors = self
            .descriptors
            .read()
            .map_err(|e| TokenError::Other(format!("Failed to acquire lock: {}", e)))?;

        descriptors
            .get(linear_id)
            .cloned()
            .ok_or_else(|| TokenError::EvolvableTokenNotFound(linear_id.to_string()))
    }

    /// Follow a pointer token type back to its current descriptor
    pub fn resolve(&self, token_type: &TokenType) -> Result<EvolvableTokenType, TokenError> {
        if !token_type.is_pointer() {
            return Err(TokenError::EvolvableTokenNotFound(format!(
                "{} is not a token pointer",
                token_type
            )));
        }
        let linear_id: UniqueIdentifier = token_type.identifier.parse()?;
        self.get(&linear_id)
    }
}
