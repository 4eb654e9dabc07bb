use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::{Party, PartyKey};
use crate::states::{FungibleToken, NonFungibleToken};
use crate::token_type::TokenType;

/// Default number of candidates fetched per vault query
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Declarative filter over value records
///
/// Criteria do not scan anything themselves; vaults evaluate them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenCriteria {
    pub token_type: TokenType,
    pub holder: Option<PartyKey>,
    pub issuer: Option<PartyKey>,
}

impl TokenCriteria {
    /// Records of a token type, any holder and any issuer
    pub fn by_token_type(token_type: TokenType) -> Self {
        Self {
            token_type,
            holder: None,
            issuer: None,
        }
    }

    /// Records of a token type held by `holder`
    pub fn by_token_type_and_holder(token_type: TokenType, holder: &Party) -> Self {
        Self::by_token_type(token_type).with_holder(holder)
    }

    /// Records of a token type issued by `issuer`
    pub fn by_token_type_and_issuer(token_type: TokenType, issuer: &Party) -> Self {
        Self::by_token_type(token_type).with_issuer(issuer)
    }

    pub fn with_holder(mut self, holder: &Party) -> Self {
        self.holder = Some(*holder.owning_key());
        self
    }

    pub fn with_issuer(mut self, issuer: &Party) -> Self {
        self.issuer = Some(*issuer.owning_key());
        self
    }

    fn matches_parts(&self, token_type: &TokenType, holder: &Party, issuer: &Party) -> bool {
        if &self.token_type != token_type {
            return false;
        }
        if let Some(key) = &self.holder {
            if holder.owning_key() != key {
                return false;
            }
        }
        if let Some(key) = &self.issuer {
            if issuer.owning_key() != key {
                return false;
            }
        }
        true
    }

    pub fn matches(&self, token: &FungibleToken) -> bool {
        self.matches_parts(token.token_type(), token.holder(), token.issuer())
    }

    pub fn matches_non_fungible(&self, token: &NonFungibleToken) -> bool {
        self.matches_parts(token.token_type(), token.holder(), token.issuer())
    }
}

impl fmt::Display for TokenCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token_type)?;
        if let Some(holder) = &self.holder {
            write!(f, " held by {}", holder)?;
        }
        if let Some(issuer) = &self.issuer {
            write!(f, " issued by {}", issuer)?;
        }
        Ok(())
    }
}

/// A page of a candidate query, numbered from zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpecification {
    pub number: usize,
    pub size: usize,
}

impl PageSpecification {
    pub fn new(number: usize, size: usize) -> Self {
        Self { number, size }
    }

    pub fn first(size: usize) -> Self {
        Self::new(0, size)
    }

    pub fn next(&self) -> Self {
        Self::new(self.number + 1, self.size)
    }

    /// Index of the first element of this page
    pub fn offset(&self) -> usize {
        self.number.saturating_mul(self.size)
    }
}

impl Default for PageSpecification {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}
