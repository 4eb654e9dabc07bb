use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::Amount;
use crate::error::TokenError;
use crate::id::{Party, StateRef, UniqueIdentifier};
use crate::token_type::{IssuedTokenType, TokenType};

/// A divisible quantity of an issued token held by a party
///
/// The quantity is always positive; zero-quantity tokens cannot be built,
/// including by deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "FungibleTokenRecord")]
pub struct FungibleToken {
    /// The amount of the issued token type this record represents
    amount: Amount<IssuedTokenType>,

    /// The party which has a claim on the issuer
    holder: Party,
}

impl FungibleToken {
    /// Create a new fungible token
    ///
    /// # Returns
    /// `InvalidQuantity` if the amount is zero
    pub fn new(amount: Amount<IssuedTokenType>, holder: Party) -> Result<Self, TokenError> {
        if amount.is_zero() {
            return Err(TokenError::InvalidQuantity(format!(
                "A fungible token of {} must have a positive quantity",
                amount.token
            )));
        }
        Ok(Self { amount, holder })
    }

    pub fn amount(&self) -> &Amount<IssuedTokenType> {
        &self.amount
    }

    pub fn holder(&self) -> &Party {
        &self.holder
    }

    pub fn issuer(&self) -> &Party {
        &self.amount.token.issuer
    }

    pub fn issued_token_type(&self) -> &IssuedTokenType {
        &self.amount.token
    }

    pub fn token_type(&self) -> &TokenType {
        &self.amount.token.token_type
    }

    /// Copy of this token with a new holder
    pub fn with_new_holder(&self, holder: Party) -> Self {
        Self {
            amount: self.amount.clone(),
            holder,
        }
    }
}

/// Wire shape of `FungibleToken`, checked through `FungibleToken::new`
#[derive(Deserialize)]
struct FungibleTokenRecord {
    amount: Amount<IssuedTokenType>,
    holder: Party,
}

impl TryFrom<FungibleTokenRecord> for FungibleToken {
    type Error = TokenError;

    fn try_from(record: FungibleTokenRecord) -> Result<Self, Self::Error> {
        FungibleToken::new(record.amount, record.holder)
    }
}

impl fmt::Display for FungibleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} held by {}", self.amount, self.holder)
    }
}

/// An indivisible, uniquely identified unit of an issued token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonFungibleToken {
    token: IssuedTokenType,
    holder: Party,
    linear_id: UniqueIdentifier,
}

impl NonFungibleToken {
    pub fn new(token: IssuedTokenType, holder: Party, linear_id: UniqueIdentifier) -> Self {
        Self {
            token,
            holder,
            linear_id,
        }
    }

    pub fn holder(&self) -> &Party {
        &self.holder
    }

    pub fn issuer(&self) -> &Party {
        &self.token.issuer
    }

    pub fn issued_token_type(&self) -> &IssuedTokenType {
        &self.token
    }

    pub fn token_type(&self) -> &TokenType {
        &self.token.token_type
    }

    pub fn linear_id(&self) -> &UniqueIdentifier {
        &self.linear_id
    }

    /// Copy of this token with a new holder; the linear id is kept
    pub fn with_new_holder(&self, holder: Party) -> Self {
        Self {
            token: self.token.clone(),
            holder,
            linear_id: self.linear_id.clone(),
        }
    }
}

impl fmt::Display for NonFungibleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) held by {}", self.token, self.linear_id, self.holder)
    }
}

/// A record as it sits in the pool: the state plus the reference that identifies it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateAndRef<S> {
    pub state: S,
    pub state_ref: StateRef,
}

impl<S> StateAndRef<S> {
    pub fn new(state: S, state_ref: StateRef) -> Self {
        Self { state, state_ref }
    }
}

impl Amount<IssuedTokenType> {
    /// Create a fungible token of this amount held by `holder`
    pub fn held_by(&self, holder: &Party) -> Result<FungibleToken, TokenError> {
        FungibleToken::new(self.clone(), holder.clone())
    }
}

impl IssuedTokenType {
    /// Create a non-fungible token of this type held by `holder`
    pub fn held_by(&self, holder: &Party, linear_id: UniqueIdentifier) -> NonFungibleToken {
        NonFungibleToken::new(self.clone(), holder.clone(), linear_id)
    }
}

/// Sum the amounts of a set of fungible records
///
/// # Returns
/// `None` for an empty set, an error if the records mix issued token types
pub fn sum_token_state_and_refs<'a, I>(states: I) -> Result<Option<Amount<IssuedTokenType>>, TokenError>
where
    I: IntoIterator<Item = &'a StateAndRef<FungibleToken>>,
{
    Amount::sum_or_none(states.into_iter().map(|s| s.state.amount.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gbp_from(issuer: &Party, value: i64) -> Amount<IssuedTokenType> {
        Amount::from_int(value, TokenType::new("GBP", 2))
            .unwrap()
            .issued_by(issuer)
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let bank = Party::named("O=Bank");
        let alice = Party::named("O=Alice");
        let result = gbp_from(&bank, 0).held_by(&alice);
        assert!(matches!(result, Err(TokenError::InvalidQuantity(_))));
    }

    #[test]
    fn test_zero_quantity_blob_rejected_on_read() {
        let bank = Party::named("O=Bank");
        let alice = Party::named("O=Alice");

        let token = gbp_from(&bank, 10).held_by(&alice).unwrap();
        let blob = bincode::serialize(&token).unwrap();
        assert_eq!(bincode::deserialize::<FungibleToken>(&blob).unwrap(), token);

        // Same layout as a token, with nothing in it
        let empty = bincode::serialize(&(gbp_from(&bank, 0), alice)).unwrap();
        assert!(bincode::deserialize::<FungibleToken>(&empty).is_err());
    }

    #[test]
    fn test_fungible_accessors() {
        let bank = Party::named("O=Bank");
        let alice = Party::named("O=Alice");
        let token = gbp_from(&bank, 10).held_by(&alice).unwrap();

        assert_eq!(token.holder(), &alice);
        assert_eq!(token.issuer(), &bank);
        assert_eq!(token.token_type(), &TokenType::new("GBP", 2));
        assert_eq!(token.amount().quantity, 1_000);
        assert_eq!(token.to_string(), "10.00 GBP held by O=Alice");

        let bob = Party::named("O=Bob");
        let moved = token.with_new_holder(bob.clone());
        assert_eq!(moved.holder(), &bob);
        assert_eq!(moved.amount(), token.amount());
    }

    #[test]
    fn test_non_fungible_keeps_linear_id() {
        let bank = Party::named("O=Bank");
        let alice = Party::named("O=Alice");
        let id = UniqueIdentifier::from_bytes([9u8; 16]);
        let house = TokenType::new("HOUSE", 0).issued_by(&bank).held_by(&alice, id.clone());

        let moved = house.with_new_holder(Party::named("O=Bob"));
        assert_eq!(moved.linear_id(), &id);
        assert_eq!(moved.issuer(), &bank);
    }

    #[test]
    fn test_sum_state_and_refs() {
        let bank = Party::named("O=Bank");
        let alice = Party::named("O=Alice");
        let states: Vec<_> = (1..=3)
            .map(|i| {
                StateAndRef::new(
                    gbp_from(&bank, i).held_by(&alice).unwrap(),
                    StateRef::from_seeds(&[b"issue"], i as u32),
                )
            })
            .collect();

        let total = sum_token_state_and_refs(&states).unwrap().unwrap();
        assert_eq!(total.quantity, 600);
        assert!(sum_token_state_and_refs(&Vec::new()).unwrap().is_none());
    }
}
