//! Builder for fungible amounts and records
//!
//! Setters may be called in any order. Terminal calls validate the fields
//! they need in a fixed order (amount, token type, issuer, holder) and fail
//! naming the first one that is missing. Terminals only read the staged
//! fields, so calling one twice gives the same result.

use tokens_core::amount::Amount;
use tokens_core::error::{BuilderField, TokenError};
use tokens_core::id::Party;
use tokens_core::registry;
use tokens_core::states::FungibleToken;
use tokens_core::token_type::{IssuedTokenType, TokenType};

use crate::staging::{require, stage, AmountValue, SetterPolicy};

#[derive(Debug, Clone)]
pub struct FungibleTokenBuilder {
    policy: SetterPolicy,
    amount: Option<AmountValue>,
    token_type: Option<TokenType>,
    issuer: Option<Party>,
    holder: Option<Party>,
}

impl Default for FungibleTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FungibleTokenBuilder {
    /// A builder that rejects repeated setters
    pub fn new() -> Self {
        Self::with_policy(SetterPolicy::Strict)
    }

    pub fn with_policy(policy: SetterPolicy) -> Self {
        Self {
            policy,
            amount: None,
            token_type: None,
            issuer: None,
            holder: None,
        }
    }

    pub fn policy(&self) -> SetterPolicy {
        self.policy
    }

    /// Stage the amount as an integer, float or decimal value
    pub fn with_amount(&mut self, value: impl Into<AmountValue>) -> Result<&mut Self, TokenError> {
        stage(&mut self.amount, value.into(), BuilderField::Amount, self.policy)?;
        Ok(self)
    }

    pub fn of_token_type(&mut self, token_type: TokenType) -> Result<&mut Self, TokenError> {
        stage(&mut self.token_type, token_type, BuilderField::TokenType, self.policy)?;
        Ok(self)
    }

    /// Stage the token type registered for a currency code such as "GBP" or "BTC"
    pub fn of_currency_code(&mut self, code: &str) -> Result<&mut Self, TokenError> {
        let token_type = registry::lookup(code)?;
        self.of_token_type(token_type)
    }

    pub fn issued_by(&mut self, issuer: &Party) -> Result<&mut Self, TokenError> {
        stage(&mut self.issuer, issuer.clone(), BuilderField::Issuer, self.policy)?;
        Ok(self)
    }

    pub fn held_by(&mut self, holder: &Party) -> Result<&mut Self, TokenError> {
        stage(&mut self.holder, holder.clone(), BuilderField::Holder, self.policy)?;
        Ok(self)
    }

    /// Requires amount and token type
    pub fn build_amount_of_token_type(&self) -> Result<Amount<TokenType>, TokenError> {
        let amount = require(&self.amount, BuilderField::Amount)?;
        let token_type = require(&self.token_type, BuilderField::TokenType)?;
        amount.to_amount(token_type.clone())
    }

    /// Requires amount, token type and issuer
    pub fn build_amount_of_issued_token_type(&self) -> Result<Amount<IssuedTokenType>, TokenError> {
        let amount = require(&self.amount, BuilderField::Amount)?;
        let token_type = require(&self.token_type, BuilderField::TokenType)?;
        let issuer = require(&self.issuer, BuilderField::Issuer)?;
        amount.to_amount(IssuedTokenType::new(issuer.clone(), token_type.clone()))
    }

    /// Requires every field
    pub fn build_fungible_token(&self) -> Result<FungibleToken, TokenError> {
        let amount = self.build_amount_of_issued_token_type()?;
        let holder = require(&self.holder, BuilderField::Holder)?;
        FungibleToken::new(amount, holder.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use rust_decimal::Decimal;

    #[test]
    fn test_build_full_token() {
        let bank = Party::named("O=Bank");
        let alice = Party::named("O=Alice");

        // Setters in any order
        let mut builder = FungibleTokenBuilder::new();
        builder
            .held_by(&alice)
            .unwrap()
            .issued_by(&bank)
            .unwrap()
            .of_currency_code("GBP")
            .unwrap()
            .with_amount(10)
            .unwrap();

        let token = builder.build_fungible_token().unwrap();
        assert_eq!(token.amount().quantity, 1_000);
        assert_eq!(token.holder(), &alice);
        assert_eq!(token.issuer(), &bank);
    }

    #[test]
    fn test_missing_holder_is_named() {
        let mut builder = FungibleTokenBuilder::new();
        builder
            .with_amount(1)
            .unwrap()
            .of_token_type(TokenType::new("GBP", 2))
            .unwrap()
            .issued_by(&Party::named("O=Bank"))
            .unwrap();

        let err = builder.build_fungible_token().unwrap_err();
        assert!(matches!(err, TokenError::MissingBuilderField(BuilderField::Holder)));
        assert_eq!(err.to_string(), "A token holder has not been provided to the builder.");
    }

    #[test]
    fn test_first_missing_field_in_validation_order() {
        // Empty builder reports the amount first
        let builder = FungibleTokenBuilder::new();
        assert!(matches!(
            builder.build_fungible_token(),
            Err(TokenError::MissingBuilderField(BuilderField::Amount))
        ));

        let mut builder = FungibleTokenBuilder::new();
        builder.with_amount(1).unwrap().held_by(&Party::named("O=Alice")).unwrap();
        assert!(matches!(
            builder.build_fungible_token(),
            Err(TokenError::MissingBuilderField(BuilderField::TokenType))
        ));

        builder.of_token_type(TokenType::new("GBP", 2)).unwrap();
        assert!(matches!(
            builder.build_fungible_token(),
            Err(TokenError::MissingBuilderField(BuilderField::Issuer))
        ));

        // Issuer is not needed for an unissued amount
        assert!(builder.build_amount_of_token_type().is_ok());
    }

    #[test]
    fn test_strict_rejects_second_amount() {
        let mut builder = FungibleTokenBuilder::new();
        builder.with_amount(1).unwrap();
        let err = builder.with_amount(2.5).unwrap_err();
        assert!(matches!(err, TokenError::FieldAlreadySet(BuilderField::Amount)));
        assert_eq!(err.to_string(), "The token amount has already been initialized");
    }

    #[test]
    fn test_last_write_wins_overwrites() {
        let mut builder = FungibleTokenBuilder::with_policy(SetterPolicy::LastWriteWins);
        builder
            .with_amount(1)
            .unwrap()
            .with_amount(Decimal::new(250, 2))
            .unwrap()
            .of_token_type(TokenType::new("GBP", 2))
            .unwrap();
        assert_eq!(builder.build_amount_of_token_type().unwrap().quantity, 250);
    }

    #[test]
    fn test_unknown_currency_code() {
        let mut builder = FungibleTokenBuilder::new();
        assert!(matches!(
            builder.of_currency_code("XYZ"),
            Err(TokenError::UnknownCurrencyCode(_))
        ));
    }

    #[test]
    fn test_zero_amount_record_rejected() {
        let mut builder = FungibleTokenBuilder::new();
        builder
            .with_amount(0)
            .unwrap()
            .of_token_type(TokenType::new("GBP", 2))
            .unwrap()
            .issued_by(&Party::named("O=Bank"))
            .unwrap()
            .held_by(&Party::named("O=Alice"))
            .unwrap();

        // The amount itself is fine, the record is not
        assert!(builder.build_amount_of_issued_token_type().unwrap().is_zero());
        assert!(matches!(builder.build_fungible_token(), Err(TokenError::InvalidQuantity(_))));
    }

    #[quickcheck]
    fn prop_terminal_is_repeatable(value: u32) -> bool {
        let mut builder = FungibleTokenBuilder::new();
        builder
            .with_amount(value)
            .and_then(|b| b.of_token_type(TokenType::new("Bitcoin", 8)))
            .and_then(|b| b.issued_by(&Party::named("O=Bank")))
            .is_ok()
            && builder.build_amount_of_issued_token_type().ok()
                == builder.build_amount_of_issued_token_type().ok()
    }
}
