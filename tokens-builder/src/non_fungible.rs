use tokens_core::error::{BuilderField, TokenError};
use tokens_core::evolvable::EvolvableTokenType;
use tokens_core::id::{Party, UniqueIdentifier};
use tokens_core::states::NonFungibleToken;
use tokens_core::token_type::{IssuedTokenType, TokenType};

use crate::staging::{require, stage, SetterPolicy};

/// Builder for non-fungible records
///
/// Defaults to last-write-wins. The linear id is drawn when the builder is
/// created, so repeated terminal calls produce the same record.
#[derive(Debug, Clone)]
pub struct NonFungibleTokenBuilder {
    policy: SetterPolicy,
    token_type: Option<TokenType>,
    issuer: Option<Party>,
    holder: Option<Party>,
    linear_id: UniqueIdentifier,
    linear_id_set: bool,
}

impl Default for NonFungibleTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NonFungibleTokenBuilder {
    pub fn new() -> Self {
        Self::with_policy(SetterPolicy::LastWriteWins)
    }

    pub fn with_policy(policy: SetterPolicy) -> Self {
        Self {
            policy,
            token_type: None,
            issuer: None,
            holder: None,
            linear_id: UniqueIdentifier::random(),
            linear_id_set: false,
        }
    }

    pub fn policy(&self) -> SetterPolicy {
        self.policy
    }

    pub fn of_token_type(&mut self, token_type: TokenType) -> Result<&mut Self, TokenError> {
        stage(&mut self.token_type, token_type, BuilderField::TokenType, self.policy)?;
        Ok(self)
    }

    /// Stage the pointer to an evolvable descriptor as the token type
    pub fn of_evolvable(&mut self, descriptor: &EvolvableTokenType) -> Result<&mut Self, TokenError> {
        self.of_token_type(descriptor.to_pointer())
    }

    pub fn issued_by(&mut self, issuer: &Party) -> Result<&mut Self, TokenError> {
        stage(&mut self.issuer, issuer.clone(), BuilderField::Issuer, self.policy)?;
        Ok(self)
    }

    pub fn held_by(&mut self, holder: &Party) -> Result<&mut Self, TokenError> {
        stage(&mut self.holder, holder.clone(), BuilderField::Holder, self.policy)?;
        Ok(self)
    }

    /// Replace the generated linear id
    pub fn with_linear_id(&mut self, linear_id: UniqueIdentifier) -> Result<&mut Self, TokenError> {
        if self.linear_id_set && self.policy == SetterPolicy::Strict {
            return Err(TokenError::FieldAlreadySet(BuilderField::LinearId));
        }
        self.linear_id = linear_id;
        self.linear_id_set = true;
        Ok(self)
    }

    /// Requires token type then issuer
    pub fn build_issued_token_type(&self) -> Result<IssuedTokenType, TokenError> {
        let token_type = require(&self.token_type, BuilderField::TokenType)?;
        let issuer = require(&self.issuer, BuilderField::Issuer)?;
        Ok(token_type.issued_by(issuer))
    }

    /// Requires token type, issuer and holder
    pub fn build_non_fungible_token(&self) -> Result<NonFungibleToken, TokenError> {
        let issued = self.build_issued_token_type()?;
        let holder = require(&self.holder, BuilderField::Holder)?;
        Ok(issued.held_by(holder, self.linear_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_non_fungible() {
        let bank = Party::named("O=Bank");
        let alice = Party::named("O=Alice");

        let mut builder = NonFungibleTokenBuilder::new();
        builder
            .of_token_type(TokenType::new("HOUSE", 0))
            .unwrap()
            .issued_by(&bank)
            .unwrap()
            .held_by(&alice)
            .unwrap();

        let first = builder.build_non_fungible_token().unwrap();
        let second = builder.build_non_fungible_token().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.holder(), &alice);
    }

    #[test]
    fn test_validation_order() {
        let mut builder = NonFungibleTokenBuilder::new();
        builder.held_by(&Party::named("O=Alice")).unwrap();
        let err = builder.build_non_fungible_token().unwrap_err();
        assert_eq!(err.to_string(), "A token type has not been provided to the builder.");

        builder.of_token_type(TokenType::new("HOUSE", 0)).unwrap();
        let err = builder.build_issued_token_type().unwrap_err();
        assert_eq!(err.to_string(), "A token issuer has not been provided to the builder.");

        let mut builder = NonFungibleTokenBuilder::new();
        builder
            .of_token_type(TokenType::new("HOUSE", 0))
            .unwrap()
            .issued_by(&Party::named("O=Bank"))
            .unwrap();
        assert!(builder.build_issued_token_type().is_ok());
        assert!(matches!(
            builder.build_non_fungible_token(),
            Err(TokenError::MissingBuilderField(BuilderField::Holder))
        ));
    }

    #[test]
    fn test_last_write_wins_by_default() {
        let alice = Party::named("O=Alice");
        let bob = Party::named("O=Bob");
        let mut builder = NonFungibleTokenBuilder::new();
        builder
            .of_token_type(TokenType::new("HOUSE", 0))
            .unwrap()
            .issued_by(&Party::named("O=Bank"))
            .unwrap()
            .held_by(&alice)
            .unwrap()
            .held_by(&bob)
            .unwrap();
        assert_eq!(builder.build_non_fungible_token().unwrap().holder(), &bob);
    }

    #[test]
    fn test_strict_policy_and_linear_id() {
        let id = UniqueIdentifier::from_bytes([4u8; 16]);
        let mut builder = NonFungibleTokenBuilder::with_policy(SetterPolicy::Strict);
        builder.with_linear_id(id.clone()).unwrap();
        assert!(matches!(
            builder.with_linear_id(UniqueIdentifier::random()),
            Err(TokenError::FieldAlreadySet(BuilderField::LinearId))
        ));
        builder.issued_by(&Party::named("O=Bank")).unwrap();
        assert!(builder.issued_by(&Party::named("O=Bank")).is_err());

        builder
            .of_token_type(TokenType::new("HOUSE", 0))
            .unwrap()
            .held_by(&Party::named("O=Alice"))
            .unwrap();
        assert_eq!(builder.build_non_fungible_token().unwrap().linear_id(), &id);
    }

    #[test]
    fn test_evolvable_pointer() {
        let valuer = Party::named("O=Valuer");
        let descriptor = EvolvableTokenType::new(vec![valuer.clone()], 0);
        let mut builder = NonFungibleTokenBuilder::new();
        builder
            .of_evolvable(&descriptor)
            .unwrap()
            .issued_by(&valuer)
            .unwrap()
            .held_by(&Party::named("O=Alice"))
            .unwrap();

        let token = builder.build_non_fungible_token().unwrap();
        assert!(token.token_type().is_pointer());
        assert_eq!(token.token_type().identifier, descriptor.linear_id.hyphenated());
    }
}
