use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::id::{Party, UniqueIdentifier};

/// Largest number of fraction digits a token type may declare
///
/// Bounded by the scale `rust_decimal` can represent.
pub const MAX_FRACTION_DIGITS: u32 = 28;

/// Describes a kind of value, independent of who issued it
///
/// Two token types are equal when identifier and fraction digits match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenType {
    /// Typically a 3-4 character upper case code such as "GBP". For pointer
    /// token types this holds the linear id of the evolvable descriptor.
    pub identifier: String,

    /// Number of digits allowed after the decimal point
    pub fraction_digits: u32,

    /// Whether the identifier refers to an evolvable descriptor
    #[serde(default)]
    pointer: bool,
}

impl TokenType {
    pub fn new(identifier: impl Into<String>, fraction_digits: u32) -> Self {
        Self {
            identifier: identifier.into(),
            fraction_digits,
            pointer: false,
        }
    }

    /// A token type that stands in for an evolvable descriptor
    pub fn pointer(linear_id: &UniqueIdentifier, fraction_digits: u32) -> Self {
        Self {
            identifier: linear_id.hyphenated(),
            fraction_digits,
            pointer: true,
        }
    }

    pub fn is_pointer(&self) -> bool {
        self.pointer
    }

    /// Size of one indivisible unit, e.g. 0.01 for two fraction digits
    pub fn display_token_size(&self) -> Decimal {
        Decimal::new(1, self.fraction_digits.min(MAX_FRACTION_DIGITS))
    }

    /// Bind this token type to an issuer
    pub fn issued_by(&self, issuer: &Party) -> IssuedTokenType {
        IssuedTokenType::new(issuer.clone(), self.clone())
    }
}

impl PartialEq for TokenType {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier && self.fraction_digits == other.fraction_digits
    }
}

impl Eq for TokenType {}

impl Hash for TokenType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
        self.fraction_digits.hash(state);
    }
}

impl Ord for TokenType {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.identifier, self.fraction_digits).cmp(&(&other.identifier, other.fraction_digits))
    }
}

impl PartialOrd for TokenType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pointer {
            write!(f, "TokenPointer({})", self.identifier)
        } else {
            write!(f, "{}", self.identifier)
        }
    }
}

/// A token type bound to the party whose signature backs redemption
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssuedTokenType {
    pub issuer: Party,
    pub token_type: TokenType,
}

impl IssuedTokenType {
    pub fn new(issuer: Party, token_type: TokenType) -> Self {
        Self { issuer, token_type }
    }

    pub fn issuer(&self) -> &Party {
        &self.issuer
    }
}

impl fmt::Display for IssuedTokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} issued by {}", self.token_type, self.issuer)
    }
}

/// Anything an `Amount` can be denominated in
pub trait TokenDescriptor: Clone + PartialEq + fmt::Debug + fmt::Display {
    /// The underlying token type
    fn token_type(&self) -> &TokenType;

    /// Fraction digits that scale quantities of this descriptor
    fn fraction_digits(&self) -> u32 {
        self.token_type().fraction_digits
    }
}

impl TokenDescriptor for TokenType {
    fn token_type(&self) -> &TokenType {
        self
    }
}

impl TokenDescriptor for IssuedTokenType {
    fn token_type(&self) -> &TokenType {
        &self.token_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_uses_identifier_and_digits() {
        assert_eq!(TokenType::new("GBP", 2), TokenType::new("GBP", 2));
        assert_ne!(TokenType::new("GBP", 2), TokenType::new("GBP", 3));
        assert_ne!(TokenType::new("GBP", 2), TokenType::new("USD", 2));
    }

    #[test]
    fn test_display_token_size() {
        assert_eq!(TokenType::new("GBP", 2).display_token_size(), Decimal::new(1, 2));
        assert_eq!(TokenType::new("JPY", 0).display_token_size(), Decimal::ONE);
    }

    #[test]
    fn test_pointer_token_type() {
        let linear_id = UniqueIdentifier::from_bytes([3u8; 16]);
        let pointer = TokenType::pointer(&linear_id, 0);
        assert!(pointer.is_pointer());
        assert_eq!(pointer.identifier, linear_id.hyphenated());
        assert!(!TokenType::new("GBP", 2).is_pointer());
    }

    #[test]
    fn test_issued_by() {
        let issuer = Party::named("O=Bank");
        let issued = TokenType::new("GBP", 2).issued_by(&issuer);
        assert_eq!(issued.issuer(), &issuer);
        assert_eq!(issued.fraction_digits(), 2);
        assert_eq!(issued.to_string(), "GBP issued by O=Bank");
    }
}
