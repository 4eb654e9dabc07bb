use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::TokenError;
use crate::id::Party;
use crate::token_type::{IssuedTokenType, TokenDescriptor, TokenType};

/// A quantity of some token, held as an integer number of its smallest unit
///
/// `quantity` is `value * 10^fraction_digits` of the token. Arithmetic is only
/// defined between amounts of equal tokens and never rounds: a mismatch is a
/// `TypeMismatch` error and a negative result is an `InsufficientAmount` error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount<T> {
    /// Number of indivisible units
    pub quantity: u128,

    /// What the quantity is denominated in
    pub token: T,
}

/// 10^digits as a scaled-integer multiplier
fn pow10(digits: u32) -> Result<u128, TokenError> {
    10u128
        .checked_pow(digits)
        .ok_or_else(|| TokenError::Overflow(format!("10^{} does not fit a quantity", digits)))
}

/// Rescale `mantissa * 10^-scale` to `fraction_digits`, rounding half-up
///
/// # Returns
/// `None` if the result does not fit a `u128`
fn rescale(mantissa: u128, scale: u32, fraction_digits: u32) -> Option<u128> {
    if mantissa == 0 {
        return Some(0);
    }
    if scale <= fraction_digits {
        return mantissa.checked_mul(10u128.checked_pow(fraction_digits - scale)?);
    }

    match 10u128.checked_pow(scale - fraction_digits) {
        Some(divisor) => {
            let quotient = mantissa / divisor;
            let remainder = mantissa % divisor;
            if remainder >= divisor - remainder {
                quotient.checked_add(1)
            } else {
                Some(quotient)
            }
        }
        // Divisor beyond u128 means the mantissa is below half a unit
        None => Some(0),
    }
}

/// Split a plain (exponent free) non-negative decimal string into its integer
/// mantissa and scale, e.g. "12.340" into (12340, 3)
fn parse_plain_decimal(text: &str) -> Option<(u128, u32)> {
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    let mut mantissa: u128 = 0;
    for c in whole.chars().chain(fraction.chars()) {
        let digit = c.to_digit(10)?;
        mantissa = mantissa.checked_mul(10)?.checked_add(digit as u128)?;
    }
    Some((mantissa, u32::try_from(fraction.len()).ok()?))
}

impl<T: TokenDescriptor> Amount<T> {
    /// Build from an already scaled quantity
    pub fn from_quantity(quantity: u128, token: T) -> Self {
        Self { quantity, token }
    }

    /// The zero amount of a token
    pub fn zero(token: T) -> Self {
        Self::from_quantity(0, token)
    }

    /// Build from a whole number of tokens
    ///
    /// Integers scale exactly, so this agrees with `from_decimal` and
    /// `from_f64` for the same logical value.
    pub fn from_int(value: impl Into<i128>, token: T) -> Result<Self, TokenError> {
        let value: i128 = value.into();
        if value < 0 {
            return Err(TokenError::InvalidQuantity(format!(
                "Negative amount {} of {}",
                value, token
            )));
        }

        let quantity = (value as u128)
            .checked_mul(pow10(token.fraction_digits())?)
            .ok_or_else(|| TokenError::Overflow(format!("{} of {}", value, token)))?;
        Ok(Self::from_quantity(quantity, token))
    }

    /// Build from an arbitrary-precision decimal
    ///
    /// The value is scaled by the token's fraction digits and rounded half-up
    /// (midpoint away from zero) to the nearest indivisible unit. Scaling is
    /// done on the decimal's integer mantissa, so any value whose quantity
    /// fits a `u128` is accepted, as it is by `from_int`.
    pub fn from_decimal(value: Decimal, token: T) -> Result<Self, TokenError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(TokenError::InvalidQuantity(format!(
                "Negative amount {} of {}",
                value, token
            )));
        }

        let mantissa = value.mantissa().unsigned_abs();
        let quantity = rescale(mantissa, value.scale(), token.fraction_digits())
            .ok_or_else(|| TokenError::Overflow(format!("{} of {}", value, token)))?;
        Ok(Self::from_quantity(quantity, token))
    }

    /// Build from a floating point value
    ///
    /// The float is read as the shortest decimal that round-trips to it
    /// (0.1 is read as 0.1, not as its binary expansion), then scaled and
    /// rounded exactly like `from_decimal`.
    pub fn from_f64(value: f64, token: T) -> Result<Self, TokenError> {
        if !value.is_finite() {
            return Err(TokenError::InvalidQuantity(format!(
                "Non-finite amount {} of {}",
                value, token
            )));
        }
        if value < 0.0 {
            return Err(TokenError::InvalidQuantity(format!(
                "Negative amount {} of {}",
                value, token
            )));
        }

        // Display for f64 never uses an exponent; abs() drops the sign of -0.0
        let (mantissa, scale) = parse_plain_decimal(&value.abs().to_string())
            .ok_or_else(|| TokenError::Overflow(format!("{} of {}", value, token)))?;
        let quantity = rescale(mantissa, scale, token.fraction_digits())
            .ok_or_else(|| TokenError::Overflow(format!("{} of {}", value, token)))?;
        Ok(Self::from_quantity(quantity, token))
    }

    pub fn is_zero(&self) -> bool {
        self.quantity == 0
    }

    /// The display value, e.g. 12.34 for 1234 units of a two digit token
    pub fn to_decimal(&self) -> Result<Decimal, TokenError> {
        let quantity = i128::try_from(self.quantity)
            .map_err(|_| TokenError::Overflow(format!("{} units of {}", self.quantity, self.token)))?;
        Decimal::try_from_i128_with_scale(quantity, self.token.fraction_digits())
            .map_err(|e| TokenError::Overflow(format!("{} units of {}: {}", self.quantity, self.token, e)))
    }

    fn check_same_token(&self, other: &Self) -> Result<(), TokenError> {
        if self.token != other.token {
            return Err(TokenError::TypeMismatch {
                left: self.token.to_string(),
                right: other.token.to_string(),
            });
        }
        Ok(())
    }

    /// Add two amounts of the same token
    pub fn checked_add(&self, other: &Self) -> Result<Self, TokenError> {
        self.check_same_token(other)?;
        let quantity = self
            .quantity
            .checked_add(other.quantity)
            .ok_or_else(|| TokenError::Overflow(format!("{} + {}", self, other)))?;
        Ok(Self::from_quantity(quantity, self.token.clone()))
    }

    /// Subtract an amount of the same token, failing rather than going negative
    pub fn checked_sub(&self, other: &Self) -> Result<Self, TokenError> {
        self.check_same_token(other)?;
        let quantity = self
            .quantity
            .checked_sub(other.quantity)
            .ok_or_else(|| TokenError::InsufficientAmount {
                available: self.to_string(),
                required: other.to_string(),
            })?;
        Ok(Self::from_quantity(quantity, self.token.clone()))
    }

    /// Multiply by a whole number
    pub fn checked_mul(&self, factor: u64) -> Result<Self, TokenError> {
        let quantity = self
            .quantity
            .checked_mul(factor as u128)
            .ok_or_else(|| TokenError::Overflow(format!("{} * {}", self, factor)))?;
        Ok(Self::from_quantity(quantity, self.token.clone()))
    }

    /// Compare two amounts of the same token
    pub fn compare(&self, other: &Self) -> Result<Ordering, TokenError> {
        self.check_same_token(other)?;
        Ok(self.quantity.cmp(&other.quantity))
    }

    /// Sum amounts, failing on an empty input or a token mismatch
    pub fn sum_or_throw<I>(amounts: I) -> Result<Self, TokenError>
    where
        I: IntoIterator<Item = Self>,
    {
        Self::sum_or_none(amounts)?
            .ok_or_else(|| TokenError::InvalidQuantity("Cannot sum an empty collection of amounts".to_string()))
    }

    /// Sum amounts, returning `None` for an empty input
    pub fn sum_or_none<I>(amounts: I) -> Result<Option<Self>, TokenError>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut iter = amounts.into_iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        iter.try_fold(first, |total, next| total.checked_add(&next)).map(Some)
    }

    /// Sum amounts, returning zero of `token` for an empty input
    pub fn sum_or_zero<I>(amounts: I, token: T) -> Result<Self, TokenError>
    where
        I: IntoIterator<Item = Self>,
    {
        Ok(Self::sum_or_none(amounts)?.unwrap_or_else(|| Self::zero(token)))
    }
}

impl Amount<TokenType> {
    /// Wrap the token type with an issuer
    pub fn issued_by(&self, issuer: &Party) -> Amount<IssuedTokenType> {
        Amount::from_quantity(self.quantity, self.token.issued_by(issuer))
    }
}

impl Amount<IssuedTokenType> {
    /// Strip the issuer, keeping quantity and token type
    pub fn without_issuer(&self) -> Amount<TokenType> {
        Amount::from_quantity(self.quantity, self.token.token_type.clone())
    }

    pub fn issuer(&self) -> &Party {
        &self.token.issuer
    }
}

impl<T: TokenDescriptor> fmt::Display for Amount<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.token.fraction_digits();
        match 10u128.checked_pow(digits) {
            Some(unit) if digits > 0 => write!(
                f,
                "{}.{:0width$} {}",
                self.quantity / unit,
                self.quantity % unit,
                self.token,
                width = digits as usize
            ),
            Some(_) => write!(f, "{} {}", self.quantity, self.token),
            None => write!(f, "{} units of {}", self.quantity, self.token),
        }
    }
}
