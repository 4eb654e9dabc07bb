use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokens_core::amount::Amount;
use tokens_core::error::{BuilderField, TokenError};
use tokens_core::token_type::TokenDescriptor;

/// How a builder treats a setter that is called more than once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetterPolicy {
    /// A second call fails with `FieldAlreadySet`
    Strict,
    /// A second call replaces the staged value
    LastWriteWins,
}

/// A numeric amount as handed to a builder, before scaling
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AmountValue {
    Int(i128),
    Float(f64),
    Decimal(Decimal),
}

impl AmountValue {
    /// Scale this value to the precision of `token`
    pub fn to_amount<T: TokenDescriptor>(self, token: T) -> Result<Amount<T>, TokenError> {
        match self {
            AmountValue::Int(value) => Amount::from_int(value, token),
            AmountValue::Float(value) => Amount::from_f64(value, token),
            AmountValue::Decimal(value) => Amount::from_decimal(value, token),
        }
    }
}

macro_rules! int_amount_value {
    ($($t:ty),*) => {
        $(
            impl From<$t> for AmountValue {
                fn from(value: $t) -> Self {
                    AmountValue::Int(value as i128)
                }
            }
        )*
    };
}

int_amount_value!(i32, i64, i128, u32, u64);

impl From<f64> for AmountValue {
    fn from(value: f64) -> Self {
        AmountValue::Float(value)
    }
}

impl From<Decimal> for AmountValue {
    fn from(value: Decimal) -> Self {
        AmountValue::Decimal(value)
    }
}

/// Store `value` in `slot` according to `policy`
pub(crate) fn stage<V>(
    slot: &mut Option<V>,
    value: V,
    field: BuilderField,
    policy: SetterPolicy,
) -> Result<(), TokenError> {
    if slot.is_some() {
        match policy {
            SetterPolicy::Strict => return Err(TokenError::FieldAlreadySet(field)),
            SetterPolicy::LastWriteWins => log::trace!("Overwriting staged {}", field.name()),
        }
    }
    *slot = Some(value);
    Ok(())
}

/// Read a staged field or fail naming it
pub(crate) fn require<V>(slot: &Option<V>, field: BuilderField) -> Result<&V, TokenError> {
    slot.as_ref().ok_or(TokenError::MissingBuilderField(field))
}
