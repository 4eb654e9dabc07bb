//! Currency code registry
//!
//! Two read-only tables map symbolic codes to token types: ISO 4217 fiat
//! currencies (identifier is the code itself) and digital assets (identifier
//! is the asset name). The tables are `static` slices, so concurrent reads
//! need no synchronization.

use crate::amount::Amount;
use crate::error::TokenError;
use crate::token_type::TokenType;

/// ISO 4217 fiat currencies and their minor-unit digits
static FIAT_CURRENCIES: &[(&str, u32)] = &[
    ("USD", 2),
    ("EUR", 2),
    ("GBP", 2),
    ("CHF", 2),
    ("CAD", 2),
    ("AUD", 2),
    ("NZD", 2),
    ("CNY", 2),
    ("HKD", 2),
    ("SGD", 2),
    ("SEK", 2),
    ("NOK", 2),
    ("DKK", 2),
    ("INR", 2),
    ("BRL", 2),
    ("MXN", 2),
    ("ZAR", 2),
    ("RUB", 2),
    ("PLN", 2),
    ("TRY", 2),
    ("JPY", 0),
    ("KRW", 0),
    ("CLP", 0),
    ("ISK", 0),
    ("VND", 0),
    ("KWD", 3),
    ("BHD", 3),
    ("OMR", 3),
    ("JOD", 3),
    ("TND", 3),
];

/// Digital assets: code, identifier, fraction digits
static DIGITAL_CURRENCIES: &[(&str, &str, u32)] = &[
    ("XRP", "Ripple", 6),
    ("BTC", "Bitcoin", 8),
    ("ETH", "Ethereum", 18),
    ("DOGE", "Dogecoin", 8),
];

/// Look up a fiat currency by its ISO code
pub fn fiat(code: &str) -> Result<TokenType, TokenError> {
    FIAT_CURRENCIES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(c, digits)| TokenType::new(*c, *digits))
        .ok_or_else(|| TokenError::UnknownCurrencyCode(code.to_string()))
}

/// Look up a digital currency by its ticker
pub fn digital(code: &str) -> Result<TokenType, TokenError> {
    DIGITAL_CURRENCIES
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, identifier, digits)| TokenType::new(*identifier, *digits))
        .ok_or_else(|| TokenError::UnknownCurrencyCode(code.to_string()))
}

/// Look up any known currency code, fiat first
///
/// # Parameters
/// * `code` - An ISO 4217 code such as "GBP" or a ticker such as "BTC"
///
/// # Returns
/// The token type for that code, or `UnknownCurrencyCode` if neither table has it
pub fn lookup(code: &str) -> Result<TokenType, TokenError> {
    fiat(code).or_else(|_| digital(code))
}

/// Every code the registry knows about
pub fn known_codes() -> impl Iterator<Item = &'static str> {
    FIAT_CURRENCIES
        .iter()
        .map(|(c, _)| *c)
        .chain(DIGITAL_CURRENCIES.iter().map(|(c, _, _)| *c))
}

fn amount_of(code: &str, value: i64) -> Result<Amount<TokenType>, TokenError> {
    Amount::from_int(value, lookup(code)?)
}

/// Pound sterling
pub fn gbp(value: i64) -> Result<Amount<TokenType>, TokenError> {
    amount_of("GBP", value)
}

/// US dollar
pub fn usd(value: i64) -> Result<Amount<TokenType>, TokenError> {
    amount_of("USD", value)
}

/// Euro
pub fn eur(value: i64) -> Result<Amount<TokenType>, TokenError> {
    amount_of("EUR", value)
}

/// Swiss franc
pub fn chf(value: i64) -> Result<Amount<TokenType>, TokenError> {
    amount_of("CHF", value)
}

/// Japanese yen
pub fn jpy(value: i64) -> Result<Amount<TokenType>, TokenError> {
    amount_of("JPY", value)
}

/// Bitcoin
pub fn btc(value: i64) -> Result<Amount<TokenType>, TokenError> {
    amount_of("BTC", value)
}

/// Ether
pub fn eth(value: i64) -> Result<Amount<TokenType>, TokenError> {
    amount_of("ETH", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fiat_precision() {
        assert_eq!(lookup("GBP").unwrap(), TokenType::new("GBP", 2));
        assert_eq!(lookup("USD").unwrap().fraction_digits, 2);
        assert_eq!(lookup("JPY").unwrap().fraction_digits, 0);
        assert_eq!(lookup("KWD").unwrap().fraction_digits, 3);
    }

    #[test]
    fn test_digital_precision() {
        assert_eq!(lookup("BTC").unwrap(), TokenType::new("Bitcoin", 8));
        assert_eq!(lookup("ETH").unwrap(), TokenType::new("Ethereum", 18));
        assert_eq!(lookup("XRP").unwrap(), TokenType::new("Ripple", 6));
        assert_eq!(lookup("DOGE").unwrap(), TokenType::new("Dogecoin", 8));
    }

    #[test]
    fn test_unknown_code() {
        match lookup("XYZ") {
            Err(TokenError::UnknownCurrencyCode(code)) => assert_eq!(code, "XYZ"),
            other => panic!("Expected UnknownCurrencyCode, got {:?}", other),
        }

        // Each table only answers for its own codes
        assert!(fiat("BTC").is_err());
        assert!(digital("GBP").is_err());
    }

    #[test]
    fn test_every_known_code_resolves() {
        for code in known_codes() {
            assert!(lookup(code).is_ok(), "{} should resolve", code);
        }
    }

    #[test]
    fn test_btc_scaling() {
        // 1 BTC + 2 BTC is 3 * 10^8 scaled units
        let one = btc(1).unwrap();
        let two = btc(2).unwrap();
        let three = one.checked_add(&two).unwrap();
        assert_eq!(three.quantity, 300_000_000);
        assert_eq!(three.token.fraction_digits, 8);
    }

    #[test]
    fn test_convenience_constructors() {
        assert_eq!(gbp(10).unwrap().quantity, 1_000);
        assert_eq!(jpy(10).unwrap().quantity, 10);
        assert_eq!(eth(1).unwrap().quantity, 1_000_000_000_000_000_000);
    }
}
