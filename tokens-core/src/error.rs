use std::fmt;
use std::io;
use thiserror::Error;

/// A field a token builder requires before it can produce a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuilderField {
    /// The numeric amount of the token
    Amount,
    /// The token type being built
    TokenType,
    /// The issuing party
    Issuer,
    /// The holding party
    Holder,
    /// The linear id of a non-fungible token
    LinearId,
}

impl BuilderField {
    /// Short lowercase name of the field
    pub fn name(&self) -> &'static str {
        match self {
            BuilderField::Amount => "amount",
            BuilderField::TokenType => "token type",
            BuilderField::Issuer => "issuer",
            BuilderField::Holder => "holder",
            BuilderField::LinearId => "linear id",
        }
    }
}

impl fmt::Display for BuilderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuilderField::Amount => write!(f, "An amount value has not been provided to the builder."),
            BuilderField::TokenType => write!(f, "A token type has not been provided to the builder."),
            BuilderField::Issuer => write!(f, "A token issuer has not been provided to the builder."),
            BuilderField::Holder => write!(f, "A token holder has not been provided to the builder."),
            BuilderField::LinearId => write!(f, "A linear id has not been provided to the builder."),
        }
    }
}

/// Represents all possible errors raised by token construction, arithmetic and selection
#[derive(Error, Debug)]
pub enum TokenError {
    /// A currency code that neither registry table knows about
    #[error("Unknown currency code: {0}")]
    UnknownCurrencyCode(String),

    /// Arithmetic between amounts of different token descriptors
    #[error("Token type mismatch: {left} vs {right}")]
    TypeMismatch { left: String, right: String },

    /// Subtraction (or exit) that would produce a negative quantity
    #[error("Insufficient amount: {available} available, {required} required")]
    InsufficientAmount { available: String, required: String },

    /// A numeric input that cannot represent a token quantity
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A scaled quantity that does not fit the quantity representation
    #[error("Quantity overflow: {0}")]
    Overflow(String),

    /// A terminal builder call made before a required setter
    #[error("{0}")]
    MissingBuilderField(BuilderField),

    /// A strict builder setter invoked a second time
    #[error("The token {} has already been initialized", .0.name())]
    FieldAlreadySet(BuilderField),

    /// The pool cannot cover the requested amount even without contention
    #[error("Insufficient spendable states identified for {0}")]
    InsufficientBalance(String),

    /// Retries exhausted while other lock holders kept claiming candidates
    #[error("Insufficient not locked spendable states identified for {0}")]
    SelectionContention(String),

    /// Selection aborted by the caller or by its wall-clock budget
    #[error("Selection cancelled: {0}")]
    Cancelled(String),

    /// Selection configuration rejected by validation
    #[error("Invalid selection configuration: {0}")]
    InvalidConfig(String),

    /// Evolvable token descriptor missing from the registry
    #[error("Evolvable token type not found: {0}")]
    EvolvableTokenNotFound(String),

    /// Party tried to update a descriptor it does not maintain
    #[error("Party {0} is not a maintainer of this evolvable token type")]
    NotMaintainer(String),

    /// Failures inside the storage collaborator
    #[error("Vault error: {0}")]
    Vault(String),

    /// Inputs and outputs that break the rules for issuing, moving or redeeming
    #[error("Token verification failed: {0}")]
    Verification(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors that occur when reading configuration or database files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic errors that don't fit in other categories
    #[error("Other error: {0}")]
    Other(String),

    /// Anyhow error wrapper for error context
    #[error(transparent)]
    Context(#[from] anyhow::Error),
}

impl TokenError {
    /// Whether the selector may retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, TokenError::SelectionContention(_))
    }
}

impl From<bincode::Error> for TokenError {
    fn from(err: bincode::Error) -> Self {
        TokenError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for TokenError {
    fn from(err: serde_json::Error) -> Self {
        TokenError::Serialization(err.to_string())
    }
}

impl From<String> for TokenError {
    fn from(err: String) -> Self {
        TokenError::Other(err)
    }
}

impl From<&str> for TokenError {
    fn from(err: &str) -> Self {
        TokenError::Other(err.to_string())
    }
}
