pub mod fungible;
pub mod non_fungible;
pub mod staging;

pub use fungible::FungibleTokenBuilder;
pub use non_fungible::NonFungibleTokenBuilder;
pub use staging::{AmountValue, SetterPolicy};
