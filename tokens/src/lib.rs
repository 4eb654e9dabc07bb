//! Token amounts, value records and concurrent soft-locked selection
//!
//! This crate re-exports all the components of the token library.

pub use tokens_builder::*;
pub use tokens_core::*;
pub use tokens_selection::*;
