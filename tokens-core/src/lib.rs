pub mod amount;
pub mod criteria;
pub mod error;
pub mod evolvable;
pub mod id;
pub mod locks;
pub mod registry;
pub mod states;
pub mod token_type;
pub mod verify;

// Re-export the main types for convenience
pub use amount::Amount;
pub use criteria::{PageSpecification, TokenCriteria};
pub use error::{BuilderField, TokenError};
pub use evolvable::{EvolvableTokenRegistry, EvolvableTokenType};
pub use id::{LockId, Party, PartyKey, StateRef, UniqueIdentifier};
pub use locks::{ReservationEntry, ReservationOutcome, SoftLockGuard, TokenVault};
pub use states::{sum_token_state_and_refs, FungibleToken, NonFungibleToken, StateAndRef};
pub use token_type::{IssuedTokenType, TokenDescriptor, TokenType};
pub use verify::{
    group_states, verify_issue, verify_move, verify_non_fungible_issue, verify_non_fungible_move,
    verify_non_fungible_redeem, verify_redeem, TokenGroup,
};
