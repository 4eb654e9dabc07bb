pub mod config;
pub mod memory;
pub mod moves;
pub mod selector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::SelectionConfig;
pub use memory::InMemoryTokenVault;
pub use moves::{generate_exit, generate_move, GeneratedMove};
pub use selector::{CancellationToken, TokenSelector};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTokenVault;
