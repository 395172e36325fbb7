pub mod command;
pub mod locker;
pub mod naming;
pub mod retention;

// Trait-based abstractions for testability
pub mod executor;

// Re-export commonly used types and traits (used by test crate)
pub use executor::{CommandExecutor, RealExecutor, StreamingProcess};
