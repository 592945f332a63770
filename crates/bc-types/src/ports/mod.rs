//! Ports (traits) for the compiler's external collaborators.
//!
//! The compiler depends ONLY on these traits; the application layer injects
//! concrete implementations. All ports are `Send + Sync` because batch probing
//! runs independent compile calls on a worker pool.

pub mod local_port;
pub mod ruleset;

pub use local_port::*;
pub use ruleset::*;
