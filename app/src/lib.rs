//! boxchain command line front-end.
//!
//! The compiler itself lives in `bc-config`; this crate supplies the
//! filesystem and OS backed services it needs (profile database loading,
//! port allocation, rule-set assets) and the subcommands wiring them up.

pub mod assets;
pub mod cli;
pub mod loader;
pub mod logging;
pub mod ports;
