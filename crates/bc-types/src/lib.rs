//! bc-types: cross-crate contracts (error taxonomy, collaborator ports).

pub mod errors;
pub mod ports;

pub use errors::{BuildError, ErrorClass};
pub use ports::{is_valid_port, PortAllocator, RuleSetAssets, RuleSetKind, SequentialPorts};
