//! Local port allocation port.

use crate::errors::BuildError;
use std::sync::atomic::{AtomicU32, Ordering};

/// Hands out free local TCP ports for bridge mapping/pickup endpoints.
///
/// Implementations must be safe under concurrent calls.
pub trait PortAllocator: Send + Sync + 'static {
    fn allocate_free_port(&self) -> Result<u16, BuildError>;
}

/// Deterministic allocator counting upwards from a base port.
///
/// Never probes the OS; useful for exports and tests where stable output matters.
/// Once 65535 has been handed out every later call fails.
#[derive(Debug)]
pub struct SequentialPorts {
    next: AtomicU32,
}

impl SequentialPorts {
    pub fn new(base: u16) -> Self {
        Self {
            next: AtomicU32::new(u32::from(base)),
        }
    }
}

impl PortAllocator for SequentialPorts {
    fn allocate_free_port(&self) -> Result<u16, BuildError> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                if n == 0 || n > u32::from(u16::MAX) {
                    return None;
                }
                n.checked_add(1)
            })
            .ok()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| BuildError::resource("local port range exhausted"))
    }
}

/// Returns true for a usable port number (1..=65535).
#[inline]
pub fn is_valid_port(port: i64) -> bool {
    (1..=65535).contains(&port)
}
