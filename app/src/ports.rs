//! OS-backed free-port allocation.

use bc_types::{BuildError, PortAllocator};
use std::net::TcpListener;

/// Asks the OS for an ephemeral loopback port.
///
/// The listener is dropped immediately, so the port is only very likely to
/// still be free when the helper process binds it.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsPorts;

impl PortAllocator for OsPorts {
    fn allocate_free_port(&self) -> Result<u16, BuildError> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .map_err(|e| BuildError::resource(format!("no free local port: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| BuildError::resource(format!("no free local port: {e}")))?
            .port();
        tracing::debug!(port, "allocated local port");
        Ok(port)
    }
}
