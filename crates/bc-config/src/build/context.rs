use super::BuildOutput;
use crate::bean::is_ip_address;
use crate::settings::BuildSettings;
use bc_types::PortAllocator;
use serde_json::Value;

/// Mutable state of one compile call.
///
/// Created fresh per call and dropped at the end; nothing here outlives the
/// call except what is moved into the returned [`BuildOutput`].
pub(crate) struct BuildContext<'a> {
    pub settings: &'a BuildSettings,
    pub ports: &'a dyn PortAllocator,
    pub for_test: bool,
    pub for_export: bool,
    pub chain_seq: u32,
    pub inbounds: Vec<Value>,
    /// Native chaining rewrites the last entry in place.
    pub outbounds: Vec<Value>,
    /// Rules synthesized while linking bridged hops.
    pub routing_rules: Vec<Value>,
    /// Server names the direct resolver must answer.
    pub direct_domains: Vec<String>,
    pub result: BuildOutput,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        settings: &'a BuildSettings,
        ports: &'a dyn PortAllocator,
        for_test: bool,
        for_export: bool,
        chain_seq: u32,
    ) -> Self {
        Self {
            settings,
            ports,
            for_test,
            for_export,
            chain_seq,
            inbounds: Vec::new(),
            outbounds: Vec::new(),
            routing_rules: Vec::new(),
            direct_domains: Vec::new(),
            result: BuildOutput::default(),
        }
    }

    /// Queue a server address for direct resolution unless it is an IP literal.
    pub fn bypass_lookup(&mut self, address: &str) {
        let address = address.trim();
        if address.is_empty() || is_ip_address(address) {
            return;
        }
        if !self.direct_domains.iter().any(|d| d == address) {
            self.direct_domains.push(address.to_string());
        }
    }
}
