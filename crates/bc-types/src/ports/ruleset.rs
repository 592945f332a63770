//! Rule-set asset port.

use std::fmt;
use std::path::PathBuf;

/// Kind of a geo rule-set asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleSetKind {
    /// Built from the geoip database.
    Ip,
    /// Built from the geosite database.
    Site,
}

impl RuleSetKind {
    /// IP sets are named with an `_IP` marker, everything else is a site set.
    pub fn of(name: &str) -> Self {
        if name.contains("_IP") {
            Self::Ip
        } else {
            Self::Site
        }
    }
}

impl fmt::Display for RuleSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip => f.write_str("ip"),
            Self::Site => f.write_str("site"),
        }
    }
}

/// Access to compiled `.srs` rule-set assets.
///
/// `compile` is synchronous; the error string is surfaced verbatim as the
/// build error.
pub trait RuleSetAssets: Send + Sync + 'static {
    /// Path the core process should load the named asset from.
    fn path_of(&self, name: &str) -> PathBuf;

    /// Whether the compiled asset is already present.
    fn exists(&self, name: &str) -> bool;

    /// Compile the asset so that `path_of(name)` becomes loadable.
    fn compile(&self, name: &str, kind: RuleSetKind) -> Result<(), String>;

    /// Check that the geo databases rule sets are generated from are present.
    fn check_sources(&self) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_name() {
        assert_eq!(RuleSetKind::of("geoip-ir_IP"), RuleSetKind::Ip);
        assert_eq!(RuleSetKind::of("geosite-ir"), RuleSetKind::Site);
        assert_eq!(RuleSetKind::Ip.to_string(), "ip");
    }

    struct Bare;

    impl RuleSetAssets for Bare {
        fn path_of(&self, name: &str) -> PathBuf {
            PathBuf::from(name)
        }
        fn exists(&self, _: &str) -> bool {
            false
        }
        fn compile(&self, _: &str, _: RuleSetKind) -> Result<(), String> {
            Err("unsupported".into())
        }
    }

    #[test]
    fn sources_are_assumed_present() {
        assert_eq!(Bare.check_sources(), Ok(()));
    }
}
