use serde::{Deserialize, Serialize};

use crate::traits::Capabilities;

/// Configuration for [`MemoryRefdb`](crate::MemoryRefdb).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryBackendConfig {
    /// When `true`, the root entry is never produced by enumeration,
    /// whatever the pattern. Lookups of it are unaffected.
    pub exclude_root: bool,
    /// Name of the distinguished root entry.
    pub root_name: String,
    /// Optional operations advertised to the engine.
    pub capabilities: CapabilityConfig,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            exclude_root: true,
            root_name: "HEAD".into(),
            capabilities: CapabilityConfig::default(),
        }
    }
}

/// Which optional operations to advertise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub foreach_glob: bool,
    pub compress: bool,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            foreach_glob: true,
            compress: true,
        }
    }
}

impl CapabilityConfig {
    /// The flag set these switches describe.
    pub fn flags(&self) -> Capabilities {
        let mut flags = Capabilities::empty();
        flags.set(Capabilities::FOREACH_GLOB, self.foreach_glob);
        flags.set(Capabilities::COMPRESS, self.compress);
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = MemoryBackendConfig::default();
        assert!(c.exclude_root);
        assert_eq!(c.root_name, "HEAD");
        assert_eq!(
            c.capabilities.flags(),
            Capabilities::FOREACH_GLOB | Capabilities::COMPRESS
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c: MemoryBackendConfig = toml::from_str(
            r#"
            exclude_root = false

            [capabilities]
            compress = false
            "#,
        )
        .unwrap();
        assert!(!c.exclude_root);
        assert_eq!(c.root_name, "HEAD");
        assert_eq!(c.capabilities.flags(), Capabilities::FOREACH_GLOB);
    }
}
