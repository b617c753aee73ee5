//! Store file: backend settings plus the references to seed.
//!
//! ```toml
//! [backend]
//! exclude_root = true
//!
//! [backend.capabilities]
//! compress = false
//!
//! [refs]
//! HEAD = "ref: refs/heads/main"
//! "refs/heads/main" = "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use rdb_refs::{MemoryBackendConfig, MemoryRefdb, Reference, ReferenceTarget};
use rdb_types::ObjectId;
use serde::{Deserialize, Serialize};

const SYMBOLIC_PREFIX: &str = "ref: ";

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreFile {
    pub backend: MemoryBackendConfig,
    pub refs: BTreeMap<String, String>,
}

impl StoreFile {
    /// Read a store file. A missing file is an empty store.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))
    }

    /// A backend holding every reference of the `[refs]` table.
    pub fn seed(&self) -> anyhow::Result<MemoryRefdb> {
        let store = MemoryRefdb::with_config(self.backend.clone());
        for (name, value) in &self.refs {
            store.insert(parse_value(name, value)?)?;
        }
        Ok(store)
    }

    /// Replace the `[refs]` table with `refs`.
    pub fn set_references(&mut self, refs: &[Reference]) {
        self.refs = refs
            .iter()
            .map(|r| (r.name().to_string(), format_value(r)))
            .collect();
    }
}

/// Parse one `[refs]` value: `ref: <target>` or a hex object id.
pub fn parse_value(name: &str, value: &str) -> anyhow::Result<Reference> {
    if let Some(target) = value.strip_prefix(SYMBOLIC_PREFIX) {
        return Ok(Reference::symbolic(name, target.trim()));
    }
    let oid = ObjectId::from_hex(value.trim()).with_context(|| format!("value of {name}"))?;
    Ok(Reference::direct(name, oid))
}

pub fn format_value(reference: &Reference) -> String {
    match reference.target() {
        ReferenceTarget::Direct(oid) => oid.to_hex(),
        ReferenceTarget::Symbolic(target) => format!("{SYMBOLIC_PREFIX}{target}"),
    }
}
