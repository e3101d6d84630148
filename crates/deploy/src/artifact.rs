//! Compiled contract artifacts and their resolution.

use std::{collections::BTreeMap, path::PathBuf};

use alloy_core::primitives::Address;
use anyhow::Context;
use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};

use crate::{ProvisionError, Result};

/// Hex-encoded creation bytecode, possibly still carrying library placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Deref, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bytecode(String);

impl Bytecode {
    /// Whether any library placeholder is left in the bytecode.
    pub fn has_placeholders(&self) -> bool {
        self.trim_start_matches("0x").contains("__")
    }

    /// Decode the bytecode to raw bytes. Fails while placeholders remain.
    pub fn to_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(self.trim_start_matches("0x"))
    }

    pub(crate) fn replace(&mut self, from: &str, to: &str) {
        self.0 = self.0.replace(from, to);
    }
}

/// A compiled contract interface and bytecode bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifact {
    /// The contract name, e.g. `DmmController`.
    pub name: String,
    /// Creation bytecode.
    pub bytecode: Bytecode,
    /// Chain ID recorded by per-network detection, if performed.
    pub network_id: Option<u64>,
    /// Libraries bound into the bytecode so far.
    pub links: BTreeMap<String, Address>,
    /// Addresses the artifact already knows about, keyed by network id.
    pub known_networks: BTreeMap<u64, Address>,
}

impl ContractArtifact {
    /// Create an artifact from a name and its creation bytecode.
    pub fn new(name: impl Into<String>, bytecode: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bytecode: Bytecode::from(bytecode.into()),
            network_id: None,
            links: BTreeMap::new(),
            known_networks: BTreeMap::new(),
        }
    }

    /// Record the network this artifact is about to be deployed on.
    pub fn detect_network(&mut self, chain_id: u64) {
        if let Some(address) = self.known_networks.get(&chain_id) {
            tracing::debug!(
                artifact = %self.name,
                chain_id,
                %address,
                "Artifact carries an address for this network, deploying a fresh instance"
            );
        }
        tracing::debug!(artifact = %self.name, chain_id, "Network detected");
        self.network_id = Some(chain_id);
    }

    /// Whether the bytecode is fully linked and ready to be deployed.
    pub fn is_linked(&self) -> bool {
        !self.bytecode.has_placeholders()
    }
}

/// Source of compiled contract artifacts.
pub trait ArtifactResolver {
    /// Resolve the artifact with the given contract name.
    ///
    /// Every call returns a fresh instance: links applied to a previous instance do not carry
    /// over.
    fn resolve(&self, name: &str) -> Result<ContractArtifact>;
}

/// On-disk truffle build file (`build/contracts/<Name>.json`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TruffleBuildFile {
    contract_name: String,
    bytecode: String,
    #[serde(default)]
    networks: BTreeMap<String, TruffleNetwork>,
}

#[derive(Debug, Deserialize)]
struct TruffleNetwork {
    address: Option<Address>,
}

/// Resolves artifacts from a directory of truffle build files.
#[derive(Debug, Clone)]
pub struct TruffleArtifactResolver {
    dir: PathBuf,
}

impl TruffleArtifactResolver {
    /// Create a resolver reading `<dir>/<Name>.json`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load(&self, name: &str) -> anyhow::Result<ContractArtifact> {
        let path = self.dir.join(format!("{name}.json"));
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let build: TruffleBuildFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        if build.contract_name != name {
            anyhow::bail!(
                "Artifact {} declares contract {}",
                path.display(),
                build.contract_name
            );
        }
        if build.bytecode.trim_start_matches("0x").is_empty() {
            anyhow::bail!("Artifact has no creation bytecode (abstract contract or interface?)");
        }

        let mut artifact = ContractArtifact::new(build.contract_name, build.bytecode);
        artifact.known_networks = build
            .networks
            .into_iter()
            .filter_map(|(id, network)| Some((id.parse().ok()?, network.address?)))
            .collect();

        Ok(artifact)
    }
}

impl ArtifactResolver for TruffleArtifactResolver {
    fn resolve(&self, name: &str) -> Result<ContractArtifact> {
        let artifact = self.load(name).map_err(|e| ProvisionError::Artifact {
            artifact: name.to_string(),
            message: format!("{e:#}"),
        })?;
        tracing::debug!(artifact = name, dir = %self.dir.display(), "Artifact resolved");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempdir::TempDir;

    fn write_artifact(dir: &Path, name: &str, body: serde_json::Value) {
        std::fs::write(dir.join(format!("{name}.json")), body.to_string())
            .expect("Failed to write artifact");
    }

    #[test]
    fn test_resolve_truffle_artifact() {
        let temp_dir = TempDir::new("dmm-artifacts").expect("Failed to create temp dir");
        write_artifact(
            temp_dir.path(),
            "DmmTokenFactory",
            serde_json::json!({
                "contractName": "DmmTokenFactory",
                "abi": [],
                "bytecode": "0x6080__DmmTokenLibrary_______________________6040",
                "networks": {
                    "1337": { "address": "0x00000000000000000000000000000000000000aa" },
                    "not-a-number": { "address": "0x00000000000000000000000000000000000000bb" }
                }
            }),
        );

        let resolver = TruffleArtifactResolver::new(temp_dir.path());
        let artifact = resolver.resolve("DmmTokenFactory").unwrap();

        assert_eq!(artifact.name, "DmmTokenFactory");
        assert!(!artifact.is_linked());
        assert_eq!(artifact.network_id, None);
        assert_eq!(artifact.known_networks.len(), 1);
        assert_eq!(
            artifact.known_networks[&1337],
            Address::with_last_byte(0xaa)
        );
    }

    #[test]
    fn test_resolve_missing_artifact() {
        let temp_dir = TempDir::new("dmm-artifacts").expect("Failed to create temp dir");
        let resolver = TruffleArtifactResolver::new(temp_dir.path());

        let err = resolver.resolve("DmmController").unwrap_err();
        assert!(matches!(err, ProvisionError::Artifact { ref artifact, .. } if artifact == "DmmController"));
    }

    #[test]
    fn test_resolve_rejects_mismatched_name_and_empty_bytecode() {
        let temp_dir = TempDir::new("dmm-artifacts").expect("Failed to create temp dir");
        write_artifact(
            temp_dir.path(),
            "DmmController",
            serde_json::json!({ "contractName": "Other", "bytecode": "0x6080" }),
        );
        write_artifact(
            temp_dir.path(),
            "IDmmController",
            serde_json::json!({ "contractName": "IDmmController", "bytecode": "0x" }),
        );

        let resolver = TruffleArtifactResolver::new(temp_dir.path());
        assert!(resolver.resolve("DmmController").is_err());
        assert!(resolver.resolve("IDmmController").is_err());
    }

    #[test]
    fn test_detect_network_records_chain_id() {
        let mut artifact = ContractArtifact::new("DmmEtherFactory", "0x6080");
        artifact.detect_network(42);
        assert_eq!(artifact.network_id, Some(42));
        assert!(artifact.is_linked());
        assert_eq!(artifact.bytecode.to_bytes().unwrap(), vec![0x60, 0x80]);
    }
}
