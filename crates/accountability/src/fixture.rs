//! Operator-supplied claim fixtures.
//!
//! Each protocol run starts from a small TOML file that every node reads
//! once. Claims are decimal strings, aggregate signatures are base64 and
//! signer lists are plain integer arrays:
//!
//! ```toml
//! shard = 1
//! height = 7
//! claim1 = "1234"
//! claim2 = "5678"
//! aggregated_signature1 = "qL3o..."
//! aggregated_signature2 = "tV9k..."
//! signers1 = [0, 1, 2]
//! signers2 = [1, 2, 3]
//! ```
//!
//! Loading validates the fixture against the committee; any violation is
//! fatal.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use kronos_types::{
    signing, ClaimValue, Height, QuorumCertificate, ShardId, Signature, SignerBitfield, Topology,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, DeserializeAs, DisplayFromStr, SerializeAs};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading a fixture.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse fixture: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render fixture: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("shard {shard} is out of range [0, {num_shards})")]
    ShardOutOfRange { shard: u32, num_shards: u32 },

    #[error("signer index {index} is out of range [0, {nodes_per_shard})")]
    SignerOutOfRange { index: usize, nodes_per_shard: u32 },

    #[error("node {node} is out of range [0, {total_nodes})")]
    NodeOutOfRange { node: u32, total_nodes: usize },
}

/// Liveness-fault claim: `shard` stalled at `height` with value `claim`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NlFixture {
    pub shard: u32,
    pub height: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub claim: ClaimValue,
}

impl NlFixture {
    pub fn load(path: impl AsRef<Path>, topology: &dyn Topology) -> Result<Self, FixtureError> {
        let fixture: Self = read_toml(path.as_ref())?;
        fixture.validate(topology)?;
        Ok(fixture)
    }

    pub fn validate(&self, topology: &dyn Topology) -> Result<(), FixtureError> {
        check_shard(self.shard, topology)
    }

    pub fn shard_id(&self) -> ShardId {
        ShardId(self.shard)
    }

    pub fn height(&self) -> Height {
        Height(self.height)
    }
}

/// Safety-fault evidence: two certificates of `shard` at `height` over
/// different claims, signer lists as shard-local indices.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsFixture {
    pub shard: u32,
    pub height: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub claim1: ClaimValue,
    #[serde_as(as = "DisplayFromStr")]
    pub claim2: ClaimValue,
    #[serde_as(as = "Base64Signature")]
    pub aggregated_signature1: Signature,
    #[serde_as(as = "Base64Signature")]
    pub aggregated_signature2: Signature,
    pub signers1: Vec<usize>,
    pub signers2: Vec<usize>,
}

impl NsFixture {
    pub fn load(path: impl AsRef<Path>, topology: &dyn Topology) -> Result<Self, FixtureError> {
        let fixture: Self = read_toml(path.as_ref())?;
        fixture.validate(topology)?;
        Ok(fixture)
    }

    pub fn validate(&self, topology: &dyn Topology) -> Result<(), FixtureError> {
        check_shard(self.shard, topology)?;
        let nodes_per_shard = topology.nodes_per_shard();
        for &index in self.signers1.iter().chain(&self.signers2) {
            if index >= nodes_per_shard as usize {
                return Err(FixtureError::SignerOutOfRange {
                    index,
                    nodes_per_shard,
                });
            }
        }
        Ok(())
    }

    pub fn shard_id(&self) -> ShardId {
        ShardId(self.shard)
    }

    pub fn height(&self) -> Height {
        Height(self.height)
    }

    /// The two certificates, each over `claim_message(height, claim_i)`.
    pub fn certificates(&self, nodes_per_shard: u32) -> (QuorumCertificate, QuorumCertificate) {
        let certify = |claim: &ClaimValue, signers: &[usize], signature: &Signature| {
            QuorumCertificate {
                claim: signing::claim_message(self.height(), claim),
                signers: SignerBitfield::from_indices(
                    nodes_per_shard as usize,
                    signers.iter().copied(),
                ),
                aggregated_signature: signature.clone(),
            }
        };
        (
            certify(&self.claim1, &self.signers1, &self.aggregated_signature1),
            certify(&self.claim2, &self.signers2, &self.aggregated_signature2),
        )
    }

    pub fn to_toml_string(&self) -> Result<String, FixtureError> {
        Ok(toml::to_string(self)?)
    }

    /// Write the fixture to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FixtureError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_toml_string()?).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Reconfiguration request: replace `shard`'s members with `new_nodes`
/// (global ids).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcFixture {
    pub shard: u32,
    pub height: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub claim: ClaimValue,
    pub new_nodes: Vec<u32>,
}

impl RcFixture {
    pub fn load(path: impl AsRef<Path>, topology: &dyn Topology) -> Result<Self, FixtureError> {
        let fixture: Self = read_toml(path.as_ref())?;
        fixture.validate(topology)?;
        Ok(fixture)
    }

    pub fn validate(&self, topology: &dyn Topology) -> Result<(), FixtureError> {
        check_shard(self.shard, topology)?;
        let total_nodes = topology.total_nodes();
        for &node in &self.new_nodes {
            if node as usize >= total_nodes {
                return Err(FixtureError::NodeOutOfRange { node, total_nodes });
            }
        }
        Ok(())
    }

    pub fn shard_id(&self) -> ShardId {
        ShardId(self.shard)
    }

    pub fn height(&self) -> Height {
        Height(self.height)
    }

    /// The requested node set as a bitfield over global ids.
    pub fn new_node_set(&self, total_nodes: usize) -> SignerBitfield {
        SignerBitfield::from_indices(total_nodes, self.new_nodes.iter().map(|n| *n as usize))
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, FixtureError> {
    let contents = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}

fn check_shard(shard: u32, topology: &dyn Topology) -> Result<(), FixtureError> {
    if !topology.contains_shard(ShardId(shard)) {
        return Err(FixtureError::ShardOutOfRange {
            shard,
            num_shards: topology.num_shards(),
        });
    }
    Ok(())
}

/// Signatures as standard base64 strings.
struct Base64Signature;

impl SerializeAs<Signature> for Base64Signature {
    fn serialize_as<S: Serializer>(source: &Signature, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(source.as_bytes()))
    }
}

impl<'de> DeserializeAs<'de, Signature> for Base64Signature {
    fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<Signature, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Signature::from_bytes)
            .map_err(serde::de::Error::custom)
    }
}
