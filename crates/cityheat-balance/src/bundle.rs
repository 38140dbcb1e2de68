//! ---
//! cityheat_section: "08-heat-network-balancing"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Energy balancing routines for local heating networks."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
//! On-disk archive of a balancing run: the updated scenario plus the raw
//! per-building allocation, wrapped in an envelope carrying a SHA-256 hash.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    allocation::BuildingAllocation,
    errors::{BalanceError, Result},
    model::NodeId,
    scenario::DistrictScenario,
    DistrictBalance,
};

pub const BUNDLE_VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    pub district: DistrictScenario,
    pub allocations: IndexMap<NodeId, BuildingAllocation>,
}

impl ResultBundle {
    /// Collect the allocations of every network into one map keyed by building.
    pub fn from_balance(district: DistrictScenario, balance: &DistrictBalance) -> Self {
        let allocations = balance
            .allocations
            .iter()
            .flat_map(|result| result.allocations().iter())
            .map(|(&building, series)| (building, series.clone()))
            .collect();
        Self {
            district,
            allocations,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEnvelope {
    pub version: u16,
    pub created_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub hash: String,
    pub bundle: ResultBundle,
}

enum BundleFormat {
    Json,
    Yaml,
}

impl BundleFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => BundleFormat::Yaml,
            _ => BundleFormat::Json,
        }
    }
}

/// Persist a bundle. `.yaml`/`.yml` paths are written as YAML, everything else as JSON.
pub fn save_bundle(bundle: &ResultBundle, run_id: Uuid, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let envelope = BundleEnvelope {
        version: BUNDLE_VERSION,
        created_at: Utc::now(),
        run_id,
        hash: compute_hash(bundle)?,
        bundle: bundle.clone(),
    };

    let mut writer = BufWriter::new(File::create(path)?);
    match BundleFormat::for_path(path) {
        BundleFormat::Yaml => serde_yaml::to_writer(&mut writer, &envelope)?,
        BundleFormat::Json => serde_json::to_writer_pretty(&mut writer, &envelope)?,
    }
    writer.flush()?;
    Ok(())
}

/// Load a bundle and check its hash.
pub fn load_bundle(path: &Path) -> Result<BundleEnvelope> {
    let envelope = load_envelope(path)?;
    if envelope.hash != compute_hash(&envelope.bundle)? {
        return Err(BalanceError::HashMismatch);
    }
    Ok(envelope)
}

pub fn verify_bundle(path: &Path) -> bool {
    match load_envelope(path) {
        Ok(envelope) => compute_hash(&envelope.bundle)
            .map(|hash| hash == envelope.hash)
            .unwrap_or(false),
        Err(_) => false,
    }
}

fn load_envelope(path: &Path) -> Result<BundleEnvelope> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    let envelope = match BundleFormat::for_path(path) {
        BundleFormat::Yaml => serde_yaml::from_slice(&bytes)?,
        BundleFormat::Json => serde_json::from_slice(&bytes)?,
    };
    Ok(envelope)
}

fn compute_hash(bundle: &ResultBundle) -> Result<String> {
    let serialized = serde_json::to_vec(bundle)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized);
    Ok(hex::encode(hasher.finalize()))
}
