//! ---
//! cityheat_section: "08-heat-network-balancing"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Energy balancing routines for local heating networks."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
use thiserror::Error;

use crate::model::NodeId;
use crate::network::NetworkId;

pub type Result<T> = std::result::Result<T, BalanceError>;

#[derive(Debug, Error)]
pub enum BalanceError {
    #[error(
        "insufficient network supply at timestep {timestep}: {supply_w:.3} W available, {demand_w:.3} W required"
    )]
    InsufficientSupply {
        timestep: usize,
        supply_w: f64,
        demand_w: f64,
    },
    #[error("unsupported criterion or dispatch mode: {0}")]
    UnsupportedCriterion(String),
    #[error("node {0} not found in district model")]
    UnknownNode(NodeId),
    #[error("building {building} is not connected to network anchor {anchor} through heating pipes")]
    NotConnected { building: NodeId, anchor: NodeId },
    #[error("building {building} belongs to heating networks {first} and {second}")]
    DuplicateMembership {
        building: NodeId,
        first: NetworkId,
        second: NetworkId,
    },
    #[error("invalid thermal profile for building {building}: {reason}")]
    InvalidProfile { building: NodeId, reason: String },
    #[error("building {building} provides {actual} timesteps, horizon is {expected}")]
    HorizonMismatch {
        building: NodeId,
        expected: usize,
        actual: usize,
    },
    #[error("no thermal profile for network participant {0}")]
    MissingProfile(NodeId),
    #[error("pipe inner diameter must be positive, got {0}")]
    InvalidDiameter(f64),
    #[error("building {building} has no {device} but the network assigned it heat")]
    MissingDevice {
        building: NodeId,
        device: &'static str,
    },
    #[error(
        "{device} of building {building} asked for {requested_w:.3} W at timestep {timestep}, nominal is {nominal_w:.3} W"
    )]
    DeviceOverload {
        building: NodeId,
        device: &'static str,
        timestep: usize,
        requested_w: f64,
        nominal_w: f64,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("result bundle hash mismatch")]
    HashMismatch,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    SerializationFailed(#[from] serde_json::Error),
    #[error("yaml serialization error: {0}")]
    YamlSerializationFailed(#[from] serde_yaml::Error),
    #[error("toml parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("csv export error: {0}")]
    Csv(#[from] csv::Error),
}

impl BalanceError {
    /// Whether the error marks an infeasible scenario rather than bad input or I/O.
    pub fn is_infeasible(&self) -> bool {
        matches!(self, BalanceError::InsufficientSupply { .. })
    }
}
