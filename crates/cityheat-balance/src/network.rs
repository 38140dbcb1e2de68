//! ---
//! cityheat_section: "08-heat-network-balancing"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Energy balancing routines for local heating networks."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    errors::{BalanceError, Result},
    losses::estimate_loss,
    model::{DistrictModel, NodeId},
    topology::{extract_network, NetworkTopology},
};

pub type NetworkId = usize;

/// A heating network with its constant design-point loss rate.
///
/// Built once per run and not modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalNetwork {
    id: NetworkId,
    buildings: Vec<NodeId>,
    total_length_m: f64,
    inner_diameter_m: Option<f64>,
    supply_temp_c: Option<f64>,
    return_temp_c: Option<f64>,
    loss_rate_w: f64,
}

impl ThermalNetwork {
    pub fn from_topology(
        id: NetworkId,
        topology: &NetworkTopology,
        ground_temp_c: f64,
    ) -> Result<Self> {
        let loss_rate_w = match (
            topology.inner_diameter_m,
            topology.supply_temp_c,
            topology.return_temp_c,
        ) {
            _ if topology.total_length_m <= 0.0 => 0.0,
            (Some(d_i), Some(t_sup), Some(t_ret)) => {
                estimate_loss(topology.total_length_m, d_i, t_sup, t_ret, ground_temp_c)?
            }
            _ => {
                warn!(
                    network = id,
                    "heating pipes lack diameter or design temperatures, assuming zero loss"
                );
                0.0
            }
        };

        info!(
            network = id,
            buildings = topology.buildings.len(),
            length_m = topology.total_length_m,
            loss_rate_w,
            "heating network prepared"
        );

        Ok(Self {
            id,
            buildings: topology.buildings.clone(),
            total_length_m: topology.total_length_m,
            inner_diameter_m: topology.inner_diameter_m,
            supply_temp_c: topology.supply_temp_c,
            return_temp_c: topology.return_temp_c,
            loss_rate_w,
        })
    }

    /// Extract the topology around `buildings` and build the network in one go.
    pub fn extract(
        id: NetworkId,
        model: &DistrictModel,
        buildings: &[NodeId],
        ground_temp_c: f64,
    ) -> Result<Self> {
        let topology = extract_network(model, buildings)?;
        Self::from_topology(id, &topology, ground_temp_c)
    }

    /// Network with a given loss rate and no pipe geometry, for callers that
    /// computed the loss elsewhere.
    pub fn with_loss_rate(id: NetworkId, buildings: Vec<NodeId>, loss_rate_w: f64) -> Self {
        Self {
            id,
            buildings,
            total_length_m: 0.0,
            inner_diameter_m: None,
            supply_temp_c: None,
            return_temp_c: None,
            loss_rate_w: loss_rate_w.max(0.0),
        }
    }

    pub fn id(&self) -> NetworkId {
        self.id
    }

    pub fn buildings(&self) -> &[NodeId] {
        &self.buildings
    }

    pub fn total_length_m(&self) -> f64 {
        self.total_length_m
    }

    pub fn inner_diameter_m(&self) -> Option<f64> {
        self.inner_diameter_m
    }

    pub fn supply_temp_c(&self) -> Option<f64> {
        self.supply_temp_c
    }

    pub fn return_temp_c(&self) -> Option<f64> {
        self.return_temp_c
    }

    pub fn loss_rate_w(&self) -> f64 {
        self.loss_rate_w
    }
}

/// Building to network ownership map. A building belongs to at most one network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkMembership {
    owners: IndexMap<NodeId, NetworkId>,
}

impl NetworkMembership {
    pub fn from_networks(networks: &[Vec<NodeId>]) -> Result<Self> {
        let mut owners = IndexMap::new();
        for (network_id, buildings) in networks.iter().enumerate() {
            for &building in buildings {
                match owners.get(&building) {
                    Some(&first) if first != network_id => {
                        return Err(BalanceError::DuplicateMembership {
                            building,
                            first,
                            second: network_id,
                        })
                    }
                    Some(_) => {}
                    None => {
                        owners.insert(building, network_id);
                    }
                }
            }
        }
        Ok(Self { owners })
    }

    pub fn network_of(&self, building: NodeId) -> Option<NetworkId> {
        self.owners.get(&building).copied()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
