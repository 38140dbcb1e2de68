//! ---
//! cityheat_section: "08-heat-network-balancing"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Energy balancing routines for local heating networks."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Identifier of a node in the district graph.
pub type NodeId = u32;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DistrictModel {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub nodes: Vec<DistrictNode>,
    #[serde(default)]
    pub edges: Vec<DistrictEdge>,
}

impl DistrictModel {
    pub fn find_node(&self, id: NodeId) -> Option<&DistrictNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn is_building(&self, id: NodeId) -> bool {
        self.find_node(id)
            .map(|n| n.kind == NodeKind::Building)
            .unwrap_or(false)
    }

    pub fn building_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Building)
            .map(|n| n.id)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistrictNode {
    pub id: NodeId,
    pub kind: NodeKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Building,
    Street,
    /// Junction node of a heating network.
    Heating,
    /// Junction node of an electrical network.
    Electricity,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    Heating,
    Electricity,
    /// Heating pipe laid together with a decentralized electrical grid cable.
    #[serde(rename = "heating_and_deg")]
    HeatingAndElectricity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistrictEdge {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default)]
    pub network_type: Option<NetworkType>,
    #[serde(alias = "weight", default)]
    pub length_m: f64,
    #[serde(default)]
    pub supply_temp_c: Option<f64>,
    #[serde(default)]
    pub return_temp_c: Option<f64>,
    #[serde(default)]
    pub inner_diameter_m: Option<f64>,
}

impl DistrictEdge {
    pub fn is_heating(&self) -> bool {
        matches!(
            self.network_type,
            Some(NetworkType::Heating) | Some(NetworkType::HeatingAndElectricity)
        )
    }

    pub fn connects(&self, node: NodeId) -> bool {
        self.from == node || self.to == node
    }
}
