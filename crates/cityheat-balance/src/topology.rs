//! ---
//! cityheat_section: "08-heat-network-balancing"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Energy balancing routines for local heating networks."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::{
    graph::{NodeIndex, UnGraph},
    visit::Bfs,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    errors::{BalanceError, Result},
    model::{DistrictEdge, DistrictModel, NodeId, NodeKind},
};

/// Heating-network part of a district, extracted around a set of buildings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkTopology {
    pub anchor: Option<NodeId>,
    /// Participating buildings in the order they were requested.
    pub buildings: Vec<NodeId>,
    /// Every node reachable from the anchor over heating pipes, ascending.
    pub nodes: Vec<NodeId>,
    pub edges: Vec<DistrictEdge>,
    pub total_length_m: f64,
    pub inner_diameter_m: Option<f64>,
    pub supply_temp_c: Option<f64>,
    pub return_temp_c: Option<f64>,
}

impl NetworkTopology {
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.binary_search(&node).is_ok()
    }
}

/// Undirected graph over all district nodes that only carries heating pipes.
struct HeatingGraph {
    graph: UnGraph<NodeId, usize>,
    indices: HashMap<NodeId, NodeIndex>,
}

impl HeatingGraph {
    fn new(model: &DistrictModel) -> Self {
        let mut graph = UnGraph::<NodeId, usize>::new_undirected();
        let mut indices = HashMap::new();
        for node in &model.nodes {
            let index = graph.add_node(node.id);
            indices.insert(node.id, index);
        }
        for (edge_idx, edge) in model.edges.iter().enumerate() {
            if !edge.is_heating() {
                continue;
            }
            if let (Some(from), Some(to)) = (indices.get(&edge.from), indices.get(&edge.to)) {
                graph.add_edge(*from, *to, edge_idx);
            } else {
                warn!(
                    from = edge.from,
                    to = edge.to,
                    "heating edge references unknown node, skipping"
                );
            }
        }
        Self { graph, indices }
    }

    fn component(&self, start: NodeIndex) -> BTreeSet<NodeId> {
        let mut members = BTreeSet::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(index) = bfs.next(&self.graph) {
            members.insert(self.graph[index]);
        }
        members
    }

    fn edge_indices_within(&self, members: &BTreeSet<NodeId>) -> Vec<usize> {
        let mut edges: Vec<usize> = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (a, b) = self.graph.edge_endpoints(e)?;
                (members.contains(&self.graph[a]) && members.contains(&self.graph[b]))
                    .then(|| self.graph[e])
            })
            .collect();
        edges.sort_unstable();
        edges
    }
}

/// Extract the heating network shared by `buildings`, searching from the first one.
///
/// An empty building list or a network without heating pipes yields an empty
/// topology with zero length, which downstream turns into a zero loss rate.
pub fn extract_network(model: &DistrictModel, buildings: &[NodeId]) -> Result<NetworkTopology> {
    let Some(&anchor) = buildings.first() else {
        warn!("no participating buildings given, using empty heating network");
        return Ok(NetworkTopology::default());
    };

    let heating = HeatingGraph::new(model);
    let anchor_idx = *heating
        .indices
        .get(&anchor)
        .ok_or(BalanceError::UnknownNode(anchor))?;
    let members = heating.component(anchor_idx);

    for &building in buildings {
        if !heating.indices.contains_key(&building) {
            return Err(BalanceError::UnknownNode(building));
        }
        if !members.contains(&building) {
            return Err(BalanceError::NotConnected { building, anchor });
        }
    }

    let edges: Vec<DistrictEdge> = heating
        .edge_indices_within(&members)
        .into_iter()
        .map(|idx| model.edges[idx].clone())
        .collect();
    let total_length_m = edges.iter().map(|e| e.length_m).sum();

    // One representative value per parameter; segment-wise diameters are not modelled.
    let inner_diameter_m = edges.iter().find_map(|e| e.inner_diameter_m);
    let supply_temp_c = edges.iter().find_map(|e| e.supply_temp_c);
    let return_temp_c = edges.iter().find_map(|e| e.return_temp_c);

    if edges.is_empty() {
        warn!(anchor, "no heating pipes found around anchor building");
    }
    debug!(
        anchor,
        nodes = members.len(),
        edges = edges.len(),
        total_length_m,
        "extracted heating network"
    );

    Ok(NetworkTopology {
        anchor: Some(anchor),
        buildings: buildings.to_vec(),
        nodes: members.into_iter().collect(),
        edges,
        total_length_m,
        inner_diameter_m,
        supply_temp_c,
        return_temp_c,
    })
}

/// Discover every heating network of the district.
///
/// A network is a connected component of the heating pipes linking at least two
/// buildings. Networks are returned ordered by their smallest building id, each
/// listing its buildings in ascending order.
pub fn find_heating_networks(model: &DistrictModel) -> Vec<Vec<NodeId>> {
    let heating = HeatingGraph::new(model);
    let node_kinds: HashMap<NodeId, NodeKind> = model.nodes.iter().map(|n| (n.id, n.kind)).collect();

    let mut building_ids = model.building_ids();
    building_ids.sort_unstable();

    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut networks = Vec::new();
    for building in building_ids {
        if visited.contains(&building) {
            continue;
        }
        let Some(&index) = heating.indices.get(&building) else {
            continue;
        };
        let members = heating.component(index);
        visited.extend(members.iter().copied());
        let buildings: Vec<NodeId> = members
            .into_iter()
            .filter(|id| node_kinds.get(id) == Some(&NodeKind::Building))
            .collect();
        if buildings.len() >= 2 {
            networks.push(buildings);
        }
    }
    networks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DistrictNode, NetworkType};

    fn node(id: NodeId, kind: NodeKind) -> DistrictNode {
        DistrictNode {
            id,
            kind,
            name: None,
            position: None,
        }
    }

    fn pipe(from: NodeId, to: NodeId, length_m: f64, network_type: NetworkType) -> DistrictEdge {
        DistrictEdge {
            from,
            to,
            network_type: Some(network_type),
            length_m,
            supply_temp_c: Some(70.0),
            return_temp_c: Some(45.0),
            inner_diameter_m: Some(0.04),
        }
    }

    /// Two buildings on a heating network, one building wired only electrically,
    /// and a separate pair of buildings on a second heating network.
    fn sample_district() -> DistrictModel {
        DistrictModel {
            version: None,
            nodes: vec![
                node(1, NodeKind::Building),
                node(2, NodeKind::Building),
                node(3, NodeKind::Building),
                node(10, NodeKind::Heating),
                node(11, NodeKind::Heating),
                node(4, NodeKind::Building),
                node(5, NodeKind::Building),
            ],
            edges: vec![
                pipe(1, 10, 20.0, NetworkType::Heating),
                pipe(10, 11, 50.0, NetworkType::HeatingAndElectricity),
                pipe(11, 2, 15.0, NetworkType::Heating),
                pipe(2, 3, 30.0, NetworkType::Electricity),
                pipe(4, 5, 12.0, NetworkType::Heating),
            ],
        }
    }

    #[test]
    fn extracts_connected_heating_subgraph() {
        let model = sample_district();
        let topology = extract_network(&model, &[1, 2]).unwrap();
        assert_eq!(topology.anchor, Some(1));
        assert_eq!(topology.nodes, vec![1, 2, 10, 11]);
        assert_eq!(topology.edges.len(), 3);
        assert_eq!(topology.total_length_m, 85.0);
        assert_eq!(topology.inner_diameter_m, Some(0.04));
        assert_eq!(topology.supply_temp_c, Some(70.0));
        assert!(!topology.contains(3));
    }

    #[test]
    fn electrically_connected_building_is_rejected() {
        let model = sample_district();
        let err = extract_network(&model, &[1, 3]).unwrap_err();
        assert!(matches!(
            err,
            BalanceError::NotConnected {
                building: 3,
                anchor: 1
            }
        ));
    }

    #[test]
    fn unknown_anchor_is_rejected() {
        let model = sample_district();
        assert!(matches!(
            extract_network(&model, &[99]),
            Err(BalanceError::UnknownNode(99))
        ));
    }

    #[test]
    fn empty_building_list_is_an_empty_network() {
        let model = sample_district();
        let topology = extract_network(&model, &[]).unwrap();
        assert!(topology.is_empty());
        assert_eq!(topology.total_length_m, 0.0);
    }

    #[test]
    fn isolated_building_has_zero_length() {
        let model = sample_district();
        let topology = extract_network(&model, &[3]).unwrap();
        assert!(topology.is_empty());
        assert_eq!(topology.inner_diameter_m, None);
    }

    #[test]
    fn discovers_all_networks() {
        let model = sample_district();
        let networks = find_heating_networks(&model);
        assert_eq!(networks, vec![vec![1, 2], vec![4, 5]]);
    }
}
