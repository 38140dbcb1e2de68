//! ---
//! cityheat_section: "08-heat-network-balancing"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Energy balancing routines for local heating networks."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
use crate::{
    model::NodeId,
    profile::{BuildingThermalProfile, DeviceBand},
};

/// A building able to feed heat into the network at one timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupplierRecord {
    pub building: NodeId,
    pub balance_w: f64,
    pub chp: DeviceBand,
    pub boiler: DeviceBand,
}

/// A building drawing heat from the network at one timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumerRecord {
    pub building: NodeId,
    pub deficit_w: f64,
}

/// Classification of all network participants at a single timestep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimestepSnapshot {
    pub timestep: usize,
    pub chp_suppliers: Vec<SupplierRecord>,
    pub boiler_suppliers: Vec<SupplierRecord>,
    pub consumers: Vec<ConsumerRecord>,
    /// Positive-balance buildings with no CHP but an electric heater. They take
    /// no part in the balance because electric heater dispatch does not exist.
    pub dropped_suppliers: Vec<NodeId>,
}

impl TimestepSnapshot {
    pub fn has_deficit(&self) -> bool {
        !self.consumers.is_empty()
    }

    /// Sum of consumer deficits plus the network loss when any deficit exists.
    pub fn total_demand_w(&self, loss_rate_w: f64) -> f64 {
        let deficits: f64 = self.consumers.iter().map(|c| c.deficit_w).sum();
        if self.has_deficit() {
            deficits + loss_rate_w
        } else {
            deficits
        }
    }

    pub fn total_supply_w(&self) -> f64 {
        self.chp_suppliers
            .iter()
            .chain(self.boiler_suppliers.iter())
            .map(|s| s.balance_w)
            .sum()
    }
}

/// Split the participants into CHP suppliers, boiler-only suppliers and consumers.
///
/// Records keep the participant order, which later serves as the ranking tie-break.
pub fn classify(
    participants: &[(NodeId, &BuildingThermalProfile)],
    timestep: usize,
) -> TimestepSnapshot {
    let mut snapshot = TimestepSnapshot {
        timestep,
        ..TimestepSnapshot::default()
    };

    for &(building, profile) in participants {
        let balance_w = profile.net_balance(timestep);
        let chp = profile.chp(timestep);
        let boiler = profile.boiler(timestep);

        if balance_w > 0.0 {
            let record = SupplierRecord {
                building,
                balance_w,
                chp,
                boiler,
            };
            if chp.nominal_w > 0.0 {
                snapshot.chp_suppliers.push(record);
            } else if profile.eh_nominal(timestep) == 0.0 {
                snapshot.boiler_suppliers.push(record);
            } else {
                snapshot.dropped_suppliers.push(building);
            }
        } else if balance_w < 0.0 {
            snapshot.consumers.push(ConsumerRecord {
                building,
                deficit_w: balance_w.abs(),
            });
        }
    }

    snapshot
}
