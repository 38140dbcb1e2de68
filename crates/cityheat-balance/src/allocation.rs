//! ---
//! cityheat_section: "08-heat-network-balancing"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Energy balancing routines for local heating networks."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
//! Per-timestep allocation of network demand to supplier devices.
//!
//! Each timestep is processed on its own: total demand (deficits plus the network
//! loss when there is any deficit) is covered greedily by CHP units in priority
//! order, then by boilers. The last unit switched on in each pass is throttled so
//! the network is not oversupplied, within its part-load band.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, warn};

use crate::{
    classify::{SupplierRecord, TimestepSnapshot},
    errors::{BalanceError, Result},
    model::NodeId,
    network::NetworkId,
    profile::DeviceBand,
};

/// Tolerance in W for supply/demand comparisons.
pub const DEFAULT_EPSILON_W: f64 = 0.001;

/// How CHP and boiler of one building may be dispatched.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DispatchMode {
    /// CHP and boiler are dispatched independently.
    #[default]
    Flexible,
    /// CHP and boiler always run together. Not available yet.
    Static,
}

impl DispatchMode {
    /// Fails for modes that are named but have no dispatch implementation.
    pub fn ensure_supported(self) -> Result<Self> {
        match self {
            DispatchMode::Flexible => Ok(self),
            DispatchMode::Static => Err(BalanceError::UnsupportedCriterion(
                "static dispatch".to_owned(),
            )),
        }
    }
}

pub fn parse_dispatch_mode(name: &str) -> Result<DispatchMode> {
    name.parse()
        .map_err(|_| BalanceError::UnsupportedCriterion(name.to_owned()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Chp,
    Boiler,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Chp => "chp",
            DeviceKind::Boiler => "boiler",
        }
    }
}

/// One device running for the network at a timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitDispatch {
    pub building: NodeId,
    pub device: DeviceKind,
    pub band: DeviceBand,
    pub supply_w: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimestepAllocation {
    pub timestep: usize,
    pub demand_w: f64,
    /// Surplus that part-load floors made unavoidable.
    pub dumped_w: f64,
    pub units: Vec<UnitDispatch>,
    pub dropped_suppliers: Vec<NodeId>,
}

impl TimestepAllocation {
    pub fn supplied_w(&self) -> f64 {
        self.units.iter().map(|u| u.supply_w).sum()
    }

    pub fn supply_of(&self, building: NodeId, device: DeviceKind) -> f64 {
        self.units
            .iter()
            .filter(|u| u.building == building && u.device == device)
            .map(|u| u.supply_w)
            .sum()
    }
}

#[derive(Debug, Clone, Default)]
struct DispatchState {
    units: Vec<UnitDispatch>,
    running_w: f64,
}

impl DispatchState {
    /// Switch on candidates at nominal output while the running total is below
    /// demand. Returns the index of the last unit switched on by this walk.
    fn walk<I>(&mut self, candidates: I, demand_w: f64) -> Option<usize>
    where
        I: IntoIterator<Item = (NodeId, DeviceKind, DeviceBand)>,
    {
        let mut last = None;
        for (building, device, band) in candidates {
            if self.running_w >= demand_w {
                break;
            }
            self.running_w += band.nominal_w;
            self.units.push(UnitDispatch {
                building,
                device,
                band,
                supply_w: band.nominal_w,
            });
            last = Some(self.units.len() - 1);
        }
        last
    }

    /// Throttle unit `last` so the running total matches demand. Returns the
    /// surplus that remains once every running unit sits at its minimum.
    fn fit_partload(&mut self, last: usize, demand_w: f64) -> f64 {
        let remainder = self.running_w - demand_w;
        if remainder <= 0.0 {
            return 0.0;
        }

        let possible_reduction = self.units[last].band.possible_reduction();
        if remainder < possible_reduction {
            self.units[last].supply_w -= remainder;
            self.running_w = demand_w;
            return 0.0;
        }

        self.units[last].supply_w = self.units[last].band.min_w;
        self.running_w -= possible_reduction;

        // Shed what is left from the other running units, lowest priority first.
        let mut excess = self.running_w - demand_w;
        for unit in self.units[..last].iter_mut().rev() {
            if excess <= 0.0 {
                break;
            }
            let shed = excess.min((unit.supply_w - unit.band.min_w).max(0.0));
            unit.supply_w -= shed;
            self.running_w -= shed;
            excess -= shed;
        }
        excess.max(0.0)
    }
}

/// Walk and fit the boilers of all ranked suppliers. Returns the unavoidable surplus.
fn boiler_pass(state: &mut DispatchState, ranked: &[SupplierRecord], demand_w: f64) -> f64 {
    let boiler_units = ranked
        .iter()
        .filter(|s| s.boiler.is_available())
        .map(|s| (s.building, DeviceKind::Boiler, s.boiler));
    match state.walk(boiler_units, demand_w) {
        Some(last) => state.fit_partload(last, demand_w),
        None => 0.0,
    }
}

/// Allocates the demand of single timesteps to ranked suppliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocationEngine {
    loss_rate_w: f64,
    mode: DispatchMode,
    epsilon_w: f64,
}

impl AllocationEngine {
    pub fn new(loss_rate_w: f64, mode: DispatchMode) -> Self {
        Self {
            loss_rate_w,
            mode,
            epsilon_w: DEFAULT_EPSILON_W,
        }
    }

    pub fn with_epsilon(mut self, epsilon_w: f64) -> Self {
        self.epsilon_w = epsilon_w;
        self
    }

    pub fn loss_rate_w(&self) -> f64 {
        self.loss_rate_w
    }

    pub fn epsilon_w(&self) -> f64 {
        self.epsilon_w
    }

    pub fn allocate(
        &self,
        snapshot: &TimestepSnapshot,
        ranked: &[SupplierRecord],
    ) -> Result<TimestepAllocation> {
        self.mode.ensure_supported()?;

        let timestep = snapshot.timestep;
        let demand_w = snapshot.total_demand_w(self.loss_rate_w);
        let supply_w = snapshot.total_supply_w();
        if supply_w - demand_w < -self.epsilon_w {
            return Err(BalanceError::InsufficientSupply {
                timestep,
                supply_w,
                demand_w,
            });
        }

        let mut state = DispatchState::default();
        let mut dumped_w = 0.0;
        let mut boilers_dispatched = false;

        let chp_units = ranked
            .iter()
            .filter(|s| s.chp.is_available())
            .map(|s| (s.building, DeviceKind::Chp, s.chp));
        if let Some(last) = state.walk(chp_units, demand_w) {
            let unfitted = state.clone();
            let excess = state.fit_partload(last, demand_w);
            if excess > self.epsilon_w {
                // Even at minimum load the CHP fleet oversupplies. Try the plan
                // with the last unit off and boilers covering its share, and keep
                // it only when it covers demand and dumps strictly less.
                let mut switched_off = unfitted;
                let removed = switched_off.units.remove(last);
                switched_off.running_w -= removed.supply_w;
                let switched_dumped_w = boiler_pass(&mut switched_off, ranked, demand_w);
                let covers_demand = switched_off.running_w >= demand_w - self.epsilon_w;
                if covers_demand && switched_dumped_w < excess - self.epsilon_w {
                    debug!(
                        timestep,
                        building = removed.building,
                        fitted_dumped_w = excess,
                        switched_dumped_w,
                        "CHP below part-load floor, shifting its share to boilers"
                    );
                    state = switched_off;
                    dumped_w = switched_dumped_w;
                    boilers_dispatched = true;
                } else {
                    dumped_w = excess;
                }
            }
        }

        if !boilers_dispatched && state.running_w < demand_w {
            dumped_w += boiler_pass(&mut state, ranked, demand_w);
        }
        if dumped_w > self.epsilon_w {
            warn!(timestep, dumped_w, "part-load floors exceed network demand");
        }

        if state.running_w < demand_w - self.epsilon_w {
            return Err(BalanceError::InsufficientSupply {
                timestep,
                supply_w: state.running_w,
                demand_w,
            });
        }

        Ok(TimestepAllocation {
            timestep,
            demand_w,
            dumped_w,
            units: state.units,
            dropped_suppliers: snapshot.dropped_suppliers.clone(),
        })
    }
}

/// Network heat each building's devices produce, serialised under the keys used
/// in archived result bundles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingAllocation {
    #[serde(rename = "chp_nominal")]
    pub chp_supply_w: Vec<f64>,
    #[serde(rename = "boiler_nominal")]
    pub boiler_supply_w: Vec<f64>,
}

impl BuildingAllocation {
    pub fn zeros(horizon: usize) -> Self {
        Self {
            chp_supply_w: vec![0.0; horizon],
            boiler_supply_w: vec![0.0; horizon],
        }
    }

    pub fn is_idle(&self, t: usize) -> bool {
        self.chp_supply_w[t] == 0.0 && self.boiler_supply_w[t] == 0.0
    }

    pub fn total_w(&self, t: usize) -> f64 {
        self.chp_supply_w[t] + self.boiler_supply_w[t]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub network: NetworkId,
    pub horizon: usize,
    pub buildings: IndexMap<NodeId, BuildingAllocation>,
    pub demand_w: Vec<f64>,
    pub dumped_heat_w: Vec<f64>,
    /// Timesteps at which electric-heater-only surplus was left out of the balance.
    #[serde(default)]
    pub dropped_suppliers: BTreeMap<usize, Vec<NodeId>>,
}

impl AllocationResult {
    pub fn new(network: NetworkId, buildings: &[NodeId], horizon: usize) -> Self {
        Self {
            network,
            horizon,
            buildings: buildings
                .iter()
                .map(|&b| (b, BuildingAllocation::zeros(horizon)))
                .collect(),
            demand_w: vec![0.0; horizon],
            dumped_heat_w: vec![0.0; horizon],
            dropped_suppliers: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, allocation: &TimestepAllocation) {
        let t = allocation.timestep;
        let horizon = self.horizon;
        self.demand_w[t] = allocation.demand_w;
        self.dumped_heat_w[t] = allocation.dumped_w;
        for unit in &allocation.units {
            let entry = self
                .buildings
                .entry(unit.building)
                .or_insert_with(|| BuildingAllocation::zeros(horizon));
            match unit.device {
                DeviceKind::Chp => entry.chp_supply_w[t] = unit.supply_w,
                DeviceKind::Boiler => entry.boiler_supply_w[t] = unit.supply_w,
            }
        }
        if !allocation.dropped_suppliers.is_empty() {
            self.dropped_suppliers
                .insert(t, allocation.dropped_suppliers.clone());
        }
    }

    pub fn supplied_w(&self, t: usize) -> f64 {
        self.buildings.values().map(|b| b.total_w(t)).sum()
    }

    pub fn chp_supply_w(&self, building: NodeId, t: usize) -> f64 {
        self.buildings
            .get(&building)
            .map(|b| b.chp_supply_w[t])
            .unwrap_or(0.0)
    }

    pub fn boiler_supply_w(&self, building: NodeId, t: usize) -> f64 {
        self.buildings
            .get(&building)
            .map(|b| b.boiler_supply_w[t])
            .unwrap_or(0.0)
    }

    /// Raw per-building series keyed by building id.
    pub fn allocations(&self) -> &IndexMap<NodeId, BuildingAllocation> {
        &self.buildings
    }
}
