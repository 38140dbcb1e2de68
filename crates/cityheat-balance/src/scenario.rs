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

use crate::{
    devices::BuildingEnergySystem,
    errors::{BalanceError, Result},
    model::{DistrictModel, NodeId},
    profile::BuildingThermalProfile,
};

/// Heat each building's devices already deliver for the building's own demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalDispatch {
    #[serde(default)]
    pub chp_heat_w: Vec<f64>,
    #[serde(default)]
    pub boiler_heat_w: Vec<f64>,
}

impl LocalDispatch {
    pub fn chp_at(&self, t: usize) -> f64 {
        self.chp_heat_w.get(t).copied().unwrap_or(0.0)
    }

    pub fn boiler_at(&self, t: usize) -> f64 {
        self.boiler_heat_w.get(t).copied().unwrap_or(0.0)
    }
}

/// Realised device operation of a building, updated by the results writer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingOperation {
    #[serde(default)]
    pub chp_heat_w: Vec<f64>,
    #[serde(default)]
    pub boiler_heat_w: Vec<f64>,
    #[serde(default)]
    pub fuel_w: Vec<f64>,
    #[serde(default)]
    pub chp_electricity_w: Vec<f64>,
    /// Heat produced only because a device could not run below its minimum.
    #[serde(default)]
    pub wasted_heat_w: Vec<f64>,
}

impl BuildingOperation {
    pub fn ensure_horizon(&mut self, horizon: usize) {
        for series in [
            &mut self.chp_heat_w,
            &mut self.boiler_heat_w,
            &mut self.fuel_w,
            &mut self.chp_electricity_w,
            &mut self.wasted_heat_w,
        ] {
            if series.len() < horizon {
                series.resize(horizon, 0.0);
            }
        }
    }

    pub fn total_fuel_wh(&self, timestep_h: f64) -> f64 {
        self.fuel_w.iter().sum::<f64>() * timestep_h
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub energy_system: BuildingEnergySystem,
    pub profile: BuildingThermalProfile,
    #[serde(default)]
    pub local: LocalDispatch,
    #[serde(default)]
    pub operation: BuildingOperation,
}

impl BuildingRecord {
    /// Check the installed electric heater against the profile's `eh_nominal`
    /// series: the series may never exceed the installed size, and an installed
    /// heater must show up in the series at least once.
    pub fn check_electric_heater(&self, building: NodeId) -> Result<()> {
        let installed_w = self.energy_system.electric_heater_nominal_w;
        if !installed_w.is_finite() || installed_w < 0.0 {
            return Err(BalanceError::InvalidProfile {
                building,
                reason: format!("electric heater size {} W is not a valid power", installed_w),
            });
        }
        let len = self.profile.len();
        if let Some(t) = (0..len).find(|&t| self.profile.eh_nominal(t) > installed_w) {
            return Err(BalanceError::InvalidProfile {
                building,
                reason: format!(
                    "eh_nominal {} W exceeds the installed electric heater of {} W at timestep {}",
                    self.profile.eh_nominal(t),
                    installed_w,
                    t
                ),
            });
        }
        if installed_w > 0.0 && len > 0 && (0..len).all(|t| self.profile.eh_nominal(t) == 0.0) {
            return Err(BalanceError::InvalidProfile {
                building,
                reason: format!(
                    "electric heater of {} W installed but eh_nominal is zero throughout",
                    installed_w
                ),
            });
        }
        Ok(())
    }
}

/// District graph plus the per-building inputs and outputs of a balancing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistrictScenario {
    pub district: DistrictModel,
    /// Explicit heating networks. Discovered from the pipes when absent.
    #[serde(default)]
    pub networks: Option<Vec<Vec<NodeId>>>,
    #[serde(default)]
    pub buildings: IndexMap<NodeId, BuildingRecord>,
}

impl DistrictScenario {
    /// Common length of all building profiles. Zero for a scenario without buildings.
    pub fn horizon(&self) -> Result<usize> {
        let mut records = self.buildings.iter();
        let Some((_, first)) = records.next() else {
            return Ok(0);
        };
        let expected = first.profile.len();
        for (&building, record) in records {
            if record.profile.len() != expected {
                return Err(BalanceError::HorizonMismatch {
                    building,
                    expected,
                    actual: record.profile.len(),
                });
            }
        }
        Ok(expected)
    }

    /// Cross-check device data against the thermal profiles of every building.
    pub fn validate(&self) -> Result<()> {
        for (&building, record) in &self.buildings {
            record.check_electric_heater(building)?;
        }
        Ok(())
    }

    pub fn profiles(&self) -> IndexMap<NodeId, &BuildingThermalProfile> {
        self.buildings
            .iter()
            .map(|(&id, record)| (id, &record.profile))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(len: usize) -> BuildingRecord {
        record_with_heater(len, 0.0, Vec::new())
    }

    fn record_with_heater(len: usize, installed_w: f64, eh_nominal: Vec<f64>) -> BuildingRecord {
        BuildingRecord {
            name: None,
            energy_system: BuildingEnergySystem {
                electric_heater_nominal_w: installed_w,
                ..BuildingEnergySystem::default()
            },
            profile: BuildingThermalProfile::new(
                vec![0.0; len],
                vec![0.0; len],
                vec![0.0; len],
                vec![0.0; len],
                vec![0.0; len],
                eh_nominal,
            )
            .unwrap(),
            local: LocalDispatch::default(),
            operation: BuildingOperation::default(),
        }
    }

    #[test]
    fn horizon_requires_equal_lengths() {
        let mut scenario = DistrictScenario::default();
        assert_eq!(scenario.horizon().unwrap(), 0);
        scenario.buildings.insert(1, record(24));
        scenario.buildings.insert(2, record(24));
        assert_eq!(scenario.horizon().unwrap(), 24);
        scenario.buildings.insert(3, record(12));
        assert!(matches!(
            scenario.horizon(),
            Err(BalanceError::HorizonMismatch {
                building: 3,
                expected: 24,
                actual: 12
            })
        ));
    }

    #[test]
    fn operation_series_grow_to_horizon() {
        let mut operation = BuildingOperation {
            fuel_w: vec![1.0, 2.0],
            ..BuildingOperation::default()
        };
        operation.ensure_horizon(4);
        assert_eq!(operation.fuel_w, vec![1.0, 2.0, 0.0, 0.0]);
        assert_eq!(operation.wasted_heat_w.len(), 4);
        assert_eq!(operation.total_fuel_wh(1.0), 3.0);
    }

    #[test]
    fn local_dispatch_defaults_to_zero() {
        let local = LocalDispatch::default();
        assert_eq!(local.chp_at(5), 0.0);
        assert_eq!(local.boiler_at(5), 0.0);
    }

    #[test]
    fn electric_heater_must_match_profile() {
        let mut scenario = DistrictScenario::default();
        scenario.buildings.insert(1, record(3));
        scenario.buildings.insert(2, record_with_heater(3, 2000.0, vec![0.0, 2000.0, 1500.0]));
        scenario.validate().unwrap();

        scenario.buildings.insert(3, record_with_heater(3, 2000.0, Vec::new()));
        let err = scenario.validate().unwrap_err();
        assert!(matches!(err, BalanceError::InvalidProfile { building: 3, .. }), "{err}");
        scenario.buildings.shift_remove(&3);

        scenario.buildings.insert(4, record_with_heater(3, 0.0, vec![0.0, 500.0, 0.0]));
        let err = scenario.validate().unwrap_err();
        assert!(matches!(err, BalanceError::InvalidProfile { building: 4, .. }), "{err}");
    }
}
