//! ---
//! cityheat_section: "08-heat-network-balancing"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Energy balancing routines for local heating networks."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
//! Per-building thermal series consumed by the network balance.
//!
//! Profiles come out of the per-building energy balance: `net_balance` is what the
//! building could export (positive) or must import (negative) at each timestep,
//! and the device series describe the capacity still available on the local CHP
//! and boiler after the building's own demand has been served.

use serde::{Deserialize, Serialize};

use crate::errors::{BalanceError, Result};
use crate::model::NodeId;

/// Available nominal and minimum (part-load) thermal output of one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceBand {
    pub nominal_w: f64,
    pub min_w: f64,
}

impl DeviceBand {
    pub fn new(nominal_w: f64, min_w: f64) -> Self {
        Self { nominal_w, min_w }
    }

    pub fn is_available(&self) -> bool {
        self.nominal_w > 0.0
    }

    /// Load that can be shed before hitting the part-load floor.
    pub fn possible_reduction(&self) -> f64 {
        self.nominal_w - self.min_w
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawProfile {
    net_balance: Vec<f64>,
    chp_nominal: Vec<f64>,
    chp_min: Vec<f64>,
    boiler_nominal: Vec<f64>,
    boiler_min: Vec<f64>,
    #[serde(default)]
    eh_nominal: Option<Vec<f64>>,
}

/// Validated thermal series of one building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawProfile", into = "RawProfile")]
pub struct BuildingThermalProfile {
    net_balance: Vec<f64>,
    chp_nominal: Vec<f64>,
    chp_min: Vec<f64>,
    boiler_nominal: Vec<f64>,
    boiler_min: Vec<f64>,
    eh_nominal: Vec<f64>,
}

impl BuildingThermalProfile {
    /// Build a profile, checking equal lengths, non-negative device series and
    /// `min <= nominal` for both devices. An empty `eh_nominal` means no electric heater.
    pub fn new(
        net_balance: Vec<f64>,
        chp_nominal: Vec<f64>,
        chp_min: Vec<f64>,
        boiler_nominal: Vec<f64>,
        boiler_min: Vec<f64>,
        eh_nominal: Vec<f64>,
    ) -> std::result::Result<Self, String> {
        let len = net_balance.len();
        let eh_nominal = if eh_nominal.is_empty() {
            vec![0.0; len]
        } else {
            eh_nominal
        };

        for (name, series) in [
            ("chp_nominal", &chp_nominal),
            ("chp_min", &chp_min),
            ("boiler_nominal", &boiler_nominal),
            ("boiler_min", &boiler_min),
            ("eh_nominal", &eh_nominal),
        ] {
            if series.len() != len {
                return Err(format!(
                    "{} has {} entries, net_balance has {}",
                    name,
                    series.len(),
                    len
                ));
            }
            if let Some(t) = series.iter().position(|v| !v.is_finite() || *v < 0.0) {
                return Err(format!("{} must be finite and non-negative (timestep {})", name, t));
            }
        }
        if let Some(t) = net_balance.iter().position(|v| !v.is_finite()) {
            return Err(format!("net_balance must be finite (timestep {})", t));
        }
        if let Some(t) = (0..len).find(|&t| chp_min[t] > chp_nominal[t]) {
            return Err(format!("chp_min exceeds chp_nominal at timestep {}", t));
        }
        if let Some(t) = (0..len).find(|&t| boiler_min[t] > boiler_nominal[t]) {
            return Err(format!("boiler_min exceeds boiler_nominal at timestep {}", t));
        }

        Ok(Self {
            net_balance,
            chp_nominal,
            chp_min,
            boiler_nominal,
            boiler_min,
            eh_nominal,
        })
    }

    /// Same as [`BuildingThermalProfile::new`] but tags the failure with the building id.
    pub fn for_building(
        building: NodeId,
        net_balance: Vec<f64>,
        chp: (Vec<f64>, Vec<f64>),
        boiler: (Vec<f64>, Vec<f64>),
        eh_nominal: Vec<f64>,
    ) -> Result<Self> {
        Self::new(net_balance, chp.0, chp.1, boiler.0, boiler.1, eh_nominal)
            .map_err(|reason| BalanceError::InvalidProfile { building, reason })
    }

    pub fn len(&self) -> usize {
        self.net_balance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.net_balance.is_empty()
    }

    pub fn net_balance(&self, t: usize) -> f64 {
        self.net_balance[t]
    }

    pub fn chp(&self, t: usize) -> DeviceBand {
        DeviceBand::new(self.chp_nominal[t], self.chp_min[t])
    }

    pub fn boiler(&self, t: usize) -> DeviceBand {
        DeviceBand::new(self.boiler_nominal[t], self.boiler_min[t])
    }

    pub fn eh_nominal(&self, t: usize) -> f64 {
        self.eh_nominal[t]
    }
}

impl TryFrom<RawProfile> for BuildingThermalProfile {
    type Error = String;

    fn try_from(raw: RawProfile) -> std::result::Result<Self, Self::Error> {
        Self::new(
            raw.net_balance,
            raw.chp_nominal,
            raw.chp_min,
            raw.boiler_nominal,
            raw.boiler_min,
            raw.eh_nominal.unwrap_or_default(),
        )
    }
}

impl From<BuildingThermalProfile> for RawProfile {
    fn from(profile: BuildingThermalProfile) -> Self {
        Self {
            net_balance: profile.net_balance,
            chp_nominal: profile.chp_nominal,
            chp_min: profile.chp_min,
            boiler_nominal: profile.boiler_nominal,
            boiler_min: profile.boiler_min,
            eh_nominal: Some(profile.eh_nominal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_eh_series_defaults_to_zero() {
        let profile = BuildingThermalProfile::new(
            vec![5.0, -2.0],
            vec![4.0, 0.0],
            vec![1.0, 0.0],
            vec![3.0, 3.0],
            vec![0.5, 0.5],
            Vec::new(),
        )
        .unwrap();
        assert_eq!(profile.len(), 2);
        assert_eq!(profile.eh_nominal(1), 0.0);
        assert_eq!(profile.chp(0), DeviceBand::new(4.0, 1.0));
        assert_eq!(profile.boiler(1).possible_reduction(), 2.5);
    }

    #[test]
    fn rejects_min_above_nominal() {
        let err = BuildingThermalProfile::for_building(
            9,
            vec![1.0],
            (vec![2.0], vec![3.0]),
            (vec![0.0], vec![0.0]),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, BalanceError::InvalidProfile { building: 9, .. }));
    }

    #[test]
    fn rejects_length_mismatch_and_negative_values() {
        assert!(BuildingThermalProfile::new(
            vec![1.0, 1.0],
            vec![1.0],
            vec![0.0],
            vec![0.0, 0.0],
            vec![0.0, 0.0],
            Vec::new()
        )
        .is_err());
        assert!(BuildingThermalProfile::new(
            vec![1.0],
            vec![-1.0],
            vec![0.0],
            vec![0.0],
            vec![0.0],
            Vec::new()
        )
        .is_err());
    }

    #[test]
    fn deserialization_validates() {
        let bad = r#"{"net_balance":[1.0],"chp_nominal":[1.0],"chp_min":[2.0],"boiler_nominal":[0.0],"boiler_min":[0.0]}"#;
        assert!(serde_json::from_str::<BuildingThermalProfile>(bad).is_err());

        let good = r#"{"net_balance":[1.0],"chp_nominal":[2.0],"chp_min":[1.0],"boiler_nominal":[0.0],"boiler_min":[0.0]}"#;
        let profile: BuildingThermalProfile = serde_json::from_str(good).unwrap();
        assert_eq!(profile.net_balance(0), 1.0);
    }
}
