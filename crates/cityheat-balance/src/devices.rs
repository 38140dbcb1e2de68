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

use crate::allocation::DeviceKind;

fn default_boiler_efficiency() -> f64 {
    0.92
}

fn default_boiler_lal() -> f64 {
    0.1
}

fn default_chp_omega() -> f64 {
    0.87
}

fn default_chp_lal() -> f64 {
    0.6
}

/// Realised operation of a heat generator at a setpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorOutput {
    pub heat_w: f64,
    pub fuel_w: f64,
    pub electricity_w: f64,
}

/// Thermal generator as seen by the results writer.
pub trait HeatGenerator {
    fn kind(&self) -> DeviceKind;

    fn nominal_heat_w(&self) -> f64;

    /// Minimum share of nominal output while running.
    fn lower_activation_limit(&self) -> f64;

    fn min_heat_w(&self) -> f64 {
        self.nominal_heat_w() * self.lower_activation_limit()
    }

    /// Output and fuel use at `heat_w`, which must lie within the operating band.
    fn operate(&self, heat_w: f64) -> GeneratorOutput;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boiler {
    pub q_nominal_w: f64,
    #[serde(default = "default_boiler_efficiency")]
    pub efficiency: f64,
    #[serde(default = "default_boiler_lal")]
    pub lower_activation_limit: f64,
}

impl HeatGenerator for Boiler {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Boiler
    }

    fn nominal_heat_w(&self) -> f64 {
        self.q_nominal_w
    }

    fn lower_activation_limit(&self) -> f64 {
        self.lower_activation_limit
    }

    fn operate(&self, heat_w: f64) -> GeneratorOutput {
        GeneratorOutput {
            heat_w,
            fuel_w: if heat_w > 0.0 { heat_w / self.efficiency } else { 0.0 },
            electricity_w: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chp {
    pub q_nominal_w: f64,
    pub p_nominal_w: f64,
    /// Overall (thermal plus electrical) efficiency.
    #[serde(default = "default_chp_omega")]
    pub omega: f64,
    #[serde(default = "default_chp_lal")]
    pub lower_activation_limit: f64,
}

impl Chp {
    pub fn power_to_heat_ratio(&self) -> f64 {
        if self.q_nominal_w > 0.0 {
            self.p_nominal_w / self.q_nominal_w
        } else {
            0.0
        }
    }

    pub fn thermal_efficiency(&self) -> f64 {
        self.omega / (1.0 + self.power_to_heat_ratio())
    }
}

impl HeatGenerator for Chp {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Chp
    }

    fn nominal_heat_w(&self) -> f64 {
        self.q_nominal_w
    }

    fn lower_activation_limit(&self) -> f64 {
        self.lower_activation_limit
    }

    fn operate(&self, heat_w: f64) -> GeneratorOutput {
        if heat_w <= 0.0 {
            return GeneratorOutput::default();
        }
        GeneratorOutput {
            heat_w,
            fuel_w: heat_w / self.thermal_efficiency(),
            electricity_w: heat_w * self.power_to_heat_ratio(),
        }
    }
}

/// Heat generators installed in one building.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingEnergySystem {
    #[serde(default)]
    pub chp: Option<Chp>,
    #[serde(default)]
    pub boiler: Option<Boiler>,
    #[serde(default)]
    pub electric_heater_nominal_w: f64,
}
