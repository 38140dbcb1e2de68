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
use cityheat_logging::{heat_debug, heat_error, heat_info, heat_warn, LogContext};
use serde::{Deserialize, Serialize};

use crate::{
    allocation::{AllocationResult, DEFAULT_EPSILON_W},
    devices::{GeneratorOutput, HeatGenerator},
    errors::{BalanceError, Result},
    model::NodeId,
    scenario::BuildingRecord,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriterSummary {
    pub setpoints_written: usize,
    pub shifted_to_boiler: usize,
    pub clamped_to_minimum: usize,
    pub wasted_heat_wh: f64,
}

/// Turns network allocations into device setpoints on each building.
///
/// The allocation itself is read-only here. Only the building operation series
/// (heat per device, fuel, CHP electricity, wasted heat) are rewritten, and only
/// at timesteps where the building supplies the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultsWriter {
    epsilon_w: f64,
    timestep_h: f64,
}

impl Default for ResultsWriter {
    fn default() -> Self {
        Self::new(DEFAULT_EPSILON_W, 1.0)
    }
}

impl ResultsWriter {
    pub fn new(epsilon_w: f64, timestep_h: f64) -> Self {
        Self {
            epsilon_w,
            timestep_h,
        }
    }

    pub fn write(
        &self,
        buildings: &mut IndexMap<NodeId, BuildingRecord>,
        allocation: &AllocationResult,
    ) -> Result<WriterSummary> {
        let context = LogContext::new()
            .with_network(allocation.network)
            .with_mode("writer");
        let mut summary = WriterSummary::default();
        for (&building, series) in allocation.allocations() {
            let Some(record) = buildings.get_mut(&building) else {
                return Err(BalanceError::MissingProfile(building));
            };
            let building_context = context.clone().with_building(building);
            record.operation.ensure_horizon(allocation.horizon);
            for t in 0..allocation.horizon {
                if series.is_idle(t) {
                    continue;
                }
                self.write_timestep(
                    &building_context.clone().with_timestep(t),
                    building,
                    record,
                    t,
                    (series.chp_supply_w[t], series.boiler_supply_w[t]),
                    &mut summary,
                )?;
            }
        }
        heat_info!(
            context = context,
            "{} setpoints written, {} shifted to boiler, {} clamped, {:.1} Wh wasted",
            summary.setpoints_written,
            summary.shifted_to_boiler,
            summary.clamped_to_minimum,
            summary.wasted_heat_wh
        );
        Ok(summary)
    }

    fn write_timestep(
        &self,
        context: &LogContext,
        building: NodeId,
        record: &mut BuildingRecord,
        t: usize,
        (chp_network_w, boiler_network_w): (f64, f64),
        summary: &mut WriterSummary,
    ) -> Result<()> {
        let system = &record.energy_system;
        let mut chp_w = record.local.chp_at(t) + chp_network_w;
        let mut boiler_w = record.local.boiler_at(t) + boiler_network_w;
        let mut wasted_w = 0.0;

        if chp_w > 0.0 {
            let chp = system.chp.as_ref().ok_or(BalanceError::MissingDevice {
                building,
                device: "chp",
            })?;
            self.check_overload(context, building, chp, t, chp_w)?;
            if chp_w < chp.min_heat_w() - self.epsilon_w {
                let shifted_w = boiler_w + chp_w;
                match system.boiler.as_ref() {
                    Some(boiler)
                        if shifted_w <= boiler.nominal_heat_w() + self.epsilon_w
                            && shifted_w >= boiler.min_heat_w() - self.epsilon_w =>
                    {
                        heat_debug!(
                            context = context,
                            "CHP at {:.3} W below minimum load, boiler takes over",
                            chp_w
                        );
                        boiler_w = shifted_w;
                        chp_w = 0.0;
                        summary.shifted_to_boiler += 1;
                    }
                    _ => {
                        heat_warn!(
                            context = context,
                            "CHP raised from {:.3} W to minimum load {:.3} W",
                            chp_w,
                            chp.min_heat_w()
                        );
                        wasted_w += chp.min_heat_w() - chp_w;
                        chp_w = chp.min_heat_w();
                        summary.clamped_to_minimum += 1;
                    }
                }
            }
        }

        if boiler_w > 0.0 {
            let boiler = system.boiler.as_ref().ok_or(BalanceError::MissingDevice {
                building,
                device: "boiler",
            })?;
            self.check_overload(context, building, boiler, t, boiler_w)?;
            if boiler_w < boiler.min_heat_w() - self.epsilon_w {
                heat_warn!(
                    context = context,
                    "boiler raised from {:.3} W to minimum load {:.3} W",
                    boiler_w,
                    boiler.min_heat_w()
                );
                wasted_w += boiler.min_heat_w() - boiler_w;
                boiler_w = boiler.min_heat_w();
                summary.clamped_to_minimum += 1;
            }
        }

        let chp_out = system
            .chp
            .as_ref()
            .map(|c| c.operate(chp_w))
            .unwrap_or_default();
        let boiler_out: GeneratorOutput = system
            .boiler
            .as_ref()
            .map(|b| b.operate(boiler_w))
            .unwrap_or_default();

        let operation = &mut record.operation;
        operation.chp_heat_w[t] = chp_out.heat_w;
        operation.boiler_heat_w[t] = boiler_out.heat_w;
        operation.fuel_w[t] = chp_out.fuel_w + boiler_out.fuel_w;
        operation.chp_electricity_w[t] = chp_out.electricity_w;
        operation.wasted_heat_w[t] = wasted_w;

        summary.setpoints_written += 1;
        summary.wasted_heat_wh += wasted_w * self.timestep_h;
        Ok(())
    }

    fn check_overload<G: HeatGenerator>(
        &self,
        context: &LogContext,
        building: NodeId,
        device: &G,
        t: usize,
        requested_w: f64,
    ) -> Result<()> {
        if requested_w > device.nominal_heat_w() + self.epsilon_w {
            heat_error!(
                context = context,
                "{} setpoint {:.3} W exceeds nominal {:.3} W",
                device.kind().as_str(),
                requested_w,
                device.nominal_heat_w()
            );
            return Err(BalanceError::DeviceOverload {
                building,
                device: device.kind().as_str(),
                timestep: t,
                requested_w,
                nominal_w: device.nominal_heat_w(),
            });
        }
        Ok(())
    }
}
