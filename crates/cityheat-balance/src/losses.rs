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

use crate::errors::{BalanceError, Result};

/// Default soil temperature around buried pipes in degree Celsius.
pub const DEFAULT_GROUND_TEMP_C: f64 = 10.0;

const U_PIPE_FACTOR: f64 = 0.9264;
const U_PIPE_EXPONENT: f64 = 0.501;

/// Design-point parameters of a heating network used for the loss estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkLossParams {
    pub length_m: f64,
    pub inner_diameter_m: f64,
    pub supply_temp_c: f64,
    pub return_temp_c: f64,
    #[serde(default = "default_ground_temp")]
    pub ground_temp_c: f64,
}

fn default_ground_temp() -> f64 {
    DEFAULT_GROUND_TEMP_C
}

/// Heat transfer coefficient in W/(m*K) of a buried supply/return pipe pair.
///
/// The empirical fit already covers both legs, so the result must not be doubled.
pub fn heat_transfer_coefficient(inner_diameter_m: f64) -> Result<f64> {
    if !inner_diameter_m.is_finite() || inner_diameter_m <= 0.0 {
        return Err(BalanceError::InvalidDiameter(inner_diameter_m));
    }
    Ok(U_PIPE_FACTOR * inner_diameter_m.powf(U_PIPE_EXPONENT))
}

/// Constant network heat loss in W at design conditions.
pub fn estimate_loss(
    length_m: f64,
    inner_diameter_m: f64,
    supply_temp_c: f64,
    return_temp_c: f64,
    ground_temp_c: f64,
) -> Result<f64> {
    let u_pipe = heat_transfer_coefficient(inner_diameter_m)?;
    if length_m <= 0.0 {
        return Ok(0.0);
    }
    let mean_temp = (supply_temp_c + return_temp_c) / 2.0;
    Ok((u_pipe * length_m * (mean_temp - ground_temp_c)).max(0.0))
}

pub fn estimate_network_loss(params: &NetworkLossParams) -> Result<f64> {
    estimate_loss(
        params.length_m,
        params.inner_diameter_m,
        params.supply_temp_c,
        params.return_temp_c,
        params.ground_temp_c,
    )
}
