//! ---
//! cityheat_section: "08-heat-network-balancing"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Energy balancing routines for local heating networks."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
pub mod allocation;
pub mod bundle;
pub mod classify;
pub mod config;
pub mod devices;
pub mod errors;
pub mod io;
pub mod losses;
pub mod model;
pub mod network;
pub mod profile;
pub mod ranking;
pub mod reports;
pub mod scenario;
pub mod topology;
pub mod writer;

use std::borrow::Borrow;
use std::path::Path;

use chrono::{DateTime, Utc};
use cityheat_logging::{heat_debug, heat_warn, log_run_event, LogContext, RunOutcome};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    allocation::{AllocationEngine, AllocationResult, DispatchMode, DEFAULT_EPSILON_W},
    classify::classify,
    config::BalanceConfig,
    losses::DEFAULT_GROUND_TEMP_C,
    model::NodeId,
    network::{NetworkId, NetworkMembership, ThermalNetwork},
    profile::BuildingThermalProfile,
    ranking::{rank, PriorityCriterion},
    reports::ReportExporter,
    scenario::DistrictScenario,
    topology::find_heating_networks,
    writer::{ResultsWriter, WriterSummary},
};

pub use errors::{BalanceError, Result};
pub use losses::estimate_network_loss;

/// Knobs of a balancing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSettings {
    pub criterion: PriorityCriterion,
    pub dispatch: DispatchMode,
    pub ground_temperature_c: f64,
    pub epsilon_w: f64,
    /// Balance only the first `horizon` timesteps. Defaults to the profile length.
    pub horizon: Option<usize>,
    pub timestep_s: u64,
}

impl Default for BalanceSettings {
    fn default() -> Self {
        Self {
            criterion: PriorityCriterion::default(),
            dispatch: DispatchMode::default(),
            ground_temperature_c: DEFAULT_GROUND_TEMP_C,
            epsilon_w: DEFAULT_EPSILON_W,
            horizon: None,
            timestep_s: 3600,
        }
    }
}

impl From<&BalanceConfig> for BalanceSettings {
    fn from(config: &BalanceConfig) -> Self {
        Self {
            criterion: config.criterion,
            dispatch: config.dispatch,
            ground_temperature_c: config.ground_temperature_c,
            epsilon_w: config.epsilon_w,
            horizon: config.horizon,
            timestep_s: config.timestep_s,
        }
    }
}

impl BalanceSettings {
    pub fn timestep_h(&self) -> f64 {
        self.timestep_s as f64 / 3600.0
    }
}

/// Balance one heating network over `horizon` timesteps with flexible dispatch.
///
/// Fails with [`BalanceError::InsufficientSupply`] at the first infeasible
/// timestep and with [`BalanceError::UnsupportedCriterion`] for ranking modes
/// that have no implementation.
pub fn run_balance<P>(
    network: &ThermalNetwork,
    profiles: &IndexMap<NodeId, P>,
    horizon: usize,
    criterion: PriorityCriterion,
) -> Result<AllocationResult>
where
    P: Borrow<BuildingThermalProfile>,
{
    let settings = BalanceSettings {
        criterion,
        ..BalanceSettings::default()
    };
    run_balance_with_settings(network, profiles, horizon, &settings)
}

pub fn run_balance_with_settings<P>(
    network: &ThermalNetwork,
    profiles: &IndexMap<NodeId, P>,
    horizon: usize,
    settings: &BalanceSettings,
) -> Result<AllocationResult>
where
    P: Borrow<BuildingThermalProfile>,
{
    let criterion = settings.criterion.ensure_supported()?;
    let dispatch = settings.dispatch.ensure_supported()?;
    let mode = criterion.to_string();
    let context = LogContext::new()
        .with_network(network.id())
        .with_mode(&mode);

    let mut participants = Vec::with_capacity(network.buildings().len());
    for &building in network.buildings() {
        let profile: &BuildingThermalProfile = profiles
            .get(&building)
            .ok_or(BalanceError::MissingProfile(building))?
            .borrow();
        if profile.len() < horizon {
            return Err(BalanceError::HorizonMismatch {
                building,
                expected: horizon,
                actual: profile.len(),
            });
        }
        participants.push((building, profile));
    }

    let engine = AllocationEngine::new(network.loss_rate_w(), dispatch).with_epsilon(settings.epsilon_w);
    let mut result = AllocationResult::new(network.id(), network.buildings(), horizon);

    for t in 0..horizon {
        let snapshot = classify(&participants, t);
        if !snapshot.dropped_suppliers.is_empty() {
            heat_warn!(
                context = context.clone().with_timestep(t),
                "surplus of electric-heater-only buildings {:?} left out of the balance",
                snapshot.dropped_suppliers
            );
        }
        let ranked = rank(&snapshot, criterion)?;
        let allocation = match engine.allocate(&snapshot, &ranked) {
            Ok(allocation) => allocation,
            Err(err) => {
                log_run_event(
                    Some(&context.clone().with_timestep(t)),
                    "balance.network",
                    &err.to_string(),
                    RunOutcome::Rejected,
                );
                return Err(err);
            }
        };
        heat_debug!(
            context = context.clone().with_timestep(t),
            "demand {:.3} W covered by {} units",
            allocation.demand_w,
            allocation.units.len()
        );
        result.record(&allocation);
    }

    log_run_event(
        Some(&context),
        "balance.network",
        "network balanced",
        RunOutcome::Success,
    );
    Ok(result)
}

/// Horizon totals of one balanced network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub network: NetworkId,
    pub buildings: Vec<NodeId>,
    pub total_length_m: f64,
    pub loss_rate_w: f64,
    pub horizon: usize,
    pub timestep_s: u64,
    pub demand_wh: f64,
    pub losses_wh: f64,
    pub chp_supplied_wh: f64,
    pub boiler_supplied_wh: f64,
    pub dumped_heat_wh: f64,
    /// Heat produced by devices held at their minimum load by the results writer.
    pub wasted_heat_wh: f64,
    pub deficit_timesteps: usize,
    pub dropped_supplier_timesteps: usize,
}

impl NetworkSummary {
    pub fn from_run(
        network: &ThermalNetwork,
        allocation: &AllocationResult,
        written: &WriterSummary,
        timestep_s: u64,
    ) -> Self {
        let timestep_h = timestep_s as f64 / 3600.0;
        let deficit_timesteps = allocation.demand_w.iter().filter(|d| **d > 0.0).count();
        let series = allocation.allocations().values();
        let chp_w: f64 = series.clone().flat_map(|s| s.chp_supply_w.iter()).sum();
        let boiler_w: f64 = series.flat_map(|s| s.boiler_supply_w.iter()).sum();

        Self {
            network: network.id(),
            buildings: network.buildings().to_vec(),
            total_length_m: network.total_length_m(),
            loss_rate_w: network.loss_rate_w(),
            horizon: allocation.horizon,
            timestep_s,
            demand_wh: allocation.demand_w.iter().sum::<f64>() * timestep_h,
            losses_wh: network.loss_rate_w() * deficit_timesteps as f64 * timestep_h,
            chp_supplied_wh: chp_w * timestep_h,
            boiler_supplied_wh: boiler_w * timestep_h,
            dumped_heat_wh: allocation.dumped_heat_w.iter().sum::<f64>() * timestep_h,
            wasted_heat_wh: written.wasted_heat_wh,
            deficit_timesteps,
            dropped_supplier_timesteps: allocation.dropped_suppliers.len(),
        }
    }
}

/// Outcome of balancing every heating network of a district.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictBalance {
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    pub model_version: Option<String>,
    pub criterion: PriorityCriterion,
    pub horizon: usize,
    pub networks: Vec<NetworkSummary>,
    pub allocations: Vec<AllocationResult>,
}

impl DistrictBalance {
    pub fn exporter(&self) -> ReportExporter<'_> {
        ReportExporter::new(self)
    }
}

/// Balance all heating networks of a scenario and write the device setpoints
/// back into its buildings.
///
/// Networks listed in the scenario are used as given; otherwise they are
/// discovered from the heating pipes. The first failing network aborts the run.
pub fn balance_district(
    scenario: &mut DistrictScenario,
    settings: &BalanceSettings,
) -> Result<DistrictBalance> {
    scenario.validate()?;
    let horizon = match settings.horizon {
        Some(horizon) => horizon,
        None => scenario.horizon()?,
    };
    let networks = scenario
        .networks
        .clone()
        .unwrap_or_else(|| find_heating_networks(&scenario.district));
    let membership = NetworkMembership::from_networks(&networks)?;
    info!(
        networks = networks.len(),
        buildings = membership.len(),
        horizon,
        criterion = %settings.criterion,
        "balancing district"
    );

    let writer = ResultsWriter::new(settings.epsilon_w, settings.timestep_h());
    let mut summaries = Vec::with_capacity(networks.len());
    let mut allocations = Vec::with_capacity(networks.len());

    for (id, buildings) in networks.iter().enumerate() {
        let network = ThermalNetwork::extract(
            id,
            &scenario.district,
            buildings,
            settings.ground_temperature_c,
        )?;
        let allocation = {
            let profiles = scenario.profiles();
            run_balance_with_settings(&network, &profiles, horizon, settings)?
        };
        let written = writer.write(&mut scenario.buildings, &allocation)?;
        summaries.push(NetworkSummary::from_run(
            &network,
            &allocation,
            &written,
            settings.timestep_s,
        ));
        allocations.push(allocation);
    }

    Ok(DistrictBalance {
        timestamp: Utc::now(),
        run_id: Uuid::new_v4(),
        model_version: scenario.district.version.clone(),
        criterion: settings.criterion,
        horizon,
        networks: summaries,
        allocations,
    })
}

/// Balance a district and export reports to `output_dir` (`reports/` when `None`).
pub fn analyze_district_with_options(
    scenario: &mut DistrictScenario,
    settings: &BalanceSettings,
    output_dir: Option<&Path>,
    export_csv: bool,
) -> Result<DistrictBalance> {
    let balance = balance_district(scenario, settings)?;
    let default_dir = Path::new("reports");
    let output_dir = output_dir.unwrap_or(default_dir);
    balance.exporter().export_all(output_dir, export_csv)?;
    Ok(balance)
}
