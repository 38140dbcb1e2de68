//! ---
//! cityheat_section: "05-external-interfaces"
//! cityheat_subsection: "binary"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Command line utility for local heating network balancing runs."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use cityheat_balance::{
    allocation::parse_dispatch_mode,
    analyze_district_with_options,
    bundle::{load_bundle, save_bundle, verify_bundle, ResultBundle},
    config::AppConfig,
    io::load_scenario_from_file,
    losses::{estimate_network_loss, NetworkLossParams, DEFAULT_GROUND_TEMP_C},
    network::ThermalNetwork,
    ranking::parse_criterion,
    topology::find_heating_networks,
    BalanceSettings,
};
use cityheat_logging as logging;
use tracing::info;

const DEFAULT_CONFIG_CANDIDATES: &[&str] = &["cityheat.toml", "configs/cityheat.toml"];

#[derive(Debug, clap::Args)]
pub struct BalanceCommand {
    /// District scenario (JSON or YAML).
    #[arg(long, value_name = "FILE")]
    scenario: PathBuf,

    /// Configuration file. Defaults to CITYHEAT_CONFIG or ./cityheat.toml when present.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Supplier ranking criterion (co2, cost).
    #[arg(long, value_name = "NAME")]
    criterion: Option<String>,

    /// Dispatch mode (flexible, static).
    #[arg(long, value_name = "MODE")]
    dispatch: Option<String>,

    /// Report and bundle directory.
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Balance only the first N timesteps.
    #[arg(long, value_name = "N")]
    horizon: Option<usize>,

    /// Skip the per-network CSV time series.
    #[arg(long = "no-csv", action = clap::ArgAction::SetTrue)]
    no_csv: bool,
}

impl BalanceCommand {
    pub fn execute(self) -> Result<()> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_path(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => AppConfig::load(DEFAULT_CONFIG_CANDIDATES).context("failed to load config")?,
        };
        if self.config.is_some() {
            logging::init_tracing("cityheatctl", &config.logging)?;
        } else {
            logging::init();
        }

        if let Some(name) = &self.criterion {
            config.balance.criterion = parse_criterion(name)?;
        }
        if let Some(name) = &self.dispatch {
            config.balance.dispatch = parse_dispatch_mode(name)?;
        }
        if let Some(horizon) = self.horizon {
            config.balance.horizon = Some(horizon);
        }
        if let Some(dir) = self.output {
            config.output.directory = dir;
        }

        let mut scenario = load_scenario_from_file(&self.scenario)
            .with_context(|| format!("failed to read scenario {}", self.scenario.display()))?;
        let settings = BalanceSettings::from(&config.balance);
        let balance = analyze_district_with_options(
            &mut scenario,
            &settings,
            Some(&config.output.directory),
            config.output.export_csv && !self.no_csv,
        )
        .context("balancing failed")?;

        for summary in &balance.networks {
            println!(
                "network {}: {} buildings, loss {:.1} W, demand {:.3} kWh, chp {:.3} kWh, boiler {:.3} kWh, dumped {:.3} kWh",
                summary.network,
                summary.buildings.len(),
                summary.loss_rate_w,
                summary.demand_wh / 1000.0,
                summary.chp_supplied_wh / 1000.0,
                summary.boiler_supplied_wh / 1000.0,
                summary.dumped_heat_wh / 1000.0,
            );
        }

        let bundle_path = config.output.bundle_path();
        let bundle = ResultBundle::from_balance(scenario, &balance);
        save_bundle(&bundle, balance.run_id, &bundle_path)?;
        info!(run_id = %balance.run_id, path = %bundle_path.display(), "result bundle saved");
        println!("bundle written to {}", bundle_path.display());
        Ok(())
    }
}

#[derive(Debug, clap::Args)]
pub struct NetworksCommand {
    /// District scenario (JSON or YAML).
    #[arg(long, value_name = "FILE")]
    scenario: PathBuf,

    /// Ground temperature in degree Celsius.
    #[arg(long, value_name = "C", default_value_t = DEFAULT_GROUND_TEMP_C)]
    ground: f64,
}

impl NetworksCommand {
    pub fn execute(self) -> Result<()> {
        logging::init();
        let scenario = load_scenario_from_file(&self.scenario)
            .with_context(|| format!("failed to read scenario {}", self.scenario.display()))?;
        let networks = scenario
            .networks
            .clone()
            .unwrap_or_else(|| find_heating_networks(&scenario.district));
        if networks.is_empty() {
            println!("no heating networks found");
            return Ok(());
        }
        for (id, buildings) in networks.iter().enumerate() {
            let network = ThermalNetwork::extract(id, &scenario.district, buildings, self.ground)?;
            println!(
                "network {}: buildings {:?}, length {:.1} m, loss {:.1} W",
                id,
                network.buildings(),
                network.total_length_m(),
                network.loss_rate_w()
            );
        }
        Ok(())
    }
}

#[derive(Debug, clap::Args)]
pub struct LossCommand {
    /// Total pipe length in metres.
    #[arg(long, value_name = "M")]
    length: f64,

    /// Inner pipe diameter in metres.
    #[arg(long, value_name = "M")]
    diameter: f64,

    /// Supply temperature in degree Celsius.
    #[arg(long = "supply", value_name = "C")]
    supply: f64,

    /// Return temperature in degree Celsius.
    #[arg(long = "return", value_name = "C")]
    return_temp: f64,

    /// Ground temperature in degree Celsius.
    #[arg(long, value_name = "C", default_value_t = DEFAULT_GROUND_TEMP_C)]
    ground: f64,
}

impl LossCommand {
    pub fn execute(self) -> Result<()> {
        let params = NetworkLossParams {
            length_m: self.length,
            inner_diameter_m: self.diameter,
            supply_temp_c: self.supply,
            return_temp_c: self.return_temp,
            ground_temp_c: self.ground,
        };
        let loss = estimate_network_loss(&params)?;
        println!("{:.3} W", loss);
        Ok(())
    }
}

#[derive(Debug, clap::Args)]
pub struct InspectCommand {
    /// Result bundle written by `balance`.
    #[arg(long, value_name = "FILE")]
    bundle: PathBuf,
}

impl InspectCommand {
    pub fn execute(self) -> Result<()> {
        if !verify_bundle(&self.bundle) {
            bail!("bundle {} failed the integrity check", self.bundle.display());
        }
        let envelope = load_bundle(&self.bundle)?;
        let allocations = &envelope.bundle.allocations;
        let chp_w: f64 = allocations.values().flat_map(|a| a.chp_supply_w.iter()).sum();
        let boiler_w: f64 = allocations
            .values()
            .flat_map(|a| a.boiler_supply_w.iter())
            .sum();

        println!("bundle ok: version {}, run {}", envelope.version, envelope.run_id);
        println!("created at {}", envelope.created_at.to_rfc3339());
        println!(
            "{} buildings, {} with network allocation",
            envelope.bundle.district.buildings.len(),
            allocations.len()
        );
        println!("network chp {:.1} W summed, boiler {:.1} W summed", chp_w, boiler_w);
        Ok(())
    }
}
