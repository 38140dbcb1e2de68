//! ---
//! cityheat_section: "08-heat-network-balancing"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Energy balancing routines for local heating networks."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use cityheat_logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    allocation::{DispatchMode, DEFAULT_EPSILON_W},
    errors::{BalanceError, Result},
    losses::DEFAULT_GROUND_TEMP_C,
    ranking::PriorityCriterion,
};

fn default_ground_temperature() -> f64 {
    DEFAULT_GROUND_TEMP_C
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON_W
}

fn default_timestep_s() -> u64 {
    3600
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("reports")
}

fn default_bundle_name() -> String {
    "lhn_results.json".to_owned()
}

fn default_export_csv() -> bool {
    true
}

/// Top-level configuration of a balancing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub balance: BalanceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "CITYHEAT_CONFIG";

    /// Load configuration, respecting the `CITYHEAT_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the file it came from. Falls back to
    /// the defaults when neither the environment nor any candidate names a file.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!("no configuration file found, using defaults");
        Ok(LoadedAppConfig {
            config: Self::default(),
            source: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)?;
        contents.parse()
    }

    pub fn validate(&self) -> Result<()> {
        self.balance.validate()?;
        if self.output.bundle_name.trim().is_empty() {
            return Err(BalanceError::InvalidConfig(
                "output.bundle_name must not be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = BalanceError;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

/// Algorithm settings of the `[balance]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceConfig {
    #[serde(default)]
    pub criterion: PriorityCriterion,
    #[serde(default)]
    pub dispatch: DispatchMode,
    #[serde(default = "default_ground_temperature")]
    pub ground_temperature_c: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon_w: f64,
    /// Balance only the first `horizon` timesteps of every profile.
    #[serde(default)]
    pub horizon: Option<usize>,
    /// Length of one timestep, used for energy totals.
    #[serde(default = "default_timestep_s")]
    pub timestep_s: u64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            criterion: PriorityCriterion::default(),
            dispatch: DispatchMode::default(),
            ground_temperature_c: default_ground_temperature(),
            epsilon_w: default_epsilon(),
            horizon: None,
            timestep_s: default_timestep_s(),
        }
    }
}

impl BalanceConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.epsilon_w.is_finite() || self.epsilon_w < 0.0 {
            return Err(BalanceError::InvalidConfig(format!(
                "balance.epsilon_w must be a finite non-negative number, got {}",
                self.epsilon_w
            )));
        }
        if !self.ground_temperature_c.is_finite() {
            return Err(BalanceError::InvalidConfig(
                "balance.ground_temperature_c must be finite".to_owned(),
            ));
        }
        if self.timestep_s == 0 {
            return Err(BalanceError::InvalidConfig(
                "balance.timestep_s must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn timestep_h(&self) -> f64 {
        self.timestep_s as f64 / 3600.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_bundle_name")]
    pub bundle_name: String,
    #[serde(default = "default_export_csv")]
    pub export_csv: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            bundle_name: default_bundle_name(),
            export_csv: default_export_csv(),
        }
    }
}

impl OutputConfig {
    pub fn bundle_path(&self) -> PathBuf {
        self.directory.join(&self.bundle_name)
    }
}
