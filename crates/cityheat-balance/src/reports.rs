//! ---
//! cityheat_section: "08-heat-network-balancing"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Energy balancing routines for local heating networks."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::{allocation::AllocationResult, errors::Result, model::NodeId, DistrictBalance};

pub const SUMMARY_REPORT: &str = "network_summary.json";
pub const ALLOCATION_REPORT: &str = "allocation.json";

#[derive(Debug)]
pub struct ReportExporter<'a> {
    balance: &'a DistrictBalance,
}

impl<'a> ReportExporter<'a> {
    pub fn new(balance: &'a DistrictBalance) -> Self {
        Self { balance }
    }

    /// Write the JSON reports and, when `export_csv` is set, one CSV time
    /// series per network. Returns the written paths.
    pub fn export_all(&self, output_dir: &Path, export_csv: bool) -> Result<Vec<PathBuf>> {
        if !output_dir.exists() {
            fs::create_dir_all(output_dir)?;
        }

        let timestamp = self.balance.timestamp.to_rfc3339();
        let run_id = self.balance.run_id.to_string();
        let version = self.balance.model_version.clone();

        let summary_report = ReportEnvelope::new(
            &timestamp,
            &run_id,
            version.clone(),
            network_summary_schema(),
            &self.balance.networks,
        );
        let allocation_report = ReportEnvelope::new(
            &timestamp,
            &run_id,
            version,
            allocation_schema(),
            &self.balance.allocations,
        );

        let mut written = vec![
            output_dir.join(SUMMARY_REPORT),
            output_dir.join(ALLOCATION_REPORT),
        ];
        write_json(&written[0], &summary_report)?;
        write_json(&written[1], &allocation_report)?;

        if export_csv {
            for allocation in &self.balance.allocations {
                let path = output_dir.join(csv_file_name(allocation));
                write_allocation_csv(&path, allocation)?;
                written.push(path);
            }
        }

        info!("Reports exported to {}", output_dir.display());
        Ok(written)
    }
}

pub fn csv_file_name(allocation: &AllocationResult) -> String {
    format!("network_{}_allocation.csv", allocation.network)
}

#[derive(Debug, Serialize)]
struct ReportEnvelope<'a, T: Serialize> {
    timestamp: &'a str,
    run_id: &'a str,
    model_version: Option<String>,
    schema: serde_json::Value,
    data: &'a T,
}

impl<'a, T: Serialize> ReportEnvelope<'a, T> {
    fn new(
        timestamp: &'a str,
        run_id: &'a str,
        model_version: Option<String>,
        schema: serde_json::Value,
        data: &'a T,
    ) -> Self {
        Self {
            timestamp,
            run_id,
            model_version,
            schema,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
struct AllocationRow {
    timestep: usize,
    building: NodeId,
    chp_supply_w: f64,
    boiler_supply_w: f64,
    network_demand_w: f64,
    network_dumped_w: f64,
}

/// One row per building and timestep, timesteps outermost.
pub fn write_allocation_csv(path: &Path, allocation: &AllocationResult) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for t in 0..allocation.horizon {
        for (&building, series) in allocation.allocations() {
            writer.serialize(AllocationRow {
                timestep: t,
                building,
                chp_supply_w: series.chp_supply_w[t],
                boiler_supply_w: series.boiler_supply_w[t],
                network_demand_w: allocation.demand_w[t],
                network_dumped_w: allocation.dumped_heat_w[t],
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let serialized = serde_json::to_string_pretty(value)?;
    fs::write(path, serialized)?;
    Ok(())
}

fn network_summary_schema() -> serde_json::Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "NetworkSummaryReport",
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "network": {"type": "integer"},
                "buildings": {"type": "array", "items": {"type": "integer"}},
                "total_length_m": {"type": "number"},
                "loss_rate_w": {"type": "number"},
                "horizon": {"type": "integer"},
                "timestep_s": {"type": "integer"},
                "demand_wh": {"type": "number"},
                "losses_wh": {"type": "number"},
                "chp_supplied_wh": {"type": "number"},
                "boiler_supplied_wh": {"type": "number"},
                "dumped_heat_wh": {"type": "number"},
                "wasted_heat_wh": {"type": "number"},
                "deficit_timesteps": {"type": "integer"},
                "dropped_supplier_timesteps": {"type": "integer"}
            },
            "required": ["network", "buildings", "loss_rate_w", "horizon", "demand_wh"]
        }
    })
}

fn allocation_schema() -> serde_json::Value {
    let series = json!({"type": "array", "items": {"type": "number", "minimum": 0}});
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "AllocationReport",
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "network": {"type": "integer"},
                "horizon": {"type": "integer"},
                "buildings": {
                    "type": "object",
                    "additionalProperties": {
                        "type": "object",
                        "properties": {
                            "chp_nominal": series,
                            "boiler_nominal": series
                        },
                        "required": ["chp_nominal", "boiler_nominal"]
                    }
                },
                "demand_w": series,
                "dumped_heat_w": series
            },
            "required": ["network", "horizon", "buildings", "demand_w"]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn csv_has_one_row_per_building_and_timestep() {
        let mut allocation = AllocationResult::new(2, &[4, 9], 3);
        allocation.demand_w[1] = 6.0;
        if let Some(series) = allocation.buildings.get_mut(&9) {
            series.chp_supply_w[1] = 6.0;
        }

        let dir = tempdir().unwrap();
        let path = dir.path().join(csv_file_name(&allocation));
        write_allocation_csv(&path, &allocation).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "timestep");
        assert_eq!(&headers[2], "chp_supply_w");
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 6);
        assert_eq!(&rows[3][1], "9");
        assert_eq!(rows[3][2].parse::<f64>().unwrap(), 6.0);
        assert!(path.ends_with("network_2_allocation.csv"));
    }
}
