//! ---
//! cityheat_section: "08-heat-network-balancing"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Energy balancing routines for local heating networks."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
use std::{fs, path::Path};

use crate::{errors::Result, scenario::DistrictScenario};

/// Read a scenario from JSON or YAML. Documents starting with `{` are JSON.
pub fn load_scenario_from_file(path: impl AsRef<Path>) -> Result<DistrictScenario> {
    let data = fs::read_to_string(path)?;
    parse_scenario(&data)
}

pub fn parse_scenario(data: &str) -> Result<DistrictScenario> {
    let scenario: DistrictScenario = if data.trim_start().starts_with('{') {
        serde_json::from_str(data)?
    } else {
        serde_yaml::from_str(data)?
    };
    scenario.validate()?;
    Ok(scenario)
}

/// Write a scenario, as YAML for `.yaml`/`.yml` paths and pretty JSON otherwise.
pub fn save_scenario_to_file(scenario: &DistrictScenario, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let serialized = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::to_string(scenario)?,
        _ => serde_json::to_string_pretty(scenario)?,
    };
    fs::write(path, serialized)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::BalanceError, model::NodeKind};
    use tempfile::tempdir;

    const YAML_SCENARIO: &str = r#"
district:
  version: "1"
  nodes:
    - { id: 1, kind: building }
    - { id: 2, kind: building }
  edges:
    - from: 1
      to: 2
      network_type: heating
      weight: 40.0
      supply_temp_c: 70.0
      return_temp_c: 40.0
      inner_diameter_m: 0.05
buildings:
  1:
    energy_system:
      chp: { q_nominal_w: 8.0, p_nominal_w: 4.0 }
    profile:
      net_balance: [8.0]
      chp_nominal: [8.0]
      chp_min: [5.0]
      boiler_nominal: [0.0]
      boiler_min: [0.0]
  2:
    profile:
      net_balance: [-6.0]
      chp_nominal: [0.0]
      chp_min: [0.0]
      boiler_nominal: [0.0]
      boiler_min: [0.0]
"#;

    #[test]
    fn parses_yaml_with_edge_weight_alias() {
        let scenario = parse_scenario(YAML_SCENARIO).unwrap();
        assert_eq!(scenario.district.nodes[0].kind, NodeKind::Building);
        assert_eq!(scenario.district.edges[0].length_m, 40.0);
        assert_eq!(scenario.buildings.len(), 2);
        assert_eq!(scenario.horizon().unwrap(), 1);
        assert!(scenario.networks.is_none());
    }

    #[test]
    fn json_and_yaml_files_read_back_the_same() {
        let scenario = parse_scenario(YAML_SCENARIO).unwrap();
        let dir = tempdir().unwrap();
        for name in ["scenario.json", "scenario.yaml"] {
            let path = dir.path().join(name);
            save_scenario_to_file(&scenario, &path).unwrap();
            assert_eq!(load_scenario_from_file(&path).unwrap(), scenario);
        }
    }

    #[test]
    fn rejects_electric_heater_missing_from_profile() {
        let yaml = YAML_SCENARIO.replace(
            "      chp: { q_nominal_w: 8.0, p_nominal_w: 4.0 }",
            "      chp: { q_nominal_w: 8.0, p_nominal_w: 4.0 }\n      electric_heater_nominal_w: 3.0",
        );
        let err = parse_scenario(&yaml).unwrap_err();
        assert!(
            matches!(err, BalanceError::InvalidProfile { building: 1, .. }),
            "{err}"
        );

        let yaml = yaml.replace(
            "      boiler_min: [0.0]\n  2:",
            "      boiler_min: [0.0]\n      eh_nominal: [3.0]\n  2:",
        );
        assert!(parse_scenario(&yaml).is_ok());
    }
}
