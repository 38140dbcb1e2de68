//! ---
//! cityheat_section: "08-heat-network-balancing"
//! cityheat_subsection: "tests"
//! cityheat_type: "test"
//! cityheat_scope: "code"
//! cityheat_description: "Integration tests for the local heating network balancing engine."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
use std::fs;

use approx::assert_relative_eq;
use cityheat_balance::{
    allocation::DEFAULT_EPSILON_W,
    analyze_district_with_options,
    bundle::{load_bundle, save_bundle, verify_bundle, ResultBundle},
    classify::classify,
    io::parse_scenario,
    model::NodeId,
    network::ThermalNetwork,
    profile::BuildingThermalProfile,
    ranking::{parse_criterion, rank, PriorityCriterion},
    run_balance, BalanceError, BalanceSettings,
};
use indexmap::IndexMap;
use tempfile::tempdir;

const LOSS_RATE_W: f64 = 150.0;
const HORIZON: usize = 48;

/// Deterministic generator so failures can be reproduced.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[derive(Default)]
struct Columns {
    net: Vec<f64>,
    chp_nom: Vec<f64>,
    chp_min: Vec<f64>,
    boiler_nom: Vec<f64>,
    boiler_min: Vec<f64>,
}

impl Columns {
    fn push(&mut self, net: f64, chp: (f64, f64), boiler: (f64, f64)) {
        self.net.push(net);
        self.chp_nom.push(chp.0);
        self.chp_min.push(chp.1);
        self.boiler_nom.push(boiler.0);
        self.boiler_min.push(boiler.1);
    }

    fn into_profile(self) -> BuildingThermalProfile {
        BuildingThermalProfile::new(
            self.net,
            self.chp_nom,
            self.chp_min,
            self.boiler_nom,
            self.boiler_min,
            Vec::new(),
        )
        .unwrap()
    }
}

/// Feasible profiles for six buildings: supplier balances equal their free device
/// capacity and consumer deficits never exceed what the suppliers can deliver.
fn generated_profiles(seed: u64) -> IndexMap<NodeId, BuildingThermalProfile> {
    let ids: Vec<NodeId> = vec![11, 12, 13, 14, 15, 16];
    let mut rng = Lcg(seed);
    let mut columns: Vec<Columns> = ids.iter().map(|_| Columns::default()).collect();

    for _ in 0..HORIZON {
        let mut rows = Vec::with_capacity(ids.len());
        let mut supply = 0.0;
        let mut deficits = 0.0;
        for _ in &ids {
            let role = rng.next();
            if role < 0.4 {
                let deficit = 500.0 + 4_000.0 * rng.next();
                deficits += deficit;
                rows.push((-deficit, (0.0, 0.0), (0.0, 0.0)));
            } else if role < 0.75 {
                let chp_nom = 2_000.0 + 8_000.0 * rng.next();
                let chp_min = chp_nom * (0.3 + 0.4 * rng.next());
                let boiler_nom = if rng.next() < 0.5 { 3_000.0 * rng.next() } else { 0.0 };
                supply += chp_nom + boiler_nom;
                rows.push((chp_nom + boiler_nom, (chp_nom, chp_min), (boiler_nom, 0.1 * boiler_nom)));
            } else {
                let boiler_nom = 1_000.0 + 6_000.0 * rng.next();
                supply += boiler_nom;
                rows.push((boiler_nom, (0.0, 0.0), (boiler_nom, 0.1 * boiler_nom)));
            }
        }

        let budget = 0.9 * supply - LOSS_RATE_W;
        let scale = if deficits == 0.0 || budget <= 0.0 {
            0.0
        } else {
            (budget / deficits).min(1.0)
        };
        for (column, (net, chp, boiler)) in columns.iter_mut().zip(rows) {
            let net = if net < 0.0 { net * scale } else { net };
            column.push(net, chp, boiler);
        }
    }

    ids.into_iter()
        .zip(columns)
        .map(|(id, column)| (id, column.into_profile()))
        .collect()
}

fn network_for(profiles: &IndexMap<NodeId, BuildingThermalProfile>, loss: f64) -> ThermalNetwork {
    ThermalNetwork::with_loss_rate(0, profiles.keys().copied().collect(), loss)
}

#[test]
fn supply_matches_demand_at_every_timestep() {
    for seed in [1, 7, 42, 1234] {
        let profiles = generated_profiles(seed);
        let network = network_for(&profiles, LOSS_RATE_W);
        let result = run_balance(&network, &profiles, HORIZON, PriorityCriterion::Co2).unwrap();

        for t in 0..HORIZON {
            let deficits: f64 = profiles
                .values()
                .map(|p| p.net_balance(t))
                .filter(|b| *b < 0.0)
                .map(f64::abs)
                .sum();
            let expected = if deficits > 0.0 { deficits + LOSS_RATE_W } else { 0.0 };
            assert_relative_eq!(result.demand_w[t], expected, epsilon = 1e-9);
            let net_supply = result.supplied_w(t) - result.dumped_heat_w[t];
            assert!(
                (net_supply - expected).abs() <= DEFAULT_EPSILON_W,
                "seed {seed} timestep {t}: supplied {net_supply}, demand {expected}"
            );
        }
    }
}

#[test]
fn allocations_stay_within_part_load_band() {
    for seed in [3, 99, 2024] {
        let profiles = generated_profiles(seed);
        let network = network_for(&profiles, LOSS_RATE_W);
        let result = run_balance(&network, &profiles, HORIZON, PriorityCriterion::Co2).unwrap();

        for (building, profile) in &profiles {
            for t in 0..HORIZON {
                let chp = result.chp_supply_w(*building, t);
                if chp != 0.0 {
                    let band = profile.chp(t);
                    assert!(chp >= band.min_w - 1e-9 && chp <= band.nominal_w + 1e-9);
                }
                let boiler = result.boiler_supply_w(*building, t);
                if boiler != 0.0 {
                    let band = profile.boiler(t);
                    assert!(boiler >= band.min_w - 1e-9 && boiler <= band.nominal_w + 1e-9);
                }
            }
        }
    }
}

#[test]
fn co2_ranking_orders_chp_by_nominal_power() {
    let profiles = generated_profiles(5);
    let participants: Vec<_> = profiles.iter().map(|(id, p)| (*id, p)).collect();
    for t in 0..HORIZON {
        let snapshot = classify(&participants, t);
        let ranked = rank(&snapshot, PriorityCriterion::Co2).unwrap();
        let chp_count = snapshot.chp_suppliers.len();
        for pair in ranked[..chp_count].windows(2) {
            assert!(pair[0].chp.nominal_w >= pair[1].chp.nominal_w);
        }
        assert!(ranked[chp_count..].iter().all(|s| s.chp.nominal_w == 0.0));
    }
}

#[test]
fn repeated_runs_are_identical() {
    let profiles = generated_profiles(77);
    let network = network_for(&profiles, LOSS_RATE_W);
    let first = run_balance(&network, &profiles, HORIZON, PriorityCriterion::Co2).unwrap();
    let second = run_balance(&network, &profiles, HORIZON, PriorityCriterion::Co2).unwrap();
    assert_eq!(first, second);
}

fn single_step(balance: f64, chp: (f64, f64), boiler: (f64, f64)) -> BuildingThermalProfile {
    BuildingThermalProfile::new(
        vec![balance],
        vec![chp.0],
        vec![chp.1],
        vec![boiler.0],
        vec![boiler.1],
        Vec::new(),
    )
    .unwrap()
}

#[test]
fn shortfall_of_one_watt_is_infeasible() {
    let mut profiles = IndexMap::new();
    profiles.insert(1, single_step(10.0, (0.0, 0.0), (10.0, 1.0)));
    profiles.insert(2, single_step(4.0, (0.0, 0.0), (4.0, 1.0)));
    profiles.insert(3, single_step(-15.0, (0.0, 0.0), (0.0, 0.0)));
    let network = network_for(&profiles, 0.0);

    let err = run_balance(&network, &profiles, 1, PriorityCriterion::Co2).unwrap_err();
    match err {
        BalanceError::InsufficientSupply {
            timestep,
            supply_w,
            demand_w,
        } => {
            assert_eq!(timestep, 0);
            assert_eq!(supply_w, 14.0);
            assert_eq!(demand_w, 15.0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn exact_fit_drops_second_chp_to_its_minimum() {
    let mut profiles = IndexMap::new();
    profiles.insert(1, single_step(8.0, (8.0, 5.0), (0.0, 0.0)));
    profiles.insert(2, single_step(4.0, (4.0, 2.0), (0.0, 0.0)));
    profiles.insert(3, single_step(-10.0, (0.0, 0.0), (0.0, 0.0)));
    let network = network_for(&profiles, 0.0);

    // 8 + 4 = 12 overshoots by 2, which equals the 4 - 2 range of the last unit.
    let result = run_balance(&network, &profiles, 1, PriorityCriterion::Co2).unwrap();
    assert_eq!(result.chp_supply_w(1, 0), 8.0);
    assert_eq!(result.chp_supply_w(2, 0), 2.0);
    assert_eq!(result.boiler_supply_w(1, 0), 0.0);
    assert_eq!(result.dumped_heat_w[0], 0.0);
    assert_eq!(result.supplied_w(0), 10.0);
}

#[test]
fn cost_criterion_is_unsupported() {
    let mut profiles = IndexMap::new();
    profiles.insert(1, single_step(8.0, (8.0, 5.0), (0.0, 0.0)));
    profiles.insert(2, single_step(-4.0, (0.0, 0.0), (0.0, 0.0)));
    let network = network_for(&profiles, 0.0);

    let criterion = parse_criterion("cost").unwrap();
    assert!(matches!(
        run_balance(&network, &profiles, 1, criterion),
        Err(BalanceError::UnsupportedCriterion(_))
    ));
}

const SCENARIO: &str = r#"{
  "district": {
    "version": "two-houses",
    "nodes": [
      {"id": 1, "kind": "building", "name": "plant"},
      {"id": 2, "kind": "building", "name": "school"},
      {"id": 7, "kind": "heating"}
    ],
    "edges": [
      {"from": 1, "to": 7, "network_type": "heating", "weight": 30.0,
       "supply_temp_c": 70.0, "return_temp_c": 40.0, "inner_diameter_m": 0.04},
      {"from": 7, "to": 2, "network_type": "heating_and_deg", "weight": 20.0}
    ]
  },
  "buildings": {
    "1": {
      "energy_system": {
        "chp": {"q_nominal_w": 12000.0, "p_nominal_w": 6000.0, "lower_activation_limit": 0.5},
        "boiler": {"q_nominal_w": 20000.0}
      },
      "profile": {
        "net_balance": [18000.0, 18000.0, 0.0],
        "chp_nominal": [12000.0, 12000.0, 12000.0],
        "chp_min": [6000.0, 6000.0, 6000.0],
        "boiler_nominal": [6000.0, 6000.0, 6000.0],
        "boiler_min": [2000.0, 2000.0, 2000.0]
      },
      "local": {"boiler_heat_w": [14000.0, 14000.0, 0.0]}
    },
    "2": {
      "profile": {
        "net_balance": [-9000.0, -15000.0, 0.0],
        "chp_nominal": [0.0, 0.0, 0.0],
        "chp_min": [0.0, 0.0, 0.0],
        "boiler_nominal": [0.0, 0.0, 0.0],
        "boiler_min": [0.0, 0.0, 0.0]
      }
    }
  }
}"#;

#[test]
fn district_run_exports_reports_and_bundle() {
    let mut scenario = parse_scenario(SCENARIO).unwrap();
    let original = scenario.clone();
    let dir = tempdir().unwrap();

    let balance = analyze_district_with_options(
        &mut scenario,
        &BalanceSettings::default(),
        Some(dir.path()),
        true,
    )
    .unwrap();

    let summary = &balance.networks[0];
    assert_eq!(summary.buildings, vec![1, 2]);
    assert_relative_eq!(summary.total_length_m, 50.0);
    assert_eq!(summary.deficit_timesteps, 2);

    let loss = summary.loss_rate_w;
    let allocation = &balance.allocations[0];
    assert_relative_eq!(allocation.chp_supply_w(1, 0), 9_000.0 + loss, epsilon = 1e-6);
    assert_eq!(allocation.chp_supply_w(1, 1), 12_000.0);
    assert_relative_eq!(allocation.boiler_supply_w(1, 1), 3_000.0 + loss, epsilon = 1e-6);

    // Local boiler heat plus the network share ends up on the device.
    let operation = &scenario.buildings[&1].operation;
    assert_relative_eq!(operation.boiler_heat_w[1], 17_000.0 + loss, epsilon = 1e-6);
    assert!(operation.fuel_w[0] > 0.0);
    assert_eq!(operation.fuel_w[2], 0.0);
    assert_eq!(original.buildings[&1].operation.fuel_w.len(), 0);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("network_summary.json")).unwrap())
            .unwrap();
    assert_eq!(report["model_version"], "two-houses");
    assert_eq!(report["data"][0]["deficit_timesteps"], 2);
    assert!(report["schema"].is_object());

    let bundle_path = dir.path().join("lhn_results.json");
    let bundle = ResultBundle::from_balance(scenario.clone(), &balance);
    save_bundle(&bundle, balance.run_id, &bundle_path).unwrap();
    assert!(verify_bundle(&bundle_path));
    let loaded = load_bundle(&bundle_path).unwrap();
    assert_eq!(loaded.run_id, balance.run_id);
    assert_eq!(loaded.bundle.allocations[&1].chp_supply_w[1], 12_000.0);
    assert_eq!(loaded.bundle.district, scenario);
}

#[test]
fn infeasible_district_is_rejected() {
    let mut scenario = parse_scenario(SCENARIO).unwrap();
    let record = scenario.buildings.get_mut(&2).unwrap();
    record.profile = BuildingThermalProfile::new(
        vec![-30_000.0, 0.0, 0.0],
        vec![0.0; 3],
        vec![0.0; 3],
        vec![0.0; 3],
        vec![0.0; 3],
        Vec::new(),
    )
    .unwrap();

    let err = cityheat_balance::balance_district(&mut scenario, &BalanceSettings::default())
        .unwrap_err();
    assert!(err.is_infeasible());
}
