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
use strum::{Display, EnumString};

use crate::{
    classify::{SupplierRecord, TimestepSnapshot},
    errors::{BalanceError, Result},
};

/// Order in which suppliers are asked to feed the network.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PriorityCriterion {
    /// CHP units first, largest first, then boilers, largest first.
    #[default]
    Co2,
    /// Cheapest generation first. Not available yet.
    Cost,
}

impl PriorityCriterion {
    pub fn ensure_supported(self) -> Result<Self> {
        rank(&TimestepSnapshot::default(), self).map(|_| self)
    }
}

/// Parse a criterion name, mapping unknown names to [`BalanceError::UnsupportedCriterion`].
pub fn parse_criterion(name: &str) -> Result<PriorityCriterion> {
    name.parse()
        .map_err(|_| BalanceError::UnsupportedCriterion(name.to_owned()))
}

/// Rank the suppliers of a timestep. Equal nominal powers keep their input order.
pub fn rank(
    snapshot: &TimestepSnapshot,
    criterion: PriorityCriterion,
) -> Result<Vec<SupplierRecord>> {
    match criterion {
        PriorityCriterion::Co2 => {
            let mut chp = snapshot.chp_suppliers.clone();
            chp.sort_by(|a, b| b.chp.nominal_w.total_cmp(&a.chp.nominal_w));
            let mut boilers = snapshot.boiler_suppliers.clone();
            boilers.sort_by(|a, b| b.boiler.nominal_w.total_cmp(&a.boiler.nominal_w));
            chp.extend(boilers);
            Ok(chp)
        }
        PriorityCriterion::Cost => Err(BalanceError::UnsupportedCriterion(
            "cost ranking".to_owned(),
        )),
    }
}
