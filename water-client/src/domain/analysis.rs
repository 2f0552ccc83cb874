//! Derived analysis structures. None of these are stored; they are rebuilt
//! from a registry snapshot on every query.

use std::collections::BTreeMap;

use crate::domain::PeriodKey;

/// System-wide loss breakdown over one or more periods, in cubic meters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeAnalysis {
    /// L1 main bulk total (system input).
    pub a1: f64,
    /// Sum of all L2 zone bulk readings.
    pub a2: f64,
    /// Sum of all direct-connection readings.
    pub direct_connections: f64,
    /// Sum of building bulk readings (L3 meters with apartment sub-meters).
    pub a3_bulk: f64,
    /// Sum of end-user readings below the zone bulks.
    pub a3_individual: f64,
    /// Sum of apartment readings below building bulks.
    pub a4: f64,
    pub stage1_loss: f64,
    pub stage2_loss: f64,
    pub stage3_loss: f64,
    pub total_loss: f64,
    pub stage1_loss_percentage: f64,
    pub stage2_loss_percentage: f64,
    pub stage3_loss_percentage: f64,
    pub loss_percentage: f64,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeriodAnalysis {
    pub period: PeriodKey,
    pub analysis: RangeAnalysis,
}

/// Bulk-versus-individual balance for one zone.
///
/// `loss` is negative when the individual meters read more than the bulk;
/// that is reported as-is and rated as a gain.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZoneAnalysis {
    pub zone: String,
    pub zone_name: String,
    pub bulk_meter_reading: f64,
    pub individual_total: f64,
    pub loss: f64,
    pub loss_percentage: f64,
    pub efficiency: f64,
    pub meter_count: usize,
}

impl ZoneAnalysis {
    pub fn named(mut self, directory: &ZoneDirectory) -> Self {
        self.zone_name = directory.name_for(&self.zone).to_string();
        self
    }
}

/// Building bulk meter versus the apartments metered below it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BuildingAnalysis {
    pub building: String,
    pub account_number: String,
    pub zone: String,
    pub bulk_meter_reading: f64,
    pub apartment_total: f64,
    pub loss: f64,
    pub loss_percentage: f64,
    pub apartment_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeConsumption {
    pub meter_type: String,
    pub total: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LossStatus {
    #[cfg_attr(feature = "serde", serde(rename = "High Loss"))]
    HighLoss,
    #[cfg_attr(feature = "serde", serde(rename = "Medium Loss"))]
    MediumLoss,
    Good,
    Gain,
    Unknown,
}

impl LossStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LossStatus::HighLoss => "High Loss",
            LossStatus::MediumLoss => "Medium Loss",
            LossStatus::Good => "Good",
            LossStatus::Gain => "Gain",
            LossStatus::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PerformanceRating {
    pub status: LossStatus,
    pub color: &'static str,
    pub emoji: &'static str,
}

/// Display names for zone codes. Codes without an entry display as
/// themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneDirectory {
    names: BTreeMap<String, String>,
}

impl ZoneDirectory {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            names: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn name_for<'a>(&'a self, code: &'a str) -> &'a str {
        self.names.get(code).map(String::as_str).unwrap_or(code)
    }
}

/// Ordered grouping of meter types into reporting categories.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeCategories {
    categories: Vec<(String, Vec<String>)>,
}

impl TypeCategories {
    pub const OTHER: &'static str = "Other";

    pub fn new(categories: Vec<(String, Vec<String>)>) -> Self {
        Self { categories }
    }

    /// Category containing `meter_type`, or [`Self::OTHER`].
    pub fn category_of(&self, meter_type: &str) -> &str {
        self.categories
            .iter()
            .find(|(_, types)| types.iter().any(|t| t == meter_type))
            .map(|(name, _)| name.as_str())
            .unwrap_or(Self::OTHER)
    }
}

impl Default for TypeCategories {
    fn default() -> Self {
        let group = |name: &str, types: &[&str]| {
            (
                name.to_string(),
                types.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
            )
        };
        Self::new(vec![
            group("Commercial", &["Retail", "Building"]),
            group(
                "Residential",
                &[
                    "Residential (Villa)",
                    "Residential (Apart)",
                    "D_Building_Bulk",
                    "D_Building_Common",
                ],
            ),
            group("Irrigation", &["IRR_Servies"]),
            group("Common", &["MB_Common", "Zone Bulk", "Main BULK"]),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_directory_falls_back_to_code() {
        let dir = ZoneDirectory::new([("Zone_03_(A)", "Zone 3A")]);
        assert_eq!(dir.name_for("Zone_03_(A)"), "Zone 3A");
        assert_eq!(dir.name_for("Zone_99"), "Zone_99");
    }

    #[test]
    fn unlisted_types_fall_into_other() {
        let cats = TypeCategories::default();
        assert_eq!(cats.category_of("Retail"), "Commercial");
        assert_eq!(cats.category_of("IRR_Servies"), "Irrigation");
        assert_eq!(cats.category_of("Something New"), TypeCategories::OTHER);
    }
}
