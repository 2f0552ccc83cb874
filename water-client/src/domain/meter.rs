use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::{domain::PeriodKey, error::RegistryError};

/// Zone sentinel carried by the L1 main bulk meter.
pub const MAIN_BULK_ZONE: &str = "Main Bulk";

/// Zone sentinel carried by direct-connection meters.
pub const DIRECT_CONNECTION_ZONE: &str = "Direct Connection";

/// Position of a meter in the distribution hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Level {
    /// Main bulk supply; the system input.
    L1,
    /// Zone bulk.
    L2,
    /// Building bulk or villa end-user.
    L3,
    /// Apartment end-user.
    L4,
    /// Direct connection fed from the main bulk, bypassing the zone layer.
    #[cfg_attr(feature = "serde", serde(rename = "DC"))]
    Dc,
}

impl Level {
    pub const ALL: [Level; 5] = [Level::L1, Level::L2, Level::L3, Level::L4, Level::Dc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::L1 => "L1",
            Level::L2 => "L2",
            Level::L3 => "L3",
            Level::L4 => "L4",
            Level::Dc => "DC",
        }
    }

    /// L3 and L4 meters sit below a zone bulk.
    pub fn is_in_zone(&self) -> bool {
        matches!(self, Level::L3 | Level::L4)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L1" => Ok(Level::L1),
            "L2" => Ok(Level::L2),
            "L3" => Ok(Level::L3),
            "L4" => Ok(Level::L4),
            "DC" => Ok(Level::Dc),
            _ => Err(RegistryError::InvalidLevel(s.to_string())),
        }
    }
}

/// A metering point with its per-period consumption in cubic meters.
///
/// `consumption` keeps the difference between "no reading" (`None` or an
/// absent key) and a reading of zero. Both sum as 0; only data-availability
/// checks tell them apart.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Meter {
    pub account_number: String,
    pub label: String,
    pub level: Level,
    pub zone: String,
    pub meter_type: String,
    /// Label or account number of the meter directly above this one.
    pub parent_meter: Option<String>,
    pub consumption: BTreeMap<PeriodKey, Option<f64>>,
}

impl Meter {
    /// A meter with no readings. The zone defaults to the level's sentinel
    /// for L1 and DC meters, and is blank otherwise.
    pub fn new(account_number: impl Into<String>, label: impl Into<String>, level: Level) -> Self {
        let zone = match level {
            Level::L1 => MAIN_BULK_ZONE,
            Level::Dc => DIRECT_CONNECTION_ZONE,
            _ => "",
        };
        Self {
            account_number: account_number.into(),
            label: label.into(),
            level,
            zone: zone.to_string(),
            meter_type: String::new(),
            parent_meter: None,
            consumption: BTreeMap::new(),
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = zone.into();
        self
    }

    pub fn with_type(mut self, meter_type: impl Into<String>) -> Self {
        self.meter_type = meter_type.into();
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_meter = Some(parent.into());
        self
    }

    pub fn with_reading(mut self, period: PeriodKey, value: Option<f64>) -> Self {
        self.consumption.insert(period, value);
        self
    }

    /// Reading for `period`, with a missing or null reading counted as 0.
    pub fn reading(&self, period: &PeriodKey) -> f64 {
        self.consumption.get(period).copied().flatten().unwrap_or(0.0)
    }

    pub fn has_reading(&self, period: &PeriodKey) -> bool {
        matches!(self.consumption.get(period), Some(Some(_)))
    }

    pub fn total(&self, periods: &[PeriodKey]) -> f64 {
        periods.iter().map(|p| self.reading(p)).fold(0.0, |acc, v| acc + v)
    }
}
