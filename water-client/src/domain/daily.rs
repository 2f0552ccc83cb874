use crate::{
    domain::{Level, PeriodKey},
    error::RegistryError,
};

/// One imported meter row with a reading column per day of the month.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DailyMeterRow {
    pub account_number: String,
    pub label: String,
    pub level: Level,
    pub zone: String,
    /// Index 0 is day 1.
    pub readings: [Option<f64>; 31],
}

impl DailyMeterRow {
    pub fn new(
        account_number: impl Into<String>,
        label: impl Into<String>,
        level: Level,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            account_number: account_number.into(),
            label: label.into(),
            level,
            zone: zone.into(),
            readings: [None; 31],
        }
    }

    /// Reading for `day` (1-based); `None` outside 1..=31.
    pub fn reading(&self, day: u8) -> Option<f64> {
        let idx = usize::from(day).checked_sub(1)?;
        self.readings.get(idx).copied().flatten()
    }

    pub fn set_reading(&mut self, day: u8, value: Option<f64>) -> Result<(), RegistryError> {
        let idx = usize::from(day)
            .checked_sub(1)
            .filter(|i| *i < self.readings.len())
            .ok_or(RegistryError::InvalidDay { day, max: 31 })?;
        self.readings[idx] = value;
        Ok(())
    }

    /// Latest day carrying a reading, if any.
    pub fn last_day_with_data(&self) -> Option<u8> {
        self.readings
            .iter()
            .rposition(Option::is_some)
            .map(|idx| idx as u8 + 1)
    }
}

/// Zone bulk versus individual totals for one day of one month.
///
/// Storage may carry precomputed loss values; when absent they are derived
/// from the two totals the same way monthly zone loss is.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DailyZoneReading {
    pub zone: String,
    pub period: PeriodKey,
    pub day: u8,
    pub l2_total_m3: f64,
    pub l3_total_m3: f64,
    stored_loss_m3: Option<f64>,
    stored_loss_percent: Option<f64>,
}

impl DailyZoneReading {
    pub fn new(
        zone: impl Into<String>,
        period: PeriodKey,
        day: u8,
        l2_total_m3: f64,
        l3_total_m3: f64,
    ) -> Result<Self, RegistryError> {
        let max = period.days_in_month();
        if day == 0 || day > max {
            return Err(RegistryError::InvalidDay { day, max });
        }
        Ok(Self {
            zone: zone.into(),
            period,
            day,
            l2_total_m3,
            l3_total_m3,
            stored_loss_m3: None,
            stored_loss_percent: None,
        })
    }

    pub fn with_stored_loss(mut self, loss_m3: Option<f64>, loss_percent: Option<f64>) -> Self {
        self.stored_loss_m3 = loss_m3;
        self.stored_loss_percent = loss_percent;
        self
    }

    pub fn loss_m3(&self) -> f64 {
        self.stored_loss_m3
            .unwrap_or(self.l2_total_m3 - self.l3_total_m3)
    }

    pub fn loss_percent(&self) -> f64 {
        self.stored_loss_percent.unwrap_or_else(|| {
            if self.l2_total_m3 == 0.0 {
                0.0
            } else {
                self.loss_m3() / self.l2_total_m3 * 100.0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feb_25() -> PeriodKey {
        "Feb-25".parse().unwrap()
    }

    #[test]
    fn day_must_fall_within_month() {
        assert!(DailyZoneReading::new("Zone_05", feb_25(), 28, 10.0, 8.0).is_ok());
        assert!(matches!(
            DailyZoneReading::new("Zone_05", feb_25(), 29, 10.0, 8.0),
            Err(RegistryError::InvalidDay { day: 29, max: 28 })
        ));
        assert!(DailyZoneReading::new("Zone_05", feb_25(), 0, 10.0, 8.0).is_err());
    }

    #[test]
    fn loss_is_derived_unless_stored() {
        let r = DailyZoneReading::new("Zone_05", feb_25(), 3, 200.0, 150.0).unwrap();
        assert_eq!(r.loss_m3(), 50.0);
        assert_eq!(r.loss_percent(), 25.0);

        let r = r.with_stored_loss(Some(49.5), Some(24.75));
        assert_eq!(r.loss_m3(), 49.5);
        assert_eq!(r.loss_percent(), 24.75);
    }

    #[test]
    fn zero_bulk_day_reports_zero_percent() {
        let r = DailyZoneReading::new("Zone_05", feb_25(), 1, 0.0, 4.0).unwrap();
        assert_eq!(r.loss_m3(), -4.0);
        assert_eq!(r.loss_percent(), 0.0);
    }

    #[test]
    fn row_tracks_last_day_with_data() {
        let mut row = DailyMeterRow::new("4300172", "Z5-1", Level::L3, "Zone_05");
        assert_eq!(row.last_day_with_data(), None);
        row.set_reading(12, Some(3.0)).unwrap();
        row.set_reading(2, Some(0.0)).unwrap();
        assert_eq!(row.last_day_with_data(), Some(12));
        assert_eq!(row.reading(2), Some(0.0));
        assert_eq!(row.reading(0), None);
        assert!(row.set_reading(32, Some(1.0)).is_err());
    }
}
