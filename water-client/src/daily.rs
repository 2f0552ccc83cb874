//! Daily zone loss from per-day meter columns.

use std::collections::BTreeMap;

use crate::{
    domain::{DailyMeterRow, DailyZoneReading, Level, PeriodKey, ZoneAnalysis},
    error::RegistryError,
    loss::percentage,
};

#[derive(Default)]
struct ZoneRows<'a> {
    bulk: Vec<&'a DailyMeterRow>,
    individual: Vec<&'a DailyMeterRow>,
}

fn day_sum(rows: &[&DailyMeterRow], day: u8) -> Option<f64> {
    rows.iter()
        .filter_map(|r| r.reading(day))
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// One reading per zone and day, zones in code order.
///
/// L2 rows make up the bulk total; L3, L4 and DC rows the individual total.
/// L1 rows are ignored. Days run to the last day any row has data and are
/// capped at the month length. A day with no reading on either side yields
/// no record.
pub fn derive_daily_losses(
    period: PeriodKey,
    rows: &[DailyMeterRow],
) -> Result<Vec<DailyZoneReading>, RegistryError> {
    let mut zones: BTreeMap<&str, ZoneRows<'_>> = BTreeMap::new();
    for row in rows {
        let group = zones.entry(row.zone.as_str()).or_default();
        match row.level {
            Level::L1 => {}
            Level::L2 => group.bulk.push(row),
            Level::L3 | Level::L4 | Level::Dc => group.individual.push(row),
        }
    }

    let max_day = rows
        .iter()
        .filter_map(DailyMeterRow::last_day_with_data)
        .max()
        .unwrap_or(0)
        .min(period.days_in_month());

    let mut out = Vec::new();
    for (zone, group) in &zones {
        for day in 1..=max_day {
            let l2 = day_sum(&group.bulk, day);
            let l3 = day_sum(&group.individual, day);
            if l2.is_none() && l3.is_none() {
                continue;
            }
            out.push(DailyZoneReading::new(
                *zone,
                period,
                day,
                l2.unwrap_or(0.0),
                l3.unwrap_or(0.0),
            )?);
        }
    }
    Ok(out)
}

/// Fold the days of one zone into a zone analysis. Readings for other zones
/// are skipped; `meter_count` is the number of days folded.
pub fn summarize_daily(readings: &[DailyZoneReading], zone: &str) -> ZoneAnalysis {
    let days: Vec<&DailyZoneReading> = readings.iter().filter(|r| r.zone == zone).collect();
    let bulk: f64 = days.iter().map(|r| r.l2_total_m3).fold(0.0, |acc, v| acc + v);
    let individual: f64 = days.iter().map(|r| r.l3_total_m3).fold(0.0, |acc, v| acc + v);
    let loss = bulk - individual;
    let loss_percentage = percentage(loss, bulk);

    ZoneAnalysis {
        zone: zone.to_string(),
        zone_name: zone.to_string(),
        bulk_meter_reading: bulk,
        individual_total: individual,
        loss,
        loss_percentage,
        efficiency: 100.0 - loss_percentage,
        meter_count: days.len(),
    }
}
