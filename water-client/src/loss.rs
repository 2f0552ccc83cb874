//! Non-revenue water loss accounting.
//!
//! Stage model, all volumes summed over the requested periods:
//!
//! - stage 1 (trunk):   `A1 - (A2 + DC)`
//! - stage 2 (zones):   `A2 - A3_individual`
//! - stage 3 (risers):  `A3_bulk - A4`, a breakdown inside stage 2
//! - total:             `A1 - (A3_individual + DC)` = stage 1 + stage 2
//!
//! Every function is pure. The only failures are structural: an empty
//! registry or an empty period set.

use std::collections::BTreeMap;

use crate::{
    aggregate::{self, ZoneAggregate},
    domain::{
        BuildingAnalysis, Level, LossStatus, Meter, PerformanceRating, PeriodAnalysis, PeriodKey,
        RangeAnalysis, TypeCategories, TypeConsumption, ZoneAnalysis, ZoneDirectory,
    },
    error::AnalysisError,
    registry::MeterRegistry,
};

const HIGH_LOSS_PCT: f64 = 20.0;
const MEDIUM_LOSS_PCT: f64 = 10.0;

/// `part / whole * 100`, or 0 when `whole` is 0.
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

fn ensure_inputs(registry: &MeterRegistry, periods: &[PeriodKey]) -> Result<(), AnalysisError> {
    if registry.is_empty() {
        return Err(AnalysisError::EmptyRegistry);
    }
    if periods.is_empty() {
        return Err(AnalysisError::EmptyPeriodSet);
    }
    Ok(())
}

pub fn compute_range_analysis(
    registry: &MeterRegistry,
    periods: &[PeriodKey],
) -> Result<RangeAnalysis, AnalysisError> {
    ensure_inputs(registry, periods)?;

    let a1 = aggregate::sum_level(registry, Level::L1, periods);
    let a2 = aggregate::sum_level(registry, Level::L2, periods);
    let dc = aggregate::sum_level(registry, Level::Dc, periods);
    let a3_individual = aggregate::individual_in_zones(registry, periods);

    let mut a3_bulk = 0.0;
    let mut a4 = 0.0;
    for building in aggregate::building_bulks(registry) {
        a3_bulk += registry.meter(building).total(periods);
        a4 += aggregate::apartments(registry, building)
            .into_iter()
            .map(|id| registry.meter(id).total(periods))
            .fold(0.0, |acc, v| acc + v);
    }

    let stage1_loss = a1 - (a2 + dc);
    let stage2_loss = a2 - a3_individual;
    let stage3_loss = a3_bulk - a4;
    let total_loss = a1 - (a3_individual + dc);
    let loss_percentage = percentage(total_loss, a1);

    Ok(RangeAnalysis {
        a1,
        a2,
        direct_connections: dc,
        a3_bulk,
        a3_individual,
        a4,
        stage1_loss,
        stage2_loss,
        stage3_loss,
        total_loss,
        stage1_loss_percentage: percentage(stage1_loss, a1),
        stage2_loss_percentage: percentage(stage2_loss, a2),
        stage3_loss_percentage: percentage(stage3_loss, a3_bulk),
        loss_percentage,
        efficiency: 100.0 - loss_percentage,
    })
}

/// One system-wide analysis per period, in the order given.
pub fn monthly_trends(
    registry: &MeterRegistry,
    periods: &[PeriodKey],
) -> Result<Vec<PeriodAnalysis>, AnalysisError> {
    ensure_inputs(registry, periods)?;
    periods
        .iter()
        .map(|period| {
            compute_range_analysis(registry, std::slice::from_ref(period)).map(|analysis| {
                PeriodAnalysis {
                    period: *period,
                    analysis,
                }
            })
        })
        .collect()
}

fn zone_analysis_from(agg: ZoneAggregate) -> ZoneAnalysis {
    let loss = agg.l2_bulk - agg.l3_sum;
    let loss_percentage = percentage(loss, agg.l2_bulk);
    ZoneAnalysis {
        zone_name: agg.zone.clone(),
        zone: agg.zone,
        bulk_meter_reading: agg.l2_bulk,
        individual_total: agg.l3_sum,
        loss,
        loss_percentage,
        efficiency: 100.0 - loss_percentage,
        meter_count: agg.meter_count,
    }
}

/// Zone bulk versus its end-user meters. A zone with no L2 meter, or a
/// bulk reading of 0, reports 0 % loss.
pub fn compute_zone_analysis(
    registry: &MeterRegistry,
    zone: &str,
    periods: &[PeriodKey],
) -> Result<ZoneAnalysis, AnalysisError> {
    ensure_inputs(registry, periods)?;
    Ok(zone_analysis_from(aggregate::aggregate_zone(registry, zone, periods)))
}

/// Every zone, named from `directory`, worst loss percentage first.
pub fn all_zones_analysis(
    registry: &MeterRegistry,
    periods: &[PeriodKey],
    directory: &ZoneDirectory,
) -> Result<Vec<ZoneAnalysis>, AnalysisError> {
    ensure_inputs(registry, periods)?;
    let mut zones: Vec<ZoneAnalysis> = aggregate::aggregate_all_zones(registry, periods)
        .into_iter()
        .map(|agg| zone_analysis_from(agg).named(directory))
        .collect();
    zones.sort_by(|a, b| b.loss_percentage.total_cmp(&a.loss_percentage));
    Ok(zones)
}

/// Building bulk versus its apartments. `None` when the account is unknown
/// or the meter has no apartments below it.
pub fn compute_building_analysis(
    registry: &MeterRegistry,
    account_number: &str,
    periods: &[PeriodKey],
) -> Result<Option<BuildingAnalysis>, AnalysisError> {
    ensure_inputs(registry, periods)?;

    let Some(id) = registry.id_of(account_number) else {
        return Ok(None);
    };
    let apartments = aggregate::apartments(registry, id);
    if registry.meter(id).level != Level::L3 || apartments.is_empty() {
        return Ok(None);
    }

    let bulk = registry.meter(id);
    let bulk_meter_reading = bulk.total(periods);
    let apartment_total: f64 = apartments
        .iter()
        .map(|a| registry.meter(*a).total(periods))
        .fold(0.0, |acc, v| acc + v);
    let loss = bulk_meter_reading - apartment_total;

    Ok(Some(BuildingAnalysis {
        building: bulk.label.clone(),
        account_number: bulk.account_number.clone(),
        zone: bulk.zone.clone(),
        bulk_meter_reading,
        apartment_total,
        loss,
        loss_percentage: percentage(loss, bulk_meter_reading),
        apartment_count: apartments.len(),
    }))
}

pub fn all_buildings_analysis(
    registry: &MeterRegistry,
    periods: &[PeriodKey],
) -> Result<Vec<BuildingAnalysis>, AnalysisError> {
    ensure_inputs(registry, periods)?;
    let mut out = Vec::new();
    for id in aggregate::building_bulks(registry) {
        let account = &registry.meter(id).account_number;
        if let Some(analysis) = compute_building_analysis(registry, account, periods)? {
            out.push(analysis);
        }
    }
    Ok(out)
}

/// Rate a loss percentage. Total over every `f64`: non-finite input rates
/// as unknown.
pub fn get_performance_rating(loss_percentage: f64) -> PerformanceRating {
    let (status, color, emoji) = if !loss_percentage.is_finite() {
        (LossStatus::Unknown, "#6B7280", "⚪")
    } else if loss_percentage > HIGH_LOSS_PCT {
        (LossStatus::HighLoss, "#EF4444", "🔴")
    } else if loss_percentage > MEDIUM_LOSS_PCT {
        (LossStatus::MediumLoss, "#F59E0B", "🟡")
    } else if loss_percentage >= 0.0 {
        (LossStatus::Good, "#10B981", "🟢")
    } else {
        (LossStatus::Gain, "#14B8A6", "🔵")
    };
    PerformanceRating {
        status,
        color,
        emoji,
    }
}

/// Meters that deliver water to a consumer: end-user L3/L4 meters and
/// direct connections. Building bulks are left out so their apartments are
/// not counted twice.
fn consuming_meters(registry: &MeterRegistry) -> impl Iterator<Item = &Meter> {
    registry
        .iter()
        .filter(move |(id, m)| m.level == Level::Dc || aggregate::is_end_user(registry, *id))
        .map(|(_, m)| m)
}

fn grouped_consumption<F>(
    registry: &MeterRegistry,
    period: &PeriodKey,
    group_of: F,
) -> Vec<TypeConsumption>
where
    F: Fn(&Meter) -> String,
{
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for meter in consuming_meters(registry) {
        *totals.entry(group_of(meter)).or_insert(0.0) += meter.reading(period);
    }
    let grand_total: f64 = totals.values().fold(0.0, |acc, v| acc + v);

    let mut out: Vec<TypeConsumption> = totals
        .into_iter()
        .map(|(group, total)| TypeConsumption {
            meter_type: group,
            total,
            percentage: percentage(total, grand_total),
        })
        .collect();
    out.sort_by(|a, b| b.total.total_cmp(&a.total));
    out
}

/// Consumption for one period grouped by the meters' `type` field, largest
/// first.
pub fn get_consumption_by_type(
    registry: &MeterRegistry,
    period: &PeriodKey,
) -> Result<Vec<TypeConsumption>, AnalysisError> {
    ensure_inputs(registry, std::slice::from_ref(period))?;
    Ok(grouped_consumption(registry, period, |m| m.meter_type.clone()))
}

/// Consumption for one period grouped into reporting categories, largest
/// first.
pub fn get_consumption_by_category(
    registry: &MeterRegistry,
    period: &PeriodKey,
    categories: &TypeCategories,
) -> Result<Vec<TypeConsumption>, AnalysisError> {
    ensure_inputs(registry, std::slice::from_ref(period))?;
    Ok(grouped_consumption(registry, period, |m| {
        categories.category_of(&m.meter_type).to_string()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> PeriodKey {
        s.parse().unwrap()
    }

    /// One main bulk, ZoneA bulk with three villas, and a direct connection.
    fn example() -> MeterRegistry {
        let jan = key("Jan-25");
        let mut meters = vec![
            Meter::new("M", "Main", Level::L1).with_reading(jan, Some(1000.0)),
            Meter::new("ZA", "ZoneA Bulk", Level::L2)
                .with_zone("ZoneA")
                .with_parent("Main")
                .with_type("Zone Bulk")
                .with_reading(jan, Some(600.0)),
            Meter::new("DC", "Hotel", Level::Dc)
                .with_parent("Main")
                .with_type("Retail")
                .with_reading(jan, Some(300.0)),
        ];
        for i in 1..=3 {
            meters.push(
                Meter::new(format!("V{i}"), format!("Villa {i}"), Level::L3)
                    .with_zone("ZoneA")
                    .with_parent("ZoneA Bulk")
                    .with_type("Residential (Villa)")
                    .with_reading(jan, Some(150.0)),
            );
        }
        MeterRegistry::new(meters).unwrap()
    }

    #[test]
    fn range_analysis_matches_worked_example() {
        let a = compute_range_analysis(&example(), &[key("Jan-25")]).unwrap();
        assert_eq!(a.a1, 1000.0);
        assert_eq!(a.a2, 600.0);
        assert_eq!(a.direct_connections, 300.0);
        assert_eq!(a.stage1_loss, 100.0);
        assert_eq!(a.a3_individual, 450.0);
        assert_eq!(a.stage2_loss, 150.0);
        assert_eq!(a.total_loss, 250.0);
        assert_eq!(a.loss_percentage, 25.0);
        assert_eq!(a.efficiency, 75.0);
        assert_eq!(a.stage3_loss, 0.0);
        assert_eq!(a.stage3_loss_percentage, 0.0);
    }

    #[test]
    fn zone_analysis_matches_worked_example() {
        let z = compute_zone_analysis(&example(), "ZoneA", &[key("Jan-25")]).unwrap();
        assert_eq!(z.bulk_meter_reading, 600.0);
        assert_eq!(z.individual_total, 450.0);
        assert_eq!(z.loss, 150.0);
        assert_eq!(z.loss_percentage, 25.0);
        assert_eq!(z.meter_count, 3);
        assert_eq!(get_performance_rating(z.loss_percentage).status, LossStatus::HighLoss);
    }

    #[test]
    fn zero_bulk_zone_reports_zero_percent() {
        let z = compute_zone_analysis(&example(), "ZoneA", &[key("Feb-25")]).unwrap();
        assert_eq!(z.bulk_meter_reading, 0.0);
        assert_eq!(z.loss_percentage, 0.0);
        assert!(z.loss_percentage.is_finite());
    }

    #[test]
    fn unknown_zone_is_all_zero() {
        let z = compute_zone_analysis(&example(), "Nowhere", &[key("Jan-25")]).unwrap();
        assert_eq!(z.bulk_meter_reading, 0.0);
        assert_eq!(z.loss_percentage, 0.0);
        assert_eq!(z.meter_count, 0);
    }

    #[test]
    fn negative_loss_is_passed_through_as_gain() {
        let jan = key("Jan-25");
        let meters = vec![
            Meter::new("M", "Main", Level::L1).with_reading(jan, Some(100.0)),
            Meter::new("ZA", "Bulk", Level::L2)
                .with_zone("ZoneA")
                .with_parent("Main")
                .with_reading(jan, Some(80.0)),
            Meter::new("V", "Villa", Level::L3)
                .with_zone("ZoneA")
                .with_parent("Bulk")
                .with_reading(jan, Some(100.0)),
        ];
        let reg = MeterRegistry::new(meters).unwrap();
        let z = compute_zone_analysis(&reg, "ZoneA", &[jan]).unwrap();
        assert_eq!(z.loss, -20.0);
        assert_eq!(z.loss_percentage, -25.0);
        assert_eq!(get_performance_rating(z.loss_percentage).status, LossStatus::Gain);
    }

    #[test]
    fn rating_boundaries() {
        let status = |p: f64| get_performance_rating(p).status;
        assert_eq!(status(20.01), LossStatus::HighLoss);
        assert_eq!(status(20.0), LossStatus::MediumLoss);
        assert_eq!(status(10.5), LossStatus::MediumLoss);
        assert_eq!(status(10.0), LossStatus::Good);
        assert_eq!(status(0.0), LossStatus::Good);
        assert_eq!(status(-0.1), LossStatus::Gain);
        assert_eq!(status(f64::NAN), LossStatus::Unknown);
        assert_eq!(status(f64::INFINITY), LossStatus::Unknown);
        assert_eq!(get_performance_rating(25.0).color, "#EF4444");
    }

    #[test]
    fn structural_failures() {
        let empty = MeterRegistry::default();
        assert_eq!(
            compute_range_analysis(&empty, &[key("Jan-25")]),
            Err(AnalysisError::EmptyRegistry)
        );
        assert_eq!(
            compute_zone_analysis(&example(), "ZoneA", &[]),
            Err(AnalysisError::EmptyPeriodSet)
        );
        assert_eq!(
            get_consumption_by_type(&empty, &key("Jan-25")),
            Err(AnalysisError::EmptyRegistry)
        );
    }

    #[test]
    fn consumption_by_type_excludes_bulk_levels() {
        let by_type = get_consumption_by_type(&example(), &key("Jan-25")).unwrap();
        assert_eq!(by_type.len(), 2);
        assert_eq!(by_type[0].meter_type, "Residential (Villa)");
        assert_eq!(by_type[0].total, 450.0);
        assert_eq!(by_type[0].percentage, 60.0);
        assert_eq!(by_type[1].meter_type, "Retail");
        assert_eq!(by_type[1].percentage, 40.0);
    }

    #[test]
    fn consumption_by_category_uses_configured_groups() {
        let cats = get_consumption_by_category(&example(), &key("Jan-25"), &TypeCategories::default())
            .unwrap();
        let names: Vec<_> = cats.iter().map(|c| c.meter_type.as_str()).collect();
        assert_eq!(names, ["Residential", "Commercial"]);
    }

    #[test]
    fn trends_have_one_entry_per_period() {
        let periods = [key("Jan-25"), key("Feb-25")];
        let trends = monthly_trends(&example(), &periods).unwrap();
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].analysis.total_loss, 250.0);
        assert_eq!(trends[1].analysis.a1, 0.0);
        assert_eq!(trends[1].analysis.loss_percentage, 0.0);
    }

    #[test]
    fn zones_sorted_worst_first_and_named() {
        let jan = key("Jan-25");
        let mut meters: Vec<Meter> = example().meters().to_vec();
        meters.push(
            Meter::new("ZB", "ZoneB Bulk", Level::L2)
                .with_zone("ZoneB")
                .with_parent("Main")
                .with_reading(jan, Some(100.0)),
        );
        let reg = MeterRegistry::new(meters).unwrap();
        let dir = ZoneDirectory::new([("ZoneB", "Zone B")]);
        let zones = all_zones_analysis(&reg, &[jan], &dir).unwrap();
        assert_eq!(zones[0].zone, "ZoneB");
        assert_eq!(zones[0].zone_name, "Zone B");
        assert_eq!(zones[0].loss_percentage, 100.0);
        assert_eq!(zones[1].zone_name, "ZoneA");
    }

    #[test]
    fn building_analysis_compares_bulk_to_apartments() {
        let jan = key("Jan-25");
        let mut meters: Vec<Meter> = example().meters().to_vec();
        meters.push(
            Meter::new("D44", "D-44 Building Bulk Meter", Level::L3)
                .with_zone("ZoneA")
                .with_parent("ZoneA Bulk")
                .with_reading(jan, Some(100.0)),
        );
        for (acct, v) in [("AP1", 40.0), ("AP2", 35.0)] {
            meters.push(
                Meter::new(acct, acct, Level::L4)
                    .with_zone("ZoneA")
                    .with_parent("D-44 Building Bulk Meter")
                    .with_reading(jan, Some(v)),
            );
        }
        let reg = MeterRegistry::new(meters).unwrap();

        let b = compute_building_analysis(&reg, "D44", &[jan]).unwrap().unwrap();
        assert_eq!(b.apartment_total, 75.0);
        assert_eq!(b.loss, 25.0);
        assert_eq!(b.loss_percentage, 25.0);
        assert_eq!(b.apartment_count, 2);
        assert!(compute_building_analysis(&reg, "V1", &[jan]).unwrap().is_none());
        assert!(compute_building_analysis(&reg, "nope", &[jan]).unwrap().is_none());

        let range = compute_range_analysis(&reg, &[jan]).unwrap();
        assert_eq!(range.a3_bulk, 100.0);
        assert_eq!(range.a4, 75.0);
        assert_eq!(range.stage3_loss, 25.0);
        // Apartments count as individual; the building bulk does not.
        assert_eq!(range.a3_individual, 525.0);
        assert_eq!(all_buildings_analysis(&reg, &[jan]).unwrap().len(), 1);
    }
}
