//! Level and zone subtotals over a set of periods.
//!
//! Everything here returns raw sums; percentages are the loss calculator's
//! business. Each meter has exactly one level and at most one parent, so no
//! sum visits a meter twice.

use crate::{
    domain::{Level, PeriodKey},
    registry::{MeterId, MeterRegistry},
};

/// Raw bulk and individual sums for one zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneAggregate {
    pub zone: String,
    pub l2_bulk: f64,
    /// End-user meters below the zone's L2 meter(s).
    pub l3_sum: f64,
    /// L3 and L4 meters below the zone's L2 meter(s), building bulks included.
    pub meter_count: usize,
}

/// Sum of every `level` meter over `periods`, missing readings as 0.
pub fn sum_level(registry: &MeterRegistry, level: Level, periods: &[PeriodKey]) -> f64 {
    registry
        .meters()
        .iter()
        .filter(|m| m.level == level)
        .map(|m| m.total(periods))
        .fold(0.0, |acc, v| acc + v)
}

/// Same as [`sum_level`], restricted to meters recorded in `zone`.
pub fn sum_zone(registry: &MeterRegistry, zone: &str, level: Level, periods: &[PeriodKey]) -> f64 {
    registry
        .meters()
        .iter()
        .filter(|m| m.level == level && m.zone == zone)
        .map(|m| m.total(periods))
        .fold(0.0, |acc, v| acc + v)
}

/// An end-user meter is an L3/L4 meter with nothing metered below it. An L3
/// with children is a building bulk.
pub fn is_end_user(registry: &MeterRegistry, id: MeterId) -> bool {
    registry.meter(id).level.is_in_zone() && registry.is_leaf(id)
}

/// L3 meters with at least one L4 meter directly below them.
pub fn building_bulks(registry: &MeterRegistry) -> Vec<MeterId> {
    registry
        .ids_by_level(Level::L3)
        .filter(|id| {
            registry
                .children(*id)
                .iter()
                .any(|c| registry.meter(*c).level == Level::L4)
        })
        .collect()
}

/// Apartments (L4) directly below a building bulk.
pub fn apartments(registry: &MeterRegistry, building: MeterId) -> Vec<MeterId> {
    registry
        .children(building)
        .iter()
        .copied()
        .filter(|c| registry.meter(*c).level == Level::L4)
        .collect()
}

/// Sum of end-user meters anywhere below `root`.
pub fn end_user_sum(registry: &MeterRegistry, root: MeterId, periods: &[PeriodKey]) -> f64 {
    registry
        .descendants(root)
        .into_iter()
        .filter(|id| is_end_user(registry, *id))
        .map(|id| registry.meter(id).total(periods))
        .fold(0.0, |acc, v| acc + v)
}

/// End-user sum below every L2 meter; direct connections are not included.
pub fn individual_in_zones(registry: &MeterRegistry, periods: &[PeriodKey]) -> f64 {
    registry
        .ids_by_level(Level::L2)
        .map(|id| end_user_sum(registry, id, periods))
        .fold(0.0, |acc, v| acc + v)
}

fn zone_bulk_ids<'a>(registry: &'a MeterRegistry, zone: &'a str) -> impl Iterator<Item = MeterId> + 'a {
    registry
        .ids_by_level(Level::L2)
        .filter(move |id| registry.meter(*id).zone == zone)
}

pub fn aggregate_zone(registry: &MeterRegistry, zone: &str, periods: &[PeriodKey]) -> ZoneAggregate {
    let mut l2_bulk = 0.0;
    let mut l3_sum = 0.0;
    let mut meter_count = 0;

    for bulk in zone_bulk_ids(registry, zone) {
        l2_bulk += registry.meter(bulk).total(periods);
        for id in registry.descendants(bulk) {
            if !registry.meter(id).level.is_in_zone() {
                continue;
            }
            meter_count += 1;
            if registry.is_leaf(id) {
                l3_sum += registry.meter(id).total(periods);
            }
        }
    }

    ZoneAggregate {
        zone: zone.to_string(),
        l2_bulk,
        l3_sum,
        meter_count,
    }
}

/// One aggregate per zone that has an L2 meter, in zone-code order.
pub fn aggregate_all_zones(registry: &MeterRegistry, periods: &[PeriodKey]) -> Vec<ZoneAggregate> {
    registry
        .zones()
        .iter()
        .map(|zone| aggregate_zone(registry, zone, periods))
        .collect()
}
