//! Meter registry: an arena of meters with the parent/child index built
//! once at load time.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
    domain::{Level, Meter},
    error::RegistryError,
    zone_hint::{self, ZoneInference},
};

/// Index of a meter inside one [`MeterRegistry`]. Only meaningful for the
/// registry that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeterId(usize);

/// Read-only catalog of metering points for one loaded snapshot.
///
/// Parent references are resolved by label (case-insensitive) first and by
/// account number second. References that resolve to nothing are kept as
/// orphans instead of failing the load.
#[derive(Debug, Clone, Default)]
pub struct MeterRegistry {
    meters: Vec<Meter>,
    by_account: HashMap<String, MeterId>,
    by_label: HashMap<String, MeterId>,
    parents: Vec<Option<MeterId>>,
    children: Vec<Vec<MeterId>>,
    orphans: Vec<MeterId>,
}

fn label_key(label: &str) -> String {
    label.trim().to_lowercase()
}

impl MeterRegistry {
    /// Build the registry and its hierarchy index.
    ///
    /// An empty meter list yields an empty registry; a non-empty one must
    /// hold exactly one L1 meter and unique account numbers.
    pub fn new(meters: Vec<Meter>) -> Result<Self, RegistryError> {
        if meters.is_empty() {
            return Ok(Self::default());
        }

        let main_bulk_count = meters.iter().filter(|m| m.level == Level::L1).count();
        if main_bulk_count != 1 {
            return Err(RegistryError::MainBulkCount(main_bulk_count));
        }

        let mut by_account = HashMap::with_capacity(meters.len());
        let mut by_label = HashMap::with_capacity(meters.len());
        for (idx, meter) in meters.iter().enumerate() {
            let account = meter.account_number.trim().to_string();
            if by_account.insert(account.clone(), MeterId(idx)).is_some() {
                return Err(RegistryError::DuplicateAccount(account));
            }
            // Labels are not unique identifiers; the first one wins.
            by_label.entry(label_key(&meter.label)).or_insert(MeterId(idx));
        }

        let mut registry = Self {
            parents: vec![None; meters.len()],
            children: vec![Vec::new(); meters.len()],
            meters,
            by_account,
            by_label,
            orphans: Vec::new(),
        };

        for idx in 0..registry.meters.len() {
            let id = MeterId(idx);
            let meter = &registry.meters[idx];
            if meter.level == Level::L1 {
                // The main bulk's parent is the external supplier.
                continue;
            }
            let parent = meter
                .parent_meter
                .as_deref()
                .and_then(|reference| registry.resolve(reference))
                .filter(|parent| *parent != id);
            match parent {
                Some(parent) => {
                    registry.parents[idx] = Some(parent);
                    registry.children[parent.0].push(id);
                }
                None => registry.orphans.push(id),
            }
        }

        Ok(registry)
    }

    fn resolve(&self, reference: &str) -> Option<MeterId> {
        self.by_label
            .get(&label_key(reference))
            .or_else(|| self.by_account.get(reference.trim()))
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn meters(&self) -> &[Meter] {
        &self.meters
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeterId, &Meter)> {
        self.meters.iter().enumerate().map(|(i, m)| (MeterId(i), m))
    }

    pub fn meter(&self, id: MeterId) -> &Meter {
        &self.meters[id.0]
    }

    pub fn id_of(&self, account_number: &str) -> Option<MeterId> {
        self.by_account.get(account_number.trim()).copied()
    }

    pub fn meter_by_account(&self, account_number: &str) -> Option<&Meter> {
        self.id_of(account_number).map(|id| self.meter(id))
    }

    pub fn main_bulk(&self) -> Option<MeterId> {
        self.ids_by_level(Level::L1).next()
    }

    pub fn ids_by_level(&self, level: Level) -> impl Iterator<Item = MeterId> + '_ {
        self.iter()
            .filter(move |(_, m)| m.level == level)
            .map(|(id, _)| id)
    }

    pub fn meters_by_level(&self, level: Level) -> Vec<&Meter> {
        self.meters.iter().filter(|m| m.level == level).collect()
    }

    pub fn meters_by_zone(&self, zone: &str) -> Vec<&Meter> {
        self.meters.iter().filter(|m| m.zone == zone).collect()
    }

    pub fn meters_by_type(&self, meter_type: &str) -> Vec<&Meter> {
        self.meters
            .iter()
            .filter(|m| m.meter_type == meter_type)
            .collect()
    }

    /// Direct children of the meter named by `parent` (label or account).
    pub fn meters_by_parent(&self, parent: &str) -> Vec<&Meter> {
        self.resolve(parent)
            .map(|id| self.children(id).iter().map(|c| self.meter(*c)).collect())
            .unwrap_or_default()
    }

    /// Meters whose parent reference points directly at `parent`.
    pub fn classify_descendants(&self, parent: &Meter) -> Vec<&Meter> {
        self.id_of(&parent.account_number)
            .map(|id| self.children(id).iter().map(|c| self.meter(*c)).collect())
            .unwrap_or_default()
    }

    pub fn parent(&self, id: MeterId) -> Option<MeterId> {
        self.parents[id.0]
    }

    pub fn children(&self, id: MeterId) -> &[MeterId] {
        &self.children[id.0]
    }

    pub fn is_leaf(&self, id: MeterId) -> bool {
        self.children[id.0].is_empty()
    }

    /// All meters below `root`, depth-first, children in registry order.
    pub fn descendants(&self, root: MeterId) -> Vec<MeterId> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([root]);
        let mut stack: Vec<MeterId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Distinct zone codes that have at least one L2 meter, sorted.
    pub fn zones(&self) -> Vec<String> {
        self.meters
            .iter()
            .filter(|m| m.level == Level::L2)
            .map(|m| m.zone.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn meter_counts_by_level(&self) -> Vec<(Level, usize)> {
        Level::ALL
            .iter()
            .map(|level| (*level, self.ids_by_level(*level).count()))
            .collect()
    }

    /// Non-L1 meters whose parent reference did not resolve.
    pub fn orphans(&self) -> Vec<&Meter> {
        self.orphans.iter().map(|id| self.meter(*id)).collect()
    }

    /// Meters with no usable zone on record, with the label heuristic's
    /// proposal for each.
    pub fn zone_review(&self) -> Vec<ZoneInference> {
        self.meters
            .iter()
            .filter(|m| zone_hint::is_unassigned(&m.zone))
            .map(|m| ZoneInference {
                account_number: m.account_number.clone(),
                label: m.label.clone(),
                proposed_zone: zone_hint::infer_zone(&m.label),
            })
            .collect()
    }

    /// Content hash identifying this snapshot of meters and readings.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for meter in &self.meters {
            hash_str(&mut hasher, &meter.account_number);
            hash_str(&mut hasher, &meter.label);
            hash_str(&mut hasher, meter.level.as_str());
            hash_str(&mut hasher, &meter.zone);
            hash_str(&mut hasher, &meter.meter_type);
            hash_str(&mut hasher, meter.parent_meter.as_deref().unwrap_or(""));
            hasher.update(&(meter.consumption.len() as u64).to_le_bytes());
            for (period, value) in &meter.consumption {
                hash_str(&mut hasher, &period.to_string());
                match value {
                    Some(v) => {
                        hasher.update(&[1]);
                        hasher.update(&v.to_bits().to_le_bytes());
                    }
                    None => {
                        hasher.update(&[0]);
                    }
                }
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u32).to_le_bytes());
    hasher.update(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PeriodKey;

    fn sample() -> Vec<Meter> {
        vec![
            Meter::new("C43659", "Main Bulk (NAMA)", Level::L1).with_parent("NAMA"),
            Meter::new("4300343", "ZONE 3A (Bulk Zone 3A)", Level::L2)
                .with_zone("Zone_03_(A)")
                .with_parent("Main Bulk (NAMA)"),
            Meter::new("4300178", "D-44 Building Bulk Meter", Level::L3)
                .with_zone("Zone_03_(A)")
                .with_parent("ZONE 3A (BULK ZONE 3A)"),
            Meter::new("4300030", "Z3-44(1A) (Building)", Level::L4)
                .with_zone("Zone_03_(A)")
                .with_parent("D-44 Building Bulk Meter"),
            Meter::new("4300038", "Z3-23 (Villa)", Level::L3)
                .with_zone("Zone_03_(A)")
                .with_parent("4300343"),
            Meter::new("4300334", "Hotel Main Building", Level::Dc).with_parent("Main Bulk (NAMA)"),
            Meter::new("4300999", "Z5-99", Level::L3)
                .with_zone("Unknown")
                .with_parent("Nowhere"),
        ]
    }

    #[test]
    fn resolves_parents_by_label_case_insensitively_or_account() {
        let reg = MeterRegistry::new(sample()).unwrap();
        let zone = reg.meter_by_account("4300343").unwrap();
        let children: Vec<_> = reg
            .classify_descendants(zone)
            .iter()
            .map(|m| m.account_number.as_str())
            .collect();
        assert_eq!(children, vec!["4300178", "4300038"]);
        assert_eq!(reg.meters_by_parent("d-44 building bulk meter").len(), 1);
    }

    #[test]
    fn descendants_are_transitive() {
        let reg = MeterRegistry::new(sample()).unwrap();
        let zone = reg.id_of("4300343").unwrap();
        let accounts: Vec<_> = reg
            .descendants(zone)
            .into_iter()
            .map(|id| reg.meter(id).account_number.as_str())
            .collect();
        assert_eq!(accounts, vec!["4300178", "4300030", "4300038"]);
        assert!(reg.is_leaf(reg.id_of("4300038").unwrap()));
        assert!(!reg.is_leaf(reg.id_of("4300178").unwrap()));
    }

    #[test]
    fn unresolved_parents_become_orphans() {
        let reg = MeterRegistry::new(sample()).unwrap();
        let orphans: Vec<_> = reg.orphans().iter().map(|m| m.account_number.as_str()).collect();
        assert_eq!(orphans, vec!["4300999"]);
    }

    #[test]
    fn requires_exactly_one_main_bulk() {
        let mut meters = sample();
        meters.push(Meter::new("X1", "Second Main", Level::L1));
        assert_eq!(MeterRegistry::new(meters).unwrap_err(), RegistryError::MainBulkCount(2));

        let meters: Vec<_> = sample().into_iter().filter(|m| m.level != Level::L1).collect();
        assert_eq!(MeterRegistry::new(meters).unwrap_err(), RegistryError::MainBulkCount(0));
    }

    #[test]
    fn rejects_duplicate_accounts() {
        let mut meters = sample();
        meters.push(Meter::new("4300038 ", "Z3-23 copy", Level::L3));
        assert_eq!(
            MeterRegistry::new(meters).unwrap_err(),
            RegistryError::DuplicateAccount("4300038".into())
        );
    }

    #[test]
    fn empty_input_builds_empty_registry() {
        let reg = MeterRegistry::new(Vec::new()).unwrap();
        assert!(reg.is_empty());
        assert!(reg.main_bulk().is_none());
    }

    #[test]
    fn lookups_by_level_zone_and_counts() {
        let reg = MeterRegistry::new(sample()).unwrap();
        assert_eq!(reg.meters_by_level(Level::L3).len(), 3);
        assert_eq!(reg.meters_by_zone("Zone_03_(A)").len(), 4);
        assert!(reg.meters_by_level(Level::L2).iter().all(|m| m.zone == "Zone_03_(A)"));
        assert_eq!(reg.zones(), vec!["Zone_03_(A)".to_string()]);
        assert_eq!(
            reg.meter_counts_by_level(),
            vec![
                (Level::L1, 1),
                (Level::L2, 1),
                (Level::L3, 3),
                (Level::L4, 1),
                (Level::Dc, 1)
            ]
        );
    }

    #[test]
    fn lookups_by_type_match_exactly() {
        let meters: Vec<Meter> = sample()
            .into_iter()
            .map(|m| match m.level {
                Level::L4 => m.with_type("Residential (Apart)"),
                Level::L3 => m.with_type("Residential (Villa)"),
                _ => m,
            })
            .collect();
        let reg = MeterRegistry::new(meters).unwrap();

        let villas: Vec<_> = reg
            .meters_by_type("Residential (Villa)")
            .iter()
            .map(|m| m.account_number.as_str())
            .collect();
        assert_eq!(villas, vec!["4300178", "4300038", "4300999"]);
        assert_eq!(reg.meters_by_type("Residential (Apart)").len(), 1);
        assert!(reg.meters_by_type("residential (villa)").is_empty());
    }

    #[test]
    fn zone_review_lists_only_unassigned_meters() {
        let reg = MeterRegistry::new(sample()).unwrap();
        let review = reg.zone_review();
        assert_eq!(review.len(), 1);
        assert_eq!(review[0].account_number, "4300999");
        assert_eq!(review[0].proposed_zone, Some("Zone_05"));
    }

    #[test]
    fn fingerprint_tracks_readings() {
        let jan: PeriodKey = "Jan-25".parse().unwrap();
        let a = MeterRegistry::new(sample()).unwrap();
        let b = MeterRegistry::new(sample()).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut meters = sample();
        meters[4] = meters[4].clone().with_reading(jan, Some(12.0));
        let c = MeterRegistry::new(meters).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
