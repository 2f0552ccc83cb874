//! Period catalog and range resolution.

use crate::{
    domain::PeriodKey,
    error::{AnalysisError, RegistryError},
    registry::MeterRegistry,
};

/// Ascending list of the periods a deployment knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodCatalog {
    periods: Vec<PeriodKey>,
}

impl PeriodCatalog {
    /// Wrap an explicit list, which must be strictly ascending.
    pub fn new(periods: Vec<PeriodKey>) -> Result<Self, RegistryError> {
        if let Some(pair) = periods.windows(2).find(|w| w[0] >= w[1]) {
            return Err(RegistryError::UnsortedCatalog(pair[1].to_string()));
        }
        Ok(Self { periods })
    }

    /// Every month from `first` to `last`, inclusive.
    pub fn monthly(first: PeriodKey, last: PeriodKey) -> Result<Self, RegistryError> {
        if first > last {
            return Err(RegistryError::UnsortedCatalog(last.to_string()));
        }
        let mut periods = vec![first];
        let mut current = first;
        while current < last {
            current = current.next();
            periods.push(current);
        }
        Ok(Self { periods })
    }

    pub fn periods(&self) -> &[PeriodKey] {
        &self.periods
    }

    pub fn contains(&self, period: &PeriodKey) -> bool {
        self.position(period).is_some()
    }

    fn position(&self, period: &PeriodKey) -> Option<usize> {
        self.periods.binary_search(period).ok()
    }

    /// Inclusive sub-sequence from `start` to `end`.
    pub fn resolve_range(
        &self,
        start: &PeriodKey,
        end: &PeriodKey,
    ) -> Result<Vec<PeriodKey>, AnalysisError> {
        let invalid = |reason: &str| AnalysisError::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
            reason: reason.to_string(),
        };

        let start_idx = self
            .position(start)
            .ok_or_else(|| invalid("start period is not in the catalog"))?;
        let end_idx = self
            .position(end)
            .ok_or_else(|| invalid("end period is not in the catalog"))?;
        if start_idx > end_idx {
            return Err(invalid("start period is after end period"));
        }

        Ok(self.periods[start_idx..=end_idx].to_vec())
    }

    /// Same as [`resolve_range`](Self::resolve_range) for raw `Mon-YY`
    /// strings; unparseable keys are reported as an invalid range.
    pub fn resolve_range_str(&self, start: &str, end: &str) -> Result<Vec<PeriodKey>, AnalysisError> {
        let parse = |s: &str| {
            s.parse::<PeriodKey>().map_err(|e| AnalysisError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
                reason: e.to_string(),
            })
        };
        self.resolve_range(&parse(start)?, &parse(end)?)
    }

    /// Resolve a range whose ends may be omitted. A missing end defaults to
    /// the latest catalog period with data; a missing start defaults to the
    /// end.
    pub fn default_range(
        &self,
        registry: &MeterRegistry,
        start: Option<PeriodKey>,
        end: Option<PeriodKey>,
    ) -> Result<Vec<PeriodKey>, AnalysisError> {
        let end = match end {
            Some(end) => end,
            None => self.latest_with_data(registry)?,
        };
        let start = start.unwrap_or(end);
        self.resolve_range(&start, &end)
    }

    /// Like [`latest_period_with_data`], ignoring readings for periods the
    /// catalog does not list.
    pub fn latest_with_data(&self, registry: &MeterRegistry) -> Result<PeriodKey, AnalysisError> {
        self.periods
            .iter()
            .rev()
            .find(|p| registry.meters().iter().any(|m| m.has_reading(p)))
            .copied()
            .ok_or(AnalysisError::NoDataAvailable)
    }

    /// Periods carrying at least one reading that the catalog does not list.
    pub fn uncatalogued_periods(&self, registry: &MeterRegistry) -> Vec<PeriodKey> {
        let mut out: Vec<PeriodKey> = registry
            .meters()
            .iter()
            .flat_map(|m| m.consumption.iter().filter(|(_, v)| v.is_some()).map(|(p, _)| *p))
            .filter(|p| !self.contains(p))
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Catalog periods in which at least one meter reads above zero.
    pub fn available_periods(&self, registry: &MeterRegistry) -> Vec<PeriodKey> {
        self.periods
            .iter()
            .filter(|p| registry.meters().iter().any(|m| m.reading(p) > 0.0))
            .copied()
            .collect()
    }
}

/// Latest period for which any meter has a (possibly zero) reading.
pub fn latest_period_with_data(registry: &MeterRegistry) -> Result<PeriodKey, AnalysisError> {
    registry
        .meters()
        .iter()
        .flat_map(|m| {
            m.consumption
                .iter()
                .filter(|(_, v)| v.is_some())
                .map(|(p, _)| *p)
        })
        .max()
        .ok_or(AnalysisError::NoDataAvailable)
}
