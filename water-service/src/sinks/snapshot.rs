use std::collections::HashSet;

use futures::StreamExt;
use water_client::{domain::Meter, MeterRegistry, PeriodCatalog};

use crate::{
    pipeline::{Envelope, PipelineError, Sink},
    session::{SessionHandle, Snapshot},
};

/// Builds a registry from every meter that made it through the pipeline and
/// publishes it as the session's current snapshot.
///
/// Rejected records are counted and skipped. Excluded account numbers are
/// dropped before the registry is built. Structural registry failures
/// (duplicate accounts, not exactly one main bulk) fail the load and leave
/// the previous snapshot in place.
pub struct SnapshotSink {
    session: SessionHandle,
    catalog: PeriodCatalog,
    excluded: HashSet<String>,
}

impl SnapshotSink {
    pub fn new<I, E>(session: SessionHandle, catalog: PeriodCatalog, excluded: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: AsRef<str>,
    {
        Self {
            session,
            catalog,
            excluded: excluded
                .into_iter()
                .map(|e| e.as_ref().trim().to_string())
                .collect(),
        }
    }

    fn build(&self, meters: Vec<Meter>) -> Result<Snapshot, PipelineError> {
        let before = meters.len();
        let meters: Vec<Meter> = meters
            .into_iter()
            .filter(|m| !self.excluded.contains(m.account_number.trim()))
            .collect();
        let excluded = before - meters.len();
        if excluded > 0 {
            metrics::counter!("water_meters_excluded_total").increment(excluded as u64);
            tracing::info!(excluded, "dropped excluded meters");
        }

        let registry = MeterRegistry::new(meters)
            .map_err(|e| PipelineError::Sink(format!("failed to build meter registry: {e}")))?;

        for orphan in registry.orphans() {
            tracing::warn!(
                account = %orphan.account_number,
                parent = orphan.parent_meter.as_deref().unwrap_or(""),
                "parent meter reference did not resolve"
            );
        }
        for review in registry.zone_review() {
            tracing::warn!(
                account = %review.account_number,
                label = %review.label,
                proposed_zone = review.proposed_zone.unwrap_or("none"),
                "meter has no zone on record"
            );
        }

        let uncatalogued = self.catalog.uncatalogued_periods(&registry);
        if !uncatalogued.is_empty() {
            let periods: Vec<String> = uncatalogued.iter().map(ToString::to_string).collect();
            tracing::warn!(
                periods = %periods.join(","),
                "readings outside the period catalog are not reachable by range queries"
            );
        }

        Ok(Snapshot::new(registry, self.catalog.clone()))
    }
}

#[async_trait::async_trait]
impl Sink<Meter> for SnapshotSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<Meter>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut meters = Vec::new();
        let mut rejected = 0usize;

        while let Some(item) = input.next().await {
            match item {
                Ok(env) => meters.push(env.payload),
                Err(PipelineError::Transform(e)) => {
                    tracing::debug!(error = %e, "record rejected upstream");
                    rejected += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let snapshot = self.build(meters)?;
        let meter_count = snapshot.registry.len();
        tracing::info!(
            meters = meter_count,
            rejected,
            periods = snapshot.catalog.periods().len(),
            fingerprint = %snapshot.fingerprint,
            "meter snapshot loaded"
        );
        metrics::counter!("water_snapshot_loads_total").increment(1);
        metrics::gauge!("water_snapshot_meters").set(meter_count as f64);

        self.session.publish(snapshot).await;
        Ok(())
    }
}
