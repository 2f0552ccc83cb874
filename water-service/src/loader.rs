//! Loading a meter snapshot from the configured source.

use std::sync::Arc;

use sqlx::postgres::{PgPool, PgPoolOptions};
use water_client::domain::Meter;

use crate::{
    config::{AppConfig, SourceKind},
    pipeline::{Pipeline, PipelineError, RecordStream, Source},
    session::SessionHandle,
    sinks::SnapshotSink,
    sources::{MonthlyCsvFileSource, PostgresMeterSource},
    transform,
};

enum MeterSource {
    Csv(MonthlyCsvFileSource),
    Postgres(PostgresMeterSource),
}

#[async_trait::async_trait]
impl Source<Meter> for MeterSource {
    async fn stream(&self) -> RecordStream<Meter> {
        match self {
            Self::Csv(s) => s.stream().await,
            Self::Postgres(s) => s.stream().await,
        }
    }
}

/// Runs the load pipeline into a session. Cheap to share; every call to
/// [`Loader::load`] reads the source afresh.
pub struct Loader {
    cfg: Arc<AppConfig>,
    pool: Option<PgPool>,
    session: SessionHandle,
}

impl Loader {
    /// Connects to Postgres only when the source needs it.
    pub async fn connect(cfg: Arc<AppConfig>, session: SessionHandle) -> anyhow::Result<Self> {
        let pool = match (&cfg.source.kind, &cfg.database) {
            (SourceKind::Postgres, Some(db)) => Some(
                PgPoolOptions::new()
                    .max_connections(db.max_connections)
                    .connect(&db.uri)
                    .await?,
            ),
            (SourceKind::Postgres, None) => anyhow::bail!("[database] is required for a postgres source"),
            (SourceKind::Csv, _) => None,
        };
        Ok(Self { cfg, pool, session })
    }

    pub fn config(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    fn source(&self) -> Result<MeterSource, PipelineError> {
        match (&self.cfg.source.kind, &self.pool) {
            (SourceKind::Postgres, Some(pool)) => Ok(MeterSource::Postgres(PostgresMeterSource::new(pool.clone()))),
            (SourceKind::Postgres, None) => Err(PipelineError::Source("postgres pool is not connected".into())),
            (SourceKind::Csv, _) => self
                .cfg
                .source
                .csv_path
                .as_ref()
                .map(|p| MeterSource::Csv(MonthlyCsvFileSource::new(p)))
                .ok_or_else(|| PipelineError::Source("source.csv_path is not set".into())),
        }
    }

    /// Load and publish a fresh snapshot. On failure the previous snapshot
    /// stays current.
    pub async fn load(&self) -> Result<(), PipelineError> {
        let catalog = self
            .cfg
            .period_catalog()
            .map_err(|e| PipelineError::Source(e.to_string()))?;

        let pipeline: Pipeline<_, Meter, _> = Pipeline {
            source: self.source()?,
            transforms: vec![Arc::new(transform::MeterValidation)],
            sink: SnapshotSink::new(
                self.session.clone(),
                catalog,
                &self.cfg.analysis.excluded_meters,
            ),
        };

        pipeline.run().await
    }
}
