use sqlx::PgPool;
use water_client::{db::water_meter_queries, domain::Meter};

use crate::pipeline::{Envelope, PipelineError, RecordStream, Source};

/// Meters and monthly readings from the `water_meters` and
/// `water_meter_readings` tables.
pub struct PostgresMeterSource {
    pool: PgPool,
}

impl PostgresMeterSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Source<Meter> for PostgresMeterSource {
    async fn stream(&self) -> RecordStream<Meter> {
        let pool = self.pool.clone();
        let s = async_stream::try_stream! {
            let loaded = water_meter_queries::load_meters(&pool)
                .await
                .map_err(|e| PipelineError::Source(format!("failed to load meters: {e}")))?;

            if loaded.skipped > 0 {
                tracing::warn!(skipped = loaded.skipped, "skipped unmappable meter or reading rows");
            }

            for meter in loaded.meters {
                yield Envelope::new(meter);
            }
        };

        Box::pin(s)
    }
}
