use anyhow::{bail, Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::{env, sync::Arc};
use water_client::{
    daily,
    db::water_meter_queries,
    domain::{DailyMeterRow, PeriodKey},
};
use water_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    sinks::CollectSink,
    sources::DailyCsvFileSource,
    transform,
};

/// Derive per-zone daily losses from a per-day CSV export.
///
/// Usage:
///   daily_loss <csv_path> <Mon-YY> [--store]
///   daily_loss --stored <zone> <Mon-YY>
///
/// With `--store` the rows replace that month's entries in
/// `water_loss_daily`. `--stored` reads one zone's month back from that
/// table and prints its summary. Both need `[database]` in the config.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || (args[1] == "--stored" && args.len() < 4) {
        bail!("usage: daily_loss <csv_path> <Mon-YY> [--store] | daily_loss --stored <zone> <Mon-YY>");
    }
    if args[1] == "--stored" {
        return report_stored(&args[2], parse_period(&args[3])?).await;
    }
    let file_path = &args[1];
    let period = parse_period(&args[2])?;
    let store = args.iter().skip(3).any(|a| a == "--store");

    let sink: CollectSink<DailyMeterRow> = CollectSink::new();
    let pipeline: Pipeline<_, DailyMeterRow, _> = Pipeline {
        source: DailyCsvFileSource::new(file_path),
        transforms: vec![Arc::new(transform::DailyRowValidation)],
        sink: sink.clone(),
    };
    pipeline.run().await?;

    let rows = sink.take().await;
    let readings = daily::derive_daily_losses(period, &rows)?;
    tracing::info!(
        rows = rows.len(),
        rejected = sink.rejected().await,
        readings = readings.len(),
        %period,
        "daily losses derived"
    );

    let mut zones: Vec<&str> = readings.iter().map(|r| r.zone.as_str()).collect();
    zones.dedup();
    for zone in zones {
        let summary = daily::summarize_daily(&readings, zone);
        tracing::info!(
            zone,
            days = summary.meter_count,
            bulk_m3 = summary.bulk_meter_reading,
            individual_m3 = summary.individual_total,
            loss_pct = summary.loss_percentage,
            "zone month summary"
        );
    }

    if store {
        let pool = connect().await?;
        let inserted = water_meter_queries::store_daily_losses(&pool, &readings).await?;
        tracing::info!(inserted_rows = inserted, "water_loss_daily updated");
    } else {
        println!("{}", serde_json::to_string_pretty(&readings)?);
    }

    Ok(())
}

fn parse_period(raw: &str) -> Result<PeriodKey> {
    raw.parse()
        .with_context(|| format!("invalid period '{raw}'"))
}

async fn connect() -> Result<PgPool> {
    let cfg = AppConfig::load()?;
    let db = cfg
        .database
        .as_ref()
        .context("daily_loss needs a [database] section in the config")?;
    Ok(PgPoolOptions::new()
        .max_connections(db.max_connections)
        .connect(&db.uri)
        .await?)
}

async fn report_stored(zone: &str, period: PeriodKey) -> Result<()> {
    let pool = connect().await?;
    let readings = water_meter_queries::load_daily_losses(&pool, zone, period).await?;
    if readings.is_empty() {
        bail!("no stored daily rows for {zone} in {period}");
    }
    let summary = daily::summarize_daily(&readings, zone);
    tracing::info!(
        zone,
        %period,
        days = summary.meter_count,
        loss_pct = summary.loss_percentage,
        "stored zone month summary"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
