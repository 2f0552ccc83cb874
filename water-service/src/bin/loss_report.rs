use anyhow::{Context, Result};
use std::{env, sync::Arc};
use water_client::{
    domain::{LossStatus, PeriodKey},
    loss,
};
use water_service::{config::AppConfig, loader::Loader, observability, session::SessionHandle};

/// Print the system balance and zone table for a period range as JSON.
///
/// Usage:
///   loss_report [start] [end]
///
/// Without arguments the latest period with data is reported. Zones whose
/// loss exceeds `analysis.high_loss_alert_pct` are logged as alerts.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let parse = |idx: usize| -> Result<Option<PeriodKey>> {
        args.get(idx)
            .map(|s| s.parse::<PeriodKey>().with_context(|| format!("invalid period '{s}'")))
            .transpose()
    };
    let (start, end) = (parse(0)?, parse(1)?);

    let cfg = Arc::new(AppConfig::load()?);
    let alert_pct = cfg.analysis.high_loss_alert_pct;
    let zones = cfg.zone_directory();

    let session = SessionHandle::new();
    let loader = Loader::connect(cfg, session.clone()).await?;
    loader.load().await?;
    let snapshot = session
        .current()
        .await
        .context("loader finished without publishing a snapshot")?;

    let periods = snapshot.catalog.default_range(&snapshot.registry, start, end)?;
    let system = loss::compute_range_analysis(&snapshot.registry, &periods)?;
    let zone_table = loss::all_zones_analysis(&snapshot.registry, &periods, &zones)?;
    let buildings = loss::all_buildings_analysis(&snapshot.registry, &periods)?;

    for z in &zone_table {
        let rating = loss::get_performance_rating(z.loss_percentage);
        if z.loss_percentage > alert_pct {
            tracing::warn!(
                zone = %z.zone_name,
                loss_m3 = z.loss,
                loss_pct = z.loss_percentage,
                status = rating.status.label(),
                "zone loss above alert threshold"
            );
        } else if rating.status == LossStatus::Gain {
            tracing::info!(zone = %z.zone_name, loss_m3 = z.loss, "individual meters exceed zone bulk");
        }
    }

    let rating = loss::get_performance_rating(system.loss_percentage);
    tracing::info!(
        first = %periods[0],
        last = %periods[periods.len() - 1],
        total_loss_m3 = system.total_loss,
        loss_pct = system.loss_percentage,
        status = rating.status.label(),
        loss_alert_threshold = alert_pct,
        "system balance computed"
    );

    let report = serde_json::json!({
        "fingerprint": snapshot.fingerprint,
        "periods": periods,
        "system": system,
        "rating": rating,
        "zones": zone_table,
        "buildings": buildings,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
