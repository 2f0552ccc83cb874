use std::collections::HashMap;

use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::Date;

use crate::{
    domain::{DailyZoneReading, Level, Meter, PeriodKey},
    error::RegistryError,
};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WaterMeterRow {
    pub account_number: String,
    pub label: String,
    pub level: String,
    pub zone: Option<String>,
    pub parent_meter: Option<String>,
    pub meter_type: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReadingRow {
    pub account_number: String,
    /// `Mon-YY`, e.g. `Jan-25`.
    pub period: String,
    pub consumption: Option<f64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyLossRow {
    pub zone: String,
    pub day: i32,
    pub l2_total_m3: f64,
    pub l3_total_m3: f64,
    pub loss_m3: Option<f64>,
    pub loss_percent: Option<f64>,
}

/// Meters assembled from storage, plus the number of rows that could not be
/// mapped (unknown level, unparseable period, reading for an unknown meter).
#[derive(Debug, Clone, Default)]
pub struct LoadedMeters {
    pub meters: Vec<Meter>,
    pub skipped: usize,
}

/// Turn meter and reading rows into domain meters, keeping row order.
pub fn assemble_meters(meter_rows: Vec<WaterMeterRow>, reading_rows: Vec<ReadingRow>) -> LoadedMeters {
    let mut loaded = LoadedMeters::default();
    let mut index: HashMap<String, usize> = HashMap::with_capacity(meter_rows.len());

    for row in meter_rows {
        let Ok(level) = row.level.parse::<Level>() else {
            loaded.skipped += 1;
            continue;
        };
        let mut meter = Meter::new(row.account_number.trim(), row.label, level);
        if let Some(zone) = row.zone.filter(|z| !z.trim().is_empty()) {
            meter = meter.with_zone(zone);
        }
        if let Some(meter_type) = row.meter_type {
            meter = meter.with_type(meter_type);
        }
        if let Some(parent) = row.parent_meter.filter(|p| !p.trim().is_empty()) {
            meter = meter.with_parent(parent);
        }
        index.insert(meter.account_number.clone(), loaded.meters.len());
        loaded.meters.push(meter);
    }

    for row in reading_rows {
        let (Ok(period), Some(idx)) = (
            row.period.parse::<PeriodKey>(),
            index.get(row.account_number.trim()),
        ) else {
            loaded.skipped += 1;
            continue;
        };
        loaded.meters[*idx].consumption.insert(period, row.consumption);
    }

    loaded
}

/// Turn stored daily rows for one month into readings. A day that does not
/// exist in `period` fails the whole batch.
pub fn assemble_daily_losses(
    period: PeriodKey,
    rows: Vec<DailyLossRow>,
) -> Result<Vec<DailyZoneReading>, RegistryError> {
    rows.into_iter()
        .map(|row| -> Result<DailyZoneReading, RegistryError> {
            // Out-of-range column values map to day 0, which never validates.
            let day = u8::try_from(row.day).unwrap_or(0);
            Ok(
                DailyZoneReading::new(row.zone, period, day, row.l2_total_m3, row.l3_total_m3)?
                    .with_stored_loss(row.loss_m3, row.loss_percent),
            )
        })
        .collect()
}

/// Load every meter with its monthly readings.
pub async fn load_meters(pool: &PgPool) -> Result<LoadedMeters> {
    let meter_rows = sqlx::query_as::<_, WaterMeterRow>(
        r#"
        SELECT
            account_number,
            label,
            level,
            zone,
            parent_meter,
            meter_type
        FROM water_meters
        ORDER BY account_number
        "#,
    )
    .fetch_all(pool)
    .await?;

    let reading_rows = sqlx::query_as::<_, ReadingRow>(
        r#"
        SELECT
            account_number,
            period,
            consumption
        FROM water_meter_readings
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(assemble_meters(meter_rows, reading_rows))
}

/// Daily zone totals for one zone and month, ordered by day.
pub async fn load_daily_losses(
    pool: &PgPool,
    zone: &str,
    period: PeriodKey,
) -> Result<Vec<DailyZoneReading>> {
    let rows = sqlx::query_as::<_, DailyLossRow>(
        r#"
        SELECT
            zone,
            day,
            l2_total_m3,
            l3_total_m3,
            loss_m3,
            loss_percent
        FROM water_loss_daily
        WHERE zone = $1
          AND month = $2
          AND year = $3
        ORDER BY day
        "#,
    )
    .bind(zone)
    .bind(i32::from(u8::from(period.month())))
    .bind(period.year())
    .fetch_all(pool)
    .await?;

    Ok(assemble_daily_losses(period, rows)?)
}

/// Replace the stored daily rows for every (zone, month) present in
/// `readings`, in one transaction.
pub async fn store_daily_losses(pool: &PgPool, readings: &[DailyZoneReading]) -> Result<u64> {
    if readings.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;

    let mut seen: Vec<(&str, PeriodKey)> = Vec::new();
    for r in readings {
        if !seen.contains(&(r.zone.as_str(), r.period)) {
            seen.push((r.zone.as_str(), r.period));
        }
    }
    for (zone, period) in seen {
        sqlx::query("DELETE FROM water_loss_daily WHERE zone = $1 AND month = $2 AND year = $3")
            .bind(zone)
            .bind(i32::from(u8::from(period.month())))
            .bind(period.year())
            .execute(&mut *tx)
            .await?;
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO water_loss_daily (zone, day, date, l2_total_m3, l3_total_m3, loss_m3, loss_percent, month, year) ",
    );
    let mut rows = Vec::with_capacity(readings.len());
    for r in readings {
        let date = Date::from_calendar_date(r.period.year(), r.period.month(), r.day)?;
        rows.push((r, date));
    }
    builder.push_values(&rows, |mut b, (r, date)| {
        b.push_bind(&r.zone)
            .push_bind(i32::from(r.day))
            .push_bind(*date)
            .push_bind(r.l2_total_m3)
            .push_bind(r.l3_total_m3)
            .push_bind(r.loss_m3())
            .push_bind(r.loss_percent())
            .push_bind(i32::from(u8::from(r.period.month())))
            .push_bind(r.period.year());
    });
    let inserted = builder.build().execute(&mut *tx).await?.rows_affected();

    tx.commit().await?;
    Ok(inserted)
}
