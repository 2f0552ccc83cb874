use crate::pipeline::{Envelope, PipelineError, Transform};
use water_client::domain::{DailyMeterRow, Meter, PeriodKey};

fn is_valid_volume(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

/// Pure validation of an imported `Meter`.
///
/// Rules:
/// - account number and label must be non-blank, otherwise the record is
///   rejected.
/// - a recorded reading that is negative or not finite is cleared to "no
///   reading"; the meter and its other readings are kept. Cleared readings
///   are returned alongside the envelope.
///
/// Hierarchy problems (missing or unresolvable parents) are left to the
/// registry, which keeps such meters as orphans.
pub fn validate_meter(
    mut env: Envelope<Meter>,
) -> Result<(Envelope<Meter>, Vec<(PeriodKey, f64)>), PipelineError> {
    let m = &mut env.payload;

    if m.account_number.trim().is_empty() {
        return Err(PipelineError::Transform(format!(
            "meter '{}' has no account number",
            m.label
        )));
    }
    if m.label.trim().is_empty() {
        return Err(PipelineError::Transform(format!(
            "meter '{}': label is blank",
            m.account_number
        )));
    }

    let mut cleared = Vec::new();
    for (period, slot) in m.consumption.iter_mut() {
        if let Some(v) = slot.filter(|v| !is_valid_volume(*v)) {
            cleared.push((*period, v));
            *slot = None;
        }
    }

    Ok((env, cleared))
}

/// Pure validation of an imported daily row: blank account numbers are
/// rejected; invalid day readings are cleared the same way monthly ones are.
pub fn validate_daily_row(
    mut env: Envelope<DailyMeterRow>,
) -> Result<(Envelope<DailyMeterRow>, Vec<(u8, f64)>), PipelineError> {
    let row = &mut env.payload;

    if row.account_number.trim().is_empty() {
        return Err(PipelineError::Transform(format!(
            "daily row '{}' has no account number",
            row.label
        )));
    }

    let mut cleared = Vec::new();
    for (idx, slot) in row.readings.iter_mut().enumerate() {
        if let Some(v) = slot.filter(|v| !is_valid_volume(*v)) {
            cleared.push((idx as u8 + 1, v));
            *slot = None;
        }
    }

    Ok((env, cleared))
}

#[derive(Clone, Default)]
pub struct MeterValidation;

#[async_trait::async_trait]
impl Transform<Meter, Meter> for MeterValidation {
    async fn apply(&self, input: Envelope<Meter>) -> Result<Envelope<Meter>, PipelineError> {
        let account = input.payload.account_number.clone();
        match validate_meter(input) {
            Ok((env, cleared)) => {
                for (period, value) in &cleared {
                    tracing::warn!(account = %account, %period, value, "invalid reading cleared");
                }
                if !cleared.is_empty() {
                    metrics::counter!("water_readings_cleared_total", "record" => "meter")
                        .increment(cleared.len() as u64);
                }
                Ok(env)
            }
            Err(e) => {
                metrics::counter!("water_validation_rejected_total", "record" => "meter").increment(1);
                tracing::warn!(account = %account, error = %e, "meter rejected");
                Err(e)
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct DailyRowValidation;

#[async_trait::async_trait]
impl Transform<DailyMeterRow, DailyMeterRow> for DailyRowValidation {
    async fn apply(
        &self,
        input: Envelope<DailyMeterRow>,
    ) -> Result<Envelope<DailyMeterRow>, PipelineError> {
        let account = input.payload.account_number.clone();
        match validate_daily_row(input) {
            Ok((env, cleared)) => {
                for (day, value) in &cleared {
                    tracing::warn!(account = %account, day, value, "invalid daily reading cleared");
                }
                if !cleared.is_empty() {
                    metrics::counter!("water_readings_cleared_total", "record" => "daily")
                        .increment(cleared.len() as u64);
                }
                Ok(env)
            }
            Err(e) => {
                metrics::counter!("water_validation_rejected_total", "record" => "daily").increment(1);
                tracing::warn!(account = %account, error = %e, "daily row rejected");
                Err(e)
            }
        }
    }
}
