use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use water_client::domain::{DailyMeterRow, Level};

use super::monthly_csv_file::{parse_volume, Columns};
use crate::pipeline::{Envelope, PipelineError, RecordStream, Source};

/// Per-day export for one month: one row per meter, columns `1` to `31`
/// (`Day 1` style headers are accepted too).
pub struct DailyCsvFileSource {
    path: PathBuf,
}

impl DailyCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn day_of(header: &str) -> Option<u8> {
    let h = header.trim();
    let digits = h
        .strip_prefix("Day ")
        .or_else(|| h.strip_prefix("day "))
        .unwrap_or(h);
    digits.parse::<u8>().ok().filter(|d| (1..=31).contains(d))
}

fn record_to_daily_row(
    record: &StringRecord,
    columns: &Columns,
    days: &[(usize, u8)],
) -> Result<DailyMeterRow, PipelineError> {
    let label = columns.require(record, &["Meter Label"])?;
    let account = columns.require(record, &["Acct #", "Account Number"])?;
    let level: Level = columns
        .require(record, &["Label", "Level"])?
        .parse()
        .map_err(|e| PipelineError::Source(format!("daily row '{account}': {e}")))?;
    let zone = columns.get(record, &["Zone"]).unwrap_or("");

    let mut row = DailyMeterRow::new(account, label, level, zone);
    for (idx, day) in days {
        let value = parse_volume(record.get(*idx).unwrap_or(""))?;
        row.set_reading(*day, value)
            .map_err(|e| PipelineError::Source(e.to_string()))?;
    }
    Ok(row)
}

#[async_trait::async_trait]
impl Source<DailyMeterRow> for DailyCsvFileSource {
    async fn stream(&self) -> RecordStream<DailyMeterRow> {
        let path = self.path.clone();
        let s = async_stream::try_stream! {
            let file = File::open(&path)
                .map_err(|e| PipelineError::Source(format!("failed to open CSV file: {e}")))?;
            let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read CSV headers: {e}")))?
                .clone();
            let columns = Columns::new(&headers);
            let days: Vec<(usize, u8)> = headers
                .iter()
                .enumerate()
                .filter_map(|(idx, h)| day_of(h).map(|d| (idx, d)))
                .collect();

            for result in rdr.records() {
                let record = result.map_err(|e| PipelineError::Source(format!(
                    "failed to read CSV record: {e}"
                )))?;

                let row = match record_to_daily_row(&record, &columns, &days) {
                    Ok(r) => r,
                    Err(e) => {
                        metrics::counter!("water_csv_parse_errors_total", "format" => "daily").increment(1);
                        tracing::warn!(error = %e, "skipping unparseable daily CSV row");
                        continue;
                    }
                };

                yield Envelope::new(row);
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;

    #[test]
    fn recognises_day_headers() {
        assert_eq!(day_of("1"), Some(1));
        assert_eq!(day_of(" Day 31"), Some(31));
        assert_eq!(day_of("32"), None);
        assert_eq!(day_of("Zone"), None);
    }

    #[tokio::test]
    async fn streams_daily_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"Meter Label,Acct #,Zone,Label,1,2,3\n\
ZONE 5 (Bulk Zone 5),4300341,Zone_05,L2,100,,120\n\
Z5-17,4300005,Zone_05,L3,60,0,\n",
        )
        .unwrap();

        let items: Vec<_> = DailyCsvFileSource::new(file.path()).stream().await.collect().await;
        let rows: Vec<DailyMeterRow> = items.into_iter().map(|i| i.unwrap().payload).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].reading(1), Some(100.0));
        assert_eq!(rows[0].reading(2), None);
        assert_eq!(rows[1].reading(2), Some(0.0));
        assert_eq!(rows[1].zone, "Zone_05");
        assert_eq!(rows[0].last_day_with_data(), Some(3));
    }
}
