use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use water_client::domain::{Level, Meter, PeriodKey};

use crate::pipeline::{Envelope, PipelineError, RecordStream, Source};

/// Pivoted monthly export: one row per meter, one column per period.
///
/// Expected header columns (by name, surrounding whitespace ignored):
/// - Meter Label
/// - Acct #
/// - Label (the meter level; `Level` is accepted too)
/// - Zone (optional)
/// - Type (optional)
/// - Parent Meter (optional)
/// - any number of `Mon-YY` period columns
///
/// A blank period cell is "no reading" and stays distinct from `0`.
pub struct MonthlyCsvFileSource {
    path: PathBuf,
}

impl MonthlyCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

pub(crate) struct Columns {
    names: Vec<String>,
    periods: Vec<(usize, PeriodKey)>,
}

impl Columns {
    pub(crate) fn new(headers: &StringRecord) -> Self {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        let periods = names
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| name.parse::<PeriodKey>().ok().map(|p| (idx, p)))
            .collect();
        Self { names, periods }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    pub(crate) fn get<'r>(&self, record: &'r StringRecord, names: &[&str]) -> Option<&'r str> {
        names
            .iter()
            .find_map(|name| self.position(name))
            .and_then(|idx| record.get(idx))
            .map(str::trim)
    }

    pub(crate) fn require<'r>(
        &self,
        record: &'r StringRecord,
        names: &[&str],
    ) -> Result<&'r str, PipelineError> {
        self.get(record, names)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PipelineError::Source(format!("missing column '{}' in CSV record", names[0])))
    }
}

/// Blank means no reading. Thousands separators are tolerated.
pub(crate) fn parse_volume(raw: &str) -> Result<Option<f64>, PipelineError> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() || cleaned == "-" {
        return Ok(None);
    }
    cleaned
        .parse::<f64>()
        .map(Some)
        .map_err(|e| PipelineError::Source(format!("invalid volume '{raw}': {e}")))
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.is_empty())
}

pub(crate) fn record_to_meter(record: &StringRecord, columns: &Columns) -> Result<Meter, PipelineError> {
    let label = columns.require(record, &["Meter Label"])?;
    let account = columns.require(record, &["Acct #", "Account Number"])?;
    let level_str = columns.require(record, &["Label", "Level"])?;
    let level: Level = level_str
        .parse()
        .map_err(|e| PipelineError::Source(format!("meter '{account}': {e}")))?;

    let mut meter = Meter::new(account, label, level);
    if let Some(zone) = non_blank(columns.get(record, &["Zone"])) {
        meter = meter.with_zone(zone);
    }
    if let Some(meter_type) = non_blank(columns.get(record, &["Type"])) {
        meter = meter.with_type(meter_type);
    }
    if let Some(parent) = non_blank(columns.get(record, &["Parent Meter"])) {
        meter = meter.with_parent(parent);
    }

    for (idx, period) in &columns.periods {
        let value = parse_volume(record.get(*idx).unwrap_or(""))
            .map_err(|e| PipelineError::Source(format!("meter '{account}' {period}: {e}")))?;
        meter = meter.with_reading(*period, value);
    }

    Ok(meter)
}

#[async_trait::async_trait]
impl Source<Meter> for MonthlyCsvFileSource {
    async fn stream(&self) -> RecordStream<Meter> {
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
            tracing::debug!(path = %path.display(), periods = columns.periods.len(), "reading monthly CSV");

            for result in rdr.records() {
                let record = result.map_err(|e| PipelineError::Source(format!(
                    "failed to read CSV record: {e}"
                )))?;

                let meter = match record_to_meter(&record, &columns) {
                    Ok(m) => m,
                    Err(e) => {
                        metrics::counter!("water_csv_parse_errors_total", "format" => "monthly").increment(1);
                        tracing::warn!(error = %e, "skipping unparseable CSV row");
                        continue;
                    }
                };

                yield Envelope::new(meter);
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

    const CSV: &str = "\
Meter Label,Acct #,Zone,Type,Parent Meter,Label,Jan-25,Feb-25
Main Bulk (NAMA),C43659,Main Bulk,Main BULK,NAMA,L1,\"32,580\",44043
ZONE 3A (Bulk Zone 3A),4300343,Zone_03_(A),Zone Bulk,Main Bulk (NAMA),L2,4235,
Z3-23 (Villa),4300038,Zone_03_(A),Residential (Villa),ZONE 3A (Bulk Zone 3A),L3,12,0
Broken,4300999,Zone_05,Retail,Main Bulk (NAMA),L9,1,1
";

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn volumes_keep_blank_distinct_from_zero() {
        assert_eq!(parse_volume("").unwrap(), None);
        assert_eq!(parse_volume(" 0 ").unwrap(), Some(0.0));
        assert_eq!(parse_volume("1,234.5").unwrap(), Some(1234.5));
        assert!(parse_volume("n/a").is_err());
    }

    #[tokio::test]
    async fn streams_meters_and_skips_bad_rows() {
        let file = write_csv(CSV);
        let source = MonthlyCsvFileSource::new(file.path());
        let items: Vec<_> = source.stream().await.collect().await;

        let meters: Vec<Meter> = items.into_iter().map(|i| i.unwrap().payload).collect();
        assert_eq!(meters.len(), 3);

        let jan: PeriodKey = "Jan-25".parse().unwrap();
        let feb: PeriodKey = "Feb-25".parse().unwrap();
        assert_eq!(meters[0].level, Level::L1);
        assert_eq!(meters[0].reading(&jan), 32_580.0);
        assert_eq!(meters[1].zone, "Zone_03_(A)");
        assert!(!meters[1].has_reading(&feb));
        assert!(meters[2].has_reading(&feb));
        assert_eq!(meters[2].parent_meter.as_deref(), Some("ZONE 3A (Bulk Zone 3A)"));
    }

    #[tokio::test]
    async fn missing_file_is_a_source_error() {
        let source = MonthlyCsvFileSource::new("/definitely/not/here.csv");
        let items: Vec<_> = source.stream().await.collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(PipelineError::Source(_))));
    }
}
