//! CSV export and per-strategy summaries of measurement records.

use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::counter::Method;
use crate::errors::CountResult;
use crate::record::MeasurementRecord;

pub const CSV_HEADER: &str = "method,dataset,occurrences,duration_ms,threads,device";

fn csv_field(value: &str) -> String {
    value.replace(',', " ")
}

/// Renders records as CSV, one row per record in input order
pub fn render_csv(records: &[MeasurementRecord]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for record in records {
        let threads = record
            .parallelism
            .map(|t| t.to_string())
            .unwrap_or_default();
        let device = record.device_label.as_deref().map(csv_field).unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{:.3},{},{}\n",
            record.method,
            csv_field(&record.dataset),
            record.occurrences,
            record.duration_millis(),
            threads,
            device
        ));
    }
    out
}

/// Writes the CSV export, creating parent directories as needed
pub fn write_csv(path: &Path, records: &[MeasurementRecord]) -> CountResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, render_csv(records))?;
    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Aggregated timings of one strategy configuration over one dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub dataset: String,
    pub method: Method,
    pub threads: Option<usize>,
    pub device: Option<String>,
    pub occurrences: u64,
    pub runs: usize,
    #[serde(skip)]
    pub total: Duration,
    #[serde(skip)]
    pub min: Duration,
    #[serde(skip)]
    pub max: Duration,
}

impl SummaryRow {
    fn new(record: &MeasurementRecord) -> Self {
        Self {
            dataset: record.dataset.clone(),
            method: record.method,
            threads: record.parallelism,
            device: record.device_label.clone(),
            occurrences: record.occurrences,
            runs: 1,
            total: record.duration,
            min: record.duration,
            max: record.duration,
        }
    }

    fn matches(&self, record: &MeasurementRecord) -> bool {
        self.dataset == record.dataset
            && self.method == record.method
            && self.threads == record.parallelism
    }

    fn add(&mut self, record: &MeasurementRecord) {
        self.runs += 1;
        self.total += record.duration;
        self.min = self.min.min(record.duration);
        self.max = self.max.max(record.duration);
    }

    pub fn average(&self) -> Duration {
        self.total / self.runs as u32
    }

    /// Display name including the worker count, e.g. `ParallelCPU x4`
    pub fn label(&self) -> String {
        match self.threads {
            Some(t) => format!("{} x{}", self.method, t),
            None => self.method.to_string(),
        }
    }
}

/// Groups records by (dataset, method, threads) in first-seen order
pub fn summarize(records: &[MeasurementRecord]) -> Vec<SummaryRow> {
    let mut rows: Vec<SummaryRow> = Vec::new();
    for record in records {
        match rows.iter_mut().find(|row| row.matches(record)) {
            Some(row) => row.add(record),
            None => rows.push(SummaryRow::new(record)),
        }
    }
    rows
}
