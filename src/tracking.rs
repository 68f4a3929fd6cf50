//! Run tracking collaborator.
//!
//! The orchestrator hands a [`RunRecord`] to the tracker before the
//! transformation stages run and again after the output has been written.
//! [`StoreRunTracker`] keeps both checkpoints as JSON objects under the
//! tracking prefix and reconciles them into a daily, `;`-separated results
//! file.

use crate::error::{PipelineError, Result, ResultExt as _};
use crate::store::{ObjectPath, ObjectStore};
use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Header of the reconciled results file.
pub const RESULT_COLUMNS: [&str; 20] = [
    "table_name",
    "path_local",
    "filename_path_local",
    "extension_file_source",
    "validated_files_source",
    "total_lines",
    "file_creation_date",
    "file_creation_time",
    "modification_date",
    "modification_time",
    "path_s3",
    "folder_s3",
    "filename_s3",
    "extension_file_target",
    "processing_start",
    "processing_end",
    "time_execution",
    "status",
    "partition_date",
    "fecha_ref",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RunStatus {
    #[default]
    #[serde(rename = "INICIADO")]
    Started,
    #[serde(rename = "PROCESSADO")]
    Processed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "INICIADO",
            Self::Processed => "PROCESSADO",
        }
    }
}

/// Bookkeeping for one file-processing invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunRecord {
    pub table_name: String,
    pub bucket: String,
    /// Key of the source file without its file name
    pub path_local: String,
    /// `bucket/path_local`
    pub filename_path_local: String,
    /// Source file name including extension
    pub filename_s3: String,
    pub extension_file_source: String,
    pub validated_files_source: String,
    pub total_lines: usize,
    pub file_creation_date: String,
    pub file_creation_time: String,
    pub modification_date: String,
    pub modification_time: String,
    /// Full source key
    pub folder_s3: String,
    pub processing_start: String,
    pub partition_date: String,
    pub fecha_ref: String,
    pub rows_before: usize,
    pub columns_before: usize,
    pub rows_after: usize,
    pub columns_after: usize,
    pub target_key: Option<String>,
    pub extension_file_target: String,
    pub processing_end: Option<String>,
    pub time_execution: Option<String>,
    pub status: RunStatus,
}

impl RunRecord {
    /// Marks the record finished and computes the elapsed time.
    pub fn finish(&mut self, end: NaiveDateTime) {
        let elapsed = NaiveDateTime::parse_from_str(&self.processing_start, TIMESTAMP_FORMAT)
            .map_or_else(|_| TimeDelta::zero(), |start| end - start);
        self.processing_end = Some(end.format(TIMESTAMP_FORMAT).to_string());
        self.time_execution = Some(format_elapsed(elapsed));
        self.status = RunStatus::Processed;
    }

    fn join_key(&self) -> (&str, &str) {
        (&self.path_local, &self.filename_s3)
    }

    /// One results row: start-checkpoint fields merged with the end checkpoint.
    fn result_row(start: &Self, end: &Self) -> Vec<String> {
        vec![
            start.table_name.clone(),
            start.path_local.clone(),
            start.filename_path_local.clone(),
            start.extension_file_source.clone(),
            start.validated_files_source.clone(),
            start.total_lines.to_string(),
            start.file_creation_date.clone(),
            start.file_creation_time.clone(),
            start.modification_date.clone(),
            start.modification_time.clone(),
            start.bucket.clone(),
            start.folder_s3.clone(),
            start.filename_s3.clone(),
            end.extension_file_target.clone(),
            start.processing_start.clone(),
            end.processing_end.clone().unwrap_or_default(),
            end.time_execution.clone().unwrap_or_default(),
            end.status.as_str().to_owned(),
            start.partition_date.clone(),
            start.fecha_ref.clone(),
        ]
    }
}

/// Formats a duration as `H:MM:SS`.
pub fn format_elapsed(elapsed: TimeDelta) -> String {
    let total = elapsed.num_seconds().max(0);
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Outcome of reconciling the start and end checkpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingReport {
    pub results_path: ObjectPath,
    /// Rows produced by this reconciliation
    pub joined_rows: usize,
    /// Rows in the results file after de-duplicated append
    pub total_rows: usize,
}

pub trait RunTracker: Send + Sync {
    fn record_start(&self, record: &RunRecord) -> Result<()>;

    fn record_end(&self, record: &RunRecord) -> Result<()>;

    fn reconcile(&self) -> Result<TrackingReport>;
}

/// Tracker that persists checkpoints into the object store.
///
/// Concurrent invocations against the same bucket race on the checkpoint
/// objects; callers that need parallel runs must serialize them.
pub struct StoreRunTracker {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    results_prefix: String,
}

impl StoreRunTracker {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
            results_prefix: "tracking-results".to_owned(),
        }
    }

    pub fn start_path(&self) -> ObjectPath {
        ObjectPath::new(&self.bucket, format!("{}tracking_start.json", self.prefix))
    }

    pub fn end_path(&self) -> ObjectPath {
        ObjectPath::new(&self.bucket, format!("{}tracking_end.json", self.prefix))
    }

    pub fn results_path(&self, day: NaiveDate) -> ObjectPath {
        ObjectPath::new(
            &self.bucket,
            format!(
                "{}/{}/tracking_results.csv",
                self.results_prefix,
                day.format("year=%Y/month=%m/day=%d")
            ),
        )
    }

    fn write_checkpoint(&self, path: &ObjectPath, record: &RunRecord) -> Result<()> {
        let body = serde_json::to_vec_pretty(&[record]).context("Failed to serialize run record")?;
        self.store.write(path, &body)?;
        tracing::info!("Tracking checkpoint saved to {path}");
        Ok(())
    }

    fn read_checkpoint(&self, path: &ObjectPath) -> Result<Vec<RunRecord>> {
        let bytes = self.store.read(path)?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt tracking checkpoint {path}"))
    }

    fn read_results(&self, path: &ObjectPath) -> Result<Vec<Vec<String>>> {
        if !self.store.exists(path) {
            return Ok(Vec::new());
        }
        let bytes = self.store.read(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes.as_slice());
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context(format!("Corrupt tracking results {path}"))?;
            rows.push(record.iter().map(str::to_owned).collect());
        }
        Ok(rows)
    }

    fn write_results(&self, path: &ObjectPath, rows: &[Vec<String>]) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(Vec::new());
        writer.write_record(RESULT_COLUMNS)?;
        for row in rows {
            writer.write_record(row)?;
        }
        let body = writer
            .into_inner()
            .map_err(|e| PipelineError::Other(format!("Failed to flush tracking results: {e}")))?;
        self.store.write(path, &body)
    }

    /// Joins the checkpoints and appends them to the results file for `day`.
    pub fn reconcile_on(&self, day: NaiveDate) -> Result<TrackingReport> {
        let starts = self.read_checkpoint(&self.start_path())?;
        let ends = self.read_checkpoint(&self.end_path())?;

        let joined: Vec<Vec<String>> = starts
            .iter()
            .flat_map(|start| {
                ends.iter()
                    .filter(move |end| end.join_key() == start.join_key())
                    .map(move |end| RunRecord::result_row(start, end))
            })
            .collect();

        let results_path = self.results_path(day);
        let mut rows = self.read_results(&results_path)?;
        for row in &joined {
            if !rows.contains(row) {
                rows.push(row.clone());
            }
        }
        self.write_results(&results_path, &rows)?;
        tracing::info!(
            "Tracking results updated at {results_path} ({} new, {} total)",
            joined.len(),
            rows.len()
        );

        Ok(TrackingReport {
            results_path,
            joined_rows: joined.len(),
            total_rows: rows.len(),
        })
    }
}

impl RunTracker for StoreRunTracker {
    fn record_start(&self, record: &RunRecord) -> Result<()> {
        self.write_checkpoint(&self.start_path(), record)
    }

    fn record_end(&self, record: &RunRecord) -> Result<()> {
        self.write_checkpoint(&self.end_path(), record)
    }

    fn reconcile(&self) -> Result<TrackingReport> {
        self.reconcile_on(Local::now().date_naive())
    }
}
