//! Per-file run orchestration.
//!
//! [`Orchestrator::run`] drives one landing-zone file through the pipeline as
//! an explicit state machine:
//!
//! ```text
//! Start ─> SchemaResolved ─> Parsed ─┬─> Cleaned ─> Transformed ─┬─> Named ─> Written ─> Tracked ─> Done
//!                                    └─> Quarantined              └─> Quarantined
//! ```
//!
//! Any error moves the run to `Failed`: the notifier receives the file, the
//! failing stage and the error kind, and the error is returned to the caller.
//! Nothing is retried.

use crate::config::{
    ParameterSource, Settings, StoreParameterSource, TableParameters, default_config_id,
};
use crate::error::{PipelineError, Result};
use crate::notify::{ErrorNotice, LogNotifier, Notifier, send_error_notice};
use crate::pipeline::{
    FunctionRegistry, NamingRule, OutputName, ParseOutcome, SchemaConfig, Sha256Hasher,
    TransformReport, TransformSpec, Transformer, ValueHasher, clean_frame, extract_reference_date,
    output_key, parse_table, resolve_schema, validate_parameters, write_csv,
};
use crate::pipeline::writer::OUTPUT_SEPARATOR;
use crate::store::{ObjectPath, ObjectStore};
use crate::tracking::{RunRecord, RunTracker, StoreRunTracker, TIMESTAMP_FORMAT, TrackingReport};
use chrono::Local;
use polars::prelude::DataFrame;
use std::fmt;
use std::sync::Arc;

pub const QUARANTINE_PREFIX: &str = "landing-resp-temp";
pub const ARCHIVE_PREFIX: &str = "landing-zone-archive";

/// What to process: one object plus its routing information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub bucket: String,
    /// Key of the source object
    pub file_key: String,
    /// Table folder relative to `landing-zone/`; names the quarantine and
    /// archive folders and the default parameter id
    pub path_local: String,
    pub table_name: String,
    /// Parameter document id; derived from `path_local` when absent
    pub config_id: Option<String>,
}

impl Invocation {
    pub fn source(&self) -> ObjectPath {
        ObjectPath::new(&self.bucket, &self.file_key)
    }

    pub fn config_id(&self) -> String {
        self.config_id
            .clone()
            .unwrap_or_else(|| default_config_id(&self.path_local))
    }

    fn routed_key(&self, prefix: &str, file_name: &str) -> String {
        let path_local = self.path_local.trim_matches('/');
        if path_local.is_empty() {
            format!("{prefix}/{file_name}")
        } else {
            format!("{prefix}/{path_local}/{file_name}")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    SchemaResolved,
    Parsed,
    Quarantined,
    Cleaned,
    Transformed,
    Named,
    Written,
    Tracked,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Quarantined | Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineReason {
    /// The file has a header but no data rows
    EmptyTable,
    /// The file name failed the naming rule; carries the sentinel
    InvalidName(String),
}

/// Terminal result of a successful or quarantined run.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub state: RunState,
    pub source: ObjectPath,
    /// Where the source object ended up (archive or quarantine)
    pub destination: ObjectPath,
    /// Written output, absent for quarantined files
    pub output: Option<ObjectPath>,
    pub quarantine: Option<QuarantineReason>,
    pub rows: usize,
    pub columns: usize,
    pub report: Option<TransformReport>,
    pub tracking: Option<TrackingReport>,
    /// Every state visited, in order
    pub transitions: Vec<RunState>,
}

/// The collaborators a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ObjectStore>,
    pub notifier: Arc<dyn Notifier>,
    pub tracker: Arc<dyn RunTracker>,
    pub parameters: Arc<dyn ParameterSource>,
}

impl Collaborators {
    /// Default adapters on top of one store: parameters and tracking live in
    /// `bucket`, alerts go to the log.
    pub fn for_store(store: Arc<dyn ObjectStore>, bucket: &str, settings: &Settings) -> Self {
        Self {
            notifier: Arc::new(LogNotifier),
            tracker: Arc::new(StoreRunTracker::new(
                Arc::clone(&store),
                bucket,
                settings.tracking_prefix.clone(),
            )),
            parameters: Arc::new(StoreParameterSource::new(Arc::clone(&store), bucket)),
            store,
        }
    }
}

/// Bookkeeping for the state machine of one run.
struct RunProgress {
    state: RunState,
    transitions: Vec<RunState>,
    stage: &'static str,
}

impl RunProgress {
    fn new() -> Self {
        Self {
            state: RunState::Start,
            transitions: vec![RunState::Start],
            stage: "start",
        }
    }

    fn advance(&mut self, next: RunState) {
        tracing::debug!("Run state {} -> {next}", self.state);
        self.state = next;
        self.transitions.push(next);
    }

    fn enter(&mut self, stage: &'static str) {
        tracing::debug!("Entering stage {stage}");
        self.stage = stage;
    }
}

pub struct Orchestrator {
    settings: Settings,
    collaborators: Collaborators,
    registry: FunctionRegistry,
    hasher: Box<dyn ValueHasher>,
}

impl Orchestrator {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            collaborators,
            registry: FunctionRegistry::builtin(),
            hasher: Box::new(Sha256Hasher),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: Box<dyn ValueHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Loads the table parameters for `invocation` and processes the file.
    ///
    /// # Errors
    ///
    /// Returns the first failure of any stage, after notifying it.
    pub fn run(&self, invocation: &Invocation) -> Result<FileOutcome> {
        let config_id = invocation.config_id();
        let params = self
            .collaborators
            .parameters
            .load(&config_id)
            .inspect_err(|e| self.report_failure(&invocation.source(), "load_parameters", e))?;
        self.process(invocation, &params)
    }

    /// Processes one file with already-loaded parameters.
    pub fn process(
        &self,
        invocation: &Invocation,
        params: &TableParameters,
    ) -> Result<FileOutcome> {
        tracing::info!(
            "Processing {} for table {}",
            invocation.source(),
            invocation.table_name
        );
        let mut progress = RunProgress::new();
        match self.drive(invocation, params, &mut progress) {
            Ok(outcome) => {
                tracing::info!("Finished {} in state {}", outcome.source, outcome.state);
                Ok(outcome)
            }
            Err(err) => {
                progress.advance(RunState::Failed);
                let stage = match &err {
                    PipelineError::Transform { stage, .. } => stage.as_str(),
                    _ => progress.stage,
                };
                tracing::error!("Run failed in {stage}: {err}");
                self.report_failure(&invocation.source(), stage, &err);
                Err(err)
            }
        }
    }

    fn report_failure(&self, source: &ObjectPath, stage: &str, err: &PipelineError) {
        let notice = ErrorNotice::new(source.to_string(), stage, err);
        send_error_notice(
            self.collaborators.notifier.as_ref(),
            &self.settings.notification_subject,
            &notice,
        );
    }

    #[expect(clippy::too_many_lines)]
    fn drive(
        &self,
        invocation: &Invocation,
        params: &TableParameters,
        progress: &mut RunProgress,
    ) -> Result<FileOutcome> {
        let store = self.collaborators.store.as_ref();
        let tracker = self.collaborators.tracker.as_ref();
        let source = invocation.source();
        let file_name = source.file_name().to_owned();

        progress.enter("validate_parameters");
        let issues = validate_parameters(params, &self.registry);
        if !issues.is_empty() {
            return Err(PipelineError::Config(format!(
                "Invalid table parameters:\n{}",
                issues
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n")
            )));
        }
        let schema_config = SchemaConfig::from_parameters(params)?;
        let spec = TransformSpec::from_parameters(params)?;
        let naming = NamingRule::from_parameters(params);

        progress.enter("clear_tracking");
        let cleared = store.delete_prefix(&invocation.bucket, &self.settings.tracking_prefix)?;
        tracing::debug!("Cleared {cleared} tracking objects");

        progress.enter("read_source");
        let bytes = store.read(&source)?;

        progress.enter("resolve_column_count");
        let resolution = resolve_schema(&schema_config, &bytes);
        if let Some(failure) = &resolution.failure {
            self.report_failure(&source, "resolve_column_count", failure);
        }
        if resolution.schema.is_undetermined() {
            return Err(PipelineError::Config(format!(
                "Unable to determine the column count of {source}"
            )));
        }
        progress.advance(RunState::SchemaResolved);

        progress.enter("parse");
        let df = match parse_table(&bytes, &schema_config, &resolution.schema)? {
            ParseOutcome::Table(df) => df,
            ParseOutcome::Empty { .. } => {
                tracing::warn!("{source} has no data rows");
                progress.advance(RunState::Parsed);
                return self.quarantine(invocation, &source, QuarantineReason::EmptyTable, progress);
            }
        };
        progress.advance(RunState::Parsed);

        progress.enter("clean");
        let df = clean_frame(df)?;
        progress.advance(RunState::Cleaned);

        progress.enter("record_start");
        let mut record = self.start_record(invocation, &source, &bytes, &df);
        record.extension_file_target = params.extension_file_target.to_lowercase();
        tracker.record_start(&record)?;

        progress.enter("transform");
        let transformer = Transformer::new(&self.registry, self.hasher.as_ref());
        let (df, report) = transformer.run(&spec, df)?;
        progress.advance(RunState::Transformed);

        progress.enter("name_output");
        let stem = match naming.resolve(&file_name) {
            OutputName::Valid(stem) => stem,
            OutputName::Invalid(sentinel) => {
                return self.quarantine(
                    invocation,
                    &source,
                    QuarantineReason::InvalidName(sentinel),
                    progress,
                );
            }
        };
        progress.advance(RunState::Named);

        progress.enter("write_output");
        let body = write_csv(&df, OUTPUT_SEPARATOR)?;
        let output = source.with_key(output_key(
            &params.path_s3,
            &stem,
            &params.extension_file_target,
        ));
        store.write(&output, &body)?;
        tracing::info!("Wrote {} rows to {output}", df.height());

        progress.enter("archive_source");
        let archive = source.with_key(invocation.routed_key(ARCHIVE_PREFIX, &file_name));
        store.move_object(&source, &archive)?;
        progress.advance(RunState::Written);

        progress.enter("record_end");
        record.rows_after = df.height();
        record.columns_after = df.width();
        record.target_key = Some(output.key.clone());
        record.finish(Local::now().naive_local());
        tracker.record_end(&record)?;

        progress.enter("reconcile");
        let tracking = tracker.reconcile()?;
        progress.advance(RunState::Tracked);
        progress.advance(RunState::Done);

        Ok(FileOutcome {
            state: RunState::Done,
            source,
            destination: archive,
            output: Some(output),
            quarantine: None,
            rows: df.height(),
            columns: df.width(),
            report: Some(report),
            tracking: Some(tracking),
            transitions: progress.transitions.clone(),
        })
    }

    fn quarantine(
        &self,
        invocation: &Invocation,
        source: &ObjectPath,
        reason: QuarantineReason,
        progress: &mut RunProgress,
    ) -> Result<FileOutcome> {
        progress.enter("quarantine");
        let destination =
            source.with_key(invocation.routed_key(QUARANTINE_PREFIX, source.file_name()));
        self.collaborators.store.move_object(source, &destination)?;
        tracing::warn!("Quarantined {source} -> {destination} ({reason:?})");
        progress.advance(RunState::Quarantined);

        Ok(FileOutcome {
            state: RunState::Quarantined,
            source: source.clone(),
            destination,
            output: None,
            quarantine: Some(reason),
            rows: 0,
            columns: 0,
            report: None,
            tracking: None,
            transitions: progress.transitions.clone(),
        })
    }

    fn start_record(
        &self,
        invocation: &Invocation,
        source: &ObjectPath,
        bytes: &[u8],
        df: &DataFrame,
    ) -> RunRecord {
        let now = Local::now().naive_local();
        let modified = match self.collaborators.store.head(source) {
            Ok(meta) => meta.last_modified.naive_utc(),
            Err(e) => {
                tracing::warn!("No metadata for {source}, using the current time: {e}");
                now
            }
        };
        let fecha_ref = extract_reference_date(source.file_name(), now.date());

        RunRecord {
            table_name: invocation.table_name.clone(),
            bucket: source.bucket.clone(),
            path_local: source.parent_key().to_owned(),
            filename_path_local: format!("{}/{}", source.bucket, source.parent_key()),
            filename_s3: source.file_name().to_owned(),
            extension_file_source: source_extension(source.file_name()),
            validated_files_source: "Valido".to_owned(),
            total_lines: count_lines(bytes),
            file_creation_date: modified.format("%Y-%m-%d").to_string(),
            file_creation_time: modified.format("%H:%M:%S").to_string(),
            modification_date: modified.format("%Y-%m-%d").to_string(),
            modification_time: modified.format("%H:%M:%S").to_string(),
            folder_s3: source.key.clone(),
            processing_start: now.format(TIMESTAMP_FORMAT).to_string(),
            partition_date: fecha_ref.clone(),
            fecha_ref,
            rows_before: df.height(),
            columns_before: df.width(),
            ..RunRecord::default()
        }
    }
}

/// Lower-cased text after the last `.`, empty when there is none.
fn source_extension(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Physical lines in `bytes`; a final line without a newline counts.
pub fn count_lines(bytes: &[u8]) -> usize {
    let newlines = bytes.iter().filter(|byte| **byte == b'\n').count();
    match bytes.last() {
        Some(b'\n') | None => newlines,
        Some(_) => newlines + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::store::InMemoryObjectStore;

    fn setup() -> (Arc<InMemoryObjectStore>, Arc<RecordingNotifier>, Orchestrator) {
        let store = Arc::new(InMemoryObjectStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let settings = Settings::default();
        let mut collaborators = Collaborators::for_store(store.clone(), "bucket", &settings);
        collaborators.notifier = notifier.clone();
        (store, notifier, Orchestrator::new(settings, collaborators))
    }

    fn invocation(key: &str) -> Invocation {
        Invocation {
            bucket: "bucket".to_owned(),
            file_key: key.to_owned(),
            path_local: "sales".to_owned(),
            table_name: "tbl_sales".to_owned(),
            config_id: None,
        }
    }

    #[test]
    fn test_count_lines() {
        assert_eq!(count_lines(b""), 0);
        assert_eq!(count_lines(b"a\nb\n"), 2);
        assert_eq!(count_lines(b"a\nb"), 2);
    }

    #[test]
    fn test_invocation_routing() {
        let inv = invocation("landing-zone/sales/a.csv");
        assert_eq!(inv.config_id(), "latam_parameter_sales");
        assert_eq!(
            inv.routed_key(QUARANTINE_PREFIX, "a.csv"),
            "landing-resp-temp/sales/a.csv"
        );
        assert!(RunState::Quarantined.is_terminal());
        assert!(!RunState::Named.is_terminal());
    }

    #[test]
    fn test_process_writes_output_and_archives() {
        let (store, notifier, orchestrator) = setup();
        let key = "landing-zone/sales/report_20240115.csv";
        store.write(&ObjectPath::new("bucket", key), b"a;b\n1;2\n3;4\n").unwrap();
        let params = TableParameters::from_json(
            r#"{"add_columns": "c:X", "drop_columns": "a", "regex_pattern": ".*report.*",
                "filename_output": "out_", "path_s3": "sales"}"#,
        )
        .unwrap();

        let outcome = orchestrator.process(&invocation(key), &params).unwrap();

        assert_eq!(outcome.state, RunState::Done);
        let output = outcome.output.unwrap();
        assert_eq!(output.key, "transient-zone/sales/out_20240115.csv");
        assert_eq!(store.read(&output).unwrap(), b"b;c\n2;X\n4;X\n");
        assert_eq!(
            outcome.destination.key,
            "landing-zone-archive/sales/report_20240115.csv"
        );
        assert_eq!(
            outcome.transitions.last().copied(),
            Some(RunState::Done)
        );
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn test_transform_failure_notifies_and_writes_nothing() {
        let (store, notifier, orchestrator) = setup();
        let key = "landing-zone/sales/report_20240115.csv";
        store.write(&ObjectPath::new("bucket", key), b"a;b\n1;2\n").unwrap();
        let params = TableParameters::from_json(
            r#"{"special_functions": "delete_any:missing:out", "regex_pattern": ".*", "filename_output": "{match}"}"#,
        )
        .unwrap();

        let err = orchestrator.process(&invocation(key), &params).unwrap_err();

        assert_eq!(err.kind(), "TransformError");
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "Erro no processo special_functions");
        assert!(
            store
                .paths()
                .iter()
                .all(|path| !path.key.starts_with("transient-zone/"))
        );
    }

    #[test]
    fn test_invalid_parameters_fail_before_reading() {
        let (_store, notifier, orchestrator) = setup();
        let params =
            TableParameters::from_json(r#"{"special_functions": "to_upper:a:b"}"#).unwrap();

        let err = orchestrator
            .process(&invocation("landing-zone/sales/missing.csv"), &params)
            .unwrap_err();

        assert_eq!(err.kind(), "ConfigurationError");
        assert!(notifier.messages()[0].1.contains("Process: validate_parameters"));
    }
}
