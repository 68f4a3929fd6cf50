//! Failure notification collaborator.

use crate::error::{PipelineError, Result};
use std::sync::Mutex;

/// Delivers an alert. Callers treat delivery as fire-and-forget.
pub trait Notifier: Send + Sync {
    fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

/// Describes one failed stage of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    pub file_name: String,
    pub process_name: String,
    pub error_type: String,
    pub detail: String,
}

impl ErrorNotice {
    pub fn new(
        file_name: impl Into<String>,
        process_name: impl Into<String>,
        error: &PipelineError,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            process_name: process_name.into(),
            error_type: error.kind().to_owned(),
            detail: error.to_string(),
        }
    }

    pub fn subject(&self, prefix: &str) -> String {
        format!("{prefix} {}", self.process_name)
    }

    pub fn body(&self) -> String {
        format!(
            "An error occurred while processing a landing-zone file.\n\n\
             Process: {}\n\
             File: {}\n\
             Error type: {}\n\
             Details: {}\n\n\
             Check the pipeline logs for more information.\n",
            self.process_name, self.file_name, self.error_type, self.detail
        )
    }
}

/// Sends `notice`, logging instead of failing when delivery breaks.
pub fn send_error_notice(notifier: &dyn Notifier, subject_prefix: &str, notice: &ErrorNotice) {
    let subject = notice.subject(subject_prefix);
    if let Err(e) = notifier.notify(&subject, &notice.body()) {
        tracing::error!("Failed to deliver notification '{subject}': {e}");
    }
}

/// Writes alerts to the log at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str) -> Result<()> {
        tracing::error!(subject, "{body}");
        Ok(())
    }
}

/// Keeps every alert in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(subject, body)` pairs in delivery order.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, subject: &str, body: &str) -> Result<()> {
        self.messages
            .lock()
            .map_err(|_poisoned| PipelineError::Other("Notifier lock poisoned".to_owned()))?
            .push((subject.to_owned(), body.to_owned()));
        Ok(())
    }
}
