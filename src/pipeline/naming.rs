//! Output file naming.
//!
//! A source file name is checked against the table's naming pattern (a full,
//! anchored match). Matching files get an output stem derived from the
//! template; everything else gets a sentinel that routes the file to
//! quarantine. Naming never fails with an error.

use crate::config::TableParameters;
use chrono::NaiveDate;
use regex::Regex;

/// Template value meaning "use the file's own base name".
pub const MATCH_TEMPLATE: &str = "{match}";

/// Reserved prefix of every invalid-name sentinel.
pub const INVALID_PREFIX: &str = "Regex";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputName {
    /// Lower-cased output stem (no extension)
    Valid(String),
    /// Sentinel text explaining why the name was rejected
    Invalid(String),
}

impl OutputName {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Valid(text) | Self::Invalid(text) => text,
        }
    }

    pub fn stem(&self) -> Option<&str> {
        match self {
            Self::Valid(stem) => Some(stem),
            Self::Invalid(_) => None,
        }
    }
}

/// True for any text produced as an invalid-name sentinel.
pub fn is_invalid_sentinel(name: &str) -> bool {
    name.starts_with(INVALID_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingRule {
    pub pattern: String,
    pub template: String,
}

impl NamingRule {
    pub fn new(pattern: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            template: template.into(),
        }
    }

    pub fn from_parameters(params: &TableParameters) -> Self {
        Self::new(params.naming_pattern(), params.naming_template())
    }

    fn sentinel(&self) -> OutputName {
        OutputName::Invalid(format!("{INVALID_PREFIX} {} contém problemas", self.template))
    }

    /// Derives the output stem for `file_name`.
    pub fn resolve(&self, file_name: &str) -> OutputName {
        let base = base_name(file_name);

        let anchored = match Regex::new(&format!("^(?:{})$", self.pattern)) {
            Ok(regex) => regex,
            Err(e) => {
                tracing::warn!("Naming pattern '{}' does not compile: {e}", self.pattern);
                return self.sentinel();
            }
        };
        if !anchored.is_match(base) {
            tracing::warn!(
                "File '{base}' does not match naming pattern '{}'",
                self.pattern
            );
            return self.sentinel();
        }

        let stem = if self.template == MATCH_TEMPLATE {
            base.to_lowercase()
        } else {
            match first_date_run(base) {
                Some(date) => format!("{}{date}", self.template).to_lowercase(),
                None => self.template.to_lowercase(),
            }
        };
        tracing::info!("Output name for {file_name}: {stem}");
        OutputName::Valid(stem)
    }
}

/// File name without directories and without its last extension, trimmed.
/// A leading dot does not start an extension (`.env` stays `.env`).
pub fn base_name(file_name: &str) -> &str {
    let name = file_name
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let dots = name.len() - name.trim_start_matches('.').len();
    let stem = match name.get(dots..).and_then(|rest| rest.rfind('.')) {
        Some(idx) => name.get(..dots + idx).unwrap_or(name),
        None => name,
    };
    stem.trim()
}

fn first_date_run(text: &str) -> Option<&str> {
    Regex::new(r"\d{8}")
        .ok()?
        .find(text)
        .map(|found| found.as_str())
}

/// Reference date carried in a file name.
///
/// Looks for runs of exactly eight digits (not part of a longer digit run),
/// takes the last one and returns it as `YYYY-MM-DD`. When there is none, or
/// it is not a calendar date, `today` is returned as `YYYYMMDD`.
pub fn extract_reference_date(file_name: &str, today: NaiveDate) -> String {
    let fallback = || today.format("%Y%m%d").to_string();

    let Ok(runs) = Regex::new(r"\d+") else {
        return fallback();
    };
    runs.find_iter(file_name)
        .map(|found| found.as_str())
        .filter(|run| run.len() == 8)
        .last()
        .and_then(|run| NaiveDate::parse_from_str(run, "%Y%m%d").ok())
        .map_or_else(fallback, |date| date.format("%Y-%m-%d").to_string())
}
