//! Run settings and per-table parameters.
//!
//! [`Settings`] describes the deployment (where the store lives, where logs
//! go) and is passed explicitly into the orchestrator. [`TableParameters`] is
//! the per-table JSON document loaded once per run from the parameter source.

use crate::error::{PipelineError, Result, ResultExt as _};
use crate::store::{ObjectPath, ObjectStore};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Literal used by the parameter documents to switch a field off.
pub const NULL_SENTINEL: &str = "NULL";

pub const ENV_STORE_ROOT: &str = "LANDING_STORE_ROOT";
pub const ENV_LOG_DIR: &str = "LANDING_LOG_DIR";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    /// Directory that holds one sub-directory per bucket
    pub store_root: PathBuf,
    /// Log directory; platform data dir when unset
    pub log_dir: Option<PathBuf>,
    /// Prefix cleared at the start of every run and used for tracking files
    pub tracking_prefix: String,
    /// Subject prefix for failure notifications
    pub notification_subject: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("data"),
            log_dir: None,
            tracking_prefix: "tracking/".to_owned(),
            notification_subject: "Erro no processo".to_owned(),
        }
    }
}

impl Settings {
    /// Loads settings from an optional JSON file, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings {}", path.display()))?;
                serde_json::from_str::<Self>(&content)
                    .context(format!("Failed to parse settings {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Ok(root) = std::env::var(ENV_STORE_ROOT)
            && !root.trim().is_empty()
        {
            settings.store_root = PathBuf::from(root);
        }
        if let Ok(dir) = std::env::var(ENV_LOG_DIR)
            && !dir.trim().is_empty()
        {
            settings.log_dir = Some(PathBuf::from(dir));
        }

        Ok(settings)
    }
}

/// Per-table processing parameters.
///
/// Field names follow the parameter documents stored next to the landing zone.
/// Transformation fields are comma-separated mini-languages parsed by
/// [`crate::pipeline::spec::TransformSpec`].
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TableParameters {
    pub name: String,
    pub column_names: Option<String>,
    #[serde(deserialize_with = "lenient_widths")]
    pub widths: Option<Vec<usize>>,
    pub separator_file_read: Option<String>,
    #[serde(deserialize_with = "lenient_count")]
    pub skip_rows: usize,
    #[serde(deserialize_with = "lenient_count")]
    pub delete_last_row: usize,
    pub encoding_file_read: String,
    pub extension_file: String,
    pub extension_file_target: String,
    pub add_columns: Option<String>,
    pub rename_columns: Option<String>,
    pub drop_columns: Option<String>,
    pub date_format: Option<String>,
    pub hash_columns: Option<String>,
    pub special_functions: Option<String>,
    pub regex_pattern: Option<String>,
    pub filename_output: Option<String>,
    pub path_s3: String,
}

impl Default for TableParameters {
    fn default() -> Self {
        Self {
            name: String::new(),
            column_names: None,
            widths: None,
            separator_file_read: None,
            skip_rows: 0,
            delete_last_row: 0,
            encoding_file_read: "utf-8".to_owned(),
            extension_file: "CSV".to_owned(),
            extension_file_target: "csv".to_owned(),
            add_columns: None,
            rename_columns: None,
            drop_columns: None,
            date_format: None,
            hash_columns: None,
            special_functions: None,
            regex_pattern: None,
            filename_output: None,
            path_s3: "PATH_ERROR".to_owned(),
        }
    }
}

impl TableParameters {
    /// Parses a parameter document. A JSON array is accepted and its first
    /// element is used.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed JSON or an empty array.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).context("Failed to parse table parameters JSON")?;
        let document = match value {
            Value::Array(items) => items.into_iter().next().ok_or_else(|| {
                PipelineError::Config("Parameter document is an empty list".to_owned())
            })?,
            other => other,
        };
        serde_json::from_value(document).context("Failed to read table parameters")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize table parameters")
    }

    /// Declared column names, when configured.
    pub fn column_list(&self) -> Option<Vec<String>> {
        active(self.column_names.as_ref()).map(|names| {
            names
                .split(',')
                .map(|name| name.trim().to_owned())
                .collect()
        })
    }

    /// Field separator for delimited files, `None` when switched off.
    pub fn separator(&self) -> Option<&str> {
        active(self.separator_file_read.as_ref())
    }

    pub fn naming_pattern(&self) -> &str {
        self.regex_pattern.as_deref().unwrap_or(NULL_SENTINEL)
    }

    pub fn naming_template(&self) -> &str {
        self.filename_output.as_deref().unwrap_or(NULL_SENTINEL)
    }
}

/// Default parameter document id for a table folder: `/` becomes `_`, then
/// lower-cased (`Sales/daily` → `latam_parameter_sales_daily`).
pub fn default_config_id(path_local: &str) -> String {
    format!(
        "latam_parameter_{}",
        path_local.trim_matches('/').replace('/', "_").to_lowercase()
    )
}

/// Where per-table parameter documents come from.
pub trait ParameterSource: Send + Sync {
    fn load(&self, config_id: &str) -> Result<TableParameters>;
}

/// Reads `parameters/<config_id>.json` from a bucket of the object store.
pub struct StoreParameterSource {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
}

impl StoreParameterSource {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: "parameters/".to_owned(),
        }
    }

    pub fn document_path(&self, config_id: &str) -> ObjectPath {
        ObjectPath::new(&self.bucket, format!("{}{config_id}.json", self.prefix))
    }
}

impl ParameterSource for StoreParameterSource {
    fn load(&self, config_id: &str) -> Result<TableParameters> {
        let path = self.document_path(config_id);
        let bytes = self
            .store
            .read(&path)
            .map_err(|e| {
                PipelineError::Config(format!("Parameters '{config_id}' unavailable: {e}"))
            })?;
        let json = String::from_utf8(bytes)
            .map_err(|e| PipelineError::Config(format!("Parameters {path} are not UTF-8: {e}")))?;
        let params =
            TableParameters::from_json(&json).with_context(|| format!("Parameters {path}"))?;
        tracing::info!("Loaded table parameters '{}' from {path}", params.name);
        Ok(params)
    }
}

/// Returns the field value unless it is absent, blank, or the `NULL` sentinel.
pub fn active(field: Option<&String>) -> Option<&str> {
    field
        .map(|value| value.trim())
        .filter(|value| !value.is_empty() && *value != NULL_SENTINEL)
}

fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| <D::Error as serde::de::Error>::custom(format!("invalid count {n}"))),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed == NULL_SENTINEL {
                Ok(0)
            } else {
                trimmed.parse::<usize>().map_err(|e| {
                    <D::Error as serde::de::Error>::custom(format!("invalid count '{s}': {e}"))
                })
            }
        }
        other => Err(<D::Error as serde::de::Error>::custom(format!(
            "expected a count, found {other}"
        ))),
    }
}

fn lenient_widths<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<usize>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let array = match value {
        Value::Null => return Ok(None),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed == NULL_SENTINEL {
                return Ok(None);
            }
            serde_json::from_str::<Vec<usize>>(trimmed).map_err(|e| {
                <D::Error as serde::de::Error>::custom(format!("invalid widths '{s}': {e}"))
            })?
        }
        other @ Value::Array(_) => serde_json::from_value::<Vec<usize>>(other)
            .map_err(<D::Error as serde::de::Error>::custom)?,
        other => {
            return Err(<D::Error as serde::de::Error>::custom(format!(
                "expected widths, found {other}"
            )));
        }
    };
    Ok(Some(array))
}
