//! Transformation stage descriptors.
//!
//! The table parameters describe transformations as comma-separated
//! mini-languages (`col:default`, `old:new`, `col:in:out`, ...). They are
//! parsed once into typed [`Step`]s held by a [`TransformSpec`], which always
//! yields the stages in the fixed execution order, whatever order the
//! parameter document lists them in.

use crate::config::{TableParameters, active};
use crate::error::{PipelineError, Result, ResultExt as _};
use crate::pipeline::functions::FunctionCall;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

/// `column:default` entry of the add stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefault {
    pub column: String,
    pub default: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamePair {
    pub from: String,
    pub to: String,
}

/// `column:input_pattern:output_pattern` entry of the date-format stage.
/// Patterns use strftime syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRule {
    pub column: String,
    pub input: String,
    pub output: String,
}

impl DateRule {
    /// Rejects patterns chrono cannot interpret.
    pub fn check(&self) -> std::result::Result<(), String> {
        for pattern in [&self.input, &self.output] {
            if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                return Err(format!(
                    "Invalid date pattern '{pattern}' for column '{}'",
                    self.column
                ));
            }
        }
        Ok(())
    }
}

/// One transformation stage (tagged enum).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Create or overwrite columns with a literal value
    AddColumns { columns: Vec<ColumnDefault> },

    /// Rename columns; unknown sources are ignored
    RenameColumns { pairs: Vec<RenamePair> },

    /// Drop columns that exist
    DropColumns { columns: Vec<String> },

    /// Re-format date text from one pattern to another
    DateFormat { rules: Vec<DateRule> },

    /// Replace cells with their digest
    HashColumns { columns: Vec<String> },

    /// Registry function calls
    SpecialFunctions { calls: Vec<FunctionCall> },

    /// Remove the last `count` rows
    TrimLastRows { count: usize },
}

impl Step {
    /// Stage name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddColumns { .. } => "add_columns",
            Self::RenameColumns { .. } => "rename_columns",
            Self::DropColumns { .. } => "drop_columns",
            Self::DateFormat { .. } => "date_format",
            Self::HashColumns { .. } => "hash_columns",
            Self::SpecialFunctions { .. } => "special_functions",
            Self::TrimLastRows { .. } => "delete_last_row",
        }
    }

    /// Position in the execution order.
    pub fn rank(&self) -> u8 {
        match self {
            Self::AddColumns { .. } => 0,
            Self::RenameColumns { .. } => 1,
            Self::DropColumns { .. } => 2,
            Self::DateFormat { .. } => 3,
            Self::HashColumns { .. } => 4,
            Self::SpecialFunctions { .. } => 5,
            Self::TrimLastRows { .. } => 6,
        }
    }
}

/// Ordered, immutable list of stages for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSpec {
    steps: Vec<Step>,
}

impl TransformSpec {
    /// Builds a spec from stages in any order; they are sorted into execution
    /// order (stable for stages of the same kind).
    pub fn from_steps(mut steps: Vec<Step>) -> Self {
        steps.sort_by_key(Step::rank);
        Self { steps }
    }

    /// Parses every transformation field of the table parameters. Disabled
    /// fields (absent, blank or `NULL`) produce no stage.
    pub fn from_parameters(params: &TableParameters) -> Result<Self> {
        let mut steps = Vec::new();

        if let Some(raw) = active(params.add_columns.as_ref()) {
            steps.push(Step::AddColumns {
                columns: parse_add_columns(raw),
            });
        }
        if let Some(raw) = active(params.rename_columns.as_ref()) {
            steps.push(Step::RenameColumns {
                pairs: parse_rename_columns(raw)?,
            });
        }
        if let Some(raw) = active(params.drop_columns.as_ref()) {
            steps.push(Step::DropColumns {
                columns: parse_list(raw),
            });
        }
        if let Some(raw) = active(params.date_format.as_ref()) {
            steps.push(Step::DateFormat {
                rules: parse_date_rules(raw)?,
            });
        }
        if let Some(raw) = active(params.hash_columns.as_ref()) {
            steps.push(Step::HashColumns {
                columns: parse_list(raw),
            });
        }
        if let Some(raw) = active(params.special_functions.as_ref()) {
            steps.push(Step::SpecialFunctions {
                calls: parse_special_functions(raw)?,
            });
        }
        if params.delete_last_row > 0 {
            steps.push(Step::TrimLastRows {
                count: params.delete_last_row,
            });
        }

        Ok(Self::from_steps(steps))
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(json).context("Failed to parse transform spec JSON")?;
        Ok(Self::from_steps(spec.steps))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize transform spec")
    }
}

/// Splits on commas, trimming entries and skipping empty ones.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

/// `col:default,col2`. Only the first `:` separates; a missing default is
/// the empty string.
pub fn parse_add_columns(raw: &str) -> Vec<ColumnDefault> {
    parse_list(raw)
        .into_iter()
        .map(|item| match item.split_once(':') {
            Some((column, default)) => ColumnDefault {
                column: column.trim().to_owned(),
                default: default.trim().to_owned(),
            },
            None => ColumnDefault {
                column: item,
                default: String::new(),
            },
        })
        .collect()
}

pub fn parse_rename_columns(raw: &str) -> Result<Vec<RenamePair>> {
    parse_list(raw)
        .iter()
        .map(|item| {
            let parts: Vec<&str> = item.split(':').map(str::trim).collect();
            match parts.as_slice() {
                [from, to] if !from.is_empty() && !to.is_empty() => Ok(RenamePair {
                    from: (*from).to_owned(),
                    to: (*to).to_owned(),
                }),
                _ => Err(PipelineError::Config(format!(
                    "Rename entry '{item}' must look like old:new"
                ))),
            }
        })
        .collect()
}

/// `col:in:out` triples. Patterns cannot contain `:` because it is the field
/// separator.
pub fn parse_date_rules(raw: &str) -> Result<Vec<DateRule>> {
    parse_list(raw)
        .iter()
        .map(|item| {
            let parts: Vec<&str> = item.split(':').map(str::trim).collect();
            match parts.as_slice() {
                [column, input, output]
                    if !column.is_empty() && !input.is_empty() && !output.is_empty() =>
                {
                    Ok(DateRule {
                        column: (*column).to_owned(),
                        input: (*input).to_owned(),
                        output: (*output).to_owned(),
                    })
                }
                _ => Err(PipelineError::Config(format!(
                    "Date format entry '{item}' must look like column:input:output"
                ))),
            }
        })
        .collect()
}

pub fn parse_special_functions(raw: &str) -> Result<Vec<FunctionCall>> {
    parse_list(raw).iter().map(|item| FunctionCall::parse(item)).collect()
}
