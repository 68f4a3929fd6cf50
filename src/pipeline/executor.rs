//! Transformation execution engine.
//!
//! Applies a [`TransformSpec`] to a cleaned table, stage by stage, and
//! reports what changed. Per-cell problems (an unparseable date, an unknown
//! column in a tolerant stage) are logged and recorded as warnings; anything
//! else aborts the run with a [`PipelineError::Transform`] naming the stage.

use super::frame::{column_values, has_column, replace_column};
use super::functions::FunctionRegistry;
use super::hasher::{HASH_ALGORITHM, ValueHasher};
use super::spec::{DateRule, RenamePair, Step, TransformSpec};
use crate::error::{PipelineError, Result};
use chrono::format::{Parsed, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Report generated after the stages ran
#[derive(Debug, Clone)]
pub struct TransformReport {
    /// Number of rows before processing
    pub rows_before: usize,

    /// Number of columns before processing
    pub columns_before: usize,

    /// Number of rows after processing
    pub rows_after: usize,

    /// Number of columns after processing
    pub columns_after: usize,

    /// Number of stages applied
    pub steps_applied: usize,

    /// Warnings generated during execution
    pub warnings: Vec<String>,

    /// Time taken for execution
    pub duration: std::time::Duration,
}

impl TransformReport {
    /// Create a summary message
    pub fn summary(&self) -> String {
        format!(
            "Transformation completed: rows {} → {}, columns {} → {}, {} stages, {} warnings, {:.2}s",
            self.rows_before,
            self.rows_after,
            self.columns_before,
            self.columns_after,
            self.steps_applied,
            self.warnings.len(),
            self.duration.as_secs_f64()
        )
    }
}

/// Runs transformation stages with an injected registry and hasher.
pub struct Transformer<'a> {
    registry: &'a FunctionRegistry,
    hasher: &'a dyn ValueHasher,
}

impl<'a> Transformer<'a> {
    pub fn new(registry: &'a FunctionRegistry, hasher: &'a dyn ValueHasher) -> Self {
        Self { registry, hasher }
    }

    /// Applies every stage of `spec` in order.
    ///
    /// # Errors
    ///
    /// Returns a transform error naming the failing stage; the input table is
    /// consumed and nothing should be written.
    pub fn run(
        &self,
        spec: &TransformSpec,
        df: DataFrame,
    ) -> Result<(DataFrame, TransformReport)> {
        let start = std::time::Instant::now();
        let rows_before = df.height();
        let columns_before = df.width();
        let mut warnings = Vec::new();

        let mut df = df;
        for step in spec.steps() {
            tracing::info!("Applying stage {}", step.name());
            df = self
                .apply_step(step, df, &mut warnings)
                .map_err(|e| match e {
                    PipelineError::Transform { .. } => e,
                    other => PipelineError::transform(step.name(), other.to_string()),
                })?;
        }

        let report = TransformReport {
            rows_before,
            columns_before,
            rows_after: df.height(),
            columns_after: df.width(),
            steps_applied: spec.steps().len(),
            warnings,
            duration: start.elapsed(),
        };
        tracing::info!("{}", report.summary());
        Ok((df, report))
    }

    /// Apply a single transformation stage
    fn apply_step(
        &self,
        step: &Step,
        mut df: DataFrame,
        warnings: &mut Vec<String>,
    ) -> Result<DataFrame> {
        match step {
            Step::AddColumns { columns } => {
                let height = df.height();
                for entry in columns {
                    replace_column(&mut df, &entry.column, vec![entry.default.clone(); height])?;
                }
            }

            Step::RenameColumns { pairs } => {
                df = rename_columns(&df, pairs, warnings)?;
            }

            Step::DropColumns { columns } => {
                for column in columns {
                    if has_column(&df, column) {
                        df.drop_in_place(column)?;
                    }
                }
            }

            Step::DateFormat { rules } => {
                for rule in rules {
                    format_dates(&mut df, rule, warnings)?;
                }
            }

            Step::HashColumns { columns } => {
                for column in columns {
                    if !has_column(&df, column) {
                        continue;
                    }
                    let hashed = column_values(&df, column)?
                        .iter()
                        .map(|value| self.hasher.digest(value))
                        .collect();
                    replace_column(&mut df, column, hashed)?;
                    tracing::debug!("Hashed column {column} ({HASH_ALGORITHM})");
                }
            }

            Step::SpecialFunctions { calls } => {
                for call in calls {
                    let Some(function) = self.registry.get(&call.name) else {
                        warn(
                            warnings,
                            format!("Unknown special function '{}' skipped", call.name),
                        );
                        continue;
                    };
                    if let Err(message) = self.registry.check(call) {
                        return Err(PipelineError::transform(step.name(), message));
                    }
                    function.apply(&mut df, call, self.hasher)?;
                }
            }

            Step::TrimLastRows { count } => {
                let keep = df.height().saturating_sub(*count);
                df = df.slice(0, keep);
            }
        }
        Ok(df)
    }
}

/// Applies every rename pair at once, so chains (`a:x,c:a`) and swaps
/// (`a:b,b:a`) see the original names.
///
/// When several columns end up with the same name, one survives and the rest
/// are dropped with a warning: a renamed column beats one that kept its name,
/// and among renamed columns the pair declared last wins. A source declared
/// twice uses its last pair.
fn rename_columns(
    df: &DataFrame,
    pairs: &[RenamePair],
    warnings: &mut Vec<String>,
) -> Result<DataFrame> {
    let mut mapping: HashMap<&str, (&str, usize)> = HashMap::new();
    for (rank, pair) in pairs.iter().enumerate() {
        mapping.insert(pair.from.as_str(), (pair.to.as_str(), rank + 1));
    }

    // (target name, precedence) per column, precedence 0 for untouched columns
    let targets: Vec<(String, usize)> = df
        .get_columns()
        .iter()
        .map(|column| {
            let name = column.name().as_str();
            mapping
                .get(name)
                .map_or((name.to_owned(), 0), |(to, rank)| ((*to).to_owned(), *rank))
        })
        .collect();

    let mut winners: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, (target, precedence)) in targets.iter().enumerate() {
        let entry = winners
            .entry(target.as_str())
            .or_insert((position, *precedence));
        if *precedence > entry.1 {
            *entry = (position, *precedence);
        }
    }

    let mut columns = Vec::with_capacity(targets.len());
    for (position, (column, (target, _))) in df.get_columns().iter().zip(&targets).enumerate() {
        if winners.get(target.as_str()).map(|winner| winner.0) != Some(position) {
            warn(
                warnings,
                format!(
                    "Column '{}' dropped: another column was renamed to '{target}'",
                    column.name()
                ),
            );
            continue;
        }
        columns.push(column.clone().with_name(target.as_str().into()));
    }
    Ok(DataFrame::new(columns)?)
}

/// Re-formats one date column in place; unparseable cells become empty.
fn format_dates(df: &mut DataFrame, rule: &DateRule, warnings: &mut Vec<String>) -> Result<()> {
    if !has_column(df, &rule.column) {
        warn(
            warnings,
            format!("Date column '{}' not found, skipped", rule.column),
        );
        return Ok(());
    }

    let mut failures = 0usize;
    let formatted = column_values(df, &rule.column)?
        .iter()
        .map(|value| {
            reformat_date(value, &rule.input, &rule.output).unwrap_or_else(|e| {
                failures += 1;
                tracing::warn!(
                    "Cannot convert '{value}' in {} using {}: {e}",
                    rule.column,
                    rule.input
                );
                String::new()
            })
        })
        .collect();
    replace_column(df, &rule.column, formatted)?;

    if failures > 0 {
        warnings.push(format!(
            "{failures} values in '{}' did not match {} and were cleared",
            rule.column, rule.input
        ));
    }
    Ok(())
}

fn warn(warnings: &mut Vec<String>, message: String) {
    tracing::warn!("{message}");
    warnings.push(message);
}

/// Re-formats one date cell. Empty input stays empty.
///
/// A pattern with only date fields parses at midnight; a pattern with only
/// time fields parses on 1900-01-01.
///
/// # Errors
///
/// Returns a description of the problem when `value` does not match `input`
/// or `output` cannot be rendered.
pub fn reformat_date(
    value: &str,
    input: &str,
    output: &str,
) -> std::result::Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(String::new());
    }

    let mut parsed = Parsed::default();
    chrono::format::parse(&mut parsed, value, StrftimeItems::new(input))
        .map_err(|e| e.to_string())?;

    let date = parsed.to_naive_date().ok();
    let time = parsed.to_naive_time().ok();
    let moment = match (date, time) {
        (Some(date), time) => NaiveDateTime::new(date, time.unwrap_or(NaiveTime::MIN)),
        (None, Some(time)) => {
            let epoch = NaiveDate::from_ymd_opt(1900, 1, 1).ok_or("invalid epoch")?;
            NaiveDateTime::new(epoch, time)
        }
        (None, None) => return Err(format!("'{input}' does not describe a date or time")),
    };

    let mut rendered = String::new();
    write!(rendered, "{}", moment.format_with_items(StrftimeItems::new(output)))
        .map_err(|_unrenderable| format!("Cannot render with pattern '{output}'"))?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::frame::{column_names, frame_from_rows};
    use crate::pipeline::functions::FunctionCall;
    use crate::pipeline::hasher::Sha256Hasher;
    use crate::pipeline::spec::{ColumnDefault, RenamePair};

    struct TagHasher;

    impl ValueHasher for TagHasher {
        fn digest(&self, value: &str) -> String {
            format!("h({value})")
        }
    }

    fn frame(columns: &[&str], rows: &[&[&str]]) -> DataFrame {
        let columns: Vec<String> = columns.iter().map(|c| (*c).to_owned()).collect();
        let rows: Vec<Vec<String>> = rows
            .iter()
            .map(|row| row.iter().map(|cell| (*cell).to_owned()).collect())
            .collect();
        frame_from_rows(&columns, &rows).unwrap()
    }

    fn run(steps: Vec<Step>, df: DataFrame) -> Result<(DataFrame, TransformReport)> {
        let registry = FunctionRegistry::builtin();
        Transformer::new(&registry, &TagHasher).run(&TransformSpec::from_steps(steps), df)
    }

    #[test]
    fn test_add_then_drop() {
        let df = frame(&["a", "b"], &[&["1", "2"], &["3", "4"]]);
        let (df, report) = run(
            vec![
                Step::DropColumns {
                    columns: vec!["a".to_owned(), "ghost".to_owned()],
                },
                Step::AddColumns {
                    columns: vec![ColumnDefault {
                        column: "c".to_owned(),
                        default: "X".to_owned(),
                    }],
                },
            ],
            df,
        )
        .unwrap();

        assert_eq!(column_names(&df), vec!["b", "c"]);
        assert_eq!(column_values(&df, "b").unwrap(), vec!["2", "4"]);
        assert_eq!(column_values(&df, "c").unwrap(), vec!["X", "X"]);
        assert_eq!(report.columns_before, 2);
        assert_eq!(report.steps_applied, 2);
    }

    #[test]
    fn test_rename_replaces_existing_target() {
        let df = frame(&["a", "b"], &[&["1", "2"]]);
        let (df, report) = run(
            vec![Step::RenameColumns {
                pairs: vec![
                    RenamePair {
                        from: "a".to_owned(),
                        to: "b".to_owned(),
                    },
                    RenamePair {
                        from: "missing".to_owned(),
                        to: "z".to_owned(),
                    },
                ],
            }],
            df,
        )
        .unwrap();

        assert_eq!(column_names(&df), vec!["b"]);
        assert_eq!(column_values(&df, "b").unwrap(), vec!["1"]);
        assert_eq!(report.warnings.len(), 1);
    }

    fn renames(raw: &str) -> Vec<Step> {
        vec![Step::RenameColumns {
            pairs: crate::pipeline::spec::parse_rename_columns(raw).unwrap(),
        }]
    }

    #[test]
    fn test_rename_chain_uses_original_names() {
        let df = frame(&["a", "b", "c"], &[&["1", "2", "3"]]);
        let (df, report) = run(renames("a:x,c:a"), df).unwrap();

        assert_eq!(column_names(&df), vec!["x", "b", "a"]);
        assert_eq!(column_values(&df, "x").unwrap(), vec!["1"]);
        assert_eq!(column_values(&df, "a").unwrap(), vec!["3"]);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_rename_swap() {
        let df = frame(&["a", "b"], &[&["1", "2"]]);
        let (df, _) = run(renames("a:b,b:a"), df).unwrap();

        assert_eq!(column_names(&df), vec!["b", "a"]);
        assert_eq!(column_values(&df, "b").unwrap(), vec!["1"]);
        assert_eq!(column_values(&df, "a").unwrap(), vec!["2"]);
    }

    #[test]
    fn test_rename_collision_keeps_last_declared_pair() {
        let df = frame(&["a", "c"], &[&["1", "3"]]);
        let (df, report) = run(renames("a:x,c:x"), df).unwrap();

        assert_eq!(column_names(&df), vec!["x"]);
        assert_eq!(column_values(&df, "x").unwrap(), vec!["3"]);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_hash_columns_uses_injected_hasher() {
        let df = frame(&["id", "name"], &[&["7", "ana"]]);
        let (df, _) = run(
            vec![Step::HashColumns {
                columns: vec!["id".to_owned(), "absent".to_owned()],
            }],
            df,
        )
        .unwrap();

        assert_eq!(column_values(&df, "id").unwrap(), vec!["h(7)"]);
        assert_eq!(column_values(&df, "name").unwrap(), vec!["ana"]);
    }

    #[test]
    fn test_sha256_hash_is_deterministic() {
        let registry = FunctionRegistry::builtin();
        let transformer = Transformer::new(&registry, &Sha256Hasher);
        let spec = TransformSpec::from_steps(vec![Step::HashColumns {
            columns: vec!["id".to_owned()],
        }]);

        let (first, _) = transformer.run(&spec, frame(&["id"], &[&["42"]])).unwrap();
        let (second, _) = transformer.run(&spec, frame(&["id"], &[&["42"]])).unwrap();
        assert_eq!(
            column_values(&first, "id").unwrap(),
            column_values(&second, "id").unwrap()
        );
    }

    #[test]
    fn test_date_format_fallback_clears_invalid() {
        let df = frame(&["dt"], &[&["20240115"], &["2024-13-40"], &[""]]);
        let (df, report) = run(
            vec![Step::DateFormat {
                rules: vec![
                    DateRule {
                        column: "dt".to_owned(),
                        input: "%Y%m%d".to_owned(),
                        output: "%d/%m/%Y".to_owned(),
                    },
                    DateRule {
                        column: "absent".to_owned(),
                        input: "%Y".to_owned(),
                        output: "%Y".to_owned(),
                    },
                ],
            }],
            df,
        )
        .unwrap();

        assert_eq!(column_values(&df, "dt").unwrap(), vec!["15/01/2024", "", ""]);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_reformat_date() {
        assert_eq!(reformat_date("2024-01-15", "%Y-%m-%d", "%Y%m%d").unwrap(), "20240115");
        assert_eq!(
            reformat_date("15/01/2024 10.30", "%d/%m/%Y %H.%M", "%Y-%m-%d %H.%M.%S").unwrap(),
            "2024-01-15 10.30.00"
        );
        assert_eq!(reformat_date("1030", "%H%M", "%Y-%m-%d").unwrap(), "1900-01-01");
        assert!(reformat_date("2024-13-40", "%Y-%m-%d", "%Y").is_err());
        assert!(reformat_date("20240115x", "%Y%m%d", "%Y").is_err());
    }

    #[test]
    fn test_special_functions_stage() {
        let df = frame(&["amount"], &[&["00042"], &["x1"]]);
        let (df, _) = run(
            vec![Step::SpecialFunctions {
                calls: vec![FunctionCall::parse("delete_cero:amount:amount_int").unwrap()],
            }],
            df,
        )
        .unwrap();

        assert_eq!(
            column_values(&df, "amount_int").unwrap(),
            vec!["42", "999999999999999999"]
        );
    }

    #[test]
    fn test_unknown_function_is_skipped_with_warning() {
        let df = frame(&["a"], &[&["1"]]);
        let (df, report) = run(
            vec![Step::SpecialFunctions {
                calls: vec![FunctionCall::parse("to_upper:a:b").unwrap()],
            }],
            df,
        )
        .unwrap();

        assert_eq!(column_names(&df), vec!["a"]);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_missing_function_source_is_fatal() {
        let df = frame(&["a"], &[&["1"]]);
        let err = run(
            vec![Step::SpecialFunctions {
                calls: vec![FunctionCall::parse("delete_any:missing:b").unwrap()],
            }],
            df,
        )
        .unwrap_err();

        match err {
            PipelineError::Transform { stage, .. } => assert_eq!(stage, "special_functions"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_trim_last_rows() {
        let df = frame(&["a"], &[&["1"], &["2"], &["3"]]);
        let (trimmed, _) = run(vec![Step::TrimLastRows { count: 1 }], df.clone()).unwrap();
        assert_eq!(column_values(&trimmed, "a").unwrap(), vec!["1", "2"]);

        let (emptied, report) = run(vec![Step::TrimLastRows { count: 5 }], df).unwrap();
        assert_eq!(emptied.height(), 0);
        assert_eq!(report.rows_before, 3);
    }
}
