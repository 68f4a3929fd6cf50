//! Small `DataFrame` helpers shared by the pipeline stages.
//!
//! Every table handled by the pipeline stores text, so the helpers read and
//! write columns as `String` values.

use crate::error::{PipelineError, Result};
use polars::prelude::*;

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Values of a text column; nulls come back as empty strings.
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = df
        .column(name)
        .map_err(|_missing| PipelineError::DataProcessing(format!("Column '{name}' not found")))?;
    let series = column.as_materialized_series().cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|value| value.unwrap_or_default().to_owned())
        .collect();
    Ok(values)
}

/// Creates or overwrites `name` with `values` (one per row).
pub fn replace_column(df: &mut DataFrame, name: &str, values: Vec<String>) -> Result<()> {
    df.with_column(Series::new(name.into(), values))?;
    Ok(())
}

/// Builds a text table from column names and row-major cells.
///
/// Rows shorter than the header are padded with empty strings; extra cells are
/// ignored.
pub fn frame_from_rows(columns: &[String], rows: &[Vec<String>]) -> Result<DataFrame> {
    let series: Vec<Column> = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let values: Vec<&str> = rows
                .iter()
                .map(|row| row.get(idx).map_or("", String::as_str))
                .collect();
            Column::from(Series::new(name.as_str().into(), values))
        })
        .collect();
    Ok(DataFrame::new(series)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_rows_pads_short_rows() {
        let columns = vec!["a".to_owned(), "b".to_owned()];
        let rows = vec![
            vec!["1".to_owned(), "2".to_owned()],
            vec!["3".to_owned()],
        ];
        let df = frame_from_rows(&columns, &rows).unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(column_names(&df), columns);
        assert_eq!(column_values(&df, "b").unwrap(), vec!["2", ""]);
    }

    #[test]
    fn test_replace_column_overwrites_in_place() {
        let columns = vec!["a".to_owned(), "b".to_owned()];
        let rows = vec![vec!["1".to_owned(), "2".to_owned()]];
        let mut df = frame_from_rows(&columns, &rows).unwrap();

        replace_column(&mut df, "a", vec!["x".to_owned()]).unwrap();
        replace_column(&mut df, "c", vec!["y".to_owned()]).unwrap();

        assert_eq!(column_names(&df), vec!["a", "b", "c"]);
        assert_eq!(column_values(&df, "a").unwrap(), vec!["x"]);
        assert!(has_column(&df, "c"));
        assert!(column_values(&df, "missing").is_err());
    }
}
