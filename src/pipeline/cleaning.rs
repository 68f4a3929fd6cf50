//! Post-parse cell normalization.

use crate::error::Result;
use polars::prelude::*;

/// Removes every quote character, then surrounding whitespace.
///
/// Quotes go first so that a quoted blank like `" a "` cleans to `a` in one
/// pass; applying the function twice gives the same result as once.
pub fn clean_value(value: &str) -> String {
    value.replace(['"', '\''], "").trim().to_owned()
}

/// Cleans every text column; nulls become empty strings. Other column types
/// pass through untouched.
pub fn clean_frame(df: DataFrame) -> Result<DataFrame> {
    let columns = df
        .get_columns()
        .iter()
        .map(|column| {
            if column.dtype() != &DataType::String {
                return Ok(column.clone());
            }
            let cleaned: Vec<String> = column
                .as_materialized_series()
                .str()?
                .into_iter()
                .map(|value| value.map_or_else(String::new, clean_value))
                .collect();
            Ok(Column::from(Series::new(column.name().clone(), cleaned)))
        })
        .collect::<PolarsResult<Vec<Column>>>()?;

    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::frame::column_values;

    #[test]
    fn test_clean_value() {
        assert_eq!(clean_value("  abc  "), "abc");
        assert_eq!(clean_value("\"quoted\""), "quoted");
        assert_eq!(clean_value("it's"), "its");
        assert_eq!(clean_value("' padded '"), "padded");
        assert_eq!(clean_value(""), "");
    }

    #[test]
    fn test_clean_value_is_idempotent() {
        for raw in ["  x ", "\" y \"", "'z'", " a'b\"c ", "\t\n", "plain"] {
            let once = clean_value(raw);
            assert_eq!(clean_value(&once), once, "input {raw:?}");
        }
    }

    #[test]
    fn test_clean_frame_handles_nulls_and_numbers() {
        let text = Series::new("t".into(), [Some(" 'a' "), None]);
        let numbers = Series::new("n".into(), [1i64, 2]);
        let df = DataFrame::new(vec![Column::from(text), Column::from(numbers)]).unwrap();

        let cleaned = clean_frame(df).unwrap();

        assert_eq!(column_values(&cleaned, "t").unwrap(), vec!["a", ""]);
        assert_eq!(cleaned.column("n").unwrap().dtype(), &DataType::Int64);
    }
}
