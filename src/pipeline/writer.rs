//! Output serialization.
//!
//! Cells are written through the `csv` crate: fields are quoted only when they
//! contain the separator, a quote or a line break, and an empty cell stays an
//! empty field.

use crate::error::{PipelineError, Result};
use crate::pipeline::frame::{column_names, column_values};
use polars::prelude::DataFrame;

/// Separator used by every file written to the transient zone.
pub const OUTPUT_SEPARATOR: u8 = b';';

/// Serializes `df` as CSV with a header row.
pub fn write_csv(df: &DataFrame, separator: u8) -> Result<Vec<u8>> {
    let names = column_names(df);
    let mut columns = names
        .iter()
        .map(|name| column_values(df, name).map(Vec::into_iter))
        .collect::<Result<Vec<_>>>()?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(separator)
        .from_writer(Vec::new());
    writer.write_record(&names)?;
    for _ in 0..df.height() {
        let row: Vec<String> = columns
            .iter_mut()
            .map(|cells| cells.next().unwrap_or_default())
            .collect();
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::Other(format!("Failed to flush output table: {e}")))
}

/// Output object key: `transient-zone/<path_s3>/<stem>.<extension>`, with the
/// extension lower-cased.
pub fn output_key(path_s3: &str, stem: &str, extension: &str) -> String {
    format!(
        "transient-zone/{}/{stem}.{}",
        path_s3.trim_matches('/'),
        extension.trim().trim_start_matches('.').to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::frame::frame_from_rows;

    #[test]
    fn test_write_csv_uses_separator_and_header() {
        let columns = vec!["b".to_owned(), "c".to_owned()];
        let rows = vec![
            vec!["2".to_owned(), "X".to_owned()],
            vec!["4".to_owned(), "X".to_owned()],
        ];
        let df = frame_from_rows(&columns, &rows).unwrap();

        let bytes = write_csv(&df, OUTPUT_SEPARATOR).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "b;c\n2;X\n4;X\n");
    }

    #[test]
    fn test_write_csv_leaves_empty_cells_bare() {
        let columns = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        let rows = vec![
            vec!["1".to_owned(), String::new(), "x;y".to_owned()],
            vec![String::new(), "say \"hi\"".to_owned(), String::new()],
        ];
        let df = frame_from_rows(&columns, &rows).unwrap();

        let bytes = write_csv(&df, OUTPUT_SEPARATOR).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "a;b;c\n1;;\"x;y\"\n;\"say \"\"hi\"\"\";\n"
        );
    }

    #[test]
    fn test_output_key() {
        assert_eq!(
            output_key("sales/daily/", "out_20240115", "CSV"),
            "transient-zone/sales/daily/out_20240115.csv"
        );
        assert_eq!(output_key("x", "y", ".txt"), "transient-zone/x/y.txt");
    }
}
