//! Source decoding and tabular parsing.
//!
//! Bytes are decoded with `encoding_rs`, then split either by the `csv` crate
//! (delimited sources) or by character widths (fixed-width sources). Every
//! cell is kept as text. The result is normalized to exactly the resolved
//! number of columns before it becomes a `DataFrame`.

use crate::error::{PipelineError, Result};
use crate::pipeline::frame::frame_from_rows;
use crate::pipeline::schema::{FormatMode, ResolvedSchema, SchemaConfig};
use encoding_rs::Encoding;
use polars::prelude::DataFrame;
use std::collections::HashSet;

/// Labels decoded as strict ISO-8859-1. `encoding_rs` resolves them to
/// windows-1252, which disagrees on bytes `0x80..=0x9F`.
const LATIN1_LABELS: [&str; 8] = [
    "latin1",
    "latin-1",
    "latin_1",
    "l1",
    "iso-8859-1",
    "iso8859-1",
    "iso_8859-1",
    "iso_8859_1",
];

fn is_latin1(label: &str) -> bool {
    LATIN1_LABELS.contains(&label.trim().to_lowercase().as_str())
}

/// True when `decode` accepts `label`.
pub fn is_known_encoding(label: &str) -> bool {
    is_latin1(label) || Encoding::for_label(label.trim().as_bytes()).is_some()
}

/// Decodes `bytes` using an encoding label such as `utf-8` or `latin1`.
pub fn decode(bytes: &[u8], label: &str) -> Result<String> {
    if is_latin1(label) {
        return Ok(bytes.iter().copied().map(char::from).collect());
    }
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| PipelineError::Parse(format!("Unknown encoding '{label}'")))?;
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(PipelineError::Parse(format!(
            "Source is not valid {}",
            used.name()
        )));
    }
    Ok(text.into_owned())
}

/// Parsed table, or the marker for a file without data rows.
#[derive(Debug)]
pub enum ParseOutcome {
    Table(DataFrame),
    Empty { columns: Vec<String> },
}

/// Column names and row-major cells before they become a `DataFrame`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Forces every row and the header to exactly `count` cells. Extra cells
    /// are dropped from the right, short rows are padded with empty strings.
    ///
    /// # Errors
    ///
    /// Returns a parse error when the header itself has fewer than `count`
    /// names.
    pub fn conform(mut self, count: usize) -> Result<Self> {
        if self.columns.len() < count {
            return Err(PipelineError::Parse(format!(
                "Header has {} columns, expected {count}",
                self.columns.len()
            )));
        }
        if self.columns.len() > count {
            tracing::warn!(
                "Dropping {} extra header columns",
                self.columns.len() - count
            );
            self.columns.truncate(count);
        }

        let mut padded = 0usize;
        for row in &mut self.rows {
            if row.len() < count {
                padded += 1;
                row.resize(count, String::new());
            } else {
                row.truncate(count);
            }
        }
        if padded > 0 {
            tracing::warn!("Padded {padded} short rows to {count} columns");
        }
        Ok(self)
    }
}

/// Decodes and parses a source file against its resolved schema.
pub fn parse_table(
    bytes: &[u8],
    config: &SchemaConfig,
    schema: &ResolvedSchema,
) -> Result<ParseOutcome> {
    let text = decode(bytes, &config.encoding)?;
    let count = schema.column_count;
    let names = schema.names.as_deref();

    let raw = match config.mode {
        FormatMode::FixedWidth => {
            let widths = config.widths.as_deref().ok_or_else(|| {
                PipelineError::Config("Fixed-width files require widths".to_owned())
            })?;
            let widths = widths.get(..count).unwrap_or(widths);
            parse_fixed_width(&text, widths, config.skip_rows, names)?
        }
        FormatMode::Delimited => {
            parse_delimited(&text, config.delimiter, config.skip_rows, names, count)?
        }
    };
    let raw = raw.conform(count)?;
    ensure_unique(&raw.columns)?;

    tracing::info!(
        "Parsed {} rows x {} columns",
        raw.rows.len(),
        raw.columns.len()
    );
    if raw.rows.is_empty() {
        return Ok(ParseOutcome::Empty {
            columns: raw.columns,
        });
    }
    Ok(ParseOutcome::Table(frame_from_rows(&raw.columns, &raw.rows)?))
}

/// Slices one line at consecutive character widths.
pub fn slice_fixed_width(line: &str, widths: &[usize]) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut start = 0usize;
    widths
        .iter()
        .map(|width| {
            let end = (start + width).min(chars.len());
            let cell: String = chars.get(start.min(end)..end).unwrap_or_default().iter().collect();
            start += width;
            cell
        })
        .collect()
}

fn parse_fixed_width(
    text: &str,
    widths: &[usize],
    skip_rows: usize,
    names: Option<&[String]>,
) -> Result<RawTable> {
    let mut lines = text
        .lines()
        .skip(skip_rows)
        .filter(|line| !line.trim().is_empty());

    let columns = match names {
        Some(names) => names.to_vec(),
        None => {
            let header = lines
                .next()
                .ok_or_else(|| PipelineError::Parse("File has no header row".to_owned()))?;
            slice_fixed_width(header, widths)
                .into_iter()
                .map(|name| name.trim().to_owned())
                .collect()
        }
    };
    let rows = lines.map(|line| slice_fixed_width(line, widths)).collect();
    Ok(RawTable { columns, rows })
}

fn parse_delimited(
    text: &str,
    delimiter: u8,
    skip_rows: usize,
    names: Option<&[String]>,
    count: usize,
) -> Result<RawTable> {
    let body = skip_lines(text, skip_rows);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());
    let mut records = reader.records();

    let columns = match names {
        Some(names) => names.to_vec(),
        None => {
            let header = records
                .next()
                .ok_or_else(|| PipelineError::Parse("File has no header row".to_owned()))??;
            header.iter().map(|name| name.trim().to_owned()).collect()
        }
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        if record.len() == 1 && record.get(0).is_some_and(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().take(count).map(str::to_owned).collect());
    }
    Ok(RawTable { columns, rows })
}

/// Remainder of `text` after its first `count` physical lines.
fn skip_lines(text: &str, count: usize) -> &str {
    let mut rest = text;
    for _ in 0..count {
        match rest.split_once('\n') {
            Some((_, tail)) => rest = tail,
            None => return "",
        }
    }
    rest
}

fn ensure_unique(columns: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for name in columns {
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::Parse(format!("Duplicate column name '{name}'")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::frame::{column_names, column_values};

    fn delimited(skip_rows: usize, names: Option<Vec<String>>) -> SchemaConfig {
        SchemaConfig {
            mode: FormatMode::Delimited,
            delimiter: b';',
            column_names: names,
            widths: None,
            skip_rows,
            encoding: "utf-8".to_owned(),
        }
    }

    fn table(outcome: ParseOutcome) -> DataFrame {
        match outcome {
            ParseOutcome::Table(df) => df,
            ParseOutcome::Empty { .. } => panic!("expected a table"),
        }
    }

    #[test]
    fn test_decode_latin1() {
        let text = decode(&[0x63, 0xe3, 0x6f], "latin1").unwrap();
        assert_eq!(text, "cão");
        assert!(decode(&[0x61, 0xff, 0x62], "utf-8").is_err());
        assert!(decode(b"abc", "klingon").is_err());
    }

    #[test]
    fn test_latin1_keeps_c1_controls() {
        assert_eq!(decode(&[0x80, 0x9f], "ISO-8859-1").unwrap(), "\u{80}\u{9f}");
        assert_eq!(decode(&[0x80], "latin-1").unwrap(), "\u{80}");
        assert_eq!(decode(&[0x80], "windows-1252").unwrap(), "€");
        assert!(is_known_encoding("latin-1"));
        assert!(is_known_encoding("utf-8"));
        assert!(!is_known_encoding("klingon"));
    }

    #[test]
    fn test_slice_fixed_width() {
        assert_eq!(slice_fixed_width("AB12", &[2, 2]), vec!["AB", "12"]);
        assert_eq!(slice_fixed_width("AB1", &[2, 2, 3]), vec!["AB", "1", ""]);
        assert_eq!(slice_fixed_width("ção!", &[1, 3]), vec!["ç", "ão!"]);
    }

    #[test]
    fn test_parse_delimited_with_header() {
        let config = delimited(0, None);
        let schema = ResolvedSchema {
            column_count: 2,
            names: None,
        };
        let df = table(parse_table(b" a ;b\n1;2\n3;4\n", &config, &schema).unwrap());

        assert_eq!(column_names(&df), vec!["a", "b"]);
        assert_eq!(column_values(&df, "b").unwrap(), vec!["2", "4"]);
    }

    #[test]
    fn test_parse_delimited_truncates_and_pads() {
        let config = delimited(0, None);
        let schema = ResolvedSchema {
            column_count: 2,
            names: None,
        };
        let df = table(parse_table(b"a;b\n1;2;9\n3\n", &config, &schema).unwrap());

        assert_eq!(df.width(), 2);
        assert_eq!(column_values(&df, "a").unwrap(), vec!["1", "3"]);
        assert_eq!(column_values(&df, "b").unwrap(), vec!["2", ""]);
    }

    #[test]
    fn test_parse_delimited_with_skipped_rows() {
        let names = vec!["x".to_owned(), "y".to_owned()];
        let config = delimited(2, Some(names.clone()));
        let schema = ResolvedSchema {
            column_count: 2,
            names: Some(names),
        };
        let df = table(parse_table(b"title\nx;y\n\"q;1\";2\n", &config, &schema).unwrap());

        assert_eq!(df.height(), 1);
        assert_eq!(column_values(&df, "x").unwrap(), vec!["q;1"]);
    }

    #[test]
    fn test_parse_fixed_width() {
        let config = SchemaConfig {
            mode: FormatMode::FixedWidth,
            widths: Some(vec![2, 2]),
            ..delimited(1, None)
        };
        let schema = ResolvedSchema {
            column_count: 2,
            names: Some(vec!["code".to_owned(), "val".to_owned()]),
        };
        let df = table(parse_table(b"HEADER\nAB12\n", &config, &schema).unwrap());

        assert_eq!(column_values(&df, "code").unwrap(), vec!["AB"]);
        assert_eq!(column_values(&df, "val").unwrap(), vec!["12"]);
    }

    #[test]
    fn test_fixed_width_header_row() {
        let config = SchemaConfig {
            mode: FormatMode::FixedWidth,
            widths: Some(vec![4, 3]),
            ..delimited(0, None)
        };
        let schema = ResolvedSchema {
            column_count: 2,
            names: None,
        };
        let df = table(parse_table(b"ID  NM \n0001ab \n", &config, &schema).unwrap());

        assert_eq!(column_names(&df), vec!["ID", "NM"]);
        assert_eq!(column_values(&df, "NM").unwrap(), vec!["ab "]);
    }

    #[test]
    fn test_header_only_is_empty() {
        let config = delimited(0, None);
        let schema = ResolvedSchema {
            column_count: 2,
            names: None,
        };
        match parse_table(b"a;b\n", &config, &schema).unwrap() {
            ParseOutcome::Empty { columns } => assert_eq!(columns, vec!["a", "b"]),
            ParseOutcome::Table(_) => panic!("expected empty outcome"),
        }
    }

    #[test]
    fn test_header_shortfall_is_rejected() {
        let raw = RawTable {
            columns: vec!["a".to_owned()],
            rows: Vec::new(),
        };
        assert!(raw.conform(2).is_err());
    }

    #[test]
    fn test_duplicate_header_is_rejected() {
        let config = delimited(0, None);
        let schema = ResolvedSchema {
            column_count: 2,
            names: None,
        };
        assert!(parse_table(b"a;a\n1;2\n", &config, &schema).is_err());
    }
}
