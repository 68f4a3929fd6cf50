//! Column schema resolution.
//!
//! Decides how a source file is read (fixed-width or delimited) and how many
//! columns it carries before the parser touches it. Resolution only peeks at
//! the header, so it is cheap and deterministic: the same bytes and the same
//! parameters always resolve to the same schema.

use crate::config::{NULL_SENTINEL, TableParameters};
use crate::error::{PipelineError, Result};
use crate::pipeline::reader::decode;

pub const DEFAULT_DELIMITER: u8 = b';';

/// Extensions the pipeline knows how to read.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["csv", "txt", "lis", "dat"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    FixedWidth,
    Delimited,
}

impl FormatMode {
    /// Fixed-width applies to `dat`/`txt` sources whose separator is the literal
    /// `NULL`; every other supported extension is delimited.
    pub fn detect(extension: &str, separator: Option<&str>) -> Result<Self> {
        let extension = extension.trim().to_lowercase();
        let separator_off = separator.is_some_and(|sep| sep.trim() == NULL_SENTINEL);

        if matches!(extension.as_str(), "dat" | "txt") && separator_off {
            Ok(Self::FixedWidth)
        } else if SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            Ok(Self::Delimited)
        } else {
            Err(PipelineError::Config(format!(
                "Unsupported file extension '{extension}'"
            )))
        }
    }
}

/// Everything the resolver and parser need to know about the source layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaConfig {
    pub mode: FormatMode,
    pub delimiter: u8,
    pub column_names: Option<Vec<String>>,
    pub widths: Option<Vec<usize>>,
    pub skip_rows: usize,
    pub encoding: String,
}

impl SchemaConfig {
    pub fn from_parameters(params: &TableParameters) -> Result<Self> {
        let mode =
            FormatMode::detect(&params.extension_file, params.separator_file_read.as_deref())?;
        let delimiter = match params.separator() {
            Some(sep) => parse_delimiter(sep)?,
            None => DEFAULT_DELIMITER,
        };
        Ok(Self {
            mode,
            delimiter,
            column_names: params.column_list(),
            widths: params.widths.clone(),
            skip_rows: params.skip_rows,
            encoding: params.encoding_file_read.clone(),
        })
    }
}

/// Single-byte delimiter; `\t` is accepted as an escape for tab.
pub fn parse_delimiter(separator: &str) -> Result<u8> {
    if separator == "\\t" {
        return Ok(b'\t');
    }
    match separator.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(PipelineError::Config(format!(
            "Separator must be a single byte, got '{separator}'"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchema {
    /// Resolved column count; `0` means undetermined
    pub column_count: usize,
    /// Declared names, used when the header row is skipped
    pub names: Option<Vec<String>>,
}

impl ResolvedSchema {
    pub fn is_undetermined(&self) -> bool {
        self.column_count == 0
    }
}

/// Result of resolving a schema. A failed peek still yields a schema (with a
/// zero column count) and carries the failure for the caller to report.
#[derive(Debug)]
pub struct Resolution {
    pub schema: ResolvedSchema,
    pub failure: Option<PipelineError>,
}

/// Resolves the column count for `bytes`. Never fails: problems come back in
/// [`Resolution::failure`] with an undetermined schema.
pub fn resolve_schema(config: &SchemaConfig, bytes: &[u8]) -> Resolution {
    match try_resolve(config, bytes) {
        Ok(schema) => {
            tracing::info!("Resolved column count: {}", schema.column_count);
            Resolution {
                schema,
                failure: None,
            }
        }
        Err(e) => {
            tracing::error!("Failed to resolve column count: {e}");
            Resolution {
                schema: ResolvedSchema {
                    column_count: 0,
                    names: None,
                },
                failure: Some(e),
            }
        }
    }
}

fn try_resolve(config: &SchemaConfig, bytes: &[u8]) -> Result<ResolvedSchema> {
    if config.skip_rows > 0 {
        let names = config.column_names.clone();
        return Ok(ResolvedSchema {
            column_count: names.as_ref().map_or(0, Vec::len),
            names,
        });
    }

    let column_count = match config.mode {
        FormatMode::FixedWidth => {
            let widths = config.widths.as_ref().ok_or_else(|| {
                PipelineError::Config("Fixed-width files require widths".to_owned())
            })?;
            widths.len()
        }
        FormatMode::Delimited => peek_header(config, bytes)?.len(),
    };

    Ok(ResolvedSchema {
        column_count,
        names: None,
    })
}

/// Cells of the first delimited record, trimmed.
fn peek_header(config: &SchemaConfig, bytes: &[u8]) -> Result<Vec<String>> {
    let text = decode(bytes, &config.encoding)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let first = reader
        .records()
        .next()
        .ok_or_else(|| PipelineError::Parse("File has no header row".to_owned()))??;
    Ok(first.iter().map(|cell| cell.trim().to_owned()).collect())
}
