//! Table parameter validation.
//!
//! Checks a parameter document before any source file is read, collecting
//! every problem at once so a broken configuration can be fixed in one pass.
//! Unknown special functions are rejected here rather than skipped at run
//! time.

use crate::config::{TableParameters, active};
use crate::pipeline::functions::FunctionRegistry;
use crate::pipeline::reader::is_known_encoding;
use crate::pipeline::schema::{FormatMode, parse_delimiter};
use crate::pipeline::spec::{parse_date_rules, parse_rename_columns, parse_special_functions};

/// Validation error tied to the parameter field that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validates `params` against the function `registry`. An empty result means
/// the document is usable.
pub fn validate_parameters(
    params: &TableParameters,
    registry: &FunctionRegistry,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_layout(params, &mut errors);
    validate_stages(params, registry, &mut errors);

    if params.extension_file_target.trim().is_empty() {
        errors.push(ValidationError::new(
            "extension_file_target",
            "Target extension must not be empty",
        ));
    }

    errors
}

/// Format mode, separator, widths, header handling and encoding.
fn validate_layout(params: &TableParameters, errors: &mut Vec<ValidationError>) {
    let detected =
        FormatMode::detect(&params.extension_file, params.separator_file_read.as_deref());
    let mode = match detected {
        Ok(mode) => Some(mode),
        Err(e) => {
            errors.push(ValidationError::new("extension_file", e.to_string()));
            None
        }
    };

    if let Some(separator) = params.separator()
        && let Err(e) = parse_delimiter(separator)
    {
        errors.push(ValidationError::new("separator_file_read", e.to_string()));
    }

    if mode == Some(FormatMode::FixedWidth) {
        match &params.widths {
            None => errors.push(ValidationError::new(
                "widths",
                "Fixed-width files require widths",
            )),
            Some(widths) if widths.is_empty() => {
                errors.push(ValidationError::new("widths", "Widths must not be empty"));
            }
            Some(widths) if widths.contains(&0) => {
                errors.push(ValidationError::new("widths", "Widths must be positive"));
            }
            Some(_) => {}
        }
    }

    if params.skip_rows > 0 && params.column_list().is_none() {
        errors.push(ValidationError::new(
            "column_names",
            format!(
                "skip_rows is {} but no column names are declared",
                params.skip_rows
            ),
        ));
    }

    if !is_known_encoding(&params.encoding_file_read) {
        errors.push(ValidationError::new(
            "encoding_file_read",
            format!("Unknown encoding '{}'", params.encoding_file_read),
        ));
    }
}

/// Transformation mini-languages and registry membership.
fn validate_stages(
    params: &TableParameters,
    registry: &FunctionRegistry,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(raw) = active(params.rename_columns.as_ref())
        && let Err(e) = parse_rename_columns(raw)
    {
        errors.push(ValidationError::new("rename_columns", e.to_string()));
    }

    if let Some(raw) = active(params.date_format.as_ref()) {
        match parse_date_rules(raw) {
            Ok(rules) => {
                for rule in rules {
                    if let Err(message) = rule.check() {
                        errors.push(ValidationError::new("date_format", message));
                    }
                }
            }
            Err(e) => errors.push(ValidationError::new("date_format", e.to_string())),
        }
    }

    if let Some(raw) = active(params.special_functions.as_ref()) {
        match parse_special_functions(raw) {
            Ok(calls) => {
                for call in &calls {
                    if let Err(message) = registry.check(call) {
                        errors.push(ValidationError::new("special_functions", message));
                    }
                }
            }
            Err(e) => errors.push(ValidationError::new("special_functions", e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(json: &str) -> Vec<ValidationError> {
        let params = TableParameters::from_json(json).unwrap();
        validate_parameters(&params, &FunctionRegistry::builtin())
    }

    #[test]
    fn test_valid_document_has_no_errors() {
        let errors = validate(
            r#"{
                "extension_file": "csv",
                "separator_file_read": ";",
                "add_columns": "c:X",
                "date_format": "dt:%Y%m%d:%d/%m/%Y",
                "special_functions": "delete_cero:a:b,concat-fields:d:t:dt"
            }"#,
        );
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_unknown_special_function_is_rejected() {
        let errors = validate(r#"{"special_functions": "to_upper:a:b"}"#);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "special_functions");
        assert!(errors[0].message.contains("to_upper"));
    }

    #[test]
    fn test_fixed_width_requires_widths() {
        let errors = validate(r#"{"extension_file": "TXT", "separator_file_read": "NULL"}"#);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "widths");

        let errors = validate(
            r#"{"extension_file": "TXT", "separator_file_read": "NULL", "widths": "[2,0]"}"#,
        );
        assert!(errors[0].message.contains("positive"));
    }

    #[test]
    fn test_collects_every_problem() {
        let errors = validate(
            r#"{
                "extension_file": "xlsx",
                "separator_file_read": "||",
                "skip_rows": 2,
                "encoding_file_read": "martian",
                "rename_columns": "a",
                "date_format": "dt:%Y",
                "extension_file_target": " "
            }"#,
        );
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();

        assert_eq!(
            fields,
            vec![
                "extension_file",
                "separator_file_read",
                "column_names",
                "encoding_file_read",
                "rename_columns",
                "date_format",
                "extension_file_target",
            ]
        );
        assert!(errors[2].to_string().starts_with("column_names: "));
    }
}
