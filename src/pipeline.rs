//! The tabular transformation core.
//!
//! A landing-zone file moves through these modules strictly in order:
//!
//! ```text
//! bytes ─> schema ─> reader ─> cleaning ─> executor ─> naming ─> writer
//! ```
//!
//! - [`schema`]: format mode (delimited or fixed-width) and column count
//! - [`reader`]: decoding and parsing into a text-only `DataFrame`
//! - [`cleaning`]: quote and whitespace stripping
//! - [`spec`] / [`validation`]: typed stages parsed from the table parameters
//! - [`executor`]: runs the stages (`add_columns`, `rename_columns`,
//!   `drop_columns`, `date_format`, `hash_columns`, `special_functions`,
//!   `delete_last_row`) in that fixed order
//! - [`functions`] / [`hasher`]: the special-function registry and the digest
//!   used for hashing
//! - [`naming`]: output stem and reference date from the file name
//! - [`writer`]: `;`-separated CSV output
//!
//! # Example
//!
//! ```no_run
//! use landing_pipeline::config::TableParameters;
//! use landing_pipeline::pipeline::{
//!     FunctionRegistry, ParseOutcome, SchemaConfig, Sha256Hasher, TransformSpec, Transformer,
//!     clean_frame, parse_table, resolve_schema,
//! };
//!
//! # fn example() -> landing_pipeline::error::Result<()> {
//! let params = TableParameters::from_json(r#"{"add_columns": "c:X", "drop_columns": "a"}"#)?;
//! let config = SchemaConfig::from_parameters(&params)?;
//! let bytes = b"a;b\n1;2\n3;4\n";
//!
//! let schema = resolve_schema(&config, bytes).schema;
//! if let ParseOutcome::Table(df) = parse_table(bytes, &config, &schema)? {
//!     let registry = FunctionRegistry::builtin();
//!     let spec = TransformSpec::from_parameters(&params)?;
//!     let (df, report) = Transformer::new(&registry, &Sha256Hasher).run(&spec, clean_frame(df)?)?;
//!     println!("{} -> {:?}", report.summary(), df.get_column_names());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cleaning;
pub mod executor;
pub mod frame;
pub mod functions;
pub mod hasher;
pub mod naming;
pub mod reader;
pub mod schema;
pub mod spec;
pub mod validation;
pub mod writer;

pub use cleaning::{clean_frame, clean_value};
pub use executor::{TransformReport, Transformer, reformat_date};
pub use functions::{FunctionCall, FunctionRegistry, SpecialFunction};
pub use hasher::{Sha256Hasher, ValueHasher};
pub use naming::{NamingRule, OutputName, extract_reference_date, is_invalid_sentinel};
pub use reader::{ParseOutcome, decode, parse_table};
pub use schema::{FormatMode, ResolvedSchema, SchemaConfig, resolve_schema};
pub use spec::{Step, TransformSpec};
pub use validation::{ValidationError, validate_parameters};
pub use writer::{output_key, write_csv};
