//! # Landing Pipeline
//!
//! Moves single tabular files (delimited or fixed-width) from a landing zone to
//! a transient zone: the column structure is resolved and normalized, a
//! configurable chain of column transformations is applied, and the result is
//! written under a name derived from the source file.
//!
//! ## Quick Start
//!
//! ```no_run
//! use landing_pipeline::config::Settings;
//! use landing_pipeline::orchestrator::{Collaborators, Invocation, Orchestrator};
//! use landing_pipeline::store::LocalObjectStore;
//! use std::sync::Arc;
//!
//! # fn example() -> landing_pipeline::error::Result<()> {
//! let settings = Settings::default();
//! let store = Arc::new(LocalObjectStore::new(&settings.store_root));
//! let collaborators = Collaborators::for_store(store, "raw", &settings);
//!
//! let outcome = Orchestrator::new(settings, collaborators).run(&Invocation {
//!     bucket: "raw".to_owned(),
//!     file_key: "landing-zone/sales/sales_20240115.csv".to_owned(),
//!     path_local: "sales".to_owned(),
//!     table_name: "tbl_sales".to_owned(),
//!     config_id: None,
//! })?;
//! println!("{} -> {:?}", outcome.state, outcome.output);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`pipeline`]: schema resolution, parsing, cleaning, transformation stages,
//!   naming and output serialization
//! - [`orchestrator`]: the per-file state machine
//! - [`store`], [`notify`], [`tracking`]: collaborators behind traits
//! - [`config`]: run settings and per-table parameters
//! - [`error`]: error types and handling utilities
//! - [`logging`]: console and rotated-file logging

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod pipeline;
pub mod store;
pub mod tracking;
