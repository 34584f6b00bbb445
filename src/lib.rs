//! Fetch county poverty and income estimates from the Census SAIPE API.
//!
//! The crate runs a four-stage pipeline:
//! build the query URL, fetch the rows, reshape them into a labeled table,
//! then export the table as CSV (optionally re-reading it to verify the write).
//!
//! ## Quick start
//! - Configure the API key via `--key`, the `SAIPE_KEY` environment variable or
//!   a `.saipeapirc` file (current directory or home directory).
//! - Call [`pipeline::run`] with a [`Client`], a [`QuerySpec`] and [`ExportOptions`].
//!
//! ```no_run
//! use saipe::{Client, ExportOptions, QuerySpec, RegionSelector};
//! use saipe::query::{DEFAULT_COLUMNS, DEFAULT_ENDPOINT};
//!
//! fn main() -> saipe::Result<()> {
//!     let spec = QuerySpec::new(
//!         DEFAULT_ENDPOINT,
//!         DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
//!         RegionSelector { state: 48, county: 201 },
//!         "2018",
//!         "your-census-api-key",
//!     )?;
//!     let report = saipe::pipeline::run(&Client::new()?, &spec, &ExportOptions::default())?;
//!     print!("{}", report.table.render());
//!     Ok(())
//! }
//! ```
//!
//! Each stage fails with its own [`Error`] variant, and nothing is written
//! unless the fetch and transform stages succeed.

#![forbid(unsafe_code)]

mod client;
mod config;
mod error;
pub mod export;
pub mod pipeline;
pub mod query;
pub mod table;
mod util;

pub use client::{Client, DEFAULT_TIMEOUT, Fetch};
pub use config::{Config, Overrides, load_config};
pub use error::{Error, Result};
pub use export::ExportOptions;
pub use query::{QuerySpec, RegionSelector};
pub use table::{RawResponse, ResultTable, transform};
