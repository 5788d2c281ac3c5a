//! Polyload: schema-driven loading of one dataset into several data models
//!
//! This crate takes a streamed archive of heterogeneous files (CSV, XML and
//! newline-delimited JSON inside a ZIP, or a single file) and turns it into
//! the views that query engines consume:
//!
//! 1. **Parse** -- Stream the archive entry by entry and hand each listed entry
//!    to its format parser, casting CSV fields to their declared column types
//! 2. **Filter** -- Visit files in dependency order and drop duplicate primary
//!    keys, explicitly excluded keys and dangling references
//! 3. **Convert** -- Materialize a relational view (flat tables, nested documents
//!    flattened into linked tables) and a multimodel view (tables, documents and
//!    property graphs) from the same filtered files
//! 4. **Ingest** -- Hand the finished data to every engine of a [`adapter::Session`]
//!
//! # Key Modules
//!
//! - [`schema`] -- Declarative dataset description and validation
//! - [`archive`] -- Streaming ZIP reader dispatching entries to parsers
//! - [`parser`] -- CSV, XML and NDJSON parsers
//! - [`filter`] -- Referential filter
//! - [`convert`] -- Kind converter for both views
//! - [`graph`] -- Property graph and graph builder
//! - [`toposort`] -- Dependency ordering shared by the filter and [`ddl`]
//! - [`loader`] -- Orchestration with coarse [`progress`] reporting
//! - [`adapter`] -- Ingestion contract for query engines
//! - [`export`] -- CSV/JSON dumps, graphs in neo4j-admin layout
//! - [`stats`] -- Load summary
//! - [`error`] -- Error taxonomy
//! - [`config`] -- Constants for reading, downloading and writing
//!
//! # Example Usage
//!
//! ```bash
//! # Check a schema without touching the data
//! polyload validate -s datasets/ecommerce.json
//!
//! # Load the dataset and dump both views
//! polyload load -s datasets/ecommerce.json --dump out/ -v
//!
//! # Print the SQL schema for the relational view
//! polyload ddl -s datasets/ecommerce.json
//! ```

pub mod adapter;
pub mod archive;
pub mod config;
pub mod convert;
pub mod ddl;
pub mod error;
pub mod export;
pub mod fetch;
pub mod filter;
pub mod graph;
pub mod loader;
pub mod models;
pub mod parser;
pub mod progress;
pub mod schema;
pub mod stats;
pub mod toposort;
