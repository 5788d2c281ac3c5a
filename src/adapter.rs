//! Hand-off to query engines.
//!
//! Every engine implements [`Database`]: it ingests one finished
//! [`DatasourceData`] and then answers queries in its own language. A
//! [`Session`] owns the engines for one dataset, so nothing is global.

use crate::loader::{fetch_and_load, load_datasource};
use crate::models::{DatasourceData, Value};
use crate::progress::{Phase, Progress, ProgressObserver};
use crate::schema::DatasourceSchema;
use anyhow::{Context, Result};
use std::io::Read;
use thiserror::Error;
use tracing::info;

/// Tabular query result; each row has one value per column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct QueryError {
    pub message: String,
    /// Engine-specific detail such as the failing position or error code.
    pub detail: Option<String>,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }
}

pub trait Database {
    fn name(&self) -> &str;

    /// Takes in a complete dataset. `progress` receives fractions in `0.0..=1.0`
    /// at whatever granularity the engine likes.
    fn ingest(
        &mut self,
        schema: &DatasourceSchema,
        data: &DatasourceData,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()>;

    fn query(&mut self, text: &str) -> Result<QueryOutput, QueryError>;
}

/// One dataset loaded into a set of engines.
pub struct Session {
    schema: DatasourceSchema,
    adapters: Vec<Box<dyn Database>>,
    data: Option<DatasourceData>,
}

impl Session {
    pub fn new(schema: DatasourceSchema) -> Self {
        Self {
            schema,
            adapters: Vec::new(),
            data: None,
        }
    }

    pub fn with_adapter(mut self, adapter: Box<dyn Database>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn schema(&self) -> &DatasourceSchema {
        &self.schema
    }

    pub fn data(&self) -> Option<&DatasourceData> {
        self.data.as_ref()
    }

    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Fetches the dataset from its source (or `location`) and ingests it.
    pub fn load(&mut self, location: Option<&str>, observer: &mut dyn ProgressObserver) -> Result<()> {
        let data = fetch_and_load(&self.schema, location, observer)
            .with_context(|| format!("Failed to load datasource \"{}\"", self.schema.label))?;
        self.ingest(data, observer)
    }

    /// Loads from an already open stream and ingests it.
    pub fn load_from<R: Read>(
        &mut self,
        reader: R,
        total: Option<u64>,
        observer: &mut dyn ProgressObserver,
    ) -> Result<()> {
        let data = load_datasource(&self.schema, reader, total, observer)
            .with_context(|| format!("Failed to load datasource \"{}\"", self.schema.label))?;
        self.ingest(data, observer)
    }

    fn ingest(&mut self, data: DatasourceData, observer: &mut dyn ProgressObserver) -> Result<()> {
        self.data = None;
        observer.on_progress(Progress::started(Phase::Ingest));

        let count = self.adapters.len() as f64;
        for (i, adapter) in self.adapters.iter_mut().enumerate() {
            info!(adapter = adapter.name(), "Ingesting datasource");
            let mut report = |fraction: f64| {
                let overall = (i as f64 + fraction.clamp(0.0, 1.0)) / count;
                observer.on_progress(Progress::at(Phase::Ingest, overall));
            };
            adapter
                .ingest(&self.schema, &data, &mut report)
                .with_context(|| format!("Adapter {} failed to ingest", adapter.name()))?;
        }

        self.data = Some(data);
        Ok(())
    }

    /// Runs `text` on the named engine.
    pub fn query(&mut self, adapter: &str, text: &str) -> Result<QueryOutput, QueryError> {
        if self.data.is_none() {
            return Err(QueryError::new("no datasource has been loaded"));
        }
        let engine = self
            .adapters
            .iter_mut()
            .find(|a| a.name() == adapter)
            .ok_or_else(|| QueryError::new(format!("unknown adapter \"{}\"", adapter)))?;
        engine.query(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::build_zip;
    use crate::ddl::{relational_tables, RelationalTable};
    use crate::progress::NoProgress;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Answers `SELECT * FROM <table>` against the relational view.
    struct ScanEngine {
        name: String,
        tables: Vec<RelationalTable>,
        data: Option<DatasourceData>,
        ingested: Rc<RefCell<Vec<String>>>,
    }

    impl ScanEngine {
        fn boxed(name: &str, ingested: &Rc<RefCell<Vec<String>>>) -> Box<dyn Database> {
            Box::new(Self {
                name: name.to_string(),
                tables: Vec::new(),
                data: None,
                ingested: Rc::clone(ingested),
            })
        }
    }

    impl Database for ScanEngine {
        fn name(&self) -> &str {
            &self.name
        }

        fn ingest(
            &mut self,
            schema: &DatasourceSchema,
            data: &DatasourceData,
            progress: &mut dyn FnMut(f64),
        ) -> Result<()> {
            progress(0.5);
            self.tables = relational_tables(schema);
            self.data = Some(data.clone());
            self.ingested.borrow_mut().push(self.name.clone());
            progress(1.0);
            Ok(())
        }

        fn query(&mut self, text: &str) -> Result<QueryOutput, QueryError> {
            let table = text
                .strip_prefix("SELECT * FROM ")
                .ok_or_else(|| QueryError::new("unsupported query"))?;
            let data = self.data.as_ref().ok_or_else(|| QueryError::new("empty"))?;
            let definition = self.tables.iter().find(|t| t.name == table);
            let (Some(definition), Some(rows)) = (definition, data.relational.get(table)) else {
                return Err(QueryError::new(format!("no such table: {table}")));
            };
            Ok(QueryOutput {
                columns: definition.columns.iter().map(|c| c.name.clone()).collect(),
                rows: rows
                    .iter()
                    .map(|r| definition.row_values(r).into_iter().cloned().collect())
                    .collect(),
            })
        }
    }

    const SCHEMA: &str = r#"{
        "label": "Customers",
        "file": { "path": "customers.zip", "files": [
            { "path": "customers.csv", "key": "customers", "type": "csv", "columns": [
                { "name": "name", "type": "string" },
                { "name": "id", "type": "int", "isPrimaryKey": true }
            ] }
        ] },
        "common": [ { "type": "table", "key": "customers" } ]
    }"#;

    fn session(ingested: &Rc<RefCell<Vec<String>>>) -> Session {
        Session::new(DatasourceSchema::from_json(SCHEMA).unwrap())
            .with_adapter(ScanEngine::boxed("first", ingested))
            .with_adapter(ScanEngine::boxed("second", ingested))
    }

    #[test]
    fn every_adapter_ingests_and_answers() {
        let ingested = Rc::new(RefCell::new(Vec::new()));
        let mut session = session(&ingested);
        let archive = build_zip(&[("customers.csv", "name,id\nAlice,1\nBob,2\n")]);

        let mut fractions = Vec::new();
        let mut observer = |p: Progress| {
            if p.phase == Phase::Ingest {
                fractions.extend(p.fraction);
            }
        };
        session.load_from(archive.as_slice(), None, &mut observer).unwrap();

        assert_eq!(*ingested.borrow(), vec!["first", "second"]);
        assert_eq!(fractions, vec![0.25, 0.5, 0.75, 1.0]);
        assert_eq!(session.adapter_names(), vec!["first", "second"]);

        let output = session.query("second", "SELECT * FROM customers").unwrap();
        assert_eq!(output.columns, vec!["name", "id"]);
        assert_eq!(output.rows.len(), 2);
        assert_eq!(output.rows[1], vec![Value::String("Bob".to_string()), Value::Int(2)]);
    }

    #[test]
    fn failed_load_ingests_nothing() {
        let ingested = Rc::new(RefCell::new(Vec::new()));
        let mut session = session(&ingested);
        let archive = build_zip(&[("customers.csv", "name,id\nAlice,not-a-number\n")]);

        let err = session.load_from(archive.as_slice(), None, &mut NoProgress).unwrap_err();
        assert!(format!("{:#}", err).contains("cannot cast"));
        assert!(ingested.borrow().is_empty());
        assert!(session.data().is_none());
        assert!(session.query("first", "SELECT * FROM customers").is_err());
    }

    #[test]
    fn unknown_adapter_is_a_query_error() {
        let ingested = Rc::new(RefCell::new(Vec::new()));
        let mut session = session(&ingested);
        let archive = build_zip(&[("customers.csv", "name,id\nAlice,1\n")]);
        session.load_from(archive.as_slice(), None, &mut NoProgress).unwrap();

        let err = session.query("third", "SELECT * FROM customers").unwrap_err();
        assert!(err.message.contains("unknown adapter"));
        let err = session.query("first", "DROP TABLE customers").unwrap_err();
        assert_eq!(err, QueryError::new("unsupported query"));
    }
}
