//! Load orchestration: validate, read, filter, convert.

use crate::archive::parse_source;
use crate::convert::convert_kinds;
use crate::error::Result;
use crate::fetch::open_input;
use crate::filter::filter_datasource;
use crate::models::DatasourceData;
use crate::progress::{Phase, Progress, ProgressObserver, ProgressReader};
use crate::schema::DatasourceSchema;
use std::io::Read;
use std::time::Instant;
use tracing::info;

/// Runs the whole pipeline over an already open input stream.
///
/// The schema is validated before the first byte is read. Any failure aborts
/// the load; nothing partial is returned. Byte fractions of `total` are
/// reported under [`Phase::Parse`].
pub fn load_datasource<R: Read>(
    schema: &DatasourceSchema,
    reader: R,
    total: Option<u64>,
    observer: &mut dyn ProgressObserver,
) -> Result<DatasourceData> {
    schema.validate()?;
    observer.on_progress(Progress::started(Phase::Parse));
    run(schema, reader, total, Phase::Parse, observer)
}

/// Opens the schema's source, or `location` when given, and loads it.
///
/// Entries are parsed while the input downloads, so byte fractions are
/// reported under [`Phase::Download`].
pub fn fetch_and_load(
    schema: &DatasourceSchema,
    location: Option<&str>,
    observer: &mut dyn ProgressObserver,
) -> Result<DatasourceData> {
    schema.validate()?;
    let location = location.unwrap_or_else(|| schema.source_path());
    observer.on_progress(Progress::started(Phase::Download));
    let input = open_input(location)?;
    run(schema, input.reader, input.length, Phase::Download, observer)
}

fn run<R: Read>(
    schema: &DatasourceSchema,
    reader: R,
    total: Option<u64>,
    read_phase: Phase,
    observer: &mut dyn ProgressObserver,
) -> Result<DatasourceData> {
    let start = Instant::now();
    info!(label = %schema.label, files = schema.files().len(), "Loading datasource");

    let parsed = {
        let reader = ProgressReader::new(reader, total, read_phase, observer);
        parse_source(reader, schema)?
    };
    info!(files = parsed.len(), "Parsed files");

    observer.on_progress(Progress::started(Phase::Filter));
    let filtered = filter_datasource(parsed, schema)?;

    observer.on_progress(Progress::started(Phase::Convert));
    let data = convert_kinds(filtered, schema)?;

    info!(
        label = %schema.label,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Datasource loaded"
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::build_zip;
    use crate::error::LoadError;
    use crate::progress::NoProgress;

    const SCHEMA: &str = r#"{
        "label": "Social",
        "file": { "path": "social.zip", "files": [
            { "path": "person.csv", "key": "persons", "type": "csv", "columns": [
                { "name": "id", "type": "int", "isPrimaryKey": true },
                { "name": "name", "type": "string" }
            ] },
            { "path": "knows.csv", "key": "knows", "type": "csv", "columns": [
                { "name": "from", "type": "int", "references": { "key": "persons", "column": "id" } },
                { "name": "to", "type": "int", "references": { "key": "persons", "column": "id" } }
            ] }
        ] },
        "common": [ { "type": "table", "key": "persons" } ],
        "relationalOnly": [ { "type": "table", "key": "knows" } ],
        "multimodelOnly": [ { "type": "graph", "key": "social", "edges": [ {
            "key": "knows",
            "from": { "idColumn": "from", "label": "person", "source": { "key": "persons", "column": "id" } },
            "to": { "idColumn": "to", "label": "person", "source": { "key": "persons", "column": "id" } }
        } ] } ]
    }"#;

    #[test]
    fn phases_are_reported_in_order() {
        let schema = DatasourceSchema::from_json(SCHEMA).unwrap();
        let archive = build_zip(&[
            ("person.csv", "id,name\n1,Alice\n2,Bob\n2,Bob\n"),
            ("knows.csv", "from,to\n1,2\n1,3\n"),
        ]);

        let mut phases = Vec::new();
        let mut observer = |p: Progress| {
            if p.fraction.is_none() {
                phases.push(p.phase);
            }
        };
        let data = load_datasource(&schema, archive.as_slice(), Some(archive.len() as u64), &mut observer).unwrap();
        assert_eq!(phases, vec![Phase::Parse, Phase::Filter, Phase::Convert]);

        assert_eq!(data.relational["persons"].len(), 2);
        assert_eq!(data.relational["knows"].len(), 1);
        let graph = data.multimodel["social"].as_graph().unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn local_streams_report_parse_fractions() {
        let schema = DatasourceSchema::from_json(SCHEMA).unwrap();
        let archive = build_zip(&[
            ("person.csv", "id,name\n1,Alice\n"),
            ("knows.csv", "from,to\n1,1\n"),
        ]);

        let mut seen = Vec::new();
        let mut observer = |p: Progress| seen.push(p);
        load_datasource(&schema, archive.as_slice(), Some(archive.len() as u64), &mut observer).unwrap();

        assert!(seen.iter().all(|p| p.phase != Phase::Download));
        let fractions: Vec<&Progress> = seen.iter().filter(|p| p.fraction.is_some()).collect();
        assert!(!fractions.is_empty());
        assert!(fractions.iter().all(|p| p.phase == Phase::Parse));
    }

    #[test]
    fn invalid_schema_fails_before_reading() {
        let mut schema = DatasourceSchema::from_json(SCHEMA).unwrap();
        schema.common.clear();
        schema.common.push(schema.multimodel_only[0].clone());

        struct Untouchable;
        impl Read for Untouchable {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                panic!("input must not be read");
            }
        }

        let err = load_datasource(&schema, Untouchable, None, &mut NoProgress).unwrap_err();
        assert!(matches!(err, LoadError::Schema(_)));
    }
}
