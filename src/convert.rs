//! Kind converter: turns filtered files into the relational and multimodel views.

use crate::error::{LoadError, Result};
use crate::graph::build_graph;
use crate::models::{DatasourceData, DocumentData, KindData, ParsedFile, ParsedFileData, Row, Value};
use crate::parser::xml;
use crate::schema::{DatasourceSchema, DocumentTable, DocumentTablesKind, Kind};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Materializes both views over one set of filtered files.
///
/// Common kinds are converted once and the same rows are published in both
/// views.
pub fn convert_kinds(parsed: ParsedFileData, schema: &DatasourceSchema) -> Result<DatasourceData> {
    let mut relational = BTreeMap::new();
    let mut multimodel = BTreeMap::new();

    for kind in &schema.common {
        for (name, rows) in convert_tables(&parsed, kind)? {
            multimodel.insert(name.clone(), KindData::Table(rows.clone()));
            relational.insert(name, rows);
        }
    }

    for kind in &schema.relational_only {
        relational.extend(convert_tables(&parsed, kind)?);
    }

    for kind in &schema.multimodel_only {
        match kind {
            Kind::Table(_) | Kind::DocumentTables(_) => {
                for (name, rows) in convert_tables(&parsed, kind)? {
                    multimodel.insert(name, KindData::Table(rows));
                }
            }
            Kind::Graph(graph) => {
                multimodel.insert(graph.key.clone(), KindData::Graph(build_graph(&parsed, graph)?));
            }
            Kind::Document(document) => {
                let content = parsed
                    .get(&document.key)
                    .ok_or_else(|| LoadError::MissingFile {
                        key: document.key.clone(),
                    })?
                    .clone();
                multimodel.insert(
                    document.key.clone(),
                    KindData::Document(DocumentData {
                        content,
                        indexes: document.indexes.clone(),
                    }),
                );
            }
        }
    }

    info!(
        relational = relational.len(),
        multimodel = multimodel.len(),
        "Converted kinds"
    );
    Ok(DatasourceData {
        parsed,
        relational,
        multimodel,
    })
}

/// Converts a tabular kind into its named row collections.
fn convert_tables(parsed: &ParsedFileData, kind: &Kind) -> Result<Vec<(String, Vec<Row>)>> {
    match kind {
        Kind::Table(table) => {
            let rows = parsed
                .get(&table.key)
                .ok_or_else(|| LoadError::MissingFile {
                    key: table.key.clone(),
                })?
                .rows()
                .ok_or_else(|| LoadError::NotATable {
                    key: table.key.clone(),
                })?;
            Ok(vec![(table.key.clone(), rows.to_vec())])
        }
        Kind::DocumentTables(tables) => {
            let data = parsed.get(&tables.key).ok_or_else(|| LoadError::MissingFile {
                key: tables.key.clone(),
            })?;
            flatten_documents(data, tables)
        }
        Kind::Graph(_) | Kind::Document(_) => Err(LoadError::Schema(format!(
            "{} kind \"{}\" cannot be converted to tables",
            kind.type_name(),
            kind.key()
        ))),
    }
}

/// Flattens nested records into one row collection per tree node, in tree order.
pub fn flatten_documents(data: &ParsedFile, kind: &DocumentTablesKind) -> Result<Vec<(String, Vec<Row>)>> {
    let flattened;
    let records: &[JsonValue] = match data {
        ParsedFile::Records(records) => records,
        ParsedFile::Document(root) => {
            flattened = xml::flatten(root)?;
            &flattened
        }
        ParsedFile::Rows(_) => {
            return Err(LoadError::Schema(format!(
                "documentTables kind \"{}\" needs JSON or XML records, not rows",
                kind.key
            )))
        }
    };

    let mut output: BTreeMap<&str, Vec<Row>> =
        kind.root.walk().into_iter().map(|t| (t.name.as_str(), Vec::new())).collect();
    let empty = Map::new();
    for record in records {
        let object = record.as_object().unwrap_or(&empty);
        flatten_object(object, None, &kind.root, &mut output)?;
    }

    for (name, rows) in &output {
        debug!(table = name, rows = rows.len(), "Flattened document table");
    }
    Ok(kind
        .root
        .walk()
        .into_iter()
        .map(|t| {
            let rows = output.remove(t.name.as_str()).unwrap_or_default();
            (t.name.clone(), rows)
        })
        .collect())
}

fn flatten_object<'s>(
    object: &Map<String, JsonValue>,
    parent: Option<&Row>,
    table: &'s DocumentTable,
    output: &mut BTreeMap<&'s str, Vec<Row>>,
) -> Result<()> {
    let mut row = Row::new();
    for column in &table.columns {
        let json = object.get(&column.name).unwrap_or(&JsonValue::Null);
        let value = Value::from_json(json, column.column_type).ok_or_else(|| LoadError::Cast {
            table: table.name.clone(),
            column: column.name.clone(),
            value: json.to_string(),
            expected: column.column_type,
        })?;
        row.insert(column.name.clone(), value);
    }
    for column in &table.from_parent {
        let value = parent
            .and_then(|p| p.get(&column.name))
            .cloned()
            .unwrap_or(Value::Null);
        row.insert(column.name.clone(), value);
    }

    for child in &table.children {
        match object.get(&child.key) {
            Some(JsonValue::Array(items)) => {
                for item in items {
                    if let Some(item) = item.as_object() {
                        flatten_object(item, Some(&row), child, output)?;
                    }
                }
            }
            Some(JsonValue::Object(item)) => flatten_object(item, Some(&row), child, output)?,
            _ => {}
        }
    }

    output.entry(table.name.as_str()).or_default().push(row);
    Ok(())
}
