//! CSV export of a loaded datasource.
//!
//! Relational tables are written one file per table under `relational/`,
//! with their columns in declaration order. Graphs use the neo4j-admin import header convention so the node and edge
//! files can be bulk loaded as they are. Documents are written as JSON.

use crate::config::WRITER_BUFFER_SIZE;
use crate::ddl::relational_tables;
use crate::graph::PropertyGraph;
use crate::models::{DatasourceData, DocumentData, KindData, Row};
use crate::schema::DatasourceSchema;
use anyhow::{Context, Result};
use csv::Writer;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn csv_writer(path: &Path) -> Result<Writer<BufWriter<File>>> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(Writer::from_writer(BufWriter::with_capacity(WRITER_BUFFER_SIZE, file)))
}

/// `declared` columns first, then any other key of `rows`, sorted.
fn header<'a>(declared: &[&'a str], rows: impl Iterator<Item = &'a Row>) -> Vec<&'a str> {
    let extra: BTreeSet<&str> = rows
        .flat_map(|r| r.keys().map(String::as_str))
        .filter(|key| !declared.contains(key))
        .collect();
    declared.iter().copied().chain(extra).collect()
}

/// Writes one table; null and missing values become empty fields.
pub fn write_table(path: &Path, declared: &[&str], rows: &[Row]) -> Result<()> {
    let columns = header(declared, rows.iter());
    let mut writer = csv_writer(path)?;
    writer.write_record(&columns)?;
    for row in rows {
        writer.write_record(
            columns
                .iter()
                .map(|c| row.get(*c).map(|v| v.to_string()).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `<name>_nodes.csv` and `<name>_edges.csv`. Labels are `;`-separated.
pub fn write_graph(dir: &Path, name: &str, graph: &PropertyGraph) -> Result<(PathBuf, PathBuf)> {
    let nodes_path = dir.join(format!("{}_nodes.csv", name));
    let attributes = header(&[], graph.nodes().iter().map(|n| &n.attributes));
    let mut nodes = csv_writer(&nodes_path)?;

    let mut record: Vec<String> = vec!["id:ID".to_string(), ":LABEL".to_string()];
    record.extend(attributes.iter().map(|a| a.to_string()));
    nodes.write_record(&record)?;
    for node in graph.nodes() {
        record.clear();
        record.push(node.key.clone());
        record.push(node.labels.join(";"));
        for attribute in &attributes {
            record.push(node.attributes.get(*attribute).map(|v| v.to_string()).unwrap_or_default());
        }
        nodes.write_record(&record)?;
    }
    nodes.flush()?;

    let edges_path = dir.join(format!("{}_edges.csv", name));
    let props = header(&[], graph.edges().iter().map(|e| &e.props));
    let mut edges = csv_writer(&edges_path)?;

    record.clear();
    record.extend([":START_ID", ":END_ID", ":TYPE"].map(String::from));
    record.extend(props.iter().map(|p| p.to_string()));
    edges.write_record(&record)?;
    for edge in graph.edges() {
        record.clear();
        record.push(edge.source.clone());
        record.push(edge.target.clone());
        record.push(edge.kind.clone());
        for prop in &props {
            record.push(edge.props.get(*prop).map(|v| v.to_string()).unwrap_or_default());
        }
        edges.write_record(&record)?;
    }
    edges.flush()?;

    Ok((nodes_path, edges_path))
}

fn write_document(path: &Path, document: &DocumentData) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::with_capacity(WRITER_BUFFER_SIZE, file);
    serde_json::to_writer(&mut writer, &document.content)?;
    writer.flush()?;
    Ok(())
}

/// Column names per table, as declared by the schema.
fn declared_columns(schema: &DatasourceSchema) -> FxHashMap<String, Vec<String>> {
    let mut declared: FxHashMap<String, Vec<String>> = schema
        .files()
        .iter()
        .map(|f| (f.key.clone(), f.columns().iter().map(|c| c.name.clone()).collect()))
        .collect();
    for table in relational_tables(schema) {
        declared.insert(table.name, table.columns.into_iter().map(|c| c.name).collect());
    }
    declared
}

fn columns_of<'d>(declared: &'d FxHashMap<String, Vec<String>>, name: &str) -> Vec<&'d str> {
    declared
        .get(name)
        .map(|columns| columns.iter().map(String::as_str).collect())
        .unwrap_or_default()
}

/// Exports both views of `data` under `dir` and returns every file written.
///
/// Multimodel tables that are also relational are not written twice.
pub fn export_datasource(
    data: &DatasourceData,
    schema: &DatasourceSchema,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let declared = declared_columns(schema);

    let relational_dir = dir.join("relational");
    fs::create_dir_all(&relational_dir)
        .with_context(|| format!("Failed to create {}", relational_dir.display()))?;

    let mut written = Vec::new();
    for (name, rows) in &data.relational {
        let path = relational_dir.join(format!("{}.csv", name));
        write_table(&path, &columns_of(&declared, name), rows)?;
        debug!(table = %name, rows = rows.len(), "Exported table");
        written.push(path);
    }

    for (name, kind) in &data.multimodel {
        match kind {
            KindData::Table(rows) => {
                if data.relational.contains_key(name) {
                    continue;
                }
                let path = dir.join(format!("{}.csv", name));
                write_table(&path, &columns_of(&declared, name), rows)?;
                written.push(path);
            }
            KindData::Graph(graph) => {
                let (nodes, edges) = write_graph(dir, name, graph)?;
                written.push(nodes);
                written.push(edges);
            }
            KindData::Document(document) => {
                let path = dir.join(format!("{}.json", name));
                write_document(&path, document)?;
                written.push(path);
            }
        }
    }

    info!(dir = %dir.display(), files = written.len(), "Exported datasource");
    Ok(written)
}
