//! SQL DDL for the relational view.
//!
//! Generates SQLite-affinity `CREATE TABLE` statements and prepared `INSERT`
//! templates for every table an SQL adapter has to create, ordered so that
//! referenced tables are created first.

use crate::models::{Row, Value};
use crate::schema::{ColumnDef, ColumnType, DatasourceSchema, DocumentTable, Kind};
use crate::toposort::topological_sort;
use rustc_hash::FxHashMap;
use std::fmt::Write;

/// One table of the relational view with its final column list.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationalTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl RelationalTable {
    fn dependencies(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter_map(|c| c.reference.as_ref())
            .map(|r| r.key.as_str())
            .filter(|key| *key != self.name)
            .collect()
    }

    fn primary_keys(&self) -> Vec<&ColumnDef> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }

    /// Values of `row` in column order, ready to bind to [`insert_statement`].
    pub fn row_values<'r>(&self, row: &'r Row) -> Vec<&'r Value> {
        self.columns
            .iter()
            .map(|c| row.get(&c.name).unwrap_or(&Value::Null))
            .collect()
    }
}

/// Statements for the whole relational view, in creation order.
#[derive(Debug, Clone)]
pub struct DdlScript {
    pub tables: Vec<RelationalTable>,
    pub statements: Vec<String>,
}

pub fn sqlite_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::String | ColumnType::Date => "TEXT",
        ColumnType::Int => "INTEGER",
        ColumnType::Float => "REAL",
    }
}

/// Lists every relational table, referenced tables first.
pub fn relational_tables(schema: &DatasourceSchema) -> Vec<RelationalTable> {
    let mut tables = Vec::new();
    for kind in schema.relational_kinds() {
        match kind {
            Kind::Table(table) => {
                let columns = schema
                    .file(&table.key)
                    .map(|f| f.columns().to_vec())
                    .unwrap_or_default();
                tables.push(RelationalTable {
                    name: table.key.clone(),
                    columns,
                });
            }
            Kind::DocumentTables(kind) => {
                tables.extend(kind.root.walk().into_iter().map(document_table));
            }
            Kind::Graph(_) | Kind::Document(_) => {}
        }
    }

    topological_sort(&tables, |t| (t.name.as_str(), t.dependencies()))
        .into_iter()
        .cloned()
        .collect()
}

fn document_table(node: &DocumentTable) -> RelationalTable {
    let mut columns: Vec<ColumnDef> = Vec::new();
    for column in node.all_columns() {
        if !columns.iter().any(|c| c.name == column.name) {
            columns.push(column.clone());
        }
    }
    RelationalTable {
        name: node.name.clone(),
        columns,
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn column_list<'c>(columns: impl Iterator<Item = &'c str>) -> String {
    columns.map(quote).collect::<Vec<_>>().join(", ")
}

/// A reference becomes a FOREIGN KEY only when its target is known to be
/// unique: a single-column primary key, a unique column, or a reference that
/// says so itself.
fn references_unique_target(column: &ColumnDef, tables: &FxHashMap<&str, &RelationalTable>) -> bool {
    let Some(reference) = &column.reference else {
        return false;
    };
    if reference.is_unique {
        return tables.contains_key(reference.key.as_str());
    }
    let Some(target) = tables.get(reference.key.as_str()) else {
        return false;
    };
    let primary = target.primary_keys();
    if primary.len() == 1 && primary[0].name == reference.column {
        return true;
    }
    target
        .columns
        .iter()
        .any(|c| c.name == reference.column && c.is_unique)
}

pub fn create_table_statement(table: &RelationalTable, tables: &[RelationalTable]) -> String {
    let by_name: FxHashMap<&str, &RelationalTable> =
        tables.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let mut line = format!("{} {}", quote(&c.name), sqlite_type(c.column_type));
            if c.is_unique {
                line.push_str(" UNIQUE");
            }
            line
        })
        .collect();

    let primary = table.primary_keys();
    if !primary.is_empty() {
        lines.push(format!(
            "PRIMARY KEY ({})",
            column_list(primary.iter().map(|c| c.name.as_str()))
        ));
    }

    for column in &table.columns {
        if !references_unique_target(column, &by_name) {
            continue;
        }
        if let Some(reference) = &column.reference {
            lines.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                quote(&column.name),
                quote(&reference.key),
                quote(&reference.column)
            ));
        }
    }

    let mut statement = format!("CREATE TABLE {} (\n", quote(&table.name));
    for (i, line) in lines.iter().enumerate() {
        let _ = write!(statement, "    {}", line);
        statement.push_str(if i + 1 < lines.len() { ",\n" } else { "\n" });
    }
    statement.push_str(");");
    statement
}

pub fn insert_statement(table: &RelationalTable) -> String {
    let placeholders = vec!["?"; table.columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote(&table.name),
        column_list(table.columns.iter().map(|c| c.name.as_str())),
        placeholders
    )
}

pub fn create_schema(schema: &DatasourceSchema) -> DdlScript {
    let tables = relational_tables(schema);
    let statements = tables
        .iter()
        .map(|t| create_table_statement(t, &tables))
        .collect();
    DdlScript { tables, statements }
}
