//! Declarative description of one dataset.
//!
//! A [`DatasourceSchema`] names where the data lives ([`FileSource`]), how each
//! file is typed and parsed ([`SimpleFile`], [`ColumnDef`]), and which kinds are
//! produced from the parsed files for the relational and multimodel views
//! ([`Kind`]). Schemas are plain JSON documents with camelCase field names.

use crate::error::{LoadError, Result};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceSchema {
    pub label: String,
    pub file: FileSource,
    /// Kinds present in both views. Always plain tables.
    #[serde(default)]
    pub common: Vec<Kind>,
    #[serde(default)]
    pub relational_only: Vec<Kind>,
    #[serde(default)]
    pub multimodel_only: Vec<Kind>,
}

/// Either one file or a ZIP archive of files. Nested archives are not supported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileSource {
    Zip(ZipSource),
    Single(SimpleFile),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZipSource {
    pub path: String,
    pub files: Vec<SimpleFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleFile {
    /// Location of the file, or of the entry inside the archive.
    pub path: String,
    /// Name under which the parsed data is published.
    pub key: String,
    #[serde(flatten)]
    pub format: FileFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileFormat {
    Csv {
        columns: Vec<ColumnDef>,
        #[serde(rename = "csvOptions", default)]
        options: CsvOptions,
    },
    Xml,
    Ndjson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvOptions {
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default = "default_true")]
    pub has_header: bool,
    /// Joins primary-key values into one composite key.
    #[serde(default)]
    pub id_separator: Option<String>,
    #[serde(default = "default_true")]
    pub filter_duplicates: bool,
    #[serde(default = "default_true")]
    pub filter_references: bool,
    /// Primary-key tuples to drop, in primary-key column order.
    #[serde(default)]
    pub exclude: Vec<Vec<String>>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            has_header: true,
            id_separator: None,
            filter_duplicates: true,
            filter_references: true,
            exclude: Vec::new(),
        }
    }
}

fn default_separator() -> String {
    ",".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default, alias = "references", skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
    #[serde(default)]
    pub is_unique: bool,
}

impl ColumnDef {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            is_primary_key: false,
            reference: None,
            is_unique: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn references(mut self, key: &str, column: &str) -> Self {
        self.reference = Some(Reference {
            key: key.to_string(),
            column: column.to_string(),
            is_unique: false,
        });
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Int,
    #[serde(alias = "real")]
    Float,
    Date,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "string",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
        };
        f.write_str(name)
    }
}

/// Foreign key to a column of another file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub key: String,
    pub column: String,
    /// The target column behaves as unique even though it is not declared so.
    #[serde(default)]
    pub is_unique: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Kind {
    Table(TableKind),
    DocumentTables(DocumentTablesKind),
    Graph(GraphKind),
    Document(DocumentKind),
}

impl Kind {
    pub fn key(&self) -> &str {
        match self {
            Kind::Table(kind) => &kind.key,
            Kind::DocumentTables(kind) => &kind.key,
            Kind::Graph(kind) => &kind.key,
            Kind::Document(kind) => &kind.key,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Kind::Table(_) => "table",
            Kind::DocumentTables(_) => "documentTables",
            Kind::Graph(_) => "graph",
            Kind::Document(_) => "document",
        }
    }

    /// Names under which this kind publishes its output.
    pub fn output_names(&self) -> Vec<&str> {
        match self {
            Kind::DocumentTables(kind) => {
                kind.root.walk().into_iter().map(|t| t.name.as_str()).collect()
            }
            other => vec![other.key()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableKind {
    pub key: String,
}

/// Flattens nested JSON or XML records of file `key` into linked tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTablesKind {
    pub key: String,
    pub root: DocumentTable,
}

/// One node of a DocumentTables tree; every node becomes one output table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTable {
    pub name: String,
    /// Property of the parent object holding this node's data. Unused on the root.
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    /// Columns copied verbatim from the enclosing row.
    #[serde(default)]
    pub from_parent: Vec<ColumnDef>,
    #[serde(default)]
    pub children: Vec<DocumentTable>,
}

impl DocumentTable {
    /// This node followed by all descendants, depth first.
    pub fn walk(&self) -> Vec<&DocumentTable> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }

    pub fn all_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().chain(self.from_parent.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphKind {
    pub key: String,
    pub edges: Vec<EdgeSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSchema {
    /// File whose rows are the edges.
    pub key: String,
    #[serde(default)]
    pub props: Vec<String>,
    pub from: NodeSchema,
    pub to: NodeSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSchema {
    pub id_column: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<NodeSource>,
}

/// Table whose rows supply the full attributes of a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSource {
    pub key: String,
    pub column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentKind {
    pub key: String,
    #[serde(default)]
    pub indexes: Vec<IndexHint>,
}

/// Named value index a document consumer may build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexHint {
    pub name: String,
    pub path: Vec<String>,
}

impl SimpleFile {
    pub fn columns(&self) -> &[ColumnDef] {
        match &self.format {
            FileFormat::Csv { columns, .. } => columns,
            _ => &[],
        }
    }

    pub fn csv_options(&self) -> Option<&CsvOptions> {
        match &self.format {
            FileFormat::Csv { options, .. } => Some(options),
            _ => None,
        }
    }

    pub fn is_csv(&self) -> bool {
        matches!(self.format, FileFormat::Csv { .. })
    }

    pub fn primary_keys(&self) -> Vec<&ColumnDef> {
        self.columns().iter().filter(|c| c.is_primary_key).collect()
    }

    /// Keys of the files this one references.
    pub fn dependencies(&self) -> Vec<&str> {
        self.columns()
            .iter()
            .filter_map(|c| c.reference.as_ref().map(|r| r.key.as_str()))
            .collect()
    }
}

impl DatasourceSchema {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| LoadError::Schema(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn source_path(&self) -> &str {
        match &self.file {
            FileSource::Zip(zip) => &zip.path,
            FileSource::Single(file) => &file.path,
        }
    }

    pub fn files(&self) -> &[SimpleFile] {
        match &self.file {
            FileSource::Zip(zip) => &zip.files,
            FileSource::Single(file) => std::slice::from_ref(file),
        }
    }

    pub fn file(&self, key: &str) -> Result<&SimpleFile> {
        self.files()
            .iter()
            .find(|f| f.key == key)
            .ok_or_else(|| LoadError::MissingFile {
                key: key.to_string(),
            })
    }

    pub fn relational_kinds(&self) -> impl Iterator<Item = &Kind> {
        self.common.iter().chain(self.relational_only.iter())
    }

    pub fn multimodel_kinds(&self) -> impl Iterator<Item = &Kind> {
        self.common.iter().chain(self.multimodel_only.iter())
    }

    /// Rejects inconsistent schemas before any data is read.
    pub fn validate(&self) -> Result<()> {
        let mut keys = FxHashSet::default();
        for file in self.files() {
            if !keys.insert(file.key.as_str()) {
                return Err(LoadError::Schema(format!(
                    "duplicate file key \"{}\"",
                    file.key
                )));
            }
        }

        for file in self.files() {
            self.validate_file(file)?;
        }

        for kind in &self.common {
            if !matches!(kind, Kind::Table(_)) {
                return Err(LoadError::Schema(format!(
                    "common kind \"{}\" must be a table, not a {}",
                    kind.key(),
                    kind.type_name()
                )));
            }
        }
        for kind in &self.relational_only {
            if matches!(kind, Kind::Graph(_) | Kind::Document(_)) {
                return Err(LoadError::Schema(format!(
                    "relational kind \"{}\" cannot be a {}",
                    kind.key(),
                    kind.type_name()
                )));
            }
        }
        for kind in self
            .common
            .iter()
            .chain(&self.relational_only)
            .chain(&self.multimodel_only)
        {
            self.validate_kind(kind)?;
        }

        check_unique_outputs("relational", self.relational_kinds())?;
        check_unique_outputs("multimodel", self.multimodel_kinds())?;
        Ok(())
    }

    fn validate_file(&self, file: &SimpleFile) -> Result<()> {
        let Some(options) = file.csv_options() else {
            return Ok(());
        };
        if options.separator.len() != 1 {
            return Err(LoadError::Schema(format!(
                "separator of \"{}\" must be a single byte, got {:?}",
                file.key, options.separator
            )));
        }
        if file.primary_keys().len() > 1 && options.id_separator.is_none() {
            return Err(LoadError::CompositeKeyWithoutSeparator {
                key: file.key.clone(),
            });
        }
        for column in file.columns() {
            let Some(reference) = &column.reference else {
                continue;
            };
            if column.column_type == ColumnType::Date {
                return Err(LoadError::Schema(format!(
                    "date column \"{}.{}\" cannot carry a reference",
                    file.key, column.name
                )));
            }
            self.file(&reference.key)?;
        }
        Ok(())
    }

    fn validate_kind(&self, kind: &Kind) -> Result<()> {
        match kind {
            Kind::Table(table) => {
                if !self.file(&table.key)?.is_csv() {
                    return Err(LoadError::NotATable {
                        key: table.key.clone(),
                    });
                }
            }
            Kind::Document(document) => {
                self.file(&document.key)?;
            }
            Kind::DocumentTables(tables) => {
                self.file(&tables.key)?;
                if !tables.root.from_parent.is_empty() {
                    return Err(LoadError::Schema(format!(
                        "root \"{}\" has no parent to copy columns from",
                        tables.root.name
                    )));
                }
            }
            Kind::Graph(graph) => {
                for edge in &graph.edges {
                    self.file(&edge.key)?;
                    for node in [&edge.from, &edge.to] {
                        if let Some(source) = &node.source {
                            self.file(&source.key)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_unique_outputs<'a>(view: &str, kinds: impl Iterator<Item = &'a Kind>) -> Result<()> {
    let mut seen = FxHashSet::default();
    for kind in kinds {
        for name in kind.output_names() {
            if !seen.insert(name) {
                return Err(LoadError::Schema(format!(
                    "\"{}\" is produced twice in the {} view",
                    name, view
                )));
            }
        }
    }
    Ok(())
}
