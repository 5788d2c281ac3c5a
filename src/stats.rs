use crate::models::{DatasourceData, KindData, ParsedFile};

/// Row counts of one output table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCount {
    pub name: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphCount {
    pub name: String,
    pub nodes: usize,
    pub edges: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentCount {
    pub name: String,
    /// Top-level records, or 1 for an XML document tree
    pub records: usize,
}

/// Sizes of everything a load produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub files: usize,
    pub relational: Vec<TableCount>,
    pub multimodel_tables: Vec<TableCount>,
    pub graphs: Vec<GraphCount>,
    pub documents: Vec<DocumentCount>,
}

impl LoadSummary {
    pub fn from_data(data: &DatasourceData) -> Self {
        let mut summary = Self {
            files: data.parsed.len(),
            relational: data
                .relational
                .iter()
                .map(|(name, rows)| TableCount {
                    name: name.clone(),
                    rows: rows.len(),
                })
                .collect(),
            ..Self::default()
        };

        for (name, kind) in &data.multimodel {
            match kind {
                KindData::Table(rows) => summary.multimodel_tables.push(TableCount {
                    name: name.clone(),
                    rows: rows.len(),
                }),
                KindData::Graph(graph) => summary.graphs.push(GraphCount {
                    name: name.clone(),
                    nodes: graph.node_count(),
                    edges: graph.edge_count(),
                }),
                KindData::Document(document) => summary.documents.push(DocumentCount {
                    name: name.clone(),
                    records: match &document.content {
                        ParsedFile::Records(records) => records.len(),
                        ParsedFile::Rows(rows) => rows.len(),
                        ParsedFile::Document(_) => 1,
                    },
                }),
            }
        }
        summary
    }

    pub fn relational_rows(&self) -> usize {
        self.relational.iter().map(|t| t.rows).sum()
    }

    pub fn multimodel_rows(&self) -> usize {
        self.multimodel_tables.iter().map(|t| t.rows).sum()
    }

    pub fn nodes(&self) -> usize {
        self.graphs.iter().map(|g| g.nodes).sum()
    }

    pub fn edges(&self) -> usize {
        self.graphs.iter().map(|g| g.edges).sum()
    }
}
