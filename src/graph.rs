//! Property graph assembled from edge tables.

use crate::error::{LoadError, Result};
use crate::models::{ParsedFileData, Row, Value};
use crate::schema::{EdgeSchema, GraphKind, NodeSchema, NodeSource};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// Graph-wide identifier: the label followed by the raw id.
    pub key: String,
    pub labels: Vec<String>,
    pub attributes: Row,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    /// Key of the edge schema that produced this edge.
    pub kind: String,
    pub props: Row,
}

/// Directed multigraph; parallel edges between the same pair are kept.
#[derive(Debug, Clone, Default)]
pub struct PropertyGraph {
    nodes: Vec<Node>,
    node_index: FxHashMap<String, usize>,
    edges: Vec<Edge>,
}

impl PropertyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, key: &str) -> Option<&Node> {
        self.node_index.get(key).map(|&i| &self.nodes[i])
    }

    pub fn has_node(&self, key: &str) -> bool {
        self.node_index.contains_key(key)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges_between<'a>(&'a self, source: &'a str, target: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges
            .iter()
            .filter(move |e| e.source == source && e.target == target)
    }

    /// Adds the node, or only records `label` on it if it already exists.
    fn merge_node(&mut self, key: String, label: &str, attributes: impl FnOnce() -> Row) {
        if let Some(&i) = self.node_index.get(&key) {
            let labels = &mut self.nodes[i].labels;
            if !labels.iter().any(|l| l == label) {
                labels.push(label.to_string());
            }
            return;
        }
        self.node_index.insert(key.clone(), self.nodes.len());
        self.nodes.push(Node {
            key,
            labels: vec![label.to_string()],
            attributes: attributes(),
        });
    }

    fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }
}

type TableIndex<'a> = FxHashMap<String, &'a Row>;

/// Row indexes by (table, id column), built on first use and shared by every
/// edge schema of one graph build.
#[derive(Default)]
pub struct IndexCache<'a> {
    indexes: FxHashMap<(&'a str, &'a str), TableIndex<'a>>,
}

impl<'a> IndexCache<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(&mut self, parsed: &'a ParsedFileData, source: &'a NodeSource) -> Result<&TableIndex<'a>> {
        let cache_key = (source.key.as_str(), source.column.as_str());
        if !self.indexes.contains_key(&cache_key) {
            let rows = parsed
                .get(&source.key)
                .ok_or_else(|| LoadError::MissingFile {
                    key: source.key.clone(),
                })?
                .rows()
                .ok_or_else(|| LoadError::NotATable {
                    key: source.key.clone(),
                })?;
            let index: TableIndex = rows
                .iter()
                .filter_map(|row| {
                    let id = row.get(&source.column)?;
                    (!id.is_null()).then(|| (id.key_string(), row))
                })
                .collect();
            debug!(key = %source.key, column = %source.column, entries = index.len(), "Indexed node source");
            self.indexes.insert(cache_key, index);
        }
        Ok(&self.indexes[&cache_key])
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

/// Builds the graph described by `kind` from filtered edge and node tables.
pub fn build_graph(parsed: &ParsedFileData, kind: &GraphKind) -> Result<PropertyGraph> {
    let mut graph = PropertyGraph::new();
    let mut cache = IndexCache::new();
    for edge in &kind.edges {
        add_edges(&mut graph, &mut cache, parsed, edge)?;
    }
    info!(
        graph = %kind.key,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "Built graph"
    );
    Ok(graph)
}

fn add_edges<'a>(
    graph: &mut PropertyGraph,
    cache: &mut IndexCache<'a>,
    parsed: &'a ParsedFileData,
    edge: &'a EdgeSchema,
) -> Result<()> {
    let rows = parsed
        .get(&edge.key)
        .ok_or_else(|| LoadError::MissingFile {
            key: edge.key.clone(),
        })?
        .rows()
        .ok_or_else(|| LoadError::NotATable {
            key: edge.key.clone(),
        })?;

    let mut skipped = 0usize;
    for row in rows {
        let (Some(from), Some(to)) = (endpoint_id(row, &edge.from), endpoint_id(row, &edge.to)) else {
            skipped += 1;
            continue;
        };

        let source = add_endpoint(graph, cache, parsed, &edge.from, from)?;
        let target = add_endpoint(graph, cache, parsed, &edge.to, to)?;

        let props = edge
            .props
            .iter()
            .map(|p| (p.clone(), row.get(p).cloned().unwrap_or(Value::Null)))
            .collect();
        graph.add_edge(Edge {
            source,
            target,
            kind: edge.key.clone(),
            props,
        });
    }

    if skipped > 0 {
        warn!(key = %edge.key, skipped, "Skipped edge rows with a null endpoint");
    }
    Ok(())
}

fn endpoint_id<'r>(row: &'r Row, node: &NodeSchema) -> Option<&'r Value> {
    row.get(&node.id_column).filter(|v| !v.is_null())
}

fn add_endpoint<'a>(
    graph: &mut PropertyGraph,
    cache: &mut IndexCache<'a>,
    parsed: &'a ParsedFileData,
    node: &'a NodeSchema,
    id: &Value,
) -> Result<String> {
    let raw = id.key_string();
    let key = format!("{}{}", node.label, raw);
    if graph.has_node(&key) {
        graph.merge_node(key.clone(), &node.label, Row::new);
        return Ok(key);
    }

    let indexed = match &node.source {
        Some(source) => cache.resolve(parsed, source)?.get(&raw).copied(),
        None => None,
    };
    graph.merge_node(key.clone(), &node.label, || match indexed {
        Some(row) => row.clone(),
        None => Row::from([("id".to_string(), id.clone())]),
    });
    Ok(key)
}
