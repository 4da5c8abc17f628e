//! JSON node/edge files
//!
//! ```json
//! { "nodes": [{ "id": "a", "x": 1.0, "y": 0.0, "z": 0.0 }, { "id": "b" }],
//!   "edges": [{ "source": "a", "target": "b" }] }
//! ```
//!
//! Missing coordinates default to zero. Edges naming unknown nodes are
//! skipped.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{GraphSource, SourceResult};
use crate::graph::{GraphData, GraphStore};
use crate::vector::Vec3;

#[derive(Debug, Deserialize)]
struct FileGraph {
    #[serde(default)]
    nodes: Vec<FileNode>,
    #[serde(default)]
    edges: Vec<FileEdge>,
}

#[derive(Debug, Deserialize)]
struct FileNode {
    id: String,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    z: f64,
}

#[derive(Debug, Deserialize)]
struct FileEdge {
    source: String,
    target: String,
}

/// Graph read from a JSON file
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Parse graph JSON from a string
    pub fn parse(json: &str, max_position: f64) -> SourceResult<GraphData> {
        let file: FileGraph = serde_json::from_str(json)?;

        let mut store = GraphStore::new(max_position);
        for node in &file.nodes {
            store.add_node_at(&node.id, Vec3::new(node.x, node.y, node.z));
        }
        for edge in &file.edges {
            if !store.contains(&edge.source) || !store.contains(&edge.target) {
                tracing::warn!(
                    source = %edge.source,
                    target_node = %edge.target,
                    "skipping edge with unknown endpoint"
                );
                continue;
            }
            store.add_edge(&edge.source, &edge.target);
        }

        tracing::info!(
            nodes = store.len(),
            edges = store.edge_count(),
            "file graph loaded"
        );
        Ok(store.snapshot())
    }
}

impl GraphSource for FileSource {
    fn load(&self, max_position: f64) -> SourceResult<GraphData> {
        tracing::info!(path = %self.path.display(), "loading graph file");
        let json = std::fs::read_to_string(&self.path)?;
        Self::parse(&json, max_position)
    }

    fn kind(&self) -> &str {
        "file"
    }
}
