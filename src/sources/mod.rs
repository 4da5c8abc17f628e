//! Graph sources for the ingestion boundary
//!
//! A source produces the initial [`GraphData`] (adjacency, positions,
//! velocities) that the controller loads. The engine does not care how the
//! data was obtained.

use thiserror::Error;

use crate::config::SourceConfig;
use crate::error::LayoutError;
use crate::graph::GraphData;

mod file;
mod random;
mod text;

pub use file::FileSource;
pub use random::RandomSource;
pub use text::{TextSource, tokenize};

/// Errors that can occur while producing a graph
#[derive(Error, Debug)]
pub enum SourceError {
    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input was not valid graph JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input held nothing to build a graph from
    #[error("no usable data: {0}")]
    Empty(String),

    /// The produced graph violated a store invariant
    #[error(transparent)]
    Graph(#[from] LayoutError),
}

/// Result type for source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// A producer of initial graph data
pub trait GraphSource {
    /// Build the graph; random placement stays inside `[-max_position, max_position]^3`
    fn load(&self, max_position: f64) -> SourceResult<GraphData>;

    /// Identifier of this source kind (e.g. "random", "file")
    fn kind(&self) -> &str;
}

/// Instantiate the source described by `config`
pub fn from_config(config: &SourceConfig) -> Box<dyn GraphSource> {
    match config {
        SourceConfig::Random {
            node_count,
            edge_count,
            seed,
        } => Box::new(RandomSource {
            node_count: *node_count,
            edge_count: *edge_count,
            seed: *seed,
        }),
        SourceConfig::File { path } => Box::new(FileSource::new(path)),
        SourceConfig::Text {
            path,
            max_unique_words,
        } => Box::new(TextSource::new(path, *max_unique_words)),
    }
}
