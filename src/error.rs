//! Error taxonomy for the layout engine

use thiserror::Error;

/// Errors raised by the graph store, the force pipeline and the controller
#[derive(Error, Debug)]
pub enum LayoutError {
    /// Adjacency, position and velocity maps disagree, or adjacency breaks
    /// the undirected simple graph invariants
    #[error("inconsistent graph data: {0}")]
    InconsistentGraphData(String),

    /// A center target names a node that is not in the graph
    #[error("unknown center target: {0}")]
    UnknownCenterTarget(String),

    /// Dispatch, reduction or integration failed inside one step
    #[error("step computation failed: {0}")]
    StepComputationFailure(String),

    /// A simulation parameter is out of range
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The force worker pool could not be built
    #[error("worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// The stepping thread could not be spawned
    #[error("failed to spawn stepping loop: {0}")]
    Spawn(#[from] std::io::Error),

    /// A previous stepping loop has not exited yet
    #[error("previous run has not exited yet")]
    PreviousRunActive,
}

/// Result type for layout operations
pub type LayoutResult<T> = Result<T, LayoutError>;
