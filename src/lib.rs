//! spring3d - 3D force-directed layout of arbitrary undirected graphs.
//!
//! A background stepping loop moves nodes under degree-scaled repulsion and
//! spring attraction until the layout settles, while viewers poll the
//! current positions and can move the frame of reference to any node.

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod forces;
pub mod graph;
pub mod integrator;
pub mod server;
pub mod sources;
pub mod vector;

pub use config::{AppConfig, ServerConfig, SimulationParams, SourceConfig};
pub use controller::{Phase, SimulationController, SimulationStatus};
pub use error::{LayoutError, LayoutResult};
pub use graph::{GraphData, GraphStore, LayoutSnapshot, NodeId};
pub use vector::Vec3;
