//! Graph store: nodes, undirected adjacency, positions and velocities
//!
//! The store keeps nodes in a dense index so the force pipeline can work on
//! slices. Map-shaped [`GraphData`] is the exchange form used at the
//! ingestion boundary, and [`LayoutSnapshot`] is the form served to viewers.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};
use crate::vector::Vec3;

/// Opaque, unique node key
pub type NodeId = String;

/// Map-shaped graph contents as produced by a source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub adjacency: BTreeMap<NodeId, Vec<NodeId>>,
    pub positions: BTreeMap<NodeId, Vec3>,
    pub velocities: BTreeMap<NodeId, Vec3>,
}

impl GraphData {
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Undirected edge count, assuming symmetric adjacency
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum::<usize>() / 2
    }
}

/// A node with its current position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// An undirected edge reported once, with `source < target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRef {
    pub source: NodeId,
    pub target: NodeId,
}

/// Current layout for rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    pub nodes: Vec<NodePosition>,
    pub edges: Vec<EdgeRef>,
}

/// Read-only input of one force evaluation
///
/// Positions are copied; the neighbor lists are shared with the store since
/// topology does not change while a run is active.
#[derive(Debug, Clone)]
pub struct ForceFrame {
    pub positions: Vec<Vec3>,
    pub neighbors: Arc<Vec<Vec<usize>>>,
}

impl ForceFrame {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Owner of the graph and its kinematic state
#[derive(Debug, Clone)]
pub struct GraphStore {
    max_position: f64,
    ids: Vec<NodeId>,
    index: HashMap<NodeId, usize>,
    neighbors: Arc<Vec<Vec<usize>>>,
    positions: Vec<Vec3>,
    velocities: Vec<Vec3>,
}

impl GraphStore {
    /// Create an empty store; new nodes are placed inside `[-max_position, max_position]^3`
    pub fn new(max_position: f64) -> Self {
        Self {
            max_position,
            ids: Vec::new(),
            index: HashMap::new(),
            neighbors: Arc::new(Vec::new()),
            positions: Vec::new(),
            velocities: Vec::new(),
        }
    }

    /// Replace the store's contents
    ///
    /// The three maps must share one key set and the adjacency must describe
    /// an undirected simple graph. On error the store is left untouched.
    pub fn load(&mut self, data: GraphData) -> LayoutResult<()> {
        let GraphData {
            adjacency,
            positions,
            velocities,
        } = data;

        if !adjacency.keys().eq(positions.keys()) {
            return Err(LayoutError::InconsistentGraphData(
                "adjacency and position keys differ".to_string(),
            ));
        }
        if !adjacency.keys().eq(velocities.keys()) {
            return Err(LayoutError::InconsistentGraphData(
                "adjacency and velocity keys differ".to_string(),
            ));
        }

        let ids: Vec<NodeId> = adjacency.keys().cloned().collect();
        let index: HashMap<NodeId, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut neighbors = Vec::with_capacity(ids.len());
        for (source, targets) in &adjacency {
            let mut seen = HashSet::with_capacity(targets.len());
            let mut list = Vec::with_capacity(targets.len());
            for target in targets {
                if target == source {
                    return Err(LayoutError::InconsistentGraphData(format!(
                        "self-loop on {source}"
                    )));
                }
                let Some(&j) = index.get(target) else {
                    return Err(LayoutError::InconsistentGraphData(format!(
                        "{source} lists unknown neighbor {target}"
                    )));
                };
                if !seen.insert(j) {
                    return Err(LayoutError::InconsistentGraphData(format!(
                        "{source} lists {target} twice"
                    )));
                }
                if !adjacency[target].contains(source) {
                    return Err(LayoutError::InconsistentGraphData(format!(
                        "edge {source} -> {target} has no reverse entry"
                    )));
                }
                list.push(j);
            }
            neighbors.push(list);
        }

        self.positions = positions.into_values().collect();
        self.velocities = velocities.into_values().collect();
        self.neighbors = Arc::new(neighbors);
        self.index = index;
        self.ids = ids;

        tracing::info!(
            nodes = self.len(),
            edges = self.edge_count(),
            "graph loaded"
        );
        Ok(())
    }

    /// Insert a node at a uniformly random position with zero velocity
    ///
    /// Returns `false` if the node already exists.
    pub fn add_node(&mut self, id: &str) -> bool {
        self.add_node_with(id, &mut rand::thread_rng())
    }

    /// Like [`add_node`](Self::add_node) with a caller-supplied generator
    pub fn add_node_with<R: Rng + ?Sized>(&mut self, id: &str, rng: &mut R) -> bool {
        let m = self.max_position;
        let position = Vec3::new(
            rng.gen_range(-m..=m),
            rng.gen_range(-m..=m),
            rng.gen_range(-m..=m),
        );
        self.add_node_at(id, position)
    }

    /// Insert a node at a given position with zero velocity
    pub fn add_node_at(&mut self, id: &str, position: Vec3) -> bool {
        if self.index.contains_key(id) {
            return false;
        }
        self.index.insert(id.to_string(), self.ids.len());
        self.ids.push(id.to_string());
        Arc::make_mut(&mut self.neighbors).push(Vec::new());
        self.positions.push(position);
        self.velocities.push(Vec3::ZERO);
        true
    }

    /// Insert the undirected edge `a - b`
    ///
    /// Returns `false` without mutating when either node is missing, when
    /// `a == b`, or when the edge already exists.
    pub fn add_edge(&mut self, a: &str, b: &str) -> bool {
        if a == b {
            return false;
        }
        let (Some(&i), Some(&j)) = (self.index.get(a), self.index.get(b)) else {
            return false;
        };
        if self.neighbors[i].contains(&j) {
            return false;
        }
        let neighbors = Arc::make_mut(&mut self.neighbors);
        neighbors[i].push(j);
        neighbors[j].push(i);
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.neighbors.iter().map(Vec::len).sum::<usize>() / 2
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn degree(&self, id: &str) -> Option<usize> {
        self.index_of(id).map(|i| self.neighbors[i].len())
    }

    pub fn neighbors_of(&self, id: &str) -> Option<Vec<&str>> {
        self.index_of(id).map(|i| {
            self.neighbors[i]
                .iter()
                .map(|&j| self.ids[j].as_str())
                .collect()
        })
    }

    pub fn position(&self, id: &str) -> Option<Vec3> {
        self.index_of(id).map(|i| self.positions[i])
    }

    pub fn velocity(&self, id: &str) -> Option<Vec3> {
        self.index_of(id).map(|i| self.velocities[i])
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }

    /// Replace positions and velocities with the outcome of a completed step
    pub(crate) fn commit(&mut self, positions: Vec<Vec3>, velocities: Vec<Vec3>) {
        debug_assert_eq!(positions.len(), self.ids.len());
        debug_assert_eq!(velocities.len(), self.ids.len());
        self.positions = positions;
        self.velocities = velocities;
    }

    pub(crate) fn positions_mut(&mut self) -> &mut [Vec3] {
        &mut self.positions
    }

    /// Capture the input of one force evaluation
    pub fn frame(&self) -> ForceFrame {
        ForceFrame {
            positions: self.positions.clone(),
            neighbors: Arc::clone(&self.neighbors),
        }
    }

    /// Copy of adjacency, positions and velocities in map form
    pub fn snapshot(&self) -> GraphData {
        let mut data = GraphData::default();
        for (i, id) in self.ids.iter().enumerate() {
            let targets = self.neighbors[i]
                .iter()
                .map(|&j| self.ids[j].clone())
                .collect();
            data.adjacency.insert(id.clone(), targets);
            data.positions.insert(id.clone(), self.positions[i]);
            data.velocities.insert(id.clone(), self.velocities[i]);
        }
        data
    }

    /// Each undirected edge once, ordered by `(source, target)`
    pub fn edges(&self) -> Vec<EdgeRef> {
        let mut edges: Vec<EdgeRef> = self
            .neighbors
            .iter()
            .enumerate()
            .flat_map(|(i, targets)| targets.iter().map(move |&j| (i, j)))
            .filter(|&(i, j)| self.ids[i] < self.ids[j])
            .map(|(i, j)| EdgeRef {
                source: self.ids[i].clone(),
                target: self.ids[j].clone(),
            })
            .collect();
        edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        edges
    }

    /// Node positions and de-duplicated edges for rendering
    pub fn layout(&self) -> LayoutSnapshot {
        let mut nodes: Vec<NodePosition> = self
            .ids
            .iter()
            .zip(&self.positions)
            .map(|(id, p)| NodePosition {
                id: id.clone(),
                x: p.x,
                y: p.y,
                z: p.z,
            })
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        LayoutSnapshot {
            nodes,
            edges: self.edges(),
        }
    }
}
