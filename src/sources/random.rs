//! Uniformly random graphs

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{GraphSource, SourceResult};
use crate::graph::{GraphData, GraphStore};

/// Random graph with `node_count` nodes named `node_<i>` and up to
/// `edge_count` distinct edges
#[derive(Debug, Clone)]
pub struct RandomSource {
    pub node_count: usize,
    pub edge_count: usize,
    /// Fixed seed for reproducible graphs
    pub seed: Option<u64>,
}

impl RandomSource {
    /// Edges actually produced: the request capped at a complete graph
    pub fn reachable_edges(&self) -> usize {
        let n = self.node_count;
        self.edge_count.min(n * n.saturating_sub(1) / 2)
    }
}

impl GraphSource for RandomSource {
    fn load(&self, max_position: f64) -> SourceResult<GraphData> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut store = GraphStore::new(max_position);
        for i in 0..self.node_count {
            store.add_node_with(&format!("node_{i}"), &mut rng);
        }

        let ids = store.ids().to_vec();
        let wanted = self.reachable_edges();
        let mut added = 0;
        while added < wanted {
            let a = &ids[rng.gen_range(0..ids.len())];
            let b = &ids[rng.gen_range(0..ids.len())];
            if store.add_edge(a, b) {
                added += 1;
            }
        }

        tracing::info!(nodes = store.len(), edges = added, "random graph generated");
        Ok(store.snapshot())
    }

    fn kind(&self) -> &str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(node_count: usize, edge_count: usize) -> RandomSource {
        RandomSource {
            node_count,
            edge_count,
            seed: Some(42),
        }
    }

    #[test]
    fn produces_requested_nodes_and_edges() {
        let data = source(10, 20).load(1024.0).unwrap();
        assert_eq!(data.node_count(), 10);
        assert_eq!(data.edge_count(), 20);
        assert!(data.adjacency.contains_key("node_0"));
        assert!(data.adjacency.contains_key("node_9"));
    }

    #[test]
    fn edge_count_is_capped_at_complete_graph() {
        let src = source(4, 100);
        assert_eq!(src.reachable_edges(), 6);

        let data = src.load(10.0).unwrap();
        assert_eq!(data.edge_count(), 6);
        for neighbors in data.adjacency.values() {
            assert_eq!(neighbors.len(), 3);
        }
    }

    #[test]
    fn degenerate_sizes() {
        assert_eq!(source(0, 5).load(10.0).unwrap().node_count(), 0);

        let single = source(1, 5).load(10.0).unwrap();
        assert_eq!(single.node_count(), 1);
        assert_eq!(single.edge_count(), 0);
    }

    #[test]
    fn positions_within_bounds_and_velocities_zero() {
        let data = source(50, 0).load(16.0).unwrap();
        for p in data.positions.values() {
            assert!(p.x.abs() <= 16.0 && p.y.abs() <= 16.0 && p.z.abs() <= 16.0);
        }
        assert!(data.velocities.values().all(|v| v.norm() == 0.0));
    }

    #[test]
    fn same_seed_same_graph() {
        let a = source(12, 15).load(100.0).unwrap();
        let b = source(12, 15).load(100.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn adjacency_is_symmetric_without_self_loops() {
        let data = source(15, 40).load(100.0).unwrap();
        for (node, neighbors) in &data.adjacency {
            for other in neighbors {
                assert_ne!(node, other);
                assert!(data.adjacency[other].contains(node));
            }
        }
    }
}
