//! Degree-weighted repulsion and spring attraction
//!
//! Pure functions over a read-only position slice and neighbor lists. Any
//! contiguous range of nodes can be evaluated independently, which is what
//! lets [`crate::dispatch`] split a step across workers.

use std::ops::Range;

use crate::config::SimulationParams;
use crate::vector::Vec3;

/// Added to every pairwise distance so coincident nodes never divide by zero
pub const DISTANCE_EPSILON: f64 = 0.01;

/// Repulsion multiplier for a node with `degree` incident edges
pub fn repulsion_scale(degree: usize, params: &SimulationParams) -> f64 {
    1.0 + params.degree_factor * degree as f64
}

/// Repulsion magnitude at (softened) distance `d`
///
/// Inside `min_distance` the force grows linearly as nodes approach instead
/// of following the inverse-square singularity.
pub fn repulsion_magnitude(d: f64, scale: f64, params: &SimulationParams) -> f64 {
    if d < params.min_distance {
        scale * params.repulsion_strength * (params.min_distance - d) / d
    } else {
        scale * params.repulsion_strength / (d * d)
    }
}

/// Hookean pull with no rest length
pub fn attraction_magnitude(d: f64, params: &SimulationParams) -> f64 {
    params.attraction_strength * d
}

/// Net force on every node in `range`
///
/// Repulsion is evaluated against all nodes in `positions`, attraction
/// against the node's neighbors. The result is indexed from `range.start`.
pub fn compute_forces(
    range: Range<usize>,
    positions: &[Vec3],
    neighbors: &[Vec<usize>],
    params: &SimulationParams,
) -> Vec<Vec3> {
    range
        .map(|u| net_force(u, positions, &neighbors[u], params))
        .collect()
}

fn net_force(u: usize, positions: &[Vec3], adjacent: &[usize], params: &SimulationParams) -> Vec3 {
    let origin = positions[u];
    let scale = repulsion_scale(adjacent.len(), params);
    let mut force = Vec3::ZERO;

    for (v, &other) in positions.iter().enumerate() {
        if v == u {
            continue;
        }
        let delta = other - origin;
        let d = delta.norm() + DISTANCE_EPSILON;
        let f = repulsion_magnitude(d, scale, params);
        force -= delta * (f / d);
    }

    for &v in adjacent {
        let delta = positions[v] - origin;
        let d = delta.norm() + DISTANCE_EPSILON;
        let f = attraction_magnitude(d, params);
        force += delta * (f / d);
    }

    force
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SimulationParams {
        SimulationParams {
            repulsion_strength: 100.0,
            attraction_strength: 0.1,
            min_distance: 5.0,
            degree_factor: 0.0,
            ..Default::default()
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * (1.0 + a.abs().max(b.abs()))
    }

    #[test]
    fn single_node_feels_no_force() {
        let forces = compute_forces(0..1, &[Vec3::new(3.0, 4.0, 5.0)], &[vec![]], &params());
        assert_eq!(forces, vec![Vec3::ZERO]);
    }

    #[test]
    fn inverse_square_repulsion_beyond_min_distance() {
        let p = params();
        let positions = [Vec3::ZERO, Vec3::new(20.0, 0.0, 0.0)];
        let forces = compute_forces(0..2, &positions, &[vec![], vec![]], &p);

        let d = 20.0 + DISTANCE_EPSILON;
        let expected = p.repulsion_strength / (d * d);
        // pushed away from the other node along -x, exactly opposite
        assert!(approx(forces[0].x, -expected * 20.0 / d));
        assert!(approx(forces[1].x, expected * 20.0 / d));
        assert_eq!(forces[0].y, 0.0);
        assert_eq!(forces[0].z, 0.0);
    }

    #[test]
    fn linear_repulsion_inside_min_distance() {
        let p = params();
        let d = 2.0 + DISTANCE_EPSILON;
        let magnitude = repulsion_magnitude(d, 1.0, &p);
        assert!(approx(magnitude, p.repulsion_strength * (5.0 - d) / d));

        // closer nodes repel harder
        assert!(repulsion_magnitude(1.0, 1.0, &p) > magnitude);
    }

    #[test]
    fn coincident_nodes_stay_finite() {
        let positions = [Vec3::new(1.0, 1.0, 1.0), Vec3::new(1.0, 1.0, 1.0)];
        let forces = compute_forces(0..2, &positions, &[vec![1], vec![0]], &params());
        assert!(forces.iter().all(|f| f.is_finite()));
    }

    #[test]
    fn attraction_pulls_neighbors_together() {
        let p = SimulationParams {
            repulsion_strength: 0.0,
            ..params()
        };
        let positions = [Vec3::ZERO, Vec3::new(0.0, 30.0, 0.0)];
        let forces = compute_forces(0..2, &positions, &[vec![1], vec![0]], &p);

        let d = 30.0 + DISTANCE_EPSILON;
        let expected = attraction_magnitude(d, &p) * 30.0 / d;
        assert!(approx(forces[0].y, expected));
        assert!(approx(forces[1].y, -expected));
    }

    #[test]
    fn repulsion_scales_with_degree() {
        let p = SimulationParams {
            attraction_strength: 0.0,
            degree_factor: 2.0,
            ..params()
        };
        assert_eq!(repulsion_scale(0, &p), 1.0);
        assert_eq!(repulsion_scale(3, &p), 7.0);

        // node 0 has two neighbors, node 3 none; both see node 1 at the same offset
        let positions = [
            Vec3::ZERO,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(1000.0, 1000.0, 1000.0),
            Vec3::new(20.0, 0.0, 0.0),
        ];
        let neighbors = [vec![1, 2], vec![0], vec![0], vec![]];
        let forces = compute_forces(0..4, &positions, &neighbors, &p);
        assert!(forces[0].x.abs() > forces[3].x.abs());
    }

    #[test]
    fn subset_matches_full_evaluation() {
        let p = params();
        let positions: Vec<Vec3> = (0..6)
            .map(|i| Vec3::new(i as f64 * 3.0, (i * i) as f64, -(i as f64)))
            .collect();
        let neighbors = vec![vec![1], vec![0, 2], vec![1], vec![4], vec![3], vec![]];

        let full = compute_forces(0..6, &positions, &neighbors, &p);
        let tail = compute_forces(2..5, &positions, &neighbors, &p);
        assert_eq!(tail, full[2..5]);
    }
}
