//! Damped velocity integration, re-centering and the stop condition

use crate::config::SimulationParams;
use crate::error::{LayoutError, LayoutResult};
use crate::graph::GraphStore;
use crate::vector::Vec3;

/// Outcome of one committed step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Sum of absolute velocity components over all nodes
    pub movement: f64,
    /// Point subtracted from every position
    pub center: Vec3,
    /// Movement fell below the stabilization threshold
    pub stabilized: bool,
}

/// Next velocities and positions for every node, without touching the store
///
/// Fails on the first node whose velocity or position is not finite.
fn kinematics(
    store: &GraphStore,
    forces: &[Vec3],
    params: &SimulationParams,
) -> LayoutResult<(Vec<Vec3>, Vec<Vec3>, f64)> {
    if forces.len() != store.len() {
        return Err(LayoutError::StepComputationFailure(format!(
            "{} forces for {} nodes",
            forces.len(),
            store.len()
        )));
    }

    let mut positions = Vec::with_capacity(store.len());
    let mut velocities = Vec::with_capacity(store.len());
    let mut movement = 0.0;
    for (i, ((position, velocity), force)) in store
        .positions()
        .iter()
        .zip(store.velocities())
        .zip(forces)
        .enumerate()
    {
        let mut v = (*velocity + *force) * params.damping;
        let speed = v.norm();
        if speed > params.max_velocity {
            v = v * (params.max_velocity / speed);
        }
        let p = *position + v;
        if !v.is_finite() || !p.is_finite() {
            return Err(LayoutError::StepComputationFailure(format!(
                "node {} left finite space",
                store.ids()[i]
            )));
        }
        movement += v.l1();
        velocities.push(v);
        positions.push(p);
    }

    Ok((positions, velocities, movement))
}

/// Apply `forces` to the store's velocities and positions
///
/// Returns the aggregate movement of the step. On error the store keeps its
/// previous state.
pub fn integrate(
    store: &mut GraphStore,
    forces: &[Vec3],
    params: &SimulationParams,
) -> LayoutResult<f64> {
    let (positions, velocities, movement) = kinematics(store, forces, params)?;
    store.commit(positions, velocities);
    Ok(movement)
}

/// Geometric centroid, or the origin for an empty slice
pub fn centroid(positions: &[Vec3]) -> Vec3 {
    if positions.is_empty() {
        return Vec3::ZERO;
    }
    let sum = positions.iter().fold(Vec3::ZERO, |acc, &p| acc + p);
    sum * (1.0 / positions.len() as f64)
}

fn center_of(store: &GraphStore, positions: &[Vec3], target: Option<&str>) -> Vec3 {
    if let Some(id) = target {
        match store.index_of(id) {
            Some(i) => return positions[i],
            None => tracing::warn!(target_node = id, "center target missing, using centroid"),
        }
    }
    centroid(positions)
}

/// Reference point for re-centering
///
/// Uses the target node's current position when the target is still in the
/// graph, and falls back to the centroid otherwise.
pub fn resolve_center(store: &GraphStore, target: Option<&str>) -> Vec3 {
    center_of(store, store.positions(), target)
}

/// Translate every node by `-center` and clamp into the bounding box
pub fn recenter(store: &mut GraphStore, center: Vec3, max_position: f64) {
    for position in store.positions_mut() {
        *position = (*position - center).clamp_each(max_position);
    }
}

/// Integrate, re-center and evaluate the stop condition for one step
///
/// The step is staged outside the store and committed only when it
/// succeeds, so a failed step leaves the last good layout in place.
pub fn advance(
    store: &mut GraphStore,
    forces: &[Vec3],
    target: Option<&str>,
    params: &SimulationParams,
) -> LayoutResult<StepReport> {
    let (mut positions, velocities, movement) = kinematics(store, forces, params)?;

    let center = center_of(store, &positions, target);
    if !center.is_finite() {
        return Err(LayoutError::StepComputationFailure(
            "layout center left finite space".to_string(),
        ));
    }
    for position in &mut positions {
        *position = (*position - center).clamp_each(params.max_position);
    }
    store.commit(positions, velocities);

    Ok(StepReport {
        movement,
        center,
        stabilized: movement < params.stabilization_threshold,
    })
}
