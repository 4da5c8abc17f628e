//! Simulation controller: lifecycle, background stepping loop and centering
//!
//! The controller owns the graph for the duration of a run. One background
//! thread performs every write to positions and velocities; callers on other
//! threads may read snapshots, query status, move the centering target and
//! start or stop the run.
//!
//! Locking:
//! - `graph` is a `RwLock`. A step copies positions under a read lock,
//!   evaluates forces with no lock held, then takes the write lock only for
//!   integration and re-centering. Snapshots take the read lock, so they
//!   always see a whole step.
//! - `center_target` has its own `Mutex` and is read once per step.
//! - `control` holds the phase and loop bookkeeping; `changed` is signalled
//!   on every phase change and when the loop exits.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::config::SimulationParams;
use crate::dispatch::ForceDispatcher;
use crate::error::{LayoutError, LayoutResult};
use crate::graph::{GraphData, GraphStore, LayoutSnapshot, NodeId};
use crate::integrator::{self, StepReport};

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Running,
    Stabilized,
    Stopped,
    Failed,
}

/// Point-in-time view of the controller for monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationStatus {
    pub phase: Phase,
    pub running: bool,
    pub steps: u64,
    pub last_movement: Option<f64>,
    pub center_target: Option<NodeId>,
    pub failure: Option<String>,
    pub nodes: usize,
    pub edges: usize,
}

#[derive(Debug)]
struct Control {
    phase: Phase,
    loop_active: bool,
    /// Thread of the current or most recent loop
    handle: Option<JoinHandle<()>>,
    failure: Option<String>,
    last_movement: Option<f64>,
}

struct Shared {
    params: SimulationParams,
    graph: RwLock<GraphStore>,
    center_target: Mutex<Option<NodeId>>,
    control: Mutex<Control>,
    changed: Condvar,
    steps: AtomicU64,
}

impl Shared {
    fn phase(&self) -> Phase {
        self.control.lock().phase
    }

    /// Move from `Running` to `next`; a concurrent stop wins
    fn finish_run(&self, next: Phase, failure: Option<String>) {
        let mut control = self.control.lock();
        if control.phase == Phase::Running {
            control.phase = next;
            control.failure = failure;
        }
        self.changed.notify_all();
    }

    fn step(&self, dispatcher: &ForceDispatcher) -> LayoutResult<StepReport> {
        let target = self.center_target.lock().clone();
        let frame = self.graph.read().frame();

        let forces = dispatcher.compute(&frame, &self.params)?;

        let mut graph = self.graph.write();
        if graph.len() != frame.len() {
            return Err(LayoutError::StepComputationFailure(
                "node set changed during a step".to_string(),
            ));
        }
        integrator::advance(&mut graph, &forces, target.as_deref(), &self.params)
    }
}

/// Marks the loop inactive when the stepping thread unwinds or returns
struct LoopGuard(Arc<Shared>);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        let mut control = self.0.control.lock();
        control.loop_active = false;
        if control.phase == Phase::Running {
            control.phase = Phase::Failed;
            control
                .failure
                .get_or_insert_with(|| "stepping loop exited unexpectedly".to_string());
        }
        self.0.changed.notify_all();
    }
}

fn run_loop(shared: Arc<Shared>, dispatcher: ForceDispatcher) {
    let _guard = LoopGuard(Arc::clone(&shared));
    // Declared after the guard so the pool is shut down before waiters are woken
    let dispatcher = dispatcher;
    let budget = shared.params.step_budget();

    tracing::info!(
        workers = dispatcher.workers(),
        nodes = shared.graph.read().len(),
        "simulation started"
    );

    while shared.phase() == Phase::Running {
        let started = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| shared.step(&dispatcher)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic in step".to_string());
                Err(LayoutError::StepComputationFailure(message))
            });

        let report = match outcome {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(error = %err, "simulation failed");
                shared.finish_run(Phase::Failed, Some(err.to_string()));
                break;
            }
        };

        let step = shared.steps.fetch_add(1, Ordering::Relaxed) + 1;
        shared.control.lock().last_movement = Some(report.movement);
        tracing::debug!(step, movement = report.movement, "simulation step");

        if report.stabilized {
            tracing::info!(step, movement = report.movement, "simulation stabilized");
            shared.finish_run(Phase::Stabilized, None);
            break;
        }

        let remaining = budget.saturating_sub(started.elapsed());
        if !remaining.is_zero() {
            let mut control = shared.control.lock();
            shared
                .changed
                .wait_while_for(&mut control, |c| c.phase == Phase::Running, remaining);
        }
    }
}

/// Owns the graph and drives the layout in a background thread
pub struct SimulationController {
    shared: Arc<Shared>,
}

impl SimulationController {
    /// Create an idle controller with an empty graph
    pub fn new(params: SimulationParams) -> LayoutResult<Self> {
        params.validate()?;
        let graph = GraphStore::new(params.max_position);
        Ok(Self {
            shared: Arc::new(Shared {
                params,
                graph: RwLock::new(graph),
                center_target: Mutex::new(None),
                control: Mutex::new(Control {
                    phase: Phase::Idle,
                    loop_active: false,
                    handle: None,
                    failure: None,
                    last_movement: None,
                }),
                changed: Condvar::new(),
                steps: AtomicU64::new(0),
            }),
        })
    }

    /// Create a controller and load `data` into it
    pub fn with_graph(params: SimulationParams, data: GraphData) -> LayoutResult<Self> {
        let controller = Self::new(params)?;
        controller.load(data)?;
        Ok(controller)
    }

    pub fn params(&self) -> &SimulationParams {
        &self.shared.params
    }

    /// Replace the graph; refused while a run is active
    pub fn load(&self, data: GraphData) -> LayoutResult<()> {
        let control = self.shared.control.lock();
        if control.loop_active {
            return Err(LayoutError::PreviousRunActive);
        }
        self.shared.graph.write().load(data)
    }

    /// Launch the stepping loop
    ///
    /// No-op while already running. An empty graph moves straight to
    /// `Stopped` without launching anything.
    pub fn start(&self) -> LayoutResult<()> {
        let mut control = self.shared.control.lock();
        if control.phase == Phase::Running {
            return Ok(());
        }
        if control.loop_active {
            return Err(LayoutError::PreviousRunActive);
        }

        *self.shared.center_target.lock() = None;
        control.failure = None;
        control.last_movement = None;
        self.shared.steps.store(0, Ordering::Relaxed);

        if self.shared.graph.read().is_empty() {
            tracing::info!("graph is empty, nothing to simulate");
            control.phase = Phase::Stopped;
            self.shared.changed.notify_all();
            return Ok(());
        }

        let dispatcher = ForceDispatcher::for_params(&self.shared.params)?;
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("layout-stepper".to_string())
            .spawn(move || run_loop(shared, dispatcher))?;

        control.phase = Phase::Running;
        control.loop_active = true;
        let previous = control.handle.replace(handle);
        self.shared.changed.notify_all();
        drop(control);

        // the previous loop already cleared `loop_active`, so this returns promptly
        if let Some(previous) = previous {
            let _ = previous.join();
        }
        Ok(())
    }

    /// Request a stop and wait up to `timeout` for the loop to exit
    ///
    /// Returns `false` if the loop was still active when the timeout
    /// elapsed; the request stays in effect and the loop exits at its next
    /// step boundary.
    pub fn stop(&self, timeout: Duration) -> bool {
        let mut control = self.shared.control.lock();
        if control.phase == Phase::Running {
            control.phase = Phase::Stopped;
            tracing::info!("simulation stop requested");
        }
        self.shared.changed.notify_all();

        self.shared
            .changed
            .wait_while_for(&mut control, |c| c.loop_active, timeout);
        if control.loop_active {
            tracing::warn!(?timeout, "stepping loop did not exit before timeout");
            return false;
        }
        // taken under the lock that saw the loop exit, never a newer run's thread
        let handle = control.handle.take();
        drop(control);

        if let Some(handle) = handle {
            let _ = handle.join();
        }
        true
    }

    /// Block until the loop is inactive or `timeout` elapses, returning the phase
    pub fn wait(&self, timeout: Duration) -> Phase {
        let mut control = self.shared.control.lock();
        self.shared
            .changed
            .wait_while_for(&mut control, |c| c.loop_active, timeout);
        control.phase
    }

    /// Set or clear the node used as the frame origin
    ///
    /// An unknown node is logged and ignored, keeping the previous target.
    /// Returns whether the target was applied.
    pub fn set_center_target(&self, target: Option<&str>) -> bool {
        if let Some(id) = target {
            if !self.shared.graph.read().contains(id) {
                let err = LayoutError::UnknownCenterTarget(id.to_string());
                tracing::warn!(error = %err, "ignoring center target");
                return false;
            }
        }
        let mut current = self.shared.center_target.lock();
        *current = target.map(str::to_string);
        tracing::info!(target_node = ?*current, "center target updated");
        true
    }

    pub fn center_target(&self) -> Option<NodeId> {
        self.shared.center_target.lock().clone()
    }

    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    pub fn steps(&self) -> u64 {
        self.shared.steps.load(Ordering::Relaxed)
    }

    /// Message of the failure that ended the last run, if any
    pub fn failure(&self) -> Option<String> {
        self.shared.control.lock().failure.clone()
    }

    /// Adjacency, positions and velocities as of the last completed step
    pub fn snapshot(&self) -> GraphData {
        self.shared.graph.read().snapshot()
    }

    /// Node positions and de-duplicated edges as of the last completed step
    pub fn layout(&self) -> LayoutSnapshot {
        self.shared.graph.read().layout()
    }

    pub fn status(&self) -> SimulationStatus {
        let (phase, failure, last_movement) = {
            let control = self.shared.control.lock();
            (
                control.phase,
                control.failure.clone(),
                control.last_movement,
            )
        };
        let (nodes, edges) = {
            let graph = self.shared.graph.read();
            (graph.len(), graph.edge_count())
        };
        SimulationStatus {
            phase,
            running: phase == Phase::Running,
            steps: self.steps(),
            last_movement,
            center_target: self.center_target(),
            failure,
            nodes,
            edges,
        }
    }
}

impl Drop for SimulationController {
    fn drop(&mut self) {
        let mut control = self.shared.control.lock();
        if control.phase == Phase::Running {
            control.phase = Phase::Stopped;
        }
        self.shared.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Vec3;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn quick_params() -> SimulationParams {
        SimulationParams {
            repulsion_strength: 100.0,
            attraction_strength: 0.1,
            min_distance: 1.0,
            degree_factor: 0.0,
            damping: 0.5,
            stabilization_threshold: 0.01,
            step_budget_ms: 0,
            worker_count: 2,
            ..Default::default()
        }
    }

    fn triangle() -> GraphData {
        let mut data = GraphData::default();
        let ids = ["a", "b", "c"];
        for (i, id) in ids.iter().enumerate() {
            let others = ids.iter().filter(|o| *o != id).map(|o| o.to_string());
            data.adjacency.insert(id.to_string(), others.collect());
            data.positions.insert(id.to_string(), Vec3::new(i as f64 * 100.0, 0.0, 0.0));
            data.velocities.insert(id.to_string(), Vec3::ZERO);
        }
        data
    }

    #[test]
    fn starts_idle() {
        let controller = SimulationController::new(quick_params()).unwrap();
        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(controller.center_target(), None);
        assert!(!controller.is_running());
    }

    #[test]
    fn rejects_invalid_params() {
        let params = SimulationParams {
            damping: 0.0,
            ..Default::default()
        };
        assert!(SimulationController::new(params).is_err());
    }

    #[test]
    fn empty_graph_stops_immediately() {
        let controller = SimulationController::new(quick_params()).unwrap();
        controller.start().unwrap();

        assert_eq!(controller.phase(), Phase::Stopped);
        assert_eq!(controller.steps(), 0);
        assert!(controller.stop(Duration::from_millis(10)));
    }

    #[test]
    fn unknown_target_is_ignored() {
        let controller = SimulationController::with_graph(quick_params(), triangle()).unwrap();
        assert!(controller.set_center_target(Some("a")));

        assert!(!controller.set_center_target(Some("does-not-exist")));
        assert_eq!(controller.center_target(), Some("a".to_string()));

        assert!(controller.set_center_target(None));
        assert_eq!(controller.center_target(), None);
    }

    #[test]
    fn start_resets_center_target() {
        let controller = SimulationController::with_graph(quick_params(), triangle()).unwrap();
        controller.set_center_target(Some("b"));
        controller.start().unwrap();
        assert_eq!(controller.center_target(), None);
        controller.stop(TIMEOUT);
    }

    #[test]
    fn stop_halts_a_long_run() {
        let params = SimulationParams {
            stabilization_threshold: 0.0,
            step_budget_ms: 1,
            ..quick_params()
        };
        let controller = SimulationController::with_graph(params, triangle()).unwrap();
        controller.start().unwrap();
        assert!(controller.is_running());

        // starting twice is a no-op
        controller.start().unwrap();

        assert!(controller.stop(TIMEOUT));
        assert_eq!(controller.phase(), Phase::Stopped);

        let steps = controller.steps();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(controller.steps(), steps, "no steps after stop");
    }

    #[test]
    fn run_stabilizes_and_keeps_bounds() {
        let controller = SimulationController::with_graph(quick_params(), triangle()).unwrap();
        controller.start().unwrap();

        assert_eq!(controller.wait(TIMEOUT), Phase::Stabilized);
        let status = controller.status();
        assert!(!status.running);
        assert!(status.steps > 0);
        assert!(status.last_movement.unwrap() < 0.01);

        let max = controller.params().max_position;
        let data = controller.snapshot();
        for (id, v) in &data.velocities {
            assert!(v.norm() <= controller.params().max_velocity + 1e-9, "{id}");
        }
        for p in data.positions.values() {
            for c in [p.x, p.y, p.z] {
                assert!(c.abs() <= max);
            }
        }
    }

    #[test]
    fn restart_after_stabilization() {
        let controller = SimulationController::with_graph(quick_params(), triangle()).unwrap();
        controller.start().unwrap();
        assert_eq!(controller.wait(TIMEOUT), Phase::Stabilized);

        controller.start().unwrap();
        let phase = controller.wait(TIMEOUT);
        assert_eq!(phase, Phase::Stabilized);
    }

    #[test]
    fn load_is_refused_while_running() {
        let params = SimulationParams {
            stabilization_threshold: 0.0,
            ..quick_params()
        };
        let controller = SimulationController::with_graph(params, triangle()).unwrap();
        controller.start().unwrap();
        assert!(matches!(
            controller.load(triangle()),
            Err(LayoutError::PreviousRunActive)
        ));
        controller.stop(TIMEOUT);
        assert!(controller.load(triangle()).is_ok());
    }

    #[test]
    fn non_finite_step_fails_the_run_and_keeps_last_layout() {
        let mut data = GraphData::default();
        for (id, x) in [("a", -1.0e308), ("b", 1.0e308)] {
            data.adjacency.insert(id.to_string(), Vec::new());
            data.positions.insert(id.to_string(), Vec3::new(x, 0.0, 0.0));
            data.velocities.insert(id.to_string(), Vec3::ZERO);
        }
        let params = SimulationParams {
            step_budget_ms: 0,
            ..Default::default()
        };
        let controller = SimulationController::with_graph(params, data.clone()).unwrap();
        controller.start().unwrap();

        assert_eq!(controller.wait(TIMEOUT), Phase::Failed);
        assert!(!controller.is_running());
        assert_eq!(controller.steps(), 0);

        let failure = controller.failure().unwrap();
        assert!(failure.contains("finite"), "{failure}");
        let status = controller.status();
        assert!(!status.running);
        assert_eq!(status.failure, Some(failure));

        assert_eq!(controller.snapshot(), data);
        let json = serde_json::to_string(&controller.layout()).unwrap();
        assert!(!json.contains("null"), "{json}");

        // a failed run is restartable by an explicit start
        assert!(controller.stop(TIMEOUT));
        controller.start().unwrap();
        assert_eq!(controller.wait(TIMEOUT), Phase::Failed);
    }

    #[test]
    fn stop_timeout_is_reported_and_blocks_restart() {
        let params = SimulationParams {
            stabilization_threshold: 0.0,
            ..quick_params()
        };
        let controller = SimulationController::with_graph(params, triangle()).unwrap();
        controller.start().unwrap();

        // park the loop inside a step by holding the graph
        let graph = controller.shared.graph.write();
        std::thread::sleep(Duration::from_millis(50));

        assert!(!controller.stop(Duration::from_millis(50)));
        assert_eq!(controller.phase(), Phase::Stopped);
        assert!(matches!(controller.start(), Err(LayoutError::PreviousRunActive)));

        drop(graph);
        assert_eq!(controller.wait(TIMEOUT), Phase::Stopped);
        assert!(controller.stop(TIMEOUT));

        controller.start().unwrap();
        assert!(controller.is_running());
        assert!(controller.stop(TIMEOUT));
    }

    #[test]
    fn concurrent_start_and_stop_keep_stop_bounded() {
        let params = SimulationParams {
            stabilization_threshold: 0.0,
            ..quick_params()
        };
        let controller = SimulationController::with_graph(params, triangle()).unwrap();
        let controller = Arc::new(controller);
        let timeout = Duration::from_millis(200);

        let starter = {
            let controller = Arc::clone(&controller);
            std::thread::spawn(move || {
                for _ in 0..500 {
                    // PreviousRunActive is expected while a stop is in flight
                    let _ = controller.start();
                }
            })
        };

        for _ in 0..500 {
            let started = Instant::now();
            controller.stop(timeout);
            let elapsed = started.elapsed();
            assert!(elapsed < Duration::from_secs(2), "stop took {elapsed:?}");
        }

        starter.join().unwrap();
        assert!(controller.stop(TIMEOUT));
        assert!(!controller.is_running());
    }

    #[test]
    fn status_serializes_phase_in_snake_case() {
        let controller = SimulationController::new(quick_params()).unwrap();
        let json = serde_json::to_value(controller.status()).unwrap();
        assert_eq!(json["phase"], "idle");
        assert_eq!(json["nodes"], 0);
    }
}
