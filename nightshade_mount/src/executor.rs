//! Axis pulse executors
//!
//! An executor performs the physical (or simulated) motion for one pulse. It
//! must honour the cancellation token cooperatively: polling it at least once
//! per sub-second increment and stopping the axis when it fires.

use crate::config::PulseGuideConfig;
use crate::error::{MountError, MountResult};
use crate::providers::{PositionProvider, SiderealTimeSource};
use crate::types::{Axis, MountType, PierSide};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a pulse ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PulseOutcome {
    /// Ran for the full duration
    Completed,
    /// Stopped early by cancellation
    Cancelled,
    /// Too small to move the axis; the executor was never called
    Rejected,
}

/// Drives one axis at a rate for a duration
#[async_trait]
pub trait AxisPulseExecutor: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Move `axis` at `rate` degrees/sec for `duration`, stopping early on cancellation
    async fn pulse(
        &self,
        axis: Axis,
        rate: f64,
        duration: Duration,
        cancel: CancellationToken,
    ) -> MountResult<PulseOutcome>;
}

pub type SharedExecutor = Arc<dyn AxisPulseExecutor>;

/// Executors by mount type
#[derive(Clone, Default)]
pub struct MountExecutors {
    executors: HashMap<MountType, SharedExecutor>,
}

impl MountExecutors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, mount_type: MountType, executor: SharedExecutor) -> Self {
        self.register(mount_type, executor);
        self
    }

    pub fn register(&mut self, mount_type: MountType, executor: SharedExecutor) {
        tracing::debug!("Registered {} executor for {} mounts", executor.name(), mount_type);
        self.executors.insert(mount_type, executor);
    }

    pub fn supports(&self, mount_type: MountType) -> bool {
        self.executors.contains_key(&mount_type)
    }

    /// Executor for a mount type. Mount types without one fail fast.
    pub fn get(&self, mount_type: MountType) -> MountResult<SharedExecutor> {
        self.executors
            .get(&mount_type)
            .cloned()
            .ok_or_else(|| MountError::NotImplemented {
                mount_type,
                operation: "pulse guide".to_string(),
            })
    }
}

impl std::fmt::Debug for MountExecutors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self
            .executors
            .iter()
            .map(|(t, e)| format!("{}={}", t, e.name()))
            .collect();
        names.sort();
        f.debug_struct("MountExecutors").field("executors", &names).finish()
    }
}

// =============================================================================
// SIMULATOR
// =============================================================================

#[derive(Debug)]
struct SimulatorState {
    axes: [f64; 2],
    moving: [bool; 2],
    side_of_pier: PierSide,
    sidereal_time: Option<f64>,
    southern_hemisphere: bool,
    completed_pulses: u64,
}

/// In-memory mount. Integrates rate over time into axis positions and
/// reports them back as a live position source.
#[derive(Debug)]
pub struct SimulatorMount {
    state: Mutex<SimulatorState>,
    step: Duration,
}

impl SimulatorMount {
    /// `step` is the motion increment between cancellation checks
    pub fn new(step: Duration) -> Self {
        Self {
            state: Mutex::new(SimulatorState {
                axes: [0.0, 0.0],
                moving: [false, false],
                side_of_pier: PierSide::East,
                sidereal_time: None,
                southern_hemisphere: false,
                completed_pulses: 0,
            }),
            step: step.max(Duration::from_millis(1)),
        }
    }

    /// Step at the configured cancellation polling interval
    pub fn from_config(config: &PulseGuideConfig) -> Self {
        Self::new(config.poll_interval())
    }

    fn lock(&self) -> MutexGuard<'_, SimulatorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_axis_positions(&self, positions: [f64; 2]) {
        self.lock().axes = positions;
    }

    pub fn set_side_of_pier(&self, side: PierSide) {
        self.lock().side_of_pier = side;
    }

    pub fn set_sidereal_time(&self, hours: f64) {
        self.lock().sidereal_time = Some(hours);
    }

    pub fn set_southern_hemisphere(&self, southern: bool) {
        self.lock().southern_hemisphere = southern;
    }

    pub fn is_moving(&self, axis: Axis) -> bool {
        self.lock().moving[axis.index()]
    }

    pub fn completed_pulses(&self) -> u64 {
        self.lock().completed_pulses
    }

    fn advance(&self, axis: Axis, rate: f64, elapsed: Duration) {
        self.lock().axes[axis.index()] += rate * elapsed.as_secs_f64();
    }

    fn set_moving(&self, axis: Axis, moving: bool) {
        self.lock().moving[axis.index()] = moving;
    }
}

#[async_trait]
impl AxisPulseExecutor for SimulatorMount {
    fn name(&self) -> &str {
        "Simulator"
    }

    async fn pulse(
        &self,
        axis: Axis,
        rate: f64,
        duration: Duration,
        cancel: CancellationToken,
    ) -> MountResult<PulseOutcome> {
        self.set_moving(axis, true);
        let mut remaining = duration;

        let outcome = loop {
            if cancel.is_cancelled() {
                break PulseOutcome::Cancelled;
            }
            if remaining.is_zero() {
                break PulseOutcome::Completed;
            }
            let step = remaining.min(self.step);
            tokio::time::sleep(step).await;
            self.advance(axis, rate, step);
            remaining -= step;
        };

        self.set_moving(axis, false);
        if outcome == PulseOutcome::Completed {
            self.lock().completed_pulses += 1;
        }
        tracing::debug!(
            "Simulator {} axis pulse {:?} after {:?}",
            axis,
            outcome,
            duration - remaining
        );
        Ok(outcome)
    }
}

impl SiderealTimeSource for SimulatorMount {
    fn sidereal_time(&self) -> MountResult<f64> {
        self.lock()
            .sidereal_time
            .ok_or_else(|| MountError::SiderealTimeUnavailable("simulator clock not set".to_string()))
    }
}

impl PositionProvider for SimulatorMount {
    fn side_of_pier(&self) -> PierSide {
        self.lock().side_of_pier
    }

    fn axis_positions(&self) -> [f64; 2] {
        self.lock().axes
    }

    fn is_southern_hemisphere(&self) -> bool {
        self.lock().southern_hemisphere
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_executor_is_not_implemented() {
        let executors = MountExecutors::new()
            .with(MountType::Simulator, Arc::new(SimulatorMount::new(Duration::from_millis(10))));
        assert!(executors.supports(MountType::Simulator));
        assert!(executors.get(MountType::Simulator).is_ok());

        let err = executors.get(MountType::SkyWatcher).err().unwrap();
        assert!(matches!(
            err,
            MountError::NotImplemented { mount_type: MountType::SkyWatcher, .. }
        ));
    }

    #[tokio::test]
    async fn test_simulator_integrates_motion() {
        let sim = SimulatorMount::new(Duration::from_millis(10));
        let outcome = sim
            .pulse(Axis::Primary, 2.0, Duration::from_millis(50), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, PulseOutcome::Completed);

        let [x, y] = sim.axis_positions();
        assert!((x - 0.1).abs() < 1e-9);
        assert_eq!(y, 0.0);
        assert_eq!(sim.completed_pulses(), 1);
        assert!(!sim.is_moving(Axis::Primary));
    }

    #[tokio::test]
    async fn test_simulator_stops_on_cancel() {
        let sim = Arc::new(SimulatorMount::new(Duration::from_millis(10)));
        let token = CancellationToken::new();

        let task = {
            let sim = sim.clone();
            let token = token.clone();
            tokio::spawn(async move {
                sim.pulse(Axis::Secondary, 1.0, Duration::from_secs(10), token).await
            })
        };

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(sim.is_moving(Axis::Secondary));
        let cancelled_at = tokio::time::Instant::now();
        token.cancel();

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, PulseOutcome::Cancelled);
        // Latency bounded by one step, with scheduling slack
        assert!(cancelled_at.elapsed() < Duration::from_millis(500));
        assert!(sim.axis_positions()[1] < 1.0);
        assert_eq!(sim.completed_pulses(), 0);
    }

    #[test]
    fn test_simulator_steps_at_poll_interval() {
        let sim = SimulatorMount::from_config(&PulseGuideConfig::strict());
        assert_eq!(sim.step, Duration::from_millis(20));
        assert_eq!(sim.name(), "Simulator");
    }

    #[test]
    fn test_simulator_position_provider() {
        let sim = SimulatorMount::new(Duration::from_millis(10));
        assert!(sim.sidereal_time().is_err());
        sim.set_sidereal_time(3.25);
        sim.set_side_of_pier(PierSide::West);
        sim.set_axis_positions([12.0, -4.0]);
        sim.set_southern_hemisphere(true);

        assert_eq!(sim.sidereal_time().unwrap(), 3.25);
        assert_eq!(sim.side_of_pier(), PierSide::West);
        assert_eq!(sim.axis_positions(), [12.0, -4.0]);
        assert!(sim.is_southern_hemisphere());
    }
}
