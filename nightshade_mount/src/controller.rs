//! Pulse guide controller
//!
//! Public entry point for pulse guiding. Each axis has its own mutex and
//! cancellation scope, so the two axes never block each other. A single state
//! lock protects the per-axis bookkeeping; it is never held across an await
//! or an executor call.
//!
//! Starting a pulse is synchronous: by the time `start_pulse_guide` returns the
//! axis reports busy and the background task is scheduled. Starting again on
//! a busy axis cancels the running pulse and replaces it without the busy flag
//! ever dropping in between.

use crate::actuator::PulseActuator;
use crate::axis_lock::AxisMutex;
use crate::config::PulseGuideConfig;
use crate::error::{MountError, MountResult};
use crate::executor::{MountExecutors, PulseOutcome, SharedExecutor};
use crate::providers::{SharedPositionProvider, SharedSettingsProvider};
use crate::scope::{AxisRuntimeState, AxisStatus};
use crate::telemetry::{
    MonitorCategory, MonitorEntry, MonitorSeverity, SharedTelemetrySink, TracingSink,
};
use crate::types::{Axis, GuideDirection, MountType, PulseOperation};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;

/// Result of a cancel request on one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Nothing was in flight
    NotRunning,
    /// The pulse observed cancellation and exited
    Cancelled,
    /// The pulse did not exit in time. It keeps running and clears its own flag later.
    TimedOut,
}

impl CancelOutcome {
    /// Treat a timeout as an error, for callers that need the axis stopped
    pub fn into_result(self, axis: Axis, timeout: Duration) -> MountResult<()> {
        match self {
            CancelOutcome::TimedOut => Err(MountError::CancelTimeout {
                axis,
                timeout_ms: timeout.as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }
}

struct ControllerState {
    axes: [AxisRuntimeState; 2],
    disposed: bool,
}

struct ControllerInner {
    state: Mutex<ControllerState>,
    axis_locks: [AxisMutex; 2],
    actuator: PulseActuator,
    telemetry: SharedTelemetrySink,
    config: PulseGuideConfig,
    next_operation: AtomicU64,
}

impl ControllerInner {
    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        // Bookkeeping stays consistent across a panic, so poison is ignored
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn monitor(&self, severity: MonitorSeverity, method: &str, message: String) {
        self.telemetry
            .log(MonitorEntry::new(MonitorCategory::Guiding, severity, method, message));
    }

    fn monitor_system(&self, severity: MonitorSeverity, method: &str, message: &str) {
        self.telemetry
            .log(MonitorEntry::new(MonitorCategory::System, severity, method, message));
    }

    /// Background unit for one pulse
    async fn run_pulse(self: Arc<Self>, operation_id: u64, op: PulseOperation) {
        let axis = op.axis();

        let result = {
            let guard = self.axis_locks[axis.index()]
                .acquire(self.config.mutex_wait())
                .await;
            if guard.was_contended() {
                self.monitor(
                    MonitorSeverity::Debug,
                    "run_pulse",
                    format!("{} axis pulse #{} waited for previous pulse", axis, operation_id),
                );
            }

            let token = self.lock_state().axes[axis.index()].enter_running(operation_id);
            match token {
                None => None,
                Some(token) => Some(
                    AssertUnwindSafe(self.actuator.actuate(&op, token))
                        .catch_unwind()
                        .await,
                ),
            }
            // axis mutex released here
        };

        match result {
            None => self.monitor(
                MonitorSeverity::Information,
                "run_pulse",
                format!("{} axis pulse #{} cancelled before start", axis, operation_id),
            ),
            Some(Ok(Ok(PulseOutcome::Completed))) => self.monitor(
                MonitorSeverity::Debug,
                "run_pulse",
                format!("{} axis pulse #{} finished", axis, operation_id),
            ),
            Some(Ok(Ok(outcome))) => self.monitor(
                MonitorSeverity::Information,
                "run_pulse",
                format!("{} axis pulse #{} ended {:?}", axis, operation_id, outcome),
            ),
            Some(Ok(Err(e))) => self.monitor(
                MonitorSeverity::Error,
                "run_pulse",
                format!("{} axis pulse #{} failed: {}", axis, operation_id, e),
            ),
            Some(Err(panic)) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.monitor(
                    MonitorSeverity::Error,
                    "run_pulse",
                    format!("{} axis pulse #{} panicked: {}", axis, operation_id, message),
                );
            }
        }

        // Always release the axis, a stuck busy flag is worse than a lost pulse
        let cleared = self.lock_state().axes[axis.index()].finish(operation_id);
        if !cleared {
            tracing::trace!(
                "{} axis pulse #{} superseded, leaving state to newer pulse",
                axis,
                operation_id
            );
        }
    }

    /// Wait for a pulse to leave the axis when its task handle is not available
    async fn wait_until_finished(&self, axis: Axis, operation_id: u64, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let poll = self.config.poll_interval().min(Duration::from_millis(10));
        loop {
            let still_running =
                self.lock_state().axes[axis.index()].status().operation_id == Some(operation_id);
            if !still_running {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(poll).await;
        }
    }
}

/// Per-axis pulse guide state machine
pub struct PulseGuideController {
    inner: Arc<ControllerInner>,
}

impl PulseGuideController {
    pub fn new(actuator: PulseActuator, telemetry: SharedTelemetrySink) -> Self {
        let config = actuator.config().clone();
        Self {
            inner: Arc::new(ControllerInner {
                state: Mutex::new(ControllerState {
                    axes: [
                        AxisRuntimeState::new(Axis::Primary),
                        AxisRuntimeState::new(Axis::Secondary),
                    ],
                    disposed: false,
                }),
                axis_locks: [AxisMutex::new(Axis::Primary), AxisMutex::new(Axis::Secondary)],
                actuator,
                telemetry,
                config,
                next_operation: AtomicU64::new(0),
            }),
        }
    }

    pub fn builder(settings: SharedSettingsProvider) -> PulseGuideControllerBuilder {
        PulseGuideControllerBuilder::new(settings)
    }

    pub fn config(&self) -> &PulseGuideConfig {
        &self.inner.config
    }

    fn ensure_live(state: &ControllerState) -> MountResult<()> {
        if state.disposed {
            Err(MountError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Start a pulse and return immediately.
    ///
    /// `alt_rate` is in degrees/sec; 0 uses the axis guide rate. Any pulse
    /// already running on the same axis is cancelled and replaced.
    pub fn start_pulse_guide(
        &self,
        direction: GuideDirection,
        duration_ms: u32,
        alt_rate: f64,
    ) -> MountResult<()> {
        if self.is_disposed() {
            return Err(MountError::Disposed);
        }
        let runtime = Handle::try_current().map_err(|_| MountError::NoRuntime)?;
        let op = PulseOperation::new(direction, duration_ms, alt_rate)?;
        let axis = op.axis();
        let operation_id = self.inner.next_operation.fetch_add(1, Ordering::SeqCst) + 1;

        let op = {
            let mut state = self.inner.lock_state();
            Self::ensure_live(&state)?;
            let (_token, previous) = state.axes[axis.index()].begin(operation_id, direction);
            op.with_previous_direction(previous)
        };

        self.inner.monitor(
            MonitorSeverity::Debug,
            "start_pulse_guide",
            format!(
                "Pulse #{} {} {}ms rate {} on {} axis",
                operation_id, direction, duration_ms, alt_rate, axis
            ),
        );

        let inner = self.inner.clone();
        let task = runtime.spawn(inner.run_pulse(operation_id, op));
        self.inner.lock_state().axes[axis.index()].attach_task(operation_id, task);
        Ok(())
    }

    /// Cancel the pulse on one axis using the configured timeout
    pub async fn cancel_pulse(&self, axis: Axis) -> MountResult<CancelOutcome> {
        self.cancel_pulse_with_timeout(axis, self.inner.config.cancel_timeout())
            .await
    }

    /// Signal cancellation on one axis and wait up to `timeout` for the pulse to exit.
    ///
    /// A timeout is reported as [`CancelOutcome::TimedOut`], not as an error.
    pub async fn cancel_pulse_with_timeout(
        &self,
        axis: Axis,
        timeout: Duration,
    ) -> MountResult<CancelOutcome> {
        let pending = {
            let mut state = self.inner.lock_state();
            Self::ensure_live(&state)?;
            state.axes[axis.index()].request_cancel()
        };
        let Some(pending) = pending else {
            return Ok(CancelOutcome::NotRunning);
        };

        let finished = match pending.task {
            Some(task) => match tokio::time::timeout(timeout, task).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    // The task is gone either way
                    tracing::warn!("{} axis pulse task ended abnormally: {}", axis, e);
                    true
                }
                Err(_) => false,
            },
            None => {
                self.inner
                    .wait_until_finished(axis, pending.operation_id, timeout)
                    .await
            }
        };

        if finished {
            self.inner.monitor(
                MonitorSeverity::Information,
                "cancel_pulse",
                format!("{} axis pulse #{} cancelled", axis, pending.operation_id),
            );
            Ok(CancelOutcome::Cancelled)
        } else {
            self.inner.monitor(
                MonitorSeverity::Warning,
                "cancel_pulse",
                format!(
                    "{} axis pulse #{} did not stop within {:?}",
                    axis, pending.operation_id, timeout
                ),
            );
            Ok(CancelOutcome::TimedOut)
        }
    }

    /// Cancel every busy axis using the configured timeout
    pub async fn cancel_all_pulses(&self) -> MountResult<Vec<(Axis, CancelOutcome)>> {
        self.cancel_all_pulses_with_timeout(self.inner.config.cancel_timeout())
            .await
    }

    /// Cancel every busy axis concurrently and wait for each to settle or time out
    pub async fn cancel_all_pulses_with_timeout(
        &self,
        timeout: Duration,
    ) -> MountResult<Vec<(Axis, CancelOutcome)>> {
        let busy = {
            let state = self.inner.lock_state();
            Self::ensure_live(&state)?;
            let busy: Vec<Axis> = Axis::ALL
                .into_iter()
                .filter(|axis| state.axes[axis.index()].is_busy())
                .collect();
            busy
        };

        let cancels = busy.iter().map(|&axis| async move {
            let outcome = self.cancel_pulse_with_timeout(axis, timeout).await;
            (axis, outcome)
        });

        let mut results = Vec::with_capacity(busy.len());
        for (axis, outcome) in futures::future::join_all(cancels).await {
            results.push((axis, outcome?));
        }
        Ok(results)
    }

    /// Emergency reset: drop both axes' bookkeeping without waiting.
    ///
    /// Background tasks may still be stopping the hardware after this returns.
    pub fn clear_all_flags(&self) -> MountResult<()> {
        {
            let mut state = self.inner.lock_state();
            Self::ensure_live(&state)?;
            for axis in state.axes.iter_mut() {
                axis.clear();
            }
        }
        self.inner.monitor_system(
            MonitorSeverity::Warning,
            "clear_all_flags",
            "Pulse guide flags force-cleared",
        );
        Ok(())
    }

    fn is_busy(&self, axes: &[Axis]) -> MountResult<bool> {
        let state = self.inner.lock_state();
        Self::ensure_live(&state)?;
        Ok(axes.iter().any(|axis| state.axes[axis.index()].is_busy()))
    }

    /// Primary axis busy
    pub fn is_pulse_guiding_ra(&self) -> MountResult<bool> {
        self.is_busy(&[Axis::Primary])
    }

    /// Secondary axis busy
    pub fn is_pulse_guiding_dec(&self) -> MountResult<bool> {
        self.is_busy(&[Axis::Secondary])
    }

    /// Either axis busy
    pub fn is_pulse_guiding(&self) -> MountResult<bool> {
        self.is_busy(&Axis::ALL)
    }

    pub fn status(&self) -> MountResult<[AxisStatus; 2]> {
        let state = self.inner.lock_state();
        Self::ensure_live(&state)?;
        Ok([state.axes[0].status(), state.axes[1].status()])
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock_state().disposed
    }

    /// Cancel in-flight pulses and refuse all further calls
    pub fn dispose(&self) {
        {
            let mut state = self.inner.lock_state();
            if state.disposed {
                return;
            }
            state.disposed = true;
            for axis in state.axes.iter_mut() {
                axis.clear();
            }
        }
        self.inner.monitor_system(
            MonitorSeverity::Information,
            "dispose",
            "Pulse guide controller disposed",
        );
    }
}

impl Drop for PulseGuideController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for PulseGuideController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("PulseGuideController")
            .field("primary", &state.axes[0].status())
            .field("secondary", &state.axes[1].status())
            .field("disposed", &state.disposed)
            .finish()
    }
}

/// Builder for [`PulseGuideController`]
pub struct PulseGuideControllerBuilder {
    settings: SharedSettingsProvider,
    executors: MountExecutors,
    position: Option<SharedPositionProvider>,
    telemetry: SharedTelemetrySink,
    config: PulseGuideConfig,
}

impl PulseGuideControllerBuilder {
    pub fn new(settings: SharedSettingsProvider) -> Self {
        Self {
            settings,
            executors: MountExecutors::new(),
            position: None,
            telemetry: Arc::new(TracingSink),
            config: PulseGuideConfig::default(),
        }
    }

    pub fn executor(mut self, mount_type: MountType, executor: SharedExecutor) -> Self {
        self.executors.register(mount_type, executor);
        self
    }

    pub fn position(mut self, position: SharedPositionProvider) -> Self {
        self.position = Some(position);
        self
    }

    pub fn telemetry(mut self, telemetry: SharedTelemetrySink) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(mut self, config: PulseGuideConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> MountResult<PulseGuideController> {
        self.config.validate()?;
        self.settings.settings().validate()?;
        let mut actuator = PulseActuator::new(
            self.executors,
            self.settings,
            self.telemetry.clone(),
            self.config,
        );
        if let Some(position) = self.position {
            actuator = actuator.with_position_provider(position);
        }
        Ok(PulseGuideController::new(actuator, self.telemetry))
    }
}
