//! Per-axis cancellation scope and runtime bookkeeping
//!
//! Each axis moves through `Idle -> Starting -> Running -> Idle`. An axis is
//! busy whenever it is not idle. A scope pairs the cancellation token of the
//! in-flight pulse with the handle of its background task; there is at most
//! one live scope per axis.
//!
//! Scopes carry an operation id so that a background task finishing late can
//! never clear the state of the pulse that replaced it.

use crate::types::{Axis, GuideDirection};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle phase of one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AxisPhase {
    Idle,
    /// Accepted and scheduled, waiting for the axis mutex
    Starting,
    /// Driving the executor
    Running,
}

/// Cancellation source and task handle of one pulse
#[derive(Debug)]
pub struct CancellationScope {
    operation_id: u64,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CancellationScope {
    fn new(operation_id: u64) -> Self {
        Self {
            operation_id,
            token: CancellationToken::new(),
            task: None,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn cancel(&self) {
        self.token.cancel();
    }
}

/// What a cancel request needs to wait on
#[derive(Debug)]
pub struct PendingCancel {
    pub operation_id: u64,
    pub task: Option<JoinHandle<()>>,
}

/// Snapshot of one axis for status polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AxisStatus {
    pub axis: Axis,
    pub phase: AxisPhase,
    pub last_direction: Option<GuideDirection>,
    pub operation_id: Option<u64>,
}

/// Bookkeeping for one axis, mutated only under the controller state lock
#[derive(Debug)]
pub struct AxisRuntimeState {
    axis: Axis,
    phase: AxisPhase,
    scope: Option<CancellationScope>,
    last_direction: Option<GuideDirection>,
}

impl AxisRuntimeState {
    pub fn new(axis: Axis) -> Self {
        Self {
            axis,
            phase: AxisPhase::Idle,
            scope: None,
            last_direction: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.phase != AxisPhase::Idle
    }

    pub fn phase(&self) -> AxisPhase {
        self.phase
    }

    pub fn has_scope(&self) -> bool {
        self.scope.is_some()
    }

    pub fn last_direction(&self) -> Option<GuideDirection> {
        self.last_direction
    }

    pub fn status(&self) -> AxisStatus {
        AxisStatus {
            axis: self.axis,
            phase: self.phase,
            last_direction: self.last_direction,
            operation_id: self.scope.as_ref().map(|s| s.operation_id),
        }
    }

    /// Replace any in-flight pulse with a new one.
    ///
    /// Order: cancel the old scope, install the new one, mark busy.
    /// Returns the new token and the direction of the previous pulse.
    pub fn begin(
        &mut self,
        operation_id: u64,
        direction: GuideDirection,
    ) -> (CancellationToken, Option<GuideDirection>) {
        if let Some(old) = self.scope.take() {
            tracing::debug!(
                "{} axis: cancelling pulse #{} for pulse #{}",
                self.axis,
                old.operation_id,
                operation_id
            );
            old.cancel();
        }
        let scope = CancellationScope::new(operation_id);
        let token = scope.token().clone();
        self.scope = Some(scope);
        self.phase = AxisPhase::Starting;
        let previous = self.last_direction.replace(direction);
        (token, previous)
    }

    /// Record the background task of a pulse. Dropped if the pulse was already replaced.
    pub fn attach_task(&mut self, operation_id: u64, task: JoinHandle<()>) {
        match self.scope.as_mut() {
            Some(scope) if scope.operation_id == operation_id => scope.task = Some(task),
            _ => {}
        }
    }

    /// Move a pulse to `Running` once it owns the axis.
    ///
    /// Returns `None` if the pulse was cancelled or cleared before it got here.
    pub fn enter_running(&mut self, operation_id: u64) -> Option<CancellationToken> {
        match self.scope.as_ref() {
            Some(scope) if scope.operation_id == operation_id && !scope.token.is_cancelled() => {
                self.phase = AxisPhase::Running;
                Some(scope.token.clone())
            }
            _ => None,
        }
    }

    /// Clear the axis when its own pulse ends. Returns false if a newer pulse owns the axis.
    pub fn finish(&mut self, operation_id: u64) -> bool {
        match self.scope.as_ref() {
            Some(scope) if scope.operation_id == operation_id => {
                self.scope = None;
                self.phase = AxisPhase::Idle;
                true
            }
            _ => false,
        }
    }

    /// Signal cancellation and hand out the task handle to wait on.
    /// The axis stays busy until the task itself finishes.
    pub fn request_cancel(&mut self) -> Option<PendingCancel> {
        let scope = self.scope.as_mut()?;
        scope.cancel();
        Some(PendingCancel {
            operation_id: scope.operation_id,
            task: scope.task.take(),
        })
    }

    /// Drop all bookkeeping without waiting for the background task
    pub fn clear(&mut self) {
        if let Some(scope) = self.scope.take() {
            scope.cancel();
        }
        self.phase = AxisPhase::Idle;
    }
}
