//! Mount Pulse Guiding
//!
//! Asynchronous pulse-guide control for equatorial and alt-az mounts.
//!
//! ## Features
//!
//! - Independent RA/Dec axes, each with its own lock and cancellation scope
//! - Restart semantics: a new pulse on a busy axis replaces the old one
//! - Bounded cancel waits with a typed timeout error
//! - Fault and panic isolation for background pulse tasks
//! - Minimum-displacement rejection of pulses too small to move the axis
//! - Dec backlash compensation on direction reversal
//! - Immutable axes geometry snapshots with pluggable flip-limit strategies
//! - Structured monitor telemetry over `tracing`

mod actuator;
mod axis_lock;
mod config;
mod controller;
mod error;
mod executor;
mod providers;
mod scope;
mod telemetry;
mod types;
pub mod geometry;

pub use actuator::{PulseActuator, PulsePlan};
pub use axis_lock::{AxisGuard, AxisMutex};
pub use config::{MountSettings, PulseGuideConfig};
pub use controller::{CancelOutcome, PulseGuideController, PulseGuideControllerBuilder};
pub use error::{MountError, MountResult};
pub use executor::{AxisPulseExecutor, MountExecutors, PulseOutcome, SharedExecutor, SimulatorMount};
pub use geometry::{AlignmentFlipLimits, AxesGeometryContext, AxesGeometryContextBuilder, FlipLimitStrategy};
pub use providers::{
    LivePosition, PositionProvider, SettingsProvider, SettingsStore, SharedPositionProvider,
    SharedSettingsProvider, SiderealTimeSource,
};
pub use scope::{AxisPhase, AxisStatus};
pub use telemetry::{
    MemorySink, MonitorCategory, MonitorEntry, MonitorSeverity, SharedTelemetrySink, TelemetrySink,
    TracingSink, DEFAULT_MONITOR_CAPACITY,
};
pub use types::{
    resolve_axis, AlignmentMode, Axis, GuideDirection, MountType, PierSide, PolarMode,
    PulseOperation,
};

/// Sidereal tracking rate, 15.041067 arcsec/s, in degrees per second
pub const SIDEREAL_RATE_DEG_PER_SEC: f64 = 15.041067 / 3600.0;
