//! Axes geometry snapshot and flip-limit decisions
//!
//! An [`AxesGeometryContext`] is an immutable view of the mount configuration
//! and live position taken at one instant. Geometric questions are answered
//! against the snapshot rather than against settings that may change mid
//! calculation. Updates produce a new context via the `with_*` methods.
//!
//! Flip-limit decisions go through a [`FlipLimitStrategy`]. The default,
//! [`AlignmentFlipLimits`], branches on alignment mode; a replacement strategy
//! can be injected to override it.

use crate::error::{MountError, MountResult};
use crate::providers::{SettingsProvider, SharedPositionProvider, SiderealTimeSource};
use crate::types::{AlignmentMode, MountType, PierSide, PolarMode};
use std::fmt::Debug;
use std::sync::{Arc, OnceLock};

/// Primary axis limit used when none is configured, degrees
pub const DEFAULT_AXIS_LIMIT_X: f64 = 180.0;

/// Hour angle flip window used when none is configured, degrees
pub const DEFAULT_HOUR_ANGLE_LIMIT: f64 = 15.0;

/// Decides whether an axis position lies inside the safe motion envelope
pub trait FlipLimitStrategy: Send + Sync + Debug {
    /// `position` is `[axis_x, axis_y]` in degrees
    fn is_within_flip_limits(
        &self,
        context: &AxesGeometryContext,
        position: [f64; 2],
    ) -> MountResult<bool>;
}

/// Flip limits by alignment mode
#[derive(Debug, Default, Clone, Copy)]
pub struct AlignmentFlipLimits;

impl FlipLimitStrategy for AlignmentFlipLimits {
    fn is_within_flip_limits(
        &self,
        context: &AxesGeometryContext,
        position: [f64; 2],
    ) -> MountResult<bool> {
        let a = position[0].abs();
        let within = match context.alignment_mode() {
            AlignmentMode::AltAz => {
                // Azimuth may be reported in [0, 360), so the band wraps
                let limit = context.axis_limit_x();
                limit >= a || a >= 360.0 - limit
            }
            AlignmentMode::Polar => {
                let limit = context.axis_limit_x();
                180.0 - limit <= a && a <= limit
            }
            AlignmentMode::GermanPolar => {
                let ha_limit = context.hour_angle_limit();
                // Meridian window, or the window past the anti-meridian
                (-ha_limit < a && a < ha_limit) || (180.0 < a && a < 180.0 + ha_limit)
            }
        };
        tracing::trace!(
            "Flip limits {} x={:.4} -> {}",
            context.alignment_mode(),
            position[0],
            within
        );
        Ok(within)
    }
}

/// Sidereal time read through a live position provider
struct PositionClock(SharedPositionProvider);

impl SiderealTimeSource for PositionClock {
    fn sidereal_time(&self) -> MountResult<f64> {
        self.0.sidereal_time()
    }
}

/// Immutable geometry snapshot
#[derive(Clone)]
pub struct AxesGeometryContext {
    alignment_mode: AlignmentMode,
    mount_type: MountType,
    latitude: f64,
    southern_hemisphere: bool,
    polar_mode: PolarMode,
    sidereal_time: OnceLock<f64>,
    sidereal_source: Option<Arc<dyn SiderealTimeSource>>,
    side_of_pier: Option<PierSide>,
    axis_x: Option<f64>,
    axis_y: Option<f64>,
    axis_limit_x: Option<f64>,
    hour_angle_limit: Option<f64>,
    flip_limits: Arc<dyn FlipLimitStrategy>,
}

impl AxesGeometryContext {
    /// Builder for explicit values
    pub fn builder() -> AxesGeometryContextBuilder {
        AxesGeometryContextBuilder::default()
    }

    /// Snapshot settings and live position. Sidereal time is read lazily.
    pub fn from_providers(
        settings: &dyn SettingsProvider,
        position: SharedPositionProvider,
    ) -> MountResult<Self> {
        let settings = settings.settings();
        settings.validate()?;
        let [x, y] = position.axis_positions();
        let context = Self::builder()
            .alignment_mode(settings.alignment_mode)
            .mount_type(settings.mount_type)
            .latitude(settings.latitude)
            .southern_hemisphere(position.is_southern_hemisphere())
            .polar_mode(settings.polar_mode)
            .side_of_pier(position.side_of_pier())
            .axis_positions([x, y])
            .axis_limit_x(settings.axis_limit_x)
            .hour_angle_limit(settings.hour_angle_limit)
            .sidereal_source(Arc::new(PositionClock(position)))
            .build()?;
        Ok(context)
    }

    pub fn alignment_mode(&self) -> AlignmentMode {
        self.alignment_mode
    }

    pub fn mount_type(&self) -> MountType {
        self.mount_type
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn is_southern_hemisphere(&self) -> bool {
        self.southern_hemisphere
    }

    pub fn polar_mode(&self) -> PolarMode {
        self.polar_mode
    }

    pub fn side_of_pier(&self) -> Option<PierSide> {
        self.side_of_pier
    }

    /// App-axis positions, if known
    pub fn axis_positions(&self) -> Option<[f64; 2]> {
        match (self.axis_x, self.axis_y) {
            (Some(x), Some(y)) => Some([x, y]),
            _ => None,
        }
    }

    pub fn axis_limit_x(&self) -> f64 {
        self.axis_limit_x.unwrap_or(DEFAULT_AXIS_LIMIT_X)
    }

    pub fn hour_angle_limit(&self) -> f64 {
        self.hour_angle_limit.unwrap_or(DEFAULT_HOUR_ANGLE_LIMIT)
    }

    /// Local sidereal time in hours, read from the live source on first use
    pub fn local_sidereal_time(&self) -> MountResult<f64> {
        if let Some(lst) = self.sidereal_time.get() {
            return Ok(*lst);
        }
        let source = self.sidereal_source.as_ref().ok_or_else(|| {
            MountError::SiderealTimeUnavailable("no sidereal time source".to_string())
        })?;
        let lst = source.sidereal_time()?;
        // A concurrent reader may have filled it first; either value is a valid reading
        let _ = self.sidereal_time.set(lst);
        Ok(*self.sidereal_time.get().unwrap_or(&lst))
    }

    /// Hour angle of a right ascension, hours in (-12, 12]
    pub fn hour_angle(&self, ra_hours: f64) -> MountResult<f64> {
        let lst = self.local_sidereal_time()?;
        let mut ha = (lst - ra_hours).rem_euclid(24.0);
        if ha > 12.0 {
            ha -= 24.0;
        }
        Ok(ha)
    }

    /// Is `position` inside the flip envelope for this geometry
    pub fn is_within_flip_limits(&self, position: [f64; 2]) -> MountResult<bool> {
        self.flip_limits.is_within_flip_limits(self, position)
    }

    /// Flip-limit check against the snapshot's own axis positions
    pub fn is_current_position_within_flip_limits(&self) -> MountResult<bool> {
        let position = self.axis_positions().ok_or_else(|| {
            MountError::InvalidParameter("context has no axis positions".to_string())
        })?;
        self.is_within_flip_limits(position)
    }

    pub fn with_side_of_pier(&self, side: PierSide) -> Self {
        let mut next = self.clone();
        next.side_of_pier = Some(side);
        next
    }

    pub fn with_sidereal_time(&self, hours: f64) -> Self {
        let mut next = self.clone();
        next.sidereal_time = OnceLock::from(hours);
        next
    }

    pub fn with_axis_positions(&self, position: [f64; 2]) -> Self {
        let mut next = self.clone();
        next.axis_x = Some(position[0]);
        next.axis_y = Some(position[1]);
        next
    }

    /// Replace the flip-limit decision
    pub fn with_flip_limit_strategy(&self, strategy: Arc<dyn FlipLimitStrategy>) -> Self {
        let mut next = self.clone();
        next.flip_limits = strategy;
        next
    }
}

impl Debug for AxesGeometryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AxesGeometryContext")
            .field("alignment_mode", &self.alignment_mode)
            .field("mount_type", &self.mount_type)
            .field("latitude", &self.latitude)
            .field("southern_hemisphere", &self.southern_hemisphere)
            .field("polar_mode", &self.polar_mode)
            .field("sidereal_time", &self.sidereal_time.get())
            .field("side_of_pier", &self.side_of_pier)
            .field("axis_x", &self.axis_x)
            .field("axis_y", &self.axis_y)
            .field("axis_limit_x", &self.axis_limit_x)
            .field("hour_angle_limit", &self.hour_angle_limit)
            .field("flip_limits", &self.flip_limits)
            .finish()
    }
}

/// Builds an [`AxesGeometryContext`] from explicit values
#[derive(Default)]
pub struct AxesGeometryContextBuilder {
    alignment_mode: Option<AlignmentMode>,
    alignment_code: Option<i32>,
    mount_type: Option<MountType>,
    mount_type_code: Option<i32>,
    latitude: f64,
    southern_hemisphere: Option<bool>,
    polar_mode: PolarMode,
    sidereal_time: Option<f64>,
    sidereal_source: Option<Arc<dyn SiderealTimeSource>>,
    side_of_pier: Option<PierSide>,
    axis_positions: Option<[f64; 2]>,
    axis_limit_x: Option<f64>,
    hour_angle_limit: Option<f64>,
    flip_limits: Option<Arc<dyn FlipLimitStrategy>>,
}

impl AxesGeometryContextBuilder {
    pub fn alignment_mode(mut self, mode: AlignmentMode) -> Self {
        self.alignment_mode = Some(mode);
        self
    }

    /// Alignment mode as an ASCOM code, checked in `build`
    pub fn alignment_code(mut self, code: i32) -> Self {
        self.alignment_code = Some(code);
        self
    }

    pub fn mount_type(mut self, mount_type: MountType) -> Self {
        self.mount_type = Some(mount_type);
        self
    }

    /// Mount type as an integer code, checked in `build`
    pub fn mount_type_code(mut self, code: i32) -> Self {
        self.mount_type_code = Some(code);
        self
    }

    pub fn latitude(mut self, degrees: f64) -> Self {
        self.latitude = degrees;
        self
    }

    /// Defaults to `latitude < 0` when not set
    pub fn southern_hemisphere(mut self, southern: bool) -> Self {
        self.southern_hemisphere = Some(southern);
        self
    }

    pub fn polar_mode(mut self, mode: PolarMode) -> Self {
        self.polar_mode = mode;
        self
    }

    pub fn sidereal_time(mut self, hours: f64) -> Self {
        self.sidereal_time = Some(hours);
        self
    }

    pub fn sidereal_source(mut self, source: Arc<dyn SiderealTimeSource>) -> Self {
        self.sidereal_source = Some(source);
        self
    }

    pub fn side_of_pier(mut self, side: PierSide) -> Self {
        self.side_of_pier = Some(side);
        self
    }

    pub fn axis_positions(mut self, position: [f64; 2]) -> Self {
        self.axis_positions = Some(position);
        self
    }

    pub fn axis_limit_x(mut self, degrees: Option<f64>) -> Self {
        self.axis_limit_x = degrees;
        self
    }

    pub fn hour_angle_limit(mut self, degrees: Option<f64>) -> Self {
        self.hour_angle_limit = degrees;
        self
    }

    pub fn flip_limit_strategy(mut self, strategy: Arc<dyn FlipLimitStrategy>) -> Self {
        self.flip_limits = Some(strategy);
        self
    }

    pub fn build(self) -> MountResult<AxesGeometryContext> {
        let alignment_mode = match (self.alignment_code, self.alignment_mode) {
            (Some(code), _) => AlignmentMode::try_from(code)?,
            (None, Some(mode)) => mode,
            (None, None) => AlignmentMode::GermanPolar,
        };
        let mount_type = match (self.mount_type_code, self.mount_type) {
            (Some(code), _) => MountType::try_from(code)?,
            (None, Some(mount_type)) => mount_type,
            (None, None) => MountType::Simulator,
        };
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(MountError::invalid_setting(
                "latitude",
                self.latitude,
                "must be within [-90, 90]",
            ));
        }

        let sidereal_time = match self.sidereal_time {
            Some(hours) => OnceLock::from(hours),
            None => OnceLock::new(),
        };

        Ok(AxesGeometryContext {
            alignment_mode,
            mount_type,
            latitude: self.latitude,
            southern_hemisphere: self.southern_hemisphere.unwrap_or(self.latitude < 0.0),
            polar_mode: self.polar_mode,
            sidereal_time,
            sidereal_source: self.sidereal_source,
            side_of_pier: self.side_of_pier,
            axis_x: self.axis_positions.map(|p| p[0]),
            axis_y: self.axis_positions.map(|p| p[1]),
            axis_limit_x: self.axis_limit_x,
            hour_angle_limit: self.hour_angle_limit,
            flip_limits: self
                .flip_limits
                .unwrap_or_else(|| Arc::new(AlignmentFlipLimits)),
        })
    }
}
