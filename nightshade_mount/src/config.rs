//! Pulse guide tuning and mount settings

use crate::error::{MountError, MountResult};
use crate::types::{AlignmentMode, Axis, MountType, PolarMode};
use crate::SIDEREAL_RATE_DEG_PER_SEC;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the pulse guide controller.
///
/// # Default Values
/// - `mutex_wait_ms`: 50ms bounded wait on the axis mutex before waiting unbounded
/// - `cancel_timeout_ms`: 2 seconds for an in-flight pulse to observe cancellation
/// - `poll_interval_ms`: 100ms cancellation polling increment inside a pulse
/// - `min_displacement_degrees`: 0.0002 degrees, smaller pulses are rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseGuideConfig {
    /// Bounded wait on the axis mutex. Only affects latency, never correctness.
    pub mutex_wait_ms: u64,
    /// Default wait used by cancel operations
    pub cancel_timeout_ms: u64,
    /// Cancellation latency bound inside a running pulse. Must be sub-second.
    pub poll_interval_ms: u64,
    /// Smallest angular displacement worth sending to the hardware
    pub min_displacement_degrees: f64,
}

impl Default for PulseGuideConfig {
    fn default() -> Self {
        Self {
            mutex_wait_ms: 50,
            cancel_timeout_ms: 2000,
            poll_interval_ms: 100,
            min_displacement_degrees: 0.0002,
        }
    }
}

impl PulseGuideConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tight timings for fast simulators and tests
    pub fn strict() -> Self {
        Self {
            mutex_wait_ms: 20,
            cancel_timeout_ms: 500,
            poll_interval_ms: 20,
            min_displacement_degrees: 0.0002,
        }
    }

    /// Relaxed timings for slow serial links
    pub fn lenient() -> Self {
        Self {
            mutex_wait_ms: 200,
            cancel_timeout_ms: 5000,
            poll_interval_ms: 250,
            min_displacement_degrees: 0.0002,
        }
    }

    pub fn mutex_wait(&self) -> Duration {
        Duration::from_millis(self.mutex_wait_ms)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> MountResult<()> {
        if self.poll_interval_ms == 0 || self.poll_interval_ms >= 1000 {
            return Err(MountError::invalid_setting(
                "poll_interval_ms",
                self.poll_interval_ms,
                "must be between 1 and 999",
            ));
        }
        if !(self.min_displacement_degrees >= 0.0) {
            return Err(MountError::invalid_setting(
                "min_displacement_degrees",
                self.min_displacement_degrees,
                "must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Mount settings read when a geometry context or pulse is prepared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountSettings {
    pub mount_type: MountType,
    pub alignment_mode: AlignmentMode,
    /// Site latitude in degrees, negative south
    pub latitude: f64,
    pub polar_mode: PolarMode,
    /// Primary axis limit in degrees
    pub axis_limit_x: Option<f64>,
    /// Hour angle flip window in degrees
    pub hour_angle_limit: Option<f64>,
    /// Primary guide rate as a fraction of sidereal
    pub guide_rate_offset_x: f64,
    /// Secondary guide rate as a fraction of sidereal
    pub guide_rate_offset_y: f64,
    /// Extra time added to a secondary pulse that reverses direction
    pub dec_backlash_ms: u32,
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            mount_type: MountType::Simulator,
            alignment_mode: AlignmentMode::GermanPolar,
            latitude: 0.0,
            polar_mode: PolarMode::Right,
            axis_limit_x: None,
            hour_angle_limit: None,
            guide_rate_offset_x: 0.5,
            guide_rate_offset_y: 0.5,
            dec_backlash_ms: 0,
        }
    }
}

impl MountSettings {
    /// Parse and validate settings from JSON
    pub fn from_json(json: &str) -> MountResult<Self> {
        let settings: MountSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> MountResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> MountResult<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(MountError::invalid_setting(
                "latitude",
                self.latitude,
                "must be within [-90, 90]",
            ));
        }
        if let Some(limit) = self.axis_limit_x {
            if !(limit > 0.0 && limit <= 360.0) {
                return Err(MountError::invalid_setting(
                    "axis_limit_x",
                    limit,
                    "must be within (0, 360]",
                ));
            }
        }
        if let Some(limit) = self.hour_angle_limit {
            if !(limit >= 0.0 && limit <= 90.0) {
                return Err(MountError::invalid_setting(
                    "hour_angle_limit",
                    limit,
                    "must be within [0, 90]",
                ));
            }
        }
        for (name, offset) in [
            ("guide_rate_offset_x", self.guide_rate_offset_x),
            ("guide_rate_offset_y", self.guide_rate_offset_y),
        ] {
            if !(offset > 0.0 && offset <= 1.0) {
                return Err(MountError::invalid_setting(name, offset, "must be within (0, 1]"));
            }
        }
        Ok(())
    }

    /// Default guide rate in degrees/sec for an axis
    pub fn guide_rate(&self, axis: Axis) -> f64 {
        let offset = match axis {
            Axis::Primary => self.guide_rate_offset_x,
            Axis::Secondary => self.guide_rate_offset_y,
        };
        offset * SIDEREAL_RATE_DEG_PER_SEC
    }

    pub fn is_southern_hemisphere(&self) -> bool {
        self.latitude < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PulseGuideConfig::default();
        assert_eq!(config.mutex_wait(), Duration::from_millis(50));
        assert_eq!(config.cancel_timeout(), Duration::from_secs(2));
        assert!(config.poll_interval() < Duration::from_secs(1));
        assert!(config.validate().is_ok());
        assert!(PulseGuideConfig::strict().validate().is_ok());
        assert!(PulseGuideConfig::lenient().validate().is_ok());
    }

    #[test]
    fn test_config_rejects_coarse_polling() {
        let config = PulseGuideConfig {
            poll_interval_ms: 1500,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settings_from_json_partial() {
        let settings = MountSettings::from_json(
            r#"{ "alignment_mode": "AltAz", "latitude": -33.9, "axis_limit_x": 90.0 }"#,
        )
        .unwrap();
        assert_eq!(settings.alignment_mode, AlignmentMode::AltAz);
        assert_eq!(settings.mount_type, MountType::Simulator);
        assert!(settings.is_southern_hemisphere());
        assert_eq!(settings.axis_limit_x, Some(90.0));
        assert_eq!(settings.guide_rate_offset_x, 0.5);
    }

    #[test]
    fn test_settings_json_roundtrip() {
        let settings = MountSettings {
            mount_type: MountType::SkyWatcher,
            dec_backlash_ms: 120,
            ..Default::default()
        };
        let json = settings.to_json().unwrap();
        assert_eq!(MountSettings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_settings_validation() {
        let bad_latitude = MountSettings {
            latitude: 91.0,
            ..Default::default()
        };
        assert!(matches!(
            bad_latitude.validate(),
            Err(MountError::InvalidSetting { ref name, .. }) if name == "latitude"
        ));

        let bad_rate = MountSettings {
            guide_rate_offset_y: 0.0,
            ..Default::default()
        };
        assert!(bad_rate.validate().is_err());

        assert!(MountSettings::from_json(r#"{ "alignment_mode": "Equatorial" }"#).is_err());
    }

    #[test]
    fn test_guide_rate() {
        let settings = MountSettings {
            guide_rate_offset_x: 1.0,
            guide_rate_offset_y: 0.25,
            ..Default::default()
        };
        assert!((settings.guide_rate(Axis::Primary) - SIDEREAL_RATE_DEG_PER_SEC).abs() < 1e-12);
        assert!(
            (settings.guide_rate(Axis::Secondary) - SIDEREAL_RATE_DEG_PER_SEC * 0.25).abs() < 1e-12
        );
    }
}
