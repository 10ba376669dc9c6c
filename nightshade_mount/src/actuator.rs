//! Pulse actuation
//!
//! Turns a [`PulseOperation`] into a signed axis rate and duration, rejects
//! pulses too small to move the axis, and hands the rest to the executor for
//! the configured mount type.

use crate::config::{MountSettings, PulseGuideConfig};
use crate::error::MountResult;
use crate::executor::{MountExecutors, PulseOutcome};
use crate::providers::{SharedPositionProvider, SharedSettingsProvider};
use crate::telemetry::{MonitorCategory, MonitorEntry, MonitorSeverity, SharedTelemetrySink};
use crate::types::{AlignmentMode, Axis, PierSide, PulseOperation};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Resolved motion for one pulse
#[derive(Debug, Clone, PartialEq)]
pub struct PulsePlan {
    pub axis: Axis,
    /// Signed rate in degrees/sec
    pub rate: f64,
    /// Requested duration plus any backlash compensation
    pub duration: Duration,
    /// Angular travel of the requested duration, in degrees
    pub displacement: f64,
    pub backlash_ms: u32,
}

/// Executes single pulses against the mount executor
pub struct PulseActuator {
    executors: MountExecutors,
    settings: SharedSettingsProvider,
    position: Option<SharedPositionProvider>,
    telemetry: SharedTelemetrySink,
    config: PulseGuideConfig,
}

impl PulseActuator {
    pub fn new(
        executors: MountExecutors,
        settings: SharedSettingsProvider,
        telemetry: SharedTelemetrySink,
        config: PulseGuideConfig,
    ) -> Self {
        Self {
            executors,
            settings,
            position: None,
            telemetry,
            config,
        }
    }

    /// Live position used for hemisphere and pier-side corrections
    pub fn with_position_provider(mut self, position: SharedPositionProvider) -> Self {
        self.position = Some(position);
        self
    }

    pub fn config(&self) -> &PulseGuideConfig {
        &self.config
    }

    fn monitor(&self, severity: MonitorSeverity, method: &str, message: String) {
        self.monitor_as(MonitorCategory::Guiding, severity, method, message);
    }

    fn monitor_as(
        &self,
        category: MonitorCategory,
        severity: MonitorSeverity,
        method: &str,
        message: String,
    ) {
        self.telemetry
            .log(MonitorEntry::new(category, severity, method, message));
    }

    /// Resolve rate, sign and duration for a pulse
    pub fn plan(&self, op: &PulseOperation) -> PulsePlan {
        let settings = self.settings.settings();
        self.plan_with(&settings, op)
    }

    fn plan_with(&self, settings: &MountSettings, op: &PulseOperation) -> PulsePlan {
        let axis = op.axis();
        let base_rate = if op.uses_default_rate() {
            settings.guide_rate(axis)
        } else {
            // Direction carries the sign
            op.rate().abs()
        };

        let mut sign = op.direction().sign();
        match axis {
            Axis::Primary => {
                let southern = match &self.position {
                    Some(position) => position.is_southern_hemisphere(),
                    None => settings.is_southern_hemisphere(),
                };
                if southern {
                    sign = -sign;
                }
            }
            Axis::Secondary => {
                let side = self
                    .position
                    .as_ref()
                    .map(|p| p.side_of_pier())
                    .unwrap_or(PierSide::Unknown);
                if settings.alignment_mode == AlignmentMode::GermanPolar && side == PierSide::West {
                    sign = -sign;
                }
            }
        }

        let backlash_ms = if axis == Axis::Secondary && op.reverses_previous() {
            settings.dec_backlash_ms
        } else {
            0
        };

        let rate = base_rate * sign;
        PulsePlan {
            axis,
            rate,
            duration: op.duration() + Duration::from_millis(backlash_ms as u64),
            displacement: rate.abs() * op.duration().as_secs_f64(),
            backlash_ms,
        }
    }

    /// Run one pulse to completion or cancellation
    pub async fn actuate(
        &self,
        op: &PulseOperation,
        cancel: CancellationToken,
    ) -> MountResult<PulseOutcome> {
        let settings = self.settings.settings();
        settings.validate()?;
        let plan = self.plan_with(&settings, op);

        // Written so a NaN displacement is rejected too
        if !(plan.displacement >= self.config.min_displacement_degrees) {
            self.monitor(
                MonitorSeverity::Information,
                "actuate",
                format!(
                    "Pulse rejected: {} {}ms moves {:.6}° (< {:.6}°)",
                    op.direction(),
                    op.duration_ms(),
                    plan.displacement,
                    self.config.min_displacement_degrees
                ),
            );
            return Ok(PulseOutcome::Rejected);
        }

        let executor = self.executors.get(settings.mount_type)?;

        if plan.backlash_ms > 0 {
            self.monitor_as(
                MonitorCategory::Mount,
                MonitorSeverity::Debug,
                "actuate",
                format!("{} axis reversal, adding {}ms backlash", plan.axis, plan.backlash_ms),
            );
        }
        self.monitor_as(
            MonitorCategory::Mount,
            MonitorSeverity::Debug,
            "actuate",
            format!(
                "{} {} axis rate {:.6}°/s for {:?} via {}",
                op.direction(),
                plan.axis,
                plan.rate,
                plan.duration,
                executor.name()
            ),
        );

        let outcome = executor
            .pulse(plan.axis, plan.rate, plan.duration, cancel)
            .await?;

        match outcome {
            PulseOutcome::Cancelled => self.monitor(
                MonitorSeverity::Information,
                "actuate",
                format!("{} pulse on {} axis cancelled", op.direction(), plan.axis),
            ),
            _ => self.monitor(
                MonitorSeverity::Debug,
                "actuate",
                format!("{} pulse on {} axis complete", op.direction(), plan.axis),
            ),
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MountError;
    use crate::executor::test_support::RecordingExecutor;
    use crate::providers::LivePosition;
    use crate::telemetry::MemorySink;
    use crate::types::{GuideDirection, MountType};
    use crate::SIDEREAL_RATE_DEG_PER_SEC;
    use std::sync::Arc;

    fn actuator_with(
        settings: MountSettings,
    ) -> (PulseActuator, Arc<RecordingExecutor>, Arc<MemorySink>) {
        let executor = Arc::new(RecordingExecutor::default());
        let sink = Arc::new(MemorySink::default());
        let actuator = PulseActuator::new(
            MountExecutors::new().with(MountType::Simulator, executor.clone()),
            Arc::new(settings),
            sink.clone(),
            PulseGuideConfig::strict(),
        );
        (actuator, executor, sink)
    }

    #[test]
    fn test_plan_default_rate_and_sign() {
        let (actuator, _, _) = actuator_with(MountSettings::default());

        let east = PulseOperation::new(GuideDirection::East, 1000, 0.0).unwrap();
        let plan = actuator.plan(&east);
        assert_eq!(plan.axis, Axis::Primary);
        assert!((plan.rate + 0.5 * SIDEREAL_RATE_DEG_PER_SEC).abs() < 1e-12);

        let north = PulseOperation::new(GuideDirection::North, 1000, 0.01).unwrap();
        let plan = actuator.plan(&north);
        assert_eq!(plan.axis, Axis::Secondary);
        assert!((plan.rate - 0.01).abs() < 1e-12);
        assert!((plan.displacement - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_plan_southern_hemisphere_flips_primary() {
        let (actuator, _, _) = actuator_with(MountSettings {
            latitude: -30.0,
            ..Default::default()
        });
        let west = PulseOperation::new(GuideDirection::West, 500, 0.01).unwrap();
        assert!(actuator.plan(&west).rate < 0.0);
    }

    #[test]
    fn test_plan_pier_west_flips_secondary() {
        let (actuator, _, _) = actuator_with(MountSettings::default());
        let actuator = actuator.with_position_provider(Arc::new(LivePosition {
            side_of_pier: PierSide::West,
            ..Default::default()
        }));
        let north = PulseOperation::new(GuideDirection::North, 500, 0.01).unwrap();
        assert!(actuator.plan(&north).rate < 0.0);
    }

    #[test]
    fn test_plan_backlash_on_reversal() {
        let (actuator, _, _) = actuator_with(MountSettings {
            dec_backlash_ms: 150,
            ..Default::default()
        });
        let reversed = PulseOperation::new(GuideDirection::South, 500, 0.0)
            .unwrap()
            .with_previous_direction(Some(GuideDirection::North));
        let plan = actuator.plan(&reversed);
        assert_eq!(plan.backlash_ms, 150);
        assert_eq!(plan.duration, Duration::from_millis(650));

        // Primary axis never gets backlash
        let east = PulseOperation::new(GuideDirection::East, 500, 0.0)
            .unwrap()
            .with_previous_direction(Some(GuideDirection::West));
        assert_eq!(actuator.plan(&east).backlash_ms, 0);
    }

    #[tokio::test]
    async fn test_tiny_pulse_rejected_without_executor() {
        let (actuator, executor, sink) = actuator_with(MountSettings::default());
        // 0.5x sidereal for 10ms is ~0.00002 degrees
        let op = PulseOperation::new(GuideDirection::West, 10, 0.0).unwrap();

        let outcome = actuator.actuate(&op, CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, PulseOutcome::Rejected);
        assert!(executor.calls().is_empty());

        let rejected = sink.find("Pulse rejected");
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].severity, MonitorSeverity::Information);
        assert!(sink.entries_with(MonitorSeverity::Error).is_empty());
    }

    #[tokio::test]
    async fn test_actuate_dispatches_to_executor() {
        let (actuator, executor, _) = actuator_with(MountSettings::default());
        let op = PulseOperation::new(GuideDirection::North, 30, 0.05).unwrap();

        let outcome = actuator.actuate(&op, CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, PulseOutcome::Completed);

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].axis, Axis::Secondary);
        assert_eq!(calls[0].duration, Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_dispatch_logged_under_mount_category() {
        let (actuator, _, sink) = actuator_with(MountSettings::default());
        let op = PulseOperation::new(GuideDirection::West, 30, 0.05).unwrap();
        actuator.actuate(&op, CancellationToken::new()).await.unwrap();

        let mount = sink.entries_in(MonitorCategory::Mount);
        assert_eq!(mount.len(), 1);
        assert!(mount[0].message.contains("via Recording"));
    }

    /// Provider that bypasses `MountSettings::validate`
    struct UncheckedSettings(MountSettings);

    impl crate::providers::SettingsProvider for UncheckedSettings {
        fn settings(&self) -> MountSettings {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_invalid_live_settings_never_reach_executor() {
        let executor = Arc::new(RecordingExecutor::default());
        let actuator = PulseActuator::new(
            MountExecutors::new().with(MountType::Simulator, executor.clone()),
            Arc::new(UncheckedSettings(MountSettings {
                guide_rate_offset_x: f64::NAN,
                ..Default::default()
            })),
            Arc::new(MemorySink::default()),
            PulseGuideConfig::strict(),
        );
        let op = PulseOperation::new(GuideDirection::East, 1000, 0.0).unwrap();

        let err = actuator.actuate(&op, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MountError::InvalidSetting { ref name, .. } if name == "guide_rate_offset_x"));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unimplemented_mount_type_fails_fast() {
        let (actuator, executor, _) = actuator_with(MountSettings {
            mount_type: MountType::SkyWatcher,
            ..Default::default()
        });
        let op = PulseOperation::new(GuideDirection::North, 500, 0.05).unwrap();

        let err = actuator.actuate(&op, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MountError::NotImplemented { .. }));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_pulse_logged_as_information() {
        let (actuator, _, sink) = actuator_with(MountSettings::default());
        let op = PulseOperation::new(GuideDirection::East, 5000, 0.05).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let outcome = actuator.actuate(&op, token).await.unwrap();
        assert_eq!(outcome, PulseOutcome::Cancelled);
        let cancelled = sink.find("cancelled");
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].severity, MonitorSeverity::Information);
    }
}
