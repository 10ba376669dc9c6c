//! Mount vocabulary: axes, guide directions, pier side, alignment and mount types
//!
//! Enum discriminants follow the ASCOM integer codes so values coming off the
//! device-interface layer can be decoded with `TryFrom<i32>`.

use crate::error::{MountError, MountResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Mechanical mount axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Right ascension / azimuth axis
    Primary = 0,
    /// Declination / altitude axis
    Secondary = 1,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::Primary, Axis::Secondary];

    /// Slot index for per-axis arrays
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Primary => write!(f, "Primary"),
            Axis::Secondary => write!(f, "Secondary"),
        }
    }
}

/// Guide direction for mount pulse guiding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuideDirection {
    North = 0,
    South = 1,
    East = 2,
    West = 3,
}

impl GuideDirection {
    /// Axis a direction drives. North/South move the secondary axis,
    /// East/West the primary.
    pub fn axis(self) -> Axis {
        resolve_axis(self)
    }

    /// Sign of motion before hemisphere and pier-side corrections
    pub fn sign(self) -> f64 {
        match self {
            GuideDirection::North | GuideDirection::West => 1.0,
            GuideDirection::South | GuideDirection::East => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            GuideDirection::North => GuideDirection::South,
            GuideDirection::South => GuideDirection::North,
            GuideDirection::East => GuideDirection::West,
            GuideDirection::West => GuideDirection::East,
        }
    }
}

impl TryFrom<i32> for GuideDirection {
    type Error = MountError;

    fn try_from(value: i32) -> MountResult<Self> {
        match value {
            0 => Ok(GuideDirection::North),
            1 => Ok(GuideDirection::South),
            2 => Ok(GuideDirection::East),
            3 => Ok(GuideDirection::West),
            other => Err(MountError::InvalidParameter(format!(
                "unknown guide direction {}",
                other
            ))),
        }
    }
}

impl fmt::Display for GuideDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuideDirection::North => write!(f, "North"),
            GuideDirection::South => write!(f, "South"),
            GuideDirection::East => write!(f, "East"),
            GuideDirection::West => write!(f, "West"),
        }
    }
}

/// Map a guide direction onto the axis it moves
pub fn resolve_axis(direction: GuideDirection) -> Axis {
    match direction {
        GuideDirection::North | GuideDirection::South => Axis::Secondary,
        GuideDirection::East | GuideDirection::West => Axis::Primary,
    }
}

/// Pier side enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PierSide {
    East = 0,
    West = 1,
    Unknown = -1,
}

impl From<i32> for PierSide {
    fn from(value: i32) -> Self {
        match value {
            0 => PierSide::East,
            1 => PierSide::West,
            _ => PierSide::Unknown,
        }
    }
}

impl fmt::Display for PierSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PierSide::East => write!(f, "East"),
            PierSide::West => write!(f, "West"),
            PierSide::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Alignment mode enum matching ASCOM AlignmentModes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentMode {
    AltAz = 0,
    Polar = 1,
    GermanPolar = 2,
}

impl TryFrom<i32> for AlignmentMode {
    type Error = MountError;

    fn try_from(value: i32) -> MountResult<Self> {
        match value {
            0 => Ok(AlignmentMode::AltAz),
            1 => Ok(AlignmentMode::Polar),
            2 => Ok(AlignmentMode::GermanPolar),
            other => Err(MountError::UnsupportedAlignmentMode(other)),
        }
    }
}

impl fmt::Display for AlignmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentMode::AltAz => write!(f, "AltAz"),
            AlignmentMode::Polar => write!(f, "Polar"),
            AlignmentMode::GermanPolar => write!(f, "GermanPolar"),
        }
    }
}

/// Kind of mount hardware behind the axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MountType {
    Simulator = 0,
    SkyWatcher = 1,
}

impl TryFrom<i32> for MountType {
    type Error = MountError;

    fn try_from(value: i32) -> MountResult<Self> {
        match value {
            0 => Ok(MountType::Simulator),
            1 => Ok(MountType::SkyWatcher),
            other => Err(MountError::UnsupportedMountType(other)),
        }
    }
}

impl fmt::Display for MountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountType::Simulator => write!(f, "Simulator"),
            MountType::SkyWatcher => write!(f, "SkyWatcher"),
        }
    }
}

/// Which side of the fork the tube sits on for polar alignments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PolarMode {
    #[default]
    Right,
    Left,
}

/// One pulse guide request. Built fresh for every start call and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseOperation {
    axis: Axis,
    direction: GuideDirection,
    duration_ms: u32,
    rate: f64,
    previous_direction: Option<GuideDirection>,
}

impl PulseOperation {
    /// `rate` is in degrees/sec; 0 selects the axis default guide rate.
    pub fn new(direction: GuideDirection, duration_ms: u32, rate: f64) -> MountResult<Self> {
        if duration_ms == 0 {
            return Err(MountError::InvalidParameter(
                "pulse duration must be greater than 0ms".to_string(),
            ));
        }
        if !rate.is_finite() {
            return Err(MountError::InvalidParameter(format!(
                "pulse rate must be finite, got {}",
                rate
            )));
        }
        Ok(Self {
            axis: resolve_axis(direction),
            direction,
            duration_ms,
            rate,
            previous_direction: None,
        })
    }

    /// Attach the direction of the last pulse on the same axis
    pub fn with_previous_direction(mut self, previous: Option<GuideDirection>) -> Self {
        self.previous_direction = previous;
        self
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn direction(&self) -> GuideDirection {
        self.direction
    }

    pub fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms as u64)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn uses_default_rate(&self) -> bool {
        self.rate == 0.0
    }

    pub fn previous_direction(&self) -> Option<GuideDirection> {
        self.previous_direction
    }

    /// True when this pulse reverses the previous one on the same axis
    pub fn reverses_previous(&self) -> bool {
        self.previous_direction == Some(self.direction.opposite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_axis_is_total() {
        assert_eq!(resolve_axis(GuideDirection::North), Axis::Secondary);
        assert_eq!(resolve_axis(GuideDirection::South), Axis::Secondary);
        assert_eq!(resolve_axis(GuideDirection::East), Axis::Primary);
        assert_eq!(resolve_axis(GuideDirection::West), Axis::Primary);
    }

    #[test]
    fn test_direction_codes() {
        assert_eq!(GuideDirection::try_from(0).unwrap(), GuideDirection::North);
        assert_eq!(GuideDirection::try_from(3).unwrap(), GuideDirection::West);
        assert!(GuideDirection::try_from(4).is_err());
    }

    #[test]
    fn test_alignment_mode_codes() {
        assert_eq!(AlignmentMode::try_from(2).unwrap(), AlignmentMode::GermanPolar);
        assert_eq!(
            AlignmentMode::try_from(5),
            Err(MountError::UnsupportedAlignmentMode(5))
        );
    }

    #[test]
    fn test_mount_type_codes() {
        assert_eq!(MountType::try_from(1).unwrap(), MountType::SkyWatcher);
        assert_eq!(MountType::try_from(-1), Err(MountError::UnsupportedMountType(-1)));
    }

    #[test]
    fn test_pier_side_codes() {
        assert_eq!(PierSide::from(0), PierSide::East);
        assert_eq!(PierSide::from(1), PierSide::West);
        assert_eq!(PierSide::from(42), PierSide::Unknown);
    }

    #[test]
    fn test_pulse_operation_validation() {
        assert!(PulseOperation::new(GuideDirection::North, 0, 0.0).is_err());
        assert!(PulseOperation::new(GuideDirection::North, 100, f64::NAN).is_err());

        let op = PulseOperation::new(GuideDirection::East, 250, 0.0).unwrap();
        assert_eq!(op.axis(), Axis::Primary);
        assert_eq!(op.duration(), Duration::from_millis(250));
        assert!(op.uses_default_rate());
        assert!(op.previous_direction().is_none());
    }

    #[test]
    fn test_pulse_operation_reversal() {
        let op = PulseOperation::new(GuideDirection::South, 100, 0.0)
            .unwrap()
            .with_previous_direction(Some(GuideDirection::North));
        assert!(op.reverses_previous());

        let op = PulseOperation::new(GuideDirection::South, 100, 0.0)
            .unwrap()
            .with_previous_direction(Some(GuideDirection::South));
        assert!(!op.reverses_previous());
    }
}
