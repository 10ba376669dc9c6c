//! Read-only collaborator interfaces
//!
//! The core never reaches into process-wide state. Settings and live mount
//! position are handed in through these traits at construction time.

use crate::config::MountSettings;
use crate::error::{MountError, MountResult};
use crate::types::PierSide;
use std::sync::{Arc, RwLock};

/// Supplies the mount settings snapshot
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> MountSettings;
}

/// Supplies local sidereal time in hours
pub trait SiderealTimeSource: Send + Sync {
    fn sidereal_time(&self) -> MountResult<f64>;
}

/// Supplies the live state of the mount axes
pub trait PositionProvider: SiderealTimeSource {
    fn side_of_pier(&self) -> PierSide;

    /// Current app-axis positions in degrees, `[x, y]`
    fn axis_positions(&self) -> [f64; 2];

    fn is_southern_hemisphere(&self) -> bool;
}

pub type SharedSettingsProvider = Arc<dyn SettingsProvider>;
pub type SharedPositionProvider = Arc<dyn PositionProvider>;

impl SettingsProvider for MountSettings {
    fn settings(&self) -> MountSettings {
        self.clone()
    }
}

/// Settings that can be changed while the controller runs.
/// Every read hands out a full snapshot.
#[derive(Debug, Default)]
pub struct SettingsStore {
    inner: RwLock<MountSettings>,
}

impl SettingsStore {
    pub fn new(settings: MountSettings) -> MountResult<Self> {
        settings.validate()?;
        Ok(Self {
            inner: RwLock::new(settings),
        })
    }

    /// Apply a change, keeping the previous settings if the result is invalid
    pub fn update<F>(&self, change: F) -> MountResult<()>
    where
        F: FnOnce(&mut MountSettings),
    {
        // Write lock spans the whole read-modify-write
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = guard.clone();
        change(&mut next);
        next.validate()?;
        *guard = next;
        Ok(())
    }
}

impl SettingsProvider for SettingsStore {
    fn settings(&self) -> MountSettings {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Fixed position reading, for explicit values and tests
#[derive(Debug, Clone, PartialEq)]
pub struct LivePosition {
    pub sidereal_time: Option<f64>,
    pub side_of_pier: PierSide,
    pub axis_positions: [f64; 2],
    pub southern_hemisphere: bool,
}

impl Default for LivePosition {
    fn default() -> Self {
        Self {
            sidereal_time: None,
            side_of_pier: PierSide::Unknown,
            axis_positions: [0.0, 0.0],
            southern_hemisphere: false,
        }
    }
}

impl SiderealTimeSource for LivePosition {
    fn sidereal_time(&self) -> MountResult<f64> {
        self.sidereal_time
            .ok_or_else(|| MountError::SiderealTimeUnavailable("no reading".to_string()))
    }
}

impl PositionProvider for LivePosition {
    fn side_of_pier(&self) -> PierSide {
        self.side_of_pier
    }

    fn axis_positions(&self) -> [f64; 2] {
        self.axis_positions
    }

    fn is_southern_hemisphere(&self) -> bool {
        self.southern_hemisphere
    }
}
