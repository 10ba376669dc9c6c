//! Error types for mount motion control
//!
//! Errors fall into a small number of groups:
//! - Configuration errors: unsupported alignment mode or mount type, bad settings.
//!   These are fatal to the operation and never retried.
//! - Lifecycle errors: use of a disposed controller, no async runtime.
//! - Actuation errors: executor faults and missing executor paths.
//!
//! Expected cancellation is not an error and has no variant here.

use crate::types::{Axis, MountType};
use thiserror::Error;

/// Mount core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MountError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================

    #[error("Unsupported alignment mode: {0}")]
    UnsupportedAlignmentMode(i32),

    #[error("Unsupported mount type: {0}")]
    UnsupportedMountType(i32),

    #[error("Invalid setting: {name} = {value} ({reason})")]
    InvalidSetting {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Settings parse error: {0}")]
    SettingsParse(String),

    // =========================================================================
    // Parameter Validation Errors
    // =========================================================================

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================

    #[error("Pulse guide controller disposed")]
    Disposed,

    #[error("No async runtime available to run pulse guide")]
    NoRuntime,

    // =========================================================================
    // Actuation Errors
    // =========================================================================

    /// No executor exists for this mount type yet
    #[error("Not implemented: {operation} for {mount_type} mount")]
    NotImplemented {
        mount_type: MountType,
        operation: String,
    },

    #[error("Cancel timeout on {axis} axis after {timeout_ms}ms")]
    CancelTimeout { axis: Axis, timeout_ms: u64 },

    #[error("Actuation fault on {axis} axis: {message}")]
    ActuationFault { axis: Axis, message: String },

    #[error("Sidereal time unavailable: {0}")]
    SiderealTimeUnavailable(String),
}

impl MountError {
    /// Create an invalid setting error
    pub fn invalid_setting(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        MountError::InvalidSetting {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an actuation fault for an axis
    pub fn actuation_fault(axis: Axis, message: impl Into<String>) -> Self {
        MountError::ActuationFault {
            axis,
            message: message.into(),
        }
    }

    /// Configuration errors are never retried
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            MountError::UnsupportedAlignmentMode(_)
                | MountError::UnsupportedMountType(_)
                | MountError::InvalidSetting { .. }
                | MountError::SettingsParse(_)
                | MountError::NotImplemented { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, MountError::CancelTimeout { .. })
    }
}

impl From<serde_json::Error> for MountError {
    fn from(err: serde_json::Error) -> Self {
        MountError::SettingsParse(err.to_string())
    }
}

// Callers at the device-interface layer still speak string errors
impl From<MountError> for String {
    fn from(err: MountError) -> Self {
        err.to_string()
    }
}

/// Result type for mount operations
pub type MountResult<T> = Result<T, MountError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MountError::UnsupportedAlignmentMode(7);
        assert_eq!(err.to_string(), "Unsupported alignment mode: 7");

        let err = MountError::NotImplemented {
            mount_type: MountType::SkyWatcher,
            operation: "pulse guide".to_string(),
        };
        assert_eq!(err.to_string(), "Not implemented: pulse guide for SkyWatcher mount");

        let err = MountError::CancelTimeout {
            axis: Axis::Secondary,
            timeout_ms: 2000,
        };
        assert!(err.to_string().contains("Secondary"));
        assert!(err.to_string().contains("2000"));
    }

    #[test]
    fn test_error_classification() {
        assert!(MountError::UnsupportedMountType(9).is_configuration_error());
        assert!(MountError::invalid_setting("latitude", 91.0, "out of range").is_configuration_error());
        assert!(!MountError::Disposed.is_configuration_error());
        assert!(!MountError::actuation_fault(Axis::Primary, "boom").is_configuration_error());

        let timeout = MountError::CancelTimeout {
            axis: Axis::Primary,
            timeout_ms: 10,
        };
        assert!(timeout.is_timeout());
        assert!(!MountError::Disposed.is_timeout());
    }

    #[test]
    fn test_error_to_string_conversion() {
        let s: String = MountError::Disposed.into();
        assert_eq!(s, "Pulse guide controller disposed");
    }

    #[test]
    fn test_json_error_conversion() {
        let err: MountError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, MountError::SettingsParse(_)));
    }
}
