//! Shared device error type
//!
//! Every capability trait in this crate reports failures through
//! [`DeviceError`], so callers can attach their own context without caring
//! which backend a device came from.

use thiserror::Error;

/// Errors reported by device proxies.
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    /// A command was accepted by the proxy but the device reported failure.
    #[error("{device}: command '{command}' failed: {reason}")]
    CommandFailed {
        device: String,
        command: String,
        reason: String,
    },

    /// The device is not connected.
    #[error("{device}: not connected")]
    NotConnected { device: String },

    /// The device does not implement the requested operation.
    #[error("{device}: operation not supported: {operation}")]
    NotSupported { device: String, operation: String },

    /// The device did not finish the operation in time.
    #[error("{device}: '{operation}' timed out after {timeout_secs:.1}s")]
    Timeout {
        device: String,
        operation: String,
        timeout_secs: f64,
    },

    /// A frame transfer from a remote store failed.
    #[error("transfer failed: {0}")]
    Transfer(String),
}

impl DeviceError {
    pub fn command_failed(
        device: impl Into<String>,
        command: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        DeviceError::CommandFailed {
            device: device.into(),
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn not_supported(device: impl Into<String>, operation: impl Into<String>) -> Self {
        DeviceError::NotSupported {
            device: device.into(),
            operation: operation.into(),
        }
    }

    /// Device the error originated from, when known.
    pub fn device(&self) -> Option<&str> {
        match self {
            DeviceError::CommandFailed { device, .. }
            | DeviceError::NotConnected { device }
            | DeviceError::NotSupported { device, .. }
            | DeviceError::Timeout { device, .. } => Some(device),
            DeviceError::Transfer(_) => None,
        }
    }
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display() {
        let err = DeviceError::command_failed("dome", "slew_to_az", "motor stalled");
        assert_eq!(err.to_string(), "dome: command 'slew_to_az' failed: motor stalled");
        assert_eq!(err.device(), Some("dome"));
    }

    #[test]
    fn test_transfer_has_no_device() {
        let err = DeviceError::Transfer("connection reset".to_string());
        assert!(err.device().is_none());
        assert!(err.to_string().contains("connection reset"));
    }
}
