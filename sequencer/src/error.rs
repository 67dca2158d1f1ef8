//! Error taxonomy for a flat run.

use domeflat_imaging::FitsError;
use thiserror::Error;

/// Errors raised by a dome-flat sequence.
#[derive(Error, Debug)]
pub enum FlatError {
    /// Unknown filter or lamp, or a malformed filter table. Raised before
    /// any hardware motion.
    #[error("configuration error: {0}")]
    Config(String),

    /// Telescope or dome positioning failed. The runner logs this and
    /// proceeds to imaging.
    #[error("positioning failed: {0}")]
    Positioning(String),

    /// The camera failed or produced no frames.
    #[error("acquisition failed: {0}")]
    Acquisition(String),

    /// A remote frame could not be transferred locally.
    #[error("image download failed: {0}")]
    Download(String),

    /// Switching the calibration lamp failed.
    #[error("lamp control failed: {0}")]
    Lamp(String),

    /// The abort signal was observed. A clean termination, not a failure.
    #[error("sequence aborted")]
    Aborted,

    /// A captured frame could not be parsed.
    #[error("image decode failed: {0}")]
    Decode(#[from] FitsError),
}

impl FlatError {
    /// True for the clean-cancellation outcome.
    pub fn is_abort(&self) -> bool {
        matches!(self, FlatError::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_classification() {
        assert!(FlatError::Aborted.is_abort());
        assert!(!FlatError::Config("x".into()).is_abort());
        assert!(!FlatError::Acquisition("x".into()).is_abort());
    }

    #[test]
    fn test_display() {
        let err = FlatError::Config("no flat profile for filter 'Z'".into());
        assert_eq!(err.to_string(), "configuration error: no flat profile for filter 'Z'");
    }
}
