//! Progress events published by a flat run.

use serde::{Deserialize, Serialize};

/// One `ExposureComplete` per finished exposure, and exactly one
/// `SequenceFinished` per run whatever the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FlatEvent {
    ExposureComplete {
        filter: String,
        /// Zero-based exposure index, strictly increasing within a run.
        index: u32,
        exposure_secs: f64,
        mean_counts: f64,
    },
    SequenceFinished {
        completed: u32,
        aborted: bool,
        error: Option<String>,
    },
}
