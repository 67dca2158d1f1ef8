//! Automated dome-flat calibration sequencing.
//!
//! Drives a telescope/dome/lamp/camera rig through a flat-field run:
//! position the dome and telescope once, switch the configured lamp on,
//! expose the requested number of frames through a named filter measuring
//! each frame's mean counts, then switch the lamp off whatever happened in
//! between. Cancellation is cooperative: an abort flag checked at defined
//! points, paired with a direct camera abort for the exposure in flight.

pub mod abort;
pub mod acquisition;
pub mod config;
pub mod error;
pub mod events;
pub mod measure;
pub mod observatory;
pub mod positioning;
pub mod runner;

pub use abort::AbortToken;
pub use config::{FilterProfile, FilterTable, FlatConfig};
pub use error::FlatError;
pub use events::FlatEvent;
pub use observatory::Observatory;
pub use runner::{FlatRunner, RunPhase, SequenceState};
