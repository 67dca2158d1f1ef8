//! Controller settings and the per-filter flat table.

use crate::FlatError;
use domeflat_devices::PierSide;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Per-filter flat settings, one record per filter name in the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterProfile {
    /// Identifier of the lamp that illuminates flats for this filter.
    pub lamp: String,
    /// Fixed exposure time in seconds. Must be positive.
    pub exptime: f64,
}

/// Controller settings for the dome-flat position and exposure policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatConfig {
    /// Telescope altitude for flats, degrees.
    pub flat_alt: f64,
    /// Telescope azimuth for flats, degrees.
    pub flat_az: f64,
    /// Dome azimuth for flats, degrees.
    pub dome_az: f64,
    /// Pier side to take flats on, when the mount supports it.
    pub pier_side: Option<PierSide>,
    /// Exposure time increment, seconds. Carried in the schema for
    /// adaptive control; the acquisition loop runs fixed exposures and
    /// does not consume it.
    pub exptime_increment: f64,
    /// Maximum exposure time, seconds. Schema-only, as above.
    pub exptime_max: f64,
    /// Ideal flat level in counts. Schema-only, as above.
    pub ideal_counts: f64,
    /// Directory remote frames are downloaded into.
    pub download_dir: PathBuf,
}

impl Default for FlatConfig {
    fn default() -> Self {
        Self {
            flat_alt: 89.0,
            flat_az: 78.0,
            dome_az: 90.0,
            pier_side: None,
            exptime_increment: 0.2,
            exptime_max: 300.0,
            ideal_counts: 25_000.0,
            download_dir: std::env::temp_dir(),
        }
    }
}

/// Filter-name-keyed table of flat profiles, immutable for the duration of
/// a run.
#[derive(Debug, Clone, Default)]
pub struct FilterTable {
    profiles: HashMap<String, FilterProfile>,
}

impl FilterTable {
    pub fn new(profiles: HashMap<String, FilterProfile>) -> Self {
        Self { profiles }
    }

    /// Load the table from a JSON file. Lines starting with `#` are
    /// comments and ignored.
    pub fn load(path: &Path) -> Result<Self, FlatError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FlatError::Config(format!("reading {}: {e}", path.display())))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, FlatError> {
        let stripped: Vec<&str> = raw
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .collect();
        let profiles: HashMap<String, FilterProfile> = serde_json::from_str(&stripped.join("\n"))
            .map_err(|e| FlatError::Config(format!("malformed filter table: {e}")))?;

        for (filter, profile) in &profiles {
            if !(profile.exptime > 0.0) {
                return Err(FlatError::Config(format!(
                    "filter '{filter}': exptime must be positive, got {}",
                    profile.exptime
                )));
            }
        }
        Ok(Self { profiles })
    }

    pub fn get(&self, filter: &str) -> Result<&FilterProfile, FlatError> {
        self.profiles
            .get(filter)
            .ok_or_else(|| FlatError::Config(format!("no flat profile for filter '{filter}'")))
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
