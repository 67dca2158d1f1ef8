//! Brightness measurement of captured flats.

use crate::FlatError;
use domeflat_devices::Frame;
use std::path::Path;

/// Mean counts over every pixel of a captured frame.
///
/// Uses the in-memory buffer when the camera handed one over, otherwise
/// decodes the FITS file at `path`. No side effects.
pub fn flat_level(path: &Path, frame: &Frame) -> Result<f64, FlatError> {
    if let Some(data) = &frame.data {
        return Ok(data.mean());
    }
    let image = domeflat_imaging::read_image(path)?;
    Ok(image.mean())
}
