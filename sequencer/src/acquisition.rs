//! Single-exposure acquisition.
//!
//! One call is one exposure: position the filter wheel, run the camera,
//! honor the abort flag the moment the camera call returns, and make sure
//! the frame's pixels end up locally readable.

use crate::{AbortToken, FlatConfig, FlatError, Observatory};
use chrono::Utc;
use domeflat_devices::{ExposureRequest, Frame};
use std::path::PathBuf;
use std::time::Instant;

/// Take one flat exposure through `filter` and return the captured frame
/// together with the local path its pixels can be read from.
pub async fn take_image(
    obs: &Observatory,
    cfg: &FlatConfig,
    abort: &AbortToken,
    exposure_secs: f64,
    filter: &str,
    download: bool,
) -> Result<(PathBuf, Frame), FlatError> {
    if let Some(wheel) = &obs.filterwheel {
        wheel
            .set_filter(filter)
            .await
            .map_err(|e| FlatError::Acquisition(e.to_string()))?;
    }

    let request = ExposureRequest::flat(exposure_secs, make_filename());
    tracing::debug!("start frame: {:?}", request);
    let frames = obs
        .camera
        .expose(&request)
        .await
        .map_err(|e| FlatError::Acquisition(e.to_string()))?;
    tracing::debug!("end frame");

    // The flag cannot interrupt an exposure in flight; it is honored here,
    // the moment the camera call returns, and the frame is discarded.
    if abort.is_set() {
        tracing::warn!("aborting exposure");
        return Err(FlatError::Aborted);
    }

    let frame = frames
        .into_iter()
        .next()
        .ok_or_else(|| FlatError::Acquisition("camera produced no frames".to_string()))?;

    let reported = PathBuf::from(&frame.filename);
    if download && frame.data.is_none() && !reported.exists() {
        let dest = cfg.download_dir.join(basename(&frame.filename));
        let store = obs.store.as_ref().ok_or_else(|| {
            FlatError::Download(format!(
                "frame {} is remote and no image store is configured",
                frame.filename
            ))
        })?;

        let t0 = Instant::now();
        tracing::debug!("downloading {} to {}", frame.filename, dest.display());
        store
            .fetch(&frame, &dest)
            .await
            .map_err(|e| FlatError::Download(e.to_string()))?;
        tracing::debug!("finished download in {:.2}s", t0.elapsed().as_secs_f64());
        return Ok((dest, frame));
    }

    Ok((reported, frame))
}

/// Time-based, collision-resistant name for one exposure.
fn make_filename() -> String {
    Utc::now().format("domeflat-%Y%m%d-%H%M%S%3f.fits").to_string()
}

/// Final path segment, tolerating Windows separators when the camera host
/// is a Windows machine.
fn basename(path: &str) -> &str {
    path.rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(path)
}
