//! Camera capability surface.

use crate::DeviceResult;
use async_trait::async_trait;
use domeflat_imaging::ImageData;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shutter position during an exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shutter {
    Open,
    Closed,
}

/// What kind of frame an exposure produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    Light,
    Dark,
    Bias,
    Flat,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Light => "LIGHT",
            FrameKind::Dark => "DARK",
            FrameKind::Bias => "BIAS",
            FrameKind::Flat => "FLAT",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One exposure order for the camera. Built fresh per exposure, never
/// reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureRequest {
    pub exposure_secs: f64,
    pub frame_count: u32,
    pub shutter: Shutter,
    /// Destination name for the produced frame(s).
    pub filename: String,
    pub frame_kind: FrameKind,
}

impl ExposureRequest {
    /// A single open-shutter flat exposure.
    pub fn flat(exposure_secs: f64, filename: impl Into<String>) -> Self {
        Self {
            exposure_secs,
            frame_count: 1,
            shutter: Shutter::Open,
            filename: filename.into(),
            frame_kind: FrameKind::Flat,
        }
    }
}

/// A captured frame as reported by the camera backend.
///
/// `filename` is the path the backend stored the frame under and may live on
/// the camera host rather than this machine. Backends that hand pixels over
/// directly fill `data`; backends that serve frames over HTTP fill `url`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub filename: String,
    pub url: Option<String>,
    pub data: Option<ImageData>,
}

impl Frame {
    /// A frame whose pixels were returned in-memory.
    pub fn in_memory(filename: impl Into<String>, data: ImageData) -> Self {
        Self {
            filename: filename.into(),
            url: None,
            data: Some(data),
        }
    }

    /// A frame that lives on a remote store.
    pub fn remote(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: Some(url.into()),
            data: None,
        }
    }
}

/// Blocking camera commands needed by the flat sequencer.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Run one exposure order and return the captured frames. Blocks for
    /// the full exposure duration plus readout.
    async fn expose(&self, request: &ExposureRequest) -> DeviceResult<Vec<Frame>>;

    /// Abort the exposure in flight, if any. Safe to call when idle.
    async fn abort_exposure(&self) -> DeviceResult<()>;
}

/// Simulated camera producing uniform frames in memory.
pub struct SimCamera {
    width: u32,
    height: u32,
    level: u16,
}

impl SimCamera {
    pub fn new(width: u32, height: u32, level: u16) -> Self {
        Self {
            width,
            height,
            level,
        }
    }
}

#[async_trait]
impl Camera for SimCamera {
    async fn expose(&self, request: &ExposureRequest) -> DeviceResult<Vec<Frame>> {
        tracing::info!(
            "[SIM] {:.1}s {} exposure -> {}",
            request.exposure_secs,
            request.frame_kind,
            request.filename
        );
        tokio::time::sleep(Duration::from_secs_f64(request.exposure_secs)).await;

        let frames = (0..request.frame_count)
            .map(|_| {
                Frame::in_memory(
                    request.filename.clone(),
                    ImageData::uniform(self.width, self.height, self.level),
                )
            })
            .collect();
        Ok(frames)
    }

    async fn abort_exposure(&self) -> DeviceResult<()> {
        tracing::info!("[SIM] aborting exposure");
        Ok(())
    }
}
