//! Remote image store access.
//!
//! Cameras attached to a remote control machine report frame paths on that
//! machine; the store fetches those frames to a local path so their pixels
//! can be read.

use crate::{DeviceError, DeviceResult, Frame};
use async_trait::async_trait;
use std::path::Path;

/// Fetches frames that are not locally reachable.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Transfer `frame` into the local file `dest`.
    async fn fetch(&self, frame: &Frame, dest: &Path) -> DeviceResult<()>;
}

/// HTTP-backed image store.
pub struct HttpImageStore {
    client: reqwest::Client,
}

impl HttpImageStore {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpImageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn fetch(&self, frame: &Frame, dest: &Path) -> DeviceResult<()> {
        let url = frame.url.as_deref().ok_or_else(|| {
            DeviceError::Transfer(format!("frame {} has no download endpoint", frame.filename))
        })?;

        tracing::debug!("fetching {} -> {}", url, dest.display());
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DeviceError::Transfer(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DeviceError::Transfer(e.to_string()))?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| DeviceError::Transfer(format!("writing {}: {e}", dest.display())))?;
        Ok(())
    }
}
