//! Dome capability surface.

use crate::DeviceResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Blocking dome commands needed by the flat sequencer.
#[async_trait]
pub trait Dome: Send + Sync {
    /// Stop slaving the dome slit to the telescope so an explicit slew
    /// sticks.
    async fn stop_following(&self) -> DeviceResult<()>;

    /// Rotate the slit to the given azimuth, in degrees. Returns once the
    /// dome has stopped.
    async fn slew_to_az(&self, az_deg: f64) -> DeviceResult<()>;
}

/// Simulated dome.
pub struct SimDome {
    az: Mutex<f64>,
    following: AtomicBool,
    latency: Duration,
}

impl SimDome {
    pub fn new() -> Self {
        Self {
            az: Mutex::new(0.0),
            following: AtomicBool::new(true),
            latency: Duration::from_millis(25),
        }
    }

    pub fn azimuth(&self) -> f64 {
        *self.az.lock().unwrap()
    }
}

impl Default for SimDome {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dome for SimDome {
    async fn stop_following(&self) -> DeviceResult<()> {
        tracing::info!("[SIM] dome no longer following telescope");
        self.following.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn slew_to_az(&self, az_deg: f64) -> DeviceResult<()> {
        tracing::info!("[SIM] slewing dome to az {:.1}", az_deg);
        tokio::time::sleep(self.latency).await;
        *self.az.lock().unwrap() = az_deg;
        Ok(())
    }
}
