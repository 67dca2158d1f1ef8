//! Telescope capability surface.

use crate::{DeviceError, DeviceResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Side of the pier the mount sits on relative to the polar axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PierSide {
    East,
    West,
}

impl std::fmt::Display for PierSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PierSide::East => write!(f, "east"),
            PierSide::West => write!(f, "west"),
        }
    }
}

/// Blocking telescope commands needed by the flat sequencer.
#[async_trait]
pub trait Telescope: Send + Sync {
    /// Slew to a fixed horizontal position, in degrees. Returns once the
    /// mount has settled.
    async fn slew_to_alt_az(&self, alt_deg: f64, az_deg: f64) -> DeviceResult<()>;

    /// Whether the mount supports explicit pier-side control.
    async fn can_set_pier_side(&self) -> DeviceResult<bool>;

    async fn set_pier_side(&self, side: PierSide) -> DeviceResult<()>;

    async fn pier_side(&self) -> DeviceResult<PierSide>;

    async fn is_tracking(&self) -> DeviceResult<bool>;

    async fn stop_tracking(&self) -> DeviceResult<()>;
}

/// Simulated mount for bench runs and tests. Slews are token delays, state
/// is held in memory.
pub struct SimTelescope {
    tracking: AtomicBool,
    pier: Mutex<PierSide>,
    pier_control: bool,
    latency: Duration,
}

impl SimTelescope {
    pub fn new() -> Self {
        Self {
            tracking: AtomicBool::new(true),
            pier: Mutex::new(PierSide::East),
            pier_control: true,
            latency: Duration::from_millis(25),
        }
    }

    /// A mount that reports no pier-side support.
    pub fn without_pier_control() -> Self {
        Self {
            pier_control: false,
            ..Self::new()
        }
    }
}

impl Default for SimTelescope {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Telescope for SimTelescope {
    async fn slew_to_alt_az(&self, alt_deg: f64, az_deg: f64) -> DeviceResult<()> {
        tracing::info!("[SIM] slewing telescope to alt {:.1} az {:.1}", alt_deg, az_deg);
        tokio::time::sleep(self.latency).await;
        Ok(())
    }

    async fn can_set_pier_side(&self) -> DeviceResult<bool> {
        Ok(self.pier_control)
    }

    async fn set_pier_side(&self, side: PierSide) -> DeviceResult<()> {
        if !self.pier_control {
            return Err(DeviceError::not_supported("sim-telescope", "set_pier_side"));
        }
        tracing::info!("[SIM] setting pier side to {}", side);
        *self.pier.lock().unwrap() = side;
        Ok(())
    }

    async fn pier_side(&self) -> DeviceResult<PierSide> {
        Ok(*self.pier.lock().unwrap())
    }

    async fn is_tracking(&self) -> DeviceResult<bool> {
        Ok(self.tracking.load(Ordering::Relaxed))
    }

    async fn stop_tracking(&self) -> DeviceResult<()> {
        tracing::info!("[SIM] stopping tracking");
        self.tracking.store(false, Ordering::Relaxed);
        Ok(())
    }
}
