//! Calibration lamp capability surface.

use crate::DeviceResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// A controllable flat-field illumination source.
#[async_trait]
pub trait Lamp: Send + Sync {
    async fn switch_on(&self) -> DeviceResult<()>;

    async fn switch_off(&self) -> DeviceResult<()>;

    async fn is_on(&self) -> DeviceResult<bool>;
}

/// Simulated lamp.
pub struct SimLamp {
    name: String,
    on: AtomicBool,
}

impl SimLamp {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Lamp for SimLamp {
    async fn switch_on(&self) -> DeviceResult<()> {
        tracing::info!("[SIM] lamp {} on", self.name);
        self.on.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn switch_off(&self) -> DeviceResult<()> {
        tracing::info!("[SIM] lamp {} off", self.name);
        self.on.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn is_on(&self) -> DeviceResult<bool> {
        Ok(self.on.load(Ordering::Relaxed))
    }
}
