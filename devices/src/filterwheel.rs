//! Filter wheel capability surface.

use crate::{DeviceError, DeviceResult};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Blocking filter wheel commands needed by the flat sequencer.
#[async_trait]
pub trait FilterWheel: Send + Sync {
    /// Move the wheel to the named filter. Returns once the wheel has
    /// settled.
    async fn set_filter(&self, name: &str) -> DeviceResult<()>;

    async fn filter_names(&self) -> DeviceResult<Vec<String>>;
}

/// Simulated filter wheel with a fixed filter set.
pub struct SimFilterWheel {
    names: Vec<String>,
    position: Mutex<usize>,
    latency: Duration,
}

impl SimFilterWheel {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            position: Mutex::new(0),
            latency: Duration::from_millis(25),
        }
    }

    pub fn current_filter(&self) -> String {
        self.names[*self.position.lock().unwrap()].clone()
    }
}

#[async_trait]
impl FilterWheel for SimFilterWheel {
    async fn set_filter(&self, name: &str) -> DeviceResult<()> {
        let slot = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| {
                DeviceError::command_failed(
                    "sim-filterwheel",
                    "set_filter",
                    format!("unknown filter '{name}'"),
                )
            })?;
        tracing::info!("[SIM] moving filter wheel to {} (slot {})", name, slot);
        tokio::time::sleep(self.latency).await;
        *self.position.lock().unwrap() = slot;
        Ok(())
    }

    async fn filter_names(&self) -> DeviceResult<Vec<String>> {
        Ok(self.names.clone())
    }
}
