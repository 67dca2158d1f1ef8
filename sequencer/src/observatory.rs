//! The device set a flat run drives.

use crate::FlatError;
use domeflat_devices::{Camera, Dome, FilterWheel, ImageStore, Lamp, Telescope};
use std::collections::HashMap;
use std::sync::Arc;

/// Capability handles injected into the runner at construction.
///
/// Lamps are registered by identifier because the filter table names a lamp
/// per filter. The filter wheel and image store are optional: a rig without
/// a wheel images through whatever is in the light path, and a rig whose
/// camera hands pixels over in-memory never downloads.
#[derive(Clone)]
pub struct Observatory {
    pub telescope: Arc<dyn Telescope>,
    pub dome: Arc<dyn Dome>,
    pub camera: Arc<dyn Camera>,
    pub filterwheel: Option<Arc<dyn FilterWheel>>,
    pub lamps: HashMap<String, Arc<dyn Lamp>>,
    pub store: Option<Arc<dyn ImageStore>>,
}

impl Observatory {
    /// Look up a registered lamp by identifier.
    pub fn lamp(&self, id: &str) -> Result<Arc<dyn Lamp>, FlatError> {
        self.lamps
            .get(id)
            .cloned()
            .ok_or_else(|| FlatError::Config(format!("no lamp registered as '{id}'")))
    }
}
