//! Dome, telescope and lamp phases of a flat run.
//!
//! Each function issues blocking device commands and reports failures as
//! values; whether a failure ends the run is the caller's decision.

use crate::{FlatConfig, FlatError, Observatory};
use domeflat_devices::Lamp;
use std::sync::Arc;

/// Rotate the dome slit to the flat-field azimuth.
///
/// The dome is told to stop following the telescope first so the explicit
/// slew sticks.
pub async fn move_dome(obs: &Observatory, cfg: &FlatConfig) -> Result<(), FlatError> {
    tracing::debug!("moving dome to az {:.1}", cfg.dome_az);
    obs.dome
        .stop_following()
        .await
        .map_err(|e| FlatError::Positioning(e.to_string()))?;
    obs.dome
        .slew_to_az(cfg.dome_az)
        .await
        .map_err(|e| FlatError::Positioning(e.to_string()))?;
    Ok(())
}

/// Point the telescope at the flat-field position and stop tracking.
///
/// Pier side is set only when one is configured and the mount reports
/// supporting it; an unsupporting mount is logged and left as-is.
pub async fn position_for_flats(obs: &Observatory, cfg: &FlatConfig) -> Result<(), FlatError> {
    if let Some(side) = cfg.pier_side {
        match obs.telescope.can_set_pier_side().await {
            Ok(true) => {
                tracing::debug!("setting pier side to {side}");
                obs.telescope
                    .set_pier_side(side)
                    .await
                    .map_err(|e| FlatError::Positioning(e.to_string()))?;
            }
            Ok(false) => tracing::warn!("telescope does not support pier side"),
            Err(e) => return Err(FlatError::Positioning(e.to_string())),
        }
    }

    tracing::debug!("slewing telescope to alt {:.1} az {:.1}", cfg.flat_alt, cfg.flat_az);
    obs.telescope
        .slew_to_alt_az(cfg.flat_alt, cfg.flat_az)
        .await
        .map_err(|e| FlatError::Positioning(e.to_string()))?;

    if obs
        .telescope
        .is_tracking()
        .await
        .map_err(|e| FlatError::Positioning(e.to_string()))?
    {
        obs.telescope
            .stop_tracking()
            .await
            .map_err(|e| FlatError::Positioning(e.to_string()))?;
    }
    Ok(())
}

pub async fn lamp_on(lamp: &Arc<dyn Lamp>) -> Result<(), FlatError> {
    lamp.switch_on()
        .await
        .map_err(|e| FlatError::Lamp(e.to_string()))
}

pub async fn lamp_off(lamp: &Arc<dyn Lamp>) -> Result<(), FlatError> {
    lamp.switch_off()
        .await
        .map_err(|e| FlatError::Lamp(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domeflat_devices::{PierSide, SimCamera, SimDome, SimLamp, SimTelescope};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn sim_observatory(telescope: SimTelescope) -> Observatory {
        Observatory {
            telescope: Arc::new(telescope),
            dome: Arc::new(SimDome::new()),
            camera: Arc::new(SimCamera::new(8, 8, 1000)),
            filterwheel: None,
            lamps: HashMap::new(),
            store: None,
        }
    }

    #[tokio::test]
    async fn test_position_without_pier_support_succeeds() {
        let obs = sim_observatory(SimTelescope::without_pier_control());
        let cfg = FlatConfig {
            pier_side: Some(PierSide::West),
            ..FlatConfig::default()
        };

        position_for_flats(&obs, &cfg).await.unwrap();
        assert!(!obs.telescope.is_tracking().await.unwrap());
    }

    #[tokio::test]
    async fn test_move_dome_reaches_configured_azimuth() {
        let dome = Arc::new(SimDome::new());
        let obs = Observatory {
            telescope: Arc::new(SimTelescope::new()),
            dome: dome.clone(),
            camera: Arc::new(SimCamera::new(8, 8, 1000)),
            filterwheel: None,
            lamps: HashMap::new(),
            store: None,
        };

        move_dome(&obs, &FlatConfig::default()).await.unwrap();
        assert_eq!(dome.azimuth(), 90.0);
    }

    #[tokio::test]
    async fn test_lamp_cycle() {
        let lamp: Arc<dyn Lamp> = Arc::new(SimLamp::new("L1"));
        lamp_on(&lamp).await.unwrap();
        assert!(lamp.is_on().await.unwrap());
        lamp_off(&lamp).await.unwrap();
        assert!(!lamp.is_on().await.unwrap());
    }
}
