//! The dome-flat sequence driver.

use crate::config::FilterProfile;
use crate::{acquisition, measure, positioning};
use crate::{AbortToken, FilterTable, FlatConfig, FlatError, FlatEvent, Observatory};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Phase the sequence is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Idle,
    Positioning,
    LampOn,
    Exposing,
    LampOff,
}

/// Snapshot of the current run, readable at any time via
/// [`FlatRunner::status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceState {
    pub filter: Option<String>,
    /// Requested exposure count; `None` is the run-until-aborted mode.
    pub requested: Option<u32>,
    pub completed: u32,
    pub lamp: Option<String>,
    /// Whether the abort signal has been observed by the run.
    pub aborted: bool,
    pub phase: RunPhase,
}

impl Default for SequenceState {
    fn default() -> Self {
        Self {
            filter: None,
            requested: None,
            completed: 0,
            lamp: None,
            aborted: false,
            phase: RunPhase::Idle,
        }
    }
}

/// Drives one flat sequence at a time against an injected device set.
///
/// A run performs the positioning phase once, switches the profile's lamp
/// on, then loops acquiring and measuring exposures until the requested
/// count is reached or the sequence is aborted. The lamp is switched off
/// exactly once per run, whatever the outcome.
pub struct FlatRunner {
    obs: Observatory,
    cfg: FlatConfig,
    filters: FilterTable,
    abort: AbortToken,
    state: Arc<RwLock<SequenceState>>,
    event_tx: broadcast::Sender<FlatEvent>,
}

impl FlatRunner {
    pub fn new(obs: Observatory, cfg: FlatConfig, filters: FilterTable) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            obs,
            cfg,
            filters,
            abort: AbortToken::new(),
            state: Arc::new(RwLock::new(SequenceState::default())),
            event_tx,
        }
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<FlatEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot of the current sequence state.
    pub fn status(&self) -> SequenceState {
        self.state.read().unwrap().clone()
    }

    /// Clone of the run's cancellation token.
    ///
    /// Setting it stops the run at the next checkpoint; prefer
    /// [`FlatRunner::abort`], which also aborts the exposure in flight.
    pub fn abort_token(&self) -> AbortToken {
        self.abort.clone()
    }

    /// Request cancellation: set the flag and tell the camera to abort the
    /// exposure in flight. Both always happen; the flag alone cannot
    /// interrupt a blocking exposure.
    pub async fn abort(&self) {
        self.abort.set();
        if let Err(e) = self.obs.camera.abort_exposure().await {
            tracing::warn!("camera abort failed: {e}");
        }
    }

    /// Spawn the sequence as a background task.
    pub fn start(
        self: &Arc<Self>,
        filter: impl Into<String>,
        count: Option<u32>,
    ) -> tokio::task::JoinHandle<Result<u32, FlatError>> {
        let runner = Arc::clone(self);
        let filter = filter.into();
        tokio::spawn(async move { runner.run(&filter, count).await })
    }

    /// Run a full flat sequence on `filter`.
    ///
    /// `Some(0)` performs positioning and the lamp cycle with no exposures;
    /// `None` keeps exposing until the sequence is aborted. Returns the
    /// number of completed exposures; an abort is a normal completion, any
    /// other failure is returned after the lamp-off attempt.
    pub async fn run(&self, filter: &str, count: Option<u32>) -> Result<u32, FlatError> {
        self.abort.clear();

        // Resolve the profile and its lamp up front: a request the table
        // cannot satisfy fails before any hardware motion.
        let profile = match self.filters.get(filter) {
            Ok(profile) => profile.clone(),
            Err(e) => {
                self.finish(0, false, Some(&e));
                return Err(e);
            }
        };
        let lamp = match self.obs.lamp(&profile.lamp) {
            Ok(lamp) => lamp,
            Err(e) => {
                self.finish(0, false, Some(&e));
                return Err(e);
            }
        };

        tracing::info!(
            "starting flat sequence: filter {}, {} exposures at {:.1}s, lamp {}",
            filter,
            count.map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
            profile.exptime,
            profile.lamp
        );

        {
            let mut state = self.state.write().unwrap();
            *state = SequenceState {
                filter: Some(filter.to_string()),
                requested: count,
                completed: 0,
                lamp: Some(profile.lamp.clone()),
                aborted: false,
                phase: RunPhase::Positioning,
            };
        }

        // Positioning failures are non-fatal: log and proceed to imaging.
        if let Err(e) = positioning::move_dome(&self.obs, &self.cfg).await {
            tracing::warn!("dome positioning failed, continuing: {e}");
        }
        if let Err(e) = positioning::position_for_flats(&self.obs, &self.cfg).await {
            tracing::warn!("telescope positioning failed, continuing: {e}");
        }

        self.set_phase(RunPhase::LampOn);
        let loop_result = match positioning::lamp_on(&lamp).await {
            Ok(()) => self.exposure_loop(filter, &profile, count).await,
            Err(e) => Err(e),
        };

        // Lamp-off runs exactly once, whatever happened above.
        self.set_phase(RunPhase::LampOff);
        tracing::debug!("done taking flats, switching lamp off");
        let lamp_off = positioning::lamp_off(&lamp).await;

        let (completed, aborted) = {
            let state = self.state.read().unwrap();
            (state.completed, state.aborted)
        };

        let outcome = match (loop_result, lamp_off) {
            (Ok(()), Ok(())) => Ok(completed),
            (Ok(()), Err(e)) => Err(e),
            (Err(e), off) => {
                if let Err(off_err) = off {
                    tracing::error!("lamp off failed after run error: {off_err}");
                }
                Err(e)
            }
        };

        match outcome {
            Ok(completed) => {
                self.finish(completed, aborted, None);
                Ok(completed)
            }
            Err(e) => {
                self.finish(completed, aborted, Some(&e));
                Err(e)
            }
        }
    }

    async fn exposure_loop(
        &self,
        filter: &str,
        profile: &FilterProfile,
        count: Option<u32>,
    ) -> Result<(), FlatError> {
        let mut index = 0u32;
        loop {
            if let Some(n) = count {
                if index >= n {
                    break;
                }
            }

            // Checkpoint: never start a new exposure once the flag is set.
            if self.abort.is_set() {
                tracing::warn!("abort observed, stopping before exposure {index}");
                self.mark_aborted();
                break;
            }

            self.set_phase(RunPhase::Exposing);
            let taken = acquisition::take_image(
                &self.obs,
                &self.cfg,
                &self.abort,
                profile.exptime,
                filter,
                true,
            )
            .await;
            let (path, frame) = match taken {
                Ok(taken) => taken,
                Err(FlatError::Aborted) => {
                    tracing::warn!("exposure {index} aborted");
                    self.mark_aborted();
                    break;
                }
                Err(e) => return Err(e),
            };

            let level = measure::flat_level(&path, &frame)?;
            tracing::debug!("done taking image, average counts = {level:.1}");

            let _ = self.event_tx.send(FlatEvent::ExposureComplete {
                filter: filter.to_string(),
                index,
                exposure_secs: profile.exptime,
                mean_counts: level,
            });

            self.state.write().unwrap().completed += 1;
            index += 1;
        }
        Ok(())
    }

    fn finish(&self, completed: u32, aborted: bool, error: Option<&FlatError>) {
        {
            let mut state = self.state.write().unwrap();
            state.phase = RunPhase::Idle;
            state.completed = completed;
            state.aborted = aborted;
        }
        let _ = self.event_tx.send(FlatEvent::SequenceFinished {
            completed,
            aborted,
            error: error.map(|e| e.to_string()),
        });
    }

    fn set_phase(&self, phase: RunPhase) {
        self.state.write().unwrap().phase = phase;
    }

    fn mark_aborted(&self) {
        self.state.write().unwrap().aborted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domeflat_devices::{
        Camera, DeviceResult, Dome, ExposureRequest, Frame, Lamp, PierSide, Telescope,
    };
    use domeflat_imaging::ImageData;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Mutex, OnceLock};

    /// Shared chronological record of device commands.
    #[derive(Clone, Default)]
    struct OpLog(Arc<Mutex<Vec<String>>>);

    impl OpLog {
        fn push(&self, op: &str) {
            self.0.lock().unwrap().push(op.to_string());
        }

        fn ops(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn count(&self, op: &str) -> usize {
            self.ops().iter().filter(|o| o.as_str() == op).count()
        }

        fn position(&self, op: &str) -> Option<usize> {
            self.ops().iter().position(|o| o == op)
        }
    }

    struct MockTelescope {
        log: OpLog,
        /// Trips the run's abort token mid-positioning when installed.
        abort_on_slew: OnceLock<AbortToken>,
    }

    impl MockTelescope {
        fn new(log: &OpLog) -> Arc<Self> {
            Arc::new(Self {
                log: log.clone(),
                abort_on_slew: OnceLock::new(),
            })
        }
    }

    #[async_trait]
    impl Telescope for MockTelescope {
        async fn slew_to_alt_az(&self, _alt_deg: f64, _az_deg: f64) -> DeviceResult<()> {
            self.log.push("tel.slew");
            if let Some(token) = self.abort_on_slew.get() {
                token.set();
            }
            Ok(())
        }

        async fn can_set_pier_side(&self) -> DeviceResult<bool> {
            Ok(false)
        }

        async fn set_pier_side(&self, _side: PierSide) -> DeviceResult<()> {
            self.log.push("tel.pier");
            Ok(())
        }

        async fn pier_side(&self) -> DeviceResult<PierSide> {
            Ok(PierSide::East)
        }

        async fn is_tracking(&self) -> DeviceResult<bool> {
            Ok(true)
        }

        async fn stop_tracking(&self) -> DeviceResult<()> {
            self.log.push("tel.stop_tracking");
            Ok(())
        }
    }

    struct MockDome {
        log: OpLog,
        fail: bool,
    }

    #[async_trait]
    impl Dome for MockDome {
        async fn stop_following(&self) -> DeviceResult<()> {
            self.log.push("dome.stand");
            Ok(())
        }

        async fn slew_to_az(&self, _az_deg: f64) -> DeviceResult<()> {
            if self.fail {
                return Err(domeflat_devices::DeviceError::command_failed(
                    "dome",
                    "slew_to_az",
                    "shutter jammed",
                ));
            }
            self.log.push("dome.slew");
            Ok(())
        }
    }

    struct MockLamp {
        log: OpLog,
    }

    #[async_trait]
    impl Lamp for MockLamp {
        async fn switch_on(&self) -> DeviceResult<()> {
            self.log.push("lamp.on");
            Ok(())
        }

        async fn switch_off(&self) -> DeviceResult<()> {
            self.log.push("lamp.off");
            Ok(())
        }

        async fn is_on(&self) -> DeviceResult<bool> {
            Ok(false)
        }
    }

    struct MockCamera {
        log: OpLog,
        level: u16,
        calls: AtomicU32,
        aborts: AtomicU32,
        /// 1-based call number that returns no frames; 0 = never.
        empty_at_call: u32,
        /// 1-based call number that trips the abort token; 0 = never.
        abort_at_call: u32,
        token: OnceLock<AbortToken>,
    }

    impl MockCamera {
        fn new(log: &OpLog, level: u16) -> Arc<Self> {
            Arc::new(Self {
                log: log.clone(),
                level,
                calls: AtomicU32::new(0),
                aborts: AtomicU32::new(0),
                empty_at_call: 0,
                abort_at_call: 0,
                token: OnceLock::new(),
            })
        }

        fn expose_calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Camera for MockCamera {
        async fn expose(&self, request: &ExposureRequest) -> DeviceResult<Vec<Frame>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.log.push("cam.expose");

            if self.abort_at_call != 0 && call == self.abort_at_call {
                if let Some(token) = self.token.get() {
                    token.set();
                }
            }
            if self.empty_at_call != 0 && call == self.empty_at_call {
                return Ok(Vec::new());
            }
            Ok(vec![Frame::in_memory(
                request.filename.clone(),
                ImageData::uniform(8, 8, self.level),
            )])
        }

        async fn abort_exposure(&self) -> DeviceResult<()> {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            self.log.push("cam.abort");
            Ok(())
        }
    }

    fn observatory(log: &OpLog, camera: Arc<MockCamera>) -> Observatory {
        observatory_with(log, camera, MockTelescope::new(log), false)
    }

    fn observatory_with(
        log: &OpLog,
        camera: Arc<MockCamera>,
        telescope: Arc<MockTelescope>,
        dome_fails: bool,
    ) -> Observatory {
        let mut lamps: HashMap<String, Arc<dyn Lamp>> = HashMap::new();
        lamps.insert("L1".to_string(), Arc::new(MockLamp { log: log.clone() }));
        Observatory {
            telescope,
            dome: Arc::new(MockDome {
                log: log.clone(),
                fail: dome_fails,
            }),
            camera,
            filterwheel: None,
            lamps,
            store: None,
        }
    }

    fn filter_table() -> FilterTable {
        let mut profiles = HashMap::new();
        profiles.insert(
            "R".to_string(),
            FilterProfile {
                lamp: "L1".to_string(),
                exptime: 5.0,
            },
        );
        FilterTable::new(profiles)
    }

    fn runner(obs: Observatory) -> FlatRunner {
        FlatRunner::new(obs, FlatConfig::default(), filter_table())
    }

    fn expect_finished(event: FlatEvent) -> (u32, bool, Option<String>) {
        match event {
            FlatEvent::SequenceFinished {
                completed,
                aborted,
                error,
            } => (completed, aborted, error),
            other => panic!("expected SequenceFinished, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_three_flats_emit_three_progress_events() {
        let log = OpLog::default();
        let camera = MockCamera::new(&log, 1000);
        let runner = runner(observatory(&log, camera.clone()));
        let mut events = runner.subscribe();

        let completed = runner.run("R", Some(3)).await.unwrap();
        assert_eq!(completed, 3);
        assert_eq!(camera.expose_calls(), 3);

        for expected in 0..3u32 {
            match events.try_recv().unwrap() {
                FlatEvent::ExposureComplete {
                    filter,
                    index,
                    exposure_secs,
                    mean_counts,
                } => {
                    assert_eq!(filter, "R");
                    assert_eq!(index, expected);
                    assert_eq!(exposure_secs, 5.0);
                    assert_eq!(mean_counts, 1000.0);
                }
                other => panic!("expected ExposureComplete, got {other:?}"),
            }
        }
        let (done, aborted, error) = expect_finished(events.try_recv().unwrap());
        assert_eq!(done, 3);
        assert!(!aborted);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_lamp_cycle_wraps_the_run() {
        let log = OpLog::default();
        let camera = MockCamera::new(&log, 1000);
        let runner = runner(observatory(&log, camera));

        runner.run("R", Some(2)).await.unwrap();

        assert_eq!(log.count("lamp.on"), 1);
        assert_eq!(log.count("lamp.off"), 1);
        let on = log.position("lamp.on").unwrap();
        let off = log.position("lamp.off").unwrap();
        assert!(on < off);
        // Positioning precedes the lamp, exposures land between on and off.
        assert!(log.position("dome.slew").unwrap() < on);
        assert!(log.position("tel.slew").unwrap() < on);
        let first_expose = log.position("cam.expose").unwrap();
        assert!(on < first_expose && first_expose < off);
    }

    #[tokio::test]
    async fn test_zero_count_runs_lamp_cycle_only() {
        let log = OpLog::default();
        let camera = MockCamera::new(&log, 1000);
        let runner = runner(observatory(&log, camera.clone()));
        let mut events = runner.subscribe();

        let completed = runner.run("R", Some(0)).await.unwrap();
        assert_eq!(completed, 0);
        assert_eq!(camera.expose_calls(), 0);
        assert_eq!(log.count("lamp.on"), 1);
        assert_eq!(log.count("lamp.off"), 1);

        let (done, aborted, error) = expect_finished(events.try_recv().unwrap());
        assert_eq!(done, 0);
        assert!(!aborted);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_unknown_filter_fails_without_device_calls() {
        let log = OpLog::default();
        let camera = MockCamera::new(&log, 1000);
        let runner = runner(observatory(&log, camera));
        let mut events = runner.subscribe();

        let err = runner.run("Z", Some(1)).await.unwrap_err();
        assert!(matches!(err, FlatError::Config(_)));
        assert!(log.ops().is_empty());

        let (done, aborted, error) = expect_finished(events.try_recv().unwrap());
        assert_eq!(done, 0);
        assert!(!aborted);
        assert!(error.unwrap().contains("filter 'Z'"));
    }

    #[tokio::test]
    async fn test_unknown_lamp_fails_without_device_calls() {
        let log = OpLog::default();
        let camera = MockCamera::new(&log, 1000);
        let mut obs = observatory(&log, camera);
        obs.lamps.clear();
        let runner = runner(obs);

        let err = runner.run("R", Some(1)).await.unwrap_err();
        assert!(matches!(err, FlatError::Config(_)));
        assert!(log.ops().is_empty());
    }

    #[tokio::test]
    async fn test_abort_during_positioning_takes_no_exposures() {
        let log = OpLog::default();
        let camera = MockCamera::new(&log, 1000);
        let telescope = MockTelescope::new(&log);
        let runner = runner(observatory_with(&log, camera.clone(), telescope.clone(), false));
        let _ = telescope.abort_on_slew.set(runner.abort_token());
        let mut events = runner.subscribe();

        let completed = runner.run("R", Some(3)).await.unwrap();
        assert_eq!(completed, 0);
        assert_eq!(camera.expose_calls(), 0);
        assert_eq!(log.count("lamp.on"), 1);
        assert_eq!(log.count("lamp.off"), 1);

        let (done, aborted, _) = expect_finished(events.try_recv().unwrap());
        assert_eq!(done, 0);
        assert!(aborted);
    }

    #[tokio::test]
    async fn test_abort_during_third_exposure_keeps_two() {
        let log = OpLog::default();
        let mut camera = MockCamera::new(&log, 1000);
        Arc::get_mut(&mut camera).unwrap().abort_at_call = 3;
        let runner = runner(observatory(&log, camera.clone()));
        let _ = camera.token.set(runner.abort_token());
        let mut events = runner.subscribe();

        let completed = runner.run("R", Some(5)).await.unwrap();
        assert_eq!(completed, 2);
        // The aborted exposure still ran; its frame was discarded.
        assert_eq!(camera.expose_calls(), 3);
        assert_eq!(log.count("lamp.off"), 1);

        // Two progress events, then the terminal one.
        for expected in 0..2u32 {
            match events.try_recv().unwrap() {
                FlatEvent::ExposureComplete { index, .. } => assert_eq!(index, expected),
                other => panic!("expected ExposureComplete, got {other:?}"),
            }
        }
        let (done, aborted, error) = expect_finished(events.try_recv().unwrap());
        assert_eq!(done, 2);
        assert!(aborted);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_unbounded_run_stops_on_abort() {
        let log = OpLog::default();
        let mut camera = MockCamera::new(&log, 1000);
        Arc::get_mut(&mut camera).unwrap().abort_at_call = 4;
        let runner = runner(observatory(&log, camera.clone()));
        let _ = camera.token.set(runner.abort_token());

        let completed = runner.run("R", None).await.unwrap();
        assert_eq!(completed, 3);
        assert_eq!(log.count("lamp.off"), 1);
        assert!(runner.status().aborted);
    }

    #[tokio::test]
    async fn test_empty_camera_result_is_fatal_after_lamp_off() {
        let log = OpLog::default();
        let mut camera = MockCamera::new(&log, 1000);
        Arc::get_mut(&mut camera).unwrap().empty_at_call = 1;
        let runner = runner(observatory(&log, camera));
        let mut events = runner.subscribe();

        let err = runner.run("R", Some(3)).await.unwrap_err();
        assert!(matches!(err, FlatError::Acquisition(_)));
        assert_eq!(log.count("lamp.off"), 1);
        assert!(log.position("lamp.on").unwrap() < log.position("lamp.off").unwrap());

        let (done, aborted, error) = expect_finished(events.try_recv().unwrap());
        assert_eq!(done, 0);
        assert!(!aborted);
        assert!(error.unwrap().contains("no frames"));
    }

    #[tokio::test]
    async fn test_positioning_failure_is_tolerated() {
        let log = OpLog::default();
        let camera = MockCamera::new(&log, 1000);
        let telescope = MockTelescope::new(&log);
        let runner = runner(observatory_with(&log, camera.clone(), telescope, true));

        let completed = runner.run("R", Some(1)).await.unwrap();
        assert_eq!(completed, 1);
        assert_eq!(log.count("dome.slew"), 0);
        assert_eq!(log.count("lamp.on"), 1);
        assert_eq!(log.count("lamp.off"), 1);
    }

    #[tokio::test]
    async fn test_abort_issues_one_camera_abort() {
        let log = OpLog::default();
        let camera = MockCamera::new(&log, 1000);
        let runner = runner(observatory(&log, camera.clone()));

        runner.abort().await;
        assert_eq!(camera.aborts.load(Ordering::SeqCst), 1);
        assert!(runner.abort_token().is_set());

        runner.abort().await;
        assert_eq!(camera.aborts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_status_reflects_completed_run() {
        let log = OpLog::default();
        let camera = MockCamera::new(&log, 1000);
        let runner = runner(observatory(&log, camera));

        assert_eq!(runner.status().phase, RunPhase::Idle);

        runner.run("R", Some(2)).await.unwrap();

        let state = runner.status();
        assert_eq!(state.phase, RunPhase::Idle);
        assert_eq!(state.completed, 2);
        assert_eq!(state.requested, Some(2));
        assert_eq!(state.filter.as_deref(), Some("R"));
        assert_eq!(state.lamp.as_deref(), Some("L1"));
        assert!(!state.aborted);
    }

    #[tokio::test]
    async fn test_start_runs_in_background() {
        let log = OpLog::default();
        let camera = MockCamera::new(&log, 1000);
        let runner = Arc::new(runner(observatory(&log, camera)));

        let handle = runner.start("R", Some(1));
        let completed = handle.await.unwrap().unwrap();
        assert_eq!(completed, 1);
        assert_eq!(runner.status().completed, 1);
    }
}
