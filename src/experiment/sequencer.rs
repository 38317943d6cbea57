//! Capture sequencer
//!
//! Drives one light rotation: every round lights the next LED, fires the
//! camera and records the new object; images are downloaded either right
//! away or after the rotation, and a light-position file can be rewritten
//! for the finished set.
//!
//! # State machine
//!
//! ```text
//! Idle ──► Preparing ──► Capturing(1..=N) ──► Draining ──► Idle
//!             │                 │                 │
//!             └──── error ──────┴──── error ──────┴──► Idle
//! ```
//!
//! Within a round the light is always lit before the shutter fires, and an
//! object is only deleted from the camera after it has been written to disk.
//!
//! # Failure cleanup
//!
//! - Failure while preparing or capturing: every captured but not yet
//!   persisted object is downloaded into the output directory and then
//!   deleted (best effort). An object that cannot be downloaded is left on
//!   the camera with a warning. The dome is switched off (best effort) and
//!   the original error is returned.
//! - Failure while draining: the remaining objects are left on the camera so
//!   they can still be recovered, with a warning per object.
//!
//! Either way the list of pending objects is empty when `run_sequence`
//! returns, and no object is deleted before it is on disk.

use super::output::allocate_capture_dir;
use crate::config::SequenceSettings;
use crate::data::light_positions;
use crate::error::{CaptureError, CaptureResult};
use crate::hardware::capabilities::{CaptureDevice, CaptureHandle, Illuminator};
use crate::hardware::dome::LED_COUNT;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the rewritten light-position file inside the output directory
pub const LIGHT_POSITION_FILE: &str = "lights.lp";

/// Sequencer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceState {
    /// No sequence running
    Idle,
    /// Allocating output, focusing, disabling flash
    Preparing,
    /// Running the given round (1-based)
    Capturing {
        /// Current round
        round: usize,
    },
    /// Downloading deferred images
    Draining,
}

/// Parameters of one sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceOptions {
    /// Directory under which a fresh `captureN` directory is created
    pub destination_root: PathBuf,
    /// Number of captures (1..=64)
    pub total_rounds: usize,
    /// Download after the rotation instead of after each capture
    pub defer_download: bool,
    /// Focus once with all lights on, then lock focus
    pub autofocus: bool,
    /// Reference light-position file to rewrite for this sequence
    pub light_position_base: Option<PathBuf>,
}

impl SequenceOptions {
    /// Full 64-light sequence with deferred download and autofocus.
    pub fn new(destination_root: impl Into<PathBuf>) -> Self {
        Self {
            destination_root: destination_root.into(),
            total_rounds: LED_COUNT,
            defer_download: true,
            autofocus: true,
            light_position_base: None,
        }
    }

    /// Options taken from loaded settings.
    pub fn from_settings(settings: &SequenceSettings) -> Self {
        Self {
            destination_root: settings.save_dir.clone(),
            total_rounds: settings.total_rounds,
            defer_download: settings.defer_download,
            autofocus: settings.autofocus,
            light_position_base: settings.light_position_base.clone(),
        }
    }
}

/// Capture progress callback: `(current, total)`
pub type CaptureProgress<'a> = Box<dyn FnMut(usize, usize) + Send + 'a>;
/// Download progress callback: `(current, total, saved_path)`
pub type DownloadProgress<'a> = Box<dyn FnMut(usize, usize, &Path) + Send + 'a>;

/// Optional progress callbacks, invoked on the sequencer's task.
///
/// Callbacks must return quickly; the rig waits while they run.
#[derive(Default)]
pub struct ProgressHooks<'a> {
    on_capture: Option<CaptureProgress<'a>>,
    on_download: Option<DownloadProgress<'a>>,
}

impl<'a> ProgressHooks<'a> {
    /// No callbacks
    pub fn none() -> Self {
        Self::default()
    }

    /// Called after each capture.
    pub fn on_capture(mut self, f: impl FnMut(usize, usize) + Send + 'a) -> Self {
        self.on_capture = Some(Box::new(f));
        self
    }

    /// Called after each image is saved and removed from the camera.
    pub fn on_download(mut self, f: impl FnMut(usize, usize, &Path) + Send + 'a) -> Self {
        self.on_download = Some(Box::new(f));
        self
    }

    fn captured(&mut self, current: usize, total: usize) {
        if let Some(f) = self.on_capture.as_mut() {
            f(current, total);
        }
    }

    fn downloaded(&mut self, current: usize, total: usize, path: &Path) {
        if let Some(f) = self.on_download.as_mut() {
            f(current, total, path);
        }
    }
}

/// Result of a completed sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceReport {
    /// Allocated `captureN` directory
    pub output_dir: PathBuf,
    /// Saved images, in capture (light) order
    pub image_paths: Vec<PathBuf>,
    /// Rewritten light-position file, if one was produced
    pub light_position_file: Option<PathBuf>,
    /// When preparation began
    pub started_at: DateTime<Utc>,
    /// When the last step finished
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingDownload {
    round: usize,
    handle: CaptureHandle,
    path: PathBuf,
}

/// Working state of one sequence
struct CaptureSession {
    output_dir: PathBuf,
    total: usize,
    round: usize,
    focus_locked: bool,
    pending: VecDeque<PendingDownload>,
    image_paths: Vec<PathBuf>,
}

impl CaptureSession {
    fn new(output_dir: PathBuf, total: usize) -> Self {
        Self {
            output_dir,
            total,
            round: 0,
            focus_locked: false,
            pending: VecDeque::with_capacity(total),
            image_paths: Vec::with_capacity(total),
        }
    }

    fn image_path(&self, round: usize) -> PathBuf {
        self.output_dir.join(format!("{}.jpg", round))
    }
}

/// Orchestrates the dome and the camera through a capture sequence.
///
/// Owns both devices; run one sequencer per physical rig and never call it
/// concurrently.
pub struct CaptureSequencer<L: Illuminator, C: CaptureDevice> {
    dome: L,
    camera: C,
    state: SequenceState,
}

impl<L: Illuminator, C: CaptureDevice> CaptureSequencer<L, C> {
    /// Take ownership of both devices.
    pub fn new(dome: L, camera: C) -> Self {
        Self {
            dome,
            camera,
            state: SequenceState::Idle,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SequenceState {
        self.state
    }

    /// Light source
    pub fn dome(&self) -> &L {
        &self.dome
    }

    /// Camera
    pub fn camera(&self) -> &C {
        &self.camera
    }

    /// Release both devices.
    pub fn into_parts(self) -> (L, C) {
        (self.dome, self.camera)
    }

    /// Shoot one image with the lights as they are and save it to
    /// `destination`.
    ///
    /// The object is deleted from the camera once saved. If saving fails it
    /// stays on the camera.
    pub async fn preview(&mut self, destination: &Path) -> CaptureResult<()> {
        self.camera.activate_mode().await?;
        self.camera.set_flash(false).await?;
        let handle = self.camera.capture().await?;
        let entry = PendingDownload {
            round: 0,
            handle,
            path: destination.to_path_buf(),
        };
        if let Err(e) = self.persist(&entry).await {
            warn!("Preview object {} left on the camera: {}", handle, e);
            return Err(e);
        }
        info!("Preview saved to {}", destination.display());
        Ok(())
    }

    /// Focus on the current scene and lock focus again.
    pub async fn refocus(&mut self) -> CaptureResult<()> {
        self.camera.unlock_focus().await?;
        self.camera.autofocus().await?;
        self.camera.lock_focus().await
    }

    /// Run a complete capture sequence.
    ///
    /// # Errors
    /// - `CaptureError::Configuration` for a round count outside 1..=64
    /// - any device error, after the cleanup described in the module docs
    /// - `CaptureError::LightPositions` if the light-position rewrite fails;
    ///   the images are already saved at that point
    pub async fn run_sequence(
        &mut self,
        options: &SequenceOptions,
        hooks: &mut ProgressHooks<'_>,
    ) -> CaptureResult<SequenceReport> {
        if options.total_rounds == 0 || options.total_rounds > LED_COUNT {
            return Err(CaptureError::Configuration(format!(
                "total_rounds must be 1-{}, got {}",
                LED_COUNT, options.total_rounds
            )));
        }

        let started_at = Utc::now();
        self.state = SequenceState::Preparing;
        let output_dir = match allocate_capture_dir(&options.destination_root).await {
            Ok(dir) => dir,
            Err(e) => {
                self.state = SequenceState::Idle;
                return Err(e);
            }
        };
        info!(
            "Starting {}-round sequence into {}",
            options.total_rounds,
            output_dir.display()
        );

        let mut session = CaptureSession::new(output_dir, options.total_rounds);
        let result = self.run_stages(options, &mut session, hooks).await;
        self.state = SequenceState::Idle;
        let light_position_file = result?;

        info!(
            "Capture sequence finished: {} images (focus locked: {})",
            session.image_paths.len(),
            session.focus_locked
        );
        Ok(SequenceReport {
            output_dir: session.output_dir,
            image_paths: session.image_paths,
            light_position_file,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn run_stages(
        &mut self,
        options: &SequenceOptions,
        session: &mut CaptureSession,
        hooks: &mut ProgressHooks<'_>,
    ) -> CaptureResult<Option<PathBuf>> {
        if let Err(e) = self.prepare_and_capture(options, session, hooks).await {
            warn!("Sequence aborted in round {}: {}", session.round, e);
            self.salvage_pending(session).await;
            if let Err(off) = self.dome.all_off().await {
                warn!("Could not switch dome off after abort: {}", off);
            }
            return Err(e);
        }

        if let Err(e) = self.drain(session, hooks).await {
            warn!("Download aborted: {}", e);
            abandon_pending(session);
            return Err(e);
        }

        self.write_light_positions(options, session).await
    }

    async fn prepare_and_capture(
        &mut self,
        options: &SequenceOptions,
        session: &mut CaptureSession,
        hooks: &mut ProgressHooks<'_>,
    ) -> CaptureResult<()> {
        self.dome.all_off().await?;
        if options.autofocus {
            // Focus needs the subject lit, and must happen while unlocked.
            self.dome.all_on().await?;
            self.camera.unlock_focus().await?;
            debug!("Autofocusing");
            self.camera.autofocus().await?;
            self.camera.lock_focus().await?;
            session.focus_locked = true;
            self.dome.all_off().await?;
        }
        self.camera.set_flash(false).await?;

        let total = session.total;
        for round in 1..=total {
            self.state = SequenceState::Capturing { round };
            session.round = round;

            let light = self.dome.advance().await?;
            let handle = self.camera.capture().await?;
            let path = session.image_path(round);
            debug!("Round {}/{}: LED {} -> object {}", round, total, light, handle);

            session.pending.push_back(PendingDownload {
                round,
                handle,
                path: path.clone(),
            });
            session.image_paths.push(path.clone());
            hooks.captured(round, total);

            if !options.defer_download {
                if let Some(entry) = session.pending.back().cloned() {
                    self.persist(&entry).await?;
                    session.pending.pop_back();
                    hooks.downloaded(round, total, &path);
                }
            }
        }

        self.dome.all_off().await
    }

    async fn drain(
        &mut self,
        session: &mut CaptureSession,
        hooks: &mut ProgressHooks<'_>,
    ) -> CaptureResult<()> {
        if session.pending.is_empty() {
            return Ok(());
        }

        self.state = SequenceState::Draining;
        info!("Downloading {} deferred images", session.pending.len());
        let mut current = 0;
        while let Some(entry) = session.pending.front().cloned() {
            self.persist(&entry).await?;
            session.pending.pop_front();
            current += 1;
            hooks.downloaded(current, session.total, &entry.path);
        }
        debug!("All downloads done");
        Ok(())
    }

    /// Download then delete; the object is only deleted once saved.
    async fn persist(&mut self, entry: &PendingDownload) -> CaptureResult<()> {
        self.camera.download(entry.handle, &entry.path).await?;
        self.camera.delete(entry.handle).await
    }

    /// Save what was captured before an abort. Objects that cannot be
    /// downloaded stay on the camera.
    async fn salvage_pending(&mut self, session: &mut CaptureSession) {
        while let Some(entry) = session.pending.pop_front() {
            if let Err(e) = self.camera.download(entry.handle, &entry.path).await {
                warn!(
                    "Leaving object {} from round {} on the camera (not downloaded to {}): {}",
                    entry.handle,
                    entry.round,
                    entry.path.display(),
                    e
                );
                continue;
            }
            match self.camera.delete(entry.handle).await {
                Ok(()) => debug!(
                    "Saved object {} from round {} to {}",
                    entry.handle,
                    entry.round,
                    entry.path.display()
                ),
                Err(e) => warn!(
                    "Leaking object {} from round {} on the camera: {}",
                    entry.handle, entry.round, e
                ),
            }
        }
    }

    async fn write_light_positions(
        &self,
        options: &SequenceOptions,
        session: &CaptureSession,
    ) -> CaptureResult<Option<PathBuf>> {
        let Some(base) = options.light_position_base.as_deref() else {
            return Ok(None);
        };
        if !options.defer_download {
            warn!("Light-position rewrite only runs with deferred download; skipping");
            return Ok(None);
        }

        let output = session.output_dir.join(LIGHT_POSITION_FILE);
        light_positions::rewrite(base, &session.image_paths, &output).await?;
        info!("Light-position file written to {}", output.display());
        Ok(Some(output))
    }
}

fn abandon_pending(session: &mut CaptureSession) {
    for entry in session.pending.drain(..) {
        warn!(
            "Leaving object {} from round {} on the camera (not downloaded to {})",
            entry.handle,
            entry.round,
            entry.path.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockCamera, MockDome, RigEvent, RigLog};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;
    use tracing_test::traced_test;

    fn rig(log: &RigLog) -> CaptureSequencer<MockDome, MockCamera> {
        CaptureSequencer::new(MockDome::new(log.clone()), MockCamera::new(log.clone()))
    }

    fn options(root: &Path, rounds: usize) -> SequenceOptions {
        SequenceOptions {
            total_rounds: rounds,
            ..SequenceOptions::new(root)
        }
    }

    #[tokio::test]
    async fn test_deferred_sequence_orders_operations() {
        let root = tempdir().unwrap();
        let log = RigLog::new();
        let mut sequencer = rig(&log);
        let mut opts = options(root.path(), 3);
        opts.autofocus = false;

        let report = sequencer
            .run_sequence(&opts, &mut ProgressHooks::none())
            .await
            .unwrap();

        let events = log.events();
        assert_eq!(log.count(|e| matches!(e, RigEvent::Captured(_))), 3);
        assert_eq!(log.count(|e| matches!(e, RigEvent::Downloaded(..))), 3);
        assert_eq!(log.count(|e| matches!(e, RigEvent::Deleted(_))), 3);
        assert_eq!(log.count(|e| *e == RigEvent::AllOff), 2);
        assert_eq!(events.first(), Some(&RigEvent::AllOff));

        for n in 1..=3u32 {
            let handle = CaptureHandle(n);
            let pos = |target: &RigEvent| events.iter().position(|e| e == target).unwrap();
            let captured = pos(&RigEvent::Captured(handle));
            let path = report.output_dir.join(format!("{}.jpg", n));
            let downloaded = pos(&RigEvent::Downloaded(handle, path));
            let deleted = pos(&RigEvent::Deleted(handle));
            assert!(captured < downloaded && downloaded < deleted);
            // Light for this round was lit right before the shutter.
            assert_eq!(events[captured - 1], RigEvent::Light(n as usize - 1));
        }

        // Deferred: every capture happens before any download.
        let last_capture = events
            .iter()
            .rposition(|e| matches!(e, RigEvent::Captured(_)))
            .unwrap();
        let first_download = events
            .iter()
            .position(|e| matches!(e, RigEvent::Downloaded(..)))
            .unwrap();
        assert!(last_capture < first_download);

        assert_eq!(report.output_dir, root.path().join("capture0"));
        assert_eq!(report.image_paths.len(), 3);
        assert!(report.image_paths.iter().all(|p| p.exists()));
        assert!(sequencer.camera().stored().is_empty());
        assert_eq!(sequencer.state(), SequenceState::Idle);
    }

    #[tokio::test]
    async fn test_autofocus_runs_unlocked_then_locks_with_lights_on() {
        let root = tempdir().unwrap();
        let log = RigLog::new();
        let mut sequencer = rig(&log);

        sequencer
            .run_sequence(&options(root.path(), 1), &mut ProgressHooks::none())
            .await
            .unwrap();

        let events = log.events();
        assert_eq!(
            &events[..7],
            &[
                RigEvent::AllOff,
                RigEvent::AllOn,
                RigEvent::FocusUnlocked,
                RigEvent::Autofocus,
                RigEvent::FocusLocked,
                RigEvent::AllOff,
                RigEvent::Flash(false),
            ]
        );
        assert!(sequencer.camera().focus_locked());
    }

    #[tokio::test]
    async fn test_immediate_download_persists_each_round() {
        let root = tempdir().unwrap();
        let log = RigLog::new();
        let mut sequencer = rig(&log);
        let mut opts = options(root.path(), 2);
        opts.defer_download = false;
        opts.autofocus = false;

        let downloads = Arc::new(Mutex::new(Vec::new()));
        let sink = downloads.clone();
        let mut hooks = ProgressHooks::none().on_download(move |current, total, path| {
            sink.lock().unwrap().push((current, total, path.to_path_buf()));
        });
        let report = sequencer.run_sequence(&opts, &mut hooks).await.unwrap();
        drop(hooks);

        let events = log.events();
        let dir = report.output_dir.clone();
        assert_eq!(
            &events[2..],
            &[
                RigEvent::Light(0),
                RigEvent::Captured(CaptureHandle(1)),
                RigEvent::Downloaded(CaptureHandle(1), dir.join("1.jpg")),
                RigEvent::Deleted(CaptureHandle(1)),
                RigEvent::Light(1),
                RigEvent::Captured(CaptureHandle(2)),
                RigEvent::Downloaded(CaptureHandle(2), dir.join("2.jpg")),
                RigEvent::Deleted(CaptureHandle(2)),
                RigEvent::AllOff,
            ]
        );
        assert_eq!(
            *downloads.lock().unwrap(),
            vec![(1, 2, dir.join("1.jpg")), (2, 2, dir.join("2.jpg"))]
        );
    }

    #[tokio::test]
    async fn test_capture_progress_reports_every_round() {
        let root = tempdir().unwrap();
        let mut sequencer = rig(&RigLog::new());
        let mut seen = Vec::new();
        {
            let mut hooks = ProgressHooks::none().on_capture(|current, total| seen.push((current, total)));
            sequencer
                .run_sequence(&options(root.path(), 4), &mut hooks)
                .await
                .unwrap();
        }
        assert_eq!(seen, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    #[tokio::test]
    async fn test_second_sequence_gets_new_directory() {
        let root = tempdir().unwrap();
        let mut sequencer = rig(&RigLog::new());
        let opts = options(root.path(), 1);

        let first = sequencer
            .run_sequence(&opts, &mut ProgressHooks::none())
            .await
            .unwrap();
        let second = sequencer
            .run_sequence(&opts, &mut ProgressHooks::none())
            .await
            .unwrap();
        assert_eq!(first.output_dir, root.path().join("capture0"));
        assert_eq!(second.output_dir, root.path().join("capture1"));
    }

    #[tokio::test]
    async fn test_abort_saves_pending_before_delete_and_switches_off() {
        let root = tempdir().unwrap();
        let log = RigLog::new();
        let camera = MockCamera::new(log.clone()).fail_capture_at(3);
        let mut sequencer = CaptureSequencer::new(MockDome::new(log.clone()), camera);

        let err = sequencer
            .run_sequence(&options(root.path(), 5), &mut ProgressHooks::none())
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::CaptureIncomplete));

        let dir = root.path().join("capture0");
        let events = log.events();
        // Round 3 lit its LED, then the shutter failed.
        let abort = events
            .iter()
            .rposition(|e| *e == RigEvent::Light(2))
            .unwrap();
        assert_eq!(events[abort - 1], RigEvent::Captured(CaptureHandle(2)));
        assert_eq!(
            &events[abort + 1..],
            &[
                RigEvent::Downloaded(CaptureHandle(1), dir.join("1.jpg")),
                RigEvent::Deleted(CaptureHandle(1)),
                RigEvent::Downloaded(CaptureHandle(2), dir.join("2.jpg")),
                RigEvent::Deleted(CaptureHandle(2)),
                RigEvent::AllOff,
            ]
        );
        assert!(dir.join("1.jpg").exists());
        assert!(dir.join("2.jpg").exists());
        assert!(sequencer.camera().stored().is_empty());
        assert_eq!(sequencer.state(), SequenceState::Idle);
    }

    #[tokio::test]
    async fn test_abort_on_last_round_keeps_every_earlier_image() {
        let root = tempdir().unwrap();
        let log = RigLog::new();
        let camera = MockCamera::new(log.clone()).fail_capture_at(64);
        let mut sequencer = CaptureSequencer::new(MockDome::new(log.clone()), camera);

        let err = sequencer
            .run_sequence(&options(root.path(), 64), &mut ProgressHooks::none())
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::CaptureIncomplete));

        // Nothing leaves the card without first reaching the disk.
        let events = log.events();
        for n in 1..=63u32 {
            let handle = CaptureHandle(n);
            let downloaded = events
                .iter()
                .position(|e| matches!(e, RigEvent::Downloaded(h, _) if *h == handle))
                .unwrap();
            let deleted = events
                .iter()
                .position(|e| *e == RigEvent::Deleted(handle))
                .unwrap();
            assert!(downloaded < deleted);
        }
        let saved = std::fs::read_dir(root.path().join("capture0")).unwrap().count();
        assert_eq!(saved, 63);
        assert!(sequencer.camera().stored().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_abort_logs_leaked_handle() {
        let root = tempdir().unwrap();
        let log = RigLog::new();
        let camera = MockCamera::new(log.clone())
            .fail_capture_at(2)
            .fail_delete_of(CaptureHandle(1));
        let mut sequencer = CaptureSequencer::new(MockDome::new(log.clone()), camera);

        assert!(sequencer
            .run_sequence(&options(root.path(), 3), &mut ProgressHooks::none())
            .await
            .is_err());

        assert!(logs_contain("Leaking object 0x00000001 from round 1"));
        assert_eq!(sequencer.camera().stored(), vec![CaptureHandle(1)]);
        assert!(root.path().join("capture0").join("1.jpg").exists());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_immediate_download_stays_on_camera() {
        let root = tempdir().unwrap();
        let log = RigLog::new();
        let camera = MockCamera::new(log.clone()).fail_download_of(CaptureHandle(2));
        let mut sequencer = CaptureSequencer::new(MockDome::new(log.clone()), camera);
        let mut opts = options(root.path(), 3);
        opts.defer_download = false;

        let err = sequencer
            .run_sequence(&opts, &mut ProgressHooks::none())
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Storage { handle: 2, .. }));
        assert_eq!(sequencer.camera().stored(), vec![CaptureHandle(2)]);
        assert!(!log.events().contains(&RigEvent::Deleted(CaptureHandle(2))));
        assert_eq!(log.count(|e| matches!(e, RigEvent::Captured(_))), 2);
        assert!(logs_contain("Leaving object 0x00000002 from round 2"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_drain_failure_leaves_remaining_objects() {
        let root = tempdir().unwrap();
        let log = RigLog::new();
        let camera = MockCamera::new(log.clone()).fail_download_of(CaptureHandle(2));
        let mut sequencer = CaptureSequencer::new(MockDome::new(log.clone()), camera);

        let err = sequencer
            .run_sequence(&options(root.path(), 3), &mut ProgressHooks::none())
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Storage { handle: 2, .. }));

        assert_eq!(
            sequencer.camera().stored(),
            vec![CaptureHandle(2), CaptureHandle(3)]
        );
        assert!(logs_contain("Leaving object 0x00000003 from round 3"));
    }

    #[tokio::test]
    async fn test_preview_saves_then_deletes() {
        let root = tempdir().unwrap();
        let log = RigLog::new();
        let mut sequencer = rig(&log);
        let destination = root.path().join("preview.jpg");

        sequencer.preview(&destination).await.unwrap();

        assert_eq!(
            log.events(),
            vec![
                RigEvent::ModeActivated,
                RigEvent::Flash(false),
                RigEvent::Captured(CaptureHandle(1)),
                RigEvent::Downloaded(CaptureHandle(1), destination.clone()),
                RigEvent::Deleted(CaptureHandle(1)),
            ]
        );
        assert!(destination.exists());
        assert!(sequencer.camera().stored().is_empty());
        assert_eq!(sequencer.state(), SequenceState::Idle);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_preview_download_keeps_object() {
        let root = tempdir().unwrap();
        let log = RigLog::new();
        let camera = MockCamera::new(log.clone()).fail_download_of(CaptureHandle(1));
        let mut sequencer = CaptureSequencer::new(MockDome::new(log.clone()), camera);

        let err = sequencer
            .preview(&root.path().join("preview.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Storage { handle: 1, .. }));
        assert_eq!(sequencer.camera().stored(), vec![CaptureHandle(1)]);
        assert!(logs_contain("Preview object 0x00000001 left on the camera"));
    }

    #[tokio::test]
    async fn test_refocus_unlocks_focuses_and_locks() {
        let log = RigLog::new();
        let mut sequencer = rig(&log);

        sequencer.refocus().await.unwrap();
        sequencer.refocus().await.unwrap();

        assert_eq!(
            log.events(),
            vec![
                RigEvent::FocusUnlocked,
                RigEvent::Autofocus,
                RigEvent::FocusLocked,
                RigEvent::FocusUnlocked,
                RigEvent::Autofocus,
                RigEvent::FocusLocked,
            ]
        );
        assert!(sequencer.camera().focus_locked());
    }

    #[tokio::test]
    async fn test_rejects_invalid_round_count() {
        let root = tempdir().unwrap();
        let log = RigLog::new();
        let mut sequencer = rig(&log);

        for rounds in [0, 65] {
            let err = sequencer
                .run_sequence(&options(root.path(), rounds), &mut ProgressHooks::none())
                .await
                .unwrap_err();
            assert!(matches!(err, CaptureError::Configuration(_)));
        }
        assert!(log.events().is_empty());
        assert!(!root.path().join("capture0").exists());
    }

    #[tokio::test]
    async fn test_light_positions_written_for_deferred_sequence() {
        let root = tempdir().unwrap();
        let base = root.path().join("base.lp");
        std::fs::write(&base, "2\na.tga\t0.1 0.2 0.9\nb.tga\t-0.1 0.2 0.9\n").unwrap();
        let mut sequencer = rig(&RigLog::new());
        let mut opts = options(root.path(), 2);
        opts.light_position_base = Some(base);

        let report = sequencer
            .run_sequence(&opts, &mut ProgressHooks::none())
            .await
            .unwrap();

        let lp = report.light_position_file.unwrap();
        assert_eq!(lp, report.output_dir.join(LIGHT_POSITION_FILE));
        let contents = std::fs::read_to_string(lp).unwrap();
        let dir = report.output_dir.display();
        assert_eq!(
            contents,
            format!("2\n{dir}/1.jpg\t0.1 0.2 0.9\n{dir}/2.jpg\t-0.1 0.2 0.9\n")
        );
    }

    #[tokio::test]
    async fn test_light_position_mismatch_fails_after_saving_images() {
        let root = tempdir().unwrap();
        let base = root.path().join("base.lp");
        std::fs::write(&base, "2\na.tga\t0 0 1\nb.tga\t0 0 1\n").unwrap();
        let mut sequencer = rig(&RigLog::new());
        let mut opts = options(root.path(), 3);
        opts.light_position_base = Some(base);

        let err = sequencer
            .run_sequence(&opts, &mut ProgressHooks::none())
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::LightPositions(_)));

        let dir = root.path().join("capture0");
        assert!(dir.join("3.jpg").exists());
        assert!(!dir.join(LIGHT_POSITION_FILE).exists());
    }

    #[tokio::test]
    async fn test_light_positions_skipped_without_deferral() {
        let root = tempdir().unwrap();
        let base = root.path().join("base.lp");
        std::fs::write(&base, "1\na.tga\t0 0 1\n").unwrap();
        let mut sequencer = rig(&RigLog::new());
        let mut opts = options(root.path(), 1);
        opts.defer_download = false;
        opts.light_position_base = Some(base);

        let report = sequencer
            .run_sequence(&opts, &mut ProgressHooks::none())
            .await
            .unwrap();
        assert!(report.light_position_file.is_none());
    }
}
