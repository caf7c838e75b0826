//! Lifecycle controller for one camera.
//!
//! ```text
//! Uninitialized -> Connected -> Capturing -> Stopped
//!        \             \
//!         `-------------`-> Disconnected   (absent device, failed probe or start)
//! ```
//!
//! The session owns the device handle and the acquisition thread. The thread
//! holds its own `Arc` to the device, so stopping never frees a device that
//! a still-running loop is using.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::acquisition::{Acquisition, Joined, LoopStats};
use crate::buffer::SharedFrameBuffer;
use crate::config::CaptureConfig;
use crate::device::DeviceHandle;
use crate::error::{Error, Result};
use crate::presentation::{self, GraphicsHost, Presented};
use crate::snapshot;
use crate::types::{DisplayMode, GainLevel, Setting, SnapshotKind, TextureHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Connected,
    Capturing,
    Stopped,
    /// Terminal: no usable device. Width and height read as 0.
    Disconnected,
}

pub struct CaptureSession {
    device: Option<Arc<dyn DeviceHandle>>,
    frames: Arc<SharedFrameBuffer>,
    config: CaptureConfig,
    connected: bool,
    state: Mutex<SessionState>,
    acquisition: Mutex<Option<Acquisition>>,
    texture: Mutex<Option<TextureHandle>>,
    mode: Mutex<DisplayMode>,
}

impl CaptureSession {
    /// Probe the device, program its defaults and start capturing.
    ///
    /// Never fails: a missing or broken device yields a session in the
    /// `Disconnected` state whose operations report `DeviceAbsent` /
    /// `Disconnected`.
    pub fn open(device: Option<Arc<dyn DeviceHandle>>, config: CaptureConfig) -> Self {
        let mut session = Self {
            device,
            frames: Arc::new(SharedFrameBuffer::new(0, 0)),
            config,
            connected: false,
            state: Mutex::new(SessionState::Uninitialized),
            acquisition: Mutex::new(None),
            texture: Mutex::new(None),
            mode: Mutex::new(DisplayMode::default()),
        };

        let Some(device) = session.device.clone() else {
            warn!("no camera found");
            *session.state.get_mut() = SessionState::Disconnected;
            return session;
        };
        if device.is_disconnected() {
            warn!("camera reports disconnected");
            *session.state.get_mut() = SessionState::Disconnected;
            return session;
        }
        *session.state.get_mut() = SessionState::Connected;

        match session.start_capture(device) {
            Ok(acquisition) => {
                session.connected = true;
                *session.acquisition.get_mut() = Some(acquisition);
                *session.state.get_mut() = SessionState::Capturing;
            }
            Err(e) => {
                warn!(error = %e, "failed to start capture");
                *session.state.get_mut() = SessionState::Disconnected;
            }
        }
        session
    }

    fn start_capture(&mut self, device: Arc<dyn DeviceHandle>) -> Result<Acquisition> {
        let (width, height) = (device.physical_width(), device.physical_height());
        self.frames = Arc::new(SharedFrameBuffer::new(width, height));

        for setting in self.config.device.settings()? {
            device.apply(setting)?;
        }
        device.start()?;

        let acquisition =
            Acquisition::spawn(device.clone(), self.frames.clone(), self.config.idle_backoff())
                .inspect_err(|_| device.stop())?;
        info!(width, height, "capture started");
        Ok(acquisition)
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Connectivity as probed at open; fixed for the session's lifetime.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn width(&self) -> u32 {
        self.live_device().map_or(0, |d| d.physical_width())
    }

    pub fn height(&self) -> u32 {
        self.live_device().map_or(0, |d| d.physical_height())
    }

    pub fn frames(&self) -> &SharedFrameBuffer {
        &self.frames
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    fn live_device(&self) -> Option<&Arc<dyn DeviceHandle>> {
        self.device.as_ref().filter(|_| self.connected)
    }

    /// The device, if parameter writes are currently allowed.
    fn writable_device(&self) -> Result<&Arc<dyn DeviceHandle>> {
        let Some(device) = self.device.as_ref() else {
            return Err(Error::DeviceAbsent);
        };
        match self.state() {
            SessionState::Disconnected => Err(Error::Disconnected),
            SessionState::Stopped => Err(Error::SessionStopped),
            _ => Ok(device),
        }
    }

    fn apply(&self, setting: Setting) -> Result<()> {
        let device = self.writable_device().inspect_err(|e| {
            warn!(?setting, error = %e, "ignoring device setting");
        })?;
        debug!(?setting, "applying device setting");
        device.apply(setting)
    }

    pub fn set_exposure(&self, exposure: i32) -> Result<()> {
        self.apply(Setting::Exposure(exposure))
    }

    pub fn set_intensity(&self, intensity: i32) -> Result<()> {
        self.apply(Setting::Intensity(intensity))
    }

    /// Levels outside `[0, 8)` are rejected before reaching the device.
    pub fn set_gain_level(&self, level: i32) -> Result<()> {
        let gain = GainLevel::new(level).inspect_err(|_| {
            debug!(level, "gain level out of range, ignored");
        })?;
        self.apply(Setting::Gain(gain))
    }

    /// `None` clears the target; presentation then skips until a new one is set.
    pub fn set_texture(&self, texture: Option<TextureHandle>) {
        *self.texture.lock() = texture;
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        *self.texture.lock()
    }

    pub fn display_mode(&self) -> DisplayMode {
        *self.mode.lock()
    }

    pub fn toggle_display_mode(&self) -> DisplayMode {
        let mut mode = self.mode.lock();
        *mode = mode.toggled();
        info!(mode = ?*mode, "display mode toggled");
        *mode
    }

    pub fn record_background(&self) -> Result<()> {
        self.frames.record_background()?;
        info!("background recorded");
        Ok(())
    }

    pub fn save(&self, kind: SnapshotKind, index: i32) -> Result<PathBuf> {
        snapshot::save(
            &self.frames,
            kind,
            self.display_mode(),
            &self.config.output_dir,
            index,
        )
    }

    pub fn save_current(&self, index: i32) -> Result<PathBuf> {
        self.save(SnapshotKind::Current, index)
    }

    pub fn save_original(&self, index: i32) -> Result<PathBuf> {
        self.save(SnapshotKind::Original, index)
    }

    pub fn save_subtracted(&self, index: i32) -> Result<PathBuf> {
        self.save(SnapshotKind::Subtracted, index)
    }

    /// Presentation step, called from the host's render callback.
    pub fn present(&self, host: &dyn GraphicsHost) -> Result<Presented> {
        presentation::present(&self.frames, self.display_mode(), self.texture(), host)
    }

    /// Stop the acquisition loop and release the device.
    ///
    /// Waits up to the configured timeout for the loop to notice the stop
    /// request; if it does not, stops the device (which ends any blocking
    /// grab) and waits once more. A loop that still has not exited is
    /// detached and `ShutdownTimeout` is returned; the loop then stops and
    /// shuts down the device itself when its last grab returns. Calling
    /// `stop` again is a no-op.
    pub fn stop(&self) -> Result<LoopStats> {
        let mut state = self.state.lock();
        if *state != SessionState::Capturing {
            return Ok(LoopStats::default());
        }
        *state = SessionState::Stopped;
        drop(state);

        let Some(acquisition) = self.acquisition.lock().take() else {
            return Ok(LoopStats::default());
        };
        let Some(device) = self.device.as_ref() else {
            return Ok(LoopStats::default());
        };
        let timeout = self.config.shutdown_timeout();

        let stats = match acquisition.stop(timeout) {
            Joined::Finished(stats) => stats,
            Joined::TimedOut(acquisition) => {
                warn!(?timeout, "acquisition loop slow to stop, stopping device");
                device.stop();
                match acquisition.join_timeout(timeout) {
                    Joined::Finished(stats) => stats,
                    Joined::TimedOut(acquisition) => match acquisition.detach() {
                        Some(stats) => stats,
                        None => return Err(Error::ShutdownTimeout(timeout * 2)),
                    },
                }
            }
        };

        device.stop();
        device.shutdown();
        info!(
            frames = stats.frames_acquired,
            missed = stats.frames_missed,
            "capture stopped"
        );
        Ok(stats)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "capture session dropped without a clean stop");
        }
    }
}
