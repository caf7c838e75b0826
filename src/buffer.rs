//! The shared frame buffer group.
//!
//! [`SharedFrameBuffer`] is the single owner of the sensor image, the
//! background reference and the derived difference/presented images. All of
//! them sit behind one mutex and are only reachable through the methods
//! below, each of which is one critical section:
//!
//! * [`SharedFrameBuffer::with_writer`]: the acquisition loop's
//!   grab + rasterise + release of one frame.
//! * [`SharedFrameBuffer::present_with`]: processing plus the texture upload,
//!   so the presented bytes cannot change while the host copies them.
//!
//! Dimensions are fixed at construction; no method reallocates a buffer.

use image::{DynamicImage, RgbImage, RgbaImage};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::processing::{inverted_difference, widen_to_rgba};
use crate::types::{DisplayMode, SnapshotKind};

/// Bytes per pixel in the sensor image.
pub const SENSOR_CHANNELS: usize = 3;
/// Bytes per pixel in the presented image.
pub const PRESENTED_CHANNELS: usize = 4;

pub struct SharedFrameBuffer {
    width: u32,
    height: u32,
    state: Mutex<FrameState>,
}

struct FrameState {
    sensor: RgbImage,
    // rasterise target; swapped with `sensor` only when a frame decodes cleanly
    scratch: RgbImage,
    background: Option<RgbImage>,
    difference: RgbImage,
    presented: RgbaImage,
    frames: u64,
}

impl FrameState {
    fn new(width: u32, height: u32) -> Self {
        Self {
            sensor: RgbImage::new(width, height),
            scratch: RgbImage::new(width, height),
            background: None,
            difference: RgbImage::new(width, height),
            presented: RgbaImage::new(width, height),
            frames: 0,
        }
    }

    fn populated(&self) -> bool {
        self.frames > 0
    }

    fn refresh_difference(&mut self) {
        if self.background.is_none() {
            debug!("no background recorded, capturing current frame");
        }
        let background = self.background.get_or_insert_with(|| self.sensor.clone());
        inverted_difference(background, &self.sensor, &mut self.difference);
    }

    fn render(&mut self, mode: DisplayMode) -> &RgbaImage {
        match mode {
            DisplayMode::Original => widen_to_rgba(&self.sensor, &mut self.presented),
            DisplayMode::Subtracted => {
                self.refresh_difference();
                widen_to_rgba(&self.difference, &mut self.presented);
            }
        }
        &self.presented
    }
}

/// Write access to the sensor image for one acquisition iteration.
pub struct FrameWriter<'a> {
    state: &'a mut FrameState,
}

impl FrameWriter<'_> {
    /// Run `rasterize(dst, width, height, stride)` into a scratch buffer and
    /// publish it as the new sensor image only if it succeeds. A failed
    /// rasterise leaves the previous frame in place.
    pub fn commit<F>(&mut self, rasterize: F) -> Result<()>
    where
        F: FnOnce(&mut [u8], u32, u32, usize) -> Result<()>,
    {
        let (width, height) = self.state.scratch.dimensions();
        let stride = width as usize * SENSOR_CHANNELS;
        rasterize(&mut *self.state.scratch, width, height, stride)?;
        std::mem::swap(&mut self.state.sensor, &mut self.state.scratch);
        self.state.frames += 1;
        Ok(())
    }
}

impl SharedFrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            state: Mutex::new(FrameState::new(width, height)),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Hold the lock for the whole of `f`.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut FrameWriter<'_>) -> R) -> R {
        let mut state = self.state.lock();
        let mut writer = FrameWriter { state: &mut *state };
        f(&mut writer)
    }

    /// True once at least one frame has been rasterised.
    pub fn is_populated(&self) -> bool {
        self.state.lock().populated()
    }

    pub fn frames_written(&self) -> u64 {
        self.state.lock().frames
    }

    pub fn has_background(&self) -> bool {
        self.state.lock().background.is_some()
    }

    /// Replace the background with a deep copy of the current sensor image.
    pub fn record_background(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.populated() {
            return Err(Error::NoFrame);
        }
        let snapshot = state.sensor.clone();
        state.background = Some(snapshot);
        Ok(())
    }

    /// Derive the presented image for `mode` and hand it to `f` while the
    /// lock is still held. Returns `None` if no frame has arrived yet.
    pub fn present_with<R>(&self, mode: DisplayMode, f: impl FnOnce(&RgbaImage) -> R) -> Option<R> {
        let mut state = self.state.lock();
        if !state.populated() {
            return None;
        }
        Some(f(state.render(mode)))
    }

    /// Owned copy of one of the buffers, for encoding outside the lock.
    pub fn snapshot(&self, kind: SnapshotKind, mode: DisplayMode) -> Result<DynamicImage> {
        let mut state = self.state.lock();
        if !state.populated() {
            return Err(Error::NoFrame);
        }
        let image = match kind {
            SnapshotKind::Original => DynamicImage::ImageRgb8(state.sensor.clone()),
            SnapshotKind::Subtracted => {
                state.refresh_difference();
                DynamicImage::ImageRgb8(state.difference.clone())
            }
            SnapshotKind::Current => DynamicImage::ImageRgba8(state.render(mode).clone()),
        };
        Ok(image)
    }
}
