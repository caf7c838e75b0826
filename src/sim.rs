//! Simulated camera for tests and the viewer demo.
//!
//! Renders a deterministic scene (diagonal gradient plus an optional bright
//! block) and keeps counters for frames issued/released and every setting
//! written, so callers can check the pipeline's side of the device contract.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::device::{DeviceHandle, RawFrame, SENSOR_BITS_PER_PIXEL};
use crate::error::{Error, Result};
use crate::types::{GainLevel, Setting};

/// Axis-aligned block drawn over the background gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub level: u8,
}

#[derive(Debug, Default)]
struct Scene {
    block: Option<Block>,
    // when set, the block drifts one pixel right per frame
    moving: bool,
}

#[derive(Debug, Default)]
struct Programmed {
    log: Vec<Setting>,
    gain: Option<GainLevel>,
    exposure: Option<i32>,
    intensity: Option<i32>,
}

pub struct SimulatedDevice {
    width: u32,
    height: u32,
    connected: bool,
    running: AtomicBool,
    shut_down: AtomicBool,
    polls: AtomicU64,
    issued: AtomicU64,
    released: Arc<AtomicU64>,
    miss_every: Option<u64>,
    corrupt_every: Option<u64>,
    frame_interval: Duration,
    scene: Mutex<Scene>,
    programmed: Mutex<Programmed>,
}

impl SimulatedDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            connected: true,
            running: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            polls: AtomicU64::new(0),
            issued: AtomicU64::new(0),
            released: Arc::new(AtomicU64::new(0)),
            miss_every: None,
            corrupt_every: None,
            frame_interval: Duration::ZERO,
            scene: Mutex::new(Scene::default()),
            programmed: Mutex::new(Programmed::default()),
        }
    }

    /// Probe reports the device as unplugged.
    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    /// Every `n`th poll returns no frame.
    pub fn miss_every(mut self, n: u64) -> Self {
        self.miss_every = Some(n.max(1));
        self
    }

    /// Every `n`th frame fails to rasterise.
    pub fn corrupt_every(mut self, n: u64) -> Self {
        self.corrupt_every = Some(n.max(1));
        self
    }

    /// Sleep this long inside `next_frame`, like a sensor exposing.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn show_block(&self, block: Block) {
        self.scene.lock().block = Some(block);
    }

    pub fn clear_block(&self) {
        self.scene.lock().block = None;
    }

    pub fn set_moving(&self, moving: bool) {
        self.scene.lock().moving = moving;
    }

    /// Mark the stream running without going through a session.
    pub fn start_streaming(&self) {
        self.running.store(true, Ordering::Release);
    }

    /// The device stops on its own, as if the cable were pulled.
    pub fn halt(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn frames_issued(&self) -> u64 {
        self.issued.load(Ordering::Acquire)
    }

    pub fn frames_released(&self) -> u64 {
        self.released.load(Ordering::Acquire)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn applied_settings(&self) -> Vec<Setting> {
        self.programmed.lock().log.clone()
    }

    pub fn gain(&self) -> Option<GainLevel> {
        self.programmed.lock().gain
    }

    pub fn exposure(&self) -> Option<i32> {
        self.programmed.lock().exposure
    }

    pub fn intensity(&self) -> Option<i32> {
        self.programmed.lock().intensity
    }

    fn render(&self, seq: u64) -> Vec<u8> {
        let (w, h) = (self.width, self.height);
        let span = (w + h).max(1);
        let mut pixels = Vec::with_capacity(w as usize * h as usize * 3);
        for y in 0..h {
            for x in 0..w {
                let v = ((x + y) * 200 / span) as u8;
                pixels.extend_from_slice(&[v, v / 2, 255 - v]);
            }
        }

        let scene = self.scene.lock();
        if let Some(block) = scene.block {
            let shift = if scene.moving && w > 0 { (seq % w as u64) as u32 } else { 0 };
            for y in block.y..(block.y + block.height).min(h) {
                for dx in 0..block.width {
                    let x = (block.x + dx + shift) % w.max(1);
                    let idx = (y as usize * w as usize + x as usize) * 3;
                    pixels[idx..idx + 3].fill(block.level);
                }
            }
        }
        pixels
    }
}

impl DeviceHandle for SimulatedDevice {
    fn physical_width(&self) -> u32 {
        self.width
    }

    fn physical_height(&self) -> u32 {
        self.height
    }

    fn is_disconnected(&self) -> bool {
        !self.connected
    }

    fn start(&self) -> Result<()> {
        if !self.connected {
            return Err(Error::CameraInit("simulated device is unplugged".into()));
        }
        self.start_streaming();
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn next_frame(&self) -> Option<Box<dyn RawFrame>> {
        if !self.frame_interval.is_zero() {
            thread::sleep(self.frame_interval);
        }
        let poll = self.polls.fetch_add(1, Ordering::AcqRel) + 1;
        if self.miss_every.is_some_and(|n| poll % n == 0) {
            return None;
        }

        let seq = self.issued.fetch_add(1, Ordering::AcqRel) + 1;
        Some(Box::new(SimFrame {
            width: self.width,
            height: self.height,
            pixels: self.render(seq),
            corrupt: self.corrupt_every.is_some_and(|n| seq % n == 0),
            released: self.released.clone(),
        }))
    }

    fn apply(&self, setting: Setting) -> Result<()> {
        let mut programmed = self.programmed.lock();
        match setting {
            Setting::Gain(level) => programmed.gain = Some(level),
            Setting::Exposure(value) => programmed.exposure = Some(value),
            Setting::Intensity(value) => programmed.intensity = Some(value),
            _ => {}
        }
        programmed.log.push(setting);
        Ok(())
    }

    fn shutdown(&self) {
        debug!("simulated device shut down");
        self.shut_down.store(true, Ordering::Release);
    }
}

struct SimFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    corrupt: bool,
    released: Arc<AtomicU64>,
}

impl RawFrame for SimFrame {
    fn rasterize(
        &self,
        width: u32,
        height: u32,
        stride: usize,
        bits_per_pixel: u32,
        dst: &mut [u8],
    ) -> Result<()> {
        if self.corrupt {
            return Err(Error::Rasterize("simulated corrupt frame".into()));
        }
        if bits_per_pixel != SENSOR_BITS_PER_PIXEL || (width, height) != (self.width, self.height) {
            return Err(Error::Rasterize(format!(
                "requested {width}x{height}@{bits_per_pixel}bpp, frame is {}x{}@24bpp",
                self.width, self.height
            )));
        }
        let row = width as usize * 3;
        if stride < row || dst.len() < stride * height as usize {
            return Err(Error::Rasterize("destination buffer too small".into()));
        }
        for (src, out) in self.pixels.chunks_exact(row).zip(dst.chunks_mut(stride)) {
            out[..row].copy_from_slice(src);
        }
        Ok(())
    }

    fn release(self: Box<Self>) {
        self.released.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_scene_repeats_exactly() {
        let sim = SimulatedDevice::new(8, 4);
        assert_eq!(sim.render(1), sim.render(2));
    }

    #[test]
    fn block_is_drawn_at_its_level() {
        let sim = SimulatedDevice::new(8, 4);
        sim.show_block(Block { x: 2, y: 1, width: 2, height: 2, level: 7 });
        let pixels = sim.render(1);
        let idx = (8 + 2) * 3;
        assert_eq!(&pixels[idx..idx + 3], &[7, 7, 7]);

        sim.clear_block();
        assert_eq!(sim.render(1), SimulatedDevice::new(8, 4).render(1));
    }

    #[test]
    fn unplugged_device_refuses_to_start() {
        let sim = SimulatedDevice::new(8, 4).disconnected();
        assert!(sim.is_disconnected());
        assert!(sim.start().is_err());
        assert!(!sim.is_running());
    }

    #[test]
    fn rasterize_rejects_wrong_geometry() {
        let sim = SimulatedDevice::new(4, 2);
        let frame = sim.next_frame().unwrap();
        let mut dst = vec![0u8; 4 * 2 * 3];
        assert!(frame.rasterize(2, 2, 6, 24, &mut dst).is_err());
        assert!(frame.rasterize(4, 2, 12, 24, &mut dst).is_ok());
        frame.release();
        assert_eq!(sim.frames_released(), 1);
    }
}
