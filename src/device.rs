//! The camera as the pipeline sees it.
//!
//! A [`DeviceHandle`] is a black box that yields discrete frames on demand,
//! can be started and stopped, and accepts parameter writes. Implementations
//! must be `Send + Sync`: the acquisition thread pulls frames while the
//! controlling thread may write settings at the same time, so any driver that
//! is not re-entrant has to serialise internally (see `camera::WebcamDevice`).

use crate::error::{Error, Result};
use crate::types::Setting;

/// Bits per pixel of the sensor buffer the pipeline rasterises into (8-bit, 3 channels).
pub const SENSOR_BITS_PER_PIXEL: u32 = 24;

/// One frame held by the acquisition loop for a single iteration.
pub trait RawFrame: Send {
    /// Decode this frame into `dst`, a `height * stride` byte buffer of
    /// `bits_per_pixel` pixels. On error the contents of `dst` are unspecified.
    fn rasterize(
        &self,
        width: u32,
        height: u32,
        stride: usize,
        bits_per_pixel: u32,
        dst: &mut [u8],
    ) -> Result<()>;

    /// Hand the frame back to the device.
    fn release(self: Box<Self>);
}

pub trait DeviceHandle: Send + Sync {
    fn physical_width(&self) -> u32;
    fn physical_height(&self) -> u32;

    /// Connectivity probe, consulted once when a session opens.
    fn is_disconnected(&self) -> bool;

    fn start(&self) -> Result<()>;
    fn stop(&self);
    fn is_running(&self) -> bool;

    /// Next frame if one is ready. Latency is device-determined but bounded.
    fn next_frame(&self) -> Option<Box<dyn RawFrame>>;

    fn apply(&self, setting: Setting) -> Result<()>;

    /// Final release of driver resources. Called at most once, after `stop`.
    fn shutdown(&self) {}
}

/// Owns a [`RawFrame`] and returns it to the device exactly once,
/// whichever way the iteration ends.
pub struct FrameLease(Option<Box<dyn RawFrame>>);

impl FrameLease {
    pub fn new(frame: Box<dyn RawFrame>) -> Self {
        Self(Some(frame))
    }

    pub fn rasterize(
        &self,
        width: u32,
        height: u32,
        stride: usize,
        bits_per_pixel: u32,
        dst: &mut [u8],
    ) -> Result<()> {
        match &self.0 {
            Some(frame) => frame.rasterize(width, height, stride, bits_per_pixel, dst),
            None => Err(Error::Rasterize("frame already released".into())),
        }
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        if let Some(frame) = self.0.take() {
            frame.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFrame(Arc<AtomicUsize>);

    impl RawFrame for CountingFrame {
        fn rasterize(&self, _: u32, _: u32, _: usize, _: u32, _: &mut [u8]) -> Result<()> {
            Err(Error::Rasterize("corrupt".into()))
        }

        fn release(self: Box<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn lease_releases_once_even_after_failed_rasterize() {
        let released = Arc::new(AtomicUsize::new(0));
        {
            let lease = FrameLease::new(Box::new(CountingFrame(released.clone())));
            let mut dst = [0u8; 3];
            assert!(lease.rasterize(1, 1, 3, SENSOR_BITS_PER_PIXEL, &mut dst).is_err());
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn released_lease_refuses_to_rasterize() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut lease = FrameLease::new(Box::new(CountingFrame(released.clone())));
        if let Some(frame) = lease.0.take() {
            frame.release();
        }
        let mut dst = [0u8; 3];
        let result = lease.rasterize(1, 1, 3, SENSOR_BITS_PER_PIXEL, &mut dst);
        assert!(matches!(result, Err(Error::Rasterize(_))));
        drop(lease);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
