//! Frame acquisition loop.
//!
//! One dedicated thread pulls frames from the device and rasterises them into
//! the shared sensor image. Each iteration holds the buffer lock across
//! grab + rasterise + release, so the presentation step only ever sees whole
//! frames. Stopping is cooperative: [`StopSignal`] is polled once per
//! iteration and [`Acquisition::stop`] waits for the thread with a deadline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::buffer::SharedFrameBuffer;
use crate::device::{DeviceHandle, FrameLease, SENSOR_BITS_PER_PIXEL};
use crate::error::{Error, Result};

/// Cancellation flag shared between the controller and the acquisition thread.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What the loop did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_acquired: u64,
    pub frames_missed: u64,
    pub rasterize_failures: u64,
}

// Who releases the device once the loop returns.
const OWNED: u8 = 0;
const EXITED: u8 = 1;
const ORPHANED: u8 = 2;

/// Handle to a running acquisition thread.
pub struct Acquisition {
    stop: StopSignal,
    // disconnects when the thread returns (or unwinds)
    exited: Receiver<()>,
    ownership: Arc<AtomicU8>,
    thread: Option<JoinHandle<LoopStats>>,
}

/// Outcome of a bounded wait on the acquisition thread.
#[derive(Debug)]
pub enum Joined {
    Finished(LoopStats),
    /// Still running after the deadline; the handle is returned for another try.
    TimedOut(Acquisition),
}

impl Acquisition {
    /// Spawn the loop on a named thread.
    pub fn spawn(
        device: Arc<dyn DeviceHandle>,
        frames: Arc<SharedFrameBuffer>,
        idle_backoff: Duration,
    ) -> Result<Self> {
        let stop = StopSignal::new();
        let (exited_tx, exited) = mpsc::channel();
        let ownership = Arc::new(AtomicU8::new(OWNED));
        let thread_stop = stop.clone();
        let thread_ownership = ownership.clone();
        let thread = thread::Builder::new()
            .name("frame-acquisition".into())
            .spawn(move || {
                let stats = run(device.clone(), frames, thread_stop, idle_backoff, exited_tx);
                let orphaned = thread_ownership
                    .compare_exchange(OWNED, EXITED, Ordering::AcqRel, Ordering::Acquire)
                    .is_err();
                if orphaned {
                    device.stop();
                    device.shutdown();
                    info!("detached acquisition loop released the device");
                }
                stats
            })
            .map_err(Error::Spawn)?;
        Ok(Self {
            stop,
            exited,
            ownership,
            thread: Some(thread),
        })
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait up to `timeout` for the thread to exit, then join it.
    pub fn join_timeout(mut self, timeout: Duration) -> Joined {
        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => Joined::TimedOut(self),
            // the sender never sends, so anything else means it was dropped
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let stats = match self.thread.take().map(JoinHandle::join) {
                    Some(Ok(stats)) => stats,
                    Some(Err(_)) => {
                        warn!("acquisition thread panicked");
                        LoopStats::default()
                    }
                    None => LoopStats::default(),
                };
                Joined::Finished(stats)
            }
        }
    }

    /// Request a stop and wait for it.
    pub fn stop(self, timeout: Duration) -> Joined {
        self.request_stop();
        self.join_timeout(timeout)
    }

    /// Give up on the thread. It keeps its own `Arc`s, so nothing it touches
    /// is freed underneath it, and it stops and shuts down the device when it
    /// finally returns.
    ///
    /// Returns `None` once detached. If the thread exited after the last wait
    /// it is joined instead, the device stays ours to release, and its stats
    /// are returned.
    pub fn detach(mut self) -> Option<LoopStats> {
        self.request_stop();
        let handle = self.thread.take()?;
        let handed_over = self
            .ownership
            .compare_exchange(OWNED, ORPHANED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if handed_over {
            warn!(thread = ?handle.thread().name(), "detaching acquisition thread");
            return None;
        }
        Some(handle.join().unwrap_or_default())
    }
}

impl std::fmt::Debug for Acquisition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquisition")
            .field("stop_requested", &self.stop.is_stop_requested())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        // never leave a loop running without an owner
        self.stop.request_stop();
    }
}

fn run(
    device: Arc<dyn DeviceHandle>,
    frames: Arc<SharedFrameBuffer>,
    stop: StopSignal,
    idle_backoff: Duration,
    _exited: Sender<()>,
) -> LoopStats {
    let started = Instant::now();
    let (width, height) = frames.dimensions();
    let mut stats = LoopStats::default();
    info!(width, height, "acquisition loop started");

    while !stop.is_stop_requested() && device.is_running() {
        let got_frame = frames.with_writer(|writer| {
            let Some(frame) = device.next_frame() else {
                return false;
            };
            let lease = FrameLease::new(frame);
            let result = writer.commit(|dst, w, h, stride| {
                lease.rasterize(w, h, stride, SENSOR_BITS_PER_PIXEL, dst)
            });
            match result {
                Ok(()) => stats.frames_acquired += 1,
                Err(e) => {
                    stats.rasterize_failures += 1;
                    debug!(error = %e, "keeping previous frame");
                }
            }
            true
            // `lease` drops here, inside the lock, returning the frame to the device
        });

        if !got_frame {
            stats.frames_missed += 1;
            if !idle_backoff.is_zero() {
                thread::sleep(idle_backoff);
            }
        }
    }

    info!(
        frames = stats.frames_acquired,
        missed = stats.frames_missed,
        failures = stats.rasterize_failures,
        elapsed = ?started.elapsed(),
        stop_requested = stop.is_stop_requested(),
        "acquisition loop exited"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedDevice;

    fn wait_for_frames(frames: &SharedFrameBuffer, n: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while frames.frames_written() < n {
            assert!(Instant::now() < deadline, "no frames arrived");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn loop_fills_buffer_and_releases_every_frame() {
        let sim = Arc::new(SimulatedDevice::new(16, 8));
        sim.start_streaming();
        let frames = Arc::new(SharedFrameBuffer::new(16, 8));
        let acq = Acquisition::spawn(sim.clone(), frames.clone(), Duration::ZERO).unwrap();

        wait_for_frames(&frames, 5);
        let Joined::Finished(stats) = acq.stop(Duration::from_secs(5)) else {
            panic!("loop did not stop");
        };

        assert!(stats.frames_acquired >= 5);
        assert_eq!(sim.frames_issued(), sim.frames_released());
        assert_eq!(frames.dimensions(), (16, 8));
    }

    #[test]
    fn loop_exits_when_device_stops_running() {
        let sim = Arc::new(SimulatedDevice::new(4, 4));
        sim.start_streaming();
        let frames = Arc::new(SharedFrameBuffer::new(4, 4));
        let acq = Acquisition::spawn(sim.clone(), frames.clone(), Duration::ZERO).unwrap();

        wait_for_frames(&frames, 1);
        sim.halt();
        assert!(matches!(
            acq.join_timeout(Duration::from_secs(5)),
            Joined::Finished(_)
        ));
    }

    #[test]
    fn corrupt_frames_are_counted_and_still_released() {
        let sim = Arc::new(SimulatedDevice::new(4, 4).corrupt_every(2));
        sim.start_streaming();
        let frames = Arc::new(SharedFrameBuffer::new(4, 4));
        let acq = Acquisition::spawn(sim.clone(), frames.clone(), Duration::ZERO).unwrap();

        wait_for_frames(&frames, 4);
        let Joined::Finished(stats) = acq.stop(Duration::from_secs(5)) else {
            panic!("loop did not stop");
        };
        assert!(stats.rasterize_failures > 0);
        assert_eq!(sim.frames_issued(), sim.frames_released());
    }

    #[test]
    fn empty_polls_are_not_errors() {
        let sim = Arc::new(SimulatedDevice::new(4, 4).miss_every(1));
        sim.start_streaming();
        let frames = Arc::new(SharedFrameBuffer::new(4, 4));
        let acq = Acquisition::spawn(sim.clone(), frames.clone(), Duration::from_micros(50)).unwrap();

        thread::sleep(Duration::from_millis(20));
        let Joined::Finished(stats) = acq.stop(Duration::from_secs(5)) else {
            panic!("loop did not stop");
        };
        assert_eq!(stats.frames_acquired, 0);
        assert!(stats.frames_missed > 0);
        assert!(!frames.is_populated());
    }

    #[test]
    fn detached_loop_shuts_the_device_down_on_exit() {
        let sim = Arc::new(
            SimulatedDevice::new(4, 4).with_frame_interval(Duration::from_millis(150)),
        );
        sim.start_streaming();
        let frames = Arc::new(SharedFrameBuffer::new(4, 4));
        let acq = Acquisition::spawn(sim.clone(), frames, Duration::ZERO).unwrap();

        thread::sleep(Duration::from_millis(20));
        let Joined::TimedOut(acq) = acq.stop(Duration::from_millis(10)) else {
            panic!("loop stopped mid-grab");
        };
        assert!(acq.detach().is_none());
        assert!(!sim.is_shut_down());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !sim.is_shut_down() {
            assert!(Instant::now() < deadline, "detached loop never released the device");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!sim.is_running());
        assert_eq!(sim.frames_issued(), sim.frames_released());
    }

    #[test]
    fn detach_after_exit_joins_instead() {
        let sim = Arc::new(SimulatedDevice::new(4, 4));
        sim.start_streaming();
        let frames = Arc::new(SharedFrameBuffer::new(4, 4));
        let acq = Acquisition::spawn(sim.clone(), frames.clone(), Duration::ZERO).unwrap();

        wait_for_frames(&frames, 1);
        acq.request_stop();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !acq.is_finished() {
            assert!(Instant::now() < deadline, "loop did not stop");
            thread::sleep(Duration::from_millis(1));
        }
        let stats = acq.detach().expect("exited loop is joined");
        assert!(stats.frames_acquired >= 1);
        assert!(!sim.is_shut_down());
    }
}
