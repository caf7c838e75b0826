use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use capture_pipe::sim::{Block, SimulatedDevice};
use capture_pipe::{
    CaptureConfig, CaptureSession, DeviceHandle, DisplayMode, Error, GraphicsHost, Presented,
    Result, SessionRegistry, SessionState, TextureHandle,
};
use parking_lot::Mutex;

/// Keeps the last upload and counts every one.
#[derive(Default)]
struct RecordingHost {
    last: Mutex<Vec<u8>>,
    uploads: Mutex<usize>,
    bad_lengths: Mutex<usize>,
}

impl GraphicsHost for RecordingHost {
    fn update_texture(
        &self,
        _texture: TextureHandle,
        pixels: &[u8],
        row_pitch: usize,
        depth_pitch: usize,
    ) -> Result<()> {
        if pixels.len() != depth_pitch || depth_pitch % row_pitch != 0 {
            *self.bad_lengths.lock() += 1;
        }
        *self.last.lock() = pixels.to_vec();
        *self.uploads.lock() += 1;
        Ok(())
    }
}

fn open(sim: &Arc<SimulatedDevice>, config: CaptureConfig) -> CaptureSession {
    let device: Arc<dyn DeviceHandle> = sim.clone();
    CaptureSession::open(Some(device), config)
}

fn wait_for_frames(session: &CaptureSession, n: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while session.frames().frames_written() < n {
        assert!(Instant::now() < deadline, "no frames after 5s");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn dimensions_follow_the_sensor_for_the_session_lifetime() {
    let sim = Arc::new(SimulatedDevice::new(32, 24));
    let session = open(&sim, CaptureConfig::default());
    assert_eq!((session.width(), session.height()), (32, 24));

    wait_for_frames(&session, 3);
    session.toggle_display_mode();
    assert_eq!((session.width(), session.height()), (32, 24));
    assert_eq!(session.frames().dimensions(), (32, 24));

    session.stop().unwrap();
    assert_eq!((session.width(), session.height()), (32, 24));
}

#[test]
fn unchanged_scene_subtracts_to_white() {
    let sim = Arc::new(SimulatedDevice::new(16, 8));
    let session = open(&sim, CaptureConfig::default());
    session.set_texture(TextureHandle::from_raw(0x10));
    wait_for_frames(&session, 1);

    session.record_background().unwrap();
    session.toggle_display_mode();
    wait_for_frames(&session, 3);

    let host = RecordingHost::default();
    assert_eq!(session.present(&host).unwrap(), Presented::Uploaded);
    let pixels = host.last.lock().clone();
    assert_eq!(pixels.len(), 16 * 8 * 4);
    assert!(pixels.iter().all(|&b| b == 255));
    session.stop().unwrap();
}

#[test]
fn moving_object_shows_up_dark_in_the_difference() {
    let sim = Arc::new(SimulatedDevice::new(16, 8));
    let session = open(&sim, CaptureConfig::default());
    session.set_texture(TextureHandle::from_raw(0x10));
    wait_for_frames(&session, 1);
    session.record_background().unwrap();

    sim.show_block(Block { x: 0, y: 0, width: 4, height: 4, level: 255 });
    let seen = session.frames().frames_written();
    wait_for_frames(&session, seen + 2);
    assert_eq!(session.toggle_display_mode(), DisplayMode::Subtracted);

    let host = RecordingHost::default();
    session.present(&host).unwrap();
    let pixels = host.last.lock().clone();
    assert!(pixels.chunks_exact(4).any(|px| px[0] < 255));
    assert!(pixels.chunks_exact(4).all(|px| px[3] == 255));
    session.stop().unwrap();
}

#[test]
fn presenting_while_acquiring_never_sees_a_partial_frame() {
    let sim = Arc::new(SimulatedDevice::new(64, 48));
    sim.show_block(Block { x: 0, y: 10, width: 8, height: 8, level: 200 });
    sim.set_moving(true);
    let session = Arc::new(open(&sim, CaptureConfig::default()));
    session.set_texture(TextureHandle::from_raw(0x20));
    wait_for_frames(&session, 1);
    let host = Arc::new(RecordingHost::default());

    let renderer = {
        let session = session.clone();
        let host = host.clone();
        thread::spawn(move || {
            for i in 0..300 {
                if i % 50 == 0 {
                    session.toggle_display_mode();
                }
                session.present(host.as_ref()).unwrap();
            }
        })
    };
    renderer.join().unwrap();

    assert_eq!(*host.bad_lengths.lock(), 0);
    assert_eq!(host.last.lock().len(), 64 * 48 * 4);
    session.stop().unwrap();
}

#[test]
fn stop_before_first_frame_leaves_nothing_to_present() {
    let sim = Arc::new(SimulatedDevice::new(8, 8).miss_every(1));
    let session = open(&sim, CaptureConfig::default());
    session.set_texture(TextureHandle::from_raw(0x30));
    session.stop().unwrap();
    assert_eq!(session.state(), SessionState::Stopped);

    let host = RecordingHost::default();
    assert_eq!(session.present(&host).unwrap(), Presented::NoFrame);
    assert_eq!(*host.uploads.lock(), 0);
    assert!(matches!(session.record_background(), Err(Error::NoFrame)));
    assert!(matches!(session.set_exposure(5), Err(Error::SessionStopped)));
}

#[test]
fn saves_land_in_the_output_dir_with_their_index() {
    let dir = tempfile::tempdir().unwrap();
    let config = CaptureConfig {
        output_dir: dir.path().join("shots"),
        ..CaptureConfig::default()
    };
    let sim = Arc::new(SimulatedDevice::new(12, 10));
    let session = open(&sim, config);
    wait_for_frames(&session, 1);

    let first = session.save_original(7).unwrap();
    let second = session.save_subtracted(8).unwrap();
    let current = session.save_current(9).unwrap();
    session.stop().unwrap();

    assert!(first.to_string_lossy().ends_with("_original_7.png"));
    assert!(second.to_string_lossy().ends_with("_subtracted_8.png"));
    assert!(current.to_string_lossy().ends_with("_current_9.png"));
    for path in [&first, &second, &current] {
        let decoded = image::open(path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 10));
    }
}

#[test]
fn every_frame_taken_is_released_by_stop() {
    let sim = Arc::new(SimulatedDevice::new(8, 8).corrupt_every(3));
    let session = open(&sim, CaptureConfig::default());
    wait_for_frames(&session, 10);
    let stats = session.stop().unwrap();

    assert!(stats.frames_acquired >= 10);
    assert!(stats.rasterize_failures > 0);
    assert_eq!(sim.frames_issued(), sim.frames_released());
    assert!(sim.is_shut_down());
    assert!(!sim.is_running());
}

#[test]
fn device_that_stops_on_its_own_ends_the_loop() {
    let sim = Arc::new(SimulatedDevice::new(8, 8));
    let session = open(&sim, CaptureConfig::default());
    wait_for_frames(&session, 1);
    sim.halt();

    let frozen = {
        thread::sleep(Duration::from_millis(20));
        session.frames().frames_written()
    };
    thread::sleep(Duration::from_millis(20));
    assert_eq!(session.frames().frames_written(), frozen);
    session.stop().unwrap();
    assert_eq!(sim.frames_issued(), sim.frames_released());
}

#[test]
fn registry_render_event_uploads_each_textured_session() {
    let registry = SessionRegistry::new();
    let a = registry.create(
        Some(Arc::new(SimulatedDevice::new(8, 4)) as Arc<dyn DeviceHandle>),
        CaptureConfig::default(),
    );
    let b = registry.create(
        Some(Arc::new(SimulatedDevice::new(4, 4)) as Arc<dyn DeviceHandle>),
        CaptureConfig::default(),
    );
    let untextured = registry.create(None, CaptureConfig::default());

    for id in [a, b] {
        let session = registry.get(id).unwrap();
        session.set_texture(TextureHandle::from_raw(id.get() as usize));
        wait_for_frames(&session, 1);
    }

    let host = Arc::new(RecordingHost::default());
    registry.set_host(host.clone());
    assert_eq!(registry.on_render_event(1), 2);
    assert_eq!(*host.uploads.lock(), 2);

    registry.destroy(untextured).unwrap();
    registry.shutdown();
    assert!(registry.is_empty());
}
