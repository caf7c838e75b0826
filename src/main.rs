// What you SEE now:
// • The camera feed, pulled by the capture thread and "uploaded" into the window.
// • R records the current frame as the background.
// • B flips between RAW and DIFF (255 - |background - live|: still scenery goes white).
// • S saves current/original/subtracted PNGs. ESC quits.
// Without the `webcam` feature a simulated camera with a drifting block is shown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use capture_pipe::draw::{Drawer, WindowHost, draw_text_5x7};
use capture_pipe::error::Result;
use capture_pipe::sim::{Block, SimulatedDevice};
use capture_pipe::{
    CaptureConfig, CaptureSession, DeviceHandle, DisplayMode, Presented, SnapshotKind,
    TextureHandle, logging,
};
use tracing::{info, warn};

fn open_device() -> Arc<dyn DeviceHandle> {
    #[cfg(feature = "webcam")]
    {
        match capture_pipe::camera::WebcamDevice::open(0) {
            Ok(camera) => return Arc::new(camera),
            Err(e) => warn!(error = %e, "no webcam, falling back to the simulated camera"),
        }
    }
    let sim = SimulatedDevice::new(640, 480).with_frame_interval(Duration::from_millis(33));
    sim.show_block(Block { x: 40, y: 180, width: 96, height: 96, level: 250 });
    sim.set_moving(true);
    Arc::new(sim)
}

fn main() -> Result<()> {
    /* --- Config + logging ---
       Visual: nothing yet; log lines appear in the terminal. */
    let config = CaptureConfig::load()?;
    logging::init(&config.log_level);

    /* --- Camera session ---
       Visual: capture thread starts filling the shared frame in the background. */
    let session = CaptureSession::open(Some(open_device()), config);
    if !session.is_connected() {
        warn!("camera did not start; nothing to show");
        return Ok(());
    }
    let (w, h) = (session.width() as usize, session.height() as usize);

    /* --- Window + the "GPU" the session uploads into ---
       Visual: window opens, black until the first frame lands. */
    let mut drawer = Drawer::new("Capture Viewer", w, h)?;
    let host = WindowHost::new(w, h);
    session.set_texture(TextureHandle::from_raw(1));

    /* --- HUD / FPS --- */
    let mut last_fps_time = Instant::now();
    let mut frames_this_second: u32 = 0;
    let mut hud_fps_text = String::from("FPS: 0.0");
    let mut snapshot_index: i32 = 0;

    /* ------------------------------ Main loop ------------------------------ */
    while drawer.is_open() && !drawer.esc_pressed() {
        let now = Instant::now();

        /* 1) Inputs */
        if drawer.r_pressed_once() {
            match session.record_background() {
                Ok(()) => info!("background recorded"), // visual: DIFF view goes white where nothing moves
                Err(e) => warn!(error = %e, "could not record background"),
            }
        }
        if drawer.b_pressed_once() {
            let mode = session.toggle_display_mode(); // visual: RAW <-> DIFF
            info!(?mode, "display mode");
        }
        if drawer.s_pressed_once() {
            for kind in [SnapshotKind::Current, SnapshotKind::Original, SnapshotKind::Subtracted] {
                match session.save(kind, snapshot_index) {
                    Ok(path) => info!(path = %path.display(), "snapshot saved"),
                    Err(e) => warn!(%kind, error = %e, "snapshot failed"),
                }
            }
            snapshot_index += 1;
        }

        /* 2) Render event: the session uploads the latest frame into our host. */
        let presented = session.present(&host)?;

        /* 3) Copy out what was uploaded and draw the HUD on top. */
        let mut screen = host.latest();
        let status = match session.display_mode() {
            DisplayMode::Original => "RAW",
            DisplayMode::Subtracted => "DIFF",
        };
        let waiting = if presented == Presented::NoFrame { " | WAIT" } else { "" };
        let hud = format!("{status}{waiting} | {hud_fps_text}");
        draw_text_5x7(&mut screen, 8, 8, &hud, 0x00_FF_FF_FF); // visual: small white HUD

        /* 4) Present to the window. */
        drawer.present(&screen)?;

        /* 5) FPS counter (terminal + HUD once per second) */
        frames_this_second += 1;
        if now.duration_since(last_fps_time) >= Duration::from_secs(1) {
            let secs = now.duration_since(last_fps_time).as_secs_f32();
            let fps = frames_this_second as f32 / secs;
            info!(fps, captured = session.frames().frames_written(), "viewer");
            hud_fps_text = format!("FPS: {fps:.1}");
            frames_this_second = 0;
            last_fps_time = now;
        }
    }

    let stats = session.stop()?;
    info!(?stats, "capture stopped");
    Ok(())
}
