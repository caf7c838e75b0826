// Webcam device backed by nokhwa.
// The camera sits behind one mutex: the acquisition thread's grab and a
// setter from the host thread never run into the driver at the same time.
// A setter issued mid-grab waits for that frame to finish.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::device::{DeviceHandle, RawFrame, SENSOR_BITS_PER_PIXEL};
use crate::error::{Error, Result};
use crate::types::Setting;

// Bring in nokhwa types for camera control.
use nokhwa::{
    Buffer, Camera,
    pixel_format::RgbFormat,
    utils::{
        CameraFormat, CameraIndex, ControlValueSetter, FrameFormat, KnownCameraControl,
        RequestedFormat, RequestedFormatType, Resolution,
    },
};

const TARGET_WIDTH: u32 = 640;
const TARGET_HEIGHT: u32 = 480;
const TARGET_FPS: u32 = 30;

pub struct WebcamDevice {
    cam: Mutex<Camera>,
    width: u32,
    height: u32,
    running: AtomicBool,
}

impl WebcamDevice {
    /// Open camera `index`, asking for the format closest to 640x480 YUYV.
    /// The stream is not opened until `start`.
    pub fn open(index: u32) -> Result<Self> {
        let fmt = CameraFormat::new(
            Resolution::new(TARGET_WIDTH, TARGET_HEIGHT),
            FrameFormat::YUYV, // uncompressed; cheap to convert to RGB
            TARGET_FPS,
        );
        let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(fmt));

        // this fails if no device exists
        let cam = Camera::new(CameraIndex::Index(index), req)
            .map_err(|e| Error::CameraInit(format!("Create camera: {e}")))?;

        // the driver may pick a slightly different resolution
        let actual = cam.resolution();
        info!(
            index,
            width = actual.width(),
            height = actual.height(),
            "webcam opened"
        );

        Ok(Self {
            cam: Mutex::new(cam),
            width: actual.width(),
            height: actual.height(),
            running: AtomicBool::new(false),
        })
    }

    fn set_control(&self, control: KnownCameraControl, value: ControlValueSetter) -> Result<()> {
        self.cam
            .lock()
            .set_camera_control(control, value)
            .map_err(|e| Error::Device(format!("{control:?}: {e}")))
    }
}

impl DeviceHandle for WebcamDevice {
    fn physical_width(&self) -> u32 {
        self.width
    }

    fn physical_height(&self) -> u32 {
        self.height
    }

    fn is_disconnected(&self) -> bool {
        false
    }

    fn start(&self) -> Result<()> {
        self.cam
            .lock()
            .open_stream()
            .map_err(|e| Error::CameraInit(format!("Open stream: {e}")))?;
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    // Never blocks: a grab in flight holds the camera, and `stop` is what
    // the session calls when that grab is stuck.
    fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        match self.cam.try_lock() {
            Some(mut cam) => close_stream(&mut cam),
            None => debug!("grab in flight, stream closes at shutdown"),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.cam.try_lock().is_none_or(|cam| cam.is_stream_open())
    }

    fn next_frame(&self) -> Option<Box<dyn RawFrame>> {
        // blocks until the driver delivers the next frame
        match self.cam.lock().frame() {
            Ok(buffer) => Some(Box::new(WebcamFrame(buffer))),
            Err(e) => {
                debug!(error = %e, "no frame");
                None
            }
        }
    }

    fn apply(&self, setting: Setting) -> Result<()> {
        match setting {
            Setting::Exposure(value) => {
                self.set_control(KnownCameraControl::Exposure, ControlValueSetter::Integer(value.into()))
            }
            Setting::Gain(level) => self.set_control(
                KnownCameraControl::Gain,
                ControlValueSetter::Integer(level.get().into()),
            ),
            Setting::Intensity(value) => self.set_control(
                KnownCameraControl::Brightness,
                ControlValueSetter::Integer(value.into()),
            ),
            // UVC webcams have no strobe, threshold or IR filter controls and
            // the transport format was fixed at open
            other => {
                debug!(setting = ?other, "not supported by webcam, skipped");
                Ok(())
            }
        }
    }

    // Only called once no grab is running.
    fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        close_stream(&mut self.cam.lock());
    }
}

fn close_stream(cam: &mut Camera) {
    if !cam.is_stream_open() {
        return;
    }
    if let Err(e) = cam.stop_stream() {
        warn!(error = %e, "failed to stop webcam stream");
    }
}

struct WebcamFrame(Buffer);

impl RawFrame for WebcamFrame {
    fn rasterize(
        &self,
        width: u32,
        height: u32,
        stride: usize,
        bits_per_pixel: u32,
        dst: &mut [u8],
    ) -> Result<()> {
        if bits_per_pixel != SENSOR_BITS_PER_PIXEL {
            return Err(Error::Rasterize(format!("unsupported depth {bits_per_pixel}")));
        }
        let rgb = self
            .0
            .decode_image::<RgbFormat>()
            .map_err(|e| Error::Rasterize(format!("Decode RGB: {e}")))?;
        if rgb.dimensions() != (width, height) {
            return Err(Error::Rasterize(format!(
                "frame is {:?}, sensor buffer is {width}x{height}",
                rgb.dimensions()
            )));
        }

        let row = width as usize * 3;
        if dst.len() < stride * height as usize {
            return Err(Error::Rasterize("destination buffer too small".into()));
        }
        for (src, out) in rgb.as_raw().chunks_exact(row).zip(dst.chunks_mut(stride)) {
            out[..row].copy_from_slice(src);
        }
        Ok(())
    }

    fn release(self: Box<Self>) {
        // the decoded copy is ours; dropping the nokhwa buffer is the release
    }
}
