//! C boundary for the rendering host.
//!
//! Sessions are addressed by `u64` handles (0 is never valid). Every call
//! that can fail returns an `i32` status: 0 on success, a negative
//! [`Status`] otherwise. Query calls return their value directly and 0 for
//! an unknown handle.
//!
//! The host installs its texture upload routine with
//! [`capture_plugin_load`] and drives presentation through the function
//! returned by [`capture_get_render_event_func`].

use std::ffi::c_void;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::config::CaptureConfig;
use crate::device::DeviceHandle;
use crate::error::{Error, Result, Status};
use crate::logging;
use crate::presentation::GraphicsHost;
use crate::registry::{SessionId, SessionRegistry};
use crate::session::CaptureSession;
use crate::types::TextureHandle;

/// Host routine that copies `depth_pitch` bytes of RGBA pixels into `texture`.
/// Returns 0 on success.
pub type UploadTextureFn = unsafe extern "C" fn(
    texture: *mut c_void,
    pixels: *const u8,
    row_pitch: u32,
    depth_pitch: u32,
) -> i32;

pub type RenderEventFn = extern "C" fn(event_id: i32);

static REGISTRY: Lazy<SessionRegistry> = Lazy::new(SessionRegistry::new);

/// [`GraphicsHost`] backed by the host's upload callback.
struct CallbackHost {
    upload: UploadTextureFn,
}

impl GraphicsHost for CallbackHost {
    fn update_texture(
        &self,
        texture: TextureHandle,
        pixels: &[u8],
        row_pitch: usize,
        depth_pitch: usize,
    ) -> Result<()> {
        let row_pitch = u32::try_from(row_pitch).map_err(|_| Error::Upload("row pitch overflow".into()))?;
        let depth_pitch =
            u32::try_from(depth_pitch).map_err(|_| Error::Upload("frame size overflow".into()))?;
        // SAFETY: `pixels` is valid for `depth_pitch` bytes for the whole call
        // (the frame lock is held by our caller); the texture pointer is the
        // one the host gave us and is only handed back to the host.
        let code = unsafe {
            (self.upload)(texture.addr() as *mut c_void, pixels.as_ptr(), row_pitch, depth_pitch)
        };
        if code == 0 {
            Ok(())
        } else {
            Err(Error::Upload(format!("host returned {code}")))
        }
    }
}

fn default_device() -> Option<Arc<dyn DeviceHandle>> {
    #[cfg(feature = "webcam")]
    {
        match crate::camera::WebcamDevice::open(0) {
            Ok(camera) => return Some(Arc::new(camera)),
            Err(e) => warn!(error = %e, "no webcam available"),
        }
    }
    None
}

fn with_session<T>(handle: u64, f: impl FnOnce(&CaptureSession) -> Result<T>) -> Result<T> {
    let id = SessionId::from_raw(handle).ok_or(Error::UnknownSession(handle))?;
    let session = REGISTRY.get(id)?;
    f(&session)
}

fn status(result: Result<()>) -> i32 {
    match result {
        Ok(()) => Status::Ok.into(),
        Err(e) => {
            debug!(error = %e, "boundary call failed");
            e.status().into()
        }
    }
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Bind the host's texture upload routine. Passing null unbinds it.
#[unsafe(no_mangle)]
pub extern "C" fn capture_plugin_load(upload: Option<UploadTextureFn>) {
    let config = CaptureConfig::load().unwrap_or_default();
    logging::init(&config.log_level);
    match upload {
        Some(upload) => REGISTRY.set_host(Arc::new(CallbackHost { upload })),
        None => REGISTRY.clear_host(),
    }
}

/// Unbind the host and stop every session.
#[unsafe(no_mangle)]
pub extern "C" fn capture_plugin_unload() {
    REGISTRY.clear_host();
    REGISTRY.shutdown();
}

extern "C" fn on_render_event(event_id: i32) {
    REGISTRY.on_render_event(event_id);
}

#[unsafe(no_mangle)]
pub extern "C" fn capture_get_render_event_func() -> RenderEventFn {
    on_render_event
}

/// Open the default camera and start capturing. Always returns a handle;
/// query `capture_is_connected` to learn whether a camera was found.
#[unsafe(no_mangle)]
pub extern "C" fn capture_create_session() -> u64 {
    let config = CaptureConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "invalid configuration, using defaults");
        CaptureConfig::default()
    });
    REGISTRY.create(default_device(), config).get()
}

#[unsafe(no_mangle)]
pub extern "C" fn capture_release_session(handle: u64) -> i32 {
    let result = SessionId::from_raw(handle)
        .ok_or(Error::UnknownSession(handle))
        .and_then(|id| REGISTRY.destroy(id));
    status(result)
}

#[unsafe(no_mangle)]
pub extern "C" fn capture_get_width(handle: u64) -> i32 {
    with_session(handle, |s| Ok(clamp_i32(s.width()))).unwrap_or(0)
}

#[unsafe(no_mangle)]
pub extern "C" fn capture_get_height(handle: u64) -> i32 {
    with_session(handle, |s| Ok(clamp_i32(s.height()))).unwrap_or(0)
}

/// 1 if connected, 0 if not, negative status for a bad handle.
#[unsafe(no_mangle)]
pub extern "C" fn capture_is_connected(handle: u64) -> i32 {
    match with_session(handle, |s| Ok(s.is_connected())) {
        Ok(connected) => i32::from(connected),
        Err(e) => e.status().into(),
    }
}

/// Set (or, with null, clear) the texture frames are uploaded into.
#[unsafe(no_mangle)]
pub extern "C" fn capture_set_texture(handle: u64, texture: *mut c_void) -> i32 {
    let texture = TextureHandle::from_raw(texture as usize);
    status(with_session(handle, |s| {
        s.set_texture(texture);
        Ok(())
    }))
}

#[unsafe(no_mangle)]
pub extern "C" fn capture_set_exposure(handle: u64, exposure: i32) -> i32 {
    status(with_session(handle, |s| s.set_exposure(exposure)))
}

#[unsafe(no_mangle)]
pub extern "C" fn capture_set_intensity(handle: u64, intensity: i32) -> i32 {
    status(with_session(handle, |s| s.set_intensity(intensity)))
}

#[unsafe(no_mangle)]
pub extern "C" fn capture_set_gain_level(handle: u64, gain: i32) -> i32 {
    status(with_session(handle, |s| s.set_gain_level(gain)))
}

#[unsafe(no_mangle)]
pub extern "C" fn capture_toggle_display_mode(handle: u64) -> i32 {
    status(with_session(handle, |s| {
        s.toggle_display_mode();
        Ok(())
    }))
}

#[unsafe(no_mangle)]
pub extern "C" fn capture_record_background(handle: u64) -> i32 {
    status(with_session(handle, CaptureSession::record_background))
}

#[unsafe(no_mangle)]
pub extern "C" fn capture_save_current(handle: u64, index: i32) -> i32 {
    status(with_session(handle, |s| s.save_current(index).map(drop)))
}

#[unsafe(no_mangle)]
pub extern "C" fn capture_save_original(handle: u64, index: i32) -> i32 {
    status(with_session(handle, |s| s.save_original(index).map(drop)))
}

#[unsafe(no_mangle)]
pub extern "C" fn capture_save_subtracted(handle: u64, index: i32) -> i32 {
    status(with_session(handle, |s| s.save_subtracted(index).map(drop)))
}

#[unsafe(no_mangle)]
pub extern "C" fn capture_stop(handle: u64) -> i32 {
    status(with_session(handle, |s| s.stop().map(drop)))
}
