//! Camera capture-and-present pipeline.
//!
//! A background thread pulls frames from a camera into one shared sensor
//! image; a render callback owned by some host (a game engine, a viewer
//! window) turns that image into a 4-channel frame, optionally subtracting a
//! recorded background, and uploads it into the host's texture. Both sides
//! serialise on the same lock, so the host never sees a half-written frame.
//!
//! ```no_run
//! use std::sync::Arc;
//! use capture_pipe::{CaptureConfig, CaptureSession, DeviceHandle, sim::SimulatedDevice};
//!
//! let device: Arc<dyn DeviceHandle> = Arc::new(SimulatedDevice::new(640, 480));
//! let session = CaptureSession::open(Some(device), CaptureConfig::default());
//! assert!(session.is_connected());
//! session.set_gain_level(3)?;
//! session.stop()?;
//! # Ok::<(), capture_pipe::Error>(())
//! ```

pub mod acquisition;
pub mod buffer;
#[cfg(feature = "webcam")]
pub mod camera;
pub mod config;
pub mod device;
#[cfg(feature = "viewer")]
pub mod draw;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod presentation;
pub mod processing;
pub mod registry;
pub mod session;
pub mod sim;
pub mod snapshot;
pub mod types;

pub use config::CaptureConfig;
pub use device::{DeviceHandle, RawFrame};
pub use error::{Error, Result, Status};
pub use presentation::{GraphicsHost, Presented};
pub use registry::{SessionId, SessionRegistry};
pub use session::{CaptureSession, SessionState};
pub use types::{DisplayMode, GainLevel, SnapshotKind, TextureHandle};
