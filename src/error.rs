// One error type for the whole pipeline.
// Every variant states *where* things went wrong; the C boundary turns each
// one into a stable status code (see `Status`).
use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no camera device is attached to this session")]
    DeviceAbsent,
    #[error("camera reported itself disconnected at startup")]
    Disconnected,
    #[error("capture session has been stopped")]
    SessionStopped,
    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: i64 },
    #[error("unknown log level {0:?} (expected trace, debug, info, warn or error)")]
    InvalidLogLevel(String),
    #[error("no frame has been acquired yet")]
    NoFrame,
    #[error("unknown capture session handle {0}")]
    UnknownSession(u64),
    #[error("acquisition thread did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Camera init error: {0}")]
    CameraInit(String), // Opening/starting the camera failed
    #[error("Camera device error: {0}")]
    Device(String), // A setter or start/stop call was refused by the driver
    #[error("Rasterize error: {0}")]
    Rasterize(String), // Decoding a raw frame into the sensor buffer failed
    #[error("Texture upload error: {0}")]
    Upload(String), // The host refused the texture update

    #[error("Window init error: {0}")]
    WindowInit(String), // Creating the viewer window failed
    #[error("Window update error: {0}")]
    WindowUpdate(String), // Pushing pixels to the viewer window failed

    #[error("failed to spawn acquisition thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

/// Status codes returned across the C boundary. `Ok` is zero, failures are negative.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    UnknownSession = -1,
    DeviceUnavailable = -2,
    InvalidParameter = -3,
    NoFrame = -4,
    Io = -5,
    ShutdownTimeout = -6,
    DeviceError = -7,
    NoHost = -8,
    Internal = -99,
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::UnknownSession(_) => Status::UnknownSession,
            Error::DeviceAbsent | Error::Disconnected | Error::SessionStopped => {
                Status::DeviceUnavailable
            }
            Error::InvalidParameter { .. } | Error::InvalidLogLevel(_) => Status::InvalidParameter,
            Error::NoFrame => Status::NoFrame,
            Error::Io(_) | Error::Image(_) => Status::Io,
            Error::ShutdownTimeout(_) => Status::ShutdownTimeout,
            Error::CameraInit(_) | Error::Device(_) | Error::Rasterize(_) => Status::DeviceError,
            Error::Upload(_) => Status::NoHost,
            Error::WindowInit(_)
            | Error::WindowUpdate(_)
            | Error::Spawn(_)
            | Error::Config(_) => Status::Internal,
        }
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_gain_message_names_the_value() {
        let err = Error::InvalidParameter { name: "gain level", value: 8 };
        assert_eq!(err.to_string(), "invalid gain level: 8");
        assert_eq!(err.status(), Status::InvalidParameter);
    }

    #[test]
    fn absent_and_disconnected_share_a_status() {
        assert_eq!(Error::DeviceAbsent.status(), Error::Disconnected.status());
        assert_eq!(i32::from(Error::SessionStopped.status()), -2);
    }

    #[test]
    fn io_errors_convert() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(i32::from(err.status()), -5);
    }

    #[test]
    fn bad_log_level_message_carries_the_level() {
        let err = Error::InvalidLogLevel("loud".into());
        assert!(err.to_string().contains("\"loud\""));
        assert_eq!(err.status(), Status::InvalidParameter);
    }
}
