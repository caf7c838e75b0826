// Small value types shared by the pipeline, the device layer and the boundary.
use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Number of discrete imager gain levels the sensor supports.
pub const GAIN_LEVELS: i32 = 8;

/// Imager gain level, always inside `[0, GAIN_LEVELS)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GainLevel(u8);

impl GainLevel {
    pub fn new(level: i32) -> Result<Self, Error> {
        if (0..GAIN_LEVELS).contains(&level) {
            Ok(Self(level as u8))
        } else {
            Err(Error::InvalidParameter {
                name: "gain level",
                value: level.into(),
            })
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// Which image the presentation step derives from the sensor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// Raw sensor image, only widened to 4 channels.
    #[default]
    Original,
    /// Inverted absolute difference against the background image.
    Subtracted,
}

impl DisplayMode {
    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::Original => DisplayMode::Subtracted,
            DisplayMode::Subtracted => DisplayMode::Original,
        }
    }
}

/// Frame transport mode requested from the device before capture starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoMode {
    #[default]
    Mjpeg,
    Grayscale,
    Segment,
}

/// One device parameter write. Devices apply these as plain pass-through setters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    VideoMode(VideoMode),
    Exposure(i32),
    Gain(GainLevel),
    Threshold(i32),
    Intensity(i32),
    ShutterDelay(i32),
    AutoExposure(bool),
    AutoGain(bool),
    IrFilter(bool),
}

/// Which buffer a snapshot writes to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Whatever the current display mode presents.
    Current,
    /// The raw sensor image.
    Original,
    /// The inverted background difference.
    Subtracted,
}

impl SnapshotKind {
    pub fn label(self) -> &'static str {
        match self {
            SnapshotKind::Current => "current",
            SnapshotKind::Original => "original",
            SnapshotKind::Subtracted => "subtracted",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Non-owning token for a GPU texture that lives in the host.
///
/// The host creates and destroys the texture; we only carry its address back
/// to the host's upload routine. A null pointer has no token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(NonZeroUsize);

impl TextureHandle {
    pub fn from_raw(addr: usize) -> Option<Self> {
        NonZeroUsize::new(addr).map(Self)
    }

    pub fn addr(self) -> usize {
        self.0.get()
    }
}

/// 0x00RRGGBB pixels, the layout the viewer window expects.
#[derive(Clone)]
pub struct FrameBuffer {
    pub width: usize,     // how wide the frame is on screen (pixels)
    pub height: usize,    // how tall the frame is on screen (pixels)
    pub pixels: Vec<u32>, // each entry is 0x00RRGGBB for minifb
}

impl FrameBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u32; width * height],
        }
    }
}
