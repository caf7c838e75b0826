//! Presentation step: processed frame -> host texture.
//!
//! Runs on whatever thread the host's render callback uses. Processing and
//! the upload both happen inside the frame buffer's critical section, so the
//! next acquisition cannot overwrite the bytes while the host copies them.

use tracing::trace;

use crate::buffer::{PRESENTED_CHANNELS, SharedFrameBuffer};
use crate::error::Result;
use crate::types::{DisplayMode, TextureHandle};

/// The rendering host's side of the texture upload.
///
/// `pixels` is a tightly packed 4-channel image, `row_pitch` bytes per row and
/// `depth_pitch` bytes in total. The texture stays owned by the host.
pub trait GraphicsHost: Send + Sync {
    fn update_texture(
        &self,
        texture: TextureHandle,
        pixels: &[u8],
        row_pitch: usize,
        depth_pitch: usize,
    ) -> Result<()>;
}

/// What a presentation call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presented {
    Uploaded,
    /// No texture target has been set.
    NoTexture,
    /// The sensor image has never been filled.
    NoFrame,
}

pub fn present(
    frames: &SharedFrameBuffer,
    mode: DisplayMode,
    texture: Option<TextureHandle>,
    host: &dyn GraphicsHost,
) -> Result<Presented> {
    let Some(texture) = texture else {
        return Ok(Presented::NoTexture);
    };

    let uploaded = frames.present_with(mode, |image| {
        let row_pitch = PRESENTED_CHANNELS * image.width() as usize;
        let depth_pitch = row_pitch * image.height() as usize;
        trace!(?mode, row_pitch, depth_pitch, "uploading frame");
        host.update_texture(texture, image.as_raw(), row_pitch, depth_pitch)
    });

    match uploaded {
        Some(result) => result.map(|()| Presented::Uploaded),
        None => Ok(Presented::NoFrame),
    }
}
