// Viewer window + software drawing utilities.
// Visual effects provided here:
// 1) A window that shows whatever the pipeline uploads as its "texture".
// 2) A tiny 5x7 bitmap font to render HUD text on top of the video.

use minifb::{Key, KeyRepeat, Window, WindowOptions};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::presentation::GraphicsHost;
use crate::types::{FrameBuffer, TextureHandle};

pub struct Drawer {
    window: Window, // the on-screen window you see
}

impl Drawer {
    /// Create a window sized to the camera feed.
    /// Visual: a new empty window appears with your chosen title.
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(title, width, height, WindowOptions::default())
            .map_err(|e| Error::WindowInit(e.to_string()))?;
        Ok(Self { window })
    }

    /// Push the pixels for this frame to the screen.
    /// Visual: the window immediately displays the new image (live video).
    pub fn present(&mut self, framebuffer: &FrameBuffer) -> Result<()> {
        self.window
            .update_with_buffer(&framebuffer.pixels, framebuffer.width, framebuffer.height)
            .map_err(|e| Error::WindowUpdate(e.to_string()))
    }

    /// Returns false when the user closes the window (so we can stop the loop).
    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    /// True while ESC is held down (we'll exit when this is pressed).
    pub fn esc_pressed(&self) -> bool {
        self.window.is_key_down(Key::Escape)
    }

    // record the current frame as the background
    pub fn r_pressed_once(&self) -> bool {
        self.window.is_key_pressed(Key::R, KeyRepeat::No)
    }

    // flip between raw and background-subtracted view
    pub fn b_pressed_once(&self) -> bool {
        self.window.is_key_pressed(Key::B, KeyRepeat::No)
    }

    // save all three snapshot kinds
    pub fn s_pressed_once(&self) -> bool {
        self.window.is_key_pressed(Key::S, KeyRepeat::No)
    }
}

/// Stands in for the GPU: every upload lands in a 0x00RRGGBB frame buffer
/// the main loop then pushes to the window.
pub struct WindowHost {
    screen: Mutex<FrameBuffer>,
}

impl WindowHost {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            screen: Mutex::new(FrameBuffer::new(width, height)),
        }
    }

    /// Copy of the last uploaded frame.
    pub fn latest(&self) -> FrameBuffer {
        self.screen.lock().clone()
    }
}

impl GraphicsHost for WindowHost {
    fn update_texture(
        &self,
        _texture: TextureHandle,
        pixels: &[u8],
        row_pitch: usize,
        depth_pitch: usize,
    ) -> Result<()> {
        let mut screen = self.screen.lock();
        if row_pitch != screen.width * 4
            || depth_pitch != row_pitch * screen.height
            || pixels.len() < depth_pitch
        {
            return Err(Error::Upload(format!(
                "texture is {}x{}, upload pitch {row_pitch}/{depth_pitch}",
                screen.width, screen.height
            )));
        }
        pack_rgba(&pixels[..depth_pitch], &mut screen.pixels);
        Ok(())
    }
}

/// RGBA bytes -> 0x00RRGGBB words (alpha dropped).
fn pack_rgba(rgba: &[u8], out: &mut [u32]) {
    for (px, word) in rgba.chunks_exact(4).zip(out.iter_mut()) {
        *word = (px[0] as u32) << 16 | (px[1] as u32) << 8 | px[2] as u32;
    }
}

/* ---------- Software drawing: pixels, tiny bitmap font ---------- */

/// Put a pixel on the framebuffer if (x,y) is inside bounds.
/// Visual: the exact pixel at (x,y) changes color.
#[inline]
fn put_pixel(fb: &mut FrameBuffer, x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as usize, y as usize);
    if x >= fb.width || y >= fb.height {
        return;
    }
    let idx = y * fb.width + x;
    fb.pixels[idx] = color;
}

/* ---------- 5x7 bitmap font (ASCII subset for "DIFF | BG | FPS: 00.0") ---------- */

/// Return a 5x7 glyph bitmap for a limited character set.
/// Each u8 is a row; the low 5 bits are the pixels (bit 4 = leftmost).
fn glyph5x7(ch: char) -> Option<[u8; 7]> {
    // Helper macro to define a glyph quickly
    macro_rules! g { ($a:expr,$b:expr,$c:expr,$d:expr,$e:expr,$f:expr,$g:expr) => {
        Some([$a,$b,$c,$d,$e,$f,$g])
    }; }

    match ch {
        // Digits 0..9
        '0' => g!(0b01110,0b10001,0b10011,0b10101,0b11001,0b10001,0b01110),
        '1' => g!(0b00100,0b01100,0b00100,0b00100,0b00100,0b00100,0b01110),
        '2' => g!(0b01110,0b10001,0b00001,0b00010,0b00100,0b01000,0b11111),
        '3' => g!(0b11110,0b00001,0b00001,0b01110,0b00001,0b00001,0b11110),
        '4' => g!(0b00010,0b00110,0b01010,0b10010,0b11111,0b00010,0b00010),
        '5' => g!(0b11111,0b10000,0b11110,0b00001,0b00001,0b10001,0b01110),
        '6' => g!(0b00110,0b01000,0b10000,0b11110,0b10001,0b10001,0b01110),
        '7' => g!(0b11111,0b00001,0b00010,0b00100,0b01000,0b01000,0b01000),
        '8' => g!(0b01110,0b10001,0b10001,0b01110,0b10001,0b10001,0b01110),
        '9' => g!(0b01110,0b10001,0b10001,0b01111,0b00001,0b00010,0b01100),

        // Uppercase letters for the mode/status tags
        'A' => g!(0b01110,0b10001,0b10001,0b11111,0b10001,0b10001,0b10001),
        'B' => g!(0b11110,0b10001,0b10001,0b11110,0b10001,0b10001,0b11110),
        'D' => g!(0b11100,0b10010,0b10001,0b10001,0b10001,0b10010,0b11100),
        'E' => g!(0b11111,0b10000,0b10000,0b11110,0b10000,0b10000,0b11111),
        'F' => g!(0b11111,0b10000,0b10000,0b11110,0b10000,0b10000,0b10000),
        'G' => g!(0b01110,0b10001,0b10000,0b10111,0b10001,0b10001,0b01111),
        'I' => g!(0b01110,0b00100,0b00100,0b00100,0b00100,0b00100,0b01110),
        'P' => g!(0b11110,0b10001,0b10001,0b11110,0b10000,0b10000,0b10000),
        'R' => g!(0b11110,0b10001,0b10001,0b11110,0b10100,0b10010,0b10001),
        'S' => g!(0b01111,0b10000,0b10000,0b01110,0b00001,0b00001,0b11110),
        'T' => g!(0b11111,0b00100,0b00100,0b00100,0b00100,0b00100,0b00100),
        'V' => g!(0b10001,0b10001,0b10001,0b10001,0b10001,0b01010,0b00100),
        'W' => g!(0b10001,0b10001,0b10001,0b10101,0b10101,0b10101,0b01010),

        // Punctuation: space, vertical bar, colon, dot
        ' ' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00000,0b00000),
        '|' => g!(0b00100,0b00100,0b00100,0b00100,0b00100,0b00100,0b00100),
        ':' => g!(0b00000,0b00100,0b00000,0b00000,0b00100,0b00000,0b00000),
        '.' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00100,0b00000),

        _ => None,
    }
}

/// Draw a single 5x7 character at (x,y).
/// Visual: a tiny glyph appears with a 1-pixel black shadow for contrast.
fn draw_char_5x7(fb: &mut FrameBuffer, x: i32, y: i32, ch: char, color: u32) {
    let Some(rows) = glyph5x7(ch) else { return };
    // shadow first, offset by (1,1), then the glyph itself
    for (dx, dy, c) in [(1, 1, 0x00000000), (0, 0, color)] {
        for (ry, rowbits) in rows.iter().enumerate() {
            for rx in 0..5 {
                if (rowbits & (1 << (4 - rx))) != 0 {
                    put_pixel(fb, x + rx as i32 + dx, y + ry as i32 + dy, c);
                }
            }
        }
    }
}

/// Draw a text string using 5x7 glyphs.
/// Visual: a compact HUD string appears; each glyph is 5x7 with 1-pixel spacing.
pub fn draw_text_5x7(fb: &mut FrameBuffer, mut x: i32, y: i32, text: &str, color: u32) {
    for ch in text.chars() {
        draw_char_5x7(fb, x, y, ch, color);
        x += 6; // 5 pixels glyph width + 1 pixel spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_packs_rgba_into_window_pixels() {
        let host = WindowHost::new(2, 1);
        let texture = TextureHandle::from_raw(1).unwrap();
        let rgba = [0x11, 0x22, 0x33, 0xff, 0xaa, 0xbb, 0xcc, 0xff];
        host.update_texture(texture, &rgba, 8, 8).unwrap();
        assert_eq!(host.latest().pixels, vec![0x00112233, 0x00aabbcc]);
    }

    #[test]
    fn upload_with_wrong_pitch_is_refused() {
        let host = WindowHost::new(2, 2);
        let texture = TextureHandle::from_raw(1).unwrap();
        assert!(host.update_texture(texture, &[0; 16], 8, 8).is_err());
    }

    #[test]
    fn text_clips_at_the_edge() {
        let mut fb = FrameBuffer::new(8, 8);
        draw_text_5x7(&mut fb, 4, 4, "RAW", 0x00ffffff);
        assert!(fb.pixels.iter().any(|&p| p == 0x00ffffff));
    }
}
