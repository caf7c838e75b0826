// Image processing stage: sensor RGB -> 4-channel presented image.
// Raw mode only widens to 4 channels; subtracted mode shows
// 255 - |background - live| so the unchanged scene is bright and anything
// that moved in front of it is dark.
use image::{RgbImage, RgbaImage};

/// Widen 3-channel pixels to 4 channels (opaque alpha), keeping channel order.
/// `dst` must already have the same dimensions as `src`.
pub fn widen_to_rgba(src: &RgbImage, dst: &mut RgbaImage) {
    debug_assert_eq!(src.dimensions(), dst.dimensions());
    for (s, d) in src.as_raw().chunks_exact(3).zip(dst.chunks_exact_mut(4)) {
        d[0] = s[0];
        d[1] = s[1];
        d[2] = s[2];
        d[3] = u8::MAX;
    }
}

/// Per-channel absolute difference, then inverted: `255 - |bg - live|`.
pub fn inverted_difference(background: &RgbImage, live: &RgbImage, out: &mut RgbImage) {
    debug_assert_eq!(background.dimensions(), live.dimensions());
    debug_assert_eq!(live.dimensions(), out.dimensions());
    let pairs = background.as_raw().iter().zip(live.as_raw().iter());
    for (o, (&b, &l)) in out.iter_mut().zip(pairs) {
        *o = u8::MAX - b.abs_diff(l);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};

    #[test]
    fn widen_keeps_channel_order_and_sets_alpha() {
        let src = RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]));
        let mut dst = RgbaImage::new(2, 2);
        widen_to_rgba(&src, &mut dst);
        assert!(dst.pixels().all(|p| *p == Rgba([10, 20, 30, 255])));
    }

    #[test]
    fn unchanged_scene_is_uniformly_bright() {
        let bg = RgbImage::from_fn(4, 3, |x, y| Rgb([x as u8 * 40, y as u8 * 50, 7]));
        let live = bg.clone();
        let mut out = RgbImage::new(4, 3);
        inverted_difference(&bg, &live, &mut out);
        assert!(out.as_raw().iter().all(|&v| v == 255));
    }

    #[test]
    fn foreground_pixels_go_dark() {
        let bg = RgbImage::from_pixel(2, 1, Rgb([200, 200, 200]));
        let mut live = bg.clone();
        live.put_pixel(1, 0, Rgb([0, 250, 200]));
        let mut out = RgbImage::new(2, 1);
        inverted_difference(&bg, &live, &mut out);
        assert_eq!(*out.get_pixel(0, 0), Rgb([255, 255, 255]));
        assert_eq!(*out.get_pixel(1, 0), Rgb([55, 205, 255]));
    }
}
