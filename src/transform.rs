//! Frame decode and rotation application.
//!
//! JPEG work is delegated to the `image` codec. Positive corrective angles
//! rotate clockwise on screen. Cardinal angles map to exact quarter-turn
//! transforms (lossless, canvas resized); any other angle is resampled about
//! the image center into a canvas of the original size, with uncovered
//! corners transparent.

use anyhow::{Context, Result};
use image::{imageops, Rgba, RgbaImage};

const CARDINAL_EPSILON: f64 = 1e-9;

/// Decodes a demuxed JPEG span into RGBA pixels.
pub fn decode_jpeg(bytes: &[u8]) -> Result<RgbaImage> {
    let image = image::load_from_memory(bytes).context("decode jpeg frame")?;
    Ok(image.into_rgba8())
}

/// Applies the resolved corrective angle to a decoded frame.
pub fn rotate_frame(image: &RgbaImage, angle_deg: f64) -> RgbaImage {
    if angle_deg.abs() < CARDINAL_EPSILON {
        return image.clone();
    }
    if (angle_deg - 90.0).abs() < CARDINAL_EPSILON {
        return imageops::rotate90(image);
    }
    if (angle_deg.abs() - 180.0).abs() < CARDINAL_EPSILON {
        return imageops::rotate180(image);
    }
    if (angle_deg + 90.0).abs() < CARDINAL_EPSILON {
        return imageops::rotate270(image);
    }
    rotate_arbitrary(image, angle_deg)
}

/// Nearest-neighbor rotation about the image center. Output keeps the input
/// dimensions; pixels mapping outside the source stay transparent.
fn rotate_arbitrary(image: &RgbaImage, angle_deg: f64) -> RgbaImage {
    let (width, height) = image.dimensions();
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let cx = (width as f64 - 1.0) / 2.0;
    let cy = (height as f64 - 1.0) / 2.0;

    let mut out = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    for y in 0..height {
        for x in 0..width {
            // Inverse-map the output pixel back into the source.
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let sx = (cos * dx + sin * dy + cx).round();
            let sy = (-sin * dx + cos * dy + cy).round();
            if sx >= 0.0 && sy >= 0.0 && (sx as u32) < width && (sy as u32) < height {
                out.put_pixel(x, y, *image.get_pixel(sx as u32, sy as u32));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 40) as u8, (y * 40) as u8, 0, 255])
        })
    }

    #[test]
    fn zero_angle_is_identity() {
        let image = gradient(4, 2);
        assert_eq!(rotate_frame(&image, 0.0), image);
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        let image = gradient(4, 2);
        assert_eq!(rotate_frame(&image, 90.0).dimensions(), (2, 4));
        assert_eq!(rotate_frame(&image, -90.0).dimensions(), (2, 4));
        assert_eq!(rotate_frame(&image, 180.0).dimensions(), (4, 2));
        assert_eq!(rotate_frame(&image, -180.0).dimensions(), (4, 2));
    }

    #[test]
    fn half_turn_moves_corner_pixel() {
        let image = gradient(3, 3);
        let rotated = rotate_frame(&image, 180.0);
        assert_eq!(rotated.get_pixel(2, 2), image.get_pixel(0, 0));
    }

    #[test]
    fn arbitrary_angle_keeps_canvas_size() {
        let image = gradient(5, 3);
        let rotated = rotate_frame(&image, 33.0);
        assert_eq!(rotated.dimensions(), (5, 3));
    }

    #[test]
    fn arbitrary_rotation_preserves_center_pixel() {
        let image = gradient(5, 5);
        let rotated = rotate_frame(&image, 45.0);
        assert_eq!(rotated.get_pixel(2, 2), image.get_pixel(2, 2));
    }

    #[test]
    fn decode_rejects_non_jpeg_bytes() {
        assert!(decode_jpeg(b"not an image").is_err());
    }
}
