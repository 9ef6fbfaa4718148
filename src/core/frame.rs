//! Frame type and the pixel operations the pipeline needs.
//!
//! Frames are dense 8-bit RGB buffers. Each stage owns the frame it works
//! on; crossing a stage boundary means cloning, never sharing.

use crate::core::landmarks::BoundingBox;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};

/// A captured video frame (height x width x 3, RGB order).
pub type Frame = RgbImage;

/// Mirror a frame horizontally so the preview behaves like a mirror.
pub fn mirror(frame: &Frame) -> Frame {
    imageops::flip_horizontal(frame)
}

/// Downscale to `max_width` preserving aspect ratio; narrower frames are
/// returned unchanged.
pub fn limit_width(frame: Frame, max_width: u32) -> Frame {
    let (width, height) = frame.dimensions();
    if max_width == 0 || width <= max_width {
        return frame;
    }
    let scale = max_width as f64 / width as f64;
    let new_height = ((height as f64 * scale) as u32).max(1);
    imageops::resize(&frame, max_width, new_height, FilterType::Triangle)
}

/// Single-channel luminance copy of a frame.
pub fn grayscale(frame: &Frame) -> GrayImage {
    imageops::grayscale(frame)
}

/// Copy the part of `gray` covered by `bbox`, clamped to the image.
pub fn crop_gray(gray: &GrayImage, bbox: &BoundingBox) -> Option<GrayImage> {
    let region = bbox.clamp_to(gray.width(), gray.height())?;
    Some(
        imageops::crop_imm(
            gray,
            region.x as u32,
            region.y as u32,
            region.width,
            region.height,
        )
        .to_image(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_mirror_flips_columns() {
        let mut frame = Frame::new(3, 1);
        frame.put_pixel(0, 0, Rgb([255, 0, 0]));
        let mirrored = mirror(&frame);
        assert_eq!(mirrored.get_pixel(2, 0), &Rgb([255, 0, 0]));
        assert_eq!(mirrored.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_limit_width_preserves_aspect() {
        let frame = Frame::new(1600, 900);
        let scaled = limit_width(frame, 800);
        assert_eq!(scaled.dimensions(), (800, 450));

        let small = limit_width(Frame::new(640, 480), 800);
        assert_eq!(small.dimensions(), (640, 480));
    }

    #[test]
    fn test_crop_gray_clamps() {
        let gray = GrayImage::new(50, 40);
        let crop = crop_gray(&gray, &BoundingBox::new(40, 30, 20, 20)).unwrap();
        assert_eq!(crop.dimensions(), (10, 10));
        assert!(crop_gray(&gray, &BoundingBox::new(60, 0, 5, 5)).is_none());
    }
}
