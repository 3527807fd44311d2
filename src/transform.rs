//! Geometry and compositing transforms
//!
//! Pure functions over `DynamicImage`: each takes a borrowed image and
//! returns a new one. They hold no state and are safe to call from any
//! thread.

use crate::color::Color;
use crate::error::{ImagerError, Result};
use image::{
    imageops::{self, FilterType},
    DynamicImage, ImageBuffer, Pixel, Primitive, RgbImage, RgbaImage,
};

/// Resampling filter for every resize
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// A resolved background, ready to composite onto
#[derive(Debug, Clone)]
pub enum Background {
    /// Solid fill; the color's own alpha is ignored
    Color(Color),
    /// Image scaled to cover the canvas and center-cropped
    Image(DynamicImage),
}

/// Crop to the tightest box containing every pixel with alpha > 0
///
/// A fully transparent image is returned unchanged. Cropping an already
/// cropped image is a no-op.
///
/// # Errors
/// `MissingAlphaChannel` if the image has no alpha channel.
pub fn autocrop(image: &DynamicImage) -> Result<DynamicImage> {
    let bounds = match image {
        DynamicImage::ImageLumaA8(buffer) => opaque_bounds(buffer),
        DynamicImage::ImageRgba8(buffer) => opaque_bounds(buffer),
        DynamicImage::ImageLumaA16(buffer) => opaque_bounds(buffer),
        DynamicImage::ImageRgba16(buffer) => opaque_bounds(buffer),
        DynamicImage::ImageRgba32F(buffer) => opaque_bounds(buffer),
        other => {
            return Err(ImagerError::missing_alpha(format!(
                "cannot autocrop a {:?} image",
                other.color()
            )))
        },
    };

    match bounds {
        Some((x, y, width, height)) if (width, height) != image_dimensions(image) => {
            tracing::trace!(x, y, width, height, "Autocrop bounding box");
            Ok(image.crop_imm(x, y, width, height))
        },
        Some(_) => Ok(image.clone()),
        None => {
            tracing::debug!("Image is fully transparent, skipping autocrop");
            Ok(image.clone())
        },
    }
}

/// Bounding box `(x, y, width, height)` of pixels whose alpha exceeds zero
fn opaque_bounds<P>(buffer: &ImageBuffer<P, Vec<P::Subpixel>>) -> Option<(u32, u32, u32, u32)>
where
    P: Pixel,
{
    let zero = <P::Subpixel as Primitive>::DEFAULT_MIN_VALUE;
    let mut bounds: Option<(u32, u32, u32, u32)> = None;

    for (x, y, pixel) in buffer.enumerate_pixels() {
        let visible = pixel.channels().last().is_some_and(|alpha| *alpha > zero);
        if !visible {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((min_x, min_y, max_x, max_y)) => {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        });
    }

    bounds.map(|(min_x, min_y, max_x, max_y)| (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

fn image_dimensions(image: &DynamicImage) -> (u32, u32) {
    (image.width(), image.height())
}

/// Largest size with the source aspect ratio that fits inside the target
///
/// One side always equals its target and neither side exceeds it. The
/// other side is rounded to the nearest pixel and never drops below 1.
#[must_use]
pub fn fit_dimensions(src_width: u32, src_height: u32, target_width: u32, target_height: u32) -> (u32, u32) {
    let (sw, sh) = (u64::from(src_width.max(1)), u64::from(src_height.max(1)));
    let (tw, th) = (u64::from(target_width), u64::from(target_height));

    // Compare sw/sh against tw/th without floating point
    if sw * th >= sh * tw {
        let height = (sh * tw * 2 + sw) / (sw * 2);
        (target_width, clamp_side(height, target_height))
    } else {
        let width = (sw * th * 2 + sh) / (sh * 2);
        (clamp_side(width, target_width), target_height)
    }
}

fn clamp_side(value: u64, limit: u32) -> u32 {
    u32::try_from(value).unwrap_or(limit).clamp(1, limit.max(1))
}

/// Scale to fit inside `width` x `height`, keeping the aspect ratio
///
/// Upscales as well as downscales, using Lanczos3.
///
/// # Errors
/// `InvalidDimension` for a zero target or a zero-sized image.
pub fn resize_to_fit(image: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage> {
    if width == 0 || height == 0 {
        return Err(ImagerError::invalid_dimension(format!(
            "resize target {}x{} must be positive",
            width, height
        )));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(ImagerError::invalid_dimension(format!(
            "cannot resize an empty {}x{} image",
            image.width(),
            image.height()
        )));
    }

    let (new_width, new_height) = fit_dimensions(image.width(), image.height(), width, height);
    if (new_width, new_height) == image_dimensions(image) {
        return Ok(image.clone());
    }

    tracing::trace!(
        from = %format!("{}x{}", image.width(), image.height()),
        to = %format!("{}x{}", new_width, new_height),
        "Resizing"
    );
    Ok(image.resize_exact(new_width, new_height, RESIZE_FILTER))
}

/// Center the image on a transparent RGBA canvas of exactly `width` x `height`
///
/// The offset is `((width - w) / 2, (height - h) / 2)`. Pixels are copied
/// as-is, including their alpha.
///
/// # Errors
/// `InvalidDimension` when the image is larger than the canvas on either axis.
pub fn pad_to_canvas(image: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage> {
    if image.width() > width || image.height() > height {
        return Err(ImagerError::invalid_dimension(format!(
            "{}x{} image does not fit on a {}x{} canvas",
            image.width(),
            image.height(),
            width,
            height
        )));
    }

    let offset_x = (width - image.width()) / 2;
    let offset_y = (height - image.height()) / 2;

    let mut canvas = RgbaImage::new(width, height);
    imageops::replace(
        &mut canvas,
        &image.to_rgba8(),
        i64::from(offset_x),
        i64::from(offset_y),
    );

    Ok(DynamicImage::ImageRgba8(canvas))
}

/// Flatten the image onto a background; the result is opaque RGB8
///
/// Each channel becomes `fg * a + bg * (1 - a)` with rounding, so fully
/// transparent pixels take the exact background value and opaque pixels
/// keep theirs.
#[must_use]
pub fn composite_on_background(image: &DynamicImage, background: &Background) -> DynamicImage {
    let foreground = image.to_rgba8();
    let (width, height) = foreground.dimensions();

    let output = match background {
        Background::Color(color) => {
            let base = color.to_rgb_array();
            RgbImage::from_fn(width, height, |x, y| {
                blend(foreground.get_pixel(x, y).0, base)
            })
        },
        Background::Image(layer) if width > 0 && height > 0 => {
            let base = layer.resize_to_fill(width, height, RESIZE_FILTER).to_rgb8();
            RgbImage::from_fn(width, height, |x, y| {
                blend(foreground.get_pixel(x, y).0, base.get_pixel(x, y).0)
            })
        },
        Background::Image(_) => RgbImage::new(width, height),
    };

    DynamicImage::ImageRgb8(output)
}

fn blend(foreground: [u8; 4], background: [u8; 3]) -> image::Rgb<u8> {
    let [r, g, b, a] = foreground;
    let alpha = u32::from(a);
    let mix = |fg: u8, bg: u8| {
        ((u32::from(fg) * alpha + u32::from(bg) * (255 - alpha) + 127) / 255) as u8
    };
    image::Rgb([
        mix(r, background[0]),
        mix(g, background[1]),
        mix(b, background[2]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, LumaA, Rgba};

    fn opaque(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([40, 90, 200])))
    }

    /// Transparent canvas with one opaque block at `(x, y)` of `w` x `h`
    fn block_on_transparent(canvas: (u32, u32), x: u32, y: u32, w: u32, h: u32) -> DynamicImage {
        let mut buffer = RgbaImage::new(canvas.0, canvas.1);
        for py in y..y + h {
            for px in x..x + w {
                buffer.put_pixel(px, py, Rgba([250, 10, 10, 255]));
            }
        }
        DynamicImage::ImageRgba8(buffer)
    }

    #[test]
    fn test_autocrop_block() {
        let image = block_on_transparent((500, 500), 100, 150, 300, 200);
        let cropped = autocrop(&image).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (300, 200));
        assert!(cropped.to_rgba8().pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_autocrop_is_idempotent() {
        let image = block_on_transparent((64, 48), 5, 7, 20, 11);
        let once = autocrop(&image).unwrap();
        let twice = autocrop(&once).unwrap();
        assert_eq!(once.to_rgba8(), twice.to_rgba8());
    }

    #[test]
    fn test_autocrop_counts_faint_alpha() {
        let mut buffer = RgbaImage::new(10, 10);
        buffer.put_pixel(2, 3, Rgba([0, 0, 0, 1]));
        buffer.put_pixel(6, 8, Rgba([0, 0, 0, 1]));
        let cropped = autocrop(&DynamicImage::ImageRgba8(buffer)).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (5, 6));
    }

    #[test]
    fn test_autocrop_fully_transparent_unchanged() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(30, 20));
        let cropped = autocrop(&image).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (30, 20));
    }

    #[test]
    fn test_autocrop_luma_alpha() {
        let mut buffer = ImageBuffer::<LumaA<u8>, Vec<u8>>::new(8, 8);
        buffer.put_pixel(4, 4, LumaA([200, 255]));
        let cropped = autocrop(&DynamicImage::ImageLumaA8(buffer)).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (1, 1));
    }

    #[test]
    fn test_autocrop_requires_alpha() {
        let result = autocrop(&opaque(10, 10));
        assert!(matches!(result, Err(ImagerError::MissingAlphaChannel(_))));

        let result = autocrop(&DynamicImage::ImageLuma8(GrayImage::new(4, 4)));
        assert!(matches!(result, Err(ImagerError::MissingAlphaChannel(_))));
    }

    #[test]
    fn test_fit_dimensions() {
        assert_eq!(fit_dimensions(1000, 500, 800, 600), (800, 400));
        assert_eq!(fit_dimensions(500, 1000, 800, 600), (300, 600));
        assert_eq!(fit_dimensions(300, 200, 900, 900), (900, 600));
        assert_eq!(fit_dimensions(640, 480, 640, 480), (640, 480));
        // 1000:3 into 100x100 rounds the short side up to 1
        assert_eq!(fit_dimensions(1000, 3, 100, 100), (100, 1));
        // 333 * 200 / 1000 = 66.6 rounds to 67
        assert_eq!(fit_dimensions(1000, 333, 200, 200), (200, 67));
    }

    #[test]
    fn test_fit_dimensions_never_exceeds_target() {
        for (sw, sh) in [(1, 1), (7, 3), (3, 7), (1920, 1080), (1080, 1920), (999, 1000)] {
            for (tw, th) in [(1, 1), (10, 30), (30, 10), (240, 240), (800, 600)] {
                let (w, h) = fit_dimensions(sw, sh, tw, th);
                assert!(w <= tw && h <= th, "{sw}x{sh} -> {tw}x{th} gave {w}x{h}");
                assert!(w == tw || h == th, "{sw}x{sh} -> {tw}x{th} gave {w}x{h}");
                assert!(w >= 1 && h >= 1);
            }
        }
    }

    #[test]
    fn test_resize_preserves_aspect_ratio() {
        let resized = resize_to_fit(&opaque(1000, 500), 800, 600).unwrap();
        assert_eq!((resized.width(), resized.height()), (800, 400));

        let upscaled = resize_to_fit(&opaque(30, 20), 300, 300).unwrap();
        assert_eq!((upscaled.width(), upscaled.height()), (300, 200));
    }

    #[test]
    fn test_resize_keeps_color_type() {
        let image = block_on_transparent((40, 40), 0, 0, 20, 20);
        let resized = resize_to_fit(&image, 20, 20).unwrap();
        assert!(resized.color().has_alpha());
    }

    #[test]
    fn test_resize_rejects_zero() {
        assert!(matches!(
            resize_to_fit(&opaque(10, 10), 0, 10),
            Err(ImagerError::InvalidDimension(_))
        ));
        assert!(matches!(
            resize_to_fit(&DynamicImage::new_rgba8(0, 5), 10, 10),
            Err(ImagerError::InvalidDimension(_))
        ));
    }

    #[test]
    fn test_pad_centers_content() {
        let resized = resize_to_fit(&opaque(1000, 500), 800, 600).unwrap();
        let padded = pad_to_canvas(&resized, 800, 600).unwrap().to_rgba8();

        assert_eq!(padded.dimensions(), (800, 600));
        // 100px transparent bands top and bottom
        assert_eq!(padded.get_pixel(400, 99)[3], 0);
        assert_eq!(padded.get_pixel(400, 100)[3], 255);
        assert_eq!(padded.get_pixel(400, 499)[3], 255);
        assert_eq!(padded.get_pixel(400, 500)[3], 0);
        assert_eq!(padded.get_pixel(0, 300)[3], 255);
    }

    #[test]
    fn test_pad_copies_alpha_without_blending() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 77])));
        let padded = pad_to_canvas(&image, 4, 4).unwrap().to_rgba8();
        assert_eq!(padded.get_pixel(1, 1), &Rgba([10, 20, 30, 77]));
        assert_eq!(padded.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_pad_odd_remainder_goes_right_and_bottom() {
        let padded = pad_to_canvas(&opaque(2, 2), 5, 5).unwrap().to_rgba8();
        assert_eq!(padded.get_pixel(0, 0)[3], 0);
        assert_eq!(padded.get_pixel(1, 1)[3], 255);
        assert_eq!(padded.get_pixel(2, 2)[3], 255);
        assert_eq!(padded.get_pixel(3, 3)[3], 0);
    }

    #[test]
    fn test_pad_rejects_oversized() {
        assert!(matches!(
            pad_to_canvas(&opaque(10, 5), 8, 8),
            Err(ImagerError::InvalidDimension(_))
        ));
    }

    #[test]
    fn test_resize_then_pad_is_exact_target() {
        for (sw, sh) in [(1000, 500), (500, 1000), (333, 777), (1, 1)] {
            for (tw, th) in [(800, 600), (240, 240), (17, 91)] {
                let resized = resize_to_fit(&opaque(sw, sh), tw, th).unwrap();
                let padded = pad_to_canvas(&resized, tw, th).unwrap();
                assert_eq!((padded.width(), padded.height()), (tw, th));
            }
        }
    }

    #[test]
    fn test_composite_color() {
        let mut buffer = RgbaImage::new(3, 1);
        buffer.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        buffer.put_pixel(1, 0, Rgba([0, 0, 255, 128]));
        buffer.put_pixel(2, 0, Rgba([0, 255, 0, 255]));

        let red = Background::Color(Color::rgb(255, 0, 0));
        let flattened = composite_on_background(&DynamicImage::ImageRgba8(buffer), &red);

        assert!(!flattened.color().has_alpha());
        let rgb = flattened.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 0).0, [127, 0, 128]);
        assert_eq!(rgb.get_pixel(2, 0).0, [0, 255, 0]);
    }

    #[test]
    fn test_composite_ignores_background_alpha() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(2, 2));
        let background = Background::Color(Color::rgba(10, 20, 30, 0));
        let flattened = composite_on_background(&image, &background).to_rgb8();
        assert!(flattened.pixels().all(|p| p.0 == [10, 20, 30]));
    }

    #[test]
    fn test_composite_image_background_covers_canvas() {
        let layer = DynamicImage::ImageRgb8(RgbImage::from_pixel(7, 3, image::Rgb([0, 0, 250])));
        let image = DynamicImage::ImageRgba8(RgbaImage::new(20, 10));

        let flattened = composite_on_background(&image, &Background::Image(layer));
        let rgb = flattened.to_rgb8();

        assert_eq!(rgb.dimensions(), (20, 10));
        assert!(rgb.pixels().all(|p| p.0[2] > 200));
    }

    #[test]
    fn test_composite_opaque_input_flattens() {
        let image = opaque(4, 4);
        let flattened = composite_on_background(&image, &Background::Color(Color::WHITE));
        assert_eq!(flattened.to_rgb8(), image.to_rgb8());
    }
}
