use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};

use crate::config::ColorOrder;
use crate::error::{Error, Result};

/// Exact pixel dimensions of the destination panel. Supplied per conversion
/// request, never ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelTarget {
    pub width: u32,
    pub height: u32,
}

impl PanelTarget {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidParameter(format!(
                "panel dimensions must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    /// Rotate 90° when a landscape source meets a portrait panel.
    Auto,
    None,
    /// Rotate by exactly the given degrees; only 0/90/180/270 are valid.
    Explicit(u16),
}

impl FromStr for RotationPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(RotationPolicy::Auto),
            "none" => Ok(RotationPolicy::None),
            _ => {
                let degrees: u16 = s.parse().map_err(|_| {
                    Error::InvalidParameter(format!(
                        "rotation must be auto, none, or a degree value, got '{s}'"
                    ))
                })?;
                validate_degrees(degrees)?;
                Ok(RotationPolicy::Explicit(degrees))
            }
        }
    }
}

fn validate_degrees(degrees: u16) -> Result<()> {
    match degrees {
        0 | 90 | 180 | 270 => Ok(()),
        other => Err(Error::InvalidParameter(format!(
            "rotation must be one of 0/90/180/270 degrees, got {other}"
        ))),
    }
}

/// A panel-exact RGB (or pre-swapped BGR) pixel buffer, 3 bytes per pixel.
/// `width`/`height` always equal the requested panel target.
#[derive(Debug)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl PreparedImage {
    pub fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or_else(|| {
            Error::InvalidParameter("pixel buffer does not match image dimensions".into())
        })
    }
}

/// Whether a landscape source pointed at a portrait panel should be turned
/// 90° before scaling. Pure function of the four dimensions.
pub fn should_auto_rotate(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> bool {
    src_w > src_h && target_h > target_w
}

/// Decode arbitrary image bytes and normalize them into a panel-exact buffer:
/// EXIF orientation, rotation policy, uniform scale-to-fit, black letterbox,
/// optional R/B swap for BGR panels.
pub fn prepare(
    source: &[u8],
    target: PanelTarget,
    rotation: RotationPolicy,
    color_order: ColorOrder,
) -> Result<PreparedImage> {
    let orientation_tag = exif_orientation(source);
    let mut img = image::load_from_memory(source)?;
    if let Some(tag) = orientation_tag {
        img = apply_exif_orientation(img, tag);
    }

    // Rotation happens before scaling; dimensions are re-read afterwards.
    let degrees = match rotation {
        RotationPolicy::None => 0,
        RotationPolicy::Explicit(d) => {
            validate_degrees(d)?;
            d
        }
        RotationPolicy::Auto => {
            if should_auto_rotate(img.width(), img.height(), target.width, target.height) {
                tracing::debug!(
                    src_w = img.width(),
                    src_h = img.height(),
                    "landscape source on portrait panel, rotating 90"
                );
                90
            } else {
                0
            }
        }
    };
    let img = rotate(img, degrees);

    let (new_w, new_h) = fit_dimensions(img.width(), img.height(), target.width, target.height);
    let scaled = img.resize_exact(new_w, new_h, FilterType::Lanczos3).to_rgb8();

    let mut canvas: RgbImage = ImageBuffer::from_pixel(target.width, target.height, Rgb([0, 0, 0]));
    let off_x = (target.width - new_w) / 2;
    let off_y = (target.height - new_h) / 2;
    imageops::overlay(&mut canvas, &scaled, off_x as i64, off_y as i64);
    tracing::debug!(new_w, new_h, off_x, off_y, "scaled and letterboxed");

    let mut pixels = canvas.into_raw();
    if color_order == ColorOrder::Bgr {
        swap_red_blue(&mut pixels);
    }

    Ok(PreparedImage {
        width: target.width,
        height: target.height,
        pixels,
    })
}

/// Rotate with canvas expansion; dimensions swap for 90/270.
fn rotate(img: DynamicImage, degrees: u16) -> DynamicImage {
    match degrees {
        90 => DynamicImage::ImageRgba8(imageops::rotate90(&img)),
        180 => DynamicImage::ImageRgba8(imageops::rotate180(&img)),
        270 => DynamicImage::ImageRgba8(imageops::rotate270(&img)),
        _ => img,
    }
}

/// Uniform scale-to-fit dimensions: `floor(src * min(ratio_w, ratio_h))`,
/// clamped to at least one pixel per axis.
pub(crate) fn fit_dimensions(src_w: u32, src_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let scale = f64::min(max_w as f64 / src_w as f64, max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).floor() as u32).clamp(1, max_w);
    let h = ((src_h as f64 * scale).floor() as u32).clamp(1, max_h);
    (w, h)
}

fn swap_red_blue(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

/// Attempt to parse the EXIF orientation tag (1,3,6,8) from raw image bytes.
/// Non-EXIF sources are common and simply yield `None`.
fn exif_orientation(bytes: &[u8]) -> Option<u16> {
    use std::io::Cursor;
    let mut cursor = Cursor::new(bytes);
    let reader = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = reader.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    if let exif::Value::Short(ref v) = field.value {
        return v.first().copied();
    }
    None
}

/// Apply EXIF orientation producing a correctly oriented image in view
/// coordinates. Mirror tags (2,4,5,7) fall back to the original.
fn apply_exif_orientation(img: DynamicImage, tag: u16) -> DynamicImage {
    match tag {
        3 => DynamicImage::ImageRgba8(imageops::rotate180(&img)),
        6 => DynamicImage::ImageRgba8(imageops::rotate90(&img)),
        8 => DynamicImage::ImageRgba8(imageops::rotate270(&img)),
        _ => img,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img.clone())
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        bytes
    }

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        ImageBuffer::from_pixel(w, h, Rgb(rgb))
    }

    #[test]
    fn auto_rotation_predicate() {
        // landscape source, portrait panel
        assert!(should_auto_rotate(1920, 1080, 240, 280));
        // portrait source, portrait panel
        assert!(!should_auto_rotate(1080, 1920, 240, 280));
        // landscape source, landscape panel
        assert!(!should_auto_rotate(1920, 1080, 280, 240));
        // square source never rotates
        assert!(!should_auto_rotate(500, 500, 240, 280));
    }

    #[test]
    fn fit_dimensions_floors() {
        // 1080x1920 into 240x280: scale = 280/1920
        assert_eq!(fit_dimensions(1080, 1920, 240, 280), (157, 280));
        // exact aspect match fills the target
        assert_eq!(fit_dimensions(480, 560, 240, 280), (240, 280));
        // extreme aspect still yields at least one pixel
        assert_eq!(fit_dimensions(10000, 1, 240, 280), (240, 1));
    }

    #[test]
    fn output_is_always_panel_sized() {
        let target = PanelTarget::new(240, 280).unwrap();
        for (w, h) in [(1920, 1080), (100, 100), (280, 240), (7, 1300)] {
            let src = png_bytes(&solid(w, h, [10, 20, 30]));
            let out = prepare(&src, target, RotationPolicy::None, ColorOrder::Rgb).unwrap();
            assert_eq!((out.width, out.height), (240, 280), "source {w}x{h}");
            assert_eq!(out.pixels.len(), 240 * 280 * 3);
        }
    }

    #[test]
    fn matching_aspect_has_no_letterbox() {
        let target = PanelTarget::new(240, 280).unwrap();
        let src = png_bytes(&solid(480, 560, [200, 0, 0]));
        let out = prepare(&src, target, RotationPolicy::None, ColorOrder::Rgb).unwrap();
        // no black bars anywhere: corners carry source color
        let img = out.to_image().unwrap();
        for (x, y) in [(0, 0), (239, 0), (0, 279), (239, 279)] {
            assert_ne!(img.get_pixel(x, y).0, [0, 0, 0], "pixel ({x},{y})");
        }
    }

    #[test]
    fn landscape_to_portrait_auto_rotates_and_letterboxes() {
        // End-to-end scenario: 1920x1080 landscape onto a 240x280 portrait
        // panel. After the 90° turn the source is 1080x1920, scaling to
        // 157x280, so the black bars sit on the left/right.
        let target = PanelTarget::new(240, 280).unwrap();
        let src = png_bytes(&solid(1920, 1080, [250, 250, 250]));
        let out = prepare(&src, target, RotationPolicy::Auto, ColorOrder::Rgb).unwrap();
        assert_eq!((out.width, out.height), (240, 280));
        let img = out.to_image().unwrap();
        // left/right margins are letterbox black
        assert_eq!(img.get_pixel(0, 140).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(239, 140).0, [0, 0, 0]);
        // the centered content is not
        let center = img.get_pixel(120, 140).0;
        assert!(center.iter().all(|&c| c > 240), "center {center:?}");
        // top/bottom rows are content, not bars
        assert_ne!(img.get_pixel(120, 0).0, [0, 0, 0]);
        assert_ne!(img.get_pixel(120, 279).0, [0, 0, 0]);
    }

    #[test]
    fn explicit_rotation_turns_the_content() {
        // 2x1 source: red on the left, green on the right. Rotated 90°
        // clockwise the left edge becomes the top edge, so the top half of
        // the now-vertical image is red and the bottom half green.
        let mut src_img = RgbImage::new(2, 1);
        src_img.put_pixel(0, 0, Rgb([255, 0, 0]));
        src_img.put_pixel(1, 0, Rgb([0, 255, 0]));
        let src = png_bytes(&src_img);
        let target = PanelTarget::new(8, 8).unwrap();
        let out = prepare(&src, target, RotationPolicy::Explicit(90), ColorOrder::Rgb).unwrap();
        let img = out.to_image().unwrap();
        let top = img.get_pixel(4, 0).0;
        let bottom = img.get_pixel(4, 7).0;
        assert!(top[0] > top[1], "top should be red, got {top:?}");
        assert!(bottom[1] > bottom[0], "bottom should be green, got {bottom:?}");
    }

    #[test]
    fn invalid_rotation_degrees_rejected() {
        let target = PanelTarget::new(8, 8).unwrap();
        let src = png_bytes(&solid(4, 4, [1, 2, 3]));
        let err = prepare(&src, target, RotationPolicy::Explicit(45), ColorOrder::Rgb).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        assert!(matches!(
            "45".parse::<RotationPolicy>().unwrap_err(),
            Error::InvalidParameter(_)
        ));
        assert_eq!("270".parse::<RotationPolicy>().unwrap(), RotationPolicy::Explicit(270));
        assert_eq!("auto".parse::<RotationPolicy>().unwrap(), RotationPolicy::Auto);
    }

    #[test]
    fn bgr_swaps_channels() {
        let target = PanelTarget::new(4, 4).unwrap();
        let src = png_bytes(&solid(4, 4, [255, 0, 0]));
        let out = prepare(&src, target, RotationPolicy::None, ColorOrder::Bgr).unwrap();
        // red source lands in the blue slot
        assert_eq!(&out.pixels[0..3], &[0, 0, 255]);
    }

    #[test]
    fn undecodable_input_is_a_decode_error() {
        let target = PanelTarget::new(4, 4).unwrap();
        let err = prepare(b"not an image", target, RotationPolicy::None, ColorOrder::Rgb)
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn zero_panel_dimension_rejected() {
        assert!(matches!(
            PanelTarget::new(0, 280).unwrap_err(),
            Error::InvalidParameter(_)
        ));
    }
}
