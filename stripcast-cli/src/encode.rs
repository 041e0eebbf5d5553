use image::{RgbImage, imageops};
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};

use crate::error::{Error, Result};

/// One horizontal band of the source image, independently decodable.
/// Indices are contiguous from 0; `[y_start, y_end)` bands partition the
/// source rows with no gap or overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegStrip {
    pub index: u16,
    pub y_start: u32,
    pub y_end: u32,
    pub data: Vec<u8>,
}

/// Encode the whole image as one baseline JPEG: non-progressive scan, 4:2:0
/// subsampling, standard Huffman tables. Output is byte-identical across runs
/// for the same input+quality (constrained device decoders reject progressive
/// JPEG, and the SJPG round-trip tests rely on the determinism).
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    if !(1..=100).contains(&quality) {
        return Err(Error::Encode(format!(
            "quality must be within 1..=100, got {quality}"
        )));
    }
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::Encode("image has zero area".into()));
    }
    if img.width() > u16::MAX as u32 || img.height() > u16::MAX as u32 {
        return Err(Error::Encode(format!(
            "image dimensions {}x{} exceed the encoder's u16 range",
            img.width(),
            img.height()
        )));
    }
    let mut bytes = Vec::new();
    let mut encoder = Encoder::new(&mut bytes, quality);
    encoder.set_sampling_factor(SamplingFactor::F_2_2);
    encoder
        .encode(
            img.as_raw(),
            img.width() as u16,
            img.height() as u16,
            ColorType::Rgb,
        )
        .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Partition the image rows top-to-bottom into `ceil(height / strip_height)`
/// bands (the last band possibly shorter) and encode each band on its own.
pub fn split_and_encode(img: &RgbImage, strip_height: u16, quality: u8) -> Result<Vec<JpegStrip>> {
    if strip_height == 0 {
        return Err(Error::InvalidParameter("strip height must be non-zero".into()));
    }
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::Encode("image has zero area".into()));
    }
    let height = img.height();
    let num_strips = height.div_ceil(strip_height as u32);
    if num_strips > u16::MAX as u32 {
        return Err(Error::Encode(format!(
            "{num_strips} strips exceed the container's u16 strip count"
        )));
    }

    let mut strips = Vec::with_capacity(num_strips as usize);
    for i in 0..num_strips {
        let y_start = i * strip_height as u32;
        let y_end = (y_start + strip_height as u32).min(height);
        let band = imageops::crop_imm(img, 0, y_start, img.width(), y_end - y_start).to_image();
        let strip = JpegStrip {
            index: i as u16,
            y_start,
            y_end,
            data: encode_jpeg(&band, quality)?,
        };
        tracing::debug!(
            strip = strip.index,
            rows = strip.y_end - strip.y_start,
            bytes = strip.data.len(),
            "encoded strip"
        );
        strips.push(strip);
    }
    Ok(strips)
}
