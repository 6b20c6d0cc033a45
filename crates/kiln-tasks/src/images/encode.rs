//! Raster encoders: AVIF, WebP, progressive JPEG, lossless PNG.

use std::io;
use std::panic::{self, AssertUnwindSafe};

use image::codecs::avif::AvifEncoder;
use image::DynamicImage;

use super::EncodeError;

/// ravif speed preset; 1 is slowest/smallest, 10 fastest.
const AVIF_SPEED: u8 = 6;

pub fn avif(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    let mut out = Vec::new();
    let encoder = AvifEncoder::new_with_speed_quality(&mut out, AVIF_SPEED, quality);
    rgba.write_with_encoder(encoder)?;
    Ok(out)
}

pub fn webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    let encoder =
        webp::Encoder::from_image(&rgba).map_err(|e| EncodeError::Webp(e.to_string()))?;
    Ok(encoder.encode(f32::from(quality)).to_vec())
}

/// Lossy re-encode with progressive scans.
pub fn jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    // libjpeg reports fatal errors by unwinding.
    let result = panic::catch_unwind(AssertUnwindSafe(|| -> io::Result<Vec<u8>> {
        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
        comp.set_size(width as usize, height as usize);
        comp.set_quality(f32::from(quality));
        comp.set_progressive_mode();

        let mut started = comp.start_compress(Vec::new())?;
        started.write_scanlines(rgb.as_raw())?;
        started.finish()
    }));

    match result {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(EncodeError::Jpeg(e.to_string())),
        Err(_) => Err(EncodeError::Jpeg("libjpeg aborted".to_string())),
    }
}

/// Lossless optimisation at an oxipng preset level (0-6).
pub fn png(data: &[u8], level: u8) -> Result<Vec<u8>, EncodeError> {
    let options = oxipng::Options::from_preset(level.min(6));
    oxipng::optimize_from_memory(data, &options).map_err(|e| EncodeError::Png(e.to_string()))
}
