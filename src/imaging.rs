use crate::{config::UPSCALE_EDGE, error::Result};
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::io::Cursor;

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Lanczos resample to a fixed square, ignoring the source aspect ratio.
pub fn upscale(image: &DynamicImage) -> DynamicImage {
    image.resize_exact(UPSCALE_EDGE, UPSCALE_EDGE, FilterType::Lanczos3)
}
