//! In-memory image fixtures encoded with the `image` crate.

use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage, RgbaImage};
use std::io::Cursor;

/// PNG of a single colour
pub fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode_png(&RgbImage::from_pixel(width, height, Rgb(rgb)))
}

/// PNG of deterministic pseudo-random pixels; compresses poorly on purpose
pub fn noise_png(width: u32, height: u32, seed: u64) -> Vec<u8> {
    let mut state = seed.max(1);
    let image = RgbImage::from_fn(width, height, |_, _| {
        // xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let [r, g, b, ..] = state.to_le_bytes();
        Rgb([r, g, b])
    });
    encode_png(&image)
}

/// JPEG of a single colour
pub fn solid_jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(rgb));
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 90)
        .encode_image(&image)
        .expect("Failed to encode JPEG fixture");
    bytes
}

/// Single-frame GIF of a single colour
pub fn solid_gif(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, image::Rgba([rgb[0], rgb[1], rgb[2], 255]));
    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        encoder
            .encode_frame(image::Frame::new(image))
            .expect("Failed to encode GIF fixture");
    }
    bytes
}

fn encode_png(image: &RgbImage) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    cursor.into_inner()
}
