use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{OcrError, Result};

/// Pixel-level adjustments applied before recognition.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    /// Replace each color channel with the unweighted mean of R, G and B
    pub grayscale: bool,
    /// Signed contrast adjustment, typically -100 to 100
    pub contrast: f32,
    /// Signed offset added to every color channel
    pub brightness: f32,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self::document()
    }
}

impl PreprocessOptions {
    /// Whole-document pass.
    pub fn document() -> Self {
        Self {
            grayscale: true,
            contrast: 30.0,
            brightness: 10.0,
        }
    }

    /// Stronger pass for small manually selected regions.
    pub fn region() -> Self {
        Self {
            grayscale: true,
            contrast: 60.0,
            brightness: 20.0,
        }
    }
}

/// A rectangle in source-image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Decodes an in-memory image payload (PNG, JPEG, ...) into RGBA.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| OcrError::Rendering(format!("cannot decode image: {e}")))
}

/// Encodes an RGBA buffer as PNG bytes.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| OcrError::Rendering(format!("cannot encode image: {e}")))?;
    Ok(bytes)
}

/// Applies grayscale, then contrast, then brightness.
///
/// Each step is skipped when disabled (grayscale off, zero contrast, zero
/// brightness). Alpha is never touched.
pub fn normalize(img: &RgbaImage, options: &PreprocessOptions) -> RgbaImage {
    let mut output = img.clone();

    if options.grayscale {
        for pixel in output.pixels_mut() {
            apply_grayscale(pixel);
        }
    }

    if options.contrast != 0.0 {
        let factor = contrast_factor(options.contrast);
        for pixel in output.pixels_mut() {
            map_channels(pixel, |v| factor * (v - 128.0) + 128.0);
        }
    }

    if options.brightness != 0.0 {
        let offset = options.brightness;
        for pixel in output.pixels_mut() {
            map_channels(pixel, |v| v + offset);
        }
    }

    output
}

/// Classic contrast factor: `259 * (c + 255) / (255 * (259 - c))`.
pub fn contrast_factor(contrast: f32) -> f32 {
    (259.0 * (contrast + 255.0)) / (255.0 * (259.0 - contrast))
}

fn apply_grayscale(pixel: &mut Rgba<u8>) {
    let sum = pixel[0] as f32 + pixel[1] as f32 + pixel[2] as f32;
    let gray = (sum / 3.0).round() as u8;
    pixel[0] = gray;
    pixel[1] = gray;
    pixel[2] = gray;
}

fn map_channels(pixel: &mut Rgba<u8>, f: impl Fn(f32) -> f32) {
    for i in 0..3 {
        pixel[i] = f(pixel[i] as f32).round().clamp(0.0, 255.0) as u8;
    }
}

/// Crops `rect` out of `img`, clipping silently to the available pixels.
///
/// Returns an error only when nothing of the rectangle lies inside the image.
pub fn crop(img: &RgbaImage, rect: &Rect) -> Result<RgbaImage> {
    let (w, h) = img.dimensions();

    let x0 = rect.x.min(w);
    let y0 = rect.y.min(h);
    let rw = rect.width.min(w - x0);
    let rh = rect.height.min(h - y0);

    if rw == 0 || rh == 0 {
        return Err(OcrError::Rendering(format!(
            "selection {}x{} at ({}, {}) lies outside the {}x{} image",
            rect.width, rect.height, rect.x, rect.y, w, h
        )));
    }

    Ok(image::imageops::crop_imm(img, x0, y0, rw, rh).to_image())
}
