use std::io::Cursor;

use idphoto_contracts::edits::UPSCALE_PROMPT;
use idphoto_contracts::media::EncodedImage;
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::client::{EditError, ImageEditor};

const FALLBACK_DIMS: (u32, u32) = (600, 800);
const UPSCALE_MAX_EDGE: u32 = 2048;

/// Offline editor that answers every request with a solid-colour PNG.
///
/// The colour is derived from the prompt, so different operations are easy to
/// tell apart. The input's dimensions are kept when the input decodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryrunEditor;

impl DryrunEditor {
    pub fn new() -> Self {
        Self
    }
}

impl ImageEditor for DryrunEditor {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn transform(&self, image: &EncodedImage, prompt: &str) -> Result<Vec<u8>, EditError> {
        let (width, height) = input_dims(image);
        render_png(width, height, prompt)
    }

    fn upscale(&self, image: &EncodedImage) -> Result<Vec<u8>, EditError> {
        let (width, height) = upscaled_dims(input_dims(image));
        render_png(width, height, UPSCALE_PROMPT)
    }
}

fn input_dims(image: &EncodedImage) -> (u32, u32) {
    image
        .decode_bytes()
        .ok()
        .and_then(|bytes| image::load_from_memory(&bytes).ok())
        .map(|decoded| (decoded.width(), decoded.height()))
        .unwrap_or(FALLBACK_DIMS)
}

fn upscaled_dims((width, height): (u32, u32)) -> (u32, u32) {
    let longest = width.max(height).max(1);
    let factor = (UPSCALE_MAX_EDGE as f64 / longest as f64).clamp(1.0, 2.0);
    let scale = |value: u32| ((value as f64 * factor).round() as u32).max(1);
    (scale(width), scale(height))
}

fn render_png(width: u32, height: u32, prompt: &str) -> Result<Vec<u8>, EditError> {
    let (r, g, b) = color_from_prompt(prompt);
    let image = RgbImage::from_pixel(width, height, Rgb([r, g, b]));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| EditError::Transport(format!("dryrun PNG encode failed: {err}")))?;
    Ok(out.into_inner())
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}
