use std::io::Cursor;

use image::Luma;
use qrcode::QrCode;
use sha3::{Digest, Sha3_512};

use crate::error::AppError;

/// Scan image bytes for a recognizable QR code. Returns the decoded content,
/// or `None` when no code is found — scanning noise is not an error.
pub fn decode(image_bytes: &[u8]) -> Option<String> {
    let image = image::load_from_memory(image_bytes).ok()?;
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();

    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
            gray.get_pixel(x as u32, y as u32)[0]
        });

    let grids = prepared.detect_grids();
    let (_meta, content) = grids.first()?.decode().ok()?;
    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}

/// Render a scannable QR code PNG carrying the given name.
pub fn generate_png(name: &str) -> Result<Vec<u8>, AppError> {
    let code = QrCode::new(name.as_bytes()).map_err(|e| AppError::CodeGeneration(e.to_string()))?;
    let image = code.render::<Luma<u8>>().build();

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)
        .map_err(|e| AppError::CodeGeneration(e.to_string()))?;
    Ok(png)
}

/// Deterministic, storage-safe artifact filename for a user name. Repeated
/// adds of the same name map to the same file.
pub fn artifact_filename(name: &str) -> String {
    let mut hasher = Sha3_512::new();
    hasher.update(name.as_bytes());
    format!("{}.png", hex::encode(hasher.finalize()))
}
