//! QR thumbnail generation for card footers.

use std::path::Path;

use image::Luma;
use qrcode::{EcLevel, QrCode};

use crate::prelude::*;

/// Generate the QR thumbnail linking back to a block on are.na, returning
/// its path relative to the output directory. Existing thumbnails are
/// overwritten; they are tiny.
pub fn generate_qr_code(block_id: u64, output_dir: &Path) -> Result<String> {
    let url = format!("https://www.are.na/block/{block_id}");

    // Low error correction keeps the module count down at thumbnail size.
    let code = QrCode::with_error_correction_level(url.as_bytes(), EcLevel::L)
        .map_err(|e| eyre!("Failed to encode qr code: {e}"))?;
    let thumbnail = code
        .render::<Luma<u8>>()
        .quiet_zone(true)
        .module_dimensions(2, 2)
        .build();

    let qr_dir = output_dir.join("qrcodes");
    std::fs::create_dir_all(&qr_dir)
        .map_err(|e| eyre!("Failed to create {}: {e}", qr_dir.display()))?;

    let qr_path = qr_dir.join(format!("{block_id}.png"));
    thumbnail
        .save(&qr_path)
        .map_err(|e| eyre!("Failed to write {}: {e}", qr_path.display()))?;

    Ok(format!("qrcodes/{block_id}.png"))
}
