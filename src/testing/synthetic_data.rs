//! Synthetic frame generators for offline testing.

use rxing::{BarcodeFormat, MultiFormatWriter, Writer};

use crate::errors::ScanError;
use crate::types::{Frame, Symbology};

/// Create a gradient RGB frame whose content varies with `frame_number`.
///
/// Carries no decodable barcode; useful as pipeline filler.
pub fn synthetic_frame(frame_number: u64, width: u32, height: u32) -> Frame {
    let mut data = vec![0u8; (width * height * 3) as usize];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8); // R
            data[idx + 1] = base.wrapping_add((y % 256) as u8); // G
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8); // B
        }
    }

    Frame::new(data, width, height, "synthetic".to_string())
}

/// Gradient frame with its sequence number set to `sequence`.
pub fn numbered_frame(sequence: u64) -> Frame {
    synthetic_frame(sequence, 32, 32).with_sequence(sequence)
}

/// All-white frame: decodable by nothing, valid everywhere.
pub fn blank_frame(width: u32, height: u32) -> Frame {
    Frame::new(
        vec![255u8; (width * height * 3) as usize],
        width,
        height,
        "synthetic".to_string(),
    )
}

/// Frame whose image buffer is absent.
pub fn empty_frame() -> Frame {
    Frame::new(Vec::new(), 0, 0, "synthetic".to_string())
}

/// Encode `payload` as a real barcode of the given symbology and rasterize it
/// into an RGB frame the production detector can decode.
pub fn synthetic_barcode_frame(
    payload: &str,
    symbology: Symbology,
    size: u32,
) -> Result<Frame, ScanError> {
    let format = match symbology {
        Symbology::Qr => BarcodeFormat::QR_CODE,
        Symbology::Ean13 => BarcodeFormat::EAN_13,
        Symbology::Ean8 => BarcodeFormat::EAN_8,
        Symbology::Code128 => BarcodeFormat::CODE_128,
        Symbology::UpcE => BarcodeFormat::UPC_E,
        Symbology::Code39 => BarcodeFormat::CODE_39,
    };

    // 1D symbologies want a wide, short target.
    let (width, height) = match symbology {
        Symbology::Qr => (size as i32, size as i32),
        _ => (size as i32 * 2, size as i32 / 2),
    };

    let matrix = MultiFormatWriter::default()
        .encode(payload, &format, width, height)
        .map_err(|e| ScanError::DetectorError(format!("Failed to encode {}: {}", symbology, e)))?;

    let (w, h) = (matrix.getWidth(), matrix.getHeight());
    let mut data = vec![255u8; (w * h * 3) as usize];
    for y in 0..h {
        for x in 0..w {
            if matrix.get(x, y) {
                let idx = ((y * w + x) * 3) as usize;
                data[idx] = 0;
                data[idx + 1] = 0;
                data[idx + 2] = 0;
            }
        }
    }

    Ok(Frame::new(data, w, h, "synthetic".to_string()))
}
