//! Barcode detection over single frames.
//!
//! [`RxingDetector`] is the production engine: it binarizes the frame and runs
//! a multi-format reader restricted to the configured symbology set. Detection
//! is best-effort per frame; a frame with no code in it is a normal outcome,
//! not an error.

use std::collections::HashSet;

use rxing::common::HybridBinarizer;
use rxing::multi::{GenericMultipleBarcodeReader, MultipleBarcodeReader};
use rxing::{
    BarcodeFormat, BinaryBitmap, BufferedImageLuminanceSource, DecodeHintValue, DecodeHints,
    Exceptions, MultiFormatReader,
};

use crate::errors::ScanError;
use crate::types::{Frame, Observation, Symbology, SymbologySet};

/// Runs barcode detection on one frame, producing zero or more observations.
pub trait BarcodeDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Observation>, ScanError>;
}

/// Production detection engine backed by rxing.
///
/// The symbology set is fixed at construction; there is no reconfiguration.
pub struct RxingDetector {
    symbologies: SymbologySet,
    try_harder: bool,
}

impl RxingDetector {
    pub fn new(symbologies: SymbologySet) -> Self {
        Self {
            symbologies,
            try_harder: true,
        }
    }

    pub fn with_try_harder(mut self, try_harder: bool) -> Self {
        self.try_harder = try_harder;
        self
    }

    pub fn symbologies(&self) -> &SymbologySet {
        &self.symbologies
    }

    fn hints(&self) -> DecodeHints {
        let formats: HashSet<BarcodeFormat> = self
            .symbologies
            .iter()
            .map(|symbology| barcode_format(*symbology))
            .collect();
        DecodeHints::default()
            .with(DecodeHintValue::PossibleFormats(formats))
            .with(DecodeHintValue::TryHarder(self.try_harder))
    }
}

impl Default for RxingDetector {
    fn default() -> Self {
        Self::new(SymbologySet::default())
    }
}

impl BarcodeDetector for RxingDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Observation>, ScanError> {
        let img = image::RgbImage::from_vec(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| {
                ScanError::DetectorError(format!(
                    "Frame buffer is {} bytes, expected {} for {}x{} RGB8",
                    frame.data.len(),
                    frame.width as usize * frame.height as usize * 3,
                    frame.width,
                    frame.height
                ))
            })?;

        let source = BufferedImageLuminanceSource::new(image::DynamicImage::ImageRgb8(img));
        let mut bitmap = BinaryBitmap::new(HybridBinarizer::new(source));
        let mut reader = GenericMultipleBarcodeReader::new(MultiFormatReader::default());

        match reader.decode_multiple_with_hints(&mut bitmap, &self.hints()) {
            Ok(results) => Ok(results
                .iter()
                .filter_map(|result| {
                    let symbology = symbology_for(result.getBarcodeFormat())?;
                    let text = result.getText();
                    Some(Observation {
                        symbology,
                        payload: if text.is_empty() {
                            None
                        } else {
                            Some(text.to_string())
                        },
                    })
                })
                .collect()),
            Err(Exceptions::NotFoundException(_)) => Ok(Vec::new()),
            Err(e) => Err(ScanError::DetectorError(e.to_string())),
        }
    }
}

fn barcode_format(symbology: Symbology) -> BarcodeFormat {
    match symbology {
        Symbology::Qr => BarcodeFormat::QR_CODE,
        Symbology::Ean13 => BarcodeFormat::EAN_13,
        Symbology::Ean8 => BarcodeFormat::EAN_8,
        Symbology::Code128 => BarcodeFormat::CODE_128,
        Symbology::UpcE => BarcodeFormat::UPC_E,
        Symbology::Code39 => BarcodeFormat::CODE_39,
    }
}

fn symbology_for(format: &BarcodeFormat) -> Option<Symbology> {
    match format {
        BarcodeFormat::QR_CODE => Some(Symbology::Qr),
        BarcodeFormat::EAN_13 => Some(Symbology::Ean13),
        BarcodeFormat::EAN_8 => Some(Symbology::Ean8),
        BarcodeFormat::CODE_128 => Some(Symbology::Code128),
        BarcodeFormat::UPC_E => Some(Symbology::UpcE),
        BarcodeFormat::CODE_39 => Some(Symbology::Code39),
        _ => None,
    }
}
