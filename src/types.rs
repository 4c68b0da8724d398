use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ScanError;

/// A single decoded video frame in RGB8 layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: Uuid,
    /// Monotonic capture sequence number, 1-based; 0 if the source did not assign one.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub device_id: String,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, device_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            timestamp: Utc::now(),
            width,
            height,
            format: "RGB8".to_string(),
            device_id,
            data,
        }
    }

    pub fn with_format(mut self, format: String) -> Self {
        self.format = format;
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// True when the frame carries no image buffer. Such frames are dropped by the
    /// detection pipeline without producing a callback.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Barcode encoding standards this crate can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Symbology {
    Qr,
    Ean13,
    Ean8,
    Code128,
    UpcE,
    Code39,
}

impl std::fmt::Display for Symbology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbology::Qr => write!(f, "qr"),
            Symbology::Ean13 => write!(f, "ean-13"),
            Symbology::Ean8 => write!(f, "ean-8"),
            Symbology::Code128 => write!(f, "code-128"),
            Symbology::UpcE => write!(f, "upc-e"),
            Symbology::Code39 => write!(f, "code-39"),
        }
    }
}

/// An ordered set of symbologies, fixed for the lifetime of a detector.
///
/// Construction deduplicates while preserving first-occurrence order. There is no
/// mutation API; reconfiguring detection means building a new detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbologySet(Vec<Symbology>);

impl SymbologySet {
    pub fn new(symbologies: impl IntoIterator<Item = Symbology>) -> Self {
        let mut ordered = Vec::new();
        for symbology in symbologies {
            if !ordered.contains(&symbology) {
                ordered.push(symbology);
            }
        }
        Self(ordered)
    }

    pub fn contains(&self, symbology: Symbology) -> bool {
        self.0.contains(&symbology)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Symbology> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for SymbologySet {
    /// The full supported set: QR, EAN-13, EAN-8, Code128, UPC-E, Code39.
    fn default() -> Self {
        Self(vec![
            Symbology::Qr,
            Symbology::Ean13,
            Symbology::Ean8,
            Symbology::Code128,
            Symbology::UpcE,
            Symbology::Code39,
        ])
    }
}

/// One candidate decode produced by a single detection pass over one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub symbology: Symbology,
    /// Decoded payload; `None` when the detector located a code but could not
    /// extract a payload string.
    pub payload: Option<String>,
}

/// The single outcome of a scan session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    Success(String),
    Failure(ScanError),
}

/// Media kinds a permission check can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Desktop platforms with distinct camera authorization models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Windows,
    MacOS,
    Linux,
    Unknown,
}

impl Platform {
    pub fn current() -> Self {
        #[cfg(target_os = "windows")]
        {
            Platform::Windows
        }
        #[cfg(target_os = "macos")]
        {
            Platform::MacOS
        }
        #[cfg(target_os = "linux")]
        {
            Platform::Linux
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            Platform::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOS => "macos",
            Platform::Linux => "linux",
            Platform::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_builder() {
        let frame = Frame::new(vec![0u8; 12], 2, 2, "0".to_string())
            .with_format("RGB8".to_string())
            .with_sequence(7);
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.size_bytes(), 12);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_empty_frame_is_empty() {
        let frame = Frame::new(Vec::new(), 0, 0, "0".to_string());
        assert!(frame.is_empty());
    }

    #[test]
    fn test_default_symbology_set_order() {
        let set = SymbologySet::default();
        let ordered: Vec<Symbology> = set.iter().copied().collect();
        assert_eq!(
            ordered,
            vec![
                Symbology::Qr,
                Symbology::Ean13,
                Symbology::Ean8,
                Symbology::Code128,
                Symbology::UpcE,
                Symbology::Code39,
            ]
        );
    }

    #[test]
    fn test_symbology_set_dedups_preserving_order() {
        let set = SymbologySet::new(vec![
            Symbology::Code39,
            Symbology::Qr,
            Symbology::Code39,
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next(), Some(&Symbology::Code39));
        assert!(set.contains(Symbology::Qr));
        assert!(!set.contains(Symbology::Ean8));
    }

    #[test]
    fn test_symbology_serde_names() {
        let json = serde_json::to_string(&Symbology::Ean13).unwrap();
        assert_eq!(json, "\"ean13\"");
    }
}
