//! Barscan: camera barcode scanning sessions for desktop applications
//!
//! This crate manages the full lifecycle of a camera barcode scan: permission
//! gating, capture-session configuration, a per-frame detection pipeline, and
//! single-fire result delivery back to the caller.
//!
//! # Features
//! - Permission gate normalizing platform authorization into one completion
//! - Default-device capture with a background frame pump
//! - Multi-format barcode detection (QR, EAN-13, EAN-8, Code128, UPC-E, Code39)
//! - Bounded drop-oldest frame queue: freshness over completeness
//! - Result callbacks marshaled onto the caller's context, at most once
//! - Constructor-injected collaborators for hardware-free testing
//!
//! # Usage
//! ```rust,ignore
//! use std::sync::Arc;
//! use barscan::{ScanConfig, ScanSession, MediaKind};
//!
//! let session = ScanSession::new(ScanConfig::load_or_default());
//! session.check_permission(MediaKind::Video, |granted, reason| {
//!     if !granted {
//!         eprintln!("no camera: {}", reason.unwrap_or_default());
//!     }
//! });
//! session.start(
//!     preview_surface,
//!     |payload| println!("scanned: {}", payload),
//!     |error| eprintln!("scan failed: {}", error),
//! );
//! // ... later, from the same caller context:
//! session.stop();
//! ```
pub mod config;
pub mod context;
pub mod detector;
pub mod device;
pub mod dispatch;
pub mod errors;
pub mod permissions;
pub mod session;
pub mod types;

// Testing utilities - synthetic data and scripted collaborators for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::ScanConfig;
pub use detector::{BarcodeDetector, RxingDetector};
pub use device::{DeviceProvider, FrameSource, NokhwaDeviceProvider};
pub use errors::ScanError;
pub use permissions::{AuthorizationBackend, PermissionGate, PermissionStatus};
pub use session::{PreviewSurface, ScanSession, ScanSessionBuilder, SessionState};
pub use types::{Frame, MediaKind, Observation, Platform, ScanResult, Symbology, SymbologySet};

/// Initialize logging for the scanning system
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "barscan=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        platform: Platform::current(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub platform: Platform,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_platform_string() {
        assert!(!Platform::current().as_str().is_empty());
    }

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "barscan");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }

    #[test]
    fn test_default_symbology_set_is_full() {
        assert_eq!(SymbologySet::default().len(), 6);
    }
}
