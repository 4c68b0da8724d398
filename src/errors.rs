use std::fmt;

/// Errors produced by a scan session.
///
/// Permission errors surface through the permission-check completion; device and
/// detector errors surface through the session's failure callback. All of them are
/// terminal for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Camera access was denied or restricted by the platform.
    PermissionDenied(String),
    /// The platform reported an authorization state this crate does not recognize.
    UnknownPermissionState,
    /// The capture device or its input stream could not be acquired.
    DeviceUnavailable(String),
    /// The barcode detection backend failed on a frame.
    DetectorError(String),
    /// A configuration file could not be read, parsed, or written.
    ConfigError(String),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScanError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            ScanError::UnknownPermissionState => {
                write!(f, "Unknown camera authorization status")
            }
            ScanError::DeviceUnavailable(msg) => write!(f, "Camera device unavailable: {}", msg),
            ScanError::DetectorError(msg) => write!(f, "Barcode detector error: {}", msg),
            ScanError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ScanError {}
