//! Camera authorization state and the permission gate.
//!
//! The gate normalizes platform authorization states into a one-shot
//! `(granted, reason)` completion. Platform probing lives behind the
//! [`AuthorizationBackend`] trait so sessions and tests can inject their own.

use std::sync::Arc;
use std::thread;

use crate::errors::ScanError;
use crate::types::{MediaKind, Platform};

pub(crate) const ACCESS_DENIED: &str = "Camera access denied.";
pub(crate) const UNKNOWN_STATUS: &str = "Unknown camera authorization status.";

/// Platform authorization status for a media kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PermissionStatus {
    /// Permission granted
    Granted,
    /// Permission denied
    Denied,
    /// Permission not determined (user hasn't been asked yet)
    NotDetermined,
    /// Permission restricted (parental controls, etc)
    Restricted,
    /// The platform reported a state this crate does not recognize
    Unknown,
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionStatus::Granted => write!(f, "granted"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::NotDetermined => write!(f, "not_determined"),
            PermissionStatus::Restricted => write!(f, "restricted"),
            PermissionStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl PermissionStatus {
    /// The error a non-granted, non-pending status maps to.
    pub fn denial(&self) -> Option<ScanError> {
        match self {
            PermissionStatus::Granted | PermissionStatus::NotDetermined => None,
            PermissionStatus::Denied | PermissionStatus::Restricted => {
                Some(ScanError::PermissionDenied(ACCESS_DENIED.to_string()))
            }
            PermissionStatus::Unknown => Some(ScanError::UnknownPermissionState),
        }
    }
}

/// Queries and requests authorization from the platform.
pub trait AuthorizationBackend: Send + Sync {
    /// Current authorization status, without prompting.
    fn status(&self, kind: MediaKind) -> PermissionStatus;

    /// Trigger the platform consent prompt and block until the user answers.
    /// Returns whether access was granted. Platforms without a programmatic
    /// prompt return the current grant state.
    fn request_access(&self, kind: MediaKind) -> bool;
}

/// Normalizes authorization into a one-shot `(granted, reason)` completion.
pub struct PermissionGate {
    backend: Arc<dyn AuthorizationBackend>,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self::with_backend(Arc::new(SystemAuthorization))
    }

    pub fn with_backend(backend: Arc<dyn AuthorizationBackend>) -> Self {
        Self { backend }
    }

    /// Check authorization for `kind`, invoking `completion` exactly once.
    ///
    /// Already-decided states complete on the calling thread. The
    /// not-yet-decided state triggers the platform consent prompt on a worker
    /// thread and completes once the user answers. One-shot: the result
    /// reflects live platform state at call time, with no retries.
    pub fn check_permission<F>(&self, kind: MediaKind, completion: F)
    where
        F: FnOnce(bool, Option<String>) + Send + 'static,
    {
        let status = self.backend.status(kind);
        log::debug!("{} authorization status: {}", kind, status);

        match status {
            PermissionStatus::NotDetermined => {
                let backend = Arc::clone(&self.backend);
                let spawned = thread::Builder::new()
                    .name("barscan-permission".to_string())
                    .spawn(move || {
                        let granted = backend.request_access(kind);
                        let reason = if granted {
                            None
                        } else {
                            Some(ACCESS_DENIED.to_string())
                        };
                        completion(granted, reason);
                    });
                if let Err(e) = spawned {
                    log::error!("Failed to spawn permission prompt thread: {}", e);
                }
            }
            status => match status.denial() {
                None => completion(true, None),
                Some(error) => completion(false, Some(permission_reason(&error))),
            },
        }
    }
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::new()
    }
}

fn permission_reason(error: &ScanError) -> String {
    match error {
        ScanError::PermissionDenied(reason) => reason.clone(),
        ScanError::UnknownPermissionState => UNKNOWN_STATUS.to_string(),
        other => other.to_string(),
    }
}

/// Production backend probing the current platform's authorization model.
pub struct SystemAuthorization;

impl AuthorizationBackend for SystemAuthorization {
    fn status(&self, kind: MediaKind) -> PermissionStatus {
        log::trace!(
            "probing {} authorization on {}",
            kind,
            Platform::current().as_str()
        );
        if kind != MediaKind::Video {
            log::warn!("{} authorization is not supported, failing closed", kind);
            return PermissionStatus::Unknown;
        }

        #[cfg(target_os = "windows")]
        {
            status_windows()
        }

        #[cfg(target_os = "macos")]
        {
            status_macos()
        }

        #[cfg(target_os = "linux")]
        {
            status_linux()
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            log::warn!(
                "No camera authorization model for platform {}",
                Platform::current().as_str()
            );
            PermissionStatus::Unknown
        }
    }

    fn request_access(&self, kind: MediaKind) -> bool {
        #[cfg(target_os = "macos")]
        {
            let _ = kind;
            request_access_macos()
        }

        #[cfg(target_os = "windows")]
        {
            // No programmatic prompt; access is controlled in
            // Settings > Privacy > Camera.
            log::info!("Enable camera access in Windows Settings > Privacy > Camera");
            self.status(kind) == PermissionStatus::Granted
        }

        #[cfg(target_os = "linux")]
        {
            // Group-based; no prompt to show.
            log::info!("Run: sudo usermod -a -G video $USER && newgrp video");
            self.status(kind) == PermissionStatus::Granted
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            let _ = kind;
            false
        }
    }
}

#[cfg(target_os = "windows")]
fn status_windows() -> PermissionStatus {
    // On Windows 10+, camera access is controlled by Privacy settings.
    // Device enumeration is the closest observable proxy.
    use nokhwa::query;

    match query(nokhwa::utils::ApiBackend::Auto) {
        Ok(devices) if !devices.is_empty() => PermissionStatus::Granted,
        Ok(_) => {
            log::debug!("No cameras found; permission may not be granted yet");
            PermissionStatus::NotDetermined
        }
        Err(e) => {
            log::debug!("Camera enumeration failed: {}", e);
            PermissionStatus::Denied
        }
    }
}

#[cfg(target_os = "macos")]
fn status_macos() -> PermissionStatus {
    use objc::runtime::{Class, Object};
    use objc::{msg_send, sel, sel_impl};
    use std::ffi::CString;

    unsafe {
        let av_capture_device_class = match Class::get("AVCaptureDevice") {
            Some(class) => class,
            None => {
                log::warn!("AVFoundation not available");
                return PermissionStatus::Unknown;
            }
        };

        let av_media_type_video = CString::new("vide").expect("static string");
        let media_type: *mut Object =
            msg_send![av_capture_device_class, mediaTypeForString: av_media_type_video.as_ptr()];

        let auth_status: i64 =
            msg_send![av_capture_device_class, authorizationStatusForMediaType: media_type];

        // AVAuthorizationStatus: 0 = NotDetermined, 1 = Restricted,
        // 2 = Denied, 3 = Authorized. Anything else fails closed.
        match auth_status {
            0 => PermissionStatus::NotDetermined,
            1 => PermissionStatus::Restricted,
            2 => PermissionStatus::Denied,
            3 => PermissionStatus::Granted,
            other => {
                log::warn!("Unrecognized AVAuthorizationStatus value {}", other);
                PermissionStatus::Unknown
            }
        }
    }
}

#[cfg(target_os = "macos")]
fn request_access_macos() -> bool {
    use block::ConcreteBlock;
    use objc::runtime::{Class, Object};
    use objc::{msg_send, sel, sel_impl};
    use std::ffi::CString;
    use std::sync::mpsc;
    use std::time::Duration;

    log::info!("Requesting macOS camera permission");

    unsafe {
        let av_capture_device_class = match Class::get("AVCaptureDevice") {
            Some(class) => class,
            None => {
                log::warn!("AVFoundation not available");
                return false;
            }
        };

        let av_media_type_video = CString::new("vide").expect("static string");
        let media_type: *mut Object =
            msg_send![av_capture_device_class, mediaTypeForString: av_media_type_video.as_ptr()];

        let (tx, rx) = mpsc::channel();
        let handler = ConcreteBlock::new(move |granted: bool| {
            let _ = tx.send(granted);
        });
        // Copy the block to the heap so it survives the async callback.
        let handler = handler.copy();

        let _: () = msg_send![av_capture_device_class, requestAccessForMediaType:media_type completionHandler:&*handler];

        match rx.recv_timeout(Duration::from_secs(60)) {
            Ok(granted) => {
                log::info!(
                    "Camera permission {}",
                    if granted { "granted" } else { "denied" }
                );
                granted
            }
            Err(_) => {
                log::error!("Permission request timed out");
                false
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn status_linux() -> PermissionStatus {
    use std::path::Path;

    let video_devices: Vec<_> = (0..10)
        .map(|i| format!("/dev/video{}", i))
        .filter(|path| Path::new(path).exists())
        .collect();

    if video_devices.is_empty() {
        log::debug!("No video devices found at /dev/video*");
        return PermissionStatus::NotDetermined;
    }

    if linux_video_group_member() {
        PermissionStatus::Granted
    } else {
        log::debug!(
            "{} exists but user is not in the video group",
            video_devices[0]
        );
        PermissionStatus::Denied
    }
}

#[cfg(target_os = "linux")]
fn linux_video_group_member() -> bool {
    use std::process::Command;

    let output = Command::new("groups").output().ok();

    if let Some(output) = output {
        if let Ok(groups) = String::from_utf8(output.stdout) {
            return groups.contains("video") || groups.contains("plugdev");
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(PermissionStatus::Granted.to_string(), "granted");
        assert_eq!(PermissionStatus::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_denial_mapping() {
        assert_eq!(PermissionStatus::Granted.denial(), None);
        assert_eq!(PermissionStatus::NotDetermined.denial(), None);
        assert_eq!(
            PermissionStatus::Denied.denial(),
            Some(ScanError::PermissionDenied(ACCESS_DENIED.to_string()))
        );
        assert_eq!(
            PermissionStatus::Restricted.denial(),
            Some(ScanError::PermissionDenied(ACCESS_DENIED.to_string()))
        );
        assert_eq!(
            PermissionStatus::Unknown.denial(),
            Some(ScanError::UnknownPermissionState)
        );
    }

    #[test]
    fn test_system_status_no_panic() {
        let backend = SystemAuthorization;
        let _ = backend.status(MediaKind::Video);
    }

    #[test]
    fn test_audio_kind_fails_closed() {
        let backend = SystemAuthorization;
        assert_eq!(backend.status(MediaKind::Audio), PermissionStatus::Unknown);
    }
}
