// SPDX-License-Identifier: GPL-3.0-only

//! Camera access permission
//!
//! Inside a Flatpak sandbox access is granted through the XDG camera portal,
//! which shows an interactive prompt the first time. Outside a sandbox the
//! answer is whatever the filesystem permissions on the V4L2 nodes say.

use crate::backends::camera::types::MediaMode;
use crate::errors::{CameraError, CameraResult};
use futures::future::BoxFuture;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Host permission state for camera access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    /// User has not been asked yet
    NotDetermined,
    Authorized,
    /// User said no
    Denied,
    /// Policy forbids access; the user cannot change it from here
    Restricted,
}

/// Permission boundary
pub trait PermissionBackend: Send + Sync {
    /// Current status, without prompting
    fn authorization_status(&self, mode: MediaMode) -> CameraResult<AuthorizationStatus>;

    /// Show the interactive prompt and resolve with the user's answer
    fn request_access(&self, mode: MediaMode) -> BoxFuture<'_, CameraResult<bool>>;
}

const PORTAL_UNKNOWN: u8 = 0;
const PORTAL_GRANTED: u8 = 1;
const PORTAL_DENIED: u8 = 2;

/// Permission backend for the running system
pub struct SystemPermission {
    sandboxed: bool,
    device_dir: PathBuf,
    /// Portal answer for this process (PORTAL_*)
    portal_answer: AtomicU8,
}

impl SystemPermission {
    /// Detect whether we run inside a Flatpak sandbox
    pub fn detect() -> Self {
        let sandboxed = Path::new("/.flatpak-info").exists();
        debug!(sandboxed, "Detected permission environment");
        Self {
            sandboxed,
            device_dir: PathBuf::from("/dev"),
            portal_answer: AtomicU8::new(PORTAL_UNKNOWN),
        }
    }

    /// Check V4L2 nodes under a specific directory, without the portal
    pub fn with_device_dir(device_dir: impl Into<PathBuf>) -> Self {
        Self {
            sandboxed: false,
            device_dir: device_dir.into(),
            portal_answer: AtomicU8::new(PORTAL_UNKNOWN),
        }
    }
}

impl PermissionBackend for SystemPermission {
    fn authorization_status(&self, _mode: MediaMode) -> CameraResult<AuthorizationStatus> {
        if !self.sandboxed {
            return Ok(device_node_status(&self.device_dir));
        }
        Ok(match self.portal_answer.load(Ordering::SeqCst) {
            PORTAL_GRANTED => AuthorizationStatus::Authorized,
            PORTAL_DENIED => AuthorizationStatus::Denied,
            _ => AuthorizationStatus::NotDetermined,
        })
    }

    fn request_access(&self, mode: MediaMode) -> BoxFuture<'_, CameraResult<bool>> {
        Box::pin(async move {
            if !self.sandboxed {
                // Nothing to prompt for; the node permissions are final
                return Ok(self.authorization_status(mode)? == AuthorizationStatus::Authorized);
            }

            info!("Requesting camera access through the desktop portal");
            let code = portal::access_camera().await.map_err(|e| {
                warn!(error = %e, "Camera portal request failed");
                CameraError::AuthorizationDenied
            })?;

            let granted = portal_response(code)?;
            let answer = if granted { PORTAL_GRANTED } else { PORTAL_DENIED };
            self.portal_answer.store(answer, Ordering::SeqCst);
            Ok(granted)
        })
    }
}

/// Map a portal `Response` code: 0 success, 1 cancelled, 2 other failure
fn portal_response(code: u32) -> CameraResult<bool> {
    match code {
        0 => Ok(true),
        1 | 2 => Ok(false),
        other => Err(CameraError::UnexpectedPlatformValue(format!(
            "portal response code {}",
            other
        ))),
    }
}

/// Status derived from read/write access to `video*` nodes in `dir`
///
/// Any accessible node means authorized. With no nodes at all there is
/// nothing to guard; device resolution reports the missing camera.
fn device_node_status(dir: &Path) -> AuthorizationStatus {
    let nodes: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("video"))
            .map(|e| e.path())
            .collect(),
        Err(_) => return AuthorizationStatus::Authorized,
    };

    if nodes.is_empty() {
        return AuthorizationStatus::Authorized;
    }

    let mut status = AuthorizationStatus::Denied;
    for node in &nodes {
        match node_access(node) {
            Ok(()) => return AuthorizationStatus::Authorized,
            Err(errno) if errno == libc::EPERM || errno == libc::EROFS => {
                status = AuthorizationStatus::Restricted;
            }
            Err(errno) => {
                debug!(node = %node.display(), errno, "No access to camera node");
            }
        }
    }
    status
}

fn node_access(path: &Path) -> Result<(), i32> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| libc::EINVAL)?;
    let result = unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EACCES))
    }
}

/// Fixed answers, for the virtual backend and tests
pub struct StaticPermission {
    status: AuthorizationStatus,
    answer: bool,
    prompts: AtomicUsize,
}

impl StaticPermission {
    pub fn new(status: AuthorizationStatus, answer: bool) -> Self {
        Self {
            status,
            answer,
            prompts: AtomicUsize::new(0),
        }
    }

    /// Always authorized
    pub fn granted() -> Self {
        Self::new(AuthorizationStatus::Authorized, true)
    }

    /// How many times the prompt was shown
    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl PermissionBackend for StaticPermission {
    fn authorization_status(&self, _mode: MediaMode) -> CameraResult<AuthorizationStatus> {
        Ok(self.status)
    }

    fn request_access(&self, _mode: MediaMode) -> BoxFuture<'_, CameraResult<bool>> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Box::pin(futures::future::ready(Ok(self.answer)))
    }
}

mod portal {
    use futures::StreamExt;
    use std::collections::HashMap;
    use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

    #[zbus::proxy(
        interface = "org.freedesktop.portal.Camera",
        default_service = "org.freedesktop.portal.Desktop",
        default_path = "/org/freedesktop/portal/desktop"
    )]
    trait Camera {
        fn access_camera(&self, options: HashMap<&str, Value<'_>>) -> zbus::Result<OwnedObjectPath>;

        #[zbus(property)]
        fn is_camera_present(&self) -> zbus::Result<bool>;
    }

    #[zbus::proxy(
        interface = "org.freedesktop.portal.Request",
        default_service = "org.freedesktop.portal.Desktop"
    )]
    trait Request {
        #[zbus(signal)]
        fn response(&self, response: u32, results: HashMap<String, OwnedValue>) -> zbus::Result<()>;
    }

    /// Ask the portal for camera access and wait for the user's answer
    ///
    /// The request object path is derived from our handle token so the
    /// response subscription exists before the call is made.
    pub async fn access_camera() -> zbus::Result<u32> {
        let connection = zbus::Connection::session().await?;

        let token = format!("visio_{}", uuid::Uuid::new_v4().simple());
        let sender = connection
            .unique_name()
            .map(|name| name.as_str().trim_start_matches(':').replace('.', "_"))
            .unwrap_or_default();
        let request_path = format!("/org/freedesktop/portal/desktop/request/{}/{}", sender, token);

        let request = RequestProxy::builder(&connection)
            .path(request_path)?
            .build()
            .await?;
        let mut responses = request.receive_response().await?;

        let camera = CameraProxy::new(&connection).await?;
        if !camera.is_camera_present().await.unwrap_or(true) {
            tracing::debug!("Portal reports no camera present");
        }

        let mut options: HashMap<&str, Value<'_>> = HashMap::new();
        options.insert("handle_token", Value::new(token.as_str()));
        camera.access_camera(options).await?;

        let signal = responses
            .next()
            .await
            .ok_or_else(|| zbus::Error::Failure("portal closed the request".to_string()))?;
        let args = signal.args()?;
        Ok(*args.response())
    }
}
