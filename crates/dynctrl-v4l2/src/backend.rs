//! Device enumeration and the ioctl control transport

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use dynctrl_core::{ControlTransport, DeviceBackend, DeviceRef, ExtensionUnitControl, Mapping, TransportError};

use crate::ioctl::{
    c_string, UvcXuControlInfo, UvcXuControlMapping, V4l2Capability, UVCIOC_CTRL_ADD, UVCIOC_CTRL_MAP,
    VIDIOC_QUERYCAP,
};

/// Video devices below a device directory, `/dev` by default
#[derive(Debug, Clone)]
pub struct V4l2Backend {
    dev_dir: PathBuf,
}

impl Default for V4l2Backend {
    fn default() -> Self {
        Self::new("/dev")
    }
}

impl V4l2Backend {
    pub fn new(dev_dir: impl Into<PathBuf>) -> Self {
        Self {
            dev_dir: dev_dir.into(),
        }
    }

    fn describe(&self, name: &str) -> io::Result<DeviceRef> {
        let path = self.dev_dir.join(name);
        let file = open_device(&path)?;
        let mut caps = V4l2Capability::default();
        // SAFETY: `caps` is a properly sized v4l2_capability the kernel fills in
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), VIDIOC_QUERYCAP as _, &mut caps) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(DeviceRef {
            name: name.to_string(),
            path,
            driver: c_string(&caps.driver),
            card: c_string(&caps.card),
        })
    }
}

impl DeviceBackend for V4l2Backend {
    type Handle = V4l2Handle;

    fn list_candidate_devices(&mut self) -> Result<Vec<DeviceRef>, TransportError> {
        let mut names: Vec<String> = std::fs::read_dir(&self.dev_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| video_index(name).is_some())
            .collect();
        names.sort_by_key(|name| video_index(name));

        let mut devices = Vec::with_capacity(names.len());
        for name in names {
            match self.describe(&name) {
                Ok(device) => {
                    trace!(device = %device.name, driver = %device.driver, card = %device.card, "found video device");
                    devices.push(device);
                }
                Err(err) => warn!(device = %name, error = %err, "unable to query video device"),
            }
        }
        debug!("Enumerated {} video devices in {}", devices.len(), self.dev_dir.display());
        Ok(devices)
    }

    fn open(&mut self, device: &DeviceRef) -> Result<Self::Handle, TransportError> {
        let file = open_device(&device.path)?;
        Ok(V4l2Handle {
            name: device.name.clone(),
            file,
        })
    }
}

/// Number of a `videoN` node
fn video_index(name: &str) -> Option<u32> {
    name.strip_prefix("video")?.parse().ok()
}

fn open_device(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

/// An open video device; closed on drop
#[derive(Debug)]
pub struct V4l2Handle {
    name: String,
    file: File,
}

impl ControlTransport for V4l2Handle {
    fn add_control(&mut self, control: &ExtensionUnitControl) -> Result<(), TransportError> {
        trace!(device = %self.name, selector = control.selector, "UVCIOC_CTRL_ADD");
        let mut info = UvcXuControlInfo::from(control);
        // SAFETY: `info` matches struct uvc_xu_control_info and outlives the call
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), UVCIOC_CTRL_ADD as _, &mut info) };
        check(rc)
    }

    fn add_mapping(&mut self, mapping: &Mapping) -> Result<(), TransportError> {
        trace!(device = %self.name, mapping = %mapping.name, "UVCIOC_CTRL_MAP");
        let mut raw = UvcXuControlMapping::from(mapping);
        // SAFETY: `raw` matches struct uvc_xu_control_mapping; no menu entries are passed
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), UVCIOC_CTRL_MAP as _, &mut raw) };
        check(rc)
    }
}

fn check(rc: libc::c_int) -> Result<(), TransportError> {
    if rc < 0 {
        Err(transport_error(io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

fn transport_error(err: io::Error) -> TransportError {
    match err.raw_os_error() {
        Some(libc::EEXIST) => TransportError::AlreadyExists,
        Some(libc::EPERM) | Some(libc::EACCES) => TransportError::PermissionDenied,
        Some(libc::EINVAL) => TransportError::Invalid,
        Some(code) => TransportError::Other(code),
        None => TransportError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        let errno = |code| transport_error(io::Error::from_raw_os_error(code));
        assert!(matches!(errno(libc::EEXIST), TransportError::AlreadyExists));
        assert!(matches!(errno(libc::EPERM), TransportError::PermissionDenied));
        assert!(matches!(errno(libc::EACCES), TransportError::PermissionDenied));
        assert!(matches!(errno(libc::EINVAL), TransportError::Invalid));
        assert!(matches!(errno(libc::ENOTTY), TransportError::Other(code) if code == libc::ENOTTY));
        assert!(matches!(
            transport_error(io::Error::new(io::ErrorKind::Other, "custom")),
            TransportError::Io(_)
        ));
    }

    #[test]
    fn test_video_index() {
        assert_eq!(video_index("video0"), Some(0));
        assert_eq!(video_index("video12"), Some(12));
        assert_eq!(video_index("video"), None);
        assert_eq!(video_index("vbi0"), None);
        assert_eq!(video_index("videox"), None);
    }

    #[test]
    fn test_non_v4l2_nodes_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("video0"), b"").unwrap();
        std::fs::write(dir.path().join("null"), b"").unwrap();
        let mut backend = V4l2Backend::new(dir.path());
        // A regular file does not answer VIDIOC_QUERYCAP
        assert!(backend.list_candidate_devices().unwrap().is_empty());
    }

    #[test]
    fn test_missing_dev_dir() {
        let mut backend = V4l2Backend::new("/nonexistent/dev");
        assert!(matches!(backend.list_candidate_devices(), Err(TransportError::Io(_))));
    }
}
