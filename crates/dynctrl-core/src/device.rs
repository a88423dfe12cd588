//! Device enumeration and control transport interfaces
//!
//! The session only talks to hardware through these two traits. The Linux
//! implementation lives in the `dynctrl-v4l2` crate; [`crate::mock`]
//! provides an in-memory one.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::controls::ExtensionUnitControl;
use crate::mapping::Mapping;

/// A video device that may accept dynamic controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRef {
    /// Short device name, e.g. `video0`
    pub name: String,
    pub path: PathBuf,
    /// Name of the kernel driver behind the device
    pub driver: String,
    /// Human readable device name reported by the driver
    pub card: String,
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("already exists")]
    AlreadyExists,
    #[error("permission denied")]
    PermissionDenied,
    #[error("invalid argument")]
    Invalid,
    #[error("{}", std::io::Error::from_raw_os_error(*.0))]
    Other(i32),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lists devices and opens control handles for them
pub trait DeviceBackend {
    type Handle: ControlTransport;

    fn list_candidate_devices(&mut self) -> Result<Vec<DeviceRef>, TransportError>;

    /// Open a device for control registration. The device is released when
    /// the handle is dropped.
    fn open(&mut self, device: &DeviceRef) -> Result<Self::Handle, TransportError>;
}

/// Registers controls and mappings with the driver of one open device
pub trait ControlTransport {
    fn add_control(&mut self, control: &ExtensionUnitControl) -> Result<(), TransportError>;

    fn add_mapping(&mut self, mapping: &Mapping) -> Result<(), TransportError>;
}
