//! In-memory device backend
//!
//! Emulates the uvcvideo driver closely enough to exercise a session without
//! hardware: dynamic controls and mappings live in one driver-wide table, so
//! adding the same control through a second device reports "already exists",
//! and the built-in processing unit controls are always present. Every call
//! that reaches the driver is recorded in order.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::controls::{ExtensionUnitControl, UVC_GUID_PROCESSING_UNIT};
use crate::device::{ControlTransport, DeviceBackend, DeviceRef, TransportError};
use crate::mapping::Mapping;

/// How a device's driver reacts to dynamic control requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverBehaviour {
    /// Accepts dynamic controls
    Dynamic,
    /// Predates dynamic controls; every request is rejected as invalid
    Static,
    /// Accepts dynamic controls from privileged callers only
    Restricted,
}

/// A scripted transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    AlreadyExists,
    PermissionDenied,
    Invalid,
    Other(i32),
}

impl MockFailure {
    fn to_error(self) -> TransportError {
        match self {
            Self::AlreadyExists => TransportError::AlreadyExists,
            Self::PermissionDenied => TransportError::PermissionDenied,
            Self::Invalid => TransportError::Invalid,
            Self::Other(code) => TransportError::Other(code),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockDevice {
    pub device: DeviceRef,
    pub behaviour: DriverBehaviour,
    pub open_fails: bool,
    failing_controls: HashMap<u8, MockFailure>,
    failing_mappings: HashMap<String, MockFailure>,
}

impl MockDevice {
    pub fn new(name: &str, driver: &str) -> Self {
        Self {
            device: DeviceRef {
                name: name.to_string(),
                path: PathBuf::from("/dev").join(name),
                driver: driver.to_string(),
                card: format!("Mock camera ({})", name),
            },
            behaviour: DriverBehaviour::Dynamic,
            open_fails: false,
            failing_controls: HashMap::new(),
            failing_mappings: HashMap::new(),
        }
    }

    /// A device driven by uvcvideo with dynamic control support
    pub fn uvc(name: &str) -> Self {
        Self::new(name, "uvcvideo")
    }

    pub fn with_behaviour(mut self, behaviour: DriverBehaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    pub fn with_open_failure(mut self) -> Self {
        self.open_fails = true;
        self
    }

    /// Fail every attempt to add a control with this selector
    pub fn failing_control(mut self, selector: u8, failure: MockFailure) -> Self {
        self.failing_controls.insert(selector, failure);
        self
    }

    /// Fail every attempt to add a mapping with this name
    pub fn failing_mapping(mut self, name: &str, failure: MockFailure) -> Self {
        self.failing_mappings.insert(name.to_string(), failure);
        self
    }
}

/// What was sent to the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRequest {
    Control(ExtensionUnitControl),
    Mapping(Mapping),
}

/// One recorded driver call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub device: String,
    pub request: MockRequest,
    pub accepted: bool,
}

#[derive(Debug, Default)]
struct DriverState {
    controls: Vec<ExtensionUnitControl>,
    mappings: Vec<Mapping>,
    calls: Vec<MockCall>,
    open_handles: usize,
}

impl DriverState {
    fn knows_control(&self, control: &ExtensionUnitControl) -> bool {
        control.entity == UVC_GUID_PROCESSING_UNIT
            || self
                .controls
                .iter()
                .any(|c| c.entity == control.entity && c.selector == control.selector)
    }
}

#[derive(Debug, Default)]
pub struct MockBackend {
    devices: Vec<MockDevice>,
    state: Rc<RefCell<DriverState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: MockDevice) -> Self {
        self.add_device(device);
        self
    }

    pub fn add_device(&mut self, device: MockDevice) {
        self.devices.push(device);
    }

    /// Every driver call made so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.borrow().calls.clone()
    }

    /// Controls the driver currently knows about (built-in ones excluded)
    pub fn registered_controls(&self) -> Vec<ExtensionUnitControl> {
        self.state.borrow().controls.clone()
    }

    pub fn registered_mappings(&self) -> Vec<Mapping> {
        self.state.borrow().mappings.clone()
    }

    /// Number of handles that have been opened and not yet dropped
    pub fn open_handles(&self) -> usize {
        self.state.borrow().open_handles
    }
}

impl DeviceBackend for MockBackend {
    type Handle = MockHandle;

    fn list_candidate_devices(&mut self) -> Result<Vec<DeviceRef>, TransportError> {
        Ok(self.devices.iter().map(|d| d.device.clone()).collect())
    }

    fn open(&mut self, device: &DeviceRef) -> Result<Self::Handle, TransportError> {
        let mock = self
            .devices
            .iter()
            .find(|d| d.device == *device)
            .ok_or_else(|| {
                TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no such device: {}", device.path.display()),
                ))
            })?;
        if mock.open_fails {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "device busy",
            )));
        }
        self.state.borrow_mut().open_handles += 1;
        Ok(MockHandle {
            device: mock.clone(),
            state: Rc::clone(&self.state),
        })
    }
}

/// Open handle to a [`MockDevice`]
#[derive(Debug)]
pub struct MockHandle {
    device: MockDevice,
    state: Rc<RefCell<DriverState>>,
}

impl MockHandle {
    fn record(&self, request: MockRequest, result: &Result<(), TransportError>) {
        self.state.borrow_mut().calls.push(MockCall {
            device: self.device.device.name.clone(),
            request,
            accepted: result.is_ok(),
        });
    }

    fn gate(&self) -> Result<(), TransportError> {
        match self.device.behaviour {
            DriverBehaviour::Dynamic => Ok(()),
            DriverBehaviour::Static => Err(TransportError::Invalid),
            DriverBehaviour::Restricted => Err(TransportError::PermissionDenied),
        }
    }
}

impl ControlTransport for MockHandle {
    fn add_control(&mut self, control: &ExtensionUnitControl) -> Result<(), TransportError> {
        let result = self.gate().and_then(|()| {
            if let Some(failure) = self.device.failing_controls.get(&control.selector) {
                return Err(failure.to_error());
            }
            let mut state = self.state.borrow_mut();
            if state.knows_control(control) {
                return Err(TransportError::AlreadyExists);
            }
            state.controls.push(control.clone());
            Ok(())
        });
        self.record(MockRequest::Control(control.clone()), &result);
        result
    }

    fn add_mapping(&mut self, mapping: &Mapping) -> Result<(), TransportError> {
        let result = self.gate().and_then(|()| {
            if let Some(failure) = self.device.failing_mappings.get(&mapping.name) {
                return Err(failure.to_error());
            }
            let mut state = self.state.borrow_mut();
            if state.mappings.iter().any(|m| m.id == mapping.id) {
                return Err(TransportError::AlreadyExists);
            }
            state.mappings.push(mapping.clone());
            Ok(())
        });
        self.record(MockRequest::Mapping(mapping.clone()), &result);
        result
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.open_handles = state.open_handles.saturating_sub(1);
    }
}
