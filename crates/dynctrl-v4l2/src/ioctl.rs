//! Kernel ABI: request codes and the structures they carry

use dynctrl_core::{ExtensionUnitControl, Mapping, MAPPING_NAME_LEN};

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;
const IOC_READ_WRITE: u32 = IOC_READ | IOC_WRITE;

const fn ioctl_code(direction: u32, kind: u8, nr: u8, size: usize) -> libc::c_ulong {
    ((direction << IOC_DIRSHIFT)
        | ((kind as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)) as libc::c_ulong
}

const fn ior<T>(kind: u8, nr: u8) -> libc::c_ulong {
    ioctl_code(IOC_READ, kind, nr, std::mem::size_of::<T>())
}

const fn iow<T>(kind: u8, nr: u8) -> libc::c_ulong {
    ioctl_code(IOC_WRITE, kind, nr, std::mem::size_of::<T>())
}

const fn iowr<T>(kind: u8, nr: u8) -> libc::c_ulong {
    ioctl_code(IOC_READ_WRITE, kind, nr, std::mem::size_of::<T>())
}

/// `struct v4l2_capability`
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub(crate) struct V4l2Capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

/// `struct uvc_xu_control_info` (legacy uvcvideo interface)
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub(crate) struct UvcXuControlInfo {
    pub entity: [u8; 16],
    pub index: u8,
    pub selector: u8,
    pub size: u16,
    pub flags: u32,
}

impl From<&ExtensionUnitControl> for UvcXuControlInfo {
    fn from(control: &ExtensionUnitControl) -> Self {
        Self {
            entity: *control.entity.as_bytes(),
            index: control.index,
            selector: control.selector,
            size: control.size,
            flags: control.flags.bits(),
        }
    }
}

/// `struct uvc_xu_control_mapping`
#[repr(C)]
pub(crate) struct UvcXuControlMapping {
    pub id: u32,
    pub name: [u8; MAPPING_NAME_LEN],
    pub entity: [u8; 16],
    pub selector: u8,
    pub size: u8,
    pub offset: u8,
    pub v4l2_type: u32,
    pub data_type: u32,
    pub menu_info: *mut libc::c_void,
    pub menu_count: u32,
    pub reserved: [u32; 4],
}

impl From<&Mapping> for UvcXuControlMapping {
    fn from(mapping: &Mapping) -> Self {
        Self {
            id: mapping.id,
            name: mapping.c_name(),
            entity: *mapping.entity.as_bytes(),
            selector: mapping.selector,
            size: mapping.size,
            offset: mapping.offset,
            v4l2_type: mapping.v4l2_type.code(),
            data_type: mapping.data_type.code(),
            menu_info: std::ptr::null_mut(),
            menu_count: 0,
            reserved: [0; 4],
        }
    }
}

pub(crate) const VIDIOC_QUERYCAP: libc::c_ulong = ior::<V4l2Capability>(b'V', 0);
pub(crate) const UVCIOC_CTRL_ADD: libc::c_ulong = iow::<UvcXuControlInfo>(b'U', 1);
pub(crate) const UVCIOC_CTRL_MAP: libc::c_ulong = iowr::<UvcXuControlMapping>(b'u', 0x20);

/// Text of a NUL-padded fixed-size field
pub(crate) fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
