//! Mapping resolution
//!
//! A mapping exposes some bits of an extension unit control as a regular
//! V4L2 control. Resolution turns a `<mapping>` declaration into the record
//! the driver expects, looking up the referenced control in the registry.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::controls::{resolve_bounded, ControlRegistry};
use crate::declarations::MappingDecl;
use crate::document::Position;
use crate::guid::Guid;
use crate::symbols::SymbolTable;
use crate::text::{normalize_whitespace, to_ascii_lossy};

/// Width of the driver's name field, including the terminating NUL
pub const MAPPING_NAME_LEN: usize = 32;

/// V4L2 control type a mapping exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum V4l2Type {
    Integer,
    Boolean,
    #[cfg(feature = "raw-controls")]
    String,
}

impl V4l2Type {
    /// Value of the kernel's `enum v4l2_ctrl_type`
    pub fn code(self) -> u32 {
        match self {
            Self::Integer => 1,
            Self::Boolean => 2,
            #[cfg(feature = "raw-controls")]
            Self::String => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "V4L2_CTRL_TYPE_INTEGER",
            Self::Boolean => "V4L2_CTRL_TYPE_BOOLEAN",
            #[cfg(feature = "raw-controls")]
            Self::String => "V4L2_CTRL_TYPE_STRING",
        }
    }
}

impl fmt::Display for V4l2Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown type name '{0}'")]
pub struct UnknownTypeName(pub String);

impl FromStr for V4l2Type {
    type Err = UnknownTypeName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "V4L2_CTRL_TYPE_INTEGER" => Ok(Self::Integer),
            "V4L2_CTRL_TYPE_BOOLEAN" => Ok(Self::Boolean),
            #[cfg(feature = "raw-controls")]
            "V4L2_CTRL_TYPE_STRING" => Ok(Self::String),
            other => Err(UnknownTypeName(other.to_string())),
        }
    }
}

/// How the driver interprets the mapped bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UvcDataType {
    Raw,
    Signed,
    Unsigned,
    Boolean,
    Enum,
    Bitmask,
}

impl UvcDataType {
    /// Value of the driver's `UVC_CTRL_DATA_TYPE_*` constant
    pub fn code(self) -> u32 {
        match self {
            Self::Raw => 0,
            Self::Signed => 1,
            Self::Unsigned => 2,
            Self::Boolean => 3,
            Self::Enum => 4,
            Self::Bitmask => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "UVC_CTRL_DATA_TYPE_RAW",
            Self::Signed => "UVC_CTRL_DATA_TYPE_SIGNED",
            Self::Unsigned => "UVC_CTRL_DATA_TYPE_UNSIGNED",
            Self::Boolean => "UVC_CTRL_DATA_TYPE_BOOLEAN",
            Self::Enum => "UVC_CTRL_DATA_TYPE_ENUM",
            Self::Bitmask => "UVC_CTRL_DATA_TYPE_BITMASK",
        }
    }
}

impl fmt::Display for UvcDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UvcDataType {
    type Err = UnknownTypeName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UVC_CTRL_DATA_TYPE_RAW" => Ok(Self::Raw),
            "UVC_CTRL_DATA_TYPE_SIGNED" => Ok(Self::Signed),
            "UVC_CTRL_DATA_TYPE_UNSIGNED" => Ok(Self::Unsigned),
            "UVC_CTRL_DATA_TYPE_BOOLEAN" => Ok(Self::Boolean),
            "UVC_CTRL_DATA_TYPE_ENUM" => Ok(Self::Enum),
            "UVC_CTRL_DATA_TYPE_BITMASK" => Ok(Self::Bitmask),
            other => Err(UnknownTypeName(other.to_string())),
        }
    }
}

/// A resolved mapping, ready to be handed to the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mapping {
    /// ASCII name, at most `MAPPING_NAME_LEN - 1` bytes
    pub name: String,
    pub entity: Guid,
    pub selector: u8,
    /// V4L2 control id
    pub id: u32,
    pub v4l2_type: V4l2Type,
    /// Width of the mapped field in bits
    pub size: u8,
    /// Bit offset of the mapped field
    pub offset: u8,
    pub data_type: UvcDataType,
}

impl Mapping {
    /// The name as the driver's fixed-width, NUL-terminated field
    pub fn c_name(&self) -> [u8; MAPPING_NAME_LEN] {
        let mut field = [0u8; MAPPING_NAME_LEN];
        let bytes = self.name.as_bytes();
        let len = bytes.len().min(MAPPING_NAME_LEN - 1);
        field[..len].copy_from_slice(&bytes[..len]);
        field
    }
}

/// Normalize a display name into what fits the driver's name field
pub fn driver_name(text: &str) -> String {
    let mut name = to_ascii_lossy(&normalize_whitespace(text));
    name.truncate(MAPPING_NAME_LEN - 1);
    name
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Mapping does not have V4L2 information. Only V4L2 mappings are supported.")]
    MissingV4l2 { position: Position },
    #[error("Mapping does not have UVC information. <uvc> is mandatory.")]
    MissingUvc { position: Position },
    #[error("Control reference missing. <control_ref> is mandatory.")]
    MissingControlRef { position: Position },
    #[error("Invalid control reference. 'idref' attribute referencing a <control> is mandatory.")]
    MissingIdref { position: Position },
    #[error("Invalid control reference: control with ID '{id}' could not be found.")]
    UnknownControlRef { id: String, position: Position },
    #[error("Control mapping has no name. <name> is mandatory.")]
    MissingName { position: Position },
    #[error("V4L2 ID contains invalid number or references unknown constant: '{text}'")]
    InvalidV4l2Id { text: String, position: Position },
    #[error("Invalid V4L2 control type specified: '{text}'")]
    InvalidValueType { text: String, position: Position },
    #[error("Invalid UVC control size specified: '{text}'")]
    InvalidSize { text: String, position: Position },
    #[error("Invalid UVC control offset specified: '{text}'")]
    InvalidOffset { text: String, position: Position },
    #[error("Invalid UVC control type specified: '{text}'")]
    InvalidDataType { text: String, position: Position },
}

impl ResolveError {
    pub fn position(&self) -> Position {
        match self {
            Self::MissingV4l2 { position }
            | Self::MissingUvc { position }
            | Self::MissingControlRef { position }
            | Self::MissingIdref { position }
            | Self::UnknownControlRef { position, .. }
            | Self::MissingName { position }
            | Self::InvalidV4l2Id { position, .. }
            | Self::InvalidValueType { position, .. }
            | Self::InvalidSize { position, .. }
            | Self::InvalidOffset { position, .. }
            | Self::InvalidDataType { position, .. } => *position,
        }
    }
}

/// Resolve a mapping declaration against the controls and constants of its document.
///
/// The referenced control only has to be declared; whether any device
/// accepted it does not matter here.
pub fn resolve(
    decl: &MappingDecl,
    registry: &ControlRegistry,
    symbols: &SymbolTable,
) -> Result<Mapping, ResolveError> {
    let v4l2 = decl
        .v4l2
        .as_ref()
        .ok_or(ResolveError::MissingV4l2 { position: decl.position })?;
    let uvc = decl
        .uvc
        .as_ref()
        .ok_or(ResolveError::MissingUvc { position: decl.position })?;
    let control_ref = uvc
        .control_ref
        .as_ref()
        .ok_or(ResolveError::MissingControlRef { position: uvc.position })?;
    let idref = control_ref
        .idref
        .as_deref()
        .ok_or(ResolveError::MissingIdref { position: control_ref.position })?;

    let control = registry
        .lookup(idref)
        .and_then(|handle| registry.get(handle))
        .ok_or_else(|| ResolveError::UnknownControlRef {
            id: idref.to_string(),
            position: control_ref.position,
        })?;

    let name = decl
        .name
        .as_deref()
        .map(driver_name)
        .ok_or(ResolveError::MissingName { position: decl.position })?;

    let id = v4l2
        .id
        .as_deref()
        .and_then(|text| symbols.resolve_integer(text).ok())
        .ok_or_else(|| ResolveError::InvalidV4l2Id {
            text: v4l2.id.shown().to_string(),
            position: v4l2.id.position,
        })?;

    let v4l2_type = v4l2
        .v4l2_type
        .as_deref()
        .and_then(|text| text.parse::<V4l2Type>().ok())
        .ok_or_else(|| ResolveError::InvalidValueType {
            text: v4l2.v4l2_type.shown().to_string(),
            position: v4l2.v4l2_type.position,
        })?;

    let size = resolve_bounded(&uvc.size, symbols, 0xFF).ok_or_else(|| ResolveError::InvalidSize {
        text: uvc.size.shown().to_string(),
        position: uvc.size.position,
    })?;

    let offset = resolve_bounded(&uvc.offset, symbols, 0xFF).ok_or_else(|| ResolveError::InvalidOffset {
        text: uvc.offset.shown().to_string(),
        position: uvc.offset.position,
    })?;

    let data_type = uvc
        .uvc_type
        .as_deref()
        .and_then(|text| text.parse::<UvcDataType>().ok())
        .ok_or_else(|| ResolveError::InvalidDataType {
            text: uvc.uvc_type.shown().to_string(),
            position: uvc.uvc_type.position,
        })?;

    Ok(Mapping {
        name,
        entity: control.entity,
        selector: control.selector,
        id: id as u32,
        v4l2_type,
        size: size as u8,
        offset: offset as u8,
        data_type,
    })
}
