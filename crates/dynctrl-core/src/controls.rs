//! Extension unit control definitions and the per-document control registry

use bitflags::bitflags;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::declarations::{ControlDecl, Field};
use crate::document::Position;
use crate::guid::Guid;
use crate::symbols::SymbolTable;

/// Entity GUID of the UVC processing unit
pub const UVC_GUID_PROCESSING_UNIT: Guid =
    Guid::from_bytes([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x01]);

/// Selector of the processing unit's brightness control
pub const PU_BRIGHTNESS_CONTROL: u8 = 0x02;

bitflags! {
    /// UVC requests a control supports, plus driver behaviour flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct RequestFlags: u32 {
        const SET_CUR = 1 << 0;
        const GET_CUR = 1 << 1;
        const GET_MIN = 1 << 2;
        const GET_MAX = 1 << 3;
        const GET_RES = 1 << 4;
        const GET_DEF = 1 << 5;
        /// Value may change without a SET_CUR; disables the driver's value cache
        const AUTO_UPDATE = 1 << 7;
    }
}

/// A request name accepted in a `<request>` element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    SetCur,
    GetCur,
    GetMin,
    GetMax,
    GetRes,
    GetDef,
}

impl Request {
    pub fn flag(self) -> RequestFlags {
        match self {
            Self::SetCur => RequestFlags::SET_CUR,
            Self::GetCur => RequestFlags::GET_CUR,
            Self::GetMin => RequestFlags::GET_MIN,
            Self::GetMax => RequestFlags::GET_MAX,
            Self::GetRes => RequestFlags::GET_RES,
            Self::GetDef => RequestFlags::GET_DEF,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown UVC request '{0}'")]
pub struct UnknownRequest(pub String);

impl FromStr for Request {
    type Err = UnknownRequest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SET_CUR" => Ok(Self::SetCur),
            "GET_CUR" => Ok(Self::GetCur),
            "GET_MIN" => Ok(Self::GetMin),
            "GET_MAX" => Ok(Self::GetMax),
            "GET_RES" => Ok(Self::GetRes),
            "GET_DEF" => Ok(Self::GetDef),
            other => Err(UnknownRequest(other.to_string())),
        }
    }
}

/// An extension unit control as handed to the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionUnitControl {
    /// Document-local identifier (empty for controls not declared by a document)
    pub id: String,
    pub entity: Guid,
    pub selector: u8,
    pub index: u8,
    pub size: u16,
    pub flags: RequestFlags,
}

impl ExtensionUnitControl {
    /// The built-in brightness control, used to find out whether a driver
    /// accepts dynamic controls at all
    pub fn probe() -> Self {
        Self {
            id: String::new(),
            entity: UVC_GUID_PROCESSING_UNIT,
            selector: PU_BRIGHTNESS_CONTROL,
            index: 0,
            size: 0,
            flags: RequestFlags::empty(),
        }
    }
}

impl fmt::Display for ExtensionUnitControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}} selector {}", self.entity, self.selector)
    }
}

/// Handle to a control stored in a [`ControlRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlRef(usize);

/// Controls declared by one document, looked up by their document id.
///
/// Entries are kept whether or not any device accepted them: mappings must be
/// able to refer to a control that a driver already knew about.
#[derive(Debug, Clone, Default)]
pub struct ControlRegistry {
    controls: Vec<ExtensionUnitControl>,
    by_id: HashMap<String, ControlRef>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a control. `AUTO_UPDATE` is always added to `flags`.
    ///
    /// Declaring an id that is already present makes later lookups return the
    /// new definition.
    pub fn declare(
        &mut self,
        id: &str,
        entity: Guid,
        selector: u8,
        index: u8,
        size: u16,
        flags: RequestFlags,
    ) -> ControlRef {
        let control = ControlRef(self.controls.len());
        self.controls.push(ExtensionUnitControl {
            id: id.to_string(),
            entity,
            selector,
            index,
            size,
            flags: flags | RequestFlags::AUTO_UPDATE,
        });
        self.by_id.insert(id.to_string(), control);
        control
    }

    pub fn lookup(&self, id: &str) -> Option<ControlRef> {
        self.by_id.get(id).copied()
    }

    pub fn get(&self, control: ControlRef) -> Option<&ExtensionUnitControl> {
        self.controls.get(control.0)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Control has no ID. 'id' attribute is mandatory.")]
    MissingId { position: Position },
    #[error("Control entity contains invalid GUID or references unknown constant: '{text}'")]
    InvalidEntity { text: String, position: Position },
    #[error("Control selector contains invalid number or references unknown constant: '{text}'")]
    InvalidSelector { text: String, position: Position },
    #[error("Invalid control index specified: '{text}'")]
    InvalidIndex { text: String, position: Position },
    #[error("Invalid control size specified: '{text}'")]
    InvalidSize { text: String, position: Position },
    #[error("List of supported UVC requests missing. <requests> is mandatory.")]
    MissingRequests { position: Position },
}

impl ControlError {
    pub fn position(&self) -> Position {
        match self {
            Self::MissingId { position }
            | Self::InvalidEntity { position, .. }
            | Self::InvalidSelector { position, .. }
            | Self::InvalidIndex { position, .. }
            | Self::InvalidSize { position, .. }
            | Self::MissingRequests { position } => *position,
        }
    }
}

/// A control declaration with every symbol resolved, ready to be declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedControl {
    pub id: String,
    pub entity: Guid,
    pub selector: u8,
    pub index: u8,
    pub size: u16,
    pub flags: RequestFlags,
    /// `<request>` entries that named no known request; reported as warnings
    pub unknown_requests: Vec<Field>,
}

impl ResolvedControl {
    pub fn declare_into(&self, registry: &mut ControlRegistry) -> ControlRef {
        registry.declare(
            &self.id,
            self.entity,
            self.selector,
            self.index,
            self.size,
            self.flags,
        )
    }
}

/// Resolve the structural fields of a control declaration
pub fn resolve_control(decl: &ControlDecl, symbols: &SymbolTable) -> Result<ResolvedControl, ControlError> {
    let id = decl
        .id
        .clone()
        .ok_or(ControlError::MissingId { position: decl.position })?;

    let entity = decl
        .entity
        .as_deref()
        .and_then(|text| symbols.resolve_guid(text).ok())
        .ok_or_else(|| ControlError::InvalidEntity {
            text: decl.entity.shown().to_string(),
            position: decl.entity.position,
        })?;

    let selector = resolve_bounded(&decl.selector, symbols, 0xFF).ok_or_else(|| {
        ControlError::InvalidSelector {
            text: decl.selector.shown().to_string(),
            position: decl.selector.position,
        }
    })?;

    let index = resolve_bounded(&decl.index, symbols, 0xFF).ok_or_else(|| ControlError::InvalidIndex {
        text: decl.index.shown().to_string(),
        position: decl.index.position,
    })?;

    let size = resolve_bounded(&decl.size, symbols, 0xFFFF).ok_or_else(|| ControlError::InvalidSize {
        text: decl.size.shown().to_string(),
        position: decl.size.position,
    })?;

    let requests = decl
        .requests
        .as_ref()
        .ok_or(ControlError::MissingRequests { position: decl.position })?;

    let mut flags = RequestFlags::empty();
    let mut unknown_requests = Vec::new();
    for request in requests {
        match request.as_deref().map(str::parse::<Request>) {
            Some(Ok(request)) => flags |= request.flag(),
            _ => unknown_requests.push(request.clone()),
        }
    }

    Ok(ResolvedControl {
        id,
        entity,
        selector: selector as u8,
        index: index as u8,
        size: size as u16,
        flags,
        unknown_requests,
    })
}

/// Resolve an integer-or-symbol field and require it to lie in `0..=max`
pub(crate) fn resolve_bounded(field: &Field, symbols: &SymbolTable, max: u32) -> Option<u32> {
    let value = symbols.resolve_integer(field.as_deref()?).ok()?;
    u32::try_from(value).ok().filter(|v| *v <= max)
}
