//! Document-scoped named constants
//!
//! A dynctrl document may declare integer and GUID constants once and refer
//! to them by name wherever a number or an entity GUID is expected. Every
//! lookup first tries to read the text as a literal and only then consults
//! the table, filtered by the kind the caller expects.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::declarations::ConstantDecl;
use crate::document::Position;
use crate::guid::Guid;
use crate::text::parse_integer;

/// Kind of a declared constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstantKind {
    Integer,
    Guid,
}

impl ConstantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Guid => "guid",
        }
    }
}

impl fmt::Display for ConstantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown constant type '{0}' (must be 'integer' or 'guid')")]
pub struct UnknownKind(pub String);

impl FromStr for ConstantKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integer" => Ok(Self::Integer),
            "guid" => Ok(Self::Guid),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// Value of a declared constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConstantValue {
    Integer(i32),
    Guid(Guid),
}

impl ConstantValue {
    pub fn kind(&self) -> ConstantKind {
        match self {
            Self::Integer(_) => ConstantKind::Integer,
            Self::Guid(_) => ConstantKind::Guid,
        }
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{}", value),
            Self::Guid(guid) => write!(f, "{}", guid),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("constant '{0}' has already been defined")]
    AlreadyDefined(String),
    #[error("'{text}' is neither a valid {expected} nor a known {expected} constant")]
    Unresolvable { text: String, expected: ConstantKind },
}

/// Named constants of one document
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    constants: HashMap<String, ConstantValue>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a constant. A name can only be declared once; the first
    /// definition stays in effect.
    pub fn define(&mut self, name: &str, value: ConstantValue) -> Result<(), SymbolError> {
        if self.constants.contains_key(name) {
            return Err(SymbolError::AlreadyDefined(name.to_string()));
        }
        self.constants.insert(name.to_string(), value);
        Ok(())
    }

    /// Look up a constant of any kind
    pub fn get(&self, name: &str) -> Option<&ConstantValue> {
        self.constants.get(name)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Read `text` as an integer literal, or else as the name of an integer constant
    pub fn resolve_integer(&self, text: &str) -> Result<i32, SymbolError> {
        if let Some(value) = parse_integer(text) {
            return Ok(value);
        }
        match self.constants.get(text) {
            Some(ConstantValue::Integer(value)) => Ok(*value),
            _ => Err(SymbolError::Unresolvable {
                text: text.to_string(),
                expected: ConstantKind::Integer,
            }),
        }
    }

    /// Read `text` as a GUID literal, or else as the name of a GUID constant
    pub fn resolve_guid(&self, text: &str) -> Result<Guid, SymbolError> {
        if let Some(guid) = Guid::parse(text) {
            return Ok(guid);
        }
        match self.constants.get(text) {
            Some(ConstantValue::Guid(guid)) => Ok(*guid),
            _ => Err(SymbolError::Unresolvable {
                text: text.to_string(),
                expected: ConstantKind::Guid,
            }),
        }
    }
}

/// A `<constant>` declaration that could not be added to the table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstantError {
    #[error("Constant has no name. <id> is mandatory.")]
    MissingName { position: Position },
    #[error("Constant '{name}' has already been defined. Ignoring redefinition.")]
    AlreadyDefined { name: String, position: Position },
    #[error("Constant has unknown type '{kind}' (must be 'integer' or 'guid').")]
    UnknownKind { kind: String, position: Position },
    #[error("Integer constant {name} has invalid value '{value}'.")]
    InvalidInteger { name: String, value: String, position: Position },
    #[error("GUID constant {name} has invalid value '{value}'.")]
    InvalidGuid { name: String, value: String, position: Position },
}

impl ConstantError {
    pub fn position(&self) -> Position {
        match self {
            Self::MissingName { position }
            | Self::AlreadyDefined { position, .. }
            | Self::UnknownKind { position, .. }
            | Self::InvalidInteger { position, .. }
            | Self::InvalidGuid { position, .. } => *position,
        }
    }
}

/// Parse a constant declaration and add it to `table`.
///
/// Constant values must be literals; they cannot refer to other constants.
pub fn define_constant(table: &mut SymbolTable, decl: &ConstantDecl) -> Result<(String, ConstantValue), ConstantError> {
    let name = decl
        .id
        .as_deref()
        .ok_or(ConstantError::MissingName { position: decl.position })?;
    if table.get(name).is_some() {
        return Err(ConstantError::AlreadyDefined {
            name: name.to_string(),
            position: decl.position,
        });
    }

    let kind = decl
        .kind
        .as_deref()
        .unwrap_or_default()
        .parse::<ConstantKind>()
        .map_err(|UnknownKind(kind)| ConstantError::UnknownKind {
            kind,
            position: decl.position,
        })?;

    let text = decl.value.as_deref();
    let value = match kind {
        ConstantKind::Integer => text
            .and_then(parse_integer)
            .map(ConstantValue::Integer)
            .ok_or_else(|| ConstantError::InvalidInteger {
                name: name.to_string(),
                value: decl.value.shown().to_string(),
                position: decl.value.position,
            })?,
        ConstantKind::Guid => text
            .and_then(Guid::parse)
            .map(ConstantValue::Guid)
            .ok_or_else(|| ConstantError::InvalidGuid {
                name: name.to_string(),
                value: decl.value.shown().to_string(),
                position: decl.value.position,
            })?,
    };

    table
        .define(name, value)
        .map_err(|_| ConstantError::AlreadyDefined {
            name: name.to_string(),
            position: decl.position,
        })?;
    Ok((name.to_string(), value))
}
