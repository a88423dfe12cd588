//! Dynctrl Core - Dynamic UVC control documents and their application
//!
//! This crate loads dynctrl documents and applies them to video devices:
//! - XML loading with line/column positions and a typed view of the document
//! - Named integer/GUID constants and extension unit control definitions
//! - Mapping resolution into the records the uvcvideo driver expects
//! - A session that applies one document to every supported device and
//!   reports diagnostics and statistics
//!
//! Hardware access goes through the [`DeviceBackend`] and [`ControlTransport`]
//! traits; [`mock::MockBackend`] implements them in memory.

pub mod controls;
pub mod declarations;
pub mod device;
pub mod diagnostics;
pub mod document;
pub mod guid;
pub mod mapping;
pub mod mock;
pub mod session;
pub mod symbols;
pub mod text;

pub use controls::{ControlError, ControlRef, ControlRegistry, ExtensionUnitControl, Request, RequestFlags};
pub use declarations::DynctrlDocument;
pub use device::{ControlTransport, DeviceBackend, DeviceRef, TransportError};
pub use diagnostics::{DiagnosticLog, DiagnosticMessage, Diagnostics, LogError, Severity};
pub use document::{Document, DocumentError, Position};
pub use guid::Guid;
pub use mapping::{Mapping, ResolveError, UvcDataType, V4l2Type, MAPPING_NAME_LEN};
pub use session::{
    load_and_apply, load_and_apply_str, AlreadyExistsPolicy, Counter, MetaInfo, Options, Report, Session,
    SessionError, SessionState, Stats, Status,
};
pub use symbols::{ConstantError, ConstantKind, ConstantValue, SymbolError, SymbolTable};
pub use text::Version;
