//! Load a dynctrl document and apply it to every matching device
//!
//! A [`Session`] parses the document once and then makes one pass per
//! device that accepts dynamic controls. Document-wide work (meta data and
//! constants, control registration) happens in the first pass only; controls
//! and mappings are sent to every device. Failures of single declarations or
//! devices are logged and counted but never stop the session: the result is
//! a success as soon as one device could be processed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::controls::{resolve_control, ControlRef, ControlRegistry, ExtensionUnitControl};
use crate::declarations::{ControlDecl, DynctrlDocument, MetaDecl};
use crate::device::{ControlTransport, DeviceBackend, DeviceRef, TransportError};
use crate::diagnostics::{DiagnosticLog, Diagnostics, LogError};
use crate::document::{DocumentError, Position};
use crate::mapping;
use crate::symbols::{define_constant, SymbolTable};
use crate::text::{normalize_whitespace, to_ascii_lossy, Version};

/// When a transport "already exists" answer counts as success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlreadyExistsPolicy {
    /// Always a failure
    Reject,
    /// Tolerated from the second pass on, when earlier devices have already
    /// taught the driver about the control
    #[default]
    AfterFirstPass,
    /// Always tolerated
    Accept,
}

impl AlreadyExistsPolicy {
    pub fn tolerates(self, pass: u32) -> bool {
        match self {
            Self::Reject => false,
            Self::AfterFirstPass => pass > 1,
            Self::Accept => true,
        }
    }
}

/// Caller choices for one load-and-apply run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Collect diagnostic messages for the caller
    pub report_errors: bool,
    /// Return the document's `<meta>` information
    pub retrieve_meta: bool,
    /// Skip the structural checks that go beyond what processing needs
    pub skip_validation: bool,
    pub already_exists: AlreadyExistsPolicy,
    /// Only devices driven by this kernel driver are considered
    pub driver: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            report_errors: false,
            retrieve_meta: false,
            skip_validation: false,
            already_exists: AlreadyExistsPolicy::default(),
            driver: "uvcvideo".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counter {
    pub successful: u32,
    pub failed: u32,
}

impl Counter {
    fn record(&mut self, ok: bool) {
        if ok {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn total(&self) -> u32 {
        self.successful + self.failed
    }
}

/// Processing statistics, accumulated over all passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub constants: Counter,
    pub controls: Counter,
    pub mappings: Counter,
}

/// Overall outcome of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    NoSupportedDevice,
    MalformedDocument,
    OutOfMemory,
    InvalidArgument,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::NoSupportedDevice => "no device with dynamic control support found",
            Self::MalformedDocument => "malformed document",
            Self::OutOfMemory => "out of memory",
            Self::InvalidArgument => "invalid argument",
        })
    }
}

/// Errors that abort a whole session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("malformed document: {0}")]
    MalformedDocument(#[from] DocumentError),
    #[error("out of memory")]
    OutOfMemory,
}

impl From<LogError> for SessionError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::OutOfMemory => Self::OutOfMemory,
        }
    }
}

/// Document information from `<meta>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetaInfo {
    pub version: Version,
    pub revision: Version,
    /// Whitespace-normalized
    pub author: Option<String>,
    pub contact: Option<String>,
    pub copyright: Option<String>,
}

/// Everything a session hands back to its caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub status: Status,
    pub meta: Option<MetaInfo>,
    pub messages: Diagnostics,
    pub stats: Stats,
}

impl Report {
    pub fn succeeded(&self) -> bool {
        self.status == Status::Success
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Created,
    DocumentParsed,
    Probing,
    Applying,
    Completed,
    Failed,
}

/// Outcome of the capability check made before a device is used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Supported,
    InsufficientPrivilege,
    Unsupported,
}

/// State of one load-and-apply operation
#[derive(Debug)]
pub struct Session {
    options: Options,
    state: SessionState,
    symbols: SymbolTable,
    registry: ControlRegistry,
    log: DiagnosticLog,
    pass: u32,
    stats: Stats,
    meta: Option<MetaInfo>,
    /// Registry entry of each control declaration, once registered
    declared: Vec<Option<ControlRef>>,
}

impl Session {
    pub fn new(options: Options) -> Self {
        let log = DiagnosticLog::new(options.report_errors);
        Self {
            options,
            state: SessionState::Created,
            symbols: SymbolTable::new(),
            registry: ControlRegistry::new(),
            log,
            pass: 0,
            stats: Stats::default(),
            meta: None,
            declared: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of devices the document has been applied to so far
    pub fn pass(&self) -> u32 {
        self.pass
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn registry(&self) -> &ControlRegistry {
        &self.registry
    }

    /// Load the document at `path` and apply it to all candidate devices
    pub fn apply_file<B: DeviceBackend>(&mut self, path: &Path, backend: &mut B) -> Status {
        if path.as_os_str().is_empty() {
            return self.fail(SessionError::InvalidArgument("empty document path".to_string()));
        }
        info!(path = %path.display(), "loading dynamic controls");
        let parsed = DynctrlDocument::from_file(path);
        self.apply_parsed(parsed, backend)
    }

    /// Apply a document given as XML text
    pub fn apply_str<B: DeviceBackend>(&mut self, xml: &str, backend: &mut B) -> Status {
        let parsed = DynctrlDocument::from_xml(xml);
        self.apply_parsed(parsed, backend)
    }

    /// Hand back the final report
    pub fn into_report(self, status: Status) -> Report {
        Report {
            status,
            meta: self.meta,
            messages: self.log.finish(),
            stats: self.stats,
        }
    }

    fn apply_parsed<B: DeviceBackend>(
        &mut self,
        parsed: Result<DynctrlDocument, DocumentError>,
        backend: &mut B,
    ) -> Status {
        if self.state != SessionState::Created {
            return self.fail(SessionError::InvalidArgument(
                "session has already processed a document".to_string(),
            ));
        }
        let result = parsed
            .map_err(SessionError::from)
            .and_then(|doc| self.run(&doc, backend));
        match result {
            Ok(status) => status,
            Err(err) => self.fail(err),
        }
    }

    fn enter(&mut self, state: SessionState) {
        trace!(from = ?self.state, to = ?state, pass = self.pass, "session state");
        self.state = state;
    }

    fn fail(&mut self, err: SessionError) -> Status {
        warn!(error = %err, "session failed");
        self.enter(SessionState::Failed);
        match err {
            SessionError::InvalidArgument(_) => Status::InvalidArgument,
            SessionError::OutOfMemory => Status::OutOfMemory,
            SessionError::MalformedDocument(err) => {
                let logged = self.log.error(
                    err.position,
                    format_args!(
                        "Malformed control mapping file encountered. Unable to parse: {}",
                        err.message
                    ),
                );
                match logged {
                    Ok(()) => Status::MalformedDocument,
                    Err(_) => Status::OutOfMemory,
                }
            }
        }
    }

    fn run<B: DeviceBackend>(&mut self, doc: &DynctrlDocument, backend: &mut B) -> Result<Status, SessionError> {
        self.enter(SessionState::DocumentParsed);
        self.declared = vec![None; doc.controls.len()];
        debug!(
            constants = doc.constants.len(),
            controls = doc.controls.len(),
            mappings = doc.mappings.len(),
            "document parsed"
        );

        if !self.options.skip_validation {
            for (name, position) in &doc.unknown_sections {
                self.log
                    .warning(*position, format_args!("Unknown section <{}> ignored.", name))?;
            }
        }

        let devices = match backend.list_candidate_devices() {
            Ok(devices) => devices,
            Err(err) => {
                warn!(error = %err, "device enumeration failed");
                self.log.error(
                    Position::UNKNOWN,
                    format_args!("Unable to enumerate video devices: {}", err),
                )?;
                Vec::new()
            }
        };

        let mut successful_devices = 0;
        for device in &devices {
            if self.apply_device(doc, device, backend)? {
                successful_devices += 1;
            }
        }

        self.enter(SessionState::Completed);
        info!(devices = devices.len(), successful_devices, "dynamic controls applied");
        Ok(if successful_devices == 0 {
            Status::NoSupportedDevice
        } else {
            Status::Success
        })
    }

    /// Process one device; returns whether the document was applied to it
    fn apply_device<B: DeviceBackend>(
        &mut self,
        doc: &DynctrlDocument,
        device: &DeviceRef,
        backend: &mut B,
    ) -> Result<bool, SessionError> {
        if device.driver != self.options.driver {
            debug!(device = %device.name, driver = %device.driver, "not a UVC device");
            self.log.info(
                Position::UNKNOWN,
                format_args!("device '{}' skipped because it is not a UVC device.", device.name),
            )?;
            return Ok(false);
        }

        let mut handle = match backend.open(device) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(device = %device.name, error = %err, "unable to open device");
                self.log.error(
                    Position::UNKNOWN,
                    format_args!("device '{}' skipped because it could not be opened.", device.name),
                )?;
                return Ok(false);
            }
        };

        self.enter(SessionState::Probing);
        match probe(&mut handle) {
            Probe::Supported => {}
            Probe::InsufficientPrivilege => {
                warn!(device = %device.name, "dynamic controls require elevated privileges");
                self.log.error(
                    Position::UNKNOWN,
                    format_args!(
                        "device '{}' skipped because you do not have the right permissions. \
                         Newer driver versions require root permissions.",
                        device.name
                    ),
                )?;
                return Ok(false);
            }
            Probe::Unsupported => {
                debug!(device = %device.name, driver = %device.driver, "no dynamic control support");
                self.log.error(
                    Position::UNKNOWN,
                    format_args!(
                        "device '{}' skipped because the driver '{}' behind it does not seem \
                         to support dynamic controls.",
                        device.name, device.driver
                    ),
                )?;
                return Ok(false);
            }
        }

        self.pass += 1;
        self.enter(SessionState::Applying);
        info!(device = %device.name, pass = self.pass, "applying dynamic controls");

        if self.pass == 1 {
            if let Some(meta) = &doc.meta {
                self.process_meta(meta)?;
            }
            for decl in &doc.constants {
                match define_constant(&mut self.symbols, decl) {
                    Ok((name, value)) => {
                        trace!(%name, %value, "constant defined");
                        self.stats.constants.record(true);
                    }
                    Err(err) => {
                        self.log.error(err.position(), format_args!("{}", err))?;
                        self.stats.constants.record(false);
                    }
                }
            }
        }

        self.apply_controls(doc, device, &mut handle)?;
        self.apply_mappings(doc, device, &mut handle)?;
        Ok(true)
    }

    fn process_meta(&mut self, meta: &MetaDecl) -> Result<(), SessionError> {
        if !self.options.retrieve_meta {
            return Ok(());
        }
        let version = self.parse_version(meta.version.as_deref(), meta.version.position, "version")?;
        let revision = self.parse_version(meta.revision.as_deref(), meta.revision.position, "revision")?;
        self.meta = Some(MetaInfo {
            version,
            revision,
            author: meta.author.as_deref().map(|text| to_ascii_lossy(&normalize_whitespace(text))),
            contact: meta.contact.as_deref().map(to_ascii_lossy),
            copyright: meta.copyright.as_deref().map(to_ascii_lossy),
        });
        Ok(())
    }

    fn parse_version(&mut self, text: Option<&str>, position: Position, what: &str) -> Result<Version, SessionError> {
        let Some(text) = text else {
            return Ok(Version::default());
        };
        match Version::parse(text) {
            Some(version) => Ok(version),
            None => {
                self.log
                    .warning(position, format_args!("Invalid {} number '{}' in <meta>.", what, text))?;
                Ok(Version::default())
            }
        }
    }

    fn apply_controls<T: ControlTransport>(
        &mut self,
        doc: &DynctrlDocument,
        device: &DeviceRef,
        transport: &mut T,
    ) -> Result<(), SessionError> {
        for (slot, decl) in doc.controls.iter().enumerate() {
            let handle = match self.declared.get(slot).copied().flatten() {
                Some(handle) => handle,
                None => match self.declare_control(decl)? {
                    Some(handle) => {
                        self.declared[slot] = Some(handle);
                        self.stats.controls.record(true);
                        handle
                    }
                    None => {
                        self.stats.controls.record(false);
                        continue;
                    }
                },
            };
            let Some(control) = self.registry.get(handle).cloned() else {
                continue;
            };

            let result = transport.add_control(&control);
            let ok = self.accept(result, |err| {
                format!(
                    "{}: unable to add control with GUID {{{}}} and selector {}. {}",
                    device.name, control.entity, control.selector, err
                )
            })?;
            debug!(device = %device.name, control = %control.id, ok, "control applied");
            self.stats.controls.record(ok);
        }
        Ok(())
    }

    /// Resolve a control declaration and add it to the registry
    fn declare_control(&mut self, decl: &ControlDecl) -> Result<Option<ControlRef>, SessionError> {
        let resolved = match resolve_control(decl, &self.symbols) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.log.error(err.position(), format_args!("{}", err))?;
                return Ok(None);
            }
        };
        for request in &resolved.unknown_requests {
            self.log.warning(
                request.position,
                format_args!("Invalid UVC request specified: '{}'", request.shown()),
            )?;
        }
        if self.registry.contains(&resolved.id) {
            self.log.warning(
                decl.position,
                format_args!(
                    "Control '{}' has already been defined. The later definition takes precedence.",
                    resolved.id
                ),
            )?;
        }
        Ok(Some(resolved.declare_into(&mut self.registry)))
    }

    fn apply_mappings<T: ControlTransport>(
        &mut self,
        doc: &DynctrlDocument,
        device: &DeviceRef,
        transport: &mut T,
    ) -> Result<(), SessionError> {
        for decl in &doc.mappings {
            let mapping = match mapping::resolve(decl, &self.registry, &self.symbols) {
                Ok(mapping) => mapping,
                Err(err) => {
                    self.log.error(err.position(), format_args!("{}", err))?;
                    self.stats.mappings.record(false);
                    continue;
                }
            };

            let result = transport.add_mapping(&mapping);
            let ok = self.accept(result, |err| {
                format!("{}: unable to map '{}' control. {}", device.name, mapping.name, err)
            })?;
            debug!(device = %device.name, mapping = %mapping.name, ok, "mapping applied");
            self.stats.mappings.record(ok);
        }
        Ok(())
    }

    /// Judge a transport outcome, logging rejections
    fn accept(
        &mut self,
        result: Result<(), TransportError>,
        describe: impl FnOnce(&TransportError) -> String,
    ) -> Result<bool, SessionError> {
        match result {
            Ok(()) => Ok(true),
            Err(TransportError::AlreadyExists) if self.options.already_exists.tolerates(self.pass) => {
                trace!(pass = self.pass, "already known to the driver");
                Ok(true)
            }
            Err(err) => {
                self.log.error(Position::UNKNOWN, format_args!("{}", describe(&err)))?;
                Ok(false)
            }
        }
    }
}

/// Try to redefine the driver's built-in brightness control. A driver with
/// dynamic control support answers that it already exists.
fn probe<T: ControlTransport>(transport: &mut T) -> Probe {
    match transport.add_control(&ExtensionUnitControl::probe()) {
        Err(TransportError::AlreadyExists) => Probe::Supported,
        Err(TransportError::PermissionDenied) => Probe::InsufficientPrivilege,
        _ => Probe::Unsupported,
    }
}

/// Load the document at `path` and apply it to every candidate device of `backend`
pub fn load_and_apply<B: DeviceBackend>(path: &Path, options: &Options, backend: &mut B) -> Report {
    let mut session = Session::new(options.clone());
    let status = session.apply_file(path, backend);
    session.into_report(status)
}

/// Like [`load_and_apply`], for a document held in memory
pub fn load_and_apply_str<B: DeviceBackend>(xml: &str, options: &Options, backend: &mut B) -> Report {
    let mut session = Session::new(options.clone());
    let status = session.apply_str(xml, backend);
    session.into_report(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::mock::{DriverBehaviour, MockBackend, MockDevice, MockFailure, MockRequest};
    use std::io::Write;

    const SCENARIO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<config>
  <meta>
    <version>1.0</version>
    <revision>3</revision>
    <author>
      Logitech   QuickCam
      Team
    </author>
    <contact>quickcamteam@example.com</contact>
    <copyright>© Logitech</copyright>
  </meta>
  <constants>
    <constant type="guid">
      <id>BRIGHTNESS_GUID</id>
      <value>23E49ED0-1178-4f31-AE52-D2FB8A8D3B48</value>
    </constant>
  </constants>
  <devices>
    <device>
      <controls>
        <control id="brightness_xu">
          <entity>BRIGHTNESS_GUID</entity>
          <selector>1</selector>
          <index>0</index>
          <size>2</size>
          <requests>
            <request>GET_CUR</request>
            <request>SET_CUR</request>
          </requests>
        </control>
      </controls>
    </device>
  </devices>
  <mappings>
    <mapping>
      <name>Brightness (XU)</name>
      <uvc>
        <control_ref idref="brightness_xu"/>
        <size>16</size>
        <offset>0</offset>
        <uvc_type>UVC_CTRL_DATA_TYPE_UNSIGNED</uvc_type>
      </uvc>
      <v4l2>
        <id>0x0A046D01</id>
        <v4l2_type>V4L2_CTRL_TYPE_INTEGER</v4l2_type>
      </v4l2>
    </mapping>
  </mappings>
</config>"#;

    fn options() -> Options {
        Options {
            report_errors: true,
            retrieve_meta: true,
            ..Options::default()
        }
    }

    fn errors(report: &Report) -> Vec<&str> {
        report
            .messages
            .iter()
            .filter(|m| m.severity == Severity::Error)
            .map(|m| m.text.as_str())
            .collect()
    }

    #[test]
    fn test_one_supported_device_is_enough() {
        let mut backend = MockBackend::new()
            .with_device(MockDevice::uvc("video0").with_behaviour(DriverBehaviour::Restricted))
            .with_device(MockDevice::uvc("video1"));
        let report = load_and_apply_str(SCENARIO, &options(), &mut backend);

        assert_eq!(report.status, Status::Success);
        assert_eq!(report.stats.constants, Counter { successful: 1, failed: 0 });
        assert_eq!(report.stats.controls, Counter { successful: 2, failed: 0 });
        assert_eq!(report.stats.mappings, Counter { successful: 1, failed: 0 });
        assert_eq!(
            errors(&report),
            vec![
                "device 'video0' skipped because you do not have the right permissions. \
                 Newer driver versions require root permissions."
            ]
        );

        let controls = backend.registered_controls();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].id, "brightness_xu");
        assert_eq!(controls[0].size, 2);
        let mappings = backend.registered_mappings();
        assert_eq!(mappings[0].name, "Brightness (XU)");
        assert_eq!(mappings[0].id, 0x0A046D01);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_no_supported_device() {
        let mut backend = MockBackend::new()
            .with_device(MockDevice::uvc("video0").with_behaviour(DriverBehaviour::Static))
            .with_device(MockDevice::uvc("video1").with_behaviour(DriverBehaviour::Restricted));
        let report = load_and_apply_str(SCENARIO, &options(), &mut backend);

        assert_eq!(report.status, Status::NoSupportedDevice);
        assert_eq!(report.stats, Stats::default());
        assert_eq!(errors(&report).len(), 2);
        assert!(errors(&report)[0].contains("driver 'uvcvideo' behind it does not seem"));
        assert!(report.meta.is_none());
    }

    #[test]
    fn test_no_devices_at_all() {
        let report = load_and_apply_str(SCENARIO, &options(), &mut MockBackend::new());
        assert_eq!(report.status, Status::NoSupportedDevice);
        assert!(report.messages.is_empty());
    }

    #[test]
    fn test_second_device_sees_existing_controls() {
        let mut backend = MockBackend::new()
            .with_device(MockDevice::uvc("video0"))
            .with_device(MockDevice::uvc("video1"));
        let report = load_and_apply_str(SCENARIO, &options(), &mut backend);

        assert_eq!(report.status, Status::Success);
        // Constants are only processed in the first pass
        assert_eq!(report.stats.constants, Counter { successful: 1, failed: 0 });
        // One registration plus one application per device
        assert_eq!(report.stats.controls, Counter { successful: 3, failed: 0 });
        assert_eq!(report.stats.mappings, Counter { successful: 2, failed: 0 });
        assert!(errors(&report).is_empty());
    }

    #[test]
    fn test_already_exists_policy_reject() {
        let mut backend = MockBackend::new()
            .with_device(MockDevice::uvc("video0"))
            .with_device(MockDevice::uvc("video1"));
        let options = Options {
            already_exists: AlreadyExistsPolicy::Reject,
            ..options()
        };
        let report = load_and_apply_str(SCENARIO, &options, &mut backend);

        assert_eq!(report.status, Status::Success);
        assert_eq!(report.stats.controls, Counter { successful: 2, failed: 1 });
        assert_eq!(report.stats.mappings, Counter { successful: 1, failed: 1 });
        let errors = errors(&report);
        assert!(errors[0].starts_with(
            "video1: unable to add control with GUID {23e49ed0-1178-4f31-ae52-d2fb8a8d3b48} and selector 1."
        ));
        assert!(errors[1].starts_with("video1: unable to map 'Brightness (XU)' control."));
    }

    #[test]
    fn test_already_exists_in_first_pass_is_an_error_by_default() {
        let mut backend = MockBackend::new()
            .with_device(MockDevice::uvc("video0").failing_control(1, MockFailure::AlreadyExists));
        let report = load_and_apply_str(SCENARIO, &options(), &mut backend);
        assert_eq!(report.stats.controls, Counter { successful: 1, failed: 1 });

        let mut backend = MockBackend::new()
            .with_device(MockDevice::uvc("video0").failing_control(1, MockFailure::AlreadyExists));
        let accept = Options {
            already_exists: AlreadyExistsPolicy::Accept,
            ..options()
        };
        let report = load_and_apply_str(SCENARIO, &accept, &mut backend);
        assert_eq!(report.stats.controls, Counter { successful: 2, failed: 0 });
    }

    #[test]
    fn test_rejected_control_still_resolves_mappings() {
        let mut backend = MockBackend::new()
            .with_device(MockDevice::uvc("video0").failing_control(1, MockFailure::Other(5)));
        let report = load_and_apply_str(SCENARIO, &options(), &mut backend);

        assert_eq!(report.status, Status::Success);
        assert_eq!(report.stats.controls, Counter { successful: 1, failed: 1 });
        assert_eq!(report.stats.mappings, Counter { successful: 1, failed: 0 });
        assert_eq!(backend.registered_mappings().len(), 1);
    }

    const TWO_CONTROLS: &str = r#"<config>
  <constants>
    <constant type="guid"><id>XU</id><value>23E49ED0-1178-4f31-AE52-D2FB8A8D3B48</value></constant>
  </constants>
  <devices><device><controls>
    <control id="a">
      <entity>XU</entity><selector>1</selector><index>0</index><size>1</size>
      <requests><request>GET_CUR</request></requests>
    </control>
    <control id="b">
      <entity>XU</entity><selector>2</selector><index>1</index><size>1</size>
      <requests><request>GET_CUR</request></requests>
    </control>
  </controls></device></devices>
  <mappings>
    <mapping>
      <name>A</name>
      <uvc><control_ref idref="a"/><size>8</size><offset>0</offset><uvc_type>UVC_CTRL_DATA_TYPE_UNSIGNED</uvc_type></uvc>
      <v4l2><id>0x0A046D10</id><v4l2_type>V4L2_CTRL_TYPE_INTEGER</v4l2_type></v4l2>
    </mapping>
    <mapping>
      <name>B</name>
      <uvc><control_ref idref="b"/><size>1</size><offset>0</offset><uvc_type>UVC_CTRL_DATA_TYPE_BOOLEAN</uvc_type></uvc>
      <v4l2><id>0x0A046D11</id><v4l2_type>V4L2_CTRL_TYPE_BOOLEAN</v4l2_type></v4l2>
    </mapping>
  </mappings>
</config>"#;

    #[test]
    fn test_rejections_do_not_block_siblings() {
        let mut backend = MockBackend::new().with_device(
            MockDevice::uvc("video0")
                .failing_control(1, MockFailure::Invalid)
                .failing_mapping("A", MockFailure::PermissionDenied),
        );
        let report = load_and_apply_str(TWO_CONTROLS, &options(), &mut backend);

        assert_eq!(report.status, Status::Success);
        // Both registrations succeed, one device application fails
        assert_eq!(report.stats.controls, Counter { successful: 3, failed: 1 });
        assert_eq!(report.stats.mappings, Counter { successful: 1, failed: 1 });
        assert_eq!(
            errors(&report),
            vec![
                "video0: unable to add control with GUID {23e49ed0-1178-4f31-ae52-d2fb8a8d3b48} \
                 and selector 1. invalid argument",
                "video0: unable to map 'A' control. permission denied",
            ]
        );

        let controls = backend.registered_controls();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].id, "b");
        let mappings = backend.registered_mappings();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].name, "B");
        // Probe, two controls, two mappings
        assert_eq!(backend.calls().len(), 5);
    }

    #[test]
    fn test_skipped_devices_do_not_start_a_pass() {
        let mut backend = MockBackend::new()
            .with_device(MockDevice::new("video0", "gspca"))
            .with_device(MockDevice::uvc("video1").with_open_failure())
            .with_device(MockDevice::uvc("video2"));
        let mut session = Session::new(options());
        let status = session.apply_str(SCENARIO, &mut backend);

        assert_eq!(status, Status::Success);
        assert_eq!(session.pass(), 1);
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.symbols().len(), 1);

        let report = session.into_report(status);
        assert_eq!(report.stats.constants.successful, 1);
        let infos: Vec<_> = report
            .messages
            .iter()
            .filter(|m| m.severity == Severity::Info)
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(infos, vec!["device 'video0' skipped because it is not a UVC device."]);
        assert_eq!(
            errors(&report),
            vec!["device 'video1' skipped because it could not be opened."]
        );
    }

    #[test]
    fn test_unknown_control_ref_is_never_sent() {
        let xml = SCENARIO.replace(r#"idref="brightness_xu""#, r#"idref="missing""#);
        let mut backend = MockBackend::new().with_device(MockDevice::uvc("video0"));
        let report = load_and_apply_str(&xml, &options(), &mut backend);

        assert_eq!(report.stats.mappings, Counter { successful: 0, failed: 1 });
        assert!(backend
            .calls()
            .iter()
            .all(|call| !matches!(call.request, MockRequest::Mapping(_))));
        let message = report
            .messages
            .iter()
            .find(|m| m.text.contains("could not be found"))
            .unwrap();
        assert_eq!(message.line, 39);
    }

    #[test]
    fn test_oversized_control_is_not_registered() {
        let xml = SCENARIO.replace("<size>2</size>", "<size>0x10000</size>");
        let mut backend = MockBackend::new()
            .with_device(MockDevice::uvc("video0"))
            .with_device(MockDevice::uvc("video1"));
        let report = load_and_apply_str(&xml, &options(), &mut backend);

        // The failing declaration is retried (and fails) on every pass
        assert_eq!(report.stats.controls, Counter { successful: 0, failed: 2 });
        // Mappings referring to it cannot be resolved either
        assert_eq!(report.stats.mappings, Counter { successful: 0, failed: 2 });
        assert!(backend.registered_controls().is_empty());
        assert!(errors(&report).contains(&"Invalid control size specified: '0x10000'"));

        let xml = SCENARIO.replace("<size>2</size>", "<size>0xFFFF</size>");
        let mut backend = MockBackend::new().with_device(MockDevice::uvc("video0"));
        let report = load_and_apply_str(&xml, &options(), &mut backend);
        assert_eq!(report.stats.controls.failed, 0);
        assert_eq!(backend.registered_controls()[0].size, 0xFFFF);
    }

    #[test]
    fn test_duplicate_constant_keeps_first() {
        let xml = SCENARIO.replace(
            "</constants>",
            r#"<constant type="guid">
      <id>BRIGHTNESS_GUID</id>
      <value>00000000-0000-0000-0000-000000000001</value>
    </constant>
  </constants>"#,
        );
        let mut backend = MockBackend::new().with_device(MockDevice::uvc("video0"));
        let report = load_and_apply_str(&xml, &options(), &mut backend);

        assert_eq!(report.stats.constants, Counter { successful: 1, failed: 1 });
        assert!(errors(&report)
            .contains(&"Constant 'BRIGHTNESS_GUID' has already been defined. Ignoring redefinition."));
        assert_eq!(
            backend.registered_controls()[0].entity.to_string(),
            "23e49ed0-1178-4f31-ae52-d2fb8a8d3b48"
        );
    }

    #[test]
    fn test_unknown_requests_warn_once() {
        let xml = SCENARIO.replace("<request>SET_CUR</request>", "<request>SET_MAX</request>");
        let mut backend = MockBackend::new()
            .with_device(MockDevice::uvc("video0"))
            .with_device(MockDevice::uvc("video1"));
        let report = load_and_apply_str(&xml, &options(), &mut backend);

        let warnings: Vec<_> = report
            .messages
            .iter()
            .filter(|m| m.severity == Severity::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].text, "Invalid UVC request specified: 'SET_MAX'");
        assert_eq!(report.stats.controls.failed, 0);
    }

    #[test]
    fn test_malformed_document() {
        let mut backend = MockBackend::new().with_device(MockDevice::uvc("video0"));
        let mut session = Session::new(options());
        let status = session.apply_str("<config>\n<meta>\n</config>", &mut backend);

        assert_eq!(status, Status::MalformedDocument);
        assert_eq!(session.state(), SessionState::Failed);
        let report = session.into_report(status);
        assert_eq!(report.messages.len(), 1);
        assert!(report.messages[0]
            .text
            .starts_with("Malformed control mapping file encountered. Unable to parse:"));
        // Nothing reaches the driver
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_empty_path_is_invalid() {
        let report = load_and_apply(Path::new(""), &options(), &mut MockBackend::new());
        assert_eq!(report.status, Status::InvalidArgument);
    }

    #[test]
    fn test_session_runs_once() {
        let mut backend = MockBackend::new().with_device(MockDevice::uvc("video0"));
        let mut session = Session::new(options());
        assert_eq!(session.apply_str(SCENARIO, &mut backend), Status::Success);
        assert_eq!(session.apply_str(SCENARIO, &mut backend), Status::InvalidArgument);
    }

    #[test]
    fn test_meta_information() {
        let mut backend = MockBackend::new().with_device(MockDevice::uvc("video0"));
        let report = load_and_apply_str(SCENARIO, &options(), &mut backend);
        let meta = report.meta.unwrap();
        assert_eq!(meta.version, Version::new(1, 0));
        assert_eq!(meta.revision, Version::new(3, 0));
        assert_eq!(meta.author.as_deref(), Some("Logitech QuickCam Team"));
        assert_eq!(meta.contact.as_deref(), Some("quickcamteam@example.com"));
        assert_eq!(meta.copyright.as_deref(), Some("? Logitech"));

        let mut backend = MockBackend::new().with_device(MockDevice::uvc("video0"));
        let quiet = Options {
            retrieve_meta: false,
            ..options()
        };
        assert!(load_and_apply_str(SCENARIO, &quiet, &mut backend).meta.is_none());
    }

    #[test]
    fn test_messages_are_opt_in() {
        let mut backend = MockBackend::new()
            .with_device(MockDevice::uvc("video0").with_behaviour(DriverBehaviour::Restricted));
        let report = load_and_apply_str(SCENARIO, &Options::default(), &mut backend);
        assert_eq!(report.status, Status::NoSupportedDevice);
        assert!(report.messages.is_empty());
    }

    #[test]
    fn test_unknown_sections_warn_unless_skipped() {
        let xml = SCENARIO.replace("</config>", "<schema_extension/>\n</config>");
        let mut backend = MockBackend::new().with_device(MockDevice::uvc("video0"));
        let report = load_and_apply_str(&xml, &options(), &mut backend);
        assert_eq!(report.messages.count(Severity::Warning), 1);

        let mut backend = MockBackend::new().with_device(MockDevice::uvc("video0"));
        let skip = Options {
            skip_validation: true,
            ..options()
        };
        let report = load_and_apply_str(&xml, &skip, &mut backend);
        assert_eq!(report.messages.count(Severity::Warning), 0);
    }

    #[test]
    fn test_load_from_file_and_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCENARIO.as_bytes()).unwrap();
        let mut backend = MockBackend::new().with_device(MockDevice::uvc("video0"));
        let report = load_and_apply(file.path(), &options(), &mut backend);
        assert!(report.succeeded());

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["stats"]["controls"]["successful"], 2);
        assert_eq!(json["meta"]["version"]["major"], 1);
    }

    #[test]
    fn test_policy_tolerance() {
        assert!(!AlreadyExistsPolicy::Reject.tolerates(2));
        assert!(!AlreadyExistsPolicy::AfterFirstPass.tolerates(1));
        assert!(AlreadyExistsPolicy::AfterFirstPass.tolerates(2));
        assert!(AlreadyExistsPolicy::Accept.tolerates(1));
    }
}
