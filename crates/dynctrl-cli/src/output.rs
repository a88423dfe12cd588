//! Human readable output

use dynctrl_core::mock::{MockCall, MockRequest};
use dynctrl_core::{Counter, DeviceRef, MetaInfo, Report};
use std::fmt::Write;

/// Import report in the classic uvcdynctrl layout
pub fn render_report(report: &Report, source: &str, verbose: bool) -> String {
    let mut out = String::new();

    if verbose && report.succeeded() {
        let meta = report.meta.clone().unwrap_or_default();
        render_meta(&mut out, &meta);
    }

    for message in &report.messages {
        let _ = writeln!(out, "{}", message.render(source));
    }

    if verbose {
        out.push_str("Processing statistics:\n");
        render_counter(&mut out, "constants", &report.stats.constants);
        render_counter(&mut out, "controls", &report.stats.controls);
        render_counter(&mut out, "mappings", &report.stats.mappings);
    }

    out
}

fn render_meta(out: &mut String, meta: &MetaInfo) {
    let unknown = |value: &Option<String>| value.clone().unwrap_or_else(|| "(unknown)".to_string());
    let _ = write!(
        out,
        "Available meta information:\n  File format: {}\n  Author:      {}\n  Contact:     {}\n  Copyright:   {}\n  Revision:    {}\n",
        meta.version,
        unknown(&meta.author),
        unknown(&meta.contact),
        unknown(&meta.copyright),
        meta.revision
    );
}

fn render_counter(out: &mut String, what: &str, counter: &Counter) {
    let _ = writeln!(
        out,
        "  {} {} processed ({} failed, {} successful)",
        counter.total(),
        what,
        counter.failed,
        counter.successful
    );
}

/// One line per device, as printed by `--list`
pub fn render_device(device: &DeviceRef, verbose: bool) -> String {
    if verbose {
        format!(
            "  {}   {} [{}, {}]",
            device.name,
            device.card,
            device.driver,
            device.path.display()
        )
    } else {
        format!("  {}   {}", device.name, device.card)
    }
}

/// A driver request recorded during a dry run
pub fn render_call(call: &MockCall) -> String {
    let outcome = if call.accepted { "accepted" } else { "rejected" };
    match &call.request {
        MockRequest::Control(control) => format!(
            "{}: add control {{{}}} selector {} index {} size {} flags 0x{:02x} ({})",
            call.device,
            control.entity,
            control.selector,
            control.index,
            control.size,
            control.flags.bits(),
            outcome
        ),
        MockRequest::Mapping(mapping) => format!(
            "{}: map '{}' as 0x{:08x} {} ({} bits at {}, {}) ({})",
            call.device,
            mapping.name,
            mapping.id,
            mapping.v4l2_type,
            mapping.size,
            mapping.offset,
            mapping.data_type,
            outcome
        ),
    }
}
