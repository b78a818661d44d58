//! Text rendering for the status line and the device probe report.

use std::fmt::Write;

use crate::diagnostics::stats::GrabSnapshot;
use crate::grabber::discovery::{ProbeOutcome, SlotProbe, ValidDeviceSlots};
use crate::grabber::types::FrameShape;

/// State the one-line summary is built from.
#[derive(Debug, Clone)]
pub struct SummaryFacts {
    pub hardware: bool,
    pub app: bool,
    /// Selected descriptor and slot.
    pub system: Option<(String, u32)>,
    pub allocated: usize,
    pub mapped: usize,
    pub profile: String,
}

/// One allocated digitizer, as listed in a verbose dump.
#[derive(Debug, Clone)]
pub struct HandleFacts {
    pub logical_index: usize,
    pub physical_slot: u32,
    pub native: FrameShape,
    pub buffer: Option<FrameShape>,
    pub profile: String,
}

/// Everything a device dump reports.
#[derive(Debug, Clone)]
pub struct DumpFacts<'a> {
    pub system: &'a str,
    pub system_slot: u32,
    pub probes: &'a [SlotProbe],
    pub mapping: &'a ValidDeviceSlots,
    pub handles: Vec<HandleFacts>,
    pub stats: GrabSnapshot,
}

pub fn summary_line(facts: &SummaryFacts) -> String {
    if !facts.hardware {
        return "digitizers: hardware support disabled in this build".to_string();
    }
    let system = match &facts.system {
        Some((name, slot)) => format!("{name}@{slot}"),
        None => "no".to_string(),
    };
    format!(
        "digitizers: hardware=yes app={} sys={} digs_allocated={} mapped={} profile={}",
        if facts.app { "ok" } else { "no" },
        system,
        facts.allocated,
        facts.mapped,
        facts.profile
    )
}

fn presence_label(present: Option<bool>) -> &'static str {
    match present {
        Some(true) => "present",
        Some(false) => "absent",
        None => "unknown",
    }
}

fn render_probe(out: &mut String, probe: &SlotProbe, verbose: bool) {
    let slot = probe.slot;
    // Writing into a String cannot fail.
    let _ = match &probe.outcome {
        ProbeOutcome::Accepted { shape, present } => {
            let size = shape.map_or_else(|| "size=?".to_string(), |s| format!("size={s}"));
            if verbose {
                writeln!(out, "[OK] dev={slot} {size} camera={}", presence_label(*present))
            } else {
                writeln!(out, "[OK] dev={slot} {size}")
            }
        }
        ProbeOutcome::InUse { logical_index } => {
            writeln!(out, "[IN USE] dev={slot} camera={logical_index}")
        }
        ProbeOutcome::Rejected(reason) => {
            if verbose {
                writeln!(out, "[--] dev={slot} (alloc failed: {reason})")
            } else {
                writeln!(out, "[--] dev={slot} (alloc failed)")
            }
        }
    };
}

/// Logical to physical mapping as `index->slot` pairs.
pub fn mapping_line(mapping: &ValidDeviceSlots) -> String {
    if mapping.is_empty() {
        return "Mapping: none".to_string();
    }
    let pairs: Vec<String> = mapping
        .as_slice()
        .iter()
        .enumerate()
        .map(|(i, slot)| format!("{i}->{slot}"))
        .collect();
    format!("Mapping: {}", pairs.join(" "))
}

/// Multi-line probe report.
pub fn render_dump(facts: &DumpFacts<'_>, verbose: bool) -> String {
    let mut out = String::with_capacity(4096);
    let _ = writeln!(
        out,
        "Digitizer probe (system {} on slot {})",
        facts.system, facts.system_slot
    );
    let last = facts.probes.last().map_or(0, |p| p.slot);
    let _ = writeln!(out, "Probing devices 0..{last}\n");

    for probe in facts.probes {
        render_probe(&mut out, probe, verbose);
    }

    out.push('\n');
    out.push_str(&mapping_line(facts.mapping));
    out.push('\n');

    if verbose {
        out.push_str("\nAllocated:\n");
        if facts.handles.is_empty() {
            out.push_str("  none\n");
        }
        for h in &facts.handles {
            let buffer = h
                .buffer
                .map_or_else(|| "none".to_string(), |b| format!("{}x{}", b.width, b.height));
            let _ = writeln!(
                out,
                "  camera {} -> dev {} native={} buffer={} profile={}",
                h.logical_index, h.physical_slot, h.native, buffer, h.profile
            );
        }
        let s = &facts.stats;
        let _ = writeln!(
            out,
            "\nStats: grabs={} failures={} ({:.1}%) grids={} last={:.2}ms max={:.2}ms",
            s.grab_count,
            s.failure_count,
            s.failure_rate,
            s.grid_count,
            s.last_grab_ms,
            s.max_grab_ms
        );
    }

    out
}
