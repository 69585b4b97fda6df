//! Interpreter statistics: a one-line text summary or a JSON object,
//! written to stderr. Driven by the `MARL_REPORT` environment
//! variable at shutdown and by the SIGQUIT diagnostics dump.

use marl_core::interp::Interp;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct InterpReport {
    /// Approximate bytes currently allocated.
    pub mem_in_use: usize,
    /// Collection trigger threshold.
    pub mem_limit: usize,
    /// Allocator chunks carved so far.
    pub chunks: usize,
    /// Live objects on the registry.
    pub objects: usize,
    /// Interned atoms / table slots.
    pub atoms: usize,
    pub atom_slots: usize,
    /// Collections run.
    pub collections: u64,
    /// Registered types.
    pub types: usize,
    /// Live execution contexts.
    pub threads: usize,
    /// Signals delivered to script handlers.
    pub signals_delivered: u64,
}

/// Snapshot the interpreter's statistics. The GIL must be held.
pub fn gather(ip: &Interp) -> InterpReport {
    InterpReport {
        mem_in_use: ip.heap.mem,
        mem_limit: ip.heap.limit,
        chunks: ip.heap.nchunks,
        objects: ip.objs.len(),
        atoms: ip.atoms.len(),
        atom_slots: ip.atoms.capacity(),
        collections: ip.ncollects,
        types: ip.num_types(),
        threads: ip.execs.len(),
        signals_delivered: marl_core::signal::signals_delivered(),
    }
}

/// Render per the `MARL_REPORT` setting: "json" or anything else for
/// the text form.
pub fn render(report: &InterpReport, json: bool) -> String {
    if json {
        serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
    } else {
        format!(
            "marl: mem {}/{} in {} chunks, {} objects, {} atoms/{} slots, {} collections, {} threads",
            report.mem_in_use,
            report.mem_limit,
            report.chunks,
            report.objects,
            report.atoms,
            report.atom_slots,
            report.collections,
            report.threads,
        )
    }
}

/// Emit the shutdown report if `MARL_REPORT` asks for one.
pub fn emit_if_configured(ip: &Interp) {
    let Ok(mode) = std::env::var("MARL_REPORT") else {
        return;
    };
    if mode.is_empty() || mode == "0" {
        return;
    }
    let report = gather(ip);
    eprintln!("{}", render(&report, mode == "json"));
}
