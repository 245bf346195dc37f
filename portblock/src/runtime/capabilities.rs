//! Capability checks run before the program is loaded.
//!
//! Loading and attaching an XDP program needs:
//! - CAP_BPF: load eBPF programs and create maps
//! - CAP_NET_ADMIN: attach XDP programs to network interfaces
//! - CAP_PERFMON: eBPF program loading on kernel >= 5.8
//! - CAP_SYS_RESOURCE: raise the memlock rlimit
//!
//! Missing capabilities are only reported; the kernel decides during load and
//! attach, and those failures carry their own errors.

use std::fs;

use tracing::{debug, warn};

use crate::error::{PortblockError, Result};

/// Linux capability constants from <linux/capability.h>
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    NetAdmin = 12,
    SysResource = 24,
    Perfmon = 38,
    Bpf = 39,
}

impl Capability {
    fn name(&self) -> &'static str {
        match self {
            Capability::NetAdmin => "CAP_NET_ADMIN",
            Capability::SysResource => "CAP_SYS_RESOURCE",
            Capability::Perfmon => "CAP_PERFMON",
            Capability::Bpf => "CAP_BPF",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Capability::NetAdmin => "attach XDP programs to network interfaces",
            Capability::SysResource => "modify resource limits (e.g., memlock rlimit)",
            Capability::Perfmon => "performance monitoring (eBPF program loading on kernel >= 5.8)",
            Capability::Bpf => "load and manage eBPF programs",
        }
    }

    fn is_set_in(&self, mask: u64) -> bool {
        mask & (1u64 << (*self as u32)) != 0
    }
}

const REQUIRED: [Capability; 4] = [
    Capability::Bpf,
    Capability::NetAdmin,
    Capability::Perfmon,
    Capability::SysResource,
];

/// Extracts the effective capability mask from the contents of `/proc/<pid>/status`.
fn parse_cap_eff(status: &str) -> Result<u64> {
    let caps_hex = status
        .lines()
        .find_map(|line| line.strip_prefix("CapEff:"))
        .map(str::trim)
        .ok_or_else(|| PortblockError::internal("CapEff line not found in process status"))?;

    u64::from_str_radix(caps_hex, 16).map_err(|e| {
        PortblockError::internal(format!("failed to parse capability mask '{caps_hex}': {e}"))
    })
}

fn effective_capabilities() -> Result<u64> {
    let status = fs::read_to_string("/proc/self/status").map_err(|e| {
        PortblockError::internal(format!("failed to read /proc/self/status: {e}"))
    })?;
    parse_cap_eff(&status)
}

/// Returns the required capabilities absent from `mask`.
fn missing_from(mask: u64) -> Vec<Capability> {
    REQUIRED
        .iter()
        .copied()
        .filter(|cap| !cap.is_set_in(mask))
        .collect()
}

/// Logs a warning for every required capability the process lacks.
pub fn check_capabilities() {
    let mask = match effective_capabilities() {
        Ok(mask) => mask,
        Err(e) => {
            warn!(
                event.name = "capabilities.check_failed",
                error.message = %e,
                "failed to read effective capabilities, skipping check"
            );
            return;
        }
    };

    let missing = missing_from(mask);
    for cap in REQUIRED.iter().filter(|cap| !missing.contains(cap)) {
        debug!(
            event.name = "capabilities.present",
            capability = cap.name(),
            "capability is present"
        );
    }
    for cap in missing {
        warn!(
            event.name = "capabilities.missing",
            capability = cap.name(),
            description = cap.description(),
            "capability not found, loading or attaching may fail"
        );
    }
}
