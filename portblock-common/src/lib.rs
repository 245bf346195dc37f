#![no_std]

pub mod classify;
pub mod hdr;

pub use classify::{Frame, Verdict, classify, tcp_dst_port};

/// Name of the XDP entry point inside the eBPF object.
pub const PROGRAM_NAME: &str = "portblock";

/// Name of the single-slot map carrying the blocked TCP destination port.
pub const BLOCKED_PORT_MAP: &str = "BLOCKED_PORT";

/// The only key ever stored in [`BLOCKED_PORT_MAP`].
pub const BLOCKED_PORT_KEY: u32 = 0;

/// Port blocked when the operator does not choose one.
pub const DEFAULT_BLOCKED_PORT: u16 = 4040;
